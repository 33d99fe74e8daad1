//! Converter trait and shared error type.
//!
//! The [`Converter`] trait covers the two steps every chain goes through:
//! notation source → PDF, then PDF → one image per page. The chain decides
//! the image format.
//!
//! The production implementation is
//! [`ExternalConverter`](super::external::ExternalConverter), which forks
//! MuseScore and the poppler tools.

use crate::types::Chain;
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Failed to start {program}: {source}")]
    SpawnFailed {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("{program} failed ({status}): {stderr}")]
    ProcessFailed {
        program: String,
        status: ExitStatus,
        stderr: String,
    },
    #[error("{program} timed out after {}s", .timeout.as_secs())]
    Timeout { program: String, timeout: Duration },
    #[error("{program} produced no output at {}", .path.display())]
    MissingOutput { program: String, path: PathBuf },
    #[error("Cannot read the page count of {}", .0.display())]
    PageCount(PathBuf),
    #[error("Required converters not found on PATH: {}", .0.join(", "))]
    Unavailable(Vec<String>),
    #[error("Conversion failed: {0}")]
    Failed(String),
}

/// Renders notation sources to page images.
///
/// Implementations must be `Sync`: songs are converted in parallel on one
/// shared converter.
pub trait Converter: Sync {
    /// Render `source` (a `.mscx` score) to the PDF at `pdf`.
    fn export_pdf(&self, source: &Path, pdf: &Path) -> Result<(), ConvertError>;

    /// Write one image per page of `pdf` into `out_dir`, named `01.ext`,
    /// `02.ext`, … with the chain's image extension.
    fn pdf_to_images(&self, chain: Chain, pdf: &Path, out_dir: &Path) -> Result<(), ConvertError>;
}

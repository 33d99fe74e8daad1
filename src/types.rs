//! Shared types used across pipeline stages.
//!
//! These are plain values built once by the caller (usually `main`) and handed
//! down to the stages that need them. Nothing here is global or mutable.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which artifact chains a run should bring up to date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Slides and piano scores.
    #[default]
    All,
    /// Projector slides only.
    Slides,
    /// Piano score pages only.
    Piano,
}

impl Mode {
    pub fn includes(self, chain: Chain) -> bool {
        match self {
            Mode::All => true,
            Mode::Slides => chain == Chain::Slides,
            Mode::Piano => chain == Chain::Piano,
        }
    }
}

/// One of the two conversion chains a song goes through.
///
/// Both chains share the same shape: notation source → PDF → one image per
/// page. They differ in the source file, the working folder and the image
/// format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    Slides,
    Piano,
}

impl Chain {
    /// Name of the per-song working subfolder holding the page images.
    pub fn folder_name(self) -> &'static str {
        match self {
            Chain::Slides => "slides",
            Chain::Piano => "piano",
        }
    }

    /// File extension of the generated page images.
    pub fn image_extension(self) -> &'static str {
        match self {
            Chain::Slides => "svg",
            Chain::Piano => "eps",
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.folder_name())
    }
}

/// Per-invocation switches, threaded explicitly through the pipeline.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    pub mode: Mode,
    /// Regenerate every requested artifact regardless of the change cache.
    pub force: bool,
    /// Emit one chapter per alphabetical bucket in the piano document.
    pub group_alphabetically: bool,
    /// Pack several songs per printed page to minimize blank pages.
    pub page_turn_optimized: bool,
}

/// A per-song problem that was reported instead of aborting the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SongFailure {
    pub song_id: String,
    /// The conversion chain that failed, or `None` for problems with the song
    /// itself (metadata, duplicate ID).
    pub chain: Option<Chain>,
    pub message: String,
}

impl SongFailure {
    pub fn new(song_id: impl Into<String>, chain: Option<Chain>, error: &dyn fmt::Display) -> Self {
        Self {
            song_id: song_id.into(),
            chain,
            message: error.to_string(),
        }
    }
}

impl fmt::Display for SongFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.chain {
            Some(chain) => write!(f, "{} [{}]: {}", self.song_id, chain, self.message),
            None => write!(f, "{}: {}", self.song_id, self.message),
        }
    }
}

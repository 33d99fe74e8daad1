//! JSON index of the library for the slide viewer.
//!
//! `songs.json` maps every song ID to its sidecar values as written (numbers
//! stay numbers), combined display lines, absolute folder and slide file
//! names:
//!
//! ```json
//! {
//!   "Stille-Nacht": {
//!     "composer": "Franz Xaver Gruber",
//!     "lyricist": "Joseph Mohr",
//!     "title": "Stille Nacht",
//!     "year": 1818,
//!     "combined": {
//!       "title": "Stille Nacht (1818)",
//!       "subtitle": "",
//!       "composer": "Franz Xaver Gruber",
//!       "lyricist": "Joseph Mohr"
//!     },
//!     "folder": "/srv/songs/s/Stille-Nacht",
//!     "slides": ["01.svg", "02.svg"]
//!   }
//! }
//! ```
//!
//! Keys are sorted, so the file is stable across runs.

use crate::metadata::CombinedMetadata;
use crate::scan::Song;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Cannot write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// One song in the index.
#[derive(Debug, Serialize)]
pub struct IndexEntry<'a> {
    #[serde(flatten)]
    pub metadata: &'a BTreeMap<String, serde_json::Value>,
    pub combined: CombinedMetadata,
    pub folder: String,
    pub slides: &'a [String],
}

pub fn build_index(songs: &[Song]) -> BTreeMap<&str, IndexEntry<'_>> {
    songs
        .iter()
        .map(|song| {
            (
                song.song_id.as_str(),
                IndexEntry {
                    metadata: &song.metadata.raw,
                    combined: song.metadata.combined(),
                    folder: song.folder.to_string_lossy().to_string(),
                    slides: &song.slide_images,
                },
            )
        })
        .collect()
}

/// Write the index of `songs` to `path` as pretty-printed JSON.
pub fn write_index(songs: &[Song], path: &Path) -> Result<(), ExportError> {
    let json = serde_json::to_string_pretty(&build_index(songs))?;
    fs::write(path, json).map_err(|e| ExportError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}

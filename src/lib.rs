//! # Songbook Updater
//!
//! Keeps a songbook's derived artifacts in sync with its notation sources.
//! Every song lives in its own folder; the updater renders projector slides
//! and piano score pages from the MuseScore sources, exports a JSON index for
//! the slide viewer and lays the piano pages out into a TeX document.
//!
//! # Architecture: Three-Stage Pipeline
//!
//! ```text
//! 1. Scan      base/       →  Library              (folders → songs + metadata)
//! 2. Process   Library     →  slides/, piano/      (changed sources re-rendered)
//! 3. Compose   Library     →  songs.json, songs.tex
//! ```
//!
//! Stage 2 is the only stage that forks external programs, and the only one
//! that runs in parallel. Stage 3 is pure and deterministic: the same library
//! always yields byte-identical files.
//!
//! # Library Layout
//!
//! ```text
//! base/
//! ├── songbook.toml               # Optional config overrides
//! ├── filehashes.json             # Change cache store
//! ├── songs.json                  # JSON index (written by full runs)
//! ├── songs.tex                   # Piano score document (written by full runs)
//! ├── a/                          # Alphabetical bucket
//! │   └── Auf-der-Mauer/          # Song folder, name = song ID
//! │       ├── info.yml            # Metadata sidecar (title required)
//! │       ├── projector.mscx      # Slides source
//! │       ├── piano.mscx          # Piano source (falls back to lead.mscx)
//! │       ├── projector.pdf       # Intermediate
//! │       ├── slides/01.svg …
//! │       └── piano/01.eps …
//! └── s/ …
//! ```
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`scan`] | Stage 1: discovers song folders, loads metadata, applies restrictions |
//! | [`process`] | Stage 2: per-song, per-chain change detection and regeneration |
//! | [`layout`] | Stage 3: packs piano pages into printed pages |
//! | [`compose`] | Stage 3: renders the layout as TeX |
//! | [`export`] | Stage 3: writes the JSON index |
//! | [`cache`] | Content-hash change cache persisted next to the songs |
//! | [`convert`] | `Converter` trait and the MuseScore/poppler implementation |
//! | [`config`] | `songbook.toml` loading, stock defaults, validation |
//! | [`metadata`] | `info.yml` parsing and combined display lines |
//! | [`naming`] | `NN.ext` page file convention |
//! | [`types`] | Run options, chains and failure records shared across stages |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Content Hashes, Not Timestamps
//!
//! A chain is regenerated when the SHA-256 of its source differs from the
//! stored one. Checkouts, copies and backups touch modification times without
//! changing a score; hashes only move when the notes do.
//!
//! ## Failures Are Values
//!
//! A broken song never stops the run. Metadata errors, converter crashes and
//! timeouts become [`types::SongFailure`] records, printed at the end and
//! reflected in the exit status.
//!
//! ## No Global Configuration
//!
//! [`config::SongbookConfig`] and [`types::RunOptions`] are plain values built
//! once in `main` and passed to every stage that needs them.

pub mod cache;
pub mod compose;
pub mod config;
pub mod convert;
pub mod export;
pub mod layout;
pub mod metadata;
pub mod naming;
pub mod output;
pub mod process;
pub mod scan;
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;

//! Shared test utilities for the songbook-updater test suite.
//!
//! Provides fixture setup, song folder builders and lookup helpers that work
//! with scan-phase data structures (`Library`, `Song`).
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let tmp = setup_fixtures();
//! let library = Library::scan(tmp.path(), &FilesConfig::default()).unwrap();
//!
//! let song = find_song(&library, "Swing-low");
//! assert_eq!(song.alpha_bucket, "s");
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::metadata::SongMetadata;
use crate::naming::page_file_name;
use crate::scan::{Library, Song};
use crate::types::Chain;

// =========================================================================
// Fixture setup
// =========================================================================

/// Copy `fixtures/library/` to a temp directory and return it.
///
/// Tests get an isolated copy they can mutate without affecting other tests
/// or the source fixtures.
pub fn setup_fixtures() -> TempDir {
    let tmp = TempDir::new().unwrap();
    let fixtures = Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures/library");
    copy_dir_recursive(&fixtures, tmp.path()).unwrap();
    tmp
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> std::io::Result<()> {
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());

        if src_path.is_dir() {
            fs::create_dir_all(&dst_path)?;
            copy_dir_recursive(&src_path, &dst_path)?;
        } else {
            fs::copy(&src_path, &dst_path)?;
        }
    }
    Ok(())
}

// =========================================================================
// Song folder builders
// =========================================================================

/// Create `<base>/<bucket>/<song_id>/` with the given `info.yml` plus stub
/// `projector.mscx` and `piano.mscx` sources. An empty bucket puts the song
/// directly in `base`.
pub fn write_song(base: &Path, bucket: &str, song_id: &str, info_yml: &str) -> PathBuf {
    let folder = base.join(bucket).join(song_id);
    fs::create_dir_all(&folder).unwrap();
    fs::write(folder.join("info.yml"), info_yml).unwrap();
    fs::write(folder.join("projector.mscx"), format!("<museScore>{song_id}</museScore>")).unwrap();
    fs::write(folder.join("piano.mscx"), format!("<museScore>{song_id} piano</museScore>")).unwrap();
    folder
}

/// Write `count` empty page images into a song's working folder.
pub fn write_pages(song_folder: &Path, chain: Chain, count: u32) {
    let dir = song_folder.join(chain.folder_name());
    fs::create_dir_all(&dir).unwrap();
    for page in 1..=count {
        fs::write(dir.join(page_file_name(page, chain.image_extension())), "").unwrap();
    }
}

/// Append one byte to a file, changing its content hash.
pub fn append_byte(path: &Path) {
    let mut content = fs::read(path).unwrap();
    content.push(b'\n');
    fs::write(path, content).unwrap();
}

/// In-memory song with `pages` piano images and the song ID as title.
/// Nothing is written to disk.
pub fn song_with_pages(bucket: &str, song_id: &str, pages: u32) -> Song {
    Song {
        song_id: song_id.to_string(),
        alpha_bucket: bucket.to_string(),
        folder: PathBuf::from("/songs").join(bucket).join(song_id),
        rel_folder: format!("{bucket}/{song_id}"),
        metadata: SongMetadata {
            title: song_id.to_string(),
            ..Default::default()
        },
        slide_images: Vec::new(),
        piano_images: (1..=pages).map(|n| page_file_name(n, "eps")).collect(),
    }
}

// =========================================================================
// Library lookups (panic with the available IDs on miss)
// =========================================================================

/// Find a song by ID. Panics if not found.
pub fn find_song<'a>(library: &'a Library, song_id: &str) -> &'a Song {
    library.by_id(song_id).unwrap_or_else(|| {
        panic!(
            "song '{song_id}' not found. Available: {:?}",
            song_ids(library)
        )
    })
}

/// Find a song by ID for mutation. Panics if not found.
pub fn find_song_mut<'a>(library: &'a mut Library, song_id: &str) -> &'a mut Song {
    let available = song_ids(library)
        .into_iter()
        .map(String::from)
        .collect::<Vec<_>>();
    library
        .songs_mut()
        .iter_mut()
        .find(|s| s.song_id == song_id)
        .unwrap_or_else(|| panic!("song '{song_id}' not found. Available: {available:?}"))
}

/// All song IDs in library order.
pub fn song_ids(library: &Library) -> Vec<&str> {
    library.all().iter().map(|s| s.song_id.as_str()).collect()
}

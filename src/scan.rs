//! Song discovery and the in-memory library.
//!
//! Stage 1 of the songbook pipeline. Walks the base directory, finds every
//! folder that carries a metadata sidecar and turns it into a [`Song`].
//!
//! ## Directory Structure
//!
//! ```text
//! songs/                               # Base path
//! ├── songbook.toml                    # Configuration (optional)
//! ├── filehashes.json                  # Change cache store (generated)
//! ├── songs.tex                        # Piano document (generated)
//! ├── songs.json                       # JSON index (generated)
//! ├── a/                               # Alphabetical bucket
//! │   └── Auf-der-Mauer/               # Song folder, name = song ID
//! │       ├── info.yml                 # Metadata sidecar
//! │       ├── projector.mscx           # Slides source
//! │       ├── piano.mscx               # Piano source (or lead.mscx)
//! │       ├── projector.pdf            # Intermediate (generated)
//! │       ├── slides/01.svg …          # Slide pages (generated)
//! │       └── piano/01.eps …           # Piano pages (generated)
//! └── s/
//!     ├── Stille-Nacht/
//!     └── Swing-low/
//! ```
//!
//! The song ID is the song folder's name and must be unique across all
//! buckets. The bucket is the name of the folder one level up, lowercased; a
//! song placed directly in the base path uses the first letter of its ID.
//!
//! ## Failures
//!
//! A song whose sidecar can't be read or parsed, or whose ID was already taken
//! by an earlier folder (path order), is not fatal. It is left out of the
//! library and recorded as a [`SongFailure`] so the run can report it at the
//! end. Only problems with the base path itself abort the scan.

use crate::cache::{CacheError, ChangeCache};
use crate::config::FilesConfig;
use crate::metadata::{MetadataError, SongMetadata};
use crate::naming;
use crate::types::{Chain, SongFailure};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Cannot walk song library: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("Metadata error: {0}")]
    Metadata(#[from] MetadataError),
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
    #[error("Base path does not exist: {0}")]
    MissingBase(PathBuf),
    #[error("Song ID \"{song_id}\" is used by both {first} and {second}")]
    DuplicateSongId {
        song_id: String,
        first: PathBuf,
        second: PathBuf,
    },
    #[error("Unknown song IDs: {}", .0.join(", "))]
    UnknownSongIds(Vec<String>),
    #[error("Not a song folder of this library: {0}")]
    NotASongFolder(PathBuf),
}

/// One song folder and its derived state.
#[derive(Debug, Clone, PartialEq)]
pub struct Song {
    /// Folder name, unique across the library.
    pub song_id: String,
    /// Lowercase bucket, e.g. `"a"`.
    pub alpha_bucket: String,
    /// Absolute song folder.
    pub folder: PathBuf,
    /// Folder relative to the base path, `/`-separated (`"a/Auf-der-Mauer"`).
    pub rel_folder: String,
    pub metadata: SongMetadata,
    /// Slide page file names in page order (`01.svg`, …).
    pub slide_images: Vec<String>,
    /// Piano page file names in page order (`01.eps`, …).
    pub piano_images: Vec<String>,
}

impl Song {
    /// Load the song in `folder` (absolute, inside `base`).
    pub fn load(base: &Path, folder: &Path, files: &FilesConfig) -> Result<Song, ScanError> {
        let song_id = dir_name(folder);
        let metadata = SongMetadata::load(&folder.join(&files.metadata))?;
        let rel_folder = relative_folder(base, folder);
        let alpha_bucket = alpha_bucket(base, folder, &song_id);

        let mut song = Song {
            song_id,
            alpha_bucket,
            folder: folder.to_path_buf(),
            rel_folder,
            metadata,
            slide_images: Vec::new(),
            piano_images: Vec::new(),
        };
        song.refresh_images(Chain::Slides)?;
        song.refresh_images(Chain::Piano)?;
        Ok(song)
    }

    /// Working folder of a chain (`<song>/slides`, `<song>/piano`).
    pub fn chain_folder(&self, chain: Chain) -> PathBuf {
        self.folder.join(chain.folder_name())
    }

    pub fn images(&self, chain: Chain) -> &[String] {
        match chain {
            Chain::Slides => &self.slide_images,
            Chain::Piano => &self.piano_images,
        }
    }

    /// Re-list a chain's working folder and replace the image list.
    pub fn refresh_images(&mut self, chain: Chain) -> io::Result<()> {
        let images = naming::list_page_images(&self.chain_folder(chain), chain.image_extension())?;
        match chain {
            Chain::Slides => self.slide_images = images,
            Chain::Piano => self.piano_images = images,
        }
        Ok(())
    }

    /// Notation source a chain converts from, if present.
    ///
    /// Slides use the projector score. Piano tries each configured name in
    /// order (`piano.mscx`, then `lead.mscx`).
    pub fn source_file(&self, chain: Chain, files: &FilesConfig) -> Option<PathBuf> {
        match chain {
            Chain::Slides => Some(self.folder.join(&files.projector)).filter(|p| p.is_file()),
            Chain::Piano => files
                .piano
                .iter()
                .map(|name| self.folder.join(name))
                .find(|p| p.is_file()),
        }
    }

    /// Image paths relative to the base path, e.g. `a/Auf-der-Mauer/piano/01.eps`.
    pub fn image_paths(&self, chain: Chain) -> Vec<String> {
        self.images(chain)
            .iter()
            .map(|name| format!("{}/{}/{}", self.rel_folder, chain.folder_name(), name))
            .collect()
    }

    /// Delete the song's derived artifacts: both working folders and the
    /// intermediate projector PDF.
    pub fn clean(&mut self, files: &FilesConfig) -> io::Result<()> {
        for chain in [Chain::Slides, Chain::Piano] {
            remove_dir_if_exists(&self.chain_folder(chain))?;
        }
        remove_file_if_exists(&self.folder.join(&files.projector_pdf))?;
        self.slide_images.clear();
        self.piano_images.clear();
        Ok(())
    }
}

/// Every song under one base path, ordered by bucket then song ID.
#[derive(Debug)]
pub struct Library {
    base_path: PathBuf,
    songs: Vec<Song>,
    failures: Vec<SongFailure>,
}

impl Library {
    /// Discover all songs under `base_path`.
    pub fn scan(base_path: &Path, files: &FilesConfig) -> Result<Library, ScanError> {
        let base = fs::canonicalize(base_path)
            .map_err(|_| ScanError::MissingBase(base_path.to_path_buf()))?;

        let mut songs: Vec<Song> = Vec::new();
        let mut failures = Vec::new();
        let mut seen: BTreeMap<String, PathBuf> = BTreeMap::new();

        for folder in song_folders(&base, files)? {
            let song_id = dir_name(&folder);
            if let Some(first) = seen.get(&song_id) {
                let err = ScanError::DuplicateSongId {
                    song_id: song_id.clone(),
                    first: first.clone(),
                    second: folder.clone(),
                };
                warn!(song = %song_id, "{err}");
                failures.push(SongFailure::new(song_id, None, &err));
                continue;
            }
            seen.insert(song_id.clone(), folder.clone());

            match Song::load(&base, &folder, files) {
                Ok(song) => songs.push(song),
                Err(err) => {
                    warn!(song = %song_id, "skipping song: {err}");
                    failures.push(SongFailure::new(song_id, None, &err));
                }
            }
        }

        songs.sort_by(|a, b| {
            (&a.alpha_bucket, &a.song_id).cmp(&(&b.alpha_bucket, &b.song_id))
        });
        debug!(songs = songs.len(), failures = failures.len(), "library scanned");

        Ok(Library {
            base_path: base,
            songs,
            failures,
        })
    }

    /// Absolute base path.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Active songs in (bucket, song ID) order.
    pub fn all(&self) -> &[Song] {
        &self.songs
    }

    pub fn songs_mut(&mut self) -> &mut [Song] {
        &mut self.songs
    }

    pub fn by_id(&self, song_id: &str) -> Option<&Song> {
        self.songs.iter().find(|s| s.song_id == song_id)
    }

    pub fn len(&self) -> usize {
        self.songs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.songs.is_empty()
    }

    /// Songs that could not be loaded.
    pub fn failures(&self) -> &[SongFailure] {
        &self.failures
    }

    /// Narrow the library to the IDs listed in a text file (whitespace
    /// separated, usually one per line).
    pub fn restrict_to_list(&mut self, path: &Path) -> Result<(), ScanError> {
        let content = fs::read_to_string(path)?;
        let ids: Vec<&str> = content.split_whitespace().collect();
        self.restrict_to_ids(&ids)
    }

    /// Narrow the library to the given IDs. Every ID must name a song that
    /// was found during the scan (failed songs count as found).
    pub fn restrict_to_ids(&mut self, ids: &[&str]) -> Result<(), ScanError> {
        let known: BTreeSet<&str> = self
            .songs
            .iter()
            .map(|s| s.song_id.as_str())
            .chain(self.failures.iter().map(|f| f.song_id.as_str()))
            .collect();
        let unknown: Vec<String> = ids
            .iter()
            .filter(|id| !known.contains(**id))
            .map(|id| id.to_string())
            .collect();
        if !unknown.is_empty() {
            return Err(ScanError::UnknownSongIds(unknown));
        }

        let keep: BTreeSet<&str> = ids.iter().copied().collect();
        self.songs.retain(|s| keep.contains(s.song_id.as_str()));
        self.failures.retain(|f| keep.contains(f.song_id.as_str()));
        Ok(())
    }

    pub fn restrict_to_song_id(&mut self, song_id: &str) -> Result<(), ScanError> {
        self.restrict_to_ids(&[song_id])
    }

    /// Narrow the library to the song in `path`, which may be the song
    /// folder or any file inside it.
    pub fn restrict_to_folder(&mut self, path: &Path) -> Result<(), ScanError> {
        let resolved =
            fs::canonicalize(path).map_err(|_| ScanError::NotASongFolder(path.to_path_buf()))?;
        let folder = if resolved.is_dir() {
            resolved
        } else {
            resolved
                .parent()
                .map(Path::to_path_buf)
                .ok_or_else(|| ScanError::NotASongFolder(path.to_path_buf()))?
        };

        let song_id = dir_name(&folder);
        let known = self.songs.iter().any(|s| s.folder == folder)
            || self.failures.iter().any(|f| f.song_id == song_id);
        if !known {
            return Err(ScanError::NotASongFolder(path.to_path_buf()));
        }
        self.songs.retain(|s| s.folder == folder);
        self.failures.retain(|f| f.song_id == song_id);
        Ok(())
    }

    /// Songs grouped by bucket, each bucket ordered by song ID.
    pub fn alphabetical_index(&self) -> BTreeMap<&str, Vec<&Song>> {
        alphabetical_index(&self.songs)
    }

    /// Delete every song's derived artifacts, the library-level outputs and
    /// the change cache store.
    pub fn clean_all(&mut self, files: &FilesConfig, cache: &ChangeCache) -> Result<(), ScanError> {
        for song in &mut self.songs {
            song.clean(files)?;
        }
        remove_file_if_exists(&self.base_path.join(&files.tex))?;
        remove_file_if_exists(&self.base_path.join(&files.json_index))?;
        cache.purge()?;
        Ok(())
    }
}

/// Group `songs` by bucket, each bucket ordered by song ID.
pub fn alphabetical_index(songs: &[Song]) -> BTreeMap<&str, Vec<&Song>> {
    let mut index: BTreeMap<&str, Vec<&Song>> = BTreeMap::new();
    for song in songs {
        index.entry(song.alpha_bucket.as_str()).or_default().push(song);
    }
    for bucket in index.values_mut() {
        bucket.sort_by(|a, b| a.song_id.cmp(&b.song_id));
    }
    index
}

/// Folders under `base` containing the metadata sidecar, in path order.
/// Hidden directories are skipped.
fn song_folders(base: &Path, files: &FilesConfig) -> Result<Vec<PathBuf>, ScanError> {
    let mut folders = Vec::new();
    let walker = WalkDir::new(base)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e.file_name()));
    for entry in walker {
        let entry = entry?;
        if entry.file_type().is_file() && entry.file_name() == files.metadata.as_str() {
            if let Some(folder) = entry.path().parent() {
                folders.push(folder.to_path_buf());
            }
        }
    }
    Ok(folders)
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_string_lossy().starts_with('.')
}

fn dir_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

fn relative_folder(base: &Path, folder: &Path) -> String {
    folder
        .strip_prefix(base)
        .unwrap_or(folder)
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().to_string()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn alpha_bucket(base: &Path, folder: &Path, song_id: &str) -> String {
    match folder.parent() {
        Some(parent) if parent != base => dir_name(parent).to_lowercase(),
        _ => song_id
            .chars()
            .next()
            .map(|c| c.to_lowercase().to_string())
            .unwrap_or_default(),
    }
}

fn remove_dir_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_dir_all(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

fn remove_file_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

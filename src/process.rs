//! Per-song conversion with change detection.
//!
//! Stage 2 of the songbook pipeline. For every song in the library and every
//! chain the run asks for, decide whether the chain's images are current and
//! regenerate them if not.
//!
//! ## When a chain is regenerated
//!
//! A chain runs when any of these holds:
//!
//! - the run is forced (`--force`, or a single-song run)
//! - the change cache reports the chain's source as changed
//! - the chain's working folder holds no images yet
//!
//! The cache is asked even on forced runs so its record stays current.
//!
//! ## Regeneration
//!
//! ```text
//! slides:  projector.mscx ──mscore──▶ projector.pdf ──pdf2svg──▶ slides/01.svg …
//! piano:   piano.mscx ─copy─▶ piano/piano.mscx ──mscore──▶ piano/piano.pdf
//!                                              ──pdftops──▶ piano/01.eps …
//! ```
//!
//! The working folder is emptied before conversion, never patched, so pages
//! left over from a longer earlier version can't survive. After conversion the
//! folder is listed again and the listing replaces the song's image list.
//!
//! ## Failures
//!
//! Every problem is attributed to one song and chain and collected as a
//! [`SongFailure`]. Other songs, and the other chain of the same song, carry
//! on.
//!
//! ## Parallel Processing
//!
//! Songs are processed in parallel using [rayon](https://docs.rs/rayon). The
//! only shared state is the [`ChangeCache`], which serializes its own updates.

use crate::cache::{CacheError, ChangeCache};
use crate::config::FilesConfig;
use crate::convert::{ConvertError, Converter};
use crate::scan::{Library, Song};
use crate::types::{Chain, RunOptions, SongFailure};
use rayon::prelude::*;
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::mpsc::Sender;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Change cache error: {0}")]
    Cache(#[from] CacheError),
    #[error("{0}")]
    Convert(#[from] ConvertError),
    #[error("Missing source file: {0}")]
    MissingSource(String),
    #[error("No {0} images were generated")]
    NoImages(Chain),
}

/// Why a chain was regenerated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reason {
    Forced,
    Changed,
    Missing,
}

/// What happened to one chain of one song.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainStatus {
    UpToDate,
    Regenerated(Reason),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainOutcome {
    pub chain: Chain,
    pub status: ChainStatus,
    /// The chain's images after processing.
    pub images: Vec<String>,
}

/// Progress events emitted while songs are processed.
#[derive(Debug, Clone)]
pub enum ProcessEvent {
    SongProcessed {
        song_id: String,
        title: String,
        forced: bool,
        outcomes: Vec<ChainOutcome>,
    },
}

/// Chain counts over a whole run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunStats {
    pub regenerated: u32,
    pub up_to_date: u32,
    pub failed: u32,
}

impl RunStats {
    fn record(&mut self, status: &ChainStatus) {
        match status {
            ChainStatus::UpToDate => self.up_to_date += 1,
            ChainStatus::Regenerated(_) => self.regenerated += 1,
            ChainStatus::Failed(_) => self.failed += 1,
        }
    }

    pub fn total(&self) -> u32 {
        self.regenerated + self.up_to_date + self.failed
    }
}

impl fmt::Display for RunStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} regenerated, {} up to date, {} failed",
            self.regenerated, self.up_to_date, self.failed
        )
    }
}

pub struct ProcessResult {
    pub stats: RunStats,
    pub failures: Vec<SongFailure>,
}

/// Bring every song in `library` up to date for the chains `options.mode`
/// asks for.
pub fn process_library(
    library: &mut Library,
    converter: &impl Converter,
    cache: &ChangeCache,
    files: &FilesConfig,
    options: RunOptions,
    progress: Option<Sender<ProcessEvent>>,
) -> ProcessResult {
    let reports: Vec<Vec<ChainOutcome>> = library
        .songs_mut()
        .par_iter_mut()
        .map(|song| {
            let outcomes = process_song(song, converter, cache, files, options);
            if let Some(tx) = progress.as_ref() {
                tx.send(ProcessEvent::SongProcessed {
                    song_id: song.song_id.clone(),
                    title: song.metadata.title.clone(),
                    forced: options.force,
                    outcomes: outcomes.clone(),
                })
                .ok();
            }
            outcomes
        })
        .collect();

    let mut stats = RunStats::default();
    let mut failures = Vec::new();
    for (song, outcomes) in library.all().iter().zip(&reports) {
        for outcome in outcomes {
            stats.record(&outcome.status);
            if let ChainStatus::Failed(message) = &outcome.status {
                failures.push(SongFailure {
                    song_id: song.song_id.clone(),
                    chain: Some(outcome.chain),
                    message: message.clone(),
                });
            }
        }
    }

    ProcessResult { stats, failures }
}

/// Process the requested chains of one song. Never fails: problems end up in
/// the returned outcomes.
pub fn process_song(
    song: &mut Song,
    converter: &impl Converter,
    cache: &ChangeCache,
    files: &FilesConfig,
    options: RunOptions,
) -> Vec<ChainOutcome> {
    [Chain::Slides, Chain::Piano]
        .into_iter()
        .filter(|&chain| options.mode.includes(chain))
        .map(|chain| {
            let status = match update_chain(song, chain, converter, cache, files, options.force) {
                Ok(status) => status,
                Err(err) => {
                    warn!(song = %song.song_id, %chain, "{err}");
                    // Whatever survived on disk is the truth now.
                    song.refresh_images(chain).ok();
                    ChainStatus::Failed(err.to_string())
                }
            };
            ChainOutcome {
                chain,
                status,
                images: song.images(chain).to_vec(),
            }
        })
        .collect()
}

fn update_chain(
    song: &mut Song,
    chain: Chain,
    converter: &impl Converter,
    cache: &ChangeCache,
    files: &FilesConfig,
    force: bool,
) -> Result<ChainStatus, ProcessError> {
    let source = song
        .source_file(chain, files)
        .ok_or_else(|| ProcessError::MissingSource(expected_sources(chain, files)))?;

    let changed = cache.is_modified(&source)?;
    let reason = if force {
        Reason::Forced
    } else if changed {
        Reason::Changed
    } else if song.images(chain).is_empty() {
        Reason::Missing
    } else {
        debug!(song = %song.song_id, %chain, "up to date");
        return Ok(ChainStatus::UpToDate);
    };

    debug!(song = %song.song_id, %chain, ?reason, "regenerating");
    regenerate(song, chain, &source, converter, files)?;
    Ok(ChainStatus::Regenerated(reason))
}

/// Empty the chain's working folder, convert, and re-list.
fn regenerate(
    song: &mut Song,
    chain: Chain,
    source: &Path,
    converter: &impl Converter,
    files: &FilesConfig,
) -> Result<(), ProcessError> {
    let work_dir = song.chain_folder(chain);
    empty_dir(&work_dir)?;

    let pdf = match chain {
        Chain::Slides => {
            let pdf = song.folder.join(&files.projector_pdf);
            converter.export_pdf(source, &pdf)?;
            pdf
        }
        Chain::Piano => {
            // The working folder gets its own copy of the score so it is
            // self-contained.
            let file_name = source
                .file_name()
                .ok_or_else(|| ProcessError::MissingSource(source.display().to_string()))?;
            let staged = work_dir.join(file_name);
            fs::copy(source, &staged)?;
            let pdf = staged.with_extension("pdf");
            converter.export_pdf(&staged, &pdf)?;
            pdf
        }
    };
    converter.pdf_to_images(chain, &pdf, &work_dir)?;

    song.refresh_images(chain)?;
    if song.images(chain).is_empty() {
        return Err(ProcessError::NoImages(chain));
    }
    Ok(())
}

fn expected_sources(chain: Chain, files: &FilesConfig) -> String {
    match chain {
        Chain::Slides => files.projector.clone(),
        Chain::Piano => files.piano.join(" or "),
    }
}

fn empty_dir(dir: &Path) -> io::Result<()> {
    match fs::remove_dir_all(dir) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }
    fs::create_dir_all(dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::backend::tests::{MockConverter, RecordedOp};
    use crate::test_helpers::*;
    use crate::types::Mode;
    use tempfile::TempDir;

    struct Fixture {
        tmp: TempDir,
        library: Library,
        cache: ChangeCache,
        files: FilesConfig,
    }

    impl Fixture {
        fn new() -> Self {
            let tmp = setup_fixtures();
            let files = FilesConfig::default();
            let library = Library::scan(tmp.path(), &files).unwrap();
            let cache = ChangeCache::open(tmp.path().join(&files.cache));
            Self {
                tmp,
                library,
                cache,
                files,
            }
        }

        fn run(&mut self, converter: &MockConverter, options: RunOptions) -> ProcessResult {
            process_library(
                &mut self.library,
                converter,
                &self.cache,
                &self.files,
                options,
                None,
            )
        }

        fn song_dir(&self, rel: &str) -> std::path::PathBuf {
            self.tmp.path().join(rel)
        }
    }

    fn fixture_pages() -> MockConverter {
        MockConverter::with_pages(&[
            ("Auf-der-Mauer", 2),
            ("Stille-Nacht", 1),
            ("Swing-low", 3),
            ("Zum-Tanze-da-geht-ein-Maedel", 2),
        ])
    }

    // =========================================================================
    // First run
    // =========================================================================

    #[test]
    fn first_run_generates_everything() {
        let mut fx = Fixture::new();
        let converter = fixture_pages();
        let result = fx.run(&converter, RunOptions::default());

        assert!(result.failures.is_empty(), "{:?}", result.failures);
        assert_eq!(result.stats.regenerated, 8);
        assert_eq!(converter.converted(Chain::Slides).len(), 4);
        assert_eq!(converter.converted(Chain::Piano).len(), 4);

        let song = find_song(&fx.library, "Swing-low");
        assert_eq!(song.piano_images, vec!["01.eps", "02.eps", "03.eps"]);
        assert_eq!(song.slide_images, vec!["01.svg", "02.svg", "03.svg"]);
        assert!(fx.song_dir("s/Swing-low/projector.pdf").exists());
    }

    #[test]
    fn piano_source_is_staged_in_working_folder() {
        let mut fx = Fixture::new();
        let converter = fixture_pages();
        fx.run(&converter, RunOptions::default());

        assert!(fx.song_dir("s/Stille-Nacht/piano/piano.mscx").exists());
        // Swing-low has only a lead sheet.
        assert!(fx.song_dir("s/Swing-low/piano/lead.mscx").exists());
        assert!(converter.get_operations().contains(&RecordedOp::ExportPdf {
            song: "Swing-low".into(),
            source: "lead.mscx".into(),
        }));
    }

    // =========================================================================
    // Change detection
    // =========================================================================

    #[test]
    fn second_run_regenerates_nothing() {
        let mut fx = Fixture::new();
        fx.run(&fixture_pages(), RunOptions::default());

        let converter = fixture_pages();
        let result = fx.run(&converter, RunOptions::default());
        assert_eq!(result.stats.regenerated, 0);
        assert_eq!(result.stats.up_to_date, 8);
        assert!(converter.get_operations().is_empty());
    }

    #[test]
    fn changed_source_regenerates_only_that_song_and_chain() {
        let mut fx = Fixture::new();
        fx.run(&fixture_pages(), RunOptions::default());

        append_byte(&fx.song_dir("s/Stille-Nacht/projector.mscx"));

        let converter = fixture_pages();
        let result = fx.run(&converter, RunOptions::default());
        assert_eq!(converter.converted(Chain::Slides), vec!["Stille-Nacht"]);
        assert!(converter.converted(Chain::Piano).is_empty());
        assert_eq!(result.stats.regenerated, 1);
    }

    #[test]
    fn missing_images_are_regenerated_without_source_change() {
        let mut fx = Fixture::new();
        fx.run(&fixture_pages(), RunOptions::default());

        fs::remove_dir_all(fx.song_dir("a/Auf-der-Mauer/piano")).unwrap();
        find_song_mut(&mut fx.library, "Auf-der-Mauer")
            .refresh_images(Chain::Piano)
            .unwrap();

        let converter = fixture_pages();
        let mut seen = Vec::new();
        let (tx, rx) = std::sync::mpsc::channel();
        process_library(
            &mut fx.library,
            &converter,
            &fx.cache,
            &fx.files,
            RunOptions::default(),
            Some(tx),
        );
        for event in rx {
            seen.push(event);
        }

        assert_eq!(converter.converted(Chain::Piano), vec!["Auf-der-Mauer"]);
        let ProcessEvent::SongProcessed { outcomes, .. } = seen
            .iter()
            .find(|ProcessEvent::SongProcessed { song_id, .. }| song_id == "Auf-der-Mauer")
            .unwrap();
        assert_eq!(outcomes[1].status, ChainStatus::Regenerated(Reason::Missing));
    }

    #[test]
    fn force_regenerates_unchanged_songs() {
        let mut fx = Fixture::new();
        fx.run(&fixture_pages(), RunOptions::default());

        let converter = fixture_pages();
        let options = RunOptions {
            force: true,
            ..Default::default()
        };
        let result = fx.run(&converter, options);
        assert_eq!(result.stats.regenerated, 8);
        assert_eq!(converter.converted(Chain::Piano).len(), 4);
    }

    #[test]
    fn stale_pages_do_not_survive_shorter_score() {
        let mut fx = Fixture::new();
        fx.run(&fixture_pages(), RunOptions::default());
        assert!(fx.song_dir("s/Swing-low/piano/03.eps").exists());

        append_byte(&fx.song_dir("s/Swing-low/lead.mscx"));
        let converter = MockConverter::with_pages(&[("Swing-low", 1)]);
        fx.run(&converter, RunOptions::default());

        assert!(!fx.song_dir("s/Swing-low/piano/02.eps").exists());
        assert_eq!(find_song(&fx.library, "Swing-low").piano_images, vec!["01.eps"]);
    }

    // =========================================================================
    // Modes
    // =========================================================================

    #[test]
    fn slides_mode_leaves_piano_alone() {
        let mut fx = Fixture::new();
        let converter = fixture_pages();
        let options = RunOptions {
            mode: Mode::Slides,
            ..Default::default()
        };
        let result = fx.run(&converter, options);

        assert_eq!(result.stats.total(), 4);
        assert!(converter.converted(Chain::Piano).is_empty());
        assert!(!fx.song_dir("a/Auf-der-Mauer/piano").exists());
        // The piano source was never recorded.
        let piano = fx.song_dir("a/Auf-der-Mauer/piano.mscx");
        assert_eq!(fx.cache.stored_hash(&piano).unwrap(), None);
    }

    #[test]
    fn piano_mode_leaves_slides_alone() {
        let mut fx = Fixture::new();
        let converter = fixture_pages();
        let options = RunOptions {
            mode: Mode::Piano,
            ..Default::default()
        };
        fx.run(&converter, options);
        assert!(converter.converted(Chain::Slides).is_empty());
        assert!(!fx.song_dir("a/Auf-der-Mauer/slides").exists());
    }

    // =========================================================================
    // Failures
    // =========================================================================

    #[test]
    fn converter_failure_is_attributed_and_others_continue() {
        let mut fx = Fixture::new();
        let converter = fixture_pages().failing("Stille-Nacht");
        let result = fx.run(&converter, RunOptions::default());

        assert_eq!(result.failures.len(), 2);
        assert!(result.failures.iter().all(|f| f.song_id == "Stille-Nacht"));
        assert_eq!(result.stats.failed, 2);
        assert_eq!(result.stats.regenerated, 6);
        assert!(find_song(&fx.library, "Stille-Nacht").slide_images.is_empty());
        assert_eq!(find_song(&fx.library, "Zum-Tanze-da-geht-ein-Maedel").piano_images.len(), 2);
    }

    #[test]
    fn missing_source_is_a_chain_failure() {
        let mut fx = Fixture::new();
        fs::remove_file(fx.song_dir("z/Zum-Tanze-da-geht-ein-Maedel/piano.mscx")).unwrap();

        let result = fx.run(&fixture_pages(), RunOptions::default());
        assert_eq!(result.failures.len(), 1);
        let failure = &result.failures[0];
        assert_eq!(failure.song_id, "Zum-Tanze-da-geht-ein-Maedel");
        assert_eq!(failure.chain, Some(Chain::Piano));
        assert!(failure.message.contains("piano.mscx or lead.mscx"));
        // Slides for the same song still went through.
        assert_eq!(
            find_song(&fx.library, "Zum-Tanze-da-geht-ein-Maedel").slide_images.len(),
            2
        );
    }

    #[test]
    fn stats_display() {
        let stats = RunStats {
            regenerated: 3,
            up_to_date: 5,
            failed: 1,
        };
        assert_eq!(stats.to_string(), "3 regenerated, 5 up to date, 1 failed");
        assert_eq!(stats.total(), 9);
    }
}

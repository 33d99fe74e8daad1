use clap::Parser;
use songbook_updater::cache::ChangeCache;
use songbook_updater::config::{self, SongbookConfig};
use songbook_updater::convert::{ConvertError, ExternalConverter, preflight};
use songbook_updater::layout::{LayoutOptions, layout};
use songbook_updater::scan::Library;
use songbook_updater::types::{Chain, Mode, RunOptions, SongFailure};
use songbook_updater::{compose, export, output, process};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "songbook-updater")]
#[command(about = "Render songbook slides and piano scores from MuseScore sources")]
#[command(long_about = "\
Render songbook slides and piano scores from MuseScore sources

Every folder below the base path that holds an info.yml is a song. Songs are
grouped in one-letter bucket folders; the folder name is the song ID.

Song structure:

  base/
  ├── songbook.toml                # Optional config overrides
  └── s/
      └── Stille-Nacht/
          ├── info.yml             # title (required), subtitle, year, composer, …
          ├── projector.mscx       # → projector.pdf → slides/01.svg …
          └── piano.mscx           # → piano/piano.pdf → piano/01.eps …

Only songs whose sources changed since the last run are re-rendered. Full
runs also write songs.json and songs.tex to the base path.

Run 'songbook-updater --gen-config' to print a documented songbook.toml.")]
#[command(version)]
struct Cli {
    /// Base directory of the song collection
    #[arg(long, env = "SONGBOOK_PATH", default_value = ".")]
    base_path: PathBuf,

    /// Only update the projector slides
    #[arg(long, conflicts_with = "piano")]
    slides: bool,

    /// Only update the piano scores
    #[arg(long)]
    piano: bool,

    /// Regenerate everything, ignoring the change cache
    #[arg(long)]
    force: bool,

    /// Process only the song in this folder (implies --force)
    #[arg(long, conflicts_with_all = ["song_id", "list"])]
    folder: Option<PathBuf>,

    /// Process only the song with this ID (implies --force)
    #[arg(long, conflicts_with = "list")]
    song_id: Option<String>,

    /// Restrict the run to the song IDs listed in this file
    #[arg(long)]
    list: Option<PathBuf>,

    /// Delete all generated files and the change cache, then exit
    #[arg(long)]
    clean: bool,

    /// Start a new chapter for every letter in the piano score
    #[arg(long)]
    group_alphabetically: bool,

    /// Pack several songs per page to avoid page turns inside a song
    #[arg(long)]
    page_turn_optimized: bool,

    /// Log debug diagnostics (overridden by RUST_LOG)
    #[arg(long, short)]
    verbose: bool,

    /// Print a stock songbook.toml with all options documented
    #[arg(long)]
    gen_config: bool,
}

impl Cli {
    fn mode(&self) -> Mode {
        match (self.slides, self.piano) {
            (true, _) => Mode::Slides,
            (_, true) => Mode::Piano,
            _ => Mode::All,
        }
    }

    /// Runs narrowed to one song leave the library-wide outputs alone.
    fn single_song(&self) -> bool {
        self.folder.is_some() || self.song_id.is_some()
    }

    fn run_options(&self) -> RunOptions {
        RunOptions {
            mode: self.mode(),
            force: self.force || self.single_song(),
            group_alphabetically: self.group_alphabetically,
            page_turn_optimized: self.page_turn_optimized,
        }
    }
}

fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if cli.gen_config {
        print!("{}", config::stock_config_toml());
        return Ok(ExitCode::SUCCESS);
    }

    let config = config::load_config(&cli.base_path)?;

    if !cli.clean {
        match preflight(&config.converters) {
            Ok(()) => {}
            Err(ConvertError::Unavailable(missing)) => {
                eprintln!("Missing converters:");
                for program in missing {
                    eprintln!("    {program}");
                }
                return Ok(ExitCode::FAILURE);
            }
            Err(err) => return Err(err.into()),
        }
    }

    println!("==> Scanning {}", cli.base_path.display());
    let mut library = Library::scan(&cli.base_path, &config.files)?;
    if let Some(folder) = &cli.folder {
        library.restrict_to_folder(folder)?;
    } else if let Some(song_id) = &cli.song_id {
        library.restrict_to_song_id(song_id)?;
    } else if let Some(list) = &cli.list {
        library.restrict_to_list(list)?;
    }
    output::print_scan_output(&library);

    let cache = ChangeCache::open(library.base_path().join(&config.files.cache));

    if cli.clean {
        library.clean_all(&config.files, &cache)?;
        for line in output::format_clean_output(&library) {
            println!("{}", line);
        }
        return Ok(ExitCode::SUCCESS);
    }

    let options = cli.run_options();
    let mut failures: Vec<SongFailure> = library.failures().to_vec();

    println!("==> Converting");
    init_thread_pool(&config.processing);
    let converter = ExternalConverter::new(&config.converters);
    let (tx, rx) = std::sync::mpsc::channel();
    let printer = std::thread::spawn(move || {
        for event in rx {
            for line in output::format_process_event(&event) {
                println!("{}", line);
            }
        }
    });
    let result = process::process_library(
        &mut library,
        &converter,
        &cache,
        &config.files,
        options,
        Some(tx),
    );
    if printer.join().is_err() {
        warn!("progress printer panicked");
    }
    failures.extend(result.failures);

    if !cli.single_song() {
        write_outputs(&library, &config, options, &mut failures)?;
    }

    output::print_summary(&result.stats, &failures);
    Ok(if failures.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Write the library-wide outputs: the JSON index and, when the run covers
/// piano scores, the TeX document.
///
/// A song that cannot be laid out aborts the document only; it is recorded as
/// a failure and the slides stay untouched.
fn write_outputs(
    library: &Library,
    config: &SongbookConfig,
    options: RunOptions,
    failures: &mut Vec<SongFailure>,
) -> Result<(), Box<dyn std::error::Error>> {
    let base = library.base_path();

    let index_path = base.join(&config.files.json_index);
    export::write_index(library.all(), &index_path)?;
    info!(path = %index_path.display(), "wrote index");

    if !options.mode.includes(Chain::Piano) {
        return Ok(());
    }

    println!("==> Laying out piano scores");
    let layout_options = LayoutOptions::new(&options, config.layout);
    match layout(library.all(), &layout_options) {
        Ok(layout) => {
            output::print_layout_output(&layout);
            let tex_path = base.join(&config.files.tex);
            compose::write_document(&layout, &tex_path)?;
            info!(path = %tex_path.display(), "wrote document");
        }
        Err(err) => {
            warn!("piano document not written: {err}");
            failures.push(SongFailure::new(err.song_id(), Some(Chain::Piano), &err));
        }
    }
    Ok(())
}

/// Install the fmt subscriber. `RUST_LOG` wins over `--verbose`.
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Initialize the rayon thread pool based on processing config.
///
/// Capped at the number of available CPU cores.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}

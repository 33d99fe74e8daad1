//! Songbook configuration.
//!
//! Handles loading, validating and merging `songbook.toml`. The file is
//! optional and lives in the base directory of the song collection; every key
//! has a stock default and user files only override what they need.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [files]
//! metadata = "info.yml"                 # Sidecar that marks a song folder
//! projector = "projector.mscx"          # Source of the slides chain
//! piano = ["piano.mscx", "lead.mscx"]   # Piano chain sources, first found wins
//! projector_pdf = "projector.pdf"       # Intermediate PDF of the slides chain
//! tex = "songs.tex"                     # Typesetting document (base-relative)
//! json_index = "songs.json"             # JSON index (base-relative)
//! cache = "filehashes.json"             # Change cache store (base-relative)
//!
//! [converters]
//! mscore = "mscore"                     # MuseScore: score -> PDF
//! pdf2svg = "pdf2svg"                   # PDF -> one SVG per page
//! pdfinfo = "pdfinfo"                   # Page count of a PDF
//! pdftops = "pdftops"                   # PDF page -> EPS
//! timeout_secs = 300                    # Per invocation; 0 disables
//!
//! [layout]
//! first_page_capacity = 2               # Images on the first printed page
//! page_capacity = 4                     # Images on every other page
//! first_page_per_chapter = false        # Restart first-page rule per chapter
//!
//! [processing]
//! max_processes = 4                     # Parallel songs (omit = CPU cores)
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Name of the optional config file in the base directory.
pub const CONFIG_FILENAME: &str = "songbook.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Songbook configuration loaded from `songbook.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SongbookConfig {
    /// File names inside song folders and in the base directory.
    pub files: FilesConfig,
    /// External renderer executables.
    pub converters: ConvertersConfig,
    /// Page capacities for the piano score.
    pub layout: LayoutConfig,
    /// Parallel processing settings.
    pub processing: ProcessingConfig,
}

impl SongbookConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.layout.page_capacity == 0 {
            return Err(ConfigError::Validation(
                "layout.page_capacity must be at least 1".into(),
            ));
        }
        if self.layout.first_page_capacity == 0
            || self.layout.first_page_capacity > self.layout.page_capacity
        {
            return Err(ConfigError::Validation(
                "layout.first_page_capacity must be between 1 and layout.page_capacity".into(),
            ));
        }
        if self.files.piano.is_empty() {
            return Err(ConfigError::Validation(
                "files.piano must name at least one source file".into(),
            ));
        }
        if self.files.metadata.is_empty() || self.files.projector.is_empty() {
            return Err(ConfigError::Validation(
                "files.metadata and files.projector must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// File names used by the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FilesConfig {
    pub metadata: String,
    pub projector: String,
    /// Candidate piano sources in priority order.
    pub piano: Vec<String>,
    pub projector_pdf: String,
    pub tex: String,
    pub json_index: String,
    pub cache: String,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            metadata: "info.yml".to_string(),
            projector: "projector.mscx".to_string(),
            piano: vec!["piano.mscx".to_string(), "lead.mscx".to_string()],
            projector_pdf: "projector.pdf".to_string(),
            tex: "songs.tex".to_string(),
            json_index: "songs.json".to_string(),
            cache: "filehashes.json".to_string(),
        }
    }
}

/// External renderer settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConvertersConfig {
    pub mscore: String,
    pub pdf2svg: String,
    pub pdfinfo: String,
    pub pdftops: String,
    /// Upper bound for a single renderer invocation, in seconds. `0` waits
    /// forever.
    pub timeout_secs: u64,
}

impl ConvertersConfig {
    /// Every executable the pipeline may spawn, for the pre-flight check.
    pub fn executables(&self) -> Vec<&str> {
        vec![
            self.mscore.as_str(),
            self.pdf2svg.as_str(),
            self.pdfinfo.as_str(),
            self.pdftops.as_str(),
        ]
    }

    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

impl Default for ConvertersConfig {
    fn default() -> Self {
        Self {
            mscore: "mscore".to_string(),
            pdf2svg: "pdf2svg".to_string(),
            pdfinfo: "pdfinfo".to_string(),
            pdftops: "pdftops".to_string(),
            timeout_secs: 300,
        }
    }
}

/// Piano score page capacities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LayoutConfig {
    /// Images on the first printed page of the document.
    pub first_page_capacity: usize,
    /// Images on every following page. Also the most pages one song may have.
    pub page_capacity: usize,
    /// Apply `first_page_capacity` to the first page of every chapter instead
    /// of only the first page of the document.
    pub first_page_per_chapter: bool,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            first_page_capacity: 2,
            page_capacity: 4,
            first_page_per_chapter: false,
        }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of songs converted in parallel.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)`, at least one
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config
        .max_processes
        .map(|n| n.clamp(1, cores))
        .unwrap_or(cores)
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    toml::Value::try_from(SongbookConfig::default())
        .map_err(|e| ConfigError::Validation(format!("stock defaults do not serialize: {e}")))
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load config from `songbook.toml` in the given base directory.
///
/// Merges user values on top of stock defaults, rejects unknown keys, and
/// validates the result. A missing file yields the stock defaults.
pub fn load_config(base_path: &Path) -> Result<SongbookConfig, ConfigError> {
    let config_path = base_path.join(CONFIG_FILENAME);
    let base = stock_defaults_value()?;
    let merged = if config_path.exists() {
        let content = fs::read_to_string(&config_path)?;
        let overlay: toml::Value = toml::from_str(&content)?;
        merge_toml(base, overlay)
    } else {
        base
    };
    let config: SongbookConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Returns a fully-commented stock `songbook.toml`.
///
/// Used by the `--gen-config` flag.
pub fn stock_config_toml() -> &'static str {
    r##"# Songbook Updater Configuration
# ==============================
# Place this file as songbook.toml in the base directory of the song
# collection. All settings are optional; values shown are the defaults.
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# File names
# ---------------------------------------------------------------------------
[files]
# Metadata sidecar. Every folder containing this file is a song folder.
metadata = "info.yml"

# MuseScore source of the projector slides.
projector = "projector.mscx"

# MuseScore sources of the piano score, in priority order.
piano = ["piano.mscx", "lead.mscx"]

# Intermediate PDF written next to the projector source.
projector_pdf = "projector.pdf"

# Outputs written to the base directory.
tex = "songs.tex"
json_index = "songs.json"

# Change cache store (content hashes of the sources).
cache = "filehashes.json"

# ---------------------------------------------------------------------------
# External renderers
# ---------------------------------------------------------------------------
[converters]
mscore = "mscore"
pdf2svg = "pdf2svg"
pdfinfo = "pdfinfo"
pdftops = "pdftops"

# Kill a renderer that runs longer than this many seconds (0 = no limit).
timeout_secs = 300

# ---------------------------------------------------------------------------
# Piano score layout
# ---------------------------------------------------------------------------
[layout]
# Score images that fit on the first printed page.
first_page_capacity = 2

# Score images on every following page. A song may not have more pages.
page_capacity = 4

# Start every alphabetical chapter with the first-page capacity.
first_page_per_chapter = false

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum number of songs converted in parallel.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4
"##
}

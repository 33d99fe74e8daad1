//! Song metadata: the `info.yml` sidecar and its combined display form.
//!
//! Every song folder carries a hand-written YAML sidecar with a small, fixed
//! set of keys:
//!
//! ```yaml
//! alias: I'm sitting here
//! arranger: Josef Friedrich
//! artist: Fools Garden
//! composer: Peter Freudenthaler
//! country: Deutschland
//! genre: Pop
//! lyricist: Volker Hinkel
//! musescore: 4801717
//! source: http://wikifonia.org/node/9928
//! subtitle: A very good song
//! title: Lemon tree
//! year: 1995
//! ```
//!
//! Unknown keys are rejected, so a typo (`composr:`) fails loudly instead of
//! silently dropping the value. `title` is the only required key. Values are
//! scalars; numbers and booleans are read as their text, so `year: 1995` and
//! `year: "1995"` are the same thing for headings. The values as written,
//! numbers included, are kept in [`SongMetadata::raw`] for the JSON index.
//!
//! ## Combined form
//!
//! Printed headings and the JSON index don't show the raw fields. They show
//! four derived lines built by [`SongMetadata::combined`]:
//!
//! | Line | Built from |
//! |---|---|
//! | title | `title (year)` |
//! | subtitle | `subtitle - alias - country` |
//! | composer | `composer, artist, genre` (artist dropped when equal to composer) |
//! | lyricist | `lyricist`, omitted when equal to artist or composer |
//!
//! Empty parts are skipped, so a song with only a title gets three empty lines.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("Cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid metadata in {path}: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("Missing title in {0}")]
    MissingTitle(PathBuf),
}

/// The parsed `info.yml` of one song.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SongMetadata {
    #[serde(default, deserialize_with = "optional_text", skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    #[serde(default, deserialize_with = "optional_text", skip_serializing_if = "Option::is_none")]
    pub arranger: Option<String>,
    #[serde(default, deserialize_with = "optional_text", skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(default, deserialize_with = "optional_text", skip_serializing_if = "Option::is_none")]
    pub composer: Option<String>,
    #[serde(default, deserialize_with = "optional_text", skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
    #[serde(default, deserialize_with = "optional_text", skip_serializing_if = "Option::is_none")]
    pub genre: Option<String>,
    #[serde(default, deserialize_with = "optional_text", skip_serializing_if = "Option::is_none")]
    pub lyricist: Option<String>,
    /// MuseScore score ID or URL.
    #[serde(
        default,
        alias = "musescore-id",
        deserialize_with = "optional_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub musescore: Option<String>,
    #[serde(default, deserialize_with = "optional_text", skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, deserialize_with = "optional_text", skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    #[serde(default, deserialize_with = "required_text")]
    pub title: String,
    #[serde(default, deserialize_with = "optional_text", skip_serializing_if = "Option::is_none")]
    pub year: Option<String>,
    /// Sidecar values as written (`year: 1818` stays a number), keyed as in
    /// the file. Blank and null values are left out.
    #[serde(skip)]
    pub raw: BTreeMap<String, serde_json::Value>,
}

/// The four display lines derived from [`SongMetadata`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CombinedMetadata {
    pub title: String,
    pub subtitle: String,
    pub composer: String,
    pub lyricist: String,
}

impl SongMetadata {
    /// Parse sidecar text. `path` is only used in error messages.
    pub fn parse(content: &str, path: &Path) -> Result<Self, MetadataError> {
        // An empty document is a valid YAML null, not an empty mapping.
        let metadata: SongMetadata = if content.trim().is_empty() {
            SongMetadata::default()
        } else {
            let yaml_error = |e: serde_yaml::Error| MetadataError::Yaml {
                path: path.to_path_buf(),
                source: e,
            };
            let mut metadata: SongMetadata = serde_yaml::from_str(content).map_err(yaml_error)?;
            metadata.raw = raw_values(serde_yaml::from_str(content).map_err(yaml_error)?);
            metadata
        };
        if metadata.title.is_empty() {
            return Err(MetadataError::MissingTitle(path.to_path_buf()));
        }
        Ok(metadata)
    }

    /// Read and parse the sidecar at `path`.
    pub fn load(path: &Path) -> Result<Self, MetadataError> {
        let content = fs::read_to_string(path).map_err(|e| MetadataError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::parse(&content, path)
    }

    pub fn combined(&self) -> CombinedMetadata {
        CombinedMetadata {
            title: self.combined_title(),
            subtitle: join_present(
                &[&self.subtitle, &self.alias, &self.country],
                " - ",
            ),
            composer: self.combined_composer(),
            lyricist: self.combined_lyricist(),
        }
    }

    fn combined_title(&self) -> String {
        match &self.year {
            Some(year) => format!("{} ({})", self.title, year),
            None => self.title.clone(),
        }
    }

    fn combined_composer(&self) -> String {
        if self.artist == self.composer {
            join_present(&[&self.composer, &self.genre], ", ")
        } else {
            join_present(&[&self.composer, &self.artist, &self.genre], ", ")
        }
    }

    fn combined_lyricist(&self) -> String {
        match &self.lyricist {
            Some(lyricist)
                if Some(lyricist) != self.artist.as_ref()
                    && Some(lyricist) != self.composer.as_ref() =>
            {
                lyricist.clone()
            }
            _ => String::new(),
        }
    }
}

fn join_present(parts: &[&Option<String>], separator: &str) -> String {
    parts
        .iter()
        .filter_map(|p| p.as_deref())
        .collect::<Vec<_>>()
        .join(separator)
}

fn raw_values(document: serde_yaml::Value) -> BTreeMap<String, serde_json::Value> {
    let serde_yaml::Value::Mapping(mapping) = document else {
        return BTreeMap::new();
    };
    mapping
        .into_iter()
        .filter_map(|(key, value)| Some((key.as_str()?.to_string(), json_scalar(value)?)))
        .collect()
}

fn json_scalar(value: serde_yaml::Value) -> Option<serde_json::Value> {
    match value {
        serde_yaml::Value::Bool(b) => Some(b.into()),
        serde_yaml::Value::Number(n) => n
            .as_i64()
            .map(serde_json::Value::from)
            .or_else(|| n.as_u64().map(serde_json::Value::from))
            .or_else(|| n.as_f64().and_then(serde_json::Number::from_f64).map(serde_json::Value::Number)),
        serde_yaml::Value::String(s) if !s.trim().is_empty() => Some(s.trim().into()),
        _ => None,
    }
}

/// Any YAML scalar, read as text.
#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Text(String),
    Integer(i64),
    Float(f64),
    Bool(bool),
}

impl Scalar {
    fn into_text(self) -> String {
        match self {
            Scalar::Text(s) => s,
            Scalar::Integer(n) => n.to_string(),
            Scalar::Float(f) => f.to_string(),
            Scalar::Bool(b) => b.to_string(),
        }
    }
}

/// Scalar as trimmed text; null and blank values become `None`.
fn optional_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Scalar>::deserialize(deserializer)?;
    Ok(value
        .map(|v| v.into_text().trim().to_string())
        .filter(|s| !s.is_empty()))
}

fn required_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(optional_text(deserializer)?.unwrap_or_default())
}

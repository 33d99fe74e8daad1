//! TeX markup for the piano score document.
//!
//! Stage 3 of the songbook pipeline. Serializes a [`Layout`] into the
//! `songs.tex` body that the songbook's TeX master file `\input`s. All
//! commands carry a `\tmp` prefix; the master file defines them.
//!
//! ```tex
//!
//!
//! \tmpchapter{S}
//!
//! \tmpheading{Stille Nacht (1818)}
//! \tmpcomposer{Franz Xaver Gruber}
//! \tmplyricist{Joseph Mohr}
//! \tmpimage{s/Stille-Nacht/piano/01.eps}
//! \tmpplaceholder
//! ```
//!
//! - `\tmpchapter` opens each alphabetical bucket (grouped mode only).
//! - Each song gets a `\tmpheading` with its combined title, then
//!   `\tmpsubtitle`, `\tmpcomposer` and `\tmplyricist` lines when non-empty,
//!   then one `\tmpimage` per piano page, relative to the base path.
//! - Each unused slot of a printed page becomes a `\tmpplaceholder`, after
//!   the page's songs.
//!
//! Output depends only on the layout, so identical input gives byte-identical
//! files.

use crate::layout::{Layout, PageGroup};
use crate::scan::Song;
use crate::types::Chain;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ComposeError {
    #[error("Cannot write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// `\tmp<command>{value}` plus newline; `\tmp<command>` alone for an empty
/// value.
fn tex_cmd(command: &str, value: &str) -> String {
    if value.is_empty() {
        format!("\\tmp{command}\n")
    } else {
        format!("\\tmp{command}{{{value}}}\n")
    }
}

/// Escape the TeX special characters in metadata text.
pub fn tex_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\textbackslash{}"),
            '~' => out.push_str("\\textasciitilde{}"),
            '^' => out.push_str("\\textasciicircum{}"),
            '&' | '%' | '$' | '#' | '_' | '{' | '}' => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}

/// Heading, metadata lines and image references for one song.
pub fn render_song(song: &Song) -> String {
    let combined = song.metadata.combined();
    let mut out = String::from("\n");
    out.push_str(&tex_cmd("heading", &tex_escape(&combined.title)));
    for (command, value) in [
        ("subtitle", &combined.subtitle),
        ("composer", &combined.composer),
        ("lyricist", &combined.lyricist),
    ] {
        if !value.is_empty() {
            out.push_str(&tex_cmd(command, &tex_escape(value)));
        }
    }
    for image in song.image_paths(Chain::Piano) {
        out.push_str(&tex_cmd("image", &image));
    }
    out
}

fn render_group(group: &PageGroup) -> String {
    let mut out: String = group.songs.iter().map(|song| render_song(song)).collect();
    for _ in 0..group.placeholders {
        out.push_str(&tex_cmd("placeholder", ""));
    }
    out
}

/// Render the whole document.
pub fn render(layout: &Layout) -> String {
    let mut out = String::new();
    for chapter in &layout.chapters {
        if let Some(bucket) = &chapter.bucket {
            out.push_str("\n\n");
            out.push_str(&tex_cmd("chapter", &tex_escape(&bucket.to_uppercase())));
        }
        for group in &chapter.groups {
            out.push_str(&render_group(group));
        }
    }
    out
}

/// Render and write the document to `path`.
pub fn write_document(layout: &Layout, path: &Path) -> Result<(), ComposeError> {
    fs::write(path, render(layout)).map_err(|e| ComposeError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}

//! CLI output formatting for all pipeline stages.
//!
//! # Information-First Display
//!
//! The primary display for every song is its identity: positional index and
//! title, or song ID where a title would be ambiguous. Paths and file lists are
//! secondary context on indented lines.
//!
//! # Output Format
//!
//! ## Scan
//!
//! ```text
//! Songs
//! A
//!     001 Auf der Mauer, auf der Lauer (1890)
//!         Source: a/Auf-der-Mauer/
//! S
//!     002 Stille Nacht (1818)
//!         Source: s/Stille-Nacht/
//! Found 2 songs
//! ```
//!
//! ## Process
//!
//! ```text
//! Auf-der-Mauer: Auf der Mauer, auf der Lauer (forced)
//!     slides: regenerated (forced): 01.svg, 02.svg
//!     piano: up to date: 01.eps, 02.eps
//! ```
//!
//! ## Layout
//!
//! ```text
//! Chapter A
//!     Page 1 (2/2): Auf-der-Mauer
//! Chapter S
//!     Page 2 (4/4): Swing-low, Stille-Nacht
//! Laid out 3 songs on 2 pages, 0 placeholders
//! ```
//!
//! # Architecture
//!
//! Each stage has a `format_*` function (returns `Vec<String>`) for testability
//! and a `print_*` wrapper that writes to stdout. Format functions are pure:
//! no I/O, no side effects.

use crate::layout::Layout;
use crate::process::{ChainStatus, ProcessEvent, Reason, RunStats};
use crate::scan::Library;
use crate::types::SongFailure;

// ============================================================================
// Shared helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn plural(n: usize, one: &str, many: &str) -> String {
    if n == 1 {
        format!("{n} {one}")
    } else {
        format!("{n} {many}")
    }
}

// ============================================================================
// Stage 1: Scan output
// ============================================================================

/// Format the scanned library grouped by bucket.
pub fn format_scan_output(library: &Library) -> Vec<String> {
    let mut lines = vec!["Songs".to_string()];
    let mut position = 0;
    for (bucket, songs) in library.alphabetical_index() {
        lines.push(bucket.to_uppercase());
        for song in songs {
            position += 1;
            lines.push(format!(
                "{}{} {}",
                indent(1),
                format_index(position),
                song.metadata.combined().title
            ));
            lines.push(format!("{}Source: {}/", indent(2), song.rel_folder));
        }
    }
    lines.push(format!("Found {}", plural(library.len(), "song", "songs")));
    lines
}

/// Print scan output to stdout.
pub fn print_scan_output(library: &Library) {
    for line in format_scan_output(library) {
        println!("{}", line);
    }
}

// ============================================================================
// Stage 2: Process output
// ============================================================================

fn reason_label(reason: Reason) -> &'static str {
    match reason {
        Reason::Forced => "forced",
        Reason::Changed => "changed",
        Reason::Missing => "missing",
    }
}

/// Format a single process progress event as display lines.
pub fn format_process_event(event: &ProcessEvent) -> Vec<String> {
    match event {
        ProcessEvent::SongProcessed {
            song_id,
            title,
            forced,
            outcomes,
        } => {
            let mut header = format!("{}: {}", song_id, title);
            if *forced {
                header.push_str(" (forced)");
            }
            let mut lines = vec![header];
            for outcome in outcomes {
                let status = match &outcome.status {
                    ChainStatus::UpToDate => "up to date".to_string(),
                    ChainStatus::Regenerated(reason) => {
                        format!("regenerated ({})", reason_label(*reason))
                    }
                    ChainStatus::Failed(message) => {
                        lines.push(format!("{}{}: failed: {}", indent(1), outcome.chain, message));
                        continue;
                    }
                };
                if outcome.images.is_empty() {
                    lines.push(format!("{}{}: {}", indent(1), outcome.chain, status));
                } else {
                    lines.push(format!(
                        "{}{}: {}: {}",
                        indent(1),
                        outcome.chain,
                        status,
                        outcome.images.join(", ")
                    ));
                }
            }
            lines
        }
    }
}

// ============================================================================
// Stage 3: Layout output
// ============================================================================

/// Format the piano score layout, one line per printed page.
pub fn format_layout_output(layout: &Layout) -> Vec<String> {
    let mut lines = Vec::new();
    let mut page = 0;
    for chapter in &layout.chapters {
        let depth = match &chapter.bucket {
            Some(bucket) => {
                lines.push(format!("Chapter {}", bucket.to_uppercase()));
                1
            }
            None => 0,
        };
        for group in &chapter.groups {
            page += 1;
            let mut line = format!(
                "{}Page {} ({}/{}): {}",
                indent(depth),
                page,
                group.used(),
                group.capacity,
                group
                    .songs
                    .iter()
                    .map(|s| s.song_id.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            if group.placeholders > 0 {
                line.push_str(&format!(
                    " + {}",
                    plural(group.placeholders, "placeholder", "placeholders")
                ));
            }
            lines.push(line);
        }
    }
    lines.push(format!(
        "Laid out {} on {}, {}",
        plural(layout.song_count(), "song", "songs"),
        plural(page, "page", "pages"),
        plural(layout.placeholder_count(), "placeholder", "placeholders")
    ));
    lines
}

/// Print layout output to stdout.
pub fn print_layout_output(layout: &Layout) {
    for line in format_layout_output(layout) {
        println!("{}", line);
    }
}

// ============================================================================
// Summary
// ============================================================================

/// Format the end-of-run summary: chain counts and every collected failure.
pub fn format_summary(stats: &RunStats, failures: &[SongFailure]) -> Vec<String> {
    let mut lines = vec![format!("Chains: {}", stats)];
    if !failures.is_empty() {
        lines.push(format!(
            "Failed: {}",
            plural(failures.len(), "problem", "problems")
        ));
        for failure in failures {
            lines.push(format!("{}{}", indent(1), failure));
        }
    }
    lines
}

/// Print the end-of-run summary to stdout.
pub fn print_summary(stats: &RunStats, failures: &[SongFailure]) {
    for line in format_summary(stats, failures) {
        println!("{}", line);
    }
}

/// Format the result of a clean run.
pub fn format_clean_output(library: &Library) -> Vec<String> {
    vec![format!(
        "Removed derived files of {} in {}",
        plural(library.len(), "song", "songs"),
        library.base_path().display()
    )]
}

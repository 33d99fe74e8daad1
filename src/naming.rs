//! Page image naming: `NN.ext`, two digits, 1-based.
//!
//! Every chain writes its pages into a working folder as `01.svg`, `02.svg`,
//! … (or `.eps` for the piano chain). The same convention is used when the
//! folder is listed again, so a song's images always come back in page order.
//!
//! ## Ordering
//!
//! Listing sorts by the parsed page number, not by the raw filename, so a
//! score with more than 99 pages (`100.svg`) still sorts after `99.svg`.
//! Files that do not follow the pattern are ignored.

use std::fs;
use std::io;
use std::path::Path;

/// File name of page `number` (1-based) with the given extension.
///
/// - `page_file_name(1, "svg")` → `"01.svg"`
/// - `page_file_name(12, "eps")` → `"12.eps"`
pub fn page_file_name(number: u32, extension: &str) -> String {
    format!("{number:02}.{extension}")
}

/// `printf`-style pattern handed to renderers that number pages themselves
/// (`pdf2svg out/%02d.svg all`).
pub fn page_file_pattern(extension: &str) -> String {
    format!("%02d.{extension}")
}

/// Parse the page number out of an `NN.ext` file name.
///
/// Returns `None` for names with a different extension, a non-numeric stem,
/// or page zero.
pub fn parse_page_number(file_name: &str, extension: &str) -> Option<u32> {
    let stem = file_name.strip_suffix(extension)?.strip_suffix('.')?;
    if stem.is_empty() || !stem.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    stem.parse().ok().filter(|&n| n > 0)
}

/// List the page images in `folder`, in page order.
///
/// A missing folder yields an empty list: the song simply has no images yet.
pub fn list_page_images(folder: &Path, extension: &str) -> io::Result<Vec<String>> {
    let entries = match fs::read_dir(folder) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut pages: Vec<(u32, String)> = entries
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_file())
        .filter_map(|e| {
            let name = e.file_name().to_string_lossy().to_string();
            parse_page_number(&name, extension).map(|n| (n, name))
        })
        .collect();

    pages.sort();
    Ok(pages.into_iter().map(|(_, name)| name).collect())
}

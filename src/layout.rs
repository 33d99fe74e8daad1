//! Piano score pagination.
//!
//! Decides which songs share a printed page in the piano score document.
//! A song's pages are never split: the musician must be able to play it
//! without turning a page.
//!
//! ## Capacities
//!
//! Every printed page holds up to `page_capacity` score pages (4 by default).
//! The very first page of the document holds only `first_page_capacity` (2),
//! because it faces the inside cover. With `first_page_per_chapter`, every
//! chapter starts over with the first page capacity.
//!
//! ## Modes
//!
//! **Unoptimized**: one group per song, in library order, sized exactly to
//! the song. No placeholders.
//!
//! **Page-turn optimized**: greedy largest-fit-first packing. Songs are
//! sorted into buckets by page count (1 to `page_capacity`), keeping library
//! order inside each bucket. Each printed page starts with its full capacity
//! `r` and repeatedly takes the first song of the largest non-empty bucket
//! whose count is ≤ `r`. When nothing fits, the rest of the page becomes
//! blank placeholders and the next page starts.
//!
//! ```text
//! counts 2, 1, 3, 2   capacities 2 | 4 | 4
//!
//! page 1 (cap 2): [2]          placeholders 0
//! page 2 (cap 4): [3] [1]      placeholders 0
//! page 3 (cap 4): [2]          placeholders 2
//! ```
//!
//! With alphabetical grouping the packing runs independently per bucket and
//! each bucket becomes a chapter.

use crate::config::LayoutConfig;
use crate::scan::{Song, alphabetical_index};
use crate::types::RunOptions;
use std::collections::VecDeque;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum LayoutError {
    #[error("Song \"{0}\" has no piano score pages")]
    NoPages(String),
    #[error("Song \"{song_id}\" has {count} piano score pages, at most {max} fit on one page")]
    TooManyPages {
        song_id: String,
        count: usize,
        max: usize,
    },
}

impl LayoutError {
    /// The song that could not be placed.
    pub fn song_id(&self) -> &str {
        match self {
            LayoutError::NoPages(song_id) | LayoutError::TooManyPages { song_id, .. } => song_id,
        }
    }
}

/// Songs placed on one printed page.
#[derive(Debug, Clone, PartialEq)]
pub struct PageGroup<'a> {
    pub songs: Vec<&'a Song>,
    /// Score pages this printed page can hold.
    pub capacity: usize,
    /// Unused slots, rendered as blank placeholders.
    pub placeholders: usize,
}

impl PageGroup<'_> {
    /// Score pages taken by songs.
    pub fn used(&self) -> usize {
        self.songs.iter().map(|s| s.piano_images.len()).sum()
    }
}

/// One alphabetical bucket, or the whole document when ungrouped.
#[derive(Debug, Clone, PartialEq)]
pub struct Chapter<'a> {
    /// Bucket name, `None` when not grouping alphabetically.
    pub bucket: Option<String>,
    pub groups: Vec<PageGroup<'a>>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Layout<'a> {
    pub chapters: Vec<Chapter<'a>>,
}

impl<'a> Layout<'a> {
    pub fn groups(&self) -> impl Iterator<Item = &PageGroup<'a>> {
        self.chapters.iter().flat_map(|c| c.groups.iter())
    }

    pub fn placeholder_count(&self) -> usize {
        self.groups().map(|g| g.placeholders).sum()
    }

    pub fn song_count(&self) -> usize {
        self.groups().map(|g| g.songs.len()).sum()
    }
}

/// How to lay out the document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutOptions {
    pub group_alphabetically: bool,
    pub page_turn_optimized: bool,
    pub capacities: LayoutConfig,
}

impl LayoutOptions {
    pub fn new(run: &RunOptions, capacities: LayoutConfig) -> Self {
        Self {
            group_alphabetically: run.group_alphabetically,
            page_turn_optimized: run.page_turn_optimized,
            capacities,
        }
    }
}

/// Lay out `songs` (in library order) for printing.
///
/// Fails if any song has no piano pages or more than fit on one page.
pub fn layout<'a>(songs: &'a [Song], options: &LayoutOptions) -> Result<Layout<'a>, LayoutError> {
    let max = options.capacities.page_capacity;
    for song in songs {
        let count = song.piano_images.len();
        if count == 0 {
            return Err(LayoutError::NoPages(song.song_id.clone()));
        }
        if count > max {
            return Err(LayoutError::TooManyPages {
                song_id: song.song_id.clone(),
                count,
                max,
            });
        }
    }

    let sections: Vec<(Option<String>, Vec<&'a Song>)> = if options.group_alphabetically {
        alphabetical_index(songs)
            .into_iter()
            .map(|(bucket, songs)| (Some(bucket.to_string()), songs))
            .collect()
    } else {
        vec![(None, songs.iter().collect())]
    };

    let mut paginator = Paginator::new(options.capacities);
    let chapters = sections
        .into_iter()
        .map(|(bucket, songs)| {
            if options.capacities.first_page_per_chapter {
                paginator.first_page = true;
            }
            let groups = if options.page_turn_optimized {
                paginator.pack(&songs)
            } else {
                one_group_per_song(&songs)
            };
            Chapter { bucket, groups }
        })
        .collect();

    Ok(Layout { chapters })
}

fn one_group_per_song<'a>(songs: &[&'a Song]) -> Vec<PageGroup<'a>> {
    songs
        .iter()
        .map(|song| PageGroup {
            songs: vec![*song],
            capacity: song.piano_images.len(),
            placeholders: 0,
        })
        .collect()
}

struct Paginator {
    capacities: LayoutConfig,
    /// The next page produced is a first page.
    first_page: bool,
}

impl Paginator {
    fn new(capacities: LayoutConfig) -> Self {
        Self {
            capacities,
            first_page: true,
        }
    }

    fn next_capacity(&mut self) -> usize {
        if std::mem::take(&mut self.first_page) {
            self.capacities.first_page_capacity
        } else {
            self.capacities.page_capacity
        }
    }

    /// Greedy largest-fit-first packing. Counts are already validated to be
    /// in `1..=page_capacity`; the first page may be the larger one.
    fn pack<'a>(&mut self, songs: &[&'a Song]) -> Vec<PageGroup<'a>> {
        // buckets[n] holds the songs with n pages, in input order.
        let largest_page = self
            .capacities
            .page_capacity
            .max(self.capacities.first_page_capacity);
        let mut buckets: Vec<VecDeque<&'a Song>> = vec![VecDeque::new(); largest_page + 1];
        for song in songs {
            buckets[song.piano_images.len()].push_back(*song);
        }
        let mut left = songs.len();

        let mut groups = Vec::new();
        while left > 0 {
            let capacity = self.next_capacity();
            let mut remaining = capacity;
            let mut page = Vec::new();
            while let Some(count) = (1..=remaining).rev().find(|&n| !buckets[n].is_empty()) {
                if let Some(song) = buckets[count].pop_front() {
                    page.push(song);
                    remaining -= count;
                    left -= 1;
                }
            }
            groups.push(PageGroup {
                songs: page,
                capacity,
                placeholders: remaining,
            });
        }
        groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::song_with_pages;

    fn options(grouped: bool, optimized: bool) -> LayoutOptions {
        LayoutOptions {
            group_alphabetically: grouped,
            page_turn_optimized: optimized,
            capacities: LayoutConfig::default(),
        }
    }

    fn fixture_songs() -> Vec<Song> {
        vec![
            song_with_pages("a", "Auf-der-Mauer", 2),
            song_with_pages("s", "Stille-Nacht", 1),
            song_with_pages("s", "Swing-low", 3),
            song_with_pages("z", "Zum-Tanze-da-geht-ein-Maedel", 2),
        ]
    }

    /// Each chapter as (bucket, [(song ids, capacity, placeholders)]).
    fn shape<'a>(layout: &'a Layout) -> Vec<(Option<&'a str>, Vec<(Vec<&'a str>, usize, usize)>)> {
        layout
            .chapters
            .iter()
            .map(|c| {
                (
                    c.bucket.as_deref(),
                    c.groups
                        .iter()
                        .map(|g| {
                            (
                                g.songs.iter().map(|s| s.song_id.as_str()).collect(),
                                g.capacity,
                                g.placeholders,
                            )
                        })
                        .collect(),
                )
            })
            .collect()
    }

    fn assert_capacity_invariants(layout: &Layout, config: &LayoutConfig) {
        for (i, group) in layout.groups().enumerate() {
            assert_eq!(group.used() + group.placeholders, group.capacity, "page {i}");
            let max = if i == 0 {
                config.first_page_capacity
            } else {
                config.page_capacity
            };
            assert!(group.capacity <= max, "page {i} over capacity");
        }
    }

    // =========================================================================
    // Page-turn optimized
    // =========================================================================

    #[test]
    fn grouped_optimized_fixture_scenario() {
        let songs = fixture_songs();
        let layout = layout(&songs, &options(true, true)).unwrap();
        assert_eq!(
            shape(&layout),
            vec![
                (Some("a"), vec![(vec!["Auf-der-Mauer"], 2, 0)]),
                (Some("s"), vec![(vec!["Swing-low", "Stille-Nacht"], 4, 0)]),
                (Some("z"), vec![(vec!["Zum-Tanze-da-geht-ein-Maedel"], 4, 2)]),
            ]
        );
    }

    #[test]
    fn ungrouped_optimized_packs_across_buckets() {
        let songs = fixture_songs();
        let layout = layout(&songs, &options(false, true)).unwrap();
        assert_eq!(
            shape(&layout),
            vec![(
                None,
                vec![
                    (vec!["Auf-der-Mauer"], 2, 0),
                    (vec!["Swing-low", "Stille-Nacht"], 4, 0),
                    (vec!["Zum-Tanze-da-geht-ein-Maedel"], 4, 2),
                ]
            )]
        );
    }

    #[test]
    fn largest_fitting_song_is_taken_first() {
        let songs = vec![
            song_with_pages("a", "One", 1),
            song_with_pages("b", "Two", 2),
            song_with_pages("c", "Four", 4),
            song_with_pages("d", "Three", 3),
            song_with_pages("e", "OneMore", 1),
        ];
        let layout = layout(&songs, &options(false, true)).unwrap();
        assert_eq!(
            shape(&layout)[0].1,
            vec![
                (vec!["Two"], 2, 0),
                (vec!["Four"], 4, 0),
                (vec!["Three", "One"], 4, 0),
                (vec!["OneMore"], 4, 3),
            ]
        );
    }

    #[test]
    fn ties_keep_library_order() {
        let songs = vec![
            song_with_pages("a", "A2", 2),
            song_with_pages("b", "B2", 2),
            song_with_pages("c", "C2", 2),
        ];
        let layout = layout(&songs, &options(false, true)).unwrap();
        assert_eq!(
            shape(&layout)[0].1,
            vec![(vec!["A2"], 2, 0), (vec!["B2", "C2"], 4, 0)]
        );
    }

    #[test]
    fn first_page_left_blank_when_nothing_fits() {
        let songs = vec![song_with_pages("a", "Big", 4), song_with_pages("b", "Bigger", 3)];
        let layout = layout(&songs, &options(false, true)).unwrap();
        assert_eq!(
            shape(&layout)[0].1,
            vec![
                (vec![], 2, 2),
                (vec!["Big"], 4, 0),
                (vec!["Bigger"], 4, 1),
            ]
        );
    }

    #[test]
    fn first_page_per_chapter_restarts_capacity() {
        let songs = fixture_songs();
        let mut opts = options(true, true);
        opts.capacities.first_page_per_chapter = true;
        let layout = layout(&songs, &opts).unwrap();
        assert_eq!(
            shape(&layout),
            vec![
                (Some("a"), vec![(vec!["Auf-der-Mauer"], 2, 0)]),
                (
                    Some("s"),
                    vec![(vec!["Stille-Nacht"], 2, 1), (vec!["Swing-low"], 4, 1)]
                ),
                (Some("z"), vec![(vec!["Zum-Tanze-da-geht-ein-Maedel"], 2, 0)]),
            ]
        );
    }

    #[test]
    fn capacity_invariants_hold_for_many_mixes() {
        let config = LayoutConfig::default();
        for seed in 0..50u32 {
            let songs: Vec<Song> = (0..(seed % 13 + 1))
                .map(|i| song_with_pages("x", &format!("S{i:02}"), (seed * 7 + i * 3) % 4 + 1))
                .collect();
            let layout = layout(&songs, &options(false, true)).unwrap();
            assert_capacity_invariants(&layout, &config);
            assert_eq!(layout.song_count(), songs.len());
        }
    }

    #[test]
    fn layout_is_deterministic() {
        let songs = fixture_songs();
        let a = layout(&songs, &options(true, true)).unwrap();
        let b = layout(&songs, &options(true, true)).unwrap();
        assert_eq!(a, b);
    }

    // =========================================================================
    // Unoptimized
    // =========================================================================

    #[test]
    fn unoptimized_keeps_order_without_placeholders() {
        let songs = fixture_songs();
        let layout = layout(&songs, &options(false, false)).unwrap();
        assert_eq!(
            shape(&layout)[0].1,
            vec![
                (vec!["Auf-der-Mauer"], 2, 0),
                (vec!["Stille-Nacht"], 1, 0),
                (vec!["Swing-low"], 3, 0),
                (vec!["Zum-Tanze-da-geht-ein-Maedel"], 2, 0),
            ]
        );
        assert_eq!(layout.placeholder_count(), 0);
    }

    #[test]
    fn unoptimized_grouped_has_chapters() {
        let songs = fixture_songs();
        let layout = layout(&songs, &options(true, false)).unwrap();
        let buckets: Vec<_> = layout.chapters.iter().map(|c| c.bucket.as_deref()).collect();
        assert_eq!(buckets, vec![Some("a"), Some("s"), Some("z")]);
        assert_eq!(layout.song_count(), 4);
    }

    // =========================================================================
    // Validation
    // =========================================================================

    #[test]
    fn song_without_pages_is_error() {
        let songs = vec![song_with_pages("a", "Empty", 0)];
        assert_eq!(
            layout(&songs, &options(false, false)).unwrap_err(),
            LayoutError::NoPages("Empty".into())
        );
    }

    #[test]
    fn song_with_too_many_pages_is_error() {
        let songs = vec![song_with_pages("a", "Long", 1), song_with_pages("b", "Longer", 5)];
        let err = layout(&songs, &options(true, true)).unwrap_err();
        assert_eq!(
            err,
            LayoutError::TooManyPages {
                song_id: "Longer".into(),
                count: 5,
                max: 4
            }
        );
        assert_eq!(err.song_id(), "Longer");
    }

    #[test]
    fn first_page_larger_than_later_pages() {
        let songs = vec![
            song_with_pages("a", "Four", 4),
            song_with_pages("b", "Two", 2),
            song_with_pages("c", "Three", 3),
        ];
        let options = LayoutOptions {
            group_alphabetically: false,
            page_turn_optimized: true,
            capacities: LayoutConfig {
                first_page_capacity: 6,
                page_capacity: 4,
                first_page_per_chapter: false,
            },
        };
        let layout = layout(&songs, &options).unwrap();
        assert_eq!(
            shape(&layout),
            vec![(None, vec![(vec!["Four", "Two"], 6, 0), (vec!["Three"], 4, 1)])]
        );
    }

    #[test]
    fn empty_library_has_empty_layout() {
        let layout = layout(&[], &options(false, true)).unwrap();
        assert_eq!(layout.song_count(), 0);
        assert!(layout.chapters[0].groups.is_empty());
    }
}

//! Per-link construction metadata, parallel to the link arena.
//!
//! Links store base word ids and incremental scores; building the lattice
//! additionally needs, per link: the right-context bucket it was created
//! for, the surface word id (to key the right-context tables of its
//! successors), and the absolute path score at creation time. These live in
//! parallel arrays indexed directly by link id.

use crate::types::{LinkId, RcId, Score, WordId};

/// Parallel per-link metadata arrays.
///
/// Arrays are expanded to at least `link id + 1` before any write, so reads
/// of any recorded link id are always in bounds. Reset between utterances
/// without releasing the allocations.
#[derive(Debug, Default)]
pub struct LinkMetadata {
    rc: Vec<RcId>,
    surface_word: Vec<WordId>,
    path_score: Vec<Score>,
}

impl LinkMetadata {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Clear all entries, keeping capacity for the next utterance.
    pub fn reset(&mut self) {
        self.rc.clear();
        self.surface_word.clear();
        self.path_score.clear();
    }

    /// Record metadata for a freshly created link.
    pub fn record(&mut self, link: LinkId, rc: RcId, surface_word: WordId, path_score: Score) {
        self.expand(link.index() + 1);
        self.rc[link.index()] = rc;
        self.surface_word[link.index()] = surface_word;
        self.path_score[link.index()] = path_score;
    }

    /// Right-context bucket recorded for a link.
    pub fn rc(&self, link: LinkId) -> RcId {
        self.rc[link.index()]
    }

    /// Surface word id recorded for a link.
    pub fn surface_word(&self, link: LinkId) -> WordId {
        self.surface_word[link.index()]
    }

    /// Absolute path score recorded for a link.
    pub fn path_score(&self, link: LinkId) -> Score {
        self.path_score[link.index()]
    }

    /// Number of link ids currently covered.
    pub fn len(&self) -> usize {
        self.rc.len()
    }

    /// Check if no links have been recorded.
    pub fn is_empty(&self) -> bool {
        self.rc.is_empty()
    }

    fn expand(&mut self, len: usize) {
        if self.rc.len() < len {
            self.rc.resize(len, RcId::NONE);
            self.surface_word.resize(len, WordId::NONE);
            self.path_score.resize(len, 0);
        }
    }
}

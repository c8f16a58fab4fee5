//! Trait abstractions for the external model collaborators.
//!
//! These traits pin down exactly the surface lattice generation needs from
//! the dictionary and the language model, allowing backend swapping and
//! table-backed test doubles.

use crate::types::{PhoneId, RcId, Score, WordId};

/// A matched n-gram entry: log probability plus the entry's backoff weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NGramEntry {
    /// Log probability of the n-gram, in the model's fixed log domain.
    pub log_prob: Score,

    /// Backoff weight applied when a longer history containing this entry
    /// fails to match.
    pub backoff: Score,
}

/// N-gram language model lookup.
pub trait LanguageModel: Send + Sync {
    /// The model order N. Histories are truncated to N−1 words.
    fn order(&self) -> usize;

    /// Look up the n-gram (head | history), most recent history word first.
    ///
    /// Returns `None` when the model holds no estimate at this exact order;
    /// the caller is expected to back off to a shorter history.
    fn lookup(&self, head: WordId, history: &[WordId]) -> Option<NGramEntry>;
}

/// Pronunciation dictionary with right-context-senone tables.
pub trait Dictionary: Send + Sync {
    /// Map a surface word (pronunciation variant) to its base word id.
    ///
    /// Links store base word ids; the surface id is kept in link metadata
    /// because right-context tables are keyed by the surface pronunciation.
    fn base_word(&self, word: WordId) -> WordId;

    /// Number of phones in the word's pronunciation.
    fn pron_len(&self, word: WordId) -> usize;

    /// First phone of the pronunciation.
    fn first_phone(&self, word: WordId) -> PhoneId;

    /// Last phone of the pronunciation.
    fn last_phone(&self, word: WordId) -> PhoneId;

    /// Second-to-last phone of the pronunciation.
    ///
    /// Only meaningful for words with at least two phones; single-phone
    /// words never participate in right-context matching.
    fn second_last_phone(&self, word: WordId) -> PhoneId;

    /// Right-context bucket of `following` for a word boundary ending in
    /// (`last`, `second_last`).
    fn right_context_bucket(
        &self,
        last: PhoneId,
        second_last: PhoneId,
        following: PhoneId,
    ) -> RcId;
}

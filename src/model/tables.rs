//! Table-backed dictionary and language model implementations.
//!
//! Hash-map implementations of the model traits, suitable for tests and for
//! embedding decoders that load their tables from files.

use std::collections::HashMap;

use tracing::debug;

use crate::model::traits::{Dictionary, LanguageModel, NGramEntry};
use crate::types::{PhoneId, RcId, Score, WordId};

#[derive(Debug, Clone)]
struct Pronunciation {
    base: WordId,
    phones: Vec<PhoneId>,
}

/// Dictionary backed by in-memory pronunciation and context tables.
#[derive(Debug, Default)]
pub struct TableDictionary {
    prons: HashMap<WordId, Pronunciation>,
    /// (last phone, second-to-last phone) → following phone → bucket.
    context_buckets: HashMap<(PhoneId, PhoneId), HashMap<PhoneId, RcId>>,
}

impl TableDictionary {
    /// Create an empty dictionary.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a surface word with its base word id and pronunciation.
    ///
    /// # Panics
    /// Panics if the pronunciation is empty.
    pub fn add_word(&mut self, word: WordId, base: WordId, phones: &[PhoneId]) {
        assert!(!phones.is_empty(), "pronunciation must have at least one phone");
        self.prons.insert(
            word,
            Pronunciation {
                base,
                phones: phones.to_vec(),
            },
        );
    }

    /// Map a following phone to a right-context bucket for word boundaries
    /// ending in (`last`, `second_last`).
    pub fn add_context_bucket(
        &mut self,
        last: PhoneId,
        second_last: PhoneId,
        following: PhoneId,
        bucket: RcId,
    ) {
        self.context_buckets
            .entry((last, second_last))
            .or_default()
            .insert(following, bucket);
    }

    /// Number of words in the dictionary.
    pub fn len(&self) -> usize {
        self.prons.len()
    }

    /// Check if the dictionary is empty.
    pub fn is_empty(&self) -> bool {
        self.prons.is_empty()
    }

    fn pron(&self, word: WordId) -> &Pronunciation {
        self.prons
            .get(&word)
            .unwrap_or_else(|| panic!("word {} not in dictionary", word))
    }
}

impl Dictionary for TableDictionary {
    fn base_word(&self, word: WordId) -> WordId {
        self.pron(word).base
    }

    fn pron_len(&self, word: WordId) -> usize {
        self.pron(word).phones.len()
    }

    fn first_phone(&self, word: WordId) -> PhoneId {
        self.pron(word).phones[0]
    }

    fn last_phone(&self, word: WordId) -> PhoneId {
        *self.pron(word).phones.last().unwrap()
    }

    fn second_last_phone(&self, word: WordId) -> PhoneId {
        let phones = &self.pron(word).phones;
        phones[phones.len().saturating_sub(2)]
    }

    fn right_context_bucket(
        &self,
        last: PhoneId,
        second_last: PhoneId,
        following: PhoneId,
    ) -> RcId {
        self.context_buckets
            .get(&(last, second_last))
            .and_then(|map| map.get(&following))
            .copied()
            .unwrap_or(RcId::NONE)
    }
}

/// N-gram language model backed by an in-memory n-gram table.
#[derive(Debug)]
pub struct TableLanguageModel {
    order: usize,
    ngrams: HashMap<(WordId, Vec<WordId>), NGramEntry>,
}

impl TableLanguageModel {
    /// Create an empty model of the given order.
    pub fn new(order: usize) -> Self {
        Self {
            order,
            ngrams: HashMap::new(),
        }
    }

    /// Add an n-gram (head | history) with its log probability and backoff
    /// weight. History is most recent word first.
    pub fn add_ngram(&mut self, head: WordId, history: &[WordId], log_prob: Score, backoff: Score) {
        debug_assert!(history.len() < self.order);
        self.ngrams
            .insert((head, history.to_vec()), NGramEntry { log_prob, backoff });
    }

    /// Number of n-grams in the model.
    pub fn len(&self) -> usize {
        self.ngrams.len()
    }

    /// Check if the model is empty.
    pub fn is_empty(&self) -> bool {
        self.ngrams.is_empty()
    }
}

impl LanguageModel for TableLanguageModel {
    fn order(&self) -> usize {
        self.order
    }

    fn lookup(&self, head: WordId, history: &[WordId]) -> Option<NGramEntry> {
        let entry = self.ngrams.get(&(head, history.to_vec())).copied();
        debug!(
            "lm lookup head={} n_hist={} -> {}",
            head,
            history.len(),
            if entry.is_some() { "hit" } else { "miss" }
        );
        entry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dictionary_phone_accessors() {
        let mut dict = TableDictionary::new();
        dict.add_word(WordId(7), WordId(7), &[PhoneId(1), PhoneId(2), PhoneId(3)]);
        dict.add_word(WordId(8), WordId(7), &[PhoneId(4)]);

        assert_eq!(dict.pron_len(WordId(7)), 3);
        assert_eq!(dict.first_phone(WordId(7)), PhoneId(1));
        assert_eq!(dict.last_phone(WordId(7)), PhoneId(3));
        assert_eq!(dict.second_last_phone(WordId(7)), PhoneId(2));
        assert_eq!(dict.base_word(WordId(8)), WordId(7));
    }

    #[test]
    fn test_context_bucket_lookup() {
        let mut dict = TableDictionary::new();
        dict.add_context_bucket(PhoneId(3), PhoneId(2), PhoneId(9), RcId::new(4));

        assert_eq!(
            dict.right_context_bucket(PhoneId(3), PhoneId(2), PhoneId(9)),
            RcId::new(4)
        );
        // Unmapped boundaries collapse to the wildcard bucket.
        assert_eq!(
            dict.right_context_bucket(PhoneId(3), PhoneId(2), PhoneId(10)),
            RcId::NONE
        );
    }

    #[test]
    fn test_language_model_lookup() {
        let mut lm = TableLanguageModel::new(3);
        lm.add_ngram(WordId(1), &[WordId(2), WordId(3)], -500, -20);
        lm.add_ngram(WordId(1), &[], -1500, 0);

        let tri = lm.lookup(WordId(1), &[WordId(2), WordId(3)]).unwrap();
        assert_eq!(tri.log_prob, -500);
        assert_eq!(tri.backoff, -20);
        assert!(lm.lookup(WordId(1), &[WordId(9)]).is_none());
        assert_eq!(lm.lookup(WordId(1), &[]).unwrap().log_prob, -1500);
    }
}

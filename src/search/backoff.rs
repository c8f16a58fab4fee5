//! Backed-off language-model state resolution.
//!
//! Given the raw successor history of a node and the head word of an
//! outgoing hypothesis, find the longest history the language model actually
//! has an estimate for, accumulating backoff weights for each order it falls
//! through. The resolved state is always interned through the lattice
//! store's find-or-create table; no caller constructs an LM state directly.

use tracing::trace;

use crate::lattice::LatticeStore;
use crate::model::LanguageModel;
use crate::types::{LmStateId, Score, WordId};

/// Outcome of resolving a raw history against the language model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LmStateResolution {
    /// The deduplicated state at the matched (possibly truncated) history;
    /// epsilon when no order matched.
    pub lmstate: LmStateId,

    /// Log probability of the matched n-gram; zero at epsilon.
    pub lscr: Score,

    /// Backoff weight accumulated over every order that failed to match.
    pub bowt: Score,
}

/// Resolve `(head | history)` to a backed-off LM state.
///
/// `history` is the raw successor history, most recent word first, already
/// truncated to the model's maximum order. Probing starts at the full
/// history length and shortens one word at a time:
///
/// - a hit at length `k` interns the state for `history[..k]` and returns it
///   with the entry's log probability;
/// - a miss accumulates the backoff weight of the history's own `k`-word
///   entry (zero when the model holds none) and retries at `k − 1`;
/// - reaching length 0 yields the epsilon state with `lscr` 0.
///
/// The resolved state's order is therefore never greater than the input
/// history length.
pub fn resolve_lmstate(
    store: &mut LatticeStore,
    lm: &dyn LanguageModel,
    head: WordId,
    history: &[WordId],
) -> LmStateResolution {
    let mut bowt: Score = 0;
    let mut n = history.len();

    while n > 0 {
        if let Some(entry) = lm.lookup(head, &history[..n]) {
            let lmstate = store.find_or_create_lmstate(history[0], &history[1..n]);
            trace!("resolved head={} at order {} lscr={}", head, n, entry.log_prob);
            return LmStateResolution {
                lmstate,
                lscr: entry.log_prob,
                bowt,
            };
        }
        // Back off: charge the weight of the history's own entry.
        if let Some(entry) = lm.lookup(history[0], &history[1..n]) {
            bowt += entry.backoff;
        }
        n -= 1;
    }

    LmStateResolution {
        lmstate: LmStateId::EPSILON,
        lscr: 0,
        bowt,
    }
}

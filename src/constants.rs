//! Domain constants for lattice generation.
//!
//! Compile-time constants used throughout the crate, separated from runtime
//! configuration to keep a clear distinction between values that never
//! change and those that can be configured.

/// Right-context constants.
pub mod context {
    /// Maximum number of right-context buckets an arc can carry.
    ///
    /// Bounded by the width of the presence bitset on [`crate::buffer::WordArc`].
    pub const MAX_RIGHT_CONTEXTS: usize = 64;
}

/// Lattice storage constants.
pub mod lattice {
    /// Default node arena capacity reserved per utterance.
    pub const DEFAULT_NODE_CAPACITY: usize = 1024;

    /// Default link arena capacity reserved per utterance.
    pub const DEFAULT_LINK_CAPACITY: usize = 4096;
}

/// Score domain constants.
pub mod score {
    use crate::types::Score;

    /// Worst representable path score.
    ///
    /// Half of `i32::MIN` so that additive combination cannot wrap.
    pub const WORST: Score = i32::MIN / 2;
}

//! Custom error types for lattice generation.
//!
//! This module provides a centralized error handling system using the
//! `thiserror` crate to define structured, typed errors with clear messages.
//!
//! The taxonomy is deliberately small: a setup failure aborts the current
//! utterance only, an integrity violation is fatal for the utterance and is
//! never silently recovered, and allocation failure is left to abort the
//! process. No retries happen inside the core; an enclosing session may
//! retry a whole utterance.

use thiserror::Error;

/// Primary error type for lattice generation.
#[derive(Debug, Error)]
pub enum LatticeError {
    /// The arc buffer never reached start-of-utterance.
    ///
    /// Aborts the current utterance; no partial lattice is published.
    #[error("utterance setup failed: {0}")]
    SetupFailure(String),

    /// The acoustic decoder's context expansion and the lattice's recorded
    /// right contexts have diverged: a non-initial node has no
    /// context-matching incoming link. Continuing would corrupt the lattice.
    #[error("lattice integrity violation: {0}")]
    IntegrityViolation(String),

    /// A bounded wait on the arc buffer expired.
    #[error("operation timeout: {0}")]
    Timeout(String),

    /// Errors from invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Convenience type alias for Results with LatticeError.
pub type Result<T> = std::result::Result<T, LatticeError>;

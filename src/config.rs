//! Runtime configuration for lattice generation.
//!
//! Configuration is loaded from multiple layered sources: built-in defaults,
//! an optional `latgen.toml` file, and `LATGEN_`-prefixed environment
//! variables, with later sources taking precedence.

use std::path::Path;
use std::time::Duration;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::constants::context::MAX_RIGHT_CONTEXTS;
use crate::constants::lattice::{DEFAULT_LINK_CAPACITY, DEFAULT_NODE_CAPACITY};
use crate::error::{LatticeError, Result};

// Default value functions for serde defaults
fn default_max_right_contexts() -> usize {
    MAX_RIGHT_CONTEXTS
}
fn default_node_capacity() -> usize {
    DEFAULT_NODE_CAPACITY
}
fn default_link_capacity() -> usize {
    DEFAULT_LINK_CAPACITY
}

/// Lattice generation configuration loaded from multiple sources.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatgenConfig {
    /// Number of right-context buckets the arc buffer distinguishes.
    #[serde(default = "default_max_right_contexts")]
    pub max_right_contexts: usize,

    /// Node arena capacity reserved at the start of each utterance.
    #[serde(default = "default_node_capacity")]
    pub node_capacity: usize,

    /// Link arena capacity reserved at the start of each utterance.
    #[serde(default = "default_link_capacity")]
    pub link_capacity: usize,

    /// Seconds to wait for the start-of-utterance signal.
    ///
    /// `None` blocks indefinitely, which is the production behavior; tests
    /// use a bounded wait to observe setup failures.
    #[serde(default)]
    pub start_utt_timeout_secs: Option<u64>,
}

impl Default for LatgenConfig {
    fn default() -> Self {
        Self {
            max_right_contexts: default_max_right_contexts(),
            node_capacity: default_node_capacity(),
            link_capacity: default_link_capacity(),
            start_utt_timeout_secs: None,
        }
    }
}

impl LatgenConfig {
    /// Load configuration with precedence:
    /// 1. Environment variables prefixed with `LATGEN_` (highest priority)
    /// 2. `latgen.toml` (if it exists)
    /// 3. Built-in defaults (lowest priority)
    pub fn load() -> Result<Self> {
        let config: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file("latgen.toml"))
            .merge(Env::prefixed("LATGEN_"))
            .extract()
            .map_err(|e| LatticeError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific TOML file, with environment
    /// variables still taking precedence.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("LATGEN_"))
            .extract()
            .map_err(|e| LatticeError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// The start-of-utterance wait as a [`Duration`], `None` = indefinite.
    pub fn start_utt_timeout(&self) -> Option<Duration> {
        self.start_utt_timeout_secs.map(Duration::from_secs)
    }

    fn validate(&self) -> Result<()> {
        if self.max_right_contexts == 0 || self.max_right_contexts > MAX_RIGHT_CONTEXTS {
            return Err(LatticeError::Config(format!(
                "max_right_contexts {} out of range (1..={})",
                self.max_right_contexts, MAX_RIGHT_CONTEXTS
            )));
        }
        Ok(())
    }
}

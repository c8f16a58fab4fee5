//! The lattice-generation search pass.
//!
//! A frame-synchronous consumer over the arc buffer: the decode driver
//! drains each frame's word-transition hypotheses and the link/node builder
//! expands them into deduplicated lattice nodes and links, resolving
//! language-model states through the backoff resolver and pruning incoming
//! links that no surviving right context continues.

mod backoff;
mod builder;
mod driver;

pub use backoff::{resolve_lmstate, LmStateResolution};
pub use builder::{expand_frame, ExpansionWorkspace};
pub use driver::{DecodedUtterance, LatticeDecoder};

//! External model collaborators.
//!
//! Lattice generation consults two external knowledge sources: the
//! pronunciation dictionary (with its right-context-senone tables) and the
//! n-gram language model. Both are abstracted behind traits so the search
//! pass stays decoupled from any particular model storage; table-backed
//! implementations are provided for tests and embedding.

mod tables;
mod traits;

pub use tables::{TableDictionary, TableLanguageModel};
pub use traits::{Dictionary, LanguageModel, NGramEntry};

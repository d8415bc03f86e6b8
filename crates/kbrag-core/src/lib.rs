//! kbrag-core
//!
//! Shared domain types, error taxonomy, configuration, collaborator traits and
//! the corpus indexer that turns a directory of markdown documents into an
//! immutable `Corpus`.
#![deny(unused_variables)]

pub mod config;
pub mod corpus;
pub mod error;
pub mod normalize;
pub mod traits;
pub mod types;

pub use corpus::{Corpus, CorpusBuilder};
pub use error::{Error, Result};

//! kbrag-text
//!
//! In-memory Tantivy BM25 index over chunk text plus alias text. See `index`
//! for the ranking entry point and `tantivy_utils` for schema and analyzer.

pub mod index;
pub mod tantivy_utils;

pub use index::LexicalIndex;

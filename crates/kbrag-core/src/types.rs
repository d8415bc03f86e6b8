//! Domain types shared by the corpus indexer and both search engines.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub type ChunkId = String;

/// Call-to-action hints carried through to presentation untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CtaHints {
    pub action: Option<String>,
    pub text: Option<String>,
    pub link: Option<String>,
}

/// One retrievable section of a source document.
///
/// - `id`: `file#section_id`, `file#section_id/<sub-slug>` or `file#section_id/preamble`
/// - `title`: document title, `heading`: the `##` heading, `subsection`: the `###` heading if any
/// - `text`: section body with alias annotations removed
/// - `index_text`: the boosted text both indices are built from (headings, aliases, body)
/// - `verbatim`: downstream must quote `text` as-is
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub file: String,
    pub section_id: String,
    pub subsection: Option<String>,
    pub title: String,
    pub heading: String,
    pub text: String,
    pub index_text: String,
    pub topic: String,
    pub doc_type: String,
    pub section_aliases: BTreeSet<String>,
    pub criticality: String,
    pub tone: String,
    pub emotion: Option<String>,
    pub verbatim: bool,
    pub cta: CtaHints,
}

impl Chunk {
    /// Part of the id after `#`; what alias entries point at.
    pub fn anchor(&self) -> &str {
        self.id.split_once('#').map_or(self.id.as_str(), |(_, anchor)| anchor)
    }
}

/// Target of a normalized alias key.
///
/// `section_id` is a chunk anchor: a bare section id resolves to the first
/// chunk of that section, `section/sub` resolves to a subsection chunk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AliasEntry {
    pub topic: String,
    pub file: String,
    pub section_id: String,
}

/// A named catalog item, e.g. one treatment variant in a price list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EntityEntry {
    pub topic: String,
    pub entity_key: String,
    pub doc_id: String,
    pub section_title: String,
    pub chunk_id: ChunkId,
}

/// Per-document theme metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentMeta {
    pub file: String,
    pub topic: String,
    pub doc_type: String,
    pub title: String,
    pub aliases: Vec<String>,
    pub tags: Vec<String>,
    pub chunk_ids: Vec<ChunkId>,
}

/// Why a source file did not make it into the corpus.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum SkipReason {
    IndexLike,
    TooShort,
    Empty,
    Unreadable(String),
    Malformed(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedDocument {
    pub file: String,
    pub reason: SkipReason,
}

/// Indicates which engine produced a result.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SourceKind {
    Vector,
    Text,
}

/// The minimal surface returned by both engines.
///
/// `id` matches `Chunk::id`. `score` is engine-specific (BM25 or cosine) but
/// higher is always better.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub id: ChunkId,
    pub score: f32,
    pub source: SourceKind,
}

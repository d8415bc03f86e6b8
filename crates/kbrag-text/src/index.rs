use anyhow::Result;
use std::sync::Arc;
use tantivy::collector::TopDocs;
use tantivy::query::QueryParser;
use tantivy::schema::{Field, Value};
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument};

use kbrag_core::normalize::{normalize, normalize_query};
use kbrag_core::types::{Chunk, SearchHit, SourceKind};

use crate::tantivy_utils::{build_schema, register_tokenizer};

/// BM25 index over `Chunk::index_text`, held entirely in RAM.
///
/// Written by a single indexing thread into one segment, so document order
/// (and therefore tie order) is the chunk build order.
pub struct LexicalIndex {
	index: Index,
	reader: IndexReader,
	id_field: Field,
	text_field: Field,
	len: usize,
}

impl LexicalIndex {
	pub fn build(chunks: &[Arc<Chunk>]) -> Result<Self> {
		let schema = build_schema();
		let index = Index::create_in_ram(schema.clone());
		register_tokenizer(&index);
		let id_field = schema.get_field("id")?;
		let text_field = schema.get_field("text")?;

		let mut writer: IndexWriter = index.writer_with_num_threads(1, 50_000_000)?;
		for c in chunks {
			writer.add_document(doc!(
				id_field => c.id.clone(),
				text_field => normalize(&c.index_text),
			))?;
		}
		writer.commit()?;
		let reader = index.reader_builder().reload_policy(ReloadPolicy::Manual).try_into()?;
		tracing::debug!(docs = chunks.len(), "lexical index built");
		Ok(Self { index, reader, id_field, text_field, len: chunks.len() })
	}

	pub fn len(&self) -> usize { self.len }

	pub fn is_empty(&self) -> bool { self.len == 0 }

	/// Up to `k` chunks with a positive BM25 score, best first.
	pub fn score(&self, query: &str, k: usize) -> Result<Vec<SearchHit>> {
		if k == 0 || self.is_empty() { return Ok(Vec::new()); }
		let cleaned = sanitize(&normalize_query(query));
		if cleaned.is_empty() { return Ok(Vec::new()); }

		let parser = QueryParser::for_index(&self.index, vec![self.text_field]);
		let (parsed, errors) = parser.parse_query_lenient(&cleaned);
		if !errors.is_empty() { tracing::debug!(?errors, query = %cleaned, "lenient query parse"); }

		let searcher = self.reader.searcher();
		let top_docs = searcher.search(&*parsed, &TopDocs::with_limit(k))?;
		let mut hits = Vec::with_capacity(top_docs.len());
		for (score, addr) in top_docs {
			if score <= 0.0 { continue; }
			let stored: TantivyDocument = searcher.doc(addr)?;
			let Some(id) = stored.get_first(self.id_field).and_then(|v| v.as_str()) else { continue };
			hits.push(SearchHit { id: id.to_string(), score, source: SourceKind::Text });
		}
		Ok(hits)
	}
}

/// Keeps letters, digits and spaces so user punctuation never turns into
/// query syntax (field prefixes, exclusions, phrases).
fn sanitize(query: &str) -> String {
	query
		.chars()
		.map(|c| if c.is_alphanumeric() { c } else { ' ' })
		.collect::<String>()
		.split_whitespace()
		.collect::<Vec<_>>()
		.join(" ")
}

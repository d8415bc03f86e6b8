//! kbrag-vector
//!
//! Cosine nearest-neighbour search over chunk embeddings. Two backends share
//! one ordering contract (score descending, ties by build order): an exact
//! in-memory scan and a LanceDB table (feature `lance`).

pub mod brute;
#[cfg(feature = "lance")]
pub mod lance;
#[cfg(feature = "lance")]
pub mod schema;

use anyhow::{bail, Result};
use std::sync::Arc;
use std::time::Instant;

use kbrag_core::config::VectorBackendKind;
use kbrag_core::traits::Embedder;
use kbrag_core::types::{Chunk, SearchHit};

pub use brute::BruteForceIndex;
#[cfg(feature = "lance")]
pub use lance::LanceIndex;

const EMBED_BATCH: usize = 32;

pub enum VectorIndex {
	BruteForce(BruteForceIndex),
	#[cfg(feature = "lance")]
	Lance(LanceIndex),
}

impl VectorIndex {
	/// `Auto` prefers LanceDB and falls back to the scan if the table cannot be built.
	pub async fn build(ids: Vec<String>, vectors: Vec<Vec<f32>>, dim: usize, kind: VectorBackendKind) -> Result<Self> {
		if ids.len() != vectors.len() { bail!("{} ids but {} vectors", ids.len(), vectors.len()); }
		if let Some(bad) = vectors.iter().position(|v| v.len() != dim) { bail!("vector for '{}' has {} dims, expected {dim}", ids[bad], vectors[bad].len()); }
		match kind {
			VectorBackendKind::BruteForce => Ok(Self::BruteForce(BruteForceIndex::build(ids, vectors, dim)?)),
			#[cfg(feature = "lance")]
			VectorBackendKind::Lance => Ok(Self::Lance(LanceIndex::build(ids, vectors, dim).await?)),
			#[cfg(feature = "lance")]
			VectorBackendKind::Auto => match LanceIndex::build(ids.clone(), vectors.clone(), dim).await {
				Ok(index) => Ok(Self::Lance(index)),
				Err(err) => {
					tracing::warn!(error = %err, "lance backend unavailable, using brute-force scan");
					Ok(Self::BruteForce(BruteForceIndex::build(ids, vectors, dim)?))
				}
			},
			#[cfg(not(feature = "lance"))]
			VectorBackendKind::Lance => bail!("vector backend 'lance' requested but the crate was built without the `lance` feature"),
			#[cfg(not(feature = "lance"))]
			VectorBackendKind::Auto => Ok(Self::BruteForce(BruteForceIndex::build(ids, vectors, dim)?)),
		}
	}

	/// Embeds every chunk's `index_text` in batches and builds the index.
	pub async fn from_chunks(chunks: &[Arc<Chunk>], embedder: Arc<dyn Embedder>, kind: VectorBackendKind) -> Result<Self> {
		let start = Instant::now();
		let ids: Vec<String> = chunks.iter().map(|c| c.id.clone()).collect();
		let texts: Vec<String> = chunks.iter().map(|c| c.index_text.clone()).collect();
		let dim = embedder.dim();
		let vectors = tokio::task::spawn_blocking(move || -> Result<Vec<Vec<f32>>> {
			let mut out = Vec::with_capacity(texts.len());
			for (i, batch) in texts.chunks(EMBED_BATCH).enumerate() {
				out.extend(embedder.embed_batch(batch)?);
				tracing::debug!(done = out.len(), total = texts.len(), batch = i + 1, "embedded chunks");
			}
			Ok(out)
		}).await??;
		let index = Self::build(ids, vectors, dim, kind).await?;
		tracing::info!(chunks = index.len(), backend = index.backend(), elapsed_ms = start.elapsed().as_millis() as u64, "vector index built");
		Ok(index)
	}

	pub fn backend(&self) -> &'static str {
		match self {
			Self::BruteForce(_) => "brute_force",
			#[cfg(feature = "lance")]
			Self::Lance(_) => "lance",
		}
	}

	pub fn len(&self) -> usize {
		match self {
			Self::BruteForce(i) => i.len(),
			#[cfg(feature = "lance")]
			Self::Lance(i) => i.len(),
		}
	}

	pub fn is_empty(&self) -> bool { self.len() == 0 }

	pub fn dim(&self) -> usize {
		match self {
			Self::BruteForce(i) => i.dim(),
			#[cfg(feature = "lance")]
			Self::Lance(i) => i.dim(),
		}
	}

	/// Up to `k` hits, cosine score descending.
	pub async fn nearest(&self, query: &[f32], k: usize) -> Result<Vec<SearchHit>> {
		if query.len() != self.dim() { bail!("query vector has {} dims, index has {}", query.len(), self.dim()); }
		match self {
			Self::BruteForce(i) => Ok(i.nearest(query, k)),
			#[cfg(feature = "lance")]
			Self::Lance(i) => i.nearest(query, k).await,
		}
	}
}

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, PoisonError, RwLock};

use kbrag_core::config::RetrievalConfig;
use kbrag_core::traits::Embedder;
use kbrag_core::Corpus;
use kbrag_text::LexicalIndex;
use kbrag_vector::VectorIndex;

use crate::fastpath::{resolve_default, FastPathMatcher};
use crate::router::ThemeRouter;

/// Everything a query reads, built together and never mutated afterwards.
pub struct IndexSnapshot {
    pub corpus: Corpus,
    pub lexical: LexicalIndex,
    /// Absent when the corpus could not be embedded; queries run lexical-only.
    pub vector: Option<VectorIndex>,
    pub router: ThemeRouter,
    pub fast_path: FastPathMatcher,
    pub built_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SnapshotInfo {
    pub fingerprint: String,
    pub built_at: DateTime<Utc>,
    pub documents: usize,
    pub chunks: usize,
    pub alias_keys: usize,
    pub entity_keys: usize,
    pub skipped: Vec<String>,
    pub vector_backend: Option<&'static str>,
}

impl IndexSnapshot {
    pub async fn build(corpus: Corpus, config: &RetrievalConfig, embedder: Option<Arc<dyn Embedder>>) -> Result<Self> {
        let lexical = LexicalIndex::build(corpus.chunks())?;
        let vector = match embedder {
            Some(embedder) if !corpus.is_empty() => match VectorIndex::from_chunks(corpus.chunks(), embedder, config.vector.backend).await {
                Ok(index) => Some(index),
                Err(err) => {
                    tracing::warn!(error = %err, "vector index unavailable, queries will be lexical-only");
                    None
                }
            },
            _ => None,
        };
        let router = ThemeRouter::new(&config.themes);
        for (topic, target) in router.default_targets() {
            if resolve_default(&corpus, target).is_none() {
                tracing::warn!(topic, file = %target.file, section = ?target.section_id, "theme default target does not resolve");
            }
        }
        let fast_path = FastPathMatcher::new(&corpus, &config.fast_path);
        let snapshot = Self { corpus, lexical, vector, router, fast_path, built_at: Utc::now() };
        let info = snapshot.info();
        tracing::info!(
            documents = info.documents,
            chunks = info.chunks,
            aliases = info.alias_keys,
            entities = info.entity_keys,
            backend = info.vector_backend.unwrap_or("none"),
            fingerprint = %info.fingerprint,
            "snapshot built"
        );
        Ok(snapshot)
    }

    pub fn info(&self) -> SnapshotInfo {
        SnapshotInfo {
            fingerprint: self.corpus.fingerprint().to_string(),
            built_at: self.built_at,
            documents: self.corpus.documents().len(),
            chunks: self.corpus.len(),
            alias_keys: self.corpus.aliases().len(),
            entity_keys: self.corpus.entities().len(),
            skipped: self.corpus.skipped().iter().map(|s| s.file.clone()).collect(),
            vector_backend: self.vector.as_ref().map(VectorIndex::backend),
        }
    }
}

/// Current snapshot behind a single swappable reference. Readers clone the
/// `Arc` and drop the lock at once, so in-flight queries keep the snapshot
/// they started with.
pub struct SnapshotHandle {
    current: RwLock<Arc<IndexSnapshot>>,
}

impl SnapshotHandle {
    pub fn new(snapshot: IndexSnapshot) -> Self {
        Self { current: RwLock::new(Arc::new(snapshot)) }
    }

    pub fn current(&self) -> Arc<IndexSnapshot> {
        Arc::clone(&self.current.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Publishes `next` and returns the snapshot it replaced.
    pub fn swap(&self, next: IndexSnapshot) -> Arc<IndexSnapshot> {
        let next = Arc::new(next);
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, next)
    }
}

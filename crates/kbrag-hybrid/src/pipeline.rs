use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use kbrag_core::config::RetrievalConfig;
use kbrag_core::traits::{Embedder, Paraphraser, RelevanceClassifier};
use kbrag_core::types::{CtaHints, SearchHit};
use kbrag_core::{Corpus, CorpusBuilder};

use crate::candidate::{Candidate, CandidateOrigin, FastPathKind, ScoreBreakdown};
use crate::expander::QueryExpander;
use crate::fusion::{fuse_variant, FusedHit, Fusion, JumpTarget};
use crate::guard::{GuardDecision, LowRelevance, RelevanceGuard, LOW_RELEVANCE};
use crate::rerank::{RerankContext, Reranker};
use crate::router::ThemeClassification;
use crate::snapshot::{IndexSnapshot, SnapshotHandle, SnapshotInfo};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default)]
    pub theme_hint: Option<String>,
    #[serde(default)]
    pub jump: Option<Jump>,
}

impl QueryRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self { query: query.into(), ..Self::default() }
    }
}

/// Navigation target the caller wants favoured; it boosts, never filters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Jump {
    pub topic: String,
    pub section_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Passage {
    pub chunk_id: String,
    pub file: String,
    pub title: String,
    pub heading: String,
    pub subsection: Option<String>,
    pub text: String,
    pub topic: String,
    pub doc_type: String,
    pub verbatim: bool,
    pub cta: CtaHints,
    pub origin: CandidateOrigin,
    pub pinned: bool,
    pub scores: ScoreBreakdown,
}

impl From<Candidate> for Passage {
    fn from(c: Candidate) -> Self {
        let chunk = c.chunk;
        Self {
            chunk_id: chunk.id.clone(),
            file: chunk.file.clone(),
            title: chunk.title.clone(),
            heading: chunk.heading.clone(),
            subsection: chunk.subsection.clone(),
            text: chunk.text.clone(),
            topic: chunk.topic.clone(),
            doc_type: chunk.doc_type.clone(),
            verbatim: chunk.verbatim,
            cta: chunk.cta.clone(),
            origin: c.origin,
            pinned: c.pinned,
            scores: c.scores,
        }
    }
}

/// Ranked evidence plus the accept/reject decision.
///
/// An empty `passages` list means nothing is indexed; `notice` is set
/// whenever the decision is a rejection.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievalResult {
    pub query: String,
    pub passages: Vec<Passage>,
    pub decision: GuardDecision,
    pub notice: Option<LowRelevance>,
    pub themes: Vec<String>,
    pub classification: Option<ThemeClassification>,
    pub variants: Vec<String>,
    pub fast_path: Option<FastPathKind>,
    pub reranked: bool,
    pub snapshot: String,
    pub elapsed_ms: u64,
}

/// Optional external collaborators. Each missing one disables its stage.
#[derive(Default, Clone)]
pub struct Collaborators {
    pub embedder: Option<Arc<dyn Embedder>>,
    pub paraphraser: Option<Arc<dyn Paraphraser>>,
    pub classifier: Option<Arc<dyn RelevanceClassifier>>,
}

pub struct RetrievalPipeline {
    snapshots: SnapshotHandle,
    config: RetrievalConfig,
    embedder: Option<Arc<dyn Embedder>>,
    expander: QueryExpander,
    reranker: Reranker,
    guard: RelevanceGuard,
}

impl RetrievalPipeline {
    pub fn new(snapshot: IndexSnapshot, config: RetrievalConfig, collaborators: Collaborators) -> Self {
        let Collaborators { embedder, paraphraser, classifier } = collaborators;
        Self {
            snapshots: SnapshotHandle::new(snapshot),
            expander: QueryExpander::new(paraphraser, config.expansion.clone()),
            reranker: Reranker::new(classifier, config.rerank.clone()),
            guard: RelevanceGuard::new(config.guard.clone()),
            embedder,
            config,
        }
    }

    /// Builds the first snapshot from `corpus` and wires the stages.
    pub async fn from_corpus(corpus: Corpus, config: RetrievalConfig, collaborators: Collaborators) -> Result<Self> {
        let snapshot = IndexSnapshot::build(corpus, &config, collaborators.embedder.clone()).await?;
        Ok(Self::new(snapshot, config, collaborators))
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    pub fn snapshot(&self) -> Arc<IndexSnapshot> {
        self.snapshots.current()
    }

    /// Builds a full new snapshot beside the current one and swaps it in.
    /// On error the current snapshot stays.
    pub async fn reload(&self, corpus: Corpus) -> Result<SnapshotInfo> {
        let next = IndexSnapshot::build(corpus, &self.config, self.embedder.clone()).await?;
        let info = next.info();
        let previous = self.snapshots.swap(next);
        let changed = previous.corpus.fingerprint() != info.fingerprint;
        tracing::info!(changed, fingerprint = %info.fingerprint, "snapshot swapped");
        Ok(info)
    }

    pub async fn reload_from_dir(&self, dir: &Path) -> Result<SnapshotInfo> {
        let corpus = CorpusBuilder::new(&self.config.corpus)?.build_from_dir(dir)?;
        self.reload(corpus).await
    }

    /// Never fails: collaborator errors degrade their stage and a weak
    /// result comes back rejected.
    pub async fn retrieve(&self, request: &QueryRequest) -> RetrievalResult {
        let start = Instant::now();
        let snap = self.snapshots.current();
        let query = request.query.trim();

        let mut detected = snap.router.detect(query);
        if let Some(hint) = request.theme_hint.as_deref().map(str::trim).filter(|h| !h.is_empty()) {
            detected.insert(hint.to_string());
        }
        let classification = snap.router.classify(query);

        let fast = snap.fast_path.lookup(&snap.corpus, &snap.router, &detected, query);
        let fast_kind = fast.as_ref().map(|h| h.kind);
        if let Some(hit) = &fast {
            tracing::debug!(kind = ?hit.kind, key = %hit.key, chunk = %hit.chunk.id, pinned = hit.pinned, "fast path hit");
        }
        let variants = if fast.is_some() || query.is_empty() { vec![query.to_string()] } else { self.expander.expand(query).await };

        let fused = self.search_variants(&snap, &variants).await;
        let seed: Vec<Candidate> = fast.into_iter().map(|hit| hit.into_candidate(snap.fast_path.config(), 0)).collect();
        let jump = request.jump.as_ref().and_then(|j| {
            let target = JumpTarget::resolve(&snap.corpus, &j.topic, &j.section_id);
            if target.is_none() { tracing::debug!(topic = %j.topic, section = %j.section_id, "jump target not found"); }
            target
        });
        let fusion = Fusion { config: &self.config.fusion, corpus: &snap.corpus, router: &snap.router };
        let pool = fusion.pool(seed, fused, &detected, jump.as_ref());

        let context = RerankContext { referenced_files: snap.fast_path.referenced_files(&snap.corpus, query), detected: detected.clone() };
        let (ranked, reranked) = self.reranker.rerank(query, &context, pool).await;
        let decision = self.guard.decide(&ranked);
        let passages: Vec<Passage> = ranked.into_iter().take(self.config.top_k).map(Passage::from).collect();

        let elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        tracing::info!(
            query = %query,
            passages = passages.len(),
            accepted = decision.accepted,
            confidence = decision.confidence,
            bypass = ?decision.bypass_reason,
            elapsed_ms,
            "query served"
        );
        RetrievalResult {
            query: query.to_string(),
            passages,
            notice: (!decision.accepted).then_some(LOW_RELEVANCE),
            decision,
            themes: detected.into_iter().collect(),
            classification,
            variants,
            fast_path: fast_kind,
            reranked,
            snapshot: snap.corpus.fingerprint().to_string(),
            elapsed_ms,
        }
    }

    async fn search_variants(&self, snap: &IndexSnapshot, variants: &[String]) -> Vec<Vec<FusedHit>> {
        let k = self.config.fusion.search_top_n;
        let vectors = self.embed_variants(snap, variants).await;
        let mut out = Vec::with_capacity(variants.len());
        for (i, variant) in variants.iter().enumerate() {
            let lexical = snap.lexical.score(variant, k).unwrap_or_else(|err| {
                tracing::warn!(error = %err, variant = %variant, "lexical search failed");
                Vec::new()
            });
            let vector: Vec<SearchHit> = match (&snap.vector, vectors.as_ref().and_then(|v| v.get(i))) {
                (Some(index), Some(q)) => index.nearest(q, k).await.unwrap_or_else(|err| {
                    tracing::warn!(error = %err, "vector search failed, lexical-only for this variant");
                    Vec::new()
                }),
                _ => Vec::new(),
            };
            out.push(fuse_variant(&lexical, &vector, &self.config.fusion));
        }
        out
    }

    /// Query embeddings for all variants, or `None` when there is no vector
    /// index, no embedder, or embedding fails or times out.
    async fn embed_variants(&self, snap: &IndexSnapshot, variants: &[String]) -> Option<Vec<Vec<f32>>> {
        snap.vector.as_ref()?;
        let embedder = Arc::clone(self.embedder.as_ref()?);
        let texts = variants.to_vec();
        let limit = Duration::from_millis(self.config.vector.embed_timeout_ms);
        match tokio::time::timeout(limit, tokio::task::spawn_blocking(move || embedder.embed_batch(&texts))).await {
            Ok(Ok(Ok(vectors))) if vectors.len() == variants.len() => Some(vectors),
            Ok(Ok(Ok(vectors))) => {
                tracing::warn!(expected = variants.len(), got = vectors.len(), "embedder returned wrong batch size");
                None
            }
            Ok(Ok(Err(err))) => {
                tracing::warn!(error = %err, "query embedding failed, lexical-only");
                None
            }
            Ok(Err(err)) => {
                tracing::warn!(error = %err, "query embedding task panicked, lexical-only");
                None
            }
            Err(_) => {
                tracing::warn!(timeout_ms = self.config.vector.embed_timeout_ms, "query embedding timed out, lexical-only");
                None
            }
        }
    }
}

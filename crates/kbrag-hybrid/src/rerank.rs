use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use kbrag_core::config::{KeywordBonus, RerankConfig};
use kbrag_core::normalize::{normalize, normalize_query};
use kbrag_core::traits::RelevanceClassifier;
use kbrag_core::types::Chunk;

use crate::candidate::Candidate;

const PREVIEW_CHARS: usize = 200;

/// Query-side facts the heuristic bonuses look at.
#[derive(Debug, Clone, Default)]
pub struct RerankContext {
    pub detected: BTreeSet<String>,
    /// Source files of aliases or entity keys that occur in the query.
    pub referenced_files: BTreeSet<String>,
}

/// Blends an external relevance classifier into the fused ranking.
pub struct Reranker {
    classifier: Option<Arc<dyn RelevanceClassifier>>,
    config: RerankConfig,
}

impl Reranker {
    pub fn new(classifier: Option<Arc<dyn RelevanceClassifier>>, config: RerankConfig) -> Self {
        Self { classifier, config }
    }

    /// Reranks the first `top_n` candidates of a sorted pool; the rest follow
    /// unchanged. Returns whether classifier scores were applied.
    ///
    /// The result is ordered head-then-tail. `final_score` is non-increasing
    /// within each part only: a demoted head candidate can end up below the
    /// pool score of a tail candidate, which still stays behind it.
    pub async fn rerank(&self, query: &str, context: &RerankContext, pool: Vec<Candidate>) -> (Vec<Candidate>, bool) {
        let split = self.config.top_n.min(pool.len());
        let mut head = pool;
        let tail = head.split_off(split);
        if head.is_empty() { return (tail, false); }

        let scores = self.classify(query, &head).await;
        let applied = scores.is_some();
        let scores = scores.unwrap_or_default();
        let w = self.config.classifier_weight;
        let normalized_query = normalize_query(query);

        let mut reranked: Vec<Candidate> = head
            .into_iter()
            .enumerate()
            .map(|(i, cand)| {
                let base = cand.pool_score();
                let cls = scores.get(i).copied().map(|s| if s.is_finite() { s.clamp(0.0, 1.0) } else { 0.0 });
                let blended = cls.map_or(base, |s| w * s + (1.0 - w) * base);
                let bonus = self.heuristic_bonus(&normalized_query, context, &cand.chunk);
                cand.reranked(cls, blended, bonus)
            })
            .collect();
        reranked.sort_by(|a, b| {
            b.pinned
                .cmp(&a.pinned)
                .then_with(|| b.final_score().total_cmp(&a.final_score()))
                .then_with(|| b.pool_score().total_cmp(&a.pool_score()))
                .then_with(|| a.order.cmp(&b.order))
        });
        reranked.extend(tail);
        (reranked, applied)
    }

    async fn classify(&self, query: &str, head: &[Candidate]) -> Option<Vec<f32>> {
        if !self.config.enabled { return None; }
        let classifier = self.classifier.as_ref()?;
        let passages: Vec<String> = head.iter().map(|c| passage_preview(&c.chunk)).collect();
        let limit = Duration::from_millis(self.config.timeout_ms);
        match tokio::time::timeout(limit, classifier.score(query, &passages)).await {
            Ok(Ok(scores)) => {
                if scores.len() != passages.len() {
                    tracing::debug!(expected = passages.len(), got = scores.len(), "classifier score count mismatch");
                }
                Some(scores)
            }
            Ok(Err(err)) => {
                tracing::warn!(error = %err, "relevance classifier failed, keeping fusion order");
                None
            }
            Err(_) => {
                tracing::warn!(timeout_ms = self.config.timeout_ms, "relevance classifier timed out, keeping fusion order");
                None
            }
        }
    }

    fn heuristic_bonus(&self, normalized_query: &str, context: &RerankContext, chunk: &Chunk) -> f32 {
        let mut bonus = 0.0;
        if context.detected.contains(&chunk.topic) { bonus += self.config.theme_match_bonus; }
        if context.referenced_files.contains(&chunk.file) { bonus += self.config.alias_bonus; }
        let text = normalize(&chunk.index_text);
        for rule in &self.config.keyword_bonuses {
            if keyword_rule_fires(rule, normalized_query, &chunk.topic, &text) { bonus += rule.bonus; }
        }
        bonus
    }
}

fn keyword_rule_fires(rule: &KeywordBonus, query: &str, topic: &str, text: &str) -> bool {
    let asked = rule.query_terms.iter().map(|t| normalize(t)).any(|t| !t.is_empty() && query.contains(t.as_str()));
    if !asked { return false; }
    let topic_hit = rule.topic.as_deref().is_some_and(|t| t == topic);
    let text_hit = rule.text_terms.iter().map(|t| normalize(t)).any(|t| !t.is_empty() && text.contains(t.as_str()));
    topic_hit || text_hit
}

/// What the classifier sees: heading path and the start of the text.
pub fn passage_preview(chunk: &Chunk) -> String {
    let heading = match &chunk.subsection {
        Some(sub) => format!("{} / {}", chunk.heading, sub),
        None => chunk.heading.clone(),
    };
    let body: String = chunk.text.chars().take(PREVIEW_CHARS).collect();
    format!("{heading}\n{body}")
}

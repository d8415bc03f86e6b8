use std::collections::{BTreeSet, HashMap};

use kbrag_core::config::FusionConfig;
use kbrag_core::types::SearchHit;
use kbrag_core::Corpus;

use crate::candidate::Candidate;
use crate::router::ThemeRouter;

/// Lexical and vector parts of one chunk for one query variant.
#[derive(Debug, Clone, PartialEq)]
pub struct FusedHit {
    pub id: String,
    pub lexical: f32,
    pub vector: f32,
    pub fused: f32,
}

/// BM25 scores divided by the best score in the list.
pub fn normalize_lexical(hits: &[SearchHit]) -> Vec<(String, f32)> {
    let max = hits.iter().map(|h| h.score).filter(|s| s.is_finite()).fold(0.0f32, f32::max);
    hits.iter()
        .map(|h| {
            let s = if max > 0.0 && h.score.is_finite() { (h.score / max).clamp(0.0, 1.0) } else { 0.0 };
            (h.id.clone(), s)
        })
        .collect()
}

/// Cosine similarities are already absolute; only clamp them into `[0, 1]`.
pub fn normalize_vector(hits: &[SearchHit]) -> Vec<(String, f32)> {
    hits.iter()
        .map(|h| (h.id.clone(), if h.score.is_finite() { h.score.clamp(0.0, 1.0) } else { 0.0 }))
        .collect()
}

/// Weighted sum per chunk, first-seen order: lexical hits, then vector-only hits.
pub fn fuse_variant(lexical: &[SearchHit], vector: &[SearchHit], config: &FusionConfig) -> Vec<FusedHit> {
    let mut order: Vec<String> = Vec::new();
    let mut parts: HashMap<String, (f32, f32)> = HashMap::new();
    for (id, s) in normalize_lexical(lexical) {
        let entry = parts.entry(id.clone()).or_insert_with(|| { order.push(id); (0.0, 0.0) });
        entry.0 = entry.0.max(s);
    }
    for (id, s) in normalize_vector(vector) {
        let entry = parts.entry(id.clone()).or_insert_with(|| { order.push(id); (0.0, 0.0) });
        entry.1 = entry.1.max(s);
    }
    order
        .into_iter()
        .filter_map(|id| {
            let (lex, vec) = parts.get(&id).copied()?;
            let fused = config.lexical_weight * lex + config.vector_weight * vec;
            Some(FusedHit { id, lexical: lex, vector: vec, fused })
        })
        .collect()
}

/// One entry per chunk id, keeping the highest pool score and the first-seen position.
pub fn dedup_max(candidates: Vec<Candidate>) -> Vec<Candidate> {
    let mut slots: Vec<Option<Candidate>> = Vec::with_capacity(candidates.len());
    let mut index: HashMap<String, usize> = HashMap::new();
    for cand in candidates {
        match index.get(cand.id()) {
            Some(&slot) => {
                if let Some(existing) = slots[slot].take() { slots[slot] = Some(existing.merge(cand)); }
            }
            None => {
                index.insert(cand.id().to_string(), slots.len());
                slots.push(Some(cand));
            }
        }
    }
    slots.into_iter().flatten().collect()
}

/// Pinned first, then pool score descending; the sort is stable so equal
/// scores keep first-seen order.
pub fn sort_pool(mut pool: Vec<Candidate>) -> Vec<Candidate> {
    pool.sort_by(|a, b| b.pinned.cmp(&a.pinned).then_with(|| b.pool_score().total_cmp(&a.pool_score())));
    pool.into_iter().enumerate().map(|(i, c)| c.with_order(i)).collect()
}

/// Turns per-variant hits into candidates appended after `seed` (fast-path
/// hits and the jump target), then dedups and applies boosts.
pub struct Fusion<'a> {
    pub config: &'a FusionConfig,
    pub corpus: &'a Corpus,
    pub router: &'a ThemeRouter,
}

impl Fusion<'_> {
    pub fn pool(&self, seed: Vec<Candidate>, variants: Vec<Vec<FusedHit>>, detected: &BTreeSet<String>, jump: Option<&JumpTarget>) -> Vec<Candidate> {
        let mut all = seed;
        for hit in variants.into_iter().flatten() {
            let Some(chunk) = self.corpus.get(&hit.id) else {
                tracing::debug!(id = %hit.id, "search hit outside the snapshot corpus");
                continue;
            };
            let order = all.len();
            all.push(Candidate::from_search(chunk.clone(), hit.lexical, hit.vector, hit.fused, order));
        }
        let mut pool = dedup_max(all);
        if let Some(target) = jump {
            if !pool.iter().any(|c| target.matches(c)) {
                if let Some(chunk) = self.corpus.get(&target.chunk_id) {
                    pool.push(Candidate::from_jump(chunk.clone(), pool.len()));
                }
            }
        }
        let pool = pool
            .into_iter()
            .map(|c| {
                let c = if self.config.enable_theme_boost && detected.contains(&c.chunk.topic) {
                    let bonus = self.router.boost(0.0, &c.chunk.topic, detected);
                    c.with_theme_bonus(bonus)
                } else {
                    c
                };
                match jump {
                    Some(target) if target.matches(&c) => c.with_jump_bonus(self.config.jump_boost),
                    _ => c,
                }
            })
            .collect();
        sort_pool(pool)
    }
}

/// A resolved `{topic, section_id}` navigation target.
#[derive(Debug, Clone)]
pub struct JumpTarget {
    pub topic: String,
    pub section_id: String,
    pub chunk_id: String,
}

impl JumpTarget {
    pub fn resolve(corpus: &Corpus, topic: &str, section_id: &str) -> Option<Self> {
        let chunk = corpus.find_section(topic, section_id)?;
        Some(Self { topic: topic.to_string(), section_id: section_id.to_string(), chunk_id: chunk.id.clone() })
    }

    pub fn matches(&self, candidate: &Candidate) -> bool {
        let chunk = &candidate.chunk;
        chunk.topic == self.topic && (chunk.section_id == self.section_id || chunk.anchor() == self.section_id)
    }
}

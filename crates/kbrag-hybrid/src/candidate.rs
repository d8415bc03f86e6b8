use serde::Serialize;
use std::sync::Arc;

use kbrag_core::types::Chunk;

/// Which fast-path matcher produced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FastPathKind {
    ExactSection,
    Entity,
    ThemeDefault,
}

/// How a candidate entered the pool. When duplicates merge, the stronger
/// origin survives: fast path over jump over search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "matcher", rename_all = "snake_case")]
pub enum CandidateOrigin {
    Search,
    Jump,
    FastPath(FastPathKind),
}

impl CandidateOrigin {
    fn rank(self) -> u8 {
        match self {
            Self::Search => 0,
            Self::Jump => 1,
            Self::FastPath(_) => 2,
        }
    }

    pub fn stronger(self, other: Self) -> Self {
        if other.rank() > self.rank() { other } else { self }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub lexical: f32,
    pub vector: f32,
    pub fused: f32,
    pub theme_bonus: f32,
    pub jump_bonus: f32,
    /// Classifier score, absent when reranking was skipped or the classifier
    /// returned too few scores.
    pub rerank: Option<f32>,
    pub heuristic_bonus: f32,
    pub final_score: f32,
}

/// One chunk under consideration for a single query.
///
/// Each stage consumes candidates and hands back new values; nothing is
/// shared or mutated across stages or queries.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub chunk: Arc<Chunk>,
    pub scores: ScoreBreakdown,
    pub origin: CandidateOrigin,
    /// Exact alias equality: heads the ranking regardless of score.
    pub pinned: bool,
    /// First-seen position in the pool; the last tie-break.
    pub order: usize,
}

impl Candidate {
    pub fn from_search(chunk: Arc<Chunk>, lexical: f32, vector: f32, fused: f32, order: usize) -> Self {
        let scores = ScoreBreakdown { lexical, vector, fused, final_score: fused, ..ScoreBreakdown::default() };
        Self { chunk, scores, origin: CandidateOrigin::Search, pinned: false, order }
    }

    pub fn from_fast_path(chunk: Arc<Chunk>, kind: FastPathKind, score: f32, pinned: bool, order: usize) -> Self {
        let scores = ScoreBreakdown { fused: score, final_score: score, ..ScoreBreakdown::default() };
        Self { chunk, scores, origin: CandidateOrigin::FastPath(kind), pinned, order }
    }

    pub fn from_jump(chunk: Arc<Chunk>, order: usize) -> Self {
        Self { chunk, scores: ScoreBreakdown::default(), origin: CandidateOrigin::Jump, pinned: false, order }
    }

    pub fn id(&self) -> &str {
        &self.chunk.id
    }

    /// Score after fusion and boosts, before reranking.
    pub fn pool_score(&self) -> f32 {
        self.scores.fused + self.scores.theme_bonus + self.scores.jump_bonus
    }

    pub fn final_score(&self) -> f32 {
        self.scores.final_score
    }

    pub fn with_theme_bonus(mut self, bonus: f32) -> Self {
        self.scores.theme_bonus = bonus;
        self.scores.final_score = self.pool_score();
        self
    }

    pub fn with_jump_bonus(mut self, bonus: f32) -> Self {
        self.scores.jump_bonus = bonus;
        self.scores.final_score = self.pool_score();
        self
    }

    pub fn with_order(mut self, order: usize) -> Self {
        self.order = order;
        self
    }

    /// Merges a duplicate of the same chunk: scores of the higher pool score
    /// (the earlier one on ties), the stronger origin, and pinning from either.
    pub fn merge(self, other: Self) -> Self {
        let origin = self.origin.stronger(other.origin);
        let pinned = self.pinned || other.pinned;
        let order = self.order.min(other.order);
        let mut winner = if other.pool_score() > self.pool_score() { other } else { self };
        winner.origin = origin;
        winner.pinned = pinned;
        winner.order = order;
        winner
    }

    pub fn reranked(mut self, classifier: Option<f32>, blended: f32, heuristic_bonus: f32) -> Self {
        self.scores.rerank = classifier;
        self.scores.heuristic_bonus = heuristic_bonus;
        self.scores.final_score = blended + heuristic_bonus;
        self
    }
}

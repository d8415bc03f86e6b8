use serde::Serialize;

use kbrag_core::config::GuardConfig;

use crate::candidate::{Candidate, CandidateOrigin, FastPathKind};

/// Why a below-threshold result was accepted anyway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BypassReason {
    ExactSectionMatch,
    CatalogEntityHit,
    AliasSource,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GuardSignals {
    pub alias_source: bool,
    pub exact_section_match: bool,
    pub catalog_entity_hit: bool,
}

impl GuardSignals {
    /// Signals carried by the top-ranked candidate's origin.
    pub fn from_top(top: Option<&Candidate>) -> Self {
        match top.map(|c| c.origin) {
            Some(CandidateOrigin::FastPath(FastPathKind::ExactSection)) => {
                Self { alias_source: true, exact_section_match: true, catalog_entity_hit: false }
            }
            Some(CandidateOrigin::FastPath(FastPathKind::Entity)) => {
                Self { catalog_entity_hit: true, ..Self::default() }
            }
            _ => Self::default(),
        }
    }

    pub fn reason(&self) -> Option<BypassReason> {
        if self.exact_section_match {
            Some(BypassReason::ExactSectionMatch)
        } else if self.catalog_entity_hit {
            Some(BypassReason::CatalogEntityHit)
        } else if self.alias_source {
            Some(BypassReason::AliasSource)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GuardDecision {
    pub accepted: bool,
    pub confidence: f32,
    pub threshold: f32,
    pub bypass_reason: Option<BypassReason>,
}

/// Fixed "no answer" signal handed to callers when evidence is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LowRelevance {
    pub code: &'static str,
    pub message: &'static str,
}

pub const LOW_RELEVANCE: LowRelevance = LowRelevance {
    code: "low_relevance",
    message: "К сожалению, в моей базе нет информации по этому вопросу.",
};

pub struct RelevanceGuard {
    config: GuardConfig,
}

impl RelevanceGuard {
    pub fn new(config: GuardConfig) -> Self {
        Self { config }
    }

    /// Nothing ranked means nothing to answer from: rejected with zero
    /// confidence, no bypass.
    pub fn decide(&self, ranked: &[Candidate]) -> GuardDecision {
        if ranked.is_empty() {
            return GuardDecision { accepted: false, confidence: 0.0, threshold: self.config.threshold, bypass_reason: None };
        }
        let scores: Vec<f32> = ranked.iter().map(Candidate::final_score).collect();
        self.evaluate(&scores, GuardSignals::from_top(ranked.first()))
    }

    /// Confidence is the best finite score among the first `top_n`; with none
    /// available it is `missing_score_confidence`.
    pub fn evaluate(&self, scores: &[f32], signals: GuardSignals) -> GuardDecision {
        let confidence = scores
            .iter()
            .take(self.config.top_n.max(1))
            .copied()
            .filter(|s| s.is_finite())
            .reduce(f32::max)
            .unwrap_or(self.config.missing_score_confidence);
        let bypass_reason = signals.reason();
        let accepted = confidence >= self.config.threshold || bypass_reason.is_some();
        GuardDecision { accepted, confidence, threshold: self.config.threshold, bypass_reason }
    }
}

use regex::{Regex, RegexBuilder};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use kbrag_core::config::{DefaultTarget, ThemeRuleConfig};
use kbrag_core::normalize::{alias_key, normalize_query};

struct ThemeRule {
    topic: String,
    pattern: Option<Regex>,
    aliases: Vec<String>,
}

/// Primary topic of a query as reported to callers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ThemeClassification {
    pub topic: String,
    pub weight: f32,
    pub confidence: f32,
}

/// Table-driven topic detection. Rules are compiled once per snapshot.
pub struct ThemeRouter {
    rules: Vec<ThemeRule>,
    weights: BTreeMap<String, f32>,
    defaults: BTreeMap<String, DefaultTarget>,
}

impl ThemeRouter {
    pub fn new(configs: &[ThemeRuleConfig]) -> Self {
        let mut rules = Vec::with_capacity(configs.len());
        let mut weights: BTreeMap<String, f32> = BTreeMap::new();
        let mut defaults = BTreeMap::new();
        for cfg in configs {
            let pattern = cfg.pattern.as_deref().filter(|p| !p.trim().is_empty()).and_then(|p| {
                RegexBuilder::new(p)
                    .case_insensitive(true)
                    .build()
                    .map_err(|err| tracing::warn!(topic = %cfg.topic, error = %err, "invalid theme pattern, matching by aliases only"))
                    .ok()
            });
            let aliases = cfg.aliases.iter().map(|a| alias_key(a)).filter(|a| !a.is_empty()).collect();
            weights
                .entry(cfg.topic.clone())
                .and_modify(|w| *w = w.max(cfg.weight))
                .or_insert(cfg.weight);
            if let Some(target) = &cfg.default_target {
                defaults.entry(cfg.topic.clone()).or_insert_with(|| target.clone());
            }
            rules.push(ThemeRule { topic: cfg.topic.clone(), pattern, aliases });
        }
        Self { rules, weights, defaults }
    }

    /// Topics whose pattern matches the raw query or whose alias occurs in
    /// the normalized query.
    pub fn detect(&self, query: &str) -> BTreeSet<String> {
        self.fired(query).map(|r| r.topic.clone()).collect()
    }

    fn fired<'a>(&'a self, query: &str) -> impl Iterator<Item = &'a ThemeRule> + 'a {
        let raw = query.to_string();
        let normalized = normalize_query(query);
        self.rules.iter().filter(move |rule| {
            rule.pattern.as_ref().is_some_and(|p| p.is_match(&raw))
                || rule.aliases.iter().any(|a| normalized.contains(a.as_str()))
        })
    }

    pub fn weight(&self, topic: &str) -> Option<f32> {
        self.weights.get(topic).copied()
    }

    /// `score + weight` when `topic` is among the detected topics, else `score`.
    pub fn boost(&self, score: f32, topic: &str, detected: &BTreeSet<String>) -> f32 {
        if !detected.contains(topic) { return score; }
        score + self.weight(topic).unwrap_or(0.0)
    }

    pub fn classify(&self, query: &str) -> Option<ThemeClassification> {
        let mut fired = self.fired(query);
        let primary = fired.next()?;
        let several = fired.any(|r| r.topic != primary.topic);
        Some(ThemeClassification {
            topic: primary.topic.clone(),
            weight: self.weight(&primary.topic).unwrap_or(0.0),
            confidence: if several { 0.8 } else { 1.0 },
        })
    }

    pub fn default_target(&self, topic: &str) -> Option<&DefaultTarget> {
        self.defaults.get(topic)
    }

    pub fn default_targets(&self) -> impl Iterator<Item = (&str, &DefaultTarget)> {
        self.defaults.iter().map(|(topic, target)| (topic.as_str(), target))
    }

    /// Detected topics in rule order, each once.
    pub fn in_rule_order<'a>(&'a self, detected: &'a BTreeSet<String>) -> impl Iterator<Item = &'a str> + 'a {
        let mut seen = BTreeSet::new();
        self.rules
            .iter()
            .map(|r| r.topic.as_str())
            .filter(move |t| detected.contains(*t) && seen.insert(*t))
    }
}

use std::collections::BTreeSet;
use std::sync::Arc;

use kbrag_core::config::{DefaultTarget, FastPathConfig};
use kbrag_core::normalize::{alias_key, strip_separators};
use kbrag_core::types::Chunk;
use kbrag_core::Corpus;

use crate::candidate::{Candidate, FastPathKind};
use crate::router::ThemeRouter;

#[derive(Debug, Clone)]
pub struct FastPathHit {
    pub chunk: Arc<Chunk>,
    pub kind: FastPathKind,
    pub pinned: bool,
    /// The alias, entity key or topic that matched.
    pub key: String,
}

impl FastPathHit {
    pub fn into_candidate(self, config: &FastPathConfig, order: usize) -> Candidate {
        let score = match self.kind {
            FastPathKind::ExactSection | FastPathKind::Entity => config.hit_score,
            FastPathKind::ThemeDefault => config.theme_default_score,
        };
        Candidate::from_fast_path(self.chunk, self.kind, score, self.pinned, order)
    }
}

/// Short-circuit lookups over the alias and entity indices.
///
/// Substring keys are kept longest first (then by key) so the most specific
/// match wins deterministically.
pub struct FastPathMatcher {
    config: FastPathConfig,
    alias_keys: Vec<String>,
    entity_keys: Vec<(String, String)>,
}

impl FastPathMatcher {
    pub fn new(corpus: &Corpus, config: &FastPathConfig) -> Self {
        let min = config.min_substring_chars;
        let long_enough = |k: &str| k.chars().count() >= min;
        let mut alias_keys: Vec<String> = corpus.aliases().keys().filter(|k| long_enough(k.as_str())).cloned().collect();
        alias_keys.sort_by(|a, b| b.chars().count().cmp(&a.chars().count()).then_with(|| a.cmp(b)));
        let mut entity_keys: Vec<(String, String)> = corpus
            .entities()
            .keys()
            .filter(|k| long_enough(k.as_str()))
            .map(|k| (k.clone(), strip_separators(k)))
            .collect();
        entity_keys.sort_by(|a, b| b.0.chars().count().cmp(&a.0.chars().count()).then_with(|| a.0.cmp(&b.0)));
        Self { config: config.clone(), alias_keys, entity_keys }
    }

    pub fn config(&self) -> &FastPathConfig {
        &self.config
    }

    /// Exact section, then entity, then theme default; first hit wins.
    pub fn lookup(&self, corpus: &Corpus, router: &ThemeRouter, detected: &BTreeSet<String>, query: &str) -> Option<FastPathHit> {
        if !self.config.enabled { return None; }
        let q = alias_key(query);
        if q.is_empty() { return None; }
        self.exact_section(corpus, &q)
            .or_else(|| self.entity(corpus, &q))
            .or_else(|| theme_default(corpus, router, detected))
    }

    fn exact_section(&self, corpus: &Corpus, q: &str) -> Option<FastPathHit> {
        if let Some(entry) = corpus.alias(q) {
            if let Some(chunk) = corpus.resolve(&entry.file, &entry.section_id) {
                return Some(FastPathHit { chunk: Arc::clone(chunk), kind: FastPathKind::ExactSection, pinned: true, key: q.to_string() });
            }
        }
        self.alias_keys.iter().filter(|k| q.contains(k.as_str())).find_map(|key| {
            let entry = corpus.alias(key)?;
            let chunk = corpus.resolve(&entry.file, &entry.section_id)?;
            Some(FastPathHit { chunk: Arc::clone(chunk), kind: FastPathKind::ExactSection, pinned: false, key: key.clone() })
        })
    }

    fn entity(&self, corpus: &Corpus, q: &str) -> Option<FastPathHit> {
        let hit = |key: &String| {
            let entry = corpus.entities().get(key)?;
            let chunk = corpus.get(&entry.chunk_id)?;
            Some(FastPathHit { chunk: Arc::clone(chunk), kind: FastPathKind::Entity, pinned: false, key: key.clone() })
        };
        if let Some(found) = self.entity_keys.iter().filter(|(k, _)| q.contains(k.as_str())).find_map(|(k, _)| hit(k)) {
            return Some(found);
        }
        let stripped = strip_separators(q);
        self.entity_keys
            .iter()
            .filter(|(_, s)| !s.is_empty() && stripped.contains(s.as_str()))
            .find_map(|(k, _)| hit(k))
    }

    /// Files any alias or entity key occurring in the query points at.
    pub fn referenced_files(&self, corpus: &Corpus, query: &str) -> BTreeSet<String> {
        let q = alias_key(query);
        let mut files = BTreeSet::new();
        if q.is_empty() { return files; }
        for key in self.alias_keys.iter().filter(|k| q.contains(k.as_str())) {
            if let Some(entry) = corpus.alias(key) { files.insert(entry.file.clone()); }
        }
        if let Some(entry) = corpus.alias(&q) { files.insert(entry.file.clone()); }
        for (key, _) in self.entity_keys.iter().filter(|(k, _)| q.contains(k.as_str())) {
            if let Some(entry) = corpus.entities().get(key) { files.insert(entry.doc_id.clone()); }
        }
        files
    }
}

fn theme_default(corpus: &Corpus, router: &ThemeRouter, detected: &BTreeSet<String>) -> Option<FastPathHit> {
    router.in_rule_order(detected).find_map(|topic| {
        let target = router.default_target(topic)?;
        let chunk = resolve_default(corpus, target)?;
        Some(FastPathHit { chunk: Arc::clone(chunk), kind: FastPathKind::ThemeDefault, pinned: false, key: topic.to_string() })
    })
}

pub fn resolve_default<'a>(corpus: &'a Corpus, target: &DefaultTarget) -> Option<&'a Arc<Chunk>> {
    match &target.section_id {
        Some(sid) => corpus.resolve(&target.file, sid),
        None => corpus.first_chunk_in_file(&target.file),
    }
}

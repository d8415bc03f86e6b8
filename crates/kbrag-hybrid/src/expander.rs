use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use kbrag_core::config::ExpansionConfig;
use kbrag_core::normalize::normalize_query;
use kbrag_core::traits::Paraphraser;

/// Adds paraphrases of the query. Never fails: any problem with the
/// paraphraser leaves just the original query.
pub struct QueryExpander {
    paraphraser: Option<Arc<dyn Paraphraser>>,
    config: ExpansionConfig,
}

impl QueryExpander {
    pub fn new(paraphraser: Option<Arc<dyn Paraphraser>>, config: ExpansionConfig) -> Self {
        Self { paraphraser, config }
    }

    pub fn is_active(&self) -> bool {
        self.config.enabled && self.paraphraser.is_some() && self.config.max_variants > 1
    }

    /// The original query first, then up to `max_variants - 1` distinct
    /// paraphrases (case-insensitive).
    pub async fn expand(&self, query: &str) -> Vec<String> {
        let original = vec![query.to_string()];
        let Some(paraphraser) = self.paraphraser.as_ref().filter(|_| self.is_active()) else { return original };

        let wanted = self.config.max_variants - 1;
        let limit = Duration::from_millis(self.config.timeout_ms);
        let variants = match tokio::time::timeout(limit, paraphraser.paraphrase(query, wanted)).await {
            Ok(Ok(variants)) => variants,
            Ok(Err(err)) => {
                tracing::warn!(error = %err, "paraphrase failed, searching the original query only");
                return original;
            }
            Err(_) => {
                tracing::warn!(timeout_ms = self.config.timeout_ms, "paraphrase timed out, searching the original query only");
                return original;
            }
        };
        dedup_variants(query, variants, self.config.max_variants)
    }
}

/// Keeps `query` first, drops blanks and case-insensitive duplicates, caps at `max`.
pub fn dedup_variants(query: &str, variants: Vec<String>, max: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(max);
    seen.insert(normalize_query(query));
    out.push(query.to_string());
    for v in variants {
        if out.len() >= max { break; }
        let v = v.trim();
        let key = normalize_query(v);
        if key.is_empty() || !seen.insert(key) { continue; }
        out.push(v.to_string());
    }
    out
}

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashSet;

use kbrag_core::normalize::normalize;
use kbrag_core::traits::RelevanceClassifier;

/// Offline stand-in for the external classifier: the share of distinct
/// query words (three characters or longer) found in the passage, squared.
///
/// Squaring keeps full coverage at 1.0 while one shared word out of three
/// scores 0.11, so an off-topic question that happens to mention a corpus
/// word does not read as relevant.
#[derive(Debug, Clone, Copy, Default)]
pub struct LexicalOverlapClassifier;

fn words(text: &str) -> Vec<String> {
    normalize(text)
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() >= 3)
        .map(str::to_string)
        .collect()
}

impl LexicalOverlapClassifier {
    pub fn overlap(query: &str, passage: &str) -> f32 {
        let query_words: HashSet<String> = words(query).into_iter().collect();
        if query_words.is_empty() { return 0.0; }
        let passage_words: HashSet<String> = words(passage).into_iter().collect();
        let found = query_words.iter().filter(|w| passage_words.contains(*w)).count();
        let coverage = found as f32 / query_words.len() as f32;
        coverage * coverage
    }
}

#[async_trait]
impl RelevanceClassifier for LexicalOverlapClassifier {
    async fn score(&self, query: &str, passages: &[String]) -> Result<Vec<f32>> {
        Ok(passages.iter().map(|p| Self::overlap(query, p)).collect())
    }
}

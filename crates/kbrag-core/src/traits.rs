use async_trait::async_trait;

/// Produces unit-length embedding vectors of a fixed dimension.
pub trait Embedder: Send + Sync {
    fn dim(&self) -> usize;
    fn max_len(&self) -> usize;
    fn embed_batch(&self, texts: &[String]) -> anyhow::Result<Vec<Vec<f32>>>;
}

/// External text generator asked for paraphrases of a query.
///
/// Implementations may return fewer or more than `count` variants, blanks or
/// duplicates; callers clean the list up.
#[async_trait]
pub trait Paraphraser: Send + Sync {
    async fn paraphrase(&self, query: &str, count: usize) -> anyhow::Result<Vec<String>>;
}

/// External relevance classifier: one score in `[0, 1]` per passage, in the
/// order the passages were given.
#[async_trait]
pub trait RelevanceClassifier: Send + Sync {
    async fn score(&self, query: &str, passages: &[String]) -> anyhow::Result<Vec<f32>>;
}

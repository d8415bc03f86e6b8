use std::sync::Arc;

use kbrag_core::config::{CorpusConfig, VectorBackendKind};
use kbrag_core::traits::Embedder;
use kbrag_core::CorpusBuilder;
use kbrag_embed::HashEmbedder;
use kbrag_vector::VectorIndex;

fn fixture() -> (Vec<String>, Vec<Vec<f32>>) {
    let ids = vec!["a".to_string(), "b".to_string(), "c".to_string(), "d".to_string()];
    let vectors = vec![vec![1.0, 0.0, 0.0], vec![0.8, 0.6, 0.0], vec![0.0, 0.0, 2.0], vec![0.0, 1.0, 0.0]];
    (ids, vectors)
}

#[tokio::test]
async fn brute_force_orders_by_cosine() {
    let (ids, vectors) = fixture();
    let index = VectorIndex::build(ids, vectors, 3, VectorBackendKind::BruteForce).await.expect("index");
    assert_eq!(index.backend(), "brute_force");
    let hits = index.nearest(&[1.0, 0.0, 0.0], 3).await.expect("search");
    let ids: Vec<&str> = hits.iter().map(|h| h.id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
    assert!((hits[0].score - 1.0).abs() < 1e-5);
    assert!((hits[1].score - 0.8).abs() < 1e-5);
}

#[tokio::test]
async fn ties_follow_build_order() {
    let ids = vec!["x".to_string(), "y".to_string(), "z".to_string()];
    let vectors = vec![vec![0.0, 1.0], vec![0.0, 1.0], vec![1.0, 0.0]];
    let index = VectorIndex::build(ids, vectors, 2, VectorBackendKind::BruteForce).await.expect("index");
    let hits = index.nearest(&[0.0, 3.0], 2).await.expect("search");
    assert_eq!(hits.iter().map(|h| h.id.as_str()).collect::<Vec<_>>(), vec!["x", "y"]);
}

#[tokio::test]
async fn mismatched_dimensions_are_rejected() {
    let (ids, mut vectors) = fixture();
    vectors[2] = vec![1.0];
    assert!(VectorIndex::build(ids.clone(), vectors, 3, VectorBackendKind::BruteForce).await.is_err());
    let (_, vectors) = fixture();
    let index = VectorIndex::build(ids, vectors, 3, VectorBackendKind::BruteForce).await.expect("index");
    assert!(index.nearest(&[1.0, 0.0], 2).await.is_err());
}

#[tokio::test]
async fn lance_matches_brute_force() {
    let (ids, vectors) = fixture();
    let brute = VectorIndex::build(ids.clone(), vectors.clone(), 3, VectorBackendKind::BruteForce).await.expect("brute");
    let lance = VectorIndex::build(ids, vectors, 3, VectorBackendKind::Lance).await.expect("lance");
    assert_eq!(lance.backend(), "lance");
    for q in [[1.0f32, 0.1, 0.0], [0.0, 0.2, 1.0], [0.3, 1.0, 0.0]] {
        let a = brute.nearest(&q, 3).await.expect("brute search");
        let b = lance.nearest(&q, 3).await.expect("lance search");
        let ids_a: Vec<&str> = a.iter().map(|h| h.id.as_str()).collect();
        let ids_b: Vec<&str> = b.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids_a, ids_b);
        for (x, y) in a.iter().zip(&b) { assert!((x.score - y.score).abs() < 1e-4, "{} vs {}", x.score, y.score); }
    }
}

#[tokio::test]
async fn builds_from_corpus_chunks() {
    let corpus = CorpusBuilder::new(&CorpusConfig::default())
        .expect("builder")
        .build_from_sources([
            ("prices.md", "## Стоимость имплантации\nИмплантация стоит от 45 000 руб."),
            ("contacts.md", "## Телефон\nЗвоните +7 495 123 45 67."),
        ])
        .expect("corpus");
    let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(128));
    let index = VectorIndex::from_chunks(corpus.chunks(), embedder.clone(), VectorBackendKind::Auto).await.expect("index");
    assert_eq!(index.len(), 2);
    let q = embedder.embed_batch(&["стоимость имплантации".to_string()]).expect("embed").remove(0);
    let hits = index.nearest(&q, 1).await.expect("search");
    assert_eq!(hits[0].id, "prices.md#стоимость-имплантации");
}

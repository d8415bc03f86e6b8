use kbrag_core::traits::Embedder;
use kbrag_embed::{default_embedder, HashEmbedder, BGE_M3_DIM};

fn cosine(a: &[f32], b: &[f32]) -> f32 { a.iter().zip(b).map(|(x, y)| x * y).sum() }

#[test]
fn default_embedder_honours_fake_switch() {
    // Force the hashing embedder to avoid loading the large model
    std::env::set_var("APP_USE_FAKE_EMBEDDINGS", "1");

    let embedder = default_embedder();
    let texts = vec!["часы работы клиники".to_string(), "часы работы клиники".to_string()];
    let embs = embedder.embed_batch(&texts).expect("embed_batch");
    let (v1, v2) = (&embs[0], &embs[1]);

    assert_eq!(v1.len(), BGE_M3_DIM, "embedding dim is 1024");
    let norm: f32 = v1.iter().map(|x| x * x).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() <= 1e-3, "vector is L2-normalized (norm={norm})");
    for (a, b) in v1.iter().zip(v2.iter()) { assert!((a - b).abs() <= 1e-6); }
}

#[test]
fn shared_words_score_higher_than_unrelated_text() {
    let embedder = HashEmbedder::new(256);
    let texts = vec![
        "стоимость имплантации зубов".to_string(),
        "Сколько стоит имплантация?".to_string(),
        "квантовая хромодинамика".to_string(),
    ];
    let embs = embedder.embed_batch(&texts).expect("embed");
    let related = cosine(&embs[0], &embs[1]);
    let unrelated = cosine(&embs[0], &embs[2]);
    assert!(related > unrelated, "related={related} unrelated={unrelated}");
}

#[test]
fn blank_text_embeds_to_zero_vector() {
    let embedder = HashEmbedder::new(64);
    let embs = embedder.embed_batch(&["   ".to_string()]).expect("embed");
    assert_eq!(embs[0].len(), 64);
    assert!(embs[0].iter().all(|x| *x == 0.0));
}

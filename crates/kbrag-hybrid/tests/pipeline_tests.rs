mod common;

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use kbrag_core::config::CorpusConfig;
use kbrag_core::traits::Paraphraser;
use kbrag_core::{Corpus, CorpusBuilder};
use kbrag_hybrid::{
    BypassReason, CandidateOrigin, Collaborators, FastPathKind, Jump, QueryRequest, RetrievalPipeline, LOW_RELEVANCE,
};

const PAIN: &str = r#"---
title: Боль и приживаемость
doc_type: info
topic: safety
aliases: ["нужна ли анестезия?"]
---
## Больно ли?
<!-- aliases: [это больно?, страшно ли!] -->
Имплантация проходит под местной анестезией, лёгкий дискомфорт держится 2-3 дня.

## Приживаемость
Приживаемость имплантов 98%, на имплант действует гарантия 10 лет.
"#;

struct CountingParaphraser {
    calls: AtomicUsize,
}

#[async_trait]
impl Paraphraser for CountingParaphraser {
    async fn paraphrase(&self, query: &str, _count: usize) -> Result<Vec<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![format!("{query} подробнее")])
    }
}

#[tokio::test]
async fn exact_alias_is_pinned_on_top_and_accepted() {
    let pipeline = common::pipeline().await;
    let result = pipeline.retrieve(&QueryRequest::new("Часы работы?")).await;

    assert_eq!(result.fast_path, Some(FastPathKind::ExactSection));
    let top = &result.passages[0];
    assert_eq!(top.chunk_id, "contacts.md#hours");
    assert!(top.pinned);
    assert_eq!(top.cta.link.as_deref(), Some("/booking"));
    assert!(result.decision.accepted);
    assert_eq!(result.decision.bypass_reason, Some(BypassReason::ExactSectionMatch));
    assert!(result.notice.is_none());
    assert_eq!(result.variants, vec!["Часы работы?".to_string()]);
}

#[tokio::test]
async fn unrelated_query_is_rejected_with_notice() {
    let pipeline = common::pipeline().await;
    let result = pipeline.retrieve(&QueryRequest::new("квантовая хромодинамика")).await;

    assert_eq!(result.fast_path, None);
    assert!(result.themes.is_empty());
    assert!(!result.decision.accepted);
    assert!(result.decision.confidence < result.decision.threshold);
    assert_eq!(result.decision.bypass_reason, None);
    assert_eq!(result.notice, Some(LOW_RELEVANCE));
    assert_eq!(result.notice.map(|n| n.code), Some("low_relevance"));
}

#[tokio::test]
async fn empty_corpus_gives_empty_rejection_without_error() {
    let pipeline = RetrievalPipeline::from_corpus(common::empty_corpus(), common::config(), common::offline())
        .await
        .expect("pipeline");
    let result = pipeline.retrieve(&QueryRequest::new("часы работы")).await;
    assert!(result.passages.is_empty());
    assert!(!result.decision.accepted);
    assert_eq!(result.decision.confidence, 0.0);
    assert!(result.notice.is_some());
}

#[tokio::test]
async fn substring_alias_hit_competes_but_still_bypasses() {
    let pipeline = common::pipeline().await;
    let result = pipeline.retrieve(&QueryRequest::new("подскажите график работы клиники")).await;
    assert_eq!(result.fast_path, Some(FastPathKind::ExactSection));
    let top = &result.passages[0];
    assert_eq!(top.chunk_id, "contacts.md#hours");
    assert!(!top.pinned, "only whole-query equality pins");
    assert_eq!(top.origin, CandidateOrigin::FastPath(FastPathKind::ExactSection));
    assert!(result.decision.accepted);
    let ids: Vec<&str> = result.passages.iter().map(|p| p.chunk_id.as_str()).collect();
    let unique: std::collections::HashSet<&str> = ids.iter().copied().collect();
    assert_eq!(ids.len(), unique.len(), "fast-path hit and search hit are deduplicated");
}

#[tokio::test]
async fn catalog_entity_matches_across_separators() {
    let pipeline = common::pipeline().await;
    let result = pipeline.retrieve(&QueryRequest::new("расскажите про all on 4")).await;
    assert_eq!(result.fast_path, Some(FastPathKind::Entity));
    assert_eq!(result.passages[0].chunk_id, "implants.md#методики/all-on-4");
    assert!(result.decision.accepted);
    assert_eq!(result.decision.bypass_reason, Some(BypassReason::CatalogEntityHit));
}

#[tokio::test]
async fn theme_default_is_added_without_bypass() {
    let pipeline = common::pipeline().await;
    let result = pipeline.retrieve(&QueryRequest::new("сколько стоит отбеливание")).await;
    assert_eq!(result.fast_path, Some(FastPathKind::ThemeDefault));
    assert!(result.themes.contains(&"prices".to_string()));
    let default = result
        .passages
        .iter()
        .find(|p| p.chunk_id == "prices.md#стоимость-имплантации")
        .expect("default chunk in the pool");
    assert_eq!(default.topic, "prices");
    assert!(default.scores.theme_bonus > 0.0);
    assert!(!matches!(result.decision.bypass_reason, Some(BypassReason::ExactSectionMatch)));
}

#[tokio::test]
async fn fast_path_skips_expansion() {
    let paraphraser = Arc::new(CountingParaphraser { calls: AtomicUsize::new(0) });
    let collaborators = Collaborators { paraphraser: Some(paraphraser.clone()), ..common::offline() };
    let pipeline = RetrievalPipeline::from_corpus(common::corpus(), common::config(), collaborators).await.expect("pipeline");

    let hit = pipeline.retrieve(&QueryRequest::new("часы работы")).await;
    assert_eq!(hit.variants.len(), 1);
    assert_eq!(paraphraser.calls.load(Ordering::SeqCst), 0);

    let miss = pipeline.retrieve(&QueryRequest::new("когда можно прийти на приём")).await;
    assert_eq!(paraphraser.calls.load(Ordering::SeqCst), 1);
    assert_eq!(miss.variants, vec!["когда можно прийти на приём".to_string(), "когда можно прийти на приём подробнее".to_string()]);
}

#[tokio::test]
async fn jump_target_is_boosted() {
    let pipeline = common::pipeline().await;
    let request = QueryRequest {
        query: "имплантация".into(),
        theme_hint: None,
        jump: Some(Jump { topic: "safety".into(), section_id: "безопасность-имплантации".into() }),
    };
    let result = pipeline.retrieve(&request).await;
    let safety = result
        .passages
        .iter()
        .find(|p| p.chunk_id == "safety.md#безопасность-имплантации")
        .expect("jump target present");
    assert!((safety.scores.jump_bonus - 0.3).abs() < 1e-6);
    assert!(result.passages.iter().filter(|p| p.topic != "safety").all(|p| p.scores.jump_bonus == 0.0));
}

#[tokio::test]
async fn jump_target_is_injected_when_search_misses_it() {
    // no embedder: lexical-only, so unrelated chunks stay out of the pool
    let collaborators = Collaborators { embedder: None, ..common::offline() };
    let pipeline = RetrievalPipeline::from_corpus(common::corpus(), common::config(), collaborators).await.expect("pipeline");
    assert!(pipeline.snapshot().vector.is_none());

    let request = QueryRequest {
        query: "часы работы".into(),
        theme_hint: None,
        jump: Some(Jump { topic: "prices".into(), section_id: "рассрочка".into() }),
    };
    let result = pipeline.retrieve(&request).await;
    assert_eq!(result.passages[0].chunk_id, "contacts.md#hours");
    let injected = result.passages.iter().find(|p| p.chunk_id == "prices.md#рассрочка").expect("injected");
    assert_eq!(injected.origin, CandidateOrigin::Jump);
    assert!((injected.scores.jump_bonus - 0.3).abs() < 1e-6);
}

#[tokio::test]
async fn theme_hint_joins_detected_topics() {
    let pipeline = common::pipeline().await;
    let request = QueryRequest { query: "когда можно прийти".into(), theme_hint: Some("contacts".into()), jump: None };
    let result = pipeline.retrieve(&request).await;
    assert_eq!(result.themes, vec!["contacts".to_string()]);
    assert!(result.passages.iter().filter(|p| p.topic == "contacts").all(|p| p.scores.theme_bonus > 0.0));
}

#[tokio::test]
async fn reload_swaps_snapshot_atomically() {
    let pipeline = common::pipeline().await;
    let before = pipeline.snapshot();
    let fingerprint = before.corpus.fingerprint().to_string();

    let extra = "---\ntopic: whitening\n---\n## Отбеливание зубов\nОтбеливание Zoom стоит 25 000 руб.\n";
    let corpus = CorpusBuilder::new(&CorpusConfig::default())
        .expect("builder")
        .build_from_sources([("whitening.md", extra)])
        .expect("corpus");
    let info = pipeline.reload(corpus).await.expect("reload");

    assert_ne!(info.fingerprint, fingerprint);
    assert_eq!(info.chunks, 1);
    // the old snapshot is untouched for whoever still holds it
    assert_eq!(before.corpus.fingerprint(), fingerprint);
    assert!(before.corpus.get("contacts.md#hours").is_some());

    let result = pipeline.retrieve(&QueryRequest::new("отбеливание зубов")).await;
    assert_eq!(result.snapshot, info.fingerprint);
    assert_eq!(result.passages[0].chunk_id, "whitening.md#отбеливание-зубов");
    assert!(pipeline.retrieve(&QueryRequest::new("часы работы")).await.passages.iter().all(|p| p.file == "whitening.md"));
}

#[tokio::test]
async fn reload_from_directory() {
    let tmp = tempfile::TempDir::new().unwrap();
    std::fs::write(tmp.path().join("contacts.md"), common::CONTACTS).unwrap();
    let pipeline = RetrievalPipeline::from_corpus(common::empty_corpus(), common::config(), common::offline())
        .await
        .expect("pipeline");
    let info = pipeline.reload_from_dir(tmp.path()).await.expect("reload");
    assert_eq!(info.documents, 1);
    assert!(pipeline.reload_from_dir(&tmp.path().join("missing")).await.is_err());
    assert_eq!(pipeline.snapshot().corpus.documents().len(), 1, "failed reload keeps the current snapshot");
}

#[tokio::test]
async fn punctuated_headings_and_aliases_match_exactly() {
    let corpus = CorpusBuilder::new(&CorpusConfig::default())
        .expect("builder")
        .build_from_sources([("pain.md", PAIN)])
        .expect("corpus");
    let pipeline = RetrievalPipeline::from_corpus(corpus, common::config(), common::offline()).await.expect("pipeline");

    for query in ["Больно ли?", "больно ли", "Это больно?", "страшно ли", "Нужна ли анестезия?"] {
        let result = pipeline.retrieve(&QueryRequest::new(query)).await;
        assert_eq!(result.fast_path, Some(FastPathKind::ExactSection), "{query}");
        let top = &result.passages[0];
        assert_eq!(top.chunk_id, "pain.md#больно-ли", "{query}");
        assert!(top.pinned, "{query}");
        assert!(result.decision.accepted, "{query}");
    }
}

async fn assert_every_alias_pins_its_target(corpus: Corpus) {
    let expected: Vec<(String, String)> = corpus
        .aliases()
        .iter()
        .map(|(key, entry)| {
            let target = corpus.resolve(&entry.file, &entry.section_id).expect("alias target");
            (key.clone(), target.id.clone())
        })
        .collect();
    assert!(!expected.is_empty());
    let pipeline = RetrievalPipeline::from_corpus(corpus, common::config(), common::offline()).await.expect("pipeline");

    for (key, target) in expected {
        let result = pipeline.retrieve(&QueryRequest::new(key.clone())).await;
        let top = result.passages.first().expect("passages");
        assert_eq!(top.chunk_id, target, "alias '{key}'");
        assert!(top.pinned, "alias '{key}'");
        assert!(result.decision.accepted, "alias '{key}'");
        assert_eq!(result.decision.bypass_reason, Some(BypassReason::ExactSectionMatch), "alias '{key}'");
    }
}

#[tokio::test]
async fn every_registered_alias_pins_its_target() {
    let builder = CorpusBuilder::new(&CorpusConfig::default()).expect("builder");
    assert_every_alias_pins_its_target(common::corpus()).await;
    assert_every_alias_pins_its_target(builder.build_from_sources([("pain.md", PAIN)]).expect("corpus")).await;

    let knowledge = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../knowledge");
    assert_every_alias_pins_its_target(builder.build_from_dir(&knowledge).expect("knowledge corpus")).await;
}

#[tokio::test]
async fn fired_theme_raises_the_same_passage() {
    let pipeline = common::pipeline().await;
    let cases = [
        ("местной анестезией", "safety", "safety.md#безопасность-имплантации", 0.15),
        ("москва метро", "contacts", "contacts.md#адрес", 0.2),
    ];
    for (query, topic, chunk_id, weight) in cases {
        let plain = pipeline.retrieve(&QueryRequest::new(query)).await;
        let hinted = pipeline
            .retrieve(&QueryRequest { query: query.into(), theme_hint: Some(topic.into()), jump: None })
            .await;
        assert!(plain.themes.is_empty(), "{query}");
        assert_eq!(hinted.themes, vec![topic.to_string()], "{query}");

        let find = |passages: &[kbrag_hybrid::Passage]| passages.iter().find(|p| p.chunk_id == chunk_id).cloned().expect("passage");
        let before = find(&plain.passages);
        let after = find(&hinted.passages);
        assert_eq!(before.scores.theme_bonus, 0.0, "{query}");
        assert!((after.scores.theme_bonus - weight).abs() < 1e-6, "{query}");
        assert!(after.scores.final_score > before.scores.final_score, "{query}");
    }
}

#[tokio::test]
async fn one_shared_word_does_not_make_an_off_topic_query_relevant() {
    let query = "квантовая хромодинамика клиники";
    let pipeline = common::pipeline().await;
    let result = pipeline.retrieve(&QueryRequest::new(query)).await;
    assert_eq!(result.fast_path, None);
    assert_eq!(result.passages[0].chunk_id, "contacts.md#hours");
    assert!((result.passages[0].scores.lexical - 1.0).abs() < 1e-6);
    assert!(!result.decision.accepted);
    assert_eq!(result.notice, Some(LOW_RELEVANCE));

    // the relative lexical score alone clears the threshold
    let collaborators = Collaborators { classifier: None, ..common::offline() };
    let bare = RetrievalPipeline::from_corpus(common::corpus(), common::config(), collaborators).await.expect("pipeline");
    let result = bare.retrieve(&QueryRequest::new(query)).await;
    assert!(result.decision.accepted);
    assert!(result.decision.confidence >= 0.6);
}

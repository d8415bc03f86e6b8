use kbrag_core::config::CorpusConfig;
use kbrag_core::{Corpus, CorpusBuilder};
use kbrag_text::LexicalIndex;

fn corpus() -> Corpus {
    let docs = [
        (
            "contacts.md",
            "---\ntopic: contacts\n---\n## Часы работы\n<!-- aliases: [график] -->\nКлиника работает ежедневно, телефон +7 495 123 45 67.\n",
        ),
        (
            "prices.md",
            "---\ntopic: prices\n---\n## Стоимость имплантации\nИмплантация под ключ стоит от 45 000 руб. Клиника даёт рассрочку.\n",
        ),
        (
            "safety.md",
            "---\ntopic: safety\n---\n## Безопасность\nИмплантация проходит под анестезией, приживаемость 98%. Клиника стерильна.\n",
        ),
    ];
    CorpusBuilder::new(&CorpusConfig::default()).expect("builder").build_from_sources(docs).expect("corpus")
}

#[test]
fn ranks_by_bm25_with_stemming() {
    let corpus = corpus();
    let index = LexicalIndex::build(corpus.chunks()).expect("index");
    assert_eq!(index.len(), 3);

    let hits = index.score("сколько стоит имплантация?", 10).expect("search");
    assert!(!hits.is_empty());
    assert_eq!(hits[0].id, "prices.md#стоимость-имплантации");
    for pair in hits.windows(2) { assert!(pair[0].score >= pair[1].score); }
}

#[test]
fn alias_text_is_searchable() {
    let corpus = corpus();
    let index = LexicalIndex::build(corpus.chunks()).expect("index");
    let hits = index.score("график", 5).expect("search");
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].id, "contacts.md#часы-работы");
}

#[test]
fn common_terms_weigh_less_than_rare_ones() {
    let corpus = corpus();
    let index = LexicalIndex::build(corpus.chunks()).expect("index");
    // "клиника" occurs everywhere, "рассрочку" once
    let common = index.score("клиника", 5).expect("search");
    let rare = index.score("рассрочку", 5).expect("search");
    assert_eq!(common.len(), 3);
    assert_eq!(rare.len(), 1);
    assert!(rare[0].score > common[0].score);
}

#[test]
fn deterministic_and_tolerant_of_query_syntax() {
    let corpus = corpus();
    let index = LexicalIndex::build(corpus.chunks()).expect("index");
    let a = index.score("имплантация: \"анестезия\" -боль", 5).expect("search");
    let b = index.score("имплантация: \"анестезия\" -боль", 5).expect("search");
    let ids_a: Vec<_> = a.iter().map(|h| (&h.id, h.score)).collect();
    let ids_b: Vec<_> = b.iter().map(|h| (&h.id, h.score)).collect();
    assert_eq!(ids_a, ids_b);
    assert!(index.score("", 5).expect("empty query").is_empty());
    assert!(index.score("имплантация", 0).expect("k = 0").is_empty());
    assert!(index.score("квантовая хромодинамика", 5).expect("no match").is_empty());
}

#[test]
fn empty_corpus_returns_nothing() {
    let index = LexicalIndex::build(&[]).expect("index");
    assert!(index.is_empty());
    assert!(index.score("что угодно", 5).expect("search").is_empty());
}

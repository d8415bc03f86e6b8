#![allow(dead_code)]

use std::sync::Arc;

use kbrag_core::config::{CorpusConfig, DefaultTarget, RetrievalConfig, ThemeRuleConfig, VectorBackendKind};
use kbrag_core::traits::Embedder;
use kbrag_core::{Corpus, CorpusBuilder};
use kbrag_embed::HashEmbedder;
use kbrag_hybrid::{Collaborators, LexicalOverlapClassifier, RetrievalPipeline};

pub const CONTACTS: &str = r#"---
title: Контакты клиники
doc_type: info
topic: contacts
aliases: [как добраться]
cta_text: Записаться
cta_link: /booking
---
## Часы работы {#hours}
<!-- aliases: [часы работы, график работы] -->
График работы клиники: ежедневно с 9:00 до 21:00. Телефон +7 (495) 123-45-67.

## Адрес
Москва, ул. Примерная, д. 1, рядом с метро. Телефон +7 (495) 123-45-67.
"#;

pub const PRICES: &str = r#"---
title: Цены
doc_type: info
topic: prices
---
## Стоимость имплантации
Имплантация под ключ стоит от 45 000 руб. Цена включает имплант и коронку.

## Рассрочка
Рассрочка без переплаты на 12 месяцев, первый взнос от 5 000 руб.
"#;

pub const IMPLANTS: &str = r#"---
title: Виды имплантации
doc_type: catalog
topic: implants
---
## Методики
Обзор методик, приживаемость 98%.

### All-on-4
<!-- aliases: [все на четырех] -->
Протез на четырёх имплантах, стоимость от 250 000 руб.

### Одноэтапная имплантация
Имплант и временная коронка в один визит, приживаемость 95%.
"#;

pub const SAFETY: &str = r#"---
title: Безопасность
doc_type: info
topic: safety
---
## Безопасность имплантации
Имплантация проходит под местной анестезией, осложнения реже 2% случаев.
"#;

pub fn corpus() -> Corpus {
    CorpusBuilder::new(&CorpusConfig::default())
        .expect("builder")
        .build_from_sources([
            ("contacts.md", CONTACTS),
            ("prices.md", PRICES),
            ("implants.md", IMPLANTS),
            ("safety.md", SAFETY),
        ])
        .expect("corpus")
}

pub fn empty_corpus() -> Corpus {
    CorpusBuilder::new(&CorpusConfig::default())
        .expect("builder")
        .build_from_sources(Vec::<(&str, &str)>::new())
        .expect("corpus")
}

pub fn themes() -> Vec<ThemeRuleConfig> {
    vec![
        ThemeRuleConfig {
            topic: "contacts".into(),
            pattern: Some("адрес|телефон|как добраться".into()),
            aliases: vec!["часы работы".into()],
            weight: 0.2,
            default_target: None,
        },
        ThemeRuleConfig {
            topic: "prices".into(),
            pattern: Some("цен|стоим|сколько стоит".into()),
            aliases: vec![],
            weight: 0.2,
            default_target: Some(DefaultTarget { file: "prices.md".into(), section_id: None }),
        },
        ThemeRuleConfig {
            topic: "safety".into(),
            pattern: Some("безопасн|больно|осложнен".into()),
            aliases: vec![],
            weight: 0.15,
            default_target: None,
        },
    ]
}

pub fn config() -> RetrievalConfig {
    let mut cfg = RetrievalConfig { themes: themes(), ..RetrievalConfig::default() };
    cfg.vector.backend = VectorBackendKind::BruteForce;
    cfg
}

pub fn offline() -> Collaborators {
    let embedder: Arc<dyn Embedder> = Arc::new(HashEmbedder::new(1024));
    Collaborators { embedder: Some(embedder), paraphraser: None, classifier: Some(Arc::new(LexicalOverlapClassifier)) }
}

pub async fn pipeline() -> RetrievalPipeline {
    RetrievalPipeline::from_corpus(corpus(), config(), offline()).await.expect("pipeline")
}

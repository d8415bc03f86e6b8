mod common;

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use kbrag_core::config::GuardConfig;
use kbrag_core::types::Chunk;
use kbrag_hybrid::fusion::dedup_max;
use kbrag_hybrid::{Candidate, GuardSignals, RelevanceGuard, ThemeRouter};
use proptest::prelude::*;

fn chunks() -> Vec<Arc<Chunk>> {
    common::corpus().chunks().to_vec()
}

proptest! {
    #[test]
    fn dedup_keeps_one_entry_per_id_with_max_score(entries in prop::collection::vec((0usize..8, 0.0f32..1.0), 0..40)) {
        let chunks = chunks();
        let pool: Vec<Candidate> = entries
            .iter()
            .enumerate()
            .map(|(i, (c, s))| Candidate::from_search(chunks[c % chunks.len()].clone(), *s, 0.0, *s, i))
            .collect();
        let mut best: HashMap<String, f32> = HashMap::new();
        for cand in &pool {
            let e = best.entry(cand.id().to_string()).or_insert(f32::MIN);
            *e = e.max(cand.pool_score());
        }

        let deduped = dedup_max(pool);
        let ids: BTreeSet<&str> = deduped.iter().map(Candidate::id).collect();
        prop_assert_eq!(ids.len(), deduped.len());
        prop_assert_eq!(ids.len(), best.len());
        for cand in &deduped {
            prop_assert_eq!(cand.pool_score(), best[cand.id()]);
        }
    }

    #[test]
    fn raising_the_threshold_never_accepts_more(scores in prop::collection::vec(0.0f32..1.5, 1..6), a in 0.0f32..1.5, b in 0.0f32..1.5) {
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        let lenient = RelevanceGuard::new(GuardConfig { threshold: low, ..GuardConfig::default() });
        let strict = RelevanceGuard::new(GuardConfig { threshold: high, ..GuardConfig::default() });
        let strict_ok = strict.evaluate(&scores, GuardSignals::default()).accepted;
        let lenient_ok = lenient.evaluate(&scores, GuardSignals::default()).accepted;
        prop_assert!(!strict_ok || lenient_ok);
    }

    #[test]
    fn raising_a_score_never_rejects(scores in prop::collection::vec(0.0f32..1.0, 1..6), idx in 0usize..6, delta in 0.0f32..1.0) {
        let guard = RelevanceGuard::new(GuardConfig::default());
        let before = guard.evaluate(&scores, GuardSignals::default()).accepted;
        let mut raised = scores.clone();
        let i = idx % raised.len();
        raised[i] += delta;
        let after = guard.evaluate(&raised, GuardSignals::default()).accepted;
        prop_assert!(!before || after);
    }

    #[test]
    fn exact_section_match_always_accepts(scores in prop::collection::vec(0.0f32..1.0, 0..6), threshold in 0.0f32..10.0) {
        let guard = RelevanceGuard::new(GuardConfig { threshold, ..GuardConfig::default() });
        let signals = GuardSignals { exact_section_match: true, ..GuardSignals::default() };
        prop_assert!(guard.evaluate(&scores, signals).accepted);
    }

    #[test]
    fn theme_boost_is_strictly_higher_for_a_detected_topic(score in 0.0f32..1.0) {
        let router = ThemeRouter::new(&common::themes());
        let detected = router.detect("какой у вас телефон");
        prop_assert!(router.boost(score, "contacts", &detected) > score);
        prop_assert_eq!(router.boost(score, "prices", &detected), score);
    }
}

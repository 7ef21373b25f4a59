//! Journey: metadata filters and the interplay of broad and targeted passes

use music_rag_core::{RagError, RetrievalQuery, RetrievalType, TARGETED_BOOST};
use music_rag_e2e_tests::harness::TestEnvironment;
use music_rag_e2e_tests::mocks::TestDataFactory;

fn scenario_env() -> TestEnvironment {
    let env = TestEnvironment::new_temp();
    let items = TestDataFactory::pass_scenario();
    env.index_all(vec![items.both, items.text_only, items.filter_only]);
    env
}

#[test]
fn test_targeted_only_respects_genre_filter() {
    let env = TestEnvironment::seeded();
    let query = RetrievalQuery::text("guitar")
        .with_genres(["Rock", "Blues"])
        .with_passes(false, true);

    let results = env.engine.retrieve(&query, env.catalog.as_ref()).unwrap();

    let mut ids: Vec<&str> = results.iter().map(|r| r.id()).collect();
    ids.sort();
    assert_eq!(ids, vec!["blues-1", "rock-1", "rock-2"]);
    assert!(results.iter().all(|r| r.retrieval_type == RetrievalType::Targeted));
}

#[test]
fn test_origin_filter() {
    let env = TestEnvironment::seeded();
    let query = RetrievalQuery::text("guitar drums")
        .with_origins(["British"])
        .with_passes(false, true);

    let results = env.engine.retrieve(&query, env.catalog.as_ref()).unwrap();
    assert_eq!(results.len(), 2);
    assert!(results
        .iter()
        .all(|r| r.music_item.metadata.cultural_origin.as_deref() == Some("British")));
}

#[test]
fn test_only_first_mood_is_applied() {
    let env = TestEnvironment::seeded();
    let query = RetrievalQuery::text("piano guitar synth")
        .with_moods(["calm", "energetic"])
        .with_passes(false, true);

    let results = env.engine.retrieve(&query, env.catalog.as_ref()).unwrap();
    assert_eq!(results.len(), 5);
    assert!(results
        .iter()
        .all(|r| r.music_item.metadata.mood.iter().any(|m| m == "calm")));
}

#[test]
fn test_filter_without_targeted_pass_is_ignored() {
    let env = TestEnvironment::seeded();
    let query = RetrievalQuery::text("guitar")
        .with_genres(["Rock"])
        .with_passes(true, false)
        .with_top_k(10);

    let results = env.engine.retrieve(&query, env.catalog.as_ref()).unwrap();
    assert_eq!(results.len(), 10);
    assert!(results
        .iter()
        .any(|r| r.music_item.metadata.genre.as_deref() != Some("Rock")));
}

#[test]
fn test_no_passes_returns_nothing() {
    let env = TestEnvironment::seeded();
    let query = RetrievalQuery::text("guitar")
        .with_genres(["Rock"])
        .with_passes(false, false);
    assert!(env.engine.retrieve(&query, env.catalog.as_ref()).unwrap().is_empty());
}

#[test]
fn test_boost_lifts_filtered_match_above_text_match() {
    let env = scenario_env();
    let query = RetrievalQuery::text("calm piano jazz")
        .with_genres(["Blues"])
        .with_top_k(3);

    let results = env.engine.retrieve(&query, env.catalog.as_ref()).unwrap();
    let ids: Vec<&str> = results.iter().map(|r| r.id()).collect();
    assert_eq!(ids, vec!["both", "text-only", "filter-only"]);

    assert_eq!(results[0].retrieval_type, RetrievalType::Targeted);
    assert_eq!(results[1].retrieval_type, RetrievalType::Broad);
    assert_eq!(results[2].retrieval_type, RetrievalType::Targeted);
}

#[test]
fn test_targeted_score_is_boosted_broad_score() {
    let env = scenario_env();
    let base = RetrievalQuery::text("calm piano jazz").with_top_k(3);

    let broad = env
        .engine
        .retrieve(&base.clone().with_passes(true, false), env.catalog.as_ref())
        .unwrap();
    let targeted = env
        .engine
        .retrieve(
            &base.with_genres(["Blues"]).with_passes(false, true),
            env.catalog.as_ref(),
        )
        .unwrap();

    let broad_both = broad.iter().find(|r| r.id() == "both").unwrap();
    let targeted_both = targeted.iter().find(|r| r.id() == "both").unwrap();
    assert!((targeted_both.score - broad_both.score * TARGETED_BOOST).abs() < 1e-5);
}

#[test]
fn test_each_item_appears_once() {
    let env = TestEnvironment::seeded();
    let query = RetrievalQuery::text("calm piano jazz")
        .with_genres(["Jazz"])
        .with_top_k(10);

    let results = env.engine.retrieve(&query, env.catalog.as_ref()).unwrap();
    let mut ids: Vec<&str> = results.iter().map(|r| r.id()).collect();
    let total = ids.len();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), total);

    // Items matching the filter surface as targeted
    for result in &results {
        if result.music_item.metadata.genre.as_deref() == Some("Jazz") {
            assert_eq!(result.retrieval_type, RetrievalType::Targeted);
        }
    }
}

#[test]
fn test_top_k_truncates_merged_results() {
    let env = scenario_env();
    let query = RetrievalQuery::text("calm piano jazz")
        .with_genres(["Blues"])
        .with_top_k(2);

    let results = env.engine.retrieve(&query, env.catalog.as_ref()).unwrap();
    let ids: Vec<&str> = results.iter().map(|r| r.id()).collect();
    assert_eq!(ids, vec!["both", "text-only"]);
}

#[test]
fn test_inverted_tempo_range_rejected() {
    let env = TestEnvironment::seeded();
    let mut query = RetrievalQuery::text("jazz");
    query.tempo_range = Some((140.0, 60.0));

    let err = env.engine.retrieve(&query, env.catalog.as_ref()).unwrap_err();
    assert!(matches!(err, RagError::Validation(_)));
}

//! Adversarial input: out-of-range parameters and odd text

use music_rag_core::{MusicItem, RetrievalQuery, MAX_TOP_K};
use music_rag_e2e_tests::harness::TestEnvironment;
use music_rag_e2e_tests::mocks::TestDataFactory;

#[test]
fn test_out_of_range_parameters_rejected() {
    let env = TestEnvironment::seeded();
    let cases = [
        RetrievalQuery::text("jazz").with_top_k(0),
        RetrievalQuery::text("jazz").with_top_k(MAX_TOP_K + 1),
        RetrievalQuery::text("jazz").with_semantic_weight(1.5),
        RetrievalQuery::text("jazz").with_semantic_weight(-0.1),
        RetrievalQuery::text("jazz").with_semantic_weight(f32::NAN),
    ];

    for query in cases {
        let err = env.engine.retrieve(&query, env.catalog.as_ref()).unwrap_err();
        assert!(err.is_validation(), "expected validation error for {:?}", query);
    }
}

#[test]
fn test_top_k_larger_than_catalog() {
    let env = TestEnvironment::seeded();
    let results = env
        .engine
        .retrieve(&RetrievalQuery::text("music").with_top_k(MAX_TOP_K), env.catalog.as_ref())
        .unwrap();
    assert_eq!(results.len(), 10);
}

#[test]
fn test_unusual_query_text() {
    let env = TestEnvironment::seeded();
    let long = "jazz ".repeat(5_000);
    let queries = ["   ", "🎷🎹", "ジャズ ピアノ", "'; DROP TABLE items; --", long.as_str()];

    for text in queries {
        let results = env
            .engine
            .search_by_text(text, 5, env.catalog.as_ref())
            .unwrap();
        assert!(results.len() <= 5);
    }
    assert_eq!(env.item_count(), 10);
}

#[test]
fn test_filter_matching_nothing() {
    let env = TestEnvironment::seeded();
    let query = RetrievalQuery::text("jazz")
        .with_genres(["Polka"])
        .with_passes(false, true);
    assert!(env.engine.retrieve(&query, env.catalog.as_ref()).unwrap().is_empty());
}

#[test]
fn test_blank_item_id_rejected() {
    let env = TestEnvironment::new_temp();
    let err = env
        .indexer
        .index(MusicItem::new("  ", "Untitled", "Nobody"))
        .unwrap_err();
    assert!(err.is_validation());

    let mut batch = TestDataFactory::batch(3);
    batch[1].id = String::new();
    assert!(env.indexer.index_batch(batch).unwrap_err().is_validation());
    assert_eq!(env.item_count(), 0);
}

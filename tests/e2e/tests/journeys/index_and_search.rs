//! Journey: index a catalog, then search it by text, audio and with reranking

use std::path::Path;

use music_rag_core::store::Modality;
use music_rag_core::{RetrievalQuery, RetrievalType};
use music_rag_e2e_tests::harness::TestEnvironment;
use music_rag_e2e_tests::mocks::TestDataFactory;

#[test]
fn test_index_populates_store_and_catalog() {
    let env = TestEnvironment::new_temp();
    let indexed = env.index_all(TestDataFactory::catalog());

    assert_eq!(indexed.len(), 10);
    assert_eq!(env.item_count(), 10);
    assert_eq!(env.vector_count(Modality::Text), 10);
    // Only three fixture items carry audio
    assert_eq!(env.vector_count(Modality::Audio), 3);
    assert!(indexed.iter().all(|i| i.text_embedding.is_some()));
}

#[test]
fn test_text_search_finds_closest_item_first() {
    let env = TestEnvironment::seeded();
    let results = env
        .engine
        .search_by_text("distorted guitar rock energetic drums", 5, env.catalog.as_ref())
        .unwrap();

    assert!(!results.is_empty());
    assert!(results.len() <= 5);
    assert_eq!(results[0].id(), "rock-1");
    assert!(results.iter().all(|r| r.retrieval_type == RetrievalType::Broad));
    assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
}

#[test]
fn test_results_carry_full_items() {
    let env = TestEnvironment::seeded();
    let results = env
        .engine
        .search_by_text("calm piano jazz", 3, env.catalog.as_ref())
        .unwrap();

    let top = &results[0].music_item;
    assert_eq!(top.metadata.genre.as_deref(), Some("Jazz"));
    assert!(!top.title.is_empty());
    assert!(top.text_embedding.is_some());
}

#[test]
fn test_audio_only_search() {
    let env = TestEnvironment::seeded();
    let results = env
        .engine
        .search_by_audio(Path::new("queries/piano_jazz_calm.wav"), 5, env.catalog.as_ref())
        .unwrap();

    // Only items with audio vectors can match an audio-only query
    assert_eq!(results.len(), 3);
    assert_eq!(results[0].id(), "jazz-1");
    // Audio-only queries score by audio similarity alone
    assert!((results[0].score - 1.0).abs() < 1e-4);
}

#[test]
fn test_undecodable_audio_query_degrades() {
    let env = TestEnvironment::seeded();
    let results = env
        .engine
        .search_by_audio(Path::new("queries/corrupt.wav"), 5, env.catalog.as_ref())
        .unwrap();

    // Zero query vector: every audio item is equally distant
    assert_eq!(results.len(), 3);
    let first = results[0].score;
    assert!(results.iter().all(|r| (r.score - first).abs() < 1e-6));
}

#[test]
fn test_semantic_weight_shifts_modalities() {
    let env = TestEnvironment::seeded();
    let mut query = RetrievalQuery::text("guitar rock energetic").with_top_k(3);
    query.audio_path = Some("queries/synth_electronic_energetic.wav".into());

    let text_heavy = env
        .engine
        .retrieve(&query.clone().with_semantic_weight(1.0), env.catalog.as_ref())
        .unwrap();
    let audio_heavy = env
        .engine
        .retrieve(&query.with_semantic_weight(0.0), env.catalog.as_ref())
        .unwrap();

    assert_eq!(text_heavy[0].id(), "rock-1");
    assert_eq!(audio_heavy[0].id(), "elec-1");
}

#[test]
fn test_rerank_orders_by_reranker_score() {
    let env = TestEnvironment::seeded();
    let query = RetrievalQuery::text("guitar energetic").with_top_k(5);
    let results = env
        .engine
        .retrieve_with_rerank(&query, env.catalog.as_ref())
        .unwrap();

    assert!(!results.is_empty());
    assert!(results.iter().all(|r| r.rerank_score.is_some()));
    assert_eq!(results[0].id(), "rock-1");
    assert_eq!(results[0].rerank_score, Some(2.0));
    assert!(results
        .windows(2)
        .all(|w| w[0].rerank_score >= w[1].rerank_score));
}

#[test]
fn test_empty_queries_return_nothing() {
    let env = TestEnvironment::seeded();

    let none = env
        .engine
        .retrieve(&RetrievalQuery::default(), env.catalog.as_ref())
        .unwrap();
    assert!(none.is_empty());

    let blank = env
        .engine
        .retrieve(&RetrievalQuery::text(""), env.catalog.as_ref())
        .unwrap();
    assert!(blank.is_empty());
}

#[test]
fn test_remove_item() {
    let env = TestEnvironment::seeded();
    assert!(env.indexer.remove("rock-1").unwrap());
    assert!(!env.indexer.remove("rock-1").unwrap());

    let results = env
        .engine
        .search_by_text("distorted guitar rock energetic drums", 10, env.catalog.as_ref())
        .unwrap();
    assert!(results.iter().all(|r| r.id() != "rock-1"));
    assert_eq!(env.item_count(), 9);
}

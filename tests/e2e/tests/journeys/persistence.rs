//! Journey: indexed data survives closing and reopening storage

use music_rag_core::store::Modality;
use music_rag_core::{ItemCache, RetrievalQuery};
use music_rag_e2e_tests::harness::TestEnvironment;
use music_rag_e2e_tests::mocks::TestDataFactory;
use tempfile::TempDir;

#[test]
fn test_reopen_keeps_vectors_and_items() {
    let dir = TempDir::new().unwrap();
    let query = RetrievalQuery::text("calm piano jazz").with_top_k(3);

    let before: Vec<String> = {
        let env = TestEnvironment::open_at(dir.path());
        env.index_all(TestDataFactory::catalog());
        env.engine
            .retrieve(&query, env.catalog.as_ref())
            .unwrap()
            .iter()
            .map(|r| r.id().to_string())
            .collect()
    };

    let env = TestEnvironment::open_at(dir.path());
    assert_eq!(env.item_count(), 10);
    assert_eq!(env.vector_count(Modality::Text), 10);
    assert_eq!(env.vector_count(Modality::Audio), 3);

    let after: Vec<String> = env
        .engine
        .retrieve(&query, env.catalog.as_ref())
        .unwrap()
        .iter()
        .map(|r| r.id().to_string())
        .collect();
    assert_eq!(before, after);
}

#[test]
fn test_reindex_replaces_item() {
    let env = TestEnvironment::seeded();
    let mut updated = TestDataFactory::catalog().remove(0);
    updated.title = "Piano Nocturne (Remastered)".to_string();
    updated.metadata.genre = Some("Blues".to_string());
    env.index_all(vec![updated]);

    assert_eq!(env.item_count(), 10);
    assert_eq!(env.vector_count(Modality::Text), 10);

    let stored = env.catalog.get_item("jazz-1").unwrap().unwrap();
    assert_eq!(stored.title, "Piano Nocturne (Remastered)");

    let query = RetrievalQuery::text("piano")
        .with_genres(["Blues"])
        .with_passes(false, true);
    let results = env.engine.retrieve(&query, env.catalog.as_ref()).unwrap();
    assert!(results.iter().any(|r| r.id() == "jazz-1"));
}

#[test]
fn test_unflushed_vectors_are_not_persisted() {
    let dir = TempDir::new().unwrap();
    {
        let env = TestEnvironment::open_at(dir.path());
        env.indexer
            .index_batch(TestDataFactory::batch(4))
            .unwrap();
    }

    let env = TestEnvironment::open_at(dir.path());
    // The catalog writes through; the memory store only persists on flush
    assert_eq!(env.item_count(), 4);
    assert_eq!(env.vector_count(Modality::Text), 0);
}

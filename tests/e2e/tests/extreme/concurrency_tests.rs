//! Concurrency: parallel searches and indexing against one environment

use std::sync::Arc;
use std::thread;

use music_rag_core::store::Modality;
use music_rag_core::RetrievalQuery;
use music_rag_e2e_tests::harness::TestEnvironment;
use music_rag_e2e_tests::mocks::TestDataFactory;

#[test]
fn test_parallel_searches_agree() {
    let env = Arc::new(TestEnvironment::seeded());
    let query = RetrievalQuery::text("guitar energetic")
        .with_genres(["Rock"])
        .with_top_k(5);
    let expected: Vec<String> = env
        .engine
        .retrieve(&query, env.catalog.as_ref())
        .unwrap()
        .iter()
        .map(|r| r.id().to_string())
        .collect();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let env = Arc::clone(&env);
            let query = query.clone();
            thread::spawn(move || {
                (0..20)
                    .map(|_| {
                        env.engine
                            .retrieve(&query, env.catalog.as_ref())
                            .unwrap()
                            .iter()
                            .map(|r| r.id().to_string())
                            .collect::<Vec<_>>()
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    for handle in handles {
        for ids in handle.join().unwrap() {
            assert_eq!(ids, expected);
        }
    }
}

#[test]
fn test_search_while_indexing() {
    let env = TestEnvironment::seeded();
    let batches: Vec<_> = TestDataFactory::batch(200)
        .chunks(25)
        .map(|c| c.to_vec())
        .collect();

    thread::scope(|scope| {
        scope.spawn(|| {
            for batch in batches {
                env.indexer.index_batch(batch).unwrap();
            }
        });

        for _ in 0..4 {
            scope.spawn(|| {
                for _ in 0..25 {
                    let results = env
                        .engine
                        .search_by_text("calm piano jazz", 10, env.catalog.as_ref())
                        .unwrap();
                    assert!(results.len() <= 10);
                    assert!(results.windows(2).all(|w| w[0].score >= w[1].score));
                }
            });
        }
    });

    assert_eq!(env.item_count(), 210);
    assert_eq!(env.vector_count(Modality::Text), 210);
}

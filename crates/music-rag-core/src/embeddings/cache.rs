//! Query Embedding Cache
//!
//! Repeated queries skip the model. Batch embedding (used by indexing)
//! bypasses the cache.

use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::Mutex;

use super::{EmbeddingError, TextEmbedder};

/// Default number of cached query embeddings
pub const DEFAULT_CACHE_CAPACITY: usize = 100;

/// LRU-caching decorator around a text embedder
pub struct CachedTextEmbedder<E> {
    inner: E,
    cache: Mutex<LruCache<String, Vec<f32>>>,
}

impl<E: TextEmbedder> CachedTextEmbedder<E> {
    /// Wrap `inner` with a cache of `capacity` entries (minimum 1)
    pub fn new(inner: E, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            inner,
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Number of cached entries
    pub fn cached(&self) -> usize {
        self.cache.lock().map(|c| c.len()).unwrap_or(0)
    }

    /// The wrapped embedder
    pub fn inner(&self) -> &E {
        &self.inner
    }
}

impl<E: TextEmbedder> TextEmbedder for CachedTextEmbedder<E> {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        // Check cache first
        {
            let mut cache = self
                .cache
                .lock()
                .map_err(|_| EmbeddingError::EmbeddingFailed("Query cache lock poisoned".into()))?;
            if let Some(cached) = cache.get(text) {
                return Ok(cached.clone());
            }
        }

        let embedding = self.inner.embed(text)?;

        {
            let mut cache = self
                .cache
                .lock()
                .map_err(|_| EmbeddingError::EmbeddingFailed("Query cache lock poisoned".into()))?;
            cache.put(text.to_string(), embedding.clone());
        }

        Ok(embedding)
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        self.inner.embed_batch(texts)
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }

    fn model_name(&self) -> &str {
        self.inner.model_name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        calls: AtomicUsize,
    }

    impl TextEmbedder for Counting {
        fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![text.len() as f32, 1.0])
        }

        fn dimensions(&self) -> usize {
            2
        }

        fn model_name(&self) -> &str {
            "counting"
        }
    }

    #[test]
    fn test_repeated_query_hits_cache() {
        let embedder = CachedTextEmbedder::new(Counting { calls: AtomicUsize::new(0) }, 10);

        let a = embedder.embed("jazz").unwrap();
        let b = embedder.embed("jazz").unwrap();
        assert_eq!(a, b);
        assert_eq!(embedder.inner().calls.load(Ordering::SeqCst), 1);
        assert_eq!(embedder.cached(), 1);
    }

    #[test]
    fn test_eviction() {
        let embedder = CachedTextEmbedder::new(Counting { calls: AtomicUsize::new(0) }, 1);
        embedder.embed("a").unwrap();
        embedder.embed("b").unwrap();
        embedder.embed("a").unwrap();
        assert_eq!(embedder.inner().calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_zero_capacity_is_clamped() {
        let embedder = CachedTextEmbedder::new(Counting { calls: AtomicUsize::new(0) }, 0);
        embedder.embed("a").unwrap();
        assert_eq!(embedder.cached(), 1);
    }
}

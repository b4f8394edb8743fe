//! Embedding cache in front of an [`Embedder`].

use std::sync::Arc;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use pagewright_llm::Embedder;
use pagewright_shared::{PagewrightError, Result};
use pagewright_storage::Storage;

/// Serves embeddings from the libSQL cache, embedding only the misses.
///
/// Cache read/write failures are logged and fall through to the inner embedder.
pub struct CachedEmbedder {
    inner: Arc<dyn Embedder>,
    storage: Arc<Storage>,
}

impl CachedEmbedder {
    pub fn new(inner: Arc<dyn Embedder>, storage: Arc<Storage>) -> Self {
        Self { inner, storage }
    }
}

/// Compute SHA-256 hash of content.
fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

#[async_trait]
impl Embedder for CachedEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let model_id = self.inner.model_id();
        let hashes: Vec<String> = texts.iter().map(|t| content_hash(t)).collect();

        let mut vectors: Vec<Option<Vec<f32>>> = Vec::with_capacity(texts.len());
        for hash in &hashes {
            let cached = match self.storage.get_embedding(hash, model_id).await {
                Ok(v) => v,
                Err(e) => {
                    warn!(error = %e, "embedding cache read failed");
                    None
                }
            };
            vectors.push(cached);
        }

        let misses: Vec<usize> = (0..texts.len()).filter(|&i| vectors[i].is_none()).collect();
        debug!(total = texts.len(), misses = misses.len(), "embedding cache lookup");

        if !misses.is_empty() {
            let miss_texts: Vec<String> = misses.iter().map(|&i| texts[i].clone()).collect();
            let fresh = self.inner.embed_documents(&miss_texts).await?;
            if fresh.len() != misses.len() {
                return Err(PagewrightError::Llm(format!(
                    "embedder returned {} vectors for {} texts",
                    fresh.len(),
                    misses.len()
                )));
            }

            for (&i, vector) in misses.iter().zip(fresh) {
                if let Err(e) = self.storage.set_embedding(&hashes[i], model_id, &vector).await {
                    warn!(error = %e, "embedding cache write failed");
                }
                vectors[i] = Some(vector);
            }
        }

        Ok(vectors.into_iter().map(Option::unwrap_or_default).collect())
    }

    fn model_id(&self) -> &str {
        self.inner.model_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeEmbedder;
    use uuid::Uuid;

    async fn temp_storage() -> Arc<Storage> {
        let path = std::env::temp_dir().join(format!("pw_cache_{}.db", Uuid::now_v7()));
        Arc::new(Storage::open(&path).await.unwrap())
    }

    #[test]
    fn hash_is_hex_sha256() {
        let hash = content_hash("hello");
        assert_eq!(hash.len(), 64);
        assert_eq!(
            hash,
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[tokio::test]
    async fn second_call_is_served_from_cache() {
        let inner = Arc::new(FakeEmbedder::default());
        let cached = CachedEmbedder::new(inner.clone(), temp_storage().await);

        let texts = vec!["alpha".to_string(), "beta".to_string()];
        let first = cached.embed_documents(&texts).await.unwrap();
        assert_eq!(inner.embedded_count(), 2);

        let second = cached.embed_documents(&texts).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(inner.embedded_count(), 2, "no new embeddings on a full hit");
    }

    #[tokio::test]
    async fn only_misses_are_embedded_in_order() {
        let inner = Arc::new(FakeEmbedder::default());
        let cached = CachedEmbedder::new(inner.clone(), temp_storage().await);

        cached.embed_documents(&["beta".to_string()]).await.unwrap();
        let vectors = cached
            .embed_documents(&["alpha".to_string(), "beta".to_string(), "gamma".to_string()])
            .await
            .unwrap();

        assert_eq!(inner.embedded_count(), 3);
        assert_eq!(vectors[1], inner.vector_for("beta"));
        assert_eq!(vectors[0], inner.vector_for("alpha"));
        assert_eq!(vectors[2], inner.vector_for("gamma"));
    }

    /// Drops the last vector of every batch.
    struct ShortEmbedder;

    #[async_trait]
    impl Embedder for ShortEmbedder {
        async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts.iter().skip(1).map(|_| vec![1.0, 0.0]).collect())
        }

        fn model_id(&self) -> &str {
            "short"
        }
    }

    #[tokio::test]
    async fn short_inner_response_is_an_error() {
        let cached = CachedEmbedder::new(Arc::new(ShortEmbedder), temp_storage().await);

        let err = cached
            .embed_documents(&["alpha".to_string(), "beta".to_string()])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("1 vectors for 2 texts"));
    }
}

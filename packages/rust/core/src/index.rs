//! In-memory vector index over indexed pages.
//!
//! The index is an explicitly constructed service shared through `Arc`. It
//! starts empty and becomes ready once [`VectorIndex::initialize`] has
//! embedded the startup scan; after that, pages are appended one at a time
//! with [`VectorIndex::add_page`].

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

use pagewright_llm::Embedder;
use pagewright_shared::{IndexedPage, PagewrightError, Result, RetrievedDocument};

/// A page with its embedding.
#[derive(Debug, Clone)]
struct IndexedDocument {
    page: IndexedPage,
    vector: Vec<f32>,
}

/// Lifecycle of the index.
#[derive(Debug)]
enum IndexState {
    Empty,
    Ready {
        docs: Vec<IndexedDocument>,
    },
}

/// Shared, internally synchronized vector index.
pub struct VectorIndex {
    embedder: Arc<dyn Embedder>,
    state: RwLock<IndexState>,
}

impl VectorIndex {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            state: RwLock::new(IndexState::Empty),
        }
    }

    pub async fn is_ready(&self) -> bool {
        matches!(*self.state.read().await, IndexState::Ready { .. })
    }

    /// Number of indexed pages (0 while empty).
    pub async fn len(&self) -> usize {
        match &*self.state.read().await {
            IndexState::Empty => 0,
            IndexState::Ready { docs } => docs.len(),
        }
    }

    /// Embed `pages` in bulk and replace the index contents. Moves to `Ready`.
    #[instrument(skip_all, fields(pages = pages.len()))]
    pub async fn initialize(&self, pages: Vec<IndexedPage>) -> Result<usize> {
        let texts: Vec<String> = pages.iter().map(document_text).collect();
        let vectors = self.embedder.embed_documents(&texts).await?;
        if vectors.len() != pages.len() {
            return Err(PagewrightError::Index(format!(
                "embedder returned {} vectors for {} pages",
                vectors.len(),
                pages.len()
            )));
        }

        let docs: Vec<IndexedDocument> = pages
            .into_iter()
            .zip(vectors)
            .map(|(page, vector)| IndexedDocument { page, vector })
            .collect();
        let count = docs.len();

        *self.state.write().await = IndexState::Ready { docs };
        info!(pages = count, "vector index ready");
        Ok(count)
    }

    /// Append one page. A page already indexed under the same id is replaced.
    ///
    /// Fails while the index is still empty.
    #[instrument(skip_all, fields(page_id = %page.id))]
    pub async fn add_page(&self, page: IndexedPage) -> Result<()> {
        if !self.is_ready().await {
            return Err(PagewrightError::Index("vector index is not initialized".into()));
        }

        let vector = self.embedder.embed_query(&document_text(&page)).await?;

        let mut state = self.state.write().await;
        let IndexState::Ready { docs } = &mut *state else {
            return Err(PagewrightError::Index("vector index is not initialized".into()));
        };
        docs.retain(|d| d.page.id != page.id);
        docs.push(IndexedDocument { page, vector });
        debug!(pages = docs.len(), "page added to index");
        Ok(())
    }

    /// The `k` pages most similar to `query`, by descending cosine similarity.
    ///
    /// Fails while the index is still empty.
    pub async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<RetrievedDocument>> {
        if !self.is_ready().await {
            return Err(PagewrightError::Index("vector index is not initialized".into()));
        }

        let query_vector = self.embedder.embed_query(query).await?;

        let state = self.state.read().await;
        let IndexState::Ready { docs } = &*state else {
            return Err(PagewrightError::Index("vector index is not initialized".into()));
        };

        let mut hits: Vec<RetrievedDocument> = docs
            .iter()
            .map(|doc| RetrievedDocument {
                id: doc.page.id.clone(),
                title: doc.page.title.clone(),
                categories: doc.page.categories.clone(),
                status: doc.page.status.clone(),
                url: doc.page.url.clone(),
                kind: doc.page.kind,
                score: cosine_similarity(&query_vector, &doc.vector),
                content: doc.page.content.clone(),
            })
            .collect();

        hits.sort_by(|a, b| b.score.total_cmp(&a.score));
        hits.truncate(k);
        Ok(hits)
    }
}

/// Text embedded for a page.
fn document_text(page: &IndexedPage) -> String {
    format!("{}\n{}", page.title, page.content)
}

/// Cosine similarity; 0.0 for mismatched or zero-length vectors.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

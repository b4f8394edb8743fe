//! Startup scan that fills the vector index from the source databases.

use std::sync::Arc;
use std::time::Instant;

use tracing::{info, instrument, warn};

use pagewright_shared::{
    Block, DatabaseKind, DocumentStore, IndexedPage, NotionConfig, PageRecord, Result,
};

use crate::index::VectorIndex;

/// Progress callback for reporting the scan.
pub trait LoadProgress: Send + Sync {
    /// Called when a database listing completes.
    fn database_listed(&self, kind: DatabaseKind, pages: usize);
    /// Called after each page's blocks are fetched.
    fn page_loaded(&self, title: &str, current: usize, total: usize);
    /// Called once the index is initialized.
    fn done(&self, indexed: usize);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl LoadProgress for SilentProgress {
    fn database_listed(&self, _kind: DatabaseKind, _pages: usize) {}
    fn page_loaded(&self, _title: &str, _current: usize, _total: usize) {}
    fn done(&self, _indexed: usize) {}
}

/// Scans the backlog and document databases into [`IndexedPage`]s.
pub struct IndexLoader {
    store: Arc<dyn DocumentStore>,
    sources: Vec<(String, DatabaseKind)>,
}

impl IndexLoader {
    pub fn new(store: Arc<dyn DocumentStore>, notion: &NotionConfig) -> Self {
        let sources = [
            (&notion.backlog_database_id, DatabaseKind::Backlog),
            (&notion.document_database_id, DatabaseKind::Document),
        ]
        .into_iter()
        .filter_map(|(id, kind)| id.clone().map(|id| (id, kind)))
        .collect();
        Self { store, sources }
    }

    /// List every page of every configured database and fetch its blocks.
    ///
    /// A page whose blocks cannot be fetched is skipped with a warning; a
    /// database that cannot be listed fails the scan.
    pub async fn collect(&self, progress: &dyn LoadProgress) -> Result<Vec<IndexedPage>> {
        if self.sources.is_empty() {
            warn!("no source databases configured, index starts empty");
        }

        let mut indexed = Vec::new();
        for (database_id, kind) in &self.sources {
            let pages = self.store.list_all_pages(database_id).await?;
            progress.database_listed(*kind, pages.len());
            info!(database = kind.label(), pages = pages.len(), "database listed");

            let total = pages.len();
            for (i, page) in pages.into_iter().enumerate() {
                match self.store.list_child_blocks(&page.id).await {
                    Ok(blocks) => {
                        progress.page_loaded(&page.title, i + 1, total);
                        indexed.push(to_indexed_page(page, &blocks, *kind));
                    }
                    Err(e) => {
                        warn!(page_id = %page.id, error = %e, "skipping page, blocks unavailable");
                    }
                }
            }
        }
        Ok(indexed)
    }

    /// Scan and initialize `index`. Returns the number of indexed pages.
    #[instrument(skip_all, fields(sources = self.sources.len()))]
    pub async fn load(&self, index: &VectorIndex, progress: &dyn LoadProgress) -> Result<usize> {
        let start = Instant::now();
        let pages = self.collect(progress).await?;
        let count = index.initialize(pages).await?;
        progress.done(count);
        info!(pages = count, elapsed_ms = start.elapsed().as_millis() as u64, "index loaded");
        Ok(count)
    }
}

/// Join a page's block contents into an index entry.
pub fn to_indexed_page(page: PageRecord, blocks: &[Block], kind: DatabaseKind) -> IndexedPage {
    let content = blocks
        .iter()
        .map(|b| b.content.as_str())
        .filter(|c| !c.is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    IndexedPage {
        id: page.id,
        title: page.title,
        categories: page.categories,
        status: page.status,
        url: page.url,
        content,
        kind,
    }
}

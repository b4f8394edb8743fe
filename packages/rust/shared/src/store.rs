//! The document-store seam.
//!
//! The pipeline never talks to Notion directly; it goes through
//! [`DocumentStore`], implemented over HTTP by `pagewright-notion` and by
//! in-memory fakes in tests.

use async_trait::async_trait;

use crate::error::Result;
use crate::types::{Block, Comment, CompletionStatus, NativeBlock, PageRecord, PropertyUpdate};

/// One page of a cursor-paginated database query.
#[derive(Debug, Clone, Default)]
pub struct PageBatch {
    pub results: Vec<PageRecord>,
    pub next_cursor: Option<String>,
}

/// Operations the pipeline consumes from the document store.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Direct children of a page or block, in order.
    async fn list_child_blocks(&self, block_id: &str) -> Result<Vec<Block>>;

    /// A single block, including its native kind.
    async fn retrieve_block(&self, block_id: &str) -> Result<Block>;

    /// Page metadata (title, categories, status, parent database).
    async fn retrieve_page(&self, page_id: &str) -> Result<PageRecord>;

    /// Comments attached to a page, with resolved author names.
    async fn list_comments(&self, page_id: &str) -> Result<Vec<Comment>>;

    /// Append `block` as the last child of `block_id`.
    ///
    /// Fails with [`PagewrightError::ChildrenNotSupported`](crate::PagewrightError::ChildrenNotSupported)
    /// when the target's type cannot hold children.
    async fn append_child(&self, block_id: &str, block: &NativeBlock) -> Result<()>;

    /// Replace a block's content in place.
    async fn update_block(&self, block_id: &str, block: &NativeBlock) -> Result<()>;

    async fn delete_block(&self, block_id: &str) -> Result<()>;

    /// Attach a top-level discussion comment to a page.
    async fn create_comment(&self, page_id: &str, text: &str) -> Result<()>;

    async fn update_page_status(&self, page_id: &str, status: CompletionStatus) -> Result<()>;

    async fn update_page_properties(&self, page_id: &str, updates: &[PropertyUpdate])
    -> Result<()>;

    /// One batch of a database query, starting at `cursor`.
    async fn query_database(&self, database_id: &str, cursor: Option<&str>) -> Result<PageBatch>;

    /// Every page of a database, following cursors until exhausted.
    async fn list_all_pages(&self, database_id: &str) -> Result<Vec<PageRecord>> {
        let mut pages = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let batch = self.query_database(database_id, cursor.as_deref()).await?;
            pages.extend(batch.results);
            match batch.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        tracing::debug!(database_id, pages = pages.len(), "database scan complete");
        Ok(pages)
    }
}

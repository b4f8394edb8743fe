//! In-memory fakes of the collaborator traits, for unit tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::Value;

use pagewright_llm::{Embedder, LanguageModel, OutputSchema};
use pagewright_shared::{
    Block, Comment, CompletionStatus, DatabaseKind, DocumentStore, IndexedPage, NativeBlock,
    PageBatch, PageRecord, PagewrightError, PropertyUpdate, Result,
};

pub fn indexed_page(id: &str, title: &str, content: &str, kind: DatabaseKind) -> IndexedPage {
    IndexedPage {
        id: id.into(),
        title: title.into(),
        categories: Vec::new(),
        status: None,
        url: Some(format!("https://www.notion.so/{id}")),
        content: content.into(),
        kind,
    }
}

fn not_found(id: &str) -> PagewrightError {
    PagewrightError::Notion {
        status: 404,
        code: "object_not_found".into(),
        message: format!("Could not find block with ID: {id}"),
    }
}

fn server_error() -> PagewrightError {
    PagewrightError::Notion {
        status: 500,
        code: "internal_server_error".into(),
        message: "Something went wrong".into(),
    }
}

// ---------------------------------------------------------------------------
// Embedder
// ---------------------------------------------------------------------------

const FAKE_DIMENSIONS: usize = 256;

/// Bag-of-words hashing embedder.
#[derive(Default)]
pub struct FakeEmbedder {
    failing: AtomicBool,
    embedded: AtomicUsize,
}

impl FakeEmbedder {
    pub fn fail(&self, on: bool) {
        self.failing.store(on, Ordering::SeqCst);
    }

    /// Total number of texts embedded so far.
    pub fn embedded_count(&self) -> usize {
        self.embedded.load(Ordering::SeqCst)
    }

    pub fn vector_for(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0; FAKE_DIMENSIONS];
        for word in text.to_lowercase().split_whitespace() {
            let hash = word
                .bytes()
                .fold(0xcbf29ce484222325u64, |h, b| (h ^ b as u64).wrapping_mul(0x100000001b3));
            vector[(hash % FAKE_DIMENSIONS as u64) as usize] += 1.0;
        }
        vector
    }
}

#[async_trait]
impl Embedder for FakeEmbedder {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(PagewrightError::Llm("embedding service unavailable".into()));
        }
        self.embedded.fetch_add(texts.len(), Ordering::SeqCst);
        Ok(texts.iter().map(|t| self.vector_for(t)).collect())
    }

    fn model_id(&self) -> &str {
        "fake-embedding"
    }
}

// ---------------------------------------------------------------------------
// Language model
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ModelCall {
    pub system: String,
    pub human: Vec<String>,
    pub schema: OutputSchema,
}

/// Replays scripted responses in order and records every call.
#[derive(Default)]
pub struct FakeModel {
    responses: Mutex<VecDeque<Result<Value>>>,
    calls: Mutex<Vec<ModelCall>>,
}

impl FakeModel {
    pub fn respond(&self, value: Value) {
        self.responses.lock().unwrap().push_back(Ok(value));
    }

    pub fn fail(&self, error: PagewrightError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    pub fn calls(&self) -> Vec<ModelCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl LanguageModel for FakeModel {
    async fn invoke_with_schema(
        &self,
        system: &str,
        human: &[String],
        schema: &OutputSchema,
    ) -> Result<Value> {
        self.calls.lock().unwrap().push(ModelCall {
            system: system.to_string(),
            human: human.to_vec(),
            schema: schema.clone(),
        });
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(PagewrightError::Llm("no scripted response".into())))
    }
}

// ---------------------------------------------------------------------------
// Document store
// ---------------------------------------------------------------------------

/// A mutation the store accepted, in call order.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    Append { parent: String, block: NativeBlock },
    Update { block_id: String, block: NativeBlock },
    Delete { block_id: String },
    Comment { page_id: String, text: String },
    Properties { page_id: String, updates: Vec<PropertyUpdate> },
}

#[derive(Default)]
struct StoreState {
    natives: HashMap<String, NativeBlock>,
    children: HashMap<String, Vec<String>>,
    comments: HashMap<String, Vec<Comment>>,
    pages: HashMap<String, PageRecord>,
    databases: HashMap<String, Vec<PageRecord>>,
    rejects_children: HashSet<String>,
    failing: HashSet<String>,
    fail_listing: bool,
    fail_status_writes: bool,
    statuses: Vec<(String, CompletionStatus)>,
    mutations: Vec<Mutation>,
    next_id: usize,
}

/// A page tree held in memory.
#[derive(Default)]
pub struct FakeStore {
    state: Mutex<StoreState>,
}

impl FakeStore {
    pub fn add_page(&self, record: PageRecord) {
        let mut state = self.state.lock().unwrap();
        if let Some(db) = &record.database_id {
            state.databases.entry(db.clone()).or_default().push(record.clone());
        }
        state.pages.insert(record.id.clone(), record);
    }

    pub fn add_block(&self, parent: &str, block_id: &str, block: NativeBlock) {
        let mut state = self.state.lock().unwrap();
        state.natives.insert(block_id.into(), block);
        state.children.entry(parent.into()).or_default().push(block_id.into());
    }

    pub fn add_comment(&self, page_id: &str, comment: Comment) {
        let mut state = self.state.lock().unwrap();
        state.comments.entry(page_id.into()).or_default().push(comment);
    }

    /// Appends under `block_id` fail with the children-not-supported error.
    pub fn reject_children(&self, block_id: &str) {
        self.state.lock().unwrap().rejects_children.insert(block_id.into());
    }

    /// Every mutation touching `id` fails with a 500.
    pub fn fail_on(&self, id: &str) {
        self.state.lock().unwrap().failing.insert(id.into());
    }

    pub fn fail_listing(&self) {
        self.state.lock().unwrap().fail_listing = true;
    }

    pub fn fail_status_writes(&self) {
        self.state.lock().unwrap().fail_status_writes = true;
    }

    pub fn mutations(&self) -> Vec<Mutation> {
        self.state.lock().unwrap().mutations.clone()
    }

    /// Status values written for `page_id`, in order.
    pub fn statuses(&self, page_id: &str) -> Vec<CompletionStatus> {
        self.state
            .lock()
            .unwrap()
            .statuses
            .iter()
            .filter(|(id, _)| id == page_id)
            .map(|(_, s)| *s)
            .collect()
    }

    pub fn native(&self, block_id: &str) -> Option<NativeBlock> {
        self.state.lock().unwrap().natives.get(block_id).cloned()
    }

    pub fn child_ids(&self, parent: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .children
            .get(parent)
            .cloned()
            .unwrap_or_default()
    }

    fn block_view(block_id: &str, native: &NativeBlock) -> Block {
        Block {
            block_id: block_id.into(),
            content: pagewright_markdown::render(native),
            kind: Some(native.kind()),
            has_children: false,
        }
    }
}

#[async_trait]
impl DocumentStore for FakeStore {
    async fn list_child_blocks(&self, block_id: &str) -> Result<Vec<Block>> {
        let state = self.state.lock().unwrap();
        if state.fail_listing {
            return Err(server_error());
        }
        Ok(state
            .children
            .get(block_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| state.natives.get(id).map(|n| Self::block_view(id, n)))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn retrieve_block(&self, block_id: &str) -> Result<Block> {
        let state = self.state.lock().unwrap();
        state
            .natives
            .get(block_id)
            .map(|n| Self::block_view(block_id, n))
            .ok_or_else(|| not_found(block_id))
    }

    async fn retrieve_page(&self, page_id: &str) -> Result<PageRecord> {
        let state = self.state.lock().unwrap();
        state.pages.get(page_id).cloned().ok_or_else(|| not_found(page_id))
    }

    async fn list_comments(&self, page_id: &str) -> Result<Vec<Comment>> {
        let state = self.state.lock().unwrap();
        if state.fail_listing {
            return Err(server_error());
        }
        Ok(state.comments.get(page_id).cloned().unwrap_or_default())
    }

    async fn append_child(&self, block_id: &str, block: &NativeBlock) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.rejects_children.contains(block_id) {
            return Err(PagewrightError::ChildrenNotSupported {
                block_id: block_id.into(),
            });
        }
        if state.failing.contains(block_id) {
            return Err(server_error());
        }
        state.next_id += 1;
        let id = format!("new-{}", state.next_id);
        state.natives.insert(id.clone(), block.clone());
        state.children.entry(block_id.into()).or_default().push(id);
        state.mutations.push(Mutation::Append {
            parent: block_id.into(),
            block: block.clone(),
        });
        Ok(())
    }

    async fn update_block(&self, block_id: &str, block: &NativeBlock) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.failing.contains(block_id) {
            return Err(server_error());
        }
        if !state.natives.contains_key(block_id) {
            return Err(not_found(block_id));
        }
        state.natives.insert(block_id.into(), block.clone());
        state.mutations.push(Mutation::Update {
            block_id: block_id.into(),
            block: block.clone(),
        });
        Ok(())
    }

    async fn delete_block(&self, block_id: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.failing.contains(block_id) {
            return Err(server_error());
        }
        if state.natives.remove(block_id).is_none() {
            return Err(not_found(block_id));
        }
        for ids in state.children.values_mut() {
            ids.retain(|id| id != block_id);
        }
        state.mutations.push(Mutation::Delete {
            block_id: block_id.into(),
        });
        Ok(())
    }

    async fn create_comment(&self, page_id: &str, text: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.failing.contains(page_id) {
            return Err(server_error());
        }
        state.mutations.push(Mutation::Comment {
            page_id: page_id.into(),
            text: text.into(),
        });
        Ok(())
    }

    async fn update_page_status(&self, page_id: &str, status: CompletionStatus) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_status_writes {
            return Err(PagewrightError::Network("status write timed out".into()));
        }
        state.statuses.push((page_id.into(), status));
        Ok(())
    }

    async fn update_page_properties(
        &self,
        page_id: &str,
        updates: &[PropertyUpdate],
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if state.failing.contains(page_id) {
            return Err(server_error());
        }
        state.mutations.push(Mutation::Properties {
            page_id: page_id.into(),
            updates: updates.to_vec(),
        });
        Ok(())
    }

    /// Two pages per batch, cursor = offset.
    async fn query_database(&self, database_id: &str, cursor: Option<&str>) -> Result<PageBatch> {
        let state = self.state.lock().unwrap();
        let Some(pages) = state.databases.get(database_id) else {
            return Err(not_found(database_id));
        };
        let offset: usize = cursor.and_then(|c| c.parse().ok()).unwrap_or(0);
        let end = (offset + 2).min(pages.len());
        Ok(PageBatch {
            results: pages[offset..end].to_vec(),
            next_cursor: (end < pages.len()).then(|| end.to_string()),
        })
    }
}

//! End-to-end page pipelines: trigger → page → context → model → page.

use std::sync::Arc;
use std::time::Instant;

use tracing::{error, info, instrument};

use pagewright_llm::LanguageModel;
use pagewright_shared::{
    AppConfig, Block, Comment, CompletionStatus, DatabaseKind, DocumentStore, PageRecord,
    PagewrightError, PropertyUpdate, Result,
};

use crate::generator::{CompletionGenerator, GenerationInput};
use crate::index::VectorIndex;
use crate::loader::to_indexed_page;
use crate::locks::PageLocks;
use crate::prompts::PromptStore;
use crate::reconciler::{OperationOutcome, ReconcileMode, Reconciler};
use crate::retriever::ContextRetriever;
use crate::status::StatusTracker;

/// Result of a completion run.
#[derive(Debug)]
pub struct CompletionReport {
    pub page_id: String,
    pub mode: ReconcileMode,
    pub outcomes: Vec<OperationOutcome>,
    pub elapsed: std::time::Duration,
}

impl CompletionReport {
    pub fn applied(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_applied()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.applied()
    }
}

/// What the fetching phase read from the page.
struct PageSnapshot {
    blocks: Vec<Block>,
    feedback: Vec<Comment>,
}

/// Owns the collaborators and runs the per-page workflows.
pub struct Pipeline {
    store: Arc<dyn DocumentStore>,
    index: Arc<VectorIndex>,
    retriever: ContextRetriever,
    generator: CompletionGenerator,
    reconciler: Reconciler,
    locks: PageLocks,
    identity: String,
    document_database_id: Option<String>,
}

impl Pipeline {
    pub fn new(
        config: &AppConfig,
        store: Arc<dyn DocumentStore>,
        model: Arc<dyn LanguageModel>,
        index: Arc<VectorIndex>,
        prompts: Arc<PromptStore>,
    ) -> Result<Self> {
        let assistant = &config.assistant;
        Ok(Self {
            retriever: ContextRetriever::new(index.clone(), assistant.context_results),
            generator: CompletionGenerator::new(model, prompts, assistant.timezone_offset_hours)?,
            reconciler: Reconciler::new(store.clone()),
            locks: PageLocks::new(),
            identity: assistant.identity.clone(),
            document_database_id: config.notion.document_database_id.clone(),
            store,
            index,
        })
    }

    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }

    /// Generate block operations for the page and apply them.
    #[instrument(skip_all, fields(page_id = %trigger.id, title = %trigger.title))]
    pub async fn run_completion(&self, trigger: &PageRecord) -> Result<CompletionReport> {
        validate_page_id(&trigger.id)?;
        let _guard = self.locks.acquire(&trigger.id).await;
        let start = Instant::now();

        let mut status = StatusTracker::new(self.store.clone(), trigger.id.as_str());
        let result = self.completion_phases(trigger, &mut status).await;
        let result = self.finish(&mut status, result).await;

        self.locks.prune();
        let (mode, outcomes) = result?;
        let report = CompletionReport {
            page_id: trigger.id.clone(),
            mode,
            outcomes,
            elapsed: start.elapsed(),
        };
        info!(
            applied = report.applied(),
            failed = report.failed(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "completion finished"
        );
        Ok(report)
    }

    /// Generate property changes for the page and write them.
    #[instrument(skip_all, fields(page_id = %trigger.id, title = %trigger.title))]
    pub async fn run_property_update(&self, trigger: &PageRecord) -> Result<Vec<PropertyUpdate>> {
        validate_page_id(&trigger.id)?;
        let _guard = self.locks.acquire(&trigger.id).await;

        let mut status = StatusTracker::new(self.store.clone(), trigger.id.as_str());
        let result = self.property_phases(trigger, &mut status).await;
        let result = self.finish(&mut status, result).await;

        self.locks.prune();
        let updates = result?;
        info!(updates = updates.len(), "property update finished");
        Ok(updates)
    }

    /// Fetch the page and its blocks and add it to the vector index.
    #[instrument(skip_all, fields(page_id = %page_id))]
    pub async fn index_page(&self, page_id: &str) -> Result<()> {
        validate_page_id(page_id)?;
        let page = self.store.retrieve_page(page_id).await?;
        let blocks = self.store.list_child_blocks(page_id).await?;
        let kind = self.database_kind(&page);

        self.index.add_page(to_indexed_page(page, &blocks, kind)).await?;
        info!(kind = kind.label(), "page indexed");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Phases
    // -----------------------------------------------------------------------

    async fn completion_phases(
        &self,
        trigger: &PageRecord,
        status: &mut StatusTracker,
    ) -> Result<(ReconcileMode, Vec<OperationOutcome>)> {
        let snapshot = self.fetch_page(trigger, status).await?;
        let context = self.fetch_context(trigger, &snapshot, status).await;

        status.advance(CompletionStatus::Generating).await;
        let is_reference_doc = self.database_kind(trigger) == DatabaseKind::Document;
        let operations = self
            .generator
            .generate(&generation_input(trigger, &snapshot, &context), is_reference_doc)
            .await?;

        status.advance(CompletionStatus::Applying).await;
        let mode = ReconcileMode::for_feedback(!snapshot.feedback.is_empty());
        let outcomes = self.reconciler.apply(&operations, &trigger.id, mode).await;
        Ok((mode, outcomes))
    }

    async fn property_phases(
        &self,
        trigger: &PageRecord,
        status: &mut StatusTracker,
    ) -> Result<Vec<PropertyUpdate>> {
        let snapshot = self.fetch_page(trigger, status).await?;
        let context = self.fetch_context(trigger, &snapshot, status).await;

        status.advance(CompletionStatus::Generating).await;
        let updates = self
            .generator
            .generate_property_updates(&generation_input(trigger, &snapshot, &context))
            .await?;

        status.advance(CompletionStatus::Applying).await;
        if !updates.is_empty() {
            self.store.update_page_properties(&trigger.id, &updates).await?;
        }
        Ok(updates)
    }

    async fn fetch_page(
        &self,
        trigger: &PageRecord,
        status: &mut StatusTracker,
    ) -> Result<PageSnapshot> {
        status.advance(CompletionStatus::FetchingPage).await;
        let blocks = self.store.list_child_blocks(&trigger.id).await?;
        let feedback: Vec<Comment> = self
            .store
            .list_comments(&trigger.id)
            .await?
            .into_iter()
            .filter(|c| c.is_feedback_for(&self.identity))
            .collect();
        info!(blocks = blocks.len(), feedback = feedback.len(), "page fetched");
        Ok(PageSnapshot { blocks, feedback })
    }

    async fn fetch_context(
        &self,
        trigger: &PageRecord,
        snapshot: &PageSnapshot,
        status: &mut StatusTracker,
    ) -> String {
        status.advance(CompletionStatus::FetchingContext).await;
        self.retriever
            .retrieve_context(&trigger.title, &trigger.categories, &snapshot.blocks)
            .await
    }

    /// Terminal status for a finished run: `done` on success, `error` otherwise.
    async fn finish<T>(&self, status: &mut StatusTracker, result: Result<T>) -> Result<T> {
        match &result {
            Ok(_) => {
                status.advance(CompletionStatus::Done).await;
            }
            Err(e) => {
                error!(phase = %status.current(), error = %e, "pipeline failed");
                status.fail().await;
            }
        }
        result
    }

    fn database_kind(&self, page: &PageRecord) -> DatabaseKind {
        match (&page.database_id, &self.document_database_id) {
            (Some(parent), Some(docs)) if parent == docs => DatabaseKind::Document,
            _ => DatabaseKind::Backlog,
        }
    }
}

fn validate_page_id(page_id: &str) -> Result<()> {
    if page_id.trim().is_empty() {
        return Err(PagewrightError::validation("trigger has no page id"));
    }
    Ok(())
}

fn generation_input<'a>(
    trigger: &'a PageRecord,
    snapshot: &'a PageSnapshot,
    context: &'a str,
) -> GenerationInput<'a> {
    GenerationInput {
        page_id: &trigger.id,
        title: &trigger.title,
        categories: &trigger.categories,
        status: trigger.status.as_deref(),
        blocks: &snapshot.blocks,
        comments: &snapshot.feedback,
        context,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompts::PromptKey;
    use crate::retriever::NO_CONTEXT_PLACEHOLDER;
    use crate::testing::{FakeEmbedder, FakeModel, FakeStore, Mutation, indexed_page};
    use pagewright_shared::NativeBlock;
    use serde_json::json;
    use CompletionStatus::*;

    struct Harness {
        store: Arc<FakeStore>,
        model: Arc<FakeModel>,
        index: Arc<VectorIndex>,
        pipeline: Pipeline,
    }

    fn harness() -> Harness {
        let mut config = AppConfig::default();
        config.assistant.identity = "Pagewright".into();
        config.notion.document_database_id = Some("docs-db".into());

        let store = Arc::new(FakeStore::default());
        let model = Arc::new(FakeModel::default());
        let index = Arc::new(VectorIndex::new(Arc::new(FakeEmbedder::default())));
        let pipeline = Pipeline::new(
            &config,
            store.clone(),
            model.clone(),
            index.clone(),
            Arc::new(PromptStore::bundled()),
        )
        .unwrap();
        Harness {
            store,
            model,
            index,
            pipeline,
        }
    }

    fn trigger(id: &str, title: &str) -> PageRecord {
        PageRecord {
            id: id.into(),
            title: title.into(),
            categories: vec!["Engineering".into()],
            database_id: Some("backlog-db".into()),
            ..Default::default()
        }
    }

    fn feedback(text: &str) -> Comment {
        Comment {
            comment_id: "c1".into(),
            author: "user-1".into(),
            content: format!("@Pagewright {text}"),
        }
    }

    #[tokio::test]
    async fn design_review_end_to_end() {
        let h = harness();
        h.store
            .add_block("page-1", "b1", NativeBlock::Paragraph("Draft notes".into()));
        h.model.respond(json!({
            "completions": [
                {"type": "add", "blockId": "page-1", "text": "- [ ] Schedule the review"}
            ]
        }));

        let page = PageRecord {
            categories: vec!["Design".into()],
            status: Some("In Progress".into()),
            ..trigger("page-1", "Design review")
        };
        let report = h.pipeline.run_completion(&page).await.unwrap();

        assert_eq!(report.mode, ReconcileMode::Direct);
        assert_eq!(report.applied(), 1);

        let calls = h.model.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].system, PromptStore::bundled().get(PromptKey::TaskCompletion));
        let human = &calls[0].human[0];
        assert!(human.contains("Page ID: page-1"));
        assert!(human.contains("Document name: Design review"));
        assert!(human.contains("Status: In Progress"));
        assert!(human.contains("Categories: Design"));
        assert!(human.contains("b1: Draft notes"));
        assert!(human.contains(NO_CONTEXT_PLACEHOLDER));

        assert_eq!(
            h.store.mutations(),
            vec![Mutation::Append {
                parent: "page-1".into(),
                block: NativeBlock::ToDo {
                    text: "Schedule the review".into(),
                    checked: false
                },
            }]
        );
        assert_eq!(
            h.store.statuses("page-1"),
            vec![FetchingPage, FetchingContext, Generating, Applying, Done]
        );
    }

    #[tokio::test]
    async fn empty_page_passes_applying_to_done() {
        let h = harness();
        h.model.respond(json!({"completions": []}));

        let report = h.pipeline.run_completion(&trigger("page-1", "Empty")).await.unwrap();

        assert!(report.outcomes.is_empty());
        assert!(h.store.mutations().is_empty());
        assert_eq!(
            h.store.statuses("page-1"),
            vec![FetchingPage, FetchingContext, Generating, Applying, Done]
        );
    }

    #[tokio::test]
    async fn feedback_switches_to_comment_safe() {
        let h = harness();
        h.store
            .add_block("page-1", "b1", NativeBlock::Paragraph("Old text".into()));
        h.store.add_comment("page-1", feedback("please tighten this"));
        h.model.respond(json!({
            "completions": [{"type": "update", "blockId": "b1", "text": "New text"}]
        }));

        let report = h.pipeline.run_completion(&trigger("page-1", "Notes")).await.unwrap();

        assert_eq!(report.mode, ReconcileMode::CommentSafe);
        let calls = h.model.calls();
        assert_eq!(
            calls[0].system,
            PromptStore::bundled().get(PromptKey::TaskCompletionWithComments)
        );
        assert!(calls[0].human[0].contains("please tighten this"));
        assert_eq!(
            h.store.native("b1"),
            Some(NativeBlock::Paragraph("Old text".into()))
        );
        assert!(matches!(
            h.store.mutations().as_slice(),
            [Mutation::Comment { page_id, .. }] if page_id == "page-1"
        ));
    }

    #[tokio::test]
    async fn reference_database_uses_document_prompt() {
        let h = harness();
        h.model.respond(json!({"completions": []}));
        let mut page = trigger("doc-1", "Architecture");
        page.database_id = Some("docs-db".into());

        h.pipeline.run_completion(&page).await.unwrap();

        assert_eq!(
            h.model.calls()[0].system,
            PromptStore::bundled().get(PromptKey::DocumentCompletion)
        );
    }

    #[tokio::test]
    async fn generation_failure_sets_error() {
        let h = harness();
        h.model.fail(PagewrightError::Llm("rate limited".into()));

        let err = h
            .pipeline
            .run_completion(&trigger("page-1", "Broken"))
            .await
            .unwrap_err();

        assert!(matches!(err, PagewrightError::Llm(_)));
        assert_eq!(
            h.store.statuses("page-1"),
            vec![FetchingPage, FetchingContext, Generating, Error]
        );
        assert!(h.store.mutations().is_empty());
    }

    #[tokio::test]
    async fn fetch_failure_sets_error() {
        let h = harness();
        h.store.fail_listing();

        let result = h.pipeline.run_completion(&trigger("page-1", "Broken")).await;

        assert!(result.is_err());
        assert_eq!(h.store.statuses("page-1"), vec![FetchingPage, Error]);
        assert!(h.model.calls().is_empty());
    }

    #[tokio::test]
    async fn empty_page_id_is_rejected_without_status() {
        let h = harness();

        let err = h.pipeline.run_completion(&trigger("  ", "No id")).await.unwrap_err();

        assert!(matches!(err, PagewrightError::Validation { .. }));
        assert!(h.store.statuses("  ").is_empty());
        assert!(h.model.calls().is_empty());
    }

    #[tokio::test]
    async fn status_write_failure_does_not_mask_result() {
        let h = harness();
        h.store.fail_status_writes();
        h.model.respond(json!({"completions": []}));

        assert!(h.pipeline.run_completion(&trigger("page-1", "Quiet")).await.is_ok());

        h.model.fail(PagewrightError::Llm("boom".into()));
        let err = h
            .pipeline
            .run_completion(&trigger("page-1", "Quiet"))
            .await
            .unwrap_err();
        assert!(matches!(err, PagewrightError::Llm(_)));
    }

    #[tokio::test]
    async fn property_update_writes_properties() {
        let h = harness();
        h.model.respond(json!({
            "properties": [
                {"type": "priority", "value": "High"},
                {"type": "workload", "value": "M"},
                {"type": "mystery", "value": "x"}
            ]
        }));

        let updates = h
            .pipeline
            .run_property_update(&trigger("page-1", "Plan launch"))
            .await
            .unwrap();

        assert_eq!(updates.len(), 2);
        assert_eq!(
            h.model.calls()[0].system,
            PromptStore::bundled().get(PromptKey::UpdateProperties)
        );
        assert_eq!(
            h.store.mutations(),
            vec![Mutation::Properties {
                page_id: "page-1".into(),
                updates: updates.clone(),
            }]
        );
        assert_eq!(
            h.store.statuses("page-1"),
            vec![FetchingPage, FetchingContext, Generating, Applying, Done]
        );
        assert_eq!(updates[0], PropertyUpdate::Priority("High".into()));
    }

    #[tokio::test]
    async fn property_write_failure_sets_error() {
        let h = harness();
        h.store.fail_on("page-1");
        h.model
            .respond(json!({"properties": [{"type": "priority", "value": "Low"}]}));

        let result = h.pipeline.run_property_update(&trigger("page-1", "Plan")).await;

        assert!(result.is_err());
        assert_eq!(h.store.statuses("page-1").last(), Some(&Error));
    }

    #[tokio::test]
    async fn index_page_adds_to_ready_index() {
        let h = harness();
        h.index
            .initialize(vec![indexed_page("old", "Old", "old body", DatabaseKind::Backlog)])
            .await
            .unwrap();

        let mut page = trigger("doc-1", "Runbook");
        page.database_id = Some("docs-db".into());
        h.store.add_page(page);
        h.store
            .add_block("doc-1", "b1", NativeBlock::Paragraph("Restart the worker".into()));

        h.pipeline.index_page("doc-1").await.unwrap();

        assert_eq!(h.index.len().await, 2);
        let hits = h.index.similarity_search("restart the worker", 1).await.unwrap();
        assert_eq!(hits[0].id, "doc-1");
        assert_eq!(hits[0].kind, DatabaseKind::Document);
    }

    #[tokio::test]
    async fn index_page_requires_loaded_index() {
        let h = harness();
        h.store.add_page(trigger("page-1", "Early"));

        let err = h.pipeline.index_page("page-1").await.unwrap_err();
        assert!(matches!(err, PagewrightError::Index(_)));
    }
}

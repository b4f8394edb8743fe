//! Applies model-proposed operations to the live page.
//!
//! Operations run in array order, each in isolation: a failure is logged,
//! recorded in the returned [`OperationOutcome`] list, and the batch goes on.
//! There is no cross-operation atomicity.
//!
//! | mode          | add              | update                      | delete        |
//! |---------------|------------------|-----------------------------|---------------|
//! | `Direct`      | append child     | update in place, same kind  | delete block  |
//! | `CommentSafe` | append child     | page comment                | page comment  |
//!
//! An append rejected because the target cannot hold children becomes a page
//! comment. Several operations on one block apply in order (last write wins);
//! an operation on a block deleted earlier in the same batch is skipped.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use pagewright_markdown::translate;
use pagewright_shared::{
    CompletionOperation, DocumentStore, NativeBlock, OperationType, PagewrightError, Result,
};

/// How destructive operations are carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileMode {
    /// Update and delete become comments; nothing existing is overwritten.
    CommentSafe,
    /// Update and delete mutate the page.
    Direct,
}

impl ReconcileMode {
    /// Comment-safe when the page carried feedback comments.
    pub fn for_feedback(has_feedback: bool) -> Self {
        if has_feedback {
            Self::CommentSafe
        } else {
            Self::Direct
        }
    }
}

/// What the store ended up doing for a successful operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppliedAction {
    Appended,
    /// The target could not hold children; the text was posted as a page comment.
    AppendedAsComment,
    Updated,
    Deleted,
    Commented,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationResult {
    Applied(AppliedAction),
    Failed(String),
}

/// Result of one operation of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationOutcome {
    /// Position in the batch.
    pub index: usize,
    pub op_type: OperationType,
    pub block_id: String,
    pub result: OperationResult,
}

impl OperationOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self.result, OperationResult::Applied(_))
    }
}

pub struct Reconciler {
    store: Arc<dyn DocumentStore>,
}

impl Reconciler {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Apply `operations` to the page `page_id`. Returns one outcome per operation.
    #[instrument(skip_all, fields(page_id = %page_id, mode = ?mode, operations = operations.len()))]
    pub async fn apply(
        &self,
        operations: &[CompletionOperation],
        page_id: &str,
        mode: ReconcileMode,
    ) -> Vec<OperationOutcome> {
        let mut deleted: HashSet<&str> = HashSet::new();
        let mut outcomes = Vec::with_capacity(operations.len());

        for (index, op) in operations.iter().enumerate() {
            let result = if deleted.contains(op.block_id.as_str()) {
                warn!(index, block_id = %op.block_id, op = op.op_type.as_str(), "block already deleted in this batch, skipping");
                OperationResult::Failed(format!(
                    "block {} was deleted earlier in this batch",
                    op.block_id
                ))
            } else {
                match self.apply_one(op, page_id, mode).await {
                    Ok(action) => {
                        debug!(index, block_id = %op.block_id, ?action, "operation applied");
                        if action == AppliedAction::Deleted {
                            deleted.insert(op.block_id.as_str());
                        }
                        OperationResult::Applied(action)
                    }
                    Err(e) => {
                        warn!(index, block_id = %op.block_id, op = op.op_type.as_str(), error = %e, "operation failed");
                        OperationResult::Failed(e.to_string())
                    }
                }
            };

            outcomes.push(OperationOutcome {
                index,
                op_type: op.op_type,
                block_id: op.block_id.clone(),
                result,
            });
        }

        let applied = outcomes.iter().filter(|o| o.is_applied()).count();
        info!(applied, failed = outcomes.len() - applied, "operations reconciled");
        outcomes
    }

    async fn apply_one(
        &self,
        op: &CompletionOperation,
        page_id: &str,
        mode: ReconcileMode,
    ) -> Result<AppliedAction> {
        match (mode, op.op_type) {
            (_, OperationType::Add) => self.append(op, page_id).await,
            (ReconcileMode::Direct, OperationType::Update) => self.update_in_place(op).await,
            (ReconcileMode::Direct, OperationType::Delete) => {
                self.store.delete_block(&op.block_id).await?;
                Ok(AppliedAction::Deleted)
            }
            (ReconcileMode::CommentSafe, OperationType::Update | OperationType::Delete) => {
                self.store
                    .create_comment(page_id, &suggestion_text(op))
                    .await?;
                Ok(AppliedAction::Commented)
            }
        }
    }

    async fn append(&self, op: &CompletionOperation, page_id: &str) -> Result<AppliedAction> {
        let block = translate(&op.text);
        match self.store.append_child(&op.block_id, &block).await {
            Ok(()) => Ok(AppliedAction::Appended),
            Err(e) if e.is_children_not_supported() => {
                info!(block_id = %op.block_id, "target cannot hold children, posting as comment");
                self.store.create_comment(page_id, &op.text).await?;
                Ok(AppliedAction::AppendedAsComment)
            }
            Err(e) => Err(e),
        }
    }

    /// Translate the text, then re-type it to the block's current kind.
    ///
    /// A code block keeps its language and a to-do its checked state unless
    /// the new text carries its own fence or checkbox marker.
    async fn update_in_place(&self, op: &CompletionOperation) -> Result<AppliedAction> {
        let translated = translate(&op.text);
        let current = self.store.retrieve_block(&op.block_id).await?;

        let block = match &current.kind {
            Some(kind) => {
                let retyped = translated.with_kind(kind).ok_or_else(|| {
                    PagewrightError::validation(format!(
                        "block {} is a {kind} block and has no text to update",
                        op.block_id
                    ))
                })?;
                carry_attributes(retyped, &translated, &translate(&current.content))
            }
            None => translated,
        };

        self.store.update_block(&op.block_id, &block).await?;
        Ok(AppliedAction::Updated)
    }
}

/// Copy `existing`'s language or checked state onto `block` when `translated`
/// did not set one itself.
fn carry_attributes(
    mut block: NativeBlock,
    translated: &NativeBlock,
    existing: &NativeBlock,
) -> NativeBlock {
    match (&mut block, translated, existing) {
        (NativeBlock::ToDo { checked, .. }, t, NativeBlock::ToDo { checked: was, .. })
            if !matches!(t, NativeBlock::ToDo { .. }) =>
        {
            *checked = *was;
        }
        (NativeBlock::Code { language, .. }, t, NativeBlock::Code { language: was, .. })
            if !matches!(t, NativeBlock::Code { .. }) =>
        {
            language.clone_from(was);
        }
        _ => {}
    }
    block
}

/// Comment text for an update or delete downgraded to a suggestion.
fn suggestion_text(op: &CompletionOperation) -> String {
    if op.text.trim().is_empty() && op.op_type == OperationType::Delete {
        format!("Suggest deleting block {}", op.block_id)
    } else {
        op.text.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeStore, Mutation};
    use pagewright_shared::NativeBlock;

    const PAGE: &str = "page-1";

    fn seeded_store() -> Arc<FakeStore> {
        let store = Arc::new(FakeStore::default());
        store.add_block(PAGE, "b1", NativeBlock::Paragraph("Draft notes".into()));
        store.add_block(
            PAGE,
            "b2",
            NativeBlock::Heading {
                level: 2,
                text: "Plan".into(),
            },
        );
        store
    }

    #[tokio::test]
    async fn add_bullet_round_trips() {
        let store = seeded_store();
        let reconciler = Reconciler::new(store.clone());

        let outcomes = reconciler
            .apply(&[CompletionOperation::add("b1", "- item")], PAGE, ReconcileMode::Direct)
            .await;
        assert_eq!(outcomes[0].result, OperationResult::Applied(AppliedAction::Appended));

        let children = store.list_child_blocks("b1").await.unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(
            store.native(&children[0].block_id),
            Some(NativeBlock::BulletedListItem("item".into()))
        );
        assert_eq!(
            translate(&children[0].content),
            NativeBlock::BulletedListItem("item".into())
        );
    }

    #[tokio::test]
    async fn direct_update_preserves_block_kind() {
        let store = seeded_store();
        let reconciler = Reconciler::new(store.clone());

        reconciler
            .apply(&[CompletionOperation::update("b2", "- Rollout plan")], PAGE, ReconcileMode::Direct)
            .await;

        assert_eq!(
            store.native("b2"),
            Some(NativeBlock::Heading {
                level: 2,
                text: "Rollout plan".into()
            })
        );
    }

    #[tokio::test]
    async fn direct_update_keeps_language_and_checked_state() {
        let store = Arc::new(FakeStore::default());
        store.add_block(
            PAGE,
            "code",
            NativeBlock::Code {
                language: "python".into(),
                text: "print(1)".into(),
            },
        );
        store.add_block(
            PAGE,
            "todo",
            NativeBlock::ToDo {
                text: "ship v1".into(),
                checked: true,
            },
        );
        let reconciler = Reconciler::new(store.clone());

        reconciler
            .apply(
                &[
                    CompletionOperation::update("code", "print(2)"),
                    CompletionOperation::update("todo", "ship v2"),
                ],
                PAGE,
                ReconcileMode::Direct,
            )
            .await;

        assert_eq!(
            store.native("code"),
            Some(NativeBlock::Code {
                language: "python".into(),
                text: "print(2)".into()
            })
        );
        assert_eq!(
            store.native("todo"),
            Some(NativeBlock::ToDo {
                text: "ship v2".into(),
                checked: true
            })
        );
    }

    #[tokio::test]
    async fn explicit_marker_overrides_existing_attributes() {
        let store = Arc::new(FakeStore::default());
        store.add_block(
            PAGE,
            "todo",
            NativeBlock::ToDo {
                text: "ship v1".into(),
                checked: false,
            },
        );
        store.add_block(
            PAGE,
            "code",
            NativeBlock::Code {
                language: "python".into(),
                text: "print(1)".into(),
            },
        );
        let reconciler = Reconciler::new(store.clone());

        reconciler
            .apply(
                &[
                    CompletionOperation::update("todo", "- [x] ship v1"),
                    CompletionOperation::update("code", "```rust\nfn main() {}\n```"),
                ],
                PAGE,
                ReconcileMode::Direct,
            )
            .await;

        assert_eq!(
            store.native("todo"),
            Some(NativeBlock::ToDo {
                text: "ship v1".into(),
                checked: true
            })
        );
        assert_eq!(
            store.native("code"),
            Some(NativeBlock::Code {
                language: "rust".into(),
                text: "fn main() {}".into()
            })
        );
    }

    #[tokio::test]
    async fn direct_delete_removes_block() {
        let store = seeded_store();
        let reconciler = Reconciler::new(store.clone());

        let outcomes = reconciler
            .apply(&[CompletionOperation::delete("b1", "")], PAGE, ReconcileMode::Direct)
            .await;

        assert_eq!(outcomes[0].result, OperationResult::Applied(AppliedAction::Deleted));
        assert_eq!(store.child_ids(PAGE), vec!["b2"]);
    }

    #[tokio::test]
    async fn comment_safe_never_overwrites_or_deletes() {
        let store = seeded_store();
        let reconciler = Reconciler::new(store.clone());

        let outcomes = reconciler
            .apply(
                &[
                    CompletionOperation::update("b1", "Better notes"),
                    CompletionOperation::delete("b2", "Outdated section"),
                    CompletionOperation::delete("b1", ""),
                    CompletionOperation::add(PAGE, "New paragraph"),
                ],
                PAGE,
                ReconcileMode::CommentSafe,
            )
            .await;

        assert!(outcomes.iter().all(OperationOutcome::is_applied));
        assert_eq!(
            store.mutations(),
            vec![
                Mutation::Comment { page_id: PAGE.into(), text: "Better notes".into() },
                Mutation::Comment { page_id: PAGE.into(), text: "Outdated section".into() },
                Mutation::Comment { page_id: PAGE.into(), text: "Suggest deleting block b1".into() },
                Mutation::Append {
                    parent: PAGE.into(),
                    block: NativeBlock::Paragraph("New paragraph".into())
                },
            ]
        );
        assert_eq!(store.native("b1"), Some(NativeBlock::Paragraph("Draft notes".into())));
    }

    #[tokio::test]
    async fn children_rejection_falls_back_to_page_comment() {
        let store = seeded_store();
        store.reject_children("b2");
        let reconciler = Reconciler::new(store.clone());

        let outcomes = reconciler
            .apply(&[CompletionOperation::add("b2", "- [ ] follow up")], PAGE, ReconcileMode::Direct)
            .await;

        assert_eq!(
            outcomes[0].result,
            OperationResult::Applied(AppliedAction::AppendedAsComment)
        );
        assert_eq!(
            store.mutations(),
            vec![Mutation::Comment {
                page_id: PAGE.into(),
                text: "- [ ] follow up".into()
            }]
        );
    }

    #[tokio::test]
    async fn other_failures_are_isolated() {
        let store = seeded_store();
        store.fail_on("b1");
        let reconciler = Reconciler::new(store.clone());

        let outcomes = reconciler
            .apply(
                &[
                    CompletionOperation::add("b1", "lost"),
                    CompletionOperation::update("missing", "nowhere"),
                    CompletionOperation::add(PAGE, "kept"),
                ],
                PAGE,
                ReconcileMode::Direct,
            )
            .await;

        assert!(matches!(outcomes[0].result, OperationResult::Failed(_)));
        assert!(matches!(outcomes[1].result, OperationResult::Failed(_)));
        assert_eq!(outcomes[2].result, OperationResult::Applied(AppliedAction::Appended));
        assert_eq!(outcomes.iter().map(|o| o.index).collect::<Vec<_>>(), vec![0, 1, 2]);
        assert_eq!(store.mutations().len(), 1);
    }

    #[tokio::test]
    async fn ops_after_delete_are_skipped() {
        let store = seeded_store();
        let reconciler = Reconciler::new(store.clone());

        let outcomes = reconciler
            .apply(
                &[
                    CompletionOperation::delete("b1", ""),
                    CompletionOperation::update("b1", "too late"),
                    CompletionOperation::add("b1", "also too late"),
                ],
                PAGE,
                ReconcileMode::Direct,
            )
            .await;

        assert!(outcomes[0].is_applied());
        match &outcomes[1].result {
            OperationResult::Failed(reason) => assert!(reason.contains("deleted earlier")),
            other => panic!("expected failure, got {other:?}"),
        }
        assert!(!outcomes[2].is_applied());
        assert_eq!(store.mutations(), vec![Mutation::Delete { block_id: "b1".into() }]);
    }

    #[tokio::test]
    async fn repeated_updates_last_write_wins() {
        let store = seeded_store();
        let reconciler = Reconciler::new(store.clone());

        reconciler
            .apply(
                &[
                    CompletionOperation::update("b1", "first"),
                    CompletionOperation::update("b1", "second"),
                ],
                PAGE,
                ReconcileMode::Direct,
            )
            .await;

        assert_eq!(store.native("b1"), Some(NativeBlock::Paragraph("second".into())));
    }

    #[tokio::test]
    async fn empty_batch_does_nothing() {
        let store = seeded_store();
        let reconciler = Reconciler::new(store.clone());

        let outcomes = reconciler.apply(&[], PAGE, ReconcileMode::Direct).await;
        assert!(outcomes.is_empty());
        assert!(store.mutations().is_empty());
    }

    #[test]
    fn mode_follows_feedback() {
        assert_eq!(ReconcileMode::for_feedback(true), ReconcileMode::CommentSafe);
        assert_eq!(ReconcileMode::for_feedback(false), ReconcileMode::Direct);
    }
}

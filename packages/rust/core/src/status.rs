//! Page-level progress status.

use std::sync::Arc;

use tracing::{debug, warn};

use pagewright_shared::{CompletionStatus, DocumentStore};

/// Drives one page's status property through the pipeline phases.
///
/// Forward-only: `error` is reachable from any non-terminal state, and
/// nothing leaves `done` or `error`. Store write failures are logged and
/// never returned, so they cannot mask the pipeline's own result.
pub struct StatusTracker {
    store: Arc<dyn DocumentStore>,
    page_id: String,
    current: CompletionStatus,
}

impl StatusTracker {
    pub fn new(store: Arc<dyn DocumentStore>, page_id: impl Into<String>) -> Self {
        Self {
            store,
            page_id: page_id.into(),
            current: CompletionStatus::Start,
        }
    }

    pub fn current(&self) -> CompletionStatus {
        self.current
    }

    /// Move to `next` and write it to the page. Returns `false` when refused.
    pub async fn advance(&mut self, next: CompletionStatus) -> bool {
        if self.current.is_terminal() {
            warn!(page_id = %self.page_id, from = %self.current, to = %next, "status is terminal, refusing transition");
            return false;
        }
        if next != CompletionStatus::Error && next <= self.current {
            warn!(page_id = %self.page_id, from = %self.current, to = %next, "refusing backward status transition");
            return false;
        }

        debug!(page_id = %self.page_id, from = %self.current, to = %next, "status transition");
        self.current = next;

        if let Err(e) = self.store.update_page_status(&self.page_id, next).await {
            warn!(page_id = %self.page_id, status = %next, error = %e, "failed to write status");
        }
        true
    }

    /// Shorthand for `advance(CompletionStatus::Error)`.
    pub async fn fail(&mut self) -> bool {
        self.advance(CompletionStatus::Error).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeStore;
    use CompletionStatus::*;

    #[tokio::test]
    async fn records_each_phase() {
        let store = Arc::new(FakeStore::default());
        let mut tracker = StatusTracker::new(store.clone(), "p1");

        for status in [FetchingPage, FetchingContext, Generating, Applying, Done] {
            assert!(tracker.advance(status).await);
        }
        assert_eq!(
            store.statuses("p1"),
            vec![FetchingPage, FetchingContext, Generating, Applying, Done]
        );
    }

    #[tokio::test]
    async fn terminal_states_are_final() {
        let store = Arc::new(FakeStore::default());
        let mut tracker = StatusTracker::new(store.clone(), "p1");

        tracker.advance(Generating).await;
        assert!(tracker.fail().await);
        assert!(!tracker.advance(Done).await);
        assert!(!tracker.fail().await);

        assert_eq!(tracker.current(), Error);
        assert_eq!(store.statuses("p1"), vec![Generating, Error]);
    }

    #[tokio::test]
    async fn backward_transition_is_refused() {
        let store = Arc::new(FakeStore::default());
        let mut tracker = StatusTracker::new(store.clone(), "p1");

        tracker.advance(Applying).await;
        assert!(!tracker.advance(FetchingPage).await);
        assert_eq!(tracker.current(), Applying);
    }

    #[tokio::test]
    async fn write_failure_is_swallowed() {
        let store = Arc::new(FakeStore::default());
        store.fail_status_writes();
        let mut tracker = StatusTracker::new(store.clone(), "p1");

        assert!(tracker.advance(FetchingPage).await);
        assert_eq!(tracker.current(), FetchingPage);
        assert!(store.statuses("p1").is_empty());
    }
}

//! Page-completion domain logic for Pagewright.
//!
//! Ties the document store, the language model, and the vector index
//! together into the completion, property-update, and indexing pipelines.

pub mod cache;
pub mod generator;
pub mod index;
pub mod keywords;
pub mod loader;
pub mod locks;
pub mod pipeline;
pub mod prompts;
pub mod reconciler;
pub mod retriever;
pub mod status;

#[cfg(test)]
mod testing;

pub use cache::CachedEmbedder;
pub use index::VectorIndex;
pub use loader::{IndexLoader, LoadProgress, SilentProgress};
pub use pipeline::{CompletionReport, Pipeline};
pub use prompts::{PromptKey, PromptStore};
pub use reconciler::{OperationOutcome, ReconcileMode};

//! Shared types, error model, configuration, and the document-store seam for Pagewright.
//!
//! This crate is the foundation depended on by all other Pagewright crates.
//! It provides:
//! - [`PagewrightError`]: the unified error type
//! - Domain types ([`Block`], [`Comment`], [`CompletionOperation`], [`PropertyUpdate`], ...)
//! - Configuration ([`AppConfig`], config loading)
//! - [`DocumentStore`]: the trait the pipeline uses to read and mutate pages

pub mod config;
pub mod error;
pub mod store;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, AssistantConfig, LlmConfig, NotionConfig, PropertyNames, ServerConfig,
    StorageConfig, config_dir, config_file_path, init_config, load_config, load_config_from,
    read_secret, validate_credentials,
};
pub use error::{PagewrightError, Result};
pub use store::{DocumentStore, PageBatch};
pub use types::{
    Block, BlockKind, Comment, CompletionOperation, CompletionStatus, DatabaseKind, IndexedPage,
    NativeBlock, OperationType, PageRecord, PropertyKind, PropertyUpdate, PropertyValue,
    RetrievedDocument,
};

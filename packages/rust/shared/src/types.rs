//! Core domain types shared by the Pagewright pipeline.

use std::sync::LazyLock;

use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Blocks
// ---------------------------------------------------------------------------

/// Native block types the pipeline can read and write.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BlockKind {
    Paragraph,
    Heading1,
    Heading2,
    Heading3,
    BulletedListItem,
    NumberedListItem,
    ToDo,
    Code,
    /// Any other Notion block type (image, divider, table, ...), by its API name.
    Other(String),
}

impl BlockKind {
    /// The Notion API `type` string for this kind.
    pub fn as_str(&self) -> &str {
        match self {
            Self::Paragraph => "paragraph",
            Self::Heading1 => "heading_1",
            Self::Heading2 => "heading_2",
            Self::Heading3 => "heading_3",
            Self::BulletedListItem => "bulleted_list_item",
            Self::NumberedListItem => "numbered_list_item",
            Self::ToDo => "to_do",
            Self::Code => "code",
            Self::Other(name) => name,
        }
    }

    /// Parse a Notion API `type` string.
    pub fn from_api_name(name: &str) -> Self {
        match name {
            "paragraph" => Self::Paragraph,
            "heading_1" => Self::Heading1,
            "heading_2" => Self::Heading2,
            "heading_3" => Self::Heading3,
            "bulleted_list_item" => Self::BulletedListItem,
            "numbered_list_item" => Self::NumberedListItem,
            "to_do" => Self::ToDo,
            "code" => Self::Code,
            other => Self::Other(other.to_string()),
        }
    }

    /// Whether this kind carries a `rich_text` body the pipeline can rewrite.
    pub fn is_text_bearing(&self) -> bool {
        !matches!(self, Self::Other(_))
    }
}

impl std::fmt::Display for BlockKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An ordered content unit of a page, as seen by the model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub block_id: String,
    /// Markdown-flavored rendering of the block's text.
    pub content: String,
    #[serde(skip)]
    pub kind: Option<BlockKind>,
    #[serde(default)]
    pub has_children: bool,
}

impl Block {
    pub fn new(block_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            block_id: block_id.into(),
            content: content.into(),
            kind: None,
            has_children: false,
        }
    }
}

/// A block in the store's native representation, produced by text translation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NativeBlock {
    Paragraph(String),
    /// Level 1–3.
    Heading { level: u8, text: String },
    BulletedListItem(String),
    NumberedListItem(String),
    ToDo { text: String, checked: bool },
    Code { language: String, text: String },
}

impl NativeBlock {
    pub fn kind(&self) -> BlockKind {
        match self {
            Self::Paragraph(_) => BlockKind::Paragraph,
            Self::Heading { level: 1, .. } => BlockKind::Heading1,
            Self::Heading { level: 2, .. } => BlockKind::Heading2,
            Self::Heading { .. } => BlockKind::Heading3,
            Self::BulletedListItem(_) => BlockKind::BulletedListItem,
            Self::NumberedListItem(_) => BlockKind::NumberedListItem,
            Self::ToDo { .. } => BlockKind::ToDo,
            Self::Code { .. } => BlockKind::Code,
        }
    }

    /// The plain text body, without any markdown marker.
    pub fn text(&self) -> &str {
        match self {
            Self::Paragraph(text)
            | Self::BulletedListItem(text)
            | Self::NumberedListItem(text)
            | Self::Heading { text, .. }
            | Self::ToDo { text, .. }
            | Self::Code { text, .. } => text,
        }
    }

    /// Rebuild this block's text as another native kind.
    ///
    /// Returns `None` when `kind` has no text body to hold it.
    pub fn with_kind(&self, kind: &BlockKind) -> Option<NativeBlock> {
        let text = self.text().to_string();
        Some(match kind {
            BlockKind::Paragraph => Self::Paragraph(text),
            BlockKind::Heading1 => Self::Heading { level: 1, text },
            BlockKind::Heading2 => Self::Heading { level: 2, text },
            BlockKind::Heading3 => Self::Heading { level: 3, text },
            BlockKind::BulletedListItem => Self::BulletedListItem(text),
            BlockKind::NumberedListItem => Self::NumberedListItem(text),
            BlockKind::ToDo => Self::ToDo {
                checked: matches!(self, Self::ToDo { checked: true, .. }),
                text,
            },
            BlockKind::Code => Self::Code {
                language: match self {
                    Self::Code { language, .. } => language.clone(),
                    _ => "plain text".into(),
                },
                text,
            },
            BlockKind::Other(_) => return None,
        })
    }
}

// ---------------------------------------------------------------------------
// Comments
// ---------------------------------------------------------------------------

static MENTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@([^\s@]+)").expect("valid regex"));

/// Feedback attached to a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Comment {
    pub comment_id: String,
    /// Display name of the author.
    pub author: String,
    pub content: String,
}

impl Comment {
    /// A comment is feedback for the assistant when the assistant wrote it, or
    /// when it `@mentions` a name that contains, or is contained in, the identity.
    pub fn is_feedback_for(&self, identity: &str) -> bool {
        if self.author == identity {
            return true;
        }
        MENTION_RE.captures_iter(&self.content).any(|caps| {
            let name = &caps[1];
            !name.is_empty() && (identity.contains(name) || name.contains(identity))
        })
    }
}

// ---------------------------------------------------------------------------
// Completion operations
// ---------------------------------------------------------------------------

/// Kind of edit the model proposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    Add,
    Update,
    Delete,
}

impl OperationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

/// A model-proposed edit targeting one block.
///
/// For `add`, `block_id` is the parent the new block is appended under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct CompletionOperation {
    #[serde(rename = "type")]
    pub op_type: OperationType,
    #[serde(rename = "blockId")]
    pub block_id: String,
    pub text: String,
}

impl CompletionOperation {
    pub fn add(block_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(OperationType::Add, block_id, text)
    }

    pub fn update(block_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(OperationType::Update, block_id, text)
    }

    pub fn delete(block_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(OperationType::Delete, block_id, text)
    }

    fn new(op_type: OperationType, block_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            op_type,
            block_id: block_id.into(),
            text: text.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Property updates
// ---------------------------------------------------------------------------

/// The closed set of page properties the model may change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum PropertyKind {
    Title,
    Category,
    Priority,
    Workload,
    PendingByTask,
    PendingTask,
}

impl PropertyKind {
    pub const ALL: [PropertyKind; 6] = [
        Self::Title,
        Self::Category,
        Self::Priority,
        Self::Workload,
        Self::PendingByTask,
        Self::PendingTask,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::Category => "category",
            Self::Priority => "priority",
            Self::Workload => "workload",
            Self::PendingByTask => "pending_by_task",
            Self::PendingTask => "pending_task",
        }
    }

    /// Look up a kind by its wire name. Unknown names yield `None`.
    pub fn from_type_str(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == s)
    }
}

/// Raw value attached to a property update: a single string or a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum PropertyValue {
    Text(String),
    List(Vec<String>),
}

/// A typed page-metadata change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyUpdate {
    Title(String),
    Category(Vec<String>),
    Priority(String),
    Workload(String),
    /// Relation: pages this task is blocked by.
    PendingByTask(Vec<String>),
    /// Relation: pages this task is blocking.
    PendingTask(Vec<String>),
}

impl PropertyUpdate {
    /// Total mapping from a known kind and its raw value.
    ///
    /// Multi-valued kinds accept a bare string as a one-element list; single-valued
    /// kinds reject lists.
    pub fn from_parts(kind: PropertyKind, value: PropertyValue) -> Result<Self, String> {
        let list = |value: PropertyValue| match value {
            PropertyValue::Text(s) => vec![s],
            PropertyValue::List(items) => items,
        };
        let text = |value: PropertyValue| match value {
            PropertyValue::Text(s) => Ok(s),
            PropertyValue::List(items) => Err(format!(
                "{} expects a single value, got a list of {}",
                kind.as_str(),
                items.len()
            )),
        };

        Ok(match kind {
            PropertyKind::Title => Self::Title(text(value)?),
            PropertyKind::Category => Self::Category(list(value)),
            PropertyKind::Priority => Self::Priority(text(value)?),
            PropertyKind::Workload => Self::Workload(text(value)?),
            PropertyKind::PendingByTask => Self::PendingByTask(list(value)),
            PropertyKind::PendingTask => Self::PendingTask(list(value)),
        })
    }

    pub fn kind(&self) -> PropertyKind {
        match self {
            Self::Title(_) => PropertyKind::Title,
            Self::Category(_) => PropertyKind::Category,
            Self::Priority(_) => PropertyKind::Priority,
            Self::Workload(_) => PropertyKind::Workload,
            Self::PendingByTask(_) => PropertyKind::PendingByTask,
            Self::PendingTask(_) => PropertyKind::PendingTask,
        }
    }
}

// ---------------------------------------------------------------------------
// Completion status
// ---------------------------------------------------------------------------

/// Pipeline phase recorded on the page for external observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CompletionStatus {
    Start,
    FetchingPage,
    FetchingContext,
    Generating,
    Applying,
    Done,
    Error,
}

impl CompletionStatus {
    /// Value written to the page's status select property.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::FetchingPage => "fetching-page",
            Self::FetchingContext => "fetching-context",
            Self::Generating => "generating",
            Self::Applying => "applying",
            Self::Done => "done",
            Self::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error)
    }
}

impl std::fmt::Display for CompletionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Pages and retrieval
// ---------------------------------------------------------------------------

/// Which source database a page belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseKind {
    /// Task-like pages.
    Backlog,
    /// Reference-like pages.
    Document,
}

impl DatabaseKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Backlog => "task",
            Self::Document => "document",
        }
    }
}

/// Page metadata as returned by the document store (no body).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PageRecord {
    pub id: String,
    pub url: Option<String>,
    pub title: String,
    pub categories: Vec<String>,
    pub status: Option<String>,
    pub database_id: Option<String>,
}

/// A page loaded into the vector index.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedPage {
    pub id: String,
    pub title: String,
    pub categories: Vec<String>,
    pub status: Option<String>,
    pub url: Option<String>,
    pub content: String,
    pub kind: DatabaseKind,
}

/// A similarity-search hit used as generation context.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedDocument {
    pub id: String,
    pub title: String,
    pub categories: Vec<String>,
    pub status: Option<String>,
    pub url: Option<String>,
    pub kind: DatabaseKind,
    /// Cosine similarity; higher is more relevant.
    pub score: f32,
    pub content: String,
}

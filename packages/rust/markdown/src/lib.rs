//! Translation between markdown-flavored text and native Notion blocks.
//!
//! The model speaks in lines of light markdown (`# `, `- `, `1. `, `- [ ] `,
//! fenced code). [`translate`] turns one such text into a [`NativeBlock`];
//! [`render`] turns a native block back into the same text, so that a block
//! read from the store and re-translated keeps its shape.

mod cleanup;

use std::sync::LazyLock;

use regex::Regex;
use tracing::trace;

use pagewright_shared::NativeBlock;

pub use cleanup::{normalize_code_language, sanitize_completion_text};

// ---------------------------------------------------------------------------
// Text → block
// ---------------------------------------------------------------------------

static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^```([\w+#.-]*)[ \t]*\n(.*?)\n?```[ \t]*$").expect("valid regex")
});
static CHECKBOX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)^- \[([ x])\] (.*)$").expect("valid regex"));
static BULLET_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)^- (.*)$").expect("valid regex"));
static NUMBERED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)^\d+\. (.*)$").expect("valid regex"));
static HEADING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)^(#{1,3}) (.*)$").expect("valid regex"));

/// Translate markdown-flavored text into a native block.
///
/// Patterns are tried in priority order and the first match wins:
/// fenced code, checkbox, bullet, numbered item, heading 1–3, paragraph.
/// Checkbox is tried before bullet since both start with `- `.
pub fn translate(text: &str) -> NativeBlock {
    let text = text.trim_end_matches(['\n', '\r']);

    let block = if let Some(caps) = FENCE_RE.captures(text) {
        NativeBlock::Code {
            language: normalize_code_language(&caps[1]),
            text: caps[2].to_string(),
        }
    } else if let Some(caps) = CHECKBOX_RE.captures(text) {
        NativeBlock::ToDo {
            checked: &caps[1] == "x",
            text: caps[2].to_string(),
        }
    } else if let Some(caps) = BULLET_RE.captures(text) {
        NativeBlock::BulletedListItem(caps[1].to_string())
    } else if let Some(caps) = NUMBERED_RE.captures(text) {
        NativeBlock::NumberedListItem(caps[1].to_string())
    } else if let Some(caps) = HEADING_RE.captures(text) {
        NativeBlock::Heading {
            level: caps[1].len() as u8,
            text: caps[2].to_string(),
        }
    } else {
        NativeBlock::Paragraph(text.to_string())
    };

    trace!(kind = %block.kind(), "translated text to block");
    block
}

// ---------------------------------------------------------------------------
// Block → text
// ---------------------------------------------------------------------------

/// Render a native block as markdown-flavored text.
///
/// Numbered items always render as `1. `; the store owns the real numbering.
pub fn render(block: &NativeBlock) -> String {
    match block {
        NativeBlock::Paragraph(text) => text.clone(),
        NativeBlock::Heading { level, text } => {
            format!("{} {text}", "#".repeat((*level).clamp(1, 3) as usize))
        }
        NativeBlock::BulletedListItem(text) => format!("- {text}"),
        NativeBlock::NumberedListItem(text) => format!("1. {text}"),
        NativeBlock::ToDo { text, checked } => {
            format!("- [{}] {text}", if *checked { "x" } else { " " })
        }
        NativeBlock::Code { language, text } => format!("```{language}\n{text}\n```"),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

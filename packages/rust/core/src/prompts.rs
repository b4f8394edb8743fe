//! Named system prompts.
//!
//! Each prompt is looked up as `<key>.md` in the configured prompts directory
//! and falls back to the copy compiled into the binary.

use std::collections::HashMap;
use std::path::Path;

use pagewright_shared::{PagewrightError, Result};

/// The prompts the pipeline knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptKey {
    TaskCompletionWithComments,
    TaskCompletion,
    DocumentCompletionWithComments,
    DocumentCompletion,
    UpdateProperties,
}

impl PromptKey {
    pub const ALL: [PromptKey; 5] = [
        Self::TaskCompletionWithComments,
        Self::TaskCompletion,
        Self::DocumentCompletionWithComments,
        Self::DocumentCompletion,
        Self::UpdateProperties,
    ];

    /// File stem of the prompt template.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TaskCompletionWithComments => "task_completion_with_comments",
            Self::TaskCompletion => "task_completion",
            Self::DocumentCompletionWithComments => "document_completion_with_comments",
            Self::DocumentCompletion => "document_completion",
            Self::UpdateProperties => "update_properties",
        }
    }

    /// Completion prompt for a page kind and feedback presence.
    pub fn for_completion(is_reference_doc: bool, has_feedback: bool) -> Self {
        match (is_reference_doc, has_feedback) {
            (false, true) => Self::TaskCompletionWithComments,
            (false, false) => Self::TaskCompletion,
            (true, true) => Self::DocumentCompletionWithComments,
            (true, false) => Self::DocumentCompletion,
        }
    }

    fn bundled(&self) -> &'static str {
        match self {
            Self::TaskCompletionWithComments => {
                include_str!("../prompts/task_completion_with_comments.md")
            }
            Self::TaskCompletion => include_str!("../prompts/task_completion.md"),
            Self::DocumentCompletionWithComments => {
                include_str!("../prompts/document_completion_with_comments.md")
            }
            Self::DocumentCompletion => include_str!("../prompts/document_completion.md"),
            Self::UpdateProperties => include_str!("../prompts/update_properties.md"),
        }
    }
}

impl std::fmt::Display for PromptKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Loaded, trimmed prompt templates. Every key is present.
#[derive(Debug, Clone)]
pub struct PromptStore {
    templates: HashMap<PromptKey, String>,
}

impl PromptStore {
    /// Only the compiled-in defaults.
    pub fn bundled() -> Self {
        let templates = PromptKey::ALL
            .into_iter()
            .map(|key| (key, key.bundled().trim().to_string()))
            .collect();
        Self { templates }
    }

    /// Load every prompt, preferring `<dir>/<key>.md` over the bundled copy.
    ///
    /// An override that exists but cannot be read, or is blank, is a config error.
    pub fn load(dir: Option<&Path>) -> Result<Self> {
        let mut templates = HashMap::new();

        for key in PromptKey::ALL {
            let override_path = dir.map(|d| d.join(format!("{}.md", key.as_str())));
            let text = match override_path {
                Some(path) if path.exists() => {
                    tracing::debug!(prompt = %key, ?path, "loading prompt override");
                    std::fs::read_to_string(&path).map_err(|e| PagewrightError::io(&path, e))?
                }
                _ => key.bundled().to_string(),
            };

            let text = text.trim();
            if text.is_empty() {
                return Err(PagewrightError::config(format!("prompt '{key}' is empty")));
            }
            templates.insert(key, text.to_string());
        }

        Ok(Self { templates })
    }

    pub fn get(&self, key: PromptKey) -> &str {
        self.templates.get(&key).map(String::as_str).unwrap_or_default()
    }
}

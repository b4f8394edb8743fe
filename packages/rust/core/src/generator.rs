//! Completion generation: prompt composition, structured model call, sanitizing.

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Utc};
use schemars::JsonSchema;
use serde::Deserialize;
use tracing::{error, info, instrument, warn};

use pagewright_llm::{LanguageModel, OutputSchema};
use pagewright_markdown::sanitize_completion_text;
use pagewright_shared::{
    Block, Comment, CompletionOperation, PagewrightError, PropertyKind, PropertyUpdate,
    PropertyValue, Result,
};

use crate::prompts::{PromptKey, PromptStore};

// ---------------------------------------------------------------------------
// Output schemas
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
struct CompletionsAnswer {
    completions: Vec<CompletionOperation>,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
struct PropertiesAnswer {
    properties: Vec<RawProperty>,
}

/// `type` stays a string so an unknown kind drops one entry, not the batch.
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
struct RawProperty {
    #[serde(rename = "type")]
    #[schemars(with = "PropertyKind")]
    kind: String,
    value: PropertyValue,
}

// ---------------------------------------------------------------------------
// Input
// ---------------------------------------------------------------------------

/// Everything the model sees about the triggering page.
#[derive(Debug, Clone, Copy)]
pub struct GenerationInput<'a> {
    /// Target for operations that append at page level.
    pub page_id: &'a str,
    pub title: &'a str,
    pub categories: &'a [String],
    pub status: Option<&'a str>,
    pub blocks: &'a [Block],
    /// Feedback comments only.
    pub comments: &'a [Comment],
    pub context: &'a str,
}

// ---------------------------------------------------------------------------
// Generator
// ---------------------------------------------------------------------------

pub struct CompletionGenerator {
    model: Arc<dyn LanguageModel>,
    prompts: Arc<PromptStore>,
    timezone: FixedOffset,
}

impl CompletionGenerator {
    /// Dates in the human turn are rendered at `timezone_offset_hours` from UTC.
    pub fn new(
        model: Arc<dyn LanguageModel>,
        prompts: Arc<PromptStore>,
        timezone_offset_hours: i32,
    ) -> Result<Self> {
        let timezone = timezone_offset_hours
            .checked_mul(3600)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| {
                PagewrightError::config(format!(
                    "timezone_offset_hours out of range: {timezone_offset_hours}"
                ))
            })?;
        Ok(Self {
            model,
            prompts,
            timezone,
        })
    }

    /// Ask the model for block operations on the page.
    #[instrument(skip_all, fields(title = %input.title, reference = is_reference_doc))]
    pub async fn generate(
        &self,
        input: &GenerationInput<'_>,
        is_reference_doc: bool,
    ) -> Result<Vec<CompletionOperation>> {
        let key = PromptKey::for_completion(is_reference_doc, !input.comments.is_empty());
        let schema = OutputSchema::for_type::<CompletionsAnswer>("completions");

        let value = self
            .model
            .invoke_with_schema(self.prompts.get(key), &[self.human_content(input)], &schema)
            .await
            .inspect_err(|e| error!(prompt = %key, error = %e, "completion generation failed"))?;

        let answer: CompletionsAnswer = serde_json::from_value(value).map_err(|e| {
            error!(prompt = %key, error = %e, "model output does not match the completions schema");
            PagewrightError::Schema(format!("completions: {e}"))
        })?;

        let operations: Vec<CompletionOperation> = answer
            .completions
            .into_iter()
            .map(|mut op| {
                op.text = sanitize_completion_text(&op.text);
                op
            })
            .collect();

        info!(prompt = %key, operations = operations.len(), "completions generated");
        Ok(operations)
    }

    /// Ask the model which page properties to change.
    ///
    /// Entries with an unknown type or a value of the wrong shape are dropped with a warning.
    #[instrument(skip_all, fields(title = %input.title))]
    pub async fn generate_property_updates(
        &self,
        input: &GenerationInput<'_>,
    ) -> Result<Vec<PropertyUpdate>> {
        let key = PromptKey::UpdateProperties;
        let schema = OutputSchema::for_type::<PropertiesAnswer>("properties");

        let value = self
            .model
            .invoke_with_schema(self.prompts.get(key), &[self.human_content(input)], &schema)
            .await
            .inspect_err(|e| error!(error = %e, "property generation failed"))?;

        let answer: PropertiesAnswer = serde_json::from_value(value).map_err(|e| {
            error!(error = %e, "model output does not match the properties schema");
            PagewrightError::Schema(format!("properties: {e}"))
        })?;

        let updates: Vec<PropertyUpdate> = answer
            .properties
            .into_iter()
            .filter_map(|raw| {
                let Some(kind) = PropertyKind::from_type_str(&raw.kind) else {
                    warn!(property_type = %raw.kind, "dropping unknown property type");
                    return None;
                };
                PropertyUpdate::from_parts(kind, raw.value)
                    .inspect_err(|reason| warn!(%reason, "dropping malformed property value"))
                    .ok()
            })
            .collect();

        info!(updates = updates.len(), "property updates generated");
        Ok(updates)
    }

    fn human_content(&self, input: &GenerationInput<'_>) -> String {
        compose_human_content(input, &format_date(Utc::now(), self.timezone))
    }
}

/// `YYYY/MM/DD` in the given offset.
pub fn format_date(now: DateTime<Utc>, timezone: FixedOffset) -> String {
    now.with_timezone(&timezone).format("%Y/%m/%d").to_string()
}

/// The labeled fields of the human turn, in a fixed order.
pub fn compose_human_content(input: &GenerationInput<'_>, today: &str) -> String {
    let mut sections = vec![
        format!("Current date: {today}"),
        format!("Page ID: {}", input.page_id),
        format!("Document name: {}", input.title),
        format!("Status: {}", input.status.unwrap_or("-")),
        format!("Categories: {}", input.categories.join(", ")),
    ];

    let content = input
        .blocks
        .iter()
        .map(|b| format!("{}: {}", b.block_id, b.content))
        .collect::<Vec<_>>()
        .join("\n");
    sections.push(format!("Content:\n{content}"));

    if !input.comments.is_empty() {
        let comments = input
            .comments
            .iter()
            .map(|c| format!("{}: {}", c.comment_id, c.content))
            .collect::<Vec<_>>()
            .join("\n");
        sections.push(format!("Feedback comments:\n{comments}"));
    }

    sections.push(format!("Related pages:\n{}", input.context));
    sections.join("\n\n")
}

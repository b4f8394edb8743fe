//! Language model and embedding provider abstraction.
//!
//! The pipeline consumes two seams:
//! - [`LanguageModel`]: chat completion constrained to a JSON output schema
//! - [`Embedder`]: text embeddings for the vector index
//!
//! [`OpenAiClient`] implements both against any OpenAI-compatible API.

mod openai;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde_json::Value;

use pagewright_shared::Result;

pub use openai::OpenAiClient;

// ---------------------------------------------------------------------------
// Output schema
// ---------------------------------------------------------------------------

/// A named JSON schema the model's answer must conform to.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputSchema {
    pub name: String,
    pub schema: Value,
}

impl OutputSchema {
    /// Derive the schema from a Rust type, with every subschema inlined.
    pub fn for_type<T: JsonSchema>(name: &str) -> Self {
        let generator = schemars::r#gen::SchemaSettings::draft07()
            .with(|s| {
                s.inline_subschemas = true;
                s.meta_schema = None;
            })
            .into_generator();
        let root = generator.into_root_schema_for::<T>();
        let mut schema = serde_json::to_value(root).unwrap_or(Value::Null);
        if let Value::Object(map) = &mut schema {
            map.remove("title");
            map.remove("definitions");
        }
        Self {
            name: name.to_string(),
            schema,
        }
    }
}

// ---------------------------------------------------------------------------
// Seams
// ---------------------------------------------------------------------------

/// Chat completion with structured output.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Send one system message and the human turns; return the parsed JSON answer.
    ///
    /// Fails with [`PagewrightError::Schema`](pagewright_shared::PagewrightError::Schema)
    /// when the answer is not valid JSON for `schema`.
    async fn invoke_with_schema(
        &self,
        system: &str,
        human: &[String],
        schema: &OutputSchema,
    ) -> Result<Value>;
}

/// Text embeddings.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of documents, preserving order.
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single search query.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_documents(&[text.to_string()]).await?;
        vectors.pop().ok_or_else(|| {
            pagewright_shared::PagewrightError::Llm("embedding response was empty".into())
        })
    }

    /// Identifier of the embedding model, used as a cache key.
    fn model_id(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(JsonSchema)]
    #[allow(dead_code)]
    #[serde(deny_unknown_fields)]
    struct Answer {
        items: Vec<Item>,
    }

    #[derive(JsonSchema)]
    #[allow(dead_code)]
    #[serde(deny_unknown_fields)]
    struct Item {
        name: String,
    }

    #[test]
    fn schema_is_inlined_object() {
        let schema = OutputSchema::for_type::<Answer>("answer");
        assert_eq!(schema.name, "answer");
        assert_eq!(schema.schema["type"], "object");
        assert_eq!(schema.schema["additionalProperties"], false);
        assert_eq!(schema.schema["properties"]["items"]["items"]["type"], "object");
        assert!(schema.schema.get("definitions").is_none());
        assert!(schema.schema.get("$schema").is_none());
    }
}

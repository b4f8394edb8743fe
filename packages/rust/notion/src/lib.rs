//! Notion REST client implementing the [`DocumentStore`] seam.
//!
//! Reads blocks, comments and pages; appends, updates and deletes blocks;
//! posts comments; writes page properties. Every non-success response is
//! mapped to [`PagewrightError::Notion`], except the "block does not support
//! children" validation failure, which becomes
//! [`PagewrightError::ChildrenNotSupported`] so the reconciler can fall back.

mod blocks;
mod properties;

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder};
use serde_json::{Value, json};
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

use pagewright_shared::{
    Block, Comment, CompletionStatus, DocumentStore, NativeBlock, NotionConfig, PageBatch,
    PageRecord, PagewrightError, PropertyNames, PropertyUpdate, Result,
};

pub use properties::parse_page_object;

/// User-Agent string for API requests.
const USER_AGENT: &str = concat!("Pagewright/", env!("CARGO_PKG_VERSION"));

/// Page size for list and query endpoints (Notion's maximum).
const PAGE_SIZE: u32 = 100;

/// Default timeout in seconds for API requests.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// HTTP client for the Notion API.
pub struct NotionClient {
    client: Client,
    base_url: String,
    token: String,
    api_version: String,
    names: PropertyNames,
    /// Display names by user id, filled lazily while listing comments.
    user_names: Mutex<HashMap<String, String>>,
}

impl NotionClient {
    /// Create a client from config and an integration token.
    pub fn new(config: &NotionConfig, names: PropertyNames, token: String) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .build()
            .map_err(|e| PagewrightError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token,
            api_version: config.api_version.clone(),
            names,
            user_names: Mutex::new(HashMap::new()),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{path}", self.base_url))
            .bearer_auth(&self.token)
            .header("Notion-Version", &self.api_version)
    }

    /// Send a request and decode the JSON body, mapping API errors.
    async fn send(&self, request: RequestBuilder, what: &str) -> Result<Value> {
        let response = request
            .send()
            .await
            .map_err(|e| PagewrightError::Network(format!("{what}: {e}")))?;

        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| PagewrightError::Network(format!("{what}: failed to read body: {e}")))?;

        if status.is_success() {
            return Ok(body);
        }

        let code = body
            .get("code")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();
        let message = body
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        debug!(%what, status = status.as_u16(), %code, %message, "notion request failed");

        Err(PagewrightError::Notion {
            status: status.as_u16(),
            code,
            message,
        })
    }

    /// Resolve a user's display name, caching the result.
    async fn user_name(&self, user_id: &str) -> String {
        if let Some(name) = self.user_names.lock().await.get(user_id) {
            return name.clone();
        }

        let request = self.request(Method::GET, &format!("/users/{user_id}"));
        let name = match self.send(request, "retrieve user").await {
            Ok(user) => user
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            Err(e) => {
                warn!(user_id, error = %e, "could not resolve comment author");
                String::new()
            }
        };

        self.user_names
            .lock()
            .await
            .insert(user_id.to_string(), name.clone());
        name
    }
}

/// True when Notion rejected an append because the parent cannot hold children.
fn is_children_rejection(err: &PagewrightError) -> bool {
    match err {
        PagewrightError::Notion {
            status: 400,
            code,
            message,
        } => code == "validation_error" && message.to_lowercase().contains("support children"),
        _ => false,
    }
}

#[async_trait]
impl DocumentStore for NotionClient {
    #[instrument(skip(self))]
    async fn list_child_blocks(&self, block_id: &str) -> Result<Vec<Block>> {
        let mut blocks = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut query = vec![("page_size".to_string(), PAGE_SIZE.to_string())];
            if let Some(c) = &cursor {
                query.push(("start_cursor".to_string(), c.clone()));
            }
            let request = self
                .request(Method::GET, &format!("/blocks/{block_id}/children"))
                .query(&query);
            let body = self.send(request, "list block children").await?;

            if let Some(results) = body.get("results").and_then(Value::as_array) {
                blocks.extend(results.iter().filter_map(blocks::parse_block));
            }

            cursor = next_cursor(&body);
            if cursor.is_none() {
                break;
            }
        }

        debug!(count = blocks.len(), "listed child blocks");
        Ok(blocks)
    }

    async fn retrieve_block(&self, block_id: &str) -> Result<Block> {
        let request = self.request(Method::GET, &format!("/blocks/{block_id}"));
        let body = self.send(request, "retrieve block").await?;
        blocks::parse_block(&body)
            .ok_or_else(|| PagewrightError::parse(format!("malformed block object {block_id}")))
    }

    async fn retrieve_page(&self, page_id: &str) -> Result<PageRecord> {
        let request = self.request(Method::GET, &format!("/pages/{page_id}"));
        let body = self.send(request, "retrieve page").await?;
        parse_page_object(&body, &self.names)
    }

    #[instrument(skip(self))]
    async fn list_comments(&self, page_id: &str) -> Result<Vec<Comment>> {
        let mut raw = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let mut query = vec![
                ("block_id".to_string(), page_id.to_string()),
                ("page_size".to_string(), PAGE_SIZE.to_string()),
            ];
            if let Some(c) = &cursor {
                query.push(("start_cursor".to_string(), c.clone()));
            }
            let request = self.request(Method::GET, "/comments").query(&query);
            let body = self.send(request, "list comments").await?;

            if let Some(results) = body.get("results").and_then(Value::as_array) {
                raw.extend(results.iter().cloned());
            }

            cursor = next_cursor(&body);
            if cursor.is_none() {
                break;
            }
        }

        let mut comments = Vec::with_capacity(raw.len());
        for item in raw {
            let Some(id) = item.get("id").and_then(Value::as_str) else {
                continue;
            };
            let author = match item.pointer("/created_by/id").and_then(Value::as_str) {
                Some(user_id) => self.user_name(user_id).await,
                None => String::new(),
            };
            comments.push(Comment {
                comment_id: id.to_string(),
                author,
                content: blocks::plain_text(item.get("rich_text").unwrap_or(&Value::Null)),
            });
        }

        Ok(comments)
    }

    async fn append_child(&self, block_id: &str, block: &NativeBlock) -> Result<()> {
        let request = self
            .request(Method::PATCH, &format!("/blocks/{block_id}/children"))
            .json(&json!({ "children": [blocks::child_object(block)] }));

        match self.send(request, "append block children").await {
            Ok(_) => Ok(()),
            Err(e) if is_children_rejection(&e) => Err(PagewrightError::ChildrenNotSupported {
                block_id: block_id.to_string(),
            }),
            Err(e) => Err(e),
        }
    }

    async fn update_block(&self, block_id: &str, block: &NativeBlock) -> Result<()> {
        let request = self
            .request(Method::PATCH, &format!("/blocks/{block_id}"))
            .json(&blocks::block_body(block));
        self.send(request, "update block").await.map(|_| ())
    }

    async fn delete_block(&self, block_id: &str) -> Result<()> {
        let request = self.request(Method::DELETE, &format!("/blocks/{block_id}"));
        self.send(request, "delete block").await.map(|_| ())
    }

    async fn create_comment(&self, page_id: &str, text: &str) -> Result<()> {
        let request = self.request(Method::POST, "/comments").json(&json!({
            "parent": { "page_id": page_id },
            "rich_text": blocks::rich_text(text),
        }));
        self.send(request, "create comment").await.map(|_| ())
    }

    async fn update_page_status(&self, page_id: &str, status: CompletionStatus) -> Result<()> {
        let request = self
            .request(Method::PATCH, &format!("/pages/{page_id}"))
            .json(&json!({ "properties": properties::status_payload(status, &self.names) }));
        self.send(request, "update page status").await.map(|_| ())
    }

    async fn update_page_properties(
        &self,
        page_id: &str,
        updates: &[PropertyUpdate],
    ) -> Result<()> {
        if updates.is_empty() {
            return Ok(());
        }
        let request = self
            .request(Method::PATCH, &format!("/pages/{page_id}"))
            .json(&json!({ "properties": properties::property_payload(updates, &self.names) }));
        self.send(request, "update page properties").await.map(|_| ())
    }

    async fn query_database(&self, database_id: &str, cursor: Option<&str>) -> Result<PageBatch> {
        let mut body = json!({ "page_size": PAGE_SIZE });
        if let Some(c) = cursor {
            body["start_cursor"] = json!(c);
        }
        let request = self
            .request(Method::POST, &format!("/databases/{database_id}/query"))
            .json(&body);
        let response = self.send(request, "query database").await?;

        let mut results = Vec::new();
        for page in response
            .get("results")
            .and_then(Value::as_array)
            .into_iter()
            .flatten()
        {
            match parse_page_object(page, &self.names) {
                Ok(record) => results.push(record),
                Err(e) => warn!(database_id, error = %e, "skipping malformed page"),
            }
        }

        Ok(PageBatch {
            results,
            next_cursor: next_cursor(&response),
        })
    }
}

/// `next_cursor` when `has_more` is true.
fn next_cursor(body: &Value) -> Option<String> {
    if body.get("has_more").and_then(Value::as_bool) != Some(true) {
        return None;
    }
    body.get("next_cursor")
        .and_then(Value::as_str)
        .map(String::from)
}

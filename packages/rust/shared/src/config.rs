//! Application configuration for Pagewright.
//!
//! User config lives at `~/.pagewright/pagewright.toml`.
//! CLI flags override config file values, which override defaults.
//! Secrets are never stored in the file, only the names of the env vars holding them.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PagewrightError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "pagewright.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".pagewright";

// ---------------------------------------------------------------------------
// Config structs (matching pagewright.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Webhook listener.
    #[serde(default)]
    pub server: ServerConfig,

    /// Notion API access and source databases.
    #[serde(default)]
    pub notion: NotionConfig,

    /// Chat and embedding model settings.
    #[serde(default)]
    pub llm: LlmConfig,

    /// Names of the Notion page properties the pipeline reads and writes.
    #[serde(default)]
    pub properties: PropertyNames,

    /// Assistant persona and generation knobs.
    #[serde(default)]
    pub assistant: AssistantConfig,

    /// Local embedding cache.
    #[serde(default)]
    pub storage: StorageConfig,
}

/// `[server]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".into()
}
fn default_port() -> u16 {
    3001
}

/// `[notion]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotionConfig {
    /// Name of the env var holding the integration token.
    #[serde(default = "default_notion_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_notion_base_url")]
    pub base_url: String,

    /// Value sent in the `Notion-Version` header.
    #[serde(default = "default_notion_version")]
    pub api_version: String,

    /// Task-like database scanned into the vector index at startup.
    #[serde(default)]
    pub backlog_database_id: Option<String>,

    /// Reference-like database scanned into the vector index at startup.
    #[serde(default)]
    pub document_database_id: Option<String>,
}

impl Default for NotionConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_notion_key_env(),
            base_url: default_notion_base_url(),
            api_version: default_notion_version(),
            backlog_database_id: None,
            document_database_id: None,
        }
    }
}

fn default_notion_key_env() -> String {
    "NOTION_API_KEY".into()
}
fn default_notion_base_url() -> String {
    "https://api.notion.com/v1".into()
}
fn default_notion_version() -> String {
    "2022-06-28".into()
}

/// `[llm]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Name of the env var holding the API key.
    #[serde(default = "default_llm_key_env")]
    pub api_key_env: String,

    /// Base URL of an OpenAI-compatible API.
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,

    #[serde(default = "default_chat_model")]
    pub chat_model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_key_env: default_llm_key_env(),
            base_url: default_llm_base_url(),
            chat_model: default_chat_model(),
            temperature: default_temperature(),
            embedding_model: default_embedding_model(),
        }
    }
}

fn default_llm_key_env() -> String {
    "OPENAI_API_KEY".into()
}
fn default_llm_base_url() -> String {
    "https://api.openai.com/v1".into()
}
fn default_chat_model() -> String {
    "gpt-4o".into()
}
fn default_temperature() -> f32 {
    1.0
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".into()
}

/// `[properties]` section: Notion property names, per database schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyNames {
    #[serde(default = "default_title_property")]
    pub title: String,
    #[serde(default = "default_category_property")]
    pub category: String,
    #[serde(default = "default_status_property")]
    pub status: String,
    #[serde(default = "default_priority_property")]
    pub priority: String,
    #[serde(default = "default_workload_property")]
    pub workload: String,
    #[serde(default = "default_pending_by_property")]
    pub pending_by_task: String,
    #[serde(default = "default_pending_property")]
    pub pending_task: String,
    /// Select property holding the pipeline's [`CompletionStatus`](crate::CompletionStatus).
    #[serde(default = "default_completion_status_property")]
    pub completion_status: String,
}

impl Default for PropertyNames {
    fn default() -> Self {
        Self {
            title: default_title_property(),
            category: default_category_property(),
            status: default_status_property(),
            priority: default_priority_property(),
            workload: default_workload_property(),
            pending_by_task: default_pending_by_property(),
            pending_task: default_pending_property(),
            completion_status: default_completion_status_property(),
        }
    }
}

fn default_title_property() -> String {
    "Name".into()
}
fn default_category_property() -> String {
    "Category".into()
}
fn default_status_property() -> String {
    "Status".into()
}
fn default_priority_property() -> String {
    "Priority".into()
}
fn default_workload_property() -> String {
    "Workload".into()
}
fn default_pending_by_property() -> String {
    "Blocked By".into()
}
fn default_pending_property() -> String {
    "Blocking".into()
}
fn default_completion_status_property() -> String {
    "AI Status".into()
}

/// `[assistant]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssistantConfig {
    /// Reserved display name; comments by or mentioning it count as feedback.
    #[serde(default = "default_identity")]
    pub identity: String,

    /// Directory of `<prompt>.md` overrides. Bundled prompts are used when unset.
    #[serde(default)]
    pub prompts_dir: Option<String>,

    /// Offset of the regional timezone used for the date line in prompts.
    #[serde(default = "default_timezone_offset")]
    pub timezone_offset_hours: i32,

    /// Number of related documents injected as context.
    #[serde(default = "default_context_results")]
    pub context_results: usize,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            identity: default_identity(),
            prompts_dir: None,
            timezone_offset_hours: default_timezone_offset(),
            context_results: default_context_results(),
        }
    }
}

fn default_identity() -> String {
    "Pagewright".into()
}
fn default_timezone_offset() -> i32 {
    9
}
fn default_context_results() -> usize {
    7
}

/// `[storage]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path of the libSQL embedding cache. `~` is expanded to the home directory.
    #[serde(default = "default_cache_path")]
    pub cache_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            cache_path: default_cache_path(),
        }
    }
}

fn default_cache_path() -> String {
    "~/.pagewright/embeddings.db".into()
}

impl StorageConfig {
    /// Resolve `cache_path`, expanding a leading `~/`.
    pub fn resolved_cache_path(&self) -> Result<PathBuf> {
        match self.cache_path.strip_prefix("~/") {
            Some(rest) => {
                let home = dirs::home_dir().ok_or_else(|| {
                    PagewrightError::config("could not determine home directory")
                })?;
                Ok(home.join(rest))
            }
            None => Ok(PathBuf::from(&self.cache_path)),
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.pagewright/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| PagewrightError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.pagewright/pagewright.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| PagewrightError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        PagewrightError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| PagewrightError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| PagewrightError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| PagewrightError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read a required secret from the env var named in the config.
pub fn read_secret(var_name: &str, what: &str) -> Result<String> {
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(PagewrightError::config(format!(
            "{what} not found. Set the {var_name} environment variable."
        ))),
    }
}

/// Check that every credential the server needs is present. Fatal at startup.
pub fn validate_credentials(config: &AppConfig) -> Result<()> {
    read_secret(&config.notion.api_key_env, "Notion API key")?;
    read_secret(&config.llm.api_key_env, "LLM API key")?;
    Ok(())
}

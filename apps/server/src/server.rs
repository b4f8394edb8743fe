//! Webhook listener: validates triggers, acknowledges, and runs pipelines in the background.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Serialize;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use pagewright_core::Pipeline;
use pagewright_notion::parse_page_object;
use pagewright_shared::{PageRecord, PropertyNames};

#[derive(Clone)]
pub(crate) struct ServerState {
    pipeline: Arc<Pipeline>,
    names: Arc<PropertyNames>,
}

impl ServerState {
    pub(crate) fn new(pipeline: Arc<Pipeline>, names: PropertyNames) -> Self {
        Self {
            pipeline,
            names: Arc::new(names),
        }
    }
}

/// Which pipeline a webhook route starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TriggerKind {
    Completion,
    Properties,
    Index,
}

impl TriggerKind {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Completion => "completion",
            Self::Properties => "properties",
            Self::Index => "index",
        }
    }
}

#[derive(Debug, Serialize)]
struct Accepted {
    status: &'static str,
    trigger: &'static str,
    page_id: String,
}

pub(crate) async fn serve(addr: SocketAddr, state: ServerState) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "webhook listener started");
    axum::serve(listener, router(state)).await
}

pub(crate) fn router(state: ServerState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/webhook", post(completion_webhook))
        .route("/webhook/properties", post(properties_webhook))
        .route("/webhook/index", post(index_webhook))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn completion_webhook(State(state): State<ServerState>, Json(body): Json<Value>) -> Response {
    accept(state, body, TriggerKind::Completion)
}

async fn properties_webhook(State(state): State<ServerState>, Json(body): Json<Value>) -> Response {
    accept(state, body, TriggerKind::Properties)
}

async fn index_webhook(State(state): State<ServerState>, Json(body): Json<Value>) -> Response {
    accept(state, body, TriggerKind::Index)
}

/// Validate the payload, spawn the pipeline, and acknowledge without waiting for it.
fn accept(state: ServerState, body: Value, kind: TriggerKind) -> Response {
    let page = match parse_trigger(&body, &state.names) {
        Ok(page) => page,
        Err(message) => {
            warn!(trigger = kind.as_str(), %message, "rejecting webhook");
            return (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response();
        }
    };

    info!(trigger = kind.as_str(), page_id = %page.id, title = %page.title, "webhook accepted");
    let page_id = page.id.clone();
    let pipeline = state.pipeline.clone();

    tokio::spawn(async move {
        let result = match kind {
            TriggerKind::Completion => pipeline.run_completion(&page).await.map(|_| ()),
            TriggerKind::Properties => pipeline.run_property_update(&page).await.map(|_| ()),
            TriggerKind::Index => pipeline.index_page(&page.id).await,
        };
        if let Err(e) = result {
            error!(trigger = kind.as_str(), page_id = %page.id, error = %e, "pipeline failed");
        }
    });

    let accepted = Accepted {
        status: "accepted",
        trigger: kind.as_str(),
        page_id,
    };
    (StatusCode::OK, Json(accepted)).into_response()
}

/// Pull the page out of an automation payload (`{"data": <page object>}`).
fn parse_trigger(body: &Value, names: &PropertyNames) -> Result<PageRecord, String> {
    let data = body
        .get("data")
        .filter(|d| d.is_object())
        .ok_or("payload has no data object")?;
    let page = parse_page_object(data, names).map_err(|e| e.to_string())?;
    if page.id.trim().is_empty() {
        return Err("payload has an empty page id".into());
    }
    Ok(page)
}

//! HTTP surface: batch upload, inbound webhook, tool execution, health.

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tracing::{info, warn};

use crate::channels::messaging::{jid_to_phone, parse_incoming};
use crate::correlation;
use crate::dispatch::MessageQueue;
use crate::pipeline::{BatchProcessor, UploadRow};
use crate::store::SheetService;
use crate::tools::{ToolError, ToolRegistry};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<SheetService>,
    pub processor: Arc<BatchProcessor>,
    pub queue: Arc<MessageQueue>,
    pub registry: Arc<ToolRegistry>,
}

/// Build the Axum router.
pub fn routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/upload", post(upload_batch))
        .route("/api/agent/tools", get(list_tools))
        .route("/api/agent/tool", post(execute_tool))
        .route("/webhook", post(messaging_webhook))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ── Health ──────────────────────────────────────────────────────────

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let queue = state.queue.stats().await;
    Json(serde_json::json!({
        "status": "ok",
        "service": "remedia",
        "queue": queue,
    }))
}

// ── Batch upload ────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct UploadRequest {
    rows: Vec<UploadRow>,
    #[serde(default)]
    source_file: Option<String>,
}

async fn upload_batch(
    State(state): State<AppState>,
    Json(request): Json<UploadRequest>,
) -> impl IntoResponse {
    match state
        .processor
        .process_batch(request.rows, request.source_file.as_deref())
        .await
    {
        Ok(outcome) => (StatusCode::OK, Json(serde_json::json!(outcome))),
        Err(e) => {
            warn!(error = %e, "Batch upload failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": e.to_string() })),
            )
        }
    }
}

// ── Tool surface ────────────────────────────────────────────────────

async fn list_tools(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.registry.tool_definitions().await)
}

#[derive(Debug, Deserialize)]
struct ToolRequest {
    name: String,
    #[serde(default)]
    params: serde_json::Value,
}

async fn execute_tool(
    State(state): State<AppState>,
    Json(request): Json<ToolRequest>,
) -> impl IntoResponse {
    match state.registry.execute(&request.name, request.params).await {
        Ok(output) => (StatusCode::OK, Json(serde_json::json!(output))),
        Err(e) => {
            let status = match &e {
                ToolError::NotFound(_) => StatusCode::NOT_FOUND,
                ToolError::InvalidParameters(_) => StatusCode::BAD_REQUEST,
                ToolError::ExecutionFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (status, Json(serde_json::json!({ "error": e.to_string() })))
        }
    }
}

// ── Inbound messaging webhook ───────────────────────────────────────

/// Provider webhook for inbound messages. A reply is recorded against the
/// transaction whose correlation token appears in the text; replies without
/// a resolvable token are logged and dropped. Always answers 200 so the
/// provider does not retry.
async fn messaging_webhook(
    State(state): State<AppState>,
    Json(payload): Json<serde_json::Value>,
) -> impl IntoResponse {
    let Some((sender_jid, text)) = parse_incoming(&payload) else {
        return Json(serde_json::json!({ "status": "ignored" }));
    };

    let phone = jid_to_phone(&sender_jid);
    let Some(token) = correlation::extract(&text) else {
        warn!(%phone, "Inbound message carries no correlation token; dropped");
        return Json(serde_json::json!({ "status": "no_correlation_id" }));
    };

    if state.store.add_whatsapp_message(&token, &text).await {
        if !state.store.save_all().await {
            warn!(correlation_id = %token, "Persistence failed after inbound message");
        }
        info!(%phone, correlation_id = %token, "Inbound message recorded");
        Json(serde_json::json!({ "status": "recorded", "correlation_id": token }))
    } else {
        warn!(correlation_id = %token, "Inbound token resolved no transaction");
        Json(serde_json::json!({ "status": "unmatched", "correlation_id": token }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::{DisabledEmailSender, EmailSender, MessagingSender};
    use crate::error::ChannelError;
    use crate::store::backend::LibSqlBackend;
    use crate::store::schema::columns;
    use crate::store::CellValue;
    use async_trait::async_trait;
    use std::time::Duration;

    struct OkMessaging;

    #[async_trait]
    impl MessagingSender for OkMessaging {
        async fn send(&self, _to: &str, _body: &str) -> Result<bool, ChannelError> {
            Ok(true)
        }
    }

    async fn state() -> AppState {
        let backend = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let store = SheetService::open(backend).await.unwrap();
        let email: Arc<dyn EmailSender> = Arc::new(DisabledEmailSender);
        let queue = MessageQueue::spawn_with(Arc::new(OkMessaging), 3, Duration::from_millis(1));
        let processor = Arc::new(BatchProcessor::new(
            Arc::clone(&store),
            Arc::clone(&email),
            Arc::clone(&queue),
        ));
        let registry = Arc::new(ToolRegistry::new());
        crate::tools::builtin::register_all(
            &registry,
            Arc::clone(&store),
            email,
            Arc::clone(&queue),
        );
        AppState {
            store,
            processor,
            queue,
            registry,
        }
    }

    fn webhook_payload(jid: &str, text: &str) -> serde_json::Value {
        serde_json::json!({
            "event": "chats.update",
            "data": {
                "chats": {
                    "messages": [{
                        "message": {
                            "key": { "fromMe": false, "remoteJid": jid },
                            "message": { "conversation": text }
                        }
                    }]
                }
            }
        })
    }

    #[tokio::test]
    async fn webhook_records_reply_with_token() {
        let state = state().await;
        {
            let mut sheet = state.store.transactions.write().await;
            sheet
                .add_values(&[
                    (columns::MOVIMIENTO, CellValue::text("1002")),
                    (columns::WP_ID, CellValue::text("abc123-def456")),
                ])
                .unwrap();
        }

        let payload = webhook_payload(
            "573178965432@s.whatsapp.net",
            "Confirmo la transacción, código de caso abc123-def456",
        );
        messaging_webhook(State(state.clone()), Json(payload)).await;

        assert_eq!(state.store.wp_history.read().await.len(), 1);
    }

    #[tokio::test]
    async fn webhook_drops_reply_without_token() {
        let state = state().await;
        let payload = webhook_payload("573178965432@s.whatsapp.net", "hola, quien es?");
        messaging_webhook(State(state.clone()), Json(payload)).await;
        assert!(state.store.wp_history.read().await.is_empty());
    }

    #[tokio::test]
    async fn registry_exposes_builtin_tools() {
        let state = state().await;
        let names = state.registry.list().await;
        for expected in [
            "list_transactions",
            "find_transaction",
            "add_transaction",
            "update_transaction",
            "update_transaction_state",
            "save_record_store",
            "reload_record_store",
            "list_email_history",
            "find_email_messages",
            "add_email_message",
            "list_wp_history",
            "find_wp_messages",
            "add_wp_message",
            "list_states",
            "find_state",
            "send_email",
            "queue_message",
        ] {
            assert!(names.contains(&expected.to_string()), "missing {expected}");
        }
    }
}

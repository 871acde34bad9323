use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::message_store::MessageStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<MessageStore>,
}

#[derive(Deserialize)]
pub struct CreateMessageRequest {
    pub user_id: Option<String>,
    pub role: Option<String>,
    pub content: Option<String>,
}

/// Rejects absent and empty fields alike.
fn validate_create(req: &CreateMessageRequest) -> Option<(String, String, String)> {
    let user_id = req.user_id.as_deref().filter(|s| !s.is_empty())?;
    let role = req.role.as_deref().filter(|s| !s.is_empty())?;
    let content = req.content.as_deref().filter(|s| !s.is_empty())?;
    Some((user_id.to_string(), role.to_string(), content.to_string()))
}

pub fn router(store: Arc<MessageStore>) -> Router {
    let state = AppState { store };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(root_handler))
        .route("/api/health", get(health_check))
        .route("/api/messages/:user_id", get(get_messages))
        .route("/api/messages", post(create_message))
        .route("/api/messages/:user_id", delete(delete_messages))
        .layer(cors)
        .with_state(state)
}

/// Bind the configured port (`MESSAGES_PORT`, default 3001) without
/// serving, so a failed bind surfaces to the caller instead of inside a
/// background task.
pub async fn bind_from_env() -> anyhow::Result<tokio::net::TcpListener> {
    let port = std::env::var("MESSAGES_PORT")
        .ok()
        .and_then(|v| v.parse::<u16>().ok())
        .unwrap_or(3001);

    let listener = tokio::net::TcpListener::bind(format!("127.0.0.1:{}", port))
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind port {}: {}", port, e))?;
    println!("🌐 Messages API running on http://localhost:{}", port);
    Ok(listener)
}

/// Start the messages API on the configured port.
pub async fn serve(store: Arc<MessageStore>) -> anyhow::Result<()> {
    let listener = bind_from_env().await?;
    serve_on(listener, store).await
}

/// Serve on a caller-supplied listener (tests bind an ephemeral port).
pub async fn serve_on(
    listener: tokio::net::TcpListener,
    store: Arc<MessageStore>,
) -> anyhow::Result<()> {
    let app = router(store);
    axum::serve(listener, app)
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;
    Ok(())
}

async fn root_handler() -> Json<serde_json::Value> {
    Json(json!({
        "status": "online",
        "service": "polaris-messages",
        "endpoints": [
            "GET /api/health",
            "GET /api/messages/:user_id",
            "POST /api/messages",
            "DELETE /api/messages/:user_id"
        ]
    }))
}

async fn health_check() -> &'static str {
    "ok"
}

async fn get_messages(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> impl IntoResponse {
    match state.store.history(&user_id) {
        Ok(messages) => (StatusCode::OK, Json(json!(messages))),
        Err(e) => {
            eprintln!("❌ Error fetching messages: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Failed to fetch messages"})),
            )
        }
    }
}

async fn create_message(
    State(state): State<AppState>,
    Json(req): Json<CreateMessageRequest>,
) -> impl IntoResponse {
    let Some((user_id, role, content)) = validate_create(&req) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "Missing required fields"})),
        );
    };

    match state.store.append(&user_id, &role, &content) {
        Ok(stored) => (StatusCode::OK, Json(json!(stored))),
        Err(e) => {
            eprintln!("❌ Error creating message: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Failed to create message"})),
            )
        }
    }
}

async fn delete_messages(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> impl IntoResponse {
    match state.store.wipe(&user_id) {
        Ok(_) => (StatusCode::OK, Json(json!({"success": true}))),
        Err(e) => {
            eprintln!("❌ Error deleting messages: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({"error": "Failed to delete messages"})),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message_store::MessageStore;

    fn req(user_id: Option<&str>, role: Option<&str>, content: Option<&str>) -> CreateMessageRequest {
        CreateMessageRequest {
            user_id: user_id.map(String::from),
            role: role.map(String::from),
            content: content.map(String::from),
        }
    }

    #[test]
    fn test_validate_rejects_missing_and_empty() {
        assert!(validate_create(&req(Some("u1"), Some("user"), Some("hi"))).is_some());
        assert!(validate_create(&req(None, Some("user"), Some("hi"))).is_none());
        assert!(validate_create(&req(Some("u1"), Some(""), Some("hi"))).is_none());
        assert!(validate_create(&req(Some("u1"), Some("user"), None)).is_none());
    }

    #[tokio::test]
    async fn test_bind_from_env_reports_a_taken_port() {
        let taken = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = taken.local_addr().unwrap().port();

        std::env::set_var("MESSAGES_PORT", port.to_string());
        let result = bind_from_env().await;
        std::env::remove_var("MESSAGES_PORT");

        assert!(result.is_err());
    }

    async fn spawn_server() -> anyhow::Result<String> {
        let store = Arc::new(MessageStore::open_in_memory()?);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        tokio::spawn(serve_on(listener, store));
        Ok(format!("http://{}", addr))
    }

    #[tokio::test]
    async fn test_messages_api_round_trip() -> anyhow::Result<()> {
        let base = spawn_server().await?;
        let client = reqwest::Client::new();

        // health
        let health = client.get(format!("{}/api/health", base)).send().await?;
        assert_eq!(health.status(), 200);
        assert_eq!(health.text().await?, "ok");

        // missing field -> 400
        let bad = client
            .post(format!("{}/api/messages", base))
            .json(&json!({"user_id": "u1", "role": "user"}))
            .send()
            .await?;
        assert_eq!(bad.status(), 400);

        // append 21, cap holds at 20 with the oldest gone
        for i in 0..21 {
            let resp = client
                .post(format!("{}/api/messages", base))
                .json(&json!({"user_id": "u1", "role": "user", "content": format!("msg {}", i)}))
                .send()
                .await?;
            assert_eq!(resp.status(), 200);
        }
        let history: Vec<serde_json::Value> = client
            .get(format!("{}/api/messages/u1", base))
            .send()
            .await?
            .json()
            .await?;
        assert_eq!(history.len(), 20);
        assert_eq!(history[0]["content"], "msg 1");
        assert_eq!(history[19]["content"], "msg 20");

        // wipe
        let deleted = client
            .delete(format!("{}/api/messages/u1", base))
            .send()
            .await?;
        assert_eq!(deleted.status(), 200);
        let empty: Vec<serde_json::Value> = client
            .get(format!("{}/api/messages/u1", base))
            .send()
            .await?
            .json()
            .await?;
        assert!(empty.is_empty());

        Ok(())
    }
}

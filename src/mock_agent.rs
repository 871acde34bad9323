//! In-process stand-in for the device-control agent.
//!
//! Simulates every endpoint of the control boundary with a canned contact
//! directory, for development and tests without a device attached. All
//! actions are logged and succeed.

use crate::agent::{Contact, ContactSearchResult, PlanReport, StepReport};
use crate::error::AppError;
use crate::schema::{AgentResponse, AutomationStep};
use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::sleep;
use tower_http::cors::{Any, CorsLayer};

const MOCK_CONTACTS: &[(&str, &str)] = &[
    ("Jutin", "+1234567890"),
    ("John Smith", "+1234567891"),
    ("Jane Doe", "+1234567892"),
    ("Bob Johnson", "+1234567893"),
    ("Alice Williams", "+1234567894"),
];

/// Pacing between batch-plan steps, mirroring the real agent's loop.
const PLAN_STEP_DELAY_MS: u64 = 500;

/// PNG signature, enough for clients that only sniff the magic bytes.
const SCREENSHOT_STUB: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

/// A WhatsApp compose screen as `uiautomator` dumps it, send button
/// included so locator code gets realistic input.
const MOCK_UI_XML: &str = r#"<?xml version='1.0' encoding='UTF-8' standalone='yes' ?><hierarchy rotation="0"><node index="0" text="Type a message" resource-id="com.whatsapp:id/entry" class="android.widget.EditText" bounds="[24,746][600,858]" /><node index="2" text="" resource-id="com.whatsapp:id/send" class="android.widget.ImageButton" content-desc="Send" bounds="[616,746][726,858]" /></hierarchy>"#;

pub fn directory() -> Vec<Contact> {
    MOCK_CONTACTS
        .iter()
        .map(|(name, number)| Contact {
            name: name.to_string(),
            number: number.to_string(),
        })
        .collect()
}

/// Case-insensitive substring search over the canned directory. A miss
/// comes back with the first few names as suggestions.
pub fn search_directory(query: &str) -> ContactSearchResult {
    let query_lower = query.to_lowercase();
    let matches: Vec<Contact> = directory()
        .into_iter()
        .filter(|c| c.name.to_lowercase().contains(&query_lower))
        .collect();

    match matches.into_iter().next() {
        Some(contact) => ContactSearchResult {
            success: true,
            contact: Some(contact),
            error: None,
            suggestions: None,
        },
        None => ContactSearchResult {
            success: false,
            contact: None,
            error: Some(format!("No contact found matching \"{}\"", query)),
            suggestions: Some(
                MOCK_CONTACTS
                    .iter()
                    .take(3)
                    .map(|(name, _)| name.to_string())
                    .collect(),
            ),
        },
    }
}

fn resolve_number(contact: &str) -> Option<String> {
    search_directory(contact).contact.map(|c| c.number)
}

#[derive(Clone, Copy)]
struct MockState {
    step_delay_ms: u64,
}

#[derive(Deserialize)]
struct SearchBody {
    query: Option<String>,
}

#[derive(Deserialize)]
struct UrlBody {
    url: Option<String>,
    browser: Option<String>,
}

#[derive(Deserialize)]
struct AppBody {
    package_name: Option<String>,
}

#[derive(Deserialize)]
struct WhatsappBody {
    contact: Option<String>,
    message: Option<String>,
}

#[derive(Deserialize)]
struct CallBody {
    contact: Option<String>,
}

#[derive(Deserialize)]
struct EmailBody {
    to: Option<String>,
    subject: Option<String>,
}

#[derive(Deserialize)]
struct TapBody {
    x: Option<i32>,
    y: Option<i32>,
}

#[derive(Deserialize)]
struct TypeBody {
    text: Option<String>,
}

#[derive(Deserialize)]
struct GestureBody {
    direction: Option<String>,
}

#[derive(Deserialize)]
struct KeyBody {
    keycode: Option<i32>,
}

#[derive(Deserialize)]
struct PlanBody {
    steps: Vec<AutomationStep>,
}

async fn status_handler() -> Json<Value> {
    println!("✅ [Mock] Status check");
    Json(json!({
        "connected": true,
        "message": "Mock device connected",
        "mock": true,
    }))
}

async fn contacts_handler() -> Json<Value> {
    println!("📇 [Mock] Get all contacts");
    Json(json!({
        "success": true,
        "contacts": directory(),
    }))
}

async fn search_handler(Json(body): Json<SearchBody>) -> Json<ContactSearchResult> {
    let query = body.query.unwrap_or_default();
    println!("🔍 [Mock] Search contact: \"{}\"", query);
    Json(search_directory(&query))
}

async fn open_url_handler(Json(body): Json<UrlBody>) -> Json<AgentResponse> {
    let url = body.url.unwrap_or_default();
    let browser = body.browser.unwrap_or_else(|| "default browser".to_string());
    println!("🌐 [Mock] Open URL: {} in {}", url, browser);
    Json(AgentResponse::ok(&format!(
        "Simulated: Opened {} in {}",
        url, browser
    )))
}

async fn open_app_handler(Json(body): Json<AppBody>) -> Json<AgentResponse> {
    let package = body.package_name.unwrap_or_default();
    println!("📱 [Mock] Open app: {}", package);
    Json(AgentResponse::ok(&format!("Simulated: Opened {}", package)))
}

async fn whatsapp_handler(Json(body): Json<WhatsappBody>) -> Json<AgentResponse> {
    let contact = body.contact.unwrap_or_default();
    let message = body.message.unwrap_or_default();
    println!("💬 [Mock] WhatsApp to {}: \"{}\"", contact, message);

    let mut response = AgentResponse::ok(&format!(
        "Simulated: Opened WhatsApp with message to {}",
        contact
    ));
    response.resolved_number = Some(resolve_number(&contact).unwrap_or(contact));
    Json(response)
}

async fn call_handler(Json(body): Json<CallBody>) -> Json<AgentResponse> {
    let contact = body.contact.unwrap_or_default();
    println!("📞 [Mock] Call: {}", contact);

    let mut response = AgentResponse::ok(&format!("Simulated: Initiated call to {}", contact));
    response.resolved_number = Some(resolve_number(&contact).unwrap_or(contact));
    Json(response)
}

async fn email_handler(Json(body): Json<EmailBody>) -> Json<AgentResponse> {
    let to = body.to.unwrap_or_default();
    println!(
        "📧 [Mock] Email to {}: {}",
        to,
        body.subject.as_deref().unwrap_or("(no subject)")
    );
    Json(AgentResponse::ok(&format!("Simulated: Sent email to {}", to)))
}

async fn tap_handler(Json(body): Json<TapBody>) -> Json<AgentResponse> {
    let x = body.x.unwrap_or_default();
    let y = body.y.unwrap_or_default();
    println!("👆 [Mock] Tap at ({}, {})", x, y);
    Json(AgentResponse::ok(&format!("Simulated: Tapped at ({}, {})", x, y)))
}

async fn type_handler(Json(body): Json<TypeBody>) -> Json<AgentResponse> {
    let text = body.text.unwrap_or_default();
    println!("⌨️  [Mock] Type: \"{}\"", text);
    Json(AgentResponse::ok(&format!("Simulated: Typed \"{}\"", text)))
}

async fn swipe_handler(Json(body): Json<GestureBody>) -> Json<AgentResponse> {
    let direction = body.direction.unwrap_or_else(|| "up".to_string());
    println!("👉 [Mock] Swipe {}", direction);
    Json(AgentResponse::ok(&format!("Simulated: Swiped {}", direction)))
}

async fn scroll_handler(Json(body): Json<GestureBody>) -> Json<AgentResponse> {
    let direction = body.direction.unwrap_or_else(|| "down".to_string());
    println!("📜 [Mock] Scroll {}", direction);
    Json(AgentResponse::ok(&format!("Simulated: Scrolled {}", direction)))
}

async fn key_handler(Json(body): Json<KeyBody>) -> Json<AgentResponse> {
    let keycode = body.keycode.unwrap_or_default();
    println!("🔘 [Mock] Press key: {}", keycode);
    Json(AgentResponse::ok(&format!("Simulated: Pressed key {}", keycode)))
}

async fn execute_plan_handler(
    State(state): State<MockState>,
    Json(body): Json<PlanBody>,
) -> Json<PlanReport> {
    println!(
        "🤖 [Mock] Executing automation plan with {} steps",
        body.steps.len()
    );

    let mut results = Vec::with_capacity(body.steps.len());
    for (index, step) in body.steps.iter().enumerate() {
        println!("  {}. {}: {}", index + 1, step.action.as_str(), step.reasoning);
        results.push(StepReport {
            step: step.action.as_str().to_string(),
            reasoning: step.reasoning.clone(),
            success: true,
            output: Some(format!("Simulated: {} completed", step.action.as_str())),
            error: None,
        });
        if state.step_delay_ms > 0 {
            sleep(Duration::from_millis(state.step_delay_ms)).await;
        }
    }

    println!("✅ [Mock] Plan execution complete (simulated)");
    Json(PlanReport {
        success: true,
        results,
    })
}

async fn screenshot_handler() -> impl IntoResponse {
    println!("📸 [Mock] Screenshot");
    ([(header::CONTENT_TYPE, "image/png")], SCREENSHOT_STUB.to_vec())
}

async fn ui_dump_handler() -> Json<Value> {
    println!("🗂️  [Mock] UI dump");
    Json(json!({
        "success": true,
        "xml": MOCK_UI_XML,
    }))
}

pub fn router() -> Router {
    router_with_delay(PLAN_STEP_DELAY_MS)
}

pub fn router_with_delay(step_delay_ms: u64) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/status", get(status_handler))
        .route("/contacts", get(contacts_handler))
        .route("/contacts/search", post(search_handler))
        .route("/open-url", post(open_url_handler))
        .route("/open-app", post(open_app_handler))
        .route("/whatsapp", post(whatsapp_handler))
        .route("/call", post(call_handler))
        .route("/email", post(email_handler))
        .route("/tap", post(tap_handler))
        .route("/type", post(type_handler))
        .route("/swipe", post(swipe_handler))
        .route("/scroll", post(scroll_handler))
        .route("/key", post(key_handler))
        .route("/execute-plan", post(execute_plan_handler))
        .route("/screenshot", get(screenshot_handler))
        .route("/ui-dump", get(ui_dump_handler))
        .layer(cors)
        .with_state(MockState { step_delay_ms })
}

/// Bind and serve on `AGENT_PORT` (default 3000), the same address the
/// HTTP client reads, so the mock drops in for the real agent.
pub async fn serve() -> Result<(), AppError> {
    let port = std::env::var("AGENT_PORT").unwrap_or_else(|_| "3000".to_string());
    let listener = TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
    println!("🎭 Mock control agent running on http://localhost:{}", port);
    println!("   All actions are simulated and logged to the console.");
    serve_on(listener).await
}

pub async fn serve_on(listener: TcpListener) -> Result<(), AppError> {
    axum::serve(listener, router()).await?;
    Ok(())
}

//! Conversation state for the chat path.
//!
//! A session keeps the rolling history the model sees and, when configured,
//! mirrors each exchange to the messages API. The mirror is best effort:
//! a dead API never breaks the conversation.

use crate::error::AppError;
use crate::message_store::StoredMessage;
use crate::planner::PlannerClient;
use crate::schema::{Message, Role};
use crate::storage::MAX_MESSAGES;
use reqwest::Client;
use serde_json::json;
use std::time::Duration;
use uuid::Uuid;

pub struct ChatSession {
    planner: PlannerClient,
    user_id: String,
    history: Vec<Message>,
    sync: Option<MessageApiClient>,
}

impl ChatSession {
    pub fn new(planner: PlannerClient) -> Self {
        ChatSession {
            planner,
            user_id: Uuid::new_v4().to_string(),
            history: Vec::new(),
            sync: None,
        }
    }

    pub fn with_user_id(mut self, user_id: &str) -> Self {
        self.user_id = user_id.to_string();
        self
    }

    /// Seed history from storage. Keeps only the most recent messages.
    pub fn with_history(mut self, history: Vec<Message>) -> Self {
        self.history = history;
        self.trim();
        self
    }

    pub fn with_sync(mut self, sync: MessageApiClient) -> Self {
        self.sync = Some(sync);
        self
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    /// One exchange: prior history goes out as context, both turns are
    /// committed only once the model answered. A failed call leaves the
    /// history exactly as it was.
    pub async fn send(&mut self, text: &str) -> Result<String, AppError> {
        let reply = self.planner.chat(text, &self.history).await?;

        self.push(Message::new(Role::User, text));
        self.push(Message::new(Role::Assistant, &reply));

        if let Some(sync) = &self.sync {
            sync.record_exchange(&self.user_id, text, &reply).await;
        }
        Ok(reply)
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }

    fn push(&mut self, message: Message) {
        self.history.push(message);
        self.trim();
    }

    fn trim(&mut self) {
        if self.history.len() > MAX_MESSAGES {
            let excess = self.history.len() - MAX_MESSAGES;
            self.history.drain(..excess);
        }
    }
}

/// Client for the message-persistence API.
pub struct MessageApiClient {
    client: Client,
    base_url: String,
}

impl MessageApiClient {
    pub fn new(base_url: &str) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| AppError::Storage(format!("Failed to create HTTP client: {}", e)))?;

        Ok(MessageApiClient {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_env() -> Result<Self, AppError> {
        let port = std::env::var("MESSAGES_PORT")
            .ok()
            .and_then(|v| v.parse::<u16>().ok())
            .unwrap_or(3001);
        Self::new(&format!("http://localhost:{}", port))
    }

    /// Store one message. Failures are logged and swallowed.
    pub async fn record(&self, user_id: &str, role: Role, content: &str) {
        let body = json!({
            "user_id": user_id,
            "role": role.as_str(),
            "content": content,
        });
        let result = self
            .client
            .post(format!("{}/api/messages", self.base_url))
            .json(&body)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {}
            Ok(response) => {
                eprintln!("⚠️ Message sync rejected with status {}", response.status());
            }
            Err(e) => {
                eprintln!("⚠️ Message sync unavailable: {}", e);
            }
        }
    }

    pub async fn record_exchange(&self, user_id: &str, user_text: &str, assistant_text: &str) {
        self.record(user_id, Role::User, user_text).await;
        self.record(user_id, Role::Assistant, assistant_text).await;
    }

    /// Last stored messages for a user, oldest first.
    pub async fn history(&self, user_id: &str) -> Result<Vec<StoredMessage>, AppError> {
        let response = self
            .client
            .get(format!("{}/api/messages/{}", self.base_url, user_id))
            .send()
            .await
            .map_err(|e| AppError::Storage(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AppError::Storage(format!(
                "history fetch failed with status {}",
                response.status()
            )));
        }
        response
            .json::<Vec<StoredMessage>>()
            .await
            .map_err(|e| AppError::Storage(e.to_string()))
    }

    pub async fn wipe(&self, user_id: &str) -> Result<(), AppError> {
        let response = self
            .client
            .delete(format!("{}/api/messages/{}", self.base_url, user_id))
            .send()
            .await
            .map_err(|e| AppError::Storage(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AppError::Storage(format!(
                "wipe failed with status {}",
                response.status()
            )));
        }
        Ok(())
    }
}

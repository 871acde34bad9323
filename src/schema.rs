use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One user-intent action inside an automation plan.
/// `target` is overloaded by action: URL for open_url, package name for
/// open_app, contact name for whatsapp/call, recipient for email,
/// milliseconds for wait.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum StepAction {
    OpenUrl,
    OpenApp,
    Whatsapp,
    Email,
    Call,
    Tap,
    Type,
    Swipe,
    Scroll,
    Wait,
    Key,
}

impl StepAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepAction::OpenUrl => "open_url",
            StepAction::OpenApp => "open_app",
            StepAction::Whatsapp => "whatsapp",
            StepAction::Email => "email",
            StepAction::Call => "call",
            StepAction::Tap => "tap",
            StepAction::Type => "type",
            StepAction::Swipe => "swipe",
            StepAction::Scroll => "scroll",
            StepAction::Wait => "wait",
            StepAction::Key => "key",
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl Default for StepStatus {
    fn default() -> Self {
        StepStatus::Pending
    }
}

impl StepStatus {
    /// Lifecycle only moves forward: pending -> running -> completed | failed.
    pub fn can_advance_to(&self, next: StepStatus) -> bool {
        matches!(
            (self, next),
            (StepStatus::Pending, StepStatus::Running)
                | (StepStatus::Running, StepStatus::Completed)
                | (StepStatus::Running, StepStatus::Failed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StepStatus::Completed | StepStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::Running => "running",
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AutomationStep {
    pub action: StepAction,
    pub target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub browser: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub x: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub y: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keycode: Option<i32>,
    pub reasoning: String,
    #[serde(default)]
    pub status: StepStatus,
}

impl AutomationStep {
    pub fn new(action: StepAction, target: &str, reasoning: &str) -> Self {
        AutomationStep {
            action,
            target: target.to_string(),
            text: None,
            subject: None,
            browser: None,
            x: None,
            y: None,
            keycode: None,
            reasoning: reasoning.to_string(),
            status: StepStatus::Pending,
        }
    }

    pub fn with_text(mut self, text: &str) -> Self {
        self.text = Some(text.to_string());
        self
    }

    pub fn with_subject(mut self, subject: &str) -> Self {
        self.subject = Some(subject.to_string());
        self
    }

    pub fn with_coords(mut self, x: i32, y: i32) -> Self {
        self.x = Some(x);
        self.y = Some(y);
        self
    }

    pub fn with_keycode(mut self, keycode: i32) -> Self {
        self.keycode = Some(keycode);
        self
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A single message in the conversation history
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(role: Role, content: &str) -> Self {
        Message {
            role,
            content: content.to_string(),
            timestamp: Utc::now(),
        }
    }
}

/// Stored credential for the planning endpoint. Overwritten wholesale on save.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ApiKeyConfig {
    pub api_key: String,
    pub timestamp: i64, // unix millis at save time
}

impl ApiKeyConfig {
    pub fn new(api_key: &str) -> Self {
        ApiKeyConfig {
            api_key: api_key.to_string(),
            timestamp: Utc::now().timestamp_millis(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IntentKind {
    Chat,
    Automation,
}

/// Wire response shared by every control-agent endpoint.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct AgentResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resolved_number: Option<String>,
}

impl AgentResponse {
    pub fn ok(output: &str) -> Self {
        AgentResponse {
            success: true,
            output: Some(output.to_string()),
            ..Default::default()
        }
    }

    pub fn err(error: &str) -> Self {
        AgentResponse {
            success: false,
            error: Some(error.to_string()),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_wire_names() {
        let json = serde_json::to_string(&StepAction::OpenUrl).unwrap();
        assert_eq!(json, "\"open_url\"");
        let parsed: StepAction = serde_json::from_str("\"whatsapp\"").unwrap();
        assert_eq!(parsed, StepAction::Whatsapp);
    }

    #[test]
    fn test_status_moves_forward_only() {
        assert!(StepStatus::Pending.can_advance_to(StepStatus::Running));
        assert!(StepStatus::Running.can_advance_to(StepStatus::Completed));
        assert!(StepStatus::Running.can_advance_to(StepStatus::Failed));
        assert!(!StepStatus::Completed.can_advance_to(StepStatus::Running));
        assert!(!StepStatus::Failed.can_advance_to(StepStatus::Pending));
        assert!(!StepStatus::Pending.can_advance_to(StepStatus::Completed));
    }

    #[test]
    fn test_step_parses_without_status() {
        let raw = r#"{"action":"whatsapp","target":"Sam","text":"hello","reasoning":"send greeting"}"#;
        let step: AutomationStep = serde_json::from_str(raw).unwrap();
        assert_eq!(step.action, StepAction::Whatsapp);
        assert_eq!(step.status, StepStatus::Pending);
        assert_eq!(step.text.as_deref(), Some("hello"));
    }

    #[test]
    fn test_step_serializes_skips_empty_fields() {
        let step = AutomationStep::new(StepAction::Wait, "1000", "settle");
        let json = serde_json::to_string(&step).unwrap();
        assert!(!json.contains("\"text\""));
        assert!(!json.contains("\"keycode\""));
        assert!(json.contains("\"status\":\"pending\""));
    }
}

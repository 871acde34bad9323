use crate::error::AppError;
use crate::schema::{AgentResponse, AutomationStep, StepAction};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::env;
use std::time::Duration;

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct AgentStatus {
    pub connected: bool,
    pub message: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Contact {
    pub name: String,
    pub number: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ContactSearchResult {
    pub success: bool,
    pub contact: Option<Contact>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestions: Option<Vec<String>>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct StepReport {
    pub step: String,
    pub reasoning: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PlanReport {
    pub success: bool,
    pub results: Vec<StepReport>,
}

/// The device-control service, seen from the app side. Any implementation
/// satisfying this contract is substitutable.
#[async_trait]
pub trait ControlAgent: Send + Sync {
    async fn status(&self) -> Result<AgentStatus, AppError>;
    async fn search_contact(&self, query: &str) -> Result<ContactSearchResult, AppError>;
    async fn execute_step(&self, step: &AutomationStep) -> Result<AgentResponse, AppError>;
    async fn execute_plan(&self, steps: &[AutomationStep]) -> Result<PlanReport, AppError>;
    async fn screenshot(&self) -> Result<Vec<u8>, AppError>;
    async fn ui_dump(&self) -> Result<String, AppError>;
}

/// Route for an action on the control agent. `wait` resolves locally in the
/// executor and has no endpoint.
pub fn endpoint_for(action: &StepAction) -> Option<&'static str> {
    match action {
        StepAction::OpenUrl => Some("/open-url"),
        StepAction::OpenApp => Some("/open-app"),
        StepAction::Whatsapp => Some("/whatsapp"),
        StepAction::Call => Some("/call"),
        StepAction::Email => Some("/email"),
        StepAction::Tap => Some("/tap"),
        StepAction::Type => Some("/type"),
        StepAction::Swipe => Some("/swipe"),
        StepAction::Scroll => Some("/scroll"),
        StepAction::Key => Some("/key"),
        StepAction::Wait => None,
    }
}

/// Request body for an action. The raw target string passes through
/// unchanged; contact resolution happens on the agent.
pub fn body_for(step: &AutomationStep) -> Value {
    match step.action {
        StepAction::OpenUrl => json!({"url": step.target, "browser": step.browser}),
        StepAction::OpenApp => json!({"package_name": step.target}),
        StepAction::Whatsapp => json!({"contact": step.target, "message": step.text}),
        StepAction::Call => json!({"contact": step.target}),
        StepAction::Email => json!({"to": step.target, "subject": step.subject, "body": step.text}),
        StepAction::Tap => json!({"x": step.x, "y": step.y}),
        StepAction::Type => json!({"text": step.text}),
        StepAction::Swipe => json!({"direction": step.target}),
        StepAction::Scroll => json!({"direction": step.target}),
        StepAction::Key => json!({"keycode": step.keycode}),
        StepAction::Wait => json!({}),
    }
}

/// HTTP client for the control-agent boundary.
pub struct HttpControlAgent {
    client: Client,
    base_url: String,
}

impl HttpControlAgent {
    pub fn new(base_url: &str) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AppError::Config(format!("HTTP client build failed: {}", e)))?;

        Ok(HttpControlAgent {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_env() -> Result<Self, AppError> {
        let host = env::var("AGENT_HOST").unwrap_or_else(|_| "localhost".to_string());
        let port = env::var("AGENT_PORT")
            .ok()
            .and_then(|v| v.parse::<u16>().ok())
            .unwrap_or(3000);
        Self::new(&format!("http://{}:{}", host, port))
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl ControlAgent for HttpControlAgent {
    /// Unreachable agents read as disconnected rather than erroring, so the
    /// caller can render a status line either way.
    async fn status(&self) -> Result<AgentStatus, AppError> {
        let response = match self.client.get(self.url("/status")).send().await {
            Ok(r) => r,
            Err(_) => {
                return Ok(AgentStatus {
                    connected: false,
                    message: "Cannot reach control agent. Make sure it is running.".to_string(),
                })
            }
        };

        if !response.status().is_success() {
            return Ok(AgentStatus {
                connected: false,
                message: "Control agent not responding".to_string(),
            });
        }

        response
            .json::<AgentStatus>()
            .await
            .map_err(|e| AppError::Agent(format!("invalid status response: {}", e)))
    }

    async fn search_contact(&self, query: &str) -> Result<ContactSearchResult, AppError> {
        let response = self
            .client
            .post(self.url("/contacts/search"))
            .json(&json!({"query": query}))
            .send()
            .await
            .map_err(|e| AppError::Agent(e.to_string()))?;

        response
            .json::<ContactSearchResult>()
            .await
            .map_err(|e| AppError::Agent(format!("invalid contact search response: {}", e)))
    }

    async fn execute_step(&self, step: &AutomationStep) -> Result<AgentResponse, AppError> {
        let Some(endpoint) = endpoint_for(&step.action) else {
            return Err(AppError::Agent(format!(
                "action '{}' is resolved locally, not by the agent",
                step.action.as_str()
            )));
        };

        let response = self
            .client
            .post(self.url(endpoint))
            .json(&body_for(step))
            .send()
            .await
            .map_err(|e| AppError::Agent(e.to_string()))?;

        // The agent reports step failures inside the JSON body, possibly with
        // a non-2xx status. Trust the body verbatim when it parses.
        let text = response
            .text()
            .await
            .map_err(|e| AppError::Agent(e.to_string()))?;
        serde_json::from_str::<AgentResponse>(&text).map_err(|_| AppError::Agent(text))
    }

    async fn execute_plan(&self, steps: &[AutomationStep]) -> Result<PlanReport, AppError> {
        let response = self
            .client
            .post(self.url("/execute-plan"))
            .json(&json!({"steps": steps}))
            .send()
            .await
            .map_err(|e| AppError::Agent(e.to_string()))?;

        response
            .json::<PlanReport>()
            .await
            .map_err(|e| AppError::Agent(format!("invalid plan report: {}", e)))
    }

    async fn screenshot(&self) -> Result<Vec<u8>, AppError> {
        let response = self
            .client
            .get(self.url("/screenshot"))
            .send()
            .await
            .map_err(|e| AppError::Agent(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AppError::Agent(format!(
                "screenshot failed with status {}",
                response.status()
            )));
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| AppError::Agent(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    async fn ui_dump(&self) -> Result<String, AppError> {
        let response = self
            .client
            .get(self.url("/ui-dump"))
            .send()
            .await
            .map_err(|e| AppError::Agent(e.to_string()))?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| AppError::Agent(format!("invalid ui-dump response: {}", e)))?;

        if body["success"].as_bool().unwrap_or(false) {
            Ok(body["xml"].as_str().unwrap_or_default().to_string())
        } else {
            Err(AppError::Agent(
                body["error"].as_str().unwrap_or("ui dump failed").to_string(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::AutomationStep;

    #[test]
    fn test_every_remote_action_has_an_endpoint() {
        let remote = [
            (StepAction::OpenUrl, "/open-url"),
            (StepAction::OpenApp, "/open-app"),
            (StepAction::Whatsapp, "/whatsapp"),
            (StepAction::Call, "/call"),
            (StepAction::Email, "/email"),
            (StepAction::Tap, "/tap"),
            (StepAction::Type, "/type"),
            (StepAction::Swipe, "/swipe"),
            (StepAction::Scroll, "/scroll"),
            (StepAction::Key, "/key"),
        ];
        for (action, expected) in remote {
            assert_eq!(endpoint_for(&action), Some(expected));
        }
        assert_eq!(endpoint_for(&StepAction::Wait), None);
    }

    #[test]
    fn test_whatsapp_body_passes_raw_target() {
        let step = AutomationStep::new(StepAction::Whatsapp, "Sam", "Message Sam")
            .with_text("hello");
        let body = body_for(&step);
        assert_eq!(body["contact"], "Sam");
        assert_eq!(body["message"], "hello");
    }

    #[test]
    fn test_email_body_fields() {
        let step = AutomationStep::new(StepAction::Email, "sam@example.com", "Send report")
            .with_text("The report is attached.")
            .with_subject("Weekly report");
        let body = body_for(&step);
        assert_eq!(body["to"], "sam@example.com");
        assert_eq!(body["subject"], "Weekly report");
        assert_eq!(body["body"], "The report is attached.");
    }

    #[test]
    fn test_contact_search_result_parses_null_contact() {
        let raw = r#"{"success": false, "contact": null, "error": "No contact found"}"#;
        let result: ContactSearchResult = serde_json::from_str(raw).unwrap();
        assert!(!result.success);
        assert!(result.contact.is_none());
        assert_eq!(result.error.as_deref(), Some("No contact found"));
    }
}

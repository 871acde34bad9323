use crate::error::AppError;
use crate::schema::{AutomationStep, Message, StepAction, StepStatus};
use reqwest::Client;
use serde_json::{json, Value};
use std::env;
use std::time::Duration;

const DEFAULT_BASE_URL: &str = "https://openrouter.ai/api/v1";
const DEFAULT_MODEL: &str = "openrouter/polaris-alpha";

const CHAT_MAX_TOKENS: u32 = 500;
const PLAN_MAX_TOKENS: u32 = 800;

/// Client for the hosted planning model (OpenAI-compatible chat completions).
///
/// Requests are single-shot. A failed request is surfaced to the user, who
/// decides whether to re-invoke planning; nothing here retries on its own.
#[derive(Clone)]
pub struct PlannerClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl PlannerClient {
    pub fn new(api_key: &str) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(120))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| AppError::Config(format!("HTTP client build failed: {}", e)))?;

        Ok(PlannerClient {
            client,
            api_key: api_key.to_string(),
            base_url: env::var("POLARIS_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
            model: env::var("POLARIS_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
        })
    }

    pub fn from_env() -> Result<Self, AppError> {
        dotenv::dotenv().ok(); // Load .env
        let api_key = env::var("POLARIS_API_KEY")
            .map_err(|_| AppError::Config("POLARIS_API_KEY not set in .env".to_string()))?;
        Self::new(&api_key)
    }

    #[cfg(test)]
    pub(crate) fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Free-form chat turn. `history` is included as prior turns, newest last.
    pub async fn chat(&self, message: &str, history: &[Message]) -> Result<String, AppError> {
        let mut messages: Vec<Value> = history
            .iter()
            .map(|m| json!({"role": m.role.as_str(), "content": m.content}))
            .collect();
        messages.push(json!({"role": "user", "content": message}));

        let body = json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": CHAT_MAX_TOKENS,
        });

        let reply = self.completion(&body).await?;
        Ok(reply.unwrap_or_else(|| "No response generated".to_string()))
    }

    /// Plan a task as an ordered step sequence, every status pending.
    ///
    /// Transport/API failures propagate; an unparseable reply degrades to the
    /// one-step fallback plan instead. Callers treat a lone fallback step as a
    /// soft failure to show the user.
    pub async fn plan_task(&self, task: &str) -> Result<Vec<AutomationStep>, AppError> {
        println!("🧠 [Planner] Planning task: '{}'", task);

        let body = json!({
            "model": self.model,
            "messages": [{"role": "user", "content": build_plan_prompt(task)}],
            "max_tokens": PLAN_MAX_TOKENS,
        });

        let content = self
            .completion(&body)
            .await?
            .unwrap_or_else(|| "[]".to_string());
        let steps = steps_from_reply(&content);
        println!("🧠 [Planner] Plan ready with {} steps.", steps.len());
        Ok(steps)
    }

    async fn completion(&self, body: &Value) -> Result<Option<String>, AppError> {
        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(body)
            .send()
            .await
            .map_err(|e| AppError::Planning(e.to_string()))?;

        if !response.status().is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "unreadable error body".to_string());
            return Err(AppError::Planning(format!("Polaris API Error: {}", error_text)));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| AppError::Planning(format!("invalid response body: {}", e)))?;
        Ok(body["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.to_string()))
    }
}

pub fn build_plan_prompt(task: &str) -> String {
    format!(
        r#"You are a mobile automation planner driving an Android device through a device-control agent. Break down this task into specific automation steps.

AVAILABLE ACTIONS:
- open_url: Open URL in browser (target = URL, browser = "opera"|"chrome"|"default")
- open_app: Launch an app (target = package name like "com.instagram.android")
- whatsapp: Send WhatsApp message (target = contact name or phone, text = message)
- call: Make phone call (target = contact name or phone number)
- email: Send email (target = email address, text = message, subject = optional)
- wait: Wait/delay (target = milliseconds, e.g., "2000" for 2 seconds)
- tap: Tap screen (x, y coordinates)
- type: Type text (text = content to type)
- swipe: Swipe screen (target = direction "up"|"down"|"left"|"right")
- scroll: Scroll screen (target = direction "up"|"down")
- key: Press key (keycode = HOME:3, BACK:4, ENTER:66)

IMPORTANT RULES:
1. Contact names will be AUTO-RESOLVED - you can use "Jutin" instead of phone numbers
2. For Instagram/social media, use open_url with the browser parameter
3. Add wait steps between actions (1000-3000ms) for apps to load
4. Use descriptive reasoning for each step

Task: {}

Return ONLY a JSON array of steps. Each step must have:
- action: one of the available actions above
- target: the main target (URL, contact name, phone, email, etc.)
- text: message content (for whatsapp/email/type)
- browser: browser name (for open_url, e.g., "opera")
- subject: email subject (optional, for email)
- x, y: coordinates (for tap)
- keycode: key code (for key)
- reasoning: why this step is needed

Example formats:
Open URL: {{"action": "open_url", "target": "https://instagram.com", "browser": "opera", "reasoning": "Open Instagram in Opera browser"}}
WhatsApp: {{"action": "whatsapp", "target": "Jutin", "text": "Are you coming?", "reasoning": "Message Jutin on WhatsApp"}}
Call: {{"action": "call", "target": "Jutin", "reasoning": "Call Jutin"}}
Wait: {{"action": "wait", "target": "2000", "reasoning": "Wait for app to load"}}

Return only the JSON array, no other text."#,
        task
    )
}

/// First bracketed span of the reply, with markdown fences stripped.
pub fn extract_json_array(content: &str) -> Option<&str> {
    let cleaned = content
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();
    let start = cleaned.find('[')?;
    let end = cleaned.rfind(']')?;
    if end < start {
        return None;
    }
    Some(&cleaned[start..=end])
}

/// Parse the model reply into a plan, forcing every status to pending.
/// Anything unparseable degrades to the fallback plan.
pub fn steps_from_reply(content: &str) -> Vec<AutomationStep> {
    let span = extract_json_array(content).unwrap_or(content);
    match serde_json::from_str::<Vec<AutomationStep>>(span) {
        Ok(mut steps) => {
            for step in &mut steps {
                step.status = StepStatus::Pending;
            }
            steps
        }
        Err(_) => {
            eprintln!("⚠️ Failed to parse automation steps from model reply. Falling back.");
            fallback_plan()
        }
    }
}

/// One-step degraded plan signaling the user has to take over.
pub fn fallback_plan() -> Vec<AutomationStep> {
    vec![AutomationStep::new(
        StepAction::Wait,
        "1000",
        "Manual planning required - AI response was not in expected format",
    )]
}

use crate::agent::ControlAgent;
use crate::error::AppError;
use crate::schema::{AgentResponse, AutomationStep, StepAction, StepStatus};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;

/// Post-action settle delays, by action class. Injected so tests run with
/// zeroed delays.
#[derive(Debug, Clone)]
pub struct StepDelays {
    pub app_launch_ms: u64,
    pub tap_ms: u64,
    pub type_per_char_ms: u64,
    pub type_default_ms: u64,
    pub swipe_ms: u64,
    pub scroll_ms: u64,
}

impl Default for StepDelays {
    fn default() -> Self {
        StepDelays {
            app_launch_ms: 2500,
            tap_ms: 800,
            type_per_char_ms: 100,
            type_default_ms: 1000,
            swipe_ms: 600,
            scroll_ms: 800,
        }
    }
}

impl StepDelays {
    pub fn none() -> Self {
        StepDelays {
            app_launch_ms: 0,
            tap_ms: 0,
            type_per_char_ms: 0,
            type_default_ms: 0,
            swipe_ms: 0,
            scroll_ms: 0,
        }
    }

    /// Settle time after a successful step. `wait` already slept its
    /// caller-specified duration, so it gets none.
    pub fn post_delay_ms(&self, step: &AutomationStep) -> u64 {
        match step.action {
            StepAction::OpenUrl
            | StepAction::OpenApp
            | StepAction::Whatsapp
            | StepAction::Call
            | StepAction::Email => self.app_launch_ms,
            StepAction::Tap | StepAction::Key => self.tap_ms,
            StepAction::Type => step
                .text
                .as_ref()
                .map(|t| t.len() as u64 * self.type_per_char_ms)
                .unwrap_or(self.type_default_ms),
            StepAction::Swipe => self.swipe_ms,
            StepAction::Scroll => self.scroll_ms,
            StepAction::Wait => 0,
        }
    }
}

/// A step needs a target, and `type` needs text to type.
pub fn validate_step(step: &AutomationStep) -> bool {
    if step.target.is_empty() {
        return false;
    }
    if step.action == StepAction::Type && step.text.as_deref().map_or(true, |t| t.is_empty()) {
        return false;
    }
    true
}

/// Rough per-plan duration in seconds, for display before a run.
pub fn estimate_duration(steps: &[AutomationStep]) -> f64 {
    steps
        .iter()
        .map(|step| match step.action {
            StepAction::OpenApp => 1.5,
            StepAction::Tap => 0.8,
            StepAction::Type => 2.0,
            StepAction::Swipe => 0.6,
            StepAction::Scroll => 0.8,
            StepAction::Wait => 2.0,
            _ => 1.0,
        })
        .sum()
}

/// Runs plans strictly in order, one step at a time. No retries, no
/// cancellation: a started plan runs to completion or first failure.
pub struct Executor {
    agent: Arc<dyn ControlAgent>,
    delays: StepDelays,
}

impl Executor {
    pub fn new(agent: Arc<dyn ControlAgent>) -> Self {
        Executor {
            agent,
            delays: StepDelays::default(),
        }
    }

    pub fn with_delays(mut self, delays: StepDelays) -> Self {
        self.delays = delays;
        self
    }

    /// Execute every step to completion or first hard failure. `on_update`
    /// fires synchronously before and after each step with
    /// `(index, new_status)`; statuses only move forward.
    pub async fn execute_plan(
        &self,
        steps: &mut [AutomationStep],
        mut on_update: impl FnMut(usize, StepStatus),
    ) -> Result<(), AppError> {
        let total = steps.len();
        for i in 0..total {
            if steps[i].status.is_terminal() {
                continue; // already ran in an earlier pass
            }

            advance(&mut steps[i], i, StepStatus::Running, &mut on_update);
            println!(
                "🤖 [Executor] Step {}/{}: {} '{}'",
                i + 1,
                total,
                steps[i].action.as_str(),
                steps[i].target
            );

            match self.dispatch(&steps[i]).await {
                Ok(response) if response.success => {
                    let settle = self.delays.post_delay_ms(&steps[i]);
                    if settle > 0 {
                        sleep(Duration::from_millis(settle)).await;
                    }
                    advance(&mut steps[i], i, StepStatus::Completed, &mut on_update);
                    println!("✅ Step {} completed.", i + 1);
                }
                Ok(response) => {
                    let reason = response
                        .error
                        .unwrap_or_else(|| "agent reported failure".to_string());
                    advance(&mut steps[i], i, StepStatus::Failed, &mut on_update);
                    println!("❌ Step {} failed: {}. Halting plan.", i + 1, reason);
                    return Err(AppError::Execution { index: i, reason });
                }
                Err(e) => {
                    let reason = e.to_string();
                    advance(&mut steps[i], i, StepStatus::Failed, &mut on_update);
                    println!("❌ Step {} failed: {}. Halting plan.", i + 1, reason);
                    return Err(AppError::Execution { index: i, reason });
                }
            }
        }
        Ok(())
    }

    /// `wait` sleeps locally; everything else goes to the control agent with
    /// the raw target string passed through unchanged.
    async fn dispatch(&self, step: &AutomationStep) -> Result<AgentResponse, AppError> {
        if step.action == StepAction::Wait {
            let ms = step.target.parse::<u64>().unwrap_or(1000);
            sleep(Duration::from_millis(ms)).await;
            return Ok(AgentResponse::ok(&format!("Waited {}ms", ms)));
        }
        self.agent.execute_step(step).await
    }
}

fn advance(
    step: &mut AutomationStep,
    index: usize,
    next: StepStatus,
    on_update: &mut impl FnMut(usize, StepStatus),
) {
    if step.status.can_advance_to(next) {
        step.status = next;
        on_update(index, next);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{AgentStatus, Contact, ContactSearchResult, PlanReport};
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Succeeds every step except targets listed in `fail_targets`.
    struct ScriptedAgent {
        fail_targets: Vec<String>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedAgent {
        fn new(fail_targets: &[&str]) -> Self {
            ScriptedAgent {
                fail_targets: fail_targets.iter().map(|s| s.to_string()).collect(),
                calls: Mutex::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ControlAgent for ScriptedAgent {
        async fn status(&self) -> Result<AgentStatus, AppError> {
            Ok(AgentStatus {
                connected: true,
                message: "scripted".to_string(),
            })
        }

        async fn search_contact(&self, query: &str) -> Result<ContactSearchResult, AppError> {
            Ok(ContactSearchResult {
                success: true,
                contact: Some(Contact {
                    name: query.to_string(),
                    number: "+1000000000".to_string(),
                }),
                error: None,
                suggestions: None,
            })
        }

        async fn execute_step(&self, step: &AutomationStep) -> Result<AgentResponse, AppError> {
            self.calls.lock().unwrap().push(step.target.clone());
            if self.fail_targets.contains(&step.target) {
                Ok(AgentResponse::err("scripted failure"))
            } else {
                Ok(AgentResponse::ok("done"))
            }
        }

        async fn execute_plan(&self, _steps: &[AutomationStep]) -> Result<PlanReport, AppError> {
            Ok(PlanReport {
                success: true,
                results: Vec::new(),
            })
        }

        async fn screenshot(&self) -> Result<Vec<u8>, AppError> {
            Ok(Vec::new())
        }

        async fn ui_dump(&self) -> Result<String, AppError> {
            Ok(String::new())
        }
    }

    fn tap(target: &str) -> AutomationStep {
        AutomationStep::new(StepAction::Tap, target, "tap it").with_coords(10, 20)
    }

    #[tokio::test]
    async fn test_failure_at_step_k_halts_plan() {
        let agent = Arc::new(ScriptedAgent::new(&["c"]));
        let executor = Executor::new(agent.clone()).with_delays(StepDelays::none());

        let mut steps = vec![tap("a"), tap("b"), tap("c"), tap("d"), tap("e")];
        let result = executor.execute_plan(&mut steps, |_, _| {}).await;

        assert!(result.is_err());
        assert_eq!(steps[0].status, StepStatus::Completed);
        assert_eq!(steps[1].status, StepStatus::Completed);
        assert_eq!(steps[2].status, StepStatus::Failed);
        assert_eq!(steps[3].status, StepStatus::Pending);
        assert_eq!(steps[4].status, StepStatus::Pending);
        // step d and e never reached the agent
        assert_eq!(agent.calls(), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_whatsapp_scenario_callback_order() {
        let agent = Arc::new(ScriptedAgent::new(&[]));
        let executor = Executor::new(agent).with_delays(StepDelays::none());

        let mut steps = vec![
            AutomationStep::new(StepAction::Whatsapp, "Sam", "Message Sam").with_text("hello"),
        ];
        let mut observed: Vec<(usize, StepStatus)> = Vec::new();
        executor
            .execute_plan(&mut steps, |i, status| observed.push((i, status)))
            .await
            .unwrap();

        assert_eq!(
            observed,
            vec![(0, StepStatus::Running), (0, StepStatus::Completed)]
        );
        assert_eq!(steps[0].status, StepStatus::Completed);
    }

    #[tokio::test]
    async fn test_wait_resolves_locally() {
        let agent = Arc::new(ScriptedAgent::new(&[]));
        let executor = Executor::new(agent.clone()).with_delays(StepDelays::none());

        let mut steps = vec![AutomationStep::new(StepAction::Wait, "0", "settle")];
        executor.execute_plan(&mut steps, |_, _| {}).await.unwrap();

        assert_eq!(steps[0].status, StepStatus::Completed);
        assert!(agent.calls().is_empty());
    }

    #[tokio::test]
    async fn test_terminal_steps_are_not_rerun() {
        let agent = Arc::new(ScriptedAgent::new(&[]));
        let executor = Executor::new(agent.clone()).with_delays(StepDelays::none());

        let mut steps = vec![tap("a"), tap("b")];
        steps[0].status = StepStatus::Completed;

        let mut observed = Vec::new();
        executor
            .execute_plan(&mut steps, |i, status| observed.push((i, status)))
            .await
            .unwrap();

        assert_eq!(agent.calls(), vec!["b"]);
        assert_eq!(
            observed,
            vec![(1, StepStatus::Running), (1, StepStatus::Completed)]
        );
    }

    #[tokio::test]
    async fn test_transport_error_marks_step_failed() {
        struct DeadAgent;

        #[async_trait]
        impl ControlAgent for DeadAgent {
            async fn status(&self) -> Result<AgentStatus, AppError> {
                Ok(AgentStatus {
                    connected: false,
                    message: "down".to_string(),
                })
            }
            async fn search_contact(&self, _q: &str) -> Result<ContactSearchResult, AppError> {
                Err(AppError::Agent("down".to_string()))
            }
            async fn execute_step(&self, _s: &AutomationStep) -> Result<AgentResponse, AppError> {
                Err(AppError::Agent("connection refused".to_string()))
            }
            async fn execute_plan(&self, _s: &[AutomationStep]) -> Result<PlanReport, AppError> {
                Err(AppError::Agent("down".to_string()))
            }
            async fn screenshot(&self) -> Result<Vec<u8>, AppError> {
                Err(AppError::Agent("down".to_string()))
            }
            async fn ui_dump(&self) -> Result<String, AppError> {
                Err(AppError::Agent("down".to_string()))
            }
        }

        let executor = Executor::new(Arc::new(DeadAgent)).with_delays(StepDelays::none());
        let mut steps = vec![tap("a")];
        let err = executor.execute_plan(&mut steps, |_, _| {}).await.unwrap_err();

        assert_eq!(steps[0].status, StepStatus::Failed);
        assert!(err.to_string().contains("step 0"));
    }

    #[test]
    fn test_validate_step() {
        assert!(validate_step(&tap("a")));
        assert!(!validate_step(&AutomationStep::new(StepAction::Tap, "", "no target")));

        let type_without_text = AutomationStep::new(StepAction::Type, "field", "type");
        assert!(!validate_step(&type_without_text));
        let type_with_text = type_without_text.with_text("hello");
        assert!(validate_step(&type_with_text));
    }

    #[test]
    fn test_estimate_duration_uses_action_classes() {
        let steps = vec![
            AutomationStep::new(StepAction::OpenApp, "com.whatsapp", "launch"),
            AutomationStep::new(StepAction::Wait, "2000", "settle"),
            tap("send"),
        ];
        let estimate = estimate_duration(&steps);
        assert!((estimate - 4.3).abs() < 1e-9);
    }

    #[test]
    fn test_type_delay_scales_with_text() {
        let delays = StepDelays::default();
        let step = AutomationStep::new(StepAction::Type, "field", "type").with_text("hello");
        assert_eq!(delays.post_delay_ms(&step), 500);

        let no_text = AutomationStep::new(StepAction::Type, "field", "type");
        assert_eq!(delays.post_delay_ms(&no_text), 1000);
    }
}

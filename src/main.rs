use polaris_agent::agent::{ControlAgent, HttpControlAgent};
use polaris_agent::chat::{ChatSession, MessageApiClient};
use polaris_agent::executor::{estimate_duration, validate_step, Executor};
use polaris_agent::intent;
use polaris_agent::message_store::MessageStore;
use polaris_agent::planner::PlannerClient;
use polaris_agent::schema::{AutomationStep, IntentKind};
use polaris_agent::server;
use polaris_agent::storage::{self, KeyValueStore};
use polaris_agent::ui_dump::{
    locate_send_button, FallbackPolicy, ScreenSize, SEND_BUTTON_FALLBACK,
};

use anyhow::Context;
use std::io::Write;
use std::sync::Arc;
use tokio::io::{self, AsyncBufReadExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    println!("🤖 Polaris Assistant (CLI Mode)");
    println!("--------------------------------------------------");

    // 0. Local key-value storage (API key, chat history)
    let mut store = storage::open_default();

    // 1. Planner client, preferring the stored key over the environment
    let mut planner_client = match storage::load_api_key(store.as_ref()) {
        Some(config) => match PlannerClient::new(&config.api_key) {
            Ok(client) => Some(client),
            Err(e) => {
                eprintln!("⚠️ Failed to init planner client: {}", e);
                None
            }
        },
        None => match PlannerClient::from_env() {
            Ok(client) => Some(client),
            Err(_) => {
                println!("⚠️  No API key configured. Use 'setkey <key>' or set POLARIS_API_KEY.");
                None
            }
        },
    };

    // 2. Control agent, probed once so a missing device is visible up front
    let control_agent: Arc<dyn ControlAgent> = Arc::new(
        HttpControlAgent::from_env().context("Failed to build control agent client")?,
    );
    match control_agent.status().await {
        Ok(status) if status.connected => println!("✅ Control agent: {}", status.message),
        Ok(status) => println!("⚠️  {}", status.message),
        Err(e) => println!("⚠️  Control agent check failed: {}", e),
    }

    // 3. Messages API in the background
    let messages_api_up = match start_messages_api().await {
        Ok(()) => true,
        Err(e) => {
            eprintln!("❌ Messages API disabled: {}", e);
            false
        }
    };

    // 4. Chat session seeded from the persisted history
    let mut session = planner_client
        .as_ref()
        .map(|planner| build_session(planner, store.as_ref()));

    println!("--------------------------------------------------");
    println!("Type 'help' for commands, or just tell me what to do.");
    println!("--------------------------------------------------");

    let mut pending_plan: Vec<AutomationStep> = Vec::new();

    let stdin = io::stdin();
    let mut reader = io::BufReader::new(stdin);
    let mut buffer = String::new();

    loop {
        buffer.clear();
        print!("> ");
        if let Err(e) = std::io::stdout().flush() {
            eprintln!("⚠️ Flush failed: {}", e);
        }

        if reader.read_line(&mut buffer).await? == 0 {
            // EOF - stay resident only while the messages API is serving
            if !messages_api_up {
                break;
            }
            println!("📡 Running in headless mode (messages API only)...");
            loop {
                tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
            }
        }

        let input = buffer.trim().to_string();
        if input.is_empty() {
            continue;
        }

        let parts: Vec<&str> = input.split_whitespace().collect();
        match parts[0] {
            "help" => {
                println!("Commands:");
                println!("  plan <task>       - Plan an automation task");
                println!("  run               - Execute the pending plan");
                println!("  status            - Show agent, key and session status");
                println!("  contacts <name>   - Search device contacts");
                println!("  screenshot        - Capture the device screen");
                println!("  ui-dump           - Dump the UI hierarchy, locate the send button");
                println!("  history           - Show this session's conversation");
                println!("  clearchat         - Clear the conversation history");
                println!("  setkey <key>      - Save the planning API key");
                println!("  clearkey          - Remove the saved API key");
                println!("  exit              - Quit");
                println!("Anything else is classified: automation requests get planned,");
                println!("everything else goes to chat.");
            }
            "exit" | "quit" => break,
            "status" => {
                println!("📊 Status:");
                println!(
                    "   API key: {}",
                    if planner_client.is_some() { "configured" } else { "missing" }
                );
                match control_agent.status().await {
                    Ok(status) => println!(
                        "   Control agent: {} ({})",
                        if status.connected { "connected" } else { "unreachable" },
                        status.message
                    ),
                    Err(e) => println!("   Control agent: error ({})", e),
                }
                if let Some(session) = &session {
                    println!(
                        "   Chat session {}: {} messages",
                        session.user_id(),
                        session.history().len()
                    );
                }
                if !pending_plan.is_empty() {
                    println!("   Pending plan: {} steps", pending_plan.len());
                }
            }
            "contacts" => {
                if parts.len() < 2 {
                    println!("Usage: contacts <name>");
                    continue;
                }
                let query = parts[1..].join(" ");
                match control_agent.search_contact(&query).await {
                    Ok(result) if result.success => {
                        if let Some(contact) = result.contact {
                            println!("📇 {}: {}", contact.name, contact.number);
                        }
                    }
                    Ok(result) => {
                        println!(
                            "❌ {}",
                            result.error.unwrap_or_else(|| "No match".to_string())
                        );
                        if let Some(suggestions) = result.suggestions {
                            println!("   Did you mean: {}", suggestions.join(", "));
                        }
                    }
                    Err(e) => println!("❌ Contact search failed: {}", e),
                }
            }
            "setkey" => {
                if parts.len() < 2 {
                    println!("Usage: setkey <key>");
                    continue;
                }
                let key = parts[1];
                if let Err(e) = storage::save_api_key(store.as_mut(), key) {
                    println!("❌ Failed to save key: {}", e);
                    continue;
                }
                match PlannerClient::new(key) {
                    Ok(client) => {
                        session = Some(build_session(&client, store.as_ref()));
                        planner_client = Some(client);
                        println!("🔑 API key saved.");
                    }
                    Err(e) => println!("❌ Failed to init planner client: {}", e),
                }
            }
            "clearkey" => {
                if let Err(e) = storage::clear_api_key(store.as_mut()) {
                    println!("❌ Failed to clear key: {}", e);
                    continue;
                }
                planner_client = None;
                session = None;
                println!("🗑️  API key removed.");
            }
            "plan" => {
                if parts.len() < 2 {
                    println!("Usage: plan <task>");
                    continue;
                }
                let Some(planner) = &planner_client else {
                    println!("⚠️  No API key configured.");
                    continue;
                };
                let task = parts[1..].join(" ");
                match planner.plan_task(&task).await {
                    Ok(steps) => {
                        pending_plan = steps;
                        print_plan(&pending_plan);
                        println!(
                            "⏱️  Estimated duration: {:.1}s. Type 'run' to execute.",
                            estimate_duration(&pending_plan)
                        );
                    }
                    Err(e) => println!("❌ {}", e),
                }
            }
            "run" => {
                if pending_plan.is_empty() {
                    println!("⚠️  Nothing to run. Use 'plan <task>' first.");
                    continue;
                }
                run_plan(&control_agent, &mut pending_plan).await;
            }
            "screenshot" => match control_agent.screenshot().await {
                Ok(bytes) => {
                    let path = "polaris_screenshot.png";
                    match std::fs::write(path, &bytes) {
                        Ok(()) => {
                            println!("📸 Screenshot saved to {} ({} bytes)", path, bytes.len())
                        }
                        Err(e) => println!("❌ Could not save screenshot: {}", e),
                    }
                }
                Err(e) => println!("❌ Screenshot failed: {}", e),
            },
            "ui-dump" => match control_agent.ui_dump().await {
                Ok(xml) => {
                    println!("🗂️  UI dump: {} bytes", xml.len());
                    match locate_send_button(&xml, ScreenSize::default(), FallbackPolicy::None) {
                        Some((x, y)) => println!("   Send button at ({}, {})", x, y),
                        None => println!(
                            "   Send button not found, fallback tap point is {:?}",
                            SEND_BUTTON_FALLBACK
                        ),
                    }
                }
                Err(e) => println!("❌ UI dump failed: {}", e),
            },
            "history" => match &session {
                Some(session) if !session.history().is_empty() => {
                    for message in session.history() {
                        println!("  [{}] {}", message.role.as_str(), message.content);
                    }
                }
                Some(_) => println!("(no messages yet)"),
                None => println!("⚠️  Chat not available (no API key)."),
            },
            "clearchat" => {
                if let Some(session) = session.as_mut() {
                    session.clear();
                }
                if let Err(e) = storage::clear_chat_history(store.as_mut()) {
                    eprintln!("⚠️ Failed to clear stored history: {}", e);
                }
                println!("🗑️  Chat history cleared.");
            }
            // Free text: automation requests get planned, the rest is chat
            _ => match intent::classify(&input) {
                IntentKind::Automation => {
                    let Some(planner) = &planner_client else {
                        println!("⚠️  No API key configured. Use 'setkey <key>' first.");
                        continue;
                    };
                    match planner.plan_task(&input).await {
                        Ok(steps) => {
                            pending_plan = steps;
                            print_plan(&pending_plan);
                            println!(
                                "⏱️  Estimated duration: {:.1}s. Execute now? (y/n):",
                                estimate_duration(&pending_plan)
                            );
                            buffer.clear();
                            if reader.read_line(&mut buffer).await? == 0 {
                                break;
                            }
                            if buffer.trim().eq_ignore_ascii_case("y") {
                                run_plan(&control_agent, &mut pending_plan).await;
                            } else {
                                println!("Plan saved. Type 'run' to execute.");
                            }
                        }
                        Err(e) => println!("❌ {}", e),
                    }
                }
                IntentKind::Chat => {
                    let Some(active) = session.as_mut() else {
                        println!("⚠️  No API key configured. Use 'setkey <key>' first.");
                        continue;
                    };
                    match active.send(&input).await {
                        Ok(reply) => {
                            println!("💬 {}", reply);
                            if let Err(e) =
                                storage::save_chat_history(store.as_mut(), active.history())
                            {
                                eprintln!("⚠️ Failed to persist chat history: {}", e);
                            }
                        }
                        Err(e) => println!("❌ Chat failed: {}", e),
                    }
                }
            },
        }
    }

    Ok(())
}

/// Store open and port bind happen before the spawn, so startup failures
/// surface to the caller rather than inside the background task.
async fn start_messages_api() -> anyhow::Result<()> {
    let store = Arc::new(MessageStore::open_from_env()?);
    let listener = server::bind_from_env().await?;
    tokio::spawn(async move {
        if let Err(e) = server::serve_on(listener, store).await {
            eprintln!("❌ Messages API stopped: {}", e);
        }
    });
    Ok(())
}

fn build_session(planner: &PlannerClient, store: &dyn KeyValueStore) -> ChatSession {
    let mut session =
        ChatSession::new(planner.clone()).with_history(storage::load_chat_history(store));
    match MessageApiClient::from_env() {
        Ok(sync) => session = session.with_sync(sync),
        Err(e) => eprintln!("⚠️ Message sync disabled: {}", e),
    }
    session
}

fn print_plan(steps: &[AutomationStep]) {
    if steps.is_empty() {
        println!("📋 Empty plan.");
        return;
    }
    println!("📋 Plan ({} steps):", steps.len());
    for (i, step) in steps.iter().enumerate() {
        let mut line = format!(
            "  {}. [{}] {} -> {}",
            i + 1,
            step.status.as_str(),
            step.action.as_str(),
            step.target
        );
        if let Some(text) = &step.text {
            line.push_str(&format!(" \"{}\"", text));
        }
        println!("{}", line);
        println!("     {}", step.reasoning);
    }
}

/// Validate, execute, and report. A failed run keeps its statuses visible
/// and clears the plan; retrying is a fresh 'plan'.
async fn run_plan(agent: &Arc<dyn ControlAgent>, steps: &mut Vec<AutomationStep>) {
    if let Some(pos) = steps.iter().position(|s| !validate_step(s)) {
        println!(
            "❌ Step {} is incomplete ({} needs a target and required fields). Plan rejected.",
            pos + 1,
            steps[pos].action.as_str()
        );
        steps.clear();
        return;
    }

    let executor = Executor::new(agent.clone());
    let result = executor.execute_plan(steps, |_, _| {}).await;
    print_plan(steps);
    match result {
        Ok(()) => println!("✅ Plan completed ({} steps).", steps.len()),
        Err(e) => println!("❌ {}", e),
    }
    steps.clear();
}

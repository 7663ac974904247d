//! `reagent agent` — Interactive or single-message chat mode.

use std::io::Write;
use std::sync::Arc;

use reagent_agent::{AgentConfig, AgentEvent, AgentLoop, Turn, TurnOutcome};
use reagent_config::AppConfig;
use reagent_core::message::Message;
use reagent_core::{CancellationToken, Error};
use reagent_providers::{GatewayConfig, OpenAiCompatGateway};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;

/// Command-line overrides for one `agent` invocation.
#[derive(Debug, Default)]
pub struct Options {
    pub message: Option<String>,
    pub max_steps: Option<usize>,
    pub stream: bool,
}

pub async fn run(options: Options) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    // Check for API key early — give a clear error
    if !config.has_api_key() {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    export DASHSCOPE_API_KEY='sk-...'");
        eprintln!("    export OPENAI_API_KEY='sk-...'      (with REAGENT_BASE_URL)");
        eprintln!("    export REAGENT_API_KEY='sk-...'     (generic)");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let gateway = OpenAiCompatGateway::new(GatewayConfig::from_app_config(&config)?)?;
    let tools = Arc::new(reagent_tools::default_registry()?);
    let agent_config = agent_config(&config, &options);

    let (tx, mut events) = mpsc::unbounded_channel();
    let agent = AgentLoop::new(Arc::new(gateway), tools, agent_config)?.with_events(tx);

    let mut history = initial_history(config.agent.system_prompt.as_deref());

    if let Some(msg) = options.message {
        // Single message mode
        history.push(Message::user(msg));
        let turn = run_turn(&agent, history, &mut events).await?;
        print_answer(&turn, agent_config.streaming);
        return Ok(());
    }

    // Interactive mode
    println!();
    println!("  reagent — interactive mode");
    println!();
    println!("  Gateway:   {}", config.gateway.name);
    println!("  Model:     {}", config.gateway.model);
    println!("  Tools:     {}", agent.tools().names().join(", "));
    println!("  Max steps: {}", agent_config.max_steps);
    println!();
    println!("  Type your message and press Enter.");
    println!("  Ctrl+C cancels a running turn; type 'exit' to quit.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line, "exit" | "quit") {
            break;
        }

        let mut turn_history = history.clone();
        turn_history.push(Message::user(line));

        match run_turn(&agent, turn_history, &mut events).await {
            Ok(turn) => {
                print_answer(&turn, agent_config.streaming);
                println!();
                history = turn.state.messages;
            }
            Err(Error::Cancelled) => eprintln!("\n  [cancelled]\n"),
            Err(e) => eprintln!("\n  [Error] {e}\n"),
        }
    }

    println!();
    println!("  Goodbye!");
    Ok(())
}

fn agent_config(config: &AppConfig, options: &Options) -> AgentConfig {
    let mut agent_config = AgentConfig::from(&config.agent);
    if let Some(max_steps) = options.max_steps {
        agent_config.max_steps = max_steps;
    }
    agent_config.streaming |= options.stream;
    agent_config
}

/// Conversation seed: the configured system prompt, if any.
fn initial_history(system_prompt: Option<&str>) -> Vec<Message> {
    system_prompt
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(Message::system)
        .into_iter()
        .collect()
}

/// Run one turn, rendering events as they arrive. Ctrl-C cancels the turn.
async fn run_turn(
    agent: &AgentLoop,
    history: Vec<Message>,
    events: &mut mpsc::UnboundedReceiver<AgentEvent>,
) -> Result<Turn, Error> {
    let cancel = CancellationToken::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let turn = agent.generate(history, &cancel);
    tokio::pin!(turn);
    let result = loop {
        tokio::select! {
            result = &mut turn => break result,
            Some(event) = events.recv() => render(&event),
        }
    };
    while let Ok(event) = events.try_recv() {
        render(&event);
    }

    interrupt.abort();
    result
}

fn render(event: &AgentEvent) {
    match event {
        AgentEvent::Fragment { content } => {
            print!("{content}");
            let _ = std::io::stdout().flush();
        }
        AgentEvent::ToolCall { name, arguments } => {
            eprintln!("  [tool] {name} {arguments}");
        }
        AgentEvent::ToolResult {
            content, success, ..
        } => {
            let label = if *success { "result" } else { "tool error" };
            eprintln!("  [{label}] {content}");
        }
        AgentEvent::Done { steps, outcome } => {
            tracing::debug!(steps, ?outcome, "Turn finished");
        }
    }
}

fn print_answer(turn: &Turn, streaming: bool) {
    if streaming && turn.outcome == TurnOutcome::Answered {
        // Already printed fragment by fragment.
        println!();
    } else {
        println!("{}", turn.message.content);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reagent_core::message::Role;

    #[test]
    fn system_prompt_seeds_history() {
        let history = initial_history(Some("  You are terse.  "));
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].role, Role::System);
        assert_eq!(history[0].content, "You are terse.");
    }

    #[test]
    fn blank_system_prompt_is_ignored() {
        assert!(initial_history(Some("   ")).is_empty());
        assert!(initial_history(None).is_empty());
    }

    #[test]
    fn command_line_overrides_config() {
        let config = AppConfig::default();
        let options = Options {
            max_steps: Some(3),
            stream: true,
            ..Options::default()
        };
        let overridden = agent_config(&config, &options);
        assert_eq!(overridden.max_steps, 3);
        assert!(overridden.streaming);

        let defaults = agent_config(&config, &Options::default());
        assert_eq!(defaults.max_steps, config.agent.max_steps);
        assert_eq!(defaults.streaming, config.agent.streaming);
    }
}

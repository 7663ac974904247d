//! The agent reasoning loop implementation.

use reagent_config::AgentSettings;
use reagent_core::error::{Error, ProviderError, ToolError};
use reagent_core::gateway::{GatewayRequest, ModelGateway};
use reagent_core::message::{Message, Role};
use reagent_core::tool::{ToolCall, ToolRegistry};
use reagent_core::tool_call::parse_tool_call;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::state::State;
use crate::stream_event::AgentEvent;

/// Agent loop settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentConfig {
    /// Maximum model invocations per turn (must be > 0)
    pub max_steps: usize,

    /// Use the gateway's streaming mode and assemble fragments
    pub streaming: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_steps: 8,
            streaming: false,
        }
    }
}

impl From<&AgentSettings> for AgentConfig {
    fn from(settings: &AgentSettings) -> Self {
        Self {
            max_steps: settings.max_steps,
            streaming: settings.streaming,
        }
    }
}

/// How a turn ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnOutcome {
    /// The model produced an assistant message
    Answered,
    /// The gateway returned no message
    EmptyResponse,
    /// A tool-role message could not be parsed as a tool call
    InvalidToolCall,
    /// The step budget ran out
    MaxStepsReached,
}

impl TurnOutcome {
    /// Content of the assistant message reported for a non-answer outcome.
    pub fn sentinel(&self) -> Option<&'static str> {
        match self {
            TurnOutcome::Answered => None,
            TurnOutcome::EmptyResponse => Some("empty message returned"),
            TurnOutcome::InvalidToolCall => Some("invalid tool call payload"),
            TurnOutcome::MaxStepsReached => Some("max steps reached"),
        }
    }
}

/// The result of one successful `generate` call.
#[derive(Debug, Clone)]
pub struct Turn {
    /// The final assistant message (the answer or a sentinel)
    pub message: Message,
    pub outcome: TurnOutcome,
    /// Everything accumulated during the turn
    pub state: State,
}

/// The core agent loop that orchestrates model calls and tool execution.
pub struct AgentLoop {
    /// The model gateway to use
    gateway: Arc<dyn ModelGateway>,

    /// Tool registry, shared read-only
    tools: Arc<ToolRegistry>,

    config: AgentConfig,

    /// Optional progress event sink
    events: Option<mpsc::UnboundedSender<AgentEvent>>,
}

impl AgentLoop {
    /// Create a new agent loop. Fails when `max_steps` is zero.
    pub fn new(
        gateway: Arc<dyn ModelGateway>,
        tools: Arc<ToolRegistry>,
        config: AgentConfig,
    ) -> Result<Self, Error> {
        if config.max_steps == 0 {
            return Err(Error::config("max_steps must be greater than 0"));
        }
        Ok(Self {
            gateway,
            tools,
            config,
            events: None,
        })
    }

    /// Publish progress events to `sender`.
    pub fn with_events(mut self, sender: mpsc::UnboundedSender<AgentEvent>) -> Self {
        self.events = Some(sender);
        self
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Run one turn over `history`.
    ///
    /// Each iteration asks the gateway for the next message:
    /// - a tool-role message is parsed, the tool executed and its result
    ///   appended as a new tool message before the next iteration
    /// - an assistant message ends the turn
    /// - user and system messages are appended and the loop continues
    ///
    /// Gateway failures, cancellation and requests for an unregistered tool
    /// end the turn with an error. Tool execution and argument errors are fed
    /// back to the model instead.
    pub async fn generate(
        &self,
        history: Vec<Message>,
        cancel: &CancellationToken,
    ) -> Result<Turn, Error> {
        let mut state = State::new(history);
        let catalog = self.tools.definitions();

        info!(
            gateway = self.gateway.name(),
            messages = state.len(),
            max_steps = self.config.max_steps,
            streaming = self.config.streaming,
            "Starting agent turn"
        );

        while state.step < self.config.max_steps {
            state.step += 1;
            if cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            debug!(step = state.step, messages = state.len(), "Agent loop iteration");

            let request = GatewayRequest::new(state.messages.clone(), catalog.clone());
            let Some(message) = self.next_message(request, cancel).await? else {
                return Ok(self.finish(state, TurnOutcome::EmptyResponse));
            };

            match message.role {
                Role::Tool => {
                    let call = parse_tool_call(&message.content);
                    state.push(message);
                    let Some(call) = call else {
                        warn!(step = state.step, "Model sent an unparseable tool call");
                        return Ok(self.finish(state, TurnOutcome::InvalidToolCall));
                    };
                    let content = self.invoke(call, cancel).await?;
                    state.push(Message::tool(content));
                }
                Role::Assistant => {
                    state.push(message.clone());
                    self.emit(AgentEvent::Done {
                        steps: state.step,
                        outcome: TurnOutcome::Answered,
                    });
                    info!(steps = state.step, "Agent turn answered");
                    return Ok(Turn {
                        message,
                        outcome: TurnOutcome::Answered,
                        state,
                    });
                }
                Role::User | Role::System => {
                    debug!(role = %message.role, "Model returned a non-terminal message");
                    state.push(message);
                }
            }
        }

        warn!(steps = state.step, "Max steps reached without an answer");
        Ok(self.finish(state, TurnOutcome::MaxStepsReached))
    }

    /// Ask the gateway for the next message, in the configured mode.
    async fn next_message(
        &self,
        request: GatewayRequest,
        cancel: &CancellationToken,
    ) -> Result<Option<Message>, Error> {
        if !self.config.streaming {
            return tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(Error::Cancelled),
                reply = self.gateway.generate(request) => reply.map_err(gateway_error),
            };
        }

        let stream = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            stream = self.gateway.stream(request, cancel.clone()) => stream.map_err(gateway_error)?,
        };

        let text = stream
            .collect_with(cancel, |delta| {
                self.emit(AgentEvent::Fragment {
                    content: delta.to_string(),
                })
            })
            .await
            .map_err(gateway_error)?;

        if text.is_empty() {
            return Ok(None);
        }
        let role = if parse_tool_call(&text).is_some() {
            Role::Tool
        } else {
            Role::Assistant
        };
        Ok(Some(Message::new(role, text)))
    }

    /// Execute a parsed call and encode the outcome for the model.
    ///
    /// Only an unregistered tool name is fatal. Every error raised once the
    /// tool is resolved, including a `NotFound` from the tool itself, is
    /// encoded and fed back to the model.
    async fn invoke(&self, call: ToolCall, cancel: &CancellationToken) -> Result<String, Error> {
        if self.tools.resolve(&call.name).is_none() {
            warn!(tool = %call.name, "Model requested an unregistered tool");
            return Err(Error::Tool(ToolError::NotFound(call.name)));
        }

        debug!(tool = %call.name, "Dispatching tool call");
        self.emit(AgentEvent::ToolCall {
            name: call.name.clone(),
            arguments: Value::Object(call.arguments.clone()),
        });

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            result = self.tools.execute(&call) => result,
        };

        let (content, success) = match result {
            Ok(value) => (encode_result(&value), true),
            Err(e) => {
                warn!(tool = %call.name, error = %e, "Tool execution failed");
                (encode_error(&e), false)
            }
        };

        self.emit(AgentEvent::ToolResult {
            name: call.name,
            content: content.clone(),
            success,
        });
        Ok(content)
    }

    fn finish(&self, state: State, outcome: TurnOutcome) -> Turn {
        let content = outcome.sentinel().unwrap_or_default();
        self.emit(AgentEvent::Done {
            steps: state.step,
            outcome,
        });
        Turn {
            message: Message::assistant(content),
            outcome,
            state,
        }
    }

    fn emit(&self, event: AgentEvent) {
        if let Some(events) = &self.events {
            // A dropped receiver only means nobody is watching.
            let _ = events.send(event);
        }
    }
}

fn gateway_error(err: ProviderError) -> Error {
    match err {
        ProviderError::Cancelled => Error::Cancelled,
        other => Error::Provider(other),
    }
}

/// Serialize a tool result for the model. Equal values encode identically.
pub fn encode_result(value: &Value) -> String {
    serde_json::to_string(value)
        .unwrap_or_else(|_| serde_json::json!({ "result": format!("{value:?}") }).to_string())
}

/// Encode a tool failure as `{"error": "<message>"}`.
pub fn encode_error(err: &ToolError) -> String {
    serde_json::json!({ "error": err.to_string() }).to_string()
}

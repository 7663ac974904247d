//! Agent-level progress events.
//!
//! `AgentEvent` lets a front end follow a turn while it runs: streamed
//! text, tool dispatch and tool results, and the final outcome.

use serde::{Deserialize, Serialize};

use crate::loop_runner::TurnOutcome;

/// Events published by the agent loop.
///
/// Serialized with a `type` tag:
/// - `fragment`    — partial text from a streaming model
/// - `tool_call`   — the loop is invoking a tool
/// - `tool_result` — tool execution completed (or failed)
/// - `done`        — the turn finished without error
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    /// Partial text from the model.
    Fragment { content: String },

    /// The loop is calling a tool.
    ToolCall {
        name: String,
        arguments: serde_json::Value,
    },

    /// Tool execution completed; `content` is what the model will see.
    ToolResult {
        name: String,
        content: String,
        success: bool,
    },

    /// The turn is complete.
    Done { steps: usize, outcome: TurnOutcome },
}

impl AgentEvent {
    /// Event name for this event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Fragment { .. } => "fragment",
            Self::ToolCall { .. } => "tool_call",
            Self::ToolResult { .. } => "tool_result",
            Self::Done { .. } => "done",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_serialization_fragment() {
        let event = AgentEvent::Fragment {
            content: "Hello".into(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"fragment""#));
        assert!(json.contains(r#""content":"Hello""#));
    }

    #[test]
    fn event_serialization_tool_call() {
        let event = AgentEvent::ToolCall {
            name: "calculator".into(),
            arguments: serde_json::json!({"expression": "2+2"}),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"tool_call""#));
        assert!(json.contains(r#""name":"calculator""#));
        assert_eq!(event.event_type(), "tool_call");
    }

    #[test]
    fn event_serialization_done() {
        let event = AgentEvent::Done {
            steps: 2,
            outcome: TurnOutcome::MaxStepsReached,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"done""#));
        assert!(json.contains(r#""outcome":"max_steps_reached""#));
    }

    #[test]
    fn event_deserialization() {
        let json = r#"{"type":"tool_result","name":"calculator","content":"{}","success":false}"#;
        let event: AgentEvent = serde_json::from_str(json).unwrap();
        match event {
            AgentEvent::ToolResult { name, success, .. } => {
                assert_eq!(name, "calculator");
                assert!(!success);
            }
            _ => panic!("Wrong variant"),
        }
    }
}

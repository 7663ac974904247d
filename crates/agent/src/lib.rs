//! The agent loop: the heart of reagent.
//!
//! Each turn follows a **Reason → Act → Observe** cycle:
//!
//! 1. **Send** the accumulated messages and the tool catalog to the model
//! 2. **If a tool call**: parse it, execute the tool, append the result, loop
//! 3. **If an answer**: return it together with the turn state
//!
//! The loop stops after `max_steps` model invocations, when the model
//! returns nothing, or when a tool request cannot be parsed.

pub mod loop_runner;
pub mod state;
pub mod stream_event;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use loop_runner::{AgentConfig, AgentLoop, Turn, TurnOutcome, encode_error, encode_result};
pub use state::State;
pub use stream_event::AgentEvent;
pub use reagent_core::tool_call::{parse_tool_call, render_tool_call};

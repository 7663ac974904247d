//! Per-turn conversation state.

use reagent_core::message::Message;
use serde::{Deserialize, Serialize};

/// Messages accumulated during one `generate` call plus the step counter.
///
/// Append-only: messages are never removed or reordered while a turn runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct State {
    pub messages: Vec<Message>,

    /// Loop iterations performed so far
    pub step: usize,
}

impl State {
    pub fn new(history: Vec<Message>) -> Self {
        Self {
            messages: history,
            step: 0,
        }
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

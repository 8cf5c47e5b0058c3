//! Conversation state: the turn log plus the current system prompt.

use crate::llm::{Message, Role};

#[derive(Debug, Clone, Default)]
pub struct Conversation {
    system_prompt: Option<Message>,
    turns: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the current system prompt. Existing turns are kept; clear them
    /// first with [`reset`](Self::reset) when switching topic or output format.
    pub fn set_system_prompt(&mut self, text: impl Into<String>) {
        self.system_prompt = Some(Message::system(text));
    }

    pub fn system_prompt(&self) -> Option<&str> {
        self.system_prompt.as_ref().map(|m| m.content.as_str())
    }

    pub fn append(&mut self, role: Role, content: impl Into<String>) {
        self.turns.push(Message::new(role, content));
    }

    /// Drop every turn and the system prompt.
    pub fn reset(&mut self) {
        self.system_prompt = None;
        self.turns.clear();
    }

    /// Turns in chronological order, without the system prompt.
    pub fn history(&self) -> &[Message] {
        &self.turns
    }

    /// Messages to submit: the system prompt (if any) followed by every turn.
    pub fn to_request_messages(&self) -> Vec<Message> {
        self.system_prompt
            .iter()
            .chain(self.turns.iter())
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

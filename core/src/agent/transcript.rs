use crate::traits::ChatMessage;
use std::collections::HashSet;

/// The conversation so far. Starts with the system message and only ever
/// grows; it is resent in full on every completion call.
#[derive(Debug, Clone, PartialEq)]
pub struct Transcript {
    messages: Vec<ChatMessage>,
}

impl Transcript {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            messages: vec![ChatMessage::system(system_prompt)],
        }
    }

    pub fn push(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    pub fn extend(&mut self, messages: impl IntoIterator<Item = ChatMessage>) {
        self.messages.extend(messages);
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Never true: the system message is always present.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    /// Every tool result answers an id requested earlier in the transcript.
    pub fn tool_results_are_paired(&self) -> bool {
        let mut requested: HashSet<&str> = HashSet::new();
        for message in &self.messages {
            match message {
                ChatMessage::Assistant { tool_calls, .. } => {
                    requested.extend(tool_calls.iter().map(|c| c.id.as_str()));
                }
                ChatMessage::Tool { tool_call_id, .. } => {
                    if !requested.contains(tool_call_id.as_str()) {
                        return false;
                    }
                }
                _ => {}
            }
        }
        true
    }
}

//! Conversation history and prompt rendering.
//!
//! The `Session` is an append-only transcript of the exchange: messages are
//! never reordered or edited, and it grows for the process lifetime. It is
//! owned and mutated exclusively by the dispatch context; everyone else sees
//! the conversation through broadcast events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    /// Tag used in the rendered prompt block.
    pub fn tag(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One transcript entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationMessage {
    pub role: Role,
    pub content: String,
    /// Position in the session, starting at 0.
    pub seq: u64,
    pub at: DateTime<Utc>,
}

/// Cue appended to the rendered session when requesting a reply.
pub const ASSISTANT_CUE: &str = "\n<|assistant|>";

/// Append-only conversation transcript.
#[derive(Debug)]
pub struct Session {
    messages: Vec<ConversationMessage>,
    /// Fixed system preamble, prepended once to the first user message.
    preamble: String,
}

impl Session {
    pub fn new(preamble: impl Into<String>) -> Self {
        Self {
            messages: Vec::new(),
            preamble: preamble.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn messages(&self) -> &[ConversationMessage] {
        &self.messages
    }

    /// Append a user message.
    ///
    /// The system preamble is folded into the first user message only — it
    /// is stored (and therefore re-sent) as part of that message, never
    /// repeated on later turns.
    pub fn push_user(&mut self, content: &str) {
        let first_user = !self.messages.iter().any(|m| m.role == Role::User);
        let content = if first_user && !self.preamble.is_empty() {
            format!("{}\n\n{}", self.preamble, content)
        } else {
            content.to_string()
        };
        self.push(Role::User, content);
    }

    /// Append an assistant message.
    pub fn push_assistant(&mut self, content: &str) {
        self.push(Role::Assistant, content.to_string());
    }

    fn push(&mut self, role: Role, content: String) {
        let seq = self.messages.len() as u64;
        self.messages.push(ConversationMessage {
            role,
            content,
            seq,
            at: Utc::now(),
        });
    }

    /// Render the whole session as a role-tagged block:
    /// `<|role|>content<|end|>\n` per message, in order.
    pub fn render_prompt(&self) -> String {
        self.messages
            .iter()
            .map(|m| format!("<|{}|>{}<|end|>\n", m.role.tag(), m.content))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PREAMBLE: &str = "You are a helpful assistant.";

    #[test]
    fn preamble_folds_into_first_user_message_only() {
        let mut session = Session::new(PREAMBLE);
        session.push_user("hello");
        session.push_assistant("hi");
        session.push_user("how are you?");

        assert_eq!(
            session.messages()[0].content,
            format!("{PREAMBLE}\n\nhello")
        );
        assert_eq!(session.messages()[2].content, "how are you?");
    }

    #[test]
    fn render_uses_role_tags_in_order() {
        let mut session = Session::new("");
        session.push_user("one");
        session.push_assistant("two");

        assert_eq!(
            session.render_prompt(),
            "<|user|>one<|end|>\n<|assistant|>two<|end|>\n"
        );
    }

    #[test]
    fn sequence_indices_are_dense_and_ordered() {
        let mut session = Session::new("");
        session.push_user("a");
        session.push_assistant("b");
        session.push_user("c");

        let seqs: Vec<u64> = session.messages().iter().map(|m| m.seq).collect();
        assert_eq!(seqs, vec![0, 1, 2]);
    }

    #[test]
    fn empty_session_renders_empty_prompt() {
        let session = Session::new(PREAMBLE);
        assert!(session.render_prompt().is_empty());
        assert!(session.is_empty());
    }
}

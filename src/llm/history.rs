//! Rolling conversation history sent with every chat request.
//!
//! [`ConversationHistory`] keeps the last *N* user/assistant exchanges.  A
//! turn is only recorded once its reply has been fully streamed, so a
//! cancelled or failed episode leaves the history untouched.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ChatMessage
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// One message of a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// ConversationHistory
// ---------------------------------------------------------------------------

/// Bounded window of recent messages, oldest first.
///
/// # Example
/// ```rust
/// use talk_button::llm::ConversationHistory;
///
/// let mut history = ConversationHistory::new(1);
/// history.push_turn("hi", "hello!");
/// history.push_turn("how are you", "fine");
/// assert_eq!(history.len(), 2);
/// assert_eq!(history.messages()[0].content, "how are you");
/// ```
#[derive(Debug, Clone)]
pub struct ConversationHistory {
    messages: VecDeque<ChatMessage>,
    max_turns: usize,
}

impl ConversationHistory {
    /// History holding at most `max_turns` exchanges (two messages each).
    pub fn new(max_turns: usize) -> Self {
        Self {
            messages: VecDeque::with_capacity(max_turns * 2 + 2),
            max_turns,
        }
    }

    /// Record a completed exchange, dropping the oldest messages beyond the
    /// window.
    pub fn push_turn(&mut self, user: impl Into<String>, assistant: impl Into<String>) {
        self.messages.push_back(ChatMessage::user(user));
        self.messages.push_back(ChatMessage::assistant(assistant));

        let limit = self.max_turns * 2;
        while self.messages.len() > limit {
            self.messages.pop_front();
        }
    }

    /// Snapshot of the window, oldest first.
    pub fn messages(&self) -> Vec<ChatMessage> {
        self.messages.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_order_user_then_assistant() {
        let mut h = ConversationHistory::new(5);
        h.push_turn("q1", "a1");
        h.push_turn("q2", "a2");

        let m = h.messages();
        assert_eq!(
            m,
            vec![
                ChatMessage::user("q1"),
                ChatMessage::assistant("a1"),
                ChatMessage::user("q2"),
                ChatMessage::assistant("a2"),
            ]
        );
    }

    #[test]
    fn trims_oldest_turns_beyond_window() {
        let mut h = ConversationHistory::new(2);
        for i in 0..5 {
            h.push_turn(format!("q{i}"), format!("a{i}"));
        }
        let m = h.messages();
        assert_eq!(m.len(), 4);
        assert_eq!(m[0].content, "q3");
        assert_eq!(m[3].content, "a4");
    }

    #[test]
    fn zero_turn_window_stays_empty() {
        let mut h = ConversationHistory::new(0);
        h.push_turn("q", "a");
        assert!(h.is_empty());
    }

    #[test]
    fn roles_serialise_lowercase() {
        let json = serde_json::to_string(&ChatMessage::assistant("x")).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"x"}"#);
    }
}

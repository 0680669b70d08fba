//! Conversation, message, and tool-call types.

use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A structured request from the model to execute a named action with
/// JSON-encoded arguments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// Raw, not-yet-parsed JSON arguments string, exactly as emitted
    /// by the model.
    pub arguments: String,
}

/// One message in a [`Conversation`]. Assistant messages may carry
/// `tool_calls`; tool messages carry a `tool_call_id` and stringified
/// content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum Message {
    System {
        content: String,
    },
    User {
        content: String,
    },
    Assistant {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        content: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCall>,
    },
    Tool {
        tool_call_id: String,
        content: String,
    },
}

impl Message {
    pub fn role(&self) -> Role {
        match self {
            Message::System { .. } => Role::System,
            Message::User { .. } => Role::User,
            Message::Assistant { .. } => Role::Assistant,
            Message::Tool { .. } => Role::Tool,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Message::System {
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Message::User {
            content: content.into(),
        }
    }

    pub fn assistant_text(content: impl Into<String>) -> Self {
        Message::Assistant {
            content: Some(content.into()),
            tool_calls: Vec::new(),
        }
    }

    pub fn assistant_tool_calls(content: Option<String>, tool_calls: Vec<ToolCall>) -> Self {
        Message::Assistant {
            content,
            tool_calls,
        }
    }

    pub fn tool_result(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Message::Tool {
            tool_call_id: tool_call_id.into(),
            content: content.into(),
        }
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            Message::System { content } | Message::User { content } => Some(content),
            Message::Assistant { content, .. } => content.as_deref(),
            Message::Tool { content, .. } => Some(content),
        }
    }
}

/// Ordered list of messages local to one multi-turn invocation. Tracks
/// the invariant that at most one assistant `tool_calls` message is
/// outstanding at a time, and that each `tool_call_id` it carries is
/// answered exactly once before another assistant turn is appended.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn last_user_index(&self) -> Option<usize> {
        self.messages
            .iter()
            .rposition(|m| matches!(m, Message::User { .. }))
    }

    /// Every `tool_call_id` referenced by the most recent assistant
    /// `tool_calls` message that does not yet have a paired `tool`
    /// response — used to check the "at most one outstanding burst,
    /// every call answered exactly once" invariant.
    pub fn unanswered_tool_call_ids(&self) -> Vec<String> {
        let Some(last_calls_index) = self
            .messages
            .iter()
            .rposition(|m| matches!(m, Message::Assistant { tool_calls, .. } if !tool_calls.is_empty()))
        else {
            return Vec::new();
        };

        let Message::Assistant { tool_calls, .. } = &self.messages[last_calls_index] else {
            unreachable!()
        };

        let answered: std::collections::HashSet<&str> = self.messages[last_calls_index + 1..]
            .iter()
            .filter_map(|m| match m {
                Message::Tool { tool_call_id, .. } => Some(tool_call_id.as_str()),
                _ => None,
            })
            .collect();

        tool_calls
            .iter()
            .filter(|call| !answered.contains(call.id.as_str()))
            .map(|call| call.id.clone())
            .collect()
    }

    /// Collapses intermediate messages once the conversation exceeds
    /// `threshold`, keeping the system message, the first user
    /// message, and the tail. Below the threshold this is a no-op.
    pub fn prune(&mut self, threshold: usize, tail_len: usize) {
        if self.messages.len() <= threshold {
            return;
        }

        let system = self
            .messages
            .iter()
            .take_while(|m| matches!(m, Message::System { .. }))
            .cloned()
            .collect::<Vec<_>>();
        let first_user = self
            .messages
            .iter()
            .find(|m| matches!(m, Message::User { .. }))
            .cloned();

        let tail_start = self.messages.len().saturating_sub(tail_len);
        let tail = self.messages[tail_start..].to_vec();

        let mut collapsed = system;
        if let Some(user) = first_user {
            if !collapsed.iter().any(|m| m == &user) {
                collapsed.push(user);
            }
        }
        for message in tail {
            if !collapsed.iter().any(|m| m == &message) {
                collapsed.push(message);
            }
        }

        self.messages = collapsed;
    }

    /// A shallow, independent copy for the "current-turn view" the
    /// multi-turn loop builds per iteration: the persisted conversation
    /// is never mutated by view construction.
    pub fn to_view(&self) -> Vec<Message> {
        self.messages.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unanswered_ids_empty_when_fully_paired() {
        let mut conv = Conversation::new();
        conv.push(Message::user("hi"));
        conv.push(Message::assistant_tool_calls(
            None,
            vec![ToolCall {
                id: "1".into(),
                name: "ping".into(),
                arguments: "{}".into(),
            }],
        ));
        conv.push(Message::tool_result("1", "pong"));
        assert!(conv.unanswered_tool_call_ids().is_empty());
    }

    #[test]
    fn unanswered_ids_reports_missing_pair() {
        let mut conv = Conversation::new();
        conv.push(Message::assistant_tool_calls(
            None,
            vec![ToolCall {
                id: "1".into(),
                name: "ping".into(),
                arguments: "{}".into(),
            }],
        ));
        assert_eq!(conv.unanswered_tool_call_ids(), vec!["1".to_string()]);
    }

    #[test]
    fn prune_is_noop_below_threshold() {
        let mut conv = Conversation::new();
        conv.push(Message::system("sys"));
        conv.push(Message::user("hi"));
        let before = conv.messages().to_vec();
        conv.prune(12, 6);
        assert_eq!(conv.messages(), before.as_slice());
    }

    #[test]
    fn prune_keeps_system_first_user_and_tail() {
        let mut conv = Conversation::new();
        conv.push(Message::system("sys"));
        conv.push(Message::user("first"));
        for i in 0..20 {
            conv.push(Message::assistant_text(format!("turn {i}")));
        }
        conv.prune(12, 4);
        assert!(matches!(conv.messages()[0], Message::System { .. }));
        assert!(matches!(conv.messages()[1], Message::User { .. }));
        assert!(conv.messages().len() < 22);
    }
}

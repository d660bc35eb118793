//! 短期记忆：对话历史
//!
//! 会话内完整保存 user/assistant 消息；构造上下文时只取最近 max_history 条作为窗口，
//! 更早的部分交给摘要压缩（见 react::session）。

use serde::{Deserialize, Serialize};

/// 消息角色（与 LLM API 一致）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// 单条消息
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
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

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// 会话对话历史：只追加，不自动剪枝
#[derive(Clone, Debug, Default)]
pub struct ConversationMemory {
    messages: Vec<Message>,
}

impl ConversationMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, msg: Message) {
        self.messages.push(msg);
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    /// 最近 window 条消息
    pub fn recent(&self, window: usize) -> &[Message] {
        let start = self.messages.len().saturating_sub(window);
        &self.messages[start..]
    }

    /// 窗口之外（更早）的消息；历史未超出窗口时为空
    pub fn older_than(&self, window: usize) -> &[Message] {
        let end = self.messages.len().saturating_sub(window);
        &self.messages[..end]
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_split() {
        let mut conv = ConversationMemory::new();
        for i in 0..5 {
            conv.push(Message::user(format!("m{i}")));
        }
        assert_eq!(conv.recent(2).len(), 2);
        assert_eq!(conv.recent(2)[0].content, "m3");
        assert_eq!(conv.older_than(2).len(), 3);
        assert!(conv.older_than(10).is_empty());
        assert_eq!(conv.recent(10).len(), 5);
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let json = serde_json::to_string(&Message::assistant("hi")).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"hi"}"#);
    }
}

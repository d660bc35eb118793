//! 聊天会话：单个聊天上下文的内存状态
//!
//! 对话历史、可缓存能力的结果缓存（键为能力名 + 原始参数文本）、历史摘要缓存（键为被挤出窗口的消息数）。
//! 只存在于内存中，reset 时全部清空。

use std::collections::HashMap;

use crate::memory::{ConversationMemory, Message};

#[derive(Debug, Clone, PartialEq, Eq)]
struct SummaryCache {
    dropped_len: usize,
    summary: String,
}

/// 单个聊天上下文的会话状态
#[derive(Debug, Default)]
pub struct Session {
    history: ConversationMemory,
    tool_cache: HashMap<(String, String), String>,
    summary_cache: Option<SummaryCache>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn history(&self) -> &ConversationMemory {
        &self.history
    }

    pub fn push(&mut self, msg: Message) {
        self.history.push(msg);
    }

    pub fn cached_result(&self, tool: &str, args_text: &str) -> Option<&str> {
        self.tool_cache
            .get(&(tool.to_string(), args_text.to_string()))
            .map(String::as_str)
    }

    pub fn cache_result(&mut self, tool: &str, args_text: &str, result: String) {
        self.tool_cache
            .insert((tool.to_string(), args_text.to_string()), result);
    }

    /// 同一被挤出长度的摘要
    pub fn cached_summary(&self, dropped_len: usize) -> Option<&str> {
        self.summary_cache
            .as_ref()
            .filter(|c| c.dropped_len == dropped_len)
            .map(|c| c.summary.as_str())
    }

    pub fn cache_summary(&mut self, dropped_len: usize, summary: String) {
        self.summary_cache = Some(SummaryCache {
            dropped_len,
            summary,
        });
    }

    /// 清空历史与全部缓存
    pub fn reset(&mut self) {
        self.history.clear();
        self.tool_cache.clear();
        self.summary_cache = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_caches_and_reset() {
        let mut s = Session::new();
        s.push(Message::user("hi"));
        s.cache_result("search_web", "rust", "{}".into());
        s.cache_summary(3, "summary".into());

        assert_eq!(s.cached_result("search_web", "rust"), Some("{}"));
        assert_eq!(s.cached_result("search_web", "rust "), None);
        assert_eq!(s.cached_summary(3), Some("summary"));
        assert_eq!(s.cached_summary(4), None);

        s.reset();
        assert!(s.history().is_empty());
        assert_eq!(s.cached_result("search_web", "rust"), None);
        assert_eq!(s.cached_summary(3), None);
    }
}

//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / Ollama / Mock）实现 LlmClient：一次请求、一次完整回复。

use async_trait::async_trait;

use crate::memory::Message;

/// LLM 客户端 trait：非流式完成
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 发送完整消息序列，返回 assistant 文本
    async fn complete(&self, messages: &[Message]) -> Result<String, String>;
}

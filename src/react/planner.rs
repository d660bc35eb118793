//! Planner：带超时的 LLM 调用与决策解析
//!
//! complete 在固定超时内调用 LLM（超时 → LlmTimeout，请求失败 → LlmError）；
//! decide 依次走「抽取 → 修复一次 → DecisionParse」得到 Decision。

use std::sync::Arc;
use std::time::Duration;

use crate::core::AgentError;
use crate::llm::LlmClient;
use crate::memory::Message;
use crate::react::decision::Decision;
use crate::react::extract::extract_json;
use crate::react::repair::repair_decision;

/// Planner：持有 LLM 与请求超时
#[derive(Clone)]
pub struct Planner {
    llm: Arc<dyn LlmClient>,
    timeout_secs: u64,
}

impl Planner {
    pub fn new(llm: Arc<dyn LlmClient>, timeout_secs: u64) -> Self {
        Self { llm, timeout_secs }
    }

    /// 单次请求
    pub async fn complete(&self, messages: &[Message]) -> Result<String, AgentError> {
        let fut = self.llm.complete(messages);
        match tokio::time::timeout(Duration::from_secs(self.timeout_secs), fut).await {
            Ok(Ok(text)) => {
                tracing::debug!(reply = %text, "llm reply");
                Ok(text)
            }
            Ok(Err(e)) => Err(AgentError::LlmError(e)),
            Err(_) => Err(AgentError::LlmTimeout(self.timeout_secs)),
        }
    }

    /// 调用 LLM 并解析为 Decision；抽取与修复都失败时返回 DecisionParse（携带原始回复）
    pub async fn decide(&self, messages: &[Message]) -> Result<Decision, AgentError> {
        let raw = self.complete(messages).await?;
        if let Some(v) = extract_json(&raw) {
            return Ok(Decision::from_value(&v));
        }
        tracing::warn!("decision not parseable, attempting repair");
        if let Some(v) = repair_decision(self, &raw).await? {
            return Ok(Decision::from_value(&v));
        }
        Err(AgentError::DecisionParse {
            message: "Failed to parse agent response as JSON".to_string(),
            raw,
        })
    }
}

//! Agent 错误类型
//!
//! 能力调用与决策步骤的失败都归到这里；除 LLM 故障外，调用方会把它们转成结构化结果
//! （`{"error": ...}`，供下一轮模型阅读）或任务状态中的错误条目（供人工排查），不会终止循环。

use thiserror::Error;

/// Agent 运行过程中可能出现的错误（决策解析、能力分发、作业、LLM、持久化等）
#[derive(Error, Debug)]
pub enum AgentError {
    /// 抽取与修复均失败；raw 为模型原始回复
    #[error("{message}")]
    DecisionParse { message: String, raw: String },

    #[error("Unknown action: {0}")]
    UnknownAction(String),

    #[error("Unknown capability: {0}")]
    UnknownCapability(String),

    #[error("Invalid arguments for {capability}: {reason}")]
    InvalidArguments { capability: String, reason: String },

    #[error("{capability} failed: {reason}")]
    CapabilityFault { capability: String, reason: String },

    #[error("Capability timed out: {0}")]
    CapabilityTimeout(String),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("LLM request timed out after {0}s")]
    LlmTimeout(u64),

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl AgentError {
    /// 构造能力内部故障
    pub fn fault(capability: &str, reason: impl std::fmt::Display) -> Self {
        Self::CapabilityFault {
            capability: capability.to_string(),
            reason: reason.to_string(),
        }
    }

    /// 渲染为能力契约中的错误结果 `{"error": "..."}`
    pub fn to_result_json(&self) -> serde_json::Value {
        serde_json::json!({ "error": self.to_string() })
    }

    /// 是否为语言能力本身的故障（超时或请求失败），这类错误会向上传播
    pub fn is_llm_failure(&self) -> bool {
        matches!(self, Self::LlmError(_) | Self::LlmTimeout(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_json_shape() {
        let err = AgentError::UnknownCapability("teleport".to_string());
        let v = err.to_result_json();
        assert_eq!(v["error"], "Unknown capability: teleport");
        assert_eq!(v.as_object().unwrap().len(), 1);
    }

    #[test]
    fn test_fault_display() {
        let err = AgentError::fault("read_text", "File not found: a.txt");
        assert_eq!(err.to_string(), "read_text failed: File not found: a.txt");
    }

    #[test]
    fn test_llm_failure_classification() {
        assert!(AgentError::LlmTimeout(120).is_llm_failure());
        assert!(!AgentError::JobNotFound("x".into()).is_llm_failure());
    }
}

//! 决策修复：抽取失败后，带上期望 Schema 向模型发起一次修正请求，再抽取一次
//!
//! 只修一次，不再重试；修复请求本身的 LLM 故障照常向上传播。

use serde_json::Value;

use crate::core::AgentError;
use crate::memory::Message;
use crate::react::decision::decision_schema_json;
use crate::react::extract::extract_json;
use crate::react::planner::Planner;

const REPAIR_SYSTEM: &str = "You are a JSON repair assistant. Output ONLY valid JSON.";

/// 构造修复请求
pub fn repair_messages(broken: &str) -> Vec<Message> {
    let user = format!(
        "The following text was supposed to be valid JSON but has errors.\n\
         Fix it and output ONLY the corrected JSON, nothing else.\n\n\
         Expected schema:\n\
         {{\"action\": \"tool|say|finish\", \"tool_name\": \"string\", \"args\": {{}}, \"message\": \"string\", \"note\": \"string\"}}\n\n\
         JSON Schema:\n{}\n\n\
         Broken text:\n{}\n\n\
         Output only valid JSON:",
        decision_schema_json(),
        broken
    );
    vec![Message::system(REPAIR_SYSTEM), Message::user(user)]
}

/// 一次修复尝试：返回修好的对象，仍无法抽取时返回 None
pub async fn repair_decision(planner: &Planner, broken: &str) -> Result<Option<Value>, AgentError> {
    let reply = planner.complete(&repair_messages(broken)).await?;
    let repaired = extract_json(&reply);
    if repaired.is_none() {
        tracing::debug!(reply = %reply, "repair reply still not json");
    }
    Ok(repaired)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_single_repair_call() {
        let mock = Arc::new(MockLlmClient::new([r#"{"action":"say","message":"fixed"}"#]));
        let planner = Planner::new(mock.clone(), 5);
        let v = repair_decision(&planner, "{action: say").await.unwrap().unwrap();
        assert_eq!(v["message"], "fixed");
        assert_eq!(mock.call_count(), 1);
        let req = mock.request(0).unwrap();
        assert!(req[1].content.contains("{action: say"));
        assert!(req[1].content.contains("tool|say|finish"));
    }

    #[tokio::test]
    async fn test_repair_still_broken() {
        let mock = Arc::new(MockLlmClient::new(["sorry, I can't"]));
        let planner = Planner::new(mock, 5);
        assert!(repair_decision(&planner, "garbage").await.unwrap().is_none());
    }
}

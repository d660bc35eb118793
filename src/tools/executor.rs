//! 工具执行器
//!
//! 持有 CapabilityRegistry 与全局超时，execute(name, args) 在超时内分发，并捕获能力内部 panic；
//! 结果统一渲染为格式化 JSON 文本（写入历史/提示词的形式）。每次调用输出结构化审计日志（JSON）。

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::FutureExt;
use serde_json::Value;
use tokio::time::timeout;

use crate::core::AgentError;
use crate::tools::CapabilityRegistry;

/// 工具执行器：超时、panic 捕获、审计；从不返回错误
#[derive(Clone)]
pub struct ToolExecutor {
    registry: Arc<CapabilityRegistry>,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(registry: Arc<CapabilityRegistry>, timeout_secs: u64) -> Self {
        Self {
            registry,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        &self.registry
    }

    /// 执行并返回结构化结果（成功负载或 `{"error": ...}`）
    pub async fn execute_value(&self, tool_name: &str, args: Value) -> Value {
        let start = Instant::now();
        let args_preview = args_preview(&args);
        let call = AssertUnwindSafe(self.registry.try_dispatch(tool_name, args)).catch_unwind();
        let result = timeout(self.timeout, call).await;

        let (outcome, value) = match result {
            Ok(Ok(Ok(v))) => ("ok", v),
            Ok(Ok(Err(e))) => ("error", e.to_result_json()),
            Ok(Err(panic)) => (
                "panic",
                AgentError::fault(tool_name, panic_message(panic.as_ref())).to_result_json(),
            ),
            Err(_) => (
                "timeout",
                AgentError::CapabilityTimeout(tool_name.to_string()).to_result_json(),
            ),
        };

        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": tool_name,
            "ok": outcome == "ok",
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview,
        });
        tracing::info!(audit = %audit.to_string(), "tool");
        value
    }

    /// 执行并渲染为格式化 JSON 文本
    pub async fn execute(&self, tool_name: &str, args: Value) -> String {
        let value = self.execute_value(tool_name, args).await;
        serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string())
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "capability panicked".to_string()
    }
}

fn args_preview(args: &Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}

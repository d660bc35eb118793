//! Ollama 客户端（OpenAI 兼容端点）
//!
//! 本地 Ollama 在 /v1 下提供 OpenAI 兼容接口，无需 API Key。

use crate::llm::OpenAiClient;

/// 本地 Ollama 默认端点
pub const OLLAMA_BASE_URL: &str = "http://localhost:11434/v1";
pub const OLLAMA_DEFAULT_MODEL: &str = "gemma3:12b";

/// 创建 Ollama 客户端
///
/// - base_url 为空时使用 `OLLAMA_BASE_URL`
/// - 模型可通过 `OLLAMA_MODEL` 环境变量覆盖
pub fn create_ollama_client(base_url: Option<&str>, model: Option<&str>) -> OpenAiClient {
    let model = std::env::var("OLLAMA_MODEL")
        .ok()
        .or_else(|| model.map(String::from))
        .unwrap_or_else(|| OLLAMA_DEFAULT_MODEL.to_string());
    OpenAiClient::new(
        Some(base_url.unwrap_or(OLLAMA_BASE_URL)),
        &model,
        Some("ollama"),
    )
}

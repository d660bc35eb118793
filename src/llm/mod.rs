//! LLM 层：客户端抽象与实现（OpenAI 兼容 / Ollama / Mock）

pub mod mock;
pub mod ollama;
pub mod openai;
pub mod traits;

pub use mock::MockLlmClient;
pub use ollama::{create_ollama_client, OLLAMA_BASE_URL};
pub use openai::OpenAiClient;
pub use traits::LlmClient;

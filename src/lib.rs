//! Mafuyu - 人格驱动的对话智能体
//!
//! 模块划分：
//! - **agent**: 组件构建（LLM、能力注册表、状态机、聊天编排器）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型、任务状态与 Agent 状态机
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Ollama / Mock）
//! - **memory**: 对话历史、长期记忆、情感状态与 JSON 持久化
//! - **observability**: 日志初始化
//! - **react**: 结构化决策抽取与修复、标签式回合循环
//! - **tools**: 能力注册表、执行器与后台作业

pub mod agent;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod react;
pub mod tools;

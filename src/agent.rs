//! Headless Agent 运行时
//!
//! create_llm_from_config 按配置选择后端；create_agent_components 构建共享同一作业表的
//! 状态机（任务模式）与标签式回合编排器（聊天模式）。

use std::path::Path;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::core::{AgentMachine, TaskStore};
use crate::llm::{create_ollama_client, LlmClient, OpenAiClient};
use crate::memory::{AffectStore, FileLongTerm};
use crate::react::{Persona, Planner, TurnOrchestrator};
use crate::tools::{CapabilityRegistry, FileSystem, JobManager, ToolExecutor};

/// 按 [llm].provider 创建客户端：ollama（默认）或 openai（读取 OPENAI_API_KEY）
pub fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    let base = cfg.llm.base_url.as_deref();
    match cfg.llm.provider.to_lowercase().as_str() {
        "openai" => {
            tracing::info!("Using OpenAI-compatible LLM ({})", cfg.llm.model);
            Arc::new(OpenAiClient::new(
                base,
                &cfg.llm.model,
                std::env::var("OPENAI_API_KEY").ok().as_deref(),
            ))
        }
        other => {
            if other != "ollama" {
                tracing::warn!(provider = %other, "unknown provider, falling back to Ollama");
            }
            let client = create_ollama_client(base, Some(&cfg.llm.model));
            tracing::info!("Using Ollama LLM ({})", client.model());
            Arc::new(client)
        }
    }
}

/// 预构建的 Agent 组件；machine 与 chat 共享同一个能力注册表（及作业表）
pub struct AgentComponents {
    pub machine: AgentMachine,
    pub chat: TurnOrchestrator,
    pub jobs: Arc<JobManager>,
}

/// 从配置创建组件，文件能力以 workspace 为根目录
pub fn create_agent_components(cfg: &AppConfig, workspace: &Path) -> AgentComponents {
    let llm = create_llm_from_config(cfg);
    create_agent_components_with_llm(cfg, workspace, llm)
}

/// 使用给定 LLM 创建组件（测试中传入 MockLlmClient）
pub fn create_agent_components_with_llm(
    cfg: &AppConfig,
    workspace: &Path,
    llm: Arc<dyn LlmClient>,
) -> AgentComponents {
    let planner = Planner::new(llm, cfg.llm.timeouts.request);

    let jobs = Arc::new(JobManager::new(&cfg.tools.jobs, &cfg.app.logs_dir));
    let registry = Arc::new(CapabilityRegistry::new(
        &cfg.tools,
        FileSystem::new(workspace),
        Arc::clone(&jobs),
        Some(planner.clone()),
    ));
    let executor = ToolExecutor::new(registry, cfg.tools.tool_timeout_secs);

    let machine = AgentMachine::new(
        planner.clone(),
        executor.clone(),
        TaskStore::new(&cfg.app.logs_dir),
    );
    let chat = TurnOrchestrator::new(
        planner,
        executor,
        Arc::new(FileLongTerm::new(cfg.app.memory_path())),
        Arc::new(AffectStore::new(cfg.app.emotion_path())),
        Persona::load(&cfg.persona),
        cfg.chat.clone(),
    );

    AgentComponents {
        machine,
        chat,
        jobs,
    }
}

//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `MAFUYU__*` 覆盖（双下划线表示嵌套，如 `MAFUYU__LLM__MODEL=qwen3:8b`）。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub chat: ChatSection,
    pub llm: LlmSection,
    pub persona: PersonaSection,
    pub tools: ToolsSection,
}

/// [app] 段：数据目录、日志目录、CLI 说话者
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    /// 记忆、情感、推文库所在目录
    pub data_dir: PathBuf,
    /// 任务状态文件与作业日志所在目录
    pub logs_dir: PathBuf,
    /// CLI 模式下的用户标识（情感状态按此区分）
    pub user_name: String,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            logs_dir: PathBuf::from("data/logs"),
            user_name: "otaku".to_string(),
        }
    }
}

impl AppSection {
    pub fn memory_path(&self) -> PathBuf {
        self.data_dir.join("memory.json")
    }

    pub fn emotion_path(&self) -> PathBuf {
        self.data_dir.join("emotion.json")
    }
}

/// [chat] 段：标签式回合循环参数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChatSection {
    /// 上下文中保留的最近消息条数，更早的部分做摘要
    pub max_history: usize,
    /// 单次回复的最大回合数
    pub max_turns: usize,
    /// 注入用户消息的记忆条数
    pub memory_hits: usize,
    /// 摘要时取窗口外最近多少条
    pub summary_source_messages: usize,
    /// 摘要时每条消息截断长度（字符）
    pub summary_message_chars: usize,
    /// 工具结果注入 prompt 前的截断长度（字符）
    pub tool_result_max_chars: usize,
}

impl Default for ChatSection {
    fn default() -> Self {
        Self {
            max_history: 40,
            max_turns: 3,
            memory_hits: 3,
            summary_source_messages: 20,
            summary_message_chars: 200,
            tool_result_max_chars: 2000,
        }
    }
}

/// [llm] 段：后端选择与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// 后端：ollama / openai
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            model: "gemma3:12b".to_string(),
            base_url: None,
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmTimeoutsSection {
    /// 单次请求超时（秒）
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self { request: 120 }
    }
}

/// [persona] 段：人格 prompt 与示例对话
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PersonaSection {
    pub system_prompt_path: PathBuf,
    pub fewshot_path: PathBuf,
    /// 清洗后回复为空时的兜底台词
    pub filler_utterance: String,
    /// 这些用户会被标注为创作者/搭档
    pub creator_names: Vec<String>,
}

impl Default for PersonaSection {
    fn default() -> Self {
        Self {
            system_prompt_path: PathBuf::from("config/prompts/system.txt"),
            fewshot_path: PathBuf::from("config/prompts/fewshot.json"),
            filler_utterance: "…えっと、なんだっけ？".to_string(),
            creator_names: Vec::new(),
        }
    }
}

/// [tools] 段：工具超时、抓取上限、Python、推文库、搜索与作业
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsSection {
    /// 单次能力调用超时（秒）
    pub tool_timeout_secs: u64,
    pub fetch_max_chars: usize,
    /// read_url 正文超过该长度时走 LLM 摘要
    pub read_url_summary_threshold: usize,
    pub python_command: String,
    pub python_timeout_secs: u64,
    pub tweets_db: PathBuf,
    pub search: SearchSection,
    pub jobs: JobsSection,
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: 120,
            fetch_max_chars: 10_000,
            read_url_summary_threshold: 3000,
            python_command: "python".to_string(),
            python_timeout_secs: 30,
            tweets_db: PathBuf::from("data/memory.db"),
            search: SearchSection::default(),
            jobs: JobsSection::default(),
        }
    }
}

/// [tools.search] 段：DuckDuckGo HTML 端点、地区、结果数、超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchSection {
    pub endpoint: String,
    pub region: String,
    pub max_results: usize,
    pub timeout_secs: u64,
}

impl Default for SearchSection {
    fn default() -> Self {
        Self {
            endpoint: "https://html.duckduckgo.com/html/".to_string(),
            region: "jp-jp".to_string(),
            max_results: 5,
            timeout_secs: 30,
        }
    }
}

/// [tools.jobs] 段：后台作业命令（prompt 作为最后一个参数追加）、日志尾行数、停止宽限期
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JobsSection {
    pub command: Vec<String>,
    pub tail_lines: usize,
    pub stop_grace_secs: u64,
}

impl Default for JobsSection {
    fn default() -> Self {
        Self {
            command: vec!["codex".into(), "-a".into(), "never".into()],
            tail_lines: 80,
            stop_grace_secs: 5,
        }
    }
}

/// 从 config 目录加载配置，环境变量 MAFUYU__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 MAFUYU__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("MAFUYU")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.chat.max_turns, 3);
        assert_eq!(cfg.chat.max_history, 40);
        assert_eq!(cfg.tools.jobs.tail_lines, 80);
        assert_eq!(cfg.llm.timeouts.request, 120);
        assert_eq!(cfg.app.memory_path(), PathBuf::from("data/memory.json"));
    }

    #[test]
    fn test_partial_toml_keeps_field_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(
            &path,
            "[chat]\nmax_turns = 5\n\n[tools.jobs]\ncommand = [\"sh\", \"-c\"]\n",
        )
        .unwrap();
        let cfg = load_config(Some(path)).unwrap();
        assert_eq!(cfg.chat.max_turns, 5);
        assert_eq!(cfg.chat.memory_hits, 3);
        assert_eq!(cfg.tools.jobs.command, vec!["sh", "-c"]);
        assert_eq!(cfg.tools.jobs.stop_grace_secs, 5);
    }
}

//! 任务状态：AgentTask 及其持久化
//!
//! 每个任务一个文件 `state_<task_id>.json`，每次变更后整体原子重写（写穿，不缓冲）。
//! history 是只追加的有序记录，也是重放任务的唯一依据。

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::AgentError;
use crate::memory::{JsonFile, Message};

/// 历史条目角色
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryRole {
    User,
    Assistant,
    ToolResult,
}

/// 历史条目
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: HistoryRole,
    pub content: String,
}

impl HistoryEntry {
    pub fn new(role: HistoryRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    /// 非工具结果条目转为 LLM 消息；工具结果由调用方单独注入
    pub fn to_message(&self) -> Option<Message> {
        match self.role {
            HistoryRole::User => Some(Message::user(self.content.clone())),
            HistoryRole::Assistant => Some(Message::assistant(self.content.clone())),
            HistoryRole::ToolResult => None,
        }
    }
}

/// 单个任务的完整状态
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentTask {
    pub task_id: String,
    pub goal: String,
    pub done: bool,
    #[serde(alias = "steps")]
    pub step_count: u32,
    /// 模型上一步留下的备忘，进入下一次 tick 的上下文
    #[serde(alias = "next")]
    pub next_note: String,
    pub artifacts: Vec<String>,
    pub errors: Vec<String>,
    pub pending_notes: Vec<String>,
    pub history: Vec<HistoryEntry>,
}

impl AgentTask {
    pub fn new(task_id: impl Into<String>, goal: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            goal: goal.into(),
            ..Default::default()
        }
    }

    /// 取出并清空待处理的用户备注
    pub fn consume_notes(&mut self) -> Vec<String> {
        std::mem::take(&mut self.pending_notes)
    }

    /// 最近一条历史为工具结果时返回其内容
    pub fn last_tool_result(&self) -> Option<&str> {
        self.history
            .last()
            .filter(|h| h.role == HistoryRole::ToolResult)
            .map(|h| h.content.as_str())
    }
}

/// 任务存储：目录下每个任务一个 JSON 文件
#[derive(Debug, Clone)]
pub struct TaskStore {
    dir: PathBuf,
}

impl TaskStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn path_for(&self, task_id: &str) -> PathBuf {
        self.dir.join(format!("state_{task_id}.json"))
    }

    /// 新建任务（8 位十六进制 id）并立即落盘
    pub fn create(&self, goal: &str) -> Result<AgentTask, AgentError> {
        let task_id = uuid::Uuid::new_v4().simple().to_string()[..8].to_string();
        let task = AgentTask::new(task_id, goal);
        self.save(&task)?;
        tracing::info!(task_id = %task.task_id, goal = %goal, "task created");
        Ok(task)
    }

    /// 不存在时返回 None；文件损坏返回 Persistence 错误
    pub fn load(&self, task_id: &str) -> Result<Option<AgentTask>, AgentError> {
        JsonFile::<AgentTask>::new(self.path_for(task_id)).load_optional()
    }

    pub fn save(&self, task: &AgentTask) -> Result<(), AgentError> {
        JsonFile::new(self.path_for(&task.task_id)).save(task)
    }
}

//! Agent 状态机：每次 tick 推进任务一步
//!
//! Deciding → {ToolDispatch, Say, Finish, Error}；ToolDispatch 与 Say 回到 Deciding，Finish 为终态。
//! 每次 tick 只调用一次 LLM（解析失败时另加一次修复请求），每个变更后立即落盘。
//! 只有 LLM 故障与持久化故障以 Err 返回；解析失败与未知动作记入任务错误并以 Failed 返回，任务保持可恢复。

use serde_json::Value;

use crate::core::state::{AgentTask, HistoryEntry, HistoryRole, TaskStore};
use crate::core::AgentError;
use crate::memory::Message;
use crate::react::decision::Action;
use crate::react::Planner;
use crate::tools::{catalogue, ToolExecutor};

/// 错误记录中原始回复的最大字符数
const RAW_EXCERPT_CHARS: usize = 200;
/// CLI 展示的工具结果预览长度
const RESULT_PREVIEW_CHARS: usize = 200;

/// 一次 tick 的结果
#[derive(Debug)]
pub enum TickOutcome {
    Tool {
        name: String,
        args: Value,
        preview: String,
    },
    Say(String),
    Finish(String),
    /// 决策解析失败或未知动作：已记入 task.errors
    Failed(AgentError),
}

impl TickOutcome {
    pub fn is_done(&self) -> bool {
        matches!(self, Self::Finish(_))
    }

    /// 单行展示
    pub fn render(&self) -> String {
        match self {
            Self::Tool {
                name,
                args,
                preview,
            } => format!("🔧 {name}({args}) → {preview}"),
            Self::Say(msg) => format!("💬 {msg}"),
            Self::Finish(msg) => format!("✅ Task complete: {msg}"),
            Self::Failed(e @ AgentError::UnknownAction(_)) => format!("❌ {e}"),
            Self::Failed(e) => format!("❌ Agent error: {e}"),
        }
    }
}

/// 任务状态机
pub struct AgentMachine {
    planner: Planner,
    executor: ToolExecutor,
    store: TaskStore,
}

impl AgentMachine {
    pub fn new(planner: Planner, executor: ToolExecutor, store: TaskStore) -> Self {
        Self {
            planner,
            executor,
            store,
        }
    }

    pub fn store(&self) -> &TaskStore {
        &self.store
    }

    /// 追加用户备注，下一次 tick 时进入上下文
    pub fn add_note(&self, task: &mut AgentTask, note: &str) -> Result<(), AgentError> {
        task.pending_notes.push(note.to_string());
        self.store.save(task)
    }

    /// 记录产物（文件路径等），之后每次 tick 都出现在上下文中
    pub fn add_artifact(&self, task: &mut AgentTask, artifact: &str) -> Result<(), AgentError> {
        task.artifacts.push(artifact.to_string());
        self.store.save(task)
    }

    /// 推进一步
    pub async fn tick(&self, task: &mut AgentTask) -> Result<TickOutcome, AgentError> {
        let notes = task.consume_notes();
        let messages = build_messages(task, &notes);

        let decision = match self.planner.decide(&messages).await {
            Ok(d) => d,
            Err(AgentError::DecisionParse { message, raw }) => {
                let excerpt: String = raw.chars().take(RAW_EXCERPT_CHARS).collect();
                task.errors
                    .push(format!("JSON parse failed: {message}\nRaw: {excerpt}"));
                self.store.save(task)?;
                tracing::warn!(task_id = %task.task_id, "decision parse failed");
                return Ok(TickOutcome::Failed(AgentError::DecisionParse { message, raw }));
            }
            Err(e) => {
                // 本次 tick 未生效，备注留给下一次
                task.pending_notes = notes;
                return Err(e);
            }
        };

        task.history.push(HistoryEntry::new(
            HistoryRole::Assistant,
            decision.to_value().to_string(),
        ));
        if !decision.note.is_empty() {
            task.next_note = decision.note.clone();
        }

        let tool_name = match &decision.action {
            Action::Finish => {
                task.done = true;
                self.store.save(task)?;
                tracing::info!(task_id = %task.task_id, steps = task.step_count, "task finished");
                return Ok(TickOutcome::Finish(decision.message));
            }
            Action::Say => {
                task.step_count += 1;
                self.store.save(task)?;
                return Ok(TickOutcome::Say(decision.message));
            }
            Action::Tool => decision.tool_name.clone(),
            Action::Other(name) if self.executor.registry().contains(name) => {
                tracing::warn!(
                    task_id = %task.task_id,
                    action = %name,
                    "action is a capability name, dispatching as tool call"
                );
                name.clone()
            }
            Action::Other(name) => {
                task.errors.push(format!("Unknown action: {name}"));
                self.store.save(task)?;
                return Ok(TickOutcome::Failed(AgentError::UnknownAction(name.clone())));
            }
        };

        let args = Value::Object(decision.args);
        let result = self.executor.execute(&tool_name, args.clone()).await;
        task.history
            .push(HistoryEntry::new(HistoryRole::ToolResult, result.clone()));
        task.step_count += 1;
        self.store.save(task)?;

        Ok(TickOutcome::Tool {
            name: tool_name,
            args,
            preview: preview(&result),
        })
    }
}

fn preview(result: &str) -> String {
    if result.chars().count() > RESULT_PREVIEW_CHARS {
        format!(
            "{}...",
            result.chars().take(RESULT_PREVIEW_CHARS).collect::<String>()
        )
    } else {
        result.to_string()
    }
}

/// 系统提示词 + 目标/备注/备忘/产物 + 非工具历史 + 最近一次工具结果
fn build_messages(task: &AgentTask, notes: &[String]) -> Vec<Message> {
    let mut goal_msg = format!("GOAL: {}", task.goal);
    if !notes.is_empty() {
        goal_msg.push_str("\n\nUSER NOTES:\n");
        goal_msg.push_str(
            &notes
                .iter()
                .map(|n| format!("- {n}"))
                .collect::<Vec<_>>()
                .join("\n"),
        );
    }
    if !task.next_note.is_empty() {
        goal_msg.push_str(&format!("\n\nNEXT STEP MEMO: {}", task.next_note));
    }
    if !task.artifacts.is_empty() {
        goal_msg.push_str("\n\nARTIFACTS:\n");
        goal_msg.push_str(
            &task
                .artifacts
                .iter()
                .map(|a| format!("- {a}"))
                .collect::<Vec<_>>()
                .join("\n"),
        );
    }

    let mut messages = vec![
        Message::system(agent_system_prompt()),
        Message::user(goal_msg),
    ];
    messages.extend(task.history.iter().filter_map(HistoryEntry::to_message));
    if let Some(result) = task.last_tool_result() {
        messages.push(Message::user(format!("TOOL RESULT:\n{result}")));
    }
    messages
}

pub fn agent_system_prompt() -> String {
    format!(
        r#"You are an autonomous agent. You execute tasks step by step.

CRITICAL: Output ONLY valid JSON. No explanation, no markdown, just JSON.

Schema:
{{
  "action": "tool",
  "tool_name": "<name of the tool to use>",
  "args": {{"<arg_name>": "<value>"}},
  "message": "",
  "note": "<your next step memo>"
}}

IMPORTANT: "action" MUST be exactly one of these strings:
- "tool" - when using a tool
- "say" - when you need to tell the user something
- "finish" - when the task is complete

CORRECT EXAMPLE (using write_text):
{{"action": "tool", "tool_name": "write_text", "args": {{"path": "data/test.txt", "content": "Hello"}}, "message": "", "note": "File created"}}

WRONG EXAMPLE (DO NOT DO THIS):
{{"action": "write_text", ...}}  <-- WRONG! action must be "tool", not the tool name

Available tools:
{}

Rules:
1. ONE action per response
2. Use "finish" with a message when goal is complete
"#,
        catalogue()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_messages_context() {
        let mut task = AgentTask::new("t1", "tidy up");
        task.next_note = "check logs".into();
        task.history
            .push(HistoryEntry::new(HistoryRole::Assistant, "{\"action\":\"tool\"}"));
        task.history
            .push(HistoryEntry::new(HistoryRole::ToolResult, "{\"ok\":true}"));
        let msgs = build_messages(&task, &["be quick".to_string()]);

        assert_eq!(msgs.len(), 4);
        assert!(msgs[0].content.contains("list_dir(path)"));
        assert!(msgs[1].content.contains("GOAL: tidy up"));
        assert!(msgs[1].content.contains("- be quick"));
        assert!(msgs[1].content.contains("NEXT STEP MEMO: check logs"));
        assert_eq!(msgs[2].content, "{\"action\":\"tool\"}");
        assert_eq!(msgs[3].content, "TOOL RESULT:\n{\"ok\":true}");
    }

    #[test]
    fn test_artifacts_in_goal_message() {
        let mut task = AgentTask::new("t2", "write report");
        task.artifacts.push("reports/summary.md".into());
        let msgs = build_messages(&task, &[]);
        assert_eq!(msgs.len(), 2);
        assert_eq!(
            msgs[1].content,
            "GOAL: write report\n\nARTIFACTS:\n- reports/summary.md"
        );
    }

    #[test]
    fn test_render() {
        let out = TickOutcome::Failed(AgentError::UnknownAction("dance".into()));
        assert_eq!(out.render(), "❌ Unknown action: dance");
        assert_eq!(TickOutcome::Say("hi".into()).render(), "💬 hi");
        assert!(TickOutcome::Finish("ok".into()).is_done());
    }

    #[test]
    fn test_preview_truncates() {
        let long = "あ".repeat(300);
        let p = preview(&long);
        assert_eq!(p.chars().count(), RESULT_PREVIEW_CHARS + 3);
    }
}

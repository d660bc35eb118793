//! 回合过程事件：供前端/CLI 展示思考、记忆、情感、工具调用与最终回复

use serde::Serialize;

/// 单步过程事件（可序列化为 JSON 供前端展示）
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEvent {
    /// 回合开始（从 1 计）
    TurnStart { turn: usize, max_turns: usize },
    /// `<thought>` 内容
    Thought { text: String },
    /// 写入长期记忆
    MemoryStored { content: String },
    /// 情感增量已生效（夹紧后的新值）
    AffectApplied {
        affection: i64,
        mood: i64,
        energy: i64,
    },
    /// 调用能力
    ToolCall { tool: String, args: String },
    /// 命中会话缓存，未实际执行
    CacheHit { tool: String },
    /// 能力结果预览
    Observation { tool: String, preview: String },
    /// 最终回复
    FinalAnswer { text: String },
    /// 达到回合上限
    TurnCapReached { max_turns: usize },
}

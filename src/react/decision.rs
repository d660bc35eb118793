//! 决策：模型在每个 tick 输出的结构化动作
//!
//! 抽取出的 JSON 按宽松规则转成 Decision：缺失或类型不符的字段取空值，args 不是对象时视为空表。
//! Decision 不直接持久化，而是序列化回 `{"action", "tool_name", "args", "message", "note"}` 写入任务历史。

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 决策动作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Tool,
    Say,
    Finish,
    /// 其他任意取值（可能是能力名，也可能是拼写错误）
    Other(String),
}

impl Action {
    pub fn parse(s: &str) -> Self {
        match s {
            "tool" => Self::Tool,
            "say" => Self::Say,
            "finish" => Self::Finish,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Tool => "tool",
            Self::Say => "say",
            Self::Finish => "finish",
            Self::Other(s) => s,
        }
    }
}

/// 单次 tick 的决策
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub action: Action,
    pub tool_name: String,
    pub args: Map<String, Value>,
    pub message: String,
    pub note: String,
}

impl Decision {
    /// 宽松转换：非对象输入得到 action 为空串的 Other
    pub fn from_value(value: &Value) -> Self {
        let text = |key: &str| {
            value
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        let args = value
            .get("args")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        Self {
            action: Action::parse(&text("action")),
            tool_name: text("tool_name"),
            args,
            message: text("message"),
            note: text("note"),
        }
    }

    /// 序列化为决策协议格式（写入任务历史的文本记录）
    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "action": self.action.as_str(),
            "tool_name": self.tool_name,
            "args": self.args,
            "message": self.message,
            "note": self.note,
        })
    }
}

/// 决策协议的 Schema（仅用于生成修复 prompt 中的 JSON Schema）
#[allow(dead_code)]
#[derive(Serialize, Deserialize, JsonSchema)]
struct DecisionFormat {
    /// "tool" | "say" | "finish"
    action: String,
    /// action 为 tool 时要调用的能力名
    tool_name: String,
    /// 能力参数（按名称）
    args: Map<String, Value>,
    /// say / finish 时给用户的消息
    message: String,
    /// 下一步备忘
    note: String,
}

/// 返回决策协议的 JSON Schema 字符串
pub fn decision_schema_json() -> String {
    let schema = schemars::schema_for!(DecisionFormat);
    serde_json::to_string_pretty(&schema).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_lenient_fields() {
        let d = Decision::from_value(&json!({"action": "say", "message": 3, "args": "nope"}));
        assert_eq!(d.action, Action::Say);
        assert_eq!(d.message, "");
        assert!(d.args.is_empty());
    }

    #[test]
    fn test_other_action_and_roundtrip_shape() {
        let d = Decision::from_value(&json!({
            "action": "write_text",
            "args": {"path": "a.txt", "content": "x"},
            "note": "next"
        }));
        assert_eq!(d.action, Action::Other("write_text".to_string()));
        let v = d.to_value();
        assert_eq!(v["action"], "write_text");
        assert_eq!(v["args"]["path"], "a.txt");
        assert_eq!(v["tool_name"], "");
    }

    #[test]
    fn test_schema_mentions_fields() {
        let schema = decision_schema_json();
        assert!(schema.contains("tool_name"));
        assert!(schema.contains("note"));
    }
}

//! 结构化输出抽取：从任意文本中取出第一个括号平衡的 JSON 对象
//!
//! 单次扫描：从第一个 `{` 开始计数嵌套深度，字符串内的括号不计；深度回到 0 时尝试解析。
//! 解析失败或扫描到文本末尾仍未闭合（如字符串未结束）均视为「未找到」，不会换起点重试。

use serde_json::Value;

/// 返回第一个 `{` 起的平衡对象；不是合法 JSON 对象时返回 None
pub fn extract_json(text: &str) -> Option<Value> {
    let candidate = balanced_object(text)?;
    match serde_json::from_str::<Value>(candidate) {
        Ok(v @ Value::Object(_)) => Some(v),
        Ok(_) => None,
        Err(e) => {
            tracing::debug!(error = %e, "balanced candidate is not valid json");
            None
        }
    }
}

/// 定位第一个 `{` 到与之配对的 `}` 的切片
fn balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape_next = false;

    for (offset, c) in text[start..].char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        if in_string {
            match c {
                '\\' => escape_next = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    let end = start + offset + c.len_utf8();
                    return Some(&text[start..end]);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_surrounding_prose() {
        let text = r#"noise {"action":"say","message":"hi"} trailing"#;
        assert_eq!(
            extract_json(text),
            Some(json!({"action": "say", "message": "hi"}))
        );
    }

    #[test]
    fn test_nested_and_quoted_braces() {
        let text = r#"Sure! {"action":"tool","args":{"content":"fn main() { } \"}\""},"note":"x"} done"#;
        let v = extract_json(text).unwrap();
        assert_eq!(v["args"]["content"], "fn main() { } \"}\"");
        assert_eq!(v["note"], "x");
    }

    #[test]
    fn test_unterminated_string_is_not_found() {
        assert_eq!(extract_json(r#"{"message": "never closed }"#), None);
        assert_eq!(extract_json(r#"prefix {"a": {"b": 1}"#), None);
    }

    #[test]
    fn test_single_shot_no_retry() {
        // 第一个 { 不是合法对象，即使后面有合法对象也不再尝试
        let text = r#"{oops} then {"action":"finish"}"#;
        assert_eq!(extract_json(text), None);
    }

    #[test]
    fn test_no_brace() {
        assert_eq!(extract_json("just words"), None);
        assert_eq!(extract_json(""), None);
    }

    #[test]
    fn test_multibyte_text() {
        let text = "了解です {\"action\":\"say\",\"message\":\"こんにちは {笑}\"} ね";
        assert_eq!(extract_json(text).unwrap()["message"], "こんにちは {笑}");
    }
}

//! 最终回复清洗
//!
//! 输入为去掉标签后的文本：去掉外层成对引号，压缩重复标点，去掉标签移除后残留的句首连接词，
//! 压缩多余空行。

use std::sync::OnceLock;

use regex::Regex;

const QUOTE_PAIRS: &[(char, char)] = &[('"', '"'), ('“', '”'), ('「', '」'), ('\'', '\'')];

struct Rules {
    commas: Regex,
    periods: Regex,
    dots: Regex,
    ellipses: Regex,
    connective: Regex,
    blank_lines: Regex,
}

fn rules() -> &'static Rules {
    static RULES: OnceLock<Rules> = OnceLock::new();
    RULES.get_or_init(|| Rules {
        commas: Regex::new(r"、{2,}").expect("valid regex"),
        periods: Regex::new(r"。{2,}").expect("valid regex"),
        dots: Regex::new(r"\.{4,}").expect("valid regex"),
        ellipses: Regex::new(r"…{2,}").expect("valid regex"),
        connective: Regex::new(r"^(が|でも|しかし|ですが|だけど)([、,。]\s*|\s+)").expect("valid regex"),
        blank_lines: Regex::new(r"\n{3,}").expect("valid regex"),
    })
}

/// 去掉一层外层成对引号
pub fn strip_wrapping_quotes(text: &str) -> &str {
    let trimmed = text.trim();
    let mut chars = trimmed.chars();
    let (Some(first), Some(last)) = (chars.next(), chars.next_back()) else {
        return trimmed;
    };
    if QUOTE_PAIRS.iter().any(|&(o, c)| first == o && last == c) {
        trimmed[first.len_utf8()..trimmed.len() - last.len_utf8()].trim()
    } else {
        trimmed
    }
}

/// 清洗；结果可能为空，由调用方决定兜底
pub fn clean_answer(text: &str) -> String {
    let r = rules();
    let text = strip_wrapping_quotes(text);
    let text = r.commas.replace_all(text, "、");
    let text = r.periods.replace_all(&text, "。");
    let text = r.dots.replace_all(&text, "...");
    let text = r.ellipses.replace_all(&text, "…");
    let text = r.connective.replace(&text, "");
    let text = r.blank_lines.replace_all(text.trim(), "\n\n");
    text.trim().to_string()
}

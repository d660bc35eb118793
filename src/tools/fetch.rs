//! 网页抓取能力：fetch_url / fetch_json / read_url
//!
//! fetch_url 返回原始文本（按字符截断到 fetch_max_chars）；read_url 把 HTML 转成可读文本，
//! 正文过长时交给 LLM 摘要，摘要失败则截断。

use std::sync::OnceLock;
use std::time::Duration;

use html2text::from_read;
use regex::Regex;
use reqwest::Client;
use serde_json::{json, Value};

use crate::core::AgentError;
use crate::memory::Message;
use crate::react::Planner;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) Mafuyu/1.0";
/// 送去摘要的正文上限（字符）
const SUMMARY_INPUT_CHARS: usize = 6000;

/// HTTP 抓取器
#[derive(Clone)]
pub struct HttpFetcher {
    client: Client,
    max_chars: usize,
    summary_threshold: usize,
}

impl HttpFetcher {
    pub fn new(timeout_secs: u64, max_chars: usize, summary_threshold: usize) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            max_chars,
            summary_threshold,
        }
    }

    async fn get(&self, capability: &str, url: &str) -> Result<reqwest::Response, AgentError> {
        self.client
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| AgentError::fault(capability, e))
    }

    pub async fn fetch_url(&self, url: &str) -> Result<Value, AgentError> {
        let resp = self.get("fetch_url", url).await?;
        let status = resp.status().as_u16();
        let body = resp
            .text()
            .await
            .map_err(|e| AgentError::fault("fetch_url", e))?;
        let (content, truncated) = truncate_chars(&body, self.max_chars);
        Ok(json!({
            "url": url,
            "status": status,
            "content": content,
            "truncated": truncated,
        }))
    }

    pub async fn fetch_json(&self, url: &str) -> Result<Value, AgentError> {
        let resp = self.get("fetch_json", url).await?;
        let status = resp.status().as_u16();
        let data: Value = resp
            .json()
            .await
            .map_err(|e| AgentError::fault("fetch_json", format!("JSON parse failed: {e}")))?;
        Ok(json!({ "url": url, "status": status, "data": data }))
    }

    /// 读取网页正文；summarizer 为 None 时长文直接截断
    pub async fn read_url(&self, url: &str, summarizer: Option<&Planner>) -> Result<Value, AgentError> {
        let resp = self.get("read_url", url).await?;
        let html = resp
            .text()
            .await
            .map_err(|e| AgentError::fault("read_url", e))?;
        let title = extract_title(&html);
        let mut text = readable_text(&html);

        let total = text.chars().count();
        if total > self.summary_threshold {
            text = match summarizer {
                Some(planner) => match summarize(planner, &text).await {
                    Ok(summary) => format!("[要約]\n{summary}\n\n[元の文字数: {total}文字]"),
                    Err(e) => {
                        tracing::warn!(url = %url, error = %e, "page summary failed, truncating");
                        truncate_marked(&text, self.summary_threshold)
                    }
                },
                None => truncate_marked(&text, self.summary_threshold),
            };
        }
        Ok(json!({ "url": url, "title": title, "content": text }))
    }
}

async fn summarize(planner: &Planner, text: &str) -> Result<String, AgentError> {
    let (head, _) = truncate_chars(text, SUMMARY_INPUT_CHARS);
    let prompt = format!(
        "以下のWebページの内容を、重要なポイントを抽出して300字以内で要約せよ。\n事実のみ、簡潔に。\n\n---\n{head}\n---\n\n要約:"
    );
    planner.complete(&[Message::user(prompt)]).await
}

/// 按字符截断，返回 (内容, 是否截断)
pub fn truncate_chars(s: &str, max: usize) -> (String, bool) {
    match s.char_indices().nth(max) {
        Some((idx, _)) => (s[..idx].to_string(), true),
        None => (s.to_string(), false),
    }
}

fn truncate_marked(s: &str, max: usize) -> String {
    let (head, _) = truncate_chars(s, max);
    format!("{head}...(truncated)")
}

fn extract_title(html: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("valid regex"));
    re.captures(html)
        .and_then(|c| c.get(1))
        .map(|m| decode_entities(m.as_str().trim()))
        .unwrap_or_default()
}

/// HTML → 文本：去掉空行与行首尾空白
pub fn readable_text(html: &str) -> String {
    let raw = match from_read(html.as_bytes(), 120) {
        Ok(text) if !text.trim().is_empty() => text,
        _ => strip_tags(html),
    };
    raw.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// 去除标签（html2text 失败时的回退），同时用于搜索结果标题与摘要
pub fn strip_tags(html: &str) -> String {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"(?s)<[^>]*>").expect("valid regex"));
    let text = re.replace_all(html, "");
    decode_entities(text.split_whitespace().collect::<Vec<_>>().join(" ").as_str())
}

pub fn decode_entities(s: &str) -> String {
    s.replace("&quot;", "\"")
        .replace("&#x27;", "'")
        .replace("&#39;", "'")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}

//! 网络搜索：DuckDuckGo HTML 端点 + 正则抽取结果
//!
//! 查询预处理：去掉模型自我引用的 `search_web:` 前缀；含时效关键词时追加当前年月（YYYY年MM月）。
//! 结果为 [{title, url, snippet}]，数量受 max_results 限制。

use std::sync::OnceLock;
use std::time::Duration;

use chrono::{DateTime, Local};
use regex::Regex;
use reqwest::{Client, Url};
use serde::Serialize;
use serde_json::{json, Value};

use crate::config::SearchSection;
use crate::core::AgentError;
use crate::tools::fetch::{decode_entities, strip_tags};

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

const TIME_KEYWORDS: &[&str] = &[
    "現在",
    "今",
    "最新",
    "今日",
    "首相",
    "大統領",
    "総裁",
    "current",
    "now",
    "latest",
    "president",
    "prime minister",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// 网络搜索器
#[derive(Clone)]
pub struct WebSearch {
    client: Client,
    endpoint: String,
    region: String,
    max_results: usize,
}

impl WebSearch {
    pub fn new(cfg: &SearchSection) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .user_agent(USER_AGENT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            endpoint: cfg.endpoint.clone(),
            region: cfg.region.clone(),
            max_results: cfg.max_results,
        }
    }

    pub async fn search(&self, query: &str) -> Result<Value, AgentError> {
        let query = prepare_query(query, Local::now())?;
        tracing::info!(query = %query, "web search");
        let html = self
            .client
            .get(&self.endpoint)
            .query(&[("q", query.as_str()), ("kl", self.region.as_str())])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| AgentError::fault("search_web", e))?
            .text()
            .await
            .map_err(|e| AgentError::fault("search_web", e))?;
        let results = parse_results(&html, self.max_results);
        Ok(json!({ "query": query, "results": results }))
    }
}

/// 清洗查询；空查询或只剩自我引用前缀时报错
pub fn prepare_query(raw: &str, now: DateTime<Local>) -> Result<String, AgentError> {
    let mut query = raw.trim().to_string();
    if query.is_empty() {
        return Err(AgentError::fault("search_web", "Empty query"));
    }
    if query.contains("search_web:") {
        query = query.replace("search_web:", "").trim().to_string();
        if query.is_empty() {
            return Err(AgentError::fault("search_web", "Invalid query (self-reference)"));
        }
    }

    let lower = query.to_lowercase();
    if TIME_KEYWORDS.iter().any(|kw| lower.contains(kw)) {
        let stamp = now.format("%Y年%m月").to_string();
        if !query.contains(&stamp) {
            query = format!("{query} {stamp}");
        }
    }
    Ok(query)
}

/// 从 DuckDuckGo HTML 结果页抽取标题、链接与摘要
pub fn parse_results(html: &str, max: usize) -> Vec<SearchHit> {
    static LINK_RE: OnceLock<Regex> = OnceLock::new();
    static SNIPPET_RE: OnceLock<Regex> = OnceLock::new();
    let link_re = LINK_RE.get_or_init(|| {
        Regex::new(r#"(?s)<a[^>]*class="result__a"[^>]*href="([^"]*)"[^>]*>(.*?)</a>"#)
            .expect("valid regex")
    });
    let snippet_re = SNIPPET_RE.get_or_init(|| {
        Regex::new(r#"(?s)<a[^>]*class="result__snippet"[^>]*>(.*?)</a>"#).expect("valid regex")
    });

    let snippets: Vec<String> = snippet_re
        .captures_iter(html)
        .map(|c| strip_tags(&c[1]))
        .collect();

    link_re
        .captures_iter(html)
        .take(max)
        .enumerate()
        .map(|(i, c)| SearchHit {
            title: strip_tags(&c[2]),
            url: resolve_redirect(&decode_entities(&c[1])),
            snippet: snippets.get(i).cloned().unwrap_or_default(),
        })
        .collect()
}

/// DuckDuckGo 链接形如 `//duckduckgo.com/l/?uddg=<编码后的目标>&rut=...`，取出真实地址
fn resolve_redirect(href: &str) -> String {
    let absolute = if href.starts_with("//") {
        format!("https:{href}")
    } else {
        href.to_string()
    };
    Url::parse(&absolute)
        .ok()
        .and_then(|u| {
            u.query_pairs()
                .find(|(k, _)| k == "uddg")
                .map(|(_, v)| v.into_owned())
        })
        .unwrap_or(absolute)
}

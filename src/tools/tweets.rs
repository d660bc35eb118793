//! 本地推文库检索（search_tweets）
//!
//! 推文由外部导入到 SQLite 的 `tweets(date, text, likes, retweets)` 表；这里只做 LIKE 检索，按日期倒序。

use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OpenFlags};
use serde_json::{json, Value};

use crate::core::AgentError;

pub const DEFAULT_LIMIT: usize = 5;

#[derive(Debug, Clone)]
pub struct TweetArchive {
    db_path: PathBuf,
}

impl TweetArchive {
    pub fn new(db_path: impl AsRef<Path>) -> Self {
        Self {
            db_path: db_path.as_ref().to_path_buf(),
        }
    }

    /// 在阻塞线程池中查询
    pub async fn search(&self, query: &str, limit: usize) -> Result<Value, AgentError> {
        let db_path = self.db_path.clone();
        let query = query.to_string();
        tokio::task::spawn_blocking(move || search_blocking(&db_path, &query, limit))
            .await
            .map_err(|e| AgentError::fault("search_tweets", e))?
    }
}

fn search_blocking(db_path: &Path, query: &str, limit: usize) -> Result<Value, AgentError> {
    if !db_path.exists() {
        return Err(AgentError::fault(
            "search_tweets",
            "Tweet database not found. Has ingestion been run?",
        ));
    }
    let fault = |e: rusqlite::Error| AgentError::fault("search_tweets", e);
    let conn = Connection::open_with_flags(db_path, OpenFlags::SQLITE_OPEN_READ_ONLY).map_err(fault)?;
    let mut stmt = conn
        .prepare(
            "SELECT date, text, likes, retweets FROM tweets \
             WHERE text LIKE ?1 ORDER BY date DESC LIMIT ?2",
        )
        .map_err(fault)?;
    let pattern = format!("%{query}%");
    let limit = i64::try_from(limit).unwrap_or(i64::MAX);
    let rows = stmt
        .query_map(params![pattern, limit], |row| {
            let date: String = row.get(0)?;
            let text: String = row.get(1)?;
            let likes: Option<i64> = row.get(2)?;
            Ok(format!("[{}] {} (Fav:{})", date, text, likes.unwrap_or(0)))
        })
        .map_err(fault)?;
    let results = rows.collect::<Result<Vec<_>, _>>().map_err(fault)?;

    if results.is_empty() {
        return Ok(json!({
            "results": [],
            "summary": format!("No tweets found for '{query}'"),
        }));
    }
    Ok(json!({
        "query": query,
        "count": results.len(),
        "formatted": results.join("\n"),
        "results": results,
    }))
}

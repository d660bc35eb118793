//! 长期记忆：模型在 <memory> 标签中写下的事实，跨会话检索
//!
//! FileLongTerm 以单个 JSON 文件保存全部条目；每次写入和检索前都重新读盘，
//! 以容忍其他进程/会话的并发写入（后写者覆盖，不做跨进程锁）。

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::core::AgentError;
use crate::memory::persistence::JsonFile;

/// 单条记忆
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub content: String,
    pub timestamp: DateTime<Local>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// 长期记忆 trait：追加与检索
pub trait LongTermMemory: Send + Sync {
    /// 追加一条记忆（只追加，不去重）
    fn add(&self, content: &str, tags: &[String]) -> Result<(), AgentError>;

    /// 按查询检索，新条目优先，最多 k 条
    fn search(&self, query: &str, k: usize) -> Vec<String>;

    /// 最近 k 条
    fn recent(&self, k: usize) -> Vec<String>;
}

/// 文件实现：memory.json
pub struct FileLongTerm {
    file: JsonFile<Vec<MemoryEntry>>,
    write_lock: Mutex<()>,
}

impl FileLongTerm {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            file: JsonFile::new(path),
            write_lock: Mutex::new(()),
        }
    }

    fn entries(&self) -> Vec<MemoryEntry> {
        self.file.load_or_default()
    }
}

/// 命中规则：条目内容包含完整查询，或任一标签出现在查询中
fn matches(entry: &MemoryEntry, query: &str) -> bool {
    entry.content.contains(query) || entry.tags.iter().any(|t| query.contains(t.as_str()))
}

impl LongTermMemory for FileLongTerm {
    fn add(&self, content: &str, tags: &[String]) -> Result<(), AgentError> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let mut entries = self.entries();
        entries.push(MemoryEntry {
            content: content.to_string(),
            timestamp: Local::now(),
            tags: tags.to_vec(),
        });
        self.file.save(&entries)?;
        tracing::info!(content = %content, "memory added");
        Ok(())
    }

    fn search(&self, query: &str, k: usize) -> Vec<String> {
        self.entries()
            .into_iter()
            .rev()
            .filter(|m| matches(m, query))
            .take(k)
            .map(|m| m.content)
            .collect()
    }

    fn recent(&self, k: usize) -> Vec<String> {
        let entries = self.entries();
        let start = entries.len().saturating_sub(k);
        entries[start..].iter().map(|m| m.content.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_add_then_search_newest_first() {
        let dir = TempDir::new().unwrap();
        let store = FileLongTerm::new(dir.path().join("memory.json"));
        store.add("likes cats", &[]).unwrap();
        store.add("likes cats and dogs", &[]).unwrap();
        store.add("birthday in may", &[]).unwrap();

        let hits = store.search("cats", 5);
        assert_eq!(hits, vec!["likes cats and dogs", "likes cats"]);
        assert_eq!(store.search("cats", 1).len(), 1);
    }

    #[test]
    fn test_tag_match() {
        let dir = TempDir::new().unwrap();
        let store = FileLongTerm::new(dir.path().join("memory.json"));
        store.add("prefers tea", &["drink".to_string()]).unwrap();
        assert_eq!(store.search("what drink do I like?", 3), vec!["prefers tea"]);
    }

    #[test]
    fn test_reload_sees_other_writer() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("memory.json");
        let a = FileLongTerm::new(&path);
        let b = FileLongTerm::new(&path);
        a.add("from a", &[]).unwrap();
        b.add("from b", &[]).unwrap();
        assert_eq!(a.recent(5), vec!["from a", "from b"]);
    }
}

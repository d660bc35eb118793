//! JSON 文件持久化
//!
//! 任务状态、长期记忆、情感状态都以「单文件整体重写」的方式落盘：
//! 先写入同目录临时文件，再 rename 覆盖，读取方永远看到完整文件。

use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::core::AgentError;

/// 单个 JSON 文件：load 读取（不存在或为空时返回默认值），save 原子覆盖写入
#[derive(Debug, Clone)]
pub struct JsonFile<T> {
    path: PathBuf,
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonFile<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            _marker: PhantomData,
        }
    }

    /// 读取文件；不存在或内容为空时返回 T::default()，解析失败返回 Persistence 错误
    pub fn load(&self) -> Result<T, AgentError> {
        Ok(self.load_optional()?.unwrap_or_default())
    }

    /// 读取文件；不存在或内容为空时返回 None
    pub fn load_optional(&self) -> Result<Option<T>, AgentError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let data = std::fs::read_to_string(&self.path)?;
        if data.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&data).map(Some).map_err(|e| {
            AgentError::Persistence(format!("failed to parse {}: {}", self.path.display(), e))
        })
    }

    /// 读取文件；损坏时记录告警并回退为默认值（供容忍并发写入者的存储使用）
    pub fn load_or_default(&self) -> T {
        match self.load() {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "store unreadable, starting empty");
                T::default()
            }
        }
    }

    /// 原子写入：父目录不存在时自动创建
    pub fn save(&self, value: &T) -> Result<(), AgentError> {
        let content = serde_json::to_string_pretty(value)?;
        write_atomic(&self.path, content.as_bytes())
    }
}

/// 写入临时文件后 rename 覆盖目标；rename 失败时尽力清理临时文件
pub fn write_atomic(dest: &Path, bytes: &[u8]) -> Result<(), AgentError> {
    if let Some(parent) = dest.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let tmp = dest.with_extension(format!("tmp.{}", uuid::Uuid::new_v4().simple()));
    std::fs::write(&tmp, bytes)?;
    if let Err(e) = std::fs::rename(&tmp, dest) {
        let _ = std::fs::remove_file(&tmp);
        return Err(AgentError::Persistence(format!(
            "failed to replace {}: {}",
            dest.display(),
            e
        )));
    }
    Ok(())
}

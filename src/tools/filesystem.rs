//! 文件系统能力（全权限模式）
//!
//! 相对路径相对 base_dir（默认进程工作目录）解析，绝对路径原样使用，不做沙箱限制。

use std::path::{Path, PathBuf};

use serde_json::{json, Value};
use walkdir::WalkDir;

use crate::core::AgentError;

/// 文件系统：只负责路径解析，读写直接走 std::fs
#[derive(Debug, Clone)]
pub struct FileSystem {
    base_dir: PathBuf,
}

impl FileSystem {
    pub fn new(base_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: base_dir.as_ref().to_path_buf(),
        }
    }

    pub fn resolve(&self, path: &str) -> PathBuf {
        let p = Path::new(path);
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.base_dir.join(path.trim_start_matches("./"))
        }
    }

    pub fn list_dir(&self, path: &str) -> Result<Value, AgentError> {
        let target = self.resolve(path);
        if !target.exists() {
            return Err(AgentError::fault("list_dir", format!("Directory not found: {path}")));
        }
        if !target.is_dir() {
            return Err(AgentError::fault("list_dir", format!("Not a directory: {path}")));
        }
        let mut items = Vec::new();
        for entry in std::fs::read_dir(&target)? {
            let entry = entry?;
            let meta = entry.metadata()?;
            items.push(json!({
                "name": entry.file_name().to_string_lossy(),
                "type": if meta.is_dir() { "dir" } else { "file" },
                "size": if meta.is_file() { Some(meta.len()) } else { None },
            }));
        }
        items.sort_by(|a, b| a["name"].as_str().cmp(&b["name"].as_str()));
        Ok(json!({ "path": target.display().to_string(), "items": items }))
    }

    pub fn read_text(&self, path: &str) -> Result<Value, AgentError> {
        let target = self.resolve(path);
        if !target.exists() {
            return Err(AgentError::fault("read_text", format!("File not found: {path}")));
        }
        if !target.is_file() {
            return Err(AgentError::fault("read_text", format!("Not a file: {path}")));
        }
        let content =
            std::fs::read_to_string(&target).map_err(|e| AgentError::fault("read_text", e))?;
        Ok(json!({ "path": target.display().to_string(), "content": content }))
    }

    /// 父目录不存在时自动创建
    pub fn write_text(&self, path: &str, content: &str) -> Result<Value, AgentError> {
        let target = self.resolve(path);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).map_err(|e| AgentError::fault("write_text", e))?;
        }
        std::fs::write(&target, content).map_err(|e| AgentError::fault("write_text", e))?;
        tracing::info!(path = %target.display(), bytes = content.len(), "file written");
        Ok(json!({
            "path": target.display().to_string(),
            "written": content.chars().count(),
            "success": true,
        }))
    }

    pub fn delete_file(&self, path: &str) -> Result<Value, AgentError> {
        let target = self.resolve(path);
        if !target.exists() {
            return Err(AgentError::fault("delete_file", format!("File not found: {path}")));
        }
        if target.is_dir() {
            return Err(AgentError::fault(
                "delete_file",
                format!("Use delete_dir for directories: {path}"),
            ));
        }
        std::fs::remove_file(&target).map_err(|e| AgentError::fault("delete_file", e))?;
        Ok(json!({ "path": target.display().to_string(), "deleted": true }))
    }

    /// 递归删除目录
    pub fn delete_dir(&self, path: &str) -> Result<Value, AgentError> {
        let target = self.resolve(path);
        if !target.exists() {
            return Err(AgentError::fault("delete_dir", format!("Directory not found: {path}")));
        }
        if !target.is_dir() {
            return Err(AgentError::fault("delete_dir", format!("Not a directory: {path}")));
        }
        std::fs::remove_dir_all(&target).map_err(|e| AgentError::fault("delete_dir", e))?;
        Ok(json!({ "path": target.display().to_string(), "deleted": true }))
    }

    /// rename 失败（如跨设备）时对文件退化为复制后删除
    pub fn move_file(&self, src: &str, dst: &str) -> Result<Value, AgentError> {
        let src_path = self.resolve(src);
        let dst_path = self.resolve(dst);
        if !src_path.exists() {
            return Err(AgentError::fault("move_file", format!("Source not found: {src}")));
        }
        ensure_parent(&dst_path).map_err(|e| AgentError::fault("move_file", e))?;
        if let Err(e) = std::fs::rename(&src_path, &dst_path) {
            if !src_path.is_file() {
                return Err(AgentError::fault("move_file", e));
            }
            std::fs::copy(&src_path, &dst_path).map_err(|e| AgentError::fault("move_file", e))?;
            std::fs::remove_file(&src_path).map_err(|e| AgentError::fault("move_file", e))?;
        }
        Ok(json!({
            "src": src_path.display().to_string(),
            "dst": dst_path.display().to_string(),
            "moved": true,
        }))
    }

    /// 目录递归复制；目标目录已存在时报错
    pub fn copy_file(&self, src: &str, dst: &str) -> Result<Value, AgentError> {
        let src_path = self.resolve(src);
        let dst_path = self.resolve(dst);
        if !src_path.exists() {
            return Err(AgentError::fault("copy_file", format!("Source not found: {src}")));
        }
        ensure_parent(&dst_path).map_err(|e| AgentError::fault("copy_file", e))?;
        if src_path.is_dir() {
            if dst_path.exists() {
                return Err(AgentError::fault(
                    "copy_file",
                    format!("Destination already exists: {dst}"),
                ));
            }
            copy_tree(&src_path, &dst_path).map_err(|e| AgentError::fault("copy_file", e))?;
        } else {
            std::fs::copy(&src_path, &dst_path).map_err(|e| AgentError::fault("copy_file", e))?;
        }
        Ok(json!({
            "src": src_path.display().to_string(),
            "dst": dst_path.display().to_string(),
            "copied": true,
        }))
    }
}

fn ensure_parent(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent),
        _ => Ok(()),
    }
}

fn copy_tree(src: &Path, dst: &Path) -> Result<(), String> {
    for entry in WalkDir::new(src) {
        let entry = entry.map_err(|e| e.to_string())?;
        let rel = entry.path().strip_prefix(src).map_err(|e| e.to_string())?;
        let target = dst.join(rel);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target).map_err(|e| e.to_string())?;
        } else {
            std::fs::copy(entry.path(), &target).map_err(|e| e.to_string())?;
        }
    }
    Ok(())
}

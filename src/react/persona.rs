//! 人格：系统提示词与示例对话
//!
//! 提示词文件每次构造上下文时重新读取，编辑后无需重启；示例对话为 `[{"role", "content"}]` JSON 数组。

use std::path::{Path, PathBuf};

use crate::config::PersonaSection;
use crate::memory::Message;

const DEFAULT_SYSTEM_PROMPT: &str = "あなたは真冬です。フランクに話してください。";

#[derive(Debug, Clone)]
pub struct Persona {
    prompt_path: Option<PathBuf>,
    fallback_prompt: String,
    fewshot: Vec<Message>,
    filler: String,
    creator_names: Vec<String>,
}

impl Persona {
    pub fn load(cfg: &PersonaSection) -> Self {
        Self {
            prompt_path: Some(cfg.system_prompt_path.clone()),
            fallback_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            fewshot: load_fewshot(&cfg.fewshot_path),
            filler: cfg.filler_utterance.clone(),
            creator_names: cfg.creator_names.clone(),
        }
    }

    /// 固定提示词（不读文件）
    pub fn fixed(system_prompt: impl Into<String>, fewshot: Vec<Message>) -> Self {
        let defaults = PersonaSection::default();
        Self {
            prompt_path: None,
            fallback_prompt: system_prompt.into(),
            fewshot,
            filler: defaults.filler_utterance,
            creator_names: Vec::new(),
        }
    }

    pub fn with_creator_names(mut self, names: Vec<String>) -> Self {
        self.creator_names = names;
        self
    }

    /// 当前系统提示词：文件存在则读文件，否则用内置文本
    pub fn system_prompt(&self) -> String {
        self.prompt_path
            .as_ref()
            .and_then(|p| std::fs::read_to_string(p).ok())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| self.fallback_prompt.clone())
    }

    pub fn fewshot(&self) -> &[Message] {
        &self.fewshot
    }

    /// 清洗后为空时的兜底台词
    pub fn filler(&self) -> &str {
        &self.filler
    }

    /// `[Active User Context]` 段落；创作者名单中的用户附加角色说明
    pub fn user_context(&self, user_name: &str) -> String {
        let lower = user_name.to_lowercase();
        let is_creator = self
            .creator_names
            .iter()
            .any(|c| !c.is_empty() && lower.contains(&c.to_lowercase()));
        if is_creator {
            format!("[Active User Context] Name: {user_name} (Role: Creator/Partner).")
        } else {
            format!("[Active User Context] Name: {user_name}.")
        }
    }
}

fn load_fewshot(path: &Path) -> Vec<Message> {
    let Ok(data) = std::fs::read_to_string(path) else {
        return Vec::new();
    };
    match serde_json::from_str(&data) {
        Ok(messages) => messages,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "few-shot file unreadable, ignoring");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_files_and_fallbacks() {
        let dir = TempDir::new().unwrap();
        let cfg = PersonaSection {
            system_prompt_path: dir.path().join("system.txt"),
            fewshot_path: dir.path().join("fewshot.json"),
            ..Default::default()
        };
        let persona = Persona::load(&cfg);
        assert_eq!(persona.system_prompt(), DEFAULT_SYSTEM_PROMPT);
        assert!(persona.fewshot().is_empty());

        // 提示词热更新
        std::fs::write(&cfg.system_prompt_path, "  You are Mafuyu.\n").unwrap();
        assert_eq!(persona.system_prompt(), "You are Mafuyu.");

        std::fs::write(
            &cfg.fewshot_path,
            r#"[{"role":"user","content":"おはよ"},{"role":"assistant","content":"ん、おはよ"}]"#,
        )
        .unwrap();
        let persona = Persona::load(&cfg);
        assert_eq!(persona.fewshot().len(), 2);
    }

    #[test]
    fn test_user_context() {
        let persona = Persona::fixed("p", Vec::new()).with_creator_names(vec!["mikan".into()]);
        assert_eq!(
            persona.user_context("Mikan_dev"),
            "[Active User Context] Name: Mikan_dev (Role: Creator/Partner)."
        );
        assert_eq!(persona.user_context("bob"), "[Active User Context] Name: bob.");
    }
}

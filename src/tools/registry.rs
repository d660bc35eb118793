//! 能力注册表
//!
//! 能力集合是封闭的：CapabilityKind 枚举出全部能力，每种能力有固定的参数结构体。
//! 按名查找 → 参数绑定（serde，拒绝未知字段）→ 穷举分发；任何失败都以 `{"error": ...}` 结果返回，不向外抛出。

use std::path::Path;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use crate::config::ToolsSection;
use crate::core::AgentError;
use crate::react::Planner;
use crate::tools::fetch::HttpFetcher;
use crate::tools::filesystem::FileSystem;
use crate::tools::jobs::JobManager;
use crate::tools::python::PythonRunner;
use crate::tools::search::WebSearch;
use crate::tools::tweets::{TweetArchive, DEFAULT_LIMIT};

/// 能力种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CapabilityKind {
    ListDir,
    ReadText,
    WriteText,
    DeleteFile,
    DeleteDir,
    MoveFile,
    CopyFile,
    FetchUrl,
    FetchJson,
    ReadUrl,
    SearchWeb,
    SearchTweets,
    RunPythonCode,
    JobStart,
    JobStatus,
    JobStop,
}

impl CapabilityKind {
    pub const ALL: [CapabilityKind; 16] = [
        Self::ListDir,
        Self::ReadText,
        Self::WriteText,
        Self::DeleteFile,
        Self::DeleteDir,
        Self::MoveFile,
        Self::CopyFile,
        Self::FetchUrl,
        Self::FetchJson,
        Self::ReadUrl,
        Self::SearchWeb,
        Self::SearchTweets,
        Self::RunPythonCode,
        Self::JobStart,
        Self::JobStatus,
        Self::JobStop,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::ListDir => "list_dir",
            Self::ReadText => "read_text",
            Self::WriteText => "write_text",
            Self::DeleteFile => "delete_file",
            Self::DeleteDir => "delete_dir",
            Self::MoveFile => "move_file",
            Self::CopyFile => "copy_file",
            Self::FetchUrl => "fetch_url",
            Self::FetchJson => "fetch_json",
            Self::ReadUrl => "read_url",
            Self::SearchWeb => "search_web",
            Self::SearchTweets => "search_tweets",
            Self::RunPythonCode => "run_python_code",
            Self::JobStart => "job_start",
            Self::JobStatus => "job_status",
            Self::JobStop => "job_stop",
        }
    }

    /// 按名解析；`codex_job_*` 作为作业能力的别名
    pub fn parse(name: &str) -> Option<Self> {
        let name = name.trim();
        let canonical = name.strip_prefix("codex_").unwrap_or(name);
        Self::ALL
            .into_iter()
            .find(|k| k.name() == canonical && (canonical == name || k.is_job()))
    }

    /// 提示词中的签名
    pub fn signature(&self) -> &'static str {
        match self {
            Self::ListDir => "list_dir(path)",
            Self::ReadText => "read_text(path)",
            Self::WriteText => "write_text(path, content)",
            Self::DeleteFile => "delete_file(path)",
            Self::DeleteDir => "delete_dir(path)",
            Self::MoveFile => "move_file(src, dst)",
            Self::CopyFile => "copy_file(src, dst)",
            Self::FetchUrl => "fetch_url(url)",
            Self::FetchJson => "fetch_json(url)",
            Self::ReadUrl => "read_url(url)",
            Self::SearchWeb => "search_web(query)",
            Self::SearchTweets => "search_tweets(query, limit)",
            Self::RunPythonCode => "run_python_code(code)",
            Self::JobStart => "job_start(prompt, workdir)",
            Self::JobStatus => "job_status(job_id)",
            Self::JobStop => "job_stop(job_id)",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::ListDir => "List a directory",
            Self::ReadText => "Read a text file",
            Self::WriteText => "Write a text file (parents created)",
            Self::DeleteFile => "Delete a file",
            Self::DeleteDir => "Delete a directory recursively",
            Self::MoveFile => "Move or rename a file or directory",
            Self::CopyFile => "Copy a file or directory",
            Self::FetchUrl => "HTTP GET, raw text",
            Self::FetchJson => "HTTP GET, parsed JSON",
            Self::ReadUrl => "Read the main text of a web page",
            Self::SearchWeb => "Search the web",
            Self::SearchTweets => "Search past tweets in the local archive",
            Self::RunPythonCode => "Run a Python snippet and capture output",
            Self::JobStart => "Start a long-running coding job in the background",
            Self::JobStatus => "Job state, exit code and last log lines",
            Self::JobStop => "Stop a background job",
        }
    }

    pub fn is_job(&self) -> bool {
        matches!(self, Self::JobStart | Self::JobStatus | Self::JobStop)
    }

    /// 视为幂等、可由会话缓存结果的能力
    pub fn is_cacheable(&self) -> bool {
        matches!(self, Self::SearchWeb)
    }
}

/// 能力目录（每行一个签名 + 描述），用于系统提示词
pub fn catalogue() -> String {
    CapabilityKind::ALL
        .iter()
        .map(|k| format!("- {}: {}", k.signature(), k.description()))
        .collect::<Vec<_>>()
        .join("\n")
}

fn dot() -> String {
    ".".to_string()
}

fn default_limit() -> usize {
    DEFAULT_LIMIT
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DirArgs {
    #[serde(default = "dot")]
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PathArgs {
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WriteArgs {
    pub path: String,
    pub content: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransferArgs {
    pub src: String,
    pub dst: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UrlArgs {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct QueryArgs {
    pub query: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TweetArgs {
    pub query: String,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CodeArgs {
    pub code: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobStartArgs {
    pub prompt: String,
    #[serde(default = "dot")]
    pub workdir: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobIdArgs {
    pub job_id: String,
}

/// 绑定好参数的能力调用
#[derive(Debug, Clone)]
pub enum Capability {
    ListDir(DirArgs),
    ReadText(PathArgs),
    WriteText(WriteArgs),
    DeleteFile(PathArgs),
    DeleteDir(PathArgs),
    MoveFile(TransferArgs),
    CopyFile(TransferArgs),
    FetchUrl(UrlArgs),
    FetchJson(UrlArgs),
    ReadUrl(UrlArgs),
    SearchWeb(QueryArgs),
    SearchTweets(TweetArgs),
    RunPythonCode(CodeArgs),
    JobStart(JobStartArgs),
    JobStatus(JobIdArgs),
    JobStop(JobIdArgs),
}

impl Capability {
    /// 按能力种类绑定参数；null 视为空参数表
    pub fn bind(kind: CapabilityKind, args: Value) -> Result<Self, AgentError> {
        let args = if args.is_null() {
            Value::Object(Default::default())
        } else {
            args
        };
        use CapabilityKind as K;
        Ok(match kind {
            K::ListDir => Self::ListDir(parse_args(kind, args)?),
            K::ReadText => Self::ReadText(parse_args(kind, args)?),
            K::WriteText => Self::WriteText(parse_args(kind, args)?),
            K::DeleteFile => Self::DeleteFile(parse_args(kind, args)?),
            K::DeleteDir => Self::DeleteDir(parse_args(kind, args)?),
            K::MoveFile => Self::MoveFile(parse_args(kind, args)?),
            K::CopyFile => Self::CopyFile(parse_args(kind, args)?),
            K::FetchUrl => Self::FetchUrl(parse_args(kind, args)?),
            K::FetchJson => Self::FetchJson(parse_args(kind, args)?),
            K::ReadUrl => Self::ReadUrl(parse_args(kind, args)?),
            K::SearchWeb => Self::SearchWeb(parse_args(kind, args)?),
            K::SearchTweets => Self::SearchTweets(parse_args(kind, args)?),
            K::RunPythonCode => Self::RunPythonCode(parse_args(kind, args)?),
            K::JobStart => Self::JobStart(parse_args(kind, args)?),
            K::JobStatus => Self::JobStatus(parse_args(kind, args)?),
            K::JobStop => Self::JobStop(parse_args(kind, args)?),
        })
    }
}

fn parse_args<T: DeserializeOwned>(kind: CapabilityKind, args: Value) -> Result<T, AgentError> {
    serde_json::from_value(args).map_err(|e| AgentError::InvalidArguments {
        capability: kind.name().to_string(),
        reason: e.to_string(),
    })
}

/// 能力注册表：持有各能力的实现，并与所有调用方共享同一个作业表
pub struct CapabilityRegistry {
    fs: FileSystem,
    http: HttpFetcher,
    search: WebSearch,
    tweets: TweetArchive,
    python: PythonRunner,
    jobs: Arc<JobManager>,
    /// read_url 长文摘要使用
    summarizer: Option<Planner>,
}

impl CapabilityRegistry {
    pub fn new(
        cfg: &ToolsSection,
        fs: FileSystem,
        jobs: Arc<JobManager>,
        summarizer: Option<Planner>,
    ) -> Self {
        Self {
            fs,
            http: HttpFetcher::new(
                cfg.search.timeout_secs,
                cfg.fetch_max_chars,
                cfg.read_url_summary_threshold,
            ),
            search: WebSearch::new(&cfg.search),
            tweets: TweetArchive::new(&cfg.tweets_db),
            python: PythonRunner::new(cfg.python_command.clone(), cfg.python_timeout_secs),
            jobs,
            summarizer,
        }
    }

    /// 工作目录为 base_dir、作业日志写入 logs_dir 的注册表（无 read_url 摘要）
    pub fn with_dirs(cfg: &ToolsSection, base_dir: &Path, logs_dir: &Path) -> Self {
        let jobs = Arc::new(JobManager::new(&cfg.jobs, logs_dir));
        Self::new(cfg, FileSystem::new(base_dir), jobs, None)
    }

    pub fn jobs(&self) -> &Arc<JobManager> {
        &self.jobs
    }

    /// 名称是否对应已注册能力
    pub fn contains(&self, name: &str) -> bool {
        CapabilityKind::parse(name).is_some()
    }

    /// 查找 + 绑定 + 执行；错误交由调用方渲染
    pub async fn try_dispatch(&self, name: &str, args: Value) -> Result<Value, AgentError> {
        let kind = CapabilityKind::parse(name)
            .ok_or_else(|| AgentError::UnknownCapability(name.to_string()))?;
        let capability = Capability::bind(kind, args)?;
        self.invoke(capability).await
    }

    /// 分发契约：总是返回结构化结果，失败时为 `{"error": ...}`
    pub async fn dispatch(&self, name: &str, args: Value) -> Value {
        match self.try_dispatch(name, args).await {
            Ok(v) => v,
            Err(e) => e.to_result_json(),
        }
    }

    /// 穷举执行
    pub async fn invoke(&self, capability: Capability) -> Result<Value, AgentError> {
        match capability {
            Capability::ListDir(a) => self.fs.list_dir(&a.path),
            Capability::ReadText(a) => self.fs.read_text(&a.path),
            Capability::WriteText(a) => self.fs.write_text(&a.path, &a.content),
            Capability::DeleteFile(a) => self.fs.delete_file(&a.path),
            Capability::DeleteDir(a) => self.fs.delete_dir(&a.path),
            Capability::MoveFile(a) => self.fs.move_file(&a.src, &a.dst),
            Capability::CopyFile(a) => self.fs.copy_file(&a.src, &a.dst),
            Capability::FetchUrl(a) => self.http.fetch_url(&a.url).await,
            Capability::FetchJson(a) => self.http.fetch_json(&a.url).await,
            Capability::ReadUrl(a) => self.http.read_url(&a.url, self.summarizer.as_ref()).await,
            Capability::SearchWeb(a) => self.search.search(&a.query).await,
            Capability::SearchTweets(a) => self.tweets.search(&a.query, a.limit).await,
            Capability::RunPythonCode(a) => Ok(self.python.run(&a.code).await),
            Capability::JobStart(a) => to_value(self.jobs.start(&a.prompt, &a.workdir).await?),
            Capability::JobStatus(a) => to_value(self.jobs.status(&a.job_id).await?),
            Capability::JobStop(a) => to_value(self.jobs.stop(&a.job_id).await?),
        }
    }
}

fn to_value<T: serde::Serialize>(v: T) -> Result<Value, AgentError> {
    Ok(serde_json::to_value(v)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn registry(dir: &TempDir) -> CapabilityRegistry {
        CapabilityRegistry::with_dirs(
            &ToolsSection::default(),
            dir.path(),
            &dir.path().join("logs"),
        )
    }

    #[test]
    fn test_parse_names_and_aliases() {
        for kind in CapabilityKind::ALL {
            assert_eq!(CapabilityKind::parse(kind.name()), Some(kind));
        }
        assert_eq!(
            CapabilityKind::parse("codex_job_status"),
            Some(CapabilityKind::JobStatus)
        );
        assert_eq!(CapabilityKind::parse("codex_list_dir"), None);
        assert_eq!(CapabilityKind::parse("say"), None);
    }

    #[tokio::test]
    async fn test_unknown_capability_any_args() {
        let dir = TempDir::new().unwrap();
        let reg = registry(&dir);
        for args in [json!(null), json!({}), json!([1, 2]), json!("x"), json!({"a": 1})] {
            let v = reg.dispatch("teleport", args).await;
            assert_eq!(v, json!({"error": "Unknown capability: teleport"}));
        }
    }

    #[tokio::test]
    async fn test_invalid_arguments() {
        let dir = TempDir::new().unwrap();
        let reg = registry(&dir);
        let missing = reg.dispatch("read_text", json!({})).await;
        assert!(missing["error"]
            .as_str()
            .unwrap()
            .starts_with("Invalid arguments for read_text"));
        let extra = reg
            .dispatch("read_text", json!({"path": "a", "mode": "r"}))
            .await;
        assert!(extra["error"].as_str().unwrap().contains("unknown field"));
        let wrong_type = reg.dispatch("write_text", json!({"path": 1, "content": "x"})).await;
        assert!(wrong_type["error"].is_string());
    }

    #[tokio::test]
    async fn test_dispatch_filesystem_and_defaults() {
        let dir = TempDir::new().unwrap();
        let reg = registry(&dir);
        let v = reg
            .dispatch("write_text", json!({"path": "a.txt", "content": "hi"}))
            .await;
        assert_eq!(v["success"], true);
        let listing = reg.dispatch("list_dir", json!(null)).await;
        let names: Vec<_> = listing["items"]
            .as_array()
            .unwrap()
            .iter()
            .map(|i| i["name"].as_str().unwrap().to_string())
            .collect();
        assert!(names.contains(&"a.txt".to_string()));

        let missing = reg.dispatch("job_status", json!({"job_id": "ffff0000"})).await;
        assert_eq!(missing["error"], "Job not found: ffff0000");
    }

    #[test]
    fn test_catalogue_lists_every_capability() {
        let text = catalogue();
        assert_eq!(text.lines().count(), CapabilityKind::ALL.len());
        assert!(text.contains("job_start(prompt, workdir)"));
    }
}

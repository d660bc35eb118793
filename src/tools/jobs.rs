//! 后台作业：以子进程运行长任务（默认 codex CLI），输出写入独立日志
//!
//! JobManager 由 agent 构建时创建一次，以 Arc 共享给所有会话与任务。
//! 作业表整体由一把锁保护，每个作业另有自己的锁：同一作业的 status 与 stop 串行执行。
//! 作业完成后不会从表中移除，直到进程退出。

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Local};
use serde::Serialize;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

use crate::config::JobsSection;
use crate::core::AgentError;

/// 作业状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Running,
    Done,
}

/// job_status 的返回结构
#[derive(Debug, Clone, Serialize)]
pub struct JobStatus {
    pub job_id: String,
    pub state: JobState,
    pub exit_code: Option<i32>,
    pub last_lines: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobStarted {
    pub job_id: String,
    pub log_path: String,
    pub started: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct JobStopped {
    pub job_id: String,
    pub stopped: bool,
}

struct Job {
    child: Child,
    log_path: PathBuf,
    /// stop 时关闭；子进程持有的是它的克隆句柄
    log_file: Option<File>,
    prompt: String,
    workdir: String,
    started_at: DateTime<Local>,
}

/// 进程级作业表
pub struct JobManager {
    jobs: Mutex<HashMap<String, Arc<Mutex<Job>>>>,
    command: Vec<String>,
    logs_dir: PathBuf,
    tail_lines: usize,
    stop_grace: Duration,
}

impl JobManager {
    pub fn new(cfg: &JobsSection, logs_dir: impl AsRef<Path>) -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            command: cfg.command.clone(),
            logs_dir: logs_dir.as_ref().to_path_buf(),
            tail_lines: cfg.tail_lines,
            stop_grace: Duration::from_secs(cfg.stop_grace_secs),
        }
    }

    /// 启动作业：`command... prompt`，工作目录为 workdir，stdout/stderr 追加到 `job_<id>.log`
    pub async fn start(&self, prompt: &str, workdir: &str) -> Result<JobStarted, AgentError> {
        let (program, prefix) = self
            .command
            .split_first()
            .ok_or_else(|| AgentError::fault("job_start", "job command is not configured"))?;

        let job_id = short_id();
        std::fs::create_dir_all(&self.logs_dir)?;
        let log_path = self.logs_dir.join(format!("job_{job_id}.log"));
        let log_file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)?;

        let child = Command::new(program)
            .args(prefix)
            .arg(prompt)
            .current_dir(workdir)
            .stdin(Stdio::null())
            .stdout(Stdio::from(log_file.try_clone()?))
            .stderr(Stdio::from(log_file.try_clone()?))
            .spawn()
            .map_err(|e| AgentError::fault("job_start", e))?;

        tracing::info!(
            job_id = %job_id,
            pid = ?child.id(),
            workdir = %workdir,
            log = %log_path.display(),
            "job started"
        );

        let job = Job {
            child,
            log_path: log_path.clone(),
            log_file: Some(log_file),
            prompt: prompt.to_string(),
            workdir: workdir.to_string(),
            started_at: Local::now(),
        };
        self.jobs
            .lock()
            .await
            .insert(job_id.clone(), Arc::new(Mutex::new(job)));

        Ok(JobStarted {
            job_id,
            log_path: log_path.display().to_string(),
            started: true,
        })
    }

    /// 非阻塞查询：进程是否仍在运行、退出码、日志最后 N 行
    pub async fn status(&self, job_id: &str) -> Result<JobStatus, AgentError> {
        let job = self.get(job_id).await?;
        let mut job = job.lock().await;
        let exit = job
            .child
            .try_wait()
            .map_err(|e| AgentError::fault("job_status", e))?;
        let (state, exit_code) = match exit {
            None => (JobState::Running, None),
            Some(status) => (JobState::Done, exit_code(status)),
        };
        Ok(JobStatus {
            job_id: job_id.to_string(),
            state,
            exit_code,
            last_lines: tail_lines(&job.log_path, self.tail_lines),
        })
    }

    /// 请求优雅退出，宽限期内未退出则强制终止；无论结果如何都关闭日志句柄
    pub async fn stop(&self, job_id: &str) -> Result<JobStopped, AgentError> {
        let job = self.get(job_id).await?;
        let mut job = job.lock().await;

        let already_exited = matches!(job.child.try_wait(), Ok(Some(_)));
        if !already_exited {
            request_terminate(&mut job.child).await;
            match tokio::time::timeout(self.stop_grace, job.child.wait()).await {
                Ok(_) => {}
                Err(_) => {
                    tracing::warn!(job_id = %job_id, "job ignored terminate, killing");
                    if let Err(e) = job.child.kill().await {
                        tracing::warn!(job_id = %job_id, error = %e, "kill failed");
                    }
                }
            }
        }
        job.log_file.take();

        tracing::info!(
            job_id = %job_id,
            prompt = %job.prompt,
            workdir = %job.workdir,
            runtime_secs = (Local::now() - job.started_at).num_seconds(),
            "job stopped"
        );
        Ok(JobStopped {
            job_id: job_id.to_string(),
            stopped: true,
        })
    }

    pub async fn len(&self) -> usize {
        self.jobs.lock().await.len()
    }

    async fn get(&self, job_id: &str) -> Result<Arc<Mutex<Job>>, AgentError> {
        self.jobs
            .lock()
            .await
            .get(job_id)
            .cloned()
            .ok_or_else(|| AgentError::JobNotFound(job_id.to_string()))
    }
}

fn short_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}

/// 正常退出取退出码；被信号终止时取负的信号值
fn exit_code(status: ExitStatus) -> Option<i32> {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        status.code().or_else(|| status.signal().map(|s| -s))
    }
    #[cfg(not(unix))]
    {
        status.code()
    }
}

#[cfg(unix)]
async fn request_terminate(child: &mut Child) {
    let Some(pid) = child.id() else {
        return;
    };
    let sent = Command::new("kill")
        .arg("-TERM")
        .arg(pid.to_string())
        .status()
        .await;
    if let Err(e) = sent {
        tracing::warn!(pid, error = %e, "failed to send SIGTERM, killing instead");
        let _ = child.start_kill();
    }
}

#[cfg(not(unix))]
async fn request_terminate(child: &mut Child) {
    let _ = child.start_kill();
}

/// 从日志尾部向前读取的块大小
const TAIL_CHUNK_BYTES: u64 = 8 * 1024;
/// 单次 tail 最多读取的字节数
const TAIL_MAX_BYTES: u64 = 1024 * 1024;

/// 日志最后 n 行；从文件尾按块向前读，不读全文件。文件不可读时为空
fn tail_lines(path: &Path, n: usize) -> Vec<String> {
    if n == 0 {
        return Vec::new();
    }
    let Ok(mut file) = File::open(path) else {
        return Vec::new();
    };
    let Ok(len) = file.metadata().map(|m| m.len()) else {
        return Vec::new();
    };

    let mut start = len;
    let mut buf: Vec<u8> = Vec::new();
    while start > 0 && len - start < TAIL_MAX_BYTES {
        let step = TAIL_CHUNK_BYTES.min(start);
        start -= step;
        let mut chunk = vec![0u8; step as usize];
        if file.seek(SeekFrom::Start(start)).is_err() || file.read_exact(&mut chunk).is_err() {
            return Vec::new();
        }
        chunk.extend_from_slice(&buf);
        buf = chunk;
        if buf.iter().filter(|&&b| b == b'\n').count() > n {
            break;
        }
    }

    let text = String::from_utf8_lossy(&buf);
    let mut lines: Vec<&str> = text.lines().collect();
    // 窗口起点可能落在行中间
    if start > 0 && !lines.is_empty() {
        lines.remove(0);
    }
    let skip = lines.len().saturating_sub(n);
    lines[skip..].iter().map(|l| l.to_string()).collect()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn manager(dir: &TempDir, tail: usize) -> JobManager {
        let cfg = JobsSection {
            command: vec!["sh".to_string(), "-c".to_string()],
            tail_lines: tail,
            stop_grace_secs: 2,
        };
        JobManager::new(&cfg, dir.path().join("logs"))
    }

    async fn wait_done(jobs: &JobManager, id: &str) -> JobStatus {
        for _ in 0..100 {
            let s = jobs.status(id).await.unwrap();
            if s.state == JobState::Done {
                return s;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        panic!("job {id} did not finish");
    }

    #[test]
    fn test_tail_lines_reads_from_end() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("job.log");
        let body: String = (0..5000).map(|i| format!("line {i}\n")).collect();
        std::fs::write(&path, &body).unwrap();
        assert_eq!(tail_lines(&path, 2), vec!["line 4998", "line 4999"]);
        assert_eq!(tail_lines(&path, 0), Vec::<String>::new());

        std::fs::write(&path, "a\nb\nc").unwrap();
        assert_eq!(tail_lines(&path, 5), vec!["a", "b", "c"]);
        assert!(tail_lines(&dir.path().join("missing.log"), 3).is_empty());
    }

    #[tokio::test]
    async fn test_running_then_stop() {
        let dir = TempDir::new().unwrap();
        let jobs = manager(&dir, 80);
        let started = jobs.start("sleep 30", ".").await.unwrap();
        assert_eq!(started.job_id.len(), 8);

        let s = jobs.status(&started.job_id).await.unwrap();
        assert_eq!(s.state, JobState::Running);
        assert_eq!(s.exit_code, None);

        let stopped = jobs.stop(&started.job_id).await.unwrap();
        assert!(stopped.stopped);
        let s = jobs.status(&started.job_id).await.unwrap();
        assert_eq!(s.state, JobState::Done);
    }

    #[tokio::test]
    async fn test_exit_code_and_tail() {
        let dir = TempDir::new().unwrap();
        let jobs = manager(&dir, 2);
        let started = jobs
            .start("printf 'a\\nb\\nc\\n'; exit 3", ".")
            .await
            .unwrap();
        let s = wait_done(&jobs, &started.job_id).await;
        assert_eq!(s.exit_code, Some(3));
        assert_eq!(s.last_lines, vec!["b", "c"]);
    }

    #[tokio::test]
    async fn test_stop_after_exit_is_ok() {
        let dir = TempDir::new().unwrap();
        let jobs = manager(&dir, 80);
        let started = jobs.start("exit 0", ".").await.unwrap();
        wait_done(&jobs, &started.job_id).await;
        assert!(jobs.stop(&started.job_id).await.unwrap().stopped);
        // 作业保留在表中
        assert_eq!(jobs.len().await, 1);
    }

    #[tokio::test]
    async fn test_unknown_job() {
        let dir = TempDir::new().unwrap();
        let jobs = manager(&dir, 80);
        assert!(matches!(
            jobs.status("nope").await,
            Err(AgentError::JobNotFound(_))
        ));
        assert!(matches!(
            jobs.stop("nope").await,
            Err(AgentError::JobNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_bad_workdir_is_fault() {
        let dir = TempDir::new().unwrap();
        let jobs = manager(&dir, 80);
        let err = jobs
            .start("true", "/definitely/not/a/dir")
            .await
            .unwrap_err();
        assert!(matches!(err, AgentError::CapabilityFault { .. }));
        assert_eq!(jobs.len().await, 0);
    }
}

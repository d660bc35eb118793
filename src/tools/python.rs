//! Python 代码执行：`python -c <code>`，带超时
//!
//! 与其他能力不同，执行失败也返回 `{success: false, output, exit_code}`，供模型阅读 stderr。

use std::process::Stdio;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::process::Command;

#[derive(Debug, Clone)]
pub struct PythonRunner {
    command: String,
    timeout_secs: u64,
}

impl PythonRunner {
    pub fn new(command: impl Into<String>, timeout_secs: u64) -> Self {
        Self {
            command: command.into(),
            timeout_secs,
        }
    }

    pub async fn run(&self, code: &str) -> Value {
        let preview: String = code.chars().take(80).collect();
        tracing::info!(code = %preview, "python execute");

        let mut cmd = Command::new(&self.command);
        cmd.arg("-c")
            .arg(code)
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(
            Duration::from_secs(self.timeout_secs),
            cmd.output(),
        )
        .await
        {
            Ok(Ok(out)) => out,
            Ok(Err(e)) => return failure(format!("Python execution failed: {e}")),
            Err(_) => {
                return failure(format!(
                    "Python execution timed out after {}s",
                    self.timeout_secs
                ))
            }
        };

        let mut text = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.is_empty() {
            text.push_str(&format!("\n[STDERR]\n{stderr}"));
        }
        json!({
            "success": output.status.success(),
            "output": text,
            "exit_code": output.status.code().unwrap_or(-1),
        })
    }
}

fn failure(output: String) -> Value {
    json!({ "success": false, "output": output, "exit_code": -1 })
}

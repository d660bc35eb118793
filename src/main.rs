//! Mafuyu 命令行入口
//!
//! 初始化日志、加载配置、构建 Agent 组件，然后在 stdin 上运行行式 REPL：
//! 普通文本交给聊天编排器，`/` 开头的是命令。

use std::path::PathBuf;

use anyhow::Context;
use mafuyu::agent::{create_agent_components, AgentComponents};
use mafuyu::config::{load_config, AppConfig};
use mafuyu::react::Session;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

const HELP: &str = "コマンド:\n  /clear              会話履歴クリア\n  /initiate           真冬から話しかける\n  /task <goal>        タスク作成\n  /tick <id>          タスクを1ステップ進める\n  /note <id> <text>   タスクにメモを追加\n  /artifact <id> <p>  タスクに成果物を記録\n  /show <id>          タスク状態を表示\n  /exit               終了";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    mafuyu::observability::init();

    let cfg = load_config(None).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });
    std::fs::create_dir_all(&cfg.app.data_dir).context("Failed to create data dir")?;
    std::fs::create_dir_all(&cfg.app.logs_dir).context("Failed to create logs dir")?;

    let workspace = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let components = create_agent_components(&cfg, &workspace);
    let mut session = Session::new();

    println!("{HELP}\n");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    loop {
        stdout.write_all(b"you> ").await?;
        stdout.flush().await?;
        let Some(line) = lines.next_line().await? else {
            println!("\nまたね、オタク君♪");
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input.eq_ignore_ascii_case("/exit") {
            println!("またね、オタク君♪");
            break;
        }
        if input.starts_with('/') {
            if let Err(e) =
                run_command(&components, &mut session, &cfg.app.user_name, input).await
            {
                println!("[エラー: {e:#}]");
            }
            continue;
        }

        match components
            .chat
            .respond(&mut session, input, Some(&cfg.app.user_name), None)
            .await
        {
            Ok(reply) => println!("mafuyu> {reply}\n"),
            Err(e) => println!("[エラー: {e}]\n"),
        }
    }
    Ok(())
}

async fn run_command(
    components: &AgentComponents,
    session: &mut Session,
    user_name: &str,
    input: &str,
) -> anyhow::Result<()> {
    let (cmd, rest) = input.split_once(' ').unwrap_or((input, ""));
    let rest = rest.trim();
    let store = components.machine.store();
    match cmd.to_lowercase().as_str() {
        "/clear" => {
            session.reset();
            println!("[履歴クリアしたよ]");
        }
        "/initiate" => match components.chat.initiate(session, Some(user_name)).await? {
            Some(text) => println!("mafuyu> {text}\n"),
            None => println!("[……]"),
        },
        "/task" => {
            anyhow::ensure!(!rest.is_empty(), "usage: /task <goal>");
            let task = store.create(rest)?;
            println!("[task {} created]", task.task_id);
        }
        "/tick" => {
            let mut task = store
                .load(rest)?
                .with_context(|| format!("task not found: {rest}"))?;
            let outcome = components.machine.tick(&mut task).await?;
            println!("{}", outcome.render());
        }
        "/note" => {
            let (id, note) = rest.split_once(' ').context("usage: /note <id> <text>")?;
            let mut task = store
                .load(id)?
                .with_context(|| format!("task not found: {id}"))?;
            components.machine.add_note(&mut task, note.trim())?;
            println!("[note queued]");
        }
        "/artifact" => {
            let (id, artifact) = rest
                .split_once(' ')
                .context("usage: /artifact <id> <path>")?;
            let mut task = store
                .load(id)?
                .with_context(|| format!("task not found: {id}"))?;
            components.machine.add_artifact(&mut task, artifact.trim())?;
            println!("[artifact recorded]");
        }
        "/show" => {
            let task = store
                .load(rest)?
                .with_context(|| format!("task not found: {rest}"))?;
            println!("{}", serde_json::to_string_pretty(&task)?);
        }
        "/help" => println!("{HELP}"),
        _ => println!("[知らないコマンドだよ？]"),
    }
    Ok(())
}

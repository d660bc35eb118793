//! 标签式回合循环集成测试：Mock LLM + 临时目录中的记忆/情感/工作区

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use mafuyu::config::{ChatSection, SearchSection, ToolsSection};
use mafuyu::llm::MockLlmClient;
use mafuyu::memory::{AffectStore, FileLongTerm, LongTermMemory, Message, Role};
use mafuyu::react::{Persona, Planner, Session, TurnEvent, TurnOrchestrator};
use mafuyu::tools::{CapabilityRegistry, ToolExecutor};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::mpsc;

struct Harness {
    dir: TempDir,
    mock: Arc<MockLlmClient>,
    memory: Arc<FileLongTerm>,
    affect: Arc<AffectStore>,
    chat: TurnOrchestrator,
}

fn harness(mock: MockLlmClient, chat: ChatSection) -> Harness {
    harness_with_tools(mock, chat, ToolsSection::default())
}

fn harness_with_tools(mock: MockLlmClient, chat: ChatSection, tools: ToolsSection) -> Harness {
    let dir = TempDir::new().unwrap();
    let workspace = dir.path().join("workspace");
    std::fs::create_dir_all(&workspace).unwrap();
    let mock = Arc::new(mock);
    let planner = Planner::new(mock.clone(), 5);
    let registry = Arc::new(CapabilityRegistry::with_dirs(
        &tools,
        &workspace,
        &dir.path().join("logs"),
    ));
    let executor = ToolExecutor::new(registry, 10);
    let memory = Arc::new(FileLongTerm::new(dir.path().join("memory.json")));
    let affect = Arc::new(AffectStore::new(dir.path().join("emotion.json")));
    let persona = Persona::fixed("You are Mafuyu.", Vec::new())
        .with_creator_names(vec!["mikan".to_string()]);
    let chat = TurnOrchestrator::new(
        planner,
        executor,
        memory.clone(),
        affect.clone(),
        persona,
        chat,
    );
    Harness {
        dir,
        mock,
        memory,
        affect,
        chat,
    }
}

fn drain(mut rx: mpsc::UnboundedReceiver<TurnEvent>) -> Vec<TurnEvent> {
    let mut events = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        events.push(ev);
    }
    events
}

#[tokio::test]
async fn test_plain_answer_is_cleaned_and_recorded() {
    let h = harness(
        MockLlmClient::new(["<thought>greeting</thought>「でも、おはよ。。。」"]),
        ChatSection::default(),
    );
    let mut session = Session::new();
    let reply = h
        .chat
        .respond(&mut session, "おはよう", Some("mikan_dev"), None)
        .await
        .unwrap();
    assert_eq!(reply, "おはよ。");
    assert_eq!(
        session.history().messages(),
        &[Message::user("おはよう"), Message::assistant("おはよ。")]
    );

    let request = h.mock.request(0).unwrap();
    let system = &request[0].content;
    assert!(system.starts_with("You are Mafuyu.\n\n[Current Time] "));
    assert!(system.contains("[Active User Context] Name: mikan_dev (Role: Creator/Partner)."));
    assert_eq!(request.last().unwrap().content, "おはよう");
}

#[tokio::test]
async fn test_memory_and_emotion_inside_thought() {
    let h = harness(
        MockLlmClient::new([
            "<thought>cute<memory>User likes cats</memory><emotion>mood+5, affection+500</emotion></thought>そうなんだ",
        ]),
        ChatSection::default(),
    );
    let mut session = Session::new();
    let (tx, rx) = mpsc::unbounded_channel();
    let reply = h
        .chat
        .respond(&mut session, "猫が好き", Some("bob"), Some(&tx))
        .await
        .unwrap();
    drop(tx);
    assert_eq!(reply, "そうなんだ");

    assert_eq!(h.memory.recent(5), vec!["User likes cats".to_string()]);
    let state = h.affect.read("bob").unwrap();
    assert_eq!(state.affection, 100);
    assert_eq!(state.mood, 5);

    let events = drain(rx);
    assert!(events.contains(&TurnEvent::MemoryStored {
        content: "User likes cats".into()
    }));
    assert!(events.contains(&TurnEvent::FinalAnswer {
        text: "そうなんだ".into()
    }));
}

#[tokio::test]
async fn test_memory_outside_thought_is_ignored() {
    let h = harness(
        MockLlmClient::new(["<memory>nope</memory>ふーん"]),
        ChatSection::default(),
    );
    let mut session = Session::new();
    let reply = h
        .chat
        .respond(&mut session, "hi", Some("bob"), None)
        .await
        .unwrap();
    assert_eq!(reply, "ふーん");
    assert!(h.memory.recent(5).is_empty());
}

#[tokio::test]
async fn test_tool_call_then_answer() {
    let h = harness(
        MockLlmClient::new([
            "<thought>write it down</thought><call>write_text: memo.txt: 12:30 meeting</call>",
            "<thought>done</thought>書いといたよ",
        ]),
        ChatSection::default(),
    );
    let mut session = Session::new();
    let reply = h
        .chat
        .respond(&mut session, "メモして", None, None)
        .await
        .unwrap();
    assert_eq!(reply, "書いといたよ");
    assert_eq!(
        std::fs::read_to_string(h.dir.path().join("workspace/memo.txt")).unwrap(),
        "12:30 meeting"
    );

    let second = h.mock.request(1).unwrap();
    let n = second.len();
    assert_eq!(second[n - 2].role, Role::Assistant);
    assert!(second[n - 2].content.contains("<call>write_text"));
    assert_eq!(second[n - 1].role, Role::User);
    assert!(second[n - 1].content.starts_with("[Tool Result]\n"));
    assert!(second[n - 1].content.contains("\"written\": 13"));
    assert!(second[n - 1].content.contains("[Reflection]"));
    // 历史只记录原始输入与最终回复
    assert_eq!(session.history().len(), 2);
}

#[tokio::test]
async fn test_turn_cap_with_every_reply_calling() {
    let h = harness(
        MockLlmClient::new(Vec::<String>::new()).with_fallback("<call>list_dir: .</call>"),
        ChatSection {
            max_turns: 3,
            ..Default::default()
        },
    );
    let mut session = Session::new();
    let (tx, rx) = mpsc::unbounded_channel();
    let reply = h
        .chat
        .respond(&mut session, "見て", None, Some(&tx))
        .await
        .unwrap();
    drop(tx);
    assert_eq!(h.mock.call_count(), 3);
    assert_eq!(reply, "<call>list_dir: .</call>");
    let events = drain(rx);
    assert!(events.contains(&TurnEvent::TurnCapReached { max_turns: 3 }));
}

const SEARCH_PAGE: &str = r#"<div class="result">
<a rel="nofollow" class="result__a" href="https://tokio.rs/">Tokio</a>
<a class="result__snippet" href="https://tokio.rs/">An asynchronous runtime for Rust</a>
</div>"#;

/// 本地 HTML 搜索页，返回端点地址；每个连接计数一次
async fn serve_search_page(hits: Arc<AtomicUsize>) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            hits.fetch_add(1, Ordering::SeqCst);
            let mut request = Vec::new();
            let mut chunk = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                match stream.read(&mut chunk).await {
                    Ok(0) | Err(_) => break,
                    Ok(n) => request.extend_from_slice(&chunk[..n]),
                }
            }
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                SEARCH_PAGE.len(),
                SEARCH_PAGE
            );
            let _ = stream.write_all(response.as_bytes()).await;
            let _ = stream.shutdown().await;
        }
    });
    format!("http://{addr}/html/")
}

#[tokio::test]
async fn test_repeated_search_is_served_from_cache() {
    let hits = Arc::new(AtomicUsize::new(0));
    let endpoint = serve_search_page(hits.clone()).await;
    let tools = ToolsSection {
        search: SearchSection {
            endpoint,
            ..Default::default()
        },
        ..Default::default()
    };
    let h = harness_with_tools(
        MockLlmClient::new([
            "<call>search_web: tokio</call>",
            "<thought>もう一回</thought><call>search_web: tokio</call>",
            "tokio は Rust の非同期ランタイムだって",
        ]),
        ChatSection::default(),
        tools,
    );
    let mut session = Session::new();
    let (tx, rx) = mpsc::unbounded_channel();
    let reply = h
        .chat
        .respond(&mut session, "tokio って何？", None, Some(&tx))
        .await
        .unwrap();
    drop(tx);
    assert_eq!(reply, "tokio は Rust の非同期ランタイムだって");
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    let first_result = h.mock.request(1).unwrap().last().unwrap().content.clone();
    let cached_result = h.mock.request(2).unwrap().last().unwrap().content.clone();
    assert!(first_result.contains("https://tokio.rs/"));
    assert!(first_result.contains("An asynchronous runtime for Rust"));
    assert!(!first_result.contains("\"error\""));
    assert_eq!(first_result, cached_result);

    let events = drain(rx);
    assert!(events.contains(&TurnEvent::CacheHit {
        tool: "search_web".into()
    }));

    // 不同参数不命中缓存
    assert_eq!(session.cached_result("search_web", "rust"), None);
    assert!(session.cached_result("search_web", "tokio").is_some());
}

#[tokio::test]
async fn test_failed_search_is_cached_too() {
    let h = harness(
        MockLlmClient::new([
            "<call>search_web: </call>",
            "<call>search_web: </call>",
            "わかんなかった",
        ]),
        ChatSection::default(),
    );
    let mut session = Session::new();
    let (tx, rx) = mpsc::unbounded_channel();
    let reply = h
        .chat
        .respond(&mut session, "調べて", None, Some(&tx))
        .await
        .unwrap();
    drop(tx);
    assert_eq!(reply, "わかんなかった");

    let events = drain(rx);
    let calls = events
        .iter()
        .filter(|e| matches!(e, TurnEvent::ToolCall { .. }))
        .count();
    let observations = events
        .iter()
        .filter(|e| matches!(e, TurnEvent::Observation { .. }))
        .count();
    let hits = events
        .iter()
        .filter(|e| matches!(e, TurnEvent::CacheHit { .. }))
        .count();
    assert_eq!((calls, observations, hits), (2, 1, 1));

    // 两次反思提示中的结果一致
    let second = h.mock.request(1).unwrap();
    let third = h.mock.request(2).unwrap();
    assert_eq!(
        second.last().unwrap().content,
        third.last().unwrap().content
    );
    assert!(third.last().unwrap().content.contains("\"error\""));
}

#[tokio::test]
async fn test_empty_cleanup_uses_filler() {
    let h = harness(
        MockLlmClient::new(["<thought>...</thought>"]),
        ChatSection::default(),
    );
    let mut session = Session::new();
    let reply = h
        .chat
        .respond(&mut session, "ねえ", None, None)
        .await
        .unwrap();
    assert_eq!(reply, h.chat.persona().filler());
}

#[tokio::test]
async fn test_memory_hits_are_appended_to_user_message() {
    let h = harness(MockLlmClient::new(["うん"]), ChatSection::default());
    h.memory.add("User likes cats", &[]).unwrap();
    let mut session = Session::new();
    h.chat
        .respond(&mut session, "cats", None, None)
        .await
        .unwrap();
    let request = h.mock.request(0).unwrap();
    assert_eq!(
        request.last().unwrap().content,
        "cats\n\n\n【長期記憶 (Memory)】\n- User likes cats"
    );
    // 历史中保存原始输入
    assert_eq!(session.history().messages()[0].content, "cats");
}

#[tokio::test]
async fn test_history_beyond_window_is_summarized() {
    let h = harness(
        MockLlmClient::new(["猫の話をした", "うん"]),
        ChatSection {
            max_history: 2,
            ..Default::default()
        },
    );
    let mut session = Session::new();
    for (u, a) in [("猫飼ってる", "へえ"), ("名前はタマ", "かわいい")] {
        session.push(Message::user(u));
        session.push(Message::assistant(a));
    }

    h.chat
        .respond(&mut session, "元気？", None, None)
        .await
        .unwrap();

    let summary_request = h.mock.request(0).unwrap();
    assert_eq!(summary_request.len(), 1);
    assert!(summary_request[0]
        .content
        .contains("ユーザー: 猫飼ってる\n真冬: へえ\n"));

    let chat_request = h.mock.request(1).unwrap();
    assert!(chat_request
        .iter()
        .any(|m| m.role == Role::System && m.content == "[会話履歴の要約]\n猫の話をした"));
    // 窗口内的两条 + 新消息
    let n = chat_request.len();
    assert_eq!(chat_request[n - 3].content, "名前はタマ");
    assert_eq!(chat_request[n - 2].content, "かわいい");
}

#[tokio::test]
async fn test_summary_failure_is_not_fatal() {
    let mock = MockLlmClient::new(Vec::<String>::new()).with_fallback("やあ");
    mock.push_failure("model offline");
    let h = harness(
        mock,
        ChatSection {
            max_history: 1,
            ..Default::default()
        },
    );
    let mut session = Session::new();
    session.push(Message::user("old"));
    session.push(Message::assistant("older reply"));

    let reply = h
        .chat
        .respond(&mut session, "hi", None, None)
        .await
        .unwrap();
    assert_eq!(reply, "やあ");
    let chat_request = h.mock.request(1).unwrap();
    assert!(!chat_request
        .iter()
        .any(|m| m.content.starts_with("[会話履歴の要約]")));
}

#[tokio::test]
async fn test_llm_failure_propagates_without_touching_history() {
    let mock = MockLlmClient::new(Vec::<String>::new());
    mock.push_failure("connection refused");
    let h = harness(mock, ChatSection::default());
    let mut session = Session::new();
    let err = h
        .chat
        .respond(&mut session, "hi", None, None)
        .await
        .unwrap_err();
    assert!(err.is_llm_failure());
    assert!(session.history().is_empty());
}

#[tokio::test]
async fn test_initiate_silent_and_spoken() {
    let h = harness(
        MockLlmClient::new(["   ", "<thought>bored<emotion>energy-5</emotion></thought>\"ねえ、暇？\""]),
        ChatSection::default(),
    );
    let mut session = Session::new();

    assert_eq!(h.chat.initiate(&mut session, Some("bob")).await.unwrap(), None);
    assert!(session.history().is_empty());

    let spoken = h.chat.initiate(&mut session, Some("bob")).await.unwrap();
    assert_eq!(spoken.as_deref(), Some("ねえ、暇？"));
    assert_eq!(
        session.history().messages(),
        &[Message::assistant("ねえ、暇？")]
    );
    assert_eq!(h.affect.read("bob").unwrap().energy, 75);
}

//! 标签式回合循环
//!
//! 构造上下文（人格 + 时间 + 情感 + 示例对话 + 历史摘要 + 最近窗口 + 带记忆片段的用户消息），
//! 然后最多 max_turns 轮：调用模型 → 解析标签 → 写记忆/情感 → 有 `<call>` 则执行能力并追加反思提示，
//! 否则清洗文本作为最终回复。到达回合上限时以最后一次输出结束，不报错。
//! 可选 event_tx：向前端推送 TurnStart / Thought / ToolCall / Observation / FinalAnswer 等过程事件。

use std::sync::Arc;

use chrono::Local;
use serde_json::{json, Value};
use tokio::sync::mpsc::UnboundedSender;

use crate::config::ChatSection;
use crate::core::AgentError;
use crate::memory::{AffectStore, LongTermMemory, Message, Role};
use crate::react::cleanup::{clean_answer, strip_wrapping_quotes};
use crate::react::events::TurnEvent;
use crate::react::persona::Persona;
use crate::react::planner::Planner;
use crate::react::session::Session;
use crate::react::tags::{parse_turn, CallSegment, ParsedTurn};
use crate::tools::fetch::truncate_chars;
use crate::tools::{CapabilityKind, ToolExecutor};

/// Observation 预览最大字符数
const OBSERVATION_PREVIEW_CHARS: usize = 200;

const INITIATE_PROMPT: &str = "\n今、ユーザーは何も言っていない。\n\
あなた（真冬）から話しかけたいことがあれば、一言だけ言って。\n\
特に何もなければ、何も出力しないで（空欄で）。\n";

fn send_event(tx: Option<&UnboundedSender<TurnEvent>>, ev: TurnEvent) {
    if let Some(t) = tx {
        let _ = t.send(ev);
    }
}

/// 反思提示：原始能力结果 + 判断是否足够回答
fn reflection_prompt(result: &str) -> String {
    format!(
        "[Tool Result]\n{result}\n\n[Reflection]\n\
         上記の結果でユーザーの質問に十分答えられるか判断せよ。\n\
         - 十分なら、そのまま回答を生成してください（ツール呼び出し不要）。\n\
         - 不足なら、追加のツール呼び出しを行ってください。"
    )
}

fn summary_prompt(history_text: &str) -> String {
    format!(
        "以下の会話履歴を、重要なポイント（話題、約束、ユーザーの好み等）を抽出して100字以内で要約せよ。\n\n\
         {history_text}\n\n要約:"
    )
}

/// 把 `<call>` 的参数文本按能力约定转成参数表
///
/// 未知能力名：尝试按 JSON 解析，失败则为 `{"arg": text}`（随后由注册表报 Unknown capability）。
pub fn args_from_call_text(name: &str, text: &str) -> Value {
    let text = text.trim();
    let Some(kind) = CapabilityKind::parse(name) else {
        return serde_json::from_str(text).unwrap_or_else(|_| json!({ "arg": text }));
    };
    use CapabilityKind as K;
    match kind {
        K::SearchWeb | K::SearchTweets => json!({ "query": text }),
        K::FetchUrl | K::FetchJson | K::ReadUrl => json!({ "url": text }),
        K::ReadText | K::DeleteFile | K::DeleteDir => json!({ "path": text }),
        K::ListDir => json!({ "path": if text.is_empty() { "." } else { text } }),
        K::WriteText => match text.split_once(':') {
            Some((path, content)) => json!({ "path": path.trim(), "content": content.trim() }),
            None => json!({ "path": text, "content": "" }),
        },
        K::MoveFile | K::CopyFile => {
            if let Ok(v @ Value::Object(_)) = serde_json::from_str::<Value>(text) {
                return v;
            }
            match text.split_once(':') {
                Some((src, dst)) => json!({ "src": src.trim(), "dst": dst.trim() }),
                None => json!({ "src": text }),
            }
        }
        K::RunPythonCode => json!({ "code": text }),
        K::JobStart => json!({ "prompt": text }),
        K::JobStatus | K::JobStop => json!({ "job_id": text }),
    }
}

/// 人格对话编排器：一次 respond 对应用户的一条消息
pub struct TurnOrchestrator {
    planner: Planner,
    executor: ToolExecutor,
    memory: Arc<dyn LongTermMemory>,
    affect: Arc<AffectStore>,
    persona: Persona,
    chat: ChatSection,
}

impl TurnOrchestrator {
    pub fn new(
        planner: Planner,
        executor: ToolExecutor,
        memory: Arc<dyn LongTermMemory>,
        affect: Arc<AffectStore>,
        persona: Persona,
        chat: ChatSection,
    ) -> Self {
        Self {
            planner,
            executor,
            memory,
            affect,
            persona,
            chat,
        }
    }

    pub fn persona(&self) -> &Persona {
        &self.persona
    }

    /// 处理一条用户消息，返回清洗后的回复并写入会话历史
    ///
    /// 只有语言能力本身的故障会返回 Err；记忆、情感、能力执行的失败都不会中断回合。
    pub async fn respond(
        &self,
        session: &mut Session,
        user_input: &str,
        user_name: Option<&str>,
        event_tx: Option<&UnboundedSender<TurnEvent>>,
    ) -> Result<String, AgentError> {
        let mut messages = self.build_context(session, user_input, user_name).await;
        let mut last_text = String::new();
        let mut final_turn: Option<ParsedTurn> = None;

        for turn in 0..self.chat.max_turns {
            send_event(
                event_tx,
                TurnEvent::TurnStart {
                    turn: turn + 1,
                    max_turns: self.chat.max_turns,
                },
            );
            let reply = self.planner.complete(&messages).await?;
            let parsed = parse_turn(&reply);
            self.apply_thought(&parsed, user_name, event_tx);
            last_text = reply;

            let Some(call) = parsed.call.clone() else {
                final_turn = Some(parsed);
                break;
            };
            let result = self.run_call(session, &call, event_tx).await;
            messages.push(Message::assistant(last_text.clone()));
            messages.push(Message::user(reflection_prompt(&result)));
        }

        let answer = match final_turn {
            Some(parsed) => {
                let cleaned = clean_answer(&parsed.answer);
                if cleaned.is_empty() {
                    self.persona.filler().to_string()
                } else {
                    cleaned
                }
            }
            None => {
                tracing::warn!(max_turns = self.chat.max_turns, "turn cap reached");
                send_event(
                    event_tx,
                    TurnEvent::TurnCapReached {
                        max_turns: self.chat.max_turns,
                    },
                );
                self.fallback_answer(&last_text)
            }
        };

        session.push(Message::user(user_input));
        session.push(Message::assistant(answer.clone()));
        send_event(event_tx, TurnEvent::FinalAnswer { text: answer.clone() });
        Ok(answer)
    }

    /// 主动搭话：模型不想说话（输出为空）时返回 None
    pub async fn initiate(
        &self,
        session: &mut Session,
        user_name: Option<&str>,
    ) -> Result<Option<String>, AgentError> {
        let mut system = self.persona.system_prompt();
        if let Some(block) = user_name.and_then(|u| self.affect_block(u)) {
            system.push_str("\n\n");
            system.push_str(&block);
        }
        let mut messages = vec![Message::system(system)];
        messages.extend(self.persona.fewshot().iter().cloned());
        messages.extend(session.history().recent(self.chat.max_history).iter().cloned());
        messages.push(Message::user(INITIATE_PROMPT));

        let reply = self.planner.complete(&messages).await?;
        let parsed = parse_turn(&reply);
        if let Some(user) = user_name {
            self.apply_emotion(user, &parsed, None);
        }
        let text = strip_wrapping_quotes(&parsed.answer).to_string();
        if text.is_empty() {
            return Ok(None);
        }
        session.push(Message::assistant(text.clone()));
        Ok(Some(text))
    }

    async fn build_context(
        &self,
        session: &mut Session,
        user_input: &str,
        user_name: Option<&str>,
    ) -> Vec<Message> {
        let mut system = self.persona.system_prompt();
        let now = Local::now().format("%Y-%m-%d %H:%M (%A)");
        system.push_str(&format!("\n\n[Current Time] {now}"));
        if let Some(user) = user_name {
            if let Some(block) = self.affect_block(user) {
                system.push_str("\n\n");
                system.push_str(&block);
            }
            system.push_str("\n\n");
            system.push_str(&self.persona.user_context(user));
        }

        let mut messages = vec![Message::system(system)];
        messages.extend(self.persona.fewshot().iter().cloned());

        let summary = self.compressed_history(session).await;
        if !summary.is_empty() {
            messages.push(Message::system(format!("[会話履歴の要約]\n{summary}")));
        }
        messages.extend(session.history().recent(self.chat.max_history).iter().cloned());

        let hits = self.memory.search(user_input, self.chat.memory_hits);
        let user_content = if hits.is_empty() {
            user_input.to_string()
        } else {
            let lines: Vec<String> = hits.iter().map(|m| format!("- {m}")).collect();
            format!("{user_input}\n\n\n【長期記憶 (Memory)】\n{}", lines.join("\n"))
        };
        messages.push(Message::user(user_content));
        messages
    }

    /// 窗口外历史的摘要；同一被挤出长度只生成一次，失败时为空
    async fn compressed_history(&self, session: &mut Session) -> String {
        let older = session.history().older_than(self.chat.max_history);
        if older.is_empty() {
            return String::new();
        }
        let dropped_len = older.len();
        if let Some(cached) = session.cached_summary(dropped_len) {
            return cached.to_string();
        }

        let start = older.len().saturating_sub(self.chat.summary_source_messages);
        let history_text: String = older[start..]
            .iter()
            .map(|m| {
                let speaker = if m.role == Role::User { "ユーザー" } else { "真冬" };
                let (content, _) = truncate_chars(&m.content, self.chat.summary_message_chars);
                format!("{speaker}: {content}\n")
            })
            .collect();
        if history_text.trim().is_empty() {
            return String::new();
        }

        match self
            .planner
            .complete(&[Message::user(summary_prompt(&history_text))])
            .await
        {
            Ok(summary) => {
                tracing::info!(dropped = dropped_len, "history compressed");
                session.cache_summary(dropped_len, summary.clone());
                summary
            }
            Err(e) => {
                tracing::warn!(error = %e, "history compression failed");
                String::new()
            }
        }
    }

    fn affect_block(&self, user: &str) -> Option<String> {
        match self.affect.prompt_text(user) {
            Ok(text) => Some(text),
            Err(e) => {
                tracing::warn!(user = %user, error = %e, "affect state unavailable");
                None
            }
        }
    }

    /// thought 内的 memory / emotion 生效
    fn apply_thought(
        &self,
        parsed: &ParsedTurn,
        user_name: Option<&str>,
        event_tx: Option<&UnboundedSender<TurnEvent>>,
    ) {
        let Some(thought) = &parsed.thought else {
            return;
        };
        tracing::debug!(thought = %thought, "thought");
        send_event(event_tx, TurnEvent::Thought { text: thought.clone() });

        if let Some(content) = &parsed.memory {
            match self.memory.add(content, &[]) {
                Ok(()) => send_event(
                    event_tx,
                    TurnEvent::MemoryStored {
                        content: content.clone(),
                    },
                ),
                Err(e) => tracing::warn!(error = %e, "memory write failed"),
            }
        }
        if let Some(user) = user_name {
            self.apply_emotion(user, parsed, event_tx);
        }
    }

    fn apply_emotion(
        &self,
        user: &str,
        parsed: &ParsedTurn,
        event_tx: Option<&UnboundedSender<TurnEvent>>,
    ) {
        for delta in &parsed.emotion {
            match self.affect.update(user, *delta) {
                Ok(state) => send_event(
                    event_tx,
                    TurnEvent::AffectApplied {
                        affection: state.affection,
                        mood: state.mood,
                        energy: state.energy,
                    },
                ),
                Err(e) => tracing::warn!(user = %user, error = %e, "affect update failed"),
            }
        }
    }

    /// 执行 `<call>`；可缓存能力按 (能力名, 原始参数文本) 命中会话缓存
    async fn run_call(
        &self,
        session: &mut Session,
        call: &CallSegment,
        event_tx: Option<&UnboundedSender<TurnEvent>>,
    ) -> String {
        send_event(
            event_tx,
            TurnEvent::ToolCall {
                tool: call.name.clone(),
                args: call.args_text.clone(),
            },
        );
        let cacheable = CapabilityKind::parse(&call.name).is_some_and(|k| k.is_cacheable());
        if cacheable {
            if let Some(hit) = session.cached_result(&call.name, &call.args_text) {
                tracing::info!(tool = %call.name, "tool cache hit");
                send_event(
                    event_tx,
                    TurnEvent::CacheHit {
                        tool: call.name.clone(),
                    },
                );
                return hit.to_string();
            }
        }

        let args = args_from_call_text(&call.name, &call.args_text);
        let rendered = self.executor.execute(&call.name, args).await;
        let (head, truncated) = truncate_chars(&rendered, self.chat.tool_result_max_chars);
        let result = if truncated {
            format!("{head}...(truncated)")
        } else {
            head
        };
        let (preview, _) = truncate_chars(&result, OBSERVATION_PREVIEW_CHARS);
        send_event(
            event_tx,
            TurnEvent::Observation {
                tool: call.name.clone(),
                preview,
            },
        );
        if cacheable {
            session.cache_result(&call.name, &call.args_text, result.clone());
        }
        result
    }

    /// 回合上限：用最后一次输出（去标签清洗；清洗后为空则用原文，仍为空则用兜底台词）
    fn fallback_answer(&self, last_text: &str) -> String {
        let cleaned = clean_answer(&parse_turn(last_text).answer);
        if !cleaned.is_empty() {
            return cleaned;
        }
        let raw = last_text.trim();
        if raw.is_empty() {
            self.persona.filler().to_string()
        } else {
            raw.to_string()
        }
    }
}

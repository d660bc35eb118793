//! 标签式小语言解析：`<thought>`、`<memory>`、`<emotion>`、`<call>`
//!
//! 词法：只识别这四种标签的开/闭（大小写敏感），其余全部是文本。
//! 语法（单遍栈式，线性时间）：
//! - 元素 = 开标签 子节点* 同名闭标签；
//! - 已打开的同名标签内再次出现的开标签按文本处理（同类不嵌套）；
//! - 外层标签的闭标签先把内层未闭合的开标签退化为文本，再闭合外层；
//! - 没有对应开标签的闭标签按文本处理；
//! - 输入结束时仍未闭合的开标签按文本处理，其内容并入外层。
//!
//! 语义：第一个 thought 生效，memory / emotion 只在该 thought 内生效；
//! call 取顶层或 thought 内的第一个；其余顶层文本拼成最终回复。

use std::sync::OnceLock;

use regex::Regex;

use crate::memory::{AffectDelta, AffectParam};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKind {
    Thought,
    Memory,
    Emotion,
    Call,
}

impl TagKind {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "thought" => Some(Self::Thought),
            "memory" => Some(Self::Memory),
            "emotion" => Some(Self::Emotion),
            "call" => Some(Self::Call),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Text { start: usize, end: usize },
    Open { kind: TagKind, start: usize, end: usize },
    Close { kind: TagKind, start: usize, end: usize },
}

impl Token {
    fn span(&self) -> (usize, usize) {
        match *self {
            Token::Text { start, end }
            | Token::Open { start, end, .. }
            | Token::Close { start, end, .. } => (start, end),
        }
    }
}

fn tokenize(src: &str) -> Vec<Token> {
    static TAG_RE: OnceLock<Regex> = OnceLock::new();
    let re = TAG_RE
        .get_or_init(|| Regex::new(r"<(/?)(thought|memory|emotion|call)>").expect("valid regex"));

    let mut tokens = Vec::new();
    let mut last = 0;
    for caps in re.captures_iter(src) {
        let (Some(whole), Some(slash), Some(name)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        let Some(kind) = TagKind::parse(name.as_str()) else {
            continue;
        };
        if whole.start() > last {
            tokens.push(Token::Text {
                start: last,
                end: whole.start(),
            });
        }
        let (start, end) = (whole.start(), whole.end());
        tokens.push(if slash.as_str().is_empty() {
            Token::Open { kind, start, end }
        } else {
            Token::Close { kind, start, end }
        });
        last = end;
    }
    if last < src.len() {
        tokens.push(Token::Text {
            start: last,
            end: src.len(),
        });
    }
    tokens
}

/// 语法树节点；文本以源串区间表示
#[derive(Debug, Clone, PartialEq)]
enum Node {
    Text { start: usize, end: usize },
    Element {
        kind: TagKind,
        /// 开闭标签之间的源串区间
        inner: (usize, usize),
        children: Vec<Node>,
    },
}

/// 尚未闭合的元素
struct Frame {
    kind: TagKind,
    open_span: (usize, usize),
    children: Vec<Node>,
}

/// 单遍栈式解析，每个 token 只入栈出栈一次
fn parse_tree(tokens: &[Token]) -> Vec<Node> {
    let mut root = Vec::new();
    let mut stack: Vec<Frame> = Vec::new();

    for token in tokens {
        match *token {
            Token::Open { kind, start, end } if !stack.iter().any(|f| f.kind == kind) => {
                stack.push(Frame {
                    kind,
                    open_span: (start, end),
                    children: Vec::new(),
                });
            }
            Token::Close { kind, start, .. } if stack.iter().any(|f| f.kind == kind) => {
                // 内层未闭合的开标签退化为文本，其子节点并入外层
                while stack.last().is_some_and(|f| f.kind != kind) {
                    if let Some(frame) = stack.pop() {
                        unwind(frame, current(&mut stack, &mut root));
                    }
                }
                if let Some(frame) = stack.pop() {
                    let element = Node::Element {
                        kind,
                        inner: (frame.open_span.1, start),
                        children: frame.children,
                    };
                    current(&mut stack, &mut root).push(element);
                }
            }
            // 同类嵌套的开标签、无对应开标签的闭标签、普通文本
            _ => {
                let (start, end) = token.span();
                current(&mut stack, &mut root).push(Node::Text { start, end });
            }
        }
    }
    while let Some(frame) = stack.pop() {
        unwind(frame, current(&mut stack, &mut root));
    }
    root
}

fn current<'a>(stack: &'a mut [Frame], root: &'a mut Vec<Node>) -> &'a mut Vec<Node> {
    match stack.last_mut() {
        Some(frame) => &mut frame.children,
        None => root,
    }
}

fn unwind(mut frame: Frame, parent: &mut Vec<Node>) {
    let (start, end) = frame.open_span;
    parent.push(Node::Text { start, end });
    parent.append(&mut frame.children);
}

/// `<call>name: argument-text</call>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSegment {
    pub name: String,
    pub args_text: String,
}

impl CallSegment {
    /// 第一个冒号前为能力名；没有冒号时整体为能力名、参数为空
    fn parse(body: &str) -> Option<Self> {
        let (name, args) = match body.split_once(':') {
            Some((name, args)) => (name.trim(), args.trim()),
            None => (body.trim(), ""),
        };
        if name.is_empty() {
            return None;
        }
        Some(Self {
            name: name.to_string(),
            args_text: args.to_string(),
        })
    }
}

/// 一次模型回复的解析结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedTurn {
    pub thought: Option<String>,
    pub memory: Option<String>,
    pub emotion: Vec<AffectDelta>,
    pub call: Option<CallSegment>,
    /// 去掉所有已识别元素后的顶层文本（未清洗）
    pub answer: String,
}

pub fn parse_turn(src: &str) -> ParsedTurn {
    let tokens = tokenize(src);
    let tree = parse_tree(&tokens);
    let text_of = |(start, end): (usize, usize)| src[start..end].trim().to_string();

    let mut turn = ParsedTurn::default();
    let mut answer = String::new();

    for node in &tree {
        match node {
            Node::Text { start, end } => answer.push_str(&src[*start..*end]),
            Node::Element {
                kind: TagKind::Thought,
                inner,
                children,
            } => {
                if turn.thought.is_some() {
                    continue;
                }
                turn.thought = Some(text_of(*inner));
                for child in children {
                    let Node::Element { kind, inner, .. } = child else {
                        continue;
                    };
                    match kind {
                        TagKind::Memory if turn.memory.is_none() => {
                            turn.memory = Some(text_of(*inner)).filter(|m| !m.is_empty());
                        }
                        TagKind::Emotion if turn.emotion.is_empty() => {
                            turn.emotion = parse_emotion(&src[inner.0..inner.1]);
                        }
                        TagKind::Call if turn.call.is_none() => {
                            turn.call = CallSegment::parse(&src[inner.0..inner.1]);
                        }
                        _ => {}
                    }
                }
            }
            Node::Element {
                kind: TagKind::Call,
                inner,
                ..
            } => {
                if turn.call.is_none() {
                    turn.call = CallSegment::parse(&src[inner.0..inner.1]);
                }
            }
            // thought 外的 memory / emotion 只剥离，不生效
            Node::Element { .. } => {}
        }
    }
    turn.answer = answer;
    turn
}

/// 解析 `param±N`（逗号或空白分隔）；数值溢出时取最大值，由情感存储夹紧
pub fn parse_emotion(text: &str) -> Vec<AffectDelta> {
    static EMO_RE: OnceLock<Regex> = OnceLock::new();
    let re = EMO_RE.get_or_init(|| {
        Regex::new(r"(?i)(affection|mood|energy)\s*([+-])\s*(\d+)").expect("valid regex")
    });
    re.captures_iter(text)
        .filter_map(|c| {
            let param = AffectParam::parse(&c[1])?;
            let magnitude = c[3].parse::<i64>().unwrap_or(i64::MAX);
            let amount = if &c[2] == "-" { -magnitude } else { magnitude };
            Some(AffectDelta::single(param, amount))
        })
        .collect()
}

//! 认知层：结构化决策（抽取 / 修复 / Planner）与人格对话的标签式回合循环

pub mod cleanup;
pub mod decision;
pub mod events;
pub mod extract;
pub mod loop_;
pub mod persona;
pub mod planner;
pub mod repair;
pub mod session;
pub mod tags;

pub use cleanup::clean_answer;
pub use decision::{Action, Decision};
pub use events::TurnEvent;
pub use extract::extract_json;
pub use loop_::{args_from_call_text, TurnOrchestrator};
pub use persona::Persona;
pub use planner::Planner;
pub use session::Session;
pub use tags::{parse_turn, ParsedTurn};

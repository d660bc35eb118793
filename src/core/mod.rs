//! 核心层：错误类型、任务状态与持久化、任务状态机

pub mod error;
pub mod machine;
pub mod state;

pub use error::AgentError;
pub use machine::{AgentMachine, TickOutcome};
pub use state::{AgentTask, HistoryEntry, HistoryRole, TaskStore};

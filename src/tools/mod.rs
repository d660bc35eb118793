//! 能力层：封闭能力集合、参数绑定与分发、执行器、后台作业

pub mod executor;
pub mod fetch;
pub mod filesystem;
pub mod jobs;
pub mod python;
pub mod registry;
pub mod search;
pub mod tweets;

pub use executor::ToolExecutor;
pub use filesystem::FileSystem;
pub use jobs::{JobManager, JobState, JobStatus};
pub use registry::{catalogue, Capability, CapabilityKind, CapabilityRegistry};

//! 多agent编排核心：调度器、并行分发器与工作流状态机

pub mod dispatcher;
pub mod scheduler;
pub mod workflow;

pub use dispatcher::{ParallelDispatcher, TaskOutcome, TaskWorker};
pub use scheduler::{SchedulerStats, TaskScheduler};
pub use workflow::{WorkflowEvent, WorkflowMachine, WorkflowMode, WorkflowStage};

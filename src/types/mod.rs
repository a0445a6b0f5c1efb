pub mod document;
pub mod message;
pub mod state;
pub mod task;

pub use document::{RequestContext, RetrievedDocument};
pub use message::{Message, Role};
pub use state::{AgentState, ControllerState, WorkerReport};
pub use task::{Task, TaskResult, TaskStatus};

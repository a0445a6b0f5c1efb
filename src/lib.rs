pub mod agents;
pub mod cli;
pub mod config;
pub mod error;
pub mod i18n;
pub mod knowledge;
pub mod llm;
pub mod orchestrator;
pub mod session;
pub mod types;

// Re-export commonly used types
pub use agents::{APOLOGY_MESSAGE, ControllerAgent, Coordinator, RagAgent, Specialization, WorkerAgent};
pub use config::Config;
pub use error::{AgentError, AgentResult};
pub use session::launch;

pub mod controller;
pub mod coordinator;
pub mod prompt;
pub mod rag;
pub mod specialization;
pub mod worker;

pub use controller::{APOLOGY_MESSAGE, ControllerAgent};
pub use coordinator::Coordinator;
pub use prompt::PromptBuilder;
pub use rag::RagAgent;
pub use specialization::Specialization;
pub use worker::WorkerAgent;

pub mod client;
pub mod generation;

pub use client::LLMClient;
pub use generation::GenerationService;

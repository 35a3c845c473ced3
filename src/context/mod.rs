//! Token estimation and context window management

pub mod counter;
pub mod window;

pub use counter::TokenCounter;
pub use window::{ContextWindow, Prompt};

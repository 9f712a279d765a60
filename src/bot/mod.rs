//! Bot module - Gemini-backed chat plus the command surface around it.

pub mod commands;
pub mod gemini;
pub mod handlers;
pub mod responder;
pub mod storage;


pub use commands::Command;
pub use gemini::{ApiError, GeminiClient};
pub use handlers::BotState;
pub use responder::Responder;
pub use storage::{BanStore, HistoryStore, Turn};

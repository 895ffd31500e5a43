pub mod app;
pub mod chat;
pub mod cli;
pub mod constants;
pub mod models;
pub mod runtime;
pub mod session;
pub mod tui;
pub mod utils;

#[cfg(test)]
mod test_support;

pub use app::{load_config, Config};
pub use chat::Orchestrator;
pub use models::{Completer, OpenRouterClient};
pub use tui::run_ui;
pub use utils::ChorusError;

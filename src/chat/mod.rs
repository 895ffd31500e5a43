// Gateway module for chat - follows the Train Station Pattern
// All external access must go through this gateway

// Private submodules - not directly accessible from outside
mod orchestrator;
mod reveal;
mod sink;
mod turn;

// Public re-exports - the ONLY way to access chat functionality
pub use orchestrator::{Orchestrator, TurnEvent};
pub use reveal::{spawn_reveal, Reveal, RevealHandle, RevealSettings};
pub use sink::{HistorySink, PersistOutcome};
pub use turn::{EntryState, PromptTurn, ResponseEntry, TurnId};

/// Session management module - Gateway

mod backend;
mod identity;
mod local;
mod state;
mod store;
mod supabase;

pub use backend::HistoryStore;
pub use identity::{AuthSession, AuthSubscription, Identity};
pub use local::LocalHistoryStore;
pub use state::{SessionState, StoredTokens};
pub use store::{HistoryRecord, NewHistoryRecord, SessionStore, StoredResponse};
pub use supabase::{SignUpOutcome, SupabaseStore};

#[cfg(test)]
pub use store::MockSessionStore;

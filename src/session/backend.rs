use std::sync::Arc;

use tracing::{info, warn};

use super::local::LocalHistoryStore;
use super::state::SessionState;
use super::store::SessionStore;
use super::supabase::SupabaseStore;
use crate::app::{HistoryBackend, HistoryConfig};
use crate::utils::Result;

/// The history store selected by configuration
#[derive(Clone)]
pub enum HistoryStore {
    Supabase(Arc<SupabaseStore>),
    Local(Arc<LocalHistoryStore>),
    Disabled,
}

impl HistoryStore {
    /// Build the configured store. A hosted backend without credentials
    /// degrades to no history rather than failing startup.
    pub fn from_config(config: &HistoryConfig) -> Result<Self> {
        match config.backend {
            HistoryBackend::Disabled => Ok(Self::Disabled),
            HistoryBackend::Local => {
                let store = LocalHistoryStore::new(&config.local_dir, &config.local_profile)?;
                info!(dir = %config.local_dir.display(), "using local history");
                Ok(Self::Local(Arc::new(store)))
            }
            HistoryBackend::Supabase => {
                let Some((url, anon_key)) = config.supabase_credentials() else {
                    warn!(
                        "Supabase URL or anon key not set ({} / {}); history disabled",
                        config.supabase_url_env, config.supabase_anon_key_env
                    );
                    return Ok(Self::Disabled);
                };
                let mut store = SupabaseStore::new(&url, &anon_key, &config.table)?;
                match SessionState::session_file() {
                    Ok(path) => store = store.with_state_file(path),
                    Err(e) => warn!("session tokens will not persist: {}", e),
                }
                Ok(Self::Supabase(Arc::new(store)))
            }
        }
    }

    pub fn as_store(&self) -> Option<Arc<dyn SessionStore>> {
        match self {
            Self::Supabase(store) => Some(Arc::clone(store) as Arc<dyn SessionStore>),
            Self::Local(store) => Some(Arc::clone(store) as Arc<dyn SessionStore>),
            Self::Disabled => None,
        }
    }

    /// The hosted store, when sign-in is possible
    pub fn supabase(&self) -> Option<&Arc<SupabaseStore>> {
        match self {
            Self::Supabase(store) => Some(store),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Supabase(_) => "supabase",
            Self::Local(_) => "local",
            Self::Disabled => "disabled",
        }
    }
}

use async_trait::async_trait;
use chrono::Utc;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};

use super::identity::{AuthSession, Identity};
use super::store::{HistoryRecord, NewHistoryRecord, SessionStore};
use crate::utils::{ChorusError, Result};

/// History kept as one JSON file per record in a project directory.
/// The identity is a fixed local profile, so history works offline.
pub struct LocalHistoryStore {
    history_dir: PathBuf,
    auth: AuthSession,
}

impl LocalHistoryStore {
    pub fn new(history_dir: impl AsRef<Path>, profile: &str) -> Result<Self> {
        let history_dir = history_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&history_dir)?;

        Ok(Self {
            history_dir,
            auth: AuthSession::new(Some(Identity::new(profile, None))),
        })
    }

    fn record_path(&self, id: &str) -> Result<PathBuf> {
        let valid = !id.is_empty() && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '-');
        if !valid {
            return Err(ChorusError::InvalidInput(format!("Invalid history id '{}'", id)));
        }
        Ok(self.history_dir.join(format!("{}.json", id)))
    }
}

#[async_trait]
impl SessionStore for LocalHistoryStore {
    async fn current_user(&self) -> Option<Identity> {
        self.auth.current()
    }

    async fn insert_history_record(&self, record: &NewHistoryRecord) -> Result<()> {
        let stored = HistoryRecord {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id: record.owner_id.clone(),
            prompt_text: record.prompt_text.clone(),
            model_names: record.model_names.clone(),
            responses: record.responses.clone(),
            created_at: Utc::now(),
        };

        let json = serde_json::to_string_pretty(&stored)
            .map_err(|e| ChorusError::Persistence(e.to_string()))?;
        fs::write(self.record_path(&stored.id)?, json)
            .await
            .map_err(|e| ChorusError::Persistence(e.to_string()))?;

        debug!(id = %stored.id, "history record written");
        Ok(())
    }

    async fn list_history_records(&self, owner_id: &str) -> Result<Vec<HistoryRecord>> {
        let mut records = Vec::new();

        let mut entries = match fs::read_dir(&self.history_dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(records),
            Err(e) => return Err(ChorusError::Persistence(e.to_string())),
        };

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| ChorusError::Persistence(e.to_string()))?
        {
            let path = entry.path();
            if path.extension().map_or(true, |ext| ext != "json") {
                continue;
            }
            let Ok(json) = fs::read_to_string(&path).await else {
                continue;
            };
            match serde_json::from_str::<HistoryRecord>(&json) {
                Ok(record) if record.owner_id == owner_id => records.push(record),
                Ok(_) => {}
                Err(e) => warn!(path = %path.display(), "skipping unreadable history file: {}", e),
            }
        }

        // Newest first
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }

    async fn delete_history_record(&self, id: &str) -> Result<()> {
        let path = self.record_path(id)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ChorusError::Persistence(e.to_string())),
        }
    }

    fn auth(&self) -> AuthSession {
        self.auth.clone()
    }
}

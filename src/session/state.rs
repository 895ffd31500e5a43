use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::app::get_config_dir;

/// Tokens issued by the hosted auth service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredTokens {
    pub access_token: String,
    pub refresh_token: Option<String>,
}

/// Session state that persists between runs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    #[serde(default)]
    pub last_selected_models: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens: Option<StoredTokens>,
}

impl SessionState {
    /// Get the path to the session file
    pub fn session_file() -> Result<PathBuf> {
        Ok(get_config_dir()?.join("session.toml"))
    }

    /// Load session state from disk
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::session_file()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = fs::read_to_string(path)?;
            Ok(toml::from_str(&content)?)
        } else {
            Ok(Self::default())
        }
    }

    /// Save session state to disk
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::session_file()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(&self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Remember the model selection
    pub fn set_models(&mut self, ids: impl IntoIterator<Item = impl Into<String>>) {
        self.last_selected_models = ids.into_iter().map(Into::into).collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_loads_default() {
        let dir = TempDir::new().unwrap();
        let state = SessionState::load_from(&dir.path().join("session.toml")).unwrap();
        assert_eq!(state, SessionState::default());
    }

    #[test]
    fn test_save_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("session.toml");

        let mut state = SessionState::default();
        state.set_models(["gpt", "deepseek"]);
        state.tokens = Some(StoredTokens {
            access_token: "access".to_string(),
            refresh_token: Some("refresh".to_string()),
        });
        state.save_to(&path).unwrap();

        let loaded = SessionState::load_from(&path).unwrap();
        assert_eq!(loaded, state);
        assert_eq!(loaded.last_selected_models, vec!["gpt", "deepseek"]);
    }
}

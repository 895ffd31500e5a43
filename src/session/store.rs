use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use super::identity::{AuthSession, Identity};
use crate::utils::Result;

/// One model's stored answer inside a history record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredResponse {
    pub text: String,
    pub error: Option<String>,
}

/// A persisted prompt turn, as read back from a store.
/// Field names on the wire follow the `chat_history` table columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(rename = "user_id")]
    pub owner_id: String,
    #[serde(rename = "prompt")]
    pub prompt_text: String,
    #[serde(rename = "models")]
    pub model_names: Vec<String>,
    /// Keyed by model display name
    #[serde(default)]
    pub responses: BTreeMap<String, StoredResponse>,
    pub created_at: DateTime<Utc>,
}

impl HistoryRecord {
    /// Prompt truncated to `max_chars` for list views
    pub fn preview(&self, max_chars: usize) -> String {
        let mut chars = self.prompt_text.chars();
        let head: String = chars.by_ref().take(max_chars).collect();
        if chars.next().is_some() {
            format!("{}...", head)
        } else {
            head
        }
    }
}

/// Hosted tables hand out numeric ids, the local store uses uuids
fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {}",
            other
        ))),
    }
}

/// A record ready to be inserted; the store assigns `id` and `created_at`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewHistoryRecord {
    #[serde(rename = "user_id")]
    pub owner_id: String,
    #[serde(rename = "prompt")]
    pub prompt_text: String,
    #[serde(rename = "models")]
    pub model_names: Vec<String>,
    pub responses: BTreeMap<String, StoredResponse>,
}

/// Identity and history persistence, consumed by the history sink and the
/// history screens. Implementations must be shareable across tasks.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Currently signed-in identity, or `None` when unavailable
    async fn current_user(&self) -> Option<Identity>;

    async fn insert_history_record(&self, record: &NewHistoryRecord) -> Result<()>;

    /// Records owned by `owner_id`, newest first
    async fn list_history_records(&self, owner_id: &str) -> Result<Vec<HistoryRecord>>;

    async fn delete_history_record(&self, id: &str) -> Result<()>;

    /// Observable identity for auth-state-change subscribers
    fn auth(&self) -> AuthSession;
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_record_uses_table_column_names() {
        let mut responses = BTreeMap::new();
        responses.insert(
            "GPT".to_string(),
            StoredResponse {
                text: "Recursion is...".to_string(),
                error: None,
            },
        );
        let record = NewHistoryRecord {
            owner_id: "user-1".to_string(),
            prompt_text: "Explain recursion".to_string(),
            model_names: vec!["GPT".to_string(), "Claude".to_string()],
            responses,
        };

        assert_eq!(
            serde_json::to_value(&record).unwrap(),
            json!({
                "user_id": "user-1",
                "prompt": "Explain recursion",
                "models": ["GPT", "Claude"],
                "responses": {"GPT": {"text": "Recursion is...", "error": null}}
            })
        );
    }

    #[test]
    fn test_history_row_deserializes() {
        let row = json!({
            "id": 42,
            "user_id": "user-1",
            "prompt": "hi",
            "models": ["GPT"],
            "responses": {"GPT": {"text": "hello", "error": null}},
            "created_at": "2024-05-01T10:00:00+00:00"
        });
        let record: HistoryRecord = serde_json::from_value(row).unwrap();
        assert_eq!(record.id, "42");
        assert_eq!(record.owner_id, "user-1");
        assert_eq!(record.responses["GPT"].text, "hello");
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        let record = HistoryRecord {
            id: "1".to_string(),
            owner_id: "u".to_string(),
            prompt_text: "héllo wörld".to_string(),
            model_names: vec![],
            responses: BTreeMap::new(),
            created_at: Utc::now(),
        };
        assert_eq!(record.preview(5), "héllo...");
        assert_eq!(record.preview(50), "héllo wörld");
    }
}

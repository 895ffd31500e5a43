use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, warn};

use super::turn::PromptTurn;
use crate::session::{Identity, NewHistoryRecord, SessionStore, StoredResponse};

/// What happened when a settled turn was handed to the history store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistOutcome {
    Stored,
    /// Nobody signed in; nothing written
    Anonymous,
    /// Every model failed; nothing written
    NothingToStore,
    /// The store rejected the write (already logged)
    Failed(String),
    Disabled,
}

impl PersistOutcome {
    pub fn describe(&self) -> &str {
        match self {
            Self::Stored => "saved to history",
            Self::Anonymous => "not saved (signed out)",
            Self::NothingToStore => "not saved (no successful responses)",
            Self::Failed(_) => "history save failed",
            Self::Disabled => "history disabled",
        }
    }
}

/// Writes each completed turn to the session store exactly once
pub struct HistorySink {
    store: Option<Arc<dyn SessionStore>>,
}

impl HistorySink {
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        Self { store: Some(store) }
    }

    pub fn disabled() -> Self {
        Self { store: None }
    }

    pub fn store(&self) -> Option<&Arc<dyn SessionStore>> {
        self.store.as_ref()
    }

    /// Shape a settled turn into a record. `models` names every model the
    /// prompt went to; `responses` holds only the ones that answered.
    pub fn build_record(turn: &PromptTurn, identity: &Identity) -> Option<NewHistoryRecord> {
        let responses: BTreeMap<String, StoredResponse> = turn
            .entries()
            .iter()
            .filter_map(|entry| {
                entry.full_text.as_ref().map(|text| {
                    (
                        entry.model.display_name.clone(),
                        StoredResponse {
                            text: text.clone(),
                            error: None,
                        },
                    )
                })
            })
            .collect();

        if responses.is_empty() {
            return None;
        }

        Some(NewHistoryRecord {
            owner_id: identity.id.clone(),
            prompt_text: turn.prompt_text.clone(),
            model_names: turn
                .entries()
                .iter()
                .map(|e| e.model.display_name.clone())
                .collect(),
            responses,
        })
    }

    /// Persist a turn whose entries have all settled. Store failures are
    /// logged and reported, never raised.
    pub async fn persist(&self, turn: &PromptTurn) -> PersistOutcome {
        let Some(store) = &self.store else {
            return PersistOutcome::Disabled;
        };

        debug_assert!(turn.is_settled(), "persist called before every entry settled");

        if !turn.entries().iter().any(|e| e.succeeded()) {
            debug!(turn = %turn.id, "no successful responses; skipping history");
            return PersistOutcome::NothingToStore;
        }

        let Some(identity) = store.current_user().await else {
            debug!(turn = %turn.id, "no signed-in user; skipping history");
            return PersistOutcome::Anonymous;
        };

        let Some(record) = Self::build_record(turn, &identity) else {
            return PersistOutcome::NothingToStore;
        };

        match store.insert_history_record(&record).await {
            Ok(()) => {
                debug!(turn = %turn.id, "turn saved to history");
                PersistOutcome::Stored
            }
            Err(e) => {
                warn!(turn = %turn.id, "failed to save history: {}", e);
                PersistOutcome::Failed(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::registry;
    use crate::session::MockSessionStore;
    use crate::utils::ChorusError;
    use pretty_assertions::assert_eq;

    fn settled_turn(claude_ok: bool) -> PromptTurn {
        let models = registry::resolve(&["gpt", "claude"]).unwrap();
        let mut turn = PromptTurn::new("Explain recursion", &models);
        turn.entry_mut("gpt")
            .unwrap()
            .settle(Ok("Recursion is...".to_string()));
        let claude = if claude_ok {
            Ok("A function calling itself".to_string())
        } else {
            Err("OpenRouter API error: rate limited".to_string())
        };
        turn.entry_mut("claude").unwrap().settle(claude);
        turn
    }

    fn alice() -> Identity {
        Identity::new("user-1", Some("alice@example.com".to_string()))
    }

    #[test]
    fn test_record_lists_all_models_but_only_successes() {
        let record = HistorySink::build_record(&settled_turn(false), &alice()).unwrap();
        assert_eq!(record.owner_id, "user-1");
        assert_eq!(record.prompt_text, "Explain recursion");
        assert_eq!(record.model_names, vec!["GPT", "Claude"]);
        assert_eq!(record.responses.len(), 1);
        assert_eq!(
            record.responses["GPT"],
            StoredResponse {
                text: "Recursion is...".to_string(),
                error: None
            }
        );
    }

    #[test]
    fn test_record_uses_full_text_not_visible_text() {
        let turn = settled_turn(true);
        // Nothing revealed yet
        assert!(turn.entries().iter().all(|e| e.visible_text.is_empty()));

        let record = HistorySink::build_record(&turn, &alice()).unwrap();
        assert_eq!(record.responses["Claude"].text, "A function calling itself");
    }

    #[tokio::test]
    async fn test_persist_inserts_once() {
        let mut store = MockSessionStore::new();
        store.expect_current_user().returning(|| Some(alice()));
        store
            .expect_insert_history_record()
            .withf(|record| record.responses.contains_key("GPT"))
            .times(1)
            .returning(|_| Ok(()));

        let sink = HistorySink::new(Arc::new(store));
        assert_eq!(sink.persist(&settled_turn(false)).await, PersistOutcome::Stored);
    }

    #[tokio::test]
    async fn test_persist_skips_anonymous() {
        let mut store = MockSessionStore::new();
        store.expect_current_user().returning(|| None);
        store.expect_insert_history_record().never();

        let sink = HistorySink::new(Arc::new(store));
        assert_eq!(sink.persist(&settled_turn(true)).await, PersistOutcome::Anonymous);
    }

    #[tokio::test]
    async fn test_persist_skips_when_everything_failed() {
        let models = registry::resolve(&["gpt"]).unwrap();
        let mut turn = PromptTurn::new("hi", &models);
        turn.entry_mut("gpt").unwrap().settle(Err("boom".to_string()));

        let mut store = MockSessionStore::new();
        store.expect_current_user().never();
        store.expect_insert_history_record().never();

        let sink = HistorySink::new(Arc::new(store));
        assert_eq!(sink.persist(&turn).await, PersistOutcome::NothingToStore);
    }

    #[tokio::test]
    async fn test_store_failure_is_swallowed() {
        let mut store = MockSessionStore::new();
        store.expect_current_user().returning(|| Some(alice()));
        store
            .expect_insert_history_record()
            .times(1)
            .returning(|_| Err(ChorusError::Persistence("connection reset".to_string())));

        let sink = HistorySink::new(Arc::new(store));
        let outcome = sink.persist(&settled_turn(true)).await;
        assert_eq!(
            outcome,
            PersistOutcome::Failed("History store error: connection reset".to_string())
        );
    }

    #[tokio::test]
    async fn test_disabled_sink() {
        let sink = HistorySink::disabled();
        assert!(sink.store().is_none());
        assert_eq!(sink.persist(&settled_turn(true)).await, PersistOutcome::Disabled);
    }
}

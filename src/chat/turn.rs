use chrono::{DateTime, Local};

use crate::models::ModelDescriptor;

pub type TurnId = String;

/// Lifecycle of one model's answer within a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    /// Request in flight
    Pending,
    /// Backend succeeded; text is being shown progressively
    Revealing,
    Complete,
    Failed,
}

impl EntryState {
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

/// One model's slot in a turn
#[derive(Debug, Clone)]
pub struct ResponseEntry {
    pub model: ModelDescriptor,
    pub state: EntryState,
    /// Backend text, set once on success
    pub full_text: Option<String>,
    /// What the UI shows; always a prefix of `full_text`
    pub visible_text: String,
    pub failure_reason: Option<String>,
    pub settled_at: Option<DateTime<Local>>,
}

impl ResponseEntry {
    pub fn pending(model: ModelDescriptor) -> Self {
        Self {
            model,
            state: EntryState::Pending,
            full_text: None,
            visible_text: String::new(),
            failure_reason: None,
            settled_at: None,
        }
    }

    /// The backend call has resolved
    pub fn is_settled(&self) -> bool {
        !self.state.is_pending()
    }

    /// The backend call resolved successfully
    pub fn succeeded(&self) -> bool {
        self.full_text.is_some()
    }

    /// Record the backend outcome. Only the first settlement counts.
    pub fn settle(&mut self, outcome: Result<String, String>) -> bool {
        if self.is_settled() {
            return false;
        }
        match outcome {
            Ok(text) => {
                self.full_text = Some(text);
                self.state = EntryState::Revealing;
            }
            Err(reason) => {
                self.failure_reason = Some(reason);
                self.state = EntryState::Failed;
            }
        }
        self.settled_at = Some(Local::now());
        true
    }

    /// Grow the visible text. Rejects anything that is not a longer-or-equal
    /// prefix of the full text; reaching the full text completes the entry.
    pub fn advance_reveal(&mut self, visible: &str) -> bool {
        if self.state != EntryState::Revealing {
            return false;
        }
        let Some(full) = self.full_text.as_deref() else {
            return false;
        };
        if !full.starts_with(visible) || visible.len() < self.visible_text.len() {
            return false;
        }

        self.visible_text = visible.to_string();
        if self.visible_text.len() == full.len() {
            self.state = EntryState::Complete;
        }
        true
    }

    /// Show everything at once
    pub fn finish_reveal(&mut self) {
        if let (EntryState::Revealing, Some(full)) = (self.state, self.full_text.as_ref()) {
            self.visible_text = full.clone();
            self.state = EntryState::Complete;
        }
    }
}

/// One user prompt and the per-model answers it fanned out to
#[derive(Debug, Clone)]
pub struct PromptTurn {
    pub id: TurnId,
    pub prompt_text: String,
    pub created_at: DateTime<Local>,
    entries: Vec<ResponseEntry>,
}

impl PromptTurn {
    /// New turn with one pending entry per distinct model id. The prompt is
    /// stored trimmed; a repeated model keeps its first position.
    pub fn new(prompt_text: &str, models: &[ModelDescriptor]) -> Self {
        let mut entries: Vec<ResponseEntry> = Vec::with_capacity(models.len());
        for model in models {
            if !entries.iter().any(|e| e.model.id == model.id) {
                entries.push(ResponseEntry::pending(model.clone()));
            }
        }

        Self {
            id: uuid::Uuid::new_v4().to_string(),
            prompt_text: prompt_text.trim().to_string(),
            created_at: Local::now(),
            entries,
        }
    }

    /// Entries in submission order
    pub fn entries(&self) -> &[ResponseEntry] {
        &self.entries
    }

    pub fn entry(&self, model_id: &str) -> Option<&ResponseEntry> {
        self.entries.iter().find(|e| e.model.id == model_id)
    }

    pub fn entry_mut(&mut self, model_id: &str) -> Option<&mut ResponseEntry> {
        self.entries.iter_mut().find(|e| e.model.id == model_id)
    }

    pub fn is_settled(&self) -> bool {
        self.entries.iter().all(ResponseEntry::is_settled)
    }

    /// Settled and nothing left to reveal
    pub fn is_finished(&self) -> bool {
        self.entries
            .iter()
            .all(|e| matches!(e.state, EntryState::Complete | EntryState::Failed))
    }

    pub fn has_pending(&self) -> bool {
        self.entries.iter().any(|e| e.state.is_pending())
    }

    pub(crate) fn finish_all_reveals(&mut self) {
        self.entries.iter_mut().for_each(ResponseEntry::finish_reveal);
    }
}

use std::collections::HashSet;
use std::path::PathBuf;

use tokio::sync::mpsc;
use tracing::warn;

use crate::app::UIConfig;
use crate::chat::{Orchestrator, PersistOutcome, PromptTurn, TurnId};
use crate::constants::CHARS_PER_TOKEN_ESTIMATE;
use crate::models::{registry, ModelCategory, ModelDescriptor};
use crate::session::{AuthSubscription, HistoryRecord, HistoryStore, Identity, SessionState};

/// Which full-screen view is showing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Chat,
    ModelSelect,
    History,
    ApiKey,
}

/// Application state for different modes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppState {
    /// Normal mode - navigating
    Normal,
    /// Insert mode - typing input
    Insert,
    /// Command mode - entering commands
    Command,
}

/// Model picker state
#[derive(Debug, Default)]
pub struct PickerState {
    pub category: ModelCategory,
    pub query: String,
    pub cursor: usize,
}

/// History browser state
#[derive(Debug, Default)]
pub struct HistoryView {
    pub records: Vec<HistoryRecord>,
    pub selected: usize,
}

impl HistoryView {
    pub fn current(&self) -> Option<&HistoryRecord> {
        self.records.get(self.selected)
    }
}

/// Rough token count shown under finished responses
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN_ESTIMATE)
}

/// Application state
pub struct App {
    pub orchestrator: Orchestrator,
    pub history_store: HistoryStore,
    pub ui: UIConfig,
    /// Models the next prompt goes to, in selection order
    pub selected: Vec<ModelDescriptor>,
    /// Earlier turns of this session, oldest first
    pub transcript: Vec<PromptTurn>,
    /// Model ids whose panels are collapsed
    pub collapsed: HashSet<String>,
    /// User input buffer
    pub input: String,
    /// Text after ':' in command mode
    pub command: String,
    pub api_key_input: String,
    /// Is the app running?
    pub running: bool,
    /// Lines scrolled up from the bottom of the chat
    pub scroll_offset: u16,
    pub status_message: Option<String>,
    pub identity: Option<Identity>,
    pub screen: Screen,
    pub state: AppState,
    pub picker: PickerState,
    pub history: HistoryView,
    identity_rx: Option<mpsc::UnboundedReceiver<Option<Identity>>>,
    auth_subscription: Option<AuthSubscription>,
    session_file: Option<PathBuf>,
    announced_turn: Option<TurnId>,
}

impl App {
    /// Create a new app instance
    pub fn new(
        orchestrator: Orchestrator,
        history_store: HistoryStore,
        ui: UIConfig,
        selected: Vec<ModelDescriptor>,
    ) -> Self {
        let screen = if orchestrator.client().has_credential() {
            Screen::Chat
        } else {
            Screen::ApiKey
        };

        Self {
            orchestrator,
            history_store,
            ui,
            selected,
            transcript: Vec::new(),
            collapsed: HashSet::new(),
            input: String::new(),
            command: String::new(),
            api_key_input: String::new(),
            running: true,
            scroll_offset: 0,
            status_message: None,
            identity: None,
            screen,
            state: AppState::Insert,
            picker: PickerState::default(),
            history: HistoryView::default(),
            identity_rx: None,
            auth_subscription: None,
            session_file: None,
            announced_turn: None,
        }
    }

    pub fn with_identity(mut self, identity: Option<Identity>) -> Self {
        self.identity = identity;
        self
    }

    /// Remember the model selection in `path` whenever it changes
    pub fn with_session_file(mut self, path: PathBuf) -> Self {
        self.session_file = Some(path);
        self
    }

    /// Follow sign-in and sign-out for the header
    pub fn watch_auth(&mut self) {
        let Some(store) = self.history_store.as_store() else {
            return;
        };
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = store.auth().subscribe(move |identity| {
            let tx = tx.clone();
            async move {
                let _ = tx.send(identity);
            }
        });
        self.identity_rx = Some(rx);
        self.auth_subscription = Some(subscription);
    }

    /// Past turns followed by the active one
    pub fn turns(&self) -> impl Iterator<Item = &PromptTurn> {
        self.transcript.iter().chain(self.orchestrator.current_turn())
    }

    /// Fold in background progress. Returns whether a redraw is needed.
    pub fn tick(&mut self) -> bool {
        let mut changed = self.orchestrator.drain() > 0;

        if let Some(rx) = self.identity_rx.as_mut() {
            while let Ok(identity) = rx.try_recv() {
                self.identity = identity;
                changed = true;
            }
        }

        let persisted = self
            .orchestrator
            .current_turn()
            .map(|t| t.id.clone())
            .zip(self.orchestrator.persist_outcome().cloned());
        if let Some((turn_id, outcome)) = persisted {
            if self.announced_turn.as_ref() != Some(&turn_id) {
                self.announced_turn = Some(turn_id);
                if matches!(outcome, PersistOutcome::Stored | PersistOutcome::Failed(_)) {
                    self.set_status(outcome.describe().to_string());
                    changed = true;
                }
            }
        }

        changed
    }

    /// Send the input buffer to every selected model
    pub fn submit_input(&mut self) -> bool {
        if self.orchestrator.is_busy() {
            self.set_status("Waiting for the current responses...");
            return false;
        }
        if self.input.trim().is_empty() {
            return false;
        }
        if self.selected.is_empty() {
            self.set_status("Select at least one model (press m)");
            return false;
        }
        if !self.orchestrator.client().has_credential() {
            self.screen = Screen::ApiKey;
            self.set_status("An OpenRouter API key is required");
            return false;
        }

        if let Some(turn) = self.orchestrator.current_turn() {
            let mut finished = turn.clone();
            finished.finish_all_reveals();
            self.transcript.push(finished);
        }

        let submitted = self.orchestrator.submit(&self.input, &self.selected).is_some();
        if submitted {
            self.input.clear();
            self.scroll_offset = 0;
            self.clear_status();
        }
        submitted
    }

    /// Models visible in the picker under the current tab and search
    pub fn picker_models(&self) -> Vec<&'static ModelDescriptor> {
        registry::search(&self.picker.query, self.picker.category)
    }

    pub fn is_selected(&self, model_id: &str) -> bool {
        self.selected.iter().any(|m| m.id == model_id)
    }

    /// Add or remove a model, honoring the selection cap
    pub fn toggle_model(&mut self, model: &ModelDescriptor) -> bool {
        if let Some(pos) = self.selected.iter().position(|m| m.id == model.id) {
            self.selected.remove(pos);
        } else if self.selected.len() >= self.ui.max_models {
            self.set_status(format!("You can select up to {} models", self.ui.max_models));
            return false;
        } else {
            self.selected.push(model.clone());
        }
        self.save_selection();
        true
    }

    /// Toggle the model under the picker cursor
    pub fn toggle_cursor_model(&mut self) -> bool {
        match self.picker_models().get(self.picker.cursor).copied() {
            Some(model) => self.toggle_model(model),
            None => false,
        }
    }

    pub fn move_picker_cursor(&mut self, down: bool) {
        let count = self.picker_models().len();
        if count == 0 {
            self.picker.cursor = 0;
        } else if down {
            self.picker.cursor = (self.picker.cursor + 1).min(count - 1);
        } else {
            self.picker.cursor = self.picker.cursor.saturating_sub(1);
        }
    }

    pub fn cycle_category(&mut self) {
        self.picker.category = self.picker.category.cycle();
        self.picker.cursor = 0;
    }

    fn save_selection(&self) {
        let Some(path) = &self.session_file else {
            return;
        };
        // Re-read so tokens refreshed in the background are kept
        let result = SessionState::load_from(path).and_then(|mut state| {
            state.set_models(self.selected.iter().map(|m| m.id.clone()));
            state.save_to(path)
        });
        if let Err(e) = result {
            warn!("failed to save session: {}", e);
        }
    }

    /// Models that get a panel: the active turn's, or the selection before any prompt
    pub fn panel_models(&self) -> Vec<ModelDescriptor> {
        match self.orchestrator.current_turn() {
            Some(turn) => turn.entries().iter().map(|e| e.model.clone()).collect(),
            None => self.selected.clone(),
        }
    }

    /// Collapse or expand the panel at `index` (0-based, left to right)
    pub fn toggle_collapse(&mut self, index: usize) {
        let Some(model) = self.panel_models().into_iter().nth(index) else {
            return;
        };
        if !self.collapsed.remove(&model.id) {
            self.collapsed.insert(model.id);
        }
    }

    pub fn is_collapsed(&self, model_id: &str) -> bool {
        self.collapsed.contains(model_id)
    }

    /// Apply the key typed on the API key screen
    pub fn submit_api_key(&mut self) -> bool {
        let key = self.api_key_input.trim().to_string();
        if key.is_empty() {
            return false;
        }
        self.orchestrator.client().set_credential(&key);
        self.api_key_input.clear();
        self.screen = Screen::Chat;
        self.set_status("API key set for this session");
        true
    }

    /// Load the signed-in user's history and open the browser
    pub async fn open_history(&mut self) {
        let Some(store) = self.history_store.as_store() else {
            self.set_status("History is disabled");
            return;
        };
        let Some(identity) = store.current_user().await else {
            self.set_status("Sign in to see history (chorus login <email>)");
            return;
        };
        self.identity = Some(identity.clone());

        match store.list_history_records(&identity.id).await {
            Ok(records) => {
                self.history = HistoryView {
                    records,
                    selected: 0,
                };
                self.screen = Screen::History;
            }
            Err(e) => self.set_status(format!("Could not load history: {}", e)),
        }
    }

    pub async fn delete_selected_history(&mut self) {
        let Some(store) = self.history_store.as_store() else {
            return;
        };
        let Some(id) = self.history.current().map(|r| r.id.clone()) else {
            return;
        };

        match store.delete_history_record(&id).await {
            Ok(()) => {
                self.history.records.retain(|r| r.id != id);
                self.history.selected = self
                    .history
                    .selected
                    .min(self.history.records.len().saturating_sub(1));
                self.set_status("Deleted");
            }
            Err(e) => self.set_status(format!("Could not delete: {}", e)),
        }
    }

    /// Empty the chat, including the active turn. A turn still in flight
    /// keeps running in the background and is saved to history.
    pub fn clear_transcript(&mut self) {
        self.transcript.clear();
        self.orchestrator.clear();
        self.collapsed.clear();
        self.scroll_offset = 0;
        self.announced_turn = None;
        self.set_status("Chat cleared");
    }

    /// Full answer in the panel at `index` of the active turn, if it succeeded
    pub fn copy_text(&self, index: usize) -> Option<String> {
        let model = self.panel_models().into_iter().nth(index)?;
        self.orchestrator
            .current_turn()?
            .entry(&model.id)?
            .full_text
            .clone()
    }

    /// Put the answer in panel `index` on the system clipboard. Falls back to
    /// a file in the temp directory when no clipboard is reachable.
    pub fn copy_panel(&mut self, index: usize) -> bool {
        let Some(text) = self.copy_text(index) else {
            self.set_status(format!("Nothing to copy in panel {}", index + 1));
            return false;
        };

        match arboard::Clipboard::new().and_then(|mut clipboard| clipboard.set_text(text.clone())) {
            Ok(()) => {
                self.set_status("Copied to clipboard");
                true
            }
            Err(err) => {
                warn!("clipboard unavailable: {}", err);
                let path = std::env::temp_dir().join(format!(
                    "chorus_copy_{}.txt",
                    chrono::Utc::now().timestamp_millis()
                ));
                match std::fs::write(&path, &text) {
                    Ok(()) => {
                        self.set_status(format!(
                            "Clipboard unavailable ({}). Wrote to {}",
                            err,
                            path.display()
                        ));
                        true
                    }
                    Err(io_err) => {
                        self.set_status(format!(
                            "Clipboard unavailable ({}); could not write {}: {}",
                            err,
                            path.display(),
                            io_err
                        ));
                        false
                    }
                }
            }
        }
    }

    /// Set status message
    pub fn set_status(&mut self, message: impl Into<String>) {
        self.status_message = Some(message.into());
    }

    /// Clear status message
    pub fn clear_status(&mut self) {
        self.status_message = None;
    }

    /// Scroll chat view up
    pub fn scroll_up(&mut self, amount: u16) {
        self.scroll_offset = self.scroll_offset.saturating_add(amount);
    }

    /// Scroll chat view down
    pub fn scroll_down(&mut self, amount: u16) {
        self.scroll_offset = self.scroll_offset.saturating_sub(amount);
    }

    /// Quit the application
    pub fn quit(&mut self) {
        self.running = false;
        if let Some(subscription) = self.auth_subscription.take() {
            subscription.unsubscribe();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::{EntryState, HistorySink};
    use crate::test_support::CannedCompleter;
    use std::sync::Arc;

    fn app_with(completer: CannedCompleter, ids: &[&str]) -> App {
        let orchestrator = Orchestrator::new(
            Arc::new(completer),
            Arc::new(HistorySink::disabled()),
            None,
        );
        App::new(
            orchestrator,
            HistoryStore::Disabled,
            UIConfig::default(),
            registry::resolve(ids).unwrap(),
        )
    }

    #[test]
    fn test_estimate_tokens_rounds_up() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[tokio::test]
    async fn test_enter_is_ignored_while_pending() {
        let completer = CannedCompleter::new().reply("gpt", Ok("a"));
        let mut app = app_with(completer, &["gpt"]);

        app.input = "first".to_string();
        assert!(app.submit_input());
        assert!(app.input.is_empty());

        app.input = "second".to_string();
        assert!(!app.submit_input());
        assert_eq!(app.input, "second");
        assert_eq!(app.turns().count(), 1);
    }

    #[tokio::test]
    async fn test_previous_turn_moves_to_transcript() {
        let completer = CannedCompleter::new().reply("gpt", Ok("first answer"));
        let mut app = app_with(completer, &["gpt"]);

        app.input = "first".to_string();
        app.submit_input();
        app.orchestrator.wait_until_settled().await;

        app.input = "second".to_string();
        assert!(app.submit_input());
        assert_eq!(app.transcript.len(), 1);
        let archived = &app.transcript[0];
        assert_eq!(archived.prompt_text, "first");
        assert_eq!(archived.entry("gpt").unwrap().state, EntryState::Complete);
        assert_eq!(app.turns().count(), 2);
    }

    #[tokio::test]
    async fn test_submit_without_models_or_key() {
        let mut app = app_with(CannedCompleter::new(), &[]);
        app.input = "hi".to_string();
        assert!(!app.submit_input());
        assert!(app.status_message.is_some());

        let mut app = app_with(CannedCompleter::new().without_credential(), &["gpt"]);
        assert_eq!(app.screen, Screen::ApiKey);
        app.screen = Screen::Chat;
        app.input = "hi".to_string();
        assert!(!app.submit_input());
        assert_eq!(app.screen, Screen::ApiKey);
    }

    #[tokio::test]
    async fn test_selection_cap() {
        let mut app = app_with(CannedCompleter::new(), &["gpt"]);
        app.ui.max_models = 2;

        let claude = registry::find("claude").unwrap();
        let gemini = registry::find("gemini").unwrap();
        assert!(app.toggle_model(claude));
        assert!(!app.toggle_model(gemini));
        assert_eq!(
            app.status_message.as_deref(),
            Some("You can select up to 2 models")
        );

        // Deselecting frees a slot
        assert!(app.toggle_model(claude));
        assert!(app.toggle_model(gemini));
        let ids: Vec<&str> = app.selected.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["gpt", "gemini"]);
    }

    #[tokio::test]
    async fn test_selection_is_remembered() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("session.toml");
        let mut app =
            app_with(CannedCompleter::new(), &["gpt"]).with_session_file(path.clone());

        app.toggle_model(registry::find("deepseek").unwrap());
        let state = SessionState::load_from(&path).unwrap();
        assert_eq!(state.last_selected_models, vec!["gpt", "deepseek"]);
    }

    #[tokio::test]
    async fn test_picker_filters_and_cursor() {
        let mut app = app_with(CannedCompleter::new(), &[]);
        assert_eq!(app.picker_models().len(), 4);

        app.cycle_category(); // Pro
        assert_eq!(app.picker_models().len(), 3);
        app.picker.query = "google".to_string();
        assert_eq!(app.picker_models().len(), 1);

        app.move_picker_cursor(true);
        assert_eq!(app.picker.cursor, 0);
        assert!(app.toggle_cursor_model());
        assert!(app.is_selected("gemini"));
    }

    #[tokio::test]
    async fn test_collapse_and_api_key() {
        let mut app = app_with(CannedCompleter::new(), &["gpt", "claude"]);
        app.toggle_collapse(1);
        assert!(app.is_collapsed("claude"));
        app.toggle_collapse(1);
        assert!(!app.is_collapsed("claude"));
        app.toggle_collapse(9);

        app.screen = Screen::ApiKey;
        app.api_key_input = "  ".to_string();
        assert!(!app.submit_api_key());
        app.api_key_input = "sk-or-123".to_string();
        assert!(app.submit_api_key());
        assert_eq!(app.screen, Screen::Chat);
    }

    #[tokio::test]
    async fn test_history_disabled_message() {
        let mut app = app_with(CannedCompleter::new(), &["gpt"]);
        app.open_history().await;
        assert_eq!(app.screen, Screen::Chat);
        assert_eq!(app.status_message.as_deref(), Some("History is disabled"));
    }

    #[tokio::test]
    async fn test_copy_text_picks_the_panel_answer() {
        let completer = CannedCompleter::new()
            .reply("gpt", Ok("Recursion is..."))
            .reply("claude", Err("rate limited"));
        let mut app = app_with(completer, &["gpt", "claude"]);
        assert_eq!(app.copy_text(0), None);

        app.input = "Explain recursion".to_string();
        app.submit_input();
        assert_eq!(app.copy_text(0), None, "pending answers cannot be copied");

        app.orchestrator.wait_until_settled().await;
        assert_eq!(app.copy_text(0).as_deref(), Some("Recursion is..."));
        assert_eq!(app.copy_text(1), None, "failed answers cannot be copied");
        assert_eq!(app.copy_text(5), None);

        assert!(!app.copy_panel(1));
        assert_eq!(app.status_message.as_deref(), Some("Nothing to copy in panel 2"));
    }

    #[tokio::test]
    async fn test_clear_removes_the_active_turn() {
        let completer = CannedCompleter::new().reply("gpt", Ok("answer"));
        let mut app = app_with(completer, &["gpt"]);

        app.input = "first".to_string();
        app.submit_input();
        app.orchestrator.wait_until_settled().await;
        app.input = "second".to_string();
        app.submit_input();
        app.toggle_collapse(0);
        assert_eq!(app.turns().count(), 2);

        app.clear_transcript();
        assert_eq!(app.turns().count(), 0);
        assert!(!app.is_collapsed("gpt"));
        assert!(!app.orchestrator.is_busy());

        // Late progress from the cleared turn does not bring it back
        app.orchestrator.flush().await;
        app.tick();
        assert_eq!(app.turns().count(), 0);

        app.input = "third".to_string();
        assert!(app.submit_input());
        assert!(app.transcript.is_empty());
        assert_eq!(app.turns().count(), 1);
    }
}

use anyhow::{bail, Result};
use colored::Colorize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::{
    app::{get_data_dir, load_config, load_config_from, Config},
    chat::{HistorySink, Orchestrator, RevealSettings},
    cli::{handle_command, Cli, Commands},
    constants::SHUTDOWN_FLUSH_TIMEOUT_SECS,
    models::{registry, Completer, ModelDescriptor, OpenRouterClient},
    session::{HistoryStore, SessionState},
    tui::{run_ui, App},
    utils::{init_file_logger, init_logger, log_progress},
};

use super::non_interactive::NonInteractiveRunner;

/// Wires configuration, backends and the chosen front end together
pub struct Launcher {
    cli: Cli,
    config: Config,
}

impl Launcher {
    /// Load configuration for `cli`. An explicit `--config` must exist; the
    /// default locations fall back to built-in defaults.
    pub fn new(cli: Cli) -> Result<Self> {
        let config = match &cli.config {
            Some(path) => load_config_from(path)?,
            None => match load_config() {
                Ok(cfg) => cfg,
                Err(e) => {
                    eprintln!("Failed to load config: {}. Using defaults.", e);
                    Config::default()
                }
            },
        };

        Ok(Self { cli, config })
    }

    /// Whether this invocation ends in the terminal UI
    fn is_interactive(&self) -> bool {
        self.cli.prompt.is_none() && matches!(self.cli.command, None | Some(Commands::Chat))
    }

    /// Run the invocation. Returns the process exit code.
    pub async fn run(self) -> Result<i32> {
        if self.is_interactive() {
            let log_path = get_data_dir()?.join("chorus.log");
            init_file_logger(&log_path, self.cli.verbose);
        } else {
            init_logger(self.cli.verbose);
        }

        if let Some(prompt) = self.cli.prompt.clone() {
            return self.run_non_interactive(&prompt).await;
        }

        if handle_command(&self.cli, &self.config).await? {
            return Ok(0);
        }

        self.run_interactive().await?;
        Ok(0)
    }

    fn client(&self) -> Result<Arc<OpenRouterClient>> {
        let key = self
            .config
            .openrouter
            .resolve_api_key(self.cli.api_key.as_deref());
        Ok(Arc::new(OpenRouterClient::new(&self.config.openrouter, key)?))
    }

    fn sink(history: &HistoryStore) -> HistorySink {
        match history.as_store() {
            Some(store) => HistorySink::new(store),
            None => HistorySink::disabled(),
        }
    }

    /// Models from `--model`, else `fallback`, capped at the configured maximum
    fn pick_models(&self, fallback: &[String]) -> Result<Vec<ModelDescriptor>> {
        let ids: &[String] = if self.cli.models.is_empty() {
            fallback
        } else {
            &self.cli.models
        };
        let models = registry::resolve(ids)?;
        if models.len() > self.config.ui.max_models {
            bail!(
                "At most {} models can be selected at once",
                self.config.ui.max_models
            );
        }
        Ok(models)
    }

    async fn run_non_interactive(&self, prompt: &str) -> Result<i32> {
        let models = self.pick_models(&self.config.ui.default_models)?;
        let history = HistoryStore::from_config(&self.config.history)?;

        let mut runner =
            NonInteractiveRunner::new(self.client()?, Arc::new(Self::sink(&history)), models);
        let result = runner.execute(prompt).await?;

        println!("{}", runner.format_result(&result, self.cli.output_format));

        Ok(if result.all_failed() { 1 } else { 0 })
    }

    async fn run_interactive(&self) -> Result<()> {
        const STEPS: usize = 4;

        log_progress(1, STEPS, "Loading session");
        let session_file = SessionState::session_file().ok();
        let session = match &session_file {
            Some(path) => SessionState::load_from(path).unwrap_or_else(|e| {
                warn!("ignoring unreadable session file: {}", e);
                SessionState::default()
            }),
            None => SessionState::default(),
        };
        let models = match self.pick_models(&session.last_selected_models) {
            Ok(models) if !self.cli.models.is_empty() || !models.is_empty() => models,
            Ok(_) => self.pick_models(&self.config.ui.default_models)?,
            Err(e) if self.cli.models.is_empty() => {
                warn!("saved model selection is no longer valid: {}", e);
                self.pick_models(&self.config.ui.default_models)?
            }
            Err(e) => return Err(e),
        };

        log_progress(2, STEPS, "Connecting to OpenRouter");
        let client = self.client()?;
        if !client.has_credential() {
            eprintln!(
                "   {} no API key found; you will be asked for one",
                "note:".yellow()
            );
        }

        let history = HistoryStore::from_config(&self.config.history)?;
        log_progress(3, STEPS, format!("Opening history ({})", history.label()));
        let identity = match history.as_store() {
            Some(store) => store.current_user().await,
            None => None,
        };
        if let Some(identity) = &identity {
            info!(user = %identity.id, "signed in");
        }

        let reveal = if self.cli.no_reveal {
            None
        } else {
            RevealSettings::from_config(&self.config.reveal)
        };
        let orchestrator = Orchestrator::new(client, Arc::new(Self::sink(&history)), reveal);

        let names: Vec<&str> = models.iter().map(|m| m.display_name.as_str()).collect();
        log_progress(4, STEPS, format!("Starting chat with {}", names.join(", ").green()));

        let mut app = App::new(orchestrator, history, self.config.ui.clone(), models)
            .with_identity(identity);
        if let Some(path) = session_file {
            app = app.with_session_file(path);
        }
        app.watch_auth();

        let result = run_ui(&mut app).await;

        // Let the last turn's history write land before exiting
        let flush = tokio::time::timeout(
            Duration::from_secs(SHUTDOWN_FLUSH_TIMEOUT_SECS),
            app.orchestrator.flush(),
        );
        if flush.await.is_err() {
            warn!("gave up waiting for history writes");
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use tempfile::TempDir;

    fn launcher(args: &[&str]) -> Launcher {
        let cli = Cli::try_parse_from(args).unwrap();
        Launcher {
            cli,
            config: Config::default(),
        }
    }

    #[test]
    fn test_interactive_detection() {
        assert!(launcher(&["chorus"]).is_interactive());
        assert!(launcher(&["chorus", "chat"]).is_interactive());
        assert!(!launcher(&["chorus", "-p", "hi"]).is_interactive());
        assert!(!launcher(&["chorus", "models"]).is_interactive());
    }

    #[test]
    fn test_cli_models_win_over_fallback() {
        let l = launcher(&["chorus", "-m", "deepseek"]);
        let models = l.pick_models(&["gpt".to_string()]).unwrap();
        assert_eq!(models[0].id, "deepseek");

        let l = launcher(&["chorus"]);
        let models = l.pick_models(&l.config.ui.default_models).unwrap();
        let ids: Vec<&str> = models.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["gpt", "claude"]);
    }

    #[test]
    fn test_model_cap_and_unknown_ids() {
        let mut l = launcher(&["chorus", "-m", "gpt", "-m", "claude", "-m", "gemini"]);
        l.config.ui.max_models = 2;
        assert!(l.pick_models(&[]).is_err());

        let l = launcher(&["chorus", "-m", "llama"]);
        let err = l.pick_models(&[]).unwrap_err();
        assert!(err.to_string().contains("Unknown model 'llama'"));
    }

    #[test]
    fn test_explicit_config_must_exist() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope.toml");
        let cli =
            Cli::try_parse_from(["chorus", "--config", missing.to_str().unwrap()]).unwrap();
        assert!(Launcher::new(cli).is_err());
    }
}

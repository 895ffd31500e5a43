use anyhow::{bail, Context, Result};
use colored::Colorize;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::io::Write;
use std::sync::Arc;

use crate::{
    app::{get_config_dir, init_config, Config},
    constants::{HISTORY_PREVIEW_CHARS, OPENROUTER_KEYS_URL},
    models::{registry, ModelCategory, ModelTier},
    session::{HistoryStore, Identity, SessionStore, SignUpOutcome},
};

use super::{Cli, Commands, HistoryAction};

/// Handle CLI subcommands. Returns `false` when the chat UI should start.
pub async fn handle_command(cli: &Cli, config: &Config) -> Result<bool> {
    let Some(command) = &cli.command else {
        return Ok(false);
    };

    match command {
        Commands::Init => {
            println!("Initializing Chorus configuration...");
            init_config()?;
            println!("Configuration initialized successfully!");
            Ok(true)
        }
        Commands::Models { category, search } => {
            list_models(category.as_deref(), search.as_deref())?;
            Ok(true)
        }
        Commands::Chat => Ok(false), // Continue to chat interface
        Commands::History { action } => {
            let action = action.clone().unwrap_or(HistoryAction::List { limit: 20 });
            run_history(config, action).await?;
            Ok(true)
        }
        Commands::Login {
            email,
            password,
            sign_up,
        } => {
            login(config, email, password.clone(), *sign_up).await?;
            Ok(true)
        }
        Commands::Logout => {
            let store = HistoryStore::from_config(&config.history)?;
            let Some(supabase) = store.supabase() else {
                bail!("Sign-out needs the supabase history backend (current: {})", store.label());
            };
            supabase.sign_out().await?;
            println!("Signed out.");
            Ok(true)
        }
        Commands::Whoami => {
            let store = HistoryStore::from_config(&config.history)?;
            match current_identity(&store).await {
                Some(identity) => println!("{}", identity.label()),
                None => println!("Not signed in"),
            }
            Ok(true)
        }
        Commands::Status => {
            show_status(cli, config).await?;
            Ok(true)
        }
        Commands::Version => {
            show_version();
            Ok(true)
        }
    }
}

/// List available models
pub fn list_models(category: Option<&str>, search: Option<&str>) -> Result<()> {
    let category = match category {
        Some(raw) => ModelCategory::parse(raw).with_context(|| {
            format!(
                "Unknown category '{}'. Use one of: all, pro, free, openai, anthropic, google",
                raw
            )
        })?,
        None => ModelCategory::All,
    };

    let models = registry::search(search.unwrap_or_default(), category);
    if models.is_empty() {
        println!("No models match.");
        return Ok(());
    }

    println!("{}:", category.label());
    for model in models {
        let tier = match model.tier {
            ModelTier::Pro => "pro".yellow(),
            ModelTier::Free => "free".green(),
        };
        println!(
            "  • {:<10} {} ({}) [{}]",
            model.id.green(),
            model.display_name.bold(),
            model.provider_label,
            tier
        );
        println!("      {}", model.description.dimmed());
    }
    Ok(())
}

/// Show version information
pub fn show_version() {
    println!("Chorus v{}", env!("CARGO_PKG_VERSION"));
    println!("   Ask several AI models at once and compare their answers");
}

async fn current_identity(store: &HistoryStore) -> Option<Identity> {
    match store.as_store() {
        Some(store) => store.current_user().await,
        None => None,
    }
}

async fn run_history(config: &Config, action: HistoryAction) -> Result<()> {
    let history = HistoryStore::from_config(&config.history)?;
    let Some(store) = history.as_store() else {
        bail!("History is disabled. Set [history] backend in the config to enable it.");
    };
    let Some(identity) = store.current_user().await else {
        bail!("Not signed in. Run `chorus login <email>` first.");
    };

    match action {
        HistoryAction::List { limit } => {
            let records = store.list_history_records(&identity.id).await?;
            if records.is_empty() {
                println!("No saved prompts yet.");
            }
            for record in records.iter().take(limit) {
                println!(
                    "{}  {}  {}",
                    record.id.cyan(),
                    record.created_at.format("%Y-%m-%d %H:%M").to_string().dimmed(),
                    record.preview(HISTORY_PREVIEW_CHARS)
                );
            }
        }
        HistoryAction::Show { id } => {
            let records = store.list_history_records(&identity.id).await?;
            let record = records
                .iter()
                .find(|r| r.id == id)
                .with_context(|| format!("No saved prompt with id {}", id))?;

            println!("{} {}", "Prompt:".bold(), record.prompt_text);
            println!("{} {}", "Models:".bold(), record.model_names.join(", "));
            println!("{} {}", "Saved:".bold(), record.created_at.format("%Y-%m-%d %H:%M"));
            for name in &record.model_names {
                println!();
                println!("{}", format!("── {} ──", name).bold());
                match record.responses.get(name) {
                    Some(response) => println!("{}", response.text),
                    None => println!("{}", "(no response saved)".dimmed()),
                }
            }
        }
        HistoryAction::Delete { id } => {
            store.delete_history_record(&id).await?;
            println!("Deleted {}", id);
        }
    }
    Ok(())
}

async fn login(config: &Config, email: &str, password: Option<String>, sign_up: bool) -> Result<()> {
    let history = HistoryStore::from_config(&config.history)?;
    let Some(supabase) = history.supabase().map(Arc::clone) else {
        bail!(
            "Sign-in needs the supabase history backend with {} and {} set (current: {})",
            config.history.supabase_url_env,
            config.history.supabase_anon_key_env,
            history.label()
        );
    };

    let password = match password {
        Some(p) => p,
        None => prompt_hidden("Password: ")?,
    };
    if password.is_empty() {
        bail!("Password cannot be empty");
    }

    if sign_up {
        match supabase.sign_up(email, &password).await? {
            SignUpOutcome::SignedIn(identity) => {
                println!("Account created. Signed in as {}", identity.label().green())
            }
            SignUpOutcome::ConfirmationRequired => {
                println!("Account created. Check {} to confirm it, then log in.", email)
            }
        }
        return Ok(());
    }

    let identity = supabase.sign_in_with_password(email, &password).await?;
    println!("Signed in as {}", identity.label().green());
    Ok(())
}

/// What one key press did to a hidden input line
#[derive(Debug, PartialEq, Eq)]
enum SecretInput {
    Editing,
    Done,
    Cancelled,
}

fn edit_secret(line: &mut String, key: KeyEvent) -> SecretInput {
    if key.kind != KeyEventKind::Press {
        return SecretInput::Editing;
    }
    match key.code {
        KeyCode::Enter => SecretInput::Done,
        KeyCode::Esc => SecretInput::Cancelled,
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            SecretInput::Cancelled
        }
        KeyCode::Backspace => {
            line.pop();
            SecretInput::Editing
        }
        KeyCode::Char(c) => {
            line.push(c);
            SecretInput::Editing
        }
        _ => SecretInput::Editing,
    }
}

/// Read a line without echoing it. Piped input is read as a plain line.
fn prompt_hidden(label: &str) -> Result<String> {
    print!("{}", label);
    std::io::stdout().flush()?;

    if !crossterm::tty::IsTty::is_tty(&std::io::stdin()) {
        let mut line = String::new();
        std::io::stdin().read_line(&mut line)?;
        return Ok(line.trim_end_matches(['\r', '\n']).to_string());
    }

    enable_raw_mode()?;
    let mut line = String::new();
    let outcome = loop {
        match event::read() {
            Ok(Event::Key(key)) => match edit_secret(&mut line, key) {
                SecretInput::Editing => continue,
                done => break Ok(done),
            },
            Ok(_) => continue,
            Err(e) => break Err(e),
        }
    };
    disable_raw_mode()?;
    println!();

    match outcome? {
        SecretInput::Cancelled => bail!("Cancelled"),
        _ => Ok(line),
    }
}

/// Show status of configuration and credentials
async fn show_status(cli: &Cli, config: &Config) -> Result<()> {
    println!("Chorus Status:");
    println!();

    // Configuration
    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => get_config_dir()?.join("config.toml"),
    };
    if config_path.exists() {
        println!("  [OK] Configuration: {}", config_path.display());
    } else {
        println!("  [WARNING] Configuration: Not found (using defaults)");
    }

    // Routing credential
    if config.openrouter.resolve_api_key(cli.api_key.as_deref()).is_some() {
        println!("  [OK] OpenRouter API key: Set");
    } else {
        println!(
            "  [ERROR] OpenRouter API key: Not set ({} or --api-key; get one at {})",
            config.openrouter.api_key_env, OPENROUTER_KEYS_URL
        );
    }

    // History
    let history = HistoryStore::from_config(&config.history)?;
    println!("  [OK] History backend: {}", history.label());
    match current_identity(&history).await {
        Some(identity) => println!("  [OK] Signed in: {}", identity.label()),
        None if history.as_store().is_some() => {
            println!("  [WARNING] Signed in: No (history will not be saved)")
        }
        None => {}
    }

    println!();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn type_keys(keys: &[KeyEvent]) -> (String, SecretInput) {
        let mut line = String::new();
        for key in keys {
            match edit_secret(&mut line, *key) {
                SecretInput::Editing => {}
                done => return (line, done),
            }
        }
        (line, SecretInput::Editing)
    }

    #[test]
    fn test_hidden_input_edits_and_submits() {
        let keys = [
            press(KeyCode::Char('p')),
            press(KeyCode::Char('w')),
            press(KeyCode::Char('x')),
            press(KeyCode::Backspace),
            press(KeyCode::Char('d')),
            press(KeyCode::Left),
            press(KeyCode::Enter),
            press(KeyCode::Char('z')),
        ];
        assert_eq!(type_keys(&keys), ("pwd".to_string(), SecretInput::Done));
    }

    #[test]
    fn test_hidden_input_cancel_and_release_events() {
        let ctrl_c = KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL);
        let (line, outcome) = type_keys(&[press(KeyCode::Char('a')), ctrl_c]);
        assert_eq!(outcome, SecretInput::Cancelled);
        assert_eq!(line, "a");

        let mut release = press(KeyCode::Char('q'));
        release.kind = KeyEventKind::Release;
        let mut line = String::new();
        assert_eq!(edit_secret(&mut line, release), SecretInput::Editing);
        assert!(line.is_empty());
    }
}

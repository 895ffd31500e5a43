use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use std::io;
use std::time::Duration;

use crate::constants::{UI_REFRESH_INTERVAL_MS, UI_SCROLL_LINES};
use crate::tui::app::{App, AppState, Screen};
use crate::tui::render::render_ui;
use crate::utils::ChorusError;

/// Run the terminal UI until the user quits
pub async fn run_ui(app: &mut App) -> Result<()> {
    if !crossterm::tty::IsTty::is_tty(&io::stdout()) {
        eprintln!("Chorus requires an interactive terminal.");
        eprintln!("   For pipes and scripts use: chorus -m gpt -p \"your prompt\"");
        return Err(ChorusError::Ui("no interactive terminal available".to_string()).into());
    }

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;

    let res = run_app(&mut terminal, app).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    res
}

async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
) -> Result<()> {
    let poll_interval = Duration::from_millis(UI_REFRESH_INTERVAL_MS);

    while app.running {
        terminal.draw(|f| render_ui(f, app))?;

        if event::poll(poll_interval)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    handle_key(app, key).await;
                }
            }
        }

        app.tick();
    }

    Ok(())
}

async fn handle_key(app: &mut App, key: KeyEvent) {
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.quit();
        return;
    }

    match app.screen {
        Screen::ApiKey => match key.code {
            KeyCode::Enter => {
                app.submit_api_key();
            }
            KeyCode::Esc => {
                app.api_key_input.clear();
                app.screen = Screen::Chat;
            }
            KeyCode::Backspace => {
                app.api_key_input.pop();
            }
            KeyCode::Char(c) => app.api_key_input.push(c),
            _ => {}
        },
        Screen::ModelSelect => match key.code {
            KeyCode::Enter | KeyCode::Esc => app.screen = Screen::Chat,
            KeyCode::Tab => app.cycle_category(),
            KeyCode::Up => app.move_picker_cursor(false),
            KeyCode::Down => app.move_picker_cursor(true),
            KeyCode::Char(' ') => {
                app.toggle_cursor_model();
            }
            KeyCode::Char(c) => {
                app.picker.query.push(c);
                app.picker.cursor = 0;
            }
            KeyCode::Backspace => {
                app.picker.query.pop();
                app.picker.cursor = 0;
            }
            _ => {}
        },
        Screen::History => match key.code {
            KeyCode::Esc | KeyCode::Char('q') => app.screen = Screen::Chat,
            KeyCode::Up | KeyCode::Char('k') => {
                app.history.selected = app.history.selected.saturating_sub(1);
            }
            KeyCode::Down | KeyCode::Char('j') => {
                let last = app.history.records.len().saturating_sub(1);
                app.history.selected = (app.history.selected + 1).min(last);
            }
            KeyCode::Char('d') => app.delete_selected_history().await,
            _ => {}
        },
        Screen::Chat => handle_chat_key(app, key).await,
    }
}

async fn handle_chat_key(app: &mut App, key: KeyEvent) {
    match app.state {
        AppState::Normal => match key.code {
            KeyCode::Char('q') => app.quit(),
            KeyCode::Char('i') => app.state = AppState::Insert,
            KeyCode::Char(':') => {
                app.state = AppState::Command;
                app.command.clear();
            }
            KeyCode::Char('m') => app.screen = Screen::ModelSelect,
            KeyCode::Char('h') => app.open_history().await,
            KeyCode::Char('a') => app.screen = Screen::ApiKey,
            KeyCode::Char('s') => app.orchestrator.finish_reveals(),
            KeyCode::Char('y') => {
                app.copy_panel(0);
            }
            KeyCode::Char(c @ '1'..='9') => {
                app.toggle_collapse(c as usize - '1' as usize);
            }
            KeyCode::Up | KeyCode::Char('k') => app.scroll_up(1),
            KeyCode::Down | KeyCode::Char('j') => app.scroll_down(1),
            KeyCode::PageUp => app.scroll_up(UI_SCROLL_LINES * 5),
            KeyCode::PageDown => app.scroll_down(UI_SCROLL_LINES * 5),
            _ => {}
        },
        AppState::Insert => match key.code {
            KeyCode::Esc => app.state = AppState::Normal,
            KeyCode::Enter => {
                app.submit_input();
            }
            KeyCode::Char(c) => app.input.push(c),
            KeyCode::Backspace => {
                app.input.pop();
            }
            KeyCode::PageUp => app.scroll_up(UI_SCROLL_LINES),
            KeyCode::PageDown => app.scroll_down(UI_SCROLL_LINES),
            _ => {}
        },
        AppState::Command => match key.code {
            KeyCode::Esc => {
                app.state = AppState::Normal;
                app.command.clear();
            }
            KeyCode::Enter => {
                let command = std::mem::take(&mut app.command);
                app.state = AppState::Normal;
                handle_command(app, &command).await;
            }
            KeyCode::Char(c) => app.command.push(c),
            KeyCode::Backspace => {
                if app.command.pop().is_none() {
                    app.state = AppState::Normal;
                }
            }
            _ => {}
        },
    }
}

async fn handle_command(app: &mut App, command: &str) {
    let parts: Vec<&str> = command.split_whitespace().collect();

    match parts.first().copied() {
        Some("quit") | Some("q") => app.quit(),
        Some("clear") => app.clear_transcript(),
        Some("models") | Some("m") => app.screen = Screen::ModelSelect,
        Some("history") => app.open_history().await,
        Some("key") => app.screen = Screen::ApiKey,
        Some("skip") => app.orchestrator.finish_reveals(),
        Some("collapse") => match parts.get(1).and_then(|n| n.parse::<usize>().ok()) {
            Some(n) if n >= 1 => app.toggle_collapse(n - 1),
            _ => app.set_status("Usage: :collapse <panel number>"),
        },
        Some("copy") | Some("y") => match parts.get(1).map(|n| n.parse::<usize>()) {
            None => {
                app.copy_panel(0);
            }
            Some(Ok(n)) if n >= 1 => {
                app.copy_panel(n - 1);
            }
            _ => app.set_status("Usage: :copy [panel number]"),
        },
        Some("help") | Some("h") => app.set_status(
            ":q quit | :clear | :models | :history | :key | :skip | :collapse N | :copy N",
        ),
        None => {}
        _ => app.set_status(format!("Unknown command: {}", command)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::UIConfig;
    use crate::chat::{HistorySink, Orchestrator};
    use crate::models::registry;
    use crate::session::HistoryStore;
    use crate::test_support::CannedCompleter;
    use std::sync::Arc;

    fn chat_app(completer: CannedCompleter) -> App {
        let orchestrator = Orchestrator::new(
            Arc::new(completer),
            Arc::new(HistorySink::disabled()),
            None,
        );
        App::new(
            orchestrator,
            HistoryStore::Disabled,
            UIConfig::default(),
            registry::resolve(&["gpt"]).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_copy_command_arguments() {
        let mut app = chat_app(CannedCompleter::new());

        handle_command(&mut app, "copy zero").await;
        assert_eq!(app.status_message.as_deref(), Some("Usage: :copy [panel number]"));
        handle_command(&mut app, "copy 0").await;
        assert_eq!(app.status_message.as_deref(), Some("Usage: :copy [panel number]"));

        handle_command(&mut app, "copy 2").await;
        assert_eq!(app.status_message.as_deref(), Some("Nothing to copy in panel 2"));
        handle_command(&mut app, "y").await;
        assert_eq!(app.status_message.as_deref(), Some("Nothing to copy in panel 1"));
    }

    #[tokio::test]
    async fn test_clear_command_drops_the_active_turn() {
        let mut app = chat_app(CannedCompleter::new().reply("gpt", Ok("answer")));
        app.input = "hi".to_string();
        assert!(app.submit_input());

        handle_command(&mut app, "clear").await;
        assert_eq!(app.turns().count(), 0);
        assert_eq!(app.status_message.as_deref(), Some("Chat cleared"));
    }
}

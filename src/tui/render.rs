use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Tabs, Wrap},
    Frame,
};

use crate::chat::{EntryState, ResponseEntry};
use crate::constants::{HISTORY_PREVIEW_CHARS, OPENROUTER_KEYS_URL, UI_COLLAPSED_PANEL_WIDTH};
use crate::models::{ModelCategory, ModelDescriptor};
use crate::tui::app::{estimate_tokens, App, AppState, Screen};
use crate::tui::markdown::parse_markdown;

/// Render the main UI
pub fn render_ui(frame: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .margin(0)
        .constraints([
            Constraint::Length(3), // Header
            Constraint::Min(10),   // Main content
            Constraint::Length(3), // Input
            Constraint::Length(1), // Status bar
        ])
        .split(frame.area());

    render_header(frame, chunks[0], app);

    match app.screen {
        Screen::Chat => render_chat(frame, chunks[1], app),
        Screen::ModelSelect => render_model_select(frame, chunks[1], app),
        Screen::History => render_history(frame, chunks[1], app),
        Screen::ApiKey => render_api_key(frame, chunks[1], app),
    }

    render_input(frame, chunks[2], app);
    render_status_bar(frame, chunks[3], app);
}

fn render_header(frame: &mut Frame, area: Rect, app: &App) {
    let names: Vec<&str> = app.selected.iter().map(|m| m.display_name.as_str()).collect();
    let models = if names.is_empty() {
        "none".to_string()
    } else {
        names.join(", ")
    };
    let user = app
        .identity
        .as_ref()
        .map(|i| i.label().to_string())
        .unwrap_or_else(|| "not signed in".to_string());

    let header = Paragraph::new(Line::from(vec![
        Span::styled(
            "Chorus",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(" | Models: "),
        Span::styled(models, Style::default().fg(Color::Green)),
        Span::raw(" | "),
        Span::styled(user, Style::default().fg(Color::Gray)),
    ]))
    .block(
        Block::default()
            .borders(Borders::BOTTOM)
            .border_style(Style::default().fg(Color::DarkGray)),
    )
    .alignment(Alignment::Center);

    frame.render_widget(header, area);
}

/// One model's answers side by side with the others
fn render_chat(frame: &mut Frame, area: Rect, app: &App) {
    let models = app.panel_models();
    if models.is_empty() {
        let hint = Paragraph::new("No models selected. Press m (normal mode) to pick some.")
            .style(Style::default().fg(Color::DarkGray))
            .block(Block::default().borders(Borders::ALL))
            .alignment(Alignment::Center);
        frame.render_widget(hint, area);
        return;
    }

    let constraints: Vec<Constraint> = models
        .iter()
        .map(|m| {
            if app.is_collapsed(&m.id) {
                Constraint::Length(UI_COLLAPSED_PANEL_WIDTH)
            } else {
                Constraint::Fill(1)
            }
        })
        .collect();
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints(constraints)
        .split(area);

    for (idx, (model, column)) in models.iter().zip(columns.iter()).enumerate() {
        if app.is_collapsed(&model.id) {
            let block = Block::default()
                .title(format!(" {} ", idx + 1))
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::DarkGray));
            frame.render_widget(block, *column);
            continue;
        }
        render_column(frame, *column, app, idx, model);
    }
}

fn render_column(frame: &mut Frame, area: Rect, app: &App, idx: usize, model: &ModelDescriptor) {
    let mut lines: Vec<Line<'static>> = Vec::new();

    for turn in app.turns() {
        let Some(entry) = turn.entry(&model.id) else {
            continue;
        };
        if !lines.is_empty() {
            lines.push(Line::default());
        }
        lines.push(Line::from(Span::styled(
            format!("> {}", turn.prompt_text),
            Style::default()
                .fg(Color::Blue)
                .add_modifier(Modifier::BOLD),
        )));
        lines.push(Line::default());
        lines.extend(entry_lines(entry, app.ui.show_token_estimate));
    }

    let inner_width = area.width.saturating_sub(2).max(1);
    let inner_height = area.height.saturating_sub(2);
    let total = wrapped_height(&lines, inner_width);
    let scroll = total
        .saturating_sub(inner_height)
        .saturating_sub(app.scroll_offset);

    let paragraph = Paragraph::new(lines)
        .block(
            Block::default()
                .title(format!(
                    " {} {} ({}) ",
                    idx + 1,
                    model.display_name,
                    model.provider_label
                ))
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::DarkGray)),
        )
        .wrap(Wrap { trim: false })
        .scroll((scroll, 0));

    frame.render_widget(paragraph, area);
}

fn entry_lines(entry: &ResponseEntry, show_tokens: bool) -> Vec<Line<'static>> {
    match entry.state {
        EntryState::Pending => vec![Line::from(Span::styled(
            "Thinking...",
            Style::default()
                .fg(Color::DarkGray)
                .add_modifier(Modifier::ITALIC),
        ))],
        EntryState::Revealing => {
            let mut lines = parse_markdown(&entry.visible_text, Style::default());
            let cursor = Span::styled("▌", Style::default().fg(Color::Green));
            match lines.last_mut() {
                Some(last) => last.spans.push(cursor),
                None => lines.push(Line::from(cursor)),
            }
            lines
        }
        EntryState::Complete => {
            let text = entry.full_text.as_deref().unwrap_or(&entry.visible_text);
            let mut lines = parse_markdown(text, Style::default());
            if show_tokens {
                lines.push(Line::from(Span::styled(
                    format!("~{} tokens", estimate_tokens(text)),
                    Style::default().fg(Color::DarkGray),
                )));
            }
            lines
        }
        EntryState::Failed => vec![Line::from(Span::styled(
            format!(
                "Error: {}",
                entry.failure_reason.as_deref().unwrap_or("request failed")
            ),
            Style::default().fg(Color::Red),
        ))],
    }
}

/// Rows `lines` take once wrapped to `width`
fn wrapped_height(lines: &[Line], width: u16) -> u16 {
    let width = width as usize;
    let rows: usize = lines
        .iter()
        .map(|line| line.width().max(1).div_ceil(width))
        .sum();
    rows.min(u16::MAX as usize) as u16
}

fn render_model_select(frame: &mut Frame, area: Rect, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(3), Constraint::Min(3)])
        .split(area);

    let selected_tab = ModelCategory::ALL
        .iter()
        .position(|c| *c == app.picker.category)
        .unwrap_or(0);
    let tabs = Tabs::new(ModelCategory::ALL.iter().map(|c| c.label()))
        .select(selected_tab)
        .highlight_style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::DarkGray))
                .title(" Tab: category "),
        );
    frame.render_widget(tabs, chunks[0]);

    let items: Vec<ListItem> = app
        .picker_models()
        .into_iter()
        .map(|model| {
            let mark = if app.is_selected(&model.id) { "[x]" } else { "[ ]" };
            ListItem::new(vec![
                Line::from(vec![
                    Span::styled(format!("{} ", mark), Style::default().fg(Color::Green)),
                    Span::styled(
                        model.display_name.clone(),
                        Style::default().add_modifier(Modifier::BOLD),
                    ),
                    Span::raw(format!(" ({})", model.provider_label)),
                ]),
                Line::from(Span::styled(
                    format!("    {}", model.description),
                    Style::default().fg(Color::DarkGray),
                )),
            ])
        })
        .collect();

    let title = format!(
        " Select models ({}/{}) ",
        app.selected.len(),
        app.ui.max_models
    );
    let list = List::new(items)
        .block(
            Block::default()
                .title(title)
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan)),
        )
        .highlight_style(Style::default().bg(Color::Rgb(40, 40, 40)));

    let mut state = ListState::default().with_selected(Some(app.picker.cursor));
    frame.render_stateful_widget(list, chunks[1], &mut state);
}

fn render_history(frame: &mut Frame, area: Rect, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(35), Constraint::Percentage(65)])
        .split(area);

    let items: Vec<ListItem> = app
        .history
        .records
        .iter()
        .map(|record| {
            ListItem::new(Line::from(vec![
                Span::styled(
                    record.created_at.format("%m-%d %H:%M ").to_string(),
                    Style::default().fg(Color::DarkGray),
                ),
                Span::raw(record.preview(HISTORY_PREVIEW_CHARS)),
            ]))
        })
        .collect();

    let list = List::new(items)
        .block(
            Block::default()
                .title(format!(" History ({}) ", app.history.records.len()))
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::DarkGray)),
        )
        .highlight_style(Style::default().bg(Color::Rgb(40, 40, 40)));
    let mut state = ListState::default().with_selected(Some(app.history.selected));
    frame.render_stateful_widget(list, chunks[0], &mut state);

    let mut lines: Vec<Line<'static>> = Vec::new();
    if let Some(record) = app.history.current() {
        lines.push(Line::from(Span::styled(
            format!("> {}", record.prompt_text),
            Style::default()
                .fg(Color::Blue)
                .add_modifier(Modifier::BOLD),
        )));
        for name in &record.model_names {
            lines.push(Line::default());
            lines.push(Line::from(Span::styled(
                format!("── {} ──", name),
                Style::default()
                    .fg(Color::Green)
                    .add_modifier(Modifier::BOLD),
            )));
            match record.responses.get(name) {
                Some(response) => lines.extend(parse_markdown(&response.text, Style::default())),
                None => lines.push(Line::from(Span::styled(
                    "(no response saved)",
                    Style::default().fg(Color::DarkGray),
                ))),
            }
        }
    } else {
        lines.push(Line::from(Span::styled(
            "No saved prompts yet.",
            Style::default().fg(Color::DarkGray),
        )));
    }

    let detail = Paragraph::new(lines)
        .block(
            Block::default()
                .title(" d: delete | Esc: back ")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::DarkGray)),
        )
        .wrap(Wrap { trim: false });
    frame.render_widget(detail, chunks[1]);
}

fn render_api_key(frame: &mut Frame, area: Rect, app: &App) {
    let masked = "*".repeat(app.api_key_input.chars().count());
    let lines = vec![
        Line::from(Span::styled(
            "An OpenRouter API key is required",
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )),
        Line::default(),
        Line::from(format!("Get one at {}", OPENROUTER_KEYS_URL)),
        Line::from("It is kept in memory for this session only."),
        Line::default(),
        Line::from(vec![
            Span::raw("Key: "),
            Span::styled(masked, Style::default().fg(Color::Green)),
        ]),
        Line::default(),
        Line::from(Span::styled(
            "Enter: save | Esc: back",
            Style::default().fg(Color::DarkGray),
        )),
    ];

    let paragraph = Paragraph::new(lines)
        .block(
            Block::default()
                .title(" API key ")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Yellow)),
        )
        .alignment(Alignment::Center);
    frame.render_widget(paragraph, area);
}

/// Render the input area
fn render_input(frame: &mut Frame, area: Rect, app: &App) {
    let (text, title, color) = match (app.screen, app.state) {
        (Screen::ModelSelect, _) => (
            app.picker.query.clone(),
            " Search models (Space: toggle, Enter: done) ",
            Color::Cyan,
        ),
        (Screen::ApiKey, _) => (String::new(), " ", Color::DarkGray),
        (Screen::History, _) => (String::new(), " j/k: move ", Color::DarkGray),
        (Screen::Chat, AppState::Command) => (
            format!(":{}", app.command),
            " Enter Command (:help for a list) ",
            Color::Yellow,
        ),
        (Screen::Chat, AppState::Insert) => (
            app.input.clone(),
            " Message (Enter: send, Esc: normal mode) ",
            Color::White,
        ),
        (Screen::Chat, AppState::Normal) => (
            app.input.clone(),
            " i: type | m: models | h: history | 1-9: collapse | y: copy | q: quit ",
            Color::DarkGray,
        ),
    };

    let cursor_offset = text.chars().count() as u16;
    let input = Paragraph::new(text)
        .style(Style::default().fg(Color::White))
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(Style::default().fg(color))
                .title(title),
        );
    frame.render_widget(input, area);

    let typing = matches!(app.screen, Screen::ModelSelect)
        || matches!(
            (app.screen, app.state),
            (Screen::Chat, AppState::Insert | AppState::Command)
        );
    if typing {
        let cursor_x = (area.x + 1 + cursor_offset).min(area.x + area.width.saturating_sub(2));
        frame.set_cursor_position((cursor_x, area.y + 1));
    }
}

/// Render the status bar
fn render_status_bar(frame: &mut Frame, area: Rect, app: &App) {
    let (mode_str, mode_color) = match app.state {
        AppState::Normal => ("NORMAL", Color::Blue),
        AppState::Insert => ("INSERT", Color::Green),
        AppState::Command => ("COMMAND", Color::Yellow),
    };

    let status_text = if let Some(status) = &app.status_message {
        status.clone()
    } else if app.orchestrator.is_busy() {
        "Waiting for responses...".to_string()
    } else {
        "Ready".to_string()
    };

    let spans = vec![
        Span::styled(
            format!(" {} ", mode_str),
            Style::default()
                .bg(mode_color)
                .fg(Color::Black)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(" | "),
        Span::raw(status_text),
        Span::raw(" | "),
        Span::styled(
            format!("history: {}", app.history_store.label()),
            Style::default().fg(Color::DarkGray),
        ),
        Span::raw(" | "),
        Span::styled("Ctrl+C: quit", Style::default().fg(Color::DarkGray)),
    ];

    let status_bar = Paragraph::new(Line::from(spans))
        .style(Style::default().bg(Color::Black))
        .block(Block::default());

    frame.render_widget(status_bar, area);
}

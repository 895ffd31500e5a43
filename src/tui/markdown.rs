use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag, TagEnd};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};

/// Accumulates styled spans into lines while walking markdown events
struct LineBuilder {
    lines: Vec<Line<'static>>,
    spans: Vec<Span<'static>>,
    styles: Vec<Style>,
}

impl LineBuilder {
    fn new(base: Style) -> Self {
        Self {
            lines: Vec::new(),
            spans: Vec::new(),
            styles: vec![base],
        }
    }

    fn style(&self) -> Style {
        self.styles.last().copied().unwrap_or_default()
    }

    fn push_style(&mut self, style: Style) {
        self.styles.push(style);
    }

    fn pop_style(&mut self) {
        if self.styles.len() > 1 {
            self.styles.pop();
        }
    }

    fn span(&mut self, span: Span<'static>) {
        self.spans.push(span);
    }

    fn break_line(&mut self) {
        if !self.spans.is_empty() {
            self.lines.push(Line::from(std::mem::take(&mut self.spans)));
        }
    }

    fn blank_line(&mut self) {
        self.break_line();
        if self.lines.last().is_some_and(|l| !l.spans.is_empty()) {
            self.lines.push(Line::default());
        }
    }

    fn finish(mut self) -> Vec<Line<'static>> {
        self.break_line();
        while self.lines.last().is_some_and(|l| l.spans.is_empty()) {
            self.lines.pop();
        }
        self.lines
    }
}

/// Parse markdown and convert to styled ratatui Lines
pub fn parse_markdown(input: &str, base: Style) -> Vec<Line<'static>> {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TABLES);

    let mut out = LineBuilder::new(base);
    let mut in_code_block = false;
    let mut code_block = String::new();
    let mut list_depth: usize = 0;

    for event in Parser::new_ext(input, options) {
        match event {
            Event::Start(tag) => {
                let style = match tag {
                    Tag::Heading { level, .. } => {
                        out.break_line();
                        let color = match level {
                            HeadingLevel::H1 => Color::Cyan,
                            HeadingLevel::H2 => Color::Blue,
                            HeadingLevel::H3 => Color::Green,
                            _ => Color::Yellow,
                        };
                        base.fg(color).add_modifier(Modifier::BOLD)
                    }
                    Tag::Emphasis => out.style().add_modifier(Modifier::ITALIC),
                    Tag::Strong => out.style().add_modifier(Modifier::BOLD),
                    Tag::Strikethrough => out.style().add_modifier(Modifier::CROSSED_OUT),
                    Tag::CodeBlock(kind) => {
                        in_code_block = true;
                        code_block.clear();
                        out.break_line();
                        let lang = match kind {
                            CodeBlockKind::Fenced(lang) => lang.to_string(),
                            CodeBlockKind::Indented => String::new(),
                        };
                        out.span(Span::styled("```", Style::default().fg(Color::DarkGray)));
                        if !lang.is_empty() {
                            out.span(Span::styled(lang, Style::default().fg(Color::Magenta)));
                        }
                        out.break_line();
                        Style::default().fg(Color::Gray)
                    }
                    Tag::List(_) => {
                        list_depth += 1;
                        out.break_line();
                        out.style()
                    }
                    Tag::Item => {
                        out.span(Span::raw("  ".repeat(list_depth.saturating_sub(1))));
                        out.span(Span::styled("• ", Style::default().fg(Color::Yellow)));
                        out.style()
                    }
                    Tag::Link { .. } => {
                        Style::default().fg(Color::Blue).add_modifier(Modifier::UNDERLINED)
                    }
                    Tag::BlockQuote(_) => {
                        out.break_line();
                        out.span(Span::styled("│ ", Style::default().fg(Color::DarkGray)));
                        Style::default().fg(Color::Gray).add_modifier(Modifier::ITALIC)
                    }
                    _ => out.style(),
                };
                out.push_style(style);
            }
            Event::End(tag) => {
                out.pop_style();
                match tag {
                    TagEnd::Heading(_) | TagEnd::Paragraph => out.blank_line(),
                    TagEnd::Item | TagEnd::BlockQuote(_) => out.break_line(),
                    TagEnd::List(_) => {
                        list_depth = list_depth.saturating_sub(1);
                        if list_depth == 0 {
                            out.blank_line();
                        }
                    }
                    TagEnd::CodeBlock => {
                        in_code_block = false;
                        for line in code_block.lines() {
                            out.span(Span::styled(
                                line.to_string(),
                                Style::default().fg(Color::Gray),
                            ));
                            out.break_line();
                        }
                        out.span(Span::styled("```", Style::default().fg(Color::DarkGray)));
                        out.blank_line();
                        code_block.clear();
                    }
                    _ => {}
                }
            }
            Event::Text(text) => {
                if in_code_block {
                    code_block.push_str(&text);
                } else {
                    let style = out.style();
                    out.span(Span::styled(text.to_string(), style));
                }
            }
            Event::Code(code) => {
                out.span(Span::styled(
                    format!(" {} ", code),
                    Style::default().fg(Color::Yellow).bg(Color::Rgb(40, 40, 40)),
                ));
            }
            Event::SoftBreak | Event::HardBreak => out.break_line(),
            _ => {}
        }
    }

    // A half-revealed code fence never sees its end tag
    if in_code_block {
        for line in code_block.lines() {
            out.span(Span::styled(line.to_string(), Style::default().fg(Color::Gray)));
            out.break_line();
        }
    }

    out.finish()
}

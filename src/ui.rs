use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Layout, Rect},
    style::{Color, Modifier, Style, Stylize},
    text::{Line, Span, Text},
    widgets::{
        Block, Borders, Paragraph, Scrollbar, ScrollbarOrientation, ScrollbarState, Wrap,
    },
};
use serde_json::Value;

use crate::app::{App, BackendStatus, ChatRole, InputMode, Screen};

/// Parse a line of text and convert **bold** markdown to styled spans
fn parse_markdown_line(text: &str) -> Line<'static> {
    let mut spans: Vec<Span<'static>> = Vec::new();
    let mut chars = text.char_indices().peekable();
    let mut current_text = String::new();

    while let Some((_, c)) = chars.next() {
        if c == '*' {
            // Check for ** (bold)
            if chars.peek().map(|(_, c)| *c) == Some('*') {
                // Consume the second *
                chars.next();

                // Push any accumulated plain text
                if !current_text.is_empty() {
                    spans.push(Span::raw(std::mem::take(&mut current_text)));
                }

                // Find closing **
                let mut bold_text = String::new();
                let mut found_close = false;

                while let Some((_, c)) = chars.next() {
                    if c == '*' && chars.peek().map(|(_, c)| *c) == Some('*') {
                        chars.next(); // consume second *
                        found_close = true;
                        break;
                    }
                    bold_text.push(c);
                }

                if found_close && !bold_text.is_empty() {
                    spans.push(Span::styled(
                        bold_text,
                        Style::default().add_modifier(Modifier::BOLD),
                    ));
                } else {
                    // No closing **, treat as literal
                    current_text.push_str("**");
                    current_text.push_str(&bold_text);
                }
            } else {
                // Single * - could be italic, but for now treat as literal
                current_text.push(c);
            }
        } else {
            current_text.push(c);
        }
    }

    // Push any remaining text
    if !current_text.is_empty() {
        spans.push(Span::raw(current_text));
    }

    if spans.is_empty() {
        Line::default()
    } else {
        Line::from(spans)
    }
}

pub fn render(app: &mut App, frame: &mut Frame) {
    let area = frame.area();

    // Main layout: header, body, footer
    let [header_area, body_area, footer_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(0),
        Constraint::Length(1),
    ])
    .areas(area);

    render_header(app, frame, header_area);

    match app.screen {
        Screen::Home => render_home_screen(app, frame, body_area),
        Screen::Chat => render_chat_screen(app, frame, body_area),
        Screen::Ingest => render_ingest_screen(app, frame, body_area),
    }

    render_footer(app, frame, footer_area);
}

fn status_badge(status: BackendStatus) -> Span<'static> {
    let (text, color) = match status {
        BackendStatus::Checking => ("LAB STATUS: CHECKING", Color::DarkGray),
        BackendStatus::Waking => ("LAB STATUS: WAKING UP", Color::Yellow),
        BackendStatus::Online => ("LAB STATUS: ONLINE", Color::Green),
        BackendStatus::Offline => ("LAB STATUS: OFFLINE", Color::Red),
    };
    Span::styled(text, Style::default().fg(color).bold())
}

fn render_header(app: &App, frame: &mut Frame, area: Rect) {
    let title = Line::from(vec![
        Span::styled(" BREAKING B.A.D. ", Style::default().fg(Color::Green).bold()),
        status_badge(app.backend),
        Span::raw(" "),
        Span::styled(
            format!("v{}", env!("CARGO_PKG_VERSION")),
            Style::default().fg(Color::DarkGray),
        ),
    ]);

    let header = Paragraph::new(title).style(Style::default().bg(Color::DarkGray));
    frame.render_widget(header, area);
}

fn render_footer(app: &App, frame: &mut Frame, area: Rect) {
    let mode_style = match app.input_mode {
        InputMode::Normal => Style::default().bg(Color::Blue).fg(Color::White),
        InputMode::Editing => Style::default().bg(Color::Yellow).fg(Color::Black),
    };

    let mode_text = match app.screen {
        Screen::Home => " HOME ",
        Screen::Chat => " CHAT ",
        Screen::Ingest => " INGEST ",
    };

    // Key style: dark background with bright text for visibility on both light/dark terminals
    let key_style = Style::default().bg(Color::DarkGray).fg(Color::White);
    let label_style = Style::default().bg(Color::Black).fg(Color::White);

    let hints = match (app.screen, app.input_mode) {
        (Screen::Home, _) => vec![
            Span::styled(" c ", key_style),
            Span::styled(" chat ", label_style),
            Span::styled(" i ", key_style),
            Span::styled(" ingest ", label_style),
            Span::styled(" q ", key_style),
            Span::styled(" quit ", label_style),
        ],
        (Screen::Chat, InputMode::Normal) => vec![
            Span::styled(" j/k ", key_style),
            Span::styled(" scroll ", label_style),
            Span::styled(" i ", key_style),
            Span::styled(" type ", label_style),
            Span::styled(" Esc ", key_style),
            Span::styled(" home ", label_style),
            Span::styled(" q ", key_style),
            Span::styled(" quit ", label_style),
        ],
        (Screen::Chat, InputMode::Editing) => vec![
            Span::styled(" Enter ", key_style),
            Span::styled(" send ", label_style),
            Span::styled(" Esc ", key_style),
            Span::styled(" stop typing ", label_style),
        ],
        (Screen::Ingest, InputMode::Normal) => vec![
            Span::styled(" i ", key_style),
            Span::styled(" edit path ", label_style),
            Span::styled(" Esc ", key_style),
            Span::styled(" home ", label_style),
            Span::styled(" q ", key_style),
            Span::styled(" quit ", label_style),
        ],
        (Screen::Ingest, InputMode::Editing) => vec![
            Span::styled(" Enter ", key_style),
            Span::styled(" upload ", label_style),
            Span::styled(" Esc ", key_style),
            Span::styled(" stop typing ", label_style),
        ],
    };

    let footer_content = Line::from(
        vec![
            Span::styled(mode_text, mode_style),
            Span::styled(" ", label_style),
        ]
        .into_iter()
        .chain(hints)
        .collect::<Vec<_>>(),
    );

    let footer = Paragraph::new(footer_content).style(Style::default().bg(Color::Black));
    frame.render_widget(footer, area);
}

fn render_home_screen(app: &mut App, frame: &mut Frame, area: Rect) {
    let [_, badge_area, brand_area, title_area, quote_area, tagline_area, _, cards_area, _] =
        Layout::vertical([
            Constraint::Min(1),
            Constraint::Length(1),
            Constraint::Length(2),
            Constraint::Length(2),
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Length(1),
            Constraint::Length(7),
            Constraint::Min(1),
        ])
        .areas(area);

    let badge = Paragraph::new(Line::from(status_badge(app.backend))).alignment(Alignment::Center);
    frame.render_widget(badge, badge_area);

    let brand = Paragraph::new(Line::from(Span::styled(
        "B R E A K I N G   B . A . D .",
        Style::default().fg(Color::Green).bold(),
    )))
    .alignment(Alignment::Center);
    frame.render_widget(brand, brand_area);

    let title = Paragraph::new(vec![
        Line::from(Span::styled(
            "THE PUREST",
            Style::default().bold(),
        )),
        Line::from(Span::styled(
            "INTELLIGENCE",
            Style::default().fg(Color::Green).bold().italic(),
        )),
    ])
    .alignment(Alignment::Center);
    frame.render_widget(title, title_area);

    let quote = Paragraph::new(Line::from(Span::styled(
        "\"Breaking down files. Building up answers.\"",
        Style::default().fg(Color::Gray).italic(),
    )))
    .alignment(Alignment::Center);
    frame.render_widget(quote, quote_area);

    let tagline = Paragraph::new(Line::from(Span::styled(
        "BOT ANSWERING DIALOGUE  •  RAG CHATBOT",
        Style::default().fg(Color::DarkGray),
    )))
    .alignment(Alignment::Center);
    frame.render_widget(tagline, tagline_area);

    // Feature cards, three across, centered
    let card_width = (cards_area.width / 3).min(34);
    let total = card_width * 3;
    let left_pad = cards_area.width.saturating_sub(total) / 2;
    let [_, left, middle, right, _] = Layout::horizontal([
        Constraint::Length(left_pad),
        Constraint::Length(card_width),
        Constraint::Length(card_width),
        Constraint::Length(card_width),
        Constraint::Min(0),
    ])
    .areas(cards_area);

    render_feature_card(
        frame,
        left,
        " Cook the Data ",
        "Ingestion engine that breaks complex PDFs into digestible chunks.",
        Color::Green,
    );
    render_feature_card(
        frame,
        middle,
        " Blue Crystal SSE ",
        "Real-time streaming responses. Watch the reasoning cook before your eyes.",
        Color::Blue,
    );
    render_feature_card(
        frame,
        right,
        " The Empire Business ",
        "Scalable retrieval designed for high-performance data orchestration.",
        Color::DarkGray,
    );
}

fn render_feature_card(frame: &mut Frame, area: Rect, title: &str, text: &str, color: Color) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(color))
        .title(Span::styled(title.to_string(), Style::default().fg(color).bold()));

    let card = Paragraph::new(text.to_string())
        .style(Style::default().fg(Color::Gray))
        .wrap(Wrap { trim: true })
        .block(block);

    frame.render_widget(card, area);
}

fn render_chat_screen(app: &mut App, frame: &mut Frame, area: Rect) {
    let [chat_area, input_area] = Layout::vertical([
        Constraint::Min(0),
        Constraint::Length(3),
    ])
    .areas(area);

    // Store area and dimensions for mouse hit-testing and scroll
    // calculations (inner size minus borders)
    app.chat_area = Some(chat_area);
    app.chat_height = chat_area.height.saturating_sub(2);
    app.chat_width = chat_area.width.saturating_sub(2);

    let chat_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::DarkGray))
        .title(" The Laboratory ");

    let chat_text = if app.chat_messages.is_empty() && !app.awaiting_response {
        Text::from(Span::styled(
            "Ask the chemist...",
            Style::default().fg(Color::DarkGray),
        ))
    } else {
        Text::from(transcript_lines(app))
    };

    let total_lines = chat_text.lines.len() as u16;

    let chat = Paragraph::new(chat_text)
        .block(chat_block)
        .wrap(Wrap { trim: true })
        .scroll((app.chat_scroll, 0));

    frame.render_widget(chat, chat_area);

    // Render scrollbar
    if total_lines > app.chat_height {
        let scrollbar = Scrollbar::new(ScrollbarOrientation::VerticalRight)
            .begin_symbol(Some("^"))
            .end_symbol(Some("v"));

        let mut scrollbar_state =
            ScrollbarState::new(total_lines as usize).position(app.chat_scroll as usize);

        frame.render_stateful_widget(
            scrollbar,
            chat_area.inner(ratatui::layout::Margin {
                vertical: 1,
                horizontal: 0,
            }),
            &mut scrollbar_state,
        );
    }

    render_line_input(
        frame,
        input_area,
        &app.chat_input,
        app.chat_cursor,
        if app.awaiting_response {
            " Ask the chemist (cooking...) "
        } else {
            " Ask the chemist "
        },
        app.input_mode == InputMode::Editing,
    );
}

fn transcript_lines(app: &App) -> Vec<Line<'static>> {
    let mut lines: Vec<Line> = Vec::new();

    for msg in &app.chat_messages {
        match msg.role {
            ChatRole::User => {
                lines.push(Line::from(Span::styled(
                    "You:",
                    Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
                )));
                for line in msg.content.lines() {
                    lines.push(Line::from(line.to_string()));
                }
                lines.push(Line::default());
            }
            ChatRole::Assistant => {
                if let Some(thought) = &msg.thought {
                    lines.push(thought_header(false));
                    for line in thought.lines() {
                        lines.push(Line::from(Span::styled(line.to_string(), thought_style())));
                    }
                }
                lines.push(answer_header());
                if msg.content.is_empty() {
                    lines.push(Line::default());
                } else {
                    for line in msg.content.lines() {
                        lines.push(parse_markdown_line(line));
                    }
                }
                if !msg.sources.is_empty() {
                    lines.push(Line::from(Span::styled(
                        format!("Sources: {}", source_summary(&msg.sources)),
                        Style::default().fg(Color::DarkGray),
                    )));
                }
                lines.push(Line::default());
            }
        }
    }

    // The in-flight response, revealed by the typewriter
    if app.awaiting_response {
        if !app.stream.shown_thought.is_empty() {
            lines.push(thought_header(true));
            push_live_text(
                &mut lines,
                &app.stream.shown_thought,
                thought_style(),
                !app.stream.thought_caught_up(),
            );
        }
        lines.push(answer_header());
        if app.stream.shown_answer.is_empty() {
            // Animated ellipsis: cycles through ".", "..", "..."
            let dots = ".".repeat((app.animation_frame as usize) + 1);
            lines.push(Line::from(Span::styled(
                format!("Thinking{}", dots),
                Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
            )));
        } else {
            push_live_text(&mut lines, &app.stream.shown_answer, Style::default(), true);
        }
    }

    lines
}

fn thought_style() -> Style {
    Style::default().fg(Color::Gray).add_modifier(Modifier::ITALIC)
}

fn thought_header(streaming: bool) -> Line<'static> {
    let label = if streaming {
        "Cooking binary meth..."
    } else {
        "Cooking the data..."
    };
    Line::from(vec![
        Span::styled(" Th ", Style::default().bg(Color::Green).fg(Color::Black).bold()),
        Span::raw(" "),
        Span::styled(label, Style::default().fg(Color::Green).bold()),
    ])
}

fn answer_header() -> Line<'static> {
    Line::from(vec![
        Span::styled(" Az ", Style::default().bg(Color::Blue).fg(Color::Black).bold()),
        Span::raw(" "),
        Span::styled("The Pure Product", Style::default().fg(Color::Blue).bold()),
    ])
}

/// Render partially-revealed text, appending a block cursor to the last
/// line while the channel is still catching up.
fn push_live_text(lines: &mut Vec<Line<'static>>, text: &str, style: Style, cursor: bool) {
    let text_lines: Vec<&str> = text.lines().collect();
    let last = text_lines.len().saturating_sub(1);
    for (i, line) in text_lines.iter().enumerate() {
        let mut spans = vec![Span::styled(line.to_string(), style)];
        if cursor && i == last {
            spans.push(Span::styled("█", Style::default().fg(Color::Cyan)));
        }
        lines.push(Line::from(spans));
    }
}

/// Best-effort one-line label for an opaque citation record.
fn source_summary(sources: &[Value]) -> String {
    let labels: Vec<String> = sources.iter().map(source_label).collect();
    labels.join(", ")
}

fn source_label(source: &Value) -> String {
    let label = ["source", "title", "file", "name"]
        .iter()
        .find_map(|key| source.get(key).and_then(Value::as_str))
        .map(str::to_string)
        .unwrap_or_else(|| match source {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        });

    let truncated: String = label.chars().take(40).collect();
    if truncated.len() < label.len() {
        format!("{}…", truncated)
    } else {
        truncated
    }
}

fn render_ingest_screen(app: &mut App, frame: &mut Frame, area: Rect) {
    let [intro_area, input_area, status_area, _] = Layout::vertical([
        Constraint::Length(4),
        Constraint::Length(3),
        Constraint::Length(2),
        Constraint::Min(0),
    ])
    .areas(area);

    let intro = Paragraph::new(vec![
        Line::from(Span::styled(
            "INGESTION FACILITY",
            Style::default().fg(Color::Green).bold(),
        )),
        Line::from(Span::styled(
            "Securely cook your data into the system.",
            Style::default().fg(Color::Gray).italic(),
        )),
        Line::from(Span::styled(
            "Accepts .PDF format for high purity results.",
            Style::default().fg(Color::DarkGray),
        )),
    ]);
    frame.render_widget(intro, intro_area);

    let title = if app.ingest_busy {
        let dots = ".".repeat((app.animation_frame as usize) + 1);
        format!(" COOKING{} ", dots)
    } else {
        " Document path ".to_string()
    };
    render_line_input(
        frame,
        input_area,
        &app.ingest_input,
        app.ingest_cursor,
        &title,
        app.input_mode == InputMode::Editing && !app.ingest_busy,
    );

    if let Some(status) = &app.ingest_status {
        let (prefix, color) = if status.is_error {
            ("✖ ", Color::Red)
        } else {
            ("✔ ", Color::Green)
        };
        let line = Line::from(vec![
            Span::styled(prefix, Style::default().fg(color).bold()),
            Span::styled(status.text.clone(), Style::default().fg(color)),
        ]);
        frame.render_widget(Paragraph::new(line), status_area);
    }
}

/// Single-line input box with horizontal scrolling that keeps the cursor
/// visible.
fn render_line_input(
    frame: &mut Frame,
    area: Rect,
    input: &str,
    cursor: usize,
    title: &str,
    editing: bool,
) {
    let border_color = if editing { Color::Yellow } else { Color::DarkGray };

    let input_block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(border_color))
        .title(title.to_string());

    // Inner width = total width - 2 (for borders)
    let inner_width = area.width.saturating_sub(2) as usize;

    // Calculate scroll offset to keep cursor visible
    let scroll_offset = if inner_width == 0 {
        0
    } else if cursor >= inner_width {
        cursor - inner_width + 1
    } else {
        0
    };

    // Get the visible slice of the input
    let visible_text: String = input.chars().skip(scroll_offset).take(inner_width).collect();

    let paragraph = Paragraph::new(visible_text)
        .style(Style::default().fg(Color::Cyan))
        .block(input_block);

    frame.render_widget(paragraph, area);

    // Show cursor when editing
    if editing {
        let cursor_x = (cursor - scroll_offset) as u16;
        frame.set_cursor_position((area.x + cursor_x + 1, area.y + 1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_source_label_prefers_known_fields() {
        assert_eq!(source_label(&json!({"source": "notes.pdf"})), "notes.pdf");
        assert_eq!(source_label(&json!({"title": "Lab Manual"})), "Lab Manual");
        assert_eq!(source_label(&json!("plain string")), "plain string");
    }

    #[test]
    fn test_source_label_truncates_long_values() {
        let long = "x".repeat(80);
        let label = source_label(&json!({ "title": long }));
        assert!(label.chars().count() <= 41);
        assert!(label.ends_with('…'));
    }

    #[test]
    fn test_source_summary_joins_in_order() {
        let sources = vec![json!({"source": "a.pdf"}), json!({"source": "b.pdf"})];
        assert_eq!(source_summary(&sources), "a.pdf, b.pdf");
    }

    #[test]
    fn test_parse_markdown_line_bold() {
        let line = parse_markdown_line("say **my name**");
        assert_eq!(line.spans.len(), 2);
        assert_eq!(line.spans[1].content, "my name");
    }
}

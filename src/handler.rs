use crossterm::event::{KeyCode, KeyEvent, KeyModifiers, MouseEvent, MouseEventKind};
use ratatui::layout::Rect;
use tokio::sync::mpsc::UnboundedSender;
use tracing::warn;

use crate::app::{App, InputMode, Screen};
use crate::stream::StreamEvent;
use crate::tui::AppEvent;

/// Convert a character index to a byte index for UTF-8 safe string operations
fn char_to_byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

pub fn handle_event(app: &mut App, event: AppEvent, tx: &UnboundedSender<AppEvent>) {
    match event {
        AppEvent::Key(key) => handle_key(app, key, tx),
        AppEvent::Mouse(mouse) => handle_mouse(app, mouse),
        AppEvent::Resize(_, _) => {}
        AppEvent::ThoughtTick => app.on_thought_tick(),
        AppEvent::AnswerTick => app.on_answer_tick(),
        AppEvent::Stream(event) => app.apply_stream_event(event),
        AppEvent::Ingest(outcome) => app.finish_ingest(outcome),
        AppEvent::Backend(status) => app.backend = status,
    }
}

fn handle_key(app: &mut App, key: KeyEvent, tx: &UnboundedSender<AppEvent>) {
    // Global keys that work in any mode
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        app.should_quit = true;
        return;
    }

    match app.input_mode {
        InputMode::Normal => handle_normal_mode(app, key),
        InputMode::Editing => handle_editing_mode(app, key, tx),
    }
}

fn handle_normal_mode(app: &mut App, key: KeyEvent) {
    match app.screen {
        Screen::Home => handle_home_normal(app, key),
        Screen::Chat => handle_chat_normal(app, key),
        Screen::Ingest => handle_ingest_normal(app, key),
    }
}

fn handle_home_normal(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') => app.should_quit = true,
        KeyCode::Char('c') | KeyCode::Enter => {
            app.screen = Screen::Chat;
            app.input_mode = InputMode::Editing;
            app.chat_cursor = app.chat_input.chars().count();
        }
        KeyCode::Char('i') => {
            app.screen = Screen::Ingest;
            app.input_mode = InputMode::Editing;
            app.ingest_cursor = app.ingest_input.chars().count();
        }
        _ => {}
    }
}

fn handle_chat_normal(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') => app.should_quit = true,
        KeyCode::Esc | KeyCode::Char('h') => app.screen = Screen::Home,

        // Transcript scrolling
        KeyCode::Char('j') | KeyCode::Down => app.scroll_chat_down(),
        KeyCode::Char('k') | KeyCode::Up => app.scroll_chat_up(),
        KeyCode::Char('d') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.scroll_chat_half_page_down();
        }
        KeyCode::Char('u') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            app.scroll_chat_half_page_up();
        }
        KeyCode::Char('g') => app.chat_scroll = 0,
        KeyCode::Char('G') => app.scroll_chat_to_bottom(),

        // Back to typing
        KeyCode::Char('i') | KeyCode::Tab => {
            app.input_mode = InputMode::Editing;
            app.chat_cursor = app.chat_input.chars().count();
        }
        _ => {}
    }
}

fn handle_ingest_normal(app: &mut App, key: KeyEvent) {
    match key.code {
        KeyCode::Char('q') => app.should_quit = true,
        KeyCode::Esc | KeyCode::Char('h') => app.screen = Screen::Home,
        KeyCode::Char('i') | KeyCode::Tab => {
            app.input_mode = InputMode::Editing;
            app.ingest_cursor = app.ingest_input.chars().count();
        }
        _ => {}
    }
}

fn handle_editing_mode(app: &mut App, key: KeyEvent, tx: &UnboundedSender<AppEvent>) {
    match app.screen {
        Screen::Chat => handle_chat_editing(app, key, tx),
        Screen::Ingest => handle_ingest_editing(app, key, tx),
        Screen::Home => app.input_mode = InputMode::Normal,
    }
}

fn handle_chat_editing(app: &mut App, key: KeyEvent, tx: &UnboundedSender<AppEvent>) {
    match key.code {
        KeyCode::Esc => {
            app.input_mode = InputMode::Normal;
        }
        KeyCode::Enter => submit_chat(app, tx),
        _ => edit_input(key.code, &mut app.chat_input, &mut app.chat_cursor),
    }
}

fn handle_ingest_editing(app: &mut App, key: KeyEvent, tx: &UnboundedSender<AppEvent>) {
    match key.code {
        KeyCode::Esc => {
            app.input_mode = InputMode::Normal;
        }
        KeyCode::Enter => submit_ingest(app, tx),
        _ => edit_input(key.code, &mut app.ingest_input, &mut app.ingest_cursor),
    }
}

/// Shared single-line editing ops for the chat and ingest inputs.
fn edit_input(code: KeyCode, input: &mut String, cursor: &mut usize) {
    match code {
        KeyCode::Backspace => {
            if *cursor > 0 {
                *cursor -= 1;
                let byte_pos = char_to_byte_index(input, *cursor);
                input.remove(byte_pos);
            }
        }
        KeyCode::Delete => {
            let char_count = input.chars().count();
            if *cursor < char_count {
                let byte_pos = char_to_byte_index(input, *cursor);
                input.remove(byte_pos);
            }
        }
        KeyCode::Left => {
            *cursor = cursor.saturating_sub(1);
        }
        KeyCode::Right => {
            let char_count = input.chars().count();
            *cursor = (*cursor + 1).min(char_count);
        }
        KeyCode::Home => {
            *cursor = 0;
        }
        KeyCode::End => {
            *cursor = input.chars().count();
        }
        KeyCode::Char(c) => {
            let byte_pos = char_to_byte_index(input, *cursor);
            input.insert(byte_pos, c);
            *cursor += 1;
        }
        _ => {}
    }
}

/// Submission controller: gate the input, append the user turn, then open
/// the transport in the background. The task only talks back through the
/// event channel.
fn submit_chat(app: &mut App, tx: &UnboundedSender<AppEvent>) {
    let Some(question) = app.begin_submission() else {
        return;
    };
    let client = app.client.clone();
    let tx = tx.clone();
    tokio::spawn(async move {
        if let Err(err) = client.stream_chat(&question, &tx).await {
            warn!(error = %err, "chat transport failed");
            let _ = tx.send(AppEvent::Stream(StreamEvent::Failed(err.to_string())));
        }
    });
}

fn submit_ingest(app: &mut App, tx: &UnboundedSender<AppEvent>) {
    let Some(path) = app.begin_ingest() else {
        return;
    };
    let client = app.client.clone();
    let tx = tx.clone();
    tokio::spawn(async move {
        let outcome = client.ingest(&path).await.map_err(|err| err.to_string());
        let _ = tx.send(AppEvent::Ingest(outcome));
    });
}

/// Check if a point is within a rectangle
fn point_in_rect(x: u16, y: u16, rect: Rect) -> bool {
    x >= rect.x && x < rect.x + rect.width && y >= rect.y && y < rect.y + rect.height
}

fn handle_mouse(app: &mut App, mouse: MouseEvent) {
    if app.screen != Screen::Chat {
        return;
    }

    let in_chat = app
        .chat_area
        .map(|r| point_in_rect(mouse.column, mouse.row, r))
        .unwrap_or(false);
    if !in_chat {
        return;
    }

    match mouse.kind {
        MouseEventKind::ScrollDown => {
            app.scroll_chat_down();
            app.scroll_chat_down();
            app.scroll_chat_down();
        }
        MouseEventKind::ScrollUp => {
            app.scroll_chat_up();
            app.scroll_chat_up();
            app.scroll_chat_up();
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_char_to_byte_index_handles_multibyte() {
        let s = "héllo";
        assert_eq!(char_to_byte_index(s, 0), 0);
        assert_eq!(char_to_byte_index(s, 1), 1);
        assert_eq!(char_to_byte_index(s, 2), 3);
        assert_eq!(char_to_byte_index(s, 99), s.len());
    }

    #[test]
    fn test_edit_input_insert_and_delete() {
        let mut input = String::new();
        let mut cursor = 0;
        for c in "héllo".chars() {
            edit_input(KeyCode::Char(c), &mut input, &mut cursor);
        }
        assert_eq!(input, "héllo");
        assert_eq!(cursor, 5);

        edit_input(KeyCode::Backspace, &mut input, &mut cursor);
        assert_eq!(input, "héll");

        edit_input(KeyCode::Home, &mut input, &mut cursor);
        edit_input(KeyCode::Delete, &mut input, &mut cursor);
        assert_eq!(input, "éll");
        assert_eq!(cursor, 0);
    }
}

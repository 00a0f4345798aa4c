use ratatui::layout::Rect;
use serde_json::Value;
use std::path::PathBuf;
use tracing::warn;

use crate::client::ApiClient;
use crate::config::Config;
use crate::stream::{StreamEvent, StreamState, ANSWER_STEP, THOUGHT_STEP};

/// Fixed transcript entry for a dead stream. Phrased in-universe; the real
/// reason goes to the log.
pub const CONNECTION_LOST: &str =
    "The connection was lost. Someone must have talked to the DEA.";

/// Fixed status line for a failed upload.
pub const BATCH_COMPROMISED: &str = "The batch was compromised. Try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Home,
    Chat,
    Ingest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Editing,
}

/// Readiness-probe verdict, shown as the laboratory status badge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendStatus {
    Checking,
    Waking,
    Online,
    Offline,
}

#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    pub thought: Option<String>,
    pub sources: Vec<Value>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
            thought: None,
            sources: Vec::new(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
            thought: None,
            sources: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone)]
pub struct IngestStatus {
    pub text: String,
    pub is_error: bool,
}

pub struct App {
    // Core state
    pub should_quit: bool,
    pub screen: Screen,
    pub input_mode: InputMode,
    pub backend: BackendStatus,

    // Transcript state (append-only history + the in-flight response)
    pub chat_messages: Vec<ChatMessage>,
    pub stream: StreamState,
    pub awaiting_response: bool,

    // Chat input
    pub chat_input: String,
    pub chat_cursor: usize, // cursor position in chat_input, in chars

    // Chat viewport
    pub chat_scroll: u16,
    pub chat_height: u16, // Height of chat area for scroll calculations
    pub chat_width: u16,  // Width of chat area for wrap calculations
    pub chat_area: Option<Rect>, // For mouse hit-testing (updated during render)

    // Ingestion form
    pub ingest_input: String,
    pub ingest_cursor: usize,
    pub ingest_busy: bool,
    pub ingest_status: Option<IngestStatus>,

    // Animation state
    pub animation_frame: u8, // 0-2 for ellipsis animation
    anim_ticks: u8,

    // Backend API
    pub client: ApiClient,
}

impl App {
    pub fn new(config: &Config) -> Self {
        Self {
            should_quit: false,
            screen: Screen::Home,
            input_mode: InputMode::Normal,
            backend: BackendStatus::Checking,

            chat_messages: Vec::new(),
            stream: StreamState::default(),
            awaiting_response: false,

            chat_input: String::new(),
            chat_cursor: 0,

            chat_scroll: 0,
            chat_height: 0,
            chat_width: 0,
            chat_area: None,

            ingest_input: String::new(),
            ingest_cursor: 0,
            ingest_busy: false,
            ingest_status: None,

            animation_frame: 0,
            anim_ticks: 0,

            client: ApiClient::new(config),
        }
    }

    /// Submission gate: non-empty input, probe finished, nothing in flight.
    pub fn can_submit(&self) -> bool {
        !self.chat_input.trim().is_empty()
            && !self.awaiting_response
            && !matches!(self.backend, BackendStatus::Checking | BackendStatus::Waking)
    }

    /// Accept the pending input: append the user message synchronously,
    /// clear the input, and activate a fresh stream. Returns the question to
    /// send, or None when the gate rejects the submission (a no-op).
    pub fn begin_submission(&mut self) -> Option<String> {
        if !self.can_submit() {
            return None;
        }
        let question = self.chat_input.trim().to_string();
        self.chat_messages.push(ChatMessage::user(question.clone()));
        self.chat_input.clear();
        self.chat_cursor = 0;
        self.stream.activate();
        self.awaiting_response = true;
        self.scroll_chat_to_bottom();
        Some(question)
    }

    pub fn apply_stream_event(&mut self, event: StreamEvent) {
        match event {
            StreamEvent::Delta(delta) => {
                self.stream.apply(delta);
                self.scroll_chat_to_bottom();
                self.try_finalize();
            }
            StreamEvent::Done => {
                self.stream.complete();
                self.try_finalize();
            }
            StreamEvent::Failed(reason) => self.fail_stream(&reason),
        }
    }

    pub fn on_thought_tick(&mut self) {
        if self.stream.advance_thought(THOUGHT_STEP) {
            self.scroll_chat_to_bottom();
            self.try_finalize();
        }
    }

    pub fn on_answer_tick(&mut self) {
        self.tick_animation();
        if self.stream.advance_answer(ANSWER_STEP) {
            self.scroll_chat_to_bottom();
            self.try_finalize();
        }
    }

    /// The level-triggered finalization gate: mint an immutable message the
    /// instant the stream is complete and both displays have caught up.
    /// Also retires a degenerate empty stream without minting anything.
    pub fn try_finalize(&mut self) {
        if self.stream.ready_to_finalize() {
            let thought = std::mem::take(&mut self.stream.raw_thought);
            let message = ChatMessage {
                role: ChatRole::Assistant,
                content: std::mem::take(&mut self.stream.raw_answer),
                thought: (!thought.is_empty()).then_some(thought),
                sources: std::mem::take(&mut self.stream.pending_sources),
            };
            self.chat_messages.push(message);
            self.stream.reset();
            self.awaiting_response = false;
            self.scroll_chat_to_bottom();
        } else if self.stream.empty_completion() {
            self.stream.reset();
            self.awaiting_response = false;
        }
    }

    /// Transport failure: drop the partial stream in full and surface the
    /// fixed error message as an ordinary chat turn.
    pub fn fail_stream(&mut self, reason: &str) {
        warn!(reason = %reason, "chat stream failed; discarding partial response");
        self.stream.reset();
        self.awaiting_response = false;
        self.chat_messages.push(ChatMessage::assistant(CONNECTION_LOST));
        self.scroll_chat_to_bottom();
    }

    // Ingestion form

    pub fn can_ingest(&self) -> bool {
        !self.ingest_input.trim().is_empty()
            && !self.ingest_busy
            && !matches!(self.backend, BackendStatus::Checking | BackendStatus::Waking)
    }

    /// Accept the upload form. Returns the path to send, or None when the
    /// gate rejects it.
    pub fn begin_ingest(&mut self) -> Option<PathBuf> {
        if !self.can_ingest() {
            return None;
        }
        self.ingest_busy = true;
        self.ingest_status = None;
        Some(PathBuf::from(self.ingest_input.trim()))
    }

    pub fn finish_ingest(&mut self, outcome: Result<u64, String>) {
        self.ingest_busy = false;
        match outcome {
            Ok(chunks) => {
                self.ingest_input.clear();
                self.ingest_cursor = 0;
                self.ingest_status = Some(IngestStatus {
                    text: format!("Batch processed: {chunks} chemical units secured."),
                    is_error: false,
                });
            }
            Err(reason) => {
                warn!(reason = %reason, "document upload failed");
                self.ingest_status = Some(IngestStatus {
                    text: BATCH_COMPROMISED.to_string(),
                    is_error: true,
                });
            }
        }
    }

    /// Tick animation frame, driven by the answer ticker (every 20 ticks is
    /// roughly the old 300ms cadence).
    fn tick_animation(&mut self) {
        if !(self.awaiting_response || self.ingest_busy) {
            return;
        }
        self.anim_ticks = self.anim_ticks.wrapping_add(1);
        if self.anim_ticks % 20 == 0 {
            self.animation_frame = (self.animation_frame + 1) % 3;
        }
    }

    // Chat scrolling

    pub fn scroll_chat_down(&mut self) {
        let max_scroll = self.chat_line_count().saturating_sub(self.chat_height);
        if self.chat_scroll < max_scroll {
            self.chat_scroll = self.chat_scroll.saturating_add(1);
        }
    }

    pub fn scroll_chat_up(&mut self) {
        self.chat_scroll = self.chat_scroll.saturating_sub(1);
    }

    pub fn scroll_chat_half_page_down(&mut self) {
        let half_page = self.chat_height / 2;
        let max_scroll = self.chat_line_count().saturating_sub(self.chat_height);
        self.chat_scroll = (self.chat_scroll + half_page).min(max_scroll);
    }

    pub fn scroll_chat_half_page_up(&mut self) {
        let half_page = self.chat_height / 2;
        self.chat_scroll = self.chat_scroll.saturating_sub(half_page);
    }

    /// Keep the newest content visible while the transcript grows.
    pub fn scroll_chat_to_bottom(&mut self) {
        let total_lines = self.chat_line_count();
        let visible_height = if self.chat_height > 0 { self.chat_height } else { 20 };

        if total_lines > visible_height {
            self.chat_scroll = total_lines.saturating_sub(visible_height);
        } else {
            self.chat_scroll = 0;
        }
    }

    /// Estimate the rendered height of the transcript, counting wrapped
    /// lines the way the chat pane lays them out.
    fn chat_line_count(&self) -> u16 {
        // Use actual chat width for wrap calculation, default to 50 if not set
        let wrap_width = if self.chat_width > 0 {
            self.chat_width as usize
        } else {
            50
        };

        let mut total_lines: u16 = 0;

        for msg in &self.chat_messages {
            if let Some(thought) = &msg.thought {
                total_lines += 1; // thought header
                total_lines += wrapped_line_count(thought, wrap_width);
            }
            total_lines += 1; // Role line ("You:" or the answer header)
            total_lines += wrapped_line_count(&msg.content, wrap_width);
            if !msg.sources.is_empty() {
                total_lines += 1;
            }
            total_lines += 1; // Blank line after message
        }

        if self.awaiting_response {
            if !self.stream.shown_thought.is_empty() {
                total_lines += 1;
                total_lines += wrapped_line_count(&self.stream.shown_thought, wrap_width);
            }
            // Answer header is shown as soon as the response starts, so the
            // thinking indicator has somewhere to live.
            total_lines += 1;
            if self.stream.shown_answer.is_empty() {
                total_lines += 1; // "Thinking..."
            } else {
                total_lines += wrapped_line_count(&self.stream.shown_answer, wrap_width);
            }
        }

        total_lines
    }
}

fn wrapped_line_count(text: &str, wrap_width: usize) -> u16 {
    let mut total: u16 = 0;
    for line in text.lines() {
        // Use character count, not byte length, for proper UTF-8 handling
        let char_count = line.chars().count();
        if char_count == 0 {
            total += 1; // Empty line still takes one line
        } else {
            total += ((char_count / wrap_width) + 1) as u16;
        }
    }
    total.max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::ChatDelta;
    use serde_json::json;

    fn test_app() -> App {
        let mut app = App::new(&Config::new());
        app.backend = BackendStatus::Online;
        app
    }

    fn answer(text: &str) -> StreamEvent {
        StreamEvent::Delta(ChatDelta {
            answer: Some(text.to_string()),
            ..ChatDelta::default()
        })
    }

    fn thought(text: &str) -> StreamEvent {
        StreamEvent::Delta(ChatDelta {
            thought: Some(text.to_string()),
            ..ChatDelta::default()
        })
    }

    /// Run both tickers until neither channel moves any more.
    fn run_ticks(app: &mut App) {
        for _ in 0..1000 {
            let before = (app.stream.shown_answer.len(), app.stream.shown_thought.len());
            app.on_answer_tick();
            app.on_thought_tick();
            if !app.awaiting_response {
                return;
            }
            let after = (app.stream.shown_answer.len(), app.stream.shown_thought.len());
            if before == after {
                return;
            }
        }
    }

    #[test]
    fn test_submission_appends_user_message_synchronously() {
        let mut app = test_app();
        app.chat_input = "  what is the formula?  ".to_string();
        let question = app.begin_submission().unwrap();
        assert_eq!(question, "what is the formula?");
        assert_eq!(app.chat_messages.len(), 1);
        assert_eq!(app.chat_messages[0].role, ChatRole::User);
        assert_eq!(app.chat_messages[0].content, "what is the formula?");
        assert!(app.chat_input.is_empty());
        assert!(app.awaiting_response);
        assert!(app.stream.is_active());
    }

    #[test]
    fn test_whitespace_submission_is_noop() {
        let mut app = test_app();
        app.chat_input = "   ".to_string();
        assert!(app.begin_submission().is_none());
        assert!(app.chat_messages.is_empty());
        assert!(!app.awaiting_response);
    }

    #[test]
    fn test_submission_while_streaming_is_noop() {
        let mut app = test_app();
        app.chat_input = "first".to_string();
        assert!(app.begin_submission().is_some());

        app.chat_input = "second".to_string();
        assert!(app.begin_submission().is_none());
        assert_eq!(app.chat_messages.len(), 1);
        assert_eq!(app.chat_input, "second");
        assert!(app.stream.raw_answer.is_empty());
    }

    #[test]
    fn test_submission_blocked_until_probe_finishes() {
        let mut app = test_app();
        app.backend = BackendStatus::Checking;
        app.chat_input = "hello".to_string();
        assert!(app.begin_submission().is_none());

        app.backend = BackendStatus::Offline;
        assert!(app.begin_submission().is_some());
    }

    #[test]
    fn test_answer_finalizes_after_catch_up() {
        let mut app = test_app();
        app.chat_input = "q".to_string();
        app.begin_submission().unwrap();

        app.apply_stream_event(answer("Hel"));
        app.apply_stream_event(answer("lo"));
        app.apply_stream_event(StreamEvent::Done);

        // Received in full, but the display has not caught up yet.
        assert!(app.awaiting_response);
        assert_eq!(app.chat_messages.len(), 1);

        run_ticks(&mut app);

        assert!(!app.awaiting_response);
        assert_eq!(app.chat_messages.len(), 2);
        let reply = &app.chat_messages[1];
        assert_eq!(reply.role, ChatRole::Assistant);
        assert_eq!(reply.content, "Hello");
        assert!(reply.thought.is_none());
        assert!(!app.stream.is_active());
    }

    #[test]
    fn test_thought_and_sources_carried_into_message() {
        let mut app = test_app();
        app.chat_input = "q".to_string();
        app.begin_submission().unwrap();

        app.apply_stream_event(StreamEvent::Delta(ChatDelta {
            sources: Some(vec![json!({"id": "a"})]),
            ..ChatDelta::default()
        }));
        app.apply_stream_event(thought("Let me "));
        app.apply_stream_event(thought("think."));
        app.apply_stream_event(answer("42"));
        app.apply_stream_event(StreamEvent::Delta(ChatDelta {
            sources: Some(vec![json!({"id": "b"})]),
            ..ChatDelta::default()
        }));
        app.apply_stream_event(StreamEvent::Done);
        run_ticks(&mut app);

        let reply = &app.chat_messages[1];
        assert_eq!(reply.content, "42");
        assert_eq!(reply.thought.as_deref(), Some("Let me think."));
        // Snapshots overwrite; only the last one survives.
        assert_eq!(reply.sources, vec![json!({"id": "b"})]);
    }

    #[test]
    fn test_transport_failure_discards_partial_content() {
        let mut app = test_app();
        app.chat_input = "q".to_string();
        app.begin_submission().unwrap();

        app.apply_stream_event(answer("Par"));
        app.apply_stream_event(StreamEvent::Failed("connection reset".to_string()));

        assert_eq!(app.chat_messages.len(), 2);
        assert_eq!(app.chat_messages[1].content, CONNECTION_LOST);
        assert!(app.chat_messages.iter().all(|m| !m.content.contains("Par")));
        assert!(!app.awaiting_response);
        assert!(!app.stream.is_active());

        // The client accepts a new submission after the failure.
        app.chat_input = "again".to_string();
        assert!(app.can_submit());
    }

    #[test]
    fn test_empty_completion_is_silent() {
        let mut app = test_app();
        app.chat_input = "q".to_string();
        app.begin_submission().unwrap();

        app.apply_stream_event(StreamEvent::Done);

        // No assistant message, but the client is submittable again.
        assert_eq!(app.chat_messages.len(), 1);
        assert!(!app.awaiting_response);
        assert!(!app.stream.is_active());
    }

    #[test]
    fn test_gate_never_fires_mid_catch_up() {
        let mut app = test_app();
        app.chat_input = "q".to_string();
        app.begin_submission().unwrap();

        app.apply_stream_event(answer("a long answer that needs several ticks"));
        app.apply_stream_event(StreamEvent::Done);

        while !app.stream.answer_caught_up() {
            assert_eq!(app.chat_messages.len(), 1);
            assert!(app.awaiting_response);
            app.on_answer_tick();
        }
        app.try_finalize();
        assert_eq!(app.chat_messages.len(), 2);
    }

    #[test]
    fn test_ingest_gate_and_outcomes() {
        let mut app = test_app();
        assert!(app.begin_ingest().is_none());

        app.ingest_input = "/tmp/notes.pdf".to_string();
        let path = app.begin_ingest().unwrap();
        assert_eq!(path, PathBuf::from("/tmp/notes.pdf"));
        assert!(app.ingest_busy);

        // Busy form rejects a second upload.
        assert!(app.begin_ingest().is_none());

        app.finish_ingest(Ok(12));
        assert!(!app.ingest_busy);
        let status = app.ingest_status.as_ref().unwrap();
        assert!(!status.is_error);
        assert_eq!(status.text, "Batch processed: 12 chemical units secured.");
        assert!(app.ingest_input.is_empty());

        app.ingest_input = "/tmp/other.pdf".to_string();
        app.begin_ingest().unwrap();
        app.finish_ingest(Err("410 gone".to_string()));
        let status = app.ingest_status.as_ref().unwrap();
        assert!(status.is_error);
        assert_eq!(status.text, BATCH_COMPROMISED);
        // A failed upload keeps the path for retry.
        assert_eq!(app.ingest_input, "/tmp/other.pdf");
    }

    #[test]
    fn test_wrapped_line_count() {
        assert_eq!(wrapped_line_count("", 10), 1);
        assert_eq!(wrapped_line_count("short", 10), 1);
        assert_eq!(wrapped_line_count("fifteen chars..", 10), 2);
        assert_eq!(wrapped_line_count("one\ntwo", 10), 2);
    }
}

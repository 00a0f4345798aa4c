use serde::Deserialize;
use serde_json::Value;

/// Marker prefix for event-bearing lines in the chat stream.
pub const EVENT_PREFIX: &str = "data: ";

/// Reveal cadence for the typewriter catch-up. The reasoning channel
/// deliberately trails the answer channel: smaller step, slower tick.
pub const THOUGHT_TICK_MS: u64 = 30;
pub const THOUGHT_STEP: usize = 2;
pub const ANSWER_TICK_MS: u64 = 15;
pub const ANSWER_STEP: usize = 4;

/// One decoded event from the chat stream. Any combination of fields may be
/// present on a single frame.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatDelta {
    pub answer: Option<String>,
    pub thought: Option<String>,
    pub sources: Option<Vec<Value>>,
}

impl ChatDelta {
    /// True when the frame carried none of the recognized keys.
    pub fn is_empty(&self) -> bool {
        self.answer.is_none() && self.thought.is_none() && self.sources.is_none()
    }
}

/// Messages sent from the transport task to the event loop.
#[derive(Debug)]
pub enum StreamEvent {
    /// A decoded event frame.
    Delta(ChatDelta),
    /// The transport closed normally.
    Done,
    /// The transport failed; the payload is for the log, not the user.
    Failed(String),
}

/// Decode a single stream line. Returns `Ok(None)` for lines without the
/// event marker and `Err` for a marked line whose payload is not valid JSON.
pub fn decode_frame(line: &str) -> anyhow::Result<Option<ChatDelta>> {
    let Some(data) = line.trim().strip_prefix(EVENT_PREFIX) else {
        return Ok(None);
    };
    let delta = serde_json::from_str(data)?;
    Ok(Some(delta))
}

/// Reassembles newline-delimited lines from arbitrarily-chunked input, so an
/// event frame split across transport chunks is decoded whole. Buffers raw
/// bytes: a chunk boundary may land inside a multi-byte character, so text
/// decoding only happens on complete lines.
#[derive(Debug, Default)]
pub struct LineFramer {
    buffer: Vec<u8>,
}

impl LineFramer {
    /// Feed one transport chunk; returns every line completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line = String::from_utf8_lossy(&self.buffer[..pos]).into_owned();
            self.buffer.drain(..=pos);
            lines.push(line);
        }
        lines
    }

    /// Flush whatever remains after the transport closes without a trailing
    /// newline.
    pub fn finish(self) -> Option<String> {
        if self.buffer.is_empty() {
            None
        } else {
            Some(String::from_utf8_lossy(&self.buffer).into_owned())
        }
    }
}

/// Transient accumulator for one in-flight assistant response.
///
/// `shown_*` is always a byte prefix of the matching `raw_*` field: raw text
/// only ever grows by appending, and shown text only ever grows by copying
/// characters out of raw. All prefix arithmetic happens on char boundaries.
#[derive(Debug, Default)]
pub struct StreamState {
    active: bool,
    pub raw_answer: String,
    pub raw_thought: String,
    pub shown_answer: String,
    pub shown_thought: String,
    pub pending_sources: Vec<Value>,
    pub receive_complete: bool,
}

impl StreamState {
    /// Begin a fresh response cycle. Clears any leftovers from the previous
    /// one.
    pub fn activate(&mut self) {
        *self = Self {
            active: true,
            ..Self::default()
        };
    }

    /// Return to the inactive, empty form.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Apply one decoded frame. Field order matches the wire contract:
    /// sources snapshot first, then thought, then answer. Sources replace
    /// the pending list wholesale; they are never merged.
    pub fn apply(&mut self, delta: ChatDelta) {
        if !self.active {
            return;
        }
        if let Some(sources) = delta.sources {
            self.pending_sources = sources;
        }
        if let Some(thought) = delta.thought {
            self.raw_thought.push_str(&thought);
        }
        if let Some(answer) = delta.answer {
            self.raw_answer.push_str(&answer);
        }
    }

    /// The transport signalled a normal end-of-stream.
    pub fn complete(&mut self) {
        if self.active {
            self.receive_complete = true;
        }
    }

    /// Advance the reasoning display by up to `step` characters. Returns
    /// whether anything moved.
    pub fn advance_thought(&mut self, step: usize) -> bool {
        Self::advance(&self.raw_thought, &mut self.shown_thought, step)
    }

    /// Advance the answer display by up to `step` characters.
    pub fn advance_answer(&mut self, step: usize) -> bool {
        Self::advance(&self.raw_answer, &mut self.shown_answer, step)
    }

    fn advance(raw: &str, shown: &mut String, step: usize) -> bool {
        if shown.len() >= raw.len() {
            return false;
        }
        // shown is a byte prefix of raw, so its length always lands on a
        // char boundary of raw.
        shown.extend(raw[shown.len()..].chars().take(step));
        true
    }

    pub fn thought_caught_up(&self) -> bool {
        self.shown_thought.len() == self.raw_thought.len()
    }

    pub fn answer_caught_up(&self) -> bool {
        self.shown_answer.len() == self.raw_answer.len()
    }

    /// The finalization gate. Level-triggered: evaluated after every
    /// mutation that could satisfy it, never relied on as a one-shot
    /// callback.
    pub fn ready_to_finalize(&self) -> bool {
        self.active
            && self.receive_complete
            && self.thought_caught_up()
            && self.answer_caught_up()
            && !(self.raw_answer.is_empty() && self.raw_thought.is_empty())
    }

    /// The stream ended without ever carrying content; there is nothing to
    /// finalize.
    pub fn empty_completion(&self) -> bool {
        self.active
            && self.receive_complete
            && self.raw_answer.is_empty()
            && self.raw_thought.is_empty()
    }
}

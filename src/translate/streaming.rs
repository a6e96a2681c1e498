//! Turns `OpenAI` streaming chunks into Poe partial responses.
//!
//! [`FragmentRelay`] sees chunks one at a time and yields at most one
//! [`PartialResponse`] per chunk. Chunks without text (role announcements,
//! finish markers, usage trailers) produce nothing. It never buffers: text is
//! handed back from the same call that received it.

use super::openai_types::ChatCompletionChunk;
use super::poe_types::PartialResponse;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    NotStarted,
    Streaming,
    Done,
}

/// Per-request relay bookkeeping.
///
/// Usage:
///   let mut relay = FragmentRelay::new();
///   for chunk in openai_chunks {
///       if let Some(partial) = relay.process_chunk(&chunk) {
///           // send partial to Poe
///       }
///   }
///   relay.finish();
#[derive(Debug)]
pub struct FragmentRelay {
    state: RelayState,
    forwarded: usize,
    dropped: usize,
    finish_reason: Option<String>,
}

impl Default for FragmentRelay {
    fn default() -> Self {
        Self::new()
    }
}

impl FragmentRelay {
    pub fn new() -> Self {
        Self {
            state: RelayState::NotStarted,
            forwarded: 0,
            dropped: 0,
            finish_reason: None,
        }
    }

    pub fn state(&self) -> RelayState {
        self.state
    }

    /// Number of partial responses handed out so far.
    pub fn forwarded(&self) -> usize {
        self.forwarded
    }

    /// Number of chunks that carried no text.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn finish_reason(&self) -> Option<&str> {
        self.finish_reason.as_deref()
    }

    /// Process one upstream chunk, returning the text to forward, if any.
    pub fn process_chunk(&mut self, chunk: &ChatCompletionChunk) -> Option<PartialResponse> {
        match self.state {
            RelayState::Done => return None,
            RelayState::NotStarted => self.state = RelayState::Streaming,
            RelayState::Streaming => {}
        }

        if let Some(reason) = chunk.choices.first().and_then(|c| c.finish_reason.as_ref()) {
            self.finish_reason = Some(reason.clone());
        }

        match fragment_text(chunk) {
            Some(text) => {
                self.forwarded += 1;
                Some(PartialResponse::new(text))
            }
            None => {
                self.dropped += 1;
                None
            }
        }
    }

    /// Mark the upstream stream as ended. Later chunks are ignored.
    pub fn finish(&mut self) {
        self.state = RelayState::Done;
    }
}

/// Text carried by a chunk: the first choice's `delta.content`, when non-empty.
pub fn fragment_text(chunk: &ChatCompletionChunk) -> Option<&str> {
    chunk
        .choices
        .first()
        .and_then(|c| c.delta.content.as_deref())
        .filter(|s| !s.is_empty())
}

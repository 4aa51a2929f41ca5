//! Incremental Server-Sent-Event counting over raw response bytes.
//!
//! Lines end at `\n`; a line holding nothing but ASCII whitespace (including `\r`) is blank, and a
//! blank line ends an event. Chunk boundaries may fall anywhere, including inside a multi-byte
//! character. The framer keeps no bytes between chunks, only whether the current line and event
//! have content, so an unterminated line of any length costs nothing. It only observes bytes, it
//! never changes what is relayed.

#[derive(Clone, Debug, Default)]
pub struct SseFramer {
    line_has_content: bool,
    event_open: bool,
    events: usize,
}

impl SseFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one chunk and returns how many events it completed.
    pub fn push(&mut self, chunk: &[u8]) -> usize {
        let before = self.events;
        for byte in chunk {
            match byte {
                b'\n' => self.end_line(),
                b' ' | b'\t' | b'\r' | 0x0B | 0x0C => {}
                _ => self.line_has_content = true,
            }
        }
        self.events - before
    }

    /// Flushes a trailing line and any event left open at end of stream. Returns whether that
    /// completed an event.
    pub fn finish(&mut self) -> bool {
        let before = self.events;
        self.end_line();
        self.end_event();
        self.events > before
    }

    /// Events completed so far, including one flushed by [`SseFramer::finish`].
    pub fn event_count(&self) -> usize {
        self.events
    }

    /// True while a line or event has been started but not terminated.
    pub fn is_mid_event(&self) -> bool {
        self.line_has_content || self.event_open
    }

    fn end_line(&mut self) {
        if std::mem::take(&mut self.line_has_content) {
            self.event_open = true;
        } else {
            self.end_event();
        }
    }

    fn end_event(&mut self) {
        if std::mem::take(&mut self.event_open) {
            self.events += 1;
        }
    }
}

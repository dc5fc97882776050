//! Output buffering and stream normalization for run logs.
//!
//! This module provides `OutputBuffer`, a bounded ring buffer of display lines
//! fed from raw pseudo-terminal byte chunks. Chunks are decoded lossily,
//! stripped of ANSI escape sequences, and carriage-return-collapsed so
//! progress-style output renders the way a terminal would show it.

use std::collections::VecDeque;

use strip_ansi_escapes::strip;

/// Default cap on buffered lines, matching a long ansible run comfortably.
pub const DEFAULT_MAX_LINES: usize = 5000;

/// A fixed-capacity buffer of display lines with a tail-relative scroll offset.
///
/// `scroll == 0` means follow mode: the view window tracks the newest line.
/// `scroll > 0` is the number of lines the view sits back from the tail.
/// The buffer never adjusts scroll on write; follow re-pinning is the
/// caller's responsibility so the buffer stays a pure data structure.
#[derive(Debug, Clone)]
pub struct OutputBuffer {
    max_lines: usize,
    lines: VecDeque<String>,
    scroll: usize,
}

impl OutputBuffer {
    /// Creates a new `OutputBuffer` holding at most `max_lines` lines.
    pub fn new(max_lines: usize) -> Self {
        Self {
            max_lines,
            lines: VecDeque::with_capacity(max_lines.min(1024)),
            scroll: 0,
        }
    }

    /// Normalizes a raw chunk and appends the resulting display lines.
    ///
    /// Returns the lines that were appended, in order, so callers can mirror
    /// them to a log file. Oldest lines are evicted from the front once the
    /// buffer exceeds its capacity.
    pub fn append_bytes(&mut self, chunk: &[u8]) -> Vec<String> {
        let appended = normalize_chunk(chunk);
        for line in &appended {
            self.lines.push_back(line.clone());
        }
        while self.lines.len() > self.max_lines {
            self.lines.pop_front();
        }
        appended
    }

    /// Appends a single pre-formatted line (status messages, exit notices).
    pub fn push_line(&mut self, line: impl Into<String>) {
        self.lines.push_back(line.into());
        while self.lines.len() > self.max_lines {
            self.lines.pop_front();
        }
    }

    /// Empties the buffer and returns to follow mode.
    pub fn clear(&mut self) {
        self.lines.clear();
        self.scroll = 0;
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn scroll(&self) -> usize {
        self.scroll
    }

    /// Whether the view is pinned to the tail.
    pub fn is_following(&self) -> bool {
        self.scroll == 0
    }

    fn max_scroll(&self, visible: usize) -> usize {
        self.lines.len().saturating_sub(visible)
    }

    /// Moves the view `delta` lines back from the tail (negative = toward it),
    /// clamped to `[0, len - visible]`.
    pub fn scroll_by(&mut self, delta: isize, visible: usize) {
        let next = if delta >= 0 {
            self.scroll.saturating_add(delta as usize)
        } else {
            self.scroll.saturating_sub(delta.unsigned_abs())
        };
        self.scroll = next.min(self.max_scroll(visible));
    }

    pub fn page_up(&mut self, visible: usize) {
        self.scroll_by(visible as isize, visible);
    }

    pub fn page_down(&mut self, visible: usize) {
        self.scroll_by(-(visible as isize), visible);
    }

    pub fn to_top(&mut self, visible: usize) {
        self.scroll = self.max_scroll(visible);
    }

    pub fn to_bottom(&mut self) {
        self.scroll = 0;
    }

    /// Returns the window of lines currently in view for a pane of
    /// `visible` rows.
    pub fn window(&self, visible: usize) -> impl Iterator<Item = &str> {
        let start = self
            .lines
            .len()
            .saturating_sub(visible.saturating_add(self.scroll));
        self.lines.iter().skip(start).take(visible).map(String::as_str)
    }
}

impl Default for OutputBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_LINES)
    }
}

/// Converts a raw byte chunk into display lines.
///
/// Invalid UTF-8 is replaced, never rejected. CRLF pairs collapse to plain
/// newlines, within each logical line only the text after the last bare `\r`
/// survives (terminal overwrite behavior), and ANSI/VT100 escape sequences
/// are stripped from what remains. Carriage returns must be handled before
/// stripping: the escape stripper consumes control bytes, `\r` included.
/// A trailing newline does not produce an empty line; a chunk that ends
/// mid-line contributes its partial text as one line.
pub fn normalize_chunk(chunk: &[u8]) -> Vec<String> {
    let text = String::from_utf8_lossy(chunk).replace("\r\n", "\n");
    let mut segments: Vec<&str> = text.split('\n').collect();
    if segments.last() == Some(&"") {
        segments.pop();
    }
    segments
        .into_iter()
        .map(|segment| {
            let kept = segment.rsplit('\r').next().unwrap_or("");
            let stripped = strip(kept.as_bytes());
            String::from_utf8_lossy(&stripped).to_string()
        })
        .collect()
}

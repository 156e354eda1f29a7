//! Rolling line buffer for streamed terminal output.

use std::collections::VecDeque;
use std::mem;

use crate::text::{strip_terminal_controls, unfinished_escape_start};

/// A partial line longer than this is flushed as if it had ended.
const MAX_PARTIAL_BYTES: usize = 64 * 1024;

/// Keeps the last `max_lines` complete lines of a stream plus the trailing
/// partial line.
///
/// Truncation is lazy: the buffer may grow to `max_lines + slack` before it
/// is cut back to `max_lines`, so a steady stream pays for one drain every
/// `slack` lines instead of one per line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RollingLines {
    lines: VecDeque<String>,
    partial: String,
    /// Escape sequence cut off at the end of the last terminal chunk.
    held_escape: String,
    max_lines: usize,
    slack: usize,
    dropped: u64,
}

impl RollingLines {
    #[must_use]
    pub fn new(max_lines: usize, slack: usize) -> Self {
        Self {
            lines: VecDeque::new(),
            partial: String::new(),
            held_escape: String::new(),
            max_lines,
            slack,
            dropped: 0,
        }
    }

    /// Rebuild a buffer from previously captured text.
    #[must_use]
    pub fn from_text(text: &str, max_lines: usize, slack: usize) -> Self {
        let mut buffer = Self::new(max_lines, slack);
        buffer.push(text);
        buffer.enforce(0);
        buffer
    }

    pub fn push(&mut self, chunk: &str) {
        let mut rest = chunk;
        while let Some(pos) = rest.find('\n') {
            self.partial.push_str(&rest[..pos]);
            self.finish_line();
            rest = &rest[pos + 1..];
        }
        self.partial.push_str(rest);
        if self.partial.len() > MAX_PARTIAL_BYTES {
            self.finish_line();
        }
        self.enforce(self.slack);
    }

    /// Push raw terminal output with control sequences stripped. A sequence
    /// split across chunks is held back until the rest of it arrives.
    pub fn push_terminal(&mut self, chunk: &str) {
        let mut joined = mem::take(&mut self.held_escape);
        joined.push_str(chunk);
        let cut = unfinished_escape_start(&joined).unwrap_or(joined.len());
        self.held_escape = joined[cut..].to_string();
        self.push(&strip_terminal_controls(&joined[..cut]));
    }

    fn finish_line(&mut self) {
        let mut line = mem::take(&mut self.partial);
        if line.ends_with('\r') {
            line.pop();
        }
        self.lines.push_back(line);
    }

    fn enforce(&mut self, slack: usize) {
        if self.lines.len() > self.max_lines + slack {
            let excess = self.lines.len() - self.max_lines;
            self.lines.drain(..excess);
            self.dropped += excess as u64;
        }
    }

    /// Complete lines currently held.
    #[must_use]
    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Lines discarded from the front since creation.
    #[must_use]
    pub fn dropped_lines(&self) -> u64 {
        self.dropped
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty() && self.partial.is_empty()
    }

    #[must_use]
    pub fn partial(&self) -> &str {
        &self.partial
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }

    /// Buffered output joined with newlines, trailing partial line included.
    #[must_use]
    pub fn text(&self) -> String {
        let mut out = String::new();
        for line in &self.lines {
            out.push_str(line);
            out.push('\n');
        }
        out.push_str(&self.partial);
        out
    }
}

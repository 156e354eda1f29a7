//! Small pure text helpers: character-budget capping and terminal control
//! stripping.

use std::borrow::Cow;
use std::iter::Peekable;

const ESC: char = '\x1b';
const BEL: char = '\x07';
const CSI: char = '\u{009b}';

/// A cut-off sequence longer than this is let through to be stripped as is.
const MAX_UNFINISHED_ESCAPE_BYTES: usize = 4 * 1024;

/// Keep at most `max_chars` characters of `raw`, appending `suffix` when cut.
///
/// The suffix does not count toward the budget. Counts are in `char`s so a
/// multi-byte scalar is never split.
#[must_use]
pub fn cap_chars<'a>(raw: &'a str, max_chars: usize, suffix: &str) -> Cow<'a, str> {
    match raw.char_indices().nth(max_chars) {
        None => Cow::Borrowed(raw),
        Some((cut, _)) => Cow::Owned(format!("{}{suffix}", &raw[..cut])),
    }
}

/// Keep the last `max_chars` characters of `raw`, prefixing `marker` when cut.
#[must_use]
pub fn cap_chars_tail<'a>(raw: &'a str, max_chars: usize, marker: &str) -> Cow<'a, str> {
    let total = raw.chars().count();
    if total <= max_chars {
        return Cow::Borrowed(raw);
    }
    let skip = total - max_chars;
    let start = raw.char_indices().nth(skip).map_or(raw.len(), |(idx, _)| idx);
    Cow::Owned(format!("{marker}{}", &raw[start..]))
}

/// Remove ANSI escape sequences and control characters from agent terminal
/// output. Newlines, tabs and carriage returns are kept.
#[must_use]
pub fn strip_terminal_controls(input: &str) -> Cow<'_, str> {
    if !input.chars().any(is_stripped) {
        return Cow::Borrowed(input);
    }

    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            ESC => skip_escape(&mut chars),
            CSI => skip_csi(&mut chars),
            c if is_stripped(c) => {}
            c => out.push(c),
        }
    }
    Cow::Owned(out)
}

fn is_stripped(c: char) -> bool {
    let c0 = c <= '\x1f' && !matches!(c, '\n' | '\t' | '\r');
    c0 || c == '\x7f' || ('\u{0080}'..='\u{009f}').contains(&c)
}

fn skip_escape<I: Iterator<Item = char>>(chars: &mut Peekable<I>) {
    match chars.peek() {
        Some('[') => {
            chars.next();
            skip_csi(chars);
        }
        // OSC, DCS, PM and APC run until BEL or ST (ESC \).
        Some(']' | 'P' | '^' | '_') => {
            chars.next();
            while let Some(c) = chars.next() {
                if c == BEL || (c == ESC && chars.next_if_eq(&'\\').is_some()) {
                    break;
                }
            }
        }
        Some('(' | ')' | '*' | '+' | '#') => {
            chars.next();
            chars.next();
        }
        Some(_) => {
            chars.next();
        }
        None => {}
    }
}

/// Byte offset of an escape sequence that `input` ends in the middle of.
///
/// Streamed output can split a sequence across chunks; the caller holds the
/// tail back and strips it once the next chunk completes it.
#[must_use]
pub fn unfinished_escape_start(input: &str) -> Option<usize> {
    let start = input.rfind([ESC, CSI])?;
    let tail = &input[start..];
    if tail.len() > MAX_UNFINISHED_ESCAPE_BYTES {
        return None;
    }
    let mut chars = tail.chars();
    let complete = if chars.next() == Some(CSI) {
        csi_ended(chars)
    } else {
        match chars.next() {
            None => false,
            Some('[') => csi_ended(chars),
            Some(']' | 'P' | '^' | '_') => chars.any(|c| c == BEL),
            Some('(' | ')' | '*' | '+' | '#') => chars.next().is_some(),
            Some(_) => true,
        }
    };
    (!complete).then_some(start)
}

fn csi_ended(mut chars: impl Iterator<Item = char>) -> bool {
    chars.any(|c| !('\x20'..='\x3f').contains(&c))
}

/// Parameter and intermediate bytes, then one final byte.
fn skip_csi<I: Iterator<Item = char>>(chars: &mut Peekable<I>) {
    while chars.next_if(|c| ('\x20'..='\x3f').contains(c)).is_some() {}
    chars.next_if(|c| ('\x40'..='\x7e').contains(c));
}

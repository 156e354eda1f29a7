//! Shared pure utilities for Weft.
//!
//! - **`diff`**: bounded line-level diff previews
//! - **`rolling`**: capped line buffer for streamed terminal output
//! - **`text`**: character-budget capping and terminal control stripping

pub mod diff;
pub mod rolling;
pub mod text;

pub use diff::{DiffEngine, DiffLimits, diff_preview};
pub use rolling::RollingLines;
pub use text::{cap_chars, cap_chars_tail, strip_terminal_controls, unfinished_escape_start};

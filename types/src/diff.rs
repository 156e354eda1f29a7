use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffLineKind {
    Context,
    Add,
    Del,
    /// Marker standing in for lines omitted from the preview.
    Elided,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffLine {
    pub kind: DiffLineKind,
    pub text: String,
}

impl DiffLine {
    #[must_use]
    pub fn new(kind: DiffLineKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
        }
    }

    #[must_use]
    pub fn elided() -> Self {
        Self::new(DiffLineKind::Elided, "")
    }

    #[must_use]
    pub fn is_change(&self) -> bool {
        matches!(self.kind, DiffLineKind::Add | DiffLineKind::Del)
    }
}

/// Bounded line-level rendering of a before/after change. Derived on demand,
/// never persisted.
///
/// `additions` and `deletions` count the whole change even when `lines` is a
/// trimmed view.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DiffPreview {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub lines: Vec<DiffLine>,
    pub additions: usize,
    pub deletions: usize,
    pub truncated: bool,
}

impl DiffPreview {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.additions == 0 && self.deletions == 0
    }
}

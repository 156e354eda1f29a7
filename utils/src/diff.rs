//! Bounded line-level diff previews.
//!
//! Small inputs get an exact Myers edit script. Inputs past the configured
//! line or byte thresholds fall back to a common prefix/suffix scan that only
//! reports the changed middle span. Either way the rendered lines pass through
//! the same trimming step, so a preview never exceeds `max_preview_lines`.

use similar::{Algorithm, ChangeTag, TextDiff};

use weft_types::{DiffLine, DiffLineKind, DiffPreview, ToolCall, ToolCallContent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiffLimits {
    /// Unchanged lines kept on each side of a change.
    pub context_radius: usize,
    pub max_preview_lines: usize,
    /// Combined line count above which the exact algorithm is skipped.
    pub max_exact_lines: usize,
    /// Combined byte size above which the exact algorithm is skipped.
    pub max_exact_bytes: usize,
}

impl Default for DiffLimits {
    fn default() -> Self {
        Self {
            context_radius: 3,
            max_preview_lines: 80,
            max_exact_lines: 4_000,
            max_exact_bytes: 512 * 1024,
        }
    }
}

type RawLine<'a> = (DiffLineKind, &'a str);

#[derive(Debug, Clone, Default)]
pub struct DiffEngine {
    limits: DiffLimits,
}

impl DiffEngine {
    #[must_use]
    pub fn new(limits: DiffLimits) -> Self {
        Self { limits }
    }

    #[must_use]
    pub fn limits(&self) -> DiffLimits {
        self.limits
    }

    #[must_use]
    pub fn diff(&self, before: &str, after: &str) -> DiffPreview {
        let old_lines: Vec<&str> = before.lines().collect();
        let new_lines: Vec<&str> = after.lines().collect();

        let within_limits = old_lines.len() + new_lines.len() <= self.limits.max_exact_lines
            && before.len() + after.len() <= self.limits.max_exact_bytes;

        let (raw, additions, deletions, fallback) = if within_limits {
            let (raw, additions, deletions) = exact_lines(&old_lines, &new_lines);
            (raw, additions, deletions, false)
        } else {
            tracing::debug!(
                old_lines = old_lines.len(),
                new_lines = new_lines.len(),
                "diff input over exact limits, using prefix/suffix fallback"
            );
            let (raw, additions, deletions) =
                span_lines(&old_lines, &new_lines, self.limits.context_radius);
            (raw, additions, deletions, true)
        };

        let (lines, trimmed) = trim(&raw, self.limits);
        DiffPreview {
            path: None,
            lines,
            additions,
            deletions,
            truncated: fallback || trimmed,
        }
    }

    /// One preview per diff entry of a tool call, in content order.
    #[must_use]
    pub fn previews_for(&self, call: &ToolCall) -> Vec<DiffPreview> {
        call.content
            .iter()
            .filter_map(|content| match content {
                ToolCallContent::Diff {
                    path,
                    old_text,
                    new_text,
                } => {
                    let mut preview = self.diff(old_text.as_deref().unwrap_or(""), new_text);
                    preview.path.clone_from(path);
                    Some(preview)
                }
                _ => None,
            })
            .collect()
    }
}

/// Diff with default limits.
#[must_use]
pub fn diff_preview(before: &str, after: &str) -> DiffPreview {
    DiffEngine::default().diff(before, after)
}

fn exact_lines<'a>(old: &[&'a str], new: &[&'a str]) -> (Vec<RawLine<'a>>, usize, usize) {
    let diff = TextDiff::configure()
        .algorithm(Algorithm::Myers)
        .diff_slices(old, new);

    let mut raw = Vec::with_capacity(old.len().max(new.len()));
    let mut additions = 0;
    let mut deletions = 0;
    for change in diff.iter_all_changes() {
        let kind = match change.tag() {
            ChangeTag::Equal => DiffLineKind::Context,
            ChangeTag::Delete => {
                deletions += 1;
                DiffLineKind::Del
            }
            ChangeTag::Insert => {
                additions += 1;
                DiffLineKind::Add
            }
        };
        raw.push((kind, change.value()));
    }
    (raw, additions, deletions)
}

/// Prefix/suffix scan: everything between the common prefix and the common
/// suffix counts as replaced. Counts are estimates from the span lengths.
fn span_lines<'a>(
    old: &[&'a str],
    new: &[&'a str],
    radius: usize,
) -> (Vec<RawLine<'a>>, usize, usize) {
    let prefix = old
        .iter()
        .zip(new.iter())
        .take_while(|(a, b)| a == b)
        .count();
    let max_suffix = old.len().min(new.len()) - prefix;
    let suffix = old
        .iter()
        .rev()
        .zip(new.iter().rev())
        .take(max_suffix)
        .take_while(|(a, b)| a == b)
        .count();

    let old_mid = &old[prefix..old.len() - suffix];
    let new_mid = &new[prefix..new.len() - suffix];

    let before_ctx = &old[prefix.saturating_sub(radius)..prefix];
    let after_start = old.len() - suffix;
    let after_ctx = &old[after_start..(after_start + radius).min(old.len())];

    let mut raw =
        Vec::with_capacity(before_ctx.len() + old_mid.len() + new_mid.len() + after_ctx.len());
    raw.extend(before_ctx.iter().map(|line| (DiffLineKind::Context, *line)));
    raw.extend(old_mid.iter().map(|line| (DiffLineKind::Del, *line)));
    raw.extend(new_mid.iter().map(|line| (DiffLineKind::Add, *line)));
    raw.extend(after_ctx.iter().map(|line| (DiffLineKind::Context, *line)));
    (raw, new_mid.len(), old_mid.len())
}

/// Reduce a full rendering to context windows around changes.
///
/// Returns the kept lines and whether the preview cap forced a cut.
fn trim(raw: &[RawLine<'_>], limits: DiffLimits) -> (Vec<DiffLine>, bool) {
    let ranges = change_ranges(raw, limits.context_radius);
    let Some(first) = ranges.first().copied() else {
        return (Vec::new(), false);
    };

    let rendered: usize =
        ranges.iter().map(|(start, end)| end - start + 1).sum::<usize>() + ranges.len() - 1;
    let cap = limits.max_preview_lines;

    let to_line = |(kind, text): &RawLine<'_>| DiffLine::new(*kind, *text);

    if rendered <= cap {
        let mut lines = Vec::with_capacity(rendered);
        let mut previous_end: Option<usize> = None;
        for (start, end) in ranges {
            if previous_end.is_some_and(|prev| start > prev + 1) {
                lines.push(DiffLine::elided());
            }
            lines.extend(raw[start..=end].iter().map(to_line));
            previous_end = Some(end);
        }
        return (lines, false);
    }

    if cap == 0 {
        return (Vec::new(), true);
    }

    let last = ranges.last().copied().unwrap_or(first);
    let budget = cap - 1;
    let head = budget.div_ceil(2).min(first.1 - first.0 + 1);
    let tail = (budget - head).min(last.1 - last.0 + 1);

    let mut lines = Vec::with_capacity(cap);
    lines.extend(raw[first.0..first.0 + head].iter().map(to_line));
    lines.push(DiffLine::elided());
    lines.extend(raw[last.1 + 1 - tail..=last.1].iter().map(to_line));
    (lines, true)
}

/// Inclusive index ranges around each change, expanded by `radius` and merged
/// when they overlap or touch.
fn change_ranges(raw: &[RawLine<'_>], radius: usize) -> Vec<(usize, usize)> {
    let mut ranges: Vec<(usize, usize)> = Vec::new();
    let last_index = raw.len().saturating_sub(1);
    for (idx, (kind, _)) in raw.iter().enumerate() {
        if !matches!(kind, DiffLineKind::Add | DiffLineKind::Del) {
            continue;
        }
        let start = idx.saturating_sub(radius);
        let end = (idx + radius).min(last_index);
        match ranges.last_mut() {
            Some(range) if start <= range.1 + 1 => range.1 = range.1.max(end),
            _ => ranges.push((start, end)),
        }
    }
    ranges
}

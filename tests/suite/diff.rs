//! Diff previews for edit tool calls under configured limits.

use serde_json::json;
use tempfile::tempdir;

use weft_config::WeftConfig;
use weft_engine::SessionSettings;
use weft_types::{DiffLineKind, SessionKey, ToolCallId};
use weft_utils::DiffEngine;

use crate::common::{agent, registry_at};

fn numbered(count: usize, edit_every: usize) -> (String, String) {
    let before: Vec<String> = (0..count).map(|i| format!("line {i}")).collect();
    let after: Vec<String> = (0..count)
        .map(|i| {
            if i % edit_every == 0 {
                format!("line {i} changed")
            } else {
                format!("line {i}")
            }
        })
        .collect();
    (before.join("\n"), after.join("\n"))
}

#[tokio::test]
async fn edit_previews_respect_configured_limits() {
    let config = WeftConfig::parse("[diff]\nmax_preview_lines = 12\ncontext_radius = 1\n").unwrap();
    let settings = SessionSettings {
        diff: config.diff_limits(),
        ..SessionSettings::default()
    };
    let dir = tempdir().unwrap();
    let mut registry = registry_at(&dir.path().join("feed.db"), settings);
    let key = SessionKey::new("diffs");
    let (transport, _rx) = agent();
    registry.open_session(key.clone(), transport).await.unwrap();

    let (before, after) = numbered(200, 10);
    registry
        .dispatch(
            &key,
            &json!({
                "type": "tool_call",
                "toolCallId": "edit",
                "kind": "edit",
                "content": [
                    {"type": "diff", "path": "big.txt", "oldText": before, "newText": after},
                    {"type": "diff", "path": "small.txt", "oldText": "a\nb\nc", "newText": "a\nx\nc"},
                    {"type": "content", "content": {"type": "text", "text": "not a diff"}}
                ]
            }),
            0,
        )
        .unwrap();

    let previews = registry
        .session(&key)
        .unwrap()
        .diff_previews(&ToolCallId::new("edit"));
    assert_eq!(previews.len(), 2);

    let big = &previews[0];
    assert_eq!(big.path.as_deref(), Some("big.txt"));
    assert!(big.truncated);
    assert!(big.lines.len() <= 12);
    assert_eq!((big.additions, big.deletions), (20, 20));
    assert!(big.lines.iter().any(|line| line.kind == DiffLineKind::Elided));

    let small = &previews[1];
    let kinds: Vec<(DiffLineKind, &str)> = small
        .lines
        .iter()
        .map(|line| (line.kind, line.text.as_str()))
        .collect();
    assert_eq!(
        kinds,
        vec![
            (DiffLineKind::Context, "a"),
            (DiffLineKind::Del, "b"),
            (DiffLineKind::Add, "x"),
            (DiffLineKind::Context, "c"),
        ]
    );
    assert!(!small.truncated);
}

#[test]
fn huge_inputs_stay_bounded() {
    let config = WeftConfig::parse("[diff]\nmax_exact_lines = 100\nmax_preview_lines = 20\n").unwrap();
    let engine = DiffEngine::new(config.diff_limits());
    let (before, after) = numbered(5_000, 1);
    let preview = engine.diff(&before, &after);
    assert!(preview.truncated);
    assert!(preview.lines.len() <= 20);
    assert_eq!(preview.additions, 5_000);
    assert_eq!(preview.deletions, 5_000);
}

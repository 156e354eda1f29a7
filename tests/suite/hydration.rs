//! Persist-then-hydrate round trips through an on-disk SQLite database.

use serde_json::json;
use tempfile::tempdir;

use weft_context::{FeedStore, SqliteFeedStore, hydrate};
use weft_core::FeedLimits;
use weft_engine::{SessionSettings, SessionStatus};
use weft_types::{ContentBlock, FeedItemKind, SessionKey, TerminalId, ToolCallId, ToolCallStatus};

use crate::common::{agent, agent_chunk, comparable, registry_at, started, thought_chunk, tool_update};

#[tokio::test]
async fn reopened_session_matches_the_live_feed() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("feed.db");
    let key = SessionKey::new("task-42");

    let live_items = {
        let mut registry = registry_at(&db, SessionSettings::default());
        let (transport, _rx) = agent();
        let controller = registry.open_session(key.clone(), transport).await.unwrap();
        assert!(controller.start_session(0).success);
        registry.dispatch(&key, &started(json!([])), 1).unwrap();

        let controller = registry.session_mut(&key).unwrap();
        assert!(controller.send_prompt(vec![ContentBlock::text("fix the parser")], 10).success);
        let script = [
            thought_chunk("reading "),
            thought_chunk("the grammar"),
            json!({
                "type": "tool_call",
                "toolCallId": "read-1",
                "title": "Read grammar.rs",
                "kind": "read",
                "status": "in_progress",
                "rawInput": {"path": "src/grammar.rs", "token": "secret"}
            }),
            tool_update("read-1", "completed"),
            json!({
                "type": "tool_call",
                "toolCallId": "edit-1",
                "title": "Edit grammar.rs",
                "kind": "edit",
                "status": "in_progress",
                "content": [
                    {"type": "diff", "path": "src/grammar.rs", "oldText": "a\nb\nc", "newText": "a\nx\nc"},
                    {"type": "terminal", "terminalId": "term-1"}
                ]
            }),
            json!({"type": "terminal_output", "terminalId": "term-1", "chunk": "cargo test\nok\n"}),
            tool_update("edit-1", "completed"),
            json!({
                "type": "session_update",
                "update": {"sessionUpdate": "plan", "entries": [
                    {"content": "fix grammar", "status": "completed"},
                    {"content": "add tests", "status": "pending"}
                ]}
            }),
            agent_chunk("Fixed "),
            agent_chunk("the parser."),
            json!({"type": "prompt_end", "stopReason": "end_turn"}),
        ];
        for (offset, event) in script.iter().enumerate() {
            registry.dispatch(&key, event, 11 + offset as i64).unwrap();
        }

        let live = registry.session(&key).unwrap().feed().items().to_vec();
        assert!(registry.dispose(&key).await);
        live
    };

    let mut registry = registry_at(&db, SessionSettings::default());
    let (transport, _rx) = agent();
    let reopened = registry.open_session(key.clone(), transport).await.unwrap();

    assert_eq!(reopened.status(), SessionStatus::Idle);
    assert_eq!(comparable(reopened.feed().items()), comparable(&live_items));

    let edit = reopened.feed().tool_call(&ToolCallId::new("edit-1")).unwrap();
    assert_eq!(edit.status, ToolCallStatus::Completed);
    let terminal = reopened.feed().terminal(&TerminalId::new("term-1")).unwrap();
    assert_eq!(terminal.lines().collect::<Vec<_>>(), vec!["cargo test", "ok"]);
    let previews = reopened.diff_previews(&ToolCallId::new("edit-1"));
    assert_eq!((previews[0].additions, previews[0].deletions), (1, 1));

    let read = reopened.feed().tool_call(&ToolCallId::new("read-1")).unwrap();
    let raw_input = read.raw_input.as_ref().unwrap();
    assert_eq!(raw_input["path"], "src/grammar.rs");
    assert!(raw_input.get("token").is_none());

    let plan = reopened.feed().latest_plan().unwrap();
    assert_eq!(plan.len(), 2);
}

#[tokio::test]
async fn new_items_continue_after_hydrated_sequences() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("feed.db");
    let key = SessionKey::new("t");

    for round in 0..2_i64 {
        let mut registry = registry_at(&db, SessionSettings::default());
        let (transport, _rx) = agent();
        let controller = registry.open_session(key.clone(), transport).await.unwrap();
        controller.start_session(round * 100);
        registry
            .dispatch(&key, &started(json!([])), round * 100 + 1)
            .unwrap();
        let controller = registry.session_mut(&key).unwrap();
        let prompt = format!("prompt {round}");
        assert!(controller.send_prompt(vec![ContentBlock::text(prompt)], round * 100 + 2).success);
        registry
            .dispatch(&key, &agent_chunk("answer"), round * 100 + 3)
            .unwrap();
        registry
            .dispatch(&key, &json!({"type": "prompt_end"}), round * 100 + 4)
            .unwrap();
        registry.dispose(&key).await;
    }

    let store = SqliteFeedStore::open(&db).unwrap();
    let hydrated = hydrate(&store.load_session(&key).unwrap(), FeedLimits::default());
    let summary: Vec<(u64, String)> = hydrated
        .items()
        .iter()
        .filter_map(|item| match &item.kind {
            FeedItemKind::Message(message) => Some((item.sequence, message.text())),
            _ => None,
        })
        .collect();
    assert_eq!(
        summary,
        vec![
            (1, "prompt 0".to_string()),
            (2, "answer".to_string()),
            (3, "prompt 1".to_string()),
            (4, "answer".to_string()),
        ]
    );
    assert_eq!(hydrated.next_sequence(), 5);
}

#[tokio::test]
async fn sessions_do_not_see_each_other() {
    let dir = tempdir().unwrap();
    let db = dir.path().join("feed.db");
    let mut registry = registry_at(&db, SessionSettings::default());

    for name in ["a", "b"] {
        let key = SessionKey::new(name);
        let (transport, _rx) = agent();
        let controller = registry.open_session(key.clone(), transport).await.unwrap();
        controller.start_session(0);
        registry.dispatch(&key, &started(json!([])), 1).unwrap();
        let text = format!("hello from {name}");
        registry
            .session_mut(&key)
            .unwrap()
            .send_prompt(vec![ContentBlock::text(text)], 2);
    }
    registry.flush().await;

    let store = SqliteFeedStore::open(&db).unwrap();
    for name in ["a", "b"] {
        let rows = store.load_session(&SessionKey::new(name)).unwrap();
        let hydrated = hydrate(&rows, FeedLimits::default());
        assert_eq!(hydrated.items().len(), 1);
        let message = hydrated.items()[0].kind.as_message().unwrap();
        assert_eq!(message.text(), format!("hello from {name}"));
    }
}

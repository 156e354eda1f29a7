//! Configuration flowing into persistence and feed limits.

use std::fs;

use serde_json::json;
use tempfile::tempdir;

use weft_config::WeftConfig;
use weft_context::{FeedStore, SqliteFeedStore};
use weft_core::FeedReconciler;
use weft_engine::SessionSettings;
use weft_types::{AcpEvent, ContentBlock, SessionKey, TerminalId};

use crate::common::{agent, agent_chunk, registry_at, started};

#[tokio::test]
async fn persistence_limits_come_from_the_config_file() {
    let dir = tempdir().unwrap();
    let config_path = dir.path().join("config.toml");
    let db = dir.path().join("data").join("feed.db");
    fs::write(
        &config_path,
        format!(
            "[persistence]\ndatabase = \"{}\"\nmax_text_chars = 40\n\n[session]\nprovider_id = \"claude-acp\"\n",
            db.display()
        ),
    )
    .unwrap();
    let config = WeftConfig::load_from(&config_path).unwrap().unwrap();
    assert_eq!(config.database_path(), db);

    let settings = SessionSettings {
        sanitize: config.sanitize_limits(),
        provider_id: config.provider_id().map(str::to_string),
        ..SessionSettings::default()
    };
    let mut registry = registry_at(&config.database_path(), settings);
    let key = SessionKey::new("capped");
    let (transport, _rx) = agent();
    registry.open_session(key.clone(), transport).await.unwrap();
    registry.session_mut(&key).unwrap().start_session(0);
    registry.dispatch(&key, &started(json!([])), 1).unwrap();

    let long = "x".repeat(500);
    let controller = registry.session_mut(&key).unwrap();
    assert!(controller.send_prompt(vec![ContentBlock::text(long.clone())], 2).success);
    // The live feed keeps everything.
    assert_eq!(controller.feed().items()[0].kind.as_message().unwrap().text(), long);
    registry.dispatch(&key, &agent_chunk("ok"), 3).unwrap();
    registry.dispatch(&key, &json!({"type": "prompt_end"}), 4).unwrap();
    registry.flush().await;

    let store = SqliteFeedStore::open(&db).unwrap();
    let rows = store.load_session(&key).unwrap();
    assert_eq!(rows.len(), 2);
    let bodies: Vec<serde_json::Value> = rows
        .iter()
        .map(|row| serde_json::from_str(&row.body).unwrap())
        .collect();
    for body in &bodies {
        assert_eq!(body["acp"]["providerId"], "claude-acp");
        assert_eq!(body["acp"]["sessionId"], "acp-1");
    }
    let stored_prompt = bodies[0]["acp"]["item"]["item"]["kind"]["blocks"][0]["text"]
        .as_str()
        .unwrap();
    assert!(stored_prompt.chars().count() < 100);
    assert!(stored_prompt.ends_with("[truncated]"));
}

#[test]
fn terminal_limits_come_from_the_config() {
    let config = WeftConfig::parse("[feed]\nterminal_max_lines = 5\nterminal_slack = 2\n").unwrap();
    let mut feed = FeedReconciler::new(config.feed_limits());
    let tool = AcpEvent::from_value(&json!({
        "type": "tool_call",
        "toolCallId": "t",
        "content": [{"type": "terminal", "terminalId": "term"}]
    }))
    .unwrap();
    feed.apply(&tool, 0);
    for i in 0..50 {
        feed.apply(
            &AcpEvent::TerminalOutput {
                terminal_id: TerminalId::new("term"),
                chunk: format!("{i}\n"),
            },
            1,
        );
        assert!(feed.terminal(&TerminalId::new("term")).unwrap().line_count() <= 7);
    }
    let lines: Vec<&str> = feed.terminal(&TerminalId::new("term")).unwrap().lines().collect();
    assert_eq!(lines.last(), Some(&"49"));
}

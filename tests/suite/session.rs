//! End-to-end session flows through the registry.

use serde_json::json;
use tempfile::tempdir;

use weft_core::CommandError;
use weft_engine::{OutboundRequest, SessionSettings, SessionStatus};
use weft_types::{
    ContentBlock, FeedItemKind, PermissionOutcome, RequestId, SessionKey, ThinkingBudgetLevel,
    ToolCallId, ToolCallStatus,
};

use crate::common::{agent, agent_chunk, drain, registry_at, started};

fn options() -> serde_json::Value {
    json!([
        {"id": "mode", "name": "Mode", "options": ["ask", "code"], "currentValue": "code"},
        {"configId": "model", "label": "Model", "category": "model", "currentValue": "sonnet",
         "allowedValues": [{"value": "sonnet", "name": "Sonnet"}, {"value": "opus", "name": "Opus"}]},
        {"id": "reasoning", "name": "Reasoning effort", "options": ["low", "high"], "currentValue": "high"}
    ])
}

#[tokio::test]
async fn prompt_permission_and_cancel() {
    let dir = tempdir().unwrap();
    let mut registry = registry_at(&dir.path().join("feed.db"), SessionSettings::default());
    let key = SessionKey::new("task");
    let (transport, mut rx) = agent();
    registry.open_session(key.clone(), transport).await.unwrap();

    let controller = registry.session_mut(&key).unwrap();
    assert!(controller.start_session(0).success);
    // A second start while starting is a no-op.
    assert!(controller.start_session(1).success);
    assert_eq!(drain(&mut rx), vec![OutboundRequest::Start]);

    registry.dispatch(&key, &started(options()), 2).unwrap();
    let controller = registry.session_mut(&key).unwrap();
    assert_eq!(controller.status(), SessionStatus::Running);
    assert_eq!(controller.session_id(), Some("acp-1"));
    assert_eq!(controller.current_model(), Some("sonnet"));
    assert_eq!(controller.effort_level(), Some(ThinkingBudgetLevel::High));

    assert!(controller.send_prompt(vec![ContentBlock::text("delete the build dir")], 3).success);
    registry
        .dispatch(
            &key,
            &json!({"type": "tool_call", "toolCallId": "rm", "title": "rm -rf build", "kind": "execute", "status": "pending"}),
            4,
        )
        .unwrap();
    registry
        .dispatch(
            &key,
            &json!({
                "type": "permission_request",
                "requestId": 12,
                "params": {
                    "toolCall": {"toolCallId": "rm"},
                    "options": [{"optionId": "allow_once", "name": "Allow"}, {"optionId": "reject", "name": "Reject"}]
                }
            }),
            5,
        )
        .unwrap();

    let controller = registry.session_mut(&key).unwrap();
    assert_eq!(controller.status(), SessionStatus::AwaitingPermission);
    let blocked = controller.send_prompt(vec![ContentBlock::text("hurry")], 6);
    assert_eq!(
        blocked.error.unwrap(),
        CommandError::PermissionPending { count: 1 }.to_string()
    );

    assert!(controller.cancel(7).success);
    assert_eq!(controller.status(), SessionStatus::Running);
    assert!(!controller.prompt_in_flight());
    assert!(
        controller
            .feed()
            .items()
            .iter()
            .all(|item| !matches!(item.kind, FeedItemKind::PermissionRequest { .. }))
    );
    assert_eq!(
        controller.feed().tool_call(&ToolCallId::new("rm")).unwrap().status,
        ToolCallStatus::Cancelled
    );

    let sent = drain(&mut rx);
    assert_eq!(sent.len(), 3);
    assert!(matches!(sent[0], OutboundRequest::Prompt { .. }));
    assert_eq!(
        sent[1],
        OutboundRequest::RespondPermission {
            request_id: RequestId::new("12"),
            outcome: PermissionOutcome::Cancelled,
        }
    );
    assert_eq!(sent[2], OutboundRequest::Cancel);

    // The agent's late answer after cancellation still lands in the feed.
    registry.dispatch(&key, &agent_chunk("stopped"), 8).unwrap();
    registry.dispatch(&key, &json!({"type": "session_exit"}), 9).unwrap();
    let controller = registry.session(&key).unwrap();
    assert_eq!(controller.status(), SessionStatus::Exited);
    let last = controller.feed().items().last().unwrap();
    assert_eq!(last.kind.as_message().unwrap().text(), "stopped");
}

#[tokio::test]
async fn config_controls_follow_the_agent() {
    let dir = tempdir().unwrap();
    let mut registry = registry_at(&dir.path().join("feed.db"), SessionSettings::default());
    let key = SessionKey::new("controls");
    let (transport, mut rx) = agent();
    let controller = registry.open_session(key.clone(), transport).await.unwrap();

    // Controls are unavailable until the session is running.
    assert!(!controller.set_model("opus").success);
    controller.start_session(0);
    registry.dispatch(&key, &started(options()), 1).unwrap();
    drain(&mut rx);

    let controller = registry.session_mut(&key).unwrap();
    assert!(controller.set_effort(ThinkingBudgetLevel::Medium).success);
    assert_eq!(
        drain(&mut rx),
        vec![OutboundRequest::SetConfigOption {
            config_id: "reasoning".into(),
            value: "low".into(),
        }]
    );
    assert_eq!(controller.effort_level(), Some(ThinkingBudgetLevel::Low));

    let rejected = controller.set_config_option("mode", "yolo");
    assert!(!rejected.success);
    assert!(controller.set_config_option("mode", "ask").success);

    // The agent switches model on its own.
    registry
        .dispatch(
            &key,
            &json!({"type": "session_update", "update": {"sessionUpdate": "model_update", "currentModelId": "opus"}}),
            2,
        )
        .unwrap();
    let controller = registry.session(&key).unwrap();
    assert_eq!(controller.current_model(), Some("opus"));
    let model = controller.controls().model.as_ref().unwrap();
    assert_eq!(model.current.as_deref(), Some("opus"));
}

#[tokio::test]
async fn agent_failures_are_contained() {
    let dir = tempdir().unwrap();
    let mut registry = registry_at(&dir.path().join("feed.db"), SessionSettings::default());
    let key = SessionKey::new("flaky");
    let (transport, _rx) = agent();
    registry.open_session(key.clone(), transport).await.unwrap();
    registry.session_mut(&key).unwrap().start_session(0);
    registry.dispatch(&key, &started(json!([])), 1).unwrap();

    // Garbage never touches the feed.
    for raw in [json!(null), json!({"type": "bogus"}), json!({"type": "tool_call"})] {
        assert!(registry.dispatch(&key, &raw, 2).unwrap().is_empty());
    }
    assert!(registry.session(&key).unwrap().feed().items().is_empty());

    registry
        .dispatch(&key, &json!({"type": "session_error", "error": {"message": "rate limited"}}), 3)
        .unwrap();
    let controller = registry.session_mut(&key).unwrap();
    assert_eq!(controller.status(), SessionStatus::Error);
    assert_eq!(controller.last_error(), Some("rate limited"));
    let result = controller.send_prompt(vec![ContentBlock::text("retry")], 4);
    assert!(!result.success);

    // Restarting from error is allowed.
    assert!(controller.start_session(5).success);
    assert_eq!(controller.status(), SessionStatus::Starting);
}

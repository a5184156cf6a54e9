//! Unit tests for out-of-band progress correlation.

use serde_json::json;

use kbase_chat::session::progress::{
    correlate, MatchRule, ProgressNotification, ProgressPublisher, SessionIdentity,
};
use kbase_chat::AppError;

fn identity(
    request: Option<&str>,
    assistant: Option<i64>,
    conversation: Option<i64>,
) -> SessionIdentity<'_> {
    SessionIdentity {
        client_request_id: request,
        assistant_message_id: assistant,
        conversation_id: conversation,
    }
}

fn note(
    request: Option<&str>,
    assistant: Option<i64>,
    conversation: Option<i64>,
) -> ProgressNotification {
    ProgressNotification {
        client_request_id: request.map(str::to_owned),
        assistant_message_id: assistant,
        conversation_id: conversation,
        step: Some("retrieve".into()),
        status: Some("running".into()),
        message: "Searching".into(),
    }
}

// ── Precedence ──────────────────────────────────────────────────────────────

#[test]
fn request_id_match_wins() {
    let rule = correlate(
        identity(Some("r-1"), Some(42), Some(7)),
        &note(Some("r-1"), Some(99), Some(8)),
    );
    assert_eq!(rule, Some(MatchRule::ClientRequestId));
}

/// A request id mismatch falls through to the assistant message id.
#[test]
fn request_id_mismatch_falls_through_to_assistant_id() {
    let rule = correlate(
        identity(Some("r-1"), Some(42), Some(7)),
        &note(Some("r-2"), Some(42), Some(7)),
    );
    assert_eq!(rule, Some(MatchRule::AssistantMessageId));
}

#[test]
fn mismatched_ids_fall_through_to_conversation() {
    let rule = correlate(
        identity(Some("r-1"), Some(42), Some(7)),
        &note(Some("r-2"), Some(43), Some(7)),
    );
    assert_eq!(rule, Some(MatchRule::ConversationId));
}

#[test]
fn no_rule_matching_drops_notification() {
    let rule = correlate(
        identity(Some("r-1"), Some(42), Some(7)),
        &note(Some("r-2"), Some(43), Some(8)),
    );
    assert_eq!(rule, None);
}

#[test]
fn assistant_message_id_used_without_request_id() {
    let rule = correlate(
        identity(Some("r-1"), Some(42), Some(7)),
        &note(None, Some(42), Some(8)),
    );
    assert_eq!(rule, Some(MatchRule::AssistantMessageId));
}

#[test]
fn empty_request_id_is_treated_as_absent() {
    let rule = correlate(
        identity(Some("r-1"), Some(42), None),
        &note(Some(""), Some(42), None),
    );
    assert_eq!(rule, Some(MatchRule::AssistantMessageId));
}

#[test]
fn conversation_id_equality_matches() {
    let rule = correlate(identity(Some("r-1"), None, Some(7)), &note(None, None, Some(7)));
    assert_eq!(rule, Some(MatchRule::ConversationId));
}

/// A pending session matches a notification that does not know its
/// conversation either.
#[test]
fn pending_session_matches_unknown_conversation() {
    let rule = correlate(identity(Some("r-1"), None, None), &note(None, None, None));
    assert_eq!(rule, Some(MatchRule::ConversationId));
}

#[test]
fn pending_session_rejects_known_conversation() {
    let rule = correlate(identity(Some("r-1"), None, None), &note(None, None, Some(7)));
    assert_eq!(rule, None);
}

#[test]
fn different_conversation_is_dropped() {
    let rule = correlate(identity(None, None, Some(7)), &note(None, None, Some(8)));
    assert_eq!(rule, None);
}

// ── Record parsing and fan-out ──────────────────────────────────────────────

#[test]
fn record_parses_progress_fields() {
    let record = json!({
        "event": "chat_progress",
        "clientRequestId": "r-1",
        "assistantMessageId": "42",
        "conversationId": 7,
        "step": "rerank",
        "status": "done",
        "message": "Ranked 5 fragments"
    });

    let parsed = ProgressNotification::from_record(&record)
        .expect("record parses")
        .expect("record is a progress record");

    assert_eq!(parsed.client_request_id.as_deref(), Some("r-1"));
    assert_eq!(parsed.assistant_message_id, Some(42));
    assert_eq!(parsed.conversation_id, Some(7));
    assert_eq!(parsed.step.as_deref(), Some("rerank"));
}

#[test]
fn non_progress_record_is_skipped() {
    let record = json!({"event": "chunk", "delta": "x"});
    assert_eq!(ProgressNotification::from_record(&record).expect("ok"), None);
}

#[test]
fn ill_typed_progress_record_is_decode_error() {
    let record = json!({"event": "chat_progress", "message": 5});
    let err = ProgressNotification::from_record(&record).expect_err("message must be text");
    assert!(matches!(err, AppError::Decode(_)));
}

#[tokio::test]
async fn publisher_fans_out_to_subscribers() {
    let publisher = ProgressPublisher::new();
    let mut first = publisher.subscribe();
    let mut second = publisher.subscribe();

    let delivered = publisher.publish(note(Some("r-1"), None, None));
    assert_eq!(delivered, 2);

    assert_eq!(first.recv().await.expect("first receives").message, "Searching");
    assert_eq!(second.recv().await.expect("second receives").message, "Searching");
}

#[test]
fn publishing_without_subscribers_is_not_an_error() {
    let publisher = ProgressPublisher::new();
    assert_eq!(publisher.publish(ProgressNotification::default()), 0);
    assert_eq!(
        publisher
            .publish_record(&json!({"event": "other"}))
            .expect("skipped record"),
        0
    );
}

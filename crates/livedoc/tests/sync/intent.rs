use serde_json::json;

use livedoc::collection::{Model, Note, Plan, Todo};
use livedoc::error::IntentError;
use livedoc::sync::{DraftTarget, IntentController, IntentState};
use livedoc::types::Fields;

fn fields(value: serde_json::Value) -> Fields {
    match value {
        serde_json::Value::Object(map) => map,
        _ => panic!("fixture must be an object"),
    }
}

// ============================================================================
// Compose
// ============================================================================

#[test]
fn starts_idle() {
    let intent = IntentController::new(Note::def());
    assert_eq!(*intent.state(), IntentState::Idle);
    assert!(!intent.can_commit());
}

#[test]
fn begin_create_opens_blank_draft() {
    let mut intent = IntentController::new(Todo::def());
    intent.begin_create().unwrap();

    let draft = intent.draft().unwrap();
    assert_eq!(draft.target, DraftTarget::New);
    assert_eq!(draft.field("text"), Some(&json!("")));
    assert_eq!(draft.field("completed"), Some(&json!(false)));
}

#[test]
fn begin_edit_loads_current_fields_only() {
    let mut intent = IntentController::new(Note::def());
    intent
        .begin_edit(
            "n1",
            fields(json!({ "content": "old", "createdAt": "2024-03-01T09:00:00.000Z" })),
        )
        .unwrap();

    let draft = intent.draft().unwrap();
    assert_eq!(draft.target, DraftTarget::Existing("n1".to_string()));
    assert_eq!(draft.fields, fields(json!({ "content": "old" })));
}

#[test]
fn set_field_requires_draft_and_declared_field() {
    let mut intent = IntentController::new(Plan::def());
    assert_eq!(
        intent.set_field("title", json!("x")),
        Err(IntentError::NotComposing)
    );

    intent.begin_create().unwrap();
    intent.set_field("title", json!("Q3")).unwrap();
    assert!(matches!(
        intent.set_field("owner", json!("me")),
        Err(IntentError::UnknownField { .. })
    ));
    assert_eq!(intent.draft().unwrap().field("title"), Some(&json!("Q3")));
}

#[test]
fn cancel_returns_to_idle() {
    let mut intent = IntentController::new(Note::def());
    intent.begin_create().unwrap();
    intent.cancel().unwrap();
    assert!(intent.state().is_idle());
    assert_eq!(intent.cancel(), Err(IntentError::NotComposing));
}

// ============================================================================
// Commit guard
// ============================================================================

#[test]
fn blank_primary_is_rejected_and_draft_stays_open() {
    let mut intent = IntentController::new(Note::def());
    intent.begin_create().unwrap();

    for blank in ["", "   ", "\n\t"] {
        intent.set_field("content", json!(blank)).unwrap();
        assert!(!intent.can_commit());
        assert_eq!(
            intent.take_commit(),
            Err(IntentError::BlankPrimary {
                field: "content".to_string()
            })
        );
        assert!(intent.state().is_composing());
    }
}

#[test]
fn take_commit_hands_out_draft_and_resets() {
    let mut intent = IntentController::new(Note::def());
    intent.begin_create().unwrap();
    intent.set_field("content", json!("buy milk")).unwrap();
    assert!(intent.can_commit());

    let draft = intent.take_commit().unwrap();

    assert_eq!(draft.fields, fields(json!({ "content": "buy milk" })));
    assert!(intent.state().is_idle());
}

// ============================================================================
// Delete
// ============================================================================

#[test]
fn delete_confirmation_flow() {
    let mut intent = IntentController::new(Todo::def());
    intent.request_delete("t1").unwrap();
    assert_eq!(*intent.state(), IntentState::ConfirmingDelete("t1".to_string()));

    intent.cancel_delete().unwrap();
    assert!(intent.state().is_idle());

    intent.request_delete("t1").unwrap();
    assert_eq!(intent.take_delete().unwrap(), "t1");
    assert!(intent.state().is_idle());
    assert_eq!(intent.take_delete(), Err(IntentError::NotConfirming));
}

// ============================================================================
// Serialization of intents
// ============================================================================

#[test]
fn triggers_are_refused_while_another_intent_is_active() {
    let mut intent = IntentController::new(Todo::def());
    intent.request_delete("t1").unwrap();

    assert_eq!(intent.begin_edit("t2", Fields::new()), Err(IntentError::Busy));
    assert_eq!(intent.begin_create(), Err(IntentError::Busy));
    assert_eq!(intent.request_delete("t2"), Err(IntentError::Busy));
    assert_eq!(intent.take_commit().unwrap_err(), IntentError::NotComposing);
    assert_eq!(*intent.state(), IntentState::ConfirmingDelete("t1".to_string()));

    intent.cancel_delete().unwrap();
    intent.begin_create().unwrap();
    assert_eq!(intent.request_delete("t1"), Err(IntentError::Busy));
    assert_eq!(intent.cancel_delete(), Err(IntentError::NotConfirming));
    assert!(intent.state().is_composing());
}

#[test]
fn reset_discards_any_intent() {
    let mut intent = IntentController::new(Todo::def());
    intent.begin_create().unwrap();
    intent.reset();
    assert!(intent.state().is_idle());
}

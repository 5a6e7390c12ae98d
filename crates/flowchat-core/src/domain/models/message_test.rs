use std::str::FromStr;

use serde_json::json;

use super::*;

#[test]
fn test_user_messages_are_complete() {
    let message = Message::user("Hello");
    assert!(message.is_complete);
    assert!(message.is_from_user());
    assert_eq!(message.content, "Hello");
}

#[test]
fn test_pending_assistant_is_open() {
    let message = Message::pending_assistant();
    assert!(!message.is_complete);
    assert_eq!(message.role, Role::Assistant);
    assert!(message.content.is_empty());
}

#[test]
fn test_ids_are_unique() {
    assert_ne!(Message::user("a").id, Message::user("a").id);
}

#[test]
fn test_role_names() {
    assert_eq!(Role::Thinking.to_string(), "thinking");
    assert_eq!(Role::from_str("assistant").unwrap(), Role::Assistant);
    assert_eq!(serde_json::to_value(Role::User).unwrap(), json!("user"));
}

#[test]
fn test_missing_completion_flag_means_complete() {
    let message: Message = serde_json::from_value(json!({
        "id": "m1",
        "role": "assistant",
        "content": "Stored answer",
        "timestamp": "2024-05-01T10:00:00.000Z"
    }))
    .unwrap();

    assert!(message.is_complete);
    assert!(message.thinking.is_none());
}

#[test]
fn test_serializes_camel_case() {
    let mut message = Message::pending_assistant();
    message.thinking = Some("pondering".to_string());
    let value = serde_json::to_value(&message).unwrap();

    assert_eq!(value["isComplete"], json!(false));
    assert_eq!(value["thinking"], json!("pondering"));
    assert_eq!(value["role"], json!("assistant"));
}

//! Inbound message normalization
//!
//! An inbound message is either raw text or a loosely-typed JSON envelope.
//! `normalize` reduces it to the instruction string handed to the agent, or
//! `None` when there is nothing to run.

use serde_json::Value;

/// Message as received from the bus
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Text(String),
    Envelope(Value),
}

impl Inbound {
    /// Interpret one wire line. JSON is an envelope, anything else is text.
    pub fn from_line(line: &str) -> Self {
        match serde_json::from_str::<Value>(line) {
            Ok(Value::String(text)) => Self::Text(text),
            Ok(value @ (Value::Object(_) | Value::Array(_))) => Self::Envelope(value),
            _ => Self::Text(line.to_string()),
        }
    }
}

impl From<String> for Inbound {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Value> for Inbound {
    fn from(value: Value) -> Self {
        match value {
            Value::String(text) => Self::Text(text),
            other => Self::Envelope(other),
        }
    }
}

/// Extract the instruction text. `None` means skip: no query, no notification.
pub fn normalize(message: &Inbound) -> Option<String> {
    let text = match message {
        Inbound::Text(text) => text.clone(),
        Inbound::Envelope(Value::Object(map)) => ["content", "message", "text"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str))
            .map(str::to_string)
            .unwrap_or_else(|| Value::Object(map.clone()).to_string()),
        Inbound::Envelope(Value::String(text)) => text.clone(),
        Inbound::Envelope(value @ Value::Array(_)) => value.to_string(),
        Inbound::Envelope(_) => String::new(),
    };

    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_and_whitespace_skip() {
        assert_eq!(normalize(&Inbound::Text(String::new())), None);
        assert_eq!(normalize(&Inbound::Text(" \n\t ".into())), None);
        assert_eq!(normalize(&Inbound::Envelope(json!({"content": "  "}))), None);
        assert_eq!(normalize(&Inbound::Envelope(Value::Null)), None);
    }

    #[test]
    fn text_is_kept_verbatim() {
        assert_eq!(
            normalize(&Inbound::Text("  fix the build \n".into())),
            Some("  fix the build \n".into())
        );
    }

    #[test]
    fn envelope_field_precedence() {
        let msg = Inbound::Envelope(json!({"text": "c", "message": "b", "content": "a"}));
        assert_eq!(normalize(&msg), Some("a".into()));
        let msg = Inbound::Envelope(json!({"text": "c", "message": "b"}));
        assert_eq!(normalize(&msg), Some("b".into()));
        let msg = Inbound::Envelope(json!({"text": "c"}));
        assert_eq!(normalize(&msg), Some("c".into()));
    }

    #[test]
    fn envelope_without_text_field_is_stringified() {
        let msg = Inbound::Envelope(json!({"task": "deploy"}));
        assert_eq!(normalize(&msg), Some(r#"{"task":"deploy"}"#.into()));
    }

    #[test]
    fn from_line_detects_json() {
        assert_eq!(
            Inbound::from_line(r#"{"content":"hi"}"#),
            Inbound::Envelope(json!({"content": "hi"}))
        );
        assert_eq!(Inbound::from_line(r#""quoted""#), Inbound::Text("quoted".into()));
        assert_eq!(Inbound::from_line("list files"), Inbound::Text("list files".into()));
        assert_eq!(Inbound::from_line("42"), Inbound::Text("42".into()));
    }
}

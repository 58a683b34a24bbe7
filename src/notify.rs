//! Outbound notifications
//!
//! Every observed agent event is turned into one (or a few) `Notification`s and
//! handed to a `Notifier`. The relay does not own the receiving side; it only
//! promises the shape of each notification.

use crate::error::NotifyError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Area of the notification bus a notification belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Domain {
    Chat,
    Fs,
    Codeutils,
    Todo,
    Terminal,
    Browser,
    System,
}

/// Result payload shared by every `*_response` notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResponse {
    pub request_id: String,
    /// String or array of content blocks, as produced by the tool
    pub content: Value,
    pub is_error: bool,
}

/// One outbound notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    // chat
    UserMessage {
        message: String,
        session_id: Option<String>,
        parent_tool_use_id: Option<String>,
    },
    AgentTextResponse {
        text: String,
        #[serde(default)]
        is_error: bool,
    },
    CustomToolRequest {
        tool_name: String,
        request_id: String,
        input: Value,
        summary: String,
    },
    ToolResult(ToolResponse),

    // fs
    FileReadRequest {
        request_id: String,
        path: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        start_line: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        end_line: Option<String>,
    },
    WriteToFileRequest {
        request_id: String,
        path: Option<String>,
        content: String,
    },
    FileEditRequest {
        request_id: String,
        file_name: String,
        path: Option<String>,
        new_content: String,
    },
    ListDirectoryRequest {
        request_id: String,
        path: String,
    },
    FileReadResponse(ToolResponse),
    FileEditResponse(ToolResponse),
    ListDirectoryResponse(ToolResponse),

    // codeutils
    GrepSearchRequest {
        request_id: String,
        query: Option<String>,
        include_pattern: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        recursive: Option<bool>,
        ignore_case: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        max_results: Option<u64>,
    },
    GlobSearchRequest {
        request_id: String,
        pattern: Option<String>,
        path: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        max_depth: Option<u64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        include_directories: Option<bool>,
    },
    GrepSearchResponse(ToolResponse),
    GlobSearchResponse(ToolResponse),

    // todo
    AddTodoRequest {
        request_id: String,
        title: Option<String>,
        description: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        phase: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        category: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        priority: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tags: Vec<String>,
    },
    AddTodoResponse(ToolResponse),

    // terminal
    CommandExecutionRequest {
        request_id: String,
        command: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        return_empty_string_on_success: Option<bool>,
        #[serde(skip_serializing_if = "Option::is_none")]
        execute_in_main: Option<bool>,
    },
    CommandExecutionResponse(ToolResponse),

    // browser
    WebFetchRequest {
        request_id: String,
        url: Option<String>,
        method: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        headers: Option<Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        body: Option<Value>,
        #[serde(skip_serializing_if = "Option::is_none")]
        timeout: Option<u64>,
    },
    WebSearchRequest {
        request_id: String,
        query: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        max_results: Option<u64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        search_engine: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        filters: Option<Value>,
    },
    WebFetchResponse(ToolResponse),
    WebSearchResponse(ToolResponse),

    // system
    AgentInit {
        api_key_source: Option<String>,
        cwd: Option<String>,
        tools: Vec<String>,
        mcp_servers: Vec<Value>,
        model: Option<String>,
        permission_mode: Option<String>,
    },
    TaskCompleted {
        result: String,
        duration_ms: u64,
        duration_api_ms: u64,
        num_turns: u32,
        total_cost_usd: f64,
        usage: Value,
        session_id: Option<String>,
    },
    MaxTurnsError {
        num_turns: u32,
        duration_ms: u64,
        total_cost_usd: f64,
    },
    ExecutionError {
        num_turns: u32,
        duration_ms: u64,
        total_cost_usd: f64,
    },
}

impl Notification {
    /// Chat-level error report used by the top-level catch paths
    pub fn error_text(text: impl Into<String>) -> Self {
        Self::AgentTextResponse {
            text: text.into(),
            is_error: true,
        }
    }

    pub fn domain(&self) -> Domain {
        match self {
            Self::UserMessage { .. }
            | Self::AgentTextResponse { .. }
            | Self::CustomToolRequest { .. }
            | Self::ToolResult(_) => Domain::Chat,
            Self::FileReadRequest { .. }
            | Self::WriteToFileRequest { .. }
            | Self::FileEditRequest { .. }
            | Self::ListDirectoryRequest { .. }
            | Self::FileReadResponse(_)
            | Self::FileEditResponse(_)
            | Self::ListDirectoryResponse(_) => Domain::Fs,
            Self::GrepSearchRequest { .. }
            | Self::GlobSearchRequest { .. }
            | Self::GrepSearchResponse(_)
            | Self::GlobSearchResponse(_) => Domain::Codeutils,
            Self::AddTodoRequest { .. } | Self::AddTodoResponse(_) => Domain::Todo,
            Self::CommandExecutionRequest { .. } | Self::CommandExecutionResponse(_) => {
                Domain::Terminal
            }
            Self::WebFetchRequest { .. }
            | Self::WebSearchRequest { .. }
            | Self::WebFetchResponse(_)
            | Self::WebSearchResponse(_) => Domain::Browser,
            Self::AgentInit { .. }
            | Self::TaskCompleted { .. }
            | Self::MaxTurnsError { .. }
            | Self::ExecutionError { .. } => Domain::System,
        }
    }

    /// Tool invocation id this notification is correlated with, if any
    pub fn request_id(&self) -> Option<&str> {
        match self {
            Self::CustomToolRequest { request_id, .. }
            | Self::FileReadRequest { request_id, .. }
            | Self::WriteToFileRequest { request_id, .. }
            | Self::FileEditRequest { request_id, .. }
            | Self::ListDirectoryRequest { request_id, .. }
            | Self::GrepSearchRequest { request_id, .. }
            | Self::GlobSearchRequest { request_id, .. }
            | Self::AddTodoRequest { request_id, .. }
            | Self::CommandExecutionRequest { request_id, .. }
            | Self::WebFetchRequest { request_id, .. }
            | Self::WebSearchRequest { request_id, .. } => Some(request_id.as_str()),
            Self::ToolResult(r)
            | Self::FileReadResponse(r)
            | Self::FileEditResponse(r)
            | Self::ListDirectoryResponse(r)
            | Self::GrepSearchResponse(r)
            | Self::GlobSearchResponse(r)
            | Self::AddTodoResponse(r)
            | Self::CommandExecutionResponse(r)
            | Self::WebFetchResponse(r)
            | Self::WebSearchResponse(r) => Some(r.request_id.as_str()),
            Self::UserMessage { .. }
            | Self::AgentTextResponse { .. }
            | Self::AgentInit { .. }
            | Self::TaskCompleted { .. }
            | Self::MaxTurnsError { .. }
            | Self::ExecutionError { .. } => None,
        }
    }
}

/// Sink for outbound notifications.
///
/// Calls are fire-and-forget from the relay's point of view: callers log a
/// returned error and move on.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;
}

impl<T: Notifier + ?Sized> Notifier for Arc<T> {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        (**self).notify(notification)
    }
}

impl<T: Notifier + ?Sized> Notifier for &T {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        (**self).notify(notification)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn notification_tag_is_snake_case() {
        let n = Notification::FileReadRequest {
            request_id: "t1".into(),
            path: Some("a.txt".into()),
            start_line: None,
            end_line: None,
        };
        let json = serde_json::to_string(&n).unwrap();
        assert!(json.contains("\"type\":\"file_read_request\""));
        assert!(json.contains("\"request_id\":\"t1\""));
        assert!(!json.contains("start_line"));
    }

    #[test]
    fn response_flattens_payload() {
        let n = Notification::FileReadResponse(ToolResponse {
            request_id: "t1".into(),
            content: json!("file contents"),
            is_error: false,
        });
        let value = serde_json::to_value(&n).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "file_read_response",
                "request_id": "t1",
                "content": "file contents",
                "is_error": false
            })
        );
    }

    #[test]
    fn domains() {
        assert_eq!(Notification::error_text("x").domain(), Domain::Chat);
        assert_eq!(
            Notification::ListDirectoryRequest {
                request_id: "t".into(),
                path: ".".into()
            }
            .domain(),
            Domain::Fs
        );
        assert_eq!(
            Notification::MaxTurnsError {
                num_turns: 1,
                duration_ms: 1,
                total_cost_usd: 0.0
            }
            .domain(),
            Domain::System
        );
        assert_eq!(serde_json::to_string(&Domain::Codeutils).unwrap(), "\"codeutils\"");
    }

    #[test]
    fn request_id_extraction() {
        let n = Notification::CommandExecutionResponse(ToolResponse {
            request_id: "b1".into(),
            content: json!("ok"),
            is_error: false,
        });
        assert_eq!(n.request_id(), Some("b1"));
        assert_eq!(Notification::error_text("x").request_id(), None);
    }

    #[test]
    fn error_text_sets_flag() {
        let n = Notification::error_text("boom");
        assert_eq!(
            n,
            Notification::AgentTextResponse {
                text: "boom".into(),
                is_error: true
            }
        );
    }

    #[test]
    fn deserializes_from_wire() {
        let json = r#"{"type":"agent_text_response","text":"hi"}"#;
        let n: Notification = serde_json::from_str(json).unwrap();
        assert_eq!(
            n,
            Notification::AgentTextResponse {
                text: "hi".into(),
                is_error: false
            }
        );
    }
}

//! Event dispatcher
//!
//! Turns each `StreamEvent` into notifications. A `Dispatcher` lives for one
//! query: it owns the map from tool invocation id to tool name, so results can
//! be labeled with the tool that produced them.
//!
//! Routing is two-level: the event tag picks the handler, then every content
//! block is classified by `route_block`. The order of the arms in
//! `route_block` is the specificity order (tag + name before tag alone).

use crate::agents::truncate;
use crate::event::{
    AssistantEvent, ContentBlock, ResultEvent, ResultSubtype, StreamEvent, SystemEvent, ToolResult,
    ToolUse, UserContent, UserEvent,
};
use crate::notify::{Notification, Notifier, ToolResponse};
use crate::tools::{KnownTool, ToolName, tool_label};
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, info, trace, warn};

/// Tool invocation id -> tool name, for one session.
///
/// Entries are never removed; the map lives as long as its dispatcher.
#[derive(Debug, Default)]
pub struct ToolCorrelation {
    names: HashMap<String, ToolName>,
}

impl ToolCorrelation {
    pub fn record(&mut self, id: &str, name: ToolName) {
        self.names.insert(id.to_string(), name);
    }

    pub fn lookup(&self, id: &str) -> Option<&ToolName> {
        self.names.get(id)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Message role a content block was found under
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

/// Handler selected for one content block
#[derive(Debug, PartialEq)]
pub enum BlockRoute<'a> {
    /// `user` + `tool_result`
    ToolResult(&'a ToolResult),
    /// `user` + `text`
    UserText(&'a str),
    /// `user` + anything else (images, documents, ...): recorded as JSON
    UserOther(&'a ContentBlock),
    /// `assistant` + `text`
    AgentText(&'a str),
    /// `assistant` + `tool_use` with a known name
    ToolRequest(KnownTool, &'a ToolUse),
    /// `assistant` + `tool_use` with any other name
    CustomTool(&'a ToolUse),
    /// `assistant` + anything else: logged only
    Unhandled(&'a ContentBlock),
}

/// Classify a content block. Most specific match first.
pub fn route_block(role: Role, block: &ContentBlock) -> BlockRoute<'_> {
    match (role, block) {
        (Role::User, ContentBlock::ToolResult(result)) => BlockRoute::ToolResult(result),
        (Role::User, ContentBlock::Text { text }) => BlockRoute::UserText(text),
        (Role::User, other) => BlockRoute::UserOther(other),
        (Role::Assistant, ContentBlock::Text { text }) => BlockRoute::AgentText(text),
        (Role::Assistant, ContentBlock::ToolUse(call)) => match KnownTool::from_name(&call.name) {
            Some(tool) => BlockRoute::ToolRequest(tool, call),
            None => BlockRoute::CustomTool(call),
        },
        (Role::Assistant, other) => BlockRoute::Unhandled(other),
    }
}

/// Per-query event dispatcher.
pub struct Dispatcher<N> {
    notifier: N,
    tools: ToolCorrelation,
}

impl<N: Notifier> Dispatcher<N> {
    pub fn new(notifier: N) -> Self {
        Self {
            notifier,
            tools: ToolCorrelation::default(),
        }
    }

    pub fn correlation(&self) -> &ToolCorrelation {
        &self.tools
    }

    /// Dispatch one event. Never fails; unmatched shapes are logged.
    pub fn dispatch(&mut self, event: &StreamEvent) {
        match event {
            StreamEvent::User(user) => self.user(user),
            StreamEvent::Assistant(assistant) => self.assistant(assistant),
            StreamEvent::System(system) => self.system(system),
            StreamEvent::Result(result) => self.result(result),
            StreamEvent::Unknown(raw) => {
                let event_type = raw.get("type").and_then(Value::as_str).unwrap_or("?");
                warn!(event_type, "unknown event");
                debug!(%raw, "unknown event payload");
            }
        }
    }

    /// Report a failure to the chat channel (best-effort).
    pub fn report_error(&self, text: impl Into<String>) {
        self.emit(Notification::error_text(text));
    }

    fn emit(&self, notification: Notification) {
        trace!(?notification, "notify");
        if let Err(e) = self.notifier.notify(&notification) {
            warn!(
                kind = ?notification.domain(),
                request_id = notification.request_id().unwrap_or(""),
                "notification failed: {e}"
            );
        }
    }

    fn user(&mut self, user: &UserEvent) {
        let blocks = match &user.message.content {
            UserContent::Text(text) => {
                self.user_message(text.clone(), user);
                return;
            }
            UserContent::Blocks(blocks) => blocks,
        };

        for block in blocks {
            match route_block(Role::User, block) {
                BlockRoute::ToolResult(result) => self.tool_result(result),
                BlockRoute::UserText(text) => self.user_message(text.to_string(), user),
                BlockRoute::UserOther(other) => {
                    let json = serde_json::to_string(other).unwrap_or_default();
                    self.user_message(json, user);
                }
                route => debug!(?route, "unexpected route for user block"),
            }
        }
    }

    fn user_message(&self, message: String, user: &UserEvent) {
        info!(
            session_id = user.session_id.as_deref().unwrap_or(""),
            parent_tool_use_id = user.parent_tool_use_id.as_deref().unwrap_or(""),
            message = truncate(&message, 100),
            "user message"
        );
        self.emit(Notification::UserMessage {
            message,
            session_id: user.session_id.clone(),
            parent_tool_use_id: user.parent_tool_use_id.clone(),
        });
    }

    fn tool_result(&self, result: &ToolResult) {
        let id = result.tool_use_id.as_str();
        let content = result.content();
        let is_error = result.is_error();

        match self.tools.lookup(id) {
            Some(ToolName::Known(tool)) => {
                let tool = *tool;
                info!(%tool, request_id = id, is_error, "tool result");
                debug!(content = %preview(&content, tool.preview_limit()), "tool result content");
                self.emit(tool.response(id, content, is_error));
            }
            name => {
                info!(
                    tool = name.map(ToolName::as_str).unwrap_or("<unknown>"),
                    request_id = id,
                    is_error,
                    "generic tool result"
                );
                debug!(content = %preview(&content, 500), "tool result content");
                self.emit(Notification::ToolResult(ToolResponse {
                    request_id: id.to_string(),
                    content,
                    is_error,
                }));
            }
        }
    }

    fn assistant(&mut self, assistant: &AssistantEvent) {
        for block in &assistant.message.content {
            match route_block(Role::Assistant, block) {
                BlockRoute::AgentText(text) => {
                    info!(text = truncate(text, 100), "agent text");
                    self.emit(Notification::AgentTextResponse {
                        text: text.to_string(),
                        is_error: false,
                    });
                }
                BlockRoute::ToolRequest(tool, call) => {
                    self.tools.record(&call.id, ToolName::Known(tool));
                    info!(
                        %tool,
                        request_id = %call.id,
                        label = %tool_label(tool.name(), &call.input).unwrap_or_default(),
                        "tool request"
                    );
                    for notification in tool.requests(&call.id, &call.input) {
                        self.emit(notification);
                    }
                }
                BlockRoute::CustomTool(call) => {
                    self.tools.record(&call.id, ToolName::Custom(call.name.clone()));
                    info!(
                        tool = %call.name,
                        request_id = %call.id,
                        label = %tool_label(&call.name, &call.input).unwrap_or_default(),
                        "custom tool request"
                    );
                    self.emit(Notification::CustomToolRequest {
                        tool_name: call.name.clone(),
                        request_id: call.id.clone(),
                        input: call.input.clone(),
                        summary: format!("Custom tool executed: {}", call.name),
                    });
                }
                BlockRoute::Unhandled(other) => {
                    warn!(
                        block_type = block_type(other),
                        "unknown assistant content type"
                    );
                }
                route => debug!(?route, "unexpected route for assistant block"),
            }
        }
    }

    fn system(&self, system: &SystemEvent) {
        info!(
            subtype = system.subtype.as_deref().unwrap_or(""),
            api_key_source = system.api_key_source.as_deref().unwrap_or(""),
            cwd = system.cwd.as_deref().unwrap_or(""),
            model = system.model.as_deref().unwrap_or(""),
            permission_mode = system.permission_mode.as_deref().unwrap_or(""),
            tools = system.tools.len(),
            mcp_servers = system.mcp_servers.len(),
            "system init"
        );
        self.emit(Notification::AgentInit {
            api_key_source: system.api_key_source.clone(),
            cwd: system.cwd.clone(),
            tools: system.tools.clone(),
            mcp_servers: system.mcp_servers.clone(),
            model: system.model.clone(),
            permission_mode: system.permission_mode.clone(),
        });
    }

    fn result(&self, result: &ResultEvent) {
        let duration = format!("{}ms", result.duration_ms);
        let cost = format!("${:.4}", result.total_cost_usd);
        match &result.subtype {
            ResultSubtype::Success => {
                info!(
                    %duration,
                    api_duration = %format!("{}ms", result.duration_api_ms),
                    turns = result.num_turns,
                    %cost,
                    "task completed"
                );
                self.emit(Notification::TaskCompleted {
                    result: result.result.clone().unwrap_or_default(),
                    duration_ms: result.duration_ms,
                    duration_api_ms: result.duration_api_ms,
                    num_turns: result.num_turns,
                    total_cost_usd: result.total_cost_usd,
                    usage: result.usage.clone(),
                    session_id: result.session_id.clone(),
                });
            }
            ResultSubtype::ErrorMaxTurns => {
                warn!(%duration, turns = result.num_turns, %cost, "max turns reached");
                self.emit(Notification::MaxTurnsError {
                    num_turns: result.num_turns,
                    duration_ms: result.duration_ms,
                    total_cost_usd: result.total_cost_usd,
                });
            }
            ResultSubtype::ErrorDuringExecution => {
                warn!(%duration, turns = result.num_turns, %cost, "execution error");
                self.emit(Notification::ExecutionError {
                    num_turns: result.num_turns,
                    duration_ms: result.duration_ms,
                    total_cost_usd: result.total_cost_usd,
                });
            }
            ResultSubtype::Other(subtype) => {
                warn!(%subtype, "unknown result subtype");
            }
        }
    }
}

fn block_type(block: &ContentBlock) -> &str {
    match block {
        ContentBlock::Text { .. } => "text",
        ContentBlock::ToolUse(_) => "tool_use",
        ContentBlock::ToolResult(_) => "tool_result",
        ContentBlock::Other(raw) => raw.get("type").and_then(Value::as_str).unwrap_or("?"),
    }
}

fn preview(content: &Value, max: usize) -> String {
    match content {
        Value::String(s) if s.chars().count() > max => format!("{}...", truncate(s, max)),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::MemoryNotifier;
    use serde_json::json;

    fn event(value: Value) -> StreamEvent {
        serde_json::from_value(value).unwrap()
    }

    fn tool_use(id: &str, name: &str, input: Value) -> StreamEvent {
        event(json!({
            "type": "assistant",
            "message": {"content": [{"type": "tool_use", "id": id, "name": name, "input": input}]}
        }))
    }

    fn tool_result(id: &str, content: Value, is_error: bool) -> StreamEvent {
        event(json!({
            "type": "user",
            "message": {"content": [
                {"type": "tool_result", "tool_use_id": id, "content": content, "is_error": is_error}
            ]}
        }))
    }

    #[test]
    fn read_request_records_correlation() {
        let sink = MemoryNotifier::default();
        let mut d = Dispatcher::new(&sink);
        d.dispatch(&tool_use("t1", "Read", json!({"path": "a.txt"})));

        assert_eq!(d.correlation().lookup("t1"), Some(&ToolName::Known(KnownTool::Read)));
        assert_eq!(
            sink.take(),
            vec![Notification::FileReadRequest {
                request_id: "t1".into(),
                path: Some("a.txt".into()),
                start_line: None,
                end_line: None,
            }]
        );
    }

    #[test]
    fn correlated_result_uses_tool_specific_response() {
        let sink = MemoryNotifier::default();
        let mut d = Dispatcher::new(&sink);
        d.dispatch(&tool_use("t1", "Read", json!({"path": "a.txt"})));
        sink.take();

        d.dispatch(&tool_result("t1", json!("file contents"), false));
        assert_eq!(
            sink.take(),
            vec![Notification::FileReadResponse(ToolResponse {
                request_id: "t1".into(),
                content: json!("file contents"),
                is_error: false,
            })]
        );
    }

    #[test]
    fn unknown_result_id_goes_generic_once() {
        let sink = MemoryNotifier::default();
        let mut d = Dispatcher::new(&sink);
        d.dispatch(&tool_result("missing", json!("x"), true));

        assert_eq!(
            sink.take(),
            vec![Notification::ToolResult(ToolResponse {
                request_id: "missing".into(),
                content: json!("x"),
                is_error: true,
            })]
        );
    }

    #[test]
    fn correlation_does_not_leak_across_sessions() {
        let sink = MemoryNotifier::default();
        let mut first = Dispatcher::new(&sink);
        first.dispatch(&tool_use("t1", "Read", json!({"path": "a.txt"})));
        assert_eq!(first.correlation().lookup("t1"), Some(&ToolName::Known(KnownTool::Read)));
        sink.take();

        let mut second = Dispatcher::new(&sink);
        second.dispatch(&tool_result("t1", json!("contents"), false));
        assert_eq!(
            sink.take(),
            vec![Notification::ToolResult(ToolResponse {
                request_id: "t1".into(),
                content: json!("contents"),
                is_error: false,
            })]
        );
        assert!(second.correlation().is_empty());
    }

    #[test]
    fn custom_tool_is_recorded_and_result_is_generic() {
        let sink = MemoryNotifier::default();
        let mut d = Dispatcher::new(&sink);
        d.dispatch(&tool_use("c1", "mcp__memory__search", json!({"q": "x"})));
        assert_eq!(
            d.correlation().lookup("c1"),
            Some(&ToolName::Custom("mcp__memory__search".into()))
        );

        let sent = sink.take();
        assert_eq!(
            sent,
            vec![Notification::CustomToolRequest {
                tool_name: "mcp__memory__search".into(),
                request_id: "c1".into(),
                input: json!({"q": "x"}),
                summary: "Custom tool executed: mcp__memory__search".into(),
            }]
        );

        d.dispatch(&tool_result("c1", json!("hits"), false));
        assert!(matches!(sink.take().as_slice(), [Notification::ToolResult(_)]));
    }

    #[test]
    fn user_text_blocks_are_literal() {
        let sink = MemoryNotifier::default();
        let mut d = Dispatcher::new(&sink);
        d.dispatch(&event(json!({
            "type": "user",
            "session_id": "s1",
            "parent_tool_use_id": "p1",
            "message": {"content": [
                {"type": "text", "text": "  keep   spacing\n"},
                {"type": "text", "text": "second"}
            ]}
        })));

        assert_eq!(
            sink.take(),
            vec![
                Notification::UserMessage {
                    message: "  keep   spacing\n".into(),
                    session_id: Some("s1".into()),
                    parent_tool_use_id: Some("p1".into()),
                },
                Notification::UserMessage {
                    message: "second".into(),
                    session_id: Some("s1".into()),
                    parent_tool_use_id: Some("p1".into()),
                },
            ]
        );
    }

    #[test]
    fn user_string_content() {
        let sink = MemoryNotifier::default();
        let mut d = Dispatcher::new(&sink);
        d.dispatch(&event(json!({"type": "user", "message": {"content": "hello"}})));
        assert_eq!(
            sink.take(),
            vec![Notification::UserMessage {
                message: "hello".into(),
                session_id: None,
                parent_tool_use_id: None,
            }]
        );
    }

    #[test]
    fn user_image_block_recorded_as_json() {
        let sink = MemoryNotifier::default();
        let mut d = Dispatcher::new(&sink);
        d.dispatch(&event(json!({
            "type": "user",
            "message": {"content": [{"type": "image", "source": {"type": "base64"}}]}
        })));
        let sent = sink.take();
        let [Notification::UserMessage { message, .. }] = sent.as_slice() else {
            panic!("expected one user message, got {sent:?}");
        };
        let parsed: Value = serde_json::from_str(message).unwrap();
        assert_eq!(parsed["type"], "image");
    }

    #[test]
    fn assistant_text_and_unknown_block() {
        let sink = MemoryNotifier::default();
        let mut d = Dispatcher::new(&sink);
        d.dispatch(&event(json!({
            "type": "assistant",
            "message": {"content": [
                {"type": "thinking", "thinking": "hmm"},
                {"type": "text", "text": "Done."}
            ]}
        })));
        assert_eq!(
            sink.take(),
            vec![Notification::AgentTextResponse {
                text: "Done.".into(),
                is_error: false
            }]
        );
    }

    #[test]
    fn success_result_is_verbatim() {
        let sink = MemoryNotifier::default();
        let mut d = Dispatcher::new(&sink);
        d.dispatch(&event(json!({
            "type": "result", "subtype": "success", "result": "done",
            "duration_ms": 100, "duration_api_ms": 80, "num_turns": 2,
            "total_cost_usd": 0.01, "usage": {}
        })));
        assert_eq!(
            sink.take(),
            vec![Notification::TaskCompleted {
                result: "done".into(),
                duration_ms: 100,
                duration_api_ms: 80,
                num_turns: 2,
                total_cost_usd: 0.01,
                usage: json!({}),
                session_id: None,
            }]
        );
    }

    #[test]
    fn error_results() {
        let sink = MemoryNotifier::default();
        let mut d = Dispatcher::new(&sink);
        d.dispatch(&event(json!({
            "type": "result", "subtype": "error_max_turns",
            "duration_ms": 5000, "num_turns": 10, "total_cost_usd": 0.5
        })));
        d.dispatch(&event(json!({
            "type": "result", "subtype": "error_during_execution",
            "duration_ms": 10, "num_turns": 1, "total_cost_usd": 0.0
        })));
        d.dispatch(&event(json!({"type": "result", "subtype": "something_new"})));
        assert_eq!(
            sink.take(),
            vec![
                Notification::MaxTurnsError {
                    num_turns: 10,
                    duration_ms: 5000,
                    total_cost_usd: 0.5
                },
                Notification::ExecutionError {
                    num_turns: 1,
                    duration_ms: 10,
                    total_cost_usd: 0.0
                },
            ]
        );
    }

    #[test]
    fn system_init() {
        let sink = MemoryNotifier::default();
        let mut d = Dispatcher::new(&sink);
        d.dispatch(&event(json!({
            "type": "system", "subtype": "init", "apiKeySource": "user",
            "cwd": "/w", "tools": ["Read"], "mcp_servers": [], "model": "m",
            "permissionMode": "default"
        })));
        assert_eq!(
            sink.take(),
            vec![Notification::AgentInit {
                api_key_source: Some("user".into()),
                cwd: Some("/w".into()),
                tools: vec!["Read".into()],
                mcp_servers: vec![],
                model: Some("m".into()),
                permission_mode: Some("default".into()),
            }]
        );
    }

    #[test]
    fn unknown_event_notifies_nothing() {
        let sink = MemoryNotifier::default();
        let mut d = Dispatcher::new(&sink);
        d.dispatch(&event(json!({"type": "stream_event", "event": {}})));
        assert!(sink.take().is_empty());
    }

    #[test]
    fn dispatch_twice_is_not_deduplicated() {
        let sink = MemoryNotifier::default();
        let mut d = Dispatcher::new(&sink);
        let ev = tool_use("t9", "Bash", json!({"command": "ls"}));
        d.dispatch(&ev);
        d.dispatch(&ev);
        let sent = sink.take();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0], sent[1]);
        assert_eq!(d.correlation().len(), 1);
    }

    #[test]
    fn route_specificity_order() {
        let read = ContentBlock::ToolUse(ToolUse {
            id: "1".into(),
            name: "Read".into(),
            input: json!({}),
        });
        let custom = ContentBlock::ToolUse(ToolUse {
            id: "2".into(),
            name: "Skill".into(),
            input: json!({}),
        });
        let text = ContentBlock::Text { text: "x".into() };

        assert!(matches!(
            route_block(Role::Assistant, &read),
            BlockRoute::ToolRequest(KnownTool::Read, _)
        ));
        assert!(matches!(route_block(Role::Assistant, &custom), BlockRoute::CustomTool(_)));
        assert_eq!(route_block(Role::Assistant, &text), BlockRoute::AgentText("x"));
        assert_eq!(route_block(Role::User, &text), BlockRoute::UserText("x"));
        assert!(matches!(route_block(Role::User, &read), BlockRoute::UserOther(_)));
    }

    #[test]
    fn failing_sink_does_not_stop_dispatch() {
        struct Broken;
        impl Notifier for Broken {
            fn notify(&self, _: &Notification) -> Result<(), crate::error::NotifyError> {
                Err(crate::error::NotifyError::Poisoned)
            }
        }
        let mut d = Dispatcher::new(Broken);
        d.dispatch(&tool_use("t1", "Glob", json!({"pattern": "*.rs"})));
        assert!(d.correlation().lookup("t1").is_some());
    }
}

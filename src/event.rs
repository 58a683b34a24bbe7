//! Agent stream events
//!
//! One `StreamEvent` per line of the agent's `stream-json` output. Known tags
//! are parsed into typed payloads; anything else is kept as raw JSON so the
//! dispatcher can log it instead of failing.

use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

/// One item yielded by the agent query, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "Value")]
pub enum StreamEvent {
    User(UserEvent),
    Assistant(AssistantEvent),
    System(SystemEvent),
    Result(ResultEvent),
    /// Unrecognized tag or a known tag with an unexpected shape
    Unknown(Value),
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum TaggedEvent {
    User(UserEvent),
    Assistant(AssistantEvent),
    System(SystemEvent),
    Result(ResultEvent),
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum TaggedEventRef<'a> {
    User(&'a UserEvent),
    Assistant(&'a AssistantEvent),
    System(&'a SystemEvent),
    Result(&'a ResultEvent),
}

impl From<Value> for StreamEvent {
    fn from(value: Value) -> Self {
        match TaggedEvent::deserialize(&value) {
            Ok(TaggedEvent::User(e)) => Self::User(e),
            Ok(TaggedEvent::Assistant(e)) => Self::Assistant(e),
            Ok(TaggedEvent::System(e)) => Self::System(e),
            Ok(TaggedEvent::Result(e)) => Self::Result(e),
            Err(_) => Self::Unknown(value),
        }
    }
}

impl Serialize for StreamEvent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::User(e) => TaggedEventRef::User(e).serialize(serializer),
            Self::Assistant(e) => TaggedEventRef::Assistant(e).serialize(serializer),
            Self::System(e) => TaggedEventRef::System(e).serialize(serializer),
            Self::Result(e) => TaggedEventRef::Result(e).serialize(serializer),
            Self::Unknown(raw) => raw.serialize(serializer),
        }
    }
}

impl StreamEvent {
    /// Parse one `stream-json` line.
    pub fn parse(line: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(line)
    }

    /// Wire tag of the event (`"unknown"` for unparsed shapes)
    pub fn kind(&self) -> &'static str {
        match self {
            Self::User(_) => "user",
            Self::Assistant(_) => "assistant",
            Self::System(_) => "system",
            Self::Result(_) => "result",
            Self::Unknown(_) => "unknown",
        }
    }
}

// ---------------------------------------------------------------------------
// user / assistant
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserEvent {
    pub message: UserMessage,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub parent_tool_use_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserMessage {
    pub content: UserContent,
}

/// User message content: plain text or a list of blocks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssistantEvent {
    pub message: AssistantMessage,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub parent_tool_use_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssistantMessage {
    #[serde(default)]
    pub content: Vec<ContentBlock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

// ---------------------------------------------------------------------------
// Content blocks
// ---------------------------------------------------------------------------

/// A sub-item of a message's content, tagged by `type`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "Value")]
pub enum ContentBlock {
    Text { text: String },
    ToolUse(ToolUse),
    ToolResult(ToolResult),
    /// Images, documents, thinking blocks, ...
    Other(Value),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolUse {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub input: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_use_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_error: Option<bool>,
}

impl ToolResult {
    /// Result payload (a string or an array of blocks); `""` when absent.
    pub fn content(&self) -> Value {
        match &self.content {
            Some(Value::Null) | None => Value::String(String::new()),
            Some(v) => v.clone(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.is_error.unwrap_or(false)
    }
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum TaggedBlock {
    Text { text: String },
    ToolUse(ToolUse),
    ToolResult(ToolResult),
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum TaggedBlockRef<'a> {
    Text { text: &'a str },
    ToolUse(&'a ToolUse),
    ToolResult(&'a ToolResult),
}

impl From<Value> for ContentBlock {
    fn from(value: Value) -> Self {
        match TaggedBlock::deserialize(&value) {
            Ok(TaggedBlock::Text { text }) => Self::Text { text },
            Ok(TaggedBlock::ToolUse(t)) => Self::ToolUse(t),
            Ok(TaggedBlock::ToolResult(r)) => Self::ToolResult(r),
            Err(_) => Self::Other(value),
        }
    }
}

impl Serialize for ContentBlock {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Text { text } => TaggedBlockRef::Text { text }.serialize(serializer),
            Self::ToolUse(t) => TaggedBlockRef::ToolUse(t).serialize(serializer),
            Self::ToolResult(r) => TaggedBlockRef::ToolResult(r).serialize(serializer),
            Self::Other(raw) => raw.serialize(serializer),
        }
    }
}

// ---------------------------------------------------------------------------
// system / result
// ---------------------------------------------------------------------------

/// Session initialization metadata.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SystemEvent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    #[serde(rename = "apiKeySource", default)]
    pub api_key_source: Option<String>,
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default)]
    pub mcp_servers: Vec<Value>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(rename = "permissionMode", default)]
    pub permission_mode: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
}

/// Terminal event of a query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultEvent {
    pub subtype: ResultSubtype,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(default)]
    pub duration_api_ms: u64,
    #[serde(default)]
    pub num_turns: u32,
    #[serde(default)]
    pub total_cost_usd: f64,
    #[serde(default)]
    pub usage: Value,
    /// Final text, present on success
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub is_error: bool,
    #[serde(default)]
    pub session_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ResultSubtype {
    Success,
    ErrorMaxTurns,
    ErrorDuringExecution,
    Other(String),
}

impl From<String> for ResultSubtype {
    fn from(value: String) -> Self {
        match value.as_str() {
            "success" => Self::Success,
            "error_max_turns" => Self::ErrorMaxTurns,
            "error_during_execution" => Self::ErrorDuringExecution,
            _ => Self::Other(value),
        }
    }
}

impl From<ResultSubtype> for String {
    fn from(value: ResultSubtype) -> Self {
        match value {
            ResultSubtype::Success => "success".to_string(),
            ResultSubtype::ErrorMaxTurns => "error_max_turns".to_string(),
            ResultSubtype::ErrorDuringExecution => "error_during_execution".to_string(),
            ResultSubtype::Other(s) => s,
        }
    }
}

//! Built-in agent tools
//!
//! Maps each tool the relay knows by name to its request and response
//! notifications. Tool inputs are opaque JSON; fields are looked up under every
//! key the agent (or older agent versions) has been seen to use.

use crate::agents::{short_path, truncate};
use crate::notify::{Notification, ToolResponse};
use serde_json::Value;
use std::fmt;

/// Tools with a dedicated notification mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KnownTool {
    Read,
    Write,
    Edit,
    MultiEdit,
    Ls,
    Grep,
    Glob,
    Task,
    Bash,
    TodoWrite,
    WebFetch,
    WebSearch,
    NotebookRead,
    NotebookEdit,
}

impl KnownTool {
    pub const ALL: [KnownTool; 14] = [
        Self::Read,
        Self::Write,
        Self::Edit,
        Self::MultiEdit,
        Self::Ls,
        Self::Grep,
        Self::Glob,
        Self::Task,
        Self::Bash,
        Self::TodoWrite,
        Self::WebFetch,
        Self::WebSearch,
        Self::NotebookRead,
        Self::NotebookEdit,
    ];

    /// Resolve a `tool_use` name. Matching is exact and case-sensitive.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tool| tool.name() == name)
    }

    /// Name as it appears in `tool_use` blocks
    pub fn name(self) -> &'static str {
        match self {
            Self::Read => "Read",
            Self::Write => "Write",
            Self::Edit => "Edit",
            Self::MultiEdit => "MultiEdit",
            Self::Ls => "LS",
            Self::Grep => "Grep",
            Self::Glob => "Glob",
            Self::Task => "Task",
            Self::Bash => "Bash",
            Self::TodoWrite => "TodoWrite",
            Self::WebFetch => "WebFetch",
            Self::WebSearch => "WebSearch",
            Self::NotebookRead => "NotebookRead",
            Self::NotebookEdit => "NotebookEdit",
        }
    }

    /// Build the request notification(s) for one invocation.
    ///
    /// MultiEdit and TodoWrite fan out into one notification per entry, with
    /// ids suffixed `-{index}`.
    pub fn requests(self, id: &str, input: &Value) -> Vec<Notification> {
        match self {
            Self::Read => vec![Notification::FileReadRequest {
                request_id: id.to_string(),
                path: str_field(input, &["path", "file_path", "filename"]),
                start_line: text_field(input, &["start_line", "offset"]),
                end_line: text_field(input, &["end_line"]),
            }],
            Self::Write => vec![Notification::WriteToFileRequest {
                request_id: id.to_string(),
                path: str_field(input, &["path", "file_path", "filename"]),
                content: str_field(input, &["text", "content"]).unwrap_or_default(),
            }],
            Self::Edit => {
                let path = str_field(input, &["path", "file_path"]);
                vec![Notification::FileEditRequest {
                    request_id: id.to_string(),
                    file_name: file_name(path.as_deref(), "file"),
                    path,
                    new_content: str_field(input, &["newStr", "newContent", "new_string"])
                        .unwrap_or_default(),
                }]
            }
            Self::MultiEdit => array_field(input, "edits")
                .iter()
                .enumerate()
                .map(|(index, edit)| {
                    let path = str_field(edit, &["path"]);
                    Notification::FileEditRequest {
                        request_id: format!("{id}-{index}"),
                        file_name: file_name(path.as_deref(), &format!("file-{index}")),
                        path,
                        new_content: str_field(edit, &["newContent", "newStr", "new_string"])
                            .unwrap_or_default(),
                    }
                })
                .collect(),
            Self::Ls => vec![Notification::ListDirectoryRequest {
                request_id: id.to_string(),
                path: str_field(input, &["path"]).unwrap_or_else(|| ".".to_string()),
            }],
            Self::Grep => vec![Notification::GrepSearchRequest {
                request_id: id.to_string(),
                query: str_field(input, &["query", "pattern"]),
                include_pattern: str_field(input, &["filePath", "includePattern", "path"]),
                recursive: bool_field(input, "recursive"),
                ignore_case: bool_field(input, "ignoreCase").unwrap_or(false)
                    || bool_field(input, "-i").unwrap_or(false)
                    || !bool_field(input, "case_sensitive").unwrap_or(false),
                max_results: u64_field(input, &["maxResults", "head_limit"]),
            }],
            Self::Glob => vec![Notification::GlobSearchRequest {
                request_id: id.to_string(),
                pattern: str_field(input, &["pattern"]),
                path: str_field(input, &["path", "basePath"]),
                max_depth: u64_field(input, &["maxDepth"]),
                include_directories: bool_field(input, "includeDirectories"),
            }],
            Self::Task => vec![Notification::AddTodoRequest {
                request_id: id.to_string(),
                title: str_field(input, &["task", "description"]),
                description: str_field(input, &["description", "task"]),
                phase: str_field(input, &["phase"]),
                category: str_field(input, &["category"]),
                priority: str_field(input, &["priority"]),
                tags: tags_field(input),
            }],
            Self::Bash => vec![Notification::CommandExecutionRequest {
                request_id: id.to_string(),
                command: str_field(input, &["command"]).unwrap_or_default(),
                return_empty_string_on_success: bool_field(input, "returnEmptyStringOnSuccess"),
                execute_in_main: bool_field(input, "executeInMain"),
            }],
            Self::TodoWrite => array_field(input, "todos")
                .iter()
                .enumerate()
                .map(|(index, todo)| {
                    let content = str_field(todo, &["content"]);
                    Notification::AddTodoRequest {
                        request_id: format!("{id}-{index}"),
                        title: content.clone(),
                        description: content,
                        phase: str_field(todo, &["phase"]),
                        category: str_field(todo, &["category"]),
                        priority: str_field(todo, &["priority"]),
                        tags: tags_field(todo),
                    }
                })
                .collect(),
            Self::WebFetch => vec![Notification::WebFetchRequest {
                request_id: id.to_string(),
                url: str_field(input, &["url"]),
                method: str_field(input, &["method"]).unwrap_or_else(|| "GET".to_string()),
                headers: input.get("headers").filter(|v| !v.is_null()).cloned(),
                body: input.get("body").filter(|v| !v.is_null()).cloned(),
                timeout: u64_field(input, &["timeout"]),
            }],
            Self::WebSearch => vec![Notification::WebSearchRequest {
                request_id: id.to_string(),
                query: str_field(input, &["query"]),
                max_results: u64_field(input, &["maxResults", "max_results"]),
                search_engine: str_field(input, &["searchEngine", "search_engine"]),
                filters: input.get("filters").filter(|v| !v.is_null()).cloned(),
            }],
            Self::NotebookRead => vec![Notification::FileReadRequest {
                request_id: id.to_string(),
                path: str_field(input, &["path", "notebook_path"]),
                start_line: text_field(input, &["cell_index", "cell_id"]),
                end_line: None,
            }],
            Self::NotebookEdit => {
                let path = str_field(input, &["path", "notebook_path"]);
                vec![Notification::FileEditRequest {
                    request_id: id.to_string(),
                    file_name: file_name(path.as_deref(), "notebook"),
                    path,
                    new_content: str_field(input, &["content", "new_source"]).unwrap_or_default(),
                }]
            }
        }
    }

    /// Build the response notification for a result correlated to this tool.
    pub fn response(self, id: &str, content: Value, is_error: bool) -> Notification {
        let response = ToolResponse {
            request_id: id.to_string(),
            content,
            is_error,
        };
        match self {
            Self::Read | Self::NotebookRead => Notification::FileReadResponse(response),
            Self::Write | Self::Edit | Self::MultiEdit | Self::NotebookEdit => {
                Notification::FileEditResponse(response)
            }
            Self::Ls => Notification::ListDirectoryResponse(response),
            Self::Grep => Notification::GrepSearchResponse(response),
            Self::Glob => Notification::GlobSearchResponse(response),
            Self::Task | Self::TodoWrite => Notification::AddTodoResponse(response),
            Self::Bash => Notification::CommandExecutionResponse(response),
            Self::WebFetch => Notification::WebFetchResponse(response),
            Self::WebSearch => Notification::WebSearchResponse(response),
        }
    }

    /// Maximum characters of result content worth logging
    pub fn preview_limit(self) -> usize {
        match self {
            Self::Read | Self::NotebookRead => 200,
            Self::WebFetch => 300,
            _ => 500,
        }
    }
}

impl fmt::Display for KnownTool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Tool name recorded for an invocation id
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolName {
    Known(KnownTool),
    Custom(String),
}

impl ToolName {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Known(tool) => tool.name(),
            Self::Custom(name) => name,
        }
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Short human-readable label for a tool invocation, used in logs.
pub fn tool_label(name: &str, input: &Value) -> Option<String> {
    match name {
        "Bash" => str_field(input, &["description", "command"]).map(|s| truncate(&s, 60).to_string()),
        "Read" | "Write" | "Edit" | "MultiEdit" => {
            str_field(input, &["file_path", "path", "filename"]).map(|p| short_path(&p))
        }
        "NotebookRead" | "NotebookEdit" => {
            str_field(input, &["notebook_path", "path"]).map(|p| short_path(&p))
        }
        "LS" => str_field(input, &["path"]),
        "Glob" => str_field(input, &["pattern"]),
        "Grep" => str_field(input, &["pattern", "query"]).map(|s| truncate(&s, 40).to_string()),
        "WebFetch" => str_field(input, &["url"]).map(|s| truncate(&s, 60).to_string()),
        "WebSearch" => str_field(input, &["query"]).map(|s| truncate(&s, 60).to_string()),
        "Task" => str_field(input, &["description", "task"]).map(|s| truncate(&s, 60).to_string()),
        "TodoWrite" => Some(format!("{} todos", array_field(input, "todos").len())),
        name => name
            .strip_prefix("mcp__")
            .map(|stripped| stripped.rsplit("__").next().unwrap_or(stripped).to_string()),
    }
}

// ---------------------------------------------------------------------------
// Field helpers
// ---------------------------------------------------------------------------

/// First non-empty string under any of `keys`.
fn str_field(input: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| input.get(*key))
        .filter_map(Value::as_str)
        .find(|s| !s.is_empty())
        .map(String::from)
}

/// First string or number under any of `keys`, rendered as text.
fn text_field(input: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|key| input.get(*key))
        .find_map(|v| match v {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
}

fn bool_field(input: &Value, key: &str) -> Option<bool> {
    input.get(key).and_then(Value::as_bool)
}

fn u64_field(input: &Value, keys: &[&str]) -> Option<u64> {
    keys.iter()
        .filter_map(|key| input.get(*key))
        .find_map(Value::as_u64)
}

fn array_field<'a>(input: &'a Value, key: &str) -> &'a [Value] {
    input
        .get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

fn tags_field(input: &Value) -> Vec<String> {
    array_field(input, "tags")
        .iter()
        .filter_map(Value::as_str)
        .map(String::from)
        .collect()
}

fn file_name(path: Option<&str>, fallback: &str) -> String {
    path.map(short_path)
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| fallback.to_string())
}

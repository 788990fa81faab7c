use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Title carried by the synthetic item that reports a failed search
pub const SEARCH_ERROR_TITLE: &str = "Search error";

/// Number of results requested from the search provider per call
pub const SEARCH_RESULT_COUNT: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::System => write!(f, "system"),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Unknown tool: {0}")]
pub struct UnknownToolName(pub String);

/// Tools the assistant can call. The set is closed; unknown names never parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ToolName {
    #[serde(rename = "searchWeb")]
    SearchWeb,
}

impl ToolName {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::SearchWeb => "searchWeb",
        }
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolName {
    type Err = UnknownToolName;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "searchWeb" => Ok(ToolName::SearchWeb),
            other => Err(UnknownToolName(other.to_string())),
        }
    }
}

/// Arguments accepted by the `searchWeb` tool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchWebInput {
    pub query: String,
}

/// Lifecycle of a tool part. Transitions only move left to right.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ToolState {
    InputStreaming,
    InputAvailable,
    OutputAvailable,
    OutputError,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("Invalid tool state transition from {from:?} to {to:?}")]
pub struct InvalidTransition {
    pub from: ToolState,
    pub to: ToolState,
}

impl ToolState {
    fn rank(self) -> u8 {
        match self {
            ToolState::InputStreaming => 0,
            ToolState::InputAvailable => 1,
            ToolState::OutputAvailable | ToolState::OutputError => 2,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ToolState::OutputAvailable | ToolState::OutputError)
    }

    /// Move to `next`, rejecting same-state and backward moves.
    /// The two terminal states are mutually exclusive.
    pub fn advance(&mut self, next: ToolState) -> Result<(), InvalidTransition> {
        if self.is_terminal() || next.rank() <= self.rank() {
            return Err(InvalidTransition {
                from: *self,
                to: next,
            });
        }
        *self = next;
        Ok(())
    }
}

/// One search hit, or the synthetic item describing a failed search
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResultItem {
    pub title: String,
    pub link: String,
    pub snippet: String,
}

impl ToolResultItem {
    pub fn new(
        title: impl Into<String>,
        link: impl Into<String>,
        snippet: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            link: link.into(),
            snippet: snippet.into(),
        }
    }

    pub fn search_error(message: impl Into<String>) -> Self {
        Self {
            title: SEARCH_ERROR_TITLE.to_string(),
            link: String::new(),
            snippet: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.link.is_empty() || self.title == SEARCH_ERROR_TITLE
    }

    /// Link to show to the user. Error items never link anywhere.
    pub fn external_link(&self) -> Option<&str> {
        if self.is_error() {
            None
        } else {
            Some(&self.link)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolPart {
    pub tool_call_id: String,
    pub tool_name: ToolName,
    pub state: ToolState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Vec<ToolResultItem>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_text: Option<String>,
}

impl ToolPart {
    pub fn new(tool_call_id: impl Into<String>, tool_name: ToolName) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            tool_name,
            state: ToolState::InputStreaming,
            input: None,
            output: None,
            error_text: None,
        }
    }

    pub fn set_input(&mut self, input: serde_json::Value) -> Result<(), InvalidTransition> {
        self.state.advance(ToolState::InputAvailable)?;
        self.input = Some(input);
        Ok(())
    }

    pub fn set_output(&mut self, output: Vec<ToolResultItem>) -> Result<(), InvalidTransition> {
        self.state.advance(ToolState::OutputAvailable)?;
        self.output = Some(output);
        Ok(())
    }

    pub fn fail(&mut self, error_text: impl Into<String>) -> Result<(), InvalidTransition> {
        self.state.advance(ToolState::OutputError)?;
        self.error_text = Some(error_text.into());
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        !self.state.is_terminal()
    }

    /// Typed view of the input, when it has the `searchWeb` shape.
    pub fn search_input(&self) -> Option<SearchWebInput> {
        self.input
            .as_ref()
            .and_then(|value| serde_json::from_value(value.clone()).ok())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Part {
    Text { text: String },
    Tool(ToolPart),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub role: Role,
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Message {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            role,
            parts: Vec::new(),
        }
    }

    pub fn user(id: impl Into<String>, text: impl Into<String>) -> Self {
        let mut message = Self::new(id, Role::User);
        message.parts.push(Part::Text { text: text.into() });
        message
    }

    pub fn assistant(id: impl Into<String>) -> Self {
        Self::new(id, Role::Assistant)
    }

    /// Append to the trailing text part, starting a new one after a tool part.
    pub fn append_text(&mut self, delta: &str) {
        if let Some(Part::Text { text }) = self.parts.last_mut() {
            text.push_str(delta);
        } else {
            self.parts.push(Part::Text {
                text: delta.to_string(),
            });
        }
    }

    /// Concatenated text of all text parts
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                Part::Text { text } => Some(text.as_str()),
                Part::Tool(_) => None,
            })
            .collect()
    }

    pub fn tool_parts(&self) -> impl Iterator<Item = &ToolPart> {
        self.parts.iter().filter_map(|part| match part {
            Part::Tool(tool) => Some(tool),
            Part::Text { .. } => None,
        })
    }

    pub fn tool_part_mut(&mut self, tool_call_id: &str) -> Option<&mut ToolPart> {
        self.parts.iter_mut().find_map(|part| match part {
            Part::Tool(tool) if tool.tool_call_id == tool_call_id => Some(tool),
            _ => None,
        })
    }

    pub fn has_running_tool(&self) -> bool {
        self.tool_parts().any(ToolPart::is_running)
    }
}

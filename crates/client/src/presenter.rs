//! View model for a conversation: what to draw, independent of any UI toolkit.

use crate::reducer::{ConversationState, RequestFailure, RequestStatus, SubmitError};
use domain::{Message, Part, Role, StreamEvent, ToolPart, ToolResultItem, ToolState};
use std::collections::HashMap;
use std::fmt::Write;

/// Identifies one tool call within a message by its position among the tool parts
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ToolCallKey {
    pub message_id: String,
    pub tool_call_index: usize,
}

impl ToolCallKey {
    pub fn new(message_id: impl Into<String>, tool_call_index: usize) -> Self {
        Self {
            message_id: message_id.into(),
            tool_call_index,
        }
    }
}

/// Which result lists are open. Everything starts collapsed.
#[derive(Debug, Clone, Default)]
pub struct ExpansionState {
    expanded: HashMap<ToolCallKey, bool>,
}

impl ExpansionState {
    pub fn is_expanded(&self, key: &ToolCallKey) -> bool {
        self.expanded.get(key).copied().unwrap_or(false)
    }

    /// Flip one list and return its new state
    pub fn toggle(&mut self, key: ToolCallKey) -> bool {
        let entry = self.expanded.entry(key).or_insert(false);
        *entry = !*entry;
        *entry
    }

    pub fn set(&mut self, key: ToolCallKey, expanded: bool) {
        self.expanded.insert(key, expanded);
    }

    pub fn clear(&mut self) {
        self.expanded.clear();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BannerKind {
    /// 401/429/400 before streaming began
    Rejected,
    /// The server ended the stream with an error
    ServerError,
    /// The connection dropped or the request was aborted
    Interrupted,
}

/// Request-level failure notice, shown apart from inline search errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Banner {
    pub kind: BannerKind,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultItemView {
    pub title: String,
    /// `None` for the synthetic "Search error" item
    pub link: Option<String>,
    pub snippet: String,
    pub is_error: bool,
}

impl From<&ToolResultItem> for ResultItemView {
    fn from(item: &ToolResultItem) -> Self {
        Self {
            title: item.title.clone(),
            link: item.external_link().map(str::to_string),
            snippet: item.snippet.clone(),
            is_error: item.is_error(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Block {
    Text(String),
    /// A search is running
    Searching { query: String },
    /// Collapsible list of finished search results
    SearchResults {
        key: ToolCallKey,
        query: String,
        badge: String,
        expanded: bool,
        items: Vec<ResultItemView>,
    },
    NoResults { query: String },
    /// The request failed while this search was running
    SearchAborted { query: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageView {
    pub id: String,
    pub role: Role,
    /// Any tool part still waiting for output
    pub tool_running: bool,
    /// Cut short by a request failure
    pub failed: bool,
    pub blocks: Vec<Block>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ViewModel {
    pub banner: Option<Banner>,
    pub messages: Vec<MessageView>,
    pub can_submit: bool,
    pub streaming: bool,
}

pub fn result_badge(count: usize) -> String {
    if count == 1 {
        "1 result".to_string()
    } else {
        format!("{count} results")
    }
}

fn search_query(part: &ToolPart) -> String {
    part.search_input().map(|i| i.query).unwrap_or_default()
}

fn tool_block(message_id: &str, index: usize, part: &ToolPart, expansion: &ExpansionState) -> Block {
    let query = search_query(part);
    match part.state {
        ToolState::InputStreaming | ToolState::InputAvailable => Block::Searching { query },
        ToolState::OutputError => Block::SearchAborted { query },
        ToolState::OutputAvailable => {
            let items: Vec<ResultItemView> = part
                .output
                .as_deref()
                .unwrap_or_default()
                .iter()
                .map(ResultItemView::from)
                .collect();
            if items.is_empty() {
                return Block::NoResults { query };
            }
            let key = ToolCallKey::new(message_id, index);
            Block::SearchResults {
                expanded: expansion.is_expanded(&key),
                badge: result_badge(items.len()),
                key,
                query,
                items,
            }
        }
    }
}

fn message_view(
    message: &Message,
    state: &ConversationState,
    expansion: &ExpansionState,
) -> MessageView {
    let mut tool_index = 0;
    let blocks = message
        .parts
        .iter()
        .filter_map(|part| match part {
            Part::Text { text } if text.is_empty() => None,
            Part::Text { text } => Some(Block::Text(text.clone())),
            Part::Tool(tool) => {
                let block = tool_block(&message.id, tool_index, tool, expansion);
                tool_index += 1;
                Some(block)
            }
        })
        .collect();

    MessageView {
        id: message.id.clone(),
        role: message.role,
        tool_running: message.has_running_tool(),
        failed: state.is_failed(&message.id),
        blocks,
    }
}

/// Build the view model for a conversation
pub fn render(state: &ConversationState, expansion: &ExpansionState) -> ViewModel {
    let banner = match state.status() {
        RequestStatus::Error(failure) => Some(Banner {
            kind: match failure {
                RequestFailure::Rejected { .. } => BannerKind::Rejected,
                RequestFailure::Server { .. } => BannerKind::ServerError,
                RequestFailure::Interrupted { .. } => BannerKind::Interrupted,
            },
            message: failure.message().to_string(),
        }),
        _ => None,
    };

    ViewModel {
        banner,
        messages: state
            .messages()
            .map(|m| message_view(m, state, expansion))
            .collect(),
        can_submit: state.can_submit(),
        streaming: state.status().is_in_flight(),
    }
}

/// A conversation plus the UI state that belongs to it
#[derive(Debug, Clone, Default)]
pub struct ConversationView {
    state: ConversationState,
    expansion: ExpansionState,
}

impl ConversationView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &ConversationState {
        &self.state
    }

    pub fn apply(&mut self, event: &StreamEvent) {
        self.state.apply(event);
    }

    pub fn begin_submission(&mut self, text: &str) -> Result<Vec<Message>, SubmitError> {
        self.state.begin_submission(text)
    }

    pub fn reject(&mut self, status: u16, message: impl Into<String>) {
        self.state.reject(status, message);
    }

    pub fn interrupt(&mut self, reason: impl Into<String>) {
        self.state.interrupt(reason);
    }

    pub fn toggle(&mut self, key: ToolCallKey) -> bool {
        self.expansion.toggle(key)
    }

    pub fn expansion(&self) -> &ExpansionState {
        &self.expansion
    }

    /// Switch to another conversation; open result lists are forgotten
    pub fn replace_messages(&mut self, messages: impl IntoIterator<Item = Message>) {
        self.state.replace_messages(messages);
        self.expansion.clear();
    }

    pub fn reset(&mut self) {
        self.state.reset();
        self.expansion.clear();
    }

    pub fn render(&self) -> ViewModel {
        render(&self.state, &self.expansion)
    }
}

/// Plain-text rendering for terminals and logs
pub fn render_plain(view: &ViewModel) -> String {
    let mut out = String::new();

    for message in &view.messages {
        let _ = writeln!(out, "{}:", message.role);
        for block in &message.blocks {
            match block {
                Block::Text(text) => {
                    for line in text.lines() {
                        let _ = writeln!(out, "  {line}");
                    }
                }
                Block::Searching { query } => {
                    let _ = writeln!(out, "  ... searching the web for \"{query}\"");
                }
                Block::NoResults { query } => {
                    let _ = writeln!(out, "  no results for \"{query}\"");
                }
                Block::SearchAborted { query } => {
                    let _ = writeln!(out, "  search for \"{query}\" did not finish");
                }
                Block::SearchResults {
                    key,
                    query,
                    badge,
                    expanded,
                    items,
                } => {
                    let marker = if *expanded { "[-]" } else { "[+]" };
                    let _ = writeln!(
                        out,
                        "  {marker} {badge} for \"{query}\" (#{})",
                        key.tool_call_index
                    );
                    if *expanded {
                        for item in items {
                            match &item.link {
                                Some(link) => {
                                    let _ = writeln!(out, "      - {} <{}>", item.title, link);
                                }
                                None => {
                                    let _ = writeln!(out, "      ! {}", item.title);
                                }
                            }
                            if !item.snippet.is_empty() {
                                let _ = writeln!(out, "        {}", item.snippet);
                            }
                        }
                    }
                }
            }
        }
        if message.failed {
            let _ = writeln!(out, "  (incomplete)");
        }
    }

    if let Some(banner) = &view.banner {
        let label = match banner.kind {
            BannerKind::Rejected => "request refused",
            BannerKind::ServerError => "error",
            BannerKind::Interrupted => "interrupted",
        };
        let _ = writeln!(out, "[{label}] {}", banner.message);
    }

    out
}

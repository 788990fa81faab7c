// Domain Layer - Shared Wire Model
//
// This crate contains the types exchanged between the chat server and its clients:
// - messages: conversation messages, parts and tool-part state
// - events: the streamed event unit and its ordering rules
//
// Nothing here performs I/O; both the server and the client depend on it.

pub mod events;
pub mod messages;

// Re-export all public types for convenience
pub use events::{validate_ordering, FinishReason, OrderingValidator, OrderingViolation, StreamEvent};
pub use messages::{
    InvalidTransition, Message, Part, Role, SearchWebInput, ToolName, ToolPart, ToolResultItem,
    ToolState, UnknownToolName, SEARCH_ERROR_TITLE, SEARCH_RESULT_COUNT,
};

use thiserror::Error;

/// Errors that can occur while resolving or decoding a tool call.
///
/// Neither variant aborts a turn: the dispatcher recovers from both.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolError {
    #[error("tool not found: {0}")]
    NotFound(String),
    #[error("invalid arguments: {0}")]
    Decode(String),
}

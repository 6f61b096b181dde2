//! Tool host trait.

use super::{Arguments, ToolError};
use crate::model::ToolSpec;

/// Trait for tool execution hosts.
///
/// Implementations provide tool specifications and execute tool calls.
/// This is the boundary between the completion protocol and side effects.
pub trait ToolHost: Send + Sync {
    /// Get available tool specifications, in registration order.
    fn specs(&self) -> &[ToolSpec];

    /// Execute the named tool with already-decoded arguments.
    fn execute(&self, name: &str, arguments: &Arguments) -> Result<String, ToolError>;
}

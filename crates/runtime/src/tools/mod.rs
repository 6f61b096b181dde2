//! Local tools: registration table, argument decoding and dispatch.

mod args;
pub mod builtin;
mod dispatch;
pub mod errors;
mod host;
mod registry;

pub use args::{Arguments, decode_arguments, string_arg};
pub use dispatch::{DispatchReport, RESULTS_HEADER, dispatch};
pub use errors::ToolError;
pub use host::ToolHost;
pub use registry::{Handler, ToolEntry, ToolRegistry};

//! Tool call dispatch.

use super::{Arguments, ToolError, ToolHost, decode_arguments};
use crate::model::ToolCall;

/// Header that starts every dispatch result.
pub const RESULTS_HEADER: &str = "RESULTS:\n";

/// Aggregated outcome of one batch of tool calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    /// Header followed by one line per executed call.
    pub text: String,
    /// Names of the tools that ran, in call order.
    pub invoked: Vec<String>,
    /// Names the host did not recognise.
    pub skipped: Vec<String>,
}

impl Default for DispatchReport {
    fn default() -> Self {
        Self {
            text: RESULTS_HEADER.to_string(),
            invoked: Vec::new(),
            skipped: Vec::new(),
        }
    }
}

/// Run every call against the host, in order.
///
/// Undecodable arguments are replaced by an empty map and unknown tools
/// are skipped, so a single bad call never aborts the batch.
pub fn dispatch<H: ToolHost + ?Sized>(host: &H, calls: &[ToolCall]) -> DispatchReport {
    let mut report = DispatchReport::default();

    for call in calls {
        let arguments = decode_arguments(&call.arguments).unwrap_or_else(|e| {
            tracing::debug!(tool = %call.name, error = %e, "treating arguments as empty");
            Arguments::new()
        });

        match host.execute(&call.name, &arguments) {
            Ok(output) => {
                report.text.push_str(&output);
                report.text.push('\n');
                report.invoked.push(call.name.clone());
            }
            Err(ToolError::NotFound(name)) => {
                tracing::warn!(tool = %name, "unknown function call");
                report.skipped.push(name);
            }
            Err(e) => {
                tracing::warn!(tool = %call.name, error = %e, "tool call skipped");
                report.skipped.push(call.name.clone());
            }
        }
    }

    report
}

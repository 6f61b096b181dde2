//! Built-in demonstration tools.

use serde_json::{Value, json};

use super::{Arguments, ToolEntry, args::string_arg};
use crate::model::ToolSpec;

pub const SAY_HELLO: &str = "say_hello";
pub const VULCAN_SALUTE: &str = "vulcan_salute";

/// Registration rows for the built-in tools.
pub fn entries() -> Vec<ToolEntry> {
    vec![
        ToolEntry::new(
            person_tool(SAY_HELLO, "Say hello to the given person name"),
            say_hello,
        ),
        ToolEntry::new(
            person_tool(VULCAN_SALUTE, "Give a vulcan salute to the given person name"),
            vulcan_salute,
        ),
    ]
}

/// `"Hello <name>"`, or empty when `name` is missing or not a string.
pub fn say_hello(arguments: &Arguments) -> String {
    let Some(name) = string_arg(arguments, "name") else {
        return String::new();
    };
    tracing::info!(tool = SAY_HELLO, name, "tool called");
    format!("Hello {name}")
}

/// `"Live long and prosper <name>"`, or empty when `name` is unusable.
pub fn vulcan_salute(arguments: &Arguments) -> String {
    let Some(name) = string_arg(arguments, "name") else {
        return String::new();
    };
    tracing::info!(tool = VULCAN_SALUTE, name, "tool called");
    format!("Live long and prosper {name}")
}

fn person_tool(name: &str, description: &str) -> ToolSpec {
    ToolSpec {
        name: name.to_string(),
        description: description.to_string(),
        schema: name_schema(),
    }
}

fn name_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "name": { "type": "string" }
        },
        "required": ["name"]
    })
}

//! Parley runtime: two-phase tool calling against an OpenAI-compatible
//! inference server.
//!
//! # Overview
//!
//! A question is answered in two model calls:
//!
//! - **Tool selection**: the tools model sees the question and the local
//!   tool specs and decides which tools to call (temperature 0).
//! - **Answer**: the tool outputs are added as system context and the chat
//!   model streams a reply (tools disabled).
//!
//! The pieces:
//!
//! - **ToolRegistry**: the static table of local tools, exposed through the
//!   `ToolHost` trait.
//! - **Backend**: a trait abstracting the model provider;
//!   `OpenAiBackend` is the HTTP implementation.
//! - **Orchestrator**: runs the protocol for one question.
//! - **Session**: feeds the orchestrator one question or a stream of lines.
//!
//! # Example
//!
//! ```ignore
//! use runtime::{Input, OpenAiBackend, Orchestrator, Session, ToolRegistry, DEFAULT_BASE_URL};
//!
//! # async fn example() -> runtime::Result<()> {
//! let backend = OpenAiBackend::builder(DEFAULT_BASE_URL)
//!     .build()
//!     .map_err(runtime::Error::Transport)?;
//! let session = Session::new(Orchestrator::new(backend, ToolRegistry::builtin()));
//!
//! let mut stdout = std::io::stdout();
//! session.run(Input::once("Say hello to Worf"), &mut stdout).await?;
//! # Ok(())
//! # }
//! ```

mod error;
pub mod model;
pub mod orchestrator;
mod providers;
mod session;
pub mod tools;

#[cfg(test)]
mod testing;

// Error types
pub use error::{Error, Result};

// Model protocol
pub use model::{Backend, Message, ModelError, Role, TextStream, ToolCall, ToolSpec};

// Providers
pub use providers::{OpenAiBackend, OpenAiBackendBuilder};

// Tools
pub use tools::{DispatchReport, ToolEntry, ToolError, ToolHost, ToolRegistry};

// Protocol
pub use orchestrator::{
    DEFAULT_BASE_URL, DEFAULT_CHAT_MODEL, DEFAULT_TOOLS_MODEL, Orchestrator, OrchestratorConfig,
    Phase, PhaseSettings, TurnOutcome,
};

// Session management
pub use session::{Command, DEFAULT_QUESTION, Input, Session, SessionId};

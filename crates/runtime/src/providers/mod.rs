//! LLM provider adapters.
//!
//! Each provider implements the backend trait for its specific API.

mod openai;
mod sse;

pub use openai::{OpenAiBackend, OpenAiBackendBuilder};

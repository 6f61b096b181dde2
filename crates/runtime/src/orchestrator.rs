//! Two-phase completion protocol.
//!
//! Phase one asks the tools model, deterministically and with tools
//! enabled, which local tools to run. The tool outputs are then handed to
//! the chat model as extra system context and its answer is streamed to
//! the caller. Keeping tools out of the second request stops the model
//! from asking for more tool calls while it writes the answer.

use std::fmt;
use std::io::Write;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::model::{Backend, Message, ModelError, ModelRequest};
use crate::tools::{DispatchReport, ToolHost, ToolRegistry, dispatch};
use crate::{Error, Result};

pub const DEFAULT_BASE_URL: &str = "http://localhost:12434/engines/llama.cpp/v1";
pub const DEFAULT_TOOLS_MODEL: &str = "hf.co/salesforce/llama-xlam-2-8b-fc-r-gguf:q4_k_m";
pub const DEFAULT_CHAT_MODEL: &str = "ai/qwen2.5:latest";
pub const TOOL_SELECTION_TEMPERATURE: f32 = 0.0;
pub const ANSWER_TEMPERATURE: f32 = 0.8;

pub const SYSTEM_INSTRUCTIONS: &str = "You are a useful AI agent.";
pub const TOOL_SELECTION_INSTRUCTIONS: &str = "Your job is to understand the user prompt and decide if you need to use tools to run external commands.\nIgnore all things not related to the usage of a tool";
pub const ANSWER_INSTRUCTIONS: &str = "If you detect that the user prompt is related to a tool,\nignore this part and focus on the other parts.";

/// Model and sampling settings for one phase.
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseSettings {
    pub model: String,
    pub temperature: f32,
}

impl PhaseSettings {
    pub fn new(model: impl Into<String>, temperature: f32) -> Self {
        Self {
            model: model.into(),
            temperature,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorConfig {
    pub tool_selection: PhaseSettings,
    pub answer: PhaseSettings,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            tool_selection: PhaseSettings::new(DEFAULT_TOOLS_MODEL, TOOL_SELECTION_TEMPERATURE),
            answer: PhaseSettings::new(DEFAULT_CHAT_MODEL, ANSWER_TEMPERATURE),
        }
    }
}

/// Where a turn is in the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    ToolSelectionPending,
    Dispatching,
    AnswerStreaming,
    Done,
    Errored,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Done | Phase::Errored)
    }

    /// Whether `self -> next` is a legal transition.
    pub fn can_advance_to(self, next: Phase) -> bool {
        use Phase::*;
        match (self, next) {
            (Idle, ToolSelectionPending)
            | (ToolSelectionPending, Dispatching)
            | (ToolSelectionPending, Done)
            | (Dispatching, AnswerStreaming)
            | (AnswerStreaming, Done) => true,
            (from, Errored) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::ToolSelectionPending => "tool_selection_pending",
            Phase::Dispatching => "dispatching",
            Phase::AnswerStreaming => "answer_streaming",
            Phase::Done => "done",
            Phase::Errored => "errored",
        };
        f.write_str(name)
    }
}

/// How a successful turn ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The tools model chose no tools; no answer was requested.
    NoToolInvoked,
    /// Tools ran and the answer was streamed to the output.
    Answered(DispatchReport),
}

/// Phase tracker for a single question.
#[derive(Debug)]
struct Turn {
    phase: Phase,
}

impl Turn {
    fn new() -> Self {
        Self { phase: Phase::Idle }
    }

    fn advance(&mut self, next: Phase) {
        debug_assert!(
            self.phase.can_advance_to(next),
            "illegal transition {} -> {next}",
            self.phase
        );
        tracing::debug!(from = %self.phase, to = %next, "phase transition");
        self.phase = next;
    }

    fn fail(&mut self, err: Error) -> Error {
        tracing::debug!(phase = %self.phase, error = %err, "turn failed");
        self.advance(Phase::Errored);
        err
    }
}

/// Drives the two-phase protocol against a backend and a tool host.
pub struct Orchestrator<B, H = ToolRegistry> {
    backend: B,
    tools: H,
    config: OrchestratorConfig,
}

impl<B: Backend, H: ToolHost> Orchestrator<B, H> {
    pub fn new(backend: B, tools: H) -> Self {
        Self {
            backend,
            tools,
            config: OrchestratorConfig::default(),
        }
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Answer one question, writing the streamed answer to `out`.
    pub async fn ask<W: Write>(
        &self,
        question: &str,
        out: &mut W,
        cancel: &CancellationToken,
    ) -> Result<TurnOutcome> {
        let mut turn = Turn::new();

        turn.advance(Phase::ToolSelectionPending);
        let messages = tool_selection_messages(question);
        let settings = &self.config.tool_selection;
        let request = ModelRequest {
            model: &settings.model,
            messages: &messages,
            tools: self.tools.specs(),
            temperature: settings.temperature,
            parallel_tool_calls: true,
        };
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ModelError::Cancelled),
            response = self.backend.call(request) => response,
        };
        let response = match response {
            Ok(response) => response,
            Err(e) => return Err(turn.fail(Error::Transport(e))),
        };
        tracing::debug!(
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            tool_calls = response.tool_calls.len(),
            "tool selection finished"
        );

        if response.tool_calls.is_empty() {
            turn.advance(Phase::Done);
            return Ok(TurnOutcome::NoToolInvoked);
        }

        turn.advance(Phase::Dispatching);
        let report = dispatch(&self.tools, &response.tool_calls);

        turn.advance(Phase::AnswerStreaming);
        let messages = answer_messages(question, &report.text);
        let settings = &self.config.answer;
        let request = ModelRequest {
            model: &settings.model,
            messages: &messages,
            tools: &[],
            temperature: settings.temperature,
            parallel_tool_calls: false,
        };
        let mut stream = match self.backend.stream(request, cancel.clone()).await {
            Ok(stream) => stream,
            Err(e) => return Err(turn.fail(Error::Transport(e))),
        };

        while let Some(fragment) = stream.next().await {
            let fragment = match fragment {
                Ok(fragment) => fragment,
                Err(e) => return Err(turn.fail(Error::Stream(e))),
            };
            if fragment.is_empty() {
                continue;
            }
            if let Err(e) = out
                .write_all(fragment.as_bytes())
                .and_then(|()| out.flush())
            {
                return Err(turn.fail(Error::Io(e)));
            }
        }

        turn.advance(Phase::Done);
        Ok(TurnOutcome::Answered(report))
    }
}

/// Messages for the tool-selection request.
pub fn tool_selection_messages(question: &str) -> Vec<Message> {
    vec![
        Message::system(SYSTEM_INSTRUCTIONS),
        Message::system(TOOL_SELECTION_INSTRUCTIONS),
        Message::user(question),
    ]
}

/// Messages for the answer request, carrying the dispatch results.
pub fn answer_messages(question: &str, results: &str) -> Vec<Message> {
    vec![
        Message::system(SYSTEM_INSTRUCTIONS),
        Message::system(ANSWER_INSTRUCTIONS),
        Message::system(results),
        Message::user(question),
    ]
}

//! Session driver.
//!
//! Feeds questions to the [`Orchestrator`], either a single fixed
//! question or one question per input line until `/bye`.

use std::io::{BufRead, Write};

use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::Result;
use crate::model::Backend;
use crate::orchestrator::{Orchestrator, TurnOutcome};
use crate::tools::{ToolHost, ToolRegistry};

pub const PROMPT: &str = "Enter your question (or /bye to exit): ";
pub const EXIT_COMMAND: &str = "/bye";
pub const FAREWELL: &str = "Goodbye! 👋";
pub const NO_TOOL_MESSAGE: &str = "😡 No function call";

/// Question asked by the single-shot driver when none is given.
pub const DEFAULT_QUESTION: &str = "Say hello to Jean-Luc Picard \
and Say hello to James Kirk \
and make a Vulcan salute to Spock. \
Add some fancy emojis to the results.";

/// A unique identifier for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where questions come from.
pub enum Input<R> {
    /// Ask one question and stop.
    Once(String),
    /// Prompt for a question per line until `/bye` or end of input.
    Lines(R),
}

impl Input<std::io::Empty> {
    pub fn once(question: impl Into<String>) -> Self {
        Self::Once(question.into())
    }
}

/// What a line of interactive input asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    Exit,
    Empty,
    Ask(&'a str),
}

impl<'a> Command<'a> {
    pub fn parse(line: &'a str) -> Self {
        match line.trim() {
            "" => Command::Empty,
            EXIT_COMMAND => Command::Exit,
            question => Command::Ask(question),
        }
    }
}

/// A question-answering session.
pub struct Session<B, H = ToolRegistry> {
    pub id: SessionId,
    orchestrator: Orchestrator<B, H>,
    cancel: CancellationToken,
}

impl<B: Backend, H: ToolHost> Session<B, H> {
    pub fn new(orchestrator: Orchestrator<B, H>) -> Self {
        Self {
            id: SessionId::new(),
            orchestrator,
            cancel: CancellationToken::new(),
        }
    }

    /// Share a cancellation token; cancelling it aborts the current
    /// answer and ends an interactive loop.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn orchestrator(&self) -> &Orchestrator<B, H> {
        &self.orchestrator
    }

    /// Run the session to completion.
    ///
    /// Single-shot sessions return the first error. Interactive sessions
    /// report errors to `out` and keep going.
    pub async fn run<R: BufRead, W: Write>(&self, input: Input<R>, out: &mut W) -> Result<()> {
        let span = tracing::info_span!("session", id = %self.id);
        match input {
            Input::Once(question) => self.run_once(&question, out).instrument(span).await,
            Input::Lines(reader) => self.run_lines(reader, out).instrument(span).await,
        }
    }

    async fn run_once<W: Write>(&self, question: &str, out: &mut W) -> Result<()> {
        match self.orchestrator.ask(question, out, &self.cancel).await? {
            TurnOutcome::NoToolInvoked => {
                writeln!(out, "{NO_TOOL_MESSAGE}")?;
                writeln!(out)?;
            }
            TurnOutcome::Answered(_) => writeln!(out)?,
        }
        Ok(())
    }

    async fn run_lines<R: BufRead, W: Write>(&self, mut reader: R, out: &mut W) -> Result<()> {
        while !self.cancel.is_cancelled() {
            write!(out, "{PROMPT}")?;
            out.flush()?;

            let mut line = String::new();
            if reader.read_line(&mut line)? == 0 {
                // EOF
                writeln!(out)?;
                break;
            }

            let question = match Command::parse(&line) {
                Command::Exit => {
                    writeln!(out, "{FAREWELL}")?;
                    break;
                }
                Command::Empty => continue,
                Command::Ask(question) => question,
            };

            match self.orchestrator.ask(question, out, &self.cancel).await {
                Ok(TurnOutcome::NoToolInvoked) => {
                    writeln!(out, "{NO_TOOL_MESSAGE}")?;
                    writeln!(out)?;
                }
                Ok(TurnOutcome::Answered(_)) => {
                    writeln!(out)?;
                    writeln!(out)?;
                }
                Err(e) => {
                    tracing::debug!(error = %e, "turn failed, continuing");
                    writeln!(out, "😡 Error: {e}")?;
                    writeln!(out)?;
                }
            }
        }
        Ok(())
    }
}

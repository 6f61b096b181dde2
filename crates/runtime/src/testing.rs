//! In-memory backend for protocol tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::model::{
    Backend, Message, ModelError, ModelRequest, ModelResponse, TextStream, ToolCall,
};

type StreamScript = Result<Vec<Result<String, ModelError>>, ModelError>;

/// A request as the backend saw it.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub streaming: bool,
    pub model: String,
    pub messages: Vec<Message>,
    pub tools: Vec<String>,
    pub temperature: f32,
    pub parallel_tool_calls: bool,
}

/// Replays canned responses in order and records every request.
#[derive(Default)]
pub struct ScriptedBackend {
    calls: Mutex<VecDeque<Result<ModelResponse, ModelError>>>,
    streams: Mutex<VecDeque<StreamScript>>,
    requests: Mutex<Vec<RecordedRequest>>,
    call_delay: Option<Duration>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tool_calls(calls: impl IntoIterator<Item = ToolCall>) -> ModelResponse {
        ModelResponse {
            tool_calls: calls.into_iter().collect(),
            ..Default::default()
        }
    }

    pub fn text(content: &str) -> ModelResponse {
        ModelResponse {
            content: content.to_string(),
            ..Default::default()
        }
    }

    pub fn on_call(self, response: ModelResponse) -> Self {
        self.calls.lock().unwrap().push_back(Ok(response));
        self
    }

    pub fn on_call_err(self, err: ModelError) -> Self {
        self.calls.lock().unwrap().push_back(Err(err));
        self
    }

    /// Hold every non-streaming call for `delay` before answering.
    pub fn with_call_delay(mut self, delay: Duration) -> Self {
        self.call_delay = Some(delay);
        self
    }

    pub fn on_stream<const N: usize>(self, fragments: [&str; N]) -> Self {
        self.on_stream_items(fragments.iter().map(|f| Ok(f.to_string())).collect())
    }

    pub fn on_stream_items(self, items: Vec<Result<String, ModelError>>) -> Self {
        self.streams.lock().unwrap().push_back(Ok(items));
        self
    }

    pub fn on_stream_err(self, err: ModelError) -> Self {
        self.streams.lock().unwrap().push_back(Err(err));
        self
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn record(&self, request: &ModelRequest<'_>, streaming: bool) {
        self.requests.lock().unwrap().push(RecordedRequest {
            streaming,
            model: request.model.to_string(),
            messages: request.messages.to_vec(),
            tools: request.tools.iter().map(|t| t.name.clone()).collect(),
            temperature: request.temperature,
            parallel_tool_calls: request.parallel_tool_calls,
        });
    }
}

impl Backend for ScriptedBackend {
    async fn call(&self, request: ModelRequest<'_>) -> Result<ModelResponse, ModelError> {
        self.record(&request, false);
        if let Some(delay) = self.call_delay {
            tokio::time::sleep(delay).await;
        }
        self.calls
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ModelError::Api("no scripted response".into())))
    }

    async fn stream(
        &self,
        request: ModelRequest<'_>,
        _cancel: CancellationToken,
    ) -> Result<TextStream, ModelError> {
        self.record(&request, true);
        let script = self
            .streams
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ModelError::Api("no scripted stream".into())))?;
        Ok(Box::pin(futures::stream::iter(script)))
    }
}

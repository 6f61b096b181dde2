//! OpenAI-compatible chat completion backend.
//!
//! Speaks `POST {base_url}/chat/completions`, the dialect served by
//! llama.cpp, Docker Model Runner, Ollama and friends.

use std::time::Duration;

use futures::StreamExt;
use reqwest::RequestBuilder;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::sse::{SseDecoder, SseEvent};
use crate::model::{
    Backend, Message, ModelError, ModelRequest, ModelResponse, Role, TextStream, ToolCall,
    ToolSpec, Usage,
};

// ─────────────────────────────────────────────────────────────────────────────
// API Wire Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ApiRequest<'a> {
    model: &'a str,
    messages: Vec<ApiMessage<'a>>,
    temperature: f32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ApiTool<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parallel_tool_calls: Option<bool>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
}

impl<'a> ApiRequest<'a> {
    fn new(request: &ModelRequest<'a>, stream: bool) -> Self {
        let tools: Vec<ApiTool<'a>> = request.tools.iter().map(ApiTool::from).collect();
        let parallel_tool_calls = (!tools.is_empty()).then_some(request.parallel_tool_calls);

        Self {
            model: request.model,
            messages: request.messages.iter().map(ApiMessage::from).collect(),
            temperature: request.temperature,
            tools,
            parallel_tool_calls,
            stream,
        }
    }
}

#[derive(Debug, Serialize)]
struct ApiMessage<'a> {
    role: Role,
    content: &'a str,
}

impl<'a> From<&'a Message> for ApiMessage<'a> {
    fn from(msg: &'a Message) -> Self {
        Self {
            role: msg.role,
            content: &msg.content,
        }
    }
}

#[derive(Debug, Serialize)]
struct ApiTool<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    function: ApiFunction<'a>,
}

#[derive(Debug, Serialize)]
struct ApiFunction<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a Value,
}

impl<'a> From<&'a ToolSpec> for ApiTool<'a> {
    fn from(spec: &'a ToolSpec) -> Self {
        Self {
            kind: "function",
            function: ApiFunction {
                name: &spec.name,
                description: &spec.description,
                parameters: &spec.schema,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    choices: Vec<ApiChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ApiResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ApiToolCall>>,
}

#[derive(Debug, Deserialize)]
struct ApiToolCall {
    #[serde(default)]
    id: Option<String>,
    function: ApiFunctionCall,
}

#[derive(Debug, Deserialize)]
struct ApiFunctionCall {
    name: String,
    /// Normally a JSON-encoded string; some servers send an object.
    #[serde(default)]
    arguments: Value,
}

impl From<ApiToolCall> for ToolCall {
    fn from(call: ApiToolCall) -> Self {
        let arguments = match call.function.arguments {
            Value::String(raw) => raw,
            Value::Null => String::new(),
            other => other.to_string(),
        };
        Self {
            id: call.id,
            name: call.function.name,
            arguments,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ApiUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ApiStreamChunk {
    #[serde(default)]
    choices: Vec<ApiStreamChoice>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ApiStreamChoice {
    #[serde(default)]
    delta: ApiDelta,
}

#[derive(Debug, Default, Deserialize)]
struct ApiDelta {
    #[serde(default)]
    content: Option<String>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Backend Implementation
// ─────────────────────────────────────────────────────────────────────────────

/// Builder for creating an OpenAI-compatible backend.
#[derive(Debug, Clone)]
pub struct OpenAiBackendBuilder {
    base_url: String,
    api_key: String,
    timeout: Option<Duration>,
}

impl OpenAiBackendBuilder {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: String::new(),
            timeout: None,
        }
    }

    /// Bearer token. Local servers usually accept anything, so empty
    /// means no `Authorization` header at all.
    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }

    /// Overall timeout for each HTTP request, streaming included.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn build(self) -> Result<OpenAiBackend, ModelError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| ModelError::Network(e.to_string()))?;

        Ok(OpenAiBackend {
            client,
            base_url: self.base_url.trim_end_matches('/').to_string(),
            api_key: self.api_key,
        })
    }
}

/// OpenAI-compatible API backend.
pub struct OpenAiBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl OpenAiBackend {
    pub fn builder(base_url: impl Into<String>) -> OpenAiBackendBuilder {
        OpenAiBackendBuilder::new(base_url)
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn apply_auth(&self, req: RequestBuilder) -> RequestBuilder {
        if self.api_key.is_empty() {
            req
        } else {
            req.bearer_auth(&self.api_key)
        }
    }

    async fn post(&self, body: &ApiRequest<'_>) -> Result<reqwest::Response, ModelError> {
        let url = self.endpoint();
        if let Ok(payload) = serde_json::to_string(body) {
            tracing::debug!(endpoint = %url, %payload, "sending chat completion");
        }

        let req = self
            .client
            .post(&url)
            .header("content-type", "application/json");

        let response = self
            .apply_auth(req)
            .json(body)
            .send()
            .await
            .map_err(|e| ModelError::Network(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::Api(format!("{status}: {body}")));
        }

        Ok(response)
    }
}

impl std::fmt::Display for OpenAiBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "openai({})", self.base_url)
    }
}

impl Backend for OpenAiBackend {
    async fn call(&self, request: ModelRequest<'_>) -> Result<ModelResponse, ModelError> {
        let body = ApiRequest::new(&request, false);
        let response = self.post(&body).await?;

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| ModelError::InvalidResponse(e.to_string()))?;

        let usage = api_response.usage.unwrap_or_default();
        let choice = api_response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ModelError::InvalidResponse("response has no choices".into()))?;

        Ok(ModelResponse {
            content: choice.message.content.unwrap_or_default(),
            tool_calls: choice
                .message
                .tool_calls
                .unwrap_or_default()
                .into_iter()
                .map(ToolCall::from)
                .collect(),
            usage: Usage {
                input_tokens: usage.prompt_tokens,
                output_tokens: usage.completion_tokens,
            },
        })
    }

    async fn stream(
        &self,
        request: ModelRequest<'_>,
        cancel: CancellationToken,
    ) -> Result<TextStream, ModelError> {
        let body = ApiRequest::new(&request, true);
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ModelError::Cancelled),
            response = self.post(&body) => response?,
        };

        let mut bytes = Box::pin(response.bytes_stream());
        let stream = async_stream::stream! {
            let mut decoder = SseDecoder::new();
            loop {
                let next = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    next = bytes.next() => Some(next),
                };
                let chunk = match next {
                    Some(Some(Ok(chunk))) => chunk,
                    Some(Some(Err(e))) => {
                        yield Err(ModelError::Network(e.to_string()));
                        return;
                    }
                    Some(None) => break,
                    None => {
                        tracing::debug!("answer stream cancelled");
                        yield Err(ModelError::Cancelled);
                        return;
                    }
                };

                for event in decoder.push(&chunk) {
                    let SseEvent::Data(payload) = event else {
                        return;
                    };
                    match parse_chunk(&payload) {
                        Ok(Some(text)) => yield Ok(text),
                        Ok(None) => {}
                        Err(e) => {
                            yield Err(e);
                            return;
                        }
                    }
                }
            }

            // connection closed without [DONE]
            if let Some(SseEvent::Data(payload)) = decoder.finish() {
                match parse_chunk(&payload) {
                    Ok(Some(text)) => yield Ok(text),
                    Ok(None) => {}
                    Err(e) => yield Err(e),
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

/// Extract the text carried by one stream chunk.
fn parse_chunk(payload: &str) -> Result<Option<String>, ModelError> {
    let chunk: ApiStreamChunk = match serde_json::from_str(payload) {
        Ok(chunk) => chunk,
        Err(e) => {
            tracing::warn!(payload, error = %e, "skipping unparseable stream chunk");
            return Ok(None);
        }
    };

    if let Some(error) = chunk.error {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return Err(ModelError::Api(message));
    }

    let text: String = chunk
        .choices
        .into_iter()
        .filter_map(|choice| choice.delta.content)
        .collect();
    Ok((!text.is_empty()).then_some(text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use httptest::{Expectation, Server, matchers::*, responders::*};
    use serde_json::json;

    const PATH: &str = "/v1/chat/completions";

    fn backend(server: &Server) -> OpenAiBackend {
        OpenAiBackend::builder(server.url_str("/v1")).build().unwrap()
    }

    fn tools() -> Vec<ToolSpec> {
        vec![ToolSpec {
            name: "say_hello".into(),
            description: "Say hello to the given person name".into(),
            schema: json!({"type": "object"}),
        }]
    }

    fn request<'a>(messages: &'a [Message], tools: &'a [ToolSpec]) -> ModelRequest<'a> {
        ModelRequest {
            model: "test-model",
            messages,
            tools,
            temperature: 0.0,
            parallel_tool_calls: true,
        }
    }

    async fn collect(mut stream: TextStream) -> Vec<Result<String, ModelError>> {
        let mut items = Vec::new();
        while let Some(item) = stream.next().await {
            items.push(item);
        }
        items
    }

    #[test]
    fn display_and_endpoint_trim_slash() {
        let backend = OpenAiBackend::builder("http://localhost:12434/engines/llama.cpp/v1/")
            .build()
            .unwrap();
        assert_eq!(
            backend.endpoint(),
            "http://localhost:12434/engines/llama.cpp/v1/chat/completions"
        );
        assert_eq!(
            backend.to_string(),
            "openai(http://localhost:12434/engines/llama.cpp/v1)"
        );
    }

    #[test]
    fn request_without_tools_omits_tool_fields() {
        let messages = [Message::user("hi")];
        let body = serde_json::to_value(ApiRequest::new(&request(&messages, &[]), true)).unwrap();
        assert_eq!(
            body,
            json!({
                "model": "test-model",
                "messages": [{"role": "user", "content": "hi"}],
                "temperature": 0.0,
                "stream": true
            })
        );
    }

    #[tokio::test]
    async fn call_sends_tools_and_parses_tool_calls() {
        let server = Server::run();
        server.expect(
            Expectation::matching(all_of![
                request::method_path("POST", PATH),
                request::headers(not(contains(key("authorization")))),
                request::body(json_decoded(eq(json!({
                    "model": "test-model",
                    "messages": [
                        {"role": "system", "content": "be useful"},
                        {"role": "user", "content": "Say hello to Worf"}
                    ],
                    "temperature": 0.0,
                    "tools": [{
                        "type": "function",
                        "function": {
                            "name": "say_hello",
                            "description": "Say hello to the given person name",
                            "parameters": {"type": "object"}
                        }
                    }],
                    "parallel_tool_calls": true
                })))),
            ])
            .respond_with(json_encoded(json!({
                "choices": [{
                    "index": 0,
                    "message": {
                        "role": "assistant",
                        "content": null,
                        "tool_calls": [{
                            "id": "call_1",
                            "type": "function",
                            "function": {"name": "say_hello", "arguments": "{\"name\":\"Worf\"}"}
                        }]
                    }
                }],
                "usage": {"prompt_tokens": 12, "completion_tokens": 5}
            }))),
        );

        let messages = [Message::system("be useful"), Message::user("Say hello to Worf")];
        let tools = tools();
        let response = backend(&server).call(request(&messages, &tools)).await.unwrap();

        assert_eq!(response.content, "");
        assert_eq!(
            response.tool_calls,
            [ToolCall {
                id: Some("call_1".into()),
                name: "say_hello".into(),
                arguments: r#"{"name":"Worf"}"#.into(),
            }]
        );
        assert_eq!(
            response.usage,
            Usage {
                input_tokens: 12,
                output_tokens: 5
            }
        );
    }

    #[tokio::test]
    async fn call_accepts_object_arguments() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("POST", PATH)).respond_with(json_encoded(
                json!({
                    "choices": [{"message": {"tool_calls": [
                        {"function": {"name": "vulcan_salute", "arguments": {"name": "Spock"}}}
                    ]}}]
                }),
            )),
        );

        let messages = [Message::user("hi")];
        let response = backend(&server).call(request(&messages, &[])).await.unwrap();
        assert_eq!(response.tool_calls[0].id, None);
        assert_eq!(response.tool_calls[0].arguments, r#"{"name":"Spock"}"#);
        assert_eq!(response.usage, Usage::default());
    }

    #[tokio::test]
    async fn call_accepts_null_tool_calls() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("POST", PATH)).respond_with(json_encoded(
                json!({
                    "choices": [{"message": {"content": "hello", "tool_calls": null}}]
                }),
            )),
        );

        let messages = [Message::user("hi")];
        let response = backend(&server).call(request(&messages, &[])).await.unwrap();
        assert_eq!(response.content, "hello");
        assert!(response.tool_calls.is_empty());
    }

    #[tokio::test]
    async fn call_sends_bearer_when_key_set() {
        let server = Server::run();
        server.expect(
            Expectation::matching(all_of![
                request::method_path("POST", PATH),
                request::headers(contains(key("authorization"))),
            ])
            .respond_with(json_encoded(json!({
                "choices": [{"message": {"content": "ok"}}]
            }))),
        );

        let backend = OpenAiBackend::builder(server.url_str("/v1"))
            .api_key("secret")
            .build()
            .unwrap();
        let messages = [Message::user("hi")];
        let response = backend.call(request(&messages, &[])).await.unwrap();
        assert_eq!(response.content, "ok");
    }

    #[tokio::test]
    async fn call_non_success_is_api_error() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("POST", PATH))
                .respond_with(status_code(503).body("loading model")),
        );

        let messages = [Message::user("hi")];
        let err = backend(&server).call(request(&messages, &[])).await.unwrap_err();
        match err {
            ModelError::Api(msg) => {
                assert!(msg.contains("503"), "{msg}");
                assert!(msg.contains("loading model"), "{msg}");
            }
            other => panic!("expected api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn call_without_choices_is_invalid() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("POST", PATH))
                .respond_with(json_encoded(json!({"choices": []}))),
        );

        let messages = [Message::user("hi")];
        let err = backend(&server).call(request(&messages, &[])).await.unwrap_err();
        assert!(matches!(err, ModelError::InvalidResponse(_)));
    }

    #[tokio::test]
    async fn call_unreachable_is_network_error() {
        let backend = OpenAiBackend::builder("http://127.0.0.1:9/v1").build().unwrap();
        let messages = [Message::user("hi")];
        let err = backend.call(request(&messages, &[])).await.unwrap_err();
        assert!(matches!(err, ModelError::Network(_)));
    }

    #[tokio::test]
    async fn stream_yields_content_until_done() {
        let server = Server::run();
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hello \"}}]}\n\n",
            ": keep-alive\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Worf\"}}]}\n\n",
            "data: not-json\n\n",
            "data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
            "data: [DONE]\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"after done\"}}]}\n\n",
        );
        server.expect(
            Expectation::matching(request::method_path("POST", PATH))
                .respond_with(status_code(200).body(body)),
        );

        let messages = [Message::user("Say hello to Worf")];
        let stream = backend(&server)
            .stream(request(&messages, &[]), CancellationToken::new())
            .await
            .unwrap();
        let items: Vec<String> = collect(stream)
            .await
            .into_iter()
            .map(Result::unwrap)
            .collect();
        assert_eq!(items, ["Hello ", "Worf"]);
    }

    #[tokio::test]
    async fn stream_without_done_flushes_tail() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("POST", PATH)).respond_with(
                status_code(200).body("data: {\"choices\":[{\"delta\":{\"content\":\"tail\"}}]}"),
            ),
        );

        let messages = [Message::user("hi")];
        let stream = backend(&server)
            .stream(request(&messages, &[]), CancellationToken::new())
            .await
            .unwrap();
        let items = collect(stream).await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].as_ref().unwrap(), "tail");
    }

    #[tokio::test]
    async fn stream_error_chunk_ends_stream() {
        let server = Server::run();
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"partial\"}}]}\n\n",
            "data: {\"error\":{\"message\":\"context overflow\"}}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"never\"}}]}\n\n",
        );
        server.expect(
            Expectation::matching(request::method_path("POST", PATH))
                .respond_with(status_code(200).body(body)),
        );

        let messages = [Message::user("hi")];
        let stream = backend(&server)
            .stream(request(&messages, &[]), CancellationToken::new())
            .await
            .unwrap();
        let items = collect(stream).await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), "partial");
        assert!(matches!(&items[1], Err(ModelError::Api(msg)) if msg == "context overflow"));
    }

    #[tokio::test]
    async fn stream_cancelled_before_send() {
        // no expectation: the request must never reach the server
        let server = Server::run();
        let token = CancellationToken::new();
        token.cancel();

        let messages = [Message::user("hi")];
        let result = backend(&server).stream(request(&messages, &[]), token).await;
        assert!(matches!(result, Err(ModelError::Cancelled)));
    }

    #[tokio::test]
    async fn stream_cancelled_while_waiting_for_response() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("POST", PATH)).respond_with(
                delay_and_then(
                    Duration::from_secs(2),
                    status_code(200).body("data: [DONE]\n\n"),
                ),
            ),
        );
        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let started = std::time::Instant::now();
        let messages = [Message::user("hi")];
        let result = backend(&server).stream(request(&messages, &[]), token).await;
        assert!(matches!(result, Err(ModelError::Cancelled)));
        assert!(started.elapsed() < Duration::from_millis(1500));
    }

    #[tokio::test]
    async fn stream_cancelled_after_open_stops_reading() {
        let server = Server::run();
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hello \"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Worf\"}}]}\n\n",
            "data: [DONE]\n\n",
        );
        server.expect(
            Expectation::matching(request::method_path("POST", PATH))
                .respond_with(status_code(200).body(body)),
        );
        let token = CancellationToken::new();

        let messages = [Message::user("Say hello to Worf")];
        let stream = backend(&server)
            .stream(request(&messages, &[]), token.clone())
            .await
            .unwrap();
        token.cancel();

        let items = collect(stream).await;
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(ModelError::Cancelled)));
    }

    #[test]
    fn parse_chunk_joins_choices() {
        let text = parse_chunk(
            r#"{"choices":[{"delta":{"content":"a"}},{"delta":{"content":"b"}}]}"#,
        )
        .unwrap();
        assert_eq!(text.as_deref(), Some("ab"));
        assert_eq!(parse_chunk(r#"{"choices":[]}"#).unwrap(), None);
    }
}

//! OpenAI-compatible gateway implementation.
//!
//! Works with DashScope's compatible mode (the default endpoint), OpenAI,
//! vLLM, Ollama and any other endpoint exposing `chat/completions`.
//!
//! Supports:
//! - Chat completions (non-streaming and streaming SSE)
//! - Tool catalogs advertised as function definitions

use async_trait::async_trait;
use reagent_config::AppConfig;
use reagent_core::error::ProviderError;
use reagent_core::gateway::{FragmentStream, GatewayRequest, ModelGateway, ToolDefinition};
use reagent_core::message::{Message, Role};
use reagent_core::tool_call::parse_tool_call;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::sse::{DecoderConfig, StreamDecoder};

/// Connection settings for [`OpenAiCompatGateway`].
#[derive(Clone)]
pub struct GatewayConfig {
    /// Display name used in logs
    pub name: String,
    pub base_url: String,
    /// Endpoint path joined onto `base_url`
    pub path: String,
    pub api_key: String,
    pub model: String,
    pub timeout: Duration,
    /// Extra headers; these replace the defaults on name collision
    pub headers: BTreeMap<String, String>,
    pub decoder: DecoderConfig,
}

impl GatewayConfig {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            name: "dashscope".into(),
            base_url: "https://dashscope.aliyuncs.com/compatible-mode/v1".into(),
            path: "chat/completions".into(),
            api_key: api_key.into(),
            model: model.into(),
            timeout: Duration::from_secs(300),
            headers: BTreeMap::new(),
            decoder: DecoderConfig::default(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    /// Build from application configuration.
    pub fn from_app_config(config: &AppConfig) -> Result<Self, ProviderError> {
        let settings = &config.gateway;
        let api_key = settings.api_key.clone().ok_or_else(|| {
            ProviderError::NotConfigured(
                "no API key (set gateway.api_key or REAGENT_API_KEY)".into(),
            )
        })?;
        Ok(Self {
            name: settings.name.clone(),
            base_url: settings.base_url.clone(),
            path: settings.path.clone(),
            api_key,
            model: settings.model.clone(),
            timeout: Duration::from_secs(settings.timeout_secs),
            headers: settings.headers.clone(),
            decoder: DecoderConfig::from(&config.stream),
        })
    }
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("path", &self.path)
            .field("api_key", &"[REDACTED]")
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// A model gateway speaking the OpenAI chat-completions protocol.
pub struct OpenAiCompatGateway {
    config: GatewayConfig,
    endpoint: String,
    headers: HeaderMap,
    client: reqwest::Client,
}

impl OpenAiCompatGateway {
    /// Create a gateway. Fails on a missing key or model, or an invalid header.
    pub fn new(config: GatewayConfig) -> Result<Self, ProviderError> {
        if config.api_key.trim().is_empty() {
            return Err(ProviderError::NotConfigured("API key is required".into()));
        }
        if config.model.trim().is_empty() {
            return Err(ProviderError::NotConfigured("model is required".into()));
        }

        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ProviderError::NotConfigured(format!("HTTP client: {e}")))?;

        let endpoint = format!(
            "{}/{}",
            config.base_url.trim_end_matches('/'),
            config.path.trim_start_matches('/')
        );
        let headers = Self::build_headers(&config)?;

        Ok(Self {
            config,
            endpoint,
            headers,
            client,
        })
    }

    fn build_headers(config: &GatewayConfig) -> Result<HeaderMap, ProviderError> {
        let invalid = |what: &str, e: &dyn std::fmt::Display| {
            ProviderError::NotConfigured(format!("invalid header {what}: {e}"))
        };

        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {}", config.api_key))
            .map_err(|e| invalid("Authorization", &e))?;
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        for (name, value) in &config.headers {
            let header_name =
                HeaderName::from_bytes(name.as_bytes()).map_err(|e| invalid(name, &e))?;
            let header_value = HeaderValue::from_str(value).map_err(|e| invalid(name, &e))?;
            headers.insert(header_name, header_value);
        }
        Ok(headers)
    }

    /// The full chat endpoint URL.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Convert our Message types to OpenAI API format.
    ///
    /// Tool-role messages come in request/result pairs. A request is sent as
    /// an assistant message carrying `tool_calls`, and the result that follows
    /// it as a `tool` message answering the same call id.
    fn to_api_messages(messages: &[Message]) -> Vec<ApiMessage> {
        let mut api = Vec::with_capacity(messages.len());
        let mut pending: Option<String> = None;

        for (index, m) in messages.iter().enumerate() {
            if m.role != Role::Tool {
                pending = None;
                api.push(ApiMessage::text(m.role.as_str(), &m.content));
                continue;
            }

            if let Some(id) = pending.take() {
                api.push(ApiMessage {
                    tool_call_id: Some(id),
                    ..ApiMessage::text("tool", &m.content)
                });
                continue;
            }

            match api_tool_call(&m.content, index) {
                Some(call) => {
                    pending = call.id.clone();
                    api.push(ApiMessage {
                        role: "assistant".into(),
                        content: None,
                        tool_calls: Some(vec![call]),
                        tool_call_id: None,
                    });
                }
                // Not a call the endpoint could pair with a result
                None => api.push(ApiMessage::text("assistant", &m.content)),
            }
        }
        api
    }

    /// Convert tool definitions to OpenAI API format.
    fn to_api_tools(tools: &[ToolDefinition]) -> Vec<ApiToolDefinition> {
        tools
            .iter()
            .map(|t| ApiToolDefinition {
                r#type: "function".into(),
                function: ApiToolFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                },
            })
            .collect()
    }

    fn build_body(&self, request: &GatewayRequest, stream: bool) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": self.config.model,
            "messages": Self::to_api_messages(&request.messages),
        });
        if stream {
            body["stream"] = serde_json::json!(true);
        }
        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(&request.tools));
        }
        body
    }

    async fn send(
        &self,
        body: &serde_json::Value,
        accept: &'static str,
    ) -> Result<reqwest::Response, ProviderError> {
        let mut headers = self.headers.clone();
        if !self.config.headers.keys().any(|k| k.eq_ignore_ascii_case("accept")) {
            headers.insert(ACCEPT, HeaderValue::from_static(accept));
        }

        let response = self
            .client
            .post(&self.endpoint)
            .headers(headers)
            .json(body)
            .send()
            .await
            .map_err(map_transport_error)?;

        check_status(response).await
    }

    /// Turn a completion response into at most one message.
    fn message_from_response(response: ApiResponse) -> Option<Message> {
        let Some(choice) = response.choices.into_iter().next() else {
            debug!("Completion response carried no choices");
            return None;
        };

        let mut tool_calls = choice.message.tool_calls.unwrap_or_default().into_iter();
        if let Some(call) = tool_calls.next() {
            let skipped = tool_calls.count();
            if skipped > 0 {
                warn!(skipped, "Model requested several tools; only the first is executed");
            }
            return Some(Message::tool(encode_tool_call(&call)));
        }

        let role = match choice.message.role.as_str() {
            "tool" => Role::Tool,
            _ => Role::Assistant,
        };
        Some(Message::new(role, choice.message.content.unwrap_or_default()))
    }
}

/// Render a native function call in the `{"id","function":{"name"},"arguments"}`
/// shape the agent loop parses. The id is kept so the result can answer it.
fn encode_tool_call(call: &ApiToolCall) -> String {
    let function = &call.function;
    let arguments = match serde_json::from_str::<serde_json::Value>(&function.arguments) {
        Ok(value @ serde_json::Value::Object(_)) => value,
        Ok(_) | Err(_) if function.arguments.trim().is_empty() => serde_json::json!({}),
        Ok(other) => {
            warn!(tool = %function.name, arguments = %other, "Tool arguments are not an object");
            other
        }
        Err(e) => {
            warn!(tool = %function.name, error = %e, "Tool arguments are not valid JSON");
            serde_json::Value::String(function.arguments.clone())
        }
    };
    let mut payload = serde_json::json!({
        "function": { "name": function.name },
        "arguments": arguments,
    });
    if let Some(id) = &call.id {
        payload["id"] = serde_json::json!(id);
    }
    payload.to_string()
}

/// Rebuild the native call for a tool request found in the history.
///
/// Requests produced by text-mode models carry no id; one is derived from
/// the message position so the following result can still reference it.
fn api_tool_call(content: &str, index: usize) -> Option<ApiToolCall> {
    let call = parse_tool_call(content)?;
    let id = serde_json::from_str::<serde_json::Value>(content)
        .ok()
        .and_then(|v| v.get("id").and_then(|id| id.as_str()).map(str::to_string))
        .unwrap_or_else(|| format!("call_{index}"));
    Some(ApiToolCall {
        id: Some(id),
        r#type: function_type(),
        function: ApiFunction {
            name: call.name,
            arguments: serde_json::Value::Object(call.arguments).to_string(),
        },
    })
}

fn map_transport_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout(e.to_string())
    } else {
        ProviderError::Network(e.to_string())
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    let status = response.status().as_u16();

    if status == 429 {
        let retry_after_secs = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(5);
        return Err(ProviderError::RateLimited { retry_after_secs });
    }

    if status == 401 || status == 403 {
        return Err(ProviderError::AuthenticationFailed(
            "Invalid API key or insufficient permissions".into(),
        ));
    }

    if !response.status().is_success() {
        let error_body = response.text().await.unwrap_or_default();
        warn!(status, body = %error_body, "Gateway returned error");
        return Err(ProviderError::ApiError {
            status_code: status,
            message: error_body,
        });
    }

    Ok(response)
}

#[async_trait]
impl ModelGateway for OpenAiCompatGateway {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn generate(&self, request: GatewayRequest) -> Result<Option<Message>, ProviderError> {
        let body = self.build_body(&request, false);

        debug!(
            gateway = %self.config.name,
            model = %self.config.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Sending completion request"
        );

        let response = self.send(&body, "application/json").await?;
        let api_response: ApiResponse =
            response.json().await.map_err(|e| ProviderError::ApiError {
                status_code: 200,
                message: format!("Failed to parse response: {e}"),
            })?;

        Ok(Self::message_from_response(api_response))
    }

    async fn stream(
        &self,
        request: GatewayRequest,
        cancel: CancellationToken,
    ) -> Result<FragmentStream, ProviderError> {
        let body = self.build_body(&request, true);

        debug!(
            gateway = %self.config.name,
            model = %self.config.model,
            messages = request.messages.len(),
            "Sending streaming request"
        );

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
            response = self.send(&body, "text/event-stream") => response?,
        };

        let decoder = StreamDecoder::new(self.config.decoder);
        Ok(decoder.spawn(Box::pin(response.bytes_stream()), cancel))
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    #[serde(default)]
    role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl ApiMessage {
    fn text(role: &str, content: &str) -> Self {
        Self {
            role: role.to_string(),
            content: Some(content.to_string()),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(default = "function_type")]
    r#type: String,
    function: ApiFunction,
}

fn function_type() -> String {
    "function".into()
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolDefinition {
    r#type: String,
    function: ApiToolFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    choices: Vec<ApiChoice>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn gateway_for(server: &MockServer) -> OpenAiCompatGateway {
        let config = GatewayConfig::new("sk-test", "qwen-plus")
            .with_base_url(format!("{}/compatible-mode/v1/", server.uri()));
        OpenAiCompatGateway::new(config).unwrap()
    }

    async fn mount(server: &MockServer, template: ResponseTemplate) {
        Mock::given(method("POST"))
            .and(path("/compatible-mode/v1/chat/completions"))
            .respond_with(template)
            .mount(server)
            .await;
    }

    fn request() -> GatewayRequest {
        GatewayRequest::new(vec![Message::user("What is 2+2?")], vec![])
    }

    #[test]
    fn missing_key_is_rejected() {
        let err = OpenAiCompatGateway::new(GatewayConfig::new("", "qwen-plus")).err();
        assert!(matches!(err, Some(ProviderError::NotConfigured(_))));
    }

    #[test]
    fn invalid_header_is_rejected() {
        let config = GatewayConfig::new("sk", "m").with_header("bad header", "x");
        assert!(OpenAiCompatGateway::new(config).is_err());
    }

    #[test]
    fn endpoint_joins_base_and_path() {
        let gateway = OpenAiCompatGateway::new(
            GatewayConfig::new("sk", "m").with_base_url("http://localhost:8080/v1/"),
        )
        .unwrap();
        assert_eq!(gateway.endpoint(), "http://localhost:8080/v1/chat/completions");
        assert_eq!(gateway.name(), "dashscope");
    }

    #[test]
    fn from_app_config_requires_key() {
        let mut app = AppConfig::default();
        assert!(GatewayConfig::from_app_config(&app).is_err());
        app.gateway.api_key = Some("sk".into());
        app.stream.strict = true;
        let config = GatewayConfig::from_app_config(&app).unwrap();
        assert!(config.decoder.strict);
        assert_eq!(config.timeout, Duration::from_secs(300));
        assert!(!format!("{config:?}").contains("\"sk\""));
    }

    #[test]
    fn message_conversion_uses_lowercase_roles() {
        let messages = vec![
            Message::system("You are helpful"),
            Message::user("Hello"),
            Message::assistant("Hi there"),
        ];
        let api_messages = OpenAiCompatGateway::to_api_messages(&messages);
        let roles: Vec<&str> = api_messages.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["system", "user", "assistant"]);
    }

    #[test]
    fn tool_request_and_result_are_paired_by_call_id() {
        let messages = vec![
            Message::user("What is 2+2?"),
            Message::tool(
                r#"{"id":"call_abc","function":{"name":"calculator"},"arguments":{"expression":"2+2"}}"#,
            ),
            Message::tool(r#"{"expression":"2+2","result":4}"#),
        ];
        let api = serde_json::to_value(OpenAiCompatGateway::to_api_messages(&messages)).unwrap();
        assert_eq!(
            api,
            json!([
                {"role": "user", "content": "What is 2+2?"},
                {"role": "assistant", "tool_calls": [{
                    "id": "call_abc",
                    "type": "function",
                    "function": {"name": "calculator", "arguments": "{\"expression\":\"2+2\"}"}
                }]},
                {"role": "tool", "tool_call_id": "call_abc",
                 "content": "{\"expression\":\"2+2\",\"result\":4}"}
            ])
        );
    }

    #[test]
    fn text_mode_tool_requests_get_positional_ids() {
        let messages = vec![
            Message::user("6*7?"),
            Message::tool(r#"{"tool":"calculator","arguments":{"expression":"6*7"}}"#),
            Message::tool(r#"{"error":"boom"}"#),
            Message::tool(r#"{"name":"calculator","args":{"expression":"42"}}"#),
            Message::tool(r#"{"result":42}"#),
        ];
        let api = OpenAiCompatGateway::to_api_messages(&messages);
        let roles: Vec<&str> = api.iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["user", "assistant", "tool", "assistant", "tool"]);

        let first = &api[1].tool_calls.as_ref().unwrap()[0];
        assert_eq!(first.id.as_deref(), Some("call_1"));
        assert_eq!(first.function.name, "calculator");
        assert_eq!(api[2].tool_call_id.as_deref(), Some("call_1"));
        assert_eq!(api[4].tool_call_id.as_deref(), Some("call_3"));
        assert!(api[1].content.is_none());
    }

    #[test]
    fn unparseable_tool_message_is_sent_as_assistant_text() {
        let messages = vec![Message::tool("not json")];
        let api = OpenAiCompatGateway::to_api_messages(&messages);
        assert_eq!(api[0].role, "assistant");
        assert_eq!(api[0].content.as_deref(), Some("not json"));
        assert!(api[0].tool_call_id.is_none());
    }

    #[test]
    fn tool_definition_conversion() {
        let tools = vec![ToolDefinition {
            name: "calculator".into(),
            description: "Evaluate arithmetic".into(),
            parameters: json!({"type": "object"}),
        }];
        let api_tools = OpenAiCompatGateway::to_api_tools(&tools);
        assert_eq!(api_tools.len(), 1);
        assert_eq!(api_tools[0].function.name, "calculator");
        assert_eq!(api_tools[0].r#type, "function");
    }

    #[test]
    fn native_tool_call_becomes_tool_message() {
        let response: ApiResponse = serde_json::from_value(json!({
            "choices": [{"message": {
                "role": "assistant",
                "content": null,
                "tool_calls": [
                    {"id": "call_1", "type": "function",
                     "function": {"name": "calculator", "arguments": "{\"expression\":\"2+2\"}"}},
                    {"id": "call_2", "type": "function",
                     "function": {"name": "other", "arguments": "{}"}}
                ]
            }}]
        }))
        .unwrap();
        let message = OpenAiCompatGateway::message_from_response(response).unwrap();
        assert_eq!(message.role, Role::Tool);
        let payload: serde_json::Value = serde_json::from_str(&message.content).unwrap();
        assert_eq!(payload["id"], "call_1");
        assert_eq!(payload["function"]["name"], "calculator");
        assert_eq!(payload["arguments"]["expression"], "2+2");
    }

    #[test]
    fn empty_tool_arguments_become_empty_object() {
        let call = ApiToolCall {
            id: None,
            r#type: function_type(),
            function: ApiFunction {
                name: "clock".into(),
                arguments: String::new(),
            },
        };
        let payload: serde_json::Value = serde_json::from_str(&encode_tool_call(&call)).unwrap();
        assert_eq!(payload["arguments"], json!({}));
        assert!(payload.get("id").is_none());
    }

    #[tokio::test]
    async fn generate_returns_assistant_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/compatible-mode/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({"model": "qwen-plus"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "x",
                "choices": [{"index": 0, "message": {"role": "assistant", "content": "4"}}]
            })))
            .mount(&server)
            .await;

        let message = gateway_for(&server).generate(request()).await.unwrap().unwrap();
        assert_eq!(message.role, Role::Assistant);
        assert_eq!(message.content, "4");
    }

    #[tokio::test]
    async fn generate_sends_tool_catalog() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({
                "tools": [{"type": "function", "function": {"name": "calculator"}}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "ok"}}]
            })))
            .mount(&server)
            .await;

        let tools = vec![ToolDefinition {
            name: "calculator".into(),
            description: "Evaluate arithmetic".into(),
            parameters: json!({"type": "object", "properties": {}}),
        }];
        let req = GatewayRequest::new(vec![Message::user("hi")], tools);
        let message = gateway_for(&server).generate(req).await.unwrap();
        assert_eq!(message.map(|m| m.content).as_deref(), Some("ok"));
    }

    #[tokio::test]
    async fn empty_choices_yield_no_message() {
        let server = MockServer::start().await;
        mount(&server, ResponseTemplate::new(200).set_body_json(json!({"choices": []}))).await;
        assert!(gateway_for(&server).generate(request()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn status_codes_are_mapped() {
        let cases = [
            (401, "auth"),
            (429, "rate"),
            (500, "api"),
        ];
        for (status, kind) in cases {
            let server = MockServer::start().await;
            mount(
                &server,
                ResponseTemplate::new(status).set_body_string("upstream said no"),
            )
            .await;
            let err = gateway_for(&server).generate(request()).await.unwrap_err();
            match kind {
                "auth" => assert!(matches!(err, ProviderError::AuthenticationFailed(_))),
                "rate" => assert!(matches!(err, ProviderError::RateLimited { .. })),
                _ => assert!(matches!(
                    err,
                    ProviderError::ApiError { status_code: 500, ref message } if message.contains("said no")
                )),
            }
        }
    }

    #[tokio::test]
    async fn stream_decodes_event_body() {
        let server = MockServer::start().await;
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
            ": ping\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
            "data: [DONE]\n\n",
        );
        Mock::given(method("POST"))
            .and(header("accept", "text/event-stream"))
            .and(body_partial_json(json!({"stream": true})))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&server)
            .await;

        let cancel = CancellationToken::new();
        let stream = gateway_for(&server)
            .stream(request(), cancel.clone())
            .await
            .unwrap();
        assert_eq!(stream.collect(&cancel).await.unwrap(), "Hello");
    }

    #[tokio::test]
    async fn stream_request_honours_cancellation() {
        let server = MockServer::start().await;
        mount(
            &server,
            ResponseTemplate::new(200)
                .set_delay(Duration::from_secs(5))
                .set_body_raw("data: [DONE]\n\n", "text/event-stream"),
        )
        .await;

        let cancel = CancellationToken::new();
        let gateway = gateway_for(&server);
        let canceller = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            canceller.cancel();
        });
        let err = gateway.stream(request(), cancel).await.err();
        assert_eq!(err, Some(ProviderError::Cancelled));
    }
}

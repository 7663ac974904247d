//! Shared test helpers for agent loop tests.

use async_trait::async_trait;
use reagent_core::error::ProviderError;
use reagent_core::gateway::{
    FragmentStream, GatewayRequest, ModelGateway, StreamFragment, fragment_channel,
};
use reagent_core::message::Message;
use reagent_core::tool::ToolRegistry;
use reagent_core::tool_call::render_tool_call;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio_util::sync::CancellationToken;

/// One scripted gateway reply.
pub enum Reply {
    Message(Message),
    /// No message at all
    Nothing,
    Fail(ProviderError),
    /// Streamed deltas followed by the terminal fragment
    Stream(Vec<&'static str>),
    /// Streamed deltas followed by an error
    StreamThenFail(Vec<&'static str>, ProviderError),
    /// Never answers
    Hang,
}

impl Reply {
    pub fn answer(text: &str) -> Self {
        Reply::Message(Message::assistant(text))
    }

    pub fn tool_call(name: &str, arguments: Value) -> Self {
        let arguments = match arguments {
            Value::Object(map) => map,
            _ => panic!("tool arguments must be an object"),
        };
        Reply::Message(Message::tool(render_tool_call(name, &arguments)))
    }
}

/// A gateway that replays scripted replies in order and records every request.
///
/// Panics if more calls are made than replies provided.
pub struct ScriptedGateway {
    replies: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<GatewayRequest>>,
}

impl ScriptedGateway {
    pub fn new(replies: Vec<Reply>) -> Self {
        Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<GatewayRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn next(&self, request: GatewayRequest) -> Reply {
        let mut requests = self.requests.lock().unwrap();
        requests.push(request);
        self.replies.lock().unwrap().pop_front().unwrap_or_else(|| {
            panic!("ScriptedGateway: no more replies (call #{})", requests.len())
        })
    }
}

#[async_trait]
impl ModelGateway for ScriptedGateway {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, request: GatewayRequest) -> Result<Option<Message>, ProviderError> {
        match self.next(request) {
            Reply::Message(message) => Ok(Some(message)),
            Reply::Nothing => Ok(None),
            Reply::Fail(err) | Reply::StreamThenFail(_, err) => Err(err),
            Reply::Stream(parts) => Ok(Some(Message::assistant(parts.concat()))),
            Reply::Hang => std::future::pending().await,
        }
    }

    async fn stream(
        &self,
        request: GatewayRequest,
        _cancel: CancellationToken,
    ) -> Result<FragmentStream, ProviderError> {
        let (parts, failure) = match self.next(request) {
            Reply::Message(message) => (vec![message.content], None),
            Reply::Nothing => (vec![], None),
            Reply::Fail(err) => return Err(err),
            Reply::Stream(parts) => (parts.into_iter().map(String::from).collect(), None),
            Reply::StreamThenFail(parts, err) => {
                (parts.into_iter().map(String::from).collect(), Some(err))
            }
            Reply::Hang => {
                let (sink, stream) = fragment_channel(1);
                tokio::spawn(async move {
                    let _sink = sink;
                    std::future::pending::<()>().await;
                });
                return Ok(stream);
            }
        };

        let (sink, stream) = fragment_channel(4);
        tokio::spawn(async move {
            for part in parts {
                if sink.fragments.send(StreamFragment::delta(part)).await.is_err() {
                    return;
                }
            }
            match failure {
                Some(err) => {
                    let _ = sink.errors.send(err).await;
                }
                None => {
                    let _ = sink.fragments.send(StreamFragment::done()).await;
                }
            }
        });
        Ok(stream)
    }
}

/// A registry holding only the calculator.
pub fn calculator_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry
        .register(Box::new(reagent_tools::CalculatorTool))
        .unwrap();
    registry
}

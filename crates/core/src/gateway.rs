//! ModelGateway trait — the abstraction over model backends.
//!
//! A gateway sends the conversation plus the tool catalog to a model and
//! returns either one complete message or an incremental stream of text
//! fragments.
//!
//! Streams are delivered as a [`FragmentStream`]: a bounded fragment
//! channel plus a separate error channel. The producer owns a
//! [`FragmentSink`] and closes both channels exactly once by dropping it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::ProviderError;
use crate::message::Message;

/// A tool definition sent to the model so it knows what tools it can call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

/// One model invocation: the full conversation and the tool catalog.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayRequest {
    /// The conversation messages, oldest first
    pub messages: Vec<Message>,

    /// Tools the model may call
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDefinition>,
}

impl GatewayRequest {
    pub fn new(messages: Vec<Message>, tools: Vec<ToolDefinition>) -> Self {
        Self { messages, tools }
    }
}

/// A single piece of incremental model output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamFragment {
    /// Text delta (empty on the terminal fragment)
    #[serde(default)]
    pub delta: String,

    /// Marks the terminal fragment of a cleanly finished stream
    #[serde(default)]
    pub done: bool,
}

impl StreamFragment {
    pub fn delta(text: impl Into<String>) -> Self {
        Self {
            delta: text.into(),
            done: false,
        }
    }

    pub fn done() -> Self {
        Self {
            delta: String::new(),
            done: true,
        }
    }
}

/// Producer half of a fragment stream.
///
/// Dropping the sink closes both channels.
#[derive(Debug)]
pub struct FragmentSink {
    pub fragments: mpsc::Sender<StreamFragment>,
    pub errors: mpsc::Sender<ProviderError>,
}

/// Consumer half of a fragment stream.
#[derive(Debug)]
pub struct FragmentStream {
    fragments: mpsc::Receiver<StreamFragment>,
    errors: mpsc::Receiver<ProviderError>,
}

/// Create a fragment channel pair. The error channel holds at most one error.
pub fn fragment_channel(capacity: usize) -> (FragmentSink, FragmentStream) {
    let (fragment_tx, fragment_rx) = mpsc::channel(capacity.max(1));
    let (error_tx, error_rx) = mpsc::channel(1);
    (
        FragmentSink {
            fragments: fragment_tx,
            errors: error_tx,
        },
        FragmentStream {
            fragments: fragment_rx,
            errors: error_rx,
        },
    )
}

impl FragmentStream {
    /// Receive the next fragment or the terminal error.
    ///
    /// Buffered fragments are always delivered before an error. Returns
    /// `None` once the producer has closed the stream.
    pub async fn recv(&mut self) -> Option<Result<StreamFragment, ProviderError>> {
        tokio::select! {
            biased;
            Some(fragment) = self.fragments.recv() => Some(Ok(fragment)),
            Some(err) = self.errors.recv() => Some(Err(err)),
            else => None,
        }
    }

    /// Drain the stream into one string.
    pub async fn collect(self, cancel: &CancellationToken) -> Result<String, ProviderError> {
        self.collect_with(cancel, |_| {}).await
    }

    /// Drain the stream into one string, observing every non-empty delta.
    ///
    /// Cancellation wins over pending fragments.
    pub async fn collect_with<F>(
        mut self,
        cancel: &CancellationToken,
        mut on_delta: F,
    ) -> Result<String, ProviderError>
    where
        F: FnMut(&str) + Send,
    {
        let mut text = String::new();
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(ProviderError::Cancelled),
                next = self.recv() => match next {
                    Some(Ok(fragment)) => {
                        if !fragment.delta.is_empty() {
                            on_delta(&fragment.delta);
                            text.push_str(&fragment.delta);
                        }
                    }
                    Some(Err(err)) => return Err(err),
                    None => return Ok(text),
                },
            }
        }
    }
}

/// The core ModelGateway trait.
///
/// The agent loop calls `generate()` or `stream()` without knowing which
/// backend is being used.
#[async_trait]
pub trait ModelGateway: Send + Sync {
    /// A human-readable name for this gateway (e.g., "dashscope").
    fn name(&self) -> &str;

    /// Send a request and get one complete message.
    ///
    /// `Ok(None)` means the model produced no message at all.
    async fn generate(&self, request: GatewayRequest) -> Result<Option<Message>, ProviderError>;

    /// Send a request and get an incremental stream of text fragments.
    ///
    /// Default implementation calls `generate()` and emits its content as a
    /// single fragment followed by the terminal fragment.
    async fn stream(
        &self,
        request: GatewayRequest,
        _cancel: CancellationToken,
    ) -> Result<FragmentStream, ProviderError> {
        let message = self.generate(request).await?;
        let (sink, stream) = fragment_channel(2);
        if let Some(message) = message {
            let _ = sink.fragments.send(StreamFragment::delta(message.content)).await;
        }
        let _ = sink.fragments.send(StreamFragment::done()).await;
        Ok(stream)
    }
}

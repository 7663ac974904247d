//! Server-sent event decoding for OpenAI-compatible streaming responses.
//!
//! [`StreamDecoder`] turns an arbitrary byte stream into a
//! [`FragmentStream`]. The decoding runs on its own task:
//!
//! - bytes are buffered until a full `\n`-terminated line is available
//!   (a trailing `\r` is stripped), so events may be split across reads
//! - blank lines, `:` comments and non-`data:` lines are ignored
//! - `data: [DONE]` ends the stream; anything after it is not read
//! - every other `data:` payload is parsed as a chat-completion chunk and
//!   its non-empty `choices[0].delta.content` is emitted as a fragment
//!
//! A clean end (sentinel or end of input) emits one terminal `done`
//! fragment. A read failure or cancellation instead puts exactly one error
//! on the error channel. In every case both channels are closed when the
//! task exits.

use futures::{Stream, StreamExt};
use reagent_config::StreamSettings;
use reagent_core::error::ProviderError;
use reagent_core::gateway::{FragmentSink, FragmentStream, StreamFragment, fragment_channel};
use serde::Deserialize;
use std::fmt::Display;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

const DONE_SENTINEL: &str = "[DONE]";

/// Decoder tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecoderConfig {
    /// Fail on a malformed `data:` payload instead of skipping it
    pub strict: bool,

    /// Capacity of the fragment channel
    pub channel_capacity: usize,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            strict: false,
            channel_capacity: 16,
        }
    }
}

impl From<&StreamSettings> for DecoderConfig {
    fn from(settings: &StreamSettings) -> Self {
        Self {
            strict: settings.strict,
            channel_capacity: settings.channel_capacity,
        }
    }
}

/// Spawns decoding workers over byte sources.
#[derive(Debug, Clone, Default)]
pub struct StreamDecoder {
    config: DecoderConfig,
}

impl StreamDecoder {
    pub fn new(config: DecoderConfig) -> Self {
        Self { config }
    }

    /// Start decoding `source` on a background task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<S, B, E>(&self, source: S, cancel: CancellationToken) -> FragmentStream
    where
        S: Stream<Item = Result<B, E>> + Send + Unpin + 'static,
        B: AsRef<[u8]> + Send + 'static,
        E: Display + Send + 'static,
    {
        let (sink, stream) = fragment_channel(self.config.channel_capacity);
        let worker = DecodeWorker {
            sink,
            cancel,
            strict: self.config.strict,
            buffer: Vec::new(),
        };
        tokio::spawn(worker.run(source));
        stream
    }
}

/// What the read loop does after handling a line.
enum Flow {
    Continue,
    /// Clean end: emit the terminal fragment
    Finished,
    /// Error already reported or consumer gone
    Stop,
}

struct DecodeWorker {
    sink: FragmentSink,
    cancel: CancellationToken,
    strict: bool,
    buffer: Vec<u8>,
}

impl DecodeWorker {
    async fn run<S, B, E>(mut self, mut source: S)
    where
        S: Stream<Item = Result<B, E>> + Unpin,
        B: AsRef<[u8]>,
        E: Display,
    {
        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    debug!("Stream decoding cancelled while reading");
                    self.fail(ProviderError::Cancelled);
                    return;
                }
                next = source.next() => next,
            };

            let flow = match next {
                Some(Ok(chunk)) => {
                    self.buffer.extend_from_slice(chunk.as_ref());
                    self.drain_lines().await
                }
                Some(Err(e)) => {
                    warn!(error = %e, "Event stream read failed");
                    self.fail(ProviderError::StreamInterrupted(e.to_string()));
                    Flow::Stop
                }
                None => {
                    // Input ended; a final line may lack its newline.
                    let rest = std::mem::take(&mut self.buffer);
                    match self.handle_line(&rest).await {
                        Flow::Stop => Flow::Stop,
                        _ => Flow::Finished,
                    }
                }
            };

            match flow {
                Flow::Continue => {}
                Flow::Finished => {
                    self.emit(StreamFragment::done()).await;
                    return;
                }
                Flow::Stop => return,
            }
        }
    }

    async fn drain_lines(&mut self) -> Flow {
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
            line.pop();
            match self.handle_line(&line).await {
                Flow::Continue => {}
                other => return other,
            }
        }
        Flow::Continue
    }

    async fn handle_line(&self, raw: &[u8]) -> Flow {
        let line = String::from_utf8_lossy(raw);
        let line = line.trim_end_matches('\r');

        if line.trim().is_empty() || line.starts_with(':') {
            return Flow::Continue;
        }

        let Some(data) = line.strip_prefix("data:") else {
            trace!(line = %line, "Ignoring non-data event line");
            return Flow::Continue;
        };
        let data = data.trim();

        if data == DONE_SENTINEL {
            return Flow::Finished;
        }

        match parse_delta(data) {
            Ok(Some(text)) => self.emit(StreamFragment::delta(text)).await,
            Ok(None) => Flow::Continue,
            Err(e) if self.strict => {
                self.fail(ProviderError::Decode(format!("{e}: {data}")));
                Flow::Stop
            }
            Err(e) => {
                trace!(data = %data, error = %e, "Ignoring unparseable event payload");
                Flow::Continue
            }
        }
    }

    /// Send a fragment, giving up on cancellation or a dropped consumer.
    async fn emit(&self, fragment: StreamFragment) -> Flow {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                debug!("Stream decoding cancelled while delivering");
                self.fail(ProviderError::Cancelled);
                Flow::Stop
            }
            sent = self.sink.fragments.send(fragment) => match sent {
                Ok(()) => Flow::Continue,
                Err(_) => {
                    debug!("Fragment consumer dropped, stopping decoder");
                    Flow::Stop
                }
            },
        }
    }

    fn fail(&self, err: ProviderError) {
        // The error channel has room for exactly one error and the worker
        // reports at most one before exiting.
        if self.sink.errors.try_send(err).is_err() {
            debug!("Fragment consumer dropped before the error was delivered");
        }
    }
}

#[derive(Debug, Deserialize)]
struct StreamEvent {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Debug, Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Extract the first choice's non-empty content delta.
fn parse_delta(data: &str) -> Result<Option<String>, serde_json::Error> {
    let event: StreamEvent = serde_json::from_str(data)?;
    Ok(event
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta.content)
        .filter(|c| !c.is_empty()))
}

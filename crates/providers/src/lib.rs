//! Model gateway implementations for reagent.
//!
//! All gateways implement the `reagent_core::ModelGateway` trait.
//! [`sse`] holds the event-stream decoder shared by streaming gateways.

pub mod openai_compat;
pub mod sse;

pub use openai_compat::{GatewayConfig, OpenAiCompatGateway};
pub use sse::{DecoderConfig, StreamDecoder};

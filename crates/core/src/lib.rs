//! # reagent core
//!
//! Domain types, traits, and error definitions for the reagent tool-using
//! agent runtime. Other crates implement against these definitions:
//!
//! - [`ModelGateway`] is implemented by `reagent-providers`
//! - [`Tool`] is implemented by `reagent-tools` (and by closures via
//!   [`ToolRegistry::register_fn`])
//! - the agent loop in `reagent-agent` drives both
//!
//! Keeping the traits here lets tests swap in scripted gateways and stub
//! tools without touching the network.

pub mod error;
pub mod gateway;
pub mod message;
pub mod tool;
pub mod tool_call;

// Re-export key types at crate root for ergonomics
pub use error::{Error, ProviderError, ToolError};
pub use gateway::{
    FragmentSink, FragmentStream, GatewayRequest, ModelGateway, StreamFragment, ToolDefinition,
    fragment_channel,
};
pub use message::{Message, Role};
pub use tool::{Arguments, DataType, FunctionTool, ParameterInfo, Tool, ToolCall, ToolInfo, ToolRegistry};
pub use tool_call::{parse_tool_call, render_tool_call};

pub use tokio_util::sync::CancellationToken;

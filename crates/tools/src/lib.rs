//! Built-in tool implementations for reagent.

pub mod calculator;

use reagent_core::error::ToolError;
use reagent_core::tool::ToolRegistry;

pub use calculator::CalculatorTool;

/// Create a tool registry holding every built-in tool.
pub fn default_registry() -> Result<ToolRegistry, ToolError> {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(CalculatorTool))?;
    Ok(registry)
}

//! Recognizing tool invocations in model output.
//!
//! A tool-role message carries a JSON object naming the tool and its
//! arguments. Several spellings are in circulation, so the parser accepts:
//!
//! | field     | accepted keys (first match wins)        |
//! |-----------|-----------------------------------------|
//! | name      | `tool`, `name`, `function.name`         |
//! | arguments | `arguments`, `args`, `input` (objects)  |

use crate::tool::{Arguments, ToolCall};
use serde_json::{Map, Value};

const NAME_KEYS: [&str; 2] = ["tool", "name"];
const ARGUMENT_KEYS: [&str; 3] = ["arguments", "args", "input"];

/// Parse a tool invocation from message content.
///
/// Returns `None` when the content is not a JSON object or carries no
/// non-empty tool name. Missing arguments yield an empty map.
pub fn parse_tool_call(content: &str) -> Option<ToolCall> {
    let Ok(Value::Object(raw)) = serde_json::from_str::<Value>(content.trim()) else {
        return None;
    };

    let name = tool_name(&raw)?;
    let arguments = ARGUMENT_KEYS
        .iter()
        .find_map(|key| raw.get(*key).and_then(Value::as_object))
        .cloned()
        .unwrap_or_default();

    Some(ToolCall { name, arguments })
}

fn tool_name(raw: &Map<String, Value>) -> Option<String> {
    let non_empty = |v: Option<&Value>| {
        v.and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    NAME_KEYS
        .iter()
        .find_map(|key| non_empty(raw.get(*key)))
        .or_else(|| non_empty(raw.get("function").and_then(|f| f.get("name"))))
}

/// Render a call in the canonical `{"tool", "arguments"}` shape.
pub fn render_tool_call(name: &str, arguments: &Arguments) -> String {
    serde_json::json!({ "tool": name, "arguments": arguments }).to_string()
}

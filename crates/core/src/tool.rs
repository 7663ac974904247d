//! Tool trait — the abstraction over agent capabilities.
//!
//! A tool declares a [`ToolInfo`] (name, description, typed parameter
//! schema) and an async executor. Tools are registered once in a
//! [`ToolRegistry`], which the agent loop uses to advertise the catalog
//! to the model and to dispatch invocations.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

use crate::error::ToolError;
use crate::gateway::ToolDefinition;

/// Tool arguments: a JSON object keyed by parameter name.
pub type Arguments = Map<String, Value>;

/// The primitive or composite type of a tool parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Integer,
    String,
    Number,
    Boolean,
    Object,
    Array,
}

impl DataType {
    /// JSON Schema spelling of this type.
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Integer => "integer",
            DataType::String => "string",
            DataType::Number => "number",
            DataType::Boolean => "boolean",
            DataType::Object => "object",
            DataType::Array => "array",
        }
    }

    fn matches(&self, value: &Value) -> bool {
        match self {
            DataType::Integer => {
                value.is_i64()
                    || value.is_u64()
                    || value.as_f64().is_some_and(|n| n.fract() == 0.0)
            }
            DataType::String => value.is_string(),
            DataType::Number => value.is_number(),
            DataType::Boolean => value.is_boolean(),
            DataType::Object => value.is_object(),
            DataType::Array => value.is_array(),
        }
    }
}

/// Schema of a single parameter.
///
/// Arrays may describe their element schema, objects their field schemas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterInfo {
    #[serde(rename = "type")]
    pub data_type: DataType,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    #[serde(default)]
    pub required: bool,

    /// Element schema (arrays only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elements: Option<Box<ParameterInfo>>,

    /// Field schemas (objects only)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub fields: BTreeMap<String, ParameterInfo>,
}

impl ParameterInfo {
    pub fn new(data_type: DataType, description: impl Into<String>) -> Self {
        Self {
            data_type,
            description: description.into(),
            required: false,
            elements: None,
            fields: BTreeMap::new(),
        }
    }

    pub fn string(description: impl Into<String>) -> Self {
        Self::new(DataType::String, description)
    }

    pub fn integer(description: impl Into<String>) -> Self {
        Self::new(DataType::Integer, description)
    }

    pub fn number(description: impl Into<String>) -> Self {
        Self::new(DataType::Number, description)
    }

    pub fn boolean(description: impl Into<String>) -> Self {
        Self::new(DataType::Boolean, description)
    }

    /// An array whose elements follow `elements`.
    pub fn array(description: impl Into<String>, elements: ParameterInfo) -> Self {
        Self {
            elements: Some(Box::new(elements)),
            ..Self::new(DataType::Array, description)
        }
    }

    /// An object with the given field schemas.
    pub fn object(
        description: impl Into<String>,
        fields: impl IntoIterator<Item = (String, ParameterInfo)>,
    ) -> Self {
        Self {
            fields: fields.into_iter().collect(),
            ..Self::new(DataType::Object, description)
        }
    }

    /// Mark this parameter as required.
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Render as a JSON Schema fragment.
    pub fn to_json_schema(&self) -> Value {
        let mut schema = Map::new();
        schema.insert("type".into(), Value::from(self.data_type.as_str()));
        if !self.description.is_empty() {
            schema.insert("description".into(), Value::from(self.description.clone()));
        }
        match self.data_type {
            DataType::Array => {
                if let Some(elements) = &self.elements {
                    schema.insert("items".into(), elements.to_json_schema());
                }
            }
            DataType::Object => {
                let (properties, required) = object_schema(&self.fields);
                schema.insert("properties".into(), properties);
                if !required.is_empty() {
                    schema.insert("required".into(), required.into());
                }
            }
            _ => {}
        }
        Value::Object(schema)
    }

    /// Check `value` against this schema. `path` names the value in errors.
    pub fn validate(&self, value: &Value, path: &str) -> Result<(), ToolError> {
        if !self.data_type.matches(value) {
            return Err(ToolError::InvalidArguments(format!(
                "'{path}' must be of type {}",
                self.data_type.as_str()
            )));
        }
        match (self.data_type, value) {
            (DataType::Array, Value::Array(items)) => {
                if let Some(elements) = &self.elements {
                    for (i, item) in items.iter().enumerate() {
                        elements.validate(item, &format!("{path}[{i}]"))?;
                    }
                }
            }
            (DataType::Object, Value::Object(map)) => {
                validate_fields(&self.fields, map, Some(path))?;
            }
            _ => {}
        }
        Ok(())
    }
}

fn object_schema(fields: &BTreeMap<String, ParameterInfo>) -> (Value, Vec<Value>) {
    let properties: Map<String, Value> = fields
        .iter()
        .map(|(name, p)| (name.clone(), p.to_json_schema()))
        .collect();
    let required = fields
        .iter()
        .filter(|(_, p)| p.required)
        .map(|(name, _)| Value::from(name.clone()))
        .collect();
    (Value::Object(properties), required)
}

fn validate_fields(
    fields: &BTreeMap<String, ParameterInfo>,
    map: &Map<String, Value>,
    parent: Option<&str>,
) -> Result<(), ToolError> {
    for (name, param) in fields {
        let path = match parent {
            Some(parent) => format!("{parent}.{name}"),
            None => name.clone(),
        };
        match map.get(name) {
            Some(value) => param.validate(value, &path)?,
            None if param.required => {
                return Err(ToolError::InvalidArguments(format!(
                    "missing required parameter '{path}'"
                )));
            }
            None => {}
        }
    }
    Ok(())
}

/// Metadata about a tool: what the model sees in the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInfo {
    /// Unique name within a registry
    pub name: String,

    /// What the tool does (sent to the model)
    pub description: String,

    /// Parameter schemas keyed by parameter name
    #[serde(default)]
    pub parameters: BTreeMap<String, ParameterInfo>,
}

impl ToolInfo {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: BTreeMap::new(),
        }
    }

    /// Add a parameter (builder style).
    pub fn with_parameter(mut self, name: impl Into<String>, info: ParameterInfo) -> Self {
        self.parameters.insert(name.into(), info);
        self
    }

    /// JSON Schema describing the whole argument object.
    pub fn parameters_schema(&self) -> Value {
        let (properties, required) = object_schema(&self.parameters);
        serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// Check an argument object against the declared parameters.
    ///
    /// Unknown keys are tolerated; missing required keys and type
    /// mismatches are reported as [`ToolError::InvalidArguments`].
    pub fn validate_arguments(&self, arguments: &Arguments) -> Result<(), ToolError> {
        validate_fields(&self.parameters, arguments, None)
    }

    /// Convert this info into the definition advertised to the model.
    pub fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.parameters_schema(),
        }
    }
}

/// A parsed request to execute a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Name of the tool to execute
    pub name: String,

    /// Arguments keyed by parameter name
    #[serde(default)]
    pub arguments: Arguments,
}

/// The core Tool trait.
///
/// The executor may return any JSON value; the agent loop serializes it
/// into the content of a tool-role message.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Name, description and parameter schema.
    fn info(&self) -> ToolInfo;

    /// Execute the tool with already-validated arguments.
    async fn execute(&self, arguments: Arguments) -> Result<Value, ToolError>;
}

/// A tool backed by an async closure.
pub struct FunctionTool<F> {
    info: ToolInfo,
    func: F,
}

impl<F> FunctionTool<F> {
    pub fn new(info: ToolInfo, func: F) -> Self {
        Self { info, func }
    }
}

#[async_trait]
impl<F, Fut> Tool for FunctionTool<F>
where
    F: Fn(Arguments) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, ToolError>> + Send,
{
    fn info(&self) -> ToolInfo {
        self.info.clone()
    }

    async fn execute(&self, arguments: Arguments) -> Result<Value, ToolError> {
        (self.func)(arguments).await
    }
}

struct RegisteredTool {
    info: ToolInfo,
    tool: Arc<dyn Tool>,
}

/// A registry of available tools.
///
/// Registration order is preserved for [`list`](Self::list). The registry
/// is meant to be built once and then shared read-only (behind an `Arc`)
/// by any number of concurrent agent turns.
#[derive(Default)]
pub struct ToolRegistry {
    tools: Vec<RegisteredTool>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. A second tool with the same name is rejected.
    pub fn register(&mut self, tool: Box<dyn Tool>) -> Result<(), ToolError> {
        let info = tool.info();
        if self.index.contains_key(&info.name) {
            return Err(ToolError::Duplicate(info.name));
        }
        debug!(tool = %info.name, "Registering tool");
        self.index.insert(info.name.clone(), self.tools.len());
        self.tools.push(RegisteredTool {
            info,
            tool: Arc::from(tool),
        });
        Ok(())
    }

    /// Register a closure-backed tool.
    pub fn register_fn<F, Fut>(&mut self, info: ToolInfo, func: F) -> Result<(), ToolError>
    where
        F: Fn(Arguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ToolError>> + Send + 'static,
    {
        self.register(Box::new(FunctionTool::new(info, func)))
    }

    /// Look up a tool by exact (case-sensitive) name.
    pub fn resolve(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.index.get(name).map(|&i| Arc::clone(&self.tools[i].tool))
    }

    /// Tool infos in registration order.
    pub fn list(&self) -> Vec<ToolInfo> {
        self.tools.iter().map(|t| t.info.clone()).collect()
    }

    /// Definitions to advertise to the model, in registration order.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.info.to_definition()).collect()
    }

    /// Resolve, validate and execute a call.
    ///
    /// Returns [`ToolError::NotFound`] when no tool has the requested name.
    pub async fn execute(&self, call: &ToolCall) -> Result<Value, ToolError> {
        let &i = self
            .index
            .get(&call.name)
            .ok_or_else(|| ToolError::NotFound(call.name.clone()))?;
        let entry = &self.tools[i];
        entry.info.validate_arguments(&call.arguments)?;
        entry.tool.execute(call.arguments.clone()).await
    }

    /// Registered tool names, in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.info.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

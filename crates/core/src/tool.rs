//! Tool trait — the abstraction over agent capabilities.
//!
//! A tool is a named operation with a typed parameter list. Calling it yields
//! a [`ToolOutput`]: either the result right away (synchronous tools) or a
//! future that resolves to it (asynchronous tools). Callers decide whether
//! to block on or await the pending case; tool implementations never have to
//! care which convention the caller uses.

use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::future::Future;
use crate::error::ToolError;
use crate::model::ToolSchema;

/// The JSON type a parameter must have.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Integer,
    Number,
    String,
    Boolean,
    Array,
    Object,
}

impl ParamKind {
    fn schema_type(self) -> &'static str {
        match self {
            Self::Integer => "integer",
            Self::Number => "number",
            Self::String => "string",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
        }
    }

    fn accepts(self, value: &serde_json::Value) -> bool {
        match self {
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Number => value.is_number(),
            Self::String => value.is_string(),
            Self::Boolean => value.is_boolean(),
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
        }
    }
}

/// One declared parameter of a tool.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolParam {
    pub name: String,
    pub kind: ParamKind,
    pub description: String,
    pub required: bool,
}

impl ToolParam {
    pub fn required(name: impl Into<String>, kind: ParamKind, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            description: description.into(),
            required: true,
        }
    }

    pub fn optional(name: impl Into<String>, kind: ParamKind, description: impl Into<String>) -> Self {
        Self {
            required: false,
            ..Self::required(name, kind, description)
        }
    }
}

/// Validated arguments for one tool invocation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolArgs(serde_json::Map<String, serde_json::Value>);

impl ToolArgs {
    pub fn new(map: serde_json::Map<String, serde_json::Value>) -> Self {
        Self(map)
    }

    pub fn get(&self, name: &str) -> Option<&serde_json::Value> {
        self.0.get(name)
    }

    /// Deserialize a required argument.
    pub fn require<T: DeserializeOwned>(&self, name: &str) -> Result<T, ToolError> {
        let value = self
            .0
            .get(name)
            .ok_or_else(|| ToolError::InvalidArguments(format!("Missing '{name}' argument")))?;
        serde_json::from_value(value.clone())
            .map_err(|e| ToolError::InvalidArguments(format!("Bad '{name}' argument: {e}")))
    }

    pub fn as_map(&self) -> &serde_json::Map<String, serde_json::Value> {
        &self.0
    }

    pub fn into_map(self) -> serde_json::Map<String, serde_json::Value> {
        self.0
    }
}

/// What calling a tool produces.
pub enum ToolOutput {
    /// The tool finished synchronously.
    Ready(Result<serde_json::Value, ToolError>),
    /// The tool's work is still running; drive the future to get the result.
    Pending(BoxFuture<'static, Result<serde_json::Value, ToolError>>),
}

impl std::fmt::Debug for ToolOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ready(result) => f.debug_tuple("Ready").field(result).finish(),
            Self::Pending(_) => f.write_str("Pending(..)"),
        }
    }
}

/// The core Tool trait.
///
/// Tools are registered in a [`ToolRegistry`] at agent construction and made
/// available to the model through their [`ToolSchema`].
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g. "mul").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the model).
    fn description(&self) -> &str;

    /// Declared parameters, in order.
    fn parameters(&self) -> &[ToolParam];

    /// Invoke the tool with already-validated arguments.
    fn call(&self, args: ToolArgs) -> ToolOutput;

    /// Check raw arguments against the declared parameter list.
    fn validate(
        &self,
        arguments: serde_json::Map<String, serde_json::Value>,
    ) -> Result<ToolArgs, ToolError> {
        for param in self.parameters() {
            match arguments.get(&param.name) {
                None if param.required => {
                    return Err(ToolError::InvalidArguments(format!(
                        "Missing required argument '{}' for {}",
                        param.name,
                        self.name()
                    )));
                }
                Some(value) if !param.kind.accepts(value) => {
                    return Err(ToolError::InvalidArguments(format!(
                        "Argument '{}' for {} must be of type {}",
                        param.name,
                        self.name(),
                        param.kind.schema_type()
                    )));
                }
                _ => {}
            }
        }
        Ok(ToolArgs::new(arguments))
    }

    /// Convert this tool into a schema for sending to the model.
    fn schema(&self) -> ToolSchema {
        let mut properties = serde_json::Map::new();
        let mut required = Vec::new();
        for param in self.parameters() {
            properties.insert(
                param.name.clone(),
                serde_json::json!({
                    "type": param.kind.schema_type(),
                    "description": param.description,
                }),
            );
            if param.required {
                required.push(serde_json::Value::String(param.name.clone()));
            }
        }
        ToolSchema {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": properties,
                "required": required,
            }),
        }
    }
}

type SyncHandler = Box<dyn Fn(ToolArgs) -> Result<serde_json::Value, ToolError> + Send + Sync>;
type AsyncHandler =
    Box<dyn Fn(ToolArgs) -> BoxFuture<'static, Result<serde_json::Value, ToolError>> + Send + Sync>;

enum Handler {
    Sync(SyncHandler),
    Async(AsyncHandler),
}

/// A tool backed by a closure.
pub struct FunctionTool {
    name: String,
    description: String,
    params: Vec<ToolParam>,
    handler: Handler,
}

impl FunctionTool {
    /// A tool whose closure returns its result directly.
    pub fn sync<F>(
        name: impl Into<String>,
        description: impl Into<String>,
        params: Vec<ToolParam>,
        f: F,
    ) -> Self
    where
        F: Fn(ToolArgs) -> Result<serde_json::Value, ToolError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            params,
            handler: Handler::Sync(Box::new(f)),
        }
    }

    /// A tool whose closure returns a future.
    pub fn asynchronous<F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        params: Vec<ToolParam>,
        f: F,
    ) -> Self
    where
        F: Fn(ToolArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<serde_json::Value, ToolError>> + Send + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            params,
            handler: Handler::Async(Box::new(move |args| Box::pin(f(args)))),
        }
    }

    pub fn is_async(&self) -> bool {
        matches!(self.handler, Handler::Async(_))
    }
}

impl Tool for FunctionTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters(&self) -> &[ToolParam] {
        &self.params
    }

    fn call(&self, args: ToolArgs) -> ToolOutput {
        match &self.handler {
            Handler::Sync(f) => ToolOutput::Ready(f(args)),
            Handler::Async(f) => ToolOutput::Pending(f(args)),
        }
    }
}

/// A registry of available tools, keyed by name.
///
/// Registration order is kept so schemas reach the model deterministically.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Box<dyn Tool>>,
    order: Vec<String>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from a tool set, failing on the first duplicate name.
    pub fn from_tools(tools: impl IntoIterator<Item = Box<dyn Tool>>) -> Result<Self, ToolError> {
        let mut registry = Self::new();
        for tool in tools {
            registry.register(tool)?;
        }
        Ok(registry)
    }

    /// Register a tool. A name collision is a configuration error.
    pub fn register(&mut self, tool: Box<dyn Tool>) -> Result<(), ToolError> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(ToolError::DuplicateName(name));
        }
        self.order.push(name.clone());
        self.tools.insert(name, tool);
        Ok(())
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    /// Get all tool schemas (for sending to the model).
    pub fn schemas(&self) -> Vec<ToolSchema> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|t| t.schema())
            .collect()
    }

    /// List all registered tool names, in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.order.iter().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

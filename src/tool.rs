use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{GatewayError, Result};

/// Prefix carried by every tool output that reports a failure.
pub const ERROR_MARKER: &str = "Error";

#[async_trait]
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;

    /// JSON Schema object describing the expected arguments.
    fn parameters(&self) -> Value {
        serde_json::json!({"type": "object", "properties": {}})
    }

    async fn call(&self, input: Value) -> Result<String>;
}

/// Static description of a tool handed to the model.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolDescription {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Fixed mapping from tool name to handler. Built at boot, read-only afterwards.
#[derive(Default, Clone)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    pub fn register<T: Tool + 'static>(&mut self, tool: T) -> Result<()> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(GatewayError::DuplicateTool(name));
        }
        self.tools.insert(name, Arc::new(tool));
        Ok(())
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Tool>> {
        self.tools
            .get(name)
            .cloned()
            .ok_or_else(|| GatewayError::UnknownTool(name.to_string()))
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn describe(&self) -> Vec<ToolDescription> {
        let mut descriptions: Vec<ToolDescription> = self
            .tools
            .values()
            .map(|tool| ToolDescription {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters(),
            })
            .collect();

        descriptions.sort_by(|a, b| a.name.cmp(&b.name));
        descriptions
    }

    /// Resolve, validate and call. Every failure is returned as an error.
    pub async fn try_invoke(&self, name: &str, arguments: Value) -> Result<String> {
        let tool = self.resolve(name)?;
        let arguments = normalize_arguments(arguments);
        validate_arguments(name, &tool.parameters(), &arguments)?;
        tool.call(arguments).await.map_err(|err| match err {
            err @ GatewayError::ToolInvocation { .. } => err,
            other => GatewayError::ToolInvocation {
                name: name.to_string(),
                source: Box::new(other),
            },
        })
    }

    /// Like [`ToolRegistry::try_invoke`] but failures become output text the model can read.
    pub async fn invoke(&self, name: &str, arguments: Value) -> String {
        match self.try_invoke(name, arguments).await {
            Ok(output) => output,
            Err(err) => format!("{ERROR_MARKER}: {err}"),
        }
    }
}

fn normalize_arguments(arguments: Value) -> Value {
    match arguments {
        Value::Null => Value::Object(Map::new()),
        Value::String(raw) if raw.trim().is_empty() => Value::Object(Map::new()),
        other => other,
    }
}

/// Check `arguments` against the subset of JSON Schema the tools declare:
/// object shape, `required` keys and primitive property types.
pub fn validate_arguments(name: &str, schema: &Value, arguments: &Value) -> Result<()> {
    let invalid = |reason: String| GatewayError::InvalidArguments {
        name: name.to_string(),
        reason,
    };

    let Some(object) = arguments.as_object() else {
        return Err(invalid(format!("expected a JSON object, got `{arguments}`")));
    };

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for key in required.iter().filter_map(Value::as_str) {
            if !object.contains_key(key) {
                return Err(invalid(format!("missing required argument `{key}`")));
            }
        }
    }

    let Some(properties) = schema.get("properties").and_then(Value::as_object) else {
        return Ok(());
    };
    for (key, value) in object {
        let Some(expected) = properties
            .get(key)
            .and_then(|prop| prop.get("type"))
            .and_then(Value::as_str)
        else {
            continue;
        };
        if !matches_type(expected, value) {
            return Err(invalid(format!("argument `{key}` must be of type {expected}")));
        }
    }
    Ok(())
}

fn matches_type(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        "null" => value.is_null(),
        _ => true,
    }
}

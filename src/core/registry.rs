//! Tool contract and registry.
//!
//! Tools come in two flavours. Local tools implement [`Tool`] and are invoked
//! directly. Tools that depend on an external service implement
//! [`ExternalTool`] and are always invoked through the
//! [`FallbackExecutor`](crate::core::fallback::FallbackExecutor), which
//! guarantees a result even when the service is down.
//!
//! The [`ToolRegistry`] is built once at startup and only read afterwards.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};

use crate::core::error::{ToolError, ValidationError};
use crate::core::fallback::{DependencyError, FallbackReason};

/// JSON type of a tool parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    String,
    Number,
    Integer,
    Boolean,
    Object,
    Array,
}

impl ParamType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Object => "object",
            Self::Array => "array",
        }
    }

    fn accepts(&self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Boolean => value.is_boolean(),
            Self::Object => value.is_object(),
            Self::Array => value.is_array(),
        }
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Declaration of a single tool parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSpec {
    pub name: String,
    pub description: String,
    pub param_type: ParamType,
    pub required: bool,
    pub allowed: Option<Vec<String>>,
    pub default: Option<Value>,
}

impl ParameterSpec {
    /// Optional parameter of the given type. Chain [`required`](Self::required)
    /// to make it mandatory.
    pub fn new(name: impl Into<String>, param_type: ParamType, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            param_type,
            required: false,
            allowed: None,
            default: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn one_of(mut self, allowed: &[&str]) -> Self {
        self.allowed = Some(allowed.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    fn schema(&self) -> Value {
        let mut schema = Map::new();
        schema.insert("type".into(), json!(self.param_type.as_str()));
        schema.insert("description".into(), json!(self.description));
        if let Some(allowed) = &self.allowed {
            schema.insert("enum".into(), json!(allowed));
        }
        if let Some(default) = &self.default {
            schema.insert("default".into(), default.clone());
        }
        Value::Object(schema)
    }
}

/// Name, description and parameter list of a tool. Immutable once registered.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub parameters: Vec<ParameterSpec>,
}

impl ToolDescriptor {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: Vec::new(),
        }
    }

    pub fn with_parameter(mut self, param: ParameterSpec) -> Self {
        self.parameters.push(param);
        self
    }

    /// JSON Schema of the argument object, as advertised by `tools/list`.
    pub fn input_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .parameters
            .iter()
            .map(|p| (p.name.clone(), p.schema()))
            .collect();
        let required: Vec<&str> = self
            .parameters
            .iter()
            .filter(|p| p.required)
            .map(|p| p.name.as_str())
            .collect();

        json!({
            "type": "object",
            "properties": properties,
            "required": required,
        })
    }

    /// Wire form used in `tools/list`.
    pub fn to_listing(&self) -> Value {
        json!({
            "name": self.name,
            "description": self.description,
            "inputSchema": self.input_schema(),
        })
    }

    /// Check an argument object against the declared parameters and fill in
    /// defaults for absent optional ones.
    pub fn validate(&self, arguments: Value) -> Result<ToolArguments, ValidationError> {
        let mut args = match arguments {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            _ => {
                return Err(ValidationError::NotAnObject {
                    tool: self.name.clone(),
                });
            }
        };

        // Explicit nulls are treated as absent
        args.retain(|_, v| !v.is_null());

        for key in args.keys() {
            if !self.parameters.iter().any(|p| &p.name == key) {
                return Err(ValidationError::Unknown {
                    tool: self.name.clone(),
                    parameter: key.clone(),
                });
            }
        }

        for param in &self.parameters {
            match args.get(&param.name) {
                None if param.required => {
                    return Err(ValidationError::Missing {
                        tool: self.name.clone(),
                        parameter: param.name.clone(),
                    });
                }
                None => {
                    if let Some(default) = &param.default {
                        args.insert(param.name.clone(), default.clone());
                    }
                }
                Some(value) => {
                    if !param.param_type.accepts(value) {
                        return Err(ValidationError::WrongType {
                            tool: self.name.clone(),
                            parameter: param.name.clone(),
                            expected: param.param_type.as_str(),
                            actual: json_type_name(value),
                        });
                    }
                    if let Some(allowed) = &param.allowed {
                        let matches = value
                            .as_str()
                            .is_some_and(|s| allowed.iter().any(|a| a == s));
                        if !matches {
                            return Err(ValidationError::NotAllowed {
                                tool: self.name.clone(),
                                parameter: param.name.clone(),
                                allowed: allowed.join(", "),
                            });
                        }
                    }
                }
            }
        }

        Ok(ToolArguments(args))
    }
}

/// Validated argument object handed to a tool.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolArguments(Map<String, Value>);

impl ToolArguments {
    pub fn str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn bool(&self, key: &str) -> Option<bool> {
        self.0.get(key).and_then(Value::as_bool)
    }

    /// Decode into the tool's own argument struct.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, ToolError> {
        Ok(serde_json::from_value(Value::Object(self.0.clone()))?)
    }
}

/// A tool computed entirely in-process.
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    fn descriptor(&self) -> &ToolDescriptor;

    /// Produce the tool's analysis object.
    async fn execute(&self, arguments: &ToolArguments) -> Result<Value, ToolError>;
}

/// A tool whose main path calls an external service.
///
/// Implementors never handle failures of that service themselves: the
/// fallback executor decides between [`primary`](Self::primary) and
/// [`fallback`](Self::fallback).
#[async_trait::async_trait]
pub trait ExternalTool: Send + Sync {
    fn descriptor(&self) -> &ToolDescriptor;

    /// Whether credentials and an endpoint are available.
    fn is_configured(&self) -> bool;

    /// The external call.
    async fn primary(&self, arguments: &ToolArguments) -> Result<Value, DependencyError>;

    /// Deterministic local substitute used when the primary path is skipped
    /// or fails.
    fn fallback(&self, arguments: &ToolArguments, reason: &FallbackReason) -> Value;
}

/// A registered tool of either flavour.
#[derive(Clone)]
pub enum ToolHandle {
    Local(Arc<dyn Tool>),
    External(Arc<dyn ExternalTool>),
}

impl ToolHandle {
    pub fn descriptor(&self) -> &ToolDescriptor {
        match self {
            Self::Local(tool) => tool.descriptor(),
            Self::External(tool) => tool.descriptor(),
        }
    }

    pub fn is_external(&self) -> bool {
        matches!(self, Self::External(_))
    }
}

impl fmt::Debug for ToolHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_external() { "External" } else { "Local" };
        f.debug_tuple(kind).field(&self.descriptor().name).finish()
    }
}

/// Ordered mapping from tool name to tool.
#[derive(Debug, Default)]
pub struct ToolRegistry {
    entries: Vec<ToolHandle>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tool. A tool with an already registered name replaces the
    /// previous entry in place.
    pub fn register(&mut self, tool: ToolHandle) {
        let name = tool.descriptor().name.clone();
        match self.index.get(&name) {
            Some(&position) => {
                tracing::warn!(tool = %name, "Duplicate tool registration, replacing previous entry");
                self.entries[position] = tool;
            }
            None => {
                tracing::debug!(tool = %name, external = tool.is_external(), "Registered tool");
                self.index.insert(name, self.entries.len());
                self.entries.push(tool);
            }
        }
    }

    pub fn register_local(&mut self, tool: impl Tool + 'static) {
        self.register(ToolHandle::Local(Arc::new(tool)));
    }

    pub fn register_external(&mut self, tool: impl ExternalTool + 'static) {
        self.register(ToolHandle::External(Arc::new(tool)));
    }

    pub fn get(&self, name: &str) -> Option<&ToolHandle> {
        self.index.get(name).map(|&i| &self.entries[i])
    }

    /// Descriptors in registration order.
    pub fn descriptors(&self) -> impl Iterator<Item = &ToolDescriptor> {
        self.entries.iter().map(ToolHandle::descriptor)
    }

    pub fn names(&self) -> Vec<&str> {
        self.descriptors().map(|d| d.name.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed {
        descriptor: ToolDescriptor,
        answer: &'static str,
    }

    impl Fixed {
        fn new(name: &str, answer: &'static str) -> Self {
            Self {
                descriptor: ToolDescriptor::new(name, "fixed answer"),
                answer,
            }
        }
    }

    #[async_trait::async_trait]
    impl Tool for Fixed {
        fn descriptor(&self) -> &ToolDescriptor {
            &self.descriptor
        }

        async fn execute(&self, _arguments: &ToolArguments) -> Result<Value, ToolError> {
            Ok(json!({ "answer": self.answer }))
        }
    }

    fn descriptor() -> ToolDescriptor {
        ToolDescriptor::new("t", "test tool")
            .with_parameter(ParameterSpec::new("content", ParamType::String, "Text").required())
            .with_parameter(ParameterSpec::new("limit", ParamType::Integer, "Max items"))
            .with_parameter(
                ParameterSpec::new("mode", ParamType::String, "Mode")
                    .one_of(&["fast", "slow"])
                    .with_default("fast"),
            )
    }

    #[test]
    fn test_validate_missing_required() {
        let err = descriptor().validate(json!({"limit": 3})).unwrap_err();
        assert_eq!(
            err,
            ValidationError::Missing {
                tool: "t".into(),
                parameter: "content".into()
            }
        );

        // null counts as absent
        let err = descriptor().validate(json!({"content": null})).unwrap_err();
        assert!(matches!(err, ValidationError::Missing { .. }));
    }

    #[test]
    fn test_validate_wrong_type() {
        let err = descriptor().validate(json!({"content": 5})).unwrap_err();
        assert_eq!(
            err,
            ValidationError::WrongType {
                tool: "t".into(),
                parameter: "content".into(),
                expected: "string",
                actual: "number",
            }
        );

        let err = descriptor()
            .validate(json!({"content": "x", "limit": 1.5}))
            .unwrap_err();
        assert!(matches!(err, ValidationError::WrongType { expected: "integer", .. }));
    }

    #[test]
    fn test_validate_enum_and_unknown() {
        let err = descriptor()
            .validate(json!({"content": "x", "mode": "medium"}))
            .unwrap_err();
        assert!(matches!(err, ValidationError::NotAllowed { .. }));

        let err = descriptor()
            .validate(json!({"content": "x", "extra": true}))
            .unwrap_err();
        assert!(matches!(err, ValidationError::Unknown { parameter, .. } if parameter == "extra"));

        let err = descriptor().validate(json!(["x"])).unwrap_err();
        assert!(matches!(err, ValidationError::NotAnObject { .. }));
    }

    #[test]
    fn test_validate_applies_defaults() {
        let args = descriptor().validate(json!({"content": "x"})).unwrap();
        assert_eq!(args.str("content"), Some("x"));
        assert_eq!(args.str("mode"), Some("fast"));
    }

    #[test]
    fn test_input_schema() {
        let schema = descriptor().input_schema();
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["required"], json!(["content"]));
        assert_eq!(schema["properties"]["mode"]["enum"], json!(["fast", "slow"]));
        assert_eq!(schema["properties"]["mode"]["default"], "fast");
        assert_eq!(schema["properties"]["limit"]["type"], "integer");
    }

    #[tokio::test]
    async fn test_duplicate_registration_replaces_in_place() {
        let mut registry = ToolRegistry::new();
        registry.register_local(Fixed::new("a", "first"));
        registry.register_local(Fixed::new("b", "other"));
        registry.register_local(Fixed::new("a", "second"));

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.names(), vec!["a", "b"]);

        let ToolHandle::Local(tool) = registry.get("a").unwrap() else {
            panic!("expected local tool");
        };
        let out = tool.execute(&ToolArguments::default()).await.unwrap();
        assert_eq!(out["answer"], "second");
    }

    #[test]
    fn test_lookup_missing() {
        let registry = ToolRegistry::new();
        assert!(registry.get("nothing").is_none());
        assert!(registry.is_empty());
    }
}

/// Tool Argument Schemas
///
/// A schema is an ordered list of named parameters with an expected JSON type.
/// Arguments are checked against it before a handler ever sees them, so
/// handlers can deserialize into typed structs without re-validating.

use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::mcp::error::DispatchError;

/// JSON type a parameter must have.
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Number,
    Integer,
    Boolean,
    Object,
    Array,
}

impl ParamType {
    fn matches(self, value: &Value) -> bool {
        match self {
            ParamType::String => value.is_string(),
            ParamType::Number => value.is_number(),
            ParamType::Integer => value.is_i64() || value.is_u64(),
            ParamType::Boolean => value.is_boolean(),
            ParamType::Object => value.is_object(),
            ParamType::Array => value.is_array(),
        }
    }

    fn name(self) -> &'static str {
        match self {
            ParamType::String => "string",
            ParamType::Number => "number",
            ParamType::Integer => "integer",
            ParamType::Boolean => "boolean",
            ParamType::Object => "object",
            ParamType::Array => "array",
        }
    }
}

/// How unknown argument keys are treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ArgumentPolicy {
    /// Keys not declared in the schema are passed through untouched.
    #[default]
    Permissive,
    /// Keys not declared in the schema fail with `InvalidArguments`.
    Strict,
}

#[derive(Debug, Clone)]
pub struct ParamSpec {
    pub name: String,
    pub param_type: ParamType,
    pub description: String,
    pub required: bool,
    /// Rejects `""` for string parameters.
    pub non_empty: bool,
}

/// Declared parameters of a tool, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct ArgumentSchema {
    params: Vec<ParamSpec>,
}

impl ArgumentSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required(self, name: &str, param_type: ParamType, description: &str) -> Self {
        self.param(name, param_type, description, true, false)
    }

    pub fn optional(self, name: &str, param_type: ParamType, description: &str) -> Self {
        self.param(name, param_type, description, false, false)
    }

    /// Required string parameter that must not be empty.
    pub fn required_id(self, name: &str, description: &str) -> Self {
        self.param(name, ParamType::String, description, true, true)
    }

    fn param(
        mut self,
        name: &str,
        param_type: ParamType,
        description: &str,
        required: bool,
        non_empty: bool,
    ) -> Self {
        self.params.push(ParamSpec {
            name: name.to_string(),
            param_type,
            description: description.to_string(),
            required,
            non_empty,
        });
        self
    }

    /// Render as a JSON Schema object for `list_tools`.
    pub fn to_json_schema(&self) -> Value {
        let mut properties = Map::new();
        for p in &self.params {
            let mut prop = json!({
                "type": p.param_type,
                "description": p.description,
            });
            if p.non_empty {
                prop["minLength"] = json!(1);
            }
            properties.insert(p.name.clone(), prop);
        }
        let required: Vec<&str> = self
            .params
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

    /// Check `arguments` against the schema and return them as a JSON map.
    ///
    /// Fields are checked in declaration order, so the first offending field
    /// is the one reported. Optional fields may be absent or `null`.
    pub fn validate(
        &self,
        arguments: Value,
        policy: ArgumentPolicy,
    ) -> Result<Map<String, Value>, DispatchError> {
        let args = match arguments {
            Value::Object(map) => map,
            other => {
                return Err(DispatchError::invalid_argument(
                    "arguments",
                    format!("expected an object, got {}", json_type_name(&other)),
                ));
            }
        };

        for p in &self.params {
            match args.get(&p.name) {
                None | Some(Value::Null) => {
                    if p.required {
                        return Err(DispatchError::invalid_argument(
                            &p.name,
                            "missing required field",
                        ));
                    }
                }
                Some(value) => {
                    if !p.param_type.matches(value) {
                        return Err(DispatchError::invalid_argument(
                            &p.name,
                            format!(
                                "expected {}, got {}",
                                p.param_type.name(),
                                json_type_name(value)
                            ),
                        ));
                    }
                    if p.non_empty && value.as_str().is_some_and(str::is_empty) {
                        return Err(DispatchError::invalid_argument(&p.name, "must not be empty"));
                    }
                }
            }
        }

        if policy == ArgumentPolicy::Strict {
            if let Some(unknown) = args
                .keys()
                .find(|k| !self.params.iter().any(|p| &p.name == *k))
            {
                return Err(DispatchError::invalid_argument(
                    unknown.as_str(),
                    "unknown field",
                ));
            }
        }

        Ok(args)
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

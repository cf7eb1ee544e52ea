//! Declarative tool parameter schemas.
//!
//! Every wrapped tool describes its parameters as a list of [`ParamSpec`]s. The
//! orchestrator validates requests against that list generically, so adding a
//! tool never needs new validation code.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{json, Map, Value};

use super::error::AnalysisError;

/// Type and constraint of a single parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParamKind {
    String,
    Enum {
        values: Vec<String>,
    },
    Integer {
        #[serde(skip_serializing_if = "Option::is_none")]
        minimum: Option<i64>,
        #[serde(skip_serializing_if = "Option::is_none")]
        maximum: Option<i64>,
    },
    Boolean,
    StringList,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ParamSpec {
    pub name: String,
    pub description: String,
    #[serde(flatten)]
    pub kind: ParamKind,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl ParamSpec {
    fn new(name: &str, description: &str, kind: ParamKind) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            kind,
            required: false,
            default: None,
        }
    }

    pub fn string(name: &str, description: &str) -> Self {
        Self::new(name, description, ParamKind::String)
    }

    pub fn enumeration(name: &str, description: &str, values: &[&str]) -> Self {
        Self::new(
            name,
            description,
            ParamKind::Enum {
                values: values.iter().map(|v| v.to_string()).collect(),
            },
        )
    }

    pub fn integer(name: &str, description: &str, minimum: Option<i64>, maximum: Option<i64>) -> Self {
        Self::new(name, description, ParamKind::Integer { minimum, maximum })
    }

    pub fn boolean(name: &str, description: &str) -> Self {
        Self::new(name, description, ParamKind::Boolean)
    }

    pub fn string_list(name: &str, description: &str) -> Self {
        Self::new(name, description, ParamKind::StringList)
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn default_value(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    /// Checks one supplied value, pushing a message per violated constraint.
    fn check(&self, value: &Value, violations: &mut Vec<String>) {
        match &self.kind {
            ParamKind::String => {
                if !value.is_string() {
                    violations.push(format!("{}: expected a string, got {}", self.name, value));
                }
            }
            ParamKind::Enum { values } => match value.as_str() {
                Some(s) if values.iter().any(|v| v == s) => {}
                Some(s) => violations.push(format!(
                    "{}: '{}' is not one of {}",
                    self.name,
                    s,
                    values.join(", ")
                )),
                None => violations.push(format!("{}: expected a string, got {}", self.name, value)),
            },
            ParamKind::Integer { minimum, maximum } => match value.as_i64() {
                Some(n) => {
                    if let Some(min) = minimum {
                        if n < *min {
                            violations.push(format!("{}: {} is below minimum {}", self.name, n, min));
                        }
                    }
                    if let Some(max) = maximum {
                        if n > *max {
                            violations.push(format!("{}: {} is above maximum {}", self.name, n, max));
                        }
                    }
                }
                None => violations.push(format!("{}: expected an integer, got {}", self.name, value)),
            },
            ParamKind::Boolean => {
                if !value.is_boolean() {
                    violations.push(format!("{}: expected a boolean, got {}", self.name, value));
                }
            }
            ParamKind::StringList => {
                let all_strings = value
                    .as_array()
                    .map(|items| items.iter().all(Value::is_string))
                    .unwrap_or(false);
                if !all_strings {
                    violations.push(format!(
                        "{}: expected an array of strings, got {}",
                        self.name, value
                    ));
                }
            }
        }
    }

    fn json_schema(&self) -> Value {
        let mut schema = match &self.kind {
            ParamKind::String => json!({ "type": "string" }),
            ParamKind::Enum { values } => json!({ "type": "string", "enum": values }),
            ParamKind::Integer { minimum, maximum } => {
                let mut s = json!({ "type": "integer" });
                if let Some(min) = minimum {
                    s["minimum"] = json!(min);
                }
                if let Some(max) = maximum {
                    s["maximum"] = json!(max);
                }
                s
            }
            ParamKind::Boolean => json!({ "type": "boolean" }),
            ParamKind::StringList => json!({ "type": "array", "items": { "type": "string" } }),
        };
        schema["description"] = json!(self.description);
        if let Some(default) = &self.default {
            schema["default"] = default.clone();
        }
        schema
    }
}

/// Static metadata for one wrapped analysis tool.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub params: Vec<ParamSpec>,
}

impl ToolDescriptor {
    pub fn new(name: &str, description: &str, params: Vec<ParamSpec>) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            params,
        }
    }

    /// Prefix of the analysis identifiers minted for this tool:
    /// `slither-analyze` runs become `slither_0`, `slither_1`, ...
    pub fn id_prefix(&self) -> &str {
        self.name.split('-').next().unwrap_or(&self.name)
    }

    pub fn param(&self, name: &str) -> Option<&ParamSpec> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Validates supplied options and fills in defaults.
    ///
    /// Reports every violation, not just the first. `null` counts as absent.
    pub fn validate(&self, options: &Map<String, Value>) -> Result<ValidatedParams, AnalysisError> {
        let mut violations = Vec::new();
        let mut values = BTreeMap::new();

        for (name, value) in options {
            if value.is_null() {
                continue;
            }
            match self.param(name) {
                Some(spec) => {
                    spec.check(value, &mut violations);
                    values.insert(name.clone(), value.clone());
                }
                None => violations.push(format!("{}: unknown parameter for {}", name, self.name)),
            }
        }

        for spec in &self.params {
            if values.contains_key(&spec.name) {
                continue;
            }
            if let Some(default) = &spec.default {
                values.insert(spec.name.clone(), default.clone());
            } else if spec.required {
                violations.push(format!("{}: required parameter is missing", spec.name));
            }
        }

        if violations.is_empty() {
            Ok(ValidatedParams(values))
        } else {
            Err(AnalysisError::InvalidParameters(violations))
        }
    }

    /// JSON schema advertised to protocol clients, including the source fields.
    pub fn input_schema(&self) -> Value {
        let mut properties = Map::new();
        properties.insert(
            "contract_code".to_string(),
            json!({ "type": "string", "description": "The Solidity contract source code to analyze" }),
        );
        properties.insert(
            "contract_file".to_string(),
            json!({ "type": "string", "description": "Path to the contract file (alternative to contract_code)" }),
        );
        for spec in &self.params {
            properties.insert(spec.name.clone(), spec.json_schema());
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
            "anyOf": [
                { "required": ["contract_code"] },
                { "required": ["contract_file"] }
            ]
        })
    }
}

/// Parameters that passed validation, with defaults applied.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidatedParams(BTreeMap<String, Value>);

impl ValidatedParams {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn str(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        self.0.get(name).and_then(Value::as_i64)
    }

    pub fn flag(&self, name: &str) -> bool {
        self.0.get(name).and_then(Value::as_bool).unwrap_or(false)
    }

    pub fn list(&self, name: &str) -> Vec<String> {
        self.0
            .get(name)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn as_map(&self) -> &BTreeMap<String, Value> {
        &self.0
    }
}

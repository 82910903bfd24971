//! Per-variable type descriptors inferred from initial values.

use crate::value::Value;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};
use std::fmt;

/// Explicit per-variable fields: schema keys plus `ui:` prefixed hints.
pub type FieldOverrides = Map<String, Json>;

pub const UI_PREFIX: &str = "ui:";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaType {
    Boolean,
    Integer,
    Number,
    String,
    Array,
}

impl SchemaType {
    pub fn as_str(self) -> &'static str {
        match self {
            SchemaType::Boolean => "boolean",
            SchemaType::Integer => "integer",
            SchemaType::Number => "number",
            SchemaType::String => "string",
            SchemaType::Array => "array",
        }
    }

    /// Scalar type of a value. Anything without a direct mapping gives `None`.
    fn of_scalar(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(_) => Some(SchemaType::Boolean),
            Value::Integer(_) => Some(SchemaType::Integer),
            Value::Number(_) => Some(SchemaType::Number),
            Value::Text(_) => Some(SchemaType::String),
            Value::Undefined | Value::Array(_) => None,
        }
    }
}

impl fmt::Display for SchemaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// JSON-schema-like description of one variable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeDescriptor(pub Map<String, Json>);

impl TypeDescriptor {
    fn of_type(schema_type: SchemaType) -> Self {
        let mut fields = Map::new();
        fields.insert("type".to_string(), Json::from(schema_type.as_str()));
        Self(fields)
    }

    /// Infers a descriptor from the initial value. Variables without one are
    /// assumed to be numeric.
    pub fn infer(initial: Option<&Value>) -> Self {
        let Some(initial) = initial else {
            return Self::of_type(SchemaType::Number);
        };
        if let Some(schema_type) = SchemaType::of_scalar(initial) {
            return Self::of_type(schema_type);
        }
        let Some(items) = initial.as_array() else {
            return Self::of_type(SchemaType::Number);
        };
        let item_type = match items.first() {
            None => SchemaType::Number,
            Some(first) => SchemaType::of_scalar(first).unwrap_or(SchemaType::String),
        };
        let mut descriptor = Self::of_type(SchemaType::Array);
        descriptor.0.insert(
            "items".to_string(),
            Json::Object(Self::of_type(item_type).0),
        );
        descriptor
    }

    /// Inference, then explicit overrides, then a synthesized description.
    pub fn describe(initial: Option<&Value>, overrides: Option<&FieldOverrides>) -> Self {
        let mut descriptor = Self::infer(initial);
        if let Some(overrides) = overrides {
            descriptor.merge(overrides);
        }
        descriptor.describe_constraints();
        descriptor
    }

    /// Copies every non-`ui:` field of `overrides`, replacing inferred ones.
    pub fn merge(&mut self, overrides: &FieldOverrides) {
        for (key, value) in overrides {
            if !key.starts_with(UI_PREFIX) {
                self.0.insert(key.clone(), value.clone());
            }
        }
    }

    pub fn schema_type(&self) -> Option<&str> {
        self.0.get("type").and_then(Json::as_str)
    }

    pub fn description(&self) -> Option<&str> {
        self.0.get("description").and_then(Json::as_str)
    }

    pub fn get(&self, key: &str) -> Option<&Json> {
        self.0.get(key)
    }

    /// Adds a `description` built from the constraint fields unless one is
    /// already present.
    pub fn describe_constraints(&mut self) {
        if self.0.contains_key("description") {
            return;
        }
        let field = |key: &str| self.0.get(key).map(display_json);
        let mut clauses = Vec::new();

        if matches!(self.schema_type(), Some("number" | "integer")) {
            match (field("minimum"), field("maximum")) {
                (Some(minimum), Some(maximum)) => {
                    clauses.push(format!("Value must be between {minimum} and {maximum}"))
                }
                (Some(minimum), None) => clauses.push(format!("Minimum value: {minimum}")),
                (None, Some(maximum)) => clauses.push(format!("Maximum value: {maximum}")),
                (None, None) => {}
            }
        }
        if let Some(pattern) = field("pattern") {
            clauses.push(format!("Must match pattern: {pattern}"));
        }
        if let Some(min_length) = field("minLength") {
            clauses.push(format!("Minimum length: {min_length}"));
        }
        if let Some(max_length) = field("maxLength") {
            clauses.push(format!("Maximum length: {max_length}"));
        }
        if let Some(allowed) = self.0.get("enum") {
            let allowed = match allowed {
                Json::Array(values) => values.iter().map(display_json).collect::<Vec<_>>().join(", "),
                other => display_json(other),
            };
            clauses.push(format!("Allowed values: {allowed}"));
        }

        if !clauses.is_empty() {
            self.0
                .insert("description".to_string(), Json::from(clauses.join("; ")));
        }
    }
}

/// Strings without quotes, everything else as JSON.
fn display_json(value: &Json) -> String {
    match value {
        Json::String(text) => text.clone(),
        other => other.to_string(),
    }
}

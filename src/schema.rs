//! JSON-Schema subset and the parameter/argument validator, plus the
//! per-field type check used when projecting tool-call arguments
//! through an action's schema.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{SchemaError, ValidationError};

/// Accepted primitive types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrimitiveType {
    String,
    Number,
    Boolean,
    Array,
    Object,
}

impl PrimitiveType {
    fn parse(raw: &str) -> Result<Self, SchemaError> {
        match raw {
            "string" => Ok(Self::String),
            "number" => Ok(Self::Number),
            "boolean" => Ok(Self::Boolean),
            "array" => Ok(Self::Array),
            "object" => Ok(Self::Object),
            other => Err(SchemaError::UnsupportedType(other.to_string())),
        }
    }

    /// Whether `value`'s runtime kind matches this declared type.
    /// `object` explicitly excludes arrays.
    pub fn matches(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Array => value.is_array(),
            Self::Object => value.is_object() && !value.is_array(),
        }
    }
}

/// One entry in `Schema.properties`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertySchema {
    #[serde(rename = "type")]
    pub kind: PrimitiveType,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r#enum: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Value>,
}

/// An object schema: `properties`, `required`, `additionalProperties`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schema {
    #[serde(rename = "type", default = "object_type")]
    pub kind: String,
    pub properties: BTreeMap<String, PropertySchema>,
    #[serde(default)]
    pub required: Vec<String>,
    #[serde(default)]
    pub additional_properties: bool,
}

fn object_type() -> String {
    "object".to_string()
}

impl Schema {
    pub fn empty() -> Self {
        Self {
            kind: object_type(),
            properties: BTreeMap::new(),
            required: Vec::new(),
            additional_properties: false,
        }
    }

    /// Structural check of the schema declaration itself: root must be
    /// `type: object`, `required` entries must name declared
    /// properties, and every property's declared type must be one of
    /// the accepted primitives.
    pub fn validate_declaration(&self) -> Result<(), SchemaError> {
        if self.kind != "object" {
            return Err(SchemaError::RootTypeMustBeObject);
        }
        for required in &self.required {
            if !self.properties.contains_key(required) {
                return Err(SchemaError::InvalidRequired);
            }
        }
        Ok(())
    }

    /// Parses a raw JSON-Schema-shaped value into a [`Schema`],
    /// rejecting anything outside the accepted subset.
    pub fn from_json(value: &Value) -> Result<Self, SchemaError> {
        let obj = value.as_object().ok_or(SchemaError::NotAnObject)?;

        let kind = obj
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or("object");
        if kind != "object" {
            return Err(SchemaError::RootTypeMustBeObject);
        }

        let mut properties = BTreeMap::new();
        if let Some(props) = obj.get("properties").and_then(Value::as_object) {
            for (name, prop) in props {
                let prop_obj = prop.as_object().ok_or(SchemaError::NotAnObject)?;
                let type_name = prop_obj
                    .get("type")
                    .and_then(Value::as_str)
                    .ok_or(SchemaError::UnsupportedType(String::new()))?;
                properties.insert(
                    name.clone(),
                    PropertySchema {
                        kind: PrimitiveType::parse(type_name)?,
                        description: prop_obj
                            .get("description")
                            .and_then(Value::as_str)
                            .unwrap_or_default()
                            .to_string(),
                        r#enum: prop_obj.get("enum").and_then(Value::as_array).cloned(),
                        items: prop_obj.get("items").cloned(),
                    },
                );
            }
        }

        let required = obj
            .get("required")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let additional_properties = obj
            .get("additionalProperties")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        let schema = Self {
            kind: kind.to_string(),
            properties,
            required,
            additional_properties,
        };
        schema.validate_declaration()?;
        Ok(schema)
    }

    /// Serializes back to a plain JSON-Schema object, e.g. for the
    /// tool-list shape sent to the cascade.
    pub fn to_json(&self) -> Value {
        let properties: serde_json::Map<String, Value> = self
            .properties
            .iter()
            .map(|(name, prop)| {
                let mut entry = serde_json::json!({
                    "type": type_name(prop.kind),
                    "description": prop.description,
                });
                if let Some(values) = &prop.r#enum {
                    entry["enum"] = Value::Array(values.clone());
                }
                if let Some(items) = &prop.items {
                    entry["items"] = items.clone();
                }
                (name.clone(), entry)
            })
            .collect();

        serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": self.required,
            "additionalProperties": self.additional_properties,
        })
    }

    /// Validates `params` against this schema: every required field
    /// must be present and non-undefined, and every present field's
    /// runtime kind must match its declared primitive type. All
    /// failures are aggregated into a single [`ValidationError`].
    pub fn validate(&self, params: &Value) -> Result<(), ValidationError> {
        let mut messages = Vec::new();

        let Some(obj) = params.as_object() else {
            return Err(ValidationError::single("parameters must be a JSON object"));
        };

        for field in &self.required {
            match obj.get(field) {
                None | Some(Value::Null) => {
                    messages.push(format!("missing required field: {field}"));
                }
                Some(_) => {}
            }
        }

        for (key, value) in obj {
            if let Some(prop) = self.properties.get(key) {
                if !prop.kind.matches(value) {
                    messages.push(format!(
                        "field `{key}` must be of type {}",
                        type_name(prop.kind)
                    ));
                }
            } else if !self.additional_properties {
                messages.push(format!("unknown field: {key}"));
            }
        }

        if messages.is_empty() {
            Ok(())
        } else {
            Err(ValidationError { messages })
        }
    }

    /// Projects `arguments` through this schema, keeping only declared
    /// keys.
    pub fn project(&self, arguments: &Value) -> Value {
        let Some(obj) = arguments.as_object() else {
            return Value::Object(serde_json::Map::new());
        };
        let projected: serde_json::Map<String, Value> = obj
            .iter()
            .filter(|(key, _)| self.properties.contains_key(*key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        Value::Object(projected)
    }
}

fn type_name(kind: PrimitiveType) -> &'static str {
    match kind {
        PrimitiveType::String => "string",
        PrimitiveType::Number => "number",
        PrimitiveType::Boolean => "boolean",
        PrimitiveType::Array => "array",
        PrimitiveType::Object => "object",
    }
}

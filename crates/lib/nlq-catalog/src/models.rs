use std::{error::Error, fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::schema::{assign_categories, extract_keywords};
use crate::text::tokenize;

/// Coarse intent bucket used to narrow the candidate tool set.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    DataOperations,
    SchemaManagement,
    ObjectDiscovery,
    CodeManagement,
    Debugging,
    Uncategorized,
}

impl Category {
    /// Every category in tie-break priority order.
    pub const ALL: [Self; 6] = [
        Self::DataOperations,
        Self::SchemaManagement,
        Self::ObjectDiscovery,
        Self::CodeManagement,
        Self::Debugging,
        Self::Uncategorized,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DataOperations => "data_operations",
            Self::SchemaManagement => "schema_management",
            Self::ObjectDiscovery => "object_discovery",
            Self::CodeManagement => "code_management",
            Self::Debugging => "debugging",
            Self::Uncategorized => "uncategorized",
        }
    }

    /// Position in the fixed priority order; lower wins ties.
    #[must_use]
    pub const fn priority(self) -> usize {
        match self {
            Self::DataOperations => 0,
            Self::SchemaManagement => 1,
            Self::ObjectDiscovery => 2,
            Self::CodeManagement => 3,
            Self::Debugging => 4,
            Self::Uncategorized => 5,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = SchemaError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|category| category.as_str() == normalized)
            .ok_or_else(|| SchemaError::new(format!("unknown category: {value}")))
    }
}

/// Declared JSON type of a tool parameter.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ParamType {
    String,
    Number,
    Boolean,
    Object,
    Array,
}

impl ParamType {
    /// Maps a JSON schema `type` keyword onto a parameter type.
    ///
    /// # Errors
    /// Returns `SchemaError` for keywords outside the supported set.
    pub fn from_schema_type(value: &str) -> Result<Self, SchemaError> {
        match value {
            "string" => Ok(Self::String),
            "number" | "integer" => Ok(Self::Number),
            "boolean" => Ok(Self::Boolean),
            "object" => Ok(Self::Object),
            "array" => Ok(Self::Array),
            other => Err(SchemaError::new(format!("unsupported parameter type: {other}"))),
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Object => "object",
            Self::Array => "array",
        }
    }

    /// Returns true when `value` already has this type.
    #[must_use]
    pub const fn accepts(self, value: &Value) -> bool {
        matches!(
            (self, value),
            (Self::String, Value::String(_))
                | (Self::Number, Value::Number(_))
                | (Self::Boolean, Value::Bool(_))
                | (Self::Object, Value::Object(_))
                | (Self::Array, Value::Array(_))
        )
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single declared parameter of a remote operation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParameterSpec {
    pub name: String,
    pub param_type: ParamType,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_values: Vec<Value>,
}

impl ParameterSpec {
    pub fn new(name: impl Into<String>, param_type: ParamType) -> Self {
        Self {
            name: name.into(),
            param_type,
            required: false,
            default: None,
            description: None,
            allowed_values: Vec::new(),
        }
    }

    #[must_use]
    pub const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    #[must_use]
    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Parses one entry of a JSON schema `properties` object.
    ///
    /// A property without a `type` keyword is treated as a string.
    ///
    /// # Errors
    /// Returns `SchemaError` if the property is not an object or declares an
    /// unsupported type.
    pub fn from_json_schema(name: &str, property: &Value, required: bool) -> Result<Self, SchemaError> {
        let Some(property) = property.as_object() else {
            return Err(SchemaError::new(format!("property {name} is not an object")));
        };

        let param_type = match property.get("type") {
            None => ParamType::String,
            Some(Value::String(kind)) => ParamType::from_schema_type(kind)?,
            Some(Value::Array(kinds)) => kinds
                .iter()
                .filter_map(Value::as_str)
                .find(|kind| *kind != "null")
                .map_or(Ok(ParamType::String), ParamType::from_schema_type)?,
            Some(other) => {
                return Err(SchemaError::new(format!(
                    "property {name} has invalid type keyword: {other}"
                )));
            }
        };

        Ok(Self {
            name: name.to_string(),
            param_type,
            required,
            default: property.get("default").cloned(),
            description: property
                .get("description")
                .and_then(Value::as_str)
                .map(str::to_string),
            allowed_values: property
                .get("enum")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default(),
        })
    }
}

/// A callable remote operation as seen by one registry refresh cycle.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub parameters: Vec<ParameterSpec>,
    pub categories: Vec<Category>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
    pub refreshed_at: DateTime<Utc>,
}

impl ToolDescriptor {
    /// Builds a descriptor from a discovered tool listing entry.
    ///
    /// # Errors
    /// Returns `SchemaError` if the name is empty or the input schema is malformed.
    pub fn from_listing(
        name: &str,
        description: &str,
        input_schema: &Value,
        refreshed_at: DateTime<Utc>,
    ) -> Result<Self, SchemaError> {
        if name.trim().is_empty() {
            return Err(SchemaError::new("tool name is empty"));
        }
        let parameters = parse_parameters(name, input_schema)?;
        Ok(Self {
            name: name.to_string(),
            description: description.to_string(),
            parameters,
            categories: assign_categories(name, description),
            keywords: extract_keywords(description),
            refreshed_at,
        })
    }

    #[must_use]
    pub fn parameter(&self, name: &str) -> Option<&ParameterSpec> {
        self.parameters.iter().find(|spec| spec.name == name)
    }

    pub fn required_parameters(&self) -> impl Iterator<Item = &ParameterSpec> {
        self.parameters.iter().filter(|spec| spec.required)
    }

    #[must_use]
    pub fn has_category(&self, category: Category) -> bool {
        self.categories.contains(&category)
    }

    /// Normalized tokens drawn from the name, description, and keywords.
    #[must_use]
    pub fn search_tokens(&self) -> Vec<String> {
        let mut tokens = tokenize(&self.name);
        tokens.extend(tokenize(&self.description));
        tokens.extend(self.keywords.iter().cloned());
        tokens.sort();
        tokens.dedup();
        tokens
    }
}

fn parse_parameters(tool: &str, input_schema: &Value) -> Result<Vec<ParameterSpec>, SchemaError> {
    let schema = match input_schema {
        Value::Null => return Ok(Vec::new()),
        Value::Object(schema) => schema,
        _ => {
            return Err(SchemaError::new(format!(
                "input schema for {tool} is not an object"
            )));
        }
    };

    let required = match schema.get("required") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(names)) => names
            .iter()
            .map(|name| {
                name.as_str().map(str::to_string).ok_or_else(|| {
                    SchemaError::new(format!("required list for {tool} contains a non-string"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?,
        Some(_) => {
            return Err(SchemaError::new(format!(
                "required list for {tool} is not an array"
            )));
        }
    };

    let empty = Map::new();
    let properties = match schema.get("properties") {
        None | Some(Value::Null) => &empty,
        Some(Value::Object(properties)) => properties,
        Some(_) => {
            return Err(SchemaError::new(format!(
                "properties for {tool} is not an object"
            )));
        }
    };

    properties
        .iter()
        .map(|(name, property)| {
            ParameterSpec::from_json_schema(name, property, required.iter().any(|req| req == name))
        })
        .collect()
}

/// Error type for malformed tool metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaError {
    message: String,
}

impl SchemaError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl fmt::Display for SchemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tool schema error: {}", self.message)
    }
}

impl Error for SchemaError {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn query_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "objectName": { "type": "string", "description": "API name of the object" },
                "fields": { "type": "array", "items": { "type": "string" } },
                "whereClause": { "type": "string" },
                "limit": { "type": "integer", "default": 50 }
            },
            "required": ["objectName", "fields"]
        })
    }

    #[test]
    fn parses_properties_and_required_flags() {
        let tool = ToolDescriptor::from_listing(
            "salesforce_query_records",
            "Query records from Salesforce using SOQL",
            &query_schema(),
            Utc::now(),
        )
        .expect("schema should parse");

        assert_eq!(tool.parameters.len(), 4);
        let object = tool.parameter("objectName").expect("objectName present");
        assert!(object.required);
        assert_eq!(object.param_type, ParamType::String);
        let limit = tool.parameter("limit").expect("limit present");
        assert_eq!(limit.param_type, ParamType::Number);
        assert_eq!(limit.default, Some(json!(50)));
        assert_eq!(tool.required_parameters().count(), 2);
        assert!(tool.has_category(Category::DataOperations));
    }

    #[test]
    fn parameters_keep_declared_order() {
        let tool = ToolDescriptor::from_listing("salesforce_query_records", "", &query_schema(), Utc::now())
            .expect("schema should parse");

        let names: Vec<&str> = tool.parameters.iter().map(|spec| spec.name.as_str()).collect();
        assert_eq!(names, ["objectName", "fields", "whereClause", "limit"]);
        let required: Vec<&str> = tool.required_parameters().map(|spec| spec.name.as_str()).collect();
        assert_eq!(required, ["objectName", "fields"]);
    }

    #[test]
    fn rejects_non_object_schema() {
        let err = ToolDescriptor::from_listing("broken", "", &json!("nope"), Utc::now())
            .expect_err("string schema must fail");
        assert!(err.to_string().contains("not an object"));
    }

    #[test]
    fn rejects_unknown_property_type() {
        let schema = json!({ "properties": { "when": { "type": "datetime" } } });
        assert!(ToolDescriptor::from_listing("odd", "", &schema, Utc::now()).is_err());
    }

    #[test]
    fn nullable_type_lists_pick_the_concrete_type() {
        let property = json!({ "type": ["null", "boolean"] });
        let spec = ParameterSpec::from_json_schema("flag", &property, false).expect("parses");
        assert_eq!(spec.param_type, ParamType::Boolean);
    }

    #[test]
    fn category_round_trips_through_strings() {
        for category in Category::ALL {
            assert_eq!(category.as_str().parse::<Category>(), Ok(category));
        }
        assert_eq!("data-operations".parse::<Category>(), Ok(Category::DataOperations));
        assert!("billing".parse::<Category>().is_err());
    }
}

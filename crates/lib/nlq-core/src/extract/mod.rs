//! Parameter extraction for one candidate tool.
//!
//! Values are resolved per parameter role from the query text, then the schema
//! default, then a configured default. The resulting map goes through the
//! correction rules, type coercion, and validation. Validation never fails the
//! call; it records violations and clears the validity flag.

mod coerce;
mod corrections;
mod recognize;
mod roles;

use std::collections::{BTreeMap, BTreeSet};

use nlq_catalog::text::{split_words, tokenize};
use nlq_catalog::{ParamType, ParameterSpec, ToolDescriptor};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

pub use corrections::{CorrectionRule, CorrectionSet, CorrectionTarget, UnknownCorrectionRule};
pub use recognize::{QueryFeatures, field_name};
pub use roles::ParamRole;

const DML_OPERATIONS: &[&str] = &["insert", "update", "delete", "upsert"];
const NEGATIONS: &[&str] = &["no", "not", "without", "exclude", "excluding", "skip", "dont"];

/// Extraction settings carried in [`crate::PipelineOptions`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExtractionOptions {
    /// Correction rule names, applied in order.
    pub corrections: Vec<String>,
    /// Fallback values keyed by `tool.parameter` or bare `parameter`.
    pub defaults: BTreeMap<String, Value>,
    /// Field lists keyed by object API name, overriding the built-in projections.
    pub projections: BTreeMap<String, Vec<String>>,
}

impl Default for ExtractionOptions {
    fn default() -> Self {
        Self {
            corrections: CorrectionSet::STANDARD.iter().map(|name| (*name).to_string()).collect(),
            defaults: BTreeMap::new(),
            projections: BTreeMap::new(),
        }
    }
}

/// A constraint the extracted arguments fail to meet.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Violation {
    MissingRequired { parameter: String },
    TypeMismatch { parameter: String, expected: ParamType, found: String },
    NotAllowed { parameter: String, value: Value },
}

impl Violation {
    #[must_use]
    pub fn parameter(&self) -> &str {
        match self {
            Self::MissingRequired { parameter }
            | Self::TypeMismatch { parameter, .. }
            | Self::NotAllowed { parameter, .. } => parameter,
        }
    }

    /// Short explanation fit for an end user.
    #[must_use]
    pub fn describe(&self) -> String {
        let name = humanize(self.parameter());
        match self {
            Self::MissingRequired { .. } => format!("the {name} is missing"),
            Self::TypeMismatch { expected, .. } => format!("the {name} should be of type {expected}"),
            Self::NotAllowed { value, .. } => {
                let shown = value.as_str().map_or_else(|| value.to_string(), str::to_string);
                format!("'{shown}' is not an accepted {name}")
            }
        }
    }
}

/// One change made by a correction rule.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Correction {
    pub parameter: String,
    pub rule: String,
    pub before: Option<Value>,
    pub after: Option<Value>,
}

/// Arguments for one tool, with the corrections and violations found on the way.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractedArguments {
    tool: String,
    arguments: Map<String, Value>,
    corrections: Vec<Correction>,
    violations: Vec<Violation>,
    valid: bool,
}

impl ExtractedArguments {
    #[must_use]
    pub fn tool(&self) -> &str {
        &self.tool
    }

    #[must_use]
    pub const fn arguments(&self) -> &Map<String, Value> {
        &self.arguments
    }

    #[must_use]
    pub fn corrections(&self) -> &[Correction] {
        &self.corrections
    }

    #[must_use]
    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.valid
    }

    #[must_use]
    pub fn into_arguments(self) -> Map<String, Value> {
        self.arguments
    }
}

#[derive(Debug, Clone)]
pub struct ParameterExtractor {
    corrections: CorrectionSet,
    defaults: BTreeMap<String, Value>,
    projections: BTreeMap<String, Vec<String>>,
}

impl Default for ParameterExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl ParameterExtractor {
    #[must_use]
    pub fn new() -> Self {
        Self {
            corrections: CorrectionSet::standard(),
            defaults: BTreeMap::new(),
            projections: BTreeMap::new(),
        }
    }

    /// # Errors
    /// Returns `UnknownCorrectionRule` if a configured rule name is not built in.
    pub fn from_options(options: &ExtractionOptions) -> Result<Self, UnknownCorrectionRule> {
        Ok(Self {
            corrections: CorrectionSet::from_names(&options.corrections)?,
            defaults: options.defaults.clone(),
            projections: options.projections.clone(),
        })
    }

    #[must_use]
    pub fn with_corrections(mut self, corrections: CorrectionSet) -> Self {
        self.corrections = corrections;
        self
    }

    #[must_use]
    pub fn with_default(mut self, key: impl Into<String>, value: Value) -> Self {
        self.defaults.insert(key.into(), value);
        self
    }

    #[must_use]
    pub const fn corrections(&self) -> &CorrectionSet {
        &self.corrections
    }

    pub fn extract(&self, query: &str, tool: &ToolDescriptor) -> ExtractedArguments {
        self.extract_with(&QueryFeatures::scan(query), tool)
    }

    /// Extracts arguments from an already scanned query.
    pub fn extract_with(&self, features: &QueryFeatures, tool: &ToolDescriptor) -> ExtractedArguments {
        let roles: Vec<(String, ParamRole)> = tool
            .parameters
            .iter()
            .map(|spec| (spec.name.clone(), ParamRole::of(spec)))
            .collect();

        let mut arguments = Map::new();
        let ordered = roles
            .iter()
            .zip(&tool.parameters)
            .filter(|((_, role), _)| role.resolves_first())
            .chain(roles.iter().zip(&tool.parameters).filter(|((_, role), _)| !role.resolves_first()));
        for ((_, role), spec) in ordered {
            let value = recognized(features, tool, spec, *role)
                .or_else(|| spec.default.clone())
                .or_else(|| self.configured_default(tool, spec));
            if let Some(value) = value.filter(|value| !value.is_null()) {
                arguments.insert(spec.name.clone(), value);
            }
        }

        let corrections = self.apply_corrections(tool, &roles, &mut arguments);
        let violations = validate(tool, &mut arguments);
        let valid = violations.is_empty();

        debug!(
            tool = %tool.name,
            valid,
            corrections = corrections.len(),
            violations = violations.len(),
            "extracted arguments"
        );

        ExtractedArguments {
            tool: tool.name.clone(),
            arguments,
            corrections,
            violations,
            valid,
        }
    }

    fn configured_default(&self, tool: &ToolDescriptor, spec: &ParameterSpec) -> Option<Value> {
        self.defaults
            .get(&format!("{}.{}", tool.name, spec.name))
            .or_else(|| self.defaults.get(&spec.name))
            .cloned()
    }

    fn apply_corrections(
        &self,
        tool: &ToolDescriptor,
        roles: &[(String, ParamRole)],
        arguments: &mut Map<String, Value>,
    ) -> Vec<Correction> {
        let mut applied = Vec::new();
        for rule in self.corrections.rules() {
            let before = arguments.clone();
            let mut target = CorrectionTarget {
                tool,
                arguments: &mut *arguments,
                roles,
                projections: &self.projections,
            };
            rule.apply(&mut target);

            let keys: BTreeSet<&String> = before.keys().chain(arguments.keys()).collect();
            for key in keys {
                let (old, new) = (before.get(key), arguments.get(key));
                if old != new {
                    debug!(tool = %tool.name, parameter = %key, rule = rule.name(), "corrected argument");
                    applied.push(Correction {
                        parameter: key.clone(),
                        rule: rule.name().to_string(),
                        before: old.cloned(),
                        after: new.cloned(),
                    });
                }
            }
        }
        applied
    }
}

fn recognized(features: &QueryFeatures, tool: &ToolDescriptor, spec: &ParameterSpec, role: ParamRole) -> Option<Value> {
    let text = |value: &String| Value::String(value.clone());
    let list = |items: Vec<String>| Value::Array(items.into_iter().map(Value::String).collect());

    match role {
        ParamRole::ObjectName => features.object.as_ref().map(text),
        ParamRole::FieldList if is_aggregate_tool(tool) => {
            let select = features.aggregate_select();
            (!select.is_empty()).then(|| list(select))
        }
        ParamRole::FieldList => features.fields.clone().map(list),
        ParamRole::Filter => features.filter_clause().map(Value::String),
        ParamRole::Limit => features.limit.map(Value::from),
        ParamRole::OrderBy => features.order_by.as_ref().map(text),
        ParamRole::GroupBy => features.group_by.clone().map(|field| list(vec![field])),
        ParamRole::SearchTerm => features.search_term.as_ref().map(text),
        ParamRole::Operation => operation_value(features, spec),
        ParamRole::CodeName => features.code_name.as_ref().map(text),
        ParamRole::Generic => generic_value(features, spec),
    }
}

fn is_aggregate_tool(tool: &ToolDescriptor) -> bool {
    tokenize(&tool.name).iter().any(|token| token == "aggregate")
}

fn operation_value(features: &QueryFeatures, spec: &ParameterSpec) -> Option<Value> {
    let allowed: Vec<&str> = spec.allowed_values.iter().filter_map(Value::as_str).collect();
    if allowed.is_empty() {
        return features
            .operations
            .iter()
            .find(|(_, canonical)| DML_OPERATIONS.contains(canonical))
            .map(|(_, canonical)| Value::String((*canonical).to_string()));
    }
    features.operations.iter().find_map(|(word, canonical)| {
        allowed
            .iter()
            .find(|value| value.eq_ignore_ascii_case(word) || value.eq_ignore_ascii_case(canonical))
            .map(|value| Value::String((*value).to_string()))
    })
}

/// Values for parameters with no recognized role: `name = value` assignments,
/// mentioned enum members, and boolean flags named in the query.
fn generic_value(features: &QueryFeatures, spec: &ParameterSpec) -> Option<Value> {
    let words = split_words(&spec.name);
    if words.is_empty() {
        return None;
    }

    let name_pattern = words.iter().map(|word| regex::escape(word)).collect::<Vec<_>>().join(r"[\s_]*");
    let assignment = format!(r#"(?i)\b{name_pattern}\s*(?:=|:|\bis\b|\bto\b)\s*('[^']*'|"[^"]*"|[^\s,;]+)"#);
    if let Some(caps) = Regex::new(&assignment).ok().and_then(|regex| regex.captures(&features.text)) {
        let raw = caps[1].trim_matches(|ch: char| ch == '\'' || ch == '"');
        return Some(Value::String(raw.to_string()));
    }

    if let Some(member) = spec.allowed_values.iter().find(|value| {
        value.as_str().is_some_and(|member| {
            let member = tokenize(member);
            !member.is_empty()
                && features
                    .tokens
                    .windows(member.len())
                    .any(|window| window == member.as_slice())
        })
    }) {
        return Some(member.clone());
    }

    if spec.param_type == ParamType::Boolean {
        let flag = tokenize(&spec.name).pop()?;
        let pos = features.tokens.iter().position(|token| *token == flag)?;
        let negated = pos
            .checked_sub(1)
            .and_then(|prev| features.tokens.get(prev))
            .is_some_and(|prev| NEGATIONS.contains(&prev.as_str()));
        return Some(Value::Bool(!negated));
    }

    None
}

/// Coerces present values, checks enums, and reports missing required parameters.
fn validate(tool: &ToolDescriptor, arguments: &mut Map<String, Value>) -> Vec<Violation> {
    let mut violations = Vec::new();
    for spec in &tool.parameters {
        let Some(value) = arguments.remove(&spec.name) else {
            if spec.required {
                violations.push(Violation::MissingRequired {
                    parameter: spec.name.clone(),
                });
            }
            continue;
        };

        let value = match coerce::coerce(value, spec.param_type) {
            Ok(value) => value,
            Err(original) => {
                violations.push(Violation::TypeMismatch {
                    parameter: spec.name.clone(),
                    expected: spec.param_type,
                    found: json_type(&original).to_string(),
                });
                arguments.insert(spec.name.clone(), original);
                continue;
            }
        };

        let value = match allowed_member(spec, value) {
            Ok(value) => value,
            Err(value) => {
                violations.push(Violation::NotAllowed {
                    parameter: spec.name.clone(),
                    value: value.clone(),
                });
                value
            }
        };
        arguments.insert(spec.name.clone(), value);
    }
    violations
}

/// Matches `value` against the enum, accepting a case-insensitive string match.
fn allowed_member(spec: &ParameterSpec, value: Value) -> Result<Value, Value> {
    if spec.allowed_values.is_empty() || spec.allowed_values.contains(&value) {
        return Ok(value);
    }
    let Some(text) = value.as_str() else {
        return Err(value);
    };
    spec.allowed_values
        .iter()
        .find(|member| member.as_str().is_some_and(|member| member.eq_ignore_ascii_case(text)))
        .cloned()
        .ok_or(value)
}

const fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn humanize(name: &str) -> String {
    split_words(name)
        .iter()
        .map(|word| word.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn tool(name: &str, schema: Value) -> ToolDescriptor {
        ToolDescriptor::from_listing(name, "", &schema, Utc::now()).expect("valid schema")
    }

    fn query_tool() -> ToolDescriptor {
        tool(
            "salesforce_query_records",
            json!({
                "type": "object",
                "properties": {
                    "objectName": { "type": "string" },
                    "fields": { "type": "array", "items": { "type": "string" } },
                    "whereClause": { "type": "string" },
                    "orderBy": { "type": "string" },
                    "limit": { "type": "number" }
                },
                "required": ["objectName", "fields"]
            }),
        )
    }

    #[test]
    fn resolves_qualified_read_query() {
        let extracted = ParameterExtractor::new().extract("Show me all Technology accounts", &query_tool());
        assert!(extracted.is_valid(), "{:?}", extracted.violations());
        let arguments = extracted.arguments();
        assert_eq!(arguments["objectName"], json!("Account"));
        assert_eq!(arguments["whereClause"], json!("Industry = 'Technology'"));
        assert_eq!(
            arguments["fields"],
            json!(["Id", "Name", "Industry", "Type", "Phone", "Website"])
        );
        assert!(!arguments.contains_key("limit"));
        assert_eq!(extracted.corrections().len(), 1);
        assert_eq!(extracted.corrections()[0].rule, "default_projection");
        assert_eq!(extracted.corrections()[0].before, None);
    }

    #[test]
    fn missing_required_parameter_is_never_valid() {
        let extracted = ParameterExtractor::new().extract("show me everything", &query_tool());
        assert!(!extracted.is_valid());
        assert_eq!(
            extracted.violations(),
            [Violation::MissingRequired {
                parameter: "objectName".to_string()
            }]
        );
        assert_eq!(extracted.violations()[0].describe(), "the object name is missing");
    }

    #[test]
    fn extraction_is_idempotent() {
        let extractor = ParameterExtractor::new();
        let tool = query_tool();
        let query = "top 10 contacts where LastName = Smith sorted by created date desc";
        let first = extractor.extract(query, &tool);
        assert_eq!(first, extractor.extract(query, &tool));
        assert_eq!(first.arguments()["limit"], json!(10));
        assert_eq!(first.arguments()["whereClause"], json!("LastName = 'Smith'"));
        assert_eq!(first.arguments()["orderBy"], json!("CreatedDate DESC"));
    }

    #[test]
    fn configured_defaults_fill_gaps() {
        let extractor = ParameterExtractor::new().with_default("salesforce_query_records.objectName", json!("Lead"));
        let extracted = extractor.extract("show me everything", &query_tool());
        assert!(extracted.is_valid());
        assert_eq!(extracted.arguments()["objectName"], json!("Lead"));
    }

    #[test]
    fn aggregate_tools_get_select_expressions() {
        let aggregate = tool(
            "salesforce_aggregate_query",
            json!({
                "properties": {
                    "objectName": { "type": "string" },
                    "selectFields": { "type": "array" },
                    "groupByFields": { "type": "array" }
                },
                "required": ["objectName", "selectFields", "groupByFields"]
            }),
        );
        let extracted = ParameterExtractor::new().extract("how many cases per status", &aggregate);
        assert!(extracted.is_valid());
        assert_eq!(extracted.arguments()["selectFields"], json!(["Status", "COUNT(Id)"]));
        assert_eq!(extracted.arguments()["groupByFields"], json!(["Status"]));

        let extracted = ParameterExtractor::new().extract("Show me all Technology accounts", &aggregate);
        assert!(!extracted.is_valid());
    }

    #[test]
    fn operations_follow_enums() {
        let dml = tool(
            "salesforce_dml_records",
            json!({
                "properties": {
                    "operation": { "type": "string", "enum": ["insert", "update", "delete", "upsert"] },
                    "objectName": { "type": "string" }
                },
                "required": ["operation", "objectName"]
            }),
        );
        let extracted = ParameterExtractor::new().extract("create a new contact", &dml);
        assert_eq!(extracted.arguments()["operation"], json!("insert"));

        let logs = tool(
            "salesforce_manage_debug_logs",
            json!({
                "properties": {
                    "operation": { "type": "string", "enum": ["enable", "disable", "retrieve"] },
                    "username": { "type": "string" },
                    "includeBody": { "type": "boolean" }
                },
                "required": ["operation", "username"]
            }),
        );
        let extracted =
            ParameterExtractor::new().extract("show debug logs for username = jo@example.com without body", &logs);
        assert!(extracted.is_valid(), "{:?}", extracted.violations());
        assert_eq!(extracted.arguments()["operation"], json!("retrieve"));
        assert_eq!(extracted.arguments()["username"], json!("jo@example.com"));
        assert_eq!(extracted.arguments()["includeBody"], json!(false));
    }

    #[test]
    fn enum_values_match_case_insensitively() {
        let spec = ParameterSpec {
            allowed_values: vec![json!("DEBUG"), json!("INFO")],
            ..ParameterSpec::new("logLevel", ParamType::String)
        };
        assert_eq!(allowed_member(&spec, json!("debug")), Ok(json!("DEBUG")));
        assert_eq!(allowed_member(&spec, json!("trace")), Err(json!("trace")));
    }

    #[test]
    fn reports_type_mismatches() {
        let strict = tool(
            "salesforce_describe_object",
            json!({ "properties": { "objectName": { "type": "object" } } }),
        );
        let extracted = ParameterExtractor::new().extract("describe the account object", &strict);
        assert!(!extracted.is_valid());
        assert!(matches!(
            extracted.violations()[0],
            Violation::TypeMismatch { expected: ParamType::Object, .. }
        ));
    }

    #[test]
    fn unknown_correction_names_are_rejected() {
        let options = ExtractionOptions {
            corrections: vec!["capitalize_object".to_string(), "rot13".to_string()],
            ..ExtractionOptions::default()
        };
        assert!(ParameterExtractor::from_options(&options).is_err());
    }
}

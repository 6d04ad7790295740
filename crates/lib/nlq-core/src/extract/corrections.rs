//! Auto-correction rules applied to extracted arguments before validation.
//!
//! Rules run in order against the whole argument map. The extractor diffs the
//! map around each rule and records every changed parameter, so rules only
//! need to rewrite values.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::{error::Error, fmt};

use nlq_catalog::schema::{MINIMAL_PROJECTION, default_projection, object_api_name};
use nlq_catalog::text::{singularize, tokenize};
use nlq_catalog::{ParamType, ToolDescriptor};
use serde_json::{Map, Value};

use super::roles::ParamRole;

/// Mutable view of one tool's arguments handed to each rule.
pub struct CorrectionTarget<'a> {
    pub tool: &'a ToolDescriptor,
    pub arguments: &'a mut Map<String, Value>,
    pub(super) roles: &'a [(String, ParamRole)],
    pub(super) projections: &'a BTreeMap<String, Vec<String>>,
}

impl CorrectionTarget<'_> {
    /// Names of the tool's parameters that play `role`, in declaration order.
    #[must_use]
    pub fn parameters_with_role(&self, role: ParamRole) -> Vec<String> {
        self.roles
            .iter()
            .filter(|(_, candidate)| *candidate == role)
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// The object the arguments currently target, if any.
    #[must_use]
    pub fn object_name(&self) -> Option<String> {
        self.parameters_with_role(ParamRole::ObjectName)
            .iter()
            .find_map(|name| self.arguments.get(name).and_then(Value::as_str))
            .map(str::to_string)
    }

    /// Configured projection for `object`, else the built-in default.
    #[must_use]
    pub fn projection_for(&self, object: &str) -> Vec<String> {
        self.projections
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(object))
            .map_or_else(
                || default_projection(object).iter().map(|field| (*field).to_string()).collect(),
                |(_, fields)| fields.clone(),
            )
    }

    fn rewrite_strings(&mut self, roles: &[ParamRole], mut fix: impl FnMut(&str) -> String) {
        for role in roles {
            for name in self.parameters_with_role(*role) {
                if let Some(Value::String(text)) = self.arguments.get_mut(&name) {
                    *text = fix(text);
                }
            }
        }
    }
}

/// One named, deterministic rewrite of extracted arguments.
pub trait CorrectionRule: Send + Sync {
    fn name(&self) -> &str;

    fn apply(&self, target: &mut CorrectionTarget<'_>);
}

/// Unknown rule name in a correction list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownCorrectionRule(pub String);

impl fmt::Display for UnknownCorrectionRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown correction rule: {}", self.0)
    }
}

impl Error for UnknownCorrectionRule {}

/// Ordered set of correction rules.
#[derive(Clone)]
pub struct CorrectionSet {
    rules: Vec<Arc<dyn CorrectionRule>>,
}

impl fmt::Debug for CorrectionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

impl Default for CorrectionSet {
    fn default() -> Self {
        Self::standard()
    }
}

impl CorrectionSet {
    /// Built-in rule names in their standard order.
    pub const STANDARD: &'static [&'static str] = &[
        NormalizeQuotes::NAME,
        BalanceQuotes::NAME,
        QuoteBareValues::NAME,
        TrimTrailingCommas::NAME,
        CapitalizeObject::NAME,
        DefaultProjection::NAME,
    ];

    #[must_use]
    pub fn standard() -> Self {
        Self {
            rules: Self::STANDARD.iter().filter_map(|name| builtin(name)).collect(),
        }
    }

    #[must_use]
    pub const fn empty() -> Self {
        Self { rules: Vec::new() }
    }

    /// Builds a set from built-in rule names, keeping the given order.
    ///
    /// # Errors
    /// Returns `UnknownCorrectionRule` for a name with no built-in rule.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self, UnknownCorrectionRule> {
        let rules = names
            .iter()
            .map(|name| builtin(name.as_ref()).ok_or_else(|| UnknownCorrectionRule(name.as_ref().to_string())))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rules })
    }

    /// Appends a custom rule after the existing ones.
    #[must_use]
    pub fn with_rule(mut self, rule: Arc<dyn CorrectionRule>) -> Self {
        self.rules.push(rule);
        self
    }

    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.rules.iter().map(|rule| rule.name()).collect()
    }

    pub(super) fn rules(&self) -> &[Arc<dyn CorrectionRule>] {
        &self.rules
    }
}

fn builtin(name: &str) -> Option<Arc<dyn CorrectionRule>> {
    let rule: Arc<dyn CorrectionRule> = match name {
        NormalizeQuotes::NAME => Arc::new(NormalizeQuotes),
        BalanceQuotes::NAME => Arc::new(BalanceQuotes),
        QuoteBareValues::NAME => Arc::new(QuoteBareValues),
        TrimTrailingCommas::NAME => Arc::new(TrimTrailingCommas),
        CapitalizeObject::NAME => Arc::new(CapitalizeObject),
        DefaultProjection::NAME => Arc::new(DefaultProjection),
        _ => return None,
    };
    Some(rule)
}

const CLAUSE_ROLES: &[ParamRole] = &[ParamRole::Filter];

/// Curly and double quotes in clauses become single quotes.
struct NormalizeQuotes;

impl NormalizeQuotes {
    const NAME: &'static str = "normalize_quotes";
}

impl CorrectionRule for NormalizeQuotes {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn apply(&self, target: &mut CorrectionTarget<'_>) {
        target.rewrite_strings(CLAUSE_ROLES, |clause| {
            clause.replace(['\u{2018}', '\u{2019}', '\u{201c}', '\u{201d}', '"'], "'")
        });
    }
}

/// Closes a dangling single quote at the end of a clause.
struct BalanceQuotes;

impl BalanceQuotes {
    const NAME: &'static str = "balance_quotes";
}

impl CorrectionRule for BalanceQuotes {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn apply(&self, target: &mut CorrectionTarget<'_>) {
        target.rewrite_strings(CLAUSE_ROLES, |clause| {
            let unescaped = clause.matches('\'').count() - clause.matches("\\'").count();
            if unescaped % 2 == 1 {
                format!("{}'", clause.trim_end())
            } else {
                clause.to_string()
            }
        });
    }
}

/// Quotes bare text after `=` and `!=` in clauses: `Industry = Technology`
/// becomes `Industry = 'Technology'`.
struct QuoteBareValues;

impl QuoteBareValues {
    const NAME: &'static str = "quote_bare_values";
}

impl CorrectionRule for QuoteBareValues {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn apply(&self, target: &mut CorrectionTarget<'_>) {
        target.rewrite_strings(CLAUSE_ROLES, quote_bare_values);
    }
}

/// Scans a clause and quotes each bare comparison value.
pub(super) fn quote_bare_values(clause: &str) -> String {
    let mut out = String::with_capacity(clause.len() + 8);
    let mut rest = clause;

    while let Some(eq) = rest.find('=') {
        let (head, tail) = rest.split_at(eq + 1);
        out.push_str(head);

        let spaces = tail.len() - tail.trim_start().len();
        out.push_str(&tail[..spaces]);
        let value_start = &tail[spaces..];

        if let Some(quoted) = value_start.strip_prefix('\'') {
            let close = quoted.find('\'').map_or(value_start.len(), |pos| pos + 2);
            out.push_str(&value_start[..close]);
            rest = &value_start[close..];
            continue;
        }
        if value_start.starts_with(['(', ':']) || value_start.starts_with(|ch: char| ch.is_ascii_digit() || ch == '-') {
            rest = value_start;
            continue;
        }

        let end = value_end(value_start);
        let (value, after) = value_start.split_at(end);
        let trimmed = value.trim_end();
        if trimmed.is_empty() || is_literal(trimmed) {
            out.push_str(value);
        } else {
            out.push('\'');
            out.push_str(trimmed);
            out.push('\'');
            out.push_str(&value[trimmed.len()..]);
        }
        rest = after;
    }
    out.push_str(rest);
    out
}

/// Byte offset where a bare value ends: the next `AND`/`OR` keyword, closing
/// parenthesis, or comparison operator.
fn value_end(text: &str) -> usize {
    let upper = text.to_ascii_uppercase();
    let mut end = text.len();
    for stop in [" AND ", " OR ", ")", "!", "<", ">", "="] {
        if let Some(pos) = upper.find(stop) {
            end = end.min(pos);
        }
    }
    end
}

fn is_literal(value: &str) -> bool {
    let upper = value.to_ascii_uppercase();
    if matches!(upper.as_str(), "NULL" | "TRUE" | "FALSE") {
        return true;
    }
    // Date literals such as TODAY or LAST_N_DAYS:30.
    value.len() > 1
        && value.contains(|ch: char| ch.is_ascii_uppercase())
        && value
            .chars()
            .all(|ch| ch.is_ascii_uppercase() || ch.is_ascii_digit() || ch == '_' || ch == ':')
}

/// Drops trailing commas from clauses and empty entries from field lists.
struct TrimTrailingCommas;

impl TrimTrailingCommas {
    const NAME: &'static str = "trim_trailing_commas";
}

impl CorrectionRule for TrimTrailingCommas {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn apply(&self, target: &mut CorrectionTarget<'_>) {
        let roles = [ParamRole::Filter, ParamRole::FieldList, ParamRole::OrderBy, ParamRole::GroupBy];
        target.rewrite_strings(&roles, |text| {
            text.trim_end().trim_end_matches(',').trim_end().to_string()
        });

        for role in [ParamRole::FieldList, ParamRole::GroupBy] {
            for name in target.parameters_with_role(role) {
                if let Some(Value::Array(items)) = target.arguments.get_mut(&name) {
                    let cleaned: Vec<Value> = items
                        .iter()
                        .filter_map(|item| match item {
                            Value::String(text) => {
                                let text = text.trim().trim_matches(',').trim();
                                (!text.is_empty()).then(|| Value::String(text.to_string()))
                            }
                            other => Some(other.clone()),
                        })
                        .collect();
                    *items = cleaned;
                }
            }
        }
    }
}

/// Maps object nouns to API names and capitalizes the rest.
struct CapitalizeObject;

impl CapitalizeObject {
    const NAME: &'static str = "capitalize_object";
}

impl CorrectionRule for CapitalizeObject {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn apply(&self, target: &mut CorrectionTarget<'_>) {
        target.rewrite_strings(&[ParamRole::ObjectName], |object| {
            let object = object.trim();
            if object.to_ascii_lowercase().ends_with("__c") {
                return object.to_string();
            }
            if let Some(api) = object_api_name(&singularize(&object.to_ascii_lowercase())) {
                return api.to_string();
            }
            let mut chars = object.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_uppercase().chain(chars).collect()
            })
        });
    }
}

/// Fills an empty or missing field list of a query tool with the object's
/// default projection.
struct DefaultProjection;

impl DefaultProjection {
    const NAME: &'static str = "default_projection";
}

impl CorrectionRule for DefaultProjection {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn apply(&self, target: &mut CorrectionTarget<'_>) {
        if !is_query_tool(target.tool) {
            return;
        }
        let object = target.object_name();
        for name in target.parameters_with_role(ParamRole::FieldList) {
            let empty = match target.arguments.get(&name) {
                None | Some(Value::Null) => true,
                Some(Value::Array(items)) => items.is_empty(),
                Some(Value::String(text)) => text.trim().is_empty(),
                Some(_) => false,
            };
            if !empty {
                continue;
            }
            let fields: Vec<String> = object.as_deref().map_or_else(
                || MINIMAL_PROJECTION.iter().map(|field| (*field).to_string()).collect(),
                |object| target.projection_for(object),
            );
            let value = match target.tool.parameter(&name).map(|spec| spec.param_type) {
                Some(ParamType::String) => Value::String(fields.join(", ")),
                _ => Value::Array(fields.into_iter().map(Value::String).collect()),
            };
            target.arguments.insert(name, value);
        }
    }
}

/// Plain record queries; aggregate tools need explicit select expressions.
fn is_query_tool(tool: &ToolDescriptor) -> bool {
    let tokens = tokenize(&tool.name);
    tokens.iter().any(|token| token == "query") && !tokens.iter().any(|token| token == "aggregate")
}

//! Natural-language rendering of raw tool output.
//!
//! The formatter only ever reads the payload. Record identifiers, attribute
//! blocks and URLs are never echoed back.

use std::sync::LazyLock;

use nlq_catalog::{Category, ToolDescriptor};
use regex::Regex;
use serde_json::{Map, Value};

use crate::options::DEFAULT_SAMPLE_SIZE;

const NO_MATCHES: &str = "No matching records were found.";
const TEXT_LIMIT: usize = 1200;
const NOTABLE_FIELDS: usize = 5;

/// Keys tried, in order, for a record's display label.
const LABEL_KEYS: &[&str] = &[
    "Name",
    "Subject",
    "Title",
    "DeveloperName",
    "MasterLabel",
    "Label",
    "CaseNumber",
    "Email",
    "name",
    "label",
    "title",
];

const HIDDEN_KEYS: &[&str] = &["Id", "id", "attributes", "url", "Url"];

const AFFECTED_KEYS: &[&str] = &[
    "recordsAffected",
    "affectedRecords",
    "affectedRows",
    "totalAffected",
    "processed",
];

static RECORD_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[0-9a][0-9A-Za-z]{14}(?:[0-9A-Za-z]{3})?\b").expect("static pattern compiles"));
static RETURNED_COUNT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\breturned\s+(\d+)\s+records?\b").expect("static pattern compiles"));
static RECORD_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*Record\s+\d+\s*:\s*$").expect("static pattern compiles"));
static RECORD_FIELD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*([A-Za-z_][A-Za-z0-9_.]*)\s*:\s*(.*?)\s*$").expect("static pattern compiles"));

/// How a payload is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    Empty,
    Records,
    Schema,
    Mutation,
    Text,
    Scalar,
    Document,
}

#[derive(Debug, Clone, Copy)]
pub struct ResponseFormatter {
    sample_size: usize,
}

impl Default for ResponseFormatter {
    fn default() -> Self {
        Self::new()
    }
}

impl ResponseFormatter {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            sample_size: DEFAULT_SAMPLE_SIZE,
        }
    }

    #[must_use]
    pub const fn with_sample_size(mut self, sample_size: usize) -> Self {
        self.sample_size = sample_size;
        self
    }

    /// Renders `raw` as a short sentence or paragraph.
    #[must_use]
    pub fn format(&self, tool: &ToolDescriptor, raw: &Value) -> String {
        // Tool servers often return JSON serialized inside a text block.
        if let Value::String(text) = raw
            && let Ok(parsed @ (Value::Object(_) | Value::Array(_))) = serde_json::from_str::<Value>(text.trim())
        {
            return self.format(tool, &parsed);
        }

        match shape(raw) {
            Shape::Empty => NO_MATCHES.to_string(),
            Shape::Records => self.records(tool, raw),
            Shape::Schema => schema(raw),
            Shape::Mutation => mutation(raw),
            Shape::Text => {
                let body = raw.as_str().unwrap_or_default();
                text_records(body).map_or_else(|| text(body), |records| self.records(tool, &records))
            }
            Shape::Scalar => format!("The operation returned {raw}."),
            Shape::Document => document(raw),
        }
    }

    fn records(&self, tool: &ToolDescriptor, raw: &Value) -> String {
        let (items, total) = match raw {
            Value::Array(items) => (items.as_slice(), items.len()),
            Value::Object(map) => {
                let items = map.get("records").and_then(Value::as_array).map_or(&[][..], Vec::as_slice);
                let total = map
                    .get("totalSize")
                    .and_then(Value::as_u64)
                    .and_then(|total| usize::try_from(total).ok())
                    .unwrap_or(items.len());
                (items, total)
            }
            _ => (&[][..], 0),
        };
        if total == 0 {
            return NO_MATCHES.to_string();
        }

        if items.iter().any(is_aggregate_row) {
            return self.aggregate_rows(items);
        }

        let noun = if tool.has_category(Category::ObjectDiscovery) {
            "object".to_string()
        } else {
            items
                .iter()
                .find_map(|item| item.pointer("/attributes/type").and_then(Value::as_str))
                .map_or_else(|| "record".to_string(), |kind| format!("{kind} record"))
        };
        let noun = plural(&noun, total);

        let labels: Vec<String> = items
            .iter()
            .filter_map(label)
            .take(self.sample_size)
            .collect();

        if labels.is_empty() {
            return format!("Found {total} {noun}.");
        }
        if total > labels.len() {
            format!("Found {total} {noun}, including {}.", join_words(&labels))
        } else {
            format!("Found {total} {noun}: {}.", join_words(&labels))
        }
    }

    fn aggregate_rows(&self, rows: &[Value]) -> String {
        let groups: Vec<String> = rows
            .iter()
            .filter_map(Value::as_object)
            .map(|row| {
                let keys: Vec<&str> = row
                    .iter()
                    .filter(|(key, _)| !is_hidden(key) && !is_expression(key))
                    .filter_map(|(_, value)| scalar_text(value))
                    .collect();
                let measures: Vec<String> = row
                    .iter()
                    .filter(|(key, _)| is_expression(key))
                    .filter_map(|(_, value)| value.as_f64().map(format_number))
                    .collect();
                match (keys.is_empty(), measures.is_empty()) {
                    (true, _) => measures.join(", "),
                    (false, true) => keys.join(" / "),
                    (false, false) => format!("{} ({})", keys.join(" / "), measures.join(", ")),
                }
            })
            .filter(|group| !group.is_empty())
            .collect();

        match groups.as_slice() {
            [] => NO_MATCHES.to_string(),
            [single] if rows.len() == 1 && !single.contains('(') => format!("The result is {single}."),
            _ => {
                let shown: Vec<String> = groups.iter().take(self.sample_size.max(1)).cloned().collect();
                let count = plural("group", groups.len());
                if groups.len() > shown.len() {
                    format!("Found {} {count}, including {}.", groups.len(), join_words(&shown))
                } else {
                    format!("Found {} {count}: {}.", groups.len(), join_words(&shown))
                }
            }
        }
    }
}

fn shape(raw: &Value) -> Shape {
    match raw {
        Value::Null => Shape::Empty,
        Value::String(text) if text.trim().is_empty() => Shape::Empty,
        Value::String(_) => Shape::Text,
        Value::Bool(_) | Value::Number(_) => Shape::Scalar,
        Value::Array(items) if items.is_empty() => Shape::Empty,
        Value::Array(items) if items.iter().all(is_acknowledgement) => Shape::Mutation,
        Value::Array(_) => Shape::Records,
        Value::Object(map) if map.is_empty() => Shape::Empty,
        Value::Object(map) if map.get("records").is_some_and(Value::is_array) => Shape::Records,
        Value::Object(map) if map.get("fields").is_some_and(Value::is_array) => Shape::Schema,
        Value::Object(map)
            if is_acknowledgement(raw) || AFFECTED_KEYS.iter().any(|key| map.contains_key(*key)) =>
        {
            Shape::Mutation
        }
        Value::Object(_) => Shape::Document,
    }
}

fn schema(raw: &Value) -> String {
    let fields = raw
        .get("fields")
        .and_then(Value::as_array)
        .map_or(&[][..], Vec::as_slice);
    let object = raw
        .get("label")
        .or_else(|| raw.get("name"))
        .and_then(Value::as_str)
        .map_or_else(|| "The object".to_string(), str::to_string);
    if fields.is_empty() {
        return format!("{object} has no fields.");
    }

    let names: Vec<(&str, bool)> = fields
        .iter()
        .filter_map(|field| {
            let name = field.get("name").and_then(Value::as_str)?;
            let custom = field.get("custom").and_then(Value::as_bool).unwrap_or(false) || name.ends_with("__c");
            Some((name, custom))
        })
        .filter(|(name, _)| !is_hidden(name))
        .collect();
    let mut notable: Vec<String> = names
        .iter()
        .filter(|(_, custom)| *custom)
        .chain(names.iter().filter(|(_, custom)| !*custom))
        .take(NOTABLE_FIELDS)
        .map(|(name, _)| (*name).to_string())
        .collect();
    notable.dedup();

    let custom_count = names.iter().filter(|(_, custom)| *custom).count();
    let counted = format!("{object} has {} {}", fields.len(), plural("field", fields.len()));
    let mut sentence = if notable.is_empty() {
        format!("{counted}.")
    } else {
        format!("{counted}, including {}.", join_words(&notable))
    };
    match custom_count {
        0 => {}
        1 => sentence.push_str(" 1 of them is custom."),
        count => sentence.push_str(&format!(" {count} of them are custom.")),
    }
    sentence
}

fn mutation(raw: &Value) -> String {
    match raw {
        Value::Array(items) => {
            let succeeded = items.iter().filter(|item| succeeded(item)).count();
            let failed = items.len() - succeeded;
            let mut sentence = if succeeded > 0 {
                format!("Successfully processed {succeeded} {}.", plural("record", succeeded))
            } else {
                "No records were changed.".to_string()
            };
            if failed > 0 {
                sentence.push_str(&format!(" {failed} {} could not be processed.", plural("record", failed)));
            }
            sentence
        }
        Value::Object(map) => {
            if let Some(affected) = AFFECTED_KEYS
                .iter()
                .find_map(|key| map.get(*key).and_then(Value::as_u64))
            {
                return format!("The operation affected {affected} {}.", plural("record", usize::try_from(affected).unwrap_or(usize::MAX)));
            }
            if succeeded(raw) {
                "The operation completed successfully.".to_string()
            } else {
                "The operation did not succeed.".to_string()
            }
        }
        _ => "The operation completed.".to_string(),
    }
}

fn document(raw: &Value) -> String {
    let Some(map) = raw.as_object() else {
        return NO_MATCHES.to_string();
    };
    let entries: Vec<String> = visible_entries(map)
        .take(NOTABLE_FIELDS)
        .map(|(key, value)| format!("{key}: {value}"))
        .collect();
    if entries.is_empty() {
        "The operation completed.".to_string()
    } else {
        format!("The result has {}.", join_words(&entries))
    }
}

fn text(raw: &str) -> String {
    let trimmed = raw.trim();
    let lower = trimmed.to_ascii_lowercase();
    if trimmed.is_empty()
        || lower.contains("returned 0 records")
        || lower.contains("totalsize: 0")
        || lower.starts_with("no records")
        || lower == "[]"
    {
        return NO_MATCHES.to_string();
    }

    let scrubbed = RECORD_ID.replace_all(trimmed, |caps: &regex::Captures<'_>| {
        let token = &caps[0];
        let looks_like_id = token.chars().any(|ch| ch.is_ascii_digit()) && token.chars().any(|ch| ch.is_ascii_alphabetic());
        if looks_like_id { "[id]".to_string() } else { token.to_string() }
    });

    if scrubbed.chars().count() <= TEXT_LIMIT {
        return scrubbed.into_owned();
    }
    let cut: String = scrubbed.chars().take(TEXT_LIMIT).collect();
    let cut = cut.rfind(char::is_whitespace).map_or(cut.as_str(), |pos| &cut[..pos]);
    format!("{}...", cut.trim_end())
}

/// Parses the `Record 1:` / indented `Field: value` listing some tool servers
/// return as text into a `{totalSize, records}` object.
fn text_records(body: &str) -> Option<Value> {
    let mut records: Vec<Map<String, Value>> = Vec::new();
    for line in body.lines() {
        if RECORD_HEADER.is_match(line) {
            records.push(Map::new());
            continue;
        }
        let (Some(record), Some(caps)) = (records.last_mut(), RECORD_FIELD.captures(line)) else {
            continue;
        };
        let value = &caps[2];
        if !value.is_empty() && value != "null" {
            record.insert(caps[1].to_string(), Value::String(value.to_string()));
        }
    }
    if records.is_empty() {
        return None;
    }

    let total = RETURNED_COUNT
        .captures(body)
        .and_then(|caps| caps[1].parse::<usize>().ok())
        .unwrap_or(records.len())
        .max(records.len());
    let records: Vec<Value> = records.into_iter().map(Value::Object).collect();
    Some(serde_json::json!({ "totalSize": total, "records": records }))
}

fn label(item: &Value) -> Option<String> {
    match item {
        Value::String(text) if !text.trim().is_empty() && !is_record_id(text) => Some(text.trim().to_string()),
        Value::Object(map) => LABEL_KEYS
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str).filter(|text| !text.trim().is_empty()))
            .map(str::to_string)
            .or_else(|| {
                visible_entries(map)
                    .find(|(_, value)| value.parse::<f64>().is_err())
                    .map(|(_, value)| value)
            }),
        _ => None,
    }
}

/// Scalar entries that are safe to show: no identifiers, URLs, or nested blocks.
fn visible_entries(map: &Map<String, Value>) -> impl Iterator<Item = (&str, String)> {
    map.iter()
        .filter(|(key, _)| !is_hidden(key))
        .filter_map(|(key, value)| scalar_text(value).map(|text| (key.as_str(), text.to_string())))
        .filter(|(_, text)| !text.is_empty() && !is_record_id(text))
}

fn scalar_text(value: &Value) -> Option<&str> {
    value.as_str()
}

fn is_hidden(key: &str) -> bool {
    HIDDEN_KEYS.contains(&key) || (key.len() > 2 && key.ends_with("Id"))
}

fn is_expression(key: &str) -> bool {
    key.strip_prefix("expr")
        .is_some_and(|rest| !rest.is_empty() && rest.chars().all(|ch| ch.is_ascii_digit()))
}

fn is_aggregate_row(item: &Value) -> bool {
    item.as_object()
        .is_some_and(|row| row.keys().any(|key| is_expression(key)))
}

fn is_acknowledgement(item: &Value) -> bool {
    item.as_object().is_some_and(|map| {
        map.get("success").is_some_and(Value::is_boolean)
            && map
                .keys()
                .all(|key| matches!(key.as_str(), "id" | "Id" | "success" | "errors" | "created"))
    })
}

fn succeeded(item: &Value) -> bool {
    item.get("success").and_then(Value::as_bool).unwrap_or(false)
}

/// Salesforce-style 15/18 character identifiers.
fn is_record_id(text: &str) -> bool {
    RECORD_ID.find(text).is_some_and(|found| found.len() == text.len())
        && text.chars().any(|ch| ch.is_ascii_digit())
        && text.chars().any(|ch| ch.is_ascii_alphabetic())
}

fn plural(noun: &str, count: usize) -> String {
    if count == 1 {
        noun.to_string()
    } else if let Some(stem) = noun.strip_suffix('y').filter(|stem| !stem.ends_with(['a', 'e', 'o', 'u'])) {
        format!("{stem}ies")
    } else {
        format!("{noun}s")
    }
}

fn join_words(items: &[String]) -> String {
    match items {
        [] => String::new(),
        [one] => one.clone(),
        [init @ .., last] => format!("{} and {last}", init.join(", ")),
    }
}

fn format_number(value: f64) -> String {
    if value.fract().abs() < f64::EPSILON && value.abs() < 1e15 {
        #[allow(clippy::cast_possible_truncation)]
        let whole = value as i64;
        whole.to_string()
    } else {
        format!("{value:.2}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn tool(name: &str) -> ToolDescriptor {
        ToolDescriptor::from_listing(name, "", &Value::Null, Utc::now()).expect("valid tool")
    }

    fn accounts(count: usize) -> Value {
        let records: Vec<Value> = ["Acme", "Globex", "Initech", "Umbrella", "Hooli"]
            .iter()
            .take(count)
            .map(|name| {
                json!({
                    "attributes": { "type": "Account", "url": "/services/data/v59.0/sobjects/Account/001xx000003DGb2AAG" },
                    "Id": "001xx000003DGb2AAG",
                    "Name": name,
                    "Industry": "Technology"
                })
            })
            .collect();
        json!({ "totalSize": count, "done": true, "records": records })
    }

    #[test]
    fn summarizes_record_sets_with_samples() {
        let formatter = ResponseFormatter::new();
        let rendered = formatter.format(&tool("salesforce_query_records"), &accounts(5));
        assert_eq!(rendered, "Found 5 Account records, including Acme, Globex and Initech.");
        assert!(!rendered.contains("001xx"));

        let rendered = formatter.format(&tool("salesforce_query_records"), &accounts(2));
        assert_eq!(rendered, "Found 2 Account records: Acme and Globex.");
    }

    #[test]
    fn empty_results_say_no_matches() {
        let formatter = ResponseFormatter::new();
        let query = tool("salesforce_query_records");
        for raw in [json!(null), json!([]), json!(""), accounts(0), json!("Query returned 0 records")] {
            assert_eq!(formatter.format(&query, &raw), NO_MATCHES, "payload {raw}");
        }
    }

    #[test]
    fn parses_json_text_payloads() {
        let raw = Value::String(accounts(1).to_string());
        assert_eq!(
            ResponseFormatter::new().format(&tool("salesforce_query_records"), &raw),
            "Found 1 Account record: Acme."
        );
    }

    #[test]
    fn describes_schemas_with_custom_fields_first() {
        let raw = json!({
            "name": "Account",
            "fields": [
                { "name": "Id", "custom": false },
                { "name": "Name", "custom": false },
                { "name": "Industry", "custom": false },
                { "name": "Region__c", "custom": true }
            ]
        });
        let rendered = ResponseFormatter::new().format(&tool("salesforce_describe_object"), &raw);
        assert_eq!(
            rendered,
            "Account has 4 fields, including Region__c, Name and Industry. 1 of them is custom."
        );

        let raw = json!({
            "name": "Invoice__c",
            "fields": [
                { "name": "Amount__c", "custom": true },
                { "name": "Due__c", "custom": true }
            ]
        });
        assert_eq!(
            ResponseFormatter::new().format(&tool("salesforce_describe_object"), &raw),
            "Invoice__c has 2 fields, including Amount__c and Due__c. 2 of them are custom."
        );
    }

    #[test]
    fn schemas_with_only_hidden_fields_are_counted() {
        let raw = json!({ "name": "Foo", "fields": [{ "name": "Id" }, { "name": "OwnerId" }, { "type": "string" }] });
        assert_eq!(
            ResponseFormatter::new().format(&tool("salesforce_describe_object"), &raw),
            "Foo has 3 fields."
        );
    }

    #[test]
    fn summarizes_text_record_listings() {
        let raw = json!(
            "Query returned 4 records:\n\n\
             Record 1:\n    Id: 001xx000003DGb1AAG\n    Name: Acme\n    Industry: Technology\n\n\
             Record 2:\n    Id: 001xx000003DGb2AAG\n    Name: Globex\n    Industry: Technology\n\n\
             Record 3:\n    Id: 001xx000003DGb3AAG\n    Name: Initech\n    Industry: Technology\n\n\
             Record 4:\n    Id: 001xx000003DGb4AAG\n    Name: Hooli\n    Industry: Technology"
        );
        let rendered = ResponseFormatter::new().format(&tool("salesforce_query_records"), &raw);
        assert_eq!(rendered, "Found 4 records, including Acme, Globex and Initech.");
        assert!(!rendered.contains("001xx"));

        let raw = json!("Query returned 1 records:\n\nRecord 1:\n    Id: 003xx000004TmiQAAS\n    Email: ada@example.com");
        assert_eq!(
            ResponseFormatter::new().format(&tool("salesforce_query_records"), &raw),
            "Found 1 record: ada@example.com."
        );
    }

    #[test]
    fn acknowledges_mutations() {
        let raw = json!([
            { "id": "003xx000004TmiQAAS", "success": true, "errors": [] },
            { "id": "003xx000004TmiRAAS", "success": true, "errors": [] },
            { "success": false, "errors": [{ "message": "REQUIRED_FIELD_MISSING" }] }
        ]);
        let rendered = ResponseFormatter::new().format(&tool("salesforce_dml_records"), &raw);
        assert_eq!(rendered, "Successfully processed 2 records. 1 record could not be processed.");
        assert!(!rendered.contains("REQUIRED_FIELD_MISSING"));
    }

    #[test]
    fn aggregate_rows_show_groups() {
        let raw = json!({
            "totalSize": 2,
            "records": [
                { "attributes": { "type": "AggregateResult" }, "Status": "New", "expr0": 5 },
                { "attributes": { "type": "AggregateResult" }, "Status": "Closed", "expr0": 12 }
            ]
        });
        assert_eq!(
            ResponseFormatter::new().format(&tool("salesforce_aggregate_query"), &raw),
            "Found 2 groups: New (5) and Closed (12)."
        );

        let single = json!([{ "expr0": 42 }]);
        assert_eq!(
            ResponseFormatter::new().format(&tool("salesforce_aggregate_query"), &single),
            "The result is 42."
        );
    }

    #[test]
    fn discovery_results_count_objects() {
        let raw = json!([{ "name": "Invoice__c", "label": "Invoice" }, { "name": "InvoiceLine__c", "label": "Invoice Line" }]);
        assert_eq!(
            ResponseFormatter::new().format(&tool("salesforce_search_objects"), &raw),
            "Found 2 objects: Invoice__c and InvoiceLine__c."
        );
    }

    #[test]
    fn text_is_scrubbed_and_bounded() {
        let formatter = ResponseFormatter::new();
        let rendered = formatter.format(&tool("salesforce_execute_anonymous"), &json!("  Created account 001xx000003DGb2AAG  "));
        assert_eq!(rendered, "Created account [id]");

        let long = "word ".repeat(400);
        let rendered = formatter.format(&tool("salesforce_execute_anonymous"), &Value::String(long));
        assert!(rendered.len() <= TEXT_LIMIT + 3);
        assert!(rendered.ends_with("..."));
    }
}

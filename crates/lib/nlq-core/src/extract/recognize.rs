//! Recognizers that pull candidate argument values out of free text.

use std::sync::LazyLock;

use nlq_catalog::schema::{object_api_name, qualifier_field};
use nlq_catalog::text::{singularize, split_words, tokenize};
use regex::Regex;

use super::coerce::split_list;

fn pattern(source: &str) -> Regex {
    Regex::new(source).expect("static pattern compiles")
}

static CUSTOM_OBJECT: LazyLock<Regex> = LazyLock::new(|| pattern(r"(?i)\b([A-Za-z][A-Za-z0-9_]*__c)\b"));
static NAMED_OBJECT: LazyLock<Regex> = LazyLock::new(|| pattern(r"(?i)\b([A-Za-z][A-Za-z0-9_]*)\s+object\b"));
static FIELD_CLAUSE: LazyLock<Regex> = LazyLock::new(|| {
    pattern(r"(?i)\b(?:fields?|columns?)\s*(?::|=)?\s+([A-Za-z0-9_.,'\s]+?)(?:\s+(?:from|where|for|of|on|in|sorted|ordered|order|limit|with)\b|[.?!;]|$)")
});
static WHERE_CLAUSE: LazyLock<Regex> = LazyLock::new(|| {
    pattern(r"(?i)\bwhere\s+(.+?)(?:\s+(?:sorted|ordered|order\s+by|limit|top)\b|[?!;]?$)")
});
static IN_INDUSTRY: LazyLock<Regex> =
    LazyLock::new(|| pattern(r"(?i)\bin\s+(?:the\s+)?([A-Za-z][A-Za-z&\s]*?)\s+(?:industry|sector)\b"));
static NAMED: LazyLock<Regex> = LazyLock::new(|| {
    pattern(r#"\b(?i:named|called)\s+(?:'([^']+)'|"([^"]+)"|([A-Za-z0-9][\w&-]*(?:\s+[A-Z][\w&-]*)*))"#)
});
static STATUS_IS: LazyLock<Regex> = LazyLock::new(|| {
    pattern(r"(?i)\bstatus\s+(?:is|=|of|equals)\s*'?([A-Za-z][\w -]*?)'?(?:\s+(?:and|sorted|ordered|order|limit)\b|[.?!,;]|$)")
});
static CREATED_WHEN: LazyLock<Regex> = LazyLock::new(|| {
    pattern(r"(?i)\b(created|closing|closed|modified)\s+(today|yesterday|this\s+week|last\s+week|this\s+month|last\s+month|this\s+quarter|this\s+year|last\s+year)\b")
});
static AMOUNT_COMPARE: LazyLock<Regex> = LazyLock::new(|| {
    pattern(r"(?i)\b(amount|revenue)\s+(over|above|greater\s+than|more\s+than|at\s+least|under|below|less\s+than)\s+\$?([\d,]+(?:\.\d+)?)\s*([km])?\b")
});
static LIMIT: LazyLock<Regex> = LazyLock::new(|| {
    pattern(r"(?i)\b(?:top|first|limit(?:\s+to)?|last|latest|only)\s+(\d+)\b|\b(\d+)\s+(?:records?|results?|rows?|items?)\b")
});
static ORDER_BY: LazyLock<Regex> = LazyLock::new(|| {
    pattern(r"(?i)\b(?:sorted|ordered|order|sort)\s+by\s+([A-Za-z_][\w]*(?:\s+(?:date|name|amount))?)(?:\s+(asc|ascending|desc|descending))?")
});
static GROUP_BY: LazyLock<Regex> = LazyLock::new(|| {
    pattern(r"(?i)\b(?:group(?:ed)?\s+by|per|for\s+each|broken\s+down\s+by)\s+([A-Za-z_]\w*)")
});
static SUM_OF: LazyLock<Regex> =
    LazyLock::new(|| pattern(r"(?i)\b(total|sum|average|avg|maximum|max|minimum|min)\s+(?:of\s+)?(?:the\s+)?([A-Za-z_]\w*)"));
static QUOTED: LazyLock<Regex> =
    LazyLock::new(|| pattern("['\"\u{2018}\u{201c}]([^'\"\u{2019}\u{201d}]+)['\"\u{2019}\u{201d}]"));
static SEARCH_CUE: LazyLock<Regex> = LazyLock::new(|| {
    pattern(r"(?i)\b(?:containing|contains|matching|match|like|named|called|with\s+name)\s+([\w&-]+)")
});
static SEARCH_FOR: LazyLock<Regex> = LazyLock::new(|| pattern(r"(?i)\b(?:for|about)\s+([\w&-]+)"));
static CODE_UNIT: LazyLock<Regex> = LazyLock::new(|| {
    pattern(r"\b(?i:class|trigger)\s+(?:(?i:named|called)\s+)?([A-Za-z_]\w*)|\b([A-Z]\w*)\s+(?i:class|trigger)\b")
});

const OBJECT_WORD_SKIPS: &[&str] = &[
    "a", "an", "the", "this", "that", "which", "what", "each", "every", "any", "custom", "new",
    "standard", "my", "our", "one",
];

const SEARCH_SKIPS: &[&str] = &[
    "a", "an", "the", "all", "any", "me", "my", "each", "every", "this", "that", "record", "records",
];

const CODE_SKIPS: &[&str] = &["that", "which", "for", "the", "a", "an", "named", "called", "with", "on", "in"];

const OPERATION_SYNONYMS: &[(&str, &str)] = &[
    ("insert", "insert"),
    ("create", "insert"),
    ("add", "insert"),
    ("update", "update"),
    ("modify", "update"),
    ("change", "update"),
    ("edit", "update"),
    ("set", "update"),
    ("delete", "delete"),
    ("remove", "delete"),
    ("upsert", "upsert"),
    ("enable", "enable"),
    ("start", "enable"),
    ("disable", "disable"),
    ("stop", "disable"),
    ("retrieve", "retrieve"),
    ("get", "retrieve"),
    ("show", "retrieve"),
    ("fetch", "retrieve"),
    ("view", "retrieve"),
];

const FIELD_ALIASES: &[(&str, &str)] = &[
    ("stage", "StageName"),
    ("owner", "OwnerId"),
    ("source", "LeadSource"),
    ("revenue", "AnnualRevenue"),
    ("employee", "NumberOfEmployees"),
    ("created", "CreatedDate"),
    ("close", "CloseDate"),
    ("modified", "LastModifiedDate"),
    ("first", "FirstName"),
    ("last", "LastName"),
];

/// Everything the recognizers found in one query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryFeatures {
    pub object: Option<String>,
    pub fields: Option<Vec<String>>,
    pub filters: Vec<String>,
    pub limit: Option<u64>,
    pub order_by: Option<String>,
    pub group_by: Option<String>,
    pub aggregates: Vec<String>,
    pub search_term: Option<String>,
    /// Operation verbs in query order, as (word, canonical) pairs.
    pub operations: Vec<(String, &'static str)>,
    pub code_name: Option<String>,
    pub tokens: Vec<String>,
    /// The query as received.
    pub text: String,
}

impl QueryFeatures {
    pub fn scan(query: &str) -> Self {
        let words = split_words(query);
        let tokens = tokenize(query);
        let object = recognize_object(query, &tokens);
        let filters = recognize_filters(query, &words, &tokens);

        Self {
            fields: recognize_fields(query),
            limit: recognize_limit(query),
            order_by: recognize_order(query, &tokens),
            group_by: GROUP_BY
                .captures(query)
                .map(|caps| field_name(&caps[1])),
            aggregates: recognize_aggregates(query, &tokens),
            search_term: recognize_search_term(query),
            operations: tokens
                .iter()
                .filter_map(|token| {
                    OPERATION_SYNONYMS
                        .iter()
                        .find(|(word, _)| *word == token.as_str())
                        .map(|(word, canonical)| ((*word).to_string(), *canonical))
                })
                .collect(),
            code_name: recognize_code_name(query),
            object,
            filters,
            tokens,
            text: query.to_string(),
        }
    }

    /// Select list for aggregate queries: grouped field first, then expressions.
    #[must_use]
    pub fn aggregate_select(&self) -> Vec<String> {
        let mut select: Vec<String> = self.group_by.iter().cloned().collect();
        select.extend(self.aggregates.iter().cloned());
        select
    }

    #[must_use]
    pub fn filter_clause(&self) -> Option<String> {
        (!self.filters.is_empty()).then(|| self.filters.join(" AND "))
    }
}

fn recognize_object(query: &str, tokens: &[String]) -> Option<String> {
    if let Some(caps) = CUSTOM_OBJECT.captures(query) {
        return Some(caps[1].to_string());
    }
    for caps in NAMED_OBJECT.captures_iter(query) {
        let word = &caps[1];
        if OBJECT_WORD_SKIPS.contains(&word.to_ascii_lowercase().as_str()) {
            continue;
        }
        let noun = singularize(&word.to_ascii_lowercase());
        return Some(object_api_name(&noun).map_or_else(|| capitalize(word), str::to_string));
    }
    tokens.iter().enumerate().find_map(|(pos, token)| {
        // "order by" is a clause, not the Order object.
        if token == "order" && tokens.get(pos + 1).is_some_and(|next| next == "by") {
            return None;
        }
        object_api_name(token).map(str::to_string)
    })
}

fn recognize_fields(query: &str) -> Option<Vec<String>> {
    let caps = FIELD_CLAUSE.captures(query)?;
    let items = split_list(&caps[1]);
    let looks_like_fields = !items.is_empty()
        && items
            .iter()
            .all(|item| !item.contains(char::is_whitespace) && item.chars().all(|ch| ch.is_alphanumeric() || ch == '_' || ch == '.'));
    looks_like_fields.then_some(items)
}

fn recognize_filters(query: &str, words: &[String], tokens: &[String]) -> Vec<String> {
    let mut filters = Vec::new();

    if let Some(caps) = WHERE_CLAUSE.captures(query) {
        let clause = caps[1].trim().trim_end_matches(['.', '?', '!']).trim();
        if !clause.is_empty() {
            filters.push(clause.to_string());
        }
    }

    if let Some(caps) = IN_INDUSTRY.captures(query) {
        push_unique(&mut filters, format!("Industry = '{}'", title_case(caps[1].trim())));
    }

    // Qualifier words directly in front of an object noun: "Technology accounts".
    for (pos, token) in tokens.iter().enumerate() {
        let Some(field) = qualifier_field(token) else {
            continue;
        };
        let before_object = tokens
            .get(pos + 1)
            .is_some_and(|next| object_api_name(next).is_some() || qualifier_field(next).is_some());
        if before_object {
            push_unique(&mut filters, format!("{field} = '{}'", capitalize(&words[pos])));
        }
    }

    if let Some(caps) = STATUS_IS.captures(query) {
        push_unique(&mut filters, format!("Status = '{}'", title_case(caps[1].trim())));
    }

    if let Some(caps) = NAMED.captures(query) {
        let name = caps
            .get(1)
            .or_else(|| caps.get(2))
            .or_else(|| caps.get(3))
            .map(|m| m.as_str().trim().replace('\'', "\\'"));
        if let Some(name) = name.filter(|name| !name.is_empty()) {
            push_unique(&mut filters, format!("Name LIKE '%{name}%'"));
        }
    }

    if let Some(caps) = CREATED_WHEN.captures(query) {
        let field = match caps[1].to_ascii_lowercase().as_str() {
            "closing" | "closed" => "CloseDate",
            "modified" => "LastModifiedDate",
            _ => "CreatedDate",
        };
        let literal = caps[2]
            .split_whitespace()
            .map(str::to_ascii_uppercase)
            .collect::<Vec<_>>()
            .join("_");
        push_unique(&mut filters, format!("{field} = {literal}"));
    }

    if let Some(caps) = AMOUNT_COMPARE.captures(query) {
        let field = if caps[1].eq_ignore_ascii_case("revenue") { "AnnualRevenue" } else { "Amount" };
        let operator = match caps[2].to_ascii_lowercase().split_whitespace().next() {
            Some("under" | "below" | "less") => "<",
            Some("at") => ">=",
            _ => ">",
        };
        let digits = caps[3].replace(',', "");
        let multiplier = match caps.get(4).map(|m| m.as_str().to_ascii_lowercase()) {
            Some(suffix) if suffix == "k" => "000",
            Some(suffix) if suffix == "m" => "000000",
            _ => "",
        };
        push_unique(&mut filters, format!("{field} {operator} {digits}{multiplier}"));
    }

    filters
}

fn recognize_limit(query: &str) -> Option<u64> {
    let caps = LIMIT.captures(query)?;
    caps.get(1).or_else(|| caps.get(2))?.as_str().parse().ok()
}

fn recognize_order(query: &str, tokens: &[String]) -> Option<String> {
    if let Some(caps) = ORDER_BY.captures(query) {
        let field = field_name(&caps[1]);
        let descending = caps
            .get(2)
            .is_some_and(|dir| dir.as_str().to_ascii_lowercase().starts_with("desc"));
        return Some(if descending { format!("{field} DESC") } else { field });
    }
    let has = |word: &str| tokens.iter().any(|token| token == word);
    if has("newest") || has("latest") || (has("most") && has("recent")) {
        Some("CreatedDate DESC".to_string())
    } else if has("oldest") {
        Some("CreatedDate ASC".to_string())
    } else if has("largest") || has("biggest") || has("highest") {
        Some("Amount DESC".to_string())
    } else {
        None
    }
}

fn recognize_aggregates(query: &str, tokens: &[String]) -> Vec<String> {
    let mut aggregates = Vec::new();
    let asks_count = tokens.iter().any(|token| token == "count")
        || tokens.windows(2).any(|pair| pair[0] == "how" && pair[1] == "many")
        || tokens.iter().any(|token| token == "number");
    if asks_count {
        aggregates.push("COUNT(Id)".to_string());
    }
    for caps in SUM_OF.captures_iter(query) {
        let function = match caps[1].to_ascii_lowercase().as_str() {
            "average" | "avg" => "AVG",
            "maximum" | "max" => "MAX",
            "minimum" | "min" => "MIN",
            _ => "SUM",
        };
        let subject = caps[2].to_ascii_lowercase();
        if object_api_name(&singularize(&subject)).is_some() || subject == "number" {
            continue;
        }
        push_unique(&mut aggregates, format!("{function}({})", field_name(&caps[2])));
    }
    aggregates
}

fn recognize_search_term(query: &str) -> Option<String> {
    if let Some(caps) = QUOTED.captures(query) {
        let quoted = caps[1].trim();
        if !quoted.is_empty() {
            return Some(quoted.to_string());
        }
    }
    [&*SEARCH_CUE, &*SEARCH_FOR].into_iter().find_map(|regex| {
        regex
            .captures_iter(query)
            .map(|caps| caps[1].to_string())
            .find(|word| !SEARCH_SKIPS.contains(&word.to_ascii_lowercase().as_str()))
    })
}

fn recognize_code_name(query: &str) -> Option<String> {
    CODE_UNIT.captures_iter(query).find_map(|caps| {
        let name = caps.get(1).or_else(|| caps.get(2))?.as_str();
        let lower = name.to_ascii_lowercase();
        (!CODE_SKIPS.contains(&lower.as_str()) && lower != "apex").then(|| name.to_string())
    })
}

/// Maps a spoken field word to an API field name.
#[must_use]
pub fn field_name(word: &str) -> String {
    let mut parts = word.split_whitespace();
    let head = parts.next().unwrap_or_default();
    let lower = singularize(&head.to_ascii_lowercase());
    if lower.ends_with("__c") {
        return head.to_string();
    }
    if let Some((_, field)) = FIELD_ALIASES.iter().find(|(alias, _)| *alias == lower) {
        return (*field).to_string();
    }
    let mut field = capitalize(head);
    for part in parts {
        field.push_str(&capitalize(part));
    }
    field
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    chars
        .next()
        .map_or_else(String::new, |first| first.to_uppercase().chain(chars).collect())
}

fn title_case(text: &str) -> String {
    text.split_whitespace().map(capitalize).collect::<Vec<_>>().join(" ")
}

fn push_unique(list: &mut Vec<String>, item: String) {
    if !list.contains(&item) {
        list.push(item);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_qualified_object_queries() {
        let features = QueryFeatures::scan("Show me all Technology accounts");
        assert_eq!(features.object.as_deref(), Some("Account"));
        assert_eq!(features.filters, vec!["Industry = 'Technology'"]);
        assert_eq!(features.fields, None);
        assert_eq!(features.limit, None);
    }

    #[test]
    fn recognizes_custom_and_named_objects() {
        assert_eq!(
            QueryFeatures::scan("list Invoice__c records").object.as_deref(),
            Some("Invoice__c")
        );
        assert_eq!(
            QueryFeatures::scan("describe the Widget object").object.as_deref(),
            Some("Widget")
        );
        assert_eq!(
            QueryFeatures::scan("contacts order by name").object.as_deref(),
            Some("Contact")
        );
    }

    #[test]
    fn recognizes_fields_limits_and_order() {
        let features =
            QueryFeatures::scan("top 5 opportunities with fields Name, Amount and StageName sorted by amount desc");
        assert_eq!(features.limit, Some(5));
        assert_eq!(
            features.fields,
            Some(vec!["Name".to_string(), "Amount".to_string(), "StageName".to_string()])
        );
        assert_eq!(features.order_by.as_deref(), Some("Amount DESC"));
    }

    #[test]
    fn rejects_prose_as_field_lists() {
        assert_eq!(QueryFeatures::scan("what fields does the account object have").fields, None);
    }

    #[test]
    fn recognizes_filters() {
        let features = QueryFeatures::scan("find accounts named Acme in the banking industry");
        assert!(features.filters.contains(&"Name LIKE '%Acme%'".to_string()));
        assert!(features.filters.contains(&"Industry = 'Banking'".to_string()));

        let features = QueryFeatures::scan("cases where Priority = High");
        assert_eq!(features.filter_clause().as_deref(), Some("Priority = High"));

        let features = QueryFeatures::scan("opportunities with amount over 50k closing this month");
        assert_eq!(
            features.filters,
            vec!["CloseDate = THIS_MONTH", "Amount > 50000"]
        );
    }

    #[test]
    fn recognizes_aggregates() {
        let features = QueryFeatures::scan("how many cases per status");
        assert_eq!(features.aggregates, vec!["COUNT(Id)"]);
        assert_eq!(features.group_by.as_deref(), Some("Status"));
        assert_eq!(features.aggregate_select(), vec!["Status", "COUNT(Id)"]);

        let features = QueryFeatures::scan("total amount of opportunities by stage");
        assert_eq!(features.aggregates, vec!["SUM(Amount)"]);
    }

    #[test]
    fn recognizes_search_terms_and_code_units() {
        assert_eq!(
            QueryFeatures::scan("find objects containing invoice").search_term.as_deref(),
            Some("invoice")
        );
        assert_eq!(
            QueryFeatures::scan("search for \"Acme Corp\"").search_term.as_deref(),
            Some("Acme Corp")
        );
        assert_eq!(
            QueryFeatures::scan("show me the apex class AccountService").code_name.as_deref(),
            Some("AccountService")
        );
        assert_eq!(
            QueryFeatures::scan("read the LeadRouter trigger").code_name.as_deref(),
            Some("LeadRouter")
        );
    }

    #[test]
    fn maps_field_words() {
        assert_eq!(field_name("stage"), "StageName");
        assert_eq!(field_name("created date"), "CreatedDate");
        assert_eq!(field_name("industry"), "Industry");
    }
}

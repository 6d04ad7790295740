//! Static cue tables and domain lookups.
//!
//! Query cues drive category scoring; tool cues drive category assignment at
//! registry refresh. Every phrase is written in the normalized form produced by
//! [`crate::text::tokenize`] and no query cue may appear under two categories.

use crate::models::Category;
use crate::text::{contains_phrase, tokenize};

/// Weight of a single-word query cue.
pub const KEYWORD_WEIGHT: f64 = 1.0;
/// Weight of a multi-word query cue.
pub const PHRASE_WEIGHT: f64 = 1.5;
/// Weight of a bare business-object noun.
pub const ENTITY_WEIGHT: f64 = 0.5;

/// A query cue and the tool tokens it points toward.
#[derive(Debug, Clone, Copy)]
pub struct QueryCue {
    pub phrase: &'static str,
    pub weight: f64,
    pub hints: &'static [&'static str],
}

const fn kw(phrase: &'static str, hints: &'static [&'static str]) -> QueryCue {
    QueryCue {
        phrase,
        weight: KEYWORD_WEIGHT,
        hints,
    }
}

const fn ph(phrase: &'static str, hints: &'static [&'static str]) -> QueryCue {
    QueryCue {
        phrase,
        weight: PHRASE_WEIGHT,
        hints,
    }
}

const fn entity(phrase: &'static str) -> QueryCue {
    QueryCue {
        phrase,
        weight: ENTITY_WEIGHT,
        hints: READ,
    }
}

const READ: &[&str] = &["query", "record"];
const ANALYZE: &[&str] = &["aggregate"];
const MODIFY: &[&str] = &["dml", "record"];
const SEARCH_ALL: &[&str] = &["search", "all"];
const DESCRIBE: &[&str] = &["describe", "object"];
const MANAGE_OBJECT: &[&str] = &["manage", "object"];
const MANAGE_FIELD: &[&str] = &["manage", "field"];
const FIELD_PERMISSION: &[&str] = &["field", "permission"];
const DISCOVER: &[&str] = &["search", "object"];
const APEX: &[&str] = &["apex"];
const TRIGGER: &[&str] = &["apex", "trigger"];
const EXECUTE: &[&str] = &["execute", "anonymous"];
const DEBUG: &[&str] = &["debug", "log"];

/// Cue tables for one category.
#[derive(Debug, Clone, Copy)]
pub struct CategoryCues {
    pub category: Category,
    /// Multiplier applied to the category's summed cue weights.
    pub weight: f64,
    /// Matched against tool names (and descriptions as a fallback).
    pub tool_cues: &'static [&'static str],
    pub query_cues: &'static [QueryCue],
}

pub const CATEGORY_CUES: &[CategoryCues] = &[
    CategoryCues {
        category: Category::DataOperations,
        weight: 1.0,
        tool_cues: &["query", "record", "aggregate", "dml", "search all", "soql", "sosl", "upsert"],
        query_cues: &[
            ph("show me", READ),
            ph("how many", ANALYZE),
            ph("group by", ANALYZE),
            kw("show", READ),
            kw("get", READ),
            kw("find", READ),
            kw("list", READ),
            kw("display", READ),
            kw("retrieve", READ),
            kw("fetch", READ),
            kw("record", READ),
            kw("soql", READ),
            kw("count", ANALYZE),
            kw("sum", ANALYZE),
            kw("average", ANALYZE),
            kw("total", ANALYZE),
            kw("statistic", ANALYZE),
            kw("analyze", ANALYZE),
            kw("create", MODIFY),
            kw("insert", MODIFY),
            kw("update", MODIFY),
            kw("delete", MODIFY),
            kw("modify", MODIFY),
            kw("change", MODIFY),
            kw("add", MODIFY),
            kw("remove", MODIFY),
            kw("upsert", MODIFY),
            kw("search", SEARCH_ALL),
            kw("sosl", SEARCH_ALL),
            entity("account"),
            entity("contact"),
            entity("opportunity"),
            entity("case"),
            entity("lead"),
            entity("user"),
        ],
    },
    CategoryCues {
        category: Category::SchemaManagement,
        weight: 1.3,
        tool_cues: &["describe", "field", "manage object", "schema", "permission", "metadata"],
        query_cues: &[
            ph("what field", DESCRIBE),
            ph("create object", MANAGE_OBJECT),
            ph("modify object", MANAGE_OBJECT),
            ph("add field", MANAGE_FIELD),
            ph("create field", MANAGE_FIELD),
            ph("delete field", MANAGE_FIELD),
            ph("field permission", FIELD_PERMISSION),
            ph("field level security", FIELD_PERMISSION),
            kw("describe", DESCRIBE),
            kw("field", &["describe", "field"]),
            kw("structure", DESCRIBE),
            kw("schema", DESCRIBE),
            kw("property", DESCRIBE),
            kw("metadata", DESCRIBE),
            kw("permission", FIELD_PERMISSION),
        ],
    },
    CategoryCues {
        category: Category::ObjectDiscovery,
        weight: 1.2,
        tool_cues: &["search object", "object search", "list object", "discover"],
        query_cues: &[
            ph("search object", DISCOVER),
            ph("find object", DISCOVER),
            ph("list object", DISCOVER),
            ph("what object", DISCOVER),
            ph("which object", DISCOVER),
            ph("object containing", DISCOVER),
            ph("custom object", DISCOVER),
            ph("available object", DISCOVER),
            kw("discover", DISCOVER),
        ],
    },
    CategoryCues {
        category: Category::CodeManagement,
        weight: 1.1,
        tool_cues: &["apex", "trigger", "execute anonymous", "anonymous", "code"],
        query_cues: &[
            ph("run code", EXECUTE),
            ph("execute anonymous", EXECUTE),
            ph("apex class", APEX),
            ph("apex trigger", TRIGGER),
            ph("write apex", &["write", "apex"]),
            ph("read apex", &["read", "apex"]),
            kw("apex", APEX),
            kw("class", APEX),
            kw("trigger", TRIGGER),
            kw("deploy", &["write", "apex"]),
            kw("code", APEX),
            kw("execute", EXECUTE),
            kw("anonymous", EXECUTE),
            kw("run", EXECUTE),
        ],
    },
    CategoryCues {
        category: Category::Debugging,
        weight: 1.3,
        tool_cues: &["debug", "log", "trace"],
        query_cues: &[
            ph("debug log", DEBUG),
            kw("debug", DEBUG),
            kw("log", DEBUG),
            kw("logging", DEBUG),
            kw("error", DEBUG),
            kw("troubleshoot", DEBUG),
            kw("issue", DEBUG),
            kw("problem", DEBUG),
            kw("trace", DEBUG),
        ],
    },
];

/// Looks up the cue tables for a category; `Uncategorized` has none.
#[must_use]
pub fn cues_for(category: Category) -> Option<&'static CategoryCues> {
    CATEGORY_CUES.iter().find(|cues| cues.category == category)
}

/// Assigns categories to a tool by matching its name, then its description,
/// against each category's tool cues. Unmatched tools are `Uncategorized`.
#[must_use]
pub fn assign_categories(name: &str, description: &str) -> Vec<Category> {
    let by_name = match_tool_cues(&tokenize(name));
    if !by_name.is_empty() {
        return by_name;
    }
    let by_description = match_tool_cues(&tokenize(description));
    if by_description.is_empty() {
        vec![Category::Uncategorized]
    } else {
        by_description
    }
}

fn match_tool_cues(tokens: &[String]) -> Vec<Category> {
    CATEGORY_CUES
        .iter()
        .filter(|cues| {
            cues.tool_cues
                .iter()
                .any(|cue| contains_phrase(tokens, &tokenize(cue)))
        })
        .map(|cues| cues.category)
        .collect()
}

const ACTION_KEYWORDS: &[&str] = &[
    "query", "search", "describe", "create", "update", "delete", "manage", "read", "write",
    "execute",
];

const ENTITY_KEYWORDS: &[&str] = &[
    "account",
    "contact",
    "opportunity",
    "case",
    "lead",
    "object",
    "field",
    "apex",
    "trigger",
];

/// Pulls known action and entity words out of a tool description.
#[must_use]
pub fn extract_keywords(description: &str) -> Vec<String> {
    let tokens = tokenize(description);
    ACTION_KEYWORDS
        .iter()
        .chain(ENTITY_KEYWORDS)
        .filter(|keyword| tokens.iter().any(|token| token == *keyword))
        .map(|keyword| (*keyword).to_string())
        .collect()
}

/// Business-object nouns (singular, lower-case) and their API names.
pub const KNOWN_OBJECTS: &[(&str, &str)] = &[
    ("account", "Account"),
    ("contact", "Contact"),
    ("opportunity", "Opportunity"),
    ("opp", "Opportunity"),
    ("deal", "Opportunity"),
    ("case", "Case"),
    ("ticket", "Case"),
    ("lead", "Lead"),
    ("user", "User"),
    ("task", "Task"),
    ("event", "Event"),
    ("campaign", "Campaign"),
    ("product", "Product2"),
    ("contract", "Contract"),
    ("order", "Order"),
    ("quote", "Quote"),
    ("asset", "Asset"),
];

/// Resolves a normalized noun to an object API name.
#[must_use]
pub fn object_api_name(noun: &str) -> Option<&'static str> {
    KNOWN_OBJECTS
        .iter()
        .find(|(known, _)| *known == noun)
        .map(|(_, api)| *api)
}

const DEFAULT_PROJECTIONS: &[(&str, &[&str])] = &[
    ("Account", &["Id", "Name", "Industry", "Type", "Phone", "Website"]),
    ("Contact", &["Id", "FirstName", "LastName", "Email", "Phone", "AccountId"]),
    ("Opportunity", &["Id", "Name", "StageName", "Amount", "CloseDate", "AccountId"]),
    ("Case", &["Id", "Subject", "Status", "Priority", "AccountId", "ContactId"]),
    ("Lead", &["Id", "FirstName", "LastName", "Email", "Company", "Status"]),
    ("Task", &["Id", "Subject", "Status", "ActivityDate"]),
];

/// Fallback projection for objects without a tailored default.
pub const MINIMAL_PROJECTION: &[&str] = &["Id", "Name"];

/// Returns the built-in default field list for an object API name.
#[must_use]
pub fn default_projection(object: &str) -> &'static [&'static str] {
    DEFAULT_PROJECTIONS
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(object))
        .map_or(MINIMAL_PROJECTION, |(_, fields)| fields)
}

/// Qualifier words that imply a filter on a well-known field.
pub const QUALIFIER_FIELDS: &[(&str, &str)] = &[
    ("agriculture", "Industry"),
    ("apparel", "Industry"),
    ("banking", "Industry"),
    ("biotechnology", "Industry"),
    ("chemical", "Industry"),
    ("communication", "Industry"),
    ("construction", "Industry"),
    ("consulting", "Industry"),
    ("education", "Industry"),
    ("electronic", "Industry"),
    ("energy", "Industry"),
    ("engineering", "Industry"),
    ("entertainment", "Industry"),
    ("finance", "Industry"),
    ("government", "Industry"),
    ("healthcare", "Industry"),
    ("hospitality", "Industry"),
    ("insurance", "Industry"),
    ("manufacturing", "Industry"),
    ("media", "Industry"),
    ("retail", "Industry"),
    ("technology", "Industry"),
    ("telecommunication", "Industry"),
    ("transportation", "Industry"),
    ("utility", "Industry"),
    ("prospecting", "StageName"),
    ("qualification", "StageName"),
    ("negotiation", "StageName"),
    ("new", "Status"),
    ("working", "Status"),
    ("escalated", "Status"),
    ("closed", "Status"),
    ("hot", "Rating"),
    ("warm", "Rating"),
    ("cold", "Rating"),
];

/// Resolves a normalized qualifier word to the field it filters on.
#[must_use]
pub fn qualifier_field(word: &str) -> Option<&'static str> {
    QUALIFIER_FIELDS
        .iter()
        .find(|(known, _)| *known == word)
        .map(|(_, field)| *field)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn query_cues_are_unique_across_categories() {
        let mut seen: HashMap<String, Category> = HashMap::new();
        for cues in CATEGORY_CUES {
            for cue in cues.query_cues {
                let normalized = tokenize(cue.phrase).join(" ");
                assert_eq!(normalized, cue.phrase, "cue {} is not normalized", cue.phrase);
                if let Some(previous) = seen.insert(normalized, cues.category) {
                    panic!(
                        "cue {} appears under {previous} and {}",
                        cue.phrase, cues.category
                    );
                }
            }
        }
    }

    #[test]
    fn assigns_reference_tools_to_expected_categories() {
        let cases = [
            ("salesforce_query_records", Category::DataOperations),
            ("salesforce_aggregate_query", Category::DataOperations),
            ("salesforce_dml_records", Category::DataOperations),
            ("salesforce_search_all", Category::DataOperations),
            ("salesforce_describe_object", Category::SchemaManagement),
            ("salesforce_manage_object", Category::SchemaManagement),
            ("salesforce_manage_field_permissions", Category::SchemaManagement),
            ("salesforce_search_objects", Category::ObjectDiscovery),
            ("salesforce_read_apex_trigger", Category::CodeManagement),
            ("salesforce_execute_anonymous", Category::CodeManagement),
            ("salesforce_manage_debug_logs", Category::Debugging),
        ];
        for (name, expected) in cases {
            assert_eq!(assign_categories(name, ""), vec![expected], "tool {name}");
        }
    }

    #[test]
    fn falls_back_to_description_then_uncategorized() {
        assert_eq!(
            assign_categories("inspect", "Describe the metadata of an object"),
            vec![Category::SchemaManagement]
        );
        assert_eq!(
            assign_categories("ping", "Checks connectivity"),
            vec![Category::Uncategorized]
        );
    }

    #[test]
    fn extracts_keywords_from_descriptions() {
        assert_eq!(
            extract_keywords("Query records from any object using SOQL"),
            vec!["query", "object"]
        );
    }

    #[test]
    fn default_projection_falls_back_to_minimal() {
        assert_eq!(default_projection("account")[1], "Name");
        assert_eq!(default_projection("Widget__c"), MINIMAL_PROJECTION);
    }
}

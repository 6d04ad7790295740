//! Category classification and in-category tool ranking.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};

use nlq_catalog::schema::CATEGORY_CUES;
use nlq_catalog::text::tokenize;
use nlq_catalog::{Category, ToolDescriptor};
use tracing::debug;

use crate::options::DEFAULT_MIN_CONFIDENCE;
use crate::registry::Catalog;

/// Score at which a category reaches full confidence.
const SATURATION: f64 = 3.0;
const HINT_WEIGHT: f64 = 1.0;
const CONTENT_WEIGHT: f64 = 0.5;

const STOPWORDS: &[&str] = &[
    "a", "about", "all", "an", "and", "any", "are", "at", "be", "by", "can", "could", "do",
    "doe", "for", "from", "give", "have", "i", "in", "is", "it", "me", "my", "of", "on", "or",
    "our", "please", "some", "that", "the", "their", "there", "these", "this", "those", "to",
    "u", "we", "what", "which", "who", "with", "would", "you", "your",
];

/// One query cue with its tokens pre-split.
struct IndexedCue {
    tokens: Vec<String>,
    category: Category,
    /// Cue weight times category weight.
    weight: f64,
    /// Raw cue weight, credited to each hint.
    hint_weight: f64,
    hints: &'static [&'static str],
}

/// All query cues, longest phrases first so a scan takes the longest match.
static CUE_INDEX: LazyLock<Vec<IndexedCue>> = LazyLock::new(|| {
    let mut cues: Vec<IndexedCue> = CATEGORY_CUES
        .iter()
        .flat_map(|table| {
            table.query_cues.iter().map(move |cue| IndexedCue {
                tokens: tokenize(cue.phrase),
                category: table.category,
                weight: cue.weight * table.weight,
                hint_weight: cue.weight,
                hints: cue.hints,
            })
        })
        .collect();
    cues.sort_by(|a, b| b.tokens.len().cmp(&a.tokens.len()));
    cues
});

#[derive(Debug, Clone, PartialEq)]
pub struct CategoryScore {
    pub category: Category,
    pub score: f64,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ToolScore {
    pub tool: Arc<ToolDescriptor>,
    pub score: f64,
    pub confidence: f64,
}

/// Ranked categories and the ranked candidate tools of the chosen one.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ClassificationResult {
    /// Categories at or above the confidence floor, best first.
    pub categories: Vec<CategoryScore>,
    /// The category whose tools were ranked; `None` in uncategorized mode.
    pub selected: Option<Category>,
    pub tools: Vec<ToolScore>,
    /// True when no category qualified and every tool was searched.
    pub uncategorized: bool,
}

impl ClassificationResult {
    #[must_use]
    pub fn top_category(&self) -> Option<Category> {
        self.categories.first().map(|score| score.category)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Cue-table classifier. Pure: the same text and catalog give the same result.
#[derive(Debug, Clone, Copy)]
pub struct CategoryClassifier {
    min_confidence: f64,
}

impl Default for CategoryClassifier {
    fn default() -> Self {
        Self::new()
    }
}

/// Cue matches and leftover content words of one query.
#[derive(Debug, Default)]
struct CueScan {
    scores: BTreeMap<Category, f64>,
    hints: BTreeMap<Category, BTreeMap<&'static str, f64>>,
    content: Vec<String>,
}

impl CategoryClassifier {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            min_confidence: DEFAULT_MIN_CONFIDENCE,
        }
    }

    #[must_use]
    pub const fn with_min_confidence(mut self, min_confidence: f64) -> Self {
        self.min_confidence = min_confidence;
        self
    }

    pub fn classify(&self, query: &str, catalog: &Catalog) -> ClassificationResult {
        let scan = scan(&tokenize(query));

        let mut categories: Vec<CategoryScore> = scan
            .scores
            .iter()
            .map(|(category, score)| CategoryScore {
                category: *category,
                score: *score,
                confidence: (score / SATURATION).min(1.0),
            })
            .filter(|score| score.confidence >= self.min_confidence)
            .collect();
        categories.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.category.priority().cmp(&b.category.priority()))
        });

        let chosen = categories
            .iter()
            .map(|score| score.category)
            .find(|category| !catalog.category(*category).is_empty());

        let result = match chosen {
            Some(category) => {
                let hints = scan.hints.get(&category).cloned().unwrap_or_default();
                let tools = rank_tools(catalog.category(category), &hints, &scan.content, false);
                ClassificationResult {
                    categories,
                    selected: Some(category),
                    tools,
                    uncategorized: false,
                }
            }
            None => {
                let mut hints = BTreeMap::new();
                for (hint, weight) in scan.hints.values().flatten() {
                    *hints.entry(*hint).or_default() += weight;
                }
                let tools = rank_tools(catalog.tools().to_vec(), &hints, &scan.content, true);
                ClassificationResult {
                    categories,
                    selected: None,
                    tools,
                    uncategorized: true,
                }
            }
        };

        debug!(
            query,
            category = ?result.selected,
            uncategorized = result.uncategorized,
            candidates = result.tools.len(),
            "classified query"
        );
        result
    }
}

fn scan(tokens: &[String]) -> CueScan {
    let mut scan = CueScan::default();
    let mut pos = 0;
    while pos < tokens.len() {
        let rest = &tokens[pos..];
        if let Some(cue) = CUE_INDEX.iter().find(|cue| rest.starts_with(&cue.tokens)) {
            *scan.scores.entry(cue.category).or_default() += cue.weight;
            let hints = scan.hints.entry(cue.category).or_default();
            for hint in cue.hints {
                *hints.entry(*hint).or_default() += cue.hint_weight;
            }
            pos += cue.tokens.len();
        } else {
            let token = &tokens[pos];
            if !STOPWORDS.contains(&token.as_str()) && !scan.content.contains(token) {
                scan.content.push(token.clone());
            }
            pos += 1;
        }
    }
    scan
}

/// Scores tools by the weighted cue hints and content words their tokens share
/// with the query.
fn rank_tools(
    tools: Vec<Arc<ToolDescriptor>>,
    hints: &BTreeMap<&'static str, f64>,
    content: &[String],
    drop_unmatched: bool,
) -> Vec<ToolScore> {
    #[allow(clippy::cast_precision_loss)]
    let max_score = hints.values().sum::<f64>().mul_add(HINT_WEIGHT, content.len() as f64 * CONTENT_WEIGHT);

    let mut scored: Vec<ToolScore> = tools
        .into_iter()
        .map(|tool| {
            let tokens = tool.search_tokens();
            let has = |word: &str| tokens.binary_search_by(|token| token.as_str().cmp(word)).is_ok();
            let hint_hits: f64 = hints
                .iter()
                .filter(|(hint, _)| has(hint))
                .map(|(_, weight)| weight)
                .sum();
            #[allow(clippy::cast_precision_loss)]
            let content_hits = content.iter().filter(|word| has(word)).count() as f64;
            let score = hint_hits.mul_add(HINT_WEIGHT, content_hits * CONTENT_WEIGHT);
            let confidence = if max_score > 0.0 { score / max_score } else { 0.0 };
            ToolScore {
                tool,
                score,
                confidence,
            }
        })
        .filter(|scored| !drop_unmatched || scored.score > 0.0)
        .collect();

    // Stable: equal scores keep catalog order.
    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    scored
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn tool(name: &str, description: &str) -> ToolDescriptor {
        ToolDescriptor::from_listing(name, description, &json!({}), Utc::now()).expect("valid tool")
    }

    fn catalog() -> Catalog {
        Catalog::from_descriptors(vec![
            tool("salesforce_search_all", "Search across multiple objects using SOSL"),
            tool("salesforce_query_records", "Query records from any object using SOQL"),
            tool("salesforce_aggregate_query", "Run aggregate queries with GROUP BY"),
            tool("salesforce_describe_object", "Describe the fields of an object"),
            tool("salesforce_search_objects", "Search for objects by name pattern"),
            tool("salesforce_execute_anonymous", "Execute anonymous Apex code"),
            tool("salesforce_manage_debug_logs", "Enable or retrieve debug logs for a user"),
            tool("ping", "Checks connectivity to the org"),
        ])
    }

    #[test]
    fn read_queries_rank_query_tool_first() {
        let result = CategoryClassifier::new().classify("Show me all Technology accounts", &catalog());
        assert_eq!(result.top_category(), Some(Category::DataOperations));
        assert!(!result.uncategorized);
        assert_eq!(result.tools[0].tool.name, "salesforce_query_records");
        assert!(result.tools.iter().all(|scored| scored.tool.has_category(Category::DataOperations)));
    }

    #[test]
    fn category_cues_win_their_category() {
        let cases = [
            ("what fields does the account object have", Category::SchemaManagement),
            ("which objects are available for invoices", Category::ObjectDiscovery),
            ("run code to recalculate totals", Category::CodeManagement),
            ("turn on debug logs", Category::Debugging),
            ("how many opportunities closed", Category::DataOperations),
        ];
        for (query, expected) in cases {
            let result = CategoryClassifier::new().classify(query, &catalog());
            assert_eq!(result.top_category(), Some(expected), "query {query:?}");
        }
    }

    #[test]
    fn longest_cue_consumes_its_tokens() {
        let scan = scan(&tokenize("field level security for accounts"));
        assert_eq!(scan.scores.len(), 2);
        assert!(scan.scores.contains_key(&Category::SchemaManagement));
        // "field" alone must not be counted on top of the phrase.
        let schema = scan.scores[&Category::SchemaManagement];
        assert!((schema - 1.5 * 1.3).abs() < 1e-9);
    }

    #[test]
    fn aggregate_cues_prefer_aggregate_tool() {
        let result = CategoryClassifier::new().classify("how many cases per status", &catalog());
        assert_eq!(result.tools[0].tool.name, "salesforce_aggregate_query");
    }

    #[test]
    fn falls_back_to_global_search_without_cues() {
        let result = CategoryClassifier::new().classify("connectivity", &catalog());
        assert!(result.uncategorized);
        assert_eq!(result.selected, None);
        assert_eq!(result.tools.len(), 1);
        assert_eq!(result.tools[0].tool.name, "ping");
    }

    #[test]
    fn gibberish_yields_no_candidates() {
        let result = CategoryClassifier::new().classify("zzzz qqqq", &catalog());
        assert!(result.uncategorized);
        assert!(result.is_empty());
    }

    #[test]
    fn empty_category_moves_to_next() {
        let catalog = Catalog::from_descriptors(vec![tool("salesforce_query_records", "Query records")]);
        let result = CategoryClassifier::new().classify("describe the account", &catalog);
        assert_eq!(result.top_category(), Some(Category::SchemaManagement));
        assert_eq!(result.selected, Some(Category::DataOperations));
    }

    #[test]
    fn classification_is_deterministic() {
        let catalog = catalog();
        let classifier = CategoryClassifier::new();
        let first = classifier.classify("list contacts sorted by name", &catalog);
        let second = classifier.classify("list contacts sorted by name", &catalog);
        assert_eq!(first, second);
    }
}

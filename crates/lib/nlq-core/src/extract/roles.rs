use nlq_catalog::ParameterSpec;
use serde::Serialize;

/// What a parameter is for, inferred from its name and description.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamRole {
    ObjectName,
    FieldList,
    Filter,
    Limit,
    OrderBy,
    GroupBy,
    SearchTerm,
    Operation,
    CodeName,
    Generic,
}

const ROLE_NAMES: &[(ParamRole, &[&str])] = &[
    (
        ParamRole::ObjectName,
        &["objectname", "object", "sobject", "sobjecttype", "objecttype", "objectapiname", "entity", "table"],
    ),
    (
        ParamRole::FieldList,
        &["fields", "fieldlist", "fieldnames", "selectfields", "columns", "select"],
    ),
    (
        ParamRole::Filter,
        &["whereclause", "where", "filter", "filters", "condition", "conditions", "criteria"],
    ),
    (ParamRole::Limit, &["limit", "maxrecords", "maxresults", "rowlimit", "top"]),
    (ParamRole::OrderBy, &["orderby", "orderbyclause", "sort", "sortby", "order"]),
    (ParamRole::GroupBy, &["groupby", "groupbyfields", "groupbyclause"]),
    (
        ParamRole::SearchTerm,
        &["searchterm", "searchpattern", "search", "searchstring", "term", "keyword", "pattern", "namepattern"],
    ),
    (ParamRole::Operation, &["operation", "action", "dmloperation"]),
    (
        ParamRole::CodeName,
        &["classname", "triggername", "apexclassname", "apextriggername"],
    ),
];

/// Description phrases checked when the name alone is not conclusive.
const ROLE_PHRASES: &[(ParamRole, &str)] = &[
    (ParamRole::Filter, "where clause"),
    (ParamRole::OrderBy, "order by"),
    (ParamRole::GroupBy, "group by"),
    (ParamRole::ObjectName, "api name of the object"),
    (ParamRole::FieldList, "fields to retrieve"),
    (ParamRole::Limit, "maximum number of records"),
];

impl ParamRole {
    #[must_use]
    pub fn of(spec: &ParameterSpec) -> Self {
        let key: String = spec
            .name
            .chars()
            .filter(char::is_ascii_alphanumeric)
            .map(|ch| ch.to_ascii_lowercase())
            .collect();
        if let Some((role, _)) = ROLE_NAMES.iter().find(|(_, names)| names.contains(&key.as_str())) {
            return *role;
        }

        let description = spec.description.as_deref().unwrap_or_default().to_ascii_lowercase();
        ROLE_PHRASES
            .iter()
            .find(|(_, phrase)| description.contains(phrase))
            .map_or(Self::Generic, |(role, _)| *role)
    }

    /// Roles whose values are resolved before the rest so later roles can use them.
    #[must_use]
    pub const fn resolves_first(self) -> bool {
        matches!(self, Self::ObjectName)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nlq_catalog::ParamType;

    #[test]
    fn roles_follow_parameter_names() {
        let cases = [
            ("objectName", ParamRole::ObjectName),
            ("fields", ParamRole::FieldList),
            ("selectFields", ParamRole::FieldList),
            ("whereClause", ParamRole::Filter),
            ("order_by", ParamRole::OrderBy),
            ("groupByFields", ParamRole::GroupBy),
            ("searchPattern", ParamRole::SearchTerm),
            ("operation", ParamRole::Operation),
            ("className", ParamRole::CodeName),
            ("includeBody", ParamRole::Generic),
        ];
        for (name, role) in cases {
            assert_eq!(ParamRole::of(&ParameterSpec::new(name, ParamType::String)), role, "{name}");
        }
    }

    #[test]
    fn description_breaks_ties_for_unknown_names() {
        let spec = ParameterSpec::new("soqlCondition", ParamType::String)
            .with_description("Optional WHERE clause to filter records");
        assert_eq!(ParamRole::of(&spec), ParamRole::Filter);
    }
}

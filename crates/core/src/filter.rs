//! Metadata filter predicates for similarity queries.
//!
//! A [`FilterClause`] holds `must` (AND) and `must_not` (AND-NOT) conditions.
//! Operators: `eq`, `ne`, `gt`, `lt`, `gte`, `lte`, `in`, `nin`, `exists`.
//! Range operators compare numbers numerically and strings lexicographically,
//! which orders RFC 3339 timestamps such as `created_at` chronologically.

use crate::record::{Metadata, MetadataValue};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Metadata filter clause with `must` (AND) and `must_not` (AND-NOT) conditions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FilterClause {
    #[serde(default)]
    pub must: Vec<FilterCondition>,
    #[serde(default)]
    pub must_not: Vec<FilterCondition>,
}

/// A single filter condition on a metadata field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterCondition {
    pub field: String,
    pub op: FilterOperator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<serde_json::Value>>,
}

/// Comparison operator for filter conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterOperator {
    Eq,
    Ne,
    Gt,
    Lt,
    Gte,
    Lte,
    In,
    Nin,
    Exists,
}

impl FilterCondition {
    /// Condition comparing `field` against a single value.
    pub fn new(field: impl Into<String>, op: FilterOperator, value: serde_json::Value) -> Self {
        Self {
            field: field.into(),
            op,
            value: Some(value),
            values: None,
        }
    }

    /// `in` / `nin` condition against a set of values.
    pub fn any_of(field: impl Into<String>, op: FilterOperator, values: Vec<serde_json::Value>) -> Self {
        Self {
            field: field.into(),
            op,
            value: None,
            values: Some(values),
        }
    }

    /// Matches when `field` is present, whatever its value.
    pub fn exists(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            op: FilterOperator::Exists,
            value: None,
            values: None,
        }
    }
}

impl FilterClause {
    pub fn is_empty(&self) -> bool {
        self.must.is_empty() && self.must_not.is_empty()
    }

    /// Builder: add a `must` condition.
    pub fn must(mut self, cond: FilterCondition) -> Self {
        self.must.push(cond);
        self
    }

    /// Builder: add a `must_not` condition.
    pub fn must_not(mut self, cond: FilterCondition) -> Self {
        self.must_not.push(cond);
        self
    }

    /// Check whether `metadata` satisfies this clause.
    pub fn matches(&self, metadata: &Metadata) -> bool {
        self.must.iter().all(|c| evaluate_condition(metadata, c))
            && !self.must_not.iter().any(|c| evaluate_condition(metadata, c))
    }
}

fn evaluate_condition(metadata: &Metadata, cond: &FilterCondition) -> bool {
    let field_value = match metadata.get(&cond.field) {
        Some(v) => v,
        None => return false,
    };

    match cond.op {
        FilterOperator::Exists => true,
        FilterOperator::Eq => cond.value.as_ref().is_some_and(|v| json_eq(field_value, v)),
        FilterOperator::Ne => cond.value.as_ref().is_some_and(|v| !json_eq(field_value, v)),
        FilterOperator::Gt => compare(field_value, cond, |o| o == Ordering::Greater),
        FilterOperator::Lt => compare(field_value, cond, |o| o == Ordering::Less),
        FilterOperator::Gte => compare(field_value, cond, |o| o != Ordering::Less),
        FilterOperator::Lte => compare(field_value, cond, |o| o != Ordering::Greater),
        FilterOperator::In => cond
            .values
            .as_ref()
            .is_some_and(|vals| vals.iter().any(|v| json_eq(field_value, v))),
        FilterOperator::Nin => cond
            .values
            .as_ref()
            .is_some_and(|vals| !vals.iter().any(|v| json_eq(field_value, v))),
    }
}

fn compare(meta: &MetadataValue, cond: &FilterCondition, accept: impl Fn(Ordering) -> bool) -> bool {
    cond.value
        .as_ref()
        .and_then(|v| json_cmp(meta, v))
        .is_some_and(accept)
}

/// Compare a MetadataValue with a serde_json::Value for equality.
fn json_eq(meta: &MetadataValue, json: &serde_json::Value) -> bool {
    match (meta, json) {
        (MetadataValue::String(s), serde_json::Value::String(js)) => s == js,
        (MetadataValue::Boolean(b), serde_json::Value::Bool(jb)) => b == jb,
        (MetadataValue::Integer(i), serde_json::Value::Number(n)) => {
            n.as_i64().is_some_and(|ni| *i == ni)
                || n.as_f64()
                    .is_some_and(|nf| (*i as f64 - nf).abs() < f64::EPSILON)
        }
        (MetadataValue::Float(f), serde_json::Value::Number(n)) => {
            n.as_f64().is_some_and(|nf| (*f - nf).abs() < f64::EPSILON)
        }
        _ => false,
    }
}

/// Order a MetadataValue against a serde_json::Value. Numbers compare with
/// numbers, strings with strings; anything else is incomparable.
fn json_cmp(meta: &MetadataValue, json: &serde_json::Value) -> Option<Ordering> {
    match (meta, json) {
        (MetadataValue::String(s), serde_json::Value::String(js)) => Some(s.as_str().cmp(js)),
        _ => meta.as_f64()?.partial_cmp(&json.as_f64()?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn meta(pairs: Vec<(&str, MetadataValue)>) -> Metadata {
        pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
    }

    fn must(cond: FilterCondition) -> FilterClause {
        FilterClause::default().must(cond)
    }

    #[test]
    fn test_eq_string() {
        let metadata = meta(vec![("artist", "Nina Simone".into())]);
        assert!(must(FilterCondition::new("artist", FilterOperator::Eq, json!("Nina Simone")))
            .matches(&metadata));
        assert!(!must(FilterCondition::new("artist", FilterOperator::Eq, json!("Miles Davis")))
            .matches(&metadata));
    }

    #[test]
    fn test_ne_operator() {
        let metadata = meta(vec![("genre", "jazz".into())]);
        assert!(must(FilterCondition::new("genre", FilterOperator::Ne, json!("metal")))
            .matches(&metadata));
    }

    #[test]
    fn test_numeric_ranges() {
        let metadata = meta(vec![
            ("tempo", MetadataValue::Float(120.5)),
            ("duration", MetadataValue::Integer(240)),
        ]);
        assert!(must(FilterCondition::new("tempo", FilterOperator::Gt, json!(100)))
            .matches(&metadata));
        assert!(must(FilterCondition::new("tempo", FilterOperator::Lt, json!(130.0)))
            .matches(&metadata));
        assert!(must(FilterCondition::new("duration", FilterOperator::Gte, json!(240)))
            .matches(&metadata));
        assert!(must(FilterCondition::new("duration", FilterOperator::Lte, json!(240)))
            .matches(&metadata));
        assert!(!must(FilterCondition::new("duration", FilterOperator::Gt, json!(240)))
            .matches(&metadata));
    }

    #[test]
    fn test_string_range_orders_timestamps() {
        let metadata = meta(vec![("created_at", "2024-03-05T10:00:00Z".into())]);
        let after = FilterCondition::new("created_at", FilterOperator::Gte, json!("2024-01-01T00:00:00Z"));
        let before = FilterCondition::new("created_at", FilterOperator::Lt, json!("2024-03-01T00:00:00Z"));
        assert!(must(after).matches(&metadata));
        assert!(!must(before).matches(&metadata));
    }

    #[test]
    fn test_range_across_types_is_false() {
        let metadata = meta(vec![("title", "So What".into())]);
        assert!(!must(FilterCondition::new("title", FilterOperator::Gt, json!(10)))
            .matches(&metadata));
        let metadata = meta(vec![("live", MetadataValue::Boolean(true))]);
        assert!(!must(FilterCondition::new("live", FilterOperator::Lt, json!(10)))
            .matches(&metadata));
    }

    #[test]
    fn test_in_and_nin() {
        let metadata = meta(vec![("genre", "jazz".into())]);
        let genres = vec![json!("jazz"), json!("blues")];
        assert!(must(FilterCondition::any_of("genre", FilterOperator::In, genres.clone()))
            .matches(&metadata));
        assert!(!must(FilterCondition::any_of("genre", FilterOperator::Nin, genres))
            .matches(&metadata));
    }

    #[test]
    fn test_exists_and_missing_field() {
        let metadata = meta(vec![("artist", "Bjork".into())]);
        assert!(must(FilterCondition::exists("artist")).matches(&metadata));
        assert!(!must(FilterCondition::exists("album")).matches(&metadata));
        assert!(!must(FilterCondition::new("album", FilterOperator::Eq, json!("Post")))
            .matches(&metadata));
    }

    #[test]
    fn test_must_not() {
        let metadata = meta(vec![("explicit", MetadataValue::Boolean(true))]);
        let filter = FilterClause::default()
            .must_not(FilterCondition::new("explicit", FilterOperator::Eq, json!(true)));
        assert!(!filter.matches(&metadata));
    }

    #[test]
    fn test_must_and_must_not_combined() {
        let metadata = meta(vec![
            ("genre", "rock".into()),
            ("duration", MetadataValue::Integer(180)),
        ]);
        let filter = FilterClause::default()
            .must(FilterCondition::new("genre", FilterOperator::Eq, json!("rock")))
            .must_not(FilterCondition::new("duration", FilterOperator::Gt, json!(600)));
        assert!(filter.matches(&metadata));
    }

    #[test]
    fn test_missing_value_never_matches() {
        let metadata = meta(vec![("x", MetadataValue::Integer(1))]);
        for op in [
            FilterOperator::Eq,
            FilterOperator::Ne,
            FilterOperator::Gt,
            FilterOperator::Lt,
            FilterOperator::Gte,
            FilterOperator::Lte,
            FilterOperator::In,
            FilterOperator::Nin,
        ] {
            let cond = FilterCondition {
                field: "x".into(),
                op,
                value: None,
                values: None,
            };
            assert!(!must(cond).matches(&metadata), "{op:?} without value");
        }
    }

    #[test]
    fn test_integer_equals_float_json() {
        let metadata = meta(vec![("year", MetadataValue::Integer(1959))]);
        assert!(must(FilterCondition::new("year", FilterOperator::Eq, json!(1959.0)))
            .matches(&metadata));
    }

    #[test]
    fn test_empty_filter_matches_all() {
        let metadata = meta(vec![("any", "value".into())]);
        let filter = FilterClause::default();
        assert!(filter.is_empty());
        assert!(filter.matches(&metadata));
    }

    #[test]
    fn test_deserialize_from_json() {
        let filter: FilterClause = serde_json::from_value(json!({
            "must": [{"field": "genre", "op": "in", "values": ["jazz", "soul"]}],
            "must_not": [{"field": "explicit", "op": "eq", "value": true}]
        }))
        .unwrap();
        assert_eq!(filter.must[0].op, FilterOperator::In);
        assert_eq!(filter.must_not.len(), 1);
    }
}

//! Turns request key/value pairs into filter clauses, restricted to an allow-list.

use crate::query::clause::{Clause, RequestParams};
use crate::query::grammar::{resolve_suffix, ComparisonOp, RuleKind, SpecialClauseKind};
use indexmap::IndexSet;
use serde_json::Value;

/// Columns an entity accepts in dynamic filters. Always holds the primary key and timestamps.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FilterableFieldSet(IndexSet<String>);

impl FilterableFieldSet {
    pub fn new<I, S>(fields: I, primary_key: &str, created_at: &str, updated_at: &str) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set: IndexSet<String> = fields.into_iter().map(Into::into).collect();
        for required in [primary_key, created_at, updated_at] {
            set.insert(required.to_string());
        }
        FilterableFieldSet(set)
    }

    pub fn contains(&self, column: &str) -> bool {
        self.0.contains(column)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Resolve every request pair against the allow-list.
///
/// Per key: the exact-name clause comes first, then the suffix clause (if the stripped
/// column is allowed). Keys matching neither are ignored.
pub fn resolve_filters(params: &RequestParams, fields: &FilterableFieldSet) -> Vec<Clause> {
    let mut clauses = Vec::new();
    for (key, value) in params.iter() {
        if fields.contains(key) {
            clauses.push(Clause::Equality {
                column: key.to_string(),
                value: Value::String(value.to_string()),
            });
        }

        let Some((column, rule)) = resolve_suffix(key) else { continue };
        if !fields.contains(&column) {
            tracing::debug!(key = %key, column = %column, "filter column not allowed, ignoring");
            continue;
        }
        clauses.push(clause_for_rule(column, rule.kind, value));
    }
    clauses
}

fn clause_for_rule(column: String, kind: RuleKind, value: &str) -> Clause {
    match kind {
        RuleKind::Special(SpecialClauseKind::In) => Clause::Set {
            column,
            values: split_values(value),
            negated: false,
        },
        RuleKind::Special(SpecialClauseKind::NotIn) => Clause::Set {
            column,
            values: split_values(value),
            negated: true,
        },
        RuleKind::Special(SpecialClauseKind::IsNull) => Clause::Null { column, is_null: true },
        RuleKind::Special(SpecialClauseKind::IsNotNull) => Clause::Null { column, is_null: false },
        RuleKind::Compare(ComparisonOp::Like) => Clause::Comparison {
            column,
            op: ComparisonOp::Like,
            value: Value::String(format!("%{}%", value)),
        },
        RuleKind::Compare(op) => Clause::Comparison {
            column,
            op,
            value: Value::String(value.to_string()),
        },
    }
}

fn split_values(value: &str) -> Vec<Value> {
    value.split(',').map(|v| Value::String(v.to_string())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::grammar::OPERATOR_RULES;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn fields() -> FilterableFieldSet {
        FilterableFieldSet::new(["name", "status"], "id", "created_at", "updated_at")
    }

    fn params(pairs: &[(&str, &str)]) -> RequestParams {
        pairs.iter().copied().collect()
    }

    #[test]
    fn test_field_set_always_has_key_and_timestamps() {
        let set = FilterableFieldSet::new(Vec::<String>::new(), "uuid", "inserted", "modified");
        assert!(set.contains("uuid"));
        assert!(set.contains("inserted"));
        assert!(set.contains("modified"));
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn test_exact_match_emits_equality() {
        let clauses = resolve_filters(&params(&[("status", "draft")]), &fields());
        assert_eq!(
            clauses,
            vec![Clause::Equality {
                column: "status".into(),
                value: json!("draft"),
            }]
        );
    }

    #[test]
    fn test_unlisted_keys_are_ignored() {
        let clauses = resolve_filters(
            &params(&[("password", "x"), ("password_not", "x"), ("secret_in", "a,b"), ("sort", "id:asc")]),
            &fields(),
        );
        assert!(clauses.is_empty());
    }

    #[test]
    fn test_every_suffix_maps_to_its_clause() {
        for rule in OPERATOR_RULES {
            let key = format!("status{}", rule.suffix);
            let clauses = resolve_filters(&params(&[(key.as_str(), "a,b")]), &fields());
            assert_eq!(clauses.len(), 1, "key {}", key);
            let expected = match rule.kind {
                RuleKind::Special(SpecialClauseKind::In) => Clause::Set {
                    column: "status".into(),
                    values: vec![json!("a"), json!("b")],
                    negated: false,
                },
                RuleKind::Special(SpecialClauseKind::NotIn) => Clause::Set {
                    column: "status".into(),
                    values: vec![json!("a"), json!("b")],
                    negated: true,
                },
                RuleKind::Special(SpecialClauseKind::IsNull) => Clause::Null {
                    column: "status".into(),
                    is_null: true,
                },
                RuleKind::Special(SpecialClauseKind::IsNotNull) => Clause::Null {
                    column: "status".into(),
                    is_null: false,
                },
                RuleKind::Compare(ComparisonOp::Like) => Clause::Comparison {
                    column: "status".into(),
                    op: ComparisonOp::Like,
                    value: json!("%a,b%"),
                },
                RuleKind::Compare(op) => Clause::Comparison {
                    column: "status".into(),
                    op,
                    value: json!("a,b"),
                },
            };
            assert_eq!(clauses[0], expected, "key {}", key);
        }
    }

    #[test]
    fn test_is_not_null_key_is_not_read_as_is_null() {
        let clauses = resolve_filters(&params(&[("created_at_isNotNull", "")]), &fields());
        assert_eq!(
            clauses,
            vec![Clause::Null {
                column: "created_at".into(),
                is_null: false,
            }]
        );
    }

    #[test]
    fn test_request_scenario() {
        let clauses = resolve_filters(
            &params(&[("status_not", "draft"), ("name_like", "Jo"), ("sort", "id:desc")]),
            &fields(),
        );
        assert_eq!(
            clauses,
            vec![
                Clause::Comparison {
                    column: "status".into(),
                    op: ComparisonOp::NotEq,
                    value: json!("draft"),
                },
                Clause::Comparison {
                    column: "name".into(),
                    op: ComparisonOp::Like,
                    value: json!("%Jo%"),
                },
            ]
        );
    }

    #[test]
    fn test_exact_and_suffix_layering_is_kept() {
        // "status_in" is itself an allowed column; both passes fire, exact first.
        let fields = FilterableFieldSet::new(["status", "status_in"], "id", "created_at", "updated_at");
        let clauses = resolve_filters(&params(&[("status_in", "a,b")]), &fields);
        assert_eq!(
            clauses,
            vec![
                Clause::Equality {
                    column: "status_in".into(),
                    value: json!("a,b"),
                },
                Clause::Set {
                    column: "status".into(),
                    values: vec![json!("a"), json!("b")],
                    negated: false,
                },
            ]
        );
    }
}

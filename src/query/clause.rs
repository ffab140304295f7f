//! Resolved query pieces: clauses, sort instructions, inclusion requests, request params.

use crate::query::grammar::ComparisonOp;
use indexmap::IndexMap;
use serde_json::Value;

/// One filter condition ready to be applied to a query handle.
#[derive(Clone, Debug, PartialEq)]
pub enum Clause {
    Equality { column: String, value: Value },
    Comparison { column: String, op: ComparisonOp, value: Value },
    Set { column: String, values: Vec<Value>, negated: bool },
    Null { column: String, is_null: bool },
}

impl Clause {
    pub fn column(&self) -> &str {
        match self {
            Clause::Equality { column, .. }
            | Clause::Comparison { column, .. }
            | Clause::Set { column, .. }
            | Clause::Null { column, .. } => column,
        }
    }
}

/// `column` + raw direction. Direction is not validated here; the storage layer decides.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SortInstruction {
    pub column: String,
    pub direction: String,
}

impl SortInstruction {
    pub fn new(column: impl Into<String>, direction: impl Into<String>) -> Self {
        SortInstruction {
            column: column.into(),
            direction: direction.into(),
        }
    }

    pub fn asc(column: impl Into<String>) -> Self {
        Self::new(column, "asc")
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self::new(column, "desc")
    }
}

/// Relations to eager-load and aggregates to count. Both lists are deduplicated, order kept.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InclusionRequest {
    pub relations: Vec<String>,
    pub counts: Vec<String>,
}

impl InclusionRequest {
    pub fn is_empty(&self) -> bool {
        self.relations.is_empty() && self.counts.is_empty()
    }

    pub(crate) fn push_relation(&mut self, name: String) {
        if !self.relations.contains(&name) {
            self.relations.push(name);
        }
    }

    pub(crate) fn push_count(&mut self, name: String) {
        if !self.counts.contains(&name) {
            self.counts.push(name);
        }
    }
}

/// Request parameters in the order the client sent them.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequestParams(IndexMap<String, String>);

impl RequestParams {
    pub fn new() -> Self {
        RequestParams(IndexMap::new())
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// First present, non-blank value among `keys`.
    pub fn first_of(&self, keys: &[&str]) -> Option<&str> {
        keys.iter()
            .filter_map(|k| self.get(k))
            .find(|v| !v.trim().is_empty())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for RequestParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        RequestParams(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

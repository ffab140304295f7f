//! Applies resolved pieces and accumulated state to a query handle in a fixed order.

use crate::query::clause::{Clause, InclusionRequest, SortInstruction};
use crate::query::grammar::ComparisonOp;
use crate::query::state::RepositoryState;
use serde_json::Value;

/// Builder side of a storage query. Terminal execution lives on `store::Storage`.
pub trait QueryHandle: Sized + Send {
    fn where_op(self, column: &str, op: ComparisonOp, value: Value) -> Self;
    fn where_in(self, column: &str, values: Vec<Value>) -> Self;
    fn where_not_in(self, column: &str, values: Vec<Value>) -> Self;
    fn where_null(self, column: &str) -> Self;
    fn where_not_null(self, column: &str) -> Self;
    fn order_by(self, column: &str, direction: &str) -> Self;
    fn with(self, relation: &str) -> Self;
    fn with_count(self, relation: &str) -> Self;
    fn take(self, limit: u64) -> Self;

    fn apply_clause(self, clause: Clause) -> Self {
        match clause {
            Clause::Equality { column, value } => self.where_op(&column, ComparisonOp::Eq, value),
            Clause::Comparison { column, op, value } => self.where_op(&column, op, value),
            Clause::Set { column, values, negated: false } => self.where_in(&column, values),
            Clause::Set { column, values, negated: true } => self.where_not_in(&column, values),
            Clause::Null { column, is_null: true } => self.where_null(&column),
            Clause::Null { column, is_null: false } => self.where_not_null(&column),
        }
    }
}

/// Order: sorts, eager loads + counts, filters, limit. Later stages may override earlier
/// ones on the same column; the state is consumed so nothing outlives the call.
pub fn compose<Q: QueryHandle>(
    base: Q,
    state: RepositoryState,
    inclusion: InclusionRequest,
    sorts: Vec<SortInstruction>,
    clauses: Vec<Clause>,
) -> Q {
    let mut query = base;

    for sort in sorts.iter().chain(state.sorts()) {
        query = query.order_by(&sort.column, &sort.direction);
    }

    for relation in state.relations().iter().chain(&inclusion.relations) {
        query = query.with(relation);
    }
    for aggregate in &inclusion.counts {
        query = query.with_count(aggregate);
    }

    let pending: Vec<Clause> = state.clauses().cloned().collect();
    for clause in pending.into_iter().chain(clauses) {
        query = query.apply_clause(clause);
    }

    if let Some(limit) = state.limit() {
        query = query.take(limit);
    }

    query
}

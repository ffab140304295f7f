//! Request-scoped clause accumulator owned by one repository value.

use crate::config::ActiveFlag;
use crate::query::clause::{Clause, SortInstruction};

/// Pending clauses, sorts, eager loads and row limit.
///
/// The active-flag gate is seeded at construction and survives `take`; everything else is
/// drained by `take`, so a state after `take` equals a freshly constructed one.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RepositoryState {
    gate: Option<Clause>,
    clauses: Vec<Clause>,
    sorts: Vec<SortInstruction>,
    relations: Vec<String>,
    limit: Option<u64>,
}

impl RepositoryState {
    pub fn new(active_flag: Option<&ActiveFlag>) -> Self {
        RepositoryState {
            gate: active_flag.map(|flag| Clause::Equality {
                column: flag.column.clone(),
                value: flag.value.clone(),
            }),
            ..Default::default()
        }
    }

    pub fn push_clause(&mut self, clause: Clause) {
        self.clauses.push(clause);
    }

    pub fn push_sort(&mut self, sort: SortInstruction) {
        self.sorts.push(sort);
    }

    /// Replaces the pending eager loads.
    pub fn set_relations(&mut self, relations: Vec<String>) {
        self.relations = relations;
    }

    pub fn set_limit(&mut self, limit: u64) {
        self.limit = Some(limit);
    }

    /// Gate clause (if any) followed by the pending clauses.
    pub fn clauses(&self) -> impl Iterator<Item = &Clause> {
        self.gate.iter().chain(self.clauses.iter())
    }

    pub fn sorts(&self) -> &[SortInstruction] {
        &self.sorts
    }

    pub fn relations(&self) -> &[String] {
        &self.relations
    }

    pub fn limit(&self) -> Option<u64> {
        self.limit
    }

    /// True when nothing beyond the gate is pending.
    pub fn is_clear(&self) -> bool {
        self.clauses.is_empty() && self.sorts.is_empty() && self.relations.is_empty() && self.limit.is_none()
    }

    /// Drain the pending state, leaving a fresh one (gate kept) in place.
    pub fn take(&mut self) -> RepositoryState {
        let fresh = RepositoryState {
            gate: self.gate.clone(),
            ..Default::default()
        };
        std::mem::replace(self, fresh)
    }

    /// Like `take`, but the drained state only keeps the gate and eager loads.
    pub fn take_eager_loads(&mut self) -> RepositoryState {
        let taken = self.take();
        RepositoryState {
            gate: taken.gate,
            relations: taken.relations,
            ..Default::default()
        }
    }
}

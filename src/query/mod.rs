//! Dynamic query engine: suffix grammar, resolvers, clause accumulator and composer.

pub mod clause;
pub mod composer;
pub mod filter;
pub mod grammar;
pub mod inclusion;
pub mod sort;
pub mod state;

pub use clause::{Clause, InclusionRequest, RequestParams, SortInstruction};
pub use composer::{compose, QueryHandle};
pub use filter::{resolve_filters, FilterableFieldSet};
pub use grammar::{resolve_suffix, ComparisonOp, OperatorRule, RuleKind, SpecialClauseKind, OPERATOR_RULES};
pub use inclusion::{resolve_inclusion, KnownRelations};
pub use sort::resolve_sorts;
pub use state::RepositoryState;

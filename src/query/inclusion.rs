//! Resolves `include`/`contain` and `count`/`with_count` directives into an inclusion request.

use crate::case::{path_to_camel_case, to_camel_case};
use crate::query::clause::InclusionRequest;

/// Relation and aggregate names an entity exposes. Paths are dot-separated (`comments.user`).
pub trait KnownRelations {
    fn has_relation_path(&self, path: &str) -> bool;
    fn has_aggregate(&self, name: &str) -> bool;
}

pub fn resolve_inclusion(
    include: Option<&str>,
    count: Option<&str>,
    known: &impl KnownRelations,
) -> InclusionRequest {
    let mut request = InclusionRequest::default();

    for entry in split_directive(include) {
        let normalized = path_to_camel_case(entry);
        if known.has_relation_path(&normalized) {
            request.push_relation(normalized);
        } else {
            tracing::debug!(relation = %entry, "unknown relation, passing through verbatim");
            request.push_relation(entry.to_string());
        }
    }

    for entry in split_directive(count) {
        if known.has_aggregate(entry) {
            request.push_count(entry.to_string());
            continue;
        }
        let camel = to_camel_case(entry);
        if known.has_aggregate(&camel) {
            request.push_count(camel);
        } else {
            tracing::debug!(aggregate = %entry, "unknown aggregate, dropping");
        }
    }

    request
}

fn split_directive(directive: Option<&str>) -> impl Iterator<Item = &str> {
    directive
        .unwrap_or("")
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
}

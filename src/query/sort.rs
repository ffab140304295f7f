//! Parses the `sort` directive (`name:asc,age:desc`).

use crate::query::clause::SortInstruction;

/// Entries must be exactly `column:direction`; anything else is dropped.
/// Falls back to `[default]` when nothing usable remains.
pub fn resolve_sorts(directive: Option<&str>, default: &SortInstruction) -> Vec<SortInstruction> {
    let sorts: Vec<SortInstruction> = directive
        .unwrap_or("")
        .split(',')
        .filter_map(|entry| {
            let parts: Vec<&str> = entry.split(':').collect();
            match parts.as_slice() {
                [column, direction] => Some(SortInstruction::new(column.trim(), direction.trim())),
                _ => {
                    if !entry.trim().is_empty() {
                        tracing::debug!(entry = %entry, "malformed sort entry, dropping");
                    }
                    None
                }
            }
        })
        .collect();

    if sorts.is_empty() {
        vec![default.clone()]
    } else {
        sorts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn default() -> SortInstruction {
        SortInstruction::desc("id")
    }

    #[test]
    fn test_pairs_in_order() {
        assert_eq!(
            resolve_sorts(Some("name:asc,age:desc"), &default()),
            vec![SortInstruction::asc("name"), SortInstruction::desc("age")]
        );
    }

    #[test]
    fn test_no_colon_falls_back_to_default() {
        assert_eq!(resolve_sorts(Some("bogus"), &default()), vec![default()]);
    }

    #[test]
    fn test_empty_or_absent_falls_back_to_default() {
        assert_eq!(resolve_sorts(Some(""), &default()), vec![default()]);
        assert_eq!(resolve_sorts(None, &default()), vec![default()]);
    }

    #[test]
    fn test_malformed_entries_dropped_and_values_passed_through() {
        assert_eq!(
            resolve_sorts(Some("a:b:c, title : sideways ,x"), &default()),
            vec![SortInstruction::new("title", "sideways")]
        );
    }
}

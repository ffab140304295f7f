//! Suffix grammar for filter keys: `status_not`, `age_gte`, `id_in`, `deleted_at_isNull`, ...

/// Comparison operator applied as `column <op> value`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ComparisonOp {
    Eq,
    NotEq,
    Gt,
    Lt,
    Gte,
    Lte,
    Like,
}

impl ComparisonOp {
    pub fn as_sql(&self) -> &'static str {
        match self {
            ComparisonOp::Eq => "=",
            ComparisonOp::NotEq => "!=",
            ComparisonOp::Gt => ">",
            ComparisonOp::Lt => "<",
            ComparisonOp::Gte => ">=",
            ComparisonOp::Lte => "<=",
            ComparisonOp::Like => "LIKE",
        }
    }
}

impl std::fmt::Display for ComparisonOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_sql())
    }
}

impl std::str::FromStr for ComparisonOp {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_uppercase().as_str() {
            "=" | "==" => ComparisonOp::Eq,
            "!=" | "<>" => ComparisonOp::NotEq,
            ">" => ComparisonOp::Gt,
            "<" => ComparisonOp::Lt,
            ">=" => ComparisonOp::Gte,
            "<=" => ComparisonOp::Lte,
            "LIKE" => ComparisonOp::Like,
            other => return Err(format!("unsupported operator: {}", other)),
        })
    }
}

/// Clause kinds that are not a plain `column <op> value` comparison.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SpecialClauseKind {
    In,
    NotIn,
    IsNull,
    IsNotNull,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RuleKind {
    Compare(ComparisonOp),
    Special(SpecialClauseKind),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OperatorRule {
    pub suffix: &'static str,
    pub kind: RuleKind,
}

/// Suffix table, longest suffix first. `resolve_suffix` relies on this order.
pub const OPERATOR_RULES: &[OperatorRule] = &[
    OperatorRule { suffix: "_isNotNull", kind: RuleKind::Special(SpecialClauseKind::IsNotNull) },
    OperatorRule { suffix: "_isNull", kind: RuleKind::Special(SpecialClauseKind::IsNull) },
    OperatorRule { suffix: "_notIn", kind: RuleKind::Special(SpecialClauseKind::NotIn) },
    OperatorRule { suffix: "_like", kind: RuleKind::Compare(ComparisonOp::Like) },
    OperatorRule { suffix: "_gte", kind: RuleKind::Compare(ComparisonOp::Gte) },
    OperatorRule { suffix: "_lte", kind: RuleKind::Compare(ComparisonOp::Lte) },
    OperatorRule { suffix: "_not", kind: RuleKind::Compare(ComparisonOp::NotEq) },
    OperatorRule { suffix: "_gt", kind: RuleKind::Compare(ComparisonOp::Gt) },
    OperatorRule { suffix: "_lt", kind: RuleKind::Compare(ComparisonOp::Lt) },
    OperatorRule { suffix: "_in", kind: RuleKind::Special(SpecialClauseKind::In) },
];

/// Match `key` against the suffix table (case-insensitive).
/// Returns the lower-cased key with the suffix removed and the first rule that matched.
pub fn resolve_suffix(key: &str) -> Option<(String, &'static OperatorRule)> {
    let lower = key.to_lowercase();
    OPERATOR_RULES.iter().find_map(|rule| {
        let suffix = rule.suffix.to_lowercase();
        lower
            .strip_suffix(suffix.as_str())
            .filter(|base| !base.is_empty())
            .map(|base| (base.to_string(), rule))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rules_are_longest_first() {
        let lengths: Vec<usize> = OPERATOR_RULES.iter().map(|r| r.suffix.len()).collect();
        let mut sorted = lengths.clone();
        sorted.sort_by(|a, b| b.cmp(a));
        assert_eq!(lengths, sorted);
    }

    #[test]
    fn test_every_suffix_resolves_to_its_rule() {
        let cases = [
            ("status_not", RuleKind::Compare(ComparisonOp::NotEq)),
            ("age_gt", RuleKind::Compare(ComparisonOp::Gt)),
            ("age_lt", RuleKind::Compare(ComparisonOp::Lt)),
            ("age_gte", RuleKind::Compare(ComparisonOp::Gte)),
            ("age_lte", RuleKind::Compare(ComparisonOp::Lte)),
            ("name_like", RuleKind::Compare(ComparisonOp::Like)),
            ("id_in", RuleKind::Special(SpecialClauseKind::In)),
            ("id_notIn", RuleKind::Special(SpecialClauseKind::NotIn)),
            ("deleted_at_isNull", RuleKind::Special(SpecialClauseKind::IsNull)),
            ("deleted_at_isNotNull", RuleKind::Special(SpecialClauseKind::IsNotNull)),
        ];
        for (key, kind) in cases {
            let (_, rule) = resolve_suffix(key).unwrap_or_else(|| panic!("{} did not resolve", key));
            assert_eq!(rule.kind, kind, "key {}", key);
        }
    }

    #[test]
    fn test_is_not_null_never_resolves_as_is_null() {
        let (base, rule) = resolve_suffix("published_at_isNotNull").unwrap();
        assert_eq!(base, "published_at");
        assert_eq!(rule.kind, RuleKind::Special(SpecialClauseKind::IsNotNull));
    }

    #[test]
    fn test_not_in_never_resolves_as_in_or_not() {
        let (base, rule) = resolve_suffix("status_notin").unwrap();
        assert_eq!(base, "status");
        assert_eq!(rule.kind, RuleKind::Special(SpecialClauseKind::NotIn));
    }

    #[test]
    fn test_matching_is_case_insensitive_and_lowercases_base() {
        let (base, rule) = resolve_suffix("Name_LIKE").unwrap();
        assert_eq!(base, "name");
        assert_eq!(rule.kind, RuleKind::Compare(ComparisonOp::Like));
    }

    #[test]
    fn test_plain_key_and_bare_suffix_do_not_resolve() {
        assert!(resolve_suffix("status").is_none());
        assert!(resolve_suffix("_gte").is_none());
    }

    #[test]
    fn test_operator_parse() {
        assert_eq!("<>".parse::<ComparisonOp>().unwrap(), ComparisonOp::NotEq);
        assert_eq!("like".parse::<ComparisonOp>().unwrap(), ComparisonOp::Like);
        assert!("~".parse::<ComparisonOp>().is_err());
    }
}

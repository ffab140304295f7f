//! Case conversion for relation and aggregate names: `created_by_user` <-> `createdByUser`.

/// Convert a delimited identifier to camelCase. `_`, `-` and spaces separate words;
/// the first character is lower-cased, later words are capitalized, everything else is kept.
/// e.g. "created_by_user" -> "createdByUser", "Comments" -> "comments", "createdBy" -> "createdBy"
pub fn to_camel_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut capitalize_next = false;
    for c in s.chars() {
        if c == '_' || c == '-' || c == ' ' {
            capitalize_next = !out.is_empty();
        } else if out.is_empty() {
            out.extend(c.to_lowercase());
            capitalize_next = false;
        } else if capitalize_next {
            out.extend(c.to_uppercase());
            capitalize_next = false;
        } else {
            out.push(c);
        }
    }
    out
}

/// Convert a single identifier from camelCase to snake_case.
/// e.g. "createdByUser" -> "created_by_user", "comments" -> "comments"
pub fn to_snake_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 4);
    for (i, c) in s.chars().enumerate() {
        if c.is_uppercase() {
            if i > 0 && !out.ends_with('_') {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Camel-case every segment of a dotted relation path.
/// e.g. "comments.created_by_user" -> "comments.createdByUser"
pub fn path_to_camel_case(path: &str) -> String {
    path.split('.')
        .map(|segment| to_camel_case(segment.trim()))
        .collect::<Vec<_>>()
        .join(".")
}

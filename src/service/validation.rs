//! Write validation from entity config: per-column rules plus declared nullability.

use crate::config::{ResolvedEntity, ValidationRule};
use crate::error::AppError;
use regex::Regex;
use serde_json::{Map, Value};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValidationMode {
    /// Full row: required fields must be present.
    Create,
    /// Partial row: only the fields present are checked.
    Update,
}

pub struct RequestValidator;

impl RequestValidator {
    pub fn validate(entity: &ResolvedEntity, data: &Map<String, Value>, mode: ValidationMode) -> Result<(), AppError> {
        if mode == ValidationMode::Create {
            for column in required_columns(entity) {
                if data.get(column).map_or(true, Value::is_null) {
                    return Err(AppError::Validation(format!("{} is required", column)));
                }
            }
        }

        // Sorted so the same payload always reports the same first error.
        let mut rules: Vec<(&String, &ValidationRule)> = entity.validation.iter().collect();
        rules.sort_by(|a, b| a.0.cmp(b.0));
        for (column, rule) in rules {
            match data.get(column.as_str()) {
                Some(v) => validate_field(column, v, rule)?,
                None if mode == ValidationMode::Create && rule.required == Some(true) => {
                    return Err(AppError::Validation(format!("{} is required", column)));
                }
                None => {}
            }
        }

        if let Some(column) = data.keys().find(|k| nulled_not_null(entity, k, data)) {
            return Err(AppError::Validation(format!("{} cannot be null", column)));
        }
        Ok(())
    }
}

/// Declared NOT NULL columns without a default that the caller must supply.
fn required_columns(entity: &ResolvedEntity) -> impl Iterator<Item = &str> {
    entity
        .columns
        .iter()
        .filter(|c| !c.nullable && !c.has_default)
        .filter(|c| c.name != entity.primary_key && c.name != entity.created_at && c.name != entity.updated_at)
        .map(|c| c.name.as_str())
}

fn nulled_not_null(entity: &ResolvedEntity, key: &str, data: &Map<String, Value>) -> bool {
    data.get(key).is_some_and(Value::is_null) && entity.column(key).is_some_and(|c| !c.nullable)
}

fn validate_field(column: &str, v: &Value, rule: &ValidationRule) -> Result<(), AppError> {
    if v.is_null() {
        if rule.required == Some(true) {
            return Err(AppError::Validation(format!("{} is required", column)));
        }
        return Ok(());
    }
    if let Some(format) = &rule.format {
        validate_format(column, v, format)?;
    }
    if let Some(s) = v.as_str() {
        let len = s.chars().count();
        if let Some(max) = rule.max_length {
            if len > max as usize {
                return Err(AppError::Validation(format!("{} must be at most {} characters", column, max)));
            }
        }
        if let Some(min) = rule.min_length {
            if len < min as usize {
                return Err(AppError::Validation(format!("{} must be at least {} characters", column, min)));
            }
        }
        if let Some(pattern) = &rule.pattern {
            let re = Regex::new(pattern).map_err(|_| AppError::Validation(format!("invalid pattern for {}", column)))?;
            if !re.is_match(s) {
                return Err(AppError::Validation(format!("{} does not match required pattern", column)));
            }
        }
    }
    if let Some(allowed) = &rule.allowed {
        if !allowed.iter().any(|a| value_eq(v, a)) {
            return Err(AppError::Validation(format!(
                "{} must be one of: {}",
                column,
                allowed.iter().take(5).map(Value::to_string).collect::<Vec<_>>().join(", ")
            )));
        }
    }
    if let Some(n) = v.as_f64() {
        if let Some(min) = rule.minimum.filter(|min| n < *min) {
            return Err(AppError::Validation(format!("{} must be at least {}", column, min)));
        }
        if let Some(max) = rule.maximum.filter(|max| n > *max) {
            return Err(AppError::Validation(format!("{} must be at most {}", column, max)));
        }
    }
    Ok(())
}

fn value_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(n), Value::Number(m)) => n.as_f64() == m.as_f64(),
        _ => a == b,
    }
}

fn validate_format(column: &str, v: &Value, format: &str) -> Result<(), AppError> {
    let Some(s) = v.as_str() else { return Ok(()) };
    let ok = match format.to_lowercase().as_str() {
        "email" => s.len() >= 3 && s.split_once('@').is_some_and(|(user, host)| !user.is_empty() && !host.is_empty()),
        "uuid" => uuid::Uuid::parse_str(s).is_ok(),
        "date" => chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok(),
        "datetime" => chrono::DateTime::parse_from_rfc3339(s).is_ok(),
        _ => true,
    };
    if ok {
        Ok(())
    } else {
        Err(AppError::Validation(format!("{} must be a valid {}", column, format)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{parse_config, resolve, ResolvedModel};
    use serde_json::json;

    fn model() -> ResolvedModel {
        let entities = r#"[{"id": "users", "table": "users", "path_segment": "users",
            "columns": [{"name": "id", "type": "bigserial", "nullable": false},
                        {"name": "email", "type": "text", "nullable": false},
                        {"name": "role", "type": "text", "default": "member"},
                        {"name": "age", "type": "integer"}],
            "validation": {"email": {"format": "email", "max_length": 20},
                           "role": {"allowed": ["member", "admin"]},
                           "age": {"minimum": 0, "maximum": 150}}}]"#;
        resolve(&parse_config(entities, "[]").unwrap()).unwrap()
    }

    fn body(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_create_requires_not_null_columns() {
        let model = model();
        let users = model.entity("users").unwrap();
        let err = RequestValidator::validate(users, &body(json!({"age": 3})), ValidationMode::Create).unwrap_err();
        assert_eq!(err.to_string(), "validation: email is required");
        assert!(RequestValidator::validate(users, &body(json!({"age": 3})), ValidationMode::Update).is_ok());
    }

    #[test]
    fn test_rules() {
        let model = model();
        let users = model.entity("users").unwrap();
        let check = |v: Value| RequestValidator::validate(users, &body(v), ValidationMode::Update);
        assert!(check(json!({"email": "a@b.io"})).is_ok());
        assert!(check(json!({"email": "nope"})).is_err());
        assert!(check(json!({"email": "averyveryverylong@example.com"})).is_err());
        assert!(check(json!({"role": "owner"})).is_err());
        assert!(check(json!({"age": 200})).is_err());
        assert!(check(json!({"age": -1})).is_err());
        assert!(check(json!({"email": null})).is_err());
        assert!(check(json!({"age": null})).is_ok());
    }
}

//! Config validation: referential integrity between entities, columns and relations.

use crate::config::{EntityConfig, FullConfig};
use crate::error::ConfigError;
use std::collections::{HashMap, HashSet};

pub fn validate(config: &FullConfig) -> Result<(), ConfigError> {
    let mut entities: HashMap<&str, &EntityConfig> = HashMap::new();
    let mut path_segments = HashSet::new();
    for e in &config.entities {
        if entities.insert(e.id.as_str(), e).is_some() {
            return Err(ConfigError::Validation(format!("duplicate entity id: {}", e.id)));
        }
        if !path_segments.insert(e.path_segment.as_str()) {
            return Err(ConfigError::DuplicatePathSegment(e.path_segment.clone()));
        }
        if !e.columns.is_empty() && !has_column(e, &e.primary_key) {
            return Err(ConfigError::InvalidPrimaryKey {
                entity_id: e.id.clone(),
                column: e.primary_key.clone(),
            });
        }
        if let Some(flag) = &e.active_flag {
            if !has_column(e, &flag.column) {
                return Err(ConfigError::MissingReference {
                    kind: "active flag column",
                    id: format!("{}.{}", e.id, flag.column),
                });
            }
        }
    }

    let mut relation_keys = HashSet::new();
    for r in &config.relations {
        if !relation_keys.insert((r.from_entity_id.as_str(), r.name.as_str())) {
            return Err(ConfigError::Validation(format!(
                "duplicate relation {} on entity {}",
                r.name, r.from_entity_id
            )));
        }
        let from = entities.get(r.from_entity_id.as_str()).ok_or_else(|| ConfigError::MissingReference {
            kind: "entity",
            id: r.from_entity_id.clone(),
        })?;
        let to = entities.get(r.to_entity_id.as_str()).ok_or_else(|| ConfigError::MissingReference {
            kind: "entity",
            id: r.to_entity_id.clone(),
        })?;
        if !has_column(from, &r.local_key) || !has_column(to, &r.foreign_key) {
            return Err(ConfigError::MissingReference {
                kind: "relation key column",
                id: r.id.clone(),
            });
        }
    }

    for e in &config.entities {
        let relation_names: HashSet<&str> = config
            .relations
            .iter()
            .filter(|r| r.from_entity_id == e.id)
            .map(|r| r.name.as_str())
            .collect();
        for aggregate in &e.aggregates {
            if !relation_names.contains(aggregate.as_str()) {
                return Err(ConfigError::UnknownAggregate {
                    entity_id: e.id.clone(),
                    name: aggregate.clone(),
                });
            }
        }
    }

    Ok(())
}

/// Entities without declared columns accept any column name; timestamps are always implied.
fn has_column(entity: &EntityConfig, name: &str) -> bool {
    entity.columns.is_empty()
        || name == entity.created_at
        || name == entity.updated_at
        || entity.columns.iter().any(|c| c.name == name)
}

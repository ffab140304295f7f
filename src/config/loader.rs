//! Load entity config from JSON files and resolve it into the runtime model.

use crate::config::resolved::{ActiveFlag, ColumnInfo, PkType, RelationSpec, ResolvedEntity, ResolvedModel};
use crate::config::types::*;
use crate::config::{validate, FullConfig};
use crate::error::ConfigError;
use crate::query::{FilterableFieldSet, SortInstruction};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Arc;

/// Build resolved model from full config. Validates first.
pub fn resolve(config: &FullConfig) -> Result<ResolvedModel, ConfigError> {
    validate(config)?;

    let relations_by_entity: HashMap<&str, Vec<&RelationConfig>> =
        config.relations.iter().fold(HashMap::new(), |mut m, r| {
            m.entry(r.from_entity_id.as_str()).or_default().push(r);
            m
        });

    let mut entities = HashMap::new();
    let mut entity_id_by_path = HashMap::new();

    for e in &config.entities {
        let mut columns: Vec<ColumnInfo> = e
            .columns
            .iter()
            .map(|c| ColumnInfo {
                name: c.name.clone(),
                nullable: c.nullable,
                has_default: c.default.as_ref().is_some_and(|d| !d.is_null()),
                pg_type: column_pg_type_name(&c.type_),
                default: c.default.clone().filter(|d| !d.is_null()),
            })
            .collect();

        let declared: HashSet<String> = columns.iter().map(|c| c.name.clone()).collect();
        if !declared.is_empty() {
            for name in [&e.created_at, &e.updated_at] {
                if !declared.contains(name) {
                    columns.push(ColumnInfo {
                        name: name.clone(),
                        nullable: false,
                        has_default: true,
                        pg_type: "timestamptz".into(),
                        default: None,
                    });
                }
            }
        }

        let pk_type = e
            .columns
            .iter()
            .find(|c| c.name == e.primary_key)
            .map(infer_pk_type)
            .unwrap_or(PkType::BigInt);

        let relations = relations_by_entity
            .get(e.id.as_str())
            .map(|rels| {
                rels.iter()
                    .map(|r| RelationSpec {
                        name: r.name.clone(),
                        kind: r.kind,
                        target: r.to_entity_id.clone(),
                        local_key: r.local_key.clone(),
                        foreign_key: r.foreign_key.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default();

        let default_sort = e
            .default_sort
            .as_ref()
            .map(|s| SortInstruction::new(s.column.clone(), s.direction.clone()))
            .unwrap_or_else(|| SortInstruction::desc(e.primary_key.clone()));

        let entity = ResolvedEntity {
            id: e.id.clone(),
            schema_name: e.schema.clone(),
            table_name: e.table.clone(),
            path_segment: e.path_segment.clone(),
            primary_key: e.primary_key.clone(),
            pk_type,
            created_at: e.created_at.clone(),
            updated_at: e.updated_at.clone(),
            columns,
            filterable: FilterableFieldSet::new(
                e.filterable_fields.iter().cloned(),
                &e.primary_key,
                &e.created_at,
                &e.updated_at,
            ),
            active_flag: e.active_flag.as_ref().map(|f| ActiveFlag {
                column: f.column.clone(),
                value: f.value.clone(),
            }),
            default_sort,
            relations,
            aggregates: e.aggregates.clone(),
            operations: e.operations.clone(),
            sensitive_columns: e.sensitive_columns.iter().cloned().collect(),
            validation: e.validation.clone(),
            page_size: e.page_size.max(1),
        };
        entity_id_by_path.insert(e.path_segment.clone(), e.id.clone());
        entities.insert(e.id.clone(), Arc::new(entity));
    }

    tracing::debug!(entities = entities.len(), relations = config.relations.len(), "config resolved");
    Ok(ResolvedModel {
        entities,
        entity_id_by_path,
    })
}

/// Parse config from the JSON text of `entities.json` and `relations.json`.
pub fn parse_config(entities_json: &str, relations_json: &str) -> Result<FullConfig, ConfigError> {
    let entities = serde_json::from_str(entities_json).map_err(|e| ConfigError::Load(format!("entities: {}", e)))?;
    let relations =
        serde_json::from_str(relations_json).map_err(|e| ConfigError::Load(format!("relations: {}", e)))?;
    Ok(FullConfig { entities, relations })
}

/// Load `entities.json` (required) and `relations.json` (optional) from a directory.
pub async fn load_from_dir(dir: impl AsRef<Path>) -> Result<FullConfig, ConfigError> {
    let dir = dir.as_ref();
    let entities = tokio::fs::read_to_string(dir.join("entities.json"))
        .await
        .map_err(|e| ConfigError::Load(format!("{}: {}", dir.join("entities.json").display(), e)))?;
    let relations = tokio::fs::read_to_string(dir.join("relations.json"))
        .await
        .unwrap_or_else(|_| "[]".into());
    parse_config(&entities, &relations)
}

/// Normalized PostgreSQL type name used for parameter casts.
fn column_pg_type_name(ty: &ColumnTypeConfig) -> String {
    let name = ty.name();
    let lower = name.to_lowercase();
    match lower.as_str() {
        "timestamp with time zone" => "timestamptz".into(),
        "serial" => "integer".into(),
        "bigserial" => "bigint".into(),
        "smallserial" => "smallint".into(),
        // Schema-qualified custom type (e.g. blog.post_status); keep the case of the name.
        _ if name.contains('.') => name.to_string(),
        _ => lower,
    }
}

fn infer_pk_type(col: &ColumnConfig) -> PkType {
    let type_lower = col.type_.name().to_lowercase();
    if type_lower.contains("uuid") {
        PkType::Uuid
    } else if type_lower.contains("bigserial") || type_lower.contains("bigint") {
        PkType::BigInt
    } else if type_lower.contains("serial") || type_lower.contains("int") {
        PkType::Int
    } else {
        PkType::Text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::KnownRelations;

    const ENTITIES: &str = r#"[
        {"id": "users", "table": "users", "path_segment": "users",
         "columns": [{"name": "id", "type": "bigserial"}, {"name": "name", "type": "text"}],
         "filterable_fields": ["name"]},
        {"id": "posts", "table": "posts", "path_segment": "posts",
         "columns": [{"name": "id", "type": "bigserial"}, {"name": "title", "type": {"name": "varchar", "params": [255]}},
                     {"name": "created_by", "type": "bigint"}, {"name": "is_active", "type": "smallint", "default": 1}],
         "filterable_fields": ["title", "created_by"],
         "active_flag": {},
         "aggregates": ["comments"]},
        {"id": "comments", "table": "comments", "path_segment": "comments",
         "columns": [{"name": "id", "type": "uuid"}, {"name": "post_id", "type": "bigint"}, {"name": "user_id", "type": "bigint"}]}
    ]"#;

    const RELATIONS: &str = r#"[
        {"id": "r1", "name": "createdByUser", "from_entity_id": "posts", "to_entity_id": "users",
         "kind": "to_one", "local_key": "created_by", "foreign_key": "id"},
        {"id": "r2", "name": "comments", "from_entity_id": "posts", "to_entity_id": "comments",
         "kind": "to_many", "local_key": "id", "foreign_key": "post_id"},
        {"id": "r3", "name": "user", "from_entity_id": "comments", "to_entity_id": "users",
         "kind": "to_one", "local_key": "user_id", "foreign_key": "id"}
    ]"#;

    fn model() -> ResolvedModel {
        resolve(&parse_config(ENTITIES, RELATIONS).unwrap()).unwrap()
    }

    #[test]
    fn test_resolve_fills_defaults() {
        let model = model();
        let posts = model.entity_by_path("posts").unwrap();
        assert_eq!(posts.primary_key, "id");
        assert_eq!(posts.pk_type, PkType::BigInt);
        assert_eq!(posts.default_sort, SortInstruction::desc("id"));
        assert_eq!(posts.page_size, 25);
        assert!(posts.filterable.contains("created_at"));
        assert!(posts.filterable.contains("title"));
        assert!(!posts.filterable.contains("is_active"));
        let flag = posts.active_flag.as_ref().unwrap();
        assert_eq!(flag.column, "is_active");
        assert_eq!(flag.value, serde_json::json!(1));
        assert_eq!(posts.column("title").unwrap().pg_type, "varchar");
        assert!(posts.column("updated_at").is_some());
        assert!(posts.column("is_active").unwrap().has_default);
    }

    #[test]
    fn test_nested_relation_paths() {
        let model = model();
        let posts = model.entity("posts").unwrap();
        let known = model.known_relations(posts);
        assert!(known.has_relation_path("createdByUser"));
        assert!(known.has_relation_path("comments.user"));
        assert!(!known.has_relation_path("comments.ghost"));
        assert!(!known.has_relation_path("user"));
        assert!(known.has_aggregate("comments"));
        assert!(!known.has_aggregate("createdByUser"));
    }

    #[test]
    fn test_unknown_aggregate_is_config_error() {
        let mut config = parse_config(ENTITIES, RELATIONS).unwrap();
        config.entities[1].aggregates.push("likes".into());
        assert!(matches!(resolve(&config), Err(ConfigError::UnknownAggregate { .. })));
    }

    #[test]
    fn test_relation_to_missing_entity_is_config_error() {
        let mut config = parse_config(ENTITIES, RELATIONS).unwrap();
        config.relations[0].to_entity_id = "ghosts".into();
        assert!(matches!(resolve(&config), Err(ConfigError::MissingReference { kind: "entity", .. })));
    }

    #[test]
    fn test_duplicate_path_segment_is_config_error() {
        let mut config = parse_config(ENTITIES, RELATIONS).unwrap();
        config.entities[2].path_segment = "posts".into();
        assert!(matches!(resolve(&config), Err(ConfigError::DuplicatePathSegment(_))));
    }

    #[test]
    fn test_bad_json_is_load_error() {
        assert!(matches!(parse_config("{", "[]"), Err(ConfigError::Load(_))));
    }
}

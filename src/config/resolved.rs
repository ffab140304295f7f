//! Resolved entity model: config validated and flattened for runtime use.

use crate::config::{RelationKind, ValidationRule};
use crate::query::{FilterableFieldSet, KnownRelations, SortInstruction};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Primary key type for parsing path/body ids.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PkType {
    Uuid,
    BigInt,
    Int,
    Text,
}

#[derive(Clone, Debug)]
pub struct ColumnInfo {
    pub name: String,
    pub nullable: bool,
    /// Whether the column has a DB default (e.g. gen_random_uuid(), NOW()).
    pub has_default: bool,
    /// PostgreSQL type name used for `$n::type` casts when binding text parameters.
    pub pg_type: String,
    /// Literal default from config, applied by backends that do not own the schema.
    pub default: Option<Value>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ActiveFlag {
    pub column: String,
    pub value: Value,
}

#[derive(Clone, Debug)]
pub struct RelationSpec {
    pub name: String,
    pub kind: RelationKind,
    /// Entity id of the related entity.
    pub target: String,
    /// Our column in the join.
    pub local_key: String,
    /// Their column in the join.
    pub foreign_key: String,
}

#[derive(Clone, Debug)]
pub struct ResolvedEntity {
    pub id: String,
    pub schema_name: String,
    pub table_name: String,
    pub path_segment: String,
    pub primary_key: String,
    pub pk_type: PkType,
    pub created_at: String,
    pub updated_at: String,
    pub columns: Vec<ColumnInfo>,
    pub filterable: FilterableFieldSet,
    pub active_flag: Option<ActiveFlag>,
    pub default_sort: SortInstruction,
    pub relations: Vec<RelationSpec>,
    pub aggregates: Vec<String>,
    pub operations: Vec<String>,
    pub sensitive_columns: HashSet<String>,
    pub validation: HashMap<String, ValidationRule>,
    pub page_size: u64,
}

impl ResolvedEntity {
    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn relation(&self, name: &str) -> Option<&RelationSpec> {
        self.relations.iter().find(|r| r.name == name)
    }

    pub fn allows(&self, operation: &str) -> bool {
        self.operations.iter().any(|o| o == operation)
    }
}

#[derive(Clone, Debug, Default)]
pub struct ResolvedModel {
    pub entities: HashMap<String, Arc<ResolvedEntity>>,
    pub entity_id_by_path: HashMap<String, String>,
}

impl ResolvedModel {
    pub fn entity(&self, id: &str) -> Option<&Arc<ResolvedEntity>> {
        self.entities.get(id)
    }

    pub fn entity_by_path(&self, path: &str) -> Option<&Arc<ResolvedEntity>> {
        self.entity_id_by_path.get(path).and_then(|id| self.entities.get(id))
    }

    /// Walk a dotted relation path from `entity`. Returns each hop's relation and target entity.
    pub fn relation_chain<'a>(
        &'a self,
        entity: &'a ResolvedEntity,
        path: &str,
    ) -> Option<Vec<(&'a RelationSpec, &'a ResolvedEntity)>> {
        let mut current = entity;
        let mut chain = Vec::new();
        for segment in path.split('.') {
            let relation = current.relation(segment)?;
            let target: &'a ResolvedEntity = self.entity(&relation.target)?.as_ref();
            chain.push((relation, target));
            current = target;
        }
        Some(chain)
    }

    /// Relation lookup for one entity, used by the inclusion resolver.
    pub fn known_relations<'a>(&'a self, entity: &'a ResolvedEntity) -> EntityRelations<'a> {
        EntityRelations { model: self, entity }
    }
}

pub struct EntityRelations<'a> {
    model: &'a ResolvedModel,
    entity: &'a ResolvedEntity,
}

impl KnownRelations for EntityRelations<'_> {
    fn has_relation_path(&self, path: &str) -> bool {
        self.model.relation_chain(self.entity, path).is_some()
    }

    fn has_aggregate(&self, name: &str) -> bool {
        self.entity.aggregates.iter().any(|a| a == name)
    }
}

use repokit::{parse_config, resolve, MemoryStorage, ResolvedModel};
use serde_json::json;
use std::sync::Arc;

const ENTITIES: &str = r#"[
  {
    "id": "people", "table": "people", "path_segment": "people",
    "columns": [
      { "name": "id", "type": "bigserial", "nullable": false },
      { "name": "name", "type": "text", "nullable": false },
      { "name": "status", "type": "text", "nullable": false, "default": "draft" }
    ],
    "filterable_fields": ["name", "status"],
    "operations": ["read", "create", "delete"],
    "page_size": 10
  },
  {
    "id": "authors", "table": "authors", "path_segment": "authors",
    "columns": [
      { "name": "id", "type": "bigserial", "nullable": false },
      { "name": "name", "type": "text", "nullable": false },
      { "name": "secret", "type": "text" },
      { "name": "is_active", "type": "smallint", "nullable": false, "default": 1 }
    ],
    "filterable_fields": ["name"],
    "active_flag": { "column": "is_active", "value": 1 },
    "aggregates": ["books"],
    "sensitive_columns": ["secret"]
  },
  {
    "id": "books", "schema": "library", "table": "books", "path_segment": "books",
    "columns": [
      { "name": "id", "type": "bigserial", "nullable": false },
      { "name": "title", "type": "text", "nullable": false },
      { "name": "author_id", "type": "bigint", "nullable": false },
      { "name": "status", "type": "text", "nullable": false, "default": "draft" },
      { "name": "pages", "type": "integer" }
    ],
    "filterable_fields": ["title", "author_id", "status", "pages"],
    "default_sort": { "column": "id", "direction": "asc" },
    "validation": { "status": { "allowed": ["draft", "published"] } }
  }
]"#;

const RELATIONS: &str = r#"[
  { "id": "authors_books", "name": "books", "from_entity_id": "authors", "to_entity_id": "books",
    "kind": "to_many", "local_key": "id", "foreign_key": "author_id" },
  { "id": "books_author", "name": "author", "from_entity_id": "books", "to_entity_id": "authors",
    "kind": "to_one", "local_key": "author_id", "foreign_key": "id" }
]"#;

pub fn model() -> Arc<ResolvedModel> {
    let config = parse_config(ENTITIES, RELATIONS).expect("fixture config parses");
    Arc::new(resolve(&config).expect("fixture config resolves"))
}

/// Storage seeded with four people, two active authors plus one inactive, and five books.
pub fn seeded() -> (Arc<ResolvedModel>, MemoryStorage) {
    let model = model();
    let storage = MemoryStorage::recording(model.clone());
    storage
        .seed(
            "people",
            [
                json!({"name": "John", "status": "published"}),
                json!({"name": "Joan", "status": "draft"}),
                json!({"name": "Mary", "status": "published"}),
                json!({"name": "Jo", "status": "archived"}),
            ],
        )
        .expect("seed people");
    storage
        .seed(
            "authors",
            [
                json!({"name": "Ursula", "secret": "s1", "is_active": 1}),
                json!({"name": "Iain", "secret": "s2", "is_active": 1}),
                json!({"name": "Gone", "secret": "s3", "is_active": 0}),
            ],
        )
        .expect("seed authors");
    storage
        .seed(
            "books",
            [
                json!({"title": "Dispossessed", "author_id": 1, "status": "published", "pages": 387}),
                json!({"title": "Lathe", "author_id": 1, "status": "draft", "pages": 184}),
                json!({"title": "Excession", "author_id": 2, "status": "published", "pages": 451}),
                json!({"title": "Matter", "author_id": 2, "status": "published", "pages": null}),
                json!({"title": "Orphan", "author_id": 3, "status": "draft", "pages": 90}),
            ],
        )
        .expect("seed books");
    (model, storage)
}

//! Entity handlers: search/list, read, create, bulk create, update, delete.
//! Each request builds its own repository from the shared state.

use crate::config::{PkType, ResolvedEntity};
use crate::error::AppError;
use crate::query::RequestParams;
use crate::repository::UpdateOptions;
use crate::response::{success_many, success_one, success_page};
use crate::state::AppState;
use crate::store::Storage;
use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{Map, Value};

const BULK_LIMIT: usize = 100;

fn parse_id(id_str: &str, pk_type: &PkType) -> Result<Value, AppError> {
    Ok(match pk_type {
        PkType::Uuid => {
            let u = uuid::Uuid::parse_str(id_str).map_err(|_| AppError::BadRequest(format!("invalid uuid: {}", id_str)))?;
            Value::String(u.to_string())
        }
        PkType::BigInt | PkType::Int => {
            let n: i64 = id_str
                .trim()
                .parse()
                .map_err(|_| AppError::BadRequest(format!("invalid id: {}", id_str)))?;
            Value::Number(n.into())
        }
        PkType::Text => Value::String(id_str.to_string()),
    })
}

/// Ids from a JSON body: strings are parsed like path ids, numbers pass through.
fn parse_body_id(v: &Value, pk_type: &PkType) -> Result<Value, AppError> {
    match v {
        Value::String(s) => parse_id(s, pk_type),
        Value::Number(_) => Ok(v.clone()),
        other => Err(AppError::BadRequest(format!("invalid id: {}", other))),
    }
}

fn body_to_map(value: Value) -> Result<Map<String, Value>, AppError> {
    match value {
        Value::Object(m) => Ok(m),
        _ => Err(AppError::BadRequest("body must be a JSON object".into())),
    }
}

fn ensure_allowed(entity: &ResolvedEntity, operation: &str) -> Result<(), AppError> {
    if entity.allows(operation) {
        Ok(())
    } else {
        Err(AppError::BadRequest(format!("{} not allowed on {}", operation, entity.path_segment)))
    }
}

/// Drop columns marked sensitive from a top-level row.
fn redact(entity: &ResolvedEntity, mut row: Value) -> Value {
    if let Value::Object(map) = &mut row {
        map.retain(|k, _| !entity.sensitive_columns.contains(k));
    }
    row
}

/// `GET /{entity}`: paginated search, or every row when `paginate=false`.
pub async fn list<S: Storage>(
    State(state): State<AppState<S>>,
    Path(path_segment): Path<String>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<Response, AppError> {
    let entity = state.entity_by_path(&path_segment)?;
    ensure_allowed(&entity, "read")?;
    let params: RequestParams = params.into_iter().collect();
    let paginate = params.get("paginate").map_or(true, |v| !v.eq_ignore_ascii_case("false"));
    let mut repo = state.repository(entity.clone(), params);

    if paginate {
        let mut page = repo.search().await?;
        page.data = page.data.into_iter().map(|row| redact(&entity, row)).collect();
        Ok(success_page(page).into_response())
    } else {
        let rows = repo.all(&[]).await?;
        let rows = rows.into_iter().map(|row| redact(&entity, row)).collect();
        Ok(success_many(StatusCode::OK, rows).into_response())
    }
}

/// `GET /{entity}/{id}`; honours `include`/`contain`.
pub async fn read<S: Storage>(
    State(state): State<AppState<S>>,
    Path((path_segment, id_str)): Path<(String, String)>,
    Query(params): Query<Vec<(String, String)>>,
) -> Result<impl IntoResponse, AppError> {
    let entity = state.entity_by_path(&path_segment)?;
    ensure_allowed(&entity, "read")?;
    let id = parse_id(&id_str, &entity.pk_type)?;
    let mut repo = state
        .repository(entity.clone(), params.into_iter().collect())
        .with_requested_relations();
    let row = repo.find(&id, &[]).await?;
    Ok(success_one(StatusCode::OK, redact(&entity, row)))
}

pub async fn create<S: Storage>(
    State(state): State<AppState<S>>,
    Path(path_segment): Path<String>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, AppError> {
    let entity = state.entity_by_path(&path_segment)?;
    ensure_allowed(&entity, "create")?;
    let body = body_to_map(body)?;
    let mut repo = state.repository(entity.clone(), RequestParams::new());
    let row = repo.create(&body).await?;
    Ok(success_one(StatusCode::CREATED, redact(&entity, row)))
}

pub async fn bulk_create<S: Storage>(
    State(state): State<AppState<S>>,
    Path(path_segment): Path<String>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, AppError> {
    let entity = state.entity_by_path(&path_segment)?;
    ensure_allowed(&entity, "bulk_create")?;
    let Value::Array(items) = body else {
        return Err(AppError::BadRequest("body must be a JSON array".into()));
    };
    if items.len() > BULK_LIMIT {
        return Err(AppError::BadRequest(format!("bulk create limited to {} items", BULK_LIMIT)));
    }
    let items = items.into_iter().map(body_to_map).collect::<Result<Vec<_>, _>>()?;
    let mut repo = state.repository(entity.clone(), RequestParams::new());
    let rows = repo.create_multiple(&items).await?;
    let rows = rows.into_iter().map(|row| redact(&entity, row)).collect();
    Ok(success_many(StatusCode::CREATED, rows))
}

pub async fn update<S: Storage>(
    State(state): State<AppState<S>>,
    Path((path_segment, id_str)): Path<(String, String)>,
    Json(body): Json<Value>,
) -> Result<impl IntoResponse, AppError> {
    let entity = state.entity_by_path(&path_segment)?;
    ensure_allowed(&entity, "update")?;
    let id = parse_id(&id_str, &entity.pk_type)?;
    let body = body_to_map(body)?;
    let mut repo = state.repository(entity.clone(), RequestParams::new());
    let row = repo.update_by_id(&id, &body, UpdateOptions::default()).await?;
    Ok(success_one(StatusCode::OK, redact(&entity, row)))
}

/// `ids` from a `{"ids": [...]}` body, parsed by primary key type.
fn parse_body_ids(body: &[u8], entity: &ResolvedEntity) -> Result<Vec<Value>, AppError> {
    let body: Value =
        serde_json::from_slice(body).map_err(|e| AppError::BadRequest(format!("invalid JSON body: {}", e)))?;
    body.get("ids")
        .and_then(Value::as_array)
        .ok_or_else(|| AppError::BadRequest("body must carry an `ids` array".into()))?
        .iter()
        .map(|v| parse_body_id(v, &entity.pk_type))
        .collect()
}

/// `DELETE /{entity}` with `{"ids": [...]}`: deletes every listed id that exists.
pub async fn delete_many<S: Storage>(
    State(state): State<AppState<S>>,
    Path(path_segment): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let entity = state.entity_by_path(&path_segment)?;
    ensure_allowed(&entity, "delete")?;
    let ids = parse_body_ids(&body, &entity)?;
    let mut repo = state.repository(entity, RequestParams::new());
    let deleted = repo.delete_multiple_by_id(&ids).await?;
    Ok(success_one(StatusCode::OK, serde_json::json!({ "deleted": deleted })))
}

/// `DELETE /{entity}/{id}`.
///
/// Id `0` with a non-empty body is the older spelling of `DELETE /{entity}` and deletes the
/// body's `ids`. Without a body, `0` is an ordinary primary key.
pub async fn delete<S: Storage>(
    State(state): State<AppState<S>>,
    Path((path_segment, id_str)): Path<(String, String)>,
    body: Bytes,
) -> Result<Response, AppError> {
    let entity = state.entity_by_path(&path_segment)?;
    ensure_allowed(&entity, "delete")?;
    let mut repo = state.repository(entity.clone(), RequestParams::new());

    if id_str.trim() == "0" && !body.iter().all(u8::is_ascii_whitespace) {
        let ids = parse_body_ids(&body, &entity)?;
        let deleted = repo.delete_multiple_by_id(&ids).await?;
        return Ok(success_one(StatusCode::OK, serde_json::json!({ "deleted": deleted })).into_response());
    }

    let id = parse_id(&id_str, &entity.pk_type)?;
    repo.delete_by_id(&id).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

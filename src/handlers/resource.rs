//! Generic CRUD router, instantiated once per entry of the resource catalog.
//!
//! Mounted under `/<name>`, it serves:
//!
//! | Method | Path                  | Action                         |
//! |--------|-----------------------|--------------------------------|
//! | GET    | `/:key`               | fetch by natural key           |
//! | GET    | `/<name>/all`         | list every row                 |
//! | GET    | `/<name>/:id`         | fetch by id                    |
//! | POST   | `/<name>/create`      | insert                         |
//! | POST   | `/<name>/update/:id`  | partial update                 |
//! | DELETE | `/delete/:target`     | delete by id or natural key    |
//!
//! Every route requires a valid token.

use std::collections::HashMap;

use axum::{
    extract::{Path, State},
    middleware::from_fn_with_state,
    routing::{delete, get, post},
    Json, Router,
};
use serde_json::{json, Value};

use crate::app::AppState;
use crate::error::ApiError;
use crate::middleware::{require_token, ApiResponse, ApiResult};
use crate::resources::{Record, ResourceDef};

#[derive(Clone)]
pub struct ResourceState {
    pub app: AppState,
    pub def: &'static ResourceDef,
}

pub fn router(app: AppState, def: &'static ResourceDef) -> Router {
    let name = def.name;
    let mut router = Router::new()
        .route(&format!("/{}/all", name), get(list_all))
        .route(&format!("/{}/:id", name), get(get_by_id))
        .route(&format!("/{}/update/:id", name), post(update))
        .route("/delete/:target", delete(remove));

    if def.key.is_some() {
        router = router.route("/:key", get(get_by_key));
    }
    if def.create_route {
        router = router.route(&format!("/{}/create", name), post(create));
    }

    router
        .route_layer(from_fn_with_state(app.clone(), require_token))
        .with_state(ResourceState { app, def })
}

async fn list_all(State(state): State<ResourceState>) -> ApiResult<Vec<Record>> {
    let def = state.def;
    let records = state.app.store.list(def).await?;
    Ok(ApiResponse::success(
        records.into_iter().map(|r| def.redact(r)).collect(),
    ))
}

async fn get_by_id(
    State(state): State<ResourceState>,
    Path(id): Path<String>,
) -> ApiResult<Record> {
    let def = state.def;
    let id = parse_id(&id)?;

    let record = state
        .app
        .store
        .find_by(def, "id", &id.to_string())
        .await?
        .ok_or_else(|| not_found(def, &id.to_string()))?;

    Ok(ApiResponse::success(def.redact(record)))
}

async fn get_by_key(
    State(state): State<ResourceState>,
    Path(key): Path<String>,
) -> ApiResult<Record> {
    let def = state.def;
    let Some(column) = def.key else {
        return Err(not_found(def, &key));
    };

    let record = state
        .app
        .store
        .find_by(def, column, &key)
        .await?
        .ok_or_else(|| not_found(def, &key))?;

    Ok(ApiResponse::success(def.redact(record)))
}

async fn create(
    State(state): State<ResourceState>,
    Json(payload): Json<Record>,
) -> ApiResult<Record> {
    let def = state.def;
    let fields = writable_payload(&state.app, def, payload).await?;

    let record = state.app.store.insert(def, &fields).await?;
    tracing::info!("Created {} {}", def.label, record.get("id").unwrap_or(&serde_json::Value::Null));

    Ok(ApiResponse::created(def.redact(record)))
}

async fn update(
    State(state): State<ResourceState>,
    Path(id): Path<String>,
    Json(payload): Json<Record>,
) -> ApiResult<Record> {
    let def = state.def;
    let id = parse_id(&id)?;

    if payload.is_empty() {
        return Err(ApiError::bad_request("No fields to update"));
    }
    let fields = writable_payload(&state.app, def, payload).await?;

    let record = state
        .app
        .store
        .update(def, id, &fields)
        .await?
        .ok_or_else(|| not_found(def, &id.to_string()))?;
    tracing::info!("Updated {} {}", def.label, id);

    Ok(ApiResponse::success(def.redact(record)))
}

/// A numeric target addresses the id; anything else addresses the natural key.
async fn remove(
    State(state): State<ResourceState>,
    Path(target): Path<String>,
) -> ApiResult<Value> {
    let def = state.def;

    let column = if target.parse::<i64>().is_ok() {
        "id"
    } else {
        def.key.ok_or_else(|| {
            ApiError::bad_request(format!("{} records can only be deleted by id", def.label))
        })?
    };

    let deleted = state.app.store.delete_by(def, column, &target).await?;
    if deleted == 0 {
        return Err(not_found(def, &target));
    }
    tracing::info!("Deleted {} {} by {}", def.label, target, column);

    Ok(ApiResponse::success(json!({ "deleted": deleted })))
}

/// Check a create/update payload against the writable columns and hash the
/// secret column when present.
pub(crate) async fn writable_payload(
    app: &AppState,
    def: &ResourceDef,
    mut payload: Record,
) -> Result<Record, ApiError> {
    let unknown = def.unknown_fields(&payload);
    if !unknown.is_empty() {
        let field_errors: HashMap<String, String> = unknown
            .iter()
            .map(|field| (field.clone(), "Unknown field".to_string()))
            .collect();
        return Err(ApiError::validation_error(
            format!("Unknown fields for {}: {}", def.label, unknown.join(", ")),
            Some(field_errors),
        ));
    }

    if let Some(secret) = def.secret {
        if let Some(value) = payload.get(secret) {
            let plaintext = match value.as_str() {
                Some(s) if !s.is_empty() => s,
                _ => return Err(ApiError::field_error(secret, "Password must be a non-empty string")),
            };
            let hashed = app.passwords.hash(plaintext).await?;
            payload.insert(secret.to_string(), Value::String(hashed));
        }
    }

    Ok(payload)
}

fn parse_id(raw: &str) -> Result<i64, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::bad_request(format!("Invalid id '{}'", raw)))
}

fn not_found(def: &ResourceDef, target: &str) -> ApiError {
    ApiError::not_found(format!("{} '{}' not found", def.label, target))
}

//! Users router: the generic CRUD routes for the users table plus signup,
//! signin, the current-user lookup and the role check.

use axum::{
    extract::{Path, State},
    middleware::from_fn_with_state,
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::app::AppState;
use crate::auth::{AuthError, Identity};
use crate::error::ApiError;
use crate::handlers::resource::{self, writable_payload};
use crate::middleware::{require_token, ApiResponse, ApiResult, AuthUser};
use crate::resources::{Record, USERS};

pub fn router(app: AppState) -> Router {
    let public = Router::new()
        .route("/signup", post(signup))
        .route("/signup/", post(signup))
        .route("/signin", post(signin))
        .route("/signin/", post(signin));

    let protected = Router::new()
        .route("/users/token", get(current_user))
        .route("/users/role/:id", get(user_role))
        .route_layer(from_fn_with_state(app.clone(), require_token));

    resource::router(app.clone(), &USERS).merge(public.merge(protected).with_state(app))
}

#[derive(Debug, Deserialize)]
pub struct SigninRequest {
    #[serde(default)]
    pub user_email: Option<String>,
    #[serde(default)]
    pub user_password: Option<String>,
}

fn required(value: Option<&str>, missing: AuthError) -> Result<String, AuthError> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(missing),
    }
}

/// POST /users/signup/
async fn signup(
    State(app): State<AppState>,
    Json(mut payload): Json<Record>,
) -> Result<Json<Value>, ApiError> {
    let email = required(
        payload.get("user_email").and_then(Value::as_str),
        AuthError::MissingEmail,
    )?;
    required(
        payload.get("user_password").and_then(Value::as_str),
        AuthError::MissingPassword,
    )?;
    // Stored exactly as signin will look it up
    payload.insert("user_email".to_string(), Value::String(email.clone()));

    let fields = writable_payload(&app, &USERS, payload).await?;
    let user = app.store.insert(&USERS, &fields).await?;
    let id = user_id(&user)?;

    let (token, _) = app.tokens.issue(&Identity::new(id, Some(email.clone())))?;
    tracing::info!("Registered user {} ({})", id, email);

    Ok(Json(json!({
        "auth": true,
        "user": USERS.redact(user),
        "token": token
    })))
}

/// POST /users/signin/
async fn signin(
    State(app): State<AppState>,
    Json(request): Json<SigninRequest>,
) -> Result<Json<Value>, ApiError> {
    let email = required(request.user_email.as_deref(), AuthError::MissingEmail)?;
    // Passwords are compared as sent; only emptiness is checked
    let password = match request.user_password {
        Some(p) if !p.is_empty() => p,
        _ => return Err(AuthError::MissingPassword.into()),
    };

    let user = app
        .store
        .find_by(&USERS, "user_email", &email)
        .await?
        .ok_or_else(|| {
            tracing::warn!("Signin for unregistered email {}", email);
            AuthError::NotRegistered
        })?;

    let stored_hash = user
        .get("user_password")
        .and_then(Value::as_str)
        .unwrap_or_default();
    if !app.passwords.verify(&password, stored_hash).await {
        tracing::warn!("Signin with incorrect password for {}", email);
        return Err(AuthError::IncorrectPassword.into());
    }

    let id = user_id(&user)?;
    let (token, claims) = app.tokens.issue(&Identity::new(id, Some(email.clone())))?;
    tracing::info!("User {} signed in", id);

    Ok(Json(json!({
        "auth": true,
        "message": format!("Welcome, {}", email),
        "token": token,
        "decode": claims
    })))
}

/// GET /users/users/token
async fn current_user(
    State(app): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> ApiResult<Record> {
    let user = app
        .store
        .find_by(&USERS, "id", &auth.id.to_string())
        .await?
        .ok_or_else(|| {
            tracing::warn!("Token for {:?} refers to a deleted user {}", auth.email, auth.id);
            ApiError::not_found("User not found")
        })?;

    Ok(ApiResponse::success(USERS.redact(user)))
}

/// GET /users/users/role/:id
async fn user_role(State(app): State<AppState>, Path(id): Path<String>) -> ApiResult<Value> {
    let id: i64 = id
        .parse()
        .map_err(|_| ApiError::bad_request(format!("Invalid id '{}'", id)))?;

    // A missing user and a user without a role both have no joined row
    let role = app
        .store
        .role_of(id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;

    if !app.config.security.allowed_roles.contains(&role) {
        tracing::warn!("User {} denied with role {}", id, role);
        return Err(ApiError::forbidden("Access denied"));
    }

    Ok(ApiResponse::success(json!({
        "message": "Access granted",
        "role": role
    })))
}

fn user_id(user: &Record) -> Result<i64, ApiError> {
    user.get("id").and_then(Value::as_i64).ok_or_else(|| {
        tracing::error!("Stored user row has no numeric id");
        ApiError::internal_server_error("An error occurred while processing your request")
    })
}

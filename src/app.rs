use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, State},
    http::HeaderValue,
    routing::get,
    Router,
};
use serde_json::{json, Value};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::auth::{PasswordHasher, TokenIssuer};
use crate::config::AppConfig;
use crate::database::Store;
use crate::error::ApiError;
use crate::handlers::{resource, users};
use crate::middleware::{ApiResponse, ApiResult};
use crate::resources::CATALOG;

/// Shared request context: configuration, the data store and the credential services.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn Store>,
    pub tokens: Arc<TokenIssuer>,
    pub passwords: PasswordHasher,
}

impl AppState {
    pub fn new(config: AppConfig, store: Arc<dyn Store>) -> Self {
        let tokens = TokenIssuer::new(&config.security.jwt_secret, config.token_ttl());
        let passwords = PasswordHasher::new(config.security.bcrypt_cost);

        Self {
            config: Arc::new(config),
            store,
            tokens: Arc::new(tokens),
            passwords,
        }
    }
}

/// Build the full application router.
pub fn app(state: AppState) -> Router {
    let mut router = Router::new()
        // Public
        .route("/", get(root))
        .route("/health", get(health))
        .with_state(state.clone())
        .nest("/users", users::router(state.clone()));

    for def in CATALOG.iter().copied() {
        router = router.nest(&format!("/{}", def.name), resource::router(state.clone(), def));
    }

    let config = &state.config;
    router = router.layer(DefaultBodyLimit::max(config.api.max_request_size_bytes));

    if config.security.enable_cors {
        router = router.layer(cors_layer(&config.security.cors_origins));
    }
    if config.api.enable_request_logging {
        router = router.layer(TraceLayer::new_for_http());
    }

    router
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin '{}'", origin);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods(Any)
        .allow_headers(Any)
}

async fn root() -> ApiResponse<Value> {
    let mut resources: Vec<String> = CATALOG.iter().map(|def| format!("/{}", def.name)).collect();
    resources.insert(0, "/users".to_string());

    ApiResponse::success(json!({
        "name": "Backoffice API",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Back-office REST API for users, clients and business records",
        "endpoints": {
            "public": ["/", "/health", "/users/signup/", "/users/signin/"],
            "resources": resources,
            "auth": "send the token from signin in the x-access-token header"
        }
    }))
}

async fn health(State(state): State<AppState>) -> ApiResult<Value> {
    match state.store.ping().await {
        Ok(()) => Ok(ApiResponse::success(json!({
            "status": "ok",
            "database": "connected"
        }))),
        Err(e) => {
            tracing::warn!("Health check failed: {}", e);
            Err(ApiError::service_unavailable("Database unavailable"))
        }
    }
}

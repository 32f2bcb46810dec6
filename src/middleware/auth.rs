use axum::{
    extract::{Request, State},
    http::{header::AUTHORIZATION, HeaderMap},
    middleware::Next,
    response::Response,
};

use crate::app::AppState;
use crate::auth::{AuthError, Claims};
use crate::error::ApiError;

/// Header carrying the session token.
pub const TOKEN_HEADER: &str = "x-access-token";

/// Authenticated caller extracted from a verified token
#[derive(Clone, Debug)]
pub struct AuthUser {
    pub id: i64,
    pub email: Option<String>,
}

impl From<Claims> for AuthUser {
    fn from(claims: Claims) -> Self {
        Self {
            id: claims.id,
            email: claims.email,
        }
    }
}

/// Reject requests without a valid token; on success the caller's identity is
/// available to handlers as `Extension<AuthUser>`.
pub async fn require_token(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let path = request.uri().path().to_string();

    let token = extract_token(request.headers()).ok_or_else(|| {
        tracing::warn!("Rejected {}: no token provided", path);
        ApiError::from(AuthError::MissingToken)
    })?;

    let claims = state.tokens.verify(&token).map_err(|e| {
        tracing::warn!("Rejected {}: {}", path, e);
        ApiError::from(e)
    })?;

    tracing::debug!("Authenticated user {} for {}", claims.id, path);
    request.extensions_mut().insert(AuthUser::from(claims));

    Ok(next.run(request).await)
}

/// Token from `x-access-token`, falling back to `Authorization: Bearer`.
fn extract_token(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = header_str(headers, TOKEN_HEADER) {
        return Some(token.to_string());
    }

    header_str(headers, AUTHORIZATION.as_str())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

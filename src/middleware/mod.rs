pub mod auth;
pub mod response;

pub use auth::{require_token, AuthUser, TOKEN_HEADER};
pub use response::{ApiResponse, ApiResult};

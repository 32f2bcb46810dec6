//! Credentials and tokens: bcrypt password hashing and JWT issue/verify.

use thiserror::Error;

pub mod password;
pub mod token;

pub use password::{PasswordError, PasswordHasher};
pub use token::{Claims, Identity, TokenError, TokenIssuer};

/// Failures of the signin flow and the token guard. Each maps to a distinct response.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Email is required")]
    MissingEmail,

    #[error("Password is required")]
    MissingPassword,

    #[error("User is not registered, please sign up")]
    NotRegistered,

    #[error("Incorrect password, please check it")]
    IncorrectPassword,

    #[error("No token provided")]
    MissingToken,

    #[error(transparent)]
    Token(#[from] TokenError),
}

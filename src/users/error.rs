use axum::http::StatusCode;
use thiserror::Error;

/// Failure kinds surfaced by the account operations. The message for
/// `InvalidCredentials` deliberately does not say whether the email or the
/// password was wrong, and `InvalidToken` does not say whether the token
/// was unknown or expired.
#[derive(Debug, Error)]
pub enum AccountError {
    #[error("email or password is incorrect")]
    InvalidCredentials,

    #[error("invalid or expired token")]
    InvalidToken,

    #[error("email \"{0}\" is already taken")]
    DuplicateEmail(String),

    #[error("user not found")]
    NotFound,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AccountError {
    pub fn status(&self) -> StatusCode {
        match self {
            AccountError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AccountError::InvalidToken => StatusCode::BAD_REQUEST,
            AccountError::DuplicateEmail(_) => StatusCode::CONFLICT,
            AccountError::NotFound => StatusCode::NOT_FOUND,
            AccountError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

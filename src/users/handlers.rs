use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{error, instrument, warn};
use uuid::Uuid;

use crate::{
    auth::jwt::AuthUser,
    state::AppState,
    users::{
        dto::{
            AuthResponse, AuthenticateRequest, ForgotPasswordRequest, MessageResponse,
            RegisterRequest, ResetPasswordRequest, UpdateUserRequest, UserProfile,
            ValidateResetTokenRequest, VerifyEmailRequest,
        },
        error::AccountError,
        services,
    },
};

pub fn public_routes() -> Router<AppState> {
    Router::new()
        .route("/users/register", post(register))
        .route("/users/authenticate", post(authenticate))
        .route("/users/verify-email", post(verify_email))
        .route("/users/forgot-password", post(forgot_password))
        .route("/users/validate-reset-token", post(validate_reset_token))
        .route("/users/reset-password", post(reset_password))
}

pub fn account_routes() -> Router<AppState> {
    Router::new().route("/users", get(list_users)).route(
        "/users/:id",
        get(get_user).put(update_user).delete(delete_user),
    )
}

fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn to_http(e: AccountError) -> (StatusCode, String) {
    if let AccountError::Internal(ref inner) = e {
        error!(error = %inner, "account operation failed");
    }
    (e.status(), e.to_string())
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    Json(mut payload): Json<RegisterRequest>,
) -> Result<Json<MessageResponse>, (StatusCode, String)> {
    payload.email = payload.email.trim().to_lowercase();

    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err((StatusCode::BAD_REQUEST, "Invalid email".into()));
    }
    if payload.username.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "Username is required".into()));
    }
    if payload.password.len() < 8 {
        warn!("password too short");
        return Err((StatusCode::BAD_REQUEST, "Password too short".into()));
    }

    services::register(
        &state,
        &payload.email,
        payload.username.trim(),
        &payload.password,
    )
    .await
    .map_err(to_http)?;

    Ok(Json(MessageResponse::new(
        "Registration successful, please check your email for verification instructions",
    )))
}

#[instrument(skip(state, payload))]
pub async fn authenticate(
    State(state): State<AppState>,
    Json(mut payload): Json<AuthenticateRequest>,
) -> Result<Json<AuthResponse>, (StatusCode, String)> {
    payload.email = payload.email.trim().to_lowercase();

    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err((StatusCode::BAD_REQUEST, "Invalid email".into()));
    }

    let response = services::authenticate(&state, &payload.email, &payload.password)
        .await
        .map_err(to_http)?;
    Ok(Json(response))
}

#[instrument(skip(state, payload))]
pub async fn verify_email(
    State(state): State<AppState>,
    Json(payload): Json<VerifyEmailRequest>,
) -> Result<Json<MessageResponse>, (StatusCode, String)> {
    services::verify_email(&state, &payload.token)
        .await
        .map_err(to_http)?;
    Ok(Json(MessageResponse::new(
        "Verification successful, you can now login",
    )))
}

#[instrument(skip(state, payload))]
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(mut payload): Json<ForgotPasswordRequest>,
) -> Result<Json<MessageResponse>, (StatusCode, String)> {
    payload.email = payload.email.trim().to_lowercase();

    if !is_valid_email(&payload.email) {
        warn!(email = %payload.email, "invalid email");
        return Err((StatusCode::BAD_REQUEST, "Invalid email".into()));
    }

    services::forgot_password(&state, &payload.email)
        .await
        .map_err(to_http)?;
    Ok(Json(MessageResponse::new(
        "Please check your email for password reset instructions",
    )))
}

#[instrument(skip(state, payload))]
pub async fn validate_reset_token(
    State(state): State<AppState>,
    Json(payload): Json<ValidateResetTokenRequest>,
) -> Result<Json<MessageResponse>, (StatusCode, String)> {
    services::validate_reset_token(&state, &payload.token)
        .await
        .map_err(to_http)?;
    Ok(Json(MessageResponse::new("Token is valid")))
}

#[instrument(skip(state, payload))]
pub async fn reset_password(
    State(state): State<AppState>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<Json<MessageResponse>, (StatusCode, String)> {
    if payload.password.len() < 8 {
        warn!("password too short");
        return Err((StatusCode::BAD_REQUEST, "Password too short".into()));
    }

    services::reset_password(&state, &payload.token, &payload.password)
        .await
        .map_err(to_http)?;
    Ok(Json(MessageResponse::new(
        "Password reset successful, you can now login",
    )))
}

#[instrument(skip(state))]
pub async fn list_users(
    State(state): State<AppState>,
    AuthUser(_user_id): AuthUser,
) -> Result<Json<Vec<UserProfile>>, (StatusCode, String)> {
    let users = services::get_all(&state).await.map_err(to_http)?;
    Ok(Json(users))
}

#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    AuthUser(_user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<UserProfile>, (StatusCode, String)> {
    let user = services::get_by_id(&state, id).await.map_err(to_http)?;
    Ok(Json(user))
}

#[instrument(skip(state, payload))]
pub async fn update_user(
    State(state): State<AppState>,
    AuthUser(_user_id): AuthUser,
    Path(id): Path<Uuid>,
    Json(mut payload): Json<UpdateUserRequest>,
) -> Result<Json<UserProfile>, (StatusCode, String)> {
    if let Some(email) = payload.email.as_mut() {
        *email = email.trim().to_lowercase();
        if !is_valid_email(email) {
            return Err((StatusCode::BAD_REQUEST, "Invalid email".into()));
        }
    }
    if let Some(password) = payload.password.as_deref() {
        if password.len() < 8 {
            return Err((StatusCode::BAD_REQUEST, "Password too short".into()));
        }
    }

    let user = services::update(&state, id, payload).await.map_err(to_http)?;
    Ok(Json(user))
}

#[instrument(skip(state))]
pub async fn delete_user(
    State(state): State<AppState>,
    AuthUser(_user_id): AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<MessageResponse>, (StatusCode, String)> {
    services::delete(&state, id).await.map_err(to_http)?;
    Ok(Json(MessageResponse::new("User deleted successfully")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_validation_accepts_plain_addresses() {
        assert!(is_valid_email("user@example.com"));
        assert!(is_valid_email("first.last@sub.domain.org"));
        assert!(!is_valid_email("not-an-email"));
        assert!(!is_valid_email("spaced name@example.com"));
        assert!(!is_valid_email("missing@tld"));
    }

    #[test]
    fn message_response_serialization() {
        let json = serde_json::to_string(&MessageResponse::new("Token is valid")).unwrap();
        assert!(json.contains("message"));
        assert!(json.contains("Token is valid"));
    }
}

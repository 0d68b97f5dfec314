use axum::extract::FromRef;
use time::{Duration, OffsetDateTime};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    auth::{jwt::JwtKeys, password, tokens},
    state::AppState,
    users::{
        dto::{AuthResponse, UpdateUserRequest, UserProfile},
        error::AccountError,
        store::{NewUser, User, UserPatch},
    },
};

/// Register a new account. An already-registered email is indistinguishable
/// from a fresh registration for the caller: no record is created and the
/// existing owner is notified by mail instead.
pub async fn register(
    state: &AppState,
    email: &str,
    username: &str,
    password_plain: &str,
) -> Result<(), AccountError> {
    if let Some(existing) = state.store.find_by_email(email).await? {
        info!(user_id = %existing.id, "registration hit an existing email");
        send_already_registered_email(state, email).await;
        return Ok(());
    }

    let hash = password::hash(password_plain.to_string()).await?;
    let token = tokens::one_time_token();
    let user = state
        .store
        .create(NewUser {
            email: email.to_string(),
            username: username.to_string(),
            password_hash: hash,
            verification_token: token,
        })
        .await?;

    info!(user_id = %user.id, email = %user.email, "user registered");
    send_verification_email(state, &user).await;
    Ok(())
}

pub async fn authenticate(
    state: &AppState,
    email: &str,
    password_plain: &str,
) -> Result<AuthResponse, AccountError> {
    let user = state
        .store
        .find_by_email(email)
        .await?
        .ok_or(AccountError::InvalidCredentials)?;

    let ok = password::verify(password_plain.to_string(), user.password_hash.clone()).await?;
    if !ok {
        warn!(user_id = %user.id, "authentication failed");
        return Err(AccountError::InvalidCredentials);
    }

    let keys = JwtKeys::from_ref(state);
    let token = keys.sign_session(user.id)?;
    info!(user_id = %user.id, "user authenticated");
    Ok(AuthResponse {
        token,
        user: user.into(),
    })
}

pub async fn verify_email(state: &AppState, token: &str) -> Result<(), AccountError> {
    let user = state
        .store
        .consume_verification_token(token, OffsetDateTime::now_utc())
        .await?
        .ok_or(AccountError::InvalidToken)?;
    info!(user_id = %user.id, "email verified");
    Ok(())
}

/// Always reports success; an unknown address gets the exact same outcome
/// as a known one, just without the side effects.
pub async fn forgot_password(state: &AppState, email: &str) -> Result<(), AccountError> {
    let Some(user) = state.store.find_by_email(email).await? else {
        return Ok(());
    };

    let token = tokens::one_time_token();
    // the reset window is one day; a new request supersedes any open one
    let expires_at = OffsetDateTime::now_utc() + Duration::days(1);
    state
        .store
        .set_reset_token(user.id, &token, expires_at)
        .await?;

    info!(user_id = %user.id, "reset token issued");
    send_password_reset_email(state, &user.email, &token).await;
    Ok(())
}

/// Read-only check so a client can confirm a token before submitting the
/// new password. Does not consume the token.
pub async fn validate_reset_token(state: &AppState, token: &str) -> Result<(), AccountError> {
    state
        .store
        .find_by_reset_token(token, OffsetDateTime::now_utc())
        .await?
        .ok_or(AccountError::InvalidToken)?;
    Ok(())
}

pub async fn reset_password(
    state: &AppState,
    token: &str,
    new_password: &str,
) -> Result<(), AccountError> {
    let hash = password::hash(new_password.to_string()).await?;
    let user = state
        .store
        .consume_reset_token(token, &hash, OffsetDateTime::now_utc())
        .await?
        .ok_or(AccountError::InvalidToken)?;
    info!(user_id = %user.id, "password reset completed");
    Ok(())
}

pub async fn get_by_id(state: &AppState, id: Uuid) -> Result<UserProfile, AccountError> {
    let user = state
        .store
        .find_by_id(id)
        .await?
        .ok_or(AccountError::NotFound)?;
    Ok(user.into())
}

pub async fn get_all(state: &AppState) -> Result<Vec<UserProfile>, AccountError> {
    let users = state.store.list().await?;
    Ok(users.into_iter().map(UserProfile::from).collect())
}

pub async fn update(
    state: &AppState,
    id: Uuid,
    changes: UpdateUserRequest,
) -> Result<UserProfile, AccountError> {
    let user = state
        .store
        .find_by_id(id)
        .await?
        .ok_or(AccountError::NotFound)?;

    // keeping one's own email is fine; taking someone else's is not
    if let Some(new_email) = changes.email.as_deref() {
        if new_email != user.email {
            if let Some(other) = state.store.find_by_email(new_email).await? {
                if other.id != id {
                    return Err(AccountError::DuplicateEmail(new_email.to_string()));
                }
            }
        }
    }

    let password_hash = match changes.password {
        Some(plain) => Some(password::hash(plain).await?),
        None => None,
    };

    let updated = state
        .store
        .update(
            id,
            UserPatch {
                email: changes.email,
                username: changes.username,
                password_hash,
            },
        )
        .await?
        .ok_or(AccountError::NotFound)?;

    info!(user_id = %id, "user updated");
    Ok(updated.into())
}

pub async fn delete(state: &AppState, id: Uuid) -> Result<(), AccountError> {
    if !state.store.delete(id).await? {
        return Err(AccountError::NotFound);
    }
    info!(user_id = %id, "user deleted");
    Ok(())
}

async fn send_verification_email(state: &AppState, user: &User) {
    let token = user.verification_token.as_deref().unwrap_or_default();
    let instructions = match &state.config.mail.origin {
        Some(origin) => {
            let url = format!("{origin}/verify-email?token={token}");
            format!(
                r#"<p>Please click the link below to verify your email address:</p>
<p><a href="{url}">{url}</a></p>"#
            )
        }
        None => format!(
            r#"<p>Please use the token below to verify your email address with the <code>/users/verify-email</code> route:</p>
<p><code>{token}</code></p>"#
        ),
    };
    let html = format!("<h4>Verify Email</h4>\n<p>Thanks for registering!</p>\n{instructions}");
    deliver(state, &user.email, "Verify your email", &html).await;
}

async fn send_already_registered_email(state: &AppState, email: &str) {
    let instructions = match &state.config.mail.origin {
        Some(origin) => format!(
            r#"<p>If you don't know your password, please visit the <a href="{origin}/forgot-password">forgot password</a> page.</p>"#
        ),
        None => r#"<p>If you don't know your password, you can reset it via the <code>/users/forgot-password</code> route.</p>"#.to_string(),
    };
    let html = format!(
        "<h4>Email Already Registered</h4>\n<p>Your email <strong>{email}</strong> is already registered.</p>\n{instructions}"
    );
    deliver(state, email, "Email already registered", &html).await;
}

async fn send_password_reset_email(state: &AppState, email: &str, token: &str) {
    let instructions = match &state.config.mail.origin {
        Some(origin) => {
            let url = format!("{origin}/reset-password?token={token}");
            format!(
                r#"<p>Please click the link below to reset your password. The link is valid for one day:</p>
<p><a href="{url}">{url}</a></p>"#
            )
        }
        None => format!(
            r#"<p>Please use the token below to reset your password with the <code>/users/reset-password</code> route:</p>
<p><code>{token}</code></p>"#
        ),
    };
    let html = format!("<h4>Reset Password</h4>\n{instructions}");
    deliver(state, email, "Reset your password", &html).await;
}

/// Account state changes commit before mail goes out; a failed send is
/// logged and the operation still succeeds.
async fn deliver(state: &AppState, to: &str, subject: &str, html: &str) {
    if let Err(e) = state.mailer.send(to, subject, html).await {
        warn!(error = %e, to = %to, subject = %subject, "account email failed to send");
    }
}

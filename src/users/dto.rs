use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::users::store::User;

/// Request body for user registration.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub username: String,
    pub password: String,
}

/// Request body for authentication.
#[derive(Debug, Deserialize)]
pub struct AuthenticateRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyEmailRequest {
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ValidateResetTokenRequest {
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub password: String,
}

/// Partial profile update. Unknown fields are rejected outright rather
/// than merged into the record.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateUserRequest {
    pub email: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Public view of a user; carries no credential material.
#[derive(Debug, Serialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub is_verified: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<User> for UserProfile {
    fn from(user: User) -> Self {
        let is_verified = user.is_verified();
        Self {
            id: user.id,
            email: user.email,
            username: user.username,
            is_verified,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

/// Response returned after successful authentication.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserProfile,
}

/// Uniform `{"message": ...}` body for operations with no payload.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_serialization_omits_credentials() {
        let user = User {
            id: Uuid::new_v4(),
            email: "test@example.com".to_string(),
            username: "tester".to_string(),
            password_hash: "$argon2id$super-secret".to_string(),
            verification_token: Some("one-time".to_string()),
            verified_at: None,
            reset_token: Some("reset".to_string()),
            reset_token_expires_at: Some(OffsetDateTime::now_utc()),
            password_reset_at: None,
            created_at: OffsetDateTime::now_utc(),
            updated_at: OffsetDateTime::now_utc(),
        };

        let json = serde_json::to_string(&UserProfile::from(user)).unwrap();
        assert!(json.contains("test@example.com"));
        assert!(!json.contains("password"));
        assert!(!json.contains("token"));
        assert!(!json.contains("super-secret"));
    }

    #[test]
    fn update_request_rejects_unknown_fields() {
        let err = serde_json::from_str::<UpdateUserRequest>(r#"{"email":"a@b.co","role":"admin"}"#);
        assert!(err.is_err());
    }

    #[test]
    fn update_request_fields_default_to_absent() {
        let req: UpdateUserRequest = serde_json::from_str(r#"{"username":"new-name"}"#).unwrap();
        assert_eq!(req.username.as_deref(), Some("new-name"));
        assert!(req.email.is_none());
        assert!(req.password.is_none());
    }
}

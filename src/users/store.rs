use std::collections::HashMap;
use std::sync::Mutex;

use anyhow::Context;
use axum::async_trait;
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

/// User record as persisted. Leaves the service layer only as a
/// `UserProfile`, which carries no credential material.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub username: String,
    pub password_hash: String,
    pub verification_token: Option<String>,
    pub verified_at: Option<OffsetDateTime>,
    pub reset_token: Option<String>,
    pub reset_token_expires_at: Option<OffsetDateTime>,
    pub password_reset_at: Option<OffsetDateTime>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl User {
    /// A completed password reset proves mailbox ownership just as the
    /// verification link does.
    pub fn is_verified(&self) -> bool {
        self.verified_at.is_some() || self.password_reset_at.is_some()
    }
}

/// Fields required to insert a new, unverified user.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub username: String,
    pub password_hash: String,
    pub verification_token: String,
}

/// Partial update; `None` leaves the column untouched.
#[derive(Debug, Clone, Default)]
pub struct UserPatch {
    pub email: Option<String>,
    pub username: Option<String>,
    pub password_hash: Option<String>,
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create(&self, new: NewUser) -> anyhow::Result<User>;
    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>>;
    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>>;
    async fn list(&self) -> anyhow::Result<Vec<User>>;

    /// Exact token match, unexpired only: `now` strictly before the deadline.
    async fn find_by_reset_token(
        &self,
        token: &str,
        now: OffsetDateTime,
    ) -> anyhow::Result<Option<User>>;

    /// Clears the verification token and stamps `verified_at` in a single
    /// conditional write. `None` means the token matched no row.
    async fn consume_verification_token(
        &self,
        token: &str,
        now: OffsetDateTime,
    ) -> anyhow::Result<Option<User>>;

    /// Overwrites any previous reset token for the user.
    async fn set_reset_token(
        &self,
        id: Uuid,
        token: &str,
        expires_at: OffsetDateTime,
    ) -> anyhow::Result<()>;

    /// Re-checks match and expiry, swaps the password hash, stamps
    /// `password_reset_at` and clears the token pair, all in one
    /// conditional write. Racing consumers of one token: at most one
    /// observes `Some`.
    async fn consume_reset_token(
        &self,
        token: &str,
        new_hash: &str,
        now: OffsetDateTime,
    ) -> anyhow::Result<Option<User>>;

    async fn update(&self, id: Uuid, patch: UserPatch) -> anyhow::Result<Option<User>>;
    async fn delete(&self, id: Uuid) -> anyhow::Result<bool>;
}

#[derive(Clone)]
pub struct PgStore {
    db: PgPool,
}

impl PgStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn create(&self, new: NewUser) -> anyhow::Result<User> {
        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (email, username, password_hash, verification_token)
            VALUES ($1, $2, $3, $4)
            RETURNING id, email, username, password_hash, verification_token, verified_at,
                      reset_token, reset_token_expires_at, password_reset_at, created_at, updated_at
            "#,
        )
        .bind(&new.email)
        .bind(&new.username)
        .bind(&new.password_hash)
        .bind(&new.verification_token)
        .fetch_one(&self.db)
        .await
        .context("insert user")?;
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, username, password_hash, verification_token, verified_at,
                   reset_token, reset_token_expires_at, password_reset_at, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, username, password_hash, verification_token, verified_at,
                   reset_token, reset_token_expires_at, password_reset_at, created_at, updated_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn list(&self) -> anyhow::Result<Vec<User>> {
        let users = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, username, password_hash, verification_token, verified_at,
                   reset_token, reset_token_expires_at, password_reset_at, created_at, updated_at
            FROM users
            ORDER BY created_at ASC
            "#,
        )
        .fetch_all(&self.db)
        .await?;
        Ok(users)
    }

    async fn find_by_reset_token(
        &self,
        token: &str,
        now: OffsetDateTime,
    ) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            SELECT id, email, username, password_hash, verification_token, verified_at,
                   reset_token, reset_token_expires_at, password_reset_at, created_at, updated_at
            FROM users
            WHERE reset_token = $1 AND reset_token_expires_at > $2
            "#,
        )
        .bind(token)
        .bind(now)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn consume_verification_token(
        &self,
        token: &str,
        now: OffsetDateTime,
    ) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET verification_token = NULL, verified_at = $2, updated_at = $2
            WHERE verification_token = $1
            RETURNING id, email, username, password_hash, verification_token, verified_at,
                      reset_token, reset_token_expires_at, password_reset_at, created_at, updated_at
            "#,
        )
        .bind(token)
        .bind(now)
        .fetch_optional(&self.db)
        .await
        .context("consume verification token")?;
        Ok(user)
    }

    async fn set_reset_token(
        &self,
        id: Uuid,
        token: &str,
        expires_at: OffsetDateTime,
    ) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            UPDATE users
            SET reset_token = $2, reset_token_expires_at = $3, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(token)
        .bind(expires_at)
        .execute(&self.db)
        .await
        .context("set reset token")?;
        Ok(())
    }

    async fn consume_reset_token(
        &self,
        token: &str,
        new_hash: &str,
        now: OffsetDateTime,
    ) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET password_hash = $2, password_reset_at = $3,
                reset_token = NULL, reset_token_expires_at = NULL, updated_at = $3
            WHERE reset_token = $1 AND reset_token_expires_at > $3
            RETURNING id, email, username, password_hash, verification_token, verified_at,
                      reset_token, reset_token_expires_at, password_reset_at, created_at, updated_at
            "#,
        )
        .bind(token)
        .bind(new_hash)
        .bind(now)
        .fetch_optional(&self.db)
        .await
        .context("consume reset token")?;
        Ok(user)
    }

    async fn update(&self, id: Uuid, patch: UserPatch) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(
            r#"
            UPDATE users
            SET email = COALESCE($2, email),
                username = COALESCE($3, username),
                password_hash = COALESCE($4, password_hash),
                updated_at = now()
            WHERE id = $1
            RETURNING id, email, username, password_hash, verification_token, verified_at,
                      reset_token, reset_token_expires_at, password_reset_at, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(patch.email)
        .bind(patch.username)
        .bind(patch.password_hash)
        .fetch_optional(&self.db)
        .await
        .context("update user")?;
        Ok(user)
    }

    async fn delete(&self, id: Uuid) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await
            .context("delete user")?;
        Ok(result.rows_affected() > 0)
    }
}

/// In-memory store backing unit tests and `AppState::fake()`. The single
/// mutex gives token consumption the same read-check-write atomicity the
/// SQL conditional updates have.
#[derive(Default)]
pub struct MemStore {
    users: Mutex<HashMap<Uuid, User>>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserStore for MemStore {
    async fn create(&self, new: NewUser) -> anyhow::Result<User> {
        let mut users = self.users.lock().unwrap();
        if users.values().any(|u| u.email == new.email) {
            anyhow::bail!("duplicate email: {}", new.email);
        }
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: Uuid::new_v4(),
            email: new.email,
            username: new.username,
            password_hash: new.password_hash,
            verification_token: Some(new.verification_token),
            verified_at: None,
            reset_token: None,
            reset_token_expires_at: None,
            password_reset_at: None,
            created_at: now,
            updated_at: now,
        };
        users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> anyhow::Result<Option<User>> {
        Ok(self.users.lock().unwrap().get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> anyhow::Result<Option<User>> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn list(&self) -> anyhow::Result<Vec<User>> {
        let mut users: Vec<User> = self.users.lock().unwrap().values().cloned().collect();
        users.sort_by_key(|u| u.created_at);
        Ok(users)
    }

    async fn find_by_reset_token(
        &self,
        token: &str,
        now: OffsetDateTime,
    ) -> anyhow::Result<Option<User>> {
        Ok(self
            .users
            .lock()
            .unwrap()
            .values()
            .find(|u| {
                u.reset_token.as_deref() == Some(token)
                    && u.reset_token_expires_at.map_or(false, |e| now < e)
            })
            .cloned())
    }

    async fn consume_verification_token(
        &self,
        token: &str,
        now: OffsetDateTime,
    ) -> anyhow::Result<Option<User>> {
        let mut users = self.users.lock().unwrap();
        if let Some(user) = users
            .values_mut()
            .find(|u| u.verification_token.as_deref() == Some(token))
        {
            user.verification_token = None;
            user.verified_at = Some(now);
            user.updated_at = now;
            Ok(Some(user.clone()))
        } else {
            Ok(None)
        }
    }

    async fn set_reset_token(
        &self,
        id: Uuid,
        token: &str,
        expires_at: OffsetDateTime,
    ) -> anyhow::Result<()> {
        let mut users = self.users.lock().unwrap();
        if let Some(user) = users.get_mut(&id) {
            user.reset_token = Some(token.to_string());
            user.reset_token_expires_at = Some(expires_at);
            user.updated_at = OffsetDateTime::now_utc();
        }
        Ok(())
    }

    async fn consume_reset_token(
        &self,
        token: &str,
        new_hash: &str,
        now: OffsetDateTime,
    ) -> anyhow::Result<Option<User>> {
        let mut users = self.users.lock().unwrap();
        if let Some(user) = users.values_mut().find(|u| {
            u.reset_token.as_deref() == Some(token)
                && u.reset_token_expires_at.map_or(false, |e| now < e)
        }) {
            user.password_hash = new_hash.to_string();
            user.password_reset_at = Some(now);
            user.reset_token = None;
            user.reset_token_expires_at = None;
            user.updated_at = now;
            Ok(Some(user.clone()))
        } else {
            Ok(None)
        }
    }

    async fn update(&self, id: Uuid, patch: UserPatch) -> anyhow::Result<Option<User>> {
        let mut users = self.users.lock().unwrap();
        if let Some(user) = users.get_mut(&id) {
            if let Some(email) = patch.email {
                user.email = email;
            }
            if let Some(username) = patch.username {
                user.username = username;
            }
            if let Some(password_hash) = patch.password_hash {
                user.password_hash = password_hash;
            }
            user.updated_at = OffsetDateTime::now_utc();
            Ok(Some(user.clone()))
        } else {
            Ok(None)
        }
    }

    async fn delete(&self, id: Uuid) -> anyhow::Result<bool> {
        Ok(self.users.lock().unwrap().remove(&id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;
    use time::Duration;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            email: email.to_string(),
            username: "someone".to_string(),
            password_hash: "$argon2id$fake".to_string(),
            verification_token: "verify-token".to_string(),
        }
    }

    #[tokio::test]
    async fn reset_token_expiry_is_strict() {
        let store = MemStore::new();
        let user = store.create(new_user("a@example.com")).await.unwrap();

        let expires = datetime!(2026-01-02 00:00 UTC);
        store.set_reset_token(user.id, "tok", expires).await.unwrap();

        let just_before = expires - Duration::seconds(1);
        assert!(store
            .find_by_reset_token("tok", just_before)
            .await
            .unwrap()
            .is_some());
        // the deadline itself is already invalid
        assert!(store
            .find_by_reset_token("tok", expires)
            .await
            .unwrap()
            .is_none());
        assert!(store
            .find_by_reset_token("tok", expires + Duration::seconds(1))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn expired_reset_token_cannot_be_consumed() {
        let store = MemStore::new();
        let user = store.create(new_user("a@example.com")).await.unwrap();

        let expires = datetime!(2026-01-02 00:00 UTC);
        store.set_reset_token(user.id, "tok", expires).await.unwrap();

        let consumed = store
            .consume_reset_token("tok", "$argon2id$new", expires)
            .await
            .unwrap();
        assert!(consumed.is_none());

        // the failed attempt must not have touched the record
        let unchanged = store.find_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(unchanged.reset_token.as_deref(), Some("tok"));
        assert_eq!(unchanged.password_hash, "$argon2id$fake");
    }

    #[tokio::test]
    async fn verification_token_consumes_once() {
        let store = MemStore::new();
        let user = store.create(new_user("a@example.com")).await.unwrap();
        let now = OffsetDateTime::now_utc();

        let consumed = store
            .consume_verification_token("verify-token", now)
            .await
            .unwrap()
            .expect("first consumption succeeds");
        assert_eq!(consumed.id, user.id);
        assert!(consumed.verification_token.is_none());
        assert_eq!(consumed.verified_at, Some(now));

        assert!(store
            .consume_verification_token("verify-token", now)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn patch_updates_only_provided_fields() {
        let store = MemStore::new();
        let user = store.create(new_user("a@example.com")).await.unwrap();

        let updated = store
            .update(
                user.id,
                UserPatch {
                    username: Some("renamed".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .expect("user exists");

        assert_eq!(updated.username, "renamed");
        assert_eq!(updated.email, "a@example.com");
        assert_eq!(updated.password_hash, user.password_hash);
    }
}

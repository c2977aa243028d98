//! Platform users and roles
//!
//! Maps identity-service user ids (`auth_id`) to platform users.

use chrono::Utc;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::StoreError;

/// Role granting access to any evaluation and the manual trigger
pub const ADMIN_ROLE: &str = "admin";

/// Platform user resolved from a verified token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformUser {
    pub id: Uuid,
    pub auth_id: String,
    pub is_admin: bool,
}

/// Look up a platform user by identity-service id
pub async fn find_by_auth_id(
    pool: &SqlitePool,
    auth_id: &str,
) -> Result<Option<PlatformUser>, StoreError> {
    let row = sqlx::query(
        r#"
        SELECT u.id, u.auth_id,
               EXISTS (
                   SELECT 1 FROM user_roles r WHERE r.user_id = u.id AND r.role = ?
               ) AS is_admin
        FROM users u
        WHERE u.auth_id = ?
        "#,
    )
    .bind(ADMIN_ROLE)
    .bind(auth_id)
    .fetch_optional(pool)
    .await?;

    row.map(|row| {
        let id: String = row.get("id");
        Ok(PlatformUser {
            id: parse_uuid(&id)?,
            auth_id: row.get("auth_id"),
            is_admin: row.get::<i64, _>("is_admin") != 0,
        })
    })
    .transpose()
}

/// Insert a platform user linked to an identity-service id
pub async fn insert_user(
    pool: &SqlitePool,
    auth_id: &str,
    email: Option<&str>,
) -> Result<PlatformUser, StoreError> {
    let id = Uuid::new_v4();

    sqlx::query("INSERT INTO users (id, auth_id, email, created_at) VALUES (?, ?, ?, ?)")
        .bind(id.to_string())
        .bind(auth_id)
        .bind(email)
        .bind(Utc::now().to_rfc3339())
        .execute(pool)
        .await?;

    Ok(PlatformUser {
        id,
        auth_id: auth_id.to_string(),
        is_admin: false,
    })
}

/// Grant a role (idempotent)
pub async fn grant_role(pool: &SqlitePool, user_id: Uuid, role: &str) -> Result<(), StoreError> {
    sqlx::query("INSERT OR IGNORE INTO user_roles (user_id, role) VALUES (?, ?)")
        .bind(user_id.to_string())
        .bind(role)
        .execute(pool)
        .await?;
    Ok(())
}

pub(crate) fn parse_uuid(value: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(value).map_err(|e| StoreError::Corrupt(format!("invalid uuid {:?}: {}", value, e)))
}

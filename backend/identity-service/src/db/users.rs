/// User database operations for identity-service
use sqlx::PgExecutor;
use uuid::Uuid;

use super::is_unique_violation;
use crate::error::{IdentityError, Result};
use crate::models::{NewUser, User};

const USER_COLUMNS: &str = "id, name, phone, phone_verified, role, created_at, updated_at";

/// Find user by ID
pub async fn find_by_id<'e>(executor: impl PgExecutor<'e>, user_id: Uuid) -> Result<Option<User>> {
    let user = sqlx::query_as::<_, User>(&format!(
        "SELECT {} FROM users WHERE id = $1",
        USER_COLUMNS
    ))
    .bind(user_id)
    .fetch_optional(executor)
    .await?;

    Ok(user)
}

/// Find user by normalized E.164 phone
pub async fn find_by_phone<'e>(
    executor: impl PgExecutor<'e>,
    phone: &str,
) -> Result<Option<User>> {
    let user = sqlx::query_as::<_, User>(&format!(
        "SELECT {} FROM users WHERE phone = $1",
        USER_COLUMNS
    ))
    .bind(phone)
    .fetch_optional(executor)
    .await?;

    Ok(user)
}

/// Insert a user with an unverified phone (if any)
pub async fn insert<'e>(executor: impl PgExecutor<'e>, user: &NewUser) -> Result<User> {
    sqlx::query_as::<_, User>(&format!(
        r#"
        INSERT INTO users (id, name, phone, phone_verified, role)
        VALUES ($1, $2, $3, FALSE, $4)
        RETURNING {}
        "#,
        USER_COLUMNS
    ))
    .bind(Uuid::new_v4())
    .bind(&user.name)
    .bind(&user.phone)
    .bind(user.role)
    .fetch_one(executor)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            IdentityError::PhoneAlreadyRegistered
        } else {
            e.into()
        }
    })
}

/// Set the phone and mark it verified. `None` when the user does not exist.
pub async fn set_verified_phone<'e>(
    executor: impl PgExecutor<'e>,
    user_id: Uuid,
    phone: &str,
) -> Result<Option<User>> {
    sqlx::query_as::<_, User>(&format!(
        r#"
        UPDATE users
        SET phone = $2, phone_verified = TRUE, updated_at = NOW()
        WHERE id = $1
        RETURNING {}
        "#,
        USER_COLUMNS
    ))
    .bind(user_id)
    .bind(phone)
    .fetch_optional(executor)
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            IdentityError::PhoneInUse
        } else {
            e.into()
        }
    })
}

/// Hard delete; social accounts cascade
pub async fn delete<'e>(executor: impl PgExecutor<'e>, user_id: Uuid) -> Result<bool> {
    let result = sqlx::query("DELETE FROM users WHERE id = $1")
        .bind(user_id)
        .execute(executor)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// Social account persistence
use sqlx::PgExecutor;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{NewSocialAccount, SocialAccount, SocialProvider};

const ACCOUNT_COLUMNS: &str =
    "id, user_id, provider, provider_user_id, email, display_name, avatar_url, created_at";

pub async fn find_by_provider<'e>(
    executor: impl PgExecutor<'e>,
    provider: SocialProvider,
    provider_user_id: &str,
) -> Result<Option<SocialAccount>> {
    let account = sqlx::query_as::<_, SocialAccount>(&format!(
        "SELECT {} FROM social_accounts WHERE provider = $1 AND provider_user_id = $2",
        ACCOUNT_COLUMNS
    ))
    .bind(provider)
    .bind(provider_user_id)
    .fetch_optional(executor)
    .await?;

    Ok(account)
}

/// Insert a link. `None` when the provider identity is already linked.
pub async fn insert<'e>(
    executor: impl PgExecutor<'e>,
    account: &NewSocialAccount,
) -> Result<Option<SocialAccount>> {
    let profile = &account.profile;
    let created = sqlx::query_as::<_, SocialAccount>(&format!(
        r#"
        INSERT INTO social_accounts
            (id, user_id, provider, provider_user_id, email, display_name, avatar_url)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (provider, provider_user_id) DO NOTHING
        RETURNING {}
        "#,
        ACCOUNT_COLUMNS
    ))
    .bind(Uuid::new_v4())
    .bind(account.user_id)
    .bind(profile.provider)
    .bind(&profile.provider_user_id)
    .bind(&profile.email)
    .bind(&profile.display_name)
    .bind(&profile.avatar_url)
    .fetch_optional(executor)
    .await?;

    Ok(created)
}

/// Point every account owned by `from` at `into`
pub async fn reassign<'e>(executor: impl PgExecutor<'e>, from: Uuid, into: Uuid) -> Result<u64> {
    let result = sqlx::query("UPDATE social_accounts SET user_id = $2 WHERE user_id = $1")
        .bind(from)
        .bind(into)
        .execute(executor)
        .await?;

    Ok(result.rows_affected())
}

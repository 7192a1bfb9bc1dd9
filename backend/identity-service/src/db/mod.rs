/// Database operations for identity service
pub mod memory;
pub mod otps;
pub mod social_accounts;
pub mod users;

use async_trait::async_trait;
use sqlx::migrate::Migrator;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{IdentityError, Result};
use crate::models::{NewSocialAccount, NewUser, SocialAccount, SocialProfile, SocialProvider, User};

pub use memory::MemoryIdentityRepository;
pub use otps::PgOtpStore;

/// Embedded migrations, run at startup
pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Users and their linked social identities.
///
/// Multi-row operations are transactional: either every row changes or none.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IdentityRepository: Send + Sync {
    async fn find_user(&self, id: Uuid) -> Result<Option<User>>;

    async fn find_user_by_phone(&self, phone: &str) -> Result<Option<User>>;

    /// Fails with `PhoneAlreadyRegistered` when the phone is taken
    async fn create_user(&self, user: NewUser) -> Result<User>;

    /// Attach `phone` to the user and mark it verified.
    ///
    /// `PhoneInUse` if another account holds the number, `UserNotFound` if the
    /// user row is gone.
    async fn mark_phone_verified(&self, user_id: Uuid, phone: &str) -> Result<User>;

    async fn find_social_account(
        &self,
        provider: SocialProvider,
        provider_user_id: &str,
    ) -> Result<Option<SocialAccount>>;

    /// Create a placeholder user plus its social account in one transaction.
    ///
    /// When a concurrent request linked the same provider identity first,
    /// nothing is created and the existing pair is returned.
    async fn create_social_user(
        &self,
        user: NewUser,
        profile: &SocialProfile,
    ) -> Result<(User, SocialAccount)>;

    /// Move every social account from `from` to `into`, then delete `from`.
    ///
    /// Returns the number of social accounts moved.
    async fn merge_users(&self, from: Uuid, into: Uuid) -> Result<u64>;
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

/// Postgres-backed repository
#[derive(Clone)]
pub struct PgIdentityRepository {
    pool: PgPool,
}

impl PgIdentityRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdentityRepository for PgIdentityRepository {
    async fn find_user(&self, id: Uuid) -> Result<Option<User>> {
        users::find_by_id(&self.pool, id).await
    }

    async fn find_user_by_phone(&self, phone: &str) -> Result<Option<User>> {
        users::find_by_phone(&self.pool, phone).await
    }

    async fn create_user(&self, user: NewUser) -> Result<User> {
        users::insert(&self.pool, &user).await
    }

    async fn mark_phone_verified(&self, user_id: Uuid, phone: &str) -> Result<User> {
        users::set_verified_phone(&self.pool, user_id, phone)
            .await?
            .ok_or(IdentityError::UserNotFound)
    }

    async fn find_social_account(
        &self,
        provider: SocialProvider,
        provider_user_id: &str,
    ) -> Result<Option<SocialAccount>> {
        social_accounts::find_by_provider(&self.pool, provider, provider_user_id).await
    }

    async fn create_social_user(
        &self,
        user: NewUser,
        profile: &SocialProfile,
    ) -> Result<(User, SocialAccount)> {
        let mut tx = self.pool.begin().await?;

        let created = users::insert(&mut *tx, &user).await?;
        let link = NewSocialAccount {
            user_id: created.id,
            profile: profile.clone(),
        };

        if let Some(account) = social_accounts::insert(&mut *tx, &link).await? {
            tx.commit().await?;
            return Ok((created, account));
        }

        // Lost the race: drop our placeholder and return the winner's rows
        tx.rollback().await?;
        tracing::info!(
            provider = profile.provider.as_str(),
            "Social account linked concurrently, reusing existing user"
        );

        let account = social_accounts::find_by_provider(
            &self.pool,
            profile.provider,
            &profile.provider_user_id,
        )
        .await?
        .ok_or_else(|| IdentityError::Internal("Social account vanished after conflict".into()))?;
        let owner = users::find_by_id(&self.pool, account.user_id)
            .await?
            .ok_or(IdentityError::UserNotFound)?;

        Ok((owner, account))
    }

    async fn merge_users(&self, from: Uuid, into: Uuid) -> Result<u64> {
        if from == into {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let moved = social_accounts::reassign(&mut *tx, from, into).await?;
        users::delete(&mut *tx, from).await?;
        tx.commit().await?;

        tracing::info!(from = %from, into = %into, moved, "Merged users");
        Ok(moved)
    }
}

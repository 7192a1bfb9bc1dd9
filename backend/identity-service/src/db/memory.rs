/// In-process identity repository for single-node dev runs and tests.
///
/// A single lock guards users and social accounts together, so each
/// multi-row operation is all-or-nothing just like its SQL transaction.
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::IdentityRepository;
use crate::error::{IdentityError, Result};
use crate::models::{NewUser, SocialAccount, SocialProfile, SocialProvider, User};

#[derive(Debug, Default)]
struct Tables {
    users: HashMap<Uuid, User>,
    social_accounts: HashMap<(SocialProvider, String), SocialAccount>,
}

impl Tables {
    fn phone_owner(&self, phone: &str) -> Option<&User> {
        self.users
            .values()
            .find(|u| u.phone.as_deref() == Some(phone))
    }

    fn insert_user(&mut self, user: NewUser) -> Result<User> {
        if let Some(phone) = user.phone.as_deref() {
            if self.phone_owner(phone).is_some() {
                return Err(IdentityError::PhoneAlreadyRegistered);
            }
        }

        let now = Utc::now();
        let created = User {
            id: Uuid::new_v4(),
            name: user.name,
            phone: user.phone,
            phone_verified: false,
            role: user.role,
            created_at: now,
            updated_at: now,
        };
        self.users.insert(created.id, created.clone());
        Ok(created)
    }
}

#[derive(Debug, Default)]
pub struct MemoryIdentityRepository {
    tables: RwLock<Tables>,
}

impl MemoryIdentityRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn user_count(&self) -> usize {
        self.tables.read().await.users.len()
    }
}

#[async_trait]
impl IdentityRepository for MemoryIdentityRepository {
    async fn find_user(&self, id: Uuid) -> Result<Option<User>> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn find_user_by_phone(&self, phone: &str) -> Result<Option<User>> {
        Ok(self.tables.read().await.phone_owner(phone).cloned())
    }

    async fn create_user(&self, user: NewUser) -> Result<User> {
        self.tables.write().await.insert_user(user)
    }

    async fn mark_phone_verified(&self, user_id: Uuid, phone: &str) -> Result<User> {
        let mut tables = self.tables.write().await;

        if let Some(owner) = tables.phone_owner(phone) {
            if owner.id != user_id {
                return Err(IdentityError::PhoneInUse);
            }
        }

        let user = tables
            .users
            .get_mut(&user_id)
            .ok_or(IdentityError::UserNotFound)?;
        user.phone = Some(phone.to_string());
        user.phone_verified = true;
        user.updated_at = Utc::now();
        Ok(user.clone())
    }

    async fn find_social_account(
        &self,
        provider: SocialProvider,
        provider_user_id: &str,
    ) -> Result<Option<SocialAccount>> {
        Ok(self
            .tables
            .read()
            .await
            .social_accounts
            .get(&(provider, provider_user_id.to_string()))
            .cloned())
    }

    async fn create_social_user(
        &self,
        user: NewUser,
        profile: &SocialProfile,
    ) -> Result<(User, SocialAccount)> {
        let mut tables = self.tables.write().await;
        let key = (profile.provider, profile.provider_user_id.clone());

        if let Some(existing) = tables.social_accounts.get(&key).cloned() {
            let owner = tables
                .users
                .get(&existing.user_id)
                .cloned()
                .ok_or(IdentityError::UserNotFound)?;
            return Ok((owner, existing));
        }

        let created = tables.insert_user(user)?;
        let account = SocialAccount {
            id: Uuid::new_v4(),
            user_id: created.id,
            provider: profile.provider,
            provider_user_id: profile.provider_user_id.clone(),
            email: profile.email.clone(),
            display_name: profile.display_name.clone(),
            avatar_url: profile.avatar_url.clone(),
            created_at: created.created_at,
        };
        tables.social_accounts.insert(key, account.clone());

        Ok((created, account))
    }

    async fn merge_users(&self, from: Uuid, into: Uuid) -> Result<u64> {
        if from == into {
            return Ok(0);
        }

        let mut tables = self.tables.write().await;
        if !tables.users.contains_key(&into) {
            return Err(IdentityError::UserNotFound);
        }

        let mut moved = 0;
        for account in tables.social_accounts.values_mut() {
            if account.user_id == from {
                account.user_id = into;
                moved += 1;
            }
        }
        tables.users.remove(&from);

        tracing::info!(from = %from, into = %into, moved, "Merged users");
        Ok(moved)
    }
}

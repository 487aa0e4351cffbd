//! User records and online presence.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, info};

use parley_shared::constants::{fields, USERS_COLLECTION};
use parley_shared::UserId;
use parley_store::{CollectionPath, DocumentStore, Fields, WriteMode};

use crate::error::{ChatError, RecordKind, Result};
use crate::models::User;

/// Identity handed over by the authentication provider at sign-in.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub id: UserId,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
}

#[derive(Clone)]
pub struct Presence {
    store: Arc<dyn DocumentStore>,
}

impl Presence {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Mark the user online, creating the user record on first sign-in.
    pub async fn sign_in(&self, profile: &Profile) -> Result<User> {
        let users = CollectionPath::root(USERS_COLLECTION);
        let id = profile.id.as_str();

        let record = Fields::new()
            .set(fields::UID, id)
            .set(fields::EMAIL, profile.email.clone().unwrap_or_default())
            .set(fields::DISPLAY_NAME, profile.display_name.clone().unwrap_or_default())
            .set(fields::PHOTO_URL, profile.photo_url.clone().unwrap_or_default())
            .set(fields::ONLINE, true)
            .set(fields::BIO, "")
            .server_timestamp(fields::LAST_SEEN)
            .server_timestamp(fields::CREATED_AT)
            .server_timestamp(fields::UPDATED_AT);

        let created = self
            .store
            .create(&users, id, record)
            .await
            .map_err(ChatError::WriteFailure)?;

        if created {
            info!(user = %profile.id, "user record created");
        } else {
            self.mark(&profile.id, true).await?;
        }

        let doc = self
            .store
            .get(&users, id)
            .await
            .map_err(ChatError::ReadFailure)?
            .ok_or_else(|| ChatError::NotFound {
                kind: RecordKind::User,
                id: id.to_string(),
            })?;

        User::from_document(&doc)
    }

    /// Mark the user offline and stamp the last-seen time.
    pub async fn sign_out(&self, user: &UserId) -> Result<()> {
        self.mark(user, false).await?;
        info!(user = %user, "signed out");
        Ok(())
    }

    async fn mark(&self, user: &UserId, online: bool) -> Result<()> {
        let update = Fields::new()
            .set(fields::ONLINE, online)
            .server_timestamp(fields::LAST_SEEN);

        self.store
            .set(
                &CollectionPath::root(USERS_COLLECTION),
                user.as_str(),
                update,
                WriteMode::Merge,
            )
            .await
            .map_err(ChatError::WriteFailure)?;

        debug!(user = %user, online, "presence updated");
        Ok(())
    }
}

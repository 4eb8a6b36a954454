//! User credential storage and verification
//!
//! Builds on the Gateway to hash-and-store and verify user credentials.
//! Hashing and verification run on the blocking pool. Verification failure
//! carries no lockout policy; the caller decides.

use bson::{doc, Document};
use serde_json::Value as JsonValue;
use tracing::{info, warn};

use crate::auth::password::{hash_password, verify_password};
use crate::db::gateway::{
    CreateOutcome, Gateway, ReadOptions, ReadOutcome, ReadSelector, UpdateSelector,
};
use crate::db::schemas::{RoleAssignment, UserDoc, DEFAULT_ROLE, KNOWN_ROLES, USER_COLLECTION};
use crate::types::{GatehouseError, Result};

/// Outcome of an authentication attempt
#[derive(Debug)]
pub enum AuthOutcome {
    /// Password verified; the stored user document
    Verified(UserDoc),
    /// User exists but the password did not match
    Forbidden,
    /// No user document under that name
    UnknownUser,
}

/// User store bound to a gateway's users collection
#[derive(Clone)]
pub struct UserService {
    gateway: Gateway,
    /// Database scope recorded on role assignments
    db_name: String,
}

impl UserService {
    pub fn new(gateway: Gateway, db_name: impl Into<String>) -> Self {
        Self {
            gateway,
            db_name: db_name.into(),
        }
    }

    /// Create the users indexes (idempotent)
    pub async fn ensure_indexes(&self) -> Result<()> {
        for (keys, unique) in UserDoc::indexes() {
            self.gateway
                .create_index(USER_COLLECTION, keys, unique)
                .await?;
        }
        Ok(())
    }

    /// Hash the password and store a user document keyed by username.
    ///
    /// An existing username surfaces as the gateway's structured duplicate
    /// outcome rather than an error.
    pub async fn create_user(
        &self,
        username: &str,
        password: &str,
        roles: &JsonValue,
        custom: Document,
    ) -> Result<CreateOutcome> {
        if username.is_empty() || password.is_empty() {
            return Err(GatehouseError::InvalidInput(
                "username and password are required".into(),
            ));
        }

        let hash = hash_blocking(password.to_string()).await?;
        let user = UserDoc::new(username, hash, parse_roles(roles, &self.db_name), custom);
        let doc = bson::to_document(&user)
            .map_err(|e| GatehouseError::Internal(format!("user encode failed: {e}")))?;

        let outcome = self.gateway.create(USER_COLLECTION, doc).await?;
        if matches!(outcome, CreateOutcome::Created { .. }) {
            info!(user = %username, "user created");
        }
        Ok(outcome)
    }

    /// Re-hash and store a new password for an existing user
    pub async fn update_password(&self, username: &str, new_password: &str) -> Result<()> {
        if new_password.is_empty() {
            return Err(GatehouseError::InvalidInput("password is required".into()));
        }

        let hash = hash_blocking(new_password.to_string()).await?;
        let matched = self
            .gateway
            .update(
                USER_COLLECTION,
                UpdateSelector::Id(username.to_string()),
                doc! { "password_hash": hash, "updated_at": bson::DateTime::now() },
            )
            .await?;

        if matched == 0 {
            return Err(GatehouseError::NotFound);
        }
        info!(user = %username, "password updated");
        Ok(())
    }

    /// Look the user up by name and verify the supplied password
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<AuthOutcome> {
        let found = self
            .gateway
            .read(
                USER_COLLECTION,
                ReadSelector::Id(username.to_string()),
                ReadOptions::default(),
            )
            .await?;

        let doc = match found {
            ReadOutcome::One(Some(doc)) => doc,
            ReadOutcome::One(None) => return Ok(AuthOutcome::UnknownUser),
            _ => return Err(GatehouseError::Internal("id read returned a result set".into())),
        };

        let user: UserDoc = bson::from_document(doc)
            .map_err(|e| GatehouseError::Internal(format!("user decode failed: {e}")))?;

        let stored_hash = user.password_hash.clone();
        let supplied = password.to_string();
        let verified =
            tokio::task::spawn_blocking(move || verify_password(&supplied, &stored_hash))
                .await
                .map_err(|e| GatehouseError::Internal(format!("verify task failed: {e}")))??;

        if verified {
            Ok(AuthOutcome::Verified(user))
        } else {
            warn!(user = %username, "password verification failed");
            Ok(AuthOutcome::Forbidden)
        }
    }

    /// List stored users with password hashes stripped.
    ///
    /// When `only` names a user, the listing is limited to that document.
    pub async fn list_users(&self, only: Option<&str>) -> Result<Vec<Document>> {
        let filter = match only {
            Some(username) => doc! { "_id": username },
            None => doc! {},
        };

        let outcome = self
            .gateway
            .read(
                USER_COLLECTION,
                ReadSelector::Filter(filter),
                ReadOptions::default(),
            )
            .await?;

        let docs = match outcome {
            ReadOutcome::Many(docs) => docs,
            _ => Vec::new(),
        };

        Ok(docs
            .into_iter()
            .map(|mut doc| {
                doc.remove("password_hash");
                doc
            })
            .collect())
    }

    /// Remove a user document
    pub async fn drop_user(&self, username: &str) -> Result<u64> {
        self.gateway
            .delete_one(USER_COLLECTION, UpdateSelector::Id(username.to_string()))
            .await
    }
}

async fn hash_blocking(password: String) -> Result<String> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| GatehouseError::Internal(format!("hash task failed: {e}")))?
}

/// Parse a role list from JSON input.
///
/// Accepts a JSON array of role names or a string containing one. Malformed
/// strings and unknown names fall back to the default member role; this is
/// a documented default substitution, not an error path.
pub fn parse_roles(input: &JsonValue, db: &str) -> Vec<RoleAssignment> {
    let names: Vec<String> = match input {
        JsonValue::String(raw) => match serde_json::from_str::<Vec<String>>(raw) {
            Ok(list) => list,
            Err(_) => vec![DEFAULT_ROLE.to_string()],
        },
        JsonValue::Array(items) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    };

    let mut roles: Vec<RoleAssignment> = names
        .iter()
        .filter_map(|name| {
            let lower = name.to_lowercase();
            KNOWN_ROLES.contains(&lower.as_str()).then(|| RoleAssignment {
                role: lower,
                db: db.to_string(),
            })
        })
        .collect();

    if roles.is_empty() {
        roles.push(RoleAssignment {
            role: DEFAULT_ROLE.to_string(),
            db: db.to_string(),
        });
    }
    roles
}

//! User document schema
//!
//! Stores user credentials and role grants, keyed by username.

use bson::{doc, Document};
use serde::{Deserialize, Serialize};

/// Collection name for users
pub const USER_COLLECTION: &str = "users";

/// Role names accepted on user documents
pub const KNOWN_ROLES: [&str; 3] = ["admin", "editor", "member"];

/// Role assigned when none (or only unknown names) were supplied
pub const DEFAULT_ROLE: &str = "member";

/// A role grant scoped to one database
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct RoleAssignment {
    pub role: String,
    pub db: String,
}

/// User document stored in the users collection
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct UserDoc {
    /// Username doubles as the document identifier
    #[serde(rename = "_id")]
    pub username: String,

    /// Argon2 PHC hash of the password
    pub password_hash: String,

    /// Role grants
    #[serde(default)]
    pub roles: Vec<RoleAssignment>,

    /// Free-form attributes (display name, contact details, ...)
    #[serde(default)]
    pub custom: Document,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<bson::DateTime>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<bson::DateTime>,
}

impl UserDoc {
    /// Create a new user document with fresh timestamps
    pub fn new(
        username: &str,
        password_hash: String,
        roles: Vec<RoleAssignment>,
        custom: Document,
    ) -> Self {
        let now = bson::DateTime::now();
        Self {
            username: username.to_string(),
            password_hash,
            roles,
            custom,
            created_at: Some(now),
            updated_at: Some(now),
        }
    }

    /// Plain role names, for session contexts
    pub fn role_names(&self) -> Vec<String> {
        self.roles.iter().map(|r| r.role.clone()).collect()
    }

    /// Index definitions applied by the user service
    pub fn indexes() -> Vec<(Document, bool)> {
        vec![(doc! { "roles.role": 1 }, false)]
    }
}

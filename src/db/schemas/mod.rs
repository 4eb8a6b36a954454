//! Document schemas
//!
//! Typed shapes for the documents the gateway manages itself; everything
//! else flows through as free-form `bson::Document`.

mod user;

pub use user::{RoleAssignment, UserDoc, DEFAULT_ROLE, KNOWN_ROLES, USER_COLLECTION};

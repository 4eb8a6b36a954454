//! Authentication for Gatehouse
//!
//! Provides:
//! - Basic-auth credential resolution
//! - Password hashing with Argon2
//! - User credential storage and verification over the Gateway

pub mod credentials;
pub mod password;
pub mod users;

pub use credentials::Credentials;
pub use password::{hash_password, verify_password};
pub use users::{parse_roles, AuthOutcome, UserService};

//! Durable storage for the one piece of player state that must survive a
//! restart: the participant identity handed out by join-session.

pub mod database;
pub mod error;
pub mod identity;
pub mod schema;

pub use database::Database;
pub use error::StoreError;
pub use identity::{IdentityRepo, StoredIdentity};

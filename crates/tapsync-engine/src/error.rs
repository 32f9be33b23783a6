use tapsync_core::SessionError;
use tapsync_store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A player cannot start without an identity from a prior join.
    #[error("no saved identity for profile '{profile}'; join a session first")]
    IdentityMissing { profile: String },

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Session(#[from] SessionError),
}

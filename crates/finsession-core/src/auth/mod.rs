//! Authentication module for managing sessions and credentials.
//!
//! This module provides:
//! - `CredentialStore`: durable storage of the access token, refresh token
//!   and cached user profile (file, OS keyring or in-memory backends)
//! - `SessionState`: the process-wide session object (`init` at boot,
//!   `reset` at logout)
//! - `TokenLifecycle` / `TokenLifecycleManager`: access-token expiry tracking
//!   with a renewal warning and forced logout
//!
//! Access tokens are valid for 15 minutes after login or renewal.

pub mod credentials;
pub mod lifecycle;
pub mod manager;
pub mod session;

pub use credentials::{
    CredentialStore, FileStore, KeyValueStore, KeyringStore, MemoryStore, StorageError,
};
pub use lifecycle::{LifecyclePolicy, LifecycleState, TokenLifecycle};
pub use manager::{TimerCounts, TokenLifecycleManager};
pub use session::{Session, SessionState};

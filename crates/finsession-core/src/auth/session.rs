use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use super::credentials::{CredentialStore, StorageError};
use crate::events::EventSink;
use crate::models::UserProfile;

/// The persisted part of a session. Expiry is tracked by the lifecycle
/// manager, never decoded from the token.
#[derive(Clone)]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub user: UserProfile,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("user", &self.user.id)
            .finish()
    }
}

/// Process-wide session state: the credential store, the cached profile and
/// the event sink. Created once at boot with [`SessionState::init`] and
/// emptied with [`SessionState::reset`] on logout.
pub struct SessionState {
    store: CredentialStore,
    user: Mutex<Option<UserProfile>>,
    events: EventSink,
}

impl SessionState {
    pub fn init(store: CredentialStore, events: EventSink) -> Arc<Self> {
        Arc::new(Self {
            store,
            user: Mutex::new(None),
            events,
        })
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    pub fn events(&self) -> &EventSink {
        &self.events
    }

    pub fn current_user(&self) -> Option<UserProfile> {
        self.user.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn is_admin(&self) -> bool {
        self.current_user().map(|u| u.is_admin()).unwrap_or(false)
    }

    /// Persist a complete session and make its user current.
    pub fn establish(&self, session: &Session) -> Result<(), StorageError> {
        self.store.save(session)?;
        self.set_user(session.user.clone());
        Ok(())
    }

    pub fn set_user(&self, user: UserProfile) {
        *self.user.lock().unwrap_or_else(PoisonError::into_inner) = Some(user);
    }

    /// Drop the cached user and clear the store.
    pub fn reset(&self) -> Result<(), StorageError> {
        self.user.lock().unwrap_or_else(PoisonError::into_inner).take();
        debug!("Session state reset");
        self.store.clear()
    }
}

//! Core session and API-access layer for the personal finance dashboard.
//!
//! Signs a user in, keeps the short-lived access token alive with silent
//! renewal, and brokers every data request to the backend. Frontends drive a
//! [`SessionController`] and render the [`SessionEvent`]s it publishes.

pub mod api;
pub mod auth;
pub mod config;
pub mod controller;
pub mod events;
pub mod models;
pub mod utils;

pub use api::{ApiClient, ApiError, RenewalError, RequestOptions};
pub use auth::{
    CredentialStore, LifecyclePolicy, LifecycleState, Session, SessionState,
    TokenLifecycleManager,
};
pub use config::{Config, StorageBackend};
pub use controller::{CompletedRedirect, RegistrationForm, SessionController};
pub use events::{
    EventSink, EventStream, LogoutReason, NotificationLevel, SessionEvent, EVENT_CHANNEL_CAPACITY,
};

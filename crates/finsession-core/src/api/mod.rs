//! REST API client module for the finance backend.
//!
//! This module provides the `ApiClient` request broker. It attaches the
//! bearer token from the credential store to every authenticated call and
//! recovers from an expired token with one silent renewal (shared by all
//! concurrent callers) followed by one replay.

pub mod client;
pub mod endpoints;
pub mod error;
pub mod request;

pub use client::{ApiClient, MAX_AUTH_RETRIES, REQUEST_TIMEOUT_SECS};
pub use error::{ApiError, RenewalError};
pub use request::RequestOptions;

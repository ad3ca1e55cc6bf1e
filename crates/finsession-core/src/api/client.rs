//! Authenticated request broker for the finance REST API.
//!
//! Every data call goes through [`ApiClient::call`], which attaches the
//! bearer token from the credential store, and on a 401 performs one silent
//! renewal followed by one replay of the identical request. Renewal is
//! single-flight: concurrent 401s share one `/auth/refresh` round trip.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use reqwest::header::{self, HeaderValue};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use super::{ApiError, RenewalError, RequestOptions};
use crate::auth::{SessionState, TokenLifecycleManager};
use crate::models::{RefreshRequest, RefreshResponse};

// ============================================================================
// Constants
// ============================================================================

/// HTTP request timeout in seconds.
/// 30s allows for slow API responses while failing fast enough for good UX.
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Replays allowed after a 401. A renewed token that is rejected again is final.
pub const MAX_AUTH_RETRIES: u32 = 1;

pub(crate) const REFRESH_ENDPOINT: &str = "/auth/refresh";

type PendingRenewal = Shared<BoxFuture<'static, Result<(), RenewalError>>>;

/// API client for the finance backend.
/// Clone is cheap - reqwest::Client and the session state are shared.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: Arc<str>,
    lifecycle: TokenLifecycleManager,
    pending_renewal: Arc<Mutex<Option<PendingRenewal>>>,
}

impl ApiClient {
    /// Create a client rooted at `base_url` (e.g. `https://host/api/v1`).
    pub fn new(base_url: &str, lifecycle: TokenLifecycleManager) -> Result<Self, ApiError> {
        Self::with_timeout(base_url, lifecycle, Duration::from_secs(REQUEST_TIMEOUT_SECS))
    }

    pub fn with_timeout(
        base_url: &str,
        lifecycle: TokenLifecycleManager,
        timeout: Duration,
    ) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: Arc::from(base_url.trim_end_matches('/')),
            lifecycle,
            pending_renewal: Arc::new(Mutex::new(None)),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn lifecycle(&self) -> &TokenLifecycleManager {
        &self.lifecycle
    }

    pub fn session(&self) -> &Arc<SessionState> {
        self.lifecycle.session()
    }

    pub(crate) fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    /// Issue a request and parse the JSON response body.
    ///
    /// A 401 on a non-`skip_auth` call triggers one renewal and one replay;
    /// if either fails the caller gets [`ApiError::AuthRejected`].
    pub async fn call<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        options: RequestOptions,
    ) -> Result<T, ApiError> {
        let auth_retries = if options.skip_auth { 0 } else { MAX_AUTH_RETRIES };
        self.call_with_retries(endpoint, &options, auth_retries).await
    }

    async fn call_with_retries<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        options: &RequestOptions,
        mut auth_retries: u32,
    ) -> Result<T, ApiError> {
        loop {
            let sent_token = if options.skip_auth {
                None
            } else {
                self.session().store().access_token()?
            };

            let response = self.send(endpoint, options, sent_token.as_deref()).await?;

            if response.status() != StatusCode::UNAUTHORIZED || options.skip_auth {
                return Self::parse_response(endpoint, response).await;
            }

            if auth_retries == 0 {
                warn!(endpoint, "Request rejected with 401, no retries left");
                return Err(ApiError::AuthRejected);
            }
            auth_retries -= 1;

            if self.token_replaced(sent_token.as_deref())? {
                debug!(endpoint, "Token was renewed while request was in flight, replaying");
                continue;
            }

            match self.renew().await {
                Ok(()) => {
                    debug!(endpoint, "Replaying request with renewed token");
                }
                Err(e) => {
                    warn!(endpoint, error = %e, "Renewal failed, request stays rejected");
                    return Err(ApiError::AuthRejected);
                }
            }
        }
    }

    /// True when the store now holds a different token than the one a request was sent with.
    fn token_replaced(&self, sent_token: Option<&str>) -> Result<bool, ApiError> {
        let current = self.session().store().access_token()?;
        Ok(current.is_some() && current.as_deref() != sent_token)
    }

    async fn send(
        &self,
        endpoint: &str,
        options: &RequestOptions,
        token: Option<&str>,
    ) -> Result<Response, ApiError> {
        let mut headers = options.headers.clone();
        if token.is_some() {
            headers.remove(header::AUTHORIZATION);
        }

        let mut request = self
            .client
            .request(options.method.clone(), self.url(endpoint))
            .header(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .headers(headers);

        if !options.query.is_empty() {
            request = request.query(&options.query);
        }
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        if let Some(ref body) = options.body {
            request = request.json(body);
        }

        debug!(method = %options.method, endpoint, authenticated = token.is_some(), "Sending request");
        Ok(request.send().await?)
    }

    async fn parse_response<T: DeserializeOwned>(
        endpoint: &str,
        response: Response,
    ) -> Result<T, ApiError> {
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            debug!(endpoint, status = %status, "Request failed");
            return Err(ApiError::from_status(status, &body));
        }

        let body = if body.trim().is_empty() { "null" } else { body.as_str() };
        serde_json::from_str(body).map_err(|e| {
            ApiError::InvalidResponse(format!("Failed to parse response from {}: {}", endpoint, e))
        })
    }

    // ===== Renewal =====

    /// Obtain a new access token with the stored refresh token.
    ///
    /// Single-flight: if a renewal is already in flight the caller waits for
    /// it and shares its outcome instead of issuing another refresh.
    pub async fn renew(&self) -> Result<(), RenewalError> {
        let pending = {
            let mut slot = self
                .pending_renewal
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            match slot.as_ref() {
                Some(pending) => {
                    debug!("Joining in-flight renewal");
                    pending.clone()
                }
                None => {
                    let this = self.clone();
                    let renewal = async move {
                        let result = this.perform_renewal().await;
                        this.pending_renewal
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .take();
                        result
                    }
                    .boxed()
                    .shared();
                    *slot = Some(renewal.clone());
                    renewal
                }
            }
        };
        pending.await
    }

    /// True while a renewal is in flight.
    pub fn renewal_pending(&self) -> bool {
        self.pending_renewal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    async fn perform_renewal(&self) -> Result<(), RenewalError> {
        let store = self.session().store();
        let generation = self.lifecycle.generation();
        let refresh_token = match store.refresh_token() {
            Ok(Some(token)) => token,
            Ok(None) => {
                debug!("No refresh token stored, cannot renew");
                return Err(RenewalError::NoSession);
            }
            Err(e) => return Err(RenewalError::Storage(e.to_string())),
        };

        info!("Renewing access token");
        let options = RequestOptions::post()
            .json(&RefreshRequest {
                refresh_token: refresh_token.clone(),
            })
            .map_err(|e| RenewalError::InvalidResponse(e.to_string()))?
            .skip_auth();

        let response = self
            .send(REFRESH_ENDPOINT, &options, None)
            .await
            .map_err(|e| {
                warn!(error = %e, "Renewal request failed");
                RenewalError::Network(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            warn!(status = %status, "Refresh token rejected");
            return Err(RenewalError::Rejected(status.as_u16()));
        }

        let renewed: RefreshResponse = response
            .json()
            .await
            .map_err(|e| RenewalError::InvalidResponse(e.to_string()))?;

        // Logout or a new login while the refresh was in flight wins
        let stored = store
            .store_renewed_if_current(
                &refresh_token,
                &renewed.access_token,
                renewed.refresh_token.as_deref(),
            )
            .map_err(|e| RenewalError::Storage(e.to_string()))?;
        if !stored {
            debug!("Session changed during renewal, discarding renewed token");
            return Err(RenewalError::Superseded);
        }
        if !self.lifecycle.restart_from(generation) {
            debug!("Lifecycle restarted or stopped during renewal, leaving countdown alone");
            return Err(RenewalError::Superseded);
        }

        info!("Access token renewed");
        Ok(())
    }
}

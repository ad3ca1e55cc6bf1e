//! Session controller: login, registration, logout and renewal flows.
//!
//! The controller sequences the credential store, the lifecycle manager and
//! the request broker, and reports every outcome to the frontend through
//! [`SessionEvent`]s. Failures that end the session (a 401 that renewal could
//! not recover) are turned into a forced logout here.

pub mod bootstrap;

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::api::{ApiClient, ApiError, RenewalError};
use crate::auth::{LifecycleState, Session, SessionState, TokenLifecycleManager};
use crate::config::Config;
use crate::events::{EventSink, LogoutReason, NotificationLevel, SessionEvent};
use crate::models::{
    ChangePasswordRequest, DashboardData, ProfileUpdate, RegisterRequest, UserProfile,
};

pub use bootstrap::{parse_redirect, Bootstrap, Redirect};

/// Transactions shown on the dashboard.
pub const RECENT_TRANSACTIONS: usize = 10;

/// Shortest password accepted by the registration and change-password forms.
pub const MIN_PASSWORD_LEN: usize = 6;

/// Registration form as entered by the user.
#[derive(Debug, Clone, Default)]
pub struct RegistrationForm {
    pub name: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

impl RegistrationForm {
    /// Client-side checks. Nothing is sent when these fail.
    pub fn validate(&self) -> Result<RegisterRequest, ApiError> {
        if self.name.trim().is_empty() || self.email.trim().is_empty() {
            return Err(ApiError::Validation(
                "Nombre y email son requeridos".to_string(),
            ));
        }
        validate_new_password(&self.password, &self.confirm_password)?;
        Ok(RegisterRequest {
            name: self.name.trim().to_string(),
            email: self.email.trim().to_string(),
            password: self.password.clone(),
        })
    }
}

fn validate_new_password(password: &str, confirm: &str) -> Result<(), ApiError> {
    if password != confirm {
        return Err(ApiError::Validation(
            "Las contraseñas no coinciden".to_string(),
        ));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ApiError::Validation(format!(
            "La contraseña debe tener al menos {} caracteres",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

/// Result of handing a redirect URL to [`SessionController::complete_redirect`].
#[derive(Debug, Clone)]
pub struct CompletedRedirect {
    /// The URL to show, bootstrap parameters removed
    pub url: String,
    /// Set when the redirect established a session
    pub user: Option<UserProfile>,
}

/// Orchestrates the session transitions. Clone is cheap.
#[derive(Clone)]
pub struct SessionController {
    api: ApiClient,
}

impl SessionController {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    /// Wire up store, lifecycle and broker from the configuration.
    pub fn from_config(config: &Config, events: EventSink) -> anyhow::Result<Self> {
        let session = SessionState::init(config.credential_store()?, events);
        let lifecycle = TokenLifecycleManager::new(session, config.session);
        let api = ApiClient::with_timeout(&config.api_base_url, lifecycle, config.request_timeout())?;
        Ok(Self::new(api))
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn lifecycle(&self) -> &TokenLifecycleManager {
        self.api.lifecycle()
    }

    pub fn session(&self) -> &Arc<SessionState> {
        self.api.session()
    }

    pub fn current_user(&self) -> Option<UserProfile> {
        self.session().current_user()
    }

    pub fn is_admin(&self) -> bool {
        self.session().is_admin()
    }

    fn events(&self) -> &EventSink {
        self.session().events()
    }

    fn notify(&self, level: NotificationLevel, message: impl Into<String>) {
        self.events().notify(level, message);
    }

    /// Boot-time restore of a stored session.
    ///
    /// A complete session re-enters `Active` with a fresh validity window.
    /// Partial leftovers are cleared. Returns true when a session was restored.
    pub fn restore(&self) -> Result<bool, ApiError> {
        let session = self.session();
        match session.store().load()? {
            Some(saved) => {
                info!(user = %saved.user.id, "Restored stored session");
                session.set_user(saved.user.clone());
                self.lifecycle().start();
                self.events()
                    .emit(SessionEvent::Authenticated { user: saved.user });
                Ok(true)
            }
            None => {
                if !session.store().is_empty()? {
                    debug!("Clearing incomplete stored session");
                }
                session.reset()?;
                self.events()
                    .emit(SessionEvent::StateChanged(LifecycleState::Unauthenticated));
                Ok(false)
            }
        }
    }

    /// Password login: store the session, start the countdown, show the dashboard.
    pub async fn login(&self, email: &str, password: &str) -> Result<UserProfile, ApiError> {
        if email.trim().is_empty() || password.is_empty() {
            let err = ApiError::Validation("Email y contraseña son requeridos".to_string());
            self.notify(NotificationLevel::Error, err.to_string());
            return Err(err);
        }

        let response = match self.api.login(email.trim(), password).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "Login failed");
                let message = match e {
                    ApiError::AuthRejected => "Credenciales inválidas".to_string(),
                    ref other => other.to_string(),
                };
                self.notify(NotificationLevel::Error, message);
                return Err(e);
            }
        };

        let session = Session {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            user: response.user,
        };
        self.establish(session)
    }

    fn establish(&self, session: Session) -> Result<UserProfile, ApiError> {
        // A previous session's countdown must not fire into the new one
        self.lifecycle().stop();
        self.session().establish(&session)?;
        self.lifecycle().start();

        let user = session.user;
        info!(user = %user.id, admin = user.is_admin(), "Signed in");
        self.events()
            .emit(SessionEvent::Authenticated { user: user.clone() });
        self.notify(
            NotificationLevel::Success,
            format!("Bienvenido, {}", user.greeting_name()),
        );
        Ok(user)
    }

    /// Create an account. No session results: new accounts wait for approval.
    pub async fn register(&self, form: &RegistrationForm) -> Result<String, ApiError> {
        let request = match form.validate() {
            Ok(request) => request,
            Err(e) => {
                self.notify(NotificationLevel::Error, e.to_string());
                return Err(e);
            }
        };

        match self.api.register(&request).await {
            Ok(response) => {
                let message = if response.message.is_empty() {
                    "Registro exitoso. Tu cuenta está pendiente de aprobación".to_string()
                } else {
                    response.message
                };
                info!(email = %request.email, "Registration submitted");
                self.notify(NotificationLevel::Success, message.clone());
                Ok(message)
            }
            Err(e) => {
                warn!(error = %e, "Registration failed");
                self.notify(NotificationLevel::Error, e.to_string());
                Err(e)
            }
        }
    }

    /// Clear the store, cancel timers, switch to the login view. Safe to repeat.
    pub fn logout(&self) {
        self.lifecycle().terminate(LogoutReason::UserRequested);
    }

    /// The renewal prompt was accepted.
    ///
    /// On failure nothing changes: the visible countdown keeps running.
    pub async fn accept_renewal(&self) -> bool {
        match self.api.renew().await {
            Ok(()) => {
                self.notify(NotificationLevel::Success, "Sesión renovada");
                true
            }
            Err(RenewalError::NoSession) => {
                debug!("Renewal accepted without a stored session");
                false
            }
            Err(e) => {
                warn!(error = %e, "Renewal failed, countdown continues");
                false
            }
        }
    }

    /// The renewal prompt was dismissed.
    pub fn decline_renewal(&self) {
        info!("Renewal declined");
        self.logout();
    }

    /// URL that starts the identity-provider sign-in.
    pub fn google_login_url(&self) -> String {
        self.api.google_redirect_url()
    }

    /// Consume bootstrap tokens from a provider redirect.
    ///
    /// Tokens are stored exactly as a password login would store them, after
    /// fetching the profile they belong to. Only an unparseable URL is an error;
    /// other failures are reported as notifications.
    pub async fn complete_redirect(&self, url: &str) -> Result<CompletedRedirect, ApiError> {
        let redirect = parse_redirect(url)
            .map_err(|e| ApiError::Validation(format!("URL de redirección inválida: {}", e)))?;

        let user = match redirect.bootstrap {
            Bootstrap::Absent => None,
            Bootstrap::Failed(message) => {
                warn!(%message, "Identity provider sign-in failed");
                self.notify(NotificationLevel::Error, message);
                None
            }
            Bootstrap::Tokens {
                access_token,
                refresh_token,
            } => self.establish_from_tokens(&access_token, &refresh_token).await,
        };

        Ok(CompletedRedirect {
            url: redirect.sanitized_url,
            user,
        })
    }

    async fn establish_from_tokens(
        &self,
        access_token: &str,
        refresh_token: &str,
    ) -> Option<UserProfile> {
        self.lifecycle().stop();
        if let Err(e) = self.session().store().save_tokens(access_token, refresh_token) {
            warn!(error = %e, "Failed to store bootstrap tokens");
            self.notify(NotificationLevel::Error, e.to_string());
            return None;
        }

        let profile = match self.api.profile().await {
            Ok(profile) => profile,
            Err(e) => {
                warn!(error = %e, "Could not load profile for bootstrap tokens");
                if let Err(e) = self.session().reset() {
                    warn!(error = %e, "Failed to clear bootstrap tokens");
                }
                self.notify(NotificationLevel::Error, "No se pudo completar el inicio de sesión");
                return None;
            }
        };

        // The profile fetch may have renewed the access token
        let store = self.session().store();
        let session = match (store.access_token(), store.refresh_token()) {
            (Ok(Some(access_token)), Ok(Some(refresh_token))) => Session {
                access_token,
                refresh_token,
                user: profile,
            },
            _ => {
                warn!("Bootstrap tokens vanished before the session was established");
                return None;
            }
        };

        match self.establish(session) {
            Ok(user) => Some(user),
            Err(e) => {
                warn!(error = %e, "Failed to store bootstrap session");
                self.notify(NotificationLevel::Error, e.to_string());
                None
            }
        }
    }

    /// Run a brokered call and report its failure.
    ///
    /// An auth failure (401 that renewal could not recover) forces a logout;
    /// every other error becomes an error notification.
    pub async fn request<T, F>(&self, call: F) -> Result<T, ApiError>
    where
        F: Future<Output = Result<T, ApiError>>,
    {
        call.await.map_err(|e| self.report(e))
    }

    fn report(&self, error: ApiError) -> ApiError {
        if error.is_auth_failure() {
            warn!(error = %error, "Session rejected by server, logging out");
            self.lifecycle().terminate(LogoutReason::AuthRejected);
            self.notify(
                NotificationLevel::Error,
                "Tu sesión ha expirado. Inicia sesión nuevamente",
            );
        } else {
            if !error.is_validation() {
                warn!(error = %error, "Request failed");
            }
            self.notify(NotificationLevel::Error, error.to_string());
        }
        error
    }

    pub async fn change_password(
        &self,
        current: &str,
        new_password: &str,
        confirm: &str,
    ) -> Result<String, ApiError> {
        let request = async {
            validate_new_password(new_password, confirm)?;
            let body = ChangePasswordRequest {
                current_password: current.to_string(),
                new_password: new_password.to_string(),
            };
            self.api.change_password(&body).await
        };
        let ack = self.request(request).await?;
        self.notify(NotificationLevel::Success, "Contraseña actualizada");
        Ok(ack.message)
    }

    /// Update the signed-in user's profile and refresh the cached copy, so a
    /// later restore shows the new name without another `/perfil` round trip.
    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<UserProfile, ApiError> {
        let request = async {
            if update.display_name.is_none() && update.email.is_none() && update.photo_url.is_none() {
                return Err(ApiError::Validation("Nada que actualizar".to_string()));
            }
            self.api.update_profile(update).await?;
            self.api.profile().await
        };
        let user = self.request(request).await?;

        let session = self.session();
        session.store().save_user(&user)?;
        session.set_user(user.clone());
        self.notify(NotificationLevel::Success, "Perfil actualizado");
        Ok(user)
    }

    /// Everything the dashboard shows, fetched concurrently.
    ///
    /// The three calls share a single renewal if the token has expired.
    pub async fn load_dashboard(&self, year: i32, month: u32) -> Result<DashboardData, ApiError> {
        let fetch = async {
            if !(1..=12).contains(&month) {
                return Err(ApiError::Validation(format!("Mes inválido: {}", month)));
            }
            let (mut transactions, categories, statistics) = futures::try_join!(
                self.api.transactions(),
                self.api.categories(),
                self.api.statistics(year, month)
            )?;

            transactions.sort_by(|a, b| b.date.cmp(&a.date));
            transactions.truncate(RECENT_TRANSACTIONS);
            debug!(
                transactions = transactions.len(),
                categories = categories.len(),
                "Dashboard loaded"
            );

            Ok(DashboardData {
                recent_transactions: transactions,
                categories,
                statistics,
                year,
                month,
            })
        };
        self.request(fetch).await
    }
}

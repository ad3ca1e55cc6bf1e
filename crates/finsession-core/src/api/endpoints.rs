//! Typed wrappers for the backend endpoints.
//!
//! Paths are relative to the versioned API root. Everything except the
//! `/auth/login`, `/auth/register` and `/auth/google` calls is brokered with
//! the bearer token.

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{ApiClient, ApiError, RequestOptions};
use crate::models::{
    Ack, Category, CategoryInput, ChangePasswordRequest, LoginRequest, LoginResponse,
    ProfileUpdate, ProviderUrl, RegisterRequest, RegisterResponse, Role, RoleChangeRequest,
    Statistics, Transaction, TransactionInput, UserProfile,
};

impl ApiClient {
    async fn get<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, ApiError> {
        self.call(endpoint, RequestOptions::get()).await
    }

    /// GET a list endpoint. The server sends `null` for an empty collection.
    async fn get_list<T: DeserializeOwned>(&self, endpoint: &str) -> Result<Vec<T>, ApiError> {
        let list: Option<Vec<T>> = self.get(endpoint).await?;
        Ok(list.unwrap_or_default())
    }

    async fn send_json<T: DeserializeOwned, B: Serialize>(
        &self,
        endpoint: &str,
        options: RequestOptions,
        body: &B,
    ) -> Result<T, ApiError> {
        self.call(endpoint, options.json(body)?).await
    }

    fn require_admin(&self) -> Result<(), ApiError> {
        if self.session().is_admin() {
            Ok(())
        } else {
            Err(ApiError::AccessDenied(
                "administrator role required".to_string(),
            ))
        }
    }

    // ===== Auth =====

    /// Exchange credentials for a token pair. Does not touch the credential store.
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginResponse, ApiError> {
        let body = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        self.send_json("/auth/login", RequestOptions::post().skip_auth(), &body)
            .await
    }

    pub async fn register(&self, request: &RegisterRequest) -> Result<RegisterResponse, ApiError> {
        self.send_json("/auth/register", RequestOptions::post().skip_auth(), request)
            .await
    }

    pub async fn change_password(
        &self,
        request: &ChangePasswordRequest,
    ) -> Result<Ack, ApiError> {
        self.send_json("/cambiar-password", RequestOptions::post(), request)
            .await
    }

    /// Where to send the browser for identity-provider sign-in.
    pub fn google_redirect_url(&self) -> String {
        self.url("/auth/google")
    }

    /// Ask the backend for the provider consent URL.
    pub async fn google_auth_url(&self) -> Result<String, ApiError> {
        let provider: ProviderUrl = self
            .call("/auth/google", RequestOptions::get().skip_auth())
            .await?;
        Ok(provider.url)
    }

    // ===== Profile =====

    pub async fn profile(&self) -> Result<UserProfile, ApiError> {
        self.get("/perfil").await
    }

    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<Ack, ApiError> {
        self.send_json("/perfil", RequestOptions::put(), update).await
    }

    // ===== Categories =====

    pub async fn categories(&self) -> Result<Vec<Category>, ApiError> {
        self.get_list("/categorias").await
    }

    pub async fn category(&self, id: &str) -> Result<Category, ApiError> {
        self.get(&format!("/categorias/{}", id)).await
    }

    pub async fn create_category(&self, input: &CategoryInput) -> Result<Category, ApiError> {
        self.send_json("/categorias", RequestOptions::post(), input)
            .await
    }

    pub async fn update_category(
        &self,
        id: &str,
        input: &CategoryInput,
    ) -> Result<Category, ApiError> {
        self.send_json(&format!("/categorias/{}", id), RequestOptions::put(), input)
            .await
    }

    pub async fn delete_category(&self, id: &str) -> Result<Ack, ApiError> {
        self.call(&format!("/categorias/{}", id), RequestOptions::delete())
            .await
    }

    // ===== Transactions =====

    pub async fn transactions(&self) -> Result<Vec<Transaction>, ApiError> {
        self.get_list("/transacciones").await
    }

    pub async fn transaction(&self, id: &str) -> Result<Transaction, ApiError> {
        self.get(&format!("/transacciones/{}", id)).await
    }

    pub async fn create_transaction(
        &self,
        input: &TransactionInput,
    ) -> Result<Transaction, ApiError> {
        if !(input.amount > 0.0) {
            return Err(ApiError::Validation(
                "El monto debe ser mayor que cero".to_string(),
            ));
        }
        self.send_json("/transacciones", RequestOptions::post(), input)
            .await
    }

    pub async fn update_transaction(
        &self,
        id: &str,
        input: &TransactionInput,
    ) -> Result<Transaction, ApiError> {
        self.send_json(
            &format!("/transacciones/{}", id),
            RequestOptions::put(),
            input,
        )
        .await
    }

    pub async fn delete_transaction(&self, id: &str) -> Result<Ack, ApiError> {
        self.call(&format!("/transacciones/{}", id), RequestOptions::delete())
            .await
    }

    // ===== Reports =====

    /// Monthly statistics. `month` is 1-based.
    pub async fn statistics(&self, year: i32, month: u32) -> Result<Statistics, ApiError> {
        if !(1..=12).contains(&month) {
            return Err(ApiError::Validation(format!("Mes inválido: {}", month)));
        }
        let options = RequestOptions::get()
            .query("year", year)
            .query("month", month);
        self.call("/reportes/estadisticas", options).await
    }

    // ===== Admin =====

    pub async fn users(&self) -> Result<Vec<UserProfile>, ApiError> {
        self.require_admin()?;
        self.get_list("/admin/usuarios").await
    }

    pub async fn user(&self, id: &str) -> Result<UserProfile, ApiError> {
        self.require_admin()?;
        self.get(&format!("/admin/usuarios/{}", id)).await
    }

    async fn admin_patch(&self, id: &str, action: &str) -> Result<Ack, ApiError> {
        self.require_admin()?;
        self.call(
            &format!("/admin/usuarios/{}/{}", id, action),
            RequestOptions::patch(),
        )
        .await
    }

    pub async fn approve_user(&self, id: &str) -> Result<Ack, ApiError> {
        self.admin_patch(id, "aprobar").await
    }

    pub async fn activate_user(&self, id: &str) -> Result<Ack, ApiError> {
        self.admin_patch(id, "activar").await
    }

    pub async fn deactivate_user(&self, id: &str) -> Result<Ack, ApiError> {
        self.admin_patch(id, "desactivar").await
    }

    pub async fn change_user_role(&self, id: &str, role: Role) -> Result<Ack, ApiError> {
        self.require_admin()?;
        self.send_json(
            &format!("/admin/usuarios/{}/rol", id),
            RequestOptions::patch(),
            &RoleChangeRequest { role },
        )
        .await
    }

    pub async fn delete_user(&self, id: &str) -> Result<Ack, ApiError> {
        self.require_admin()?;
        self.call(&format!("/admin/usuarios/{}", id), RequestOptions::delete())
            .await
    }
}

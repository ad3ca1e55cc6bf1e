//! Data models for the finance backend.
//!
//! This module contains the wire types exchanged with the REST API:
//!
//! - `UserProfile`, `Role`, `AccountStatus`: the signed-in user and admin views
//! - `Category`, `Transaction`: ledger entities and their input bodies
//! - `Statistics`, `DashboardData`: monthly aggregates
//! - Auth bodies: login, register, refresh, password and role changes
//!
//! Field names on the wire are Spanish (`nombre`, `monto`, ...); the Rust
//! side uses English names via serde renames.

pub mod auth;
pub mod category;
pub mod report;
pub mod transaction;
pub mod user;

pub use auth::{
    Ack, ChangePasswordRequest, LoginRequest, LoginResponse, ProviderUrl, RefreshRequest,
    RefreshResponse, RegisterRequest, RegisterResponse, RoleChangeRequest,
};
pub use category::{Category, CategoryInput, CategoryKind};
pub use report::{DashboardData, Statistics};
pub use transaction::{Account, Transaction, TransactionInput, TransactionKind};
pub use user::{AccountStatus, ProfileUpdate, Role, UserProfile};

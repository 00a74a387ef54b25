//! roster-client: REST client for the personnel API.
//!
//! One [`ApiClient`] per application context: it owns the HTTP client, the
//! persisted [`AuthStore`] and the [`UnauthorizedGuard`]. Resource CRUD, the
//! face-recognition endpoints and the schedule feeds are `impl` blocks on it.

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod face;
pub mod guard;
pub mod resources;
pub mod schedule;

pub use auth::{AuthSession, AuthStore};
pub use client::ApiClient;
pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use guard::{MemoryNavigator, Navigator, UnauthorizedGuard, LOGIN_ROUTE};

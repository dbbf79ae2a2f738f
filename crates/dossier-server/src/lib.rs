//! HTTP adapter for Dossier.
//!
//! Exposes the versioning engine over REST: raw-body uploads, explicit
//! activation, and version listings. Engine errors map to status codes in
//! one place ([`ServerError`]'s `IntoResponse`), with `{"error", "message"}`
//! bodies.

pub mod config;
pub mod error;
pub mod handler;
pub mod router;
pub mod server;
pub mod state;

pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use server::DossierServer;
pub use state::AppState;

//! HTTP surface of the VICE exposer
//!
//! `POST /vice/launch` admits a job, compiles it and provisions the
//! result. The instant launch routes serve the default file-pattern
//! mappings and per-user overrides read-only.

#![deny(missing_docs)]

pub mod config;
pub mod error;
pub mod instant_launches;
pub mod launch;
pub mod server;

pub use config::Config;
pub use error::ApiError;
pub use instant_launches::{InstantLaunchStore, PgInstantLaunchStore};
pub use server::{router, serve, AppState};

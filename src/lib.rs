//! Credit Meter
//!
//! Daily/monthly credit metering and subscription gating for AI page generation.
//!
//! ## Standalone
//!
//! Run the binary:
//! ```bash
//! credit-meter-server
//! ```
//!
//! ## Embedded (Axum)
//!
//! When the `server` feature is enabled, this crate can be embedded into a larger Axum app:
//! ```rust,ignore
//! use axum::Router;
//! use credit_meter::infrastructure::AppConfig;
//! use credit_meter::server::{build_state_with_pool, router};
//! use sqlx::PgPool;
//!
//! let cfg = AppConfig::from_env()?;
//! let pool = PgPool::connect(&cfg.database_url).await?;
//! let state = build_state_with_pool(cfg, pool, true).await?;
//! let app = Router::new().nest("/billing", router(state));
//! ```

pub mod application;
pub mod domain;
pub mod infrastructure;

// Enabled behind the `server` feature so the core library can be used without Axum.
#[cfg(feature = "server")]
pub mod server;

pub use application::*;
pub use domain::*;
pub use infrastructure::*;

#[cfg(feature = "server")]
pub use server::*;

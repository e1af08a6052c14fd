//! # NavFiles Daemon Library
//!
//! File management for the navigation data server: browse, preview, upload,
//! edit, move, delete and download files confined to administrator-configured
//! root directories.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                    HTTP server (axum)                    │
//! ├──────────────────────────────────────────────────────────┤
//! │  Root Registry ──▶ Containment Guard ──▶ file services    │
//! │                                                          │
//! │  ┌───────────┐ ┌───────────┐ ┌──────────┐ ┌───────────┐  │
//! │  │ Directory │ │  Content  │ │ Mutation │ │  Upload   │  │
//! │  └───────────┘ └─────┬─────┘ └──────────┘ └───────────┘  │
//! │                ┌─────┴─────┐                             │
//! │                │  Archive  │                             │
//! │                └───────────┘                             │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use daemon::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("/etc/navfiles/config.toml")?;
//!     config.validate()?;
//!
//!     daemon::server::serve(&config, async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await
//! }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: TOML configuration
//! - [`files`]: root registry, containment guard and file services
//! - [`server`]: HTTP routes

pub mod config;
pub mod files;
pub mod server;

pub use config::{Config, ConfigError};
pub use files::{FileError, FileRoot, ResolvedPath, RootRegistry};
pub use server::{router, AppState};

//! Common utilities and shared types for votebattle.
//!
//! This crate provides foundational components used across all votebattle crates:
//!
//! - **Configuration**: Application settings via [`Config`]
//! - **Error handling**: Unified error types via [`AppError`] and [`AppResult`]
//! - **ID Generation**: Local record identities via [`IdGenerator`]
//! - **Telemetry**: Tracing subscriber setup via [`init_tracing`]
//!
//! # Example
//!
//! ```no_run
//! use votebattle_common::{AppResult, Config, IdGenerator};
//!
//! fn example() -> AppResult<()> {
//!     let config = Config::load()?;
//!     if !config.remote.is_configured() {
//!         println!("Using local storage only");
//!     }
//!     let id = IdGenerator::new().next_local_id();
//!     println!("Generated ID: {}", id);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod id;
pub mod telemetry;

pub use config::{BattleConfig, Config, LocalConfig, LookupConfig, RemoteConfig};
pub use error::{AppError, AppResult};
pub use id::IdGenerator;
pub use telemetry::init_tracing;

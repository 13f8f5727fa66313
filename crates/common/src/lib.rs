//! Common utilities and shared types for emissary.
//!
//! This crate provides the pieces every other emissary crate leans on:
//!
//! - **Configuration**: Application settings via [`Config`]
//! - **Error handling**: Unified error taxonomy via [`AppError`] and [`AppResult`]
//!
//! # Example
//!
//! ```no_run
//! use emissary_common::{AppResult, Config};
//!
//! fn example() -> AppResult<()> {
//!     let config = Config::load()?;
//!     println!("Serving {}", config.server.url);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;

pub use config::Config;
pub use error::{AppError, AppResult};

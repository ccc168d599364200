//! # campus-core
//!
//! Core crate for Campus Live. Contains configuration schemas, typed
//! identifiers, the bearer-token supplier seam, and the unified error
//! system shared by the realtime and office-hours crates.
//!
//! This crate has **no** internal dependencies on other Campus Live crates.

pub mod config;
pub mod error;
pub mod result;
pub mod traits;
pub mod types;

pub use error::{AppError, ErrorKind};
pub use result::AppResult;

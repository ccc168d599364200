//! Core traits defined in `campus-core` and implemented by other crates.

pub mod token;

pub use token::{StaticTokenSupplier, TokenSupplier};

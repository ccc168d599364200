//! Core type definitions used across the Campus Live workspace.

pub mod id;

pub use id::*;

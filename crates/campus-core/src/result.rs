//! Convenience result type alias for Campus Live.

use crate::error::AppError;

/// A specialized `Result` type for Campus Live operations.
pub type AppResult<T> = Result<T, AppError>;

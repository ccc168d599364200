//! Bearer token supplier consulted at every handshake and REST call.

use std::fmt;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::result::AppResult;

/// Source of the current bearer token.
///
/// The session store that owns token persistence, refresh and account
/// switching implements this trait. Callers resolve the token fresh for
/// every connect or request and never cache the returned value.
#[async_trait]
pub trait TokenSupplier: Send + Sync + fmt::Debug + 'static {
    /// Return the current bearer token, or `None` for anonymous access.
    async fn bearer_token(&self) -> AppResult<Option<String>>;
}

/// A token supplier backed by a replaceable in-memory value.
///
/// Useful for the binary (token read from the environment) and for tests
/// that rotate the token between handshakes.
#[derive(Clone, Default)]
pub struct StaticTokenSupplier {
    token: Arc<RwLock<Option<String>>>,
}

impl StaticTokenSupplier {
    /// Create a supplier returning the given token.
    pub fn new(token: Option<String>) -> Self {
        Self {
            token: Arc::new(RwLock::new(token)),
        }
    }

    /// Replace the token returned by subsequent calls.
    pub fn set(&self, token: Option<String>) {
        let mut guard = self.token.write().unwrap_or_else(|e| e.into_inner());
        *guard = token;
    }
}

impl fmt::Debug for StaticTokenSupplier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let present = self
            .token
            .read()
            .map(|t| t.is_some())
            .unwrap_or_else(|e| e.into_inner().is_some());
        f.debug_struct("StaticTokenSupplier")
            .field("token", &if present { "<redacted>" } else { "<none>" })
            .finish()
    }
}

#[async_trait]
impl TokenSupplier for StaticTokenSupplier {
    async fn bearer_token(&self) -> AppResult<Option<String>> {
        let guard = self.token.read().unwrap_or_else(|e| e.into_inner());
        Ok(guard.clone())
    }
}

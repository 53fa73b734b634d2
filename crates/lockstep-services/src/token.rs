//! Per-workflow client tokens

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::ServiceError;

/// Opaque short-lived credential attached to cloud calls
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ClientToken(String);

impl ClientToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for ClientToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ClientToken(..)")
    }
}

/// Issues a token for each workflow invocation
///
/// Tokens are never cached by the engine beyond the invocation they were
/// issued for.
#[async_trait]
pub trait ClientTokenSource: Send + Sync {
    async fn client_token(&self) -> Result<ClientToken, ServiceError>;
}

/// Issues a fresh random UUID per call
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidTokenSource;

#[async_trait]
impl ClientTokenSource for UuidTokenSource {
    async fn client_token(&self) -> Result<ClientToken, ServiceError> {
        Ok(ClientToken(Uuid::new_v4().to_string()))
    }
}

/// Always returns the same token (for callers that already hold one)
#[derive(Debug, Clone)]
pub struct StaticTokenSource(ClientToken);

impl StaticTokenSource {
    pub fn new(token: impl Into<String>) -> Self {
        Self(ClientToken::new(token))
    }
}

#[async_trait]
impl ClientTokenSource for StaticTokenSource {
    async fn client_token(&self) -> Result<ClientToken, ServiceError> {
        Ok(self.0.clone())
    }
}

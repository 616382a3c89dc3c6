//! Credential verification interface.

use async_trait::async_trait;

use super::{AuthError, UserId};

/// Turns the access credential presented at handshake into a verified identity
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<UserId, AuthError>;
}

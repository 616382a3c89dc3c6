//! JWT credential verification.
//!
//! Access tokens are HS256 JWTs whose `sub` claim is the user id. A token is
//! only accepted when its signature and expiry check out *and* the user still
//! exists in the user store.

use std::sync::Arc;

use async_trait::async_trait;
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind,
};
use serde::{Deserialize, Serialize};

use crate::domain::{AuthError, CredentialVerifier, UserId, UserRepository};

/// JWT claims issued to chat clients
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    /// Issued at (seconds)
    pub iat: i64,
    /// Expiration (seconds)
    pub exp: i64,
}

pub struct JwtCredentialVerifier {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    users: Arc<dyn UserRepository>,
}

impl JwtCredentialVerifier {
    pub fn new(secret: &str, users: Arc<dyn UserRepository>) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            users,
        }
    }

    /// Mint an access token for `user_id` valid for `ttl_seconds`
    pub fn issue_token(
        &self,
        user_id: &UserId,
        ttl_seconds: i64,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            sub: user_id.as_str().to_string(),
            iat: now,
            exp: now + ttl_seconds,
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
    }

    fn decode_claims(&self, token: &str) -> Result<Claims, AuthError> {
        let validation = Validation::new(Algorithm::HS256);
        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => AuthError::InvalidToken(e.to_string()),
            })
    }
}

#[async_trait]
impl CredentialVerifier for JwtCredentialVerifier {
    async fn verify(&self, token: &str) -> Result<UserId, AuthError> {
        if token.trim().is_empty() {
            return Err(AuthError::MissingToken);
        }

        let claims = self.decode_claims(token)?;
        let user_id = UserId::new(claims.sub)
            .map_err(|e| AuthError::InvalidToken(format!("bad subject: {e}")))?;

        match self.users.find_user(&user_id).await {
            Ok(Some(_)) => Ok(user_id),
            Ok(None) => Err(AuthError::UnknownUser(user_id.into_string())),
            Err(e) => Err(AuthError::Unavailable(e.to_string())),
        }
    }
}

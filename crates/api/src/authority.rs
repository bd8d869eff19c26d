//! Identity authority for the HTTP host.

use std::sync::Arc;

use async_trait::async_trait;
use domain::KeyManagement;
use inbound::{AuthorityError, IdentityAuthority, StaticTokenAuthority, VerifiedClaims};

/// Accepts the configured `AUTH_TOKENS` and the secrets of keys issued by
/// account provisioning.
///
/// A key secret verifies as its owner with the key as credential, so a freshly
/// provisioned account can submit prompts against its own balance.
pub struct AccountAuthority {
    tokens: StaticTokenAuthority,
    keys: Arc<dyn KeyManagement>,
}

impl AccountAuthority {
    pub fn new(tokens: StaticTokenAuthority, keys: Arc<dyn KeyManagement>) -> Self {
        Self { tokens, keys }
    }
}

#[async_trait]
impl IdentityAuthority for AccountAuthority {
    async fn verify(&self, token: &str) -> Result<VerifiedClaims, AuthorityError> {
        if let Ok(claims) = self.tokens.verify(token).await {
            return Ok(claims);
        }

        match self.keys.verify_secret(token).await {
            Ok(Some(key)) => Ok(VerifiedClaims::for_subject(key.user_id).with_key_id(key.key_id)),
            Ok(None) => Err(AuthorityError::Rejected("unknown token".to_string())),
            Err(err) => {
                tracing::error!(error = %err, "key lookup failed during verification");
                Err(AuthorityError::Unavailable(err.to_string()))
            }
        }
    }
}

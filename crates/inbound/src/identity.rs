//! Caller identity resolution.
//!
//! [`IdentityResolver`] turns an HTTP event into a [`CallerIdentity`].
//! [`BearerIdentityResolver`] reads a bearer credential from a designated
//! header and verifies it against an [`IdentityAuthority`], the boundary to
//! the external identity provider.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use common::{AppError, CallerIdentity};
use thiserror::Error;

use crate::http::HttpEvent;

/// Claims returned by the identity authority for a verified credential.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VerifiedClaims {
    /// Principal id claim. Verification succeeds even when absent; the
    /// resolver rejects such credentials.
    pub subject: Option<String>,
    /// API key id claim, when the credential carries one.
    pub key_id: Option<String>,
}

impl VerifiedClaims {
    pub fn for_subject(subject: impl Into<String>) -> Self {
        Self {
            subject: Some(subject.into()),
            key_id: None,
        }
    }

    pub fn with_key_id(mut self, key_id: impl Into<String>) -> Self {
        self.key_id = Some(key_id.into());
        self
    }
}

/// Why the identity authority did not return claims.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthorityError {
    /// The credential is invalid, expired or unknown.
    #[error("credential rejected: {0}")]
    Rejected(String),

    /// The authority could not be reached.
    #[error("identity authority unavailable: {0}")]
    Unavailable(String),
}

impl From<AuthorityError> for AppError {
    fn from(err: AuthorityError) -> Self {
        match err {
            AuthorityError::Rejected(reason) => AppError::Authentication(reason),
            AuthorityError::Unavailable(reason) => AppError::Internal(reason),
        }
    }
}

/// The external identity authority.
///
/// Implementations must be safe to call concurrently.
#[async_trait]
pub trait IdentityAuthority: Send + Sync {
    async fn verify(&self, token: &str) -> Result<VerifiedClaims, AuthorityError>;
}

#[async_trait]
impl<A: IdentityAuthority + ?Sized> IdentityAuthority for Arc<A> {
    async fn verify(&self, token: &str) -> Result<VerifiedClaims, AuthorityError> {
        (**self).verify(token).await
    }
}

/// Resolves the caller behind an HTTP event.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve(&self, event: &HttpEvent) -> Result<CallerIdentity, AppError>;
}

#[async_trait]
impl<R: IdentityResolver + ?Sized> IdentityResolver for Arc<R> {
    async fn resolve(&self, event: &HttpEvent) -> Result<CallerIdentity, AppError> {
        (**self).resolve(event).await
    }
}

/// Resolves identities from `Bearer <token>` credentials.
///
/// Holds no cache; each call goes to the authority.
pub struct BearerIdentityResolver<A> {
    authority: A,
    header: String,
}

impl<A: IdentityAuthority> BearerIdentityResolver<A> {
    /// Reads the credential from the `authorization` header.
    pub fn new(authority: A) -> Self {
        Self {
            authority,
            header: "authorization".to_string(),
        }
    }

    /// Reads the credential from a different header.
    pub fn with_header(mut self, header: impl Into<String>) -> Self {
        self.header = header.into();
        self
    }

    fn bearer_token<'a>(&self, event: &'a HttpEvent) -> Result<&'a str, AppError> {
        let value = event
            .header(&self.header)
            .ok_or_else(|| AppError::Authentication("missing credential".to_string()))?;

        let (scheme, token) = value
            .trim()
            .split_once(' ')
            .ok_or_else(|| AppError::Authentication("malformed credential".to_string()))?;
        let token = token.trim();

        if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() || token.contains(' ') {
            return Err(AppError::Authentication("malformed credential".to_string()));
        }
        Ok(token)
    }
}

#[async_trait]
impl<A: IdentityAuthority> IdentityResolver for BearerIdentityResolver<A> {
    #[tracing::instrument(skip_all, fields(principal_id))]
    async fn resolve(&self, event: &HttpEvent) -> Result<CallerIdentity, AppError> {
        let token = self.bearer_token(event)?;
        let claims = self.authority.verify(token).await.map_err(|err| {
            tracing::debug!(error = %err, "credential verification failed");
            AppError::from(err)
        })?;

        let principal_id = claims
            .subject
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| AppError::Authentication("principal id claim missing".to_string()))?;
        tracing::Span::current().record("principal_id", principal_id.as_str());

        let identity = CallerIdentity::new(principal_id);
        Ok(match claims.key_id {
            Some(key_id) => identity.with_credential(key_id),
            None => identity,
        })
    }
}

/// An identity authority backed by a fixed token table.
///
/// Used for local development and tests in place of the hosted provider.
#[derive(Debug, Clone, Default)]
pub struct StaticTokenAuthority {
    tokens: HashMap<String, VerifiedClaims>,
}

impl StaticTokenAuthority {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, token: impl Into<String>, claims: VerifiedClaims) -> Self {
        self.tokens.insert(token.into(), claims);
        self
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

#[async_trait]
impl IdentityAuthority for StaticTokenAuthority {
    async fn verify(&self, token: &str) -> Result<VerifiedClaims, AuthorityError> {
        self.tokens
            .get(token)
            .cloned()
            .ok_or_else(|| AuthorityError::Rejected("unknown token".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> BearerIdentityResolver<StaticTokenAuthority> {
        let authority = StaticTokenAuthority::new()
            .with_token("good", VerifiedClaims::for_subject("u1").with_key_id("k1"))
            .with_token("anonymous", VerifiedClaims::default());
        BearerIdentityResolver::new(authority)
    }

    fn event(authorization: &str) -> HttpEvent {
        HttpEvent::new("GET", "/").with_header("Authorization", authorization)
    }

    #[tokio::test]
    async fn test_resolves_principal_and_key() {
        let identity = resolver().resolve(&event("Bearer good")).await.unwrap();
        assert_eq!(identity, CallerIdentity::new("u1").with_credential("k1"));
    }

    #[tokio::test]
    async fn test_missing_header() {
        let err = resolver()
            .resolve(&HttpEvent::new("GET", "/"))
            .await
            .unwrap_err();
        assert_eq!(err, AppError::Authentication("missing credential".to_string()));
    }

    #[tokio::test]
    async fn test_malformed_credentials() {
        for value in ["good", "Basic good", "Bearer ", "Bearer a b"] {
            let err = resolver().resolve(&event(value)).await.unwrap_err();
            assert_eq!(
                err,
                AppError::Authentication("malformed credential".to_string()),
                "{value:?}"
            );
        }
    }

    #[tokio::test]
    async fn test_rejected_token() {
        let err = resolver().resolve(&event("Bearer nope")).await.unwrap_err();
        assert!(matches!(err, AppError::Authentication(_)));
    }

    #[tokio::test]
    async fn test_missing_principal_claim() {
        let err = resolver()
            .resolve(&event("Bearer anonymous"))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            AppError::Authentication("principal id claim missing".to_string())
        );
    }

    #[tokio::test]
    async fn test_custom_header() {
        let authority = StaticTokenAuthority::new().with_token("t", VerifiedClaims::for_subject("u2"));
        let resolver = BearerIdentityResolver::new(authority).with_header("x-api-token");
        let event = HttpEvent::new("GET", "/").with_header("X-Api-Token", "bearer t");
        assert_eq!(resolver.resolve(&event).await.unwrap().principal_id, "u2");
    }

    #[test]
    fn test_unavailable_authority_is_internal() {
        let err: AppError = AuthorityError::Unavailable("timeout".to_string()).into();
        assert_eq!(err, AppError::Internal("timeout".to_string()));
    }
}

//! Authentication for the supervisory control surface.
//!
//! Simplified relative to the teacher's pluggable multi-provider registry:
//! the control surface has exactly one notion of access — a fully-privileged
//! operator token — so there is one [`Authenticator`] trait with a
//! fail-closed default, not a provider chain (design §9, resolved open
//! question: "only fully-privileged identities are accepted").

use std::collections::HashSet;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("missing or malformed credential")]
    Unauthenticated,
    #[error("credential did not match an authorized identity")]
    Unauthorized,
}

/// Verifies an inbound connection's credential and returns the principal
/// name to attribute audit records to.
pub trait Authenticator: Send + Sync {
    fn authenticate(&self, token: &str) -> Result<String, AuthError>;
}

/// Fixed-token authenticator: each configured token maps to exactly one
/// principal name. Sufficient for a single-tenant control surface; anything
/// fancier (JWT, mTLS) is out of scope (SPEC_FULL §10, Out of scope).
#[derive(Debug, Default)]
pub struct StaticTokenAuthenticator {
    tokens: std::collections::HashMap<String, String>,
}

impl StaticTokenAuthenticator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(mut self, token: impl Into<String>, principal: impl Into<String>) -> Self {
        self.tokens.insert(token.into(), principal.into());
        self
    }
}

impl Authenticator for StaticTokenAuthenticator {
    fn authenticate(&self, token: &str) -> Result<String, AuthError> {
        if token.is_empty() {
            return Err(AuthError::Unauthenticated);
        }
        self.tokens.get(token).cloned().ok_or(AuthError::Unauthorized)
    }
}

/// An authenticator that accepts any non-empty token, attributing every
/// session to a fixed principal. Useful for local development and tests;
/// never wired by default in a real deployment.
#[derive(Debug)]
pub struct AllowAllAuthenticator {
    principal: String,
}

impl AllowAllAuthenticator {
    pub fn new(principal: impl Into<String>) -> Self {
        Self { principal: principal.into() }
    }
}

impl Authenticator for AllowAllAuthenticator {
    fn authenticate(&self, token: &str) -> Result<String, AuthError> {
        if token.is_empty() {
            return Err(AuthError::Unauthenticated);
        }
        Ok(self.principal.clone())
    }
}

/// The set of origins allowed to open a control-surface connection
/// (`ALLOWED_ORIGINS`, §6). Fails closed: an empty allow-list rejects every
/// origin rather than permitting all of them.
#[derive(Debug, Default)]
pub struct OriginAllowList {
    allowed: HashSet<String>,
}

impl OriginAllowList {
    pub fn new(origins: impl IntoIterator<Item = String>) -> Self {
        Self { allowed: origins.into_iter().collect() }
    }

    pub fn is_allowed(&self, origin: &str) -> bool {
        self.allowed.contains(origin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_authenticator_maps_known_token_to_principal() {
        let auth = StaticTokenAuthenticator::new().with_token("secret", "operator");
        assert_eq!(auth.authenticate("secret").unwrap(), "operator");
    }

    #[test]
    fn static_authenticator_rejects_unknown_token() {
        let auth = StaticTokenAuthenticator::new().with_token("secret", "operator");
        assert_eq!(auth.authenticate("wrong").unwrap_err(), AuthError::Unauthorized);
    }

    #[test]
    fn empty_token_is_unauthenticated_not_unauthorized() {
        let auth = StaticTokenAuthenticator::new().with_token("secret", "operator");
        assert_eq!(auth.authenticate("").unwrap_err(), AuthError::Unauthenticated);
    }

    #[test]
    fn empty_allow_list_rejects_every_origin() {
        let list = OriginAllowList::default();
        assert!(!list.is_allowed("https://dashboard.example"));
    }

    #[test]
    fn allow_list_accepts_configured_origins_only() {
        let list = OriginAllowList::new(["https://dashboard.example".to_string()]);
        assert!(list.is_allowed("https://dashboard.example"));
        assert!(!list.is_allowed("https://evil.example"));
    }
}

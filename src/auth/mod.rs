pub mod jwt;
pub mod middleware;

use thiserror::Error;

/// Admission failures at the auth boundary. No state is created before
/// the gate passes, so these never leave partial registrations behind.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Malformed, expired, or unverifiable credential.
    #[error("invalid credential: {0}")]
    Invalid(#[from] jsonwebtoken::errors::Error),

    /// Credential resolves to an identity that lacks the required role.
    #[error("identity lacks admin role")]
    Forbidden,
}

impl AuthError {
    /// True when the underlying token was well-formed but past its expiry.
    pub fn is_expired(&self) -> bool {
        matches!(
            self,
            AuthError::Invalid(e)
                if matches!(e.kind(), jsonwebtoken::errors::ErrorKind::ExpiredSignature)
        )
    }
}

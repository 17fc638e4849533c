//! Caller-identity resolution seam.

use common::UserId;
use domain::Identity;

/// Resolves a caller credential into an identity.
///
/// Token verification is an external concern; the core only ever sees
/// the already-resolved `Identity`. The default implementation stands in
/// for the real verifier by accepting bearer credentials that carry a
/// UUID subject directly.
pub trait CredentialResolver: Send + Sync {
    fn resolve(&self, credential: &str) -> Option<Identity>;
}

/// Accepts `Bearer <uuid>`-shaped credentials.
#[derive(Debug, Clone, Copy, Default)]
pub struct BearerUuidResolver;

impl CredentialResolver for BearerUuidResolver {
    fn resolve(&self, credential: &str) -> Option<Identity> {
        let token = credential.strip_prefix("Bearer ").unwrap_or(credential).trim();
        let uuid = uuid::Uuid::parse_str(token).ok()?;
        Some(Identity::new(UserId::from_uuid(uuid)))
    }
}

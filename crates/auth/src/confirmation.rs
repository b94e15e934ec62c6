//! Confirmation secrets: the out-of-band code exchanged for an access credential.
//!
//! A secret is bound to one account, overwritten on every sign-up and only
//! accepted within the policy's expiry window.

use chrono::{DateTime, Duration, Utc};
use rand::{Rng, distributions::Alphanumeric};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use critica_core::ValueObject;

pub const SECRET_LEN: usize = 32;

/// Opaque confirmation secret.
///
/// `Debug` is redacted so the value never reaches logs by accident.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfirmationSecret(String);

impl ConfirmationSecret {
    /// Draw a fresh secret from the thread-local CSPRNG.
    pub fn generate() -> Self {
        let value: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(SECRET_LEN)
            .map(char::from)
            .collect();
        Self(value)
    }

    /// Rehydrate a stored secret.
    pub fn from_stored(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Exact, constant-time comparison against a caller-supplied value.
    pub fn matches(&self, candidate: &str) -> bool {
        self.0.as_bytes().ct_eq(candidate.as_bytes()).into()
    }
}

impl ValueObject for ConfirmationSecret {}

impl core::fmt::Debug for ConfirmationSecret {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("ConfirmationSecret(<redacted>)")
    }
}

/// The single active secret stored on an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingConfirmation {
    pub secret: ConfirmationSecret,
    pub issued_at: DateTime<Utc>,
}

impl PendingConfirmation {
    pub fn mint(now: DateTime<Utc>) -> Self {
        Self {
            secret: ConfirmationSecret::generate(),
            issued_at: now,
        }
    }
}

/// Expiry window for confirmation secrets.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ConfirmationPolicy {
    ttl: Duration,
}

impl ConfirmationPolicy {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl }
    }

    pub fn is_expired(&self, pending: &PendingConfirmation, now: DateTime<Utc>) -> bool {
        now >= pending.issued_at + self.ttl
    }

    /// Accept `candidate` only if it is the stored secret and still fresh.
    ///
    /// Both checks always run so a stale secret and a wrong secret cost the same.
    pub fn verify(&self, pending: &PendingConfirmation, candidate: &str, now: DateTime<Utc>) -> bool {
        let matches = pending.secret.matches(candidate);
        let fresh = !self.is_expired(pending, now);
        matches & fresh
    }
}

impl Default for ConfirmationPolicy {
    fn default() -> Self {
        Self::new(Duration::minutes(30))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_secrets_are_long_alphanumeric_and_distinct() {
        let a = ConfirmationSecret::generate();
        let b = ConfirmationSecret::generate();
        assert_eq!(a.expose().len(), SECRET_LEN);
        assert!(a.expose().chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }

    #[test]
    fn match_is_exact() {
        let secret = ConfirmationSecret::from_stored("AbC123");
        assert!(secret.matches("AbC123"));
        assert!(!secret.matches("abc123"));
        assert!(!secret.matches("AbC12"));
        assert!(!secret.matches("AbC1234"));
        assert!(!secret.matches(""));
    }

    #[test]
    fn debug_output_is_redacted() {
        let secret = ConfirmationSecret::from_stored("super-secret");
        assert!(!format!("{secret:?}").contains("super-secret"));
    }

    #[test]
    fn verify_rejects_expired_secret() {
        let issued = Utc::now();
        let pending = PendingConfirmation {
            secret: ConfirmationSecret::from_stored("code"),
            issued_at: issued,
        };
        let policy = ConfirmationPolicy::new(Duration::minutes(10));

        assert!(policy.verify(&pending, "code", issued + Duration::minutes(9)));
        assert!(!policy.verify(&pending, "code", issued + Duration::minutes(10)));
        assert!(!policy.verify(&pending, "nope", issued));
    }
}

//! Token issuance: verified account in, signed stateless credential out.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::Account;
use crate::claims::JwtClaims;
use crate::jwt::{JwtSigner, TokenError};

/// Signed credential plus its fixed expiry. There is no refresh or revocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessCredential {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct TokenIssuer {
    signer: Arc<dyn JwtSigner>,
    lifetime: Duration,
}

impl TokenIssuer {
    pub fn new(signer: Arc<dyn JwtSigner>, lifetime: Duration) -> Self {
        Self { signer, lifetime }
    }

    pub fn issue(&self, account: &Account, now: DateTime<Utc>) -> Result<AccessCredential, TokenError> {
        let expires_at = now + self.lifetime;
        let claims = JwtClaims::for_account(account, now, expires_at);
        let token = self.signer.sign(&claims)?;
        Ok(AccessCredential { token, expires_at })
    }
}

impl core::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("lifetime", &self.lifetime)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jwt::{Hs256Jwt, JwtValidator};
    use crate::{Email, NewAccount, Role, Username};

    #[test]
    fn issued_token_decodes_to_the_account() {
        let jwt = Arc::new(Hs256Jwt::new("issuer-test-secret"));
        let issuer = TokenIssuer::new(jwt.clone(), Duration::hours(24));
        let now = Utc::now();
        let account = Account::create(
            NewAccount::signup(Username::parse("alice").unwrap(), Email::parse("a@x.com").unwrap())
                .with_role(Role::Admin),
            now,
        );

        let credential = issuer.issue(&account, now).unwrap();
        assert_eq!(credential.expires_at, now + Duration::hours(24));

        let claims = jwt.validate(&credential.token, now).unwrap();
        assert_eq!(claims.sub, account.id);
        assert_eq!(claims.username, "alice");
        assert_eq!(claims.role, Role::Admin);
    }
}

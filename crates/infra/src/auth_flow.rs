//! Sign-up and token-request orchestration.
//!
//! Per identity the flow moves `Unregistered -> PendingConfirmation -> Active`.
//! Every call is one synchronous attempt; nothing here retries.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{error, info, instrument};

use critica_auth::{
    AccessCredential, Account, ConfirmationPolicy, ConfirmationSecret, Email, NewAccount,
    PendingConfirmation, TokenError, TokenIssuer, Username,
};
use critica_core::DomainError;

use crate::account_store::{AccountStore, StoreError};
use crate::mailer::{DeliveryError, MailSink, confirmation_message};

/// Knobs of the flow that come from configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct AuthSettings {
    pub confirmation: ConfirmationPolicy,
    /// Report an unknown username as invalid credentials instead of not-found.
    pub uniform_token_errors: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignUp {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub confirmation_code: String,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthFlowError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Conflict(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    InvalidCredentials(String),
    #[error(transparent)]
    Delivery(#[from] DeliveryError),
    #[error("account store failure: {0}")]
    Store(String),
    #[error(transparent)]
    Token(#[from] TokenError),
}

impl From<StoreError> for AuthFlowError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(msg) => AuthFlowError::Conflict(msg),
            StoreError::NotFound => AuthFlowError::NotFound("account not found".into()),
            StoreError::Backend(msg) => AuthFlowError::Store(msg),
        }
    }
}

impl From<DomainError> for AuthFlowError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => AuthFlowError::Validation(msg),
        }
    }
}

const INVALID_CODE: &str = "confirmation code is invalid or has expired";

/// The auth flow controller.
#[derive(Clone)]
pub struct AuthFlow {
    accounts: Arc<dyn AccountStore>,
    mailer: Arc<dyn MailSink>,
    issuer: TokenIssuer,
    settings: AuthSettings,
}

impl AuthFlow {
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        mailer: Arc<dyn MailSink>,
        issuer: TokenIssuer,
        settings: AuthSettings,
    ) -> Self {
        Self {
            accounts,
            mailer,
            issuer,
            settings,
        }
    }

    /// Register (or re-register) a (username, email) pair and send it a fresh code.
    ///
    /// Repeating the call for the same pair rotates the code; the account is
    /// never duplicated.
    #[instrument(skip(self, req), fields(username = %req.username), err)]
    pub async fn sign_up(&self, req: SignUp, now: DateTime<Utc>) -> Result<Account, AuthFlowError> {
        let username = Username::parse(&req.username)?;
        let email = Email::parse(&req.email)?;

        let account = self
            .accounts
            .create_or_fetch(NewAccount::signup(username, email), now)
            .await?;

        let secret = self.mint_and_store(&account, now).await?;
        self.deliver(&account, &secret).await?;

        info!(username = %account.username, "confirmation code issued");
        Ok(account)
    }

    /// Generate a secret and make it the account's only pending confirmation.
    #[instrument(skip(self, account), fields(username = %account.username), err)]
    pub async fn mint_and_store(
        &self,
        account: &Account,
        now: DateTime<Utc>,
    ) -> Result<ConfirmationSecret, AuthFlowError> {
        let pending = PendingConfirmation::mint(now);
        let secret = pending.secret.clone();
        self.accounts.rotate_confirmation(account.id, pending).await?;
        Ok(secret)
    }

    /// Send the code out-of-band. A failure is surfaced, never retried.
    pub async fn deliver(&self, account: &Account, secret: &ConfirmationSecret) -> Result<(), AuthFlowError> {
        let message = confirmation_message(account.email.as_str(), secret.expose());
        self.mailer.deliver(&message).await.map_err(|e| {
            error!(username = %account.username, error = %e, "confirmation delivery failed");
            AuthFlowError::from(e)
        })
    }

    /// Exchange a username and its current confirmation code for an access credential.
    #[instrument(skip(self, req), fields(username = %req.username), err)]
    pub async fn request_token(
        &self,
        req: TokenRequest,
        now: DateTime<Utc>,
    ) -> Result<AccessCredential, AuthFlowError> {
        let mut missing = Vec::new();
        if req.username.trim().is_empty() {
            missing.push("username");
        }
        if req.confirmation_code.is_empty() {
            missing.push("confirmation_code");
        }
        if !missing.is_empty() {
            return Err(AuthFlowError::Validation(format!(
                "required field(s) missing: {}",
                missing.join(", ")
            )));
        }

        let account = match Username::parse(&req.username) {
            Ok(username) => self.accounts.find_by_username(&username).await?,
            Err(_) => None,
        };
        let Some(account) = account else {
            return Err(self.unknown_username());
        };

        let verified = account
            .confirmation
            .as_ref()
            .is_some_and(|pending| self.settings.confirmation.verify(pending, &req.confirmation_code, now));
        if !verified {
            return Err(AuthFlowError::InvalidCredentials(INVALID_CODE.into()));
        }

        Ok(self.issuer.issue(&account, now)?)
    }

    fn unknown_username(&self) -> AuthFlowError {
        if self.settings.uniform_token_errors {
            AuthFlowError::InvalidCredentials(INVALID_CODE.into())
        } else {
            AuthFlowError::NotFound("no account with that username".into())
        }
    }
}

impl core::fmt::Debug for AuthFlow {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AuthFlow")
            .field("issuer", &self.issuer)
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account_store::InMemoryAccountStore;
    use crate::mailer::RecordingMailer;
    use chrono::Duration;
    use critica_auth::{Hs256Jwt, JwtValidator, Role};

    struct Harness {
        flow: AuthFlow,
        store: Arc<InMemoryAccountStore>,
        mailer: Arc<RecordingMailer>,
        jwt: Arc<Hs256Jwt>,
    }

    fn harness(settings: AuthSettings) -> Harness {
        let store = Arc::new(InMemoryAccountStore::new());
        let mailer = Arc::new(RecordingMailer::new());
        let jwt = Arc::new(Hs256Jwt::new("auth-flow-test-secret-0123456789abcdef"));
        let issuer = TokenIssuer::new(jwt.clone(), Duration::hours(1));
        let flow = AuthFlow::new(store.clone(), mailer.clone(), issuer, settings);
        Harness {
            flow,
            store,
            mailer,
            jwt,
        }
    }

    fn signup(username: &str, email: &str) -> SignUp {
        SignUp {
            username: username.into(),
            email: email.into(),
        }
    }

    fn token_req(username: &str, code: &str) -> TokenRequest {
        TokenRequest {
            username: username.into(),
            confirmation_code: code.into(),
        }
    }

    fn last_code(mailer: &RecordingMailer, to: &str) -> String {
        let message = mailer.last_to(to).expect("a message was delivered");
        message
            .body
            .rsplit(' ')
            .next()
            .expect("body ends with the code")
            .to_string()
    }

    #[tokio::test]
    async fn new_pair_creates_one_account_and_one_delivery() {
        let h = harness(AuthSettings::default());
        let account = h.flow.sign_up(signup("alice", "alice@x.com"), Utc::now()).await.unwrap();

        assert_eq!(account.role, Role::User);
        assert_eq!(h.store.list().await.unwrap().len(), 1);
        let messages = h.mailer.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].to, "alice@x.com");
        assert_eq!(messages[0].subject, "Confirmation code");
    }

    #[tokio::test]
    async fn repeated_signup_rotates_the_secret_and_old_one_fails() {
        let h = harness(AuthSettings::default());
        let now = Utc::now();

        h.flow.sign_up(signup("alice", "alice@x.com"), now).await.unwrap();
        let s1 = last_code(&h.mailer, "alice@x.com");
        h.flow.sign_up(signup("alice", "alice@x.com"), now).await.unwrap();
        let s2 = last_code(&h.mailer, "alice@x.com");

        assert_ne!(s1, s2);
        assert_eq!(h.store.list().await.unwrap().len(), 1);

        let err = h.flow.request_token(token_req("alice", &s1), now).await.unwrap_err();
        assert!(matches!(err, AuthFlowError::InvalidCredentials(_)));
        assert!(h.flow.request_token(token_req("alice", &s2), now).await.is_ok());
    }

    #[tokio::test]
    async fn conflicting_signup_mutates_nothing_and_sends_nothing() {
        let h = harness(AuthSettings::default());
        let now = Utc::now();
        h.flow.sign_up(signup("alice", "alice@x.com"), now).await.unwrap();
        let before = h.store.list().await.unwrap();

        let err = h
            .flow
            .sign_up(signup("alice", "other@x.com"), now)
            .await
            .unwrap_err();

        assert!(matches!(err, AuthFlowError::Conflict(_)));
        assert_eq!(h.store.list().await.unwrap(), before);
        assert_eq!(h.mailer.messages().len(), 1);
    }

    #[tokio::test]
    async fn reserved_and_malformed_input_is_a_validation_error() {
        let h = harness(AuthSettings::default());
        for (u, e) in [("me", "me@x.com"), ("", "a@x.com"), ("bob", "not-an-email")] {
            let err = h.flow.sign_up(signup(u, e), Utc::now()).await.unwrap_err();
            assert!(matches!(err, AuthFlowError::Validation(_)), "{u}/{e}: {err:?}");
        }
        assert!(h.mailer.messages().is_empty());
    }

    #[tokio::test]
    async fn delivery_failure_is_surfaced() {
        let h = harness(AuthSettings::default());
        h.mailer.set_failing(true);

        let err = h
            .flow
            .sign_up(signup("alice", "alice@x.com"), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthFlowError::Delivery(_)));
    }

    #[tokio::test]
    async fn token_request_validates_presence_then_lookup() {
        let h = harness(AuthSettings::default());
        let now = Utc::now();

        let err = h.flow.request_token(token_req("", ""), now).await.unwrap_err();
        assert!(matches!(err, AuthFlowError::Validation(msg) if msg.contains("confirmation_code")));

        let err = h.flow.request_token(token_req("ghost", "code"), now).await.unwrap_err();
        assert!(matches!(err, AuthFlowError::NotFound(_)));
    }

    #[tokio::test]
    async fn uniform_errors_hide_unknown_usernames() {
        let h = harness(AuthSettings {
            uniform_token_errors: true,
            ..Default::default()
        });

        let err = h
            .flow
            .request_token(token_req("ghost", "code"), Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthFlowError::InvalidCredentials(_)));
    }

    #[tokio::test]
    async fn expired_secret_is_rejected() {
        let h = harness(AuthSettings {
            confirmation: ConfirmationPolicy::new(Duration::minutes(5)),
            ..Default::default()
        });
        let issued = Utc::now();
        h.flow.sign_up(signup("alice", "alice@x.com"), issued).await.unwrap();
        let code = last_code(&h.mailer, "alice@x.com");

        let late = issued + Duration::minutes(6);
        let err = h.flow.request_token(token_req("alice", &code), late).await.unwrap_err();
        assert!(matches!(err, AuthFlowError::InvalidCredentials(_)));
    }

    #[tokio::test]
    async fn issued_token_identifies_the_account() {
        let h = harness(AuthSettings::default());
        let now = Utc::now();
        let account = h.flow.sign_up(signup("alice", "alice@x.com"), now).await.unwrap();
        let code = last_code(&h.mailer, "alice@x.com");

        let credential = h.flow.request_token(token_req("alice", &code), now).await.unwrap();
        let claims = h.jwt.validate(&credential.token, now).unwrap();

        assert_eq!(claims.sub, account.id);
        assert_eq!(claims.username, "alice");
        assert_eq!(claims.role, Role::User);
    }

    #[tokio::test]
    async fn secret_survives_a_successful_exchange() {
        let h = harness(AuthSettings::default());
        let now = Utc::now();
        h.flow.sign_up(signup("alice", "alice@x.com"), now).await.unwrap();
        let code = last_code(&h.mailer, "alice@x.com");

        assert!(h.flow.request_token(token_req("alice", &code), now).await.is_ok());
        assert!(h.flow.request_token(token_req("alice", &code), now).await.is_ok());
    }
}

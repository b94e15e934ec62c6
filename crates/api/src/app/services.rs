use std::sync::Arc;

use anyhow::Context;
use chrono::{Duration, Utc};

use critica_auth::{ConfirmationPolicy, Email, Hs256Jwt, NewAccount, Role, TokenIssuer, Username};
use critica_core::AccountId;
use critica_infra::{
    AccountStore, AuthFlow, AuthSettings, InMemoryAccountStore, InMemoryCatalog, LogMailer, MailSink,
    PostgresAccountStore, StoreError,
};

use crate::config::{AppConfig, MailBackend};

/// Shared per-process services handed to every handler.
pub struct AppServices {
    pub accounts: Arc<dyn AccountStore>,
    pub catalog: Arc<InMemoryCatalog>,
    pub auth: AuthFlow,
}

impl AppServices {
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        mailer: Arc<dyn MailSink>,
        issuer: TokenIssuer,
        settings: AuthSettings,
    ) -> Self {
        let auth = AuthFlow::new(accounts.clone(), mailer, issuer, settings);
        Self {
            accounts,
            catalog: Arc::new(InMemoryCatalog::new()),
            auth,
        }
    }

    /// Display name of an author; accounts deleted since keep an empty name.
    pub async fn author_name(&self, id: AccountId) -> Result<String, StoreError> {
        Ok(self
            .accounts
            .find_by_id(id)
            .await?
            .map(|a| a.username.to_string())
            .unwrap_or_default())
    }
}

/// Wire stores, mailer and token issuer from configuration.
pub async fn build_services(config: &AppConfig, jwt: Arc<Hs256Jwt>) -> anyhow::Result<AppServices> {
    let accounts: Arc<dyn AccountStore> = match &config.database.url {
        Some(url) => {
            tracing::info!("using postgres account store");
            Arc::new(
                PostgresAccountStore::connect(url)
                    .await
                    .context("failed to open account database")?,
            )
        }
        None => {
            tracing::info!("using in-memory account store");
            Arc::new(InMemoryAccountStore::new())
        }
    };

    let mailer = build_mailer(config)?;
    let token_ttl = Duration::try_minutes(config.auth.token_ttl_minutes)
        .context("auth.token_ttl_minutes out of range")?;
    let confirmation_ttl = Duration::try_minutes(config.auth.confirmation_ttl_minutes)
        .context("auth.confirmation_ttl_minutes out of range")?;
    let issuer = TokenIssuer::new(jwt, token_ttl);
    let settings = AuthSettings {
        confirmation: ConfirmationPolicy::new(confirmation_ttl),
        uniform_token_errors: config.auth.uniform_token_errors,
    };

    let services = AppServices::new(accounts, mailer, issuer, settings);
    if let Some(admin) = &config.bootstrap_admin {
        bootstrap_admin(&services, &admin.username, &admin.email).await?;
    }
    Ok(services)
}

fn build_mailer(config: &AppConfig) -> anyhow::Result<Arc<dyn MailSink>> {
    match config.mail.backend {
        MailBackend::Log => Ok(Arc::new(LogMailer::new(config.mail.from.clone()))),
        #[cfg(feature = "smtp")]
        MailBackend::Smtp => {
            let settings = critica_infra::SmtpSettings {
                host: config.mail.smtp_host.clone(),
                port: config.mail.smtp_port,
                username: config.mail.smtp_username.clone(),
                password: config.mail.smtp_password.clone(),
                from: config.mail.from.clone(),
            };
            Ok(Arc::new(
                critica_infra::SmtpMailer::new(&settings).context("invalid smtp settings")?,
            ))
        }
        #[cfg(not(feature = "smtp"))]
        MailBackend::Smtp => anyhow::bail!("mail.backend = smtp requires the `smtp` feature"),
    }
}

/// Make sure the configured administrator exists.
async fn bootstrap_admin(services: &AppServices, username: &str, email: &str) -> anyhow::Result<()> {
    let username = Username::parse(username).context("bootstrap_admin.username")?;
    let email = Email::parse(email).context("bootstrap_admin.email")?;

    if services.accounts.find_by_username(&username).await?.is_some() {
        return Ok(());
    }

    let mut admin = NewAccount::signup(username, email).with_role(Role::Admin);
    admin.staff = true;
    let account = services.accounts.insert(admin, Utc::now()).await?;
    tracing::info!(username = %account.username, "bootstrap administrator created");
    Ok(())
}

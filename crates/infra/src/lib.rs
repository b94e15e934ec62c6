//! Infrastructure layer: account storage, mail delivery, the auth flow and the catalog.

pub mod account_store;
pub mod auth_flow;
pub mod catalog;
pub mod mailer;

pub use account_store::{AccountStore, InMemoryAccountStore, PostgresAccountStore, StoreError};
pub use auth_flow::{AuthFlow, AuthFlowError, AuthSettings, SignUp, TokenRequest};
pub use catalog::{CatalogError, InMemoryCatalog};
pub use mailer::{DeliveryError, LogMailer, MailMessage, MailSink, RecordingMailer, SmtpSettings};

#[cfg(feature = "smtp")]
pub use mailer::SmtpMailer;

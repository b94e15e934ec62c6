//! `critica-auth`: pure authentication/authorization boundary.
//!
//! This crate is intentionally decoupled from HTTP and storage: it owns the
//! account model, confirmation secrets, credential signing and the RoleGate.

pub mod account;
pub mod authorize;
pub mod claims;
pub mod confirmation;
pub mod jwt;
pub mod principal;
pub mod roles;
pub mod token;

pub use account::{Account, AccountProfile, Email, NewAccount, ProfileChanges, Username};
pub use authorize::{
    AuthoredKind, AuthzError, Collection, Decision, Rule, Target, Verb, authorize, evaluate,
};
pub use claims::{JwtClaims, TokenValidationError, validate_claims};
pub use confirmation::{ConfirmationPolicy, ConfirmationSecret, PendingConfirmation};
pub use jwt::{Hs256Jwt, JwtSigner, JwtValidator, TokenError};
pub use principal::{Identity, Principal};
pub use roles::{Role, UnknownRole, elevated};
pub use token::{AccessCredential, TokenIssuer};

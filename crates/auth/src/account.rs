//! Account model: the identity record behind every authenticated request.
//!
//! Accounts are passwordless. The pending confirmation secret is the only way
//! to obtain an access credential.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use critica_core::{AccountId, DomainError, DomainResult, Entity, ValueObject};

use crate::Role;
use crate::confirmation::PendingConfirmation;

// ─────────────────────────────────────────────────────────────────────────────
// Username
// ─────────────────────────────────────────────────────────────────────────────

pub const USERNAME_MAX_LEN: usize = 150;
pub const EMAIL_MAX_LEN: usize = 254;
pub const NAME_MAX_LEN: usize = 150;

/// The self-reference segment of `/users/me`; never a valid username.
pub const RESERVED_USERNAME: &str = "me";

/// Validated account username.
///
/// Usernames double as URL path segments, so the character set is limited to
/// letters, digits and `_ . @ + -`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Username(String);

impl Username {
    pub fn parse(raw: &str) -> DomainResult<Self> {
        let value = raw.trim();

        if value.is_empty() {
            return Err(DomainError::validation("username is required"));
        }
        if value.chars().count() > USERNAME_MAX_LEN {
            return Err(DomainError::validation(format!(
                "username must be at most {USERNAME_MAX_LEN} characters"
            )));
        }
        if value == RESERVED_USERNAME {
            return Err(DomainError::validation(format!(
                "'{RESERVED_USERNAME}' cannot be used as a username"
            )));
        }
        if let Some(bad) = value.chars().find(|c| !is_username_char(*c)) {
            return Err(DomainError::validation(format!(
                "username may only contain letters, digits and _ . @ + - (found {bad:?})"
            )));
        }

        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn is_username_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '.' | '@' | '+' | '-')
}

impl ValueObject for Username {}

impl core::fmt::Display for Username {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Username {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Username> for String {
    fn from(value: Username) -> Self {
        value.0
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Email
// ─────────────────────────────────────────────────────────────────────────────

/// Validated, lower-cased email address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Email(String);

impl Email {
    pub fn parse(raw: &str) -> DomainResult<Self> {
        let value = raw.trim().to_lowercase();

        if value.is_empty() {
            return Err(DomainError::validation("email is required"));
        }
        if value.chars().count() > EMAIL_MAX_LEN {
            return Err(DomainError::validation(format!(
                "email must be at most {EMAIL_MAX_LEN} characters"
            )));
        }
        if value.chars().any(char::is_whitespace) {
            return Err(DomainError::validation("invalid email format"));
        }

        let Some((local, domain)) = value.split_once('@') else {
            return Err(DomainError::validation("invalid email format"));
        };
        let domain_ok = domain.contains('.')
            && !domain.contains('@')
            && !domain.starts_with('.')
            && !domain.ends_with('.');
        if local.is_empty() || !domain_ok {
            return Err(DomainError::validation("invalid email format"));
        }

        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl ValueObject for Email {}

impl core::fmt::Display for Email {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Email {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Email> for String {
    fn from(value: Email) -> Self {
        value.0
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Account
// ─────────────────────────────────────────────────────────────────────────────

/// Stored account.
///
/// # Invariants
/// - `username` and `email` are each unique across the directory.
/// - At most one confirmation is pending; a new sign-up overwrites it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub id: AccountId,
    pub username: Username,
    pub email: Email,
    pub role: Role,
    /// Staff accounts pass every administrative check regardless of role.
    pub staff: bool,
    pub first_name: String,
    pub last_name: String,
    pub bio: String,
    pub confirmation: Option<PendingConfirmation>,
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Materialize a brand new account from its creation request.
    pub fn create(new: NewAccount, now: DateTime<Utc>) -> Self {
        Self {
            id: AccountId::new(),
            username: new.username,
            email: new.email,
            role: new.role,
            staff: new.staff,
            first_name: new.first_name,
            last_name: new.last_name,
            bio: new.bio,
            confirmation: None,
            created_at: now,
        }
    }

    /// Public fields returned by the API.
    pub fn profile(&self) -> AccountProfile {
        AccountProfile {
            username: self.username.clone(),
            email: self.email.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            bio: self.bio.clone(),
            role: self.role,
        }
    }

    /// Whether the account passes administrative checks.
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin || self.staff
    }
}

impl Entity for Account {
    type Id = AccountId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Serializable public view of an account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountProfile {
    pub username: Username,
    pub email: Email,
    pub first_name: String,
    pub last_name: String,
    pub bio: String,
    pub role: Role,
}

/// Request to create an account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAccount {
    pub username: Username,
    pub email: Email,
    pub role: Role,
    pub staff: bool,
    pub first_name: String,
    pub last_name: String,
    pub bio: String,
}

impl NewAccount {
    /// Self-service sign-up: plain user role, empty profile.
    pub fn signup(username: Username, email: Email) -> Self {
        Self {
            username,
            email,
            role: Role::User,
            staff: false,
            first_name: String::new(),
            last_name: String::new(),
            bio: String::new(),
        }
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }
}

/// Partial update of account fields.
///
/// `role` is only honoured on the administrative path; self-service updates
/// must leave it `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileChanges {
    pub username: Option<Username>,
    pub email: Option<Email>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub bio: Option<String>,
    pub role: Option<Role>,
}

impl ProfileChanges {
    /// Validate free-text fields (usernames/emails are validated on parse).
    pub fn validate(&self) -> DomainResult<()> {
        for (field, value) in [("first_name", &self.first_name), ("last_name", &self.last_name)] {
            if let Some(v) = value {
                if v.chars().count() > NAME_MAX_LEN {
                    return Err(DomainError::validation(format!(
                        "{field} must be at most {NAME_MAX_LEN} characters"
                    )));
                }
            }
        }
        Ok(())
    }

    /// Drop fields the subject may not change about themselves.
    pub fn self_service(mut self) -> Self {
        self.role = None;
        self
    }

    pub fn apply_to(self, account: &mut Account) {
        if let Some(username) = self.username {
            account.username = username;
        }
        if let Some(email) = self.email {
            account.email = email;
        }
        if let Some(first_name) = self.first_name {
            account.first_name = first_name;
        }
        if let Some(last_name) = self.last_name {
            account.last_name = last_name;
        }
        if let Some(bio) = self.bio {
            account.bio = bio;
        }
        if let Some(role) = self.role {
            account.role = role;
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserved_username_is_always_rejected() {
        for raw in ["me", " me", "me "] {
            let err = Username::parse(raw).unwrap_err();
            assert!(err.to_string().contains("cannot be used"), "{raw:?}: {err}");
        }
        // Only the exact value is reserved.
        assert!(Username::parse("meme").is_ok());
        assert!(Username::parse("me.too").is_ok());
    }

    #[test]
    fn surrounding_whitespace_is_trimmed_inner_whitespace_is_not() {
        assert_eq!(Username::parse("  bob ").unwrap().as_str(), "bob");
        assert!(Username::parse("bo b").is_err());
        assert!(Username::parse("bob/").is_err());
    }

    #[test]
    fn username_character_set_is_restricted() {
        assert!(Username::parse("alice_01.b+c@d-e").is_ok());
        assert!(Username::parse("Łukasz").is_ok());
        assert!(Username::parse("bad/segment").is_err());
        assert!(Username::parse("with space").is_err());
        assert!(Username::parse("").is_err());
        assert!(Username::parse(&"a".repeat(USERNAME_MAX_LEN + 1)).is_err());
    }

    #[test]
    fn email_is_normalized_and_checked() {
        let email = Email::parse("  Alice@Example.COM ").unwrap();
        assert_eq!(email.as_str(), "alice@example.com");

        for bad in ["", "alice", "@x.com", "a@b", "a@@b.com", "a b@x.com", "a@x.com."] {
            assert!(Email::parse(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn usernames_deserialize_through_validation() {
        let ok: Result<Username, _> = serde_json::from_str("\"alice\"");
        assert!(ok.is_ok());
        let reserved: Result<Username, _> = serde_json::from_str("\"me\"");
        assert!(reserved.is_err());
    }

    #[test]
    fn self_service_changes_cannot_touch_role() {
        let now = Utc::now();
        let mut account = Account::create(
            NewAccount::signup(Username::parse("bob").unwrap(), Email::parse("b@x.com").unwrap()),
            now,
        );

        let changes = ProfileChanges {
            bio: Some("reads a lot".into()),
            role: Some(Role::Admin),
            ..Default::default()
        };
        changes.self_service().apply_to(&mut account);

        assert_eq!(account.bio, "reads a lot");
        assert_eq!(account.role, Role::User);
    }

    #[test]
    fn staff_flag_counts_as_admin() {
        let mut account = Account::create(
            NewAccount::signup(Username::parse("ops").unwrap(), Email::parse("o@x.com").unwrap()),
            Utc::now(),
        );
        assert!(!account.is_admin());
        account.staff = true;
        assert!(account.is_admin());
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig {
                cases: 500,
                ..ProptestConfig::default()
            })]

            /// Anything built from the allowed alphabet parses back unchanged.
            #[test]
            fn allowed_usernames_round_trip(raw in "[A-Za-z0-9_.@+-]{1,150}") {
                prop_assume!(raw != RESERVED_USERNAME);
                let username = Username::parse(&raw).unwrap();
                prop_assert_eq!(username.as_str(), raw.as_str());
            }

            /// A single disallowed character anywhere rejects the whole name.
            #[test]
            fn foreign_characters_are_rejected(
                head in "[a-z]{1,20}",
                bad in "[/?#%&=]",
                tail in "[a-z]{0,20}",
            ) {
                let raw = format!("{head}{bad}{tail}");
                prop_assert!(Username::parse(&raw).is_err());
            }

            /// Email case never matters for identity.
            #[test]
            fn emails_are_case_insensitive(local in "[A-Za-z0-9]{1,30}", domain in "[A-Za-z]{1,20}") {
                let upper = Email::parse(&format!("{}@{}.COM", local.to_uppercase(), domain)).unwrap();
                let lower = Email::parse(&format!("{}@{}.com", local.to_lowercase(), domain)).unwrap();
                prop_assert_eq!(upper, lower);
            }
        }
    }
}

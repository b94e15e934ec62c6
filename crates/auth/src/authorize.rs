//! RoleGate: the per-request authorization decision.
//!
//! - No IO
//! - No panics
//! - Pure function of (identity, verb, target)

use thiserror::Error;

use critica_core::AccountId;

use crate::{Identity, Principal, elevated};

/// Verb class of a request, resolved once at the transport boundary.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Verb {
    SafeRead,
    Create,
    Mutate,
}

/// Catalog collections writable only by administrators.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Collection {
    Categories,
    Genres,
    Titles,
}

/// User-authored catalog records.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum AuthoredKind {
    Review,
    Comment,
}

/// What a request acts on.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Target {
    /// A review or comment; `author` is `None` when the record does not exist yet.
    Authored {
        kind: AuthoredKind,
        author: Option<AccountId>,
    },
    Administrative(Collection),
    /// The account directory (`/users`).
    Users,
    /// The caller's own account (`/users/me`).
    OwnProfile,
}

impl Target {
    pub fn authored(kind: AuthoredKind, author: AccountId) -> Self {
        Target::Authored {
            kind,
            author: Some(author),
        }
    }

    pub fn new_authored(kind: AuthoredKind) -> Self {
        Target::Authored { kind, author: None }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    /// No identity was presented; the client should authenticate and retry.
    #[error("authentication required")]
    Unauthenticated,

    /// The identity is valid but lacks the role or ownership required.
    #[error("forbidden: {0}")]
    Forbidden(String),
}

/// The rule that decided a request.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Rule {
    SafeRead,
    AuthenticatedCreate,
    OwnerOrElevated,
    AdminOnly,
    UserDirectory,
    OwnProfile,
}

/// Outcome of a gate evaluation, with the rule that produced it (for audit logs).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub rule: Rule,
    pub outcome: Result<(), AuthzError>,
}

impl Decision {
    fn allow(rule: Rule) -> Self {
        Self { rule, outcome: Ok(()) }
    }

    fn deny(rule: Rule, err: AuthzError) -> Self {
        Self { rule, outcome: Err(err) }
    }

    pub fn is_allowed(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Evaluate the gate and report which rule matched.
///
/// Catalog targets go through the ordered rules (first match wins):
/// 1. safe reads are always allowed;
/// 2. creating a review/comment needs any authenticated identity;
/// 3. mutating one needs its author or an elevated role;
/// 4. writes to administrative collections need an admin.
///
/// The account directory and the caller's own profile are never public, so
/// they carry their own gates ahead of rule 1.
pub fn evaluate(identity: &Identity, verb: Verb, target: Target) -> Decision {
    match target {
        Target::Users => match require_principal(identity) {
            Err(e) => Decision::deny(Rule::UserDirectory, e),
            Ok(p) if p.is_admin() => Decision::allow(Rule::UserDirectory),
            Ok(_) => Decision::deny(
                Rule::UserDirectory,
                AuthzError::Forbidden("user directory is restricted to administrators".into()),
            ),
        },
        Target::OwnProfile => match require_principal(identity) {
            Ok(_) => Decision::allow(Rule::OwnProfile),
            Err(e) => Decision::deny(Rule::OwnProfile, e),
        },
        _ if verb == Verb::SafeRead => Decision::allow(Rule::SafeRead),
        Target::Authored { .. } if verb == Verb::Create => match require_principal(identity) {
            Ok(_) => Decision::allow(Rule::AuthenticatedCreate),
            Err(e) => Decision::deny(Rule::AuthenticatedCreate, e),
        },
        Target::Authored { kind, author } => {
            let principal = match require_principal(identity) {
                Ok(p) => p,
                Err(e) => return Decision::deny(Rule::OwnerOrElevated, e),
            };
            let is_author = author == Some(principal.account_id);
            if is_author || elevated(principal.role) {
                Decision::allow(Rule::OwnerOrElevated)
            } else {
                Decision::deny(
                    Rule::OwnerOrElevated,
                    AuthzError::Forbidden(format!(
                        "only the author or a moderator may modify this {}",
                        authored_label(kind)
                    )),
                )
            }
        }
        Target::Administrative(collection) => match require_principal(identity) {
            Err(e) => Decision::deny(Rule::AdminOnly, e),
            Ok(p) if p.is_admin() => Decision::allow(Rule::AdminOnly),
            Ok(_) => Decision::deny(
                Rule::AdminOnly,
                AuthzError::Forbidden(format!(
                    "{} may only be changed by administrators",
                    collection_label(collection)
                )),
            ),
        },
    }
}

/// Authorize a request; the `Result` projection of [`evaluate`].
pub fn authorize(identity: &Identity, verb: Verb, target: Target) -> Result<(), AuthzError> {
    evaluate(identity, verb, target).outcome
}

fn require_principal(identity: &Identity) -> Result<&Principal, AuthzError> {
    identity.principal().ok_or(AuthzError::Unauthenticated)
}

fn authored_label(kind: AuthoredKind) -> &'static str {
    match kind {
        AuthoredKind::Review => "review",
        AuthoredKind::Comment => "comment",
    }
}

fn collection_label(collection: Collection) -> &'static str {
    match collection {
        Collection::Categories => "categories",
        Collection::Genres => "genres",
        Collection::Titles => "titles",
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

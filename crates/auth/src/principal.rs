use critica_core::AccountId;

use crate::{JwtClaims, Role};

/// An authenticated caller, as asserted by a verified credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub account_id: AccountId,
    pub username: String,
    pub role: Role,
    pub staff: bool,
}

impl Principal {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin || self.staff
    }
}

impl From<JwtClaims> for Principal {
    fn from(claims: JwtClaims) -> Self {
        Self {
            account_id: claims.sub,
            username: claims.username,
            role: claims.role,
            staff: claims.staff,
        }
    }
}

/// Who is making a request: nobody in particular, or a verified principal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Identity {
    #[default]
    Anonymous,
    Authenticated(Principal),
}

impl Identity {
    pub fn principal(&self) -> Option<&Principal> {
        match self {
            Identity::Anonymous => None,
            Identity::Authenticated(p) => Some(p),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Identity::Authenticated(_))
    }
}

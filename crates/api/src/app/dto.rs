use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use critica_auth::{Account, Email, NewAccount, ProfileChanges, Role, Username};
use critica_core::DomainResult;
use critica_infra::catalog::{Comment, CommentId, Review, ReviewId, Title, TitleId};

// -------------------------
// Request DTOs
// -------------------------

/// Body of `PATCH /users/me`. Unknown keys, `role` included, are ignored.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct OwnProfileUpdate {
    pub username: Option<String>,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub bio: Option<String>,
}

impl OwnProfileUpdate {
    pub fn into_changes(self) -> DomainResult<ProfileChanges> {
        let changes = ProfileChanges {
            username: self.username.as_deref().map(Username::parse).transpose()?,
            email: self.email.as_deref().map(Email::parse).transpose()?,
            first_name: self.first_name,
            last_name: self.last_name,
            bio: self.bio,
            role: None,
        };
        changes.validate()?;
        Ok(changes)
    }
}

/// Body of `PATCH /users/{username}`: the own-profile fields plus `role`.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ProfileUpdateRequest {
    #[serde(flatten)]
    pub profile: OwnProfileUpdate,
    pub role: Option<Role>,
}

impl ProfileUpdateRequest {
    pub fn into_changes(self) -> DomainResult<ProfileChanges> {
        let mut changes = self.profile.into_changes()?;
        changes.role = self.role;
        Ok(changes)
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateUserRequest {
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub bio: String,
}

impl CreateUserRequest {
    pub fn into_new_account(self) -> DomainResult<NewAccount> {
        let mut new = NewAccount::signup(Username::parse(&self.username)?, Email::parse(&self.email)?)
            .with_role(self.role);
        new.first_name = self.first_name;
        new.last_name = self.last_name;
        new.bio = self.bio;
        ProfileChanges {
            first_name: Some(new.first_name.clone()),
            last_name: Some(new.last_name.clone()),
            ..Default::default()
        }
        .validate()?;
        Ok(new)
    }
}

#[derive(Debug, Deserialize)]
pub struct TaxonRequest {
    pub name: String,
    pub slug: String,
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct SignUpResponse {
    pub username: String,
    pub email: String,
}

impl From<&Account> for SignUpResponse {
    fn from(account: &Account) -> Self {
        Self {
            username: account.username.to_string(),
            email: account.email.to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
}

/// Write-side title representation: category and genres as slugs.
#[derive(Debug, Serialize)]
pub struct TitleWrite {
    pub id: TitleId,
    pub name: String,
    pub year: i32,
    pub description: String,
    pub category: Option<String>,
    pub genre: Vec<String>,
}

impl From<Title> for TitleWrite {
    fn from(t: Title) -> Self {
        Self {
            id: t.id,
            name: t.name,
            year: t.year,
            description: t.description,
            category: t.category,
            genre: t.genres,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ReviewView {
    pub id: ReviewId,
    pub title: TitleId,
    pub author: String,
    pub text: String,
    pub score: u8,
    pub pub_date: DateTime<Utc>,
}

impl ReviewView {
    pub fn new(review: Review, author: String) -> Self {
        Self {
            id: review.id,
            title: review.title_id,
            author,
            text: review.text,
            score: review.score,
            pub_date: review.pub_date,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CommentView {
    pub id: CommentId,
    pub review: ReviewId,
    pub author: String,
    pub text: String,
    pub pub_date: DateTime<Utc>,
}

impl CommentView {
    pub fn new(comment: Comment, author: String) -> Self {
        Self {
            id: comment.id,
            review: comment.review_id,
            author,
            text: comment.text,
            pub_date: comment.pub_date,
        }
    }
}

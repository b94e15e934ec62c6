use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension, Path},
    http::{Method, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::Utc;

use critica_auth::{AccountProfile, AuthzError, Identity, Principal, Target, Username};

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::authz;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_users).post(create_user))
        .route("/me", get(get_me).patch(update_me))
        .route(
            "/:username",
            get(get_user).patch(update_user).delete(delete_user),
        )
}

fn own_principal<'a>(identity: &'a Identity, method: &Method) -> Result<&'a Principal, axum::response::Response> {
    authz::guard(identity, method, Target::OwnProfile)?;
    identity
        .principal()
        .ok_or_else(|| authz::authz_error_to_response(AuthzError::Unauthenticated))
}

/// Path usernames that cannot exist are simply not found.
fn path_username(raw: &str) -> Result<Username, axum::response::Response> {
    Username::parse(raw).map_err(|_| errors::json_error(StatusCode::NOT_FOUND, "not_found", "account not found"))
}

fn profiles(accounts: Vec<critica_auth::Account>) -> Vec<AccountProfile> {
    accounts.iter().map(|a| a.profile()).collect()
}

// ─────────────────────────────────────────────────────────────────────────────
// Self service
// ─────────────────────────────────────────────────────────────────────────────

/// GET /users/me - The caller's own profile
pub async fn get_me(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(identity): Extension<Identity>,
    method: Method,
) -> axum::response::Response {
    let principal = match own_principal(&identity, &method) {
        Ok(p) => p,
        Err(resp) => return resp,
    };

    match services.accounts.find_by_id(principal.account_id).await {
        Ok(Some(account)) => Json(account.profile()).into_response(),
        Ok(None) => errors::json_error(StatusCode::NOT_FOUND, "not_found", "account not found"),
        Err(e) => errors::store_error_to_response(e),
    }
}

/// PATCH /users/me - Update the caller's profile; `role` is read-only here
pub async fn update_me(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(identity): Extension<Identity>,
    method: Method,
    payload: Result<Json<dto::OwnProfileUpdate>, JsonRejection>,
) -> axum::response::Response {
    let principal = match own_principal(&identity, &method) {
        Ok(p) => p,
        Err(resp) => return resp,
    };
    let Json(body) = match payload {
        Ok(p) => p,
        Err(e) => return errors::json_rejection_to_response(e),
    };

    let changes = match body.into_changes() {
        Ok(c) => c.self_service(),
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services
        .accounts
        .update_profile(principal.account_id, changes)
        .await
    {
        Ok(account) => Json(account.profile()).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Administration
// ─────────────────────────────────────────────────────────────────────────────

/// GET /users - List all accounts (admin)
pub async fn list_users(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(identity): Extension<Identity>,
    method: Method,
) -> axum::response::Response {
    if let Err(resp) = authz::guard(&identity, &method, Target::Users) {
        return resp;
    }

    match services.accounts.list().await {
        Ok(accounts) => Json(profiles(accounts)).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

/// POST /users - Create an account with an explicit role (admin)
pub async fn create_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(identity): Extension<Identity>,
    method: Method,
    payload: Result<Json<dto::CreateUserRequest>, JsonRejection>,
) -> axum::response::Response {
    if let Err(resp) = authz::guard(&identity, &method, Target::Users) {
        return resp;
    }
    let Json(body) = match payload {
        Ok(p) => p,
        Err(e) => return errors::json_rejection_to_response(e),
    };

    let new = match body.into_new_account() {
        Ok(n) => n,
        Err(e) => return errors::domain_error_to_response(e),
    };

    match services.accounts.insert(new, Utc::now()).await {
        Ok(account) => (StatusCode::CREATED, Json(account.profile())).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

/// GET /users/{username} - One account (admin)
pub async fn get_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(identity): Extension<Identity>,
    method: Method,
    Path(username): Path<String>,
) -> axum::response::Response {
    if let Err(resp) = authz::guard(&identity, &method, Target::Users) {
        return resp;
    }
    let username = match path_username(&username) {
        Ok(u) => u,
        Err(resp) => return resp,
    };

    match services.accounts.find_by_username(&username).await {
        Ok(Some(account)) => Json(account.profile()).into_response(),
        Ok(None) => errors::json_error(StatusCode::NOT_FOUND, "not_found", "account not found"),
        Err(e) => errors::store_error_to_response(e),
    }
}

/// PATCH /users/{username} - Update any field, role included (admin)
pub async fn update_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(identity): Extension<Identity>,
    method: Method,
    Path(username): Path<String>,
    payload: Result<Json<dto::ProfileUpdateRequest>, JsonRejection>,
) -> axum::response::Response {
    if let Err(resp) = authz::guard(&identity, &method, Target::Users) {
        return resp;
    }
    let username = match path_username(&username) {
        Ok(u) => u,
        Err(resp) => return resp,
    };
    let Json(body) = match payload {
        Ok(p) => p,
        Err(e) => return errors::json_rejection_to_response(e),
    };
    let changes = match body.into_changes() {
        Ok(c) => c,
        Err(e) => return errors::domain_error_to_response(e),
    };

    let account = match services.accounts.find_by_username(&username).await {
        Ok(Some(a)) => a,
        Ok(None) => return errors::json_error(StatusCode::NOT_FOUND, "not_found", "account not found"),
        Err(e) => return errors::store_error_to_response(e),
    };

    match services.accounts.update_profile(account.id, changes).await {
        Ok(account) => Json(account.profile()).into_response(),
        Err(e) => errors::store_error_to_response(e),
    }
}

/// DELETE /users/{username} - Remove an account and everything it authored (admin)
pub async fn delete_user(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(identity): Extension<Identity>,
    method: Method,
    Path(username): Path<String>,
) -> axum::response::Response {
    if let Err(resp) = authz::guard(&identity, &method, Target::Users) {
        return resp;
    }
    let username = match path_username(&username) {
        Ok(u) => u,
        Err(resp) => return resp,
    };

    let account = match services.accounts.find_by_username(&username).await {
        Ok(Some(a)) => a,
        Ok(None) => return errors::json_error(StatusCode::NOT_FOUND, "not_found", "account not found"),
        Err(e) => return errors::store_error_to_response(e),
    };
    if let Err(e) = services.accounts.delete(&username).await {
        return errors::store_error_to_response(e);
    }

    // Reviews and comments go with their author.
    match services.catalog.purge_author(account.id) {
        Ok(purged) => {
            tracing::info!(username = %username, purged, "account deleted");
            StatusCode::NO_CONTENT.into_response()
        }
        Err(e) => errors::catalog_error_to_response(e),
    }
}

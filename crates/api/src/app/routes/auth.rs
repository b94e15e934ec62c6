use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension},
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use chrono::Utc;

use critica_infra::{SignUp, TokenRequest};

use crate::app::{dto, errors};
use crate::app::services::AppServices;

pub fn router() -> Router {
    Router::new()
        .route("/signup", post(signup))
        .route("/token", post(token))
}

/// POST /auth/signup - Register a (username, email) pair and mail it a confirmation code
pub async fn signup(
    Extension(services): Extension<Arc<AppServices>>,
    payload: Result<Json<SignUp>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match payload {
        Ok(p) => p,
        Err(e) => return errors::json_rejection_to_response(e),
    };

    match services.auth.sign_up(body, Utc::now()).await {
        Ok(account) => Json(dto::SignUpResponse::from(&account)).into_response(),
        Err(e) => errors::auth_flow_error_to_response(e),
    }
}

/// POST /auth/token - Exchange a username and confirmation code for an access token
pub async fn token(
    Extension(services): Extension<Arc<AppServices>>,
    payload: Result<Json<TokenRequest>, JsonRejection>,
) -> axum::response::Response {
    let Json(body) = match payload {
        Ok(p) => p,
        Err(e) => return errors::json_rejection_to_response(e),
    };

    match services.auth.request_token(body, Utc::now()).await {
        Ok(credential) => Json(dto::TokenResponse {
            token: credential.token,
        })
        .into_response(),
        Err(e) => errors::auth_flow_error_to_response(e),
    }
}

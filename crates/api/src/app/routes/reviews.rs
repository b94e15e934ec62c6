use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Extension, Path,
    },
    http::{Method, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::Utc;

use critica_auth::{AuthoredKind, AuthzError, Identity, Target};
use critica_infra::catalog::{Review, ReviewDraft, ReviewId, ReviewPatch, TitleId};

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::authz;

const NEW_REVIEW: Target = Target::Authored {
    kind: AuthoredKind::Review,
    author: None,
};

async fn view(services: &AppServices, review: Review) -> Result<dto::ReviewView, axum::response::Response> {
    let author = services
        .author_name(review.author)
        .await
        .map_err(errors::store_error_to_response)?;
    Ok(dto::ReviewView::new(review, author))
}

/// Load a review, then check the caller may modify it.
async fn load_for_mutation(
    services: &AppServices,
    identity: &Identity,
    method: &Method,
    title_id: TitleId,
    review_id: ReviewId,
) -> Result<Review, axum::response::Response> {
    authz::require_authenticated(identity)?;
    let review = services
        .catalog
        .review(title_id, review_id)
        .map_err(errors::catalog_error_to_response)?;
    authz::guard(
        identity,
        method,
        Target::authored(AuthoredKind::Review, review.author),
    )?;
    Ok(review)
}

/// GET /titles/{title_id}/reviews - Reviews of a title
pub async fn list_reviews(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(identity): Extension<Identity>,
    method: Method,
    path: Result<Path<TitleId>, PathRejection>,
) -> axum::response::Response {
    let Path(title_id) = match path {
        Ok(p) => p,
        Err(e) => return errors::path_rejection_to_response(e),
    };
    if let Err(resp) = authz::guard(&identity, &method, NEW_REVIEW) {
        return resp;
    }

    let reviews = match services.catalog.list_reviews(title_id) {
        Ok(r) => r,
        Err(e) => return errors::catalog_error_to_response(e),
    };
    let mut out = Vec::with_capacity(reviews.len());
    for review in reviews {
        match view(&services, review).await {
            Ok(v) => out.push(v),
            Err(resp) => return resp,
        }
    }
    Json(out).into_response()
}

/// GET /titles/{title_id}/reviews/{review_id} - One review
pub async fn get_review(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(identity): Extension<Identity>,
    method: Method,
    path: Result<Path<(TitleId, ReviewId)>, PathRejection>,
) -> axum::response::Response {
    let Path((title_id, review_id)) = match path {
        Ok(p) => p,
        Err(e) => return errors::path_rejection_to_response(e),
    };
    if let Err(resp) = authz::guard(&identity, &method, NEW_REVIEW) {
        return resp;
    }

    let review = match services.catalog.review(title_id, review_id) {
        Ok(r) => r,
        Err(e) => return errors::catalog_error_to_response(e),
    };
    match view(&services, review).await {
        Ok(v) => Json(v).into_response(),
        Err(resp) => resp,
    }
}

/// POST /titles/{title_id}/reviews - Review a title (any authenticated user, once per title)
pub async fn create_review(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(identity): Extension<Identity>,
    method: Method,
    path: Result<Path<TitleId>, PathRejection>,
    payload: Result<Json<ReviewDraft>, JsonRejection>,
) -> axum::response::Response {
    let Path(title_id) = match path {
        Ok(p) => p,
        Err(e) => return errors::path_rejection_to_response(e),
    };
    if let Err(resp) = authz::guard(&identity, &method, NEW_REVIEW) {
        return resp;
    }
    let Some(principal) = identity.principal() else {
        return authz::authz_error_to_response(AuthzError::Unauthenticated);
    };
    let Json(draft) = match payload {
        Ok(p) => p,
        Err(e) => return errors::json_rejection_to_response(e),
    };

    let review = match services
        .catalog
        .create_review(title_id, principal.account_id, draft, Utc::now())
    {
        Ok(r) => r,
        Err(e) => return errors::catalog_error_to_response(e),
    };
    match view(&services, review).await {
        Ok(v) => (StatusCode::CREATED, Json(v)).into_response(),
        Err(resp) => resp,
    }
}

/// PATCH /titles/{title_id}/reviews/{review_id} - Edit (author, moderator or admin)
pub async fn update_review(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(identity): Extension<Identity>,
    method: Method,
    path: Result<Path<(TitleId, ReviewId)>, PathRejection>,
    payload: Result<Json<ReviewPatch>, JsonRejection>,
) -> axum::response::Response {
    let Path((title_id, review_id)) = match path {
        Ok(p) => p,
        Err(e) => return errors::path_rejection_to_response(e),
    };
    if let Err(resp) = load_for_mutation(&services, &identity, &method, title_id, review_id).await {
        return resp;
    }
    let Json(patch) = match payload {
        Ok(p) => p,
        Err(e) => return errors::json_rejection_to_response(e),
    };

    let review = match services.catalog.update_review(title_id, review_id, patch) {
        Ok(r) => r,
        Err(e) => return errors::catalog_error_to_response(e),
    };
    match view(&services, review).await {
        Ok(v) => Json(v).into_response(),
        Err(resp) => resp,
    }
}

/// DELETE /titles/{title_id}/reviews/{review_id} - Delete with its comments (author, moderator or admin)
pub async fn delete_review(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(identity): Extension<Identity>,
    method: Method,
    path: Result<Path<(TitleId, ReviewId)>, PathRejection>,
) -> axum::response::Response {
    let Path((title_id, review_id)) = match path {
        Ok(p) => p,
        Err(e) => return errors::path_rejection_to_response(e),
    };
    if let Err(resp) = load_for_mutation(&services, &identity, &method, title_id, review_id).await {
        return resp;
    }

    match services.catalog.delete_review(title_id, review_id) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::catalog_error_to_response(e),
    }
}

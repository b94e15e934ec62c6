use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection},
        Extension, Path,
    },
    http::{Method, StatusCode},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::{Datelike, Utc};

use critica_auth::{Collection, Identity, Target};
use critica_infra::catalog::{TitleDraft, TitleId, TitlePatch};

use crate::app::routes::{comments, reviews};
use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::authz;

const TARGET: Target = Target::Administrative(Collection::Titles);

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_titles).post(create_title))
        .route(
            "/:title_id",
            get(get_title).patch(update_title).delete(delete_title),
        )
        .route(
            "/:title_id/reviews",
            get(reviews::list_reviews).post(reviews::create_review),
        )
        .route(
            "/:title_id/reviews/:review_id",
            get(reviews::get_review)
                .patch(reviews::update_review)
                .delete(reviews::delete_review),
        )
        .route(
            "/:title_id/reviews/:review_id/comments",
            get(comments::list_comments).post(comments::create_comment),
        )
        .route(
            "/:title_id/reviews/:review_id/comments/:comment_id",
            get(comments::get_comment)
                .patch(comments::update_comment)
                .delete(comments::delete_comment),
        )
}

/// GET /titles - List titles (read view: category/genres expanded)
pub async fn list_titles(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(identity): Extension<Identity>,
    method: Method,
) -> axum::response::Response {
    if let Err(resp) = authz::guard(&identity, &method, TARGET) {
        return resp;
    }

    match services.catalog.list_titles() {
        Ok(titles) => Json(titles).into_response(),
        Err(e) => errors::catalog_error_to_response(e),
    }
}

/// GET /titles/{title_id} - One title (read view)
pub async fn get_title(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(identity): Extension<Identity>,
    method: Method,
    path: Result<Path<TitleId>, PathRejection>,
) -> axum::response::Response {
    let Path(title_id) = match path {
        Ok(p) => p,
        Err(e) => return errors::path_rejection_to_response(e),
    };
    if let Err(resp) = authz::guard(&identity, &method, TARGET) {
        return resp;
    }

    match services.catalog.title(title_id) {
        Ok(title) => Json(title).into_response(),
        Err(e) => errors::catalog_error_to_response(e),
    }
}

/// POST /titles - Create a title (admin; write view with slugs)
pub async fn create_title(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(identity): Extension<Identity>,
    method: Method,
    payload: Result<Json<TitleDraft>, JsonRejection>,
) -> axum::response::Response {
    if let Err(resp) = authz::guard(&identity, &method, TARGET) {
        return resp;
    }
    let Json(draft) = match payload {
        Ok(p) => p,
        Err(e) => return errors::json_rejection_to_response(e),
    };

    match services.catalog.create_title(draft, Utc::now().year()) {
        Ok(title) => (StatusCode::CREATED, Json(dto::TitleWrite::from(title))).into_response(),
        Err(e) => errors::catalog_error_to_response(e),
    }
}

/// PATCH /titles/{title_id} - Partial update (admin; write view)
pub async fn update_title(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(identity): Extension<Identity>,
    method: Method,
    path: Result<Path<TitleId>, PathRejection>,
    payload: Result<Json<TitlePatch>, JsonRejection>,
) -> axum::response::Response {
    let Path(title_id) = match path {
        Ok(p) => p,
        Err(e) => return errors::path_rejection_to_response(e),
    };
    if let Err(resp) = authz::guard(&identity, &method, TARGET) {
        return resp;
    }
    let Json(patch) = match payload {
        Ok(p) => p,
        Err(e) => return errors::json_rejection_to_response(e),
    };

    match services.catalog.update_title(title_id, patch, Utc::now().year()) {
        Ok(title) => Json(dto::TitleWrite::from(title)).into_response(),
        Err(e) => errors::catalog_error_to_response(e),
    }
}

/// DELETE /titles/{title_id} - Delete a title with its reviews and comments (admin)
pub async fn delete_title(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(identity): Extension<Identity>,
    method: Method,
    path: Result<Path<TitleId>, PathRejection>,
) -> axum::response::Response {
    let Path(title_id) = match path {
        Ok(p) => p,
        Err(e) => return errors::path_rejection_to_response(e),
    };
    if let Err(resp) = authz::guard(&identity, &method, TARGET) {
        return resp;
    }

    match services.catalog.delete_title(title_id) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::catalog_error_to_response(e),
    }
}

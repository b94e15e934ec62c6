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
use critica_infra::catalog::{Comment, CommentDraft, CommentId, ReviewId, TitleId};

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::authz;

const NEW_COMMENT: Target = Target::Authored {
    kind: AuthoredKind::Comment,
    author: None,
};

async fn view(services: &AppServices, comment: Comment) -> Result<dto::CommentView, axum::response::Response> {
    let author = services
        .author_name(comment.author)
        .await
        .map_err(errors::store_error_to_response)?;
    Ok(dto::CommentView::new(comment, author))
}

async fn load_for_mutation(
    services: &AppServices,
    identity: &Identity,
    method: &Method,
    (title_id, review_id, comment_id): (TitleId, ReviewId, CommentId),
) -> Result<Comment, axum::response::Response> {
    authz::require_authenticated(identity)?;
    let comment = services
        .catalog
        .comment(title_id, review_id, comment_id)
        .map_err(errors::catalog_error_to_response)?;
    authz::guard(
        identity,
        method,
        Target::authored(AuthoredKind::Comment, comment.author),
    )?;
    Ok(comment)
}

/// GET /titles/{title_id}/reviews/{review_id}/comments - Comments on a review
pub async fn list_comments(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(identity): Extension<Identity>,
    method: Method,
    path: Result<Path<(TitleId, ReviewId)>, PathRejection>,
) -> axum::response::Response {
    let Path((title_id, review_id)) = match path {
        Ok(p) => p,
        Err(e) => return errors::path_rejection_to_response(e),
    };
    if let Err(resp) = authz::guard(&identity, &method, NEW_COMMENT) {
        return resp;
    }

    let comments = match services.catalog.list_comments(title_id, review_id) {
        Ok(c) => c,
        Err(e) => return errors::catalog_error_to_response(e),
    };
    let mut out = Vec::with_capacity(comments.len());
    for comment in comments {
        match view(&services, comment).await {
            Ok(v) => out.push(v),
            Err(resp) => return resp,
        }
    }
    Json(out).into_response()
}

/// GET /titles/{title_id}/reviews/{review_id}/comments/{comment_id} - One comment
pub async fn get_comment(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(identity): Extension<Identity>,
    method: Method,
    path: Result<Path<(TitleId, ReviewId, CommentId)>, PathRejection>,
) -> axum::response::Response {
    let Path((title_id, review_id, comment_id)) = match path {
        Ok(p) => p,
        Err(e) => return errors::path_rejection_to_response(e),
    };
    if let Err(resp) = authz::guard(&identity, &method, NEW_COMMENT) {
        return resp;
    }

    let comment = match services.catalog.comment(title_id, review_id, comment_id) {
        Ok(c) => c,
        Err(e) => return errors::catalog_error_to_response(e),
    };
    match view(&services, comment).await {
        Ok(v) => Json(v).into_response(),
        Err(resp) => resp,
    }
}

/// POST /titles/{title_id}/reviews/{review_id}/comments - Comment (any authenticated user)
pub async fn create_comment(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(identity): Extension<Identity>,
    method: Method,
    path: Result<Path<(TitleId, ReviewId)>, PathRejection>,
    payload: Result<Json<CommentDraft>, JsonRejection>,
) -> axum::response::Response {
    let Path((title_id, review_id)) = match path {
        Ok(p) => p,
        Err(e) => return errors::path_rejection_to_response(e),
    };
    if let Err(resp) = authz::guard(&identity, &method, NEW_COMMENT) {
        return resp;
    }
    let Some(principal) = identity.principal() else {
        return authz::authz_error_to_response(AuthzError::Unauthenticated);
    };
    let Json(draft) = match payload {
        Ok(p) => p,
        Err(e) => return errors::json_rejection_to_response(e),
    };

    let comment = match services
        .catalog
        .create_comment(title_id, review_id, principal.account_id, draft, Utc::now())
    {
        Ok(c) => c,
        Err(e) => return errors::catalog_error_to_response(e),
    };
    match view(&services, comment).await {
        Ok(v) => (StatusCode::CREATED, Json(v)).into_response(),
        Err(resp) => resp,
    }
}

/// PATCH /titles/{title_id}/reviews/{review_id}/comments/{comment_id} - Edit (author, moderator or admin)
pub async fn update_comment(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(identity): Extension<Identity>,
    method: Method,
    path: Result<Path<(TitleId, ReviewId, CommentId)>, PathRejection>,
    payload: Result<Json<CommentDraft>, JsonRejection>,
) -> axum::response::Response {
    let Path(ids) = match path {
        Ok(p) => p,
        Err(e) => return errors::path_rejection_to_response(e),
    };
    if let Err(resp) = load_for_mutation(&services, &identity, &method, ids).await {
        return resp;
    }
    let Json(draft) = match payload {
        Ok(p) => p,
        Err(e) => return errors::json_rejection_to_response(e),
    };

    let (title_id, review_id, comment_id) = ids;
    let comment = match services
        .catalog
        .update_comment(title_id, review_id, comment_id, draft)
    {
        Ok(c) => c,
        Err(e) => return errors::catalog_error_to_response(e),
    };
    match view(&services, comment).await {
        Ok(v) => Json(v).into_response(),
        Err(resp) => resp,
    }
}

/// DELETE /titles/{title_id}/reviews/{review_id}/comments/{comment_id} - Delete (author, moderator or admin)
pub async fn delete_comment(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(identity): Extension<Identity>,
    method: Method,
    path: Result<Path<(TitleId, ReviewId, CommentId)>, PathRejection>,
) -> axum::response::Response {
    let Path(ids) = match path {
        Ok(p) => p,
        Err(e) => return errors::path_rejection_to_response(e),
    };
    if let Err(resp) = load_for_mutation(&services, &identity, &method, ids).await {
        return resp;
    }

    let (title_id, review_id, comment_id) = ids;
    match services.catalog.delete_comment(title_id, review_id, comment_id) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::catalog_error_to_response(e),
    }
}

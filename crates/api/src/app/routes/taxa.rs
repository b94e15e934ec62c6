//! `/categories` and `/genres`: the same handlers, told apart by the
//! [`TaxonKind`] extension layered on each mount.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Extension, Path},
    http::{Method, StatusCode},
    response::IntoResponse,
    routing::{delete, get},
    Json, Router,
};

use critica_auth::{Collection, Identity, Target};
use critica_infra::catalog::{Taxon, TaxonKind};

use crate::app::services::AppServices;
use crate::app::{dto, errors};
use crate::authz;

pub fn router() -> Router {
    Router::new()
        .route("/", get(list_taxa).post(create_taxon))
        .route("/:slug", delete(delete_taxon))
}

fn target(kind: TaxonKind) -> Target {
    match kind {
        TaxonKind::Category => Target::Administrative(Collection::Categories),
        TaxonKind::Genre => Target::Administrative(Collection::Genres),
    }
}

/// GET /categories | /genres - List all
pub async fn list_taxa(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(identity): Extension<Identity>,
    Extension(kind): Extension<TaxonKind>,
    method: Method,
) -> axum::response::Response {
    if let Err(resp) = authz::guard(&identity, &method, target(kind)) {
        return resp;
    }

    match services.catalog.list_taxa(kind) {
        Ok(taxa) => Json(taxa).into_response(),
        Err(e) => errors::catalog_error_to_response(e),
    }
}

/// POST /categories | /genres - Create (admin)
pub async fn create_taxon(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(identity): Extension<Identity>,
    Extension(kind): Extension<TaxonKind>,
    method: Method,
    payload: Result<Json<dto::TaxonRequest>, JsonRejection>,
) -> axum::response::Response {
    if let Err(resp) = authz::guard(&identity, &method, target(kind)) {
        return resp;
    }
    let Json(body) = match payload {
        Ok(p) => p,
        Err(e) => return errors::json_rejection_to_response(e),
    };

    let created = Taxon::new(&body.name, &body.slug).and_then(|t| services.catalog.create_taxon(kind, t));
    match created {
        Ok(taxon) => (StatusCode::CREATED, Json(taxon)).into_response(),
        Err(e) => errors::catalog_error_to_response(e),
    }
}

/// DELETE /categories/{slug} | /genres/{slug} - Delete (admin)
pub async fn delete_taxon(
    Extension(services): Extension<Arc<AppServices>>,
    Extension(identity): Extension<Identity>,
    Extension(kind): Extension<TaxonKind>,
    method: Method,
    Path(slug): Path<String>,
) -> axum::response::Response {
    if let Err(resp) = authz::guard(&identity, &method, target(kind)) {
        return resp;
    }

    match services.catalog.delete_taxon(kind, &slug) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => errors::catalog_error_to_response(e),
    }
}

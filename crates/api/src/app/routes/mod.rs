use axum::{Extension, Router};

use critica_infra::catalog::TaxonKind;

pub mod auth;
pub mod comments;
pub mod reviews;
pub mod system;
pub mod taxa;
pub mod titles;
pub mod users;

/// Router for every endpoint behind the identity middleware.
pub fn router() -> Router {
    Router::new()
        .nest("/auth", auth::router())
        .nest("/users", users::router())
        .nest(
            "/categories",
            taxa::router().layer(Extension(TaxonKind::Category)),
        )
        .nest("/genres", taxa::router().layer(Extension(TaxonKind::Genre)))
        .nest("/titles", titles::router())
}

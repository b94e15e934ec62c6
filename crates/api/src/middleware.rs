use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use chrono::Utc;

use critica_auth::{Identity, JwtValidator, Principal};

use crate::app::errors;

#[derive(Clone)]
pub struct AuthState {
    pub jwt: Arc<dyn JwtValidator>,
}

/// Resolve the caller's [`Identity`] and attach it to the request.
///
/// No `Authorization` header means anonymous; a header that is present but
/// malformed, badly signed or expired is rejected with 401.
pub async fn identity_middleware(
    State(state): State<AuthState>,
    mut req: axum::http::Request<axum::body::Body>,
    next: Next,
) -> Response {
    let identity = match extract_bearer(req.headers()) {
        Ok(None) => Identity::Anonymous,
        Ok(Some(token)) => match state.jwt.validate(token, Utc::now()) {
            Ok(claims) => Identity::Authenticated(Principal::from(claims)),
            Err(e) => {
                tracing::debug!(error = %e, "rejected bearer token");
                return errors::json_error(
                    StatusCode::UNAUTHORIZED,
                    "unauthenticated",
                    "invalid or expired token",
                );
            }
        },
        Err(msg) => return errors::json_error(StatusCode::UNAUTHORIZED, "unauthenticated", msg),
    };

    req.extensions_mut().insert(identity);
    next.run(req).await
}

fn extract_bearer(headers: &HeaderMap) -> Result<Option<&str>, &'static str> {
    let Some(header) = headers.get(axum::http::header::AUTHORIZATION) else {
        return Ok(None);
    };

    let header = header
        .to_str()
        .map_err(|_| "authorization header is not valid ASCII")?;

    let token = header
        .strip_prefix("Bearer ")
        .ok_or("authorization header must use the Bearer scheme")?
        .trim();
    if token.is_empty() {
        return Err("bearer token is empty");
    }

    Ok(Some(token))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: Option<&'static str>) -> HeaderMap {
        let mut h = HeaderMap::new();
        if let Some(v) = value {
            h.insert(axum::http::header::AUTHORIZATION, HeaderValue::from_static(v));
        }
        h
    }

    #[test]
    fn bearer_extraction() {
        assert_eq!(extract_bearer(&headers(None)), Ok(None));
        assert_eq!(extract_bearer(&headers(Some("Bearer abc"))), Ok(Some("abc")));
        assert!(extract_bearer(&headers(Some("Basic abc"))).is_err());
        assert!(extract_bearer(&headers(Some("Bearer  "))).is_err());
    }
}

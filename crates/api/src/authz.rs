//! HTTP side of the role gate.
//!
//! Handlers resolve their [`Target`] and call [`guard`] before touching any
//! store; the verb comes from the request method.

use axum::http::{Method, StatusCode};
use axum::response::Response;

use critica_auth::{AuthzError, Identity, Target, Verb, evaluate};

use crate::app::errors;

/// Map an HTTP method onto the gate's verb classes.
pub fn verb_from_method(method: &Method) -> Verb {
    match *method {
        Method::GET | Method::HEAD | Method::OPTIONS => Verb::SafeRead,
        Method::POST => Verb::Create,
        _ => Verb::Mutate,
    }
}

/// Evaluate the gate; a denial becomes a ready 401/403 response.
pub fn guard(identity: &Identity, method: &Method, target: Target) -> Result<(), Response> {
    let verb = verb_from_method(method);
    let decision = evaluate(identity, verb, target);
    match decision.outcome {
        Ok(()) => Ok(()),
        Err(e) => {
            tracing::debug!(rule = ?decision.rule, ?verb, ?target, error = %e, "request denied");
            Err(authz_error_to_response(e))
        }
    }
}

/// Reject anonymous callers up front, before the target is loaded.
pub fn require_authenticated(identity: &Identity) -> Result<(), Response> {
    if identity.is_authenticated() {
        Ok(())
    } else {
        Err(authz_error_to_response(AuthzError::Unauthenticated))
    }
}

pub fn authz_error_to_response(err: AuthzError) -> Response {
    match err {
        AuthzError::Unauthenticated => errors::json_error(
            StatusCode::UNAUTHORIZED,
            "unauthenticated",
            "authentication required",
        ),
        AuthzError::Forbidden(msg) => errors::json_error(StatusCode::FORBIDDEN, "forbidden", msg),
    }
}

use axum::{
    body::Body,
    extract::State,
    http::{header::AUTHORIZATION, HeaderMap, Request, StatusCode},
    middleware::Next,
    response::Response,
};

use crate::admin::AdminState;

/// Token from an `Authorization: Bearer <token>` header.
fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    scheme.eq_ignore_ascii_case("bearer").then(|| token.trim())
}

/// Reject requests whose bearer token does not match the live API key.
///
/// The key is read on every request so a reload rotates it immediately.
pub async fn admin_auth_middleware(
    State(state): State<AdminState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    let config = state.coordinator.config();

    match bearer_token(request.headers()) {
        Some(token) if !token.is_empty() && token == config.admin.api_key => {
            Ok(next.run(request).await)
        }
        presented => {
            tracing::debug!(
                path = %request.uri().path(),
                token_present = presented.is_some(),
                "Admin request rejected"
            );
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}

use axum::{
    extract::Request,
    http::HeaderMap,
    middleware::Next,
    response::Response,
};

use crate::auth::{decode_jwt, UserSession};
use crate::error::ApiError;

/// Header Bridge clients send their session token in
pub const SESSION_HEADER: &str = "Bridge-Session";

/// Resolves the session token and injects a `UserSession` into the request
pub async fn session_middleware(
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_token_from_headers(&headers).map_err(|msg| {
        tracing::debug!("Rejected request without session: {}", msg);
        ApiError::unauthorized("Not signed in.")
    })?;

    let claims = decode_jwt(&token).map_err(|e| {
        tracing::warn!("Rejected session token: {}", e);
        ApiError::unauthorized("Not signed in.")
    })?;

    request.extensions_mut().insert(UserSession::from(claims));
    Ok(next.run(request).await)
}

/// Token from `Bridge-Session`, or from `Authorization: Bearer`
fn extract_token_from_headers(headers: &HeaderMap) -> Result<String, String> {
    if let Some(value) = headers.get(SESSION_HEADER) {
        let token = value
            .to_str()
            .map_err(|_| format!("Invalid {} header format", SESSION_HEADER))?
            .trim();
        if token.is_empty() {
            return Err(format!("Empty {} header", SESSION_HEADER));
        }
        return Ok(token.to_string());
    }

    let auth_header = headers
        .get(axum::http::header::AUTHORIZATION)
        .ok_or_else(|| "Missing session header".to_string())?;
    let auth_str = auth_header
        .to_str()
        .map_err(|_| "Invalid Authorization header format".to_string())?;

    match auth_str.strip_prefix("Bearer ") {
        Some(token) if !token.trim().is_empty() => Ok(token.trim().to_string()),
        Some(_) => Err("Empty bearer token".to_string()),
        None => Err("Authorization header must use Bearer token format".to_string()),
    }
}

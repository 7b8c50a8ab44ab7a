use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::api::AppState;
use crate::auth::UserSession;
use crate::database::models::Study;
use crate::error::ApiError;

/// Study bound to the session, checked to exist and be active.
/// Handlers take their study scope from here, never from the request.
#[derive(Clone, Debug)]
pub struct SessionStudy(pub Study);

/// Runs after `session_middleware`; injects `SessionStudy`
pub async fn validate_study_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let session = request
        .extensions()
        .get::<UserSession>()
        .cloned()
        .ok_or_else(|| ApiError::unauthorized("Not signed in."))?;

    let found = match state.studies.get_study(&session.study_id).await {
        Ok(study) => Some(study),
        Err(ApiError::NotFound(_)) => None,
        Err(e) => return Err(e),
    };

    let study = found
        .filter(|study| study.active)
        .ok_or_else(|| {
            tracing::warn!(
                "Study validation failed: study '{}' not found or inactive for user {}",
                session.study_id,
                session.user_id
            );
            ApiError::forbidden(format!(
                "Study '{}' is not active or does not exist",
                session.study_id
            ))
        })?;

    tracing::debug!("Study validation successful: {}", study.identifier);
    request.extensions_mut().insert(SessionStudy(study));
    Ok(next.run(request).await)
}

// handlers/elevated/mod.rs - Cross-study handlers for worker and superadmin callers
//
// These routes still sit behind the session and study checks, but the study
// they read is named in the path rather than taken from the session.

use axum::{
    extract::{Path, State},
    Extension, Json,
};

use crate::api::format::{ResourceList, Typed};
use crate::api::AppState;
use crate::auth::UserSession;
use crate::database::models::UploadSchema;
use crate::handlers::protected::upload_schemas::parse_revision;
use crate::middleware::{ok, ApiResult};
use crate::types::Role;

/// GET /v3/studies/:studyId/uploadschemas/:schemaId/revisions/:revision
///
/// Upload validation workers resolve schemas for any study, so the
/// owning study identifier stays in the response.
pub async fn get_upload_schema_by_study_and_schema_and_rev(
    State(state): State<AppState>,
    Extension(session): Extension<UserSession>,
    Path((study_id, schema_id, revision)): Path<(String, String, String)>,
) -> ApiResult<Json<Typed<UploadSchema>>> {
    session.require_any(&[Role::Worker])?;
    let revision = parse_revision(&revision)?;
    let schema = state
        .schemas
        .get_upload_schema_by_id_and_rev(&study_id, &schema_id, revision)
        .await?;
    Ok(ok(schema))
}

/// GET /v3/synapse/:synapseUserId/studies
pub async fn get_study_ids_for_synapse_user(
    State(state): State<AppState>,
    Extension(session): Extension<UserSession>,
    Path(synapse_user_id): Path<String>,
) -> ApiResult<Json<ResourceList<String>>> {
    session.require_any(&[Role::Worker, Role::Superadmin])?;
    let ids = state.accounts.get_study_ids_for_user(&synapse_user_id).await?;
    Ok(Json(ResourceList::of_values(ids)))
}

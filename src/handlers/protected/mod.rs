// handlers/protected/mod.rs - Study-scoped handlers
//
// Every route here runs after session_middleware and validate_study_middleware,
// so handlers receive a UserSession and an active SessionStudy. Role checks
// happen per handler.

pub mod participants;
pub mod study_consents;
pub mod subpopulations;
pub mod templates;
pub mod upload_schemas;

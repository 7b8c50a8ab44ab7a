use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Immutable consent document revision, identified by (subpopulation, createdOn)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct StudyConsent {
    pub subpopulation_guid: String,
    #[serde(with = "crate::types::iso_millis")]
    pub created_on: i64,
    pub active: bool,
    #[serde(skip)]
    pub document_content: String,
    #[serde(default)]
    pub version: i64,
}

/// Consent metadata together with its document, as returned for single reads
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudyConsentView {
    pub subpopulation_guid: String,
    #[serde(with = "crate::types::iso_millis")]
    pub created_on: i64,
    pub active: bool,
    pub document_content: String,
    pub version: i64,
}

impl From<StudyConsent> for StudyConsentView {
    fn from(consent: StudyConsent) -> Self {
        Self {
            subpopulation_guid: consent.subpopulation_guid,
            created_on: consent.created_on,
            active: consent.active,
            document_content: consent.document_content,
            version: consent.version,
        }
    }
}

/// Request body for a new consent revision
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudyConsentForm {
    #[serde(default)]
    pub document_content: String,
}

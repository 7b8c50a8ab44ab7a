use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A named stratification within a study that owns its own consent documents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Subpopulation {
    #[serde(default)]
    pub guid: String,
    #[serde(default, skip_serializing)]
    pub study_id: String,
    #[serde(default)]
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub default_group: bool,
    #[serde(default)]
    pub deleted: bool,
    #[serde(
        default,
        with = "crate::types::iso_millis::option",
        skip_serializing_if = "Option::is_none"
    )]
    pub published_consent_created_on: Option<i64>,
    #[serde(default)]
    pub version: i64,
}

impl Subpopulation {
    /// The subpopulation every study starts with. Its guid is the study identifier.
    pub fn default_for_study(study_id: &str) -> Self {
        Self {
            guid: study_id.to_string(),
            study_id: study_id.to_string(),
            name: "Default Consent Group".to_string(),
            description: None,
            required: true,
            default_group: true,
            deleted: false,
            published_consent_created_on: None,
            version: 0,
        }
    }
}

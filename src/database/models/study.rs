use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Top-level tenant. Every other resource is scoped to exactly one study.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Study {
    pub identifier: String,
    pub name: String,
    pub active: bool,
    pub version: i64,
}

impl Study {
    pub fn new(identifier: impl Into<String>) -> Self {
        let identifier = identifier.into();
        Self {
            name: identifier.clone(),
            identifier,
            active: true,
            version: 1,
        }
    }
}

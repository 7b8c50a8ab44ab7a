//! Persistence traits. Each has a PostgreSQL implementation in
//! `crate::database` and an in-process one in `crate::database::memory`.
//! Stores never look at caller roles; authorization happens above them.

pub mod account;
pub mod study;
pub mod study_consent;
pub mod subpopulation;
pub mod template;
pub mod upload_schema;

use serde::Serialize;

pub use account::{AccountDao, AfterPersist};
pub use study::StudyDao;
pub use study_consent::StudyConsentDao;
pub use subpopulation::SubpopulationDao;
pub use template::TemplateDao;
pub use upload_schema::{NewRevision, UploadSchemaDao};

/// One page of a larger result set. `total` counts every match, not just this page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PagedResult<T> {
    pub items: Vec<T>,
    pub total: i64,
}

impl<T> PagedResult<T> {
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> PagedResult<U> {
        PagedResult {
            items: self.items.into_iter().map(f).collect(),
            total: self.total,
        }
    }
}

pub mod account;
pub mod study;
pub mod study_consent;
pub mod subpopulation;
pub mod template;
pub mod upload_schema;

pub use account::{
    Account, AccountId, AccountStatus, AccountSummary, AccountSummarySearch, Phone, MIGRATION_VERSION,
};
pub use study::Study;
pub use study_consent::{StudyConsent, StudyConsentForm, StudyConsentView};
pub use subpopulation::Subpopulation;
pub use template::{Template, TemplateType};
pub use upload_schema::{UploadFieldDefinition, UploadFieldType, UploadSchema, UploadSchemaType};

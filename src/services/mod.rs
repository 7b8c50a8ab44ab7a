pub mod account_service;
pub mod study_consent_service;
pub mod study_service;
pub mod subpopulation_service;
pub mod template_service;
pub mod upload_schema_service;

pub use account_service::{AccountNotifier, AccountService, TracingNotifier};
pub use study_consent_service::StudyConsentService;
pub use study_service::StudyService;
pub use subpopulation_service::SubpopulationService;
pub use template_service::TemplateService;
pub use upload_schema_service::UploadSchemaService;

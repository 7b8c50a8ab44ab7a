use async_trait::async_trait;

use super::PagedResult;
use crate::database::manager::DatabaseError;
use crate::database::models::{Template, TemplateType};

#[async_trait]
pub trait TemplateDao: Send + Sync {
    /// Templates of one type, newest first
    async fn get_templates(
        &self,
        study_id: &str,
        template_type: TemplateType,
        offset: i64,
        limit: i64,
        include_deleted: bool,
    ) -> Result<PagedResult<Template>, DatabaseError>;

    async fn get_template(&self, study_id: &str, guid: &str) -> Result<Option<Template>, DatabaseError>;

    /// `Conflict` if the guid is taken
    async fn create_template(&self, template: Template) -> Result<Template, DatabaseError>;

    /// `NotFound` if absent, `ConcurrentModification` on a stale version
    async fn update_template(&self, template: Template) -> Result<Template, DatabaseError>;

    async fn delete_template_permanently(&self, study_id: &str, guid: &str) -> Result<(), DatabaseError>;
}

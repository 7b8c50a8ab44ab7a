use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::config::config;
use crate::dao::{PagedResult, TemplateDao};
use crate::database::models::{Template, TemplateType};
use crate::error::ApiError;
use crate::types::DeleteMode;

pub struct TemplateService {
    templates: Arc<dyn TemplateDao>,
}

impl TemplateService {
    pub fn new(templates: Arc<dyn TemplateDao>) -> Self {
        Self { templates }
    }

    fn validate(template: &Template) -> Result<(), ApiError> {
        let mut errors = BTreeMap::new();
        if template.name.trim().is_empty() {
            errors.insert("name".to_string(), "is required".to_string());
        }
        if template.template_type.is_none() {
            errors.insert("templateType".to_string(), "is required".to_string());
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ApiError::validation_error("Template is invalid", Some(errors)))
        }
    }

    pub async fn get_templates(
        &self,
        study_id: &str,
        template_type: Option<TemplateType>,
        offset_by: i64,
        page_size: i64,
        include_deleted: bool,
    ) -> Result<PagedResult<Template>, ApiError> {
        let template_type = template_type.ok_or_else(|| ApiError::bad_request("Template type is required"))?;
        check_paging(offset_by, page_size)?;

        Ok(self
            .templates
            .get_templates(study_id, template_type, offset_by, page_size, include_deleted)
            .await?)
    }

    /// Deleted templates are still readable by guid
    pub async fn get_template(&self, study_id: &str, guid: &str) -> Result<Template, ApiError> {
        self.templates
            .get_template(study_id, guid)
            .await?
            .ok_or_else(|| ApiError::entity_not_found("Template"))
    }

    pub async fn create_template(&self, study_id: &str, mut template: Template) -> Result<Template, ApiError> {
        Self::validate(&template)?;

        let now = Utc::now();
        template.guid = Uuid::new_v4().to_string();
        template.study_id = study_id.to_string();
        template.created_on = now;
        template.modified_on = now;
        template.deleted = false;

        let created = self.templates.create_template(template).await?;
        info!("Created template {} in study {}", created.guid, study_id);
        Ok(created)
    }

    /// The template type is fixed at creation. A deleted template can only be
    /// updated to undelete it.
    pub async fn update_template(
        &self,
        study_id: &str,
        guid: &str,
        mut template: Template,
    ) -> Result<Template, ApiError> {
        let existing = self.get_template(study_id, guid).await?;
        if existing.deleted && template.deleted {
            return Err(ApiError::entity_not_found("Template"));
        }

        template.guid = existing.guid;
        template.study_id = existing.study_id;
        template.template_type = existing.template_type;
        template.created_on = existing.created_on;
        template.modified_on = Utc::now();
        Self::validate(&template)?;

        Ok(self.templates.update_template(template).await?)
    }

    pub async fn delete_template(&self, study_id: &str, guid: &str, mode: DeleteMode) -> Result<(), ApiError> {
        let existing = self.get_template(study_id, guid).await?;
        match mode {
            DeleteMode::Permanent => {
                self.templates.delete_template_permanently(study_id, guid).await?;
            }
            DeleteMode::Logical => {
                if existing.deleted {
                    return Err(ApiError::entity_not_found("Template"));
                }
                let flagged = Template {
                    deleted: true,
                    modified_on: Utc::now(),
                    ..existing
                };
                self.templates.update_template(flagged).await?;
            }
        }
        info!("Deleted template {} in study {} ({:?})", guid, study_id, mode);
        Ok(())
    }
}

/// Shared paging bounds for listings that take `offsetBy` and `pageSize`
pub fn check_paging(offset_by: i64, page_size: i64) -> Result<(), ApiError> {
    let api = &config().api;
    if offset_by < 0 {
        return Err(ApiError::bad_request("offsetBy cannot be negative"));
    }
    if page_size < api.min_page_size || page_size > api.max_page_size {
        return Err(ApiError::bad_request(format!(
            "pageSize must be from {}-{} records",
            api.min_page_size, api.max_page_size
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryStore;
    use crate::testing::sample_template;

    fn service() -> TemplateService {
        TemplateService::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn listing_requires_type_and_sane_paging() {
        let svc = service();
        let no_type = svc.get_templates("api", None, 0, 50, false).await.unwrap_err();
        assert_eq!(no_type.message(), "Template type is required");

        let t = Some(TemplateType::EmailSignIn);
        assert!(svc.get_templates("api", t, -1, 50, false).await.is_err());
        assert!(svc.get_templates("api", t, 0, 4, false).await.is_err());
        assert!(svc.get_templates("api", t, 0, 101, false).await.is_err());
        assert_eq!(svc.get_templates("api", t, 0, 5, false).await.unwrap().total, 0);
    }

    #[tokio::test]
    async fn create_assigns_guid_and_lists_by_type() {
        let svc = service();
        let created = svc
            .create_template("api", sample_template(TemplateType::EmailSignIn))
            .await
            .unwrap();
        svc.create_template("api", sample_template(TemplateType::SmsVerifyPhone))
            .await
            .unwrap();

        assert!(!created.guid.is_empty());
        assert_eq!(created.version, 1);
        let page = svc
            .get_templates("api", Some(TemplateType::EmailSignIn), 0, 50, false)
            .await
            .unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].guid, created.guid);
    }

    #[tokio::test]
    async fn update_cannot_change_type() {
        let svc = service();
        let created = svc
            .create_template("api", sample_template(TemplateType::EmailSignIn))
            .await
            .unwrap();

        let mut changed = created.clone();
        changed.template_type = Some(TemplateType::SmsSignedConsent);
        changed.name = "Renamed".to_string();
        let updated = svc.update_template("api", &created.guid, changed).await.unwrap();
        assert_eq!(updated.template_type, Some(TemplateType::EmailSignIn));
        assert_eq!(updated.name, "Renamed");
        assert_eq!(updated.version, created.version + 1);
    }

    #[tokio::test]
    async fn logical_delete_then_permanent_delete() {
        let svc = service();
        let created = svc
            .create_template("api", sample_template(TemplateType::EmailSignIn))
            .await
            .unwrap();
        let t = Some(TemplateType::EmailSignIn);

        svc.delete_template("api", &created.guid, DeleteMode::Logical).await.unwrap();
        assert_eq!(svc.get_templates("api", t, 0, 50, false).await.unwrap().total, 0);
        assert_eq!(svc.get_templates("api", t, 0, 50, true).await.unwrap().total, 1);

        // Deleting again logically finds nothing to delete
        let again = svc.delete_template("api", &created.guid, DeleteMode::Logical).await.unwrap_err();
        assert!(matches!(again, ApiError::NotFound(_)));

        svc.delete_template("api", &created.guid, DeleteMode::Permanent).await.unwrap();
        assert!(svc.get_template("api", &created.guid).await.is_err());
    }

    #[tokio::test]
    async fn templates_are_scoped_to_study() {
        let svc = service();
        let created = svc
            .create_template("api", sample_template(TemplateType::EmailSignIn))
            .await
            .unwrap();
        let err = svc.get_template("other", &created.guid).await.unwrap_err();
        assert_eq!(err.message(), "Template not found.");
    }
}

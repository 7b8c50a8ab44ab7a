//! In-process implementation of every store trait, used for development and
//! tests. One lock guards all tables and each mutating call takes the write
//! guard once, so every operation is atomic with respect to the others.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

use crate::dao::{
    AccountDao, AfterPersist, NewRevision, PagedResult, StudyConsentDao, StudyDao, SubpopulationDao,
    TemplateDao, UploadSchemaDao,
};
use crate::database::manager::DatabaseError;
use crate::database::models::{
    Account, AccountId, AccountSummary, AccountSummarySearch, Study, StudyConsent, Subpopulation, Template,
    TemplateType, UploadSchema, MIGRATION_VERSION,
};
use crate::types::DeleteMode;

type SchemaKey = (String, String, i32);

#[derive(Default)]
struct MemoryState {
    studies: BTreeMap<String, Study>,
    accounts: BTreeMap<String, Account>,
    templates: BTreeMap<String, Template>,
    schemas: BTreeMap<SchemaKey, UploadSchema>,
    revision_counters: HashMap<(String, String), i32>,
    subpopulations: BTreeMap<String, Subpopulation>,
    consents: BTreeMap<(String, i64), StudyConsent>,
}

impl MemoryState {
    /// Name of the first identifier `candidate` shares with another account in its study
    fn identifier_collision(&self, candidate: &Account) -> Option<&'static str> {
        self.accounts
            .values()
            .filter(|a| a.study_id == candidate.study_id && a.id != candidate.id)
            .find_map(|other| {
                if let (Some(a), Some(b)) = (&other.email, &candidate.email) {
                    if a.eq_ignore_ascii_case(b) {
                        return Some("email address");
                    }
                }
                if let (Some(a), Some(b)) = (&other.phone, &candidate.phone) {
                    if a.canonical_number() == b.canonical_number() {
                        return Some("phone number");
                    }
                }
                if other.health_code == candidate.health_code {
                    return Some("health code");
                }
                if other.synapse_user_id.is_some() && other.synapse_user_id == candidate.synapse_user_id {
                    return Some("Synapse user ID");
                }
                if other.external_id.is_some() && other.external_id == candidate.external_id {
                    return Some("external ID");
                }
                None
            })
    }

    fn revisions<'a>(&'a self, study_id: &str, schema_id: &str) -> impl DoubleEndedIterator<Item = &'a UploadSchema> {
        let from = (study_id.to_string(), schema_id.to_string(), i32::MIN);
        let to = (study_id.to_string(), schema_id.to_string(), i32::MAX);
        self.schemas.range(from..=to).map(|(_, s)| s)
    }

    fn consents_for<'a>(&'a self, guid: &'a str) -> impl DoubleEndedIterator<Item = &'a StudyConsent> {
        let from = (guid.to_string(), i64::MIN);
        let to = (guid.to_string(), i64::MAX);
        self.consents.range(from..=to).map(|(_, c)| c)
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Phones are kept in canonical form, as the Postgres store writes them
fn canonicalize_phone(account: &mut Account) {
    if let Some(phone) = account.phone.as_mut() {
        phone.number = phone.canonical_number();
    }
}

fn stale(entity: &str) -> DatabaseError {
    DatabaseError::ConcurrentModification(format!(
        "{} has the wrong version number; it may have been saved in the background.",
        entity
    ))
}

#[async_trait]
impl StudyDao for MemoryStore {
    async fn get_study(&self, identifier: &str) -> Result<Option<Study>, DatabaseError> {
        Ok(self.state.read().await.studies.get(identifier).cloned())
    }

    async fn create_study_if_absent(&self, study: Study) -> Result<bool, DatabaseError> {
        let mut state = self.state.write().await;
        if state.studies.contains_key(&study.identifier) {
            return Ok(false);
        }
        state.studies.insert(study.identifier.clone(), study);
        Ok(true)
    }
}

#[async_trait]
impl AccountDao for MemoryStore {
    async fn get_study_ids_for_user(&self, synapse_user_id: &str) -> Result<Vec<String>, DatabaseError> {
        let state = self.state.read().await;
        let mut ids: Vec<String> = state
            .accounts
            .values()
            .filter(|a| a.synapse_user_id.as_deref() == Some(synapse_user_id))
            .map(|a| a.study_id.clone())
            .collect();
        ids.sort();
        ids.dedup();
        Ok(ids)
    }

    async fn create_account(
        &self,
        study: &Study,
        mut account: Account,
        after_persist: Option<&AfterPersist>,
    ) -> Result<Account, DatabaseError> {
        let mut state = self.state.write().await;

        account.study_id = study.identifier.clone();
        canonicalize_phone(&mut account);
        if state.accounts.contains_key(&account.id) {
            return Err(DatabaseError::Conflict("Account already exists.".to_string()));
        }
        if let Some(kind) = state.identifier_collision(&account) {
            return Err(DatabaseError::Conflict(format!("Account with this {} already exists.", kind)));
        }

        account.modified_on = Utc::now();
        account.migration_version = MIGRATION_VERSION;
        account.version = 1;
        state.accounts.insert(account.id.clone(), account.clone());

        if let Some(hook) = after_persist {
            if let Err(err) = hook(&account) {
                state.accounts.remove(&account.id);
                return Err(DatabaseError::AfterPersist(Box::new(err)));
            }
        }
        Ok(account)
    }

    async fn update_account(
        &self,
        mut account: Account,
        after_persist: Option<&AfterPersist>,
    ) -> Result<Account, DatabaseError> {
        let mut state = self.state.write().await;

        let existing = state
            .accounts
            .get(&account.id)
            .cloned()
            .ok_or_else(|| DatabaseError::not_found("Account"))?;
        if existing.version != account.version {
            return Err(stale("Account"));
        }

        account.study_id = existing.study_id.clone();
        account.created_on = existing.created_on;
        canonicalize_phone(&mut account);
        if let Some(kind) = state.identifier_collision(&account) {
            return Err(DatabaseError::Conflict(format!("Account with this {} already exists.", kind)));
        }

        account.modified_on = Utc::now();
        account.migration_version = MIGRATION_VERSION;
        account.version = existing.version + 1;
        state.accounts.insert(account.id.clone(), account.clone());

        if let Some(hook) = after_persist {
            if let Err(err) = hook(&account) {
                state.accounts.insert(existing.id.clone(), existing);
                return Err(DatabaseError::AfterPersist(Box::new(err)));
            }
        }
        Ok(account)
    }

    async fn get_account(&self, account_id: &AccountId) -> Result<Option<Account>, DatabaseError> {
        let state = self.state.read().await;
        Ok(state.accounts.values().find(|a| account_id.matches(a)).cloned())
    }

    async fn delete_account(&self, user_id: &str) -> Result<(), DatabaseError> {
        self.state.write().await.accounts.remove(user_id);
        Ok(())
    }

    async fn get_paged_account_summaries(
        &self,
        study: &Study,
        search: &AccountSummarySearch,
    ) -> Result<PagedResult<AccountSummary>, DatabaseError> {
        let state = self.state.read().await;
        let mut matches: Vec<&Account> = state
            .accounts
            .values()
            .filter(|a| a.study_id == study.identifier && search.matches(a))
            .collect();
        matches.sort_by(|a, b| b.created_on.cmp(&a.created_on).then_with(|| a.id.cmp(&b.id)));

        let total = matches.len() as i64;
        let items = matches
            .into_iter()
            .skip(search.offset_by.max(0) as usize)
            .take(search.page_size.max(0) as usize)
            .map(AccountSummary::from)
            .collect();
        Ok(PagedResult { items, total })
    }
}

#[async_trait]
impl TemplateDao for MemoryStore {
    async fn get_templates(
        &self,
        study_id: &str,
        template_type: TemplateType,
        offset: i64,
        limit: i64,
        include_deleted: bool,
    ) -> Result<PagedResult<Template>, DatabaseError> {
        let state = self.state.read().await;
        let mut matches: Vec<&Template> = state
            .templates
            .values()
            .filter(|t| t.study_id == study_id && t.template_type == Some(template_type))
            .filter(|t| include_deleted || !t.deleted)
            .collect();
        matches.sort_by(|a, b| b.created_on.cmp(&a.created_on).then_with(|| a.guid.cmp(&b.guid)));

        let total = matches.len() as i64;
        let items = matches
            .into_iter()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect();
        Ok(PagedResult { items, total })
    }

    async fn get_template(&self, study_id: &str, guid: &str) -> Result<Option<Template>, DatabaseError> {
        let state = self.state.read().await;
        Ok(state.templates.get(guid).filter(|t| t.study_id == study_id).cloned())
    }

    async fn create_template(&self, mut template: Template) -> Result<Template, DatabaseError> {
        let mut state = self.state.write().await;
        if state.templates.contains_key(&template.guid) {
            return Err(DatabaseError::Conflict("Template already exists.".to_string()));
        }
        template.version = 1;
        state.templates.insert(template.guid.clone(), template.clone());
        Ok(template)
    }

    async fn update_template(&self, mut template: Template) -> Result<Template, DatabaseError> {
        let mut state = self.state.write().await;
        let existing = state
            .templates
            .get(&template.guid)
            .filter(|t| t.study_id == template.study_id)
            .ok_or_else(|| DatabaseError::not_found("Template"))?;
        if existing.version != template.version {
            return Err(stale("Template"));
        }
        template.created_on = existing.created_on;
        template.version = existing.version + 1;
        state.templates.insert(template.guid.clone(), template.clone());
        Ok(template)
    }

    async fn delete_template_permanently(&self, study_id: &str, guid: &str) -> Result<(), DatabaseError> {
        let mut state = self.state.write().await;
        if state.templates.get(guid).is_some_and(|t| t.study_id == study_id) {
            state.templates.remove(guid);
        }
        Ok(())
    }
}

#[async_trait]
impl UploadSchemaDao for MemoryStore {
    async fn create_schema_revision(
        &self,
        mut schema: UploadSchema,
        rule: NewRevision,
    ) -> Result<UploadSchema, DatabaseError> {
        let study_id = schema
            .study_id
            .clone()
            .ok_or_else(|| DatabaseError::QueryError("upload schema has no study".to_string()))?;
        let mut state = self.state.write().await;

        let counter_key = (study_id.clone(), schema.schema_id.clone());
        let allocated = state.revision_counters.get(&counter_key).copied().unwrap_or(0);

        let revision = match rule {
            NewRevision::Next => NewRevision::successor(allocated)?,
            NewRevision::Exactly(n) if n > allocated => n,
            NewRevision::Exactly(_) => {
                return Err(DatabaseError::Conflict("UploadSchema revision already exists.".to_string()));
            }
            NewRevision::After(expected) => {
                let current = state
                    .revisions(&study_id, &schema.schema_id)
                    .next_back()
                    .map_or(0, |s| s.revision);
                if current != expected {
                    return Err(stale("UploadSchema"));
                }
                NewRevision::successor(allocated)?
            }
        };

        state.revision_counters.insert(counter_key, revision);
        schema.revision = revision;
        schema.deleted = false;
        schema.version = 1;
        state
            .schemas
            .insert((study_id, schema.schema_id.clone(), revision), schema.clone());
        Ok(schema)
    }

    async fn update_schema_revision(&self, mut schema: UploadSchema) -> Result<UploadSchema, DatabaseError> {
        let study_id = schema
            .study_id
            .clone()
            .ok_or_else(|| DatabaseError::QueryError("upload schema has no study".to_string()))?;
        let key = (study_id, schema.schema_id.clone(), schema.revision);
        let mut state = self.state.write().await;

        let existing = state
            .schemas
            .get(&key)
            .filter(|s| !s.deleted)
            .ok_or_else(|| DatabaseError::not_found("UploadSchema"))?;
        if existing.version != schema.version {
            return Err(stale("UploadSchema"));
        }
        schema.deleted = false;
        schema.version = existing.version + 1;
        state.schemas.insert(key, schema.clone());
        Ok(schema)
    }

    async fn get_schema_revision(
        &self,
        study_id: &str,
        schema_id: &str,
        revision: i32,
    ) -> Result<Option<UploadSchema>, DatabaseError> {
        let state = self.state.read().await;
        let key = (study_id.to_string(), schema_id.to_string(), revision);
        Ok(state.schemas.get(&key).cloned())
    }

    async fn get_schema_all_revisions(
        &self,
        study_id: &str,
        schema_id: &str,
        include_deleted: bool,
    ) -> Result<Vec<UploadSchema>, DatabaseError> {
        let state = self.state.read().await;
        Ok(state
            .revisions(study_id, schema_id)
            .rev()
            .filter(|s| include_deleted || !s.deleted)
            .cloned()
            .collect())
    }

    async fn get_schemas_for_study(
        &self,
        study_id: &str,
        include_deleted: bool,
    ) -> Result<Vec<UploadSchema>, DatabaseError> {
        let state = self.state.read().await;
        let mut latest: BTreeMap<&str, &UploadSchema> = BTreeMap::new();
        for ((study, schema_id, _), schema) in &state.schemas {
            if study == study_id && (include_deleted || !schema.deleted) {
                // keys iterate in ascending revision order, so the last write wins
                latest.insert(schema_id.as_str(), schema);
            }
        }
        Ok(latest.into_values().cloned().collect())
    }

    async fn delete_schema_revision(
        &self,
        study_id: &str,
        schema_id: &str,
        revision: i32,
        mode: DeleteMode,
    ) -> Result<(), DatabaseError> {
        let key = (study_id.to_string(), schema_id.to_string(), revision);
        let mut state = self.state.write().await;
        match mode {
            DeleteMode::Logical => match state.schemas.get_mut(&key) {
                Some(schema) if !schema.deleted => {
                    schema.deleted = true;
                    schema.version += 1;
                    Ok(())
                }
                _ => Err(DatabaseError::not_found("UploadSchema")),
            },
            DeleteMode::Permanent => state
                .schemas
                .remove(&key)
                .map(|_| ())
                .ok_or_else(|| DatabaseError::not_found("UploadSchema")),
        }
    }

    async fn delete_all_revisions(
        &self,
        study_id: &str,
        schema_id: &str,
        mode: DeleteMode,
    ) -> Result<(), DatabaseError> {
        let mut state = self.state.write().await;
        let keys: Vec<SchemaKey> = state
            .revisions(study_id, schema_id)
            .filter(|s| mode == DeleteMode::Permanent || !s.deleted)
            .map(|s| (study_id.to_string(), s.schema_id.clone(), s.revision))
            .collect();
        if keys.is_empty() {
            return Err(DatabaseError::not_found("UploadSchema"));
        }

        for key in keys {
            match mode {
                DeleteMode::Logical => {
                    if let Some(schema) = state.schemas.get_mut(&key) {
                        schema.deleted = true;
                        schema.version += 1;
                    }
                }
                DeleteMode::Permanent => {
                    state.schemas.remove(&key);
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl SubpopulationDao for MemoryStore {
    async fn create_subpopulation(&self, mut subpop: Subpopulation) -> Result<Subpopulation, DatabaseError> {
        let mut state = self.state.write().await;
        if state.subpopulations.contains_key(&subpop.guid) {
            return Err(DatabaseError::Conflict("Subpopulation already exists.".to_string()));
        }
        subpop.version = 1;
        state.subpopulations.insert(subpop.guid.clone(), subpop.clone());
        Ok(subpop)
    }

    async fn get_subpopulation(&self, study_id: &str, guid: &str) -> Result<Option<Subpopulation>, DatabaseError> {
        let state = self.state.read().await;
        Ok(state
            .subpopulations
            .get(guid)
            .filter(|s| s.study_id == study_id)
            .cloned())
    }

    async fn get_subpopulations(
        &self,
        study_id: &str,
        include_deleted: bool,
    ) -> Result<Vec<Subpopulation>, DatabaseError> {
        let state = self.state.read().await;
        let mut subpops: Vec<Subpopulation> = state
            .subpopulations
            .values()
            .filter(|s| s.study_id == study_id && (include_deleted || !s.deleted))
            .cloned()
            .collect();
        subpops.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.guid.cmp(&b.guid)));
        Ok(subpops)
    }

    async fn update_subpopulation(&self, mut subpop: Subpopulation) -> Result<Subpopulation, DatabaseError> {
        let mut state = self.state.write().await;
        let existing = state
            .subpopulations
            .get(&subpop.guid)
            .filter(|s| s.study_id == subpop.study_id)
            .ok_or_else(|| DatabaseError::not_found("Subpopulation"))?;
        if existing.version != subpop.version {
            return Err(stale("Subpopulation"));
        }
        subpop.published_consent_created_on = existing.published_consent_created_on;
        subpop.version = existing.version + 1;
        state.subpopulations.insert(subpop.guid.clone(), subpop.clone());
        Ok(subpop)
    }

    async fn delete_subpopulation(&self, study_id: &str, guid: &str) -> Result<(), DatabaseError> {
        let mut state = self.state.write().await;
        match state.subpopulations.get_mut(guid) {
            Some(subpop) if subpop.study_id == study_id && !subpop.deleted => {
                subpop.deleted = true;
                subpop.version += 1;
                Ok(())
            }
            _ => Err(DatabaseError::not_found("Subpopulation")),
        }
    }
}

#[async_trait]
impl StudyConsentDao for MemoryStore {
    async fn add_consent(
        &self,
        subpopulation_guid: &str,
        document_content: String,
        created_on: i64,
    ) -> Result<StudyConsent, DatabaseError> {
        let mut state = self.state.write().await;
        let created_on = match state.consents_for(subpopulation_guid).next_back() {
            Some(latest) if latest.created_on >= created_on => latest.created_on + 1,
            _ => created_on,
        };
        let consent = StudyConsent {
            subpopulation_guid: subpopulation_guid.to_string(),
            created_on,
            active: false,
            document_content,
            version: 1,
        };
        state
            .consents
            .insert((subpopulation_guid.to_string(), created_on), consent.clone());
        Ok(consent)
    }

    async fn get_all_consents(&self, subpopulation_guid: &str) -> Result<Vec<StudyConsent>, DatabaseError> {
        let state = self.state.read().await;
        Ok(state.consents_for(subpopulation_guid).rev().cloned().collect())
    }

    async fn get_consent(
        &self,
        subpopulation_guid: &str,
        created_on: i64,
    ) -> Result<Option<StudyConsent>, DatabaseError> {
        let state = self.state.read().await;
        Ok(state
            .consents
            .get(&(subpopulation_guid.to_string(), created_on))
            .cloned())
    }

    async fn get_most_recent_consent(&self, subpopulation_guid: &str) -> Result<Option<StudyConsent>, DatabaseError> {
        let state = self.state.read().await;
        let consent = state.consents_for(subpopulation_guid).next_back().cloned();
        Ok(consent)
    }

    async fn get_active_consent(&self, subpopulation_guid: &str) -> Result<Option<StudyConsent>, DatabaseError> {
        let state = self.state.read().await;
        let consent = state.consents_for(subpopulation_guid).find(|c| c.active).cloned();
        Ok(consent)
    }

    async fn publish_consent(
        &self,
        study_id: &str,
        subpopulation_guid: &str,
        created_on: i64,
    ) -> Result<StudyConsent, DatabaseError> {
        let mut state = self.state.write().await;
        let target_key = (subpopulation_guid.to_string(), created_on);

        // Validate everything before the first mutation
        if !state
            .subpopulations
            .get(subpopulation_guid)
            .is_some_and(|s| s.study_id == study_id)
        {
            return Err(DatabaseError::not_found("Subpopulation"));
        }
        if !state.consents.contains_key(&target_key) {
            return Err(DatabaseError::not_found("StudyConsent"));
        }

        let previously_active: Vec<(String, i64)> = state
            .consents_for(subpopulation_guid)
            .filter(|c| c.active && c.created_on != created_on)
            .map(|c| (c.subpopulation_guid.clone(), c.created_on))
            .collect();
        for key in previously_active {
            if let Some(consent) = state.consents.get_mut(&key) {
                consent.active = false;
                consent.version += 1;
            }
        }

        let published = match state.consents.get_mut(&target_key) {
            Some(consent) => {
                if !consent.active {
                    consent.active = true;
                    consent.version += 1;
                }
                consent.clone()
            }
            None => return Err(DatabaseError::not_found("StudyConsent")),
        };

        if let Some(subpop) = state.subpopulations.get_mut(subpopulation_guid) {
            subpop.published_consent_created_on = Some(created_on);
            subpop.version += 1;
        }
        Ok(published)
    }
}

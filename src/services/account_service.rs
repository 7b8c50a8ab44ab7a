use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::dao::{AccountDao, AfterPersist, PagedResult};
use crate::database::models::{Account, AccountId, AccountSummary, AccountSummarySearch, Study};
use crate::error::ApiError;
use crate::services::template_service::check_paging;
use crate::types::{Role, RoleSet};

/// Side effects of account creation (welcome or verification messages).
/// Runs inside the create transaction; an error undoes the create.
pub trait AccountNotifier: Send + Sync {
    fn account_created(&self, account: &Account) -> Result<(), ApiError>;
}

/// Records the event in the log instead of sending anything
pub struct TracingNotifier;

impl AccountNotifier for TracingNotifier {
    fn account_created(&self, account: &Account) -> Result<(), ApiError> {
        info!("Account {} created in study {}", account.id, account.study_id);
        Ok(())
    }
}

/// Resolve a participant path segment within `study_id`. Bare values are
/// user ids; `healthcode:`, `externalid:`, `synapseuserid:` and `email:`
/// prefixes select another identifier.
pub fn parse_account_id(study_id: &str, raw: &str) -> AccountId {
    let study = study_id.to_string();
    if let Some((prefix, value)) = raw.split_once(':') {
        let value = value.to_string();
        match prefix.to_ascii_lowercase().as_str() {
            "healthcode" => return AccountId::HealthCode { study, health_code: value },
            "externalid" => return AccountId::ExternalId { study, external_id: value },
            "synapseuserid" => return AccountId::SynapseUserId { study, synapse_user_id: value },
            "email" => return AccountId::Email { study, email: value },
            _ => {}
        }
    }
    AccountId::Id {
        study,
        id: raw.to_string(),
    }
}

fn looks_like_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && domain.contains('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    }
}

pub struct AccountService {
    accounts: Arc<dyn AccountDao>,
    notifier: Arc<dyn AccountNotifier>,
}

impl AccountService {
    pub fn new(accounts: Arc<dyn AccountDao>, notifier: Arc<dyn AccountNotifier>) -> Self {
        Self { accounts, notifier }
    }

    fn validate(account: &Account) -> Result<(), ApiError> {
        let mut errors = BTreeMap::new();
        if !account.has_identifier() {
            errors.insert(
                "identifier".to_string(),
                "email, phone, synapseUserId or externalId is required".to_string(),
            );
        }
        if let Some(email) = &account.email {
            if !looks_like_email(email) {
                errors.insert("email".to_string(), "does not appear to be an email address".to_string());
            }
        }
        if let Some(phone) = &account.phone {
            let digits = phone.canonical_number().trim_start_matches('+').len();
            if !(7..=15).contains(&digits) {
                errors.insert("phone".to_string(), "does not appear to be a phone number".to_string());
            }
            if phone.region_code.trim().is_empty() {
                errors.insert("phone.regionCode".to_string(), "is required".to_string());
            }
        }
        for (field, value) in [("synapseUserId", &account.synapse_user_id), ("externalId", &account.external_id)] {
            if value.as_deref().is_some_and(|v| v.trim().is_empty()) {
                errors.insert(field.to_string(), "cannot be blank".to_string());
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(ApiError::validation_error("StudyParticipant is invalid", Some(errors)))
        }
    }

    /// Roles survive only when an ADMIN assigns them
    fn grantable_roles(requested: RoleSet, caller_roles: RoleSet) -> RoleSet {
        if caller_roles.contains(Role::Admin) {
            requested
        } else {
            RoleSet::empty()
        }
    }

    pub async fn create_account(
        &self,
        study: &Study,
        caller_roles: RoleSet,
        mut account: Account,
    ) -> Result<Account, ApiError> {
        Self::validate(&account)?;

        let now = Utc::now();
        account.id = Uuid::new_v4().simple().to_string();
        account.health_code = Uuid::new_v4().to_string();
        account.study_id = study.identifier.clone();
        account.roles = Self::grantable_roles(account.roles, caller_roles);
        account.created_on = now;
        account.modified_on = now;
        account.email_verified = false;
        account.phone_verified = false;
        account.password_hash = None;
        account.reauth_token_hash = None;

        let notifier = self.notifier.clone();
        let hook = move |created: &Account| notifier.account_created(created);
        let hook: &AfterPersist = &hook;
        let created = self.accounts.create_account(study, account, Some(hook)).await?;
        info!("Created account {} in study {}", created.id, study.identifier);
        Ok(created)
    }

    pub async fn get_account(&self, study: &Study, user_id: &str) -> Result<Account, ApiError> {
        self.accounts
            .get_account(&parse_account_id(&study.identifier, user_id))
            .await?
            .ok_or_else(|| ApiError::entity_not_found("Account"))
    }

    /// Read-modify-write of the editable fields. Identity, health code,
    /// credentials and verification state are kept from the stored account.
    pub async fn update_account(
        &self,
        study: &Study,
        caller_roles: RoleSet,
        user_id: &str,
        changes: Account,
    ) -> Result<Account, ApiError> {
        let existing = self.get_account(study, user_id).await?;

        let roles = if caller_roles.contains(Role::Admin) {
            changes.roles
        } else {
            existing.roles
        };
        let email_verified = existing.email_verified && existing.email == changes.email;
        let phone_verified = existing.phone_verified && existing.phone == changes.phone;
        let merged = Account {
            email: changes.email,
            phone: changes.phone,
            synapse_user_id: changes.synapse_user_id,
            external_id: changes.external_id,
            first_name: changes.first_name,
            last_name: changes.last_name,
            status: changes.status,
            roles,
            email_verified,
            phone_verified,
            ..existing
        };
        Self::validate(&merged)?;

        Ok(self.accounts.update_account(merged, None).await?)
    }

    pub async fn delete_account(&self, study: &Study, user_id: &str) -> Result<(), ApiError> {
        let account = self.get_account(study, user_id).await?;
        self.accounts.delete_account(&account.id).await?;
        info!("Deleted account {} in study {}", account.id, study.identifier);
        Ok(())
    }

    pub async fn get_paged_account_summaries(
        &self,
        study: &Study,
        search: &AccountSummarySearch,
    ) -> Result<PagedResult<AccountSummary>, ApiError> {
        check_paging(search.offset_by, search.page_size)?;
        if let (Some(start), Some(end)) = (search.start_time, search.end_time) {
            if start > end {
                return Err(ApiError::bad_request("startTime should be before endTime"));
            }
        }
        Ok(self.accounts.get_paged_account_summaries(study, search).await?)
    }

    /// Every study where this Synapse user has an account
    pub async fn get_study_ids_for_user(&self, synapse_user_id: &str) -> Result<Vec<String>, ApiError> {
        if synapse_user_id.trim().is_empty() {
            return Err(ApiError::bad_request("Synapse user ID is required"));
        }
        Ok(self.accounts.get_study_ids_for_user(synapse_user_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::MemoryStore;
    use crate::testing::sample_account;

    struct RefusingNotifier;

    impl AccountNotifier for RefusingNotifier {
        fn account_created(&self, _account: &Account) -> Result<(), ApiError> {
            Err(ApiError::service_unavailable("mail relay is down"))
        }
    }

    fn service() -> AccountService {
        AccountService::new(Arc::new(MemoryStore::new()), Arc::new(TracingNotifier))
    }

    fn admin() -> RoleSet {
        RoleSet::of(&[Role::Admin])
    }

    fn researcher() -> RoleSet {
        RoleSet::of(&[Role::Researcher])
    }

    #[test]
    fn prefixes_select_identifier_kind() {
        assert!(matches!(parse_account_id("api", "abc"), AccountId::Id { ref id, .. } if id == "abc"));
        assert!(matches!(
            parse_account_id("api", "healthCode:hc"),
            AccountId::HealthCode { ref health_code, .. } if health_code == "hc"
        ));
        assert!(matches!(
            parse_account_id("api", "externalid:ext-1"),
            AccountId::ExternalId { ref external_id, .. } if external_id == "ext-1"
        ));
        assert!(matches!(parse_account_id("api", "email:a@b.org"), AccountId::Email { .. }));
        assert_eq!(parse_account_id("api", "synapseuserid:7").study(), "api");
    }

    #[tokio::test]
    async fn email_round_trip_then_delete() {
        let svc = service();
        let study = Study::new("api");
        let created = svc
            .create_account(&study, researcher(), sample_account("someone@example.org"))
            .await
            .unwrap();
        assert!(!created.health_code.is_empty());

        let found = svc.get_account(&study, "email:someone@example.org").await.unwrap();
        assert_eq!(found.id, created.id);
        assert_eq!(found.email.as_deref(), Some("someone@example.org"));

        svc.delete_account(&study, &created.id).await.unwrap();
        let gone = svc.get_account(&study, "email:someone@example.org").await.unwrap_err();
        assert!(matches!(gone, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn account_needs_an_identifier_and_a_real_email() {
        let svc = service();
        let study = Study::new("api");
        let mut nameless = sample_account("x@example.org");
        nameless.email = None;
        assert!(svc.create_account(&study, researcher(), nameless).await.is_err());

        let bad = svc
            .create_account(&study, researcher(), sample_account("not-an-email"))
            .await
            .unwrap_err();
        assert_eq!(bad.to_json()["errors"]["email"], "does not appear to be an email address");
    }

    #[tokio::test]
    async fn only_admins_assign_roles() {
        let svc = service();
        let study = Study::new("api");

        let mut wants_admin = sample_account("a@example.org");
        wants_admin.roles = admin();
        let created = svc.create_account(&study, researcher(), wants_admin.clone()).await.unwrap();
        assert!(created.roles.is_empty());

        wants_admin.email = Some("b@example.org".to_string());
        let created = svc.create_account(&study, admin(), wants_admin).await.unwrap();
        assert!(created.roles.contains(Role::Admin));
    }

    #[tokio::test]
    async fn failing_notifier_leaves_no_account() {
        let svc = AccountService::new(Arc::new(MemoryStore::new()), Arc::new(RefusingNotifier));
        let study = Study::new("api");
        let err = svc
            .create_account(&study, researcher(), sample_account("someone@example.org"))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::ServiceUnavailable(ref m) if m == "mail relay is down"));

        let page = svc
            .get_paged_account_summaries(&study, &AccountSummarySearch::default())
            .await
            .unwrap();
        assert_eq!(page.total, 0);
    }

    #[tokio::test]
    async fn update_keeps_identity_and_bumps_version() {
        let svc = service();
        let study = Study::new("api");
        let created = svc
            .create_account(&study, researcher(), sample_account("someone@example.org"))
            .await
            .unwrap();

        let mut changes = created.clone();
        changes.first_name = Some("Pat".to_string());
        changes.health_code = "forged".to_string();
        let updated = svc.update_account(&study, researcher(), &created.id, changes).await.unwrap();
        assert_eq!(updated.first_name.as_deref(), Some("Pat"));
        assert_eq!(updated.health_code, created.health_code);
        assert_eq!(updated.version, created.version + 1);
    }

    #[tokio::test]
    async fn summaries_validate_paging_and_time_range() {
        let svc = service();
        let study = Study::new("api");
        let tiny = AccountSummarySearch {
            page_size: 2,
            ..Default::default()
        };
        assert!(svc.get_paged_account_summaries(&study, &tiny).await.is_err());

        let now = Utc::now();
        let backwards = AccountSummarySearch {
            start_time: Some(now),
            end_time: Some(now - chrono::Duration::hours(1)),
            ..Default::default()
        };
        assert!(svc.get_paged_account_summaries(&study, &backwards).await.is_err());
    }

    #[tokio::test]
    async fn synapse_lookup_spans_studies() {
        let svc = service();
        for study_id in ["beta", "alpha"] {
            let mut account = sample_account(&format!("user@{}.org", study_id));
            account.synapse_user_id = Some("12345".to_string());
            svc.create_account(&Study::new(study_id), researcher(), account)
                .await
                .unwrap();
        }
        assert_eq!(
            svc.get_study_ids_for_user("12345").await.unwrap(),
            vec!["alpha".to_string(), "beta".to_string()]
        );
        assert!(svc.get_study_ids_for_user("999").await.unwrap().is_empty());
    }
}

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use tracing::warn;

use super::{missing_or_stale, PgStore};
use crate::dao::{AccountDao, AfterPersist, PagedResult};
use crate::database::manager::DatabaseError;
use crate::database::models::{
    Account, AccountId, AccountStatus, AccountSummary, AccountSummarySearch, Phone, Study, MIGRATION_VERSION,
};
use crate::database::query_builder::AccountSearchQuery;
use crate::types::RoleSet;

const ACCOUNT_COLUMNS: &str = "id, study_id, email, phone_number, phone_region, health_code, synapse_user_id, \
     external_id, first_name, last_name, status, roles, email_verified, phone_verified, password_hash, \
     reauth_token_hash, migration_version, created_on, modified_on, version";

#[derive(Debug, FromRow)]
struct AccountRow {
    id: String,
    study_id: String,
    email: Option<String>,
    phone_number: Option<String>,
    phone_region: Option<String>,
    health_code: String,
    synapse_user_id: Option<String>,
    external_id: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
    status: String,
    roles: i32,
    email_verified: bool,
    phone_verified: bool,
    password_hash: Option<String>,
    reauth_token_hash: Option<String>,
    migration_version: i32,
    created_on: DateTime<Utc>,
    modified_on: DateTime<Utc>,
    version: i64,
}

#[derive(Debug, FromRow)]
struct AccountSummaryRow {
    id: String,
    study_id: String,
    first_name: Option<String>,
    last_name: Option<String>,
    email: Option<String>,
    phone_number: Option<String>,
    phone_region: Option<String>,
    synapse_user_id: Option<String>,
    external_id: Option<String>,
    created_on: DateTime<Utc>,
    status: String,
}

fn phone_from_columns(number: Option<String>, region: Option<String>) -> Option<Phone> {
    number.map(|number| Phone {
        number,
        region_code: region.unwrap_or_default(),
    })
}

fn parse_status(raw: &str, id: &str) -> AccountStatus {
    raw.parse().unwrap_or_else(|_| {
        warn!("Account {} has unknown status '{}'", id, raw);
        AccountStatus::default()
    })
}

impl From<AccountRow> for Account {
    fn from(row: AccountRow) -> Self {
        let status = parse_status(&row.status, &row.id);
        Self {
            phone: phone_from_columns(row.phone_number, row.phone_region),
            id: row.id,
            study_id: row.study_id,
            email: row.email,
            health_code: row.health_code,
            synapse_user_id: row.synapse_user_id,
            external_id: row.external_id,
            first_name: row.first_name,
            last_name: row.last_name,
            status,
            roles: RoleSet::from_bits(row.roles),
            email_verified: row.email_verified,
            phone_verified: row.phone_verified,
            created_on: row.created_on,
            modified_on: row.modified_on,
            password_hash: row.password_hash,
            reauth_token_hash: row.reauth_token_hash,
            migration_version: row.migration_version,
            version: row.version,
        }
    }
}

impl From<AccountSummaryRow> for AccountSummary {
    fn from(row: AccountSummaryRow) -> Self {
        let status = parse_status(&row.status, &row.id);
        Self {
            phone: phone_from_columns(row.phone_number, row.phone_region),
            id: row.id,
            first_name: row.first_name,
            last_name: row.last_name,
            email: row.email,
            synapse_user_id: row.synapse_user_id,
            external_id: row.external_id,
            created_on: row.created_on,
            status,
            study_identifier: row.study_id,
        }
    }
}

fn conflict_message() -> String {
    "Account with this identifier already exists.".to_string()
}

#[async_trait]
impl AccountDao for PgStore {
    async fn get_study_ids_for_user(&self, synapse_user_id: &str) -> Result<Vec<String>, DatabaseError> {
        let ids = sqlx::query_scalar::<_, String>(
            "SELECT DISTINCT study_id FROM accounts WHERE synapse_user_id = $1 ORDER BY study_id",
        )
        .bind(synapse_user_id)
        .fetch_all(self.pool())
        .await?;
        Ok(ids)
    }

    async fn create_account(
        &self,
        study: &Study,
        mut account: Account,
        after_persist: Option<&AfterPersist>,
    ) -> Result<Account, DatabaseError> {
        account.study_id = study.identifier.clone();
        account.modified_on = Utc::now();
        account.migration_version = MIGRATION_VERSION;
        account.version = 1;

        let mut tx = self.pool().begin().await?;
        let sql = format!(
            "INSERT INTO accounts ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19, $20)",
            ACCOUNT_COLUMNS
        );
        sqlx::query(&sql)
            .bind(&account.id)
            .bind(&account.study_id)
            .bind(&account.email)
            .bind(account.phone.as_ref().map(|p| p.canonical_number()))
            .bind(account.phone.as_ref().map(|p| p.region_code.clone()))
            .bind(&account.health_code)
            .bind(&account.synapse_user_id)
            .bind(&account.external_id)
            .bind(&account.first_name)
            .bind(&account.last_name)
            .bind(account.status.as_str())
            .bind(account.roles.bits())
            .bind(account.email_verified)
            .bind(account.phone_verified)
            .bind(&account.password_hash)
            .bind(&account.reauth_token_hash)
            .bind(account.migration_version)
            .bind(account.created_on)
            .bind(account.modified_on)
            .bind(account.version)
            .execute(&mut *tx)
            .await
            .map_err(|e| DatabaseError::from_insert(e, conflict_message))?;

        if let Some(hook) = after_persist {
            // Dropping `tx` without commit rolls the insert back
            hook(&account).map_err(|e| DatabaseError::AfterPersist(Box::new(e)))?;
        }
        tx.commit().await?;
        Ok(account)
    }

    async fn update_account(
        &self,
        account: Account,
        after_persist: Option<&AfterPersist>,
    ) -> Result<Account, DatabaseError> {
        let mut tx = self.pool().begin().await?;
        let sql = format!(
            "UPDATE accounts SET email = $2, phone_number = $3, phone_region = $4, health_code = $5, \
             synapse_user_id = $6, external_id = $7, first_name = $8, last_name = $9, status = $10, \
             roles = $11, email_verified = $12, phone_verified = $13, password_hash = $14, \
             reauth_token_hash = $15, migration_version = $16, modified_on = $17, version = version + 1 \
             WHERE id = $1 AND version = $18 RETURNING {}",
            ACCOUNT_COLUMNS
        );
        let row = sqlx::query_as::<_, AccountRow>(&sql)
            .bind(&account.id)
            .bind(&account.email)
            .bind(account.phone.as_ref().map(|p| p.canonical_number()))
            .bind(account.phone.as_ref().map(|p| p.region_code.clone()))
            .bind(&account.health_code)
            .bind(&account.synapse_user_id)
            .bind(&account.external_id)
            .bind(&account.first_name)
            .bind(&account.last_name)
            .bind(account.status.as_str())
            .bind(account.roles.bits())
            .bind(account.email_verified)
            .bind(account.phone_verified)
            .bind(&account.password_hash)
            .bind(&account.reauth_token_hash)
            .bind(MIGRATION_VERSION)
            .bind(Utc::now())
            .bind(account.version)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| DatabaseError::from_insert(e, conflict_message))?;

        let Some(row) = row else {
            let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM accounts WHERE id = $1)")
                .bind(&account.id)
                .fetch_one(&mut *tx)
                .await?;
            return Err(missing_or_stale(exists, "Account"));
        };

        let updated = Account::from(row);
        if let Some(hook) = after_persist {
            hook(&updated).map_err(|e| DatabaseError::AfterPersist(Box::new(e)))?;
        }
        tx.commit().await?;
        Ok(updated)
    }

    async fn get_account(&self, account_id: &AccountId) -> Result<Option<Account>, DatabaseError> {
        let (clause, value) = match account_id {
            AccountId::Id { id, .. } => ("id = $2", id.clone()),
            AccountId::Email { email, .. } => ("lower(email) = lower($2)", email.clone()),
            AccountId::Phone { phone, .. } => ("phone_number = $2", phone.canonical_number()),
            AccountId::HealthCode { health_code, .. } => ("health_code = $2", health_code.clone()),
            AccountId::SynapseUserId { synapse_user_id, .. } => ("synapse_user_id = $2", synapse_user_id.clone()),
            AccountId::ExternalId { external_id, .. } => ("external_id = $2", external_id.clone()),
        };
        let sql = format!("SELECT {} FROM accounts WHERE study_id = $1 AND {}", ACCOUNT_COLUMNS, clause);

        let row = sqlx::query_as::<_, AccountRow>(&sql)
            .bind(account_id.study())
            .bind(value)
            .fetch_optional(self.pool())
            .await?;
        Ok(row.map(Account::from))
    }

    async fn delete_account(&self, user_id: &str) -> Result<(), DatabaseError> {
        // Credential material lives on the row itself
        sqlx::query("DELETE FROM accounts WHERE id = $1")
            .bind(user_id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    async fn get_paged_account_summaries(
        &self,
        study: &Study,
        search: &AccountSummarySearch,
    ) -> Result<PagedResult<AccountSummary>, DatabaseError> {
        let query = AccountSearchQuery::new(&study.identifier, search);
        let total = query.count(self.pool()).await?;
        let rows: Vec<AccountSummaryRow> = query.select_page(self.pool()).await?;
        Ok(PagedResult {
            items: rows.into_iter().map(AccountSummary::from).collect(),
            total,
        })
    }
}

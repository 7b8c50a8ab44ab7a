use async_trait::async_trait;

use super::PagedResult;
use crate::database::manager::DatabaseError;
use crate::database::models::{Account, AccountId, AccountSummary, AccountSummarySearch, Study};
use crate::error::ApiError;

/// Side effect run after an account write, inside the write's transaction.
/// Returning `Err` rolls the write back and the error reaches the caller as-is.
pub type AfterPersist = dyn Fn(&Account) -> Result<(), ApiError> + Send + Sync;

#[async_trait]
pub trait AccountDao: Send + Sync {
    /// Identifiers of every study holding an account with this Synapse user ID,
    /// sorted ascending. Empty when there is no match.
    async fn get_study_ids_for_user(&self, synapse_user_id: &str) -> Result<Vec<String>, DatabaseError>;

    /// Insert a new account into `study`. Colliding identifiers yield `Conflict`.
    async fn create_account(
        &self,
        study: &Study,
        account: Account,
        after_persist: Option<&AfterPersist>,
    ) -> Result<Account, DatabaseError>;

    /// Save changes to an existing account, checking `version`.
    /// `NotFound` if the account is gone, `ConcurrentModification` on a stale version.
    async fn update_account(
        &self,
        account: Account,
        after_persist: Option<&AfterPersist>,
    ) -> Result<Account, DatabaseError>;

    async fn get_account(&self, account_id: &AccountId) -> Result<Option<Account>, DatabaseError>;

    /// Remove the account and its credentials. Unknown ids are not an error.
    async fn delete_account(&self, user_id: &str) -> Result<(), DatabaseError>;

    /// Newest accounts first
    async fn get_paged_account_summaries(
        &self,
        study: &Study,
        search: &AccountSummarySearch,
    ) -> Result<PagedResult<AccountSummary>, DatabaseError>;
}

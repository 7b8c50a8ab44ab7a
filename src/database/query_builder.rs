use sqlx::{postgres::PgRow, FromRow, PgPool, Postgres, QueryBuilder};

use crate::database::manager::DatabaseError;
use crate::database::models::AccountSummarySearch;
use crate::types::RoleSet;

/// Columns read for account summaries, in `AccountSummaryRow` order
pub const SUMMARY_COLUMNS: &str = "id, study_id, first_name, last_name, email, phone_number, phone_region, \
     synapse_user_id, external_id, created_on, status";

/// Builds the filtered account listing for one study. Every user-supplied
/// value goes through a bind parameter.
pub struct AccountSearchQuery<'a> {
    study_id: &'a str,
    search: &'a AccountSummarySearch,
}

impl<'a> AccountSearchQuery<'a> {
    pub fn new(study_id: &'a str, search: &'a AccountSummarySearch) -> Self {
        Self { study_id, search }
    }

    fn push_where(&self, qb: &mut QueryBuilder<'static, Postgres>) {
        qb.push(" WHERE study_id = ").push_bind(self.study_id.to_string());

        if let Some(filter) = &self.search.email_filter {
            qb.push(" AND email ILIKE ").push_bind(like_pattern(filter));
        }
        if let Some(filter) = &self.search.phone_filter {
            qb.push(" AND phone_number ILIKE ").push_bind(like_pattern(filter));
        }
        if let Some(role) = self.search.role {
            qb.push(" AND (roles & ")
                .push_bind(RoleSet::of(&[role]).bits())
                .push(") <> 0");
        }
        if let Some(status) = self.search.status {
            qb.push(" AND status = ").push_bind(status.as_str().to_string());
        }
        if let Some(start) = self.search.start_time {
            qb.push(" AND created_on >= ").push_bind(start);
        }
        if let Some(end) = self.search.end_time {
            qb.push(" AND created_on <= ").push_bind(end);
        }
    }

    pub fn count_query(&self) -> QueryBuilder<'static, Postgres> {
        let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM accounts");
        self.push_where(&mut qb);
        qb
    }

    pub fn page_query(&self) -> QueryBuilder<'static, Postgres> {
        let mut qb = QueryBuilder::new(format!("SELECT {} FROM accounts", SUMMARY_COLUMNS));
        self.push_where(&mut qb);
        qb.push(" ORDER BY created_on DESC, id LIMIT ")
            .push_bind(self.search.page_size)
            .push(" OFFSET ")
            .push_bind(self.search.offset_by);
        qb
    }

    pub async fn count(&self, pool: &PgPool) -> Result<i64, DatabaseError> {
        let mut qb = self.count_query();
        let total: i64 = qb.build_query_scalar().fetch_one(pool).await?;
        Ok(total)
    }

    pub async fn select_page<T>(&self, pool: &PgPool) -> Result<Vec<T>, DatabaseError>
    where
        T: for<'r> FromRow<'r, PgRow> + Send + Unpin,
    {
        let mut qb = self.page_query();
        let rows = qb.build_query_as::<T>().fetch_all(pool).await?;
        Ok(rows)
    }
}

/// Case-insensitive substring pattern with LIKE metacharacters escaped
fn like_pattern(filter: &str) -> String {
    let escaped = filter
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

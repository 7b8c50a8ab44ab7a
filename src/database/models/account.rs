use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::types::{Role, RoleSet};

/// Schema migration version stamped on every account write
pub const MIGRATION_VERSION: i32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Enabled,
    Disabled,
    #[default]
    Unverified,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Enabled => "enabled",
            AccountStatus::Disabled => "disabled",
            AccountStatus::Unverified => "unverified",
        }
    }
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "enabled" => Ok(AccountStatus::Enabled),
            "disabled" => Ok(AccountStatus::Disabled),
            "unverified" => Ok(AccountStatus::Unverified),
            other => Err(format!("unknown account status '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Phone {
    pub number: String,
    pub region_code: String,
}

impl Phone {
    /// Digits only, with a leading `+` kept. Lookups and uniqueness use this form.
    pub fn canonical_number(&self) -> String {
        let trimmed = self.number.trim();
        let digits: String = trimmed.chars().filter(|c| c.is_ascii_digit()).collect();
        if trimmed.starts_with('+') {
            format!("+{}", digits)
        } else {
            digits
        }
    }
}

/// A participant or staff account within one study
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing)]
    pub study_id: String,
    pub email: Option<String>,
    pub phone: Option<Phone>,
    #[serde(default)]
    pub health_code: String,
    pub synapse_user_id: Option<String>,
    pub external_id: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    #[serde(default)]
    pub status: AccountStatus,
    #[serde(default)]
    pub roles: RoleSet,
    #[serde(default)]
    pub email_verified: bool,
    #[serde(default)]
    pub phone_verified: bool,
    #[serde(default)]
    pub created_on: DateTime<Utc>,
    #[serde(default)]
    pub modified_on: DateTime<Utc>,
    #[serde(skip)]
    pub password_hash: Option<String>,
    #[serde(skip)]
    pub reauth_token_hash: Option<String>,
    #[serde(skip)]
    pub migration_version: i32,
    #[serde(default)]
    pub version: i64,
}

impl Account {
    pub fn has_identifier(&self) -> bool {
        self.email.is_some()
            || self.phone.is_some()
            || self.synapse_user_id.is_some()
            || self.external_id.is_some()
    }
}

/// Lightweight projection used by paged participant listings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountSummary {
    pub id: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<Phone>,
    pub synapse_user_id: Option<String>,
    pub external_id: Option<String>,
    pub created_on: DateTime<Utc>,
    pub status: AccountStatus,
    pub study_identifier: String,
}

impl From<&Account> for AccountSummary {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id.clone(),
            first_name: account.first_name.clone(),
            last_name: account.last_name.clone(),
            email: account.email.clone(),
            phone: account.phone.clone(),
            synapse_user_id: account.synapse_user_id.clone(),
            external_id: account.external_id.clone(),
            created_on: account.created_on,
            status: account.status,
            study_identifier: account.study_id.clone(),
        }
    }
}

/// One way of naming a single account. Every variant carries the study
/// it is resolved in, so a lookup can never cross study boundaries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountId {
    Id { study: String, id: String },
    Email { study: String, email: String },
    Phone { study: String, phone: Phone },
    HealthCode { study: String, health_code: String },
    SynapseUserId { study: String, synapse_user_id: String },
    ExternalId { study: String, external_id: String },
}

impl AccountId {
    pub fn study(&self) -> &str {
        match self {
            AccountId::Id { study, .. }
            | AccountId::Email { study, .. }
            | AccountId::Phone { study, .. }
            | AccountId::HealthCode { study, .. }
            | AccountId::SynapseUserId { study, .. }
            | AccountId::ExternalId { study, .. } => study,
        }
    }

    /// True if `account` is the one this identifier names
    pub fn matches(&self, account: &Account) -> bool {
        if account.study_id != self.study() {
            return false;
        }
        match self {
            AccountId::Id { id, .. } => &account.id == id,
            AccountId::Email { email, .. } => account
                .email
                .as_deref()
                .is_some_and(|e| e.eq_ignore_ascii_case(email)),
            AccountId::Phone { phone, .. } => account
                .phone
                .as_ref()
                .is_some_and(|p| p.canonical_number() == phone.canonical_number()),
            AccountId::HealthCode { health_code, .. } => &account.health_code == health_code,
            AccountId::SynapseUserId { synapse_user_id, .. } => {
                account.synapse_user_id.as_ref() == Some(synapse_user_id)
            }
            AccountId::ExternalId { external_id, .. } => {
                account.external_id.as_ref() == Some(external_id)
            }
        }
    }
}

/// Filter and paging parameters for account summary listings
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountSummarySearch {
    pub offset_by: i64,
    pub page_size: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_filter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_filter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<AccountStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
}

impl Default for AccountSummarySearch {
    fn default() -> Self {
        Self {
            offset_by: 0,
            page_size: 50,
            email_filter: None,
            phone_filter: None,
            role: None,
            status: None,
            start_time: None,
            end_time: None,
        }
    }
}

impl AccountSummarySearch {
    /// In-memory evaluation of the filter part of the search
    pub fn matches(&self, account: &Account) -> bool {
        if let Some(filter) = &self.email_filter {
            let needle = filter.to_lowercase();
            let hit = account
                .email
                .as_deref()
                .is_some_and(|e| e.to_lowercase().contains(&needle));
            if !hit {
                return false;
            }
        }
        if let Some(filter) = &self.phone_filter {
            let needle = filter.to_lowercase();
            let hit = account
                .phone
                .as_ref()
                .is_some_and(|p| p.canonical_number().to_lowercase().contains(&needle));
            if !hit {
                return false;
            }
        }
        if let Some(role) = self.role {
            if !account.roles.contains(role) {
                return false;
            }
        }
        if let Some(status) = self.status {
            if account.status != status {
                return false;
            }
        }
        if let Some(start) = self.start_time {
            if account.created_on < start {
                return false;
            }
        }
        if let Some(end) = self.end_time {
            if account.created_on > end {
                return false;
            }
        }
        true
    }
}

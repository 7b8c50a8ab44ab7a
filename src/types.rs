//! Shared types used across the codebase

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// Roles a caller may hold within a study session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Developer,
    Researcher,
    Admin,
    Worker,
    Superadmin,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::Developer,
        Role::Researcher,
        Role::Admin,
        Role::Worker,
        Role::Superadmin,
    ];

    fn bit(self) -> u8 {
        1 << (self as u8)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Developer => "developer",
            Role::Researcher => "researcher",
            Role::Admin => "admin",
            Role::Worker => "worker",
            Role::Superadmin => "superadmin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Role::ALL
            .into_iter()
            .find(|r| r.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown role '{}'", s))
    }
}

/// Fixed-size set of roles, stored as a bitset.
/// Serializes as a sorted list of role names.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RoleSet(u8);

impl RoleSet {
    pub const fn empty() -> Self {
        RoleSet(0)
    }

    pub fn of(roles: &[Role]) -> Self {
        roles.iter().copied().collect()
    }

    pub fn insert(&mut self, role: Role) {
        self.0 |= role.bit();
    }

    pub fn contains(&self, role: Role) -> bool {
        self.0 & role.bit() != 0
    }

    pub fn intersects(&self, other: RoleSet) -> bool {
        self.0 & other.0 != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = Role> + '_ {
        Role::ALL.into_iter().filter(move |r| self.contains(*r))
    }

    /// Raw bit pattern, as persisted in the `roles` column
    pub fn bits(&self) -> i32 {
        self.0 as i32
    }

    /// Rebuild from a persisted bit pattern, ignoring unknown bits
    pub fn from_bits(bits: i32) -> Self {
        let mask = Role::ALL.iter().fold(0u8, |acc, r| acc | r.bit());
        RoleSet((bits as u8) & mask)
    }
}

impl FromIterator<Role> for RoleSet {
    fn from_iter<I: IntoIterator<Item = Role>>(iter: I) -> Self {
        let mut set = RoleSet::empty();
        for role in iter {
            set.insert(role);
        }
        set
    }
}

impl fmt::Debug for RoleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl Serialize for RoleSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

impl<'de> Deserialize<'de> for RoleSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let roles = Vec::<Role>::deserialize(deserializer)?;
        Ok(roles.into_iter().collect())
    }
}

/// How a delete request is applied by a store.
/// Stores never look at roles; the caller picks the mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteMode {
    /// Flag the resource deleted; it stays readable with `includeDeleted`
    Logical,
    /// Remove the rows
    Permanent,
}

impl DeleteMode {
    /// Permanent deletion is only honoured for ADMIN callers. Anyone else
    /// asking for it gets a logical delete instead of an error.
    pub fn effective(permanent_requested: bool, roles: RoleSet) -> Self {
        if permanent_requested && roles.contains(Role::Admin) {
            DeleteMode::Permanent
        } else {
            DeleteMode::Logical
        }
    }
}

/// Epoch-millisecond timestamps carried on the wire as ISO-8601 UTC
/// strings with millisecond precision, e.g. `2019-03-01T17:04:05.123Z`.
pub mod iso_millis {
    use chrono::{DateTime, SecondsFormat, TimeZone, Utc};
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

    pub fn format(millis: i64) -> String {
        match Utc.timestamp_millis_opt(millis).single() {
            Some(dt) => dt.to_rfc3339_opts(SecondsFormat::Millis, true),
            None => millis.to_string(),
        }
    }

    pub fn parse(value: &str) -> Result<i64, String> {
        DateTime::parse_from_rfc3339(value.trim())
            .map(|dt| dt.timestamp_millis())
            .map_err(|_| format!("'{}' is not a valid ISO 8601 timestamp", value))
    }

    pub fn serialize<S: Serializer>(millis: &i64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format(*millis))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).map_err(D::Error::custom)
    }

    pub mod option {
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(millis: &Option<i64>, serializer: S) -> Result<S::Ok, S::Error> {
            match millis {
                Some(ms) => super::serialize(ms, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<i64>, D::Error> {
            let raw = Option::<String>::deserialize(deserializer)?;
            raw.map(|s| super::parse(&s).map_err(serde::de::Error::custom))
                .transpose()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iso_millis_keeps_millisecond_precision() {
        let ms = 1_551_459_845_123;
        let text = iso_millis::format(ms);
        assert_eq!(text, "2019-03-01T17:04:05.123Z");
        assert_eq!(iso_millis::parse(&text), Ok(ms));
        assert_eq!(iso_millis::parse("2019-03-01T09:04:05.123-08:00"), Ok(ms));
        assert!(iso_millis::parse("yesterday").is_err());
    }

    #[test]
    fn role_set_intersection() {
        let caller = RoleSet::of(&[Role::Developer]);
        assert!(caller.intersects(RoleSet::of(&[Role::Developer, Role::Admin])));
        assert!(!caller.intersects(RoleSet::of(&[Role::Worker])));
        assert!(!RoleSet::empty().intersects(caller));
    }

    #[test]
    fn role_set_bits_survive_persistence() {
        let set = RoleSet::of(&[Role::Admin, Role::Worker]);
        assert_eq!(RoleSet::from_bits(set.bits()), set);
        assert_eq!(RoleSet::from_bits(0x80 | set.bits()), set);
    }

    #[test]
    fn role_set_json_is_a_list_of_names() {
        let set = RoleSet::of(&[Role::Researcher, Role::Developer]);
        let json = serde_json::to_value(set).unwrap();
        assert_eq!(json, serde_json::json!(["developer", "researcher"]));

        let back: RoleSet = serde_json::from_value(json).unwrap();
        assert_eq!(back, set);
    }

    #[test]
    fn permanent_delete_downgrades_without_admin() {
        let developer = RoleSet::of(&[Role::Developer]);
        let admin = RoleSet::of(&[Role::Developer, Role::Admin]);

        assert_eq!(DeleteMode::effective(true, developer), DeleteMode::Logical);
        assert_eq!(DeleteMode::effective(true, admin), DeleteMode::Permanent);
        assert_eq!(DeleteMode::effective(false, admin), DeleteMode::Logical);
    }
}

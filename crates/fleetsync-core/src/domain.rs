//! Configuration domains synchronized across the fleet.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::RowError;

/// One category of synchronized configuration.
///
/// The wire name (see [`Domain::as_str`]) is the `name` column of the
/// checksum rows peers advertise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    AdminVariables,
    MysqlVariables,
    LdapVariables,
    MysqlQueryRules,
    MysqlServers,
    MysqlUsers,
    ProxysqlServers,
}

impl Domain {
    /// Every domain, in the order used to fold the global checksum.
    pub const ALL: [Domain; 7] = [
        Domain::AdminVariables,
        Domain::MysqlQueryRules,
        Domain::MysqlServers,
        Domain::MysqlUsers,
        Domain::MysqlVariables,
        Domain::ProxysqlServers,
        Domain::LdapVariables,
    ];

    /// Number of domains.
    pub const COUNT: usize = Self::ALL.len();

    pub const fn as_str(&self) -> &'static str {
        match self {
            Domain::AdminVariables => "admin_variables",
            Domain::MysqlVariables => "mysql_variables",
            Domain::LdapVariables => "ldap_variables",
            Domain::MysqlQueryRules => "mysql_query_rules",
            Domain::MysqlServers => "mysql_servers",
            Domain::MysqlUsers => "mysql_users",
            Domain::ProxysqlServers => "proxysql_servers",
        }
    }

    /// Dense index into per-domain arrays.
    pub const fn index(&self) -> usize {
        match self {
            Domain::AdminVariables => 0,
            Domain::MysqlQueryRules => 1,
            Domain::MysqlServers => 2,
            Domain::MysqlUsers => 3,
            Domain::MysqlVariables => 4,
            Domain::ProxysqlServers => 5,
            Domain::LdapVariables => 6,
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Domain {
    type Err = RowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Domain::ALL
            .iter()
            .copied()
            .find(|d| d.as_str() == s)
            .ok_or_else(|| RowError::UnknownDomain(s.to_string()))
    }
}

/// A fixed-size table holding one value per domain.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PerDomain<T>(pub [T; Domain::COUNT]);

impl<T> PerDomain<T> {
    pub fn from_fn(mut f: impl FnMut(Domain) -> T) -> Self {
        Self(std::array::from_fn(|i| f(Domain::ALL[i])))
    }

    pub fn get(&self, domain: Domain) -> &T {
        &self.0[domain.index()]
    }

    pub fn get_mut(&mut self, domain: Domain) -> &mut T {
        &mut self.0[domain.index()]
    }

    /// Iterate `(domain, value)` in [`Domain::ALL`] order.
    pub fn iter(&self) -> impl Iterator<Item = (Domain, &T)> {
        Domain::ALL.iter().map(move |d| (*d, self.get(*d)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_matches_all_order() {
        for (i, d) in Domain::ALL.iter().enumerate() {
            assert_eq!(d.index(), i);
        }
    }

    #[test]
    fn test_wire_name_roundtrip() {
        for d in Domain::ALL {
            assert_eq!(d.as_str().parse::<Domain>().unwrap(), d);
        }
        assert!("mysql_galera".parse::<Domain>().is_err());
    }

    #[test]
    fn test_serde_uses_wire_names() {
        let json = serde_json::to_string(&Domain::MysqlQueryRules).unwrap();
        assert_eq!(json, "\"mysql_query_rules\"");
    }

    #[test]
    fn test_per_domain_lookup() {
        let table = PerDomain::from_fn(|d| d.as_str().len());
        assert_eq!(*table.get(Domain::MysqlUsers), "mysql_users".len());
        assert_eq!(table.iter().count(), Domain::COUNT);
    }
}

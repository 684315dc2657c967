//! The unit of configuration moved between peers and the local store.

use serde::{Deserialize, Serialize};

use fleetsync_core::{Checksum, Domain, ResultSet};

/// A result set labelled with the table it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedTable {
    pub name: String,
    pub result: ResultSet,
}

/// The full content of one domain, as a list of tables.
///
/// A payload is always applied as a whole.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainPayload {
    pub domain: Domain,
    pub tables: Vec<NamedTable>,
}

impl DomainPayload {
    pub fn new(domain: Domain) -> Self {
        Self {
            domain,
            tables: Vec::new(),
        }
    }

    pub fn with_table(mut self, name: impl Into<String>, result: ResultSet) -> Self {
        self.push_table(name, result);
        self
    }

    pub fn push_table(&mut self, name: impl Into<String>, result: ResultSet) {
        self.tables.push(NamedTable {
            name: name.into(),
            result,
        });
    }

    pub fn table(&self, name: &str) -> Option<&ResultSet> {
        self.tables
            .iter()
            .find(|t| t.name == name)
            .map(|t| &t.result)
    }

    /// Total row count across tables.
    pub fn row_count(&self) -> usize {
        self.tables.iter().map(|t| t.result.len()).sum()
    }

    /// Content checksum, in table order.
    pub fn checksum(&self) -> Checksum {
        Checksum::of_tables(self.tables.iter().map(|t| (t.name.as_str(), &t.result)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetsync_core::Row;

    #[test]
    fn test_checksum_depends_on_rows() {
        let rules = ResultSet::new(["rule_id", "match_pattern"])
            .with_row(Row::from_values(["1", "^SELECT"]));
        let a = DomainPayload::new(Domain::MysqlQueryRules).with_table("mysql_query_rules", rules.clone());
        let b = DomainPayload::new(Domain::MysqlQueryRules)
            .with_table("mysql_query_rules", rules.with_row(Row::from_values(["2", "^UPDATE"])));
        assert_ne!(a.checksum(), b.checksum());
        assert_eq!(a.checksum(), a.clone().checksum());
        assert_eq!(b.row_count(), 2);
    }

    #[test]
    fn test_table_lookup() {
        let payload = DomainPayload::new(Domain::MysqlUsers)
            .with_table("mysql_users", ResultSet::new(["username"]))
            .with_table("mysql_ldap_mapping", ResultSet::new(["priority"]));
        assert!(payload.table("mysql_ldap_mapping").is_some());
        assert!(payload.table("mysql_servers").is_none());
    }
}

//! Allow/deny filtering of Fact and Check units by short name

use crate::catalog::Catalog;
use crate::facts::FactTable;
use std::collections::BTreeSet;
use tracing::debug;

/// Fact holding the names to keep
pub const ALLOW_LIST: &str = "allow_list";

/// Fact holding the names to drop
pub const DENY_LIST: &str = "deny_list";

/// Case-insensitive unit name filter
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameFilter {
    allow: Option<BTreeSet<String>>,
    deny: BTreeSet<String>,
}

impl NameFilter {
    pub fn new<A, D>(allow: Option<A>, deny: D) -> Self
    where
        A: IntoIterator,
        A::Item: AsRef<str>,
        D: IntoIterator,
        D::Item: AsRef<str>,
    {
        Self {
            allow: allow.map(|names| names.into_iter().map(|n| n.as_ref().to_lowercase()).collect()),
            deny: deny.into_iter().map(|n| n.as_ref().to_lowercase()).collect(),
        }
    }

    /// Build from the `allow_list` and `deny_list` facts.
    ///
    /// An absent or empty allow list means everything is allowed.
    pub fn from_facts(facts: &FactTable) -> Self {
        let allow = facts.names(ALLOW_LIST);
        let allow = if allow.is_empty() { None } else { Some(allow) };
        Self::new(allow, facts.names(DENY_LIST))
    }

    pub fn is_noop(&self) -> bool {
        self.allow.is_none() && self.deny.is_empty()
    }

    /// Whether a unit with this short name should run
    pub fn permits(&self, name: &str) -> bool {
        let name = name.to_lowercase();
        if let Some(allow) = &self.allow {
            if !allow.contains(&name) {
                return false;
            }
        }
        !self.deny.contains(&name)
    }

    /// Drop every Fact and Check unit the filter does not permit.
    ///
    /// Reports are never filtered.
    pub fn apply(&self, catalog: &mut Catalog) {
        if self.is_noop() {
            return;
        }
        catalog.retain_units(|unit| {
            let keep = self.permits(unit.name());
            if !keep {
                debug!("Filtered out {} {}", unit.kind(), unit.full_name());
            }
            keep
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::PluginSource;
    use crate::facts::FactValue;
    use crate::unit::{Unit, UnitDescriptor, UnitKind};

    struct Named;

    impl Unit for Named {
        fn run(&mut self, _facts: &FactTable) -> anyhow::Result<Option<String>> {
            Ok(None)
        }
    }

    fn catalog() -> Catalog {
        let mut plugins = Vec::new();
        for name in ["LoadAvg", "MemUsage", "DiskUsage", "ThreadCount", "BuddyInfo"] {
            let full = format!("trawl::checks::{}", name);
            plugins.push(
                UnitDescriptor::from_factory(UnitKind::Check, name, &full, || Box::new(Named)).into(),
            );
        }
        plugins.push(
            UnitDescriptor::from_factory(UnitKind::Fact, "Hostname", "trawl::facts::Hostname", || {
                Box::new(Named)
            })
            .into(),
        );

        let mut catalog = Catalog::new();
        catalog.discover(PluginSource::Registry(plugins)).unwrap();
        catalog
    }

    fn check_names(catalog: &Catalog) -> Vec<String> {
        catalog.checks().iter().map(|c| c.name().to_string()).collect()
    }

    #[test]
    fn test_allow_two_of_five() {
        let mut facts = FactTable::new();
        facts.set("allow_list", "loadavg, DISKUSAGE");
        let mut catalog = catalog();
        NameFilter::from_facts(&facts).apply(&mut catalog);

        assert_eq!(check_names(&catalog), vec!["DiskUsage", "LoadAvg"]);
        // The allow list covers facts too
        assert!(catalog.facts().is_empty());
    }

    #[test]
    fn test_deny_two_of_five() {
        let mut facts = FactTable::new();
        facts.set(
            "deny_list",
            FactValue::List(vec!["LoadAvg".into(), "diskusage".into()]),
        );
        let mut catalog = catalog();
        NameFilter::from_facts(&facts).apply(&mut catalog);

        assert_eq!(check_names(&catalog).len(), 3);
        assert_eq!(catalog.facts().len(), 1);
    }

    #[test]
    fn test_deny_wins_over_allow() {
        let filter = NameFilter::new(Some(["LoadAvg", "MemUsage"]), ["memusage"]);
        assert!(filter.permits("LOADAVG"));
        assert!(!filter.permits("MemUsage"));
        assert!(!filter.permits("DiskUsage"));
    }

    #[test]
    fn test_no_lists_keeps_everything() {
        let filter = NameFilter::from_facts(&FactTable::new());
        assert!(filter.is_noop());

        let mut catalog = catalog();
        filter.apply(&mut catalog);
        assert_eq!(catalog.checks().len(), 5);
    }
}

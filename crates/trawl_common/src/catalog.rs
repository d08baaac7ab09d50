//! Plugin catalog - knows which Fact, Check and Report plugins exist
//!
//! Plugins arrive from two kinds of source: explicit registration lists
//! compiled into the binary, and a local directory of executables. Sources
//! are added on top of each other; `clear` is the only way to reset.

use crate::error::{Result, TrawlError};
use crate::script::ScriptUnit;
use crate::unit::{Plugin, ReportDescriptor, UnitDescriptor, UnitKind};
use std::collections::BTreeMap;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Subdirectory of a plugin directory holding Fact units
pub const FACTS_DIR: &str = "facts";

/// Subdirectory of a plugin directory holding Check units
pub const CHECKS_DIR: &str = "checks";

/// Where plugins come from
#[derive(Debug, Clone)]
pub enum PluginSource {
    /// Explicitly registered plugins
    Registry(Vec<Plugin>),
    /// Executables under `<dir>/facts` and `<dir>/checks`
    Directory(PathBuf),
}

/// Registry of available plugins, keyed by full name
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    facts: BTreeMap<String, UnitDescriptor>,
    checks: BTreeMap<String, UnitDescriptor>,
    reports: BTreeMap<String, ReportDescriptor>,
}

impl Catalog {
    /// Create empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Add every plugin from `source`; returns how many were found
    pub fn discover(&mut self, source: PluginSource) -> Result<usize> {
        let plugins = match source {
            PluginSource::Registry(plugins) => plugins,
            PluginSource::Directory(dir) => Self::load_from_dir(&dir)?,
        };

        let count = plugins.len();
        for plugin in plugins {
            self.register(plugin);
        }
        Ok(count)
    }

    /// Register a plugin programmatically
    pub fn register(&mut self, plugin: Plugin) {
        debug!("Adding plugin {}", plugin.full_name());
        match plugin {
            Plugin::Unit(unit) => {
                let set = match unit.kind() {
                    UnitKind::Fact => &mut self.facts,
                    UnitKind::Check => &mut self.checks,
                };
                set.insert(unit.full_name().to_string(), unit);
            }
            Plugin::Report(report) => {
                self.reports.insert(report.full_name().to_string(), report);
            }
        }
    }

    /// Scan a plugin directory.
    ///
    /// A missing directory contributes nothing. Anything unreadable, or a
    /// non-executable file where units are expected, fails the whole load.
    fn load_from_dir(dir: &Path) -> Result<Vec<Plugin>> {
        if !dir.exists() {
            debug!("Plugin directory not found: {}", dir.display());
            return Ok(Vec::new());
        }

        let source_name = dir.display().to_string();
        let mut plugins = Vec::new();

        for (subdir, kind) in [(FACTS_DIR, UnitKind::Fact), (CHECKS_DIR, UnitKind::Check)] {
            let unit_dir = dir.join(subdir);
            if !unit_dir.exists() {
                continue;
            }

            let walker = WalkDir::new(&unit_dir)
                .follow_links(true)
                .sort_by_file_name()
                .into_iter()
                .filter_entry(|e| e.depth() == 0 || !is_hidden(e.file_name()));

            for entry in walker {
                let entry = entry.map_err(|e| TrawlError::discovery(&source_name, e))?;
                if !entry.file_type().is_file() {
                    continue;
                }

                let path = entry.path();
                let metadata = entry
                    .metadata()
                    .map_err(|e| TrawlError::discovery(&source_name, e))?;
                if metadata.permissions().mode() & 0o111 == 0 {
                    return Err(TrawlError::discovery(
                        &source_name,
                        format!("{} is not executable", path.display()),
                    ));
                }

                let unit = ScriptUnit::descriptor(kind, dir, path).ok_or_else(|| {
                    TrawlError::discovery(
                        &source_name,
                        format!("{} has no usable plugin name", path.display()),
                    )
                })?;
                debug!("Loaded local plugin {} from {}", unit.full_name(), path.display());
                plugins.push(Plugin::Unit(unit));
            }
        }

        Ok(plugins)
    }

    /// Forget every plugin
    pub fn clear(&mut self) {
        self.facts.clear();
        self.checks.clear();
        self.reports.clear();
    }

    /// Full names of every plugin: facts, then checks, then reports
    pub fn list(&self) -> Vec<String> {
        self.facts
            .keys()
            .chain(self.checks.keys())
            .chain(self.reports.keys())
            .cloned()
            .collect()
    }

    pub fn facts(&self) -> Vec<UnitDescriptor> {
        self.facts.values().cloned().collect()
    }

    pub fn checks(&self) -> Vec<UnitDescriptor> {
        self.checks.values().cloned().collect()
    }

    pub fn reports(&self) -> Vec<ReportDescriptor> {
        self.reports.values().cloned().collect()
    }

    /// Keep only the Fact and Check units for which `keep` is true
    pub fn retain_units<F>(&mut self, mut keep: F)
    where
        F: FnMut(&UnitDescriptor) -> bool,
    {
        self.facts.retain(|_, unit| keep(unit));
        self.checks.retain(|_, unit| keep(unit));
    }

    /// Find a report by short name, ignoring case
    pub fn find_report(&self, name: &str) -> Result<ReportDescriptor> {
        self.reports
            .values()
            .find(|r| r.name().eq_ignore_ascii_case(name))
            .cloned()
            .ok_or_else(|| TrawlError::ReportNotFound {
                name: name.to_string(),
                available: self.reports.values().map(|r| r.name().to_string()).collect(),
            })
    }
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_string_lossy().starts_with('.')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facts::FactTable;
    use crate::stream::ResultStream;
    use crate::unit::{Report, ReportOptions, Unit};
    use std::fs;
    use tempfile::tempdir;

    #[derive(Default)]
    struct Hostname;

    impl Unit for Hostname {
        fn run(&mut self, _facts: &FactTable) -> anyhow::Result<Option<String>> {
            Ok(Some("db01.example.com".to_string()))
        }
    }

    #[derive(Default)]
    struct LoadAvg;

    impl Unit for LoadAvg {
        fn run(&mut self, _facts: &FactTable) -> anyhow::Result<Option<String>> {
            Ok(None)
        }
    }

    #[derive(Default)]
    struct Plain;

    impl Report for Plain {
        fn run(
            &mut self,
            _facts: &FactTable,
            stream: &mut ResultStream,
            _options: &ReportOptions,
        ) -> anyhow::Result<String> {
            Ok(format!("{} results", stream.count()))
        }
    }

    fn registry() -> PluginSource {
        PluginSource::Registry(vec![
            UnitDescriptor::fact::<Hostname>().into(),
            UnitDescriptor::check::<LoadAvg>().into(),
            ReportDescriptor::of::<Plain>().into(),
        ])
    }

    fn write_exec(path: &Path, mode: u32) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "#!/bin/sh\necho found\n").unwrap();
        fs::set_permissions(path, fs::Permissions::from_mode(mode)).unwrap();
    }

    #[test]
    fn test_empty_catalog() {
        let catalog = Catalog::new();
        assert!(catalog.list().is_empty());
    }

    #[test]
    fn test_registry_classifies_plugins() {
        let mut catalog = Catalog::new();
        assert_eq!(catalog.discover(registry()).unwrap(), 3);
        assert_eq!(catalog.facts().len(), 1);
        assert_eq!(catalog.checks().len(), 1);
        assert_eq!(catalog.reports().len(), 1);
        assert_eq!(catalog.facts()[0].name(), "Hostname");
    }

    #[test]
    fn test_discover_is_additive_and_deduplicated() {
        let mut catalog = Catalog::new();
        catalog.discover(registry()).unwrap();
        catalog.discover(registry()).unwrap();
        assert_eq!(catalog.list().len(), 3);

        catalog.clear();
        assert!(catalog.list().is_empty());
    }

    #[test]
    fn test_find_report_ignores_case() {
        let mut catalog = Catalog::new();
        catalog.discover(registry()).unwrap();
        assert_eq!(catalog.find_report("plain").unwrap().name(), "Plain");

        match catalog.find_report("Html") {
            Err(TrawlError::ReportNotFound { available, .. }) => {
                assert_eq!(available, vec!["Plain".to_string()]);
            }
            other => panic!("expected ReportNotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_directory_plugins_get_local_prefix() {
        let dir = tempdir().unwrap();
        write_exec(&dir.path().join("facts/Product"), 0o755);
        write_exec(&dir.path().join("checks/raid/RaidStatus.sh"), 0o755);
        write_exec(&dir.path().join("checks/.hidden/Ignored"), 0o755);
        fs::write(dir.path().join("README"), "not a plugin").unwrap();

        let mut catalog = Catalog::new();
        catalog.discover(registry()).unwrap();
        let added = catalog
            .discover(PluginSource::Directory(dir.path().to_path_buf()))
            .unwrap();
        assert_eq!(added, 2);

        let list = catalog.list();
        assert!(list.contains(&"local.facts.Product".to_string()));
        assert!(list.contains(&"local.checks.raid.RaidStatus".to_string()));
        // Built-ins are kept alongside the local ones
        assert_eq!(catalog.checks().len(), 2);
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let mut catalog = Catalog::new();
        let added = catalog
            .discover(PluginSource::Directory(PathBuf::from("/nonexistent/trawl/plugins")))
            .unwrap();
        assert_eq!(added, 0);
    }

    #[test]
    fn test_non_executable_unit_is_fatal() {
        let dir = tempdir().unwrap();
        write_exec(&dir.path().join("checks/Broken"), 0o644);

        let mut catalog = Catalog::new();
        let err = catalog
            .discover(PluginSource::Directory(dir.path().to_path_buf()))
            .unwrap_err();
        assert!(matches!(err, TrawlError::Discovery { .. }));
        assert!(err.to_string().contains("not executable"));
    }
}

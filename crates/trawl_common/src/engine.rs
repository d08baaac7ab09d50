//! Orchestration engine
//!
//! Owns the fact table and the catalog for one bounded run:
//! discover local plugins, filter, resolve facts, run checks, report.

use crate::catalog::{Catalog, PluginSource};
use crate::error::{Result, TrawlError};
use crate::facts::{FactTable, FactValue};
use crate::filter::NameFilter;
use crate::resolver;
use crate::runner::{self, Phase};
use crate::stream::ResultStream;
use crate::unit::ReportOptions;
use std::path::PathBuf;
use tracing::{debug, info};

/// Fact naming an extra plugin directory
pub const PLUGIN_DIR: &str = "plugin_dir";

pub struct Engine {
    catalog: Catalog,
    facts: FactTable,
}

impl Engine {
    /// Engine over `catalog` with a fresh fact table
    pub fn new(catalog: Catalog) -> Self {
        Self {
            catalog,
            facts: FactTable::new(),
        }
    }

    pub fn set_fact(&mut self, name: &str, value: impl Into<FactValue>) {
        self.facts.set(name, value);
    }

    /// Set many facts, converting text values to their simple types
    pub fn set_facts<I, K, V>(&mut self, facts: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        for (name, raw) in facts {
            self.facts.set_coerced(name.as_ref(), raw.as_ref());
        }
    }

    pub fn facts(&self) -> &FactTable {
        &self.facts
    }

    pub fn facts_mut(&mut self) -> &mut FactTable {
        &mut self.facts
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn catalog_mut(&mut self) -> &mut Catalog {
        &mut self.catalog
    }

    /// Everything before checks run: local plugins, filtering, facts.
    ///
    /// Returns the number of fact passes.
    pub fn prepare(&mut self) -> Result<usize> {
        self.discover_local()?;

        NameFilter::from_facts(&self.facts).apply(&mut self.catalog);

        let facts = self.catalog.facts();
        let passes = resolver::resolve(&mut self.facts, &facts)?;
        info!("Resolved {} facts in {} passes", self.facts.len(), passes);
        Ok(passes)
    }

    /// Load executables from the `plugin_dir` fact, if it is set
    pub fn discover_local(&mut self) -> Result<usize> {
        let Some(dir) = self.facts.get(PLUGIN_DIR).and_then(FactValue::as_str) else {
            return Ok(0);
        };
        let dir = PathBuf::from(dir);
        let found = self.catalog.discover(PluginSource::Directory(dir.clone()))?;
        debug!("Found {} local plugins in {}", found, dir.display());
        Ok(found)
    }

    /// Start every check; the stream ends with `Stats` and `EOF`
    pub fn run_checks(&self) -> Result<ResultStream> {
        let checks = self.catalog.checks();
        debug!("Running {} checks", checks.len());
        runner::run(&checks, &self.facts, Phase::Checks)
    }

    /// Run everything and render it with the report called `report`.
    ///
    /// Forks like [`runner::run`], so the calling process must be
    /// single-threaded.
    pub fn run(&mut self, report: &str, options: &ReportOptions) -> Result<String> {
        self.prepare()?;

        // A missing report must fail before any check is started
        let report = self.catalog.find_report(report)?;
        let mut stream = self.run_checks()?;

        let mut instance = report.instantiate();
        let rendered = instance.run(&self.facts, &mut stream, options);

        // Whatever the report left unread still has to finish, so the
        // supervisor is reaped even when the report failed
        let skipped = stream.drain();
        let rendered =
            rendered.map_err(|e| TrawlError::Report(format!("{}: {:#}", report.name(), e)))?;
        if skipped? > 0 {
            debug!("Report {} left results unread", report.name());
        }
        Ok(rendered)
    }
}

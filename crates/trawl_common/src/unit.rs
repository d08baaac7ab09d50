//! Plugin contracts: Fact units, Check units and Reports
//!
//! The engine never holds unit instances. It holds descriptors that know how
//! to build a fresh instance, and builds one inside each worker process.

use crate::facts::FactTable;
use crate::stream::ResultStream;
use std::fmt;
use std::sync::Arc;

/// A unit of diagnostic work: accepts the fact table, returns optional text.
///
/// Fact units return the value of the fact named after the unit. Check units
/// return a finding, or nothing when the host looks healthy.
pub trait Unit: Send {
    fn run(&mut self, facts: &FactTable) -> anyhow::Result<Option<String>>;

    /// Whether the unit should run at all for this table
    fn should_run(&self, _facts: &FactTable) -> bool {
        true
    }

    /// Whether the output is worth reporting ("found something")
    fn should_notify(&self, output: Option<&str>) -> bool {
        output.is_some_and(|o| !o.is_empty())
    }
}

/// Renders the result stream into final output.
pub trait Report {
    /// Drain `stream` up to EOF and return the rendered text
    fn run(
        &mut self,
        facts: &FactTable,
        stream: &mut ResultStream,
        options: &ReportOptions,
    ) -> anyhow::Result<String>;
}

/// Rendering hints handed to reports
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportOptions {
    /// Total width of the rendered report
    pub width: Option<usize>,
    /// Line cap for a single unit's output
    pub max_lines_per_unit: Option<usize>,
    pub truncate: bool,
    /// Print as results arrive instead of only returning the text
    pub live: bool,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            width: None,
            max_lines_per_unit: None,
            truncate: true,
            live: false,
        }
    }
}

/// Which registry a unit belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum UnitKind {
    Fact,
    Check,
}

impl fmt::Display for UnitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitKind::Fact => write!(f, "fact"),
            UnitKind::Check => write!(f, "check"),
        }
    }
}

type UnitFactory = Arc<dyn Fn() -> Box<dyn Unit> + Send + Sync>;
type ReportFactory = Arc<dyn Fn() -> Box<dyn Report> + Send + Sync>;

/// Last `::` segment of a type path
fn short_type_name(full: &str) -> &str {
    full.rsplit("::").next().unwrap_or(full)
}

/// Identifies a unit implementation and builds fresh instances of it
#[derive(Clone)]
pub struct UnitDescriptor {
    name: String,
    full_name: String,
    kind: UnitKind,
    factory: UnitFactory,
}

impl UnitDescriptor {
    /// Describe a unit type; names come from its Rust type path
    pub fn of<U: Unit + Default + 'static>(kind: UnitKind) -> Self {
        let full_name = std::any::type_name::<U>();
        Self {
            name: short_type_name(full_name).to_string(),
            full_name: full_name.to_string(),
            kind,
            factory: Arc::new(|| Box::new(U::default())),
        }
    }

    pub fn fact<U: Unit + Default + 'static>() -> Self {
        Self::of::<U>(UnitKind::Fact)
    }

    pub fn check<U: Unit + Default + 'static>() -> Self {
        Self::of::<U>(UnitKind::Check)
    }

    /// Describe a unit built by an arbitrary factory
    pub fn from_factory<F>(kind: UnitKind, name: &str, full_name: &str, factory: F) -> Self
    where
        F: Fn() -> Box<dyn Unit> + Send + Sync + 'static,
    {
        Self {
            name: name.to_string(),
            full_name: full_name.to_string(),
            kind,
            factory: Arc::new(factory),
        }
    }

    /// Short name; this is also the result name and, for facts, the fact name
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    pub fn kind(&self) -> UnitKind {
        self.kind
    }

    pub fn instantiate(&self) -> Box<dyn Unit> {
        (self.factory)()
    }
}

impl fmt::Debug for UnitDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitDescriptor")
            .field("name", &self.name)
            .field("full_name", &self.full_name)
            .field("kind", &self.kind)
            .finish()
    }
}

/// Identifies a report implementation
#[derive(Clone)]
pub struct ReportDescriptor {
    name: String,
    full_name: String,
    factory: ReportFactory,
}

impl ReportDescriptor {
    pub fn of<R: Report + Default + 'static>() -> Self {
        let full_name = std::any::type_name::<R>();
        Self {
            name: short_type_name(full_name).to_string(),
            full_name: full_name.to_string(),
            factory: Arc::new(|| Box::new(R::default())),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    pub fn instantiate(&self) -> Box<dyn Report> {
        (self.factory)()
    }
}

impl fmt::Debug for ReportDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReportDescriptor")
            .field("name", &self.name)
            .field("full_name", &self.full_name)
            .finish()
    }
}

/// Anything a plugin source can contribute to the catalog
#[derive(Debug, Clone)]
pub enum Plugin {
    Unit(UnitDescriptor),
    Report(ReportDescriptor),
}

impl Plugin {
    pub fn full_name(&self) -> &str {
        match self {
            Plugin::Unit(u) => u.full_name(),
            Plugin::Report(r) => r.full_name(),
        }
    }
}

impl From<UnitDescriptor> for Plugin {
    fn from(unit: UnitDescriptor) -> Self {
        Plugin::Unit(unit)
    }
}

impl From<ReportDescriptor> for Plugin {
    fn from(report: ReportDescriptor) -> Self {
        Plugin::Report(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Quiet;

    impl Unit for Quiet {
        fn run(&mut self, _facts: &FactTable) -> anyhow::Result<Option<String>> {
            Ok(None)
        }
    }

    #[test]
    fn test_descriptor_names_from_type() {
        let unit = UnitDescriptor::check::<Quiet>();
        assert_eq!(unit.name(), "Quiet");
        assert!(unit.full_name().ends_with("unit::tests::Quiet"));
        assert_eq!(unit.kind(), UnitKind::Check);
    }

    #[test]
    fn test_default_notify_needs_output() {
        let unit = Quiet;
        assert!(!unit.should_notify(None));
        assert!(!unit.should_notify(Some("")));
        assert!(unit.should_notify(Some("disk full")));
        assert!(unit.should_run(&FactTable::new()));
    }

    #[test]
    fn test_fresh_instance_per_call() {
        let unit = UnitDescriptor::fact::<Quiet>();
        let mut a = unit.instantiate();
        let mut b = unit.instantiate();
        assert_eq!(a.run(&FactTable::new()).unwrap(), None);
        assert_eq!(b.run(&FactTable::new()).unwrap(), None);
    }
}

//! Shared engine for trawl: facts, units, the process-isolated runner,
//! plugin discovery and the run pipeline.

pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod facts;
pub mod filter;
pub mod invoke;
pub mod resolver;
pub mod runner;
pub mod script;
pub mod shell;
pub mod stream;
pub mod unit;

pub use catalog::{Catalog, PluginSource};
pub use config::{ColorMode, TrawlConfig};
pub use engine::Engine;
pub use error::{Result, TrawlError};
pub use facts::{check_timeout, FactCollision, FactTable, FactValue, MAX_TIMEOUT_SECS};
pub use filter::NameFilter;
pub use runner::Phase;
pub use shell::{shell_call, shell_call_with_input, shell_stream, CommandOutput};
pub use stream::{ResultStream, ResultTuple, StreamWriter, EOF, STATS, TIMED_OUT_MARKER};
pub use unit::{Plugin, Report, ReportDescriptor, ReportOptions, Unit, UnitDescriptor, UnitKind};

/// Default plugin directory for site-local units
pub const DEFAULT_PLUGIN_DIR: &str = "/opt/trawl";

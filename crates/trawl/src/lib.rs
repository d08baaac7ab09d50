//! Trawl - built-in plugins and command-line front end for the trawl engine

pub mod checks;
pub mod cli;
pub mod errors;
pub mod facts;
pub mod logging;
pub mod registry;
pub mod reports;

pub use registry::{builtin_catalog, builtin_plugins};

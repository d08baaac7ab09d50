//! The built-in plugins, registered explicitly

use crate::{checks, facts, reports};
use trawl_common::{Catalog, Plugin, PluginSource, ReportDescriptor, UnitDescriptor};

pub fn builtin_plugins() -> Vec<Plugin> {
    vec![
        UnitDescriptor::fact::<facts::Hostname>().into(),
        UnitDescriptor::fact::<facts::Pid>().into(),
        UnitDescriptor::fact::<facts::PidCwd>().into(),
        UnitDescriptor::fact::<facts::PidExe>().into(),
        UnitDescriptor::fact::<facts::LogFiles>().into(),
        UnitDescriptor::fact::<facts::TerminalWidth>().into(),
        UnitDescriptor::fact::<facts::MaxUnitOutputWidth>().into(),
        UnitDescriptor::fact::<facts::OtherUsers>().into(),
        UnitDescriptor::check::<checks::LoadAvg>().into(),
        UnitDescriptor::check::<checks::MemUsage>().into(),
        UnitDescriptor::check::<checks::DiskUsage>().into(),
        UnitDescriptor::check::<checks::ThreadCount>().into(),
        UnitDescriptor::check::<checks::BuddyInfo>().into(),
        UnitDescriptor::check::<checks::Dmesg>().into(),
        UnitDescriptor::check::<checks::RaidStatus>().into(),
        UnitDescriptor::check::<checks::NetIFace>().into(),
        UnitDescriptor::check::<checks::OtherUsers>().into(),
        UnitDescriptor::check::<checks::ListFacts>().into(),
        ReportDescriptor::of::<reports::StdOut>().into(),
        ReportDescriptor::of::<reports::Json>().into(),
        ReportDescriptor::of::<reports::Collected>().into(),
    ]
}

/// A catalog holding every built-in plugin
pub fn builtin_catalog() -> trawl_common::Result<Catalog> {
    let mut catalog = Catalog::new();
    catalog.discover(PluginSource::Registry(builtin_plugins()))?;
    Ok(catalog)
}

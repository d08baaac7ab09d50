//! Facts about the process under investigation
//!
//! `Pid` comes from `--pid` or is looked up from `Product`. The other facts
//! here only run once a pid is known, so they land in a later pass.

use std::io::ErrorKind;
use sysinfo::System;
use tracing::warn;
use trawl_common::{FactTable, FactValue, Unit};

/// First process whose name `Product` starts with
#[derive(Default)]
pub struct Pid;

impl Unit for Pid {
    fn run(&mut self, facts: &FactTable) -> anyhow::Result<Option<String>> {
        let Some(product) = facts.get("Product").map(|p| p.to_string()) else {
            return Ok(None);
        };

        let mut system = System::new();
        system.refresh_processes();

        let pid = system
            .processes()
            .iter()
            .filter(|(_, process)| {
                let name = process.name();
                !name.is_empty() && product.starts_with(name)
            })
            .map(|(pid, _)| pid.as_u32())
            .min();
        Ok(pid.map(|p| p.to_string()))
    }

    fn should_run(&self, facts: &FactTable) -> bool {
        facts.contains("Product") && !facts.contains("Pid")
    }
}

fn pid_link(facts: &FactTable, link: &str) -> anyhow::Result<Option<String>> {
    let Some(pid) = facts.get("Pid").and_then(FactValue::as_i64) else {
        return Ok(None);
    };
    match std::fs::read_link(format!("/proc/{}/{}", pid, link)) {
        Ok(path) => Ok(Some(path.display().to_string())),
        Err(e) if e.kind() == ErrorKind::PermissionDenied => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Working directory of `Pid`
#[derive(Default)]
pub struct PidCwd;

impl Unit for PidCwd {
    fn run(&mut self, facts: &FactTable) -> anyhow::Result<Option<String>> {
        pid_link(facts, "cwd")
    }

    fn should_run(&self, facts: &FactTable) -> bool {
        facts.contains("Pid")
    }
}

/// Executable of `Pid`
#[derive(Default)]
pub struct PidExe;

impl Unit for PidExe {
    fn run(&mut self, facts: &FactTable) -> anyhow::Result<Option<String>> {
        pid_link(facts, "exe")
    }

    fn should_run(&self, facts: &FactTable) -> bool {
        facts.contains("Pid")
    }
}

/// Open `.log` files of `Pid`, comma separated
#[derive(Default)]
pub struct LogFiles;

impl Unit for LogFiles {
    fn run(&mut self, facts: &FactTable) -> anyhow::Result<Option<String>> {
        let Some(pid) = facts.get("Pid").and_then(FactValue::as_i64) else {
            return Ok(None);
        };

        let entries = match std::fs::read_dir(format!("/proc/{}/fd", pid)) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::PermissionDenied => {
                warn!("Did not have permission to read open files of process {}", pid);
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };

        // Descriptors can close while we walk them
        let mut logs: Vec<String> = entries
            .flatten()
            .filter_map(|entry| std::fs::read_link(entry.path()).ok())
            .map(|target| target.display().to_string())
            .filter(|path| path.to_lowercase().ends_with(".log"))
            .collect();
        logs.sort();
        logs.dedup();

        if logs.is_empty() {
            return Ok(None);
        }
        Ok(Some(logs.join(",")))
    }

    fn should_run(&self, facts: &FactTable) -> bool {
        facts.contains("Pid")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pid_needs_product() {
        let facts = FactTable::new();
        assert!(!Pid.should_run(&facts));
        assert_eq!(Pid.run(&facts).unwrap(), None);
    }

    #[test]
    fn test_explicit_pid_is_not_looked_up() {
        let mut facts = FactTable::new();
        facts.set("Product", "sshd");
        facts.set("pid", 1i64);
        assert!(!Pid.should_run(&facts));
    }

    #[test]
    fn test_links_of_own_process() {
        let mut facts = FactTable::new();
        assert!(!PidCwd.should_run(&facts));

        facts.set("Pid", std::process::id() as i64);
        let cwd = PidCwd.run(&facts).unwrap().unwrap();
        assert_eq!(
            cwd,
            std::env::current_dir().unwrap().display().to_string()
        );
        assert!(PidExe.run(&facts).unwrap().is_some());
    }

    #[test]
    fn test_open_log_files_of_own_process() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("Service.LOG");
        let _held = std::fs::File::create(&log).unwrap();
        let _other = std::fs::File::create(dir.path().join("data.bin")).unwrap();

        let mut facts = FactTable::new();
        assert!(!LogFiles.should_run(&facts));
        assert_eq!(LogFiles.run(&facts).unwrap(), None);

        facts.set("Pid", std::process::id() as i64);
        let found = LogFiles.run(&facts).unwrap().unwrap();
        let paths: Vec<&str> = found.split(',').collect();
        assert!(paths.contains(&log.display().to_string().as_str()));
        assert!(!found.contains("data.bin"));
    }
}

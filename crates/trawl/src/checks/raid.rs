use anyhow::{Context, Result};
use regex::Regex;
use std::path::Path;
use trawl_common::{FactTable, Unit};

const MDSTAT: &str = "/proc/mdstat";

/// Software RAID arrays with a member down, from `/proc/mdstat`
#[derive(Default)]
pub struct RaidStatus;

impl Unit for RaidStatus {
    fn run(&mut self, _facts: &FactTable) -> Result<Option<String>> {
        let mdstat = std::fs::read_to_string(MDSTAT)
            .with_context(|| format!("Failed to read {}", MDSTAT))?;
        degraded(&mdstat)
    }

    fn should_run(&self, _facts: &FactTable) -> bool {
        Path::new(MDSTAT).exists()
    }
}

fn degraded(mdstat: &str) -> Result<Option<String>> {
    let members = Regex::new(r"\[[U_]+\]")?;
    let Some(array) = members
        .find_iter(mdstat)
        .map(|m| m.as_str())
        .find(|status| status.contains('_'))
    else {
        return Ok(None);
    };
    Ok(Some(format!(
        "Drives down in Raid Array ({})\n{} output:\n{}",
        array, MDSTAT, mdstat
    )))
}

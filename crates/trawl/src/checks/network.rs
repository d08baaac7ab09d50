//! Network interface error rates from `sar -n EDEV`
//!
//! Reads the `nic` fact (default `bond0`) and `minutes` to look back
//! (default 60). sar only keeps the current day, so the window never
//! reaches across midnight.

use anyhow::{Context, Result};
use chrono::{Duration, Local};
use std::collections::HashMap;
use std::path::Path;
use trawl_common::{shell_call, FactTable, FactValue, Unit};

pub const DEFAULT_NIC: &str = "bond0";

pub const DEFAULT_MINUTES: i64 = 60;

/// Longest look-back accepted, 30 days
pub const MAX_MINUTES: i64 = 43_200;

/// Per-second rates that must stay at zero
pub const WATCHED_STATS: [&str; 5] = ["rxerr", "txerr", "rxdrop", "txdrop", "txcarr"];

/// Reports interfaces with errors or drops over the look-back window
#[derive(Default)]
pub struct NetIFace;

impl Unit for NetIFace {
    fn run(&mut self, facts: &FactTable) -> Result<Option<String>> {
        let nic = nic(facts);
        let minutes = facts
            .get("minutes")
            .and_then(FactValue::as_i64)
            .filter(|m| (0..=MAX_MINUTES).contains(m))
            .unwrap_or(DEFAULT_MINUTES);

        let now = Local::now();
        let start = now - Duration::minutes(minutes);
        let cmd = format!(
            "sar -n EDEV -s {} -e {}",
            start.format("%H:%M:%S"),
            now.format("%H:%M:%S")
        );
        let output = shell_call(&cmd).context("Failed to run sar")?;

        Ok(over_threshold(&output.stdout, &nic))
    }

    fn should_run(&self, facts: &FactTable) -> bool {
        Path::new("/proc/sys/net/ipv4/conf").join(nic(facts)).is_dir()
    }
}

fn nic(facts: &FactTable) -> String {
    facts
        .get("nic")
        .map(|n| n.to_string())
        .unwrap_or_else(|| DEFAULT_NIC.to_string())
}

/// Averages for `nic` keyed by column name without the `/s` suffix
fn averages(sar: &str, nic: &str) -> Option<HashMap<String, f64>> {
    let header: Vec<&str> = sar
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>())
        .find(|fields| fields.contains(&"IFACE"))?;
    let columns = &header[header.iter().position(|f| *f == "IFACE")? + 1..];

    let row: Vec<&str> = sar
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>())
        .find(|fields| fields.len() > 2 && fields[0] == "Average:" && fields[1] == nic)?;

    Some(
        columns
            .iter()
            .zip(&row[2..])
            .filter_map(|(name, value)| {
                Some((name.trim_end_matches("/s").to_string(), value.parse().ok()?))
            })
            .collect(),
    )
}

fn over_threshold(sar: &str, nic: &str) -> Option<String> {
    let averages = averages(sar, nic)?;
    let report: String = WATCHED_STATS
        .iter()
        .filter_map(|stat| {
            let value = averages.get(*stat)?;
            (*value > 0.0).then(|| {
                format!(
                    "key={}, interface={} has surpassed threshold. value={}\n",
                    stat, nic, value
                )
            })
        })
        .collect();
    (!report.is_empty()).then_some(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAR: &str = "\
Linux 6.1.0 (web01)  11/14/2023  _x86_64_  (8 CPU)

10:00:01 PM     IFACE   rxerr/s   txerr/s    coll/s  rxdrop/s  txdrop/s  txcarr/s  rxfram/s  rxfifo/s  txfifo/s
10:10:01 PM      eth0      0.00      0.00      0.00      0.00      0.00      0.00      0.00      0.00      0.00
10:10:01 PM      eth1      2.00      0.00      7.00      0.50      0.00      0.00      0.00      0.00      0.00
Average:         eth0      0.00      0.00      0.00      0.00      0.00      0.00      0.00      0.00      0.00
Average:         eth1      2.00      0.00      7.00      0.50      0.00      0.00      0.00      0.00      0.00
";

    #[test]
    fn test_clean_interface_is_quiet() {
        assert_eq!(over_threshold(SAR, "eth0"), None);
        assert_eq!(over_threshold(SAR, "bond0"), None);
        assert_eq!(over_threshold("", "eth0"), None);
    }

    #[test]
    fn test_errors_and_drops_reported_by_column_name() {
        let out = over_threshold(SAR, "eth1").unwrap();
        assert_eq!(
            out,
            "key=rxerr, interface=eth1 has surpassed threshold. value=2\n\
             key=rxdrop, interface=eth1 has surpassed threshold. value=0.5\n"
        );
        // Collisions are not an error
        assert!(!out.contains("coll"));
    }

    #[test]
    fn test_missing_nic_is_skipped() {
        let mut facts = FactTable::new();
        facts.set("nic", "definitely-not-a-nic0");
        assert!(!NetIFace.should_run(&facts));
    }
}

//! Memory pressure checks: overall usage, the OOM killer and fragmentation

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use regex::Regex;
use std::collections::HashMap;
use trawl_common::{shell_call, FactTable, Unit};

/// Memory-in-use percentage that counts as critical
pub const CRITICAL_PERCENT: f64 = 90.0;

/// How far back kernel OOM events are reported
const OOM_WINDOW_SECS: f64 = 24.0 * 3600.0;

/// Reports high memory use and recent OOM killer activity
#[derive(Default)]
pub struct MemUsage;

impl Unit for MemUsage {
    fn run(&mut self, _facts: &FactTable) -> Result<Option<String>> {
        let contents =
            std::fs::read_to_string("/proc/meminfo").context("Failed to read /proc/meminfo")?;
        let usage = MemoryUsage::from_meminfo(&contents)?;

        // dmesg is often restricted to root; treat that as a quiet kernel log
        let kernel_log = shell_call("dmesg")
            .ok()
            .filter(|out| out.success())
            .map(|out| out.stdout)
            .unwrap_or_default();

        let uptime = std::fs::read_to_string("/proc/uptime")
            .ok()
            .and_then(|u| u.split_whitespace().next()?.parse::<f64>().ok())
            .unwrap_or(0.0);
        let booted = Utc::now().timestamp() as f64 - uptime;

        Ok(evaluate(&usage, &kernel_log, booted, uptime - OOM_WINDOW_SECS))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct MemoryUsage {
    total_kib: u64,
    used_kib: u64,
}

impl MemoryUsage {
    fn from_meminfo(meminfo: &str) -> Result<Self> {
        let fields: HashMap<&str, u64> = meminfo
            .lines()
            .filter_map(|line| {
                let mut parts = line.split_whitespace();
                let key = parts.next()?.trim_end_matches(':');
                let value = parts.next()?.parse().ok()?;
                Some((key, value))
            })
            .collect();
        let field = |name: &str| {
            fields
                .get(name)
                .copied()
                .with_context(|| format!("{} missing from /proc/meminfo", name))
        };

        let total_kib = field("MemTotal")?;
        let free_kib = field("MemFree")? + field("Buffers")? + field("Cached")?;
        if total_kib == 0 {
            anyhow::bail!("MemTotal is zero");
        }
        Ok(Self {
            total_kib,
            used_kib: total_kib.saturating_sub(free_kib),
        })
    }

    fn percent_used(&self) -> f64 {
        self.used_kib as f64 / self.total_kib as f64 * 100.0
    }
}

fn evaluate(usage: &MemoryUsage, kernel_log: &str, booted: f64, cutoff: f64) -> Option<String> {
    let oom_seen = kernel_log.contains("oom-killer");
    if usage.percent_used() < CRITICAL_PERCENT && !oom_seen {
        return None;
    }

    let mut report = format!(
        "High Memory Use!\nMemTotal: {} kib\nUsed: {} kib ({:.0}%)",
        usage.total_kib,
        usage.used_kib,
        usage.percent_used()
    );
    if oom_seen {
        report.push_str("\n\noom-killer present in dmesg | tail!\n");
        report.push_str(&recent_ooms(kernel_log, booted, cutoff));
    }
    Some(report)
}

/// OOM killer lines newer than `cutoff` (seconds since boot), each stamped
/// with wall-clock time. Lines without a kernel timestamp are always kept.
fn recent_ooms(kernel_log: &str, booted: f64, cutoff: f64) -> String {
    let Ok(stamp) = Regex::new(r"^\[\s*(\d+\.\d+)\]") else {
        return String::new();
    };

    let mut lines = String::new();
    for line in kernel_log.lines().filter(|l| l.contains("oom-killer")) {
        let since_boot = stamp
            .captures(line)
            .and_then(|c| c[1].parse::<f64>().ok());
        match since_boot {
            Some(t) if t > cutoff => {
                let when = DateTime::<Utc>::from_timestamp((booted + t) as i64, 0)
                    .map(|d| d.format("%a, %d %b %Y %H:%M:%S").to_string())
                    .unwrap_or_default();
                lines.push_str(&format!("{} {}\n", when, line));
            }
            Some(_) => {}
            None => {
                lines.push_str(line);
                lines.push('\n');
            }
        }
    }
    lines
}

/// Zero-count columns in one zone that mean high orders are exhausted
pub const ZERO_THRESHOLD: usize = 9;

/// Looks for memory fragmentation in `/proc/buddyinfo`
#[derive(Default)]
pub struct BuddyInfo {
    fragmented: bool,
}

impl Unit for BuddyInfo {
    fn run(&mut self, _facts: &FactTable) -> Result<Option<String>> {
        let raw = std::fs::read_to_string("/proc/buddyinfo")
            .context("Failed to read /proc/buddyinfo")?;
        let page_size = shell_call("getconf PAGE_SIZE")
            .ok()
            .and_then(|out| out.stdout.trim().parse().ok())
            .unwrap_or(4096);

        let zones = normal_zones(&raw);
        self.fragmented = zones.iter().any(|counts| is_fragmented(counts));

        let mut result = String::from(if self.fragmented {
            "Possible memory fragmentation\n"
        } else {
            "No significant memory fragmentation\n"
        });
        let columns = zones.first().map(Vec::len).unwrap_or(0);
        result.push_str(&format!("Smallest Page Size for system is {}\n", page_size));
        result.push_str(&format!(
            "Therefore, each columns pagesize is: {}\n",
            column_sizes(page_size, columns)
        ));
        result.push_str("Output of 'cat /proc/buddyinfo' is:\n");
        result.push_str(&raw);
        Ok(Some(result))
    }

    fn should_notify(&self, _output: Option<&str>) -> bool {
        self.fragmented
    }
}

/// Free block counts per order for each Normal zone
fn normal_zones(buddyinfo: &str) -> Vec<Vec<u64>> {
    buddyinfo
        .lines()
        .filter_map(|line| line.split_once("Normal"))
        .map(|(_, counts)| {
            counts
                .split_whitespace()
                .filter_map(|c| c.parse().ok())
                .collect()
        })
        .collect()
}

fn is_fragmented(counts: &[u64]) -> bool {
    counts.iter().filter(|c| **c == 0).count() >= ZERO_THRESHOLD
}

fn column_sizes(page_size: u64, columns: usize) -> String {
    (0..columns)
        .map(|order| binary_size(page_size << order))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Human-readable size with binary units
fn binary_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["bytes", "KiB", "MiB", "GiB", "TiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if value.fract() == 0.0 {
        format!("{} {}", value as u64, UNITS[unit])
    } else {
        format!("{:.2} {}", value, UNITS[unit])
    }
}

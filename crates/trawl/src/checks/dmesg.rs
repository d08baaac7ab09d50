//! Kernel messages from the requested time window

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use regex::Regex;
use trawl_common::{shell_call, FactTable, FactValue, Unit};

/// Kernel log lines between the `start_time` and `end_time` facts, newest first
#[derive(Default)]
pub struct Dmesg;

impl Unit for Dmesg {
    fn run(&mut self, facts: &FactTable) -> Result<Option<String>> {
        let output = shell_call("dmesg").context("Failed to run dmesg")?;
        if !output.success() {
            anyhow::bail!("dmesg exited with {:?}: {}", output.exit_code, output.stderr.trim());
        }

        let uptime = std::fs::read_to_string("/proc/uptime").context("Failed to read /proc/uptime")?;
        let uptime: f64 = uptime
            .split_whitespace()
            .next()
            .and_then(|u| u.parse().ok())
            .with_context(|| format!("Unexpected /proc/uptime contents: {:?}", uptime))?;
        let booted = Utc::now().timestamp() as f64 - uptime;

        let window = Window {
            start: facts.get("start_time").and_then(FactValue::as_f64),
            end: facts.get("end_time").and_then(FactValue::as_f64),
        };
        in_window(&output.stdout, booted, window)
    }
}

/// Epoch seconds; an open end matches everything on that side
#[derive(Debug, Clone, Copy, Default)]
struct Window {
    start: Option<f64>,
    end: Option<f64>,
}

impl Window {
    fn contains(&self, at: f64) -> bool {
        self.start.map_or(true, |start| at >= start) && self.end.map_or(true, |end| at <= end)
    }
}

fn in_window(kernel_log: &str, booted: f64, window: Window) -> Result<Option<String>> {
    let line_pattern = Regex::new(r"^\[\s*(\d+\.\d+)\]\s?(.*)$")?;

    let mut lines: Vec<String> = kernel_log
        .lines()
        .filter_map(|line| {
            let caps = line_pattern.captures(line)?;
            let at = booted + caps[1].parse::<f64>().ok()?;
            if !window.contains(at) {
                return None;
            }
            let when = DateTime::<Utc>::from_timestamp(at as i64, 0)?;
            Some(format!("{} {}", when.format("%Y/%m/%d %H:%M:%S"), &caps[2]))
        })
        .collect();

    if lines.is_empty() {
        return Ok(None);
    }
    lines.reverse();
    Ok(Some(lines.join("\n")))
}

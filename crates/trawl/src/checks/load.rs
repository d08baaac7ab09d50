use anyhow::{Context, Result};
use trawl_common::{FactTable, Unit};

/// Flags any 1, 5 or 15 minute load average above the CPU count
#[derive(Default)]
pub struct LoadAvg;

impl Unit for LoadAvg {
    fn run(&mut self, _facts: &FactTable) -> Result<Option<String>> {
        let contents =
            std::fs::read_to_string("/proc/loadavg").context("Failed to read /proc/loadavg")?;
        evaluate(&contents, num_cpus::get())
    }
}

fn evaluate(loadavg: &str, cpu_count: usize) -> Result<Option<String>> {
    let summaries: Vec<&str> = loadavg.split_whitespace().take(3).collect();
    if summaries.len() < 3 {
        anyhow::bail!("Unexpected /proc/loadavg contents: {:?}", loadavg);
    }

    let mut overloaded = false;
    for summary in &summaries {
        let load: f64 = summary
            .parse()
            .with_context(|| format!("Bad load average {:?}", summary))?;
        if load / cpu_count as f64 > 1.0 {
            overloaded = true;
        }
    }

    if !overloaded {
        return Ok(None);
    }
    Ok(Some(format!(
        "Load average shows processes queued beyond CPU count!\nCPU Count: {}\nLoad averages: {}",
        cpu_count,
        summaries.join(" ")
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quiet_below_cpu_count() {
        assert_eq!(evaluate("0.52 0.58 0.59 1/467 12345\n", 4).unwrap(), None);
        assert_eq!(evaluate("4.00 4.00 4.00 1/467 12345\n", 4).unwrap(), None);
    }

    #[test]
    fn test_any_window_over_cpu_count() {
        let out = evaluate("0.10 0.20 8.50 3/467 12345\n", 4).unwrap().unwrap();
        assert!(out.starts_with("Load average shows processes queued beyond CPU count!"));
        assert!(out.contains("CPU Count: 4"));
        assert!(out.ends_with("Load averages: 0.10 0.20 8.50"));
    }

    #[test]
    fn test_garbage_is_an_error() {
        assert!(evaluate("", 4).is_err());
        assert!(evaluate("a b c", 4).is_err());
    }
}

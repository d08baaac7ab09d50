//! CLI - Command-line argument parsing
//!
//! Defines the CLI structure using clap and turns it into seed facts.
//! Precedence, lowest first: built-in defaults, the config file, flags,
//! then trailing `NAME=VALUE` arguments.

use chrono::{DateTime, Duration, Utc};
use clap::Parser;
use std::path::PathBuf;
use trawl_common::{
    check_timeout, FactTable, FactValue, TrawlConfig, TrawlError, DEFAULT_PLUGIN_DIR,
};

/// Report used when neither the command line nor the config names one
pub const DEFAULT_REPORT: &str = "StdOut";

/// Trawl - plugin-driven triage of broken hosts and services
#[derive(Parser, Debug)]
#[command(name = "trawl")]
#[command(version)]
#[command(about = "Gather facts about a host, run every diagnostic check in parallel, report what looks wrong")]
pub struct Cli {
    /// Process id to investigate
    #[arg(short, long)]
    pub pid: Option<i64>,

    /// Product or process name to investigate
    #[arg(long)]
    pub product: Option<String>,

    /// Report to render results with
    #[arg(short, long)]
    pub report: Option<String>,

    /// Seconds allowed for each phase
    #[arg(short = 't', long = "time-out", value_name = "SECONDS")]
    pub timeout: Option<f64>,

    /// Report every unit, including those with nothing to say
    #[arg(short, long)]
    pub verbose: bool,

    /// Debug logging to stderr
    #[arg(short, long)]
    pub debug: bool,

    /// Cap each unit's output to fit the report (the default)
    #[arg(long, overrides_with = "no_truncate")]
    pub truncate: bool,

    /// Show unit output in full
    #[arg(long, overrides_with = "truncate")]
    pub no_truncate: bool,

    /// Only run these units (comma separated short names)
    #[arg(long = "white-list", value_delimiter = ',', value_name = "NAMES")]
    pub allow_list: Vec<String>,

    /// Never run these units (comma separated short names)
    #[arg(long = "black-list", value_delimiter = ',', value_name = "NAMES")]
    pub deny_list: Vec<String>,

    /// Directory of local executable plugins
    #[arg(long, value_name = "DIR")]
    pub plugin_dir: Option<PathBuf>,

    /// Look this many hours back (sets the start time)
    #[arg(long, default_value_t = 24.0)]
    pub hours: f64,

    /// Start of the time window (epoch seconds or RFC 3339)
    #[arg(long, value_parser = parse_time, value_name = "TIME")]
    pub start_time: Option<DateTime<Utc>>,

    /// End of the time window, defaults to now (epoch seconds or RFC 3339)
    #[arg(long, value_parser = parse_time, value_name = "TIME")]
    pub end_time: Option<DateTime<Utc>>,

    /// Configuration file to use instead of the default locations
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Print every registered plugin and exit
    #[arg(long)]
    pub list: bool,

    /// Extra facts for units, as NAME=VALUE
    #[arg(value_name = "NAME=VALUE")]
    pub facts: Vec<String>,
}

impl Cli {
    /// `Some(false)` for `--no-truncate`, `Some(true)` for `--truncate`
    pub fn truncate_flag(&self) -> Option<bool> {
        if self.no_truncate {
            Some(false)
        } else if self.truncate {
            Some(true)
        } else {
            None
        }
    }

    pub fn report_name(&self, config: &TrawlConfig) -> String {
        self.report
            .clone()
            .or_else(|| config.report.clone())
            .unwrap_or_else(|| DEFAULT_REPORT.to_string())
    }

    /// Fill `facts` from defaults, `config`, flags and dynamic arguments
    pub fn seed(
        &self,
        config: &TrawlConfig,
        facts: &mut FactTable,
        now: DateTime<Utc>,
    ) -> trawl_common::Result<()> {
        // Rejected before anything is seeded or run
        let dynamic = parse_dynamic(&self.facts)?;
        for (name, value) in &dynamic {
            if name.eq_ignore_ascii_case("timeout") {
                let secs = FactValue::coerce(value).as_f64().unwrap_or(f64::NAN);
                check_timeout(secs).map_err(TrawlError::InvalidArgument)?;
            }
        }

        facts.set("plugin_dir", DEFAULT_PLUGIN_DIR);
        facts.set("truncate", true);

        config.apply(facts);

        facts.set("debug", self.debug);
        if self.verbose {
            facts.set("verbose", true);
        }
        if let Some(truncate) = self.truncate_flag() {
            facts.set("truncate", truncate);
        }
        if let Some(timeout) = self.timeout {
            facts.set(
                "timeout",
                check_timeout(timeout).map_err(TrawlError::InvalidArgument)?,
            );
        }
        if let Some(pid) = self.pid {
            facts.set("Pid", pid);
        }
        if let Some(product) = &self.product {
            facts.set("Product", product.as_str());
        }
        if !self.allow_list.is_empty() {
            facts.set("allow_list", self.allow_list.clone());
        }
        if !self.deny_list.is_empty() {
            facts.set("deny_list", self.deny_list.clone());
        }
        if let Some(dir) = &self.plugin_dir {
            facts.set("plugin_dir", dir.display().to_string());
        }

        let (start, end) = self.time_window(now)?;
        facts.set("start_time", start.timestamp());
        facts.set("end_time", end.timestamp());

        for (name, value) in dynamic {
            facts.set_coerced(&name, &value);
        }
        Ok(())
    }

    fn time_window(
        &self,
        now: DateTime<Utc>,
    ) -> trawl_common::Result<(DateTime<Utc>, DateTime<Utc>)> {
        if !self.hours.is_finite() || self.hours < 0.0 {
            return Err(TrawlError::InvalidArgument(format!(
                "Invalid hours: {}",
                self.hours
            )));
        }
        let end = self.end_time.unwrap_or(now);
        let start = match self.start_time {
            Some(start) => start,
            None => Duration::try_seconds((self.hours * 3600.0) as i64)
                .and_then(|window| end.checked_sub_signed(window))
                .ok_or_else(|| {
                    TrawlError::InvalidArgument(format!("Invalid hours: {}", self.hours))
                })?,
        };
        if start > end {
            return Err(TrawlError::InvalidArgument(format!(
                "Start time {} is after end time {}",
                start.to_rfc3339(),
                end.to_rfc3339()
            )));
        }
        Ok((start, end))
    }
}

/// Epoch seconds or an RFC 3339 timestamp
fn parse_time(raw: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(secs) = raw.parse::<f64>() {
        return DateTime::<Utc>::from_timestamp(secs.trunc() as i64, 0)
            .ok_or_else(|| format!("timestamp out of range: {}", raw));
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("expected epoch seconds or RFC 3339 time: {}", e))
}

/// Split trailing `NAME=VALUE` arguments
pub fn parse_dynamic(args: &[String]) -> trawl_common::Result<Vec<(String, String)>> {
    args.iter()
        .map(|arg| match arg.split_once('=') {
            Some((name, value)) if !name.trim().is_empty() => {
                Ok((name.trim().to_string(), value.to_string()))
            }
            _ => Err(TrawlError::InvalidArgument(format!(
                "Unexpected argument '{}': extra arguments must look like NAME=VALUE",
                arg
            ))),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("trawl").chain(args.iter().copied())).unwrap()
    }

    fn now() -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap()
    }

    fn seeded(cli: &Cli, config: &TrawlConfig) -> FactTable {
        let mut facts = FactTable::new();
        cli.seed(config, &mut facts, now()).unwrap();
        facts
    }

    #[test]
    fn test_defaults() {
        let cli = parse(&[]);
        let facts = seeded(&cli, &TrawlConfig::default());

        assert_eq!(cli.report_name(&TrawlConfig::default()), "StdOut");
        assert_eq!(facts.get("timeout"), Some(&FactValue::Int(600)));
        assert_eq!(facts.get("plugin_dir"), Some(&FactValue::Text("/opt/trawl".into())));
        assert!(facts.flag("truncate"));
        assert!(!facts.verbose());
        assert!(!facts.flag("debug"));
        assert_eq!(facts.get("end_time"), Some(&FactValue::Int(1_700_000_000)));
        assert_eq!(
            facts.get("start_time"),
            Some(&FactValue::Int(1_700_000_000 - 24 * 3600))
        );
    }

    #[test]
    fn test_flags_become_facts() {
        let cli = parse(&[
            "-p", "4242", "--product", "nginx", "-t", "2.5", "-v", "--no-truncate",
            "--white-list", "LoadAvg,DiskUsage", "--black-list", "BuddyInfo",
            "--plugin-dir", "/srv/plugins", "--hours", "1",
        ]);
        let facts = seeded(&cli, &TrawlConfig::default());

        assert_eq!(facts.get("pid"), Some(&FactValue::Int(4242)));
        assert_eq!(facts.get("Product"), Some(&FactValue::Text("nginx".into())));
        assert_eq!(facts.timeout().as_millis(), 2500);
        assert!(facts.verbose());
        assert!(!facts.flag("truncate"));
        assert_eq!(facts.names("allow_list"), vec!["LoadAvg", "DiskUsage"]);
        assert_eq!(facts.names("deny_list"), vec!["BuddyInfo"]);
        assert_eq!(facts.get("plugin_dir"), Some(&FactValue::Text("/srv/plugins".into())));
        assert_eq!(
            facts.get("start_time"),
            Some(&FactValue::Int(1_700_000_000 - 3600))
        );
    }

    #[test]
    fn test_last_truncate_flag_wins() {
        assert_eq!(parse(&["--no-truncate", "--truncate"]).truncate_flag(), Some(true));
        assert_eq!(parse(&["--truncate", "--no-truncate"]).truncate_flag(), Some(false));
        assert_eq!(parse(&[]).truncate_flag(), None);
    }

    #[test]
    fn test_precedence() {
        let config: TrawlConfig = toml::from_str(
            r#"
            timeout = 30
            verbose = true
            report = "Json"
            [facts]
            Datacenter = "lva1"
            "#,
        )
        .unwrap();

        let facts = seeded(&parse(&[]), &config);
        assert_eq!(facts.get("timeout"), Some(&FactValue::Int(30)));
        assert!(facts.verbose());
        assert_eq!(parse(&[]).report_name(&config), "Json");

        let cli = parse(&["-t", "5", "-r", "StdOut", "timeout=7", "Datacenter=ord1"]);
        let facts = seeded(&cli, &config);
        assert_eq!(facts.get("timeout"), Some(&FactValue::Int(7)));
        assert_eq!(facts.get("datacenter"), Some(&FactValue::Text("ord1".into())));
        assert_eq!(cli.report_name(&config), "StdOut");
    }

    #[test]
    fn test_explicit_time_window() {
        let cli = parse(&[
            "--start-time", "2023-11-14T00:00:00Z", "--end-time", "1699999999",
        ]);
        let facts = seeded(&cli, &TrawlConfig::default());
        assert_eq!(facts.get("start_time"), Some(&FactValue::Int(1_699_920_000)));
        assert_eq!(facts.get("end_time"), Some(&FactValue::Int(1_699_999_999)));

        let backwards = parse(&["--start-time", "1699999999", "--end-time", "1699000000"]);
        let mut facts = FactTable::new();
        let err = backwards
            .seed(&TrawlConfig::default(), &mut facts, now())
            .unwrap_err();
        assert_eq!(err.code(), 64);
    }

    #[test]
    fn test_bad_time_rejected_by_parser() {
        let result = Cli::try_parse_from(["trawl", "--start-time", "yesterday"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_stray_argument_rejected() {
        let cli = parse(&["Product=nginx", "oops"]);
        let mut facts = FactTable::new();
        let err = cli
            .seed(&TrawlConfig::default(), &mut facts, now())
            .unwrap_err();
        assert_eq!(err.code(), 64);
        assert!(err.to_string().contains("oops"));
        assert!(!facts.contains("Product"));

        assert!(parse_dynamic(&["=value".to_string()]).is_err());
    }

    #[test]
    fn test_out_of_range_timeout_rejected() {
        for args in [&["-t", "1e20"][..], &["--time-out=-1"], &["timeout=1e20"], &["TIMEOUT=soon"]] {
            let mut facts = FactTable::new();
            let err = parse(args)
                .seed(&TrawlConfig::default(), &mut facts, now())
                .unwrap_err();
            assert_eq!(err.code(), 64, "{:?}", args);
            assert!(facts.timeout().as_secs() <= 600);
        }

        let facts = seeded(&parse(&["timeout=3600"]), &TrawlConfig::default());
        assert_eq!(facts.timeout().as_secs(), 3600);
    }

    #[test]
    fn test_unknown_flag_rejected() {
        assert!(Cli::try_parse_from(["trawl", "--frobnicate"]).is_err());
    }

    #[test]
    fn test_dynamic_values_are_coerced() {
        let dynamic = parse_dynamic(&["retries=3".into(), "ratio=0.5".into(), "dry=true".into()])
            .unwrap();
        let mut facts = FactTable::new();
        for (name, value) in dynamic {
            facts.set_coerced(&name, &value);
        }
        assert_eq!(facts.get("retries"), Some(&FactValue::Int(3)));
        assert_eq!(facts.get("ratio"), Some(&FactValue::Float(0.5)));
        assert_eq!(facts.get("dry"), Some(&FactValue::Bool(true)));
    }
}

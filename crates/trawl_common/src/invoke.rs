//! Uniform per-unit invocation
//!
//! Same semantics for Fact and Check units: ask whether to run, run against
//! the fact table, turn any error or panic into a crash report, then decide
//! whether the result is worth reporting.

use crate::facts::FactTable;
use crate::stream::ResultTuple;
use crate::unit::UnitDescriptor;
use std::backtrace::{Backtrace, BacktraceStatus};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Mutex;
use tracing::debug;

/// Backtrace of the most recent panic, filled by the worker's panic hook
static LAST_PANIC: Mutex<Option<String>> = Mutex::new(None);

/// Route panics into crash reports instead of stderr.
///
/// Only call this in a process that exists to run units.
pub fn install_panic_capture() {
    panic::set_hook(Box::new(|info| {
        let trace = Backtrace::force_capture().to_string();
        let mut slot = match LAST_PANIC.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *slot = Some(format!("{}\n{}", info, trace));
    }));
}

fn take_panic_trace() -> Option<String> {
    match LAST_PANIC.lock() {
        Ok(mut guard) => guard.take(),
        Err(poisoned) => poisoned.into_inner().take(),
    }
}

/// What happened when a unit ran
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Skipped,
    Completed(Option<String>),
    Crashed(String),
}

/// Build the crash report for a failed unit.
///
/// Rust has no reflective view of stack locals, so the report lists every
/// fact the unit could see instead.
pub fn crash_report(message: &str, causes: &[String], trace: &str, facts: &FactTable) -> String {
    let mut report = String::from("Crash Report (Execution Failed)\n");
    report.push_str("---error---\n");
    report.push_str(message);
    report.push('\n');
    if !causes.is_empty() {
        report.push_str("---causes---\n");
        for cause in causes {
            report.push_str(cause);
            report.push('\n');
        }
    }
    report.push_str("---backtrace---\n");
    report.push_str(trace.trim_end());
    report.push('\n');
    report.push_str("---facts---\n");
    for (name, value) in facts.iter() {
        report.push_str(&format!("{}={}\n", name, value));
    }
    report
}

fn render_error(err: &anyhow::Error, facts: &FactTable) -> String {
    let causes: Vec<String> = err.chain().skip(1).map(|c| c.to_string()).collect();
    let backtrace = err.backtrace();
    let trace = match backtrace.status() {
        BacktraceStatus::Captured => backtrace.to_string(),
        _ => "not captured (set RUST_BACKTRACE=1)".to_string(),
    };
    crash_report(&err.to_string(), &causes, &trace, facts)
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("panic: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("panic: {}", s)
    } else {
        "panic with a non-text payload".to_string()
    }
}

/// Run one fresh instance of `unit` and classify the result
pub fn execute(unit: &UnitDescriptor, facts: &FactTable) -> (Outcome, bool) {
    let mut instance = unit.instantiate();

    if !instance.should_run(facts) {
        debug!("{}: should_run returned false, skipping", unit.full_name());
        return (Outcome::Skipped, false);
    }

    debug!("{}: starting", unit.full_name());
    let result = panic::catch_unwind(AssertUnwindSafe(|| instance.run(facts)));

    let outcome = match result {
        Ok(Ok(output)) => {
            debug!("{}: finished", unit.full_name());
            Outcome::Completed(output)
        }
        Ok(Err(err)) => Outcome::Crashed(render_error(&err, facts)),
        Err(payload) => {
            let trace = take_panic_trace().unwrap_or_else(|| "unavailable".to_string());
            Outcome::Crashed(crash_report(&panic_message(payload.as_ref()), &[], &trace, facts))
        }
    };

    let output = match &outcome {
        Outcome::Completed(output) => output.as_deref(),
        _ => None,
    };
    let notify = instance.should_notify(output);
    (outcome, notify)
}

/// Run `unit` and produce the tuple to enqueue, if any.
///
/// Notable output is always reported. Verbose runs also report crash
/// reports and clean runs (as a tuple without output).
pub fn invoke(unit: &UnitDescriptor, facts: &FactTable) -> Option<ResultTuple> {
    invoke_with(unit, facts, facts.verbose())
}

/// `invoke` with verbosity decided by the caller
pub fn invoke_with(unit: &UnitDescriptor, facts: &FactTable, verbose: bool) -> Option<ResultTuple> {
    let (outcome, notify) = execute(unit, facts);

    match outcome {
        Outcome::Skipped => None,
        Outcome::Completed(output) if notify => Some(ResultTuple::new(unit.name(), output)),
        Outcome::Crashed(report) => {
            debug!("{}: error report:\n{}", unit.full_name(), report);
            verbose.then(|| ResultTuple::new(unit.name(), Some(report)))
        }
        Outcome::Completed(_) => verbose.then(|| ResultTuple::new(unit.name(), None)),
    }
}

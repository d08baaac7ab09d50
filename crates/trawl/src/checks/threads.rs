use anyhow::Result;
use std::collections::BTreeMap;
use trawl_common::{shell_call, FactTable, Unit};

/// Per-user thread total above which a user is reported
pub const THREAD_LIMIT: u64 = 10_000;

/// Sums threads per user via `ps`
#[derive(Default)]
pub struct ThreadCount;

impl Unit for ThreadCount {
    fn run(&mut self, _facts: &FactTable) -> Result<Option<String>> {
        let out = shell_call("ps -e -o thcount,user")?;
        Ok(evaluate(&out.stdout))
    }
}

fn evaluate(ps: &str) -> Option<String> {
    let mut totals: BTreeMap<&str, u64> = BTreeMap::new();
    for row in ps.lines() {
        let mut columns = row.split_whitespace();
        let (Some(count), Some(user)) = (columns.next(), columns.next()) else {
            continue;
        };
        // header row and unparseable counts
        if let Ok(count) = count.parse::<u64>() {
            *totals.entry(user).or_default() += count;
        }
    }

    let report: String = totals
        .iter()
        .filter(|(_, total)| **total > THREAD_LIMIT)
        .map(|(user, total)| format!("user {} currently has {} threads\n", user, total))
        .collect();
    (!report.is_empty()).then_some(report)
}

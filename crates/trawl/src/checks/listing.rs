use anyhow::Result;
use trawl_common::{FactTable, Unit};

/// Lists every fact in use, only in verbose runs
#[derive(Default)]
pub struct ListFacts;

impl Unit for ListFacts {
    fn run(&mut self, facts: &FactTable) -> Result<Option<String>> {
        let lines: Vec<String> = facts
            .iter()
            .map(|(name, value)| format!("{}={}", name, value))
            .collect();
        Ok(Some(lines.join("\n")))
    }

    fn should_run(&self, facts: &FactTable) -> bool {
        facts.verbose()
    }
}

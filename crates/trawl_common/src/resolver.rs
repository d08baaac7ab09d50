//! Fixpoint fact resolution
//!
//! Fact units run in passes until a pass adds no new name to the table.
//! The table only grows and the set of units is finite, so this ends after
//! at most one pass more than the number of units that ever add a fact.

use crate::error::Result;
use crate::facts::{FactTable, FactValue};
use crate::runner::{self, Phase};
use crate::unit::UnitDescriptor;
use std::collections::HashSet;
use tracing::debug;

/// Resolve facts into `facts`; returns the number of passes run
pub fn resolve(facts: &mut FactTable, units: &[UnitDescriptor]) -> Result<usize> {
    let mut passes = 0;

    loop {
        let size = facts.len();
        passes += 1;
        debug!("Fact pass {} with {} known facts", passes, size);

        let mut stream = runner::run(units, facts, Phase::Facts)?;
        let mut added = HashSet::new();

        for tuple in stream.by_ref() {
            if tuple.is_stats() {
                debug!("{}", tuple.output.as_deref().unwrap_or_default());
                continue;
            }
            let Some(output) = tuple.output else {
                continue;
            };

            let key = tuple.name.to_lowercase();
            if added.contains(&key) {
                debug!(
                    "Fact {} was already added in this pass, discarding {}",
                    tuple.name, output
                );
                continue;
            }
            if facts.insert_discovered(&tuple.name, FactValue::coerce(&output)) {
                added.insert(key);
            }
        }

        if facts.len() == size {
            debug!("Facts resolved after {} passes", passes);
            return Ok(passes);
        }
    }
}

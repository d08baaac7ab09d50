use crate::reports::TABLE_FORMATTING_WIDTH;
use trawl_common::{shell_call, FactTable, FactValue, Unit};

/// Width used when there is no terminal to ask
pub const HEADLESS_WIDTH: usize = 132;

/// Columns of the terminal trawl was started from
#[derive(Default)]
pub struct TerminalWidth;

impl Unit for TerminalWidth {
    fn run(&mut self, _facts: &FactTable) -> anyhow::Result<Option<String>> {
        let columns = shell_call("stty size")
            .ok()
            .filter(|out| out.success())
            .and_then(|out| parse_stty_size(&out.stdout))
            .unwrap_or(HEADLESS_WIDTH);
        Ok(Some(columns.to_string()))
    }
}

/// `stty size` prints "rows columns"
fn parse_stty_size(out: &str) -> Option<usize> {
    let mut parts = out.split_whitespace();
    let _rows: usize = parts.next()?.parse().ok()?;
    let columns: usize = parts.next()?.parse().ok()?;
    if parts.next().is_some() || columns == 0 {
        return None;
    }
    Some(columns)
}

/// Widest output a unit can produce without being truncated by the report
#[derive(Default)]
pub struct MaxUnitOutputWidth;

impl Unit for MaxUnitOutputWidth {
    fn run(&mut self, facts: &FactTable) -> anyhow::Result<Option<String>> {
        let width = facts
            .get("TerminalWidth")
            .and_then(FactValue::as_i64)
            .filter(|w| *w > TABLE_FORMATTING_WIDTH as i64);
        Ok(width.map(|w| (w - TABLE_FORMATTING_WIDTH as i64).to_string()))
    }

    fn should_run(&self, facts: &FactTable) -> bool {
        facts.contains("TerminalWidth")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_stty_size() {
        assert_eq!(parse_stty_size("50 211\n"), Some(211));
        assert_eq!(parse_stty_size(""), None);
        assert_eq!(parse_stty_size("stty: 'standard input': Inappropriate ioctl"), None);
    }

    #[test]
    fn test_terminal_width_always_answers() {
        let width = TerminalWidth.run(&FactTable::new()).unwrap().unwrap();
        assert!(width.parse::<usize>().unwrap() > 0);
    }

    #[test]
    fn test_max_output_width() {
        let mut facts = FactTable::new();
        assert!(!MaxUnitOutputWidth.should_run(&facts));

        facts.set("TerminalWidth", 132i64);
        assert_eq!(
            MaxUnitOutputWidth.run(&facts).unwrap().as_deref(),
            Some("128")
        );
    }
}

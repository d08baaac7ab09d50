use sysinfo::System;
use trawl_common::{shell_call, FactTable, Unit};

/// Fully qualified host name, falling back to the kernel's host name
#[derive(Default)]
pub struct Hostname;

impl Unit for Hostname {
    fn run(&mut self, _facts: &FactTable) -> anyhow::Result<Option<String>> {
        if let Ok(out) = shell_call("hostname -f") {
            let name = out.stdout.trim();
            if out.success() && !name.is_empty() {
                return Ok(Some(name.to_string()));
            }
        }
        Ok(System::host_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hostname_is_found() {
        let name = Hostname.run(&FactTable::new()).unwrap();
        assert!(name.is_some_and(|n| !n.is_empty()));
    }
}

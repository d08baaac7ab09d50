use anyhow::Result;
use trawl_common::{FactTable, Unit};

/// Names the other users logged into the host
#[derive(Default)]
pub struct OtherUsers;

impl Unit for OtherUsers {
    fn run(&mut self, facts: &FactTable) -> Result<Option<String>> {
        let Some(users) = facts.get("OtherUsers") else {
            return Ok(None);
        };
        let users: Vec<String> = users.to_string().split_whitespace().map(String::from).collect();
        Ok(Some(format!(
            "Other users logged into this box: {}\n",
            users.join(", ")
        )))
    }

    fn should_run(&self, facts: &FactTable) -> bool {
        facts.contains("OtherUsers")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lists_users() {
        let mut facts = FactTable::new();
        assert!(!OtherUsers.should_run(&facts));

        facts.set("OtherUsers", "amir zoe");
        assert_eq!(
            OtherUsers.run(&facts).unwrap().as_deref(),
            Some("Other users logged into this box: amir, zoe\n")
        );
    }
}

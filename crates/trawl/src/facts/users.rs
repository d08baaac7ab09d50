use nix::unistd::{getuid, User};
use std::collections::BTreeSet;
use trawl_common::{shell_call, FactTable, Unit};

/// Accounts whose sessions are never interesting
const BORING_USERS: &[&str] = &["root", "app"];

/// Logged-in users other than the one running trawl, space separated
#[derive(Default)]
pub struct OtherUsers;

impl Unit for OtherUsers {
    fn run(&mut self, _facts: &FactTable) -> anyhow::Result<Option<String>> {
        let out = shell_call("users")?;
        Ok(other_users(&out.stdout, current_user().as_deref()))
    }
}

fn current_user() -> Option<String> {
    match User::from_uid(getuid()) {
        Ok(Some(user)) => Some(user.name),
        _ => std::env::var("USER").ok(),
    }
}

fn other_users(users_output: &str, me: Option<&str>) -> Option<String> {
    let others: BTreeSet<&str> = users_output
        .split_whitespace()
        .filter(|u| !BORING_USERS.contains(u) && Some(*u) != me)
        .collect();
    if others.is_empty() {
        None
    } else {
        Some(others.into_iter().collect::<Vec<_>>().join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boring_users_dropped() {
        assert_eq!(other_users("root app deploy\n", Some("deploy")), None);
        assert_eq!(other_users("", None), None);
    }

    #[test]
    fn test_others_sorted_and_deduplicated() {
        assert_eq!(
            other_users("zoe deploy amir zoe root", Some("deploy")).as_deref(),
            Some("amir zoe")
        );
    }
}

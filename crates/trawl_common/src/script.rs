//! Units backed by executables in a local plugin directory
//!
//! The fact table goes to the executable as a JSON object on stdin. Its
//! trimmed stdout is the unit output; a non-zero exit is a unit failure.

use crate::facts::FactTable;
use crate::shell::shell_call_with_input;
use crate::unit::{Unit, UnitDescriptor, UnitKind};
use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};

/// Prefix for the full name of every directory-sourced unit
pub const LOCAL_PREFIX: &str = "local";

/// Executable plugin
pub struct ScriptUnit {
    path: PathBuf,
}

impl ScriptUnit {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Descriptor for an executable found under `root`
    pub fn descriptor(kind: UnitKind, root: &Path, path: &Path) -> Option<UnitDescriptor> {
        let name = path.file_stem()?.to_str()?.to_string();
        let relative = path.strip_prefix(root).ok()?.with_extension("");
        let dotted: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        let full_name = format!("{}.{}", LOCAL_PREFIX, dotted.join("."));

        let owned = path.to_path_buf();
        Some(UnitDescriptor::from_factory(kind, &name, &full_name, move || {
            Box::new(ScriptUnit::new(owned.clone()))
        }))
    }
}

impl Unit for ScriptUnit {
    fn run(&mut self, facts: &FactTable) -> Result<Option<String>> {
        let input = serde_json::to_vec(&facts.to_json())?;
        let command = self
            .path
            .to_str()
            .context("Plugin path is not valid UTF-8")?;
        if command.contains(char::is_whitespace) {
            bail!("Plugin path contains whitespace: {}", command);
        }

        let output = shell_call_with_input(command, &input)
            .with_context(|| format!("Failed to execute {}", self.path.display()))?;

        if !output.success() {
            let code = output
                .exit_code
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string());
            bail!(
                "{} exited with {}: {}",
                self.path.display(),
                code,
                output.stderr.trim()
            );
        }

        let text = output.stdout.trim();
        if text.is_empty() {
            Ok(None)
        } else {
            Ok(Some(text.to_string()))
        }
    }
}

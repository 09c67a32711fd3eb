//! Structured run configuration for the external emulator.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::io;
use std::path::Path;

/// Key/value settings, serialized by [`RunConfig::render`] only.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunConfig {
    entries: BTreeMap<String, String>,
}

impl RunConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, key: &str, value: impl ToString) -> &mut Self {
        self.entries.insert(key.to_string(), value.to_string());
        self
    }

    pub fn set_bool(&mut self, key: &str, value: bool) -> &mut Self {
        self.set(key, if value { "true" } else { "false" })
    }

    pub fn extend(&mut self, entries: impl IntoIterator<Item = (String, String)>) -> &mut Self {
        self.entries.extend(entries);
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// One `key = "value"` line per entry, in key order.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (key, value) in &self.entries {
            let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
            let _ = writeln!(out, "{key} = \"{escaped}\"");
        }
        out
    }

    pub fn write_to(&self, path: &Path) -> io::Result<()> {
        fs::write(path, self.render())
    }
}

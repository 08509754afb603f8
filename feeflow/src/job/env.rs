//! Environment overrides for a job's child process.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;

/// Static environment overrides layered over the inherited environment.
///
/// Values may reference the orchestrator's own environment as `${NAME}`.
/// References are expanded on every call to [`EnvOverrides::resolve`], so a
/// changed variable reaches the next run without a restart. Unknown
/// references are left in place verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnvOverrides(BTreeMap<String, String>);

impl EnvOverrides {
    /// Creates an empty set of overrides.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an override.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(key.into(), value.into());
        self
    }

    /// Number of overrides.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when there are no overrides.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Raw, unexpanded overrides.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Overrides with `${NAME}` references expanded against the current
    /// process environment.
    #[must_use]
    pub fn resolve(&self) -> Vec<(String, String)> {
        self.0
            .iter()
            .map(|(k, v)| (k.clone(), expand_env_vars(v)))
            .collect()
    }
}

impl FromIterator<(String, String)> for EnvOverrides {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Expands `${NAME}` references in `input`.
#[must_use]
pub fn expand_env_vars(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '$' || chars.peek() != Some(&'{') {
            out.push(ch);
            continue;
        }

        chars.next(); // '{'
        let mut name = String::new();
        let mut closed = false;
        for c in chars.by_ref() {
            if c == '}' {
                closed = true;
                break;
            }
            name.push(c);
        }

        match env::var(&name) {
            Ok(val) if closed => out.push_str(&val),
            _ => {
                out.push_str("${");
                out.push_str(&name);
                if closed {
                    out.push('}');
                }
            }
        }
    }

    out
}

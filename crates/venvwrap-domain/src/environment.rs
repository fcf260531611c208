use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::os::OsFamily;
use crate::path::{reconcile_path, PathReconcileError};

/// Variables dropped from every captured dump. Build agents hand each session a
/// cookie that must never leak into a wrapped step.
pub const IGNORED_VARIABLES: [&str; 1] = ["HUDSON_COOKIE"];

pub const PATH_VARIABLE: &str = "PATH";

/// Delta key carrying the entries activation prepended to `PATH`.
///
/// Consumers must prepend its value to their own `PATH` instead of replacing
/// it, so that contributions from other sources compose.
pub const PATH_ADDITION_KEY: &str = "PATH+PYTHON";

/// Ordered `KEY=VALUE` view of one environment dump.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EnvironmentSnapshot {
    vars: IndexMap<String, String>,
}

impl EnvironmentSnapshot {
    /// Parses `env`/`SET` output. Values may contain `=`; lines without one,
    /// lines with an empty name, and lines mentioning an ignored variable are
    /// skipped.
    #[must_use]
    pub fn parse(output: &str) -> Self {
        let mut vars = IndexMap::new();
        for line in output.split('\n') {
            let line = line.strip_suffix('\r').unwrap_or(line);
            if IGNORED_VARIABLES.iter().any(|name| line.contains(name)) {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            if key.is_empty() {
                continue;
            }
            vars.insert(key.to_string(), value.to_string());
        }
        Self { vars }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Looks a variable up the way `os` resolves names: exactly on Unix,
    /// ignoring ASCII case on Windows.
    #[must_use]
    pub fn get_for(&self, key: &str, os: OsFamily) -> Option<&str> {
        match os {
            OsFamily::Unix => self.get(key),
            OsFamily::Windows => self
                .vars
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(key))
                .map(|(_, value)| value.as_str()),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for EnvironmentSnapshot {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

/// Variables a wrapped step must receive to behave as if the virtualenv were
/// activated.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnvironmentDelta {
    vars: IndexMap<String, String>,
}

impl EnvironmentDelta {
    /// Computes what activation changed between two dumps.
    ///
    /// Every variable new or different in `after` is kept, except `PATH`,
    /// which is reduced to its prepended entries under [`PATH_ADDITION_KEY`].
    /// On Windows names compare case-insensitively, so `SET`'s `Path` counts
    /// as `PATH`.
    pub fn between(
        before: &EnvironmentSnapshot,
        after: &EnvironmentSnapshot,
        os: OsFamily,
    ) -> Result<Self, PathReconcileError> {
        let mut vars = IndexMap::new();
        for (key, value) in after.iter() {
            if same_name(key, PATH_VARIABLE, os) {
                let original = before
                    .get_for(PATH_VARIABLE, os)
                    .ok_or(PathReconcileError::MissingBaseline)?;
                let addition = reconcile_path(original, value, os.list_separator())?;
                vars.insert(PATH_ADDITION_KEY.to_string(), addition);
            } else if before.get_for(key, os) != Some(value) {
                vars.insert(key.to_string(), value.to_string());
            }
        }
        Ok(Self { vars })
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    #[must_use]
    pub fn path_addition(&self) -> Option<&str> {
        self.get(PATH_ADDITION_KEY)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.vars.insert(key.into(), value.into());
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.vars.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Merges the delta into `env`.
    ///
    /// `NAME+SUFFIX` keys are additive: a non-empty value is prepended to
    /// `NAME` with the list separator of `os`. All other keys overwrite.
    /// Names match case-insensitively on Windows.
    pub fn apply_to(&self, env: &mut IndexMap<String, String>, os: OsFamily) {
        for (key, value) in &self.vars {
            match key.split_once('+') {
                Some((target, _)) if !target.is_empty() => {
                    if value.is_empty() {
                        continue;
                    }
                    let target = existing_name(env, target, os);
                    let composed = match env.get(&target) {
                        Some(existing) if !existing.is_empty() => {
                            format!("{value}{}{existing}", os.list_separator())
                        }
                        _ => value.clone(),
                    };
                    env.insert(target, composed);
                }
                _ => {
                    let name = existing_name(env, key, os);
                    env.insert(name, value.clone());
                }
            }
        }
    }
}

fn same_name(left: &str, right: &str, os: OsFamily) -> bool {
    match os {
        OsFamily::Windows => left.eq_ignore_ascii_case(right),
        OsFamily::Unix => left == right,
    }
}

fn existing_name(env: &IndexMap<String, String>, name: &str, os: OsFamily) -> String {
    match os {
        OsFamily::Windows => env
            .keys()
            .find(|key| key.eq_ignore_ascii_case(name))
            .cloned()
            .unwrap_or_else(|| name.to_string()),
        OsFamily::Unix => name.to_string(),
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for EnvironmentDelta {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            vars: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

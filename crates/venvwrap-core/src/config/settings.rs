use std::collections::HashMap;
use std::env;
use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use dirs_next::home_dir;
use tracing::debug;
use venvwrap_domain::OsFamily;

const WORKSPACE_ENV: &str = "VENVWRAP_WORKSPACE";
const AGENT_WORKSPACE_ENV: &str = "WORKSPACE";
const TARGET_OS_ENV: &str = "VENVWRAP_TARGET_OS";
const POLL_INTERVAL_ENV: &str = "VENVWRAP_POLL_INTERVAL_MS";
const TOOL_REGISTRY_ENV: &str = "VENVWRAP_TOOL_REGISTRY";
const TOOL_REGISTRY_FILENAME: &str = "tools.json";

const DEFAULT_POLL_INTERVAL_MS: u64 = 100;
const MIN_POLL_INTERVAL_MS: u64 = 10;
const MAX_POLL_INTERVAL_MS: u64 = 5_000;

/// Command-line overrides that take precedence over the environment.
#[derive(Debug, Clone, Default)]
pub struct GlobalOptions {
    pub workspace: Option<String>,
    pub target_os: Option<OsFamily>,
}

#[derive(Debug, Clone)]
pub(crate) struct EnvSnapshot {
    vars: HashMap<String, String>,
}

impl EnvSnapshot {
    pub(crate) fn capture() -> Self {
        Self::from_os_vars(env::vars_os())
    }

    /// Keeps only variables whose name and value are valid UTF-8; none of the
    /// settings can be spelled otherwise.
    pub(crate) fn from_os_vars(vars: impl IntoIterator<Item = (OsString, OsString)>) -> Self {
        let vars = vars
            .into_iter()
            .filter_map(|(key, value)| match (key.into_string(), value.into_string()) {
                (Ok(key), Ok(value)) => Some((key, value)),
                (Ok(key), Err(_)) => {
                    debug!(variable = %key, "ignoring variable with a non-UTF-8 value");
                    None
                }
                (Err(key), _) => {
                    debug!(variable = %key.to_string_lossy(), "ignoring non-UTF-8 variable name");
                    None
                }
            })
            .collect();
        Self { vars }
    }

    pub(crate) fn var(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.trim().is_empty())
    }

    #[cfg(test)]
    pub(crate) fn testing(pairs: &[(&str, &str)]) -> Self {
        let vars = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Self { vars }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub(crate) workspace: String,
    pub(crate) os: OsFamily,
    pub(crate) poll_interval: Duration,
    pub(crate) tool_registry: PathBuf,
}

impl Config {
    /// Builds a configuration snapshot from the current process environment.
    ///
    /// # Errors
    /// Returns an error if a variable is malformed or no workspace/registry
    /// location can be determined.
    pub fn from_env(global: &GlobalOptions) -> Result<Self> {
        Self::from_snapshot(&EnvSnapshot::capture(), global)
    }

    pub(crate) fn from_snapshot(snapshot: &EnvSnapshot, global: &GlobalOptions) -> Result<Self> {
        let workspace = match global
            .workspace
            .as_deref()
            .or_else(|| snapshot.var(WORKSPACE_ENV))
            .or_else(|| snapshot.var(AGENT_WORKSPACE_ENV))
        {
            Some(dir) => dir.to_string(),
            None => env::current_dir()
                .context("resolving current directory as workspace")?
                .to_string_lossy()
                .to_string(),
        };

        let os = match (global.target_os, snapshot.var(TARGET_OS_ENV)) {
            (Some(os), _) => os,
            (None, Some(raw)) => raw
                .parse()
                .map_err(|err: String| anyhow!("{TARGET_OS_ENV}: {err}"))?,
            (None, None) => OsFamily::host(),
        };

        let poll_ms = match snapshot.var(POLL_INTERVAL_ENV) {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .with_context(|| format!("{POLL_INTERVAL_ENV} must be milliseconds, got `{raw}`"))?
                .clamp(MIN_POLL_INTERVAL_MS, MAX_POLL_INTERVAL_MS),
            None => DEFAULT_POLL_INTERVAL_MS,
        };

        let tool_registry = match snapshot.var(TOOL_REGISTRY_ENV) {
            Some(path) => PathBuf::from(path),
            None => home_dir()
                .ok_or_else(|| anyhow!("home directory not found; set {TOOL_REGISTRY_ENV}"))?
                .join(".venvwrap")
                .join(TOOL_REGISTRY_FILENAME),
        };

        Ok(Self {
            workspace,
            os,
            poll_interval: Duration::from_millis(poll_ms),
            tool_registry,
        })
    }

    #[must_use]
    pub fn workspace(&self) -> &str {
        &self.workspace
    }

    #[must_use]
    pub fn os(&self) -> OsFamily {
        self.os
    }

    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    #[must_use]
    pub fn tool_registry(&self) -> &PathBuf {
        &self.tool_registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_variables_win() -> Result<()> {
        let snapshot = EnvSnapshot::testing(&[
            ("VENVWRAP_WORKSPACE", "/ci/ws"),
            ("WORKSPACE", "/agent/ws"),
            ("VENVWRAP_TARGET_OS", "windows"),
            ("VENVWRAP_POLL_INTERVAL_MS", "250"),
            ("VENVWRAP_TOOL_REGISTRY", "/etc/venvwrap/tools.json"),
        ]);
        let config = Config::from_snapshot(&snapshot, &GlobalOptions::default())?;
        assert_eq!(config.workspace(), "/ci/ws");
        assert_eq!(config.os(), OsFamily::Windows);
        assert_eq!(config.poll_interval(), Duration::from_millis(250));
        assert_eq!(
            config.tool_registry(),
            &PathBuf::from("/etc/venvwrap/tools.json")
        );
        Ok(())
    }

    #[test]
    fn agent_workspace_is_the_fallback() -> Result<()> {
        let snapshot = EnvSnapshot::testing(&[
            ("WORKSPACE", "/agent/ws"),
            ("VENVWRAP_TOOL_REGISTRY", "/tmp/tools.json"),
        ]);
        let config = Config::from_snapshot(&snapshot, &GlobalOptions::default())?;
        assert_eq!(config.workspace(), "/agent/ws");
        assert_eq!(config.os(), OsFamily::host());
        assert_eq!(
            config.poll_interval(),
            Duration::from_millis(DEFAULT_POLL_INTERVAL_MS)
        );
        Ok(())
    }

    #[test]
    fn global_options_override_environment() -> Result<()> {
        let snapshot = EnvSnapshot::testing(&[
            ("VENVWRAP_WORKSPACE", "/ci/ws"),
            ("VENVWRAP_TARGET_OS", "windows"),
            ("VENVWRAP_TOOL_REGISTRY", "/tmp/tools.json"),
        ]);
        let global = GlobalOptions {
            workspace: Some("/override".to_string()),
            target_os: Some(OsFamily::Unix),
        };
        let config = Config::from_snapshot(&snapshot, &global)?;
        assert_eq!(config.workspace(), "/override");
        assert_eq!(config.os(), OsFamily::Unix);
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn non_utf8_variables_are_skipped_when_capturing() -> Result<()> {
        use std::os::unix::ffi::OsStringExt;

        let snapshot = EnvSnapshot::from_os_vars([
            (OsString::from("VENVWRAP_WORKSPACE"), OsString::from("/ci/ws")),
            (
                OsString::from("VENVWRAP_TOOL_REGISTRY"),
                OsString::from("/tmp/tools.json"),
            ),
            (OsString::from("BINARY"), OsString::from_vec(vec![0xff, 0xfe])),
            (OsString::from_vec(vec![0xff]), OsString::from("value")),
        ]);
        assert_eq!(snapshot.var("BINARY"), None);
        assert_eq!(snapshot.vars.len(), 2);
        let config = Config::from_snapshot(&snapshot, &GlobalOptions::default())?;
        assert_eq!(config.workspace(), "/ci/ws");
        Ok(())
    }

    #[test]
    fn poll_interval_is_bounded() -> Result<()> {
        let snapshot = EnvSnapshot::testing(&[
            ("VENVWRAP_WORKSPACE", "/ws"),
            ("VENVWRAP_POLL_INTERVAL_MS", "0"),
            ("VENVWRAP_TOOL_REGISTRY", "/tmp/tools.json"),
        ]);
        let config = Config::from_snapshot(&snapshot, &GlobalOptions::default())?;
        assert_eq!(
            config.poll_interval(),
            Duration::from_millis(MIN_POLL_INTERVAL_MS)
        );
        Ok(())
    }

    #[test]
    fn malformed_values_are_rejected() {
        let bad_os = EnvSnapshot::testing(&[
            ("VENVWRAP_WORKSPACE", "/ws"),
            ("VENVWRAP_TARGET_OS", "beos"),
            ("VENVWRAP_TOOL_REGISTRY", "/tmp/tools.json"),
        ]);
        assert!(Config::from_snapshot(&bad_os, &GlobalOptions::default()).is_err());

        let bad_poll = EnvSnapshot::testing(&[
            ("VENVWRAP_WORKSPACE", "/ws"),
            ("VENVWRAP_POLL_INTERVAL_MS", "soon"),
            ("VENVWRAP_TOOL_REGISTRY", "/tmp/tools.json"),
        ]);
        assert!(Config::from_snapshot(&bad_poll, &GlobalOptions::default()).is_err());
    }
}

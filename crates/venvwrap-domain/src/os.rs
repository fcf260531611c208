use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Operating-system family of the agent the virtualenv lives on.
///
/// The target family is not necessarily the host family: paths, separators and
/// scripts are always derived from the value carried by the execution context.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OsFamily {
    Unix,
    Windows,
}

/// Per-family constants consulted by every path and script rule.
#[derive(Debug)]
pub struct OsConventions {
    pub path_separator: char,
    pub list_separator: &'static str,
    pub executable_suffix: &'static str,
    pub interpreter_name: &'static str,
    pub managed_markers: &'static [&'static str],
    pub baseline_script: &'static str,
}

const UNIX: OsConventions = OsConventions {
    path_separator: '/',
    list_separator: ":",
    executable_suffix: "",
    interpreter_name: "python",
    managed_markers: &["bin/activate", "bin/python", "include", "lib"],
    baseline_script: "env",
};

const WINDOWS: OsConventions = OsConventions {
    path_separator: '\\',
    list_separator: ";",
    executable_suffix: ".exe",
    interpreter_name: "python.exe",
    managed_markers: &[
        "Scripts\\activate.bat",
        "Scripts\\deactivate.bat",
        "Lib",
        "Include",
    ],
    baseline_script: "SET",
};

impl OsFamily {
    #[must_use]
    pub fn host() -> Self {
        if cfg!(windows) {
            Self::Windows
        } else {
            Self::Unix
        }
    }

    #[must_use]
    pub const fn conventions(self) -> &'static OsConventions {
        match self {
            Self::Unix => &UNIX,
            Self::Windows => &WINDOWS,
        }
    }

    #[must_use]
    pub const fn path_separator(self) -> char {
        self.conventions().path_separator
    }

    #[must_use]
    pub const fn list_separator(self) -> &'static str {
        self.conventions().list_separator
    }

    #[must_use]
    pub const fn is_unix(self) -> bool {
        matches!(self, Self::Unix)
    }

    /// Script that dumps the environment without activating anything.
    #[must_use]
    pub const fn baseline_script(self) -> &'static str {
        self.conventions().baseline_script
    }

    /// Script that activates the virtualenv at `directory`, then dumps the
    /// resulting environment.
    #[must_use]
    pub fn activation_script(self, directory: &str) -> String {
        let separator = self.path_separator();
        let directory = match directory.trim_end_matches(separator) {
            "" => directory,
            trimmed => trimmed,
        };
        match self {
            Self::Unix => format!(". \"{directory}/bin/activate\"; env"),
            Self::Windows => format!("@CALL \"{directory}\\Scripts\\activate.bat\"\r\nSET"),
        }
    }
}

impl fmt::Display for OsFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unix => f.write_str("unix"),
            Self::Windows => f.write_str("windows"),
        }
    }
}

impl FromStr for OsFamily {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "unix" | "linux" | "macos" | "darwin" => Ok(Self::Unix),
            "windows" | "win" => Ok(Self::Windows),
            other => Err(format!("unknown OS family `{other}` (expected unix or windows)")),
        }
    }
}

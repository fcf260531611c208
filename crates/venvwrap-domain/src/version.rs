use std::fmt;

/// Interpreter version as reported by `python --version`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct PythonVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl PythonVersion {
    /// Reads the version from the last whitespace-delimited token of
    /// `python --version` output (`Python 3.8.10`).
    #[must_use]
    pub fn from_version_output(output: &str) -> Option<Self> {
        output.split_whitespace().last().and_then(Self::parse)
    }

    /// Requires at least three dot-separated components. Major and minor must
    /// be numeric. The patch component is deliberately looser than the other
    /// two: it only needs leading digits, and any suffix is dropped, so that
    /// pre-releases such as `3.13.0rc1` still count. A patch with no leading
    /// digit (`3.9.x`) is rejected.
    #[must_use]
    pub fn parse(token: &str) -> Option<Self> {
        let parts: Vec<&str> = token.split('.').collect();
        if parts.len() < 3 {
            return None;
        }
        let major = parts[0].parse().ok()?;
        let minor = parts[1].parse().ok()?;
        let digits: String = parts[2].chars().take_while(char::is_ascii_digit).collect();
        let patch = digits.parse().ok()?;
        Some(Self {
            major,
            minor,
            patch,
        })
    }

    /// Whether the standard library ships the `venv` module.
    #[must_use]
    pub fn supports_venv(self) -> bool {
        self.major > 3 || (self.major == 3 && self.minor >= 6)
    }
}

impl fmt::Display for PythonVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Command line that creates a virtualenv at `target` from `interpreter`.
///
/// Interpreters known to bundle `venv` use it; anything else, including an
/// unparseable version, falls back to the `virtualenv` package.
#[must_use]
pub fn creation_argv(
    interpreter: &str,
    target: &str,
    version: Option<PythonVersion>,
) -> Vec<String> {
    if version.is_some_and(PythonVersion::supports_venv) {
        vec![
            interpreter.to_string(),
            "-m".to_string(),
            "venv".to_string(),
            target.to_string(),
        ]
    } else {
        vec![
            interpreter.to_string(),
            "-m".to_string(),
            "virtualenv".to_string(),
            format!("--python={interpreter}"),
            target.to_string(),
        ]
    }
}

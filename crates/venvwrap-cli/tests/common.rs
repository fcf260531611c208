#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command as StdCommand, Stdio};

use assert_cmd::assert::Assert;
use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use serde_json::Value;
use tempfile::TempDir;

/// Scratch workspace plus a private tool registry for one test.
pub struct Sandbox {
    pub dir: TempDir,
}

impl Sandbox {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("tempdir"),
        }
    }

    pub fn workspace(&self) -> PathBuf {
        self.dir.path().join("ws")
    }

    pub fn registry(&self) -> PathBuf {
        self.dir.path().join("registry").join("tools.json")
    }

    /// `venvwrap` pinned to this sandbox, independent of the caller's env.
    pub fn cmd(&self) -> Command {
        fs::create_dir_all(self.workspace()).expect("create workspace");
        let mut cmd = cargo_bin_cmd!("venvwrap");
        cmd.current_dir(self.workspace())
            .env("VENVWRAP_WORKSPACE", self.workspace())
            .env("VENVWRAP_TOOL_REGISTRY", self.registry())
            .env("VENVWRAP_POLL_INTERVAL_MS", "10")
            .env_remove("VENVWRAP_TARGET_OS")
            .env("NO_COLOR", "1");
        cmd
    }
}

pub fn parse_json(assert: &Assert) -> Value {
    serde_json::from_slice(&assert.get_output().stdout).expect("valid json")
}

pub fn stdout(assert: &Assert) -> String {
    String::from_utf8_lossy(&assert.get_output().stdout).to_string()
}

/// Lays out a complete Unix virtualenv whose activate script exports `FOO=bar`.
/// Returns the directory with a trailing separator, the way managed
/// virtualenvs are named.
pub fn fake_managed_virtualenv(root: &Path, activate_body: Option<&str>) -> String {
    let venv = root.join("managed-venv");
    fs::create_dir_all(venv.join("bin")).expect("bin");
    fs::create_dir_all(venv.join("include")).expect("include");
    fs::create_dir_all(venv.join("lib")).expect("lib");
    fs::write(venv.join("bin").join("python"), "").expect("python");
    let dir = venv.display().to_string();
    let body = activate_body.map_or_else(
        || {
            format!(
                "VIRTUAL_ENV=\"{dir}\"\nexport VIRTUAL_ENV\n\
                 PATH=\"{dir}/bin:$PATH\"\nexport PATH\n\
                 FOO=bar\nexport FOO\n"
            )
        },
        str::to_string,
    );
    fs::write(venv.join("bin").join("activate"), body).expect("activate");
    format!("{dir}/")
}

/// An interpreter able to build a virtualenv with pip bootstrapped, if any.
pub fn find_python_with_venv() -> Option<String> {
    let candidates = [
        std::env::var("PYTHON").ok(),
        Some("python3".to_string()),
        Some("python".to_string()),
    ];
    for candidate in candidates.into_iter().flatten() {
        let status = StdCommand::new(&candidate)
            .args(["-c", "import ensurepip, venv"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        if matches!(status, Ok(code) if code.success()) {
            return Some(candidate);
        }
    }
    None
}

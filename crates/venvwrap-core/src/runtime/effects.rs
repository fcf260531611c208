use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Result;
use venvwrap_domain::OsFamily;

use super::process::{run_command, spawn_script, RunOutput, ScriptController};
use crate::tooling::registry::{FileToolRegistry, ToolInstallation};

/// Runs external commands on the agent.
pub trait CommandRunner: Send + Sync {
    /// Runs `argv` to completion and returns its exit code with combined output.
    fn run(&self, argv: &[String], cwd: &Path) -> Result<RunOutput>;
    /// Starts `script` in the agent's shell and hands back a controller that
    /// reports completion by polling.
    fn run_capturing(
        &self,
        script: &str,
        cwd: &Path,
        env: &[(String, String)],
    ) -> Result<Box<dyn Controller>>;
}

pub trait Controller: Send {
    /// `None` until the script has exited.
    fn exit_status(&mut self) -> Result<Option<i32>>;
    /// Captured output; only meaningful once `exit_status` returned a code.
    fn output(&mut self) -> Result<Vec<u8>>;
    fn stop(&mut self) -> Result<()>;
}

/// Registry of named, pre-installed interpreters.
pub trait ToolRegistry: Send + Sync {
    fn list_installations(&self, descriptor: &str) -> Result<Vec<ToolInstallation>>;
}

pub trait FileSystem: Send + Sync {
    /// Whether `path` exists; relative paths are taken from `root`.
    fn exists(&self, root: &Path, path: &str) -> bool;
}

pub trait Effects: Send + Sync {
    fn commands(&self) -> &dyn CommandRunner;
    fn tools(&self) -> &dyn ToolRegistry;
    fn fs(&self) -> &dyn FileSystem;
}

pub type SharedEffects = Arc<dyn Effects>;

pub struct SystemEffects {
    commands: Arc<SystemCommandRunner>,
    tools: Arc<FileToolRegistry>,
    fs: Arc<SystemFileSystem>,
}

impl SystemEffects {
    #[must_use]
    pub fn new(shell: OsFamily, tool_registry: PathBuf) -> Self {
        Self {
            commands: Arc::new(SystemCommandRunner { shell }),
            tools: Arc::new(FileToolRegistry::new(tool_registry)),
            fs: Arc::new(SystemFileSystem),
        }
    }
}

impl Effects for SystemEffects {
    fn commands(&self) -> &dyn CommandRunner {
        self.commands.as_ref()
    }

    fn tools(&self) -> &dyn ToolRegistry {
        self.tools.as_ref()
    }

    fn fs(&self) -> &dyn FileSystem {
        self.fs.as_ref()
    }
}

struct SystemCommandRunner {
    shell: OsFamily,
}

impl CommandRunner for SystemCommandRunner {
    fn run(&self, argv: &[String], cwd: &Path) -> Result<RunOutput> {
        run_command(argv, cwd)
    }

    fn run_capturing(
        &self,
        script: &str,
        cwd: &Path,
        env: &[(String, String)],
    ) -> Result<Box<dyn Controller>> {
        Ok(Box::new(spawn_script(script, cwd, env, self.shell)?))
    }
}

impl Controller for ScriptController {
    fn exit_status(&mut self) -> Result<Option<i32>> {
        ScriptController::exit_status(self)
    }

    fn output(&mut self) -> Result<Vec<u8>> {
        ScriptController::output(self)
    }

    fn stop(&mut self) -> Result<()> {
        ScriptController::stop(self)
    }
}

struct SystemFileSystem;

impl FileSystem for SystemFileSystem {
    fn exists(&self, root: &Path, path: &str) -> bool {
        root.join(path).exists()
    }
}

use std::{
    env,
    ffi::OsString,
    io::{self, Read, Write},
    path::Path,
    process::{Child, Command, Stdio},
    sync::{Arc, Mutex, PoisonError},
    thread::{self, JoinHandle},
};

use anyhow::{anyhow, Context, Result};
use tempfile::TempPath;
use tracing::debug;
use venvwrap_domain::OsFamily;

#[derive(Debug, Clone)]
pub struct RunOutput {
    pub code: i32,
    /// stdout and stderr, interleaved in arrival order.
    pub combined: Vec<u8>,
}

impl RunOutput {
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.combined).to_string()
    }
}

/// Execute `argv` directly (no shell) and capture combined stdout/stderr.
///
/// # Errors
///
/// Returns an error when the argument list is empty, the program cannot be
/// spawned, or its output streams cannot be read.
pub fn run_command(argv: &[String], cwd: &Path) -> Result<RunOutput> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| anyhow!("empty command line"))?;
    let mut child = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("failed to start {program}"))?;

    let combined = Arc::new(Mutex::new(Vec::new()));
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout missing for {program}"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr missing for {program}"))?;
    let stdout_handle = {
        let sink = Arc::clone(&combined);
        thread::spawn(move || copy_into(stdout, &sink))
    };
    let stderr_handle = {
        let sink = Arc::clone(&combined);
        thread::spawn(move || copy_into(stderr, &sink))
    };

    let status = child
        .wait()
        .with_context(|| format!("failed to wait for {program}"))?;
    stdout_handle
        .join()
        .map_err(|_| anyhow!("stdout thread panicked"))??;
    stderr_handle
        .join()
        .map_err(|_| anyhow!("stderr thread panicked"))??;

    let combined = Arc::try_unwrap(combined)
        .map_err(|_| anyhow!("output buffer still shared for {program}"))?
        .into_inner()
        .unwrap_or_else(PoisonError::into_inner);
    Ok(RunOutput {
        code: status.code().unwrap_or(-1),
        combined,
    })
}

/// Execute a program with inherited stdio and an explicit environment.
///
/// # Errors
///
/// Returns an error when the program cannot be spawned.
pub fn run_command_passthrough(
    program: &Path,
    args: &[String],
    envs: &[(OsString, OsString)],
    cwd: &Path,
) -> Result<i32> {
    let status = Command::new(program)
        .args(args)
        .env_clear()
        .envs(envs.iter().map(|(k, v)| (k, v)))
        .current_dir(cwd)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .with_context(|| format!("failed to start {}", program.display()))?;
    Ok(status.code().unwrap_or(-1))
}

fn copy_into(mut reader: impl Read, sink: &Mutex<Vec<u8>>) -> Result<()> {
    let mut chunk = [0u8; 8192];
    loop {
        let read = reader.read(&mut chunk)?;
        if read == 0 {
            return Ok(());
        }
        sink.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(&chunk[..read]);
    }
}

fn read_all(mut reader: impl Read) -> io::Result<Vec<u8>> {
    let mut buffer = Vec::new();
    reader.read_to_end(&mut buffer)?;
    Ok(buffer)
}

/// A script running in the background; completion is observed by polling.
pub struct ScriptController {
    child: Child,
    stdout: Option<JoinHandle<io::Result<Vec<u8>>>>,
    stderr: Option<JoinHandle<io::Result<Vec<u8>>>>,
    captured: Option<Vec<u8>>,
    status: Option<i32>,
    // Keeps the generated batch file alive until the script is done.
    _script_file: Option<TempPath>,
}

/// Launch `script` through the shell of `shell`: `sh -c` on Unix, a temporary
/// batch file run by `cmd /C` on Windows.
///
/// # Errors
///
/// Returns an error when the batch file cannot be written or the shell cannot
/// be spawned.
pub fn spawn_script(
    script: &str,
    cwd: &Path,
    envs: &[(String, String)],
    shell: OsFamily,
) -> Result<ScriptController> {
    let (mut command, script_file) = match shell {
        OsFamily::Unix => {
            let mut command = Command::new("sh");
            command.arg("-c").arg(script);
            (command, None)
        }
        OsFamily::Windows => {
            let mut file = tempfile::Builder::new()
                .prefix("venvwrap")
                .suffix(".bat")
                .tempfile()
                .context("creating batch script")?;
            file.write_all(script.as_bytes())
                .context("writing batch script")?;
            let path = file.into_temp_path();
            let mut command = Command::new("cmd");
            command.arg("/C").arg(&*path);
            (command, Some(path))
        }
    };
    // Dumps must decode as UTF-8, so inherited variables that cannot are
    // hidden from the script.
    for (key, value) in env::vars_os() {
        if key.to_str().is_none() || value.to_str().is_none() {
            debug!(variable = %key.to_string_lossy(), "hiding non-UTF-8 variable from script");
            command.env_remove(&key);
        }
    }
    for (key, value) in envs {
        command.env(key, value);
    }
    let mut child = command
        .current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .with_context(|| format!("failed to start {shell} shell"))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout missing for script"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr missing for script"))?;
    Ok(ScriptController {
        child,
        stdout: Some(thread::spawn(move || read_all(stdout))),
        stderr: Some(thread::spawn(move || read_all(stderr))),
        captured: None,
        status: None,
        _script_file: script_file,
    })
}

impl ScriptController {
    /// `None` while the script is still running.
    ///
    /// # Errors
    ///
    /// Returns an error when the child status cannot be queried.
    pub fn exit_status(&mut self) -> Result<Option<i32>> {
        if self.status.is_none() {
            if let Some(status) = self.child.try_wait().context("polling script")? {
                self.status = Some(status.code().unwrap_or(-1));
            }
        }
        Ok(self.status)
    }

    /// Captured stdout. Blocks until the script closes its output.
    ///
    /// # Errors
    ///
    /// Returns an error when a reader thread failed.
    pub fn output(&mut self) -> Result<Vec<u8>> {
        if let Some(handle) = self.stdout.take() {
            let bytes = handle
                .join()
                .map_err(|_| anyhow!("stdout thread panicked"))?
                .context("reading script stdout")?;
            self.captured = Some(bytes);
        }
        if let Some(handle) = self.stderr.take() {
            let bytes = handle
                .join()
                .map_err(|_| anyhow!("stderr thread panicked"))?
                .context("reading script stderr")?;
            if !bytes.is_empty() {
                debug!(stderr = %String::from_utf8_lossy(&bytes), "script stderr");
            }
        }
        Ok(self.captured.clone().unwrap_or_default())
    }

    /// Kills the script if it is still running.
    ///
    /// # Errors
    ///
    /// Returns an error when the child cannot be reaped.
    pub fn stop(&mut self) -> Result<()> {
        if self.exit_status()?.is_some() {
            return Ok(());
        }
        if let Err(err) = self.child.kill() {
            if err.kind() != io::ErrorKind::InvalidInput {
                return Err(err).context("killing script");
            }
        }
        let status = self.child.wait().context("waiting for killed script")?;
        self.status = Some(status.code().unwrap_or(-1));
        Ok(())
    }
}

impl Drop for ScriptController {
    fn drop(&mut self) {
        if self.status.is_none() {
            let _ = self.stop();
        }
    }
}

use std::collections::{HashSet, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use venvwrap_domain::{OsFamily, PathReconcileError, VirtualenvDescriptor, PATH_ADDITION_KEY};

use super::*;
use crate::commands::{virtualenv_describe, virtualenv_env, VirtualenvRequest};
use crate::context::{CancellationFlag, ExecutionContext, LogSink};
use crate::effects::{CommandRunner, Controller, Effects, FileSystem, SharedEffects, ToolRegistry};
use crate::error::VenvError;
use crate::outcome::CommandStatus;
use crate::process::RunOutput;
use crate::tooling::registry::ToolInstallation;

const WORKSPACE: &str = "/ws";
const BASELINE: &str = "HOME=/root\nPATH=/usr/bin:/bin\nHUDSON_COOKIE=abc\n";
const ACTIVATED: &str = "HOME=/root\nPATH=/ws/.pyenv-python3/bin:/usr/bin:/bin\n\
VIRTUAL_ENV=/ws/.pyenv-python3\nHUDSON_COOKIE=xyz\n";

struct Dump {
    code: i32,
    output: Vec<u8>,
    pending_polls: usize,
    cancel: Option<CancellationFlag>,
}

impl Dump {
    fn ok(output: &str) -> Self {
        Self {
            code: 0,
            output: output.as_bytes().to_vec(),
            pending_polls: 0,
            cancel: None,
        }
    }

    fn failing(code: i32, output: &str) -> Self {
        Self {
            code,
            ..Self::ok(output)
        }
    }
}

struct FakeController {
    dump: Dump,
    stopped: Arc<AtomicBool>,
}

impl Controller for FakeController {
    fn exit_status(&mut self) -> Result<Option<i32>> {
        if let Some(flag) = &self.dump.cancel {
            flag.cancel();
            return Ok(None);
        }
        if self.dump.pending_polls > 0 {
            self.dump.pending_polls -= 1;
            return Ok(None);
        }
        Ok(Some(self.dump.code))
    }

    fn output(&mut self) -> Result<Vec<u8>> {
        Ok(self.dump.output.clone())
    }

    fn stop(&mut self) -> Result<()> {
        self.stopped.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
struct FakeRunner {
    version_output: Mutex<String>,
    creation: Mutex<Option<(i32, String)>>,
    dumps: Mutex<VecDeque<Dump>>,
    commands: Mutex<Vec<Vec<String>>>,
    scripts: Mutex<Vec<String>>,
    stopped: Arc<AtomicBool>,
}

impl CommandRunner for FakeRunner {
    fn run(&self, argv: &[String], _cwd: &Path) -> Result<RunOutput> {
        self.commands.lock().unwrap().push(argv.to_vec());
        if argv.get(1).map(String::as_str) == Some("--version") {
            return Ok(RunOutput {
                code: 0,
                combined: self.version_output.lock().unwrap().clone().into_bytes(),
            });
        }
        let (code, output) = self
            .creation
            .lock()
            .unwrap()
            .clone()
            .unwrap_or((0, String::new()));
        Ok(RunOutput {
            code,
            combined: output.into_bytes(),
        })
    }

    fn run_capturing(
        &self,
        script: &str,
        _cwd: &Path,
        _env: &[(String, String)],
    ) -> Result<Box<dyn Controller>> {
        self.scripts.lock().unwrap().push(script.to_string());
        let Some(dump) = self.dumps.lock().unwrap().pop_front() else {
            bail!("unexpected script {script}");
        };
        Ok(Box::new(FakeController {
            dump,
            stopped: self.stopped.clone(),
        }))
    }
}

#[derive(Default)]
struct FakeRegistry {
    installations: Mutex<Vec<ToolInstallation>>,
    broken: AtomicBool,
}

impl ToolRegistry for FakeRegistry {
    fn list_installations(&self, descriptor: &str) -> Result<Vec<ToolInstallation>> {
        if self.broken.load(Ordering::SeqCst) {
            return Err(anyhow!("registry unavailable"));
        }
        Ok(self
            .installations
            .lock()
            .unwrap()
            .iter()
            .filter(|tool| tool.descriptor == descriptor)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
struct FakeFs {
    present: Mutex<HashSet<String>>,
}

impl FileSystem for FakeFs {
    fn exists(&self, root: &Path, path: &str) -> bool {
        let full = if Path::new(path).is_absolute() {
            path.to_string()
        } else {
            root.join(path).to_string_lossy().to_string()
        };
        self.present.lock().unwrap().contains(&full)
    }
}

#[derive(Default)]
struct FakeEffects {
    runner: FakeRunner,
    registry: FakeRegistry,
    fs: FakeFs,
}

impl FakeEffects {
    fn with_paths(self, paths: &[&str]) -> Self {
        self.fs
            .present
            .lock()
            .unwrap()
            .extend(paths.iter().map(|p| (*p).to_string()));
        self
    }

    fn with_tool(self, name: &str, home: &str) -> Self {
        self.registry
            .installations
            .lock()
            .unwrap()
            .push(ToolInstallation::python(name, home));
        self
    }

    fn with_version(self, output: &str) -> Self {
        *self.runner.version_output.lock().unwrap() = output.to_string();
        self
    }

    fn with_dumps(self, dumps: Vec<Dump>) -> Self {
        self.runner.dumps.lock().unwrap().extend(dumps);
        self
    }

    fn recorded_commands(&self) -> Vec<Vec<String>> {
        self.runner.commands.lock().unwrap().clone()
    }

    fn recorded_scripts(&self) -> Vec<String> {
        self.runner.scripts.lock().unwrap().clone()
    }
}

impl Effects for FakeEffects {
    fn commands(&self) -> &dyn CommandRunner {
        &self.runner
    }

    fn tools(&self) -> &dyn ToolRegistry {
        &self.registry
    }

    fn fs(&self) -> &dyn FileSystem {
        &self.fs
    }
}

#[derive(Default)]
struct RecordingSink {
    lines: Mutex<Vec<String>>,
}

impl RecordingSink {
    fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }
}

impl LogSink for RecordingSink {
    fn line(&self, message: &str) {
        self.lines.lock().unwrap().push(message.to_string());
    }
}

fn context(effects: &Arc<FakeEffects>) -> (ExecutionContext, Arc<RecordingSink>) {
    let sink = Arc::new(RecordingSink::default());
    let shared: SharedEffects = effects.clone();
    let ctx = ExecutionContext::new(OsFamily::Unix, WORKSPACE, shared)
        .with_sink(sink.clone())
        .with_poll_interval(Duration::from_millis(1));
    (ctx, sink)
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

const MANAGED: &str = "/opt/venvs/app/";
const MANAGED_MARKERS: [&str; 4] = [
    "/opt/venvs/app/bin/activate",
    "/opt/venvs/app/bin/python",
    "/opt/venvs/app/include",
    "/opt/venvs/app/lib",
];

#[test]
fn tool_installation_takes_priority_over_managed_directory() {
    let effects = Arc::new(
        FakeEffects::default()
            .with_paths(&MANAGED_MARKERS)
            .with_tool(MANAGED, "/opt/python3.11/bin/python3"),
    );
    let (ctx, sink) = context(&effects);

    let descriptor = VirtualenvResolver::default()
        .resolve(MANAGED, &ctx)
        .expect("resolve");

    assert_eq!(descriptor.kind(), "tool");
    assert_eq!(
        descriptor.interpreter_path().as_deref(),
        Some("/opt/python3.11/bin/python3")
    );
    assert_eq!(
        sink.lines(),
        vec![format!("Matched Python tool installation: {MANAGED}")]
    );
}

#[test]
fn managed_directory_needs_trailing_separator_and_every_marker() {
    let effects = Arc::new(FakeEffects::default().with_paths(&MANAGED_MARKERS));
    let (ctx, _) = context(&effects);
    let resolver = VirtualenvResolver::default();

    let managed = resolver.resolve(MANAGED, &ctx).expect("resolve");
    assert_eq!(
        managed,
        VirtualenvDescriptor::Managed {
            path: MANAGED.to_string()
        }
    );

    let without_separator = resolver.resolve("/opt/venvs/app", &ctx).expect("resolve");
    assert_eq!(without_separator.kind(), "workspace");

    let partial = Arc::new(FakeEffects::default().with_paths(&MANAGED_MARKERS[..3]));
    let (ctx, _) = context(&partial);
    assert_eq!(resolver.resolve(MANAGED, &ctx).expect("resolve").kind(), "workspace");
}

#[test]
fn unknown_identifier_lands_in_workspace() {
    let effects = Arc::new(FakeEffects::default().with_tool("CPython-3.11", "/opt/py/bin/python3"));
    let (ctx, sink) = context(&effects);

    let descriptor = VirtualenvResolver::default()
        .resolve("python3", &ctx)
        .expect("resolve");

    assert_eq!(descriptor.virtualenv_path(), "/ws/.pyenv-python3");
    assert_eq!(descriptor.interpreter_path().as_deref(), Some("python3"));
    assert!(sink.lines().is_empty());
}

#[test]
fn tool_match_does_not_leak_into_next_resolution() {
    let effects = Arc::new(FakeEffects::default().with_tool("py311", "/opt/py311/bin/python3"));
    let (ctx, _) = context(&effects);
    let resolver = VirtualenvResolver::default();

    assert_eq!(resolver.resolve("py311", &ctx).expect("first").kind(), "tool");
    let second = resolver.resolve("python3", &ctx).expect("second");
    assert_eq!(second.interpreter_path().as_deref(), Some("python3"));
}

#[test]
fn empty_chain_reports_resolution_failure() {
    let effects = Arc::new(FakeEffects::default());
    let (ctx, _) = context(&effects);
    let resolver = VirtualenvResolver::with_chain(Vec::new);

    let err = resolver.resolve("python3", &ctx).expect_err("no strategies");
    assert!(matches!(err, VenvError::Resolution { ref identifier } if identifier == "python3"));
    assert_eq!(err.code(), "VW100");
}

#[test]
fn registry_failures_propagate() {
    let effects = Arc::new(FakeEffects::default());
    effects.registry.broken.store(true, Ordering::SeqCst);
    let (ctx, _) = context(&effects);

    let err = VirtualenvResolver::default()
        .resolve("python3", &ctx)
        .expect_err("registry down");
    assert!(matches!(err, VenvError::Collaborator(_)));
    assert!(err.to_string().contains("registry unavailable"));
}

fn workspace_descriptor() -> VirtualenvDescriptor {
    VirtualenvDescriptor::WorkspaceRelative {
        identifier: "python3".to_string(),
        workspace: WORKSPACE.to_string(),
        os: OsFamily::Unix,
    }
}

#[test]
fn modern_interpreter_creates_with_venv() {
    let effects = Arc::new(FakeEffects::default().with_version("Python 3.11.4\n"));
    let (ctx, sink) = context(&effects);

    let created = create_if_missing(&workspace_descriptor(), &ctx).expect("create");

    assert!(created);
    assert_eq!(
        effects.recorded_commands(),
        vec![
            strings(&["python3", "--version"]),
            strings(&["python3", "-m", "venv", "/ws/.pyenv-python3"]),
        ]
    );
    assert_eq!(
        sink.lines(),
        vec![
            "Creating virtualenv at /ws/.pyenv-python3 using Python installation found at python3"
                .to_string()
        ]
    );
}

#[test]
fn legacy_or_unknown_interpreter_falls_back_to_virtualenv() {
    for version in ["Python 2.7.18", "garbage"] {
        let effects = Arc::new(FakeEffects::default().with_version(version));
        let (ctx, _) = context(&effects);

        create_if_missing(&workspace_descriptor(), &ctx).expect("create");

        assert_eq!(
            effects.recorded_commands()[1],
            strings(&[
                "python3",
                "-m",
                "virtualenv",
                "--python=python3",
                "/ws/.pyenv-python3"
            ])
        );
    }
}

#[test]
fn existing_or_managed_virtualenv_is_left_alone() {
    let effects = Arc::new(FakeEffects::default().with_paths(&["/ws/.pyenv-python3"]));
    let (ctx, _) = context(&effects);
    assert!(!create_if_missing(&workspace_descriptor(), &ctx).expect("existing"));

    let managed = VirtualenvDescriptor::Managed {
        path: MANAGED.to_string(),
    };
    assert!(!create_if_missing(&managed, &ctx).expect("managed"));
    assert!(effects.recorded_commands().is_empty());
}

#[test]
fn failed_creation_carries_output() {
    let effects = Arc::new(FakeEffects::default().with_version("Python 3.8.10"));
    *effects.runner.creation.lock().unwrap() =
        Some((1, "No module named venv".to_string()));
    let (ctx, sink) = context(&effects);

    let err = create_if_missing(&workspace_descriptor(), &ctx).expect_err("creation fails");

    match &err {
        VenvError::Creation { code, output, target, .. } => {
            assert_eq!(*code, 1);
            assert_eq!(output, "No module named venv");
            assert_eq!(target, "/ws/.pyenv-python3");
        }
        other => panic!("unexpected error {other:?}"),
    }
    assert_eq!(err.captured_output(), Some("No module named venv"));
    assert_eq!(
        sink.lines().last().map(String::as_str),
        Some("Error while creating virtualenv: No module named venv")
    );
}

#[test]
fn cancelled_context_does_not_create() {
    let effects = Arc::new(FakeEffects::default());
    let (ctx, _) = context(&effects);
    ctx.cancellation().cancel();

    let err = create_if_missing(&workspace_descriptor(), &ctx).expect_err("cancelled");
    assert!(err.is_cancelled());
    assert!(effects.recorded_commands().is_empty());
}

#[test]
fn diff_reports_new_variables_and_path_addition() {
    let effects = Arc::new(FakeEffects::default().with_dumps(vec![
        Dump {
            pending_polls: 2,
            ..Dump::ok(BASELINE)
        },
        Dump::ok(ACTIVATED),
    ]));
    let (ctx, _) = context(&effects);

    let delta = EnvironmentDiffer
        .diff(&workspace_descriptor(), &ctx)
        .expect("diff");

    let entries: Vec<_> = delta.iter().collect();
    assert_eq!(
        entries,
        vec![
            (PATH_ADDITION_KEY, "/ws/.pyenv-python3/bin"),
            ("VIRTUAL_ENV", "/ws/.pyenv-python3"),
        ]
    );
    assert_eq!(
        effects.recorded_scripts(),
        vec![
            "env".to_string(),
            ". \"/ws/.pyenv-python3/bin/activate\"; env".to_string(),
        ]
    );
}

#[test]
fn failing_dump_is_a_capture_error_with_output() {
    let effects = Arc::new(FakeEffects::default().with_dumps(vec![
        Dump::ok(BASELINE),
        Dump::failing(1, "activate: No such file or directory"),
    ]));
    let (ctx, _) = context(&effects);

    let err = EnvironmentDiffer
        .diff(&workspace_descriptor(), &ctx)
        .expect_err("dump fails");

    assert_eq!(err.code(), "VW300");
    assert_eq!(
        err.captured_output(),
        Some("activate: No such file or directory")
    );
}

#[test]
fn non_utf8_dump_is_rejected() {
    let effects = Arc::new(FakeEffects::default().with_dumps(vec![Dump {
        output: vec![b'P', b'=', 0xff, 0xfe],
        ..Dump::ok("")
    }]));
    let (ctx, _) = context(&effects);

    let err = EnvironmentDiffer
        .diff(&workspace_descriptor(), &ctx)
        .expect_err("invalid utf-8");
    assert!(matches!(err, VenvError::DiffCapture { ref reason, .. } if reason.contains("UTF-8")));
}

#[test]
fn activation_that_rewrites_path_is_malformed() {
    let effects = Arc::new(FakeEffects::default().with_dumps(vec![
        Dump::ok(BASELINE),
        Dump::ok("PATH=/ws/.pyenv-python3/bin:/sbin\n"),
    ]));
    let (ctx, _) = context(&effects);

    let err = EnvironmentDiffer
        .diff(&workspace_descriptor(), &ctx)
        .expect_err("path rewritten");
    assert!(matches!(
        err,
        VenvError::MalformedPath(PathReconcileError::NotPrepended { .. })
    ));
}

#[test]
fn cancellation_while_polling_stops_the_script() {
    let effects = Arc::new(FakeEffects::default());
    let (ctx, _) = context(&effects);
    effects.runner.dumps.lock().unwrap().push_back(Dump {
        cancel: Some(ctx.cancellation().clone()),
        ..Dump::ok(BASELINE)
    });

    let err = EnvironmentDiffer
        .diff(&workspace_descriptor(), &ctx)
        .expect_err("cancelled");

    assert!(err.is_cancelled());
    assert!(effects.runner.stopped.load(Ordering::SeqCst));
    assert_eq!(effects.recorded_scripts().len(), 1);
}

#[test]
fn manager_serves_repeat_requests_from_cache() {
    let effects = Arc::new(
        FakeEffects::default()
            .with_paths(&["/ws/.pyenv-python3"])
            .with_dumps(vec![Dump::ok(BASELINE), Dump::ok(ACTIVATED)]),
    );
    let (ctx, _) = context(&effects);
    let manager = VirtualenvManager::new(Arc::new(EnvCache::new()));

    let first = manager.environment_for("python3", &ctx).expect("first");
    let second = manager.environment_for("python3", &ctx).expect("second");

    assert_eq!(first, second);
    assert_eq!(effects.recorded_scripts().len(), 2);
    assert!(effects.recorded_commands().is_empty());
    assert_eq!(manager.cache().len(), 1);
}

#[test]
fn manager_does_not_cache_failures() {
    let effects = Arc::new(
        FakeEffects::default()
            .with_paths(&["/ws/.pyenv-python3"])
            .with_dumps(vec![
                Dump::ok(BASELINE),
                Dump::failing(2, "boom"),
                Dump::ok(BASELINE),
                Dump::ok(ACTIVATED),
            ]),
    );
    let (ctx, _) = context(&effects);
    let manager = VirtualenvManager::new(Arc::new(EnvCache::new()));

    assert!(manager.environment_for("python3", &ctx).is_err());
    assert!(manager.cache().is_empty());

    let delta = manager.environment_for("python3", &ctx).expect("retry");
    assert_eq!(delta.get("VIRTUAL_ENV"), Some("/ws/.pyenv-python3"));
}

#[test]
fn cache_keeps_the_first_delta() {
    let cache = EnvCache::new();
    let first: venvwrap_domain::EnvironmentDelta = [("A", "1")].into_iter().collect();
    let second: venvwrap_domain::EnvironmentDelta = [("A", "2")].into_iter().collect();

    assert_eq!(cache.insert_first("id", first.clone()), first);
    assert_eq!(cache.insert_first("id", second), first);
    assert_eq!(cache.get("id"), Some(first));
}

#[test]
fn env_command_prints_assignments() {
    let effects = Arc::new(
        FakeEffects::default()
            .with_paths(&["/ws/.pyenv-python3"])
            .with_dumps(vec![Dump::ok(BASELINE), Dump::ok(ACTIVATED)]),
    );
    let (ctx, _) = context(&effects);
    let manager = VirtualenvManager::new(Arc::new(EnvCache::new()));
    let request = VirtualenvRequest {
        identifier: "python3".to_string(),
    };

    let outcome = virtualenv_env(&manager, &ctx, &request).expect("outcome");

    assert_eq!(outcome.status, CommandStatus::Ok);
    assert_eq!(
        outcome.message,
        "PATH+PYTHON=/ws/.pyenv-python3/bin\nVIRTUAL_ENV=/ws/.pyenv-python3"
    );
    assert_eq!(
        outcome.details["variables"]["PATH+PYTHON"],
        "/ws/.pyenv-python3/bin"
    );
}

#[test]
fn env_command_turns_pipeline_errors_into_failures() {
    let effects = Arc::new(
        FakeEffects::default()
            .with_paths(&["/ws/.pyenv-python3"])
            .with_dumps(vec![Dump::failing(127, "env: not found")]),
    );
    let (ctx, _) = context(&effects);
    let manager = VirtualenvManager::new(Arc::new(EnvCache::new()));
    let request = VirtualenvRequest {
        identifier: "python3".to_string(),
    };

    let outcome = virtualenv_env(&manager, &ctx, &request).expect("outcome");

    assert_eq!(outcome.status, CommandStatus::Failure);
    assert_eq!(outcome.details["code"], "VW300");
    assert_eq!(outcome.details["output"], "env: not found");
}

#[test]
fn describe_reports_descriptor_without_running_anything() {
    let effects = Arc::new(FakeEffects::default().with_paths(&MANAGED_MARKERS));
    let (ctx, _) = context(&effects);
    let manager = VirtualenvManager::new(Arc::new(EnvCache::new()));
    let request = VirtualenvRequest {
        identifier: MANAGED.to_string(),
    };

    let outcome = virtualenv_describe(&manager, &ctx, &request).expect("outcome");

    assert_eq!(outcome.details["kind"], "managed");
    assert_eq!(outcome.details["virtualenv_path"], MANAGED);
    assert_eq!(outcome.details["creatable"], false);
    assert!(outcome.details["interpreter_path"].is_null());
    assert!(effects.recorded_commands().is_empty());
    assert!(effects.recorded_scripts().is_empty());
}

use std::sync::Arc;

use color_eyre::{eyre::eyre, Result};
use venvwrap_core::commands::{
    self, RunRequest, ToolAddRequest, ToolRemoveRequest, VirtualenvRequest,
};
use venvwrap_core::{
    CancellationFlag, Config, EnvCache, ExecutionContext, ExecutionOutcome, FileToolRegistry,
    LogSink, StderrSink, SystemEffects, VirtualenvManager,
};

use crate::cli::{CommandGroupCli, ToolsCommand};

/// Sink used under `--quiet`.
struct SilentSink;

impl LogSink for SilentSink {
    fn line(&self, _message: &str) {}
}

pub fn dispatch_command(
    config: &Config,
    cancellation: CancellationFlag,
    quiet: bool,
    group: &CommandGroupCli,
) -> Result<(&'static str, ExecutionOutcome)> {
    match group {
        CommandGroupCli::Env(args) => {
            let (manager, ctx) = virtualenv_session(config, cancellation, quiet);
            let request = VirtualenvRequest {
                identifier: args.identifier.trim().to_string(),
            };
            core_call("env", || commands::virtualenv_env(&manager, &ctx, &request))
        }
        CommandGroupCli::Run(args) => {
            let (manager, ctx) = virtualenv_session(config, cancellation, quiet);
            let Some((program, rest)) = args.command.split_first() else {
                return Err(eyre!("venvwrap run needs a program after `--`"));
            };
            let request = RunRequest {
                identifier: args.identifier.trim().to_string(),
                program: program.clone(),
                args: rest.to_vec(),
            };
            core_call("run", || commands::virtualenv_run(&manager, &ctx, &request))
        }
        CommandGroupCli::Describe(args) => {
            let (manager, ctx) = virtualenv_session(config, cancellation, quiet);
            let request = VirtualenvRequest {
                identifier: args.identifier.trim().to_string(),
            };
            core_call("describe", || {
                commands::virtualenv_describe(&manager, &ctx, &request)
            })
        }
        CommandGroupCli::Tools(command) => {
            let registry = FileToolRegistry::new(config.tool_registry().clone());
            match command {
                ToolsCommand::List => core_call("tools list", || commands::tools_list(&registry)),
                ToolsCommand::Add(args) => {
                    let request = ToolAddRequest {
                        name: args.name.clone(),
                        home: args.home.clone(),
                    };
                    core_call("tools add", || commands::tools_add(&registry, &request))
                }
                ToolsCommand::Remove(args) => {
                    let request = ToolRemoveRequest {
                        name: args.name.clone(),
                    };
                    core_call("tools remove", || {
                        commands::tools_remove(&registry, &request)
                    })
                }
            }
        }
    }
}

fn virtualenv_session(
    config: &Config,
    cancellation: CancellationFlag,
    quiet: bool,
) -> (VirtualenvManager, ExecutionContext) {
    let effects = Arc::new(SystemEffects::new(
        config.os(),
        config.tool_registry().clone(),
    ));
    let sink: Arc<dyn LogSink> = if quiet {
        Arc::new(SilentSink)
    } else {
        Arc::new(StderrSink)
    };
    let ctx = ExecutionContext::from_config(config, effects)
        .with_sink(sink)
        .with_cancellation(cancellation);
    (VirtualenvManager::new(Arc::new(EnvCache::new())), ctx)
}

fn core_call<F>(name: &'static str, call: F) -> Result<(&'static str, ExecutionOutcome)>
where
    F: FnOnce() -> anyhow::Result<ExecutionOutcome>,
{
    let outcome = call().map_err(|err| eyre!("{err:?}"))?;
    Ok((name, outcome))
}

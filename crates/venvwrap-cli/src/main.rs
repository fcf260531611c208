use atty::Stream;
use clap::Parser;
use color_eyre::{eyre::eyre, Result};
use serde_json::Value;
use venvwrap_core::{CancellationFlag, Config, ExecutionOutcome, GlobalOptions};

mod cli;
mod dispatch;
mod style;

use cli::VenvwrapCli;
use style::Style;

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = VenvwrapCli::parse();
    init_tracing(cli.trace, cli.verbose);

    let global = GlobalOptions {
        workspace: cli
            .workspace
            .as_ref()
            .map(|p| p.to_string_lossy().to_string()),
        target_os: cli.target_os.map(Into::into),
    };
    let config = Config::from_env(&global).map_err(|err| eyre!("{err:?}"))?;

    let cancellation = CancellationFlag::new();
    install_interrupt_handler(&cancellation);

    let (name, outcome) =
        dispatch::dispatch_command(&config, cancellation, cli.quiet, &cli.command)?;
    let code = emit_output(&cli, name, &outcome)?;

    if code == 0 {
        Ok(())
    } else {
        std::process::exit(code);
    }
}

fn init_tracing(trace: bool, verbose: u8) {
    let level = if trace {
        "trace"
    } else {
        match verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };

    let filter = format!("venvwrap_cli={level},venvwrap_core={level},venvwrap_domain={level}");
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn install_interrupt_handler(cancellation: &CancellationFlag) {
    let flag = cancellation.clone();
    if let Err(err) = ctrlc::set_handler(move || {
        tracing::info!("received Ctrl+C, cancelling");
        flag.cancel();
    }) {
        tracing::debug!("failed to install Ctrl+C handler: {err}");
    }
}

fn emit_output(cli: &VenvwrapCli, command: &str, outcome: &ExecutionOutcome) -> Result<i32> {
    let code = passthrough_exit_code(&outcome.details).unwrap_or(outcome.status.exit_code());

    let style = Style::new(cli.no_color, atty::is(Stream::Stdout));

    if cli.json {
        let payload = venvwrap_core::to_json_response(command, outcome);
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else if !cli.quiet {
        if is_passthrough(&outcome.details) {
            if !outcome.message.is_empty() {
                println!("{}", outcome.message);
            }
        } else {
            let message = venvwrap_core::format_status_message(command, &outcome.message);
            println!("{}", style.status(outcome.status, &message));
            if let Some(hint) = hint_from_details(&outcome.details) {
                println!("{}", style.info(&format!("Hint: {hint}")));
            }
        }
    }

    Ok(code)
}

fn hint_from_details(details: &Value) -> Option<&str> {
    details
        .as_object()
        .and_then(|map| map.get("hint"))
        .and_then(Value::as_str)
}

fn is_passthrough(details: &Value) -> bool {
    details
        .as_object()
        .and_then(|map| map.get("passthrough"))
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

// `run` reports the wrapped program's own exit code.
fn passthrough_exit_code(details: &Value) -> Option<i32> {
    if !is_passthrough(details) {
        return None;
    }
    details
        .get("exit_code")
        .and_then(Value::as_i64)
        .and_then(|code| i32::try_from(code).ok())
}

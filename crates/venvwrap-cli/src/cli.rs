use std::path::PathBuf;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use venvwrap_domain::OsFamily;

pub const VENVWRAP_BEFORE_HELP: &str = concat!(
    "venvwrap ",
    env!("CARGO_PKG_VERSION"),
    " – Python virtualenvs for build steps\n\n",
    "\x1b[1;36mVirtualenvs\x1b[0m\n",
    "  env              Prepare a virtualenv and print what activating it changes.\n",
    "  run              Run a program inside a prepared virtualenv.\n",
    "  describe         Show how an identifier resolves without creating anything.\n\n",
    "\x1b[1;36mRegistry\x1b[0m\n",
    "  tools            List, register, or remove Python tool installations.\n",
);

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    propagate_version = false,
    disable_help_subcommand = true,
    before_help = VENVWRAP_BEFORE_HELP
)]
#[allow(clippy::struct_excessive_bools)]
pub struct VenvwrapCli {
    #[arg(
        short,
        long,
        help = "Suppress human output (errors still set the exit code)",
        global = true
    )]
    pub quiet: bool,
    #[arg(
        short,
        long,
        action = ArgAction::Count,
        help = "Increase logging (-vv reaches debug, -vvv trace)",
        global = true
    )]
    pub verbose: u8,
    #[arg(long, help = "Force trace logging regardless of -v/-q", global = true)]
    pub trace: bool,
    #[arg(
        long,
        help = "Emit {status,message,details} JSON envelopes",
        global = true
    )]
    pub json: bool,
    #[arg(long, help = "Disable colored human output", global = true)]
    pub no_color: bool,
    #[arg(
        long,
        value_name = "DIR",
        help = "Workspace root (overrides VENVWRAP_WORKSPACE and WORKSPACE)",
        global = true
    )]
    pub workspace: Option<PathBuf>,
    #[arg(
        long,
        value_enum,
        help = "Operating-system family of the agent (overrides VENVWRAP_TARGET_OS)",
        global = true
    )]
    pub target_os: Option<TargetOs>,
    #[command(subcommand)]
    pub command: CommandGroupCli,
}

#[derive(Subcommand, Debug)]
pub enum CommandGroupCli {
    #[command(about = "Prepare a virtualenv and print its activation delta as KEY=VALUE lines.")]
    Env(IdentifierArgs),
    #[command(about = "Run a program directly (no shell) inside a prepared virtualenv.")]
    Run(RunArgs),
    #[command(about = "Resolve an identifier to a virtualenv without creating it.")]
    Describe(IdentifierArgs),
    #[command(subcommand, about = "Manage the Python tool-installation registry.")]
    Tools(ToolsCommand),
}

#[derive(Args, Debug)]
pub struct IdentifierArgs {
    #[arg(
        value_name = "IDENTIFIER",
        help = "Tool installation name, virtualenv directory (trailing separator), or interpreter"
    )]
    pub identifier: String,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    #[arg(value_name = "IDENTIFIER")]
    pub identifier: String,
    #[arg(
        value_name = "COMMAND",
        last = true,
        required = true,
        help = "Program and arguments, after `--`"
    )]
    pub command: Vec<String>,
}

#[derive(Subcommand, Debug)]
pub enum ToolsCommand {
    #[command(about = "List registered tool installations.")]
    List,
    #[command(about = "Register (or replace) a Python tool installation.")]
    Add(ToolAddArgs),
    #[command(about = "Remove a registered tool installation.")]
    Remove(ToolRemoveArgs),
}

#[derive(Args, Debug)]
pub struct ToolAddArgs {
    #[arg(value_name = "NAME")]
    pub name: String,
    #[arg(
        value_name = "HOME",
        help = "Interpreter path on Unix, installation directory on Windows"
    )]
    pub home: String,
}

#[derive(Args, Debug)]
pub struct ToolRemoveArgs {
    #[arg(value_name = "NAME")]
    pub name: String,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum TargetOs {
    Unix,
    Windows,
}

impl From<TargetOs> for OsFamily {
    fn from(value: TargetOs) -> Self {
        match value {
            TargetOs::Unix => OsFamily::Unix,
            TargetOs::Windows => OsFamily::Windows,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_takes_program_after_separator() {
        let cli = VenvwrapCli::try_parse_from([
            "venvwrap", "run", "python3", "--", "pytest", "-x", "--maxfail=1",
        ])
        .expect("parse");
        let CommandGroupCli::Run(args) = cli.command else {
            panic!("expected run");
        };
        assert_eq!(args.identifier, "python3");
        assert_eq!(args.command, vec!["pytest", "-x", "--maxfail=1"]);
    }

    #[test]
    fn run_requires_a_program() {
        assert!(VenvwrapCli::try_parse_from(["venvwrap", "run", "python3"]).is_err());
    }

    #[test]
    fn global_flags_apply_after_subcommand() {
        let cli = VenvwrapCli::try_parse_from([
            "venvwrap",
            "describe",
            "python3",
            "--json",
            "--target-os",
            "windows",
            "-vv",
        ])
        .expect("parse");
        assert!(cli.json);
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.target_os.map(OsFamily::from), Some(OsFamily::Windows));
    }
}

//! Deterministic naming of workspace virtualenvs and their source interpreters.

use crate::os::OsFamily;

pub const VIRTUALENV_DIR_PREFIX: &str = ".pyenv";

/// Maps a raw identifier onto the name of its directory inside the workspace.
///
/// `/` and `\` collapse to `-`, a single leading Windows drive prefix
/// (`C:\`) is dropped, and the result always reads `.pyenv-<rest>`.
#[must_use]
pub fn relative_directory_for(identifier: &str) -> String {
    let slashed = identifier.replace('/', "-");
    let mut postfix = strip_drive_prefix(&slashed).replace('\\', "-");
    if !postfix.starts_with('-') {
        postfix.insert(0, '-');
    }
    format!("{VIRTUALENV_DIR_PREFIX}{postfix}")
}

fn strip_drive_prefix(value: &str) -> &str {
    match value.as_bytes() {
        [drive, b':', b'\\', ..] if drive.is_ascii_alphabetic() => &value[3..],
        _ => value,
    }
}

/// Absolute location of the virtualenv owned by `identifier` under `workspace`.
#[must_use]
pub fn workspace_virtualenv_path(workspace: &str, identifier: &str, os: OsFamily) -> String {
    let separator = os.path_separator();
    let relative = relative_directory_for(identifier);
    let mut path = workspace.to_string();
    if !path.ends_with(separator) && !relative.starts_with(separator) {
        path.push(separator);
    }
    path.push_str(&relative);
    path
}

/// Derives the interpreter used to create a virtualenv.
///
/// Unix tool installations already point at the executable and are used as-is.
/// Windows tool installations only name a directory, so they go through the
/// same completion rules as a raw identifier.
#[must_use]
pub fn interpreter_path(identifier: &str, tool_home: Option<&str>, os: OsFamily) -> String {
    let tool_home = tool_home.filter(|home| !home.is_empty());
    match os {
        OsFamily::Unix => match tool_home {
            Some(home) => home.to_string(),
            None => complete_unix(identifier),
        },
        OsFamily::Windows => complete_windows(tool_home.unwrap_or(identifier)),
    }
}

fn complete_unix(base: &str) -> String {
    let mut path = base.to_string();
    if !last_segment(base, '/').contains("python") {
        if !path.ends_with('/') {
            path.push('/');
        }
        path.push_str(OsFamily::Unix.conventions().interpreter_name);
    }
    path
}

fn complete_windows(base: &str) -> String {
    let conventions = OsFamily::Windows.conventions();
    let mut path = base.to_string();
    if !last_segment(base, '\\').contains("python") {
        if !path.is_empty() && !path.ends_with('\\') {
            path.push('\\');
        }
        path.push_str(conventions.interpreter_name);
    }
    if !path.ends_with(conventions.executable_suffix) {
        path.push_str(conventions.executable_suffix);
    }
    path
}

// Trailing empty segments do not count: `/usr/bin/` ends in `bin`.
fn last_segment(path: &str, separator: char) -> &str {
    path.rsplit(separator)
        .find(|segment| !segment.is_empty())
        .unwrap_or_default()
}

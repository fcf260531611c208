#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PathReconcileError {
    #[error("PATH is missing from the environment captured before activation")]
    MissingBaseline,
    #[error(
        "activated PATH `{after}` does not contain the original leading entry `{anchor}`; \
         activation must only prepend entries"
    )]
    NotPrepended { anchor: String, after: String },
}

/// Extracts the entries activation prepended to a PATH-like list.
///
/// Walks `after` until it meets the first entry of `before`; everything seen
/// up to that point is the addition, joined back with `separator`. Returns an
/// empty string when nothing was prepended.
pub fn reconcile_path(
    before: &str,
    after: &str,
    separator: &str,
) -> Result<String, PathReconcileError> {
    let anchor = before.split(separator).next().unwrap_or_default();
    let mut prepended = Vec::new();
    let mut entries = after.split(separator);
    loop {
        match entries.next() {
            Some(entry) if entry == anchor => break,
            Some(entry) => prepended.push(entry),
            None => {
                return Err(PathReconcileError::NotPrepended {
                    anchor: anchor.to_string(),
                    after: after.to_string(),
                })
            }
        }
    }
    Ok(prepended.join(separator))
}

#[cfg(test)]
mod tests {
    use super::*;

    const UNIX_ORIGINAL: &str = "/usr/local/sbin:/usr/local/bin:/usr/sbin:/usr/bin:/sbin:/bin";
    const WINDOWS_ORIGINAL: &str = "C:\\Python27\\;C:\\Python27\\Scripts;C:\\Program Files (x86)\\Common Files\\Oracle\\Java\\javapath;";

    #[test]
    fn unchanged_path_yields_empty_addition() {
        assert_eq!(reconcile_path("/a:/b:/c", "/a:/b:/c", ":"), Ok(String::new()));
    }

    #[test]
    fn unix_single_prepend() {
        let activated = format!("/venv/bin:{UNIX_ORIGINAL}");
        assert_eq!(
            reconcile_path(UNIX_ORIGINAL, &activated, ":"),
            Ok("/venv/bin".to_string())
        );
    }

    #[test]
    fn unix_multiple_prepends_compose() {
        let activated = format!("/venv:/venv/bin:{UNIX_ORIGINAL}");
        assert_eq!(
            reconcile_path(UNIX_ORIGINAL, &activated, ":"),
            Ok("/venv:/venv/bin".to_string())
        );
    }

    #[test]
    fn windows_prepend_has_no_trailing_separator() {
        let activated = format!("C:\\Programming\\Python3\\test\\venv\\Scripts;{WINDOWS_ORIGINAL}");
        assert_eq!(
            reconcile_path(WINDOWS_ORIGINAL, &activated, ";"),
            Ok("C:\\Programming\\Python3\\test\\venv\\Scripts".to_string())
        );

        let activated = format!("C:\\Programming\\Python3\\test\\venv;{activated}");
        assert_eq!(
            reconcile_path(WINDOWS_ORIGINAL, &activated, ";"),
            Ok(
                "C:\\Programming\\Python3\\test\\venv;C:\\Programming\\Python3\\test\\venv\\Scripts"
                    .to_string()
            )
        );
    }

    #[test]
    fn reordered_path_fails_instead_of_reading_past_the_end() {
        let err = reconcile_path("/a:/b", "/venv/bin:/b", ":").unwrap_err();
        assert_eq!(
            err,
            PathReconcileError::NotPrepended {
                anchor: "/a".to_string(),
                after: "/venv/bin:/b".to_string(),
            }
        );
    }
}

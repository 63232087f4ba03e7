use crate::TransferError;

/// Validates a remote name relative to the application path prefix.
///
/// Accepts `/` or `\` separators. Rejects:
/// - Empty names
/// - Parent directory traversal (`..`)
/// - Windows drive prefixes (`C:`)
pub fn validate_remote_name(name: &str) -> Result<(), TransferError> {
    let normalized = name.replace('\\', "/");
    if normalized.trim_matches('/').is_empty() {
        return Err(TransferError::InvalidPath("empty remote name".into()));
    }

    for component in normalized.split('/') {
        if component == ".." {
            return Err(TransferError::InvalidPath(format!(
                "parent directory traversal not allowed: {name}"
            )));
        }
        if component.len() >= 2 && component.ends_with(':') {
            return Err(TransferError::InvalidPath(format!(
                "path prefix not allowed: {name}"
            )));
        }
    }

    Ok(())
}

/// Joins the application path prefix and a remote name into an absolute
/// `/`-separated remote path.
///
/// Backslashes become `/`, empty and `.` components are dropped.
pub fn join_remote_path(app_path: &str, name: &str) -> Result<String, TransferError> {
    validate_remote_name(name)?;

    let joined = format!("{app_path}/{name}").replace('\\', "/");
    let parts: Vec<&str> = joined
        .split('/')
        .filter(|c| !c.is_empty() && *c != ".")
        .collect();
    Ok(format!("/{}", parts.join("/")))
}

//! Environment variables handed to the wrapped command.

use super::Credentials;

pub const ACCESS_KEY_ID: &str = "AWS_ACCESS_KEY_ID";
pub const SECRET_ACCESS_KEY: &str = "AWS_SECRET_ACCESS_KEY";
pub const DEFAULT_REGION: &str = "AWS_DEFAULT_REGION";
pub const SESSION_TOKEN: &str = "AWS_SESSION_TOKEN";

/// Build the `(name, value)` pairs that expose `creds` to a child process.
///
/// The region is only set when configured and the session token only when
/// non-empty.
pub fn aws_env(creds: &Credentials, region: Option<&str>) -> Vec<(&'static str, String)> {
    let mut out = vec![
        (ACCESS_KEY_ID, creds.access_key_id.clone()),
        (SECRET_ACCESS_KEY, creds.secret_access_key.clone()),
    ];

    if let Some(region) = region.filter(|r| !r.is_empty()) {
        out.push((DEFAULT_REGION, region.to_string()));
    }

    if !creds.session_token.is_empty() {
        out.push((SESSION_TOKEN, creds.session_token.clone()));
    }

    out
}

/// Render the variables as POSIX shell `export` lines.
pub fn export_lines(vars: &[(&'static str, String)]) -> String {
    vars.iter()
        .map(|(k, v)| format!("export {k}={}\n", shell_quote(v)))
        .collect()
}

fn shell_quote(value: &str) -> String {
    if !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "/+=-_.:".contains(c))
    {
        return value.to_string();
    }
    format!("'{}'", value.replace('\'', r"'\''"))
}

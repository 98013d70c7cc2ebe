// src/sys/safety.rs
//
// 🛡️ Zero-Trust: every value that reaches a shell goes through `escape_argument`,
// and every name/path taken from configuration is checked against an explicit
// allow-list grammar. Validators reject; they never silently sanitize.

use regex::Regex;
use std::sync::LazyLock;

use crate::error::{RecipeError, Result};

static IDENTIFIER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9._-]+$").expect("static regex"));

static STAGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("static regex"));

static NODE_VERSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:v?[0-9]+\.[0-9]+\.[0-9]+|lts|stable)$").expect("static regex")
});

/// Quotes `arg` as a single POSIX shell word.
///
/// Everything is wrapped in single quotes, inside which the shell expands
/// nothing; embedded single quotes become `'\''`. NUL bytes cannot be passed
/// through `execve` at all and are dropped.
pub fn escape_argument(arg: &str) -> String {
    let mut escaped = String::with_capacity(arg.len() + 2);
    escaped.push('\'');
    for ch in arg.chars() {
        match ch {
            '\'' => escaped.push_str("'\\''"),
            '\0' => {}
            _ => escaped.push(ch),
        }
    }
    escaped.push('\'');
    escaped
}

/// Renders a remote path for a shell word, keeping `~/` expansion working.
///
/// `~` and `~/rest` become `"$HOME"` and `"$HOME"/'rest'`; anything else is
/// escaped as-is.
pub fn escape_remote_path(path: &str) -> String {
    if path == "~" {
        return "\"$HOME\"".to_string();
    }
    match path.strip_prefix("~/") {
        Some(rest) => format!("\"$HOME\"/{}", escape_argument(rest)),
        None => escape_argument(path),
    }
}

/// Runs `command` inside `dir` (the orchestration runtime's `within`).
pub fn within(dir: &str, command: &str) -> String {
    format!("cd {} && {}", escape_remote_path(dir), command)
}

/// Local pipeline under `bash -c`: any failing stage fails the whole line.
pub fn local_pipeline(pipeline: &str) -> String {
    format!("set -o pipefail; {}", pipeline)
}

/// Remote pipeline. The login shell is unknown, so the line runs under an
/// explicit `bash -o pipefail`; `"$HOME"` inside still expands there.
pub fn remote_pipeline(pipeline: &str) -> String {
    format!("bash -o pipefail -c {}", escape_argument(pipeline))
}

/// Config/file names: `[A-Za-z0-9._-]+`, and never `..`, `/` or `\`.
pub fn validate_identifier(name: &str) -> Result<&str> {
    if name.contains("..") || name.contains('/') || name.contains('\\') {
        return Err(RecipeError::invalid("identifier", name));
    }
    if !IDENTIFIER_RE.is_match(name) {
        return Err(RecipeError::invalid("identifier", name));
    }
    Ok(name)
}

/// Stage labels flow into a nested re-invocation of the deploy command, so
/// dots are refused as well.
pub fn validate_stage(name: &str) -> Result<&str> {
    if !STAGE_RE.is_match(name) {
        return Err(RecipeError::invalid("stage", name));
    }
    Ok(name)
}

/// `v?MAJOR.MINOR.PATCH`, `lts` or `stable`.
pub fn validate_node_version(version: &str) -> Result<&str> {
    if !NODE_VERSION_RE.is_match(version) {
        return Err(RecipeError::invalid("node version", version));
    }
    Ok(version)
}

/// Relative project directory. Rejects `..` and `~`, normalizes separators to
/// `/` and strips leading/trailing slashes.
pub fn validate_directory_path(path: &str) -> Result<String> {
    if path.contains("..") || path.contains('~') {
        return Err(RecipeError::invalid("directory path", path));
    }
    let normalized = path.replace('\\', "/");
    let trimmed = normalized.trim_matches('/');
    if trimmed.is_empty() {
        return Err(RecipeError::invalid("directory path", path));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_wraps_plain_words() {
        assert_eq!(escape_argument("app"), "'app'");
        assert_eq!(escape_argument(""), "''");
    }

    #[test]
    fn escape_neutralizes_shell_metacharacters() {
        assert_eq!(escape_argument("a'b"), r"'a'\''b'");
        assert_eq!(escape_argument("$(rm -rf /)"), "'$(rm -rf /)'");
        assert_eq!(escape_argument("`id`; echo"), "'`id`; echo'");
        assert_eq!(escape_argument("line\nbreak"), "'line\nbreak'");
        assert_eq!(escape_argument("nul\0byte"), "'nulbyte'");
    }

    #[test]
    fn escape_remote_path_keeps_home_expansion() {
        assert_eq!(escape_remote_path("~"), "\"$HOME\"");
        assert_eq!(escape_remote_path("~/app/shared"), "\"$HOME\"/'app/shared'");
        assert_eq!(escape_remote_path("/var/www/a b"), "'/var/www/a b'");
        assert_eq!(escape_remote_path("~root"), "'~root'");
    }

    #[test]
    fn within_prefixes_cd() {
        assert_eq!(within("/srv/app", "cat .env"), "cd '/srv/app' && cat .env");
    }

    #[test]
    fn pipelines_fail_on_any_stage() {
        assert_eq!(
            local_pipeline("gunzip -c 'd.gz' | mysql 'db'"),
            "set -o pipefail; gunzip -c 'd.gz' | mysql 'db'"
        );
        assert_eq!(
            remote_pipeline("mysqldump 'db' | gzip > \"$HOME\"/'d.gz'"),
            r#"bash -o pipefail -c 'mysqldump '\''db'\'' | gzip > "$HOME"/'\''d.gz'\'''"#
        );
    }

    #[tokio::test]
    async fn pipefail_surfaces_a_failed_producer() {
        let status = tokio::process::Command::new("bash")
            .arg("-c")
            .arg(local_pipeline("false | cat"))
            .status()
            .await
            .unwrap();
        assert!(!status.success());

        let status = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(remote_pipeline("false | cat"))
            .status()
            .await
            .unwrap();
        assert!(!status.success());
    }

    #[test]
    fn identifier_accepts_release_names() {
        assert_eq!(validate_identifier("release-2024.01").unwrap(), "release-2024.01");
        assert!(validate_identifier("php-fpm-www.service").is_ok());
        assert!(validate_identifier("app_user.conf").is_ok());
    }

    #[test]
    fn identifier_rejects_traversal_and_injection() {
        assert!(matches!(
            validate_identifier("../etc/passwd"),
            Err(RecipeError::InvalidInput { field: "identifier", .. })
        ));
        assert!(validate_identifier("..").is_err());
        assert!(validate_identifier("a/b").is_err());
        assert!(validate_identifier("a\\b").is_err());
        assert!(validate_identifier("x; rm -rf /").is_err());
        assert!(validate_identifier("name\n").is_err());
        assert!(validate_identifier("").is_err());
    }

    #[test]
    fn stage_refuses_dots() {
        assert!(validate_stage("production").is_ok());
        assert!(validate_stage("staging_2-eu").is_ok());
        assert!(validate_stage("prod.eu").is_err());
        assert!(validate_stage("prod && id").is_err());
        assert!(validate_stage("").is_err());
    }

    #[test]
    fn node_versions() {
        assert!(validate_node_version("v18.16.0").is_ok());
        assert!(validate_node_version("20.11.1").is_ok());
        assert!(validate_node_version("lts").is_ok());
        assert!(validate_node_version("stable").is_ok());
        assert!(validate_node_version("18.x").is_err());
        assert!(validate_node_version("lts/hydrogen").is_err());
        assert!(validate_node_version("v18.16.0; curl evil").is_err());
        assert!(validate_node_version("v18.16.0\n").is_err());
    }

    #[test]
    fn directory_paths_are_normalized() {
        assert_eq!(validate_directory_path("/public/uploads/").unwrap(), "public/uploads");
        assert_eq!(validate_directory_path("web\\uploads").unwrap(), "web/uploads");
        assert_eq!(validate_directory_path("translations").unwrap(), "translations");
    }

    #[test]
    fn directory_paths_reject_traversal() {
        assert!(validate_directory_path("../secrets").is_err());
        assert!(validate_directory_path("public/../../etc").is_err());
        assert!(validate_directory_path("~/uploads").is_err());
        assert!(validate_directory_path("/").is_err());
    }
}

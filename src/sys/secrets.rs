// src/sys/secrets.rs

use nix::unistd::Uid;
use secrecy::{ExposeSecret, SecretString};
use std::fs::Permissions;
use std::future::Future;
use std::io::Write;
use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::warn;
use zeroize::Zeroizing;

use crate::error::{RecipeError, Result};

/// SecureCredentialFile is an ephemeral MySQL option file (`[client]` stanza)
/// used instead of `-p<password>` so the password never shows up in `ps`.
///
/// 1. The name is generated by `tempfile`, so concurrent runs never collide.
/// 2. The file is owner read/write only (0600) and must be owned by us.
/// 3. Dropping the guard deletes the file, on success, error and unwind alike.
#[derive(Debug)]
pub struct SecureCredentialFile {
    file: NamedTempFile,
}

impl SecureCredentialFile {
    pub fn create(user: &str, password: &SecretString) -> Result<Self> {
        let contents = render_client_stanza(user, password)?;

        let mut file = tempfile::Builder::new()
            .prefix("mysql_config_")
            .suffix(".cnf")
            .tempfile()?;

        // 🛡️ Lock permissions before a single secret byte is written.
        file.as_file()
            .set_permissions(Permissions::from_mode(0o600))?;

        let meta = file.as_file().metadata()?;
        if meta.uid() != Uid::effective().as_raw() {
            return Err(RecipeError::invalid(
                "credentials file owner",
                file.path().display().to_string(),
            ));
        }

        file.write_all(contents.as_bytes())?;
        file.as_file().sync_all()?;

        Ok(Self { file })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// File name without directory, used to mirror the file on a remote host.
    pub fn file_name(&self) -> String {
        self.file
            .path()
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "mysql_config.cnf".to_string())
    }

    /// Deletes the file now. A failed delete is logged but never surfaced:
    /// it must not mask the outcome of the work that used the file.
    pub fn close(self) {
        let path = self.file.path().to_path_buf();
        if let Err(e) = self.file.close() {
            warn!("Failed to remove credentials file {}: {}", path.display(), e);
        }
    }
}

/// Runs `body` with the path of a fresh credentials file and removes the file
/// on every exit path.
pub fn with_secure_credential_file<F, R>(user: &str, password: &SecretString, body: F) -> Result<R>
where
    F: FnOnce(&Path) -> Result<R>,
{
    let file = SecureCredentialFile::create(user, password)?;
    let result = body(file.path());
    file.close();
    result
}

/// Async flavour of [`with_secure_credential_file`]. If the returned future is
/// dropped mid-flight the guard still deletes the file.
pub async fn with_secure_credential_file_async<F, Fut, R>(
    user: &str,
    password: &SecretString,
    body: F,
) -> Result<R>
where
    F: FnOnce(PathBuf, String) -> Fut,
    Fut: Future<Output = Result<R>>,
{
    let file = SecureCredentialFile::create(user, password)?;
    let result = body(file.path().to_path_buf(), file.file_name()).await;
    file.close();
    result
}

/// Values are quoted so `#` and `;` are not read as comments. MySQL tracks
/// both quote characters while looking for a trailing `#` comment, so the
/// quote is one the value does not contain; a value holding both quotes and a
/// `#` cannot be written safely and is refused. Inside the quotes MySQL still
/// honours `\\`, `\n`, `\r` and `\t`.
fn render_client_stanza(user: &str, password: &SecretString) -> Result<Zeroizing<String>> {
    let mut out = Zeroizing::new(String::from("[client]\n"));
    out.push_str("user=");
    push_option_value(&mut out, user)
        .ok_or_else(|| RecipeError::invalid("database user", user))?;
    out.push_str("\npassword=");
    // 🛡️ The rejected password never reaches the error value.
    push_option_value(&mut out, password.expose_secret())
        .ok_or_else(|| RecipeError::invalid("database password", "[REDACTED]"))?;
    out.push('\n');
    Ok(out)
}

fn option_quote(value: &str) -> Option<char> {
    match (value.contains('"'), value.contains('\'')) {
        (false, _) => Some('"'),
        (true, false) => Some('\''),
        (true, true) if !value.contains('#') => Some('"'),
        (true, true) => None,
    }
}

fn push_option_value(out: &mut String, value: &str) -> Option<()> {
    let quote = option_quote(value)?;
    out.push(quote);
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(ch),
        }
    }
    out.push(quote);
    Some(())
}

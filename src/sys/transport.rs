// src/sys/transport.rs
//
// ssh/rsync implementation of the runtime. Commands are spawned directly via
// execve; the only shells involved are the remote login shell (for `run`)
// and `bash -c` (for `run_locally`), both fed pre-escaped command lines.

use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::config::HostConfig;
use crate::error::{RecipeError, Result};
use crate::sys::traits::RemoteRuntime;

pub struct SshRuntime {
    destination: String,
    port: Option<u16>,
    working_dir: PathBuf,
}

impl SshRuntime {
    pub fn new(host: &HostConfig, working_dir: PathBuf) -> Self {
        let destination = match &host.remote_user {
            Some(user) => format!("{}@{}", user, host.hostname),
            None => host.hostname.clone(),
        };
        Self {
            destination,
            port: host.port,
            working_dir,
        }
    }

    fn ssh_options(&self) -> Vec<String> {
        let mut opts = vec!["-o".to_string(), "BatchMode=yes".to_string()];
        if let Some(port) = self.port {
            opts.push("-p".to_string());
            opts.push(port.to_string());
        }
        opts
    }

    /// rsync's `-e` value; rsync splits it on whitespace itself.
    fn rsync_shell(&self) -> String {
        let mut shell = String::from("ssh");
        for opt in self.ssh_options() {
            shell.push(' ');
            shell.push_str(&opt);
        }
        shell
    }

    fn remote_spec(&self, remote: &str) -> String {
        format!("{}:{}", self.destination, rsync_remote_path(remote))
    }

    async fn rsync(&self, source: &str, target: &str) -> Result<()> {
        let output = Command::new("rsync")
            .args(["-az", "--protect-args", "-e"])
            .arg(self.rsync_shell())
            .arg("--") // End of options
            .arg(source)
            .arg(target)
            .current_dir(&self.working_dir)
            .output()
            .await
            .map_err(|e| spawn_error("rsync", e))?;

        if !output.status.success() {
            return Err(RecipeError::CommandFailed {
                command: format!("rsync {} {}", source, target),
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

/// With `--protect-args` the remote side does no tilde expansion, but rsync
/// already resolves relative paths against the remote home directory.
fn rsync_remote_path(path: &str) -> String {
    if path == "~" || path == "~/" {
        return ".".to_string();
    }
    path.strip_prefix("~/").unwrap_or(path).to_string()
}

fn spawn_error(program: &str, e: std::io::Error) -> RecipeError {
    RecipeError::Io(std::io::Error::new(
        e.kind(),
        format!("failed to spawn {}: {}", program, e),
    ))
}

#[async_trait]
impl RemoteRuntime for SshRuntime {
    async fn run(&self, command: &str) -> Result<String> {
        debug!("[{}] $ {}", self.destination, command);

        let output = Command::new("ssh")
            .args(self.ssh_options())
            .arg("--")
            .arg(&self.destination)
            .arg(command)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| spawn_error("ssh", e))?;

        if !output.status.success() {
            return Err(RecipeError::CommandFailed {
                command: command.to_string(),
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim_end().to_string())
    }

    async fn run_locally(&self, command: &str) -> Result<String> {
        debug!("[local] $ {}", command);

        let mut child = Command::new("bash")
            .arg("-c")
            .arg(command)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| spawn_error("bash", e))?;

        let stdout = child.stdout.take().ok_or_else(|| {
            RecipeError::Io(std::io::Error::other("child stdout was not captured"))
        })?;
        let stderr = child.stderr.take().ok_or_else(|| {
            RecipeError::Io(std::io::Error::other("child stderr was not captured"))
        })?;

        // Stream both pipes through one channel so long builds show progress.
        let (log_tx, mut log_rx) = mpsc::channel::<(bool, String)>(100);

        let tx_out = log_tx.clone();
        tokio::spawn(async move {
            let mut reader = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = reader.next_line().await {
                let _ = tx_out.send((false, line)).await;
            }
        });

        let tx_err = log_tx;
        tokio::spawn(async move {
            let mut reader = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = reader.next_line().await {
                let _ = tx_err.send((true, line)).await;
            }
        });

        let mut captured = String::new();
        let mut captured_err = String::new();
        while let Some((is_err, line)) = log_rx.recv().await {
            if is_err {
                info!("[local:stderr] {}", line);
                captured_err.push_str(&line);
                captured_err.push('\n');
            } else {
                info!("[local] {}", line);
                captured.push_str(&line);
                captured.push('\n');
            }
        }

        let status = child.wait().await?;
        if !status.success() {
            return Err(RecipeError::CommandFailed {
                command: command.to_string(),
                status: status.code().unwrap_or(-1),
                stderr: captured_err.trim().to_string(),
            });
        }

        Ok(captured.trim_end().to_string())
    }

    async fn test_locally(&self, command: &str) -> Result<bool> {
        debug!("[local] ? {}", command);

        let status = Command::new("bash")
            .arg("-c")
            .arg(command)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| spawn_error("bash", e))?;

        Ok(status.success())
    }

    async fn upload(&self, local: &str, remote: &str) -> Result<()> {
        info!("⬆️ {} -> {}:{}", local, self.destination, remote);
        self.rsync(local, &self.remote_spec(remote)).await
    }

    async fn download(&self, remote: &str, local: &str) -> Result<()> {
        info!("⬇️ {}:{} -> {}", self.destination, remote, local);
        self.rsync(&self.remote_spec(remote), local).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(json: serde_json::Value) -> HostConfig {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn destination_includes_user_when_configured() {
        let rt = SshRuntime::new(
            &host(serde_json::json!({"alias": "a", "hostname": "h.example", "remote_user": "deploy", "port": 2222})),
            PathBuf::from("."),
        );
        assert_eq!(rt.destination, "deploy@h.example");
        assert_eq!(rt.rsync_shell(), "ssh -o BatchMode=yes -p 2222");
        assert_eq!(rt.remote_spec("~/shared/web/uploads/"), "deploy@h.example:shared/web/uploads/");
    }

    #[test]
    fn rsync_paths_drop_home_prefix() {
        assert_eq!(rsync_remote_path("~"), ".");
        assert_eq!(rsync_remote_path("~/release/public/dist"), "release/public/dist");
        assert_eq!(rsync_remote_path("/var/www/app/shared"), "/var/www/app/shared");
    }

    #[tokio::test]
    async fn local_commands_capture_stdout_and_fail_on_status() {
        let rt = SshRuntime::new(
            &host(serde_json::json!({"alias": "a", "hostname": "localhost"})),
            std::env::temp_dir(),
        );
        assert_eq!(rt.run_locally("printf 'a\\nb\\n'").await.unwrap(), "a\nb");
        assert!(rt.test_locally("true").await.unwrap());
        assert!(!rt.test_locally("false").await.unwrap());

        let err = rt.run_locally("echo oops >&2; exit 3").await.unwrap_err();
        match err {
            RecipeError::CommandFailed { status, stderr, .. } => {
                assert_eq!(status, 3);
                assert_eq!(stderr, "oops");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}

// src/sys/traits.rs
// 🛡️ Seams between the recipe and the outside world. Tasks only ever talk to
// these traits, so tests swap in recording fakes.

use async_trait::async_trait;

use crate::error::Result;

// ==============================================================================
// 1. Command Execution & File Transfer
// ==============================================================================

/// The orchestration runtime: remote/local shell execution and transfers.
///
/// Every `command` handed to this trait is a complete shell line whose
/// variable parts were already quoted with `safety::escape_argument`.
#[async_trait]
pub trait RemoteRuntime: Send + Sync {
    /// Runs `command` on the host and returns its captured stdout.
    async fn run(&self, command: &str) -> Result<String>;

    /// Runs `command` on the workstation and returns its captured stdout.
    async fn run_locally(&self, command: &str) -> Result<String>;

    /// Runs `command` on the workstation and reports whether it exited 0.
    async fn test_locally(&self, command: &str) -> Result<bool>;

    /// Copies a local file or directory (trailing `/` = contents) to the host.
    async fn upload(&self, local: &str, remote: &str) -> Result<()>;

    /// Copies a remote file or directory (trailing `/` = contents) locally.
    async fn download(&self, remote: &str, local: &str) -> Result<()>;
}

// ==============================================================================
// 2. Operator Interaction
// ==============================================================================

pub trait Confirm {
    fn confirm(&self, question: &str, default: bool) -> bool;
}

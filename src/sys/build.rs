// src/sys/build.rs

use regex::Regex;
use std::sync::LazyLock;

use crate::error::Result;
use crate::sys::safety::{escape_argument, escape_remote_path, validate_node_version};

static SEMVER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"v(\d+)\.(\d+)\.(\d+)").expect("static regex"));

/// Corepack ships with Node 14.19+, 16.9+ and everything after 16.
/// Only explicit `vX.Y.Z` strings qualify; keywords like `lts` do not.
pub fn node_supports_corepack(version: &str) -> bool {
    let Some(caps) = SEMVER_RE.captures(version) else {
        return false;
    };
    let (Ok(major), Ok(minor)) = (caps[1].parse::<u32>(), caps[2].parse::<u32>()) else {
        return false;
    };
    (major == 14 && minor >= 19) || (major == 16 && minor >= 9) || major > 16
}

/// Shell lines for an nvm-managed Node toolchain pinned by `.nvmrc`.
///
/// Every line sources nvm and selects the version itself: each command runs
/// in a fresh shell, so a bare `nvm use` would not carry over.
pub struct NodeToolchain {
    nvm_script: String,
    version: String,
}

impl NodeToolchain {
    /// 🛡️ The version comes from a file in the repository: validated before use.
    pub fn new(nvm_script: &str, version: &str) -> Result<Self> {
        let version = validate_node_version(version.trim())?.to_string();
        Ok(Self {
            nvm_script: nvm_script.to_string(),
            version,
        })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    fn source(&self) -> String {
        format!("source {}", escape_remote_path(&self.nvm_script))
    }

    pub fn is_installed_command(&self) -> String {
        let v = escape_argument(&self.version);
        format!("{} && nvm ls {} | grep -qF {}", self.source(), v, v)
    }

    pub fn install_command(&self) -> String {
        format!("{} && nvm install {}", self.source(), escape_argument(&self.version))
    }

    pub fn use_command(&self) -> String {
        format!("{} && nvm use {}", self.source(), escape_argument(&self.version))
    }

    /// Runs `command` with the pinned Node on PATH.
    pub fn with_node(&self, command: &str) -> String {
        format!(
            "{} && nvm use --silent {} && {}",
            self.source(),
            escape_argument(&self.version),
            command
        )
    }

    pub fn corepack_command(&self) -> Option<String> {
        node_supports_corepack(&self.version).then(|| self.with_node("corepack enable"))
    }

    pub fn yarn_install_command(&self) -> String {
        self.with_node("yarn install")
    }

    /// `yarn build` plus user flags, each flag quoted as its own word.
    pub fn yarn_build_command(&self, flags: &str) -> String {
        let mut command = String::from("yarn build");
        for flag in flags.split_whitespace() {
            command.push(' ');
            command.push_str(&escape_argument(flag));
        }
        self.with_node(&command)
    }
}

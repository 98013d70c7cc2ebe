// tests/common/mod.rs

#![allow(dead_code)]

use async_trait::async_trait;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex};

use deploy_recipe::config::{HostConfig, Inventory, RecipeConfig};
use deploy_recipe::error::{RecipeError, Result};
use deploy_recipe::project::Project;
use deploy_recipe::recipe::Recipe;
use deploy_recipe::sys::traits::RemoteRuntime;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Run(String),
    Local(String),
    Test(String),
    Upload { local: String, remote: String },
    Download { remote: String, local: String },
}

/// Records every runtime call. `run` answers from `(needle, output)` rules,
/// first match wins; commands containing a `fail_on` needle fail.
#[derive(Clone, Default)]
pub struct RecordingRuntime {
    pub calls: Arc<Mutex<Vec<Call>>>,
    pub responses: Arc<Vec<(String, String)>>,
    pub fail_on: Arc<Vec<String>>,
    pub installed: bool,
    /// Local files seen at upload time, with their contents.
    pub uploaded_files: Arc<Mutex<Vec<(String, String)>>>,
}

impl RecordingRuntime {
    pub fn with_responses(responses: &[(&str, &str)]) -> Self {
        Self {
            responses: Arc::new(
                responses
                    .iter()
                    .map(|(n, o)| (n.to_string(), o.to_string()))
                    .collect(),
            ),
            ..Self::default()
        }
    }

    pub fn failing_on(mut self, needles: &[&str]) -> Self {
        self.fail_on = Arc::new(needles.iter().map(|n| n.to_string()).collect());
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn check(&self, command: &str) -> Result<()> {
        if self.fail_on.iter().any(|n| command.contains(n.as_str())) {
            return Err(RecipeError::CommandFailed {
                command: command.to_string(),
                status: 1,
                stderr: "simulated failure".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteRuntime for RecordingRuntime {
    async fn run(&self, command: &str) -> Result<String> {
        self.calls.lock().unwrap().push(Call::Run(command.to_string()));
        self.check(command)?;
        Ok(self
            .responses
            .iter()
            .find(|(needle, _)| command.contains(needle.as_str()))
            .map(|(_, out)| out.clone())
            .unwrap_or_default())
    }

    async fn run_locally(&self, command: &str) -> Result<String> {
        self.calls.lock().unwrap().push(Call::Local(command.to_string()));
        self.check(command)?;
        Ok(String::new())
    }

    async fn test_locally(&self, command: &str) -> Result<bool> {
        self.calls.lock().unwrap().push(Call::Test(command.to_string()));
        Ok(self.installed)
    }

    async fn upload(&self, local: &str, remote: &str) -> Result<()> {
        if let Ok(contents) = fs::read_to_string(local) {
            self.uploaded_files
                .lock()
                .unwrap()
                .push((local.to_string(), contents));
        }
        self.calls.lock().unwrap().push(Call::Upload {
            local: local.to_string(),
            remote: remote.to_string(),
        });
        Ok(())
    }

    async fn download(&self, remote: &str, local: &str) -> Result<()> {
        self.calls.lock().unwrap().push(Call::Download {
            remote: remote.to_string(),
            local: local.to_string(),
        });
        Ok(())
    }
}

pub fn write(dir: &Path, rel: &str, contents: &str) {
    let path = dir.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, contents).unwrap();
}

pub fn host() -> HostConfig {
    serde_json::from_value(serde_json::json!({
        "alias": "production",
        "hostname": "web1.example.com",
        "remote_user": "acme",
        "deploy_path": "/srv/acme",
        "stage": "production",
    }))
    .unwrap()
}

pub fn recipe(dir: &Path, inventory: Inventory, runtime: RecordingRuntime) -> Recipe {
    let config =
        RecipeConfig::from_lookup(dir.to_path_buf(), None, |_| None).expect("default config");
    let project = Project::detect(dir).expect("project markers");
    Recipe::new(config, inventory, project, host(), Box::new(runtime))
}

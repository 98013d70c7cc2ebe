// src/config.rs

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::env;
use std::path::{Path, PathBuf};

use crate::error::{RecipeError, Result};
use crate::sys::scheduler::CronJob;

#[derive(Clone, Debug, Serialize)]
pub struct RecipeConfig {
    // 📂 Workstation side
    pub working_dir: PathBuf,
    pub inventory_path: PathBuf,

    // ⚙️ Release & scheduling policy
    pub keep_releases_staging: u32,
    pub keep_releases_default: u32,
    pub cron_minute: u8,

    // 🧰 Tooling locations
    pub supervisor_dir: String,
    pub nvm_script: String,
    pub php_bin: String,
    pub deploy_command: String,
}

impl RecipeConfig {
    pub fn load(working_dir: PathBuf, inventory: Option<PathBuf>) -> Result<Self> {
        Self::from_lookup(working_dir, inventory, |key| env::var(key).ok())
    }

    /// Same as [`RecipeConfig::load`] with an injectable variable source.
    pub fn from_lookup<F>(working_dir: PathBuf, inventory: Option<PathBuf>, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        // 🛡️ Strict numeric parsing: a non-number is an error, never a default.
        let keep_releases_staging = parse_number::<u32>(
            "DEPLOY_RECIPE_KEEP_RELEASES_STAGING",
            &var("DEPLOY_RECIPE_KEEP_RELEASES_STAGING", "1"),
        )?;
        let keep_releases_default = parse_number::<u32>(
            "DEPLOY_RECIPE_KEEP_RELEASES",
            &var("DEPLOY_RECIPE_KEEP_RELEASES", "3"),
        )?;
        let cron_minute =
            parse_number::<u8>("DEPLOY_RECIPE_CRON_MINUTE", &var("DEPLOY_RECIPE_CRON_MINUTE", "0"))?;
        if cron_minute > 59 {
            return Err(RecipeError::invalid("DEPLOY_RECIPE_CRON_MINUTE", cron_minute.to_string()));
        }

        let inventory_path = inventory
            .unwrap_or_else(|| PathBuf::from(var("DEPLOY_RECIPE_INVENTORY", "deploy.json")));
        let inventory_path = if inventory_path.is_absolute() {
            inventory_path
        } else {
            working_dir.join(inventory_path)
        };

        Ok(Self {
            inventory_path,
            keep_releases_staging,
            keep_releases_default,
            cron_minute,
            supervisor_dir: var("DEPLOY_RECIPE_SUPERVISOR_DIR", "/etc/projects/supervisor"),
            nvm_script: var("DEPLOY_RECIPE_NVM_SCRIPT", "~/.nvm/nvm.sh"),
            php_bin: var("DEPLOY_RECIPE_PHP_BIN", "php"),
            deploy_command: var("DEPLOY_RECIPE_DEPLOY_COMMAND", "dep deploy"),
            working_dir,
        })
    }

    /// Retention for `host`: staging hosts keep fewer releases.
    pub fn keep_releases(&self, host: &HostConfig) -> u32 {
        if host.stage.as_deref() == Some("staging") {
            self.keep_releases_staging
        } else {
            self.keep_releases_default
        }
    }
}

fn parse_number<T: std::str::FromStr>(key: &'static str, raw: &str) -> Result<T> {
    raw.trim()
        .parse::<T>()
        .map_err(|_| RecipeError::invalid(key, raw))
}

// ==============================================================================
// Inventory (deploy.json)
// ==============================================================================

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct HostConfig {
    pub alias: String,
    pub hostname: String,
    #[serde(default)]
    pub remote_user: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default = "default_deploy_path")]
    pub deploy_path: String,
    #[serde(default)]
    pub release_path: Option<String>,
    #[serde(default)]
    pub stage: Option<String>,
    #[serde(default)]
    pub http_user: Option<String>,
}

fn default_deploy_path() -> String {
    "~".to_string()
}

impl HostConfig {
    pub fn shared_path(&self) -> String {
        format!("{}/shared", self.deploy_path.trim_end_matches('/'))
    }

    pub fn current_path(&self) -> String {
        format!("{}/current", self.deploy_path.trim_end_matches('/'))
    }

    pub fn release_path(&self) -> String {
        self.release_path
            .clone()
            .unwrap_or_else(|| format!("{}/release", self.deploy_path.trim_end_matches('/')))
    }

    /// The web server user; falls back to the SSH user.
    pub fn http_user(&self) -> Result<&str> {
        self.http_user
            .as_deref()
            .or(self.remote_user.as_deref())
            .ok_or_else(|| RecipeError::invalid("http_user", ""))
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Inventory {
    pub hosts: Vec<HostConfig>,

    pub shared_dirs: Vec<String>,
    pub shared_files: Vec<String>,
    pub download_dirs: Option<Vec<String>>,
    pub upload_dirs: Option<Vec<String>>,

    pub assets_dirs: Option<Vec<String>>,
    pub assets_files: Vec<String>,
    pub assets_build_flags: String,

    pub restart_php: Option<bool>,
    pub php_config: Option<String>,
    pub restart_supervisor: Option<bool>,
    pub supervisor_configs: Option<Vec<String>>,

    pub crontab_jobs: Vec<CronJob>,
    pub crontab_autodetect: Option<bool>,
}

impl Inventory {
    /// Loads the inventory file. A missing file is an empty inventory.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(e.into()),
        };
        let inventory: Inventory = serde_json::from_str(&raw).map_err(|e| RecipeError::Inventory {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        inventory.validate().map_err(|reason| RecipeError::Inventory {
            path: path.to_path_buf(),
            reason,
        })?;
        Ok(inventory)
    }

    /// 🛡️ Host fields end up as ssh/rsync argv entries: anything that could be
    /// read as an option or spans whitespace is refused up front.
    pub fn validate(&self) -> std::result::Result<(), String> {
        let mut seen = HashSet::new();
        for host in &self.hosts {
            if host.alias.is_empty() || !seen.insert(host.alias.as_str()) {
                return Err(format!("duplicate or empty host alias '{}'", host.alias));
            }
            if !is_argv_safe(&host.hostname) {
                return Err(format!("invalid hostname '{}' for {}", host.hostname, host.alias));
            }
            if let Some(user) = &host.remote_user {
                if !is_argv_safe(user) || user.contains('@') {
                    return Err(format!("invalid remote_user '{}' for {}", user, host.alias));
                }
            }
            if host.deploy_path.is_empty() || host.deploy_path.contains("..") {
                return Err(format!("invalid deploy_path '{}' for {}", host.deploy_path, host.alias));
            }
        }
        Ok(())
    }

    pub fn host(&self, alias: &str) -> Result<&HostConfig> {
        self.hosts
            .iter()
            .find(|h| h.alias == alias)
            .ok_or_else(|| RecipeError::UnknownHost(alias.to_string()))
    }
}

fn is_argv_safe(value: &str) -> bool {
    !value.is_empty()
        && !value.starts_with('-')
        && !value.chars().any(|c| c.is_whitespace() || c.is_control())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn host(stage: Option<&str>) -> HostConfig {
        serde_json::from_value(serde_json::json!({
            "alias": "web1",
            "hostname": "web1.example.com",
            "stage": stage,
        }))
        .unwrap()
    }

    #[test]
    fn defaults_apply_without_environment() {
        let cfg = RecipeConfig::from_lookup(PathBuf::from("/work"), None, lookup(&[])).unwrap();
        assert_eq!(cfg.keep_releases_staging, 1);
        assert_eq!(cfg.keep_releases_default, 3);
        assert_eq!(cfg.cron_minute, 0);
        assert_eq!(cfg.inventory_path, PathBuf::from("/work/deploy.json"));
        assert_eq!(cfg.supervisor_dir, "/etc/projects/supervisor");
    }

    #[test]
    fn non_numeric_values_refuse_to_load() {
        let err = RecipeConfig::from_lookup(
            PathBuf::from("/work"),
            None,
            lookup(&[("DEPLOY_RECIPE_KEEP_RELEASES", "three")]),
        )
        .unwrap_err();
        assert!(matches!(err, RecipeError::InvalidInput { field: "DEPLOY_RECIPE_KEEP_RELEASES", .. }));

        assert!(RecipeConfig::from_lookup(
            PathBuf::from("/work"),
            None,
            lookup(&[("DEPLOY_RECIPE_CRON_MINUTE", "60")]),
        )
        .is_err());
    }

    #[test]
    fn keep_releases_depends_on_stage() {
        let cfg = RecipeConfig::from_lookup(PathBuf::from("/w"), None, lookup(&[])).unwrap();
        assert_eq!(cfg.keep_releases(&host(Some("staging"))), 1);
        assert_eq!(cfg.keep_releases(&host(Some("production"))), 3);
        assert_eq!(cfg.keep_releases(&host(None)), 3);
    }

    #[test]
    fn host_paths_derive_from_deploy_path() {
        let h = host(None);
        assert_eq!(h.deploy_path, "~");
        assert_eq!(h.shared_path(), "~/shared");
        assert_eq!(h.release_path(), "~/release");
        assert_eq!(h.current_path(), "~/current");
        assert!(h.http_user().is_err());
    }

    #[test]
    fn inventory_rejects_option_like_hostnames() {
        let inv: Inventory = serde_json::from_str(
            r#"{"hosts": [{"alias": "x", "hostname": "-oProxyCommand=id"}]}"#,
        )
        .unwrap();
        assert!(inv.validate().is_err());

        let inv: Inventory = serde_json::from_str(
            r#"{"hosts": [{"alias": "x", "hostname": "a"}, {"alias": "x", "hostname": "b"}]}"#,
        )
        .unwrap();
        assert!(inv.validate().is_err());
    }

    #[test]
    fn missing_inventory_is_empty() {
        let tmp = tempfile::TempDir::new().unwrap();
        let inv = Inventory::load(&tmp.path().join("deploy.json")).unwrap();
        assert!(inv.hosts.is_empty());
        assert!(matches!(inv.host("web1"), Err(RecipeError::UnknownHost(_))));
    }
}

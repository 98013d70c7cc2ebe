// src/project.rs
//
// Per-run project facts: the detected stack plus every setting that derives
// from it. Each derived list is a plain function of (classification, inventory),
// evaluated when a task asks for it.

use indexmap::IndexSet;
use serde::Serialize;
use std::path::Path;

use crate::config::{HostConfig, Inventory, RecipeConfig};
use crate::error::Result;
use crate::sys::detect::{self, ComposerManifest, ProjectPaths, ProjectType};
use crate::sys::safety::{validate_directory_path, validate_identifier};
use crate::sys::scheduler::{self, CronRequest};

const PUBLIC_DIR_PLACEHOLDER: &str = "{{public_dir}}";

pub struct Project {
    pub kind: ProjectType,
    pub paths: ProjectPaths,
    pub manifest: ComposerManifest,
}

impl Project {
    /// Classifies the working tree once; the result is threaded through the run.
    pub fn detect(dir: &Path) -> Result<Self> {
        let manifest = ComposerManifest::load(dir)?;
        let kind = detect::detect(dir, &manifest)?;
        Ok(Self {
            kind,
            paths: kind.paths(),
            manifest,
        })
    }

    fn expand(&self, value: &str) -> String {
        value.replace(PUBLIC_DIR_PLACEHOLDER, self.paths.public_dir)
    }

    fn uploads_dir(&self) -> String {
        format!("{}/uploads", self.paths.public_dir)
    }

    pub fn shared_dirs(&self, inventory: &Inventory) -> Vec<String> {
        let mut dirs: Vec<String> = inventory.shared_dirs.iter().map(|d| self.expand(d)).collect();
        if matches!(self.kind, ProjectType::Kunstmaan | ProjectType::CraftCms) {
            dirs.push(self.uploads_dir());
        }
        if self.kind == ProjectType::CraftCms {
            dirs.push(format!("{}/formie-uploads", self.paths.public_dir));
            dirs.push("translations".to_string());
        }
        dedup(dirs)
    }

    pub fn shared_files(&self, inventory: &Inventory) -> Vec<String> {
        let mut files: Vec<String> = inventory.shared_files.iter().map(|f| self.expand(f)).collect();
        if matches!(self.kind, ProjectType::Symfony | ProjectType::Kunstmaan) {
            files.push(".env".to_string());
        }
        dedup(files)
    }

    fn default_sync_dirs(&self) -> Vec<String> {
        let mut dirs = Vec::new();
        if matches!(self.kind, ProjectType::Kunstmaan | ProjectType::CraftCms) {
            dirs.push(self.uploads_dir());
        }
        if self.kind == ProjectType::CraftCms {
            dirs.push("translations".to_string());
        }
        dirs
    }

    /// Directories pulled from `shared/` by the download task, validated.
    pub fn download_dirs(&self, inventory: &Inventory) -> Result<Vec<String>> {
        self.validated_dirs(inventory.download_dirs.as_deref())
    }

    /// Directories pushed to `shared/` by the upload task, validated.
    pub fn upload_dirs(&self, inventory: &Inventory) -> Result<Vec<String>> {
        self.validated_dirs(inventory.upload_dirs.as_deref())
    }

    pub fn assets_dirs(&self, inventory: &Inventory) -> Result<Vec<String>> {
        match inventory.assets_dirs.as_deref() {
            Some(dirs) => self.validate_all(dirs),
            None => self.validate_all(&[format!("{}/dist", self.paths.public_dir)]),
        }
    }

    pub fn assets_files(&self, inventory: &Inventory) -> Result<Vec<String>> {
        self.validate_all(&inventory.assets_files)
    }

    fn validated_dirs(&self, configured: Option<&[String]>) -> Result<Vec<String>> {
        match configured {
            Some(dirs) => self.validate_all(dirs),
            None => self.validate_all(&self.default_sync_dirs()),
        }
    }

    fn validate_all(&self, values: &[String]) -> Result<Vec<String>> {
        let mut out = Vec::with_capacity(values.len());
        for value in values {
            out.push(validate_directory_path(&self.expand(value))?);
        }
        Ok(dedup(out))
    }

    /// `php-fpm-<http_user>.service` unless the inventory names a unit.
    pub fn php_config(&self, inventory: &Inventory, host: &HostConfig) -> Result<String> {
        let unit = match &inventory.php_config {
            Some(unit) => unit.clone(),
            None => format!("php-fpm-{}.service", host.http_user()?),
        };
        Ok(validate_identifier(&unit)?.to_string())
    }

    /// `<http_user>.conf` unless the inventory lists configs.
    pub fn supervisor_configs(&self, inventory: &Inventory, host: &HostConfig) -> Result<Vec<String>> {
        let configs = match &inventory.supervisor_configs {
            Some(configs) => configs.clone(),
            None => vec![format!("{}.conf", host.http_user()?)],
        };
        configs
            .iter()
            .map(|c| validate_identifier(c).map(str::to_string))
            .collect()
    }

    pub fn cron_lines(
        &self,
        config: &RecipeConfig,
        inventory: &Inventory,
        host: &HostConfig,
    ) -> Result<Vec<String>> {
        let deploy_path = host.current_path();
        let request = CronRequest {
            jobs: &inventory.crontab_jobs,
            autodetect: inventory.crontab_autodetect.unwrap_or(true),
            deploy_path: &deploy_path,
            minute: config.cron_minute,
            php_bin: &config.php_bin,
        };
        scheduler::build(&request, &self.manifest)
    }

    /// Snapshot of the resolved settings, printed by `show-config`.
    pub fn summary(
        &self,
        config: &RecipeConfig,
        inventory: &Inventory,
        host: Option<&HostConfig>,
    ) -> Result<ProjectSummary> {
        Ok(ProjectSummary {
            project_type: self.kind,
            dump_dir: self.paths.dump_dir,
            public_dir: self.paths.public_dir,
            shared_dirs: self.shared_dirs(inventory),
            shared_files: self.shared_files(inventory),
            download_dirs: self.download_dirs(inventory)?,
            upload_dirs: self.upload_dirs(inventory)?,
            assets_dirs: self.assets_dirs(inventory)?,
            keep_releases: host.map(|h| config.keep_releases(h)),
            crontab: match host {
                Some(h) => self.cron_lines(config, inventory, h)?,
                None => Vec::new(),
            },
        })
    }
}

#[derive(Debug, Serialize)]
pub struct ProjectSummary {
    pub project_type: ProjectType,
    pub dump_dir: &'static str,
    pub public_dir: &'static str,
    pub shared_dirs: Vec<String>,
    pub shared_files: Vec<String>,
    pub download_dirs: Vec<String>,
    pub upload_dirs: Vec<String>,
    pub assets_dirs: Vec<String>,
    pub keep_releases: Option<u32>,
    pub crontab: Vec<String>,
}

fn dedup(values: Vec<String>) -> Vec<String> {
    values.into_iter().collect::<IndexSet<_>>().into_iter().collect()
}

// src/recipe.rs

use chrono::Utc;
use secrecy::SecretString;
use std::path::PathBuf;
use tracing::{error, info, warn};
use zeroize::Zeroizing;

use crate::config::{HostConfig, Inventory, RecipeConfig};
use crate::error::{RecipeError, Result, Side};
use crate::project::Project;
use crate::sys::build::NodeToolchain;
use crate::sys::credentials::{self, ResolvedCredentials};
use crate::sys::env;
use crate::sys::safety::{
    escape_argument, escape_remote_path, local_pipeline, remote_pipeline, validate_identifier, within,
};
use crate::sys::scheduler;
use crate::sys::secrets::with_secure_credential_file_async;
use crate::sys::systemd::{restart_unit_command, supervisor_restart_command};
use crate::sys::traits::RemoteRuntime;

/// One deployment target: configuration, detected project and the runtime
/// that reaches the host. Tasks are methods; each reads what it needs from
/// these explicit fields.
pub struct Recipe {
    config: RecipeConfig,
    inventory: Inventory,
    project: Project,
    host: HostConfig,
    runtime: Box<dyn RemoteRuntime>,
}

impl Recipe {
    pub fn new(
        config: RecipeConfig,
        inventory: Inventory,
        project: Project,
        host: HostConfig,
        runtime: Box<dyn RemoteRuntime>,
    ) -> Self {
        Self {
            config,
            inventory,
            project,
            host,
            runtime,
        }
    }

    pub fn project(&self) -> &Project {
        &self.project
    }

    async fn read_remote_env(&self) -> Result<Zeroizing<String>> {
        info!("Reading remote .env file...");
        let content = self
            .runtime
            .run(&within(&self.host.shared_path(), "cat .env"))
            .await?;
        Ok(Zeroizing::new(content))
    }

    fn read_local_env(&self) -> Result<Zeroizing<String>> {
        info!("Reading local .env file...");
        let path = self.config.working_dir.join(".env");
        match std::fs::read_to_string(&path) {
            Ok(content) => Ok(Zeroizing::new(content)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(RecipeError::MissingFile { path })
            }
            Err(e) => Err(e.into()),
        }
    }

    // ==========================================================================
    // Database
    // ==========================================================================

    /// Dumps the remote database, downloads it and replaces the local database
    /// with it. Returns the local dump path (removed after import).
    pub async fn db_download(&self) -> Result<PathBuf> {
        let remote_env = self.read_remote_env().await?;
        let remote = credentials::extract(&env::parse(&remote_env))
            .require(Side::Remote)
            .inspect_err(|_| error!("Could not extract remote database credentials."))?;
        let remote_db = validate_identifier(&remote.database)?.to_string();

        let dump_file = format!("current_{}.sql.gz", remote_db);
        let remote_dump = format!("~/{}", dump_file);
        let local_dump_rel = format!("{}/{}", self.project.paths.dump_dir, dump_file);
        let local_dump = self.config.working_dir.join(&local_dump_rel);

        info!("Creating remote database dump...");
        self.dump_remote(&remote, &remote_dump).await?;

        info!("Downloading database dump to local path: {}...", local_dump_rel);
        std::fs::create_dir_all(self.config.working_dir.join(self.project.paths.dump_dir))?;
        let downloaded = self.runtime.download(&remote_dump, &local_dump_rel).await;

        info!("Removing remote database dump...");
        self.runtime
            .run(&format!("rm -f {}", escape_remote_path(&remote_dump)))
            .await?;
        downloaded?;

        info!("Importing database from local dump: {}...", local_dump_rel);
        let local_env = self.read_local_env()?;
        let local = credentials::extract(&env::parse(&local_env))
            .require(Side::Local)
            .inspect_err(|_| error!("Could not extract local database credentials."))?;
        validate_identifier(&local.database)?;

        let imported = self.import_local(&local, &local_dump_rel).await;

        info!("Removing local dump file...");
        self.runtime
            .run_locally(&format!("rm -f {}", escape_argument(&local_dump_rel)))
            .await?;
        imported?;

        Ok(local_dump)
    }

    /// Mirrors the local option file on the host for the duration of the dump.
    async fn dump_remote(&self, creds: &ResolvedCredentials, remote_dump: &str) -> Result<()> {
        let database = creds.database.clone();
        let remote_dump = remote_dump.to_string();

        with_secure_credential_file_async(&creds.user, &creds.password, |local_cnf, name| async move {
            let remote_cnf = format!("~/.{}", name);
            let cnf_arg = escape_remote_path(&remote_cnf);

            let outcome = async {
                self.runtime
                    .upload(&local_cnf.to_string_lossy(), &remote_cnf)
                    .await?;
                self.runtime.run(&format!("chmod 600 {}", cnf_arg)).await?;
                self.runtime
                    .run(&remote_pipeline(&format!(
                        "mysqldump --defaults-extra-file={} --quick --single-transaction {} | gzip > {}",
                        cnf_arg,
                        escape_argument(&database),
                        escape_remote_path(&remote_dump)
                    )))
                    .await
            }
            .await;

            // 🛡️ The remote copy goes on every path; a failed delete must not
            // hide the dump's own result.
            if let Err(e) = self.runtime.run(&format!("rm -f {}", cnf_arg)).await {
                warn!("Failed to remove remote credentials file: {}", e);
            }
            outcome.map(|_| ())
        })
        .await
    }

    async fn import_local(&self, creds: &ResolvedCredentials, dump: &str) -> Result<()> {
        let database = creds.database.clone();
        let dump = dump.to_string();

        with_secure_credential_file_async(&creds.user, &creds.password, |cnf, _| async move {
            let cnf_arg = escape_argument(&cnf.to_string_lossy());
            let sql = format!(
                "DROP DATABASE IF EXISTS `{db}`; CREATE DATABASE `{db}`;",
                db = database
            );

            info!("Creating local database if it does not exist...");
            self.runtime
                .run_locally(&format!(
                    "mysql --defaults-extra-file={} -e {}",
                    cnf_arg,
                    escape_argument(&sql)
                ))
                .await?;

            info!("Importing database dump into local database...");
            self.runtime
                .run_locally(&local_pipeline(&format!(
                    "gunzip -c {} | mysql --defaults-extra-file={} {}",
                    escape_argument(&dump),
                    cnf_arg,
                    escape_argument(&database)
                )))
                .await?;
            Ok(())
        })
        .await
    }

    /// Remote database user and password, for the operator to read.
    pub async fn db_credentials(&self) -> Result<(String, SecretString)> {
        let remote_env = self.read_remote_env().await?;
        let creds = credentials::extract(&env::parse(&remote_env));
        match (creds.user, creds.password) {
            (Some(user), Some(password)) => Ok((user, password)),
            _ => Err(RecipeError::CredentialsNotFound { side: Side::Remote }),
        }
    }

    // ==========================================================================
    // Directory Sync
    // ==========================================================================

    pub async fn download(&self) -> Result<Vec<String>> {
        let dirs = self.project.download_dirs(&self.inventory)?;
        info!("Downloading directories from remote to local...");

        for dir in &dirs {
            info!("Downloading directory: {}...", dir);
            let remote = format!("{}/{}/", self.host.shared_path(), dir);
            self.runtime.download(&remote, &format!("{}/", dir)).await?;
        }
        Ok(dirs)
    }

    pub async fn upload(&self) -> Result<Vec<String>> {
        let dirs = self.project.upload_dirs(&self.inventory)?;
        info!("Uploading directories from local to remote...");

        for dir in &dirs {
            info!("Uploading directory: {}...", dir);
            let remote = format!("{}/{}", self.host.shared_path(), dir);
            self.runtime.upload(&format!("{}/", dir), &remote).await?;
        }
        Ok(dirs)
    }

    // ==========================================================================
    // Assets
    // ==========================================================================

    pub async fn build_assets(&self) -> Result<()> {
        info!("Loading Node.js version from .nvmrc...");
        let nvmrc = self.config.working_dir.join(".nvmrc");
        let raw = match std::fs::read_to_string(&nvmrc) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(RecipeError::MissingFile { path: nvmrc });
            }
            Err(e) => return Err(e.into()),
        };

        let node = NodeToolchain::new(&self.config.nvm_script, &raw)?;
        info!("Using Node.js version: {}", node.version());

        info!("Checking if Node.js version is already installed...");
        if self.runtime.test_locally(&node.is_installed_command()).await? {
            info!("Node.js version is already installed. Using it...");
            self.runtime.run_locally(&node.use_command()).await?;
        } else {
            info!("Node.js version is not installed. Installing...");
            self.runtime.run_locally(&node.install_command()).await?;
        }

        if let Some(corepack) = node.corepack_command() {
            info!("Enabling Corepack...");
            self.runtime.run_locally(&corepack).await?;
        }

        info!("Installing dependencies...");
        self.runtime.run_locally(&node.yarn_install_command()).await?;

        info!("Building assets...");
        self.runtime
            .run_locally(&node.yarn_build_command(&self.inventory.assets_build_flags))
            .await?;
        Ok(())
    }

    pub async fn upload_assets(&self) -> Result<()> {
        let release = self.host.release_path();
        info!("Uploading built assets from local to remote...");

        for dir in self.project.assets_dirs(&self.inventory)? {
            info!("Uploading assets directory: {}...", dir);
            self.runtime
                .upload(&format!("{}/", dir), &format!("{}/{}", release, dir))
                .await?;
        }
        for file in self.project.assets_files(&self.inventory)? {
            info!("Uploading assets file: {}...", file);
            self.runtime
                .upload(&file, &format!("{}/{}", release, file))
                .await?;
        }
        Ok(())
    }

    // ==========================================================================
    // Services
    // ==========================================================================

    pub async fn restart_php(&self) -> Result<bool> {
        if !self.inventory.restart_php.unwrap_or(true) {
            info!("php-fpm is not enabled for this project.");
            return Ok(false);
        }

        let unit = self.project.php_config(&self.inventory, &self.host)?;
        info!("Restarting php-fpm config: {}...", unit);
        self.runtime.run(&restart_unit_command(&unit)?).await?;
        Ok(true)
    }

    pub async fn restart_supervisor(&self) -> Result<bool> {
        if !self.inventory.restart_supervisor.unwrap_or(true) {
            info!("Supervisor is not enabled for this project.");
            return Ok(false);
        }

        info!("Restarting supervisor...");
        for config in self.project.supervisor_configs(&self.inventory, &self.host)? {
            info!("Restarting supervisor config: {}...", config);
            self.runtime
                .run(&supervisor_restart_command(&self.config.supervisor_dir, &config)?)
                .await?;
        }
        Ok(true)
    }

    // ==========================================================================
    // Scheduling
    // ==========================================================================

    /// Installs the managed cron block into the remote user's crontab.
    pub async fn install_crontab(&self) -> Result<Vec<String>> {
        let lines = self
            .project
            .cron_lines(&self.config, &self.inventory, &self.host)?;

        // `crontab -l` exits non-zero when the user has no crontab yet.
        let existing = self
            .runtime
            .run("crontab -l 2>/dev/null || true")
            .await?;
        let merged =
            scheduler::merge_into_crontab(&existing, &self.host.current_path(), &lines, Utc::now());

        info!("Installing {} cron job(s)...", lines.len());
        self.runtime
            .run(&format!("printf '%s' {} | crontab -", escape_argument(&merged)))
            .await?;
        Ok(lines)
    }
}

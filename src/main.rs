// src/main.rs

use clap::{Parser, Subcommand};
use secrecy::ExposeSecret;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use deploy_recipe::config::{Inventory, RecipeConfig};
use deploy_recipe::project::Project;
use deploy_recipe::recipe::Recipe;
use deploy_recipe::sys::stage::{self, StdinConfirm};
use deploy_recipe::sys::transport::SshRuntime;
use deploy_recipe::{RecipeError, Result};

#[derive(Parser)]
#[command(
    name = "deploy-recipe",
    about = "Stack-aware deployment tasks for Symfony, Kunstmaan, Craft CMS and Laravel projects",
    version
)]
struct Cli {
    /// Inventory file (default: ./deploy.json)
    #[arg(long, global = true, env = "DEPLOY_RECIPE_INVENTORY")]
    inventory: Option<PathBuf>,

    /// Project root (default: current directory)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Detect the project type and print its path conventions
    Load,
    /// Offer to deploy every host sharing the host's stage
    StagePrompt { host: String },
    /// Dump the remote database and import it locally
    DbDownload { host: String },
    /// Print the remote database user and password
    DbCredentials { host: String },
    /// Download shared directories from the host
    Download { host: String },
    /// Upload shared directories to the host
    Upload { host: String },
    /// Build front-end assets with the Node version from .nvmrc
    BuildAssets { host: String },
    /// Upload built assets into the release
    UploadAssets { host: String },
    /// Restart the host's php-fpm unit
    RestartPhp { host: String },
    /// Restart the host's supervisor programs
    RestartSupervisor { host: String },
    /// Install the project's cron jobs on the host
    Crontab { host: String },
    /// Print the resolved configuration as JSON
    ShowConfig { host: Option<String> },
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    // ==============================================================================
    // 1. Configuration & Project Classification
    // ==============================================================================

    let root = match cli.root {
        Some(root) => root,
        None => std::env::current_dir()?,
    };
    let config = RecipeConfig::load(root, cli.inventory)?;
    let inventory = Inventory::load(&config.inventory_path)?;

    // 🛡️ No safe default stack: an unknown project aborts the whole run.
    let project = Project::detect(&config.working_dir)?;
    tracing::info!("Project type detected: {}", project.kind);
    tracing::info!("Dump directory set to: {}", project.paths.dump_dir);
    tracing::info!("Public directory set to: {}", project.paths.public_dir);

    let alias = match &cli.command {
        Commands::Load => return Ok(()),
        Commands::ShowConfig { host } => {
            let host = host.as_deref().map(|a| inventory.host(a)).transpose()?;
            let summary = project.summary(&config, &inventory, host)?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
            return Ok(());
        }
        Commands::StagePrompt { host } => {
            if let Some(plan) = stage::prompt(&inventory, host, &StdinConfirm)? {
                println!("{}", plan.hosts.join(","));
                println!("{}", plan.deploy_command(&config.deploy_command));
            }
            return Ok(());
        }
        Commands::DbDownload { host }
        | Commands::DbCredentials { host }
        | Commands::Download { host }
        | Commands::Upload { host }
        | Commands::BuildAssets { host }
        | Commands::UploadAssets { host }
        | Commands::RestartPhp { host }
        | Commands::RestartSupervisor { host }
        | Commands::Crontab { host } => host.clone(),
    };

    // ==============================================================================
    // 2. Runtime Wiring
    // ==============================================================================

    let host = inventory.host(&alias)?.clone();
    let runtime = SshRuntime::new(&host, config.working_dir.clone());
    let recipe = Recipe::new(config, inventory, project, host, Box::new(runtime));

    // ==============================================================================
    // 3. Task Dispatch
    // ==============================================================================

    match cli.command {
        Commands::DbDownload { .. } => {
            recipe.db_download().await?;
        }
        Commands::DbCredentials { .. } => {
            let (user, password) = recipe.db_credentials().await?;
            // Printed for the operator only; never routed through tracing.
            println!("Remote database username: {}", user);
            println!("Remote database password: {}", password.expose_secret());
        }
        Commands::Download { .. } => {
            recipe.download().await?;
        }
        Commands::Upload { .. } => {
            recipe.upload().await?;
        }
        Commands::BuildAssets { .. } => {
            recipe.build_assets().await?;
        }
        Commands::UploadAssets { .. } => {
            recipe.upload_assets().await?;
        }
        Commands::RestartPhp { .. } => {
            recipe.restart_php().await?;
        }
        Commands::RestartSupervisor { .. } => {
            recipe.restart_supervisor().await?;
        }
        Commands::Crontab { .. } => {
            for line in recipe.install_crontab().await? {
                println!("{}", line);
            }
        }
        Commands::Load | Commands::ShowConfig { .. } | Commands::StagePrompt { .. } => {
            return Err(RecipeError::invalid("task", "unreachable dispatch"));
        }
    }

    Ok(())
}

// src/sys/stage.rs
//
// Stage fan-out: when a host shares its stage label with other hosts, offer to
// deploy the whole stage instead of the single host.

use std::io::{BufRead, Write};
use tracing::{info, warn};

use crate::config::Inventory;
use crate::error::Result;
use crate::sys::safety::{escape_argument, validate_stage};
use crate::sys::traits::Confirm;

#[derive(Debug, PartialEq, Eq)]
pub struct StagePlan {
    pub stage: String,
    pub hosts: Vec<String>,
}

impl StagePlan {
    /// The nested re-invocation that deploys every host of the stage.
    pub fn deploy_command(&self, deploy_command: &str) -> String {
        format!("{} {}", deploy_command, escape_argument(&self.stage))
    }
}

/// Hosts sharing `alias`'s stage, when that is more than one host but not the
/// whole inventory. The stage label is validated before it goes anywhere.
pub fn hosts_sharing_stage(inventory: &Inventory, alias: &str) -> Result<Option<StagePlan>> {
    let selected = inventory.host(alias)?;
    let Some(stage) = selected.stage.as_deref().filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    let stage = validate_stage(stage)?;

    let hosts: Vec<String> = inventory
        .hosts
        .iter()
        .filter(|h| h.stage.as_deref() == Some(stage))
        .map(|h| h.alias.clone())
        .collect();

    if hosts.len() > 1 && hosts.len() != inventory.hosts.len() {
        return Ok(Some(StagePlan {
            stage: stage.to_string(),
            hosts,
        }));
    }
    Ok(None)
}

/// Asks the operator whether to widen the deploy to the whole stage.
pub fn prompt(inventory: &Inventory, alias: &str, confirm: &dyn Confirm) -> Result<Option<StagePlan>> {
    let Some(plan) = hosts_sharing_stage(inventory, alias)? else {
        return Ok(None);
    };
    let host = inventory.host(alias)?;
    info!("Host {} ({}) has stage {}", host.alias, host.hostname, plan.stage);

    let question = format!("Do you want to deploy to all hosts with stage {}?", plan.stage);
    if confirm.confirm(&question, false) {
        info!("Deploying to all hosts with stage {}", plan.stage);
        return Ok(Some(plan));
    }
    Ok(None)
}

/// Reads a yes/no answer from stdin; anything unrecognised is the default.
pub struct StdinConfirm;

impl Confirm for StdinConfirm {
    fn confirm(&self, question: &str, default: bool) -> bool {
        ask(std::io::stdin().lock(), std::io::stdout(), question, default)
    }
}

/// Asks `question` on `output` and reads one answer line from `input`.
/// If the prompt cannot be shown or read, the answer is `default`.
pub fn ask<R: BufRead, W: Write>(mut input: R, mut output: W, question: &str, default: bool) -> bool {
    let hint = if default { "[Y/n]" } else { "[y/N]" };
    if let Err(e) = write!(output, "{} {} ", question, hint).and_then(|_| output.flush()) {
        warn!("Could not show confirmation prompt: {}", e);
        return default;
    }

    let mut answer = String::new();
    if input.read_line(&mut answer).is_err() {
        return default;
    }
    match answer.trim().to_ascii_lowercase().as_str() {
        "y" | "yes" => true,
        "n" | "no" => false,
        _ => default,
    }
}

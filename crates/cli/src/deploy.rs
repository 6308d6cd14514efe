//! `jobportal deploy`: deploy, read back, report.

use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, bail};
use serde::Serialize;
use tracing::info;

use jobportal_core::PrincipalId;
use jobportal_infra::{Deployment, InMemoryPortal, InMemoryTreasury, Settings};
use jobportal_ledger::{LedgerId, LedgerStats};

use crate::cli::DeployArgs;

/// Decimals used when printing amounts for humans.
pub const DISPLAY_DECIMALS: u32 = 18;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormattedStats {
    pub total_jobs: String,
    pub total_revenue: String,
    pub current_fee: String,
    pub contract_balance: String,
}

impl From<&LedgerStats> for FormattedStats {
    fn from(stats: &LedgerStats) -> Self {
        Self {
            total_jobs: stats.total_jobs.to_string(),
            total_revenue: stats.total_revenue.format_units(DISPLAY_DECIMALS),
            current_fee: stats.current_fee.format_units(DISPLAY_DECIMALS),
            contract_balance: stats.contract_balance.format_units(DISPLAY_DECIMALS),
        }
    }
}

/// What the tool prints once a ledger is up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentReport {
    pub ledger_id: LedgerId,
    pub administrator: PrincipalId,
    pub stats: LedgerStats,
    pub formatted: FormattedStats,
}

impl DeploymentReport {
    pub fn new(ledger_id: LedgerId, administrator: PrincipalId, stats: LedgerStats) -> Self {
        Self {
            ledger_id,
            administrator,
            formatted: FormattedStats::from(&stats),
            stats,
        }
    }
}

/// Flags win over settings; without either a fresh administrator is made up.
pub fn deployment(settings: &Settings, args: &DeployArgs) -> anyhow::Result<Deployment> {
    let administrator = match args.admin {
        Some(admin) => admin,
        None => settings
            .administrator()?
            .unwrap_or_else(PrincipalId::random),
    };

    let mut deployment = Deployment::from_settings(&settings.ledger, administrator);
    if let Some(fee) = args.fee {
        deployment.initial_fee = fee;
    }
    Ok(deployment)
}

/// Deploy and verify the ledger reads back in its initial state.
pub fn deploy(
    settings: &Settings,
    deployment: Deployment,
) -> anyhow::Result<(InMemoryPortal, DeploymentReport)> {
    info!("Deploying JobPortal ledger...");

    let portal = InMemoryPortal::deploy_in_memory(Arc::new(InMemoryTreasury::new()), deployment)
        .context("ledger deployment failed")?
        .with_conflict_retries(settings.ledger.max_conflict_retries);

    let stats = portal
        .stats()
        .context("reading stats after deployment")?;
    let expected = LedgerStats::initial(deployment.initial_fee);
    if stats != expected {
        bail!("ledger reports {stats:?} right after deployment, expected {expected:?}");
    }

    info!(ledger_id = %portal.ledger_id(), "JobPortal deployed");
    let report = DeploymentReport::new(portal.ledger_id(), deployment.administrator, stats);
    Ok((portal, report))
}

/// Entry point of `jobportal deploy`.
pub fn execute(settings: &Settings, args: &DeployArgs, out: &mut impl Write) -> anyhow::Result<()> {
    let deployment = deployment(settings, args)?;
    let (_, report) = deploy(settings, deployment)?;

    serde_json::to_writer_pretty(&mut *out, &report)?;
    writeln!(out)?;
    Ok(())
}

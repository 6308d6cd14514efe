//! `jobportal run`: apply a scripted sequence of ledger operations.
//!
//! ```json
//! {
//!   "initialFee": "10",
//!   "operations": [
//!     { "op": "post_job", "caller": "alice", "payment": "10" },
//!     { "op": "set_fee", "caller": "admin", "fee": "20" },
//!     { "op": "withdraw", "caller": "admin", "amount": "5" },
//!     { "op": "set_status", "caller": "alice", "jobId": 1, "status": "filled" }
//!   ]
//! }
//! ```
//!
//! Callers are names: `admin` is the deployed administrator, `0x` addresses
//! are used as given, any other name gets a stable generated identity.

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

use jobportal_core::PrincipalId;
use jobportal_infra::{InMemoryPortal, Settings};
use jobportal_ledger::{Amount, JobId, JobStatus};

use crate::cli::RunArgs;
use crate::deploy::{self, DeploymentReport};

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Script {
    #[serde(default)]
    pub initial_fee: Option<Amount>,
    #[serde(default)]
    pub poster_may_close: Option<bool>,
    pub operations: Vec<Operation>,
}

impl Script {
    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading script {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parsing script {}", path.display()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    PostJob {
        caller: String,
        payment: Amount,
    },
    SetFee {
        caller: String,
        fee: Amount,
    },
    Withdraw {
        caller: String,
        amount: Amount,
    },
    SetStatus {
        caller: String,
        #[serde(rename = "jobId")]
        job_id: JobId,
        status: JobStatus,
    },
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Operation::PostJob { .. } => "post_job",
            Operation::SetFee { .. } => "set_fee",
            Operation::Withdraw { .. } => "withdraw",
            Operation::SetStatus { .. } => "set_status",
        }
    }

    pub fn caller(&self) -> &str {
        match self {
            Operation::PostJob { caller, .. }
            | Operation::SetFee { caller, .. }
            | Operation::Withdraw { caller, .. }
            | Operation::SetStatus { caller, .. } => caller,
        }
    }
}

/// Name → identity mapping for one run.
#[derive(Debug)]
pub struct Identities {
    administrator: PrincipalId,
    named: HashMap<String, PrincipalId>,
}

impl Identities {
    pub fn new(administrator: PrincipalId) -> Self {
        Self {
            administrator,
            named: HashMap::new(),
        }
    }

    pub fn resolve(&mut self, name: &str) -> PrincipalId {
        if name == "admin" {
            return self.administrator;
        }
        if let Ok(address) = name.parse::<PrincipalId>() {
            return address;
        }
        *self
            .named
            .entry(name.to_string())
            .or_insert_with(PrincipalId::random)
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Outcome {
    pub index: usize,
    pub op: &'static str,
    pub caller: PrincipalId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Outcome {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Apply every operation in order. Failures are recorded, not fatal.
pub fn apply(
    portal: &InMemoryPortal,
    identities: &mut Identities,
    operations: &[Operation],
) -> Vec<Outcome> {
    operations
        .iter()
        .enumerate()
        .map(|(index, operation)| {
            let caller = identities.resolve(operation.caller());
            let result = match operation {
                Operation::PostJob { payment, .. } => portal
                    .post_job(caller, *payment)
                    .map(|job_id| json!({ "jobId": job_id })),
                Operation::SetFee { fee, .. } => {
                    portal.set_fee(caller, *fee).map(|()| json!({ "fee": fee }))
                }
                Operation::Withdraw { amount, .. } => portal
                    .withdraw(caller, *amount)
                    .map(|id| json!({ "withdrawalId": id, "amount": amount })),
                Operation::SetStatus { job_id, status, .. } => portal
                    .set_job_status(caller, *job_id, *status)
                    .map(|()| json!({ "jobId": job_id, "status": status })),
            };

            match result {
                Ok(value) => Outcome {
                    index,
                    op: operation.name(),
                    caller,
                    result: Some(value),
                    error: None,
                },
                Err(err) => {
                    warn!(index, op = operation.name(), error = %err, "scripted operation failed");
                    Outcome {
                        index,
                        op: operation.name(),
                        caller,
                        result: None,
                        error: Some(err.to_string()),
                    }
                }
            }
        })
        .collect()
}

/// Entry point of `jobportal run`.
pub fn execute(settings: &Settings, args: &RunArgs, out: &mut impl Write) -> anyhow::Result<()> {
    let script = Script::from_path(&args.script)?;

    let mut deployment = deploy::deployment(settings, &args.deploy)?;
    if args.deploy.fee.is_none() {
        if let Some(fee) = script.initial_fee {
            deployment.initial_fee = fee;
        }
    }
    if let Some(poster_may_close) = script.poster_may_close {
        deployment.rules.poster_may_close = poster_may_close;
    }

    let (portal, _) = deploy::deploy(settings, deployment)?;
    let mut identities = Identities::new(deployment.administrator);

    for outcome in apply(&portal, &mut identities, &script.operations) {
        writeln!(out, "{}", serde_json::to_string(&outcome)?)?;
    }

    let stats = portal.stats().context("reading final stats")?;
    let report = DeploymentReport::new(portal.ledger_id(), deployment.administrator, stats);
    serde_json::to_writer_pretty(&mut *out, &report)?;
    writeln!(out)?;
    Ok(())
}

//! Serialized facade over one deployed ledger.
//!
//! ```text
//! caller ──► writer gate ──► resolve principal ──► authorize ──► dispatch
//!                                                                  │
//!                               (withdraw only) payout sink ◄──────┘
//!                                       │ failure
//!                                       └──► RevertWithdrawal
//! ```
//!
//! Every operation, reads included, runs while holding the gate, so callers
//! only ever observe settled state. The gate remembers which thread holds
//! it: a payout sink that calls back into a mutating operation gets
//! [`PortalError::ReentrantCall`] instead of a deadlock, while re-entrant
//! reads are served from the store as it stands.
//!
//! A withdrawal is pending between its debit and the payout outcome. The
//! outcome (`SettleWithdrawal` or `RevertWithdrawal`) is valid at any stream
//! version, so it is retried through conflicts with its own budget.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

use chrono::Utc;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use jobportal_auth::{AccessPolicy, CommandAuthorization, SingleAdministrator, authorize};
use jobportal_core::{AggregateId, AggregateRoot, PrincipalId};
use jobportal_events::{EventBus, EventEnvelope, InMemoryEventBus};
use jobportal_ledger::{
    AGGREGATE_TYPE, Amount, DeployLedger, JobFilter, JobId, JobLedger, JobRecord, JobStatus,
    LedgerCommand, LedgerError, LedgerEvent, LedgerId, LedgerStats, PostJob, RevenueSnapshot,
    RevertWithdrawal, SetFee, SetJobStatus, SettleWithdrawal, TransitionRules, Withdraw,
};

use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::event_store::{EventStore, EventStoreError, InMemoryEventStore, StoredEvent};
use crate::payout::{Payout, PayoutError, PayoutSink};
use crate::settings::LedgerSettings;

/// Conflict retries for recording a payout outcome. A debit left pending
/// with nothing paid out is worse than a slow withdrawal.
pub const OUTCOME_CONFLICT_RETRIES: u32 = 1_000;

pub type InMemoryBus = InMemoryEventBus<EventEnvelope<JsonValue>>;

/// Facade over the in-memory store and bus.
pub type InMemoryPortal = JobPortal<Arc<InMemoryEventStore>, Arc<InMemoryBus>>;

#[derive(Debug, Error)]
pub enum PortalError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Dispatch(DispatchError<LedgerError>),

    #[error("payout of {amount} for withdrawal {withdrawal_id} failed and was rolled back: {source}")]
    TransferFailed {
        withdrawal_id: Uuid,
        amount: Amount,
        #[source]
        source: PayoutError,
    },

    #[error("re-entrant mutating call rejected")]
    ReentrantCall,

    #[error("portal unavailable: {0}")]
    Unavailable(String),
}

impl PortalError {
    /// The ledger's own rejection, if that is what this is.
    pub fn ledger(&self) -> Option<&LedgerError> {
        match self {
            PortalError::Ledger(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DispatchError<LedgerError>> for PortalError {
    fn from(value: DispatchError<LedgerError>) -> Self {
        match value {
            DispatchError::Rejected(err) => PortalError::Ledger(err),
            other => PortalError::Dispatch(other),
        }
    }
}

impl From<EventStoreError> for PortalError {
    fn from(value: EventStoreError) -> Self {
        PortalError::Dispatch(DispatchError::from(value))
    }
}

/// Parameters fixed when a ledger is deployed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deployment {
    pub administrator: PrincipalId,
    pub initial_fee: Amount,
    pub rules: TransitionRules,
}

impl Deployment {
    pub fn new(administrator: PrincipalId, initial_fee: Amount) -> Self {
        Self {
            administrator,
            initial_fee,
            rules: TransitionRules::default(),
        }
    }

    pub fn from_settings(settings: &LedgerSettings, administrator: PrincipalId) -> Self {
        Self {
            administrator,
            initial_fee: settings.initial_fee,
            rules: TransitionRules {
                poster_may_close: settings.poster_may_close,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Access {
    Read,
    Write,
}

/// Holding the writer gate. Dropping it clears the recorded holder before
/// the gate itself is released.
struct GateGuard<'a> {
    holder: &'a Mutex<Option<ThreadId>>,
    gate: Option<MutexGuard<'a, ()>>,
}

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        if self.gate.is_some() {
            *self.holder.lock().unwrap_or_else(PoisonError::into_inner) = None;
        }
    }
}

/// Public operation surface of one deployed ledger.
pub struct JobPortal<S, B> {
    ledger_id: LedgerId,
    dispatcher: CommandDispatcher<S, B>,
    policy: Arc<dyn AccessPolicy>,
    payouts: Arc<dyn PayoutSink>,
    max_conflict_retries: u32,
    gate: Mutex<()>,
    holder: Mutex<Option<ThreadId>>,
}

impl<S, B> core::fmt::Debug for JobPortal<S, B> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("JobPortal")
            .field("ledger_id", &self.ledger_id)
            .field("policy", &self.policy)
            .field("max_conflict_retries", &self.max_conflict_retries)
            .finish_non_exhaustive()
    }
}

impl InMemoryPortal {
    /// Deploy a fresh ledger over a new in-memory store and bus.
    pub fn deploy_in_memory(
        payouts: Arc<dyn PayoutSink>,
        deployment: Deployment,
    ) -> Result<Self, PortalError> {
        let dispatcher = CommandDispatcher::new(
            Arc::new(InMemoryEventStore::new()),
            Arc::new(InMemoryBus::new()),
        );
        Self::deploy(dispatcher, payouts, deployment)
    }
}

impl<S, B> JobPortal<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Deploy a new ledger: zero counters, the given fee and administrator.
    pub fn deploy(
        dispatcher: CommandDispatcher<S, B>,
        payouts: Arc<dyn PayoutSink>,
        deployment: Deployment,
    ) -> Result<Self, PortalError> {
        let ledger_id = LedgerId::generate();
        let command = LedgerCommand::DeployLedger(DeployLedger {
            ledger_id,
            administrator: deployment.administrator,
            initial_fee: deployment.initial_fee,
            rules: deployment.rules,
            occurred_at: Utc::now(),
        });
        match dispatcher.dispatch(ledger_id.0, AGGREGATE_TYPE, &command, empty_ledger) {
            Ok(_) => {}
            Err(DispatchError::Publish { reason, .. }) => {
                warn!(ledger_id = %ledger_id, %reason, "deployment committed but not published");
            }
            Err(err) => return Err(err.into()),
        }

        info!(
            ledger_id = %ledger_id,
            administrator = %deployment.administrator,
            initial_fee = %deployment.initial_fee,
            poster_may_close = deployment.rules.poster_may_close,
            "ledger deployed"
        );

        let policy = Arc::new(SingleAdministrator::new(deployment.administrator));
        Ok(Self::assemble(ledger_id, dispatcher, payouts, policy))
    }

    /// Reopen a ledger that was deployed earlier into the same store.
    pub fn attach(
        dispatcher: CommandDispatcher<S, B>,
        payouts: Arc<dyn PayoutSink>,
        ledger_id: LedgerId,
    ) -> Result<Self, PortalError> {
        let ledger = dispatcher.load(ledger_id.0, empty_ledger)?;
        let administrator = ledger.administrator().ok_or(LedgerError::NotDeployed)?;

        debug!(ledger_id = %ledger_id, version = ledger.version(), "ledger attached");

        let policy = Arc::new(SingleAdministrator::new(administrator));
        Ok(Self::assemble(ledger_id, dispatcher, payouts, policy))
    }

    fn assemble(
        ledger_id: LedgerId,
        dispatcher: CommandDispatcher<S, B>,
        payouts: Arc<dyn PayoutSink>,
        policy: Arc<dyn AccessPolicy>,
    ) -> Self {
        Self {
            ledger_id,
            dispatcher,
            policy,
            payouts,
            max_conflict_retries: 3,
            gate: Mutex::new(()),
            holder: Mutex::new(None),
        }
    }

    /// Replace the access policy (e.g. with an [`jobportal_auth::AdministratorSet`]).
    pub fn with_policy(mut self, policy: Arc<dyn AccessPolicy>) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_conflict_retries(mut self, max_conflict_retries: u32) -> Self {
        self.max_conflict_retries = max_conflict_retries;
        self
    }

    pub fn ledger_id(&self) -> LedgerId {
        self.ledger_id
    }

    pub fn dispatcher(&self) -> &CommandDispatcher<S, B> {
        &self.dispatcher
    }

    /// Pay the current fee and register a job. Returns the new job id.
    pub fn post_job(&self, caller: PrincipalId, payment: Amount) -> Result<JobId, PortalError> {
        let _gate = self.enter(Access::Write)?;

        let command = LedgerCommand::PostJob(PostJob {
            ledger_id: self.ledger_id,
            caller: self.policy.resolve(caller),
            payment,
            occurred_at: Utc::now(),
        });
        let events = self.submit(&command)?;

        let posted = events
            .iter()
            .find_map(|e| match e {
                LedgerEvent::JobPosted(p) => Some(p),
                _ => None,
            })
            .ok_or_else(|| LedgerError::invariant("posting committed without a JobPosted event"))?;

        info!(
            ledger_id = %self.ledger_id,
            job_id = %posted.job_id,
            poster = %caller,
            fee_paid = %posted.fee_paid,
            "job posted"
        );
        Ok(posted.job_id)
    }

    pub fn set_fee(&self, caller: PrincipalId, new_fee: Amount) -> Result<(), PortalError> {
        let _gate = self.enter(Access::Write)?;

        let command = LedgerCommand::SetFee(SetFee {
            ledger_id: self.ledger_id,
            caller: self.policy.resolve(caller),
            new_fee,
            occurred_at: Utc::now(),
        });
        self.authorize_command(&command)?;
        self.submit(&command)?;

        info!(ledger_id = %self.ledger_id, new_fee = %new_fee, "fee changed");
        Ok(())
    }

    /// Withdraw `amount` of accumulated revenue to the caller's account.
    ///
    /// The withdrawal is committed before the payout sink is called and
    /// settled once the transfer succeeds. If the transfer fails or panics a
    /// compensating `WithdrawalReverted` is committed and
    /// [`PortalError::TransferFailed`] is returned; the stats then equal the
    /// stats before the call.
    pub fn withdraw(&self, caller: PrincipalId, amount: Amount) -> Result<Uuid, PortalError> {
        let _gate = self.enter(Access::Write)?;

        let withdrawal_id = Uuid::now_v7();
        let command = LedgerCommand::Withdraw(Withdraw {
            ledger_id: self.ledger_id,
            caller: self.policy.resolve(caller),
            withdrawal_id,
            amount,
            occurred_at: Utc::now(),
        });
        self.authorize_command(&command)?;
        self.submit(&command)?;

        let payout = Payout {
            withdrawal_id,
            recipient: caller,
            amount,
        };
        match self.transfer(&payout) {
            Ok(()) => {
                self.settle_withdrawal(withdrawal_id);
                info!(
                    ledger_id = %self.ledger_id,
                    %withdrawal_id,
                    recipient = %caller,
                    amount = %amount,
                    "funds withdrawn"
                );
                Ok(withdrawal_id)
            }
            Err(source) => {
                warn!(
                    ledger_id = %self.ledger_id,
                    %withdrawal_id,
                    error = %source,
                    "payout failed, reverting withdrawal"
                );
                self.revert_withdrawal(withdrawal_id, &source)?;
                Err(PortalError::TransferFailed {
                    withdrawal_id,
                    amount,
                    source,
                })
            }
        }
    }

    pub fn set_job_status(
        &self,
        caller: PrincipalId,
        job_id: JobId,
        status: JobStatus,
    ) -> Result<(), PortalError> {
        let _gate = self.enter(Access::Write)?;

        let command = LedgerCommand::SetJobStatus(SetJobStatus {
            ledger_id: self.ledger_id,
            caller: self.policy.resolve(caller),
            job_id,
            status,
            occurred_at: Utc::now(),
        });
        self.submit(&command)?;

        info!(ledger_id = %self.ledger_id, %job_id, %status, changed_by = %caller, "job status changed");
        Ok(())
    }

    /// `{totalJobs, totalRevenue, currentFee, contractBalance}` as of now.
    pub fn stats(&self) -> Result<LedgerStats, PortalError> {
        let stats = self.current()?.stats();
        debug!(
            ledger_id = %self.ledger_id,
            total_jobs = stats.total_jobs,
            contract_balance = %stats.contract_balance,
            "stats read"
        );
        Ok(stats)
    }

    pub fn job(&self, job_id: JobId) -> Result<JobRecord, PortalError> {
        self.current()?
            .job(job_id)
            .cloned()
            .ok_or(PortalError::Ledger(LedgerError::NotFound(job_id)))
    }

    pub fn jobs(&self, filter: &JobFilter) -> Result<Vec<JobRecord>, PortalError> {
        Ok(self.current()?.jobs(filter))
    }

    pub fn revenue(&self) -> Result<RevenueSnapshot, PortalError> {
        Ok(self.current()?.revenue())
    }

    pub fn administrator(&self) -> Result<PrincipalId, PortalError> {
        self.current()?
            .administrator()
            .ok_or(PortalError::Ledger(LedgerError::NotDeployed))
    }

    /// Committed events of this ledger, oldest first.
    pub fn history(&self) -> Result<Vec<StoredEvent>, PortalError> {
        let _gate = self.enter(Access::Read)?;
        Ok(self.dispatcher.history(self.ledger_id.0)?)
    }

    fn current(&self) -> Result<JobLedger, PortalError> {
        let _gate = self.enter(Access::Read)?;
        Ok(self.dispatcher.load(self.ledger_id.0, empty_ledger)?)
    }

    fn enter(&self, access: Access) -> Result<GateGuard<'_>, PortalError> {
        let me = thread::current().id();
        let held_here = *self.holder() == Some(me);

        if held_here {
            return match access {
                Access::Read => Ok(GateGuard {
                    holder: &self.holder,
                    gate: None,
                }),
                Access::Write => {
                    warn!(ledger_id = %self.ledger_id, "re-entrant mutating call rejected");
                    Err(PortalError::ReentrantCall)
                }
            };
        }

        // The gate guards no data, so a poisoned gate is still usable.
        let gate = self.gate.lock().unwrap_or_else(PoisonError::into_inner);
        *self.holder() = Some(me);

        Ok(GateGuard {
            holder: &self.holder,
            gate: Some(gate),
        })
    }

    fn holder(&self) -> MutexGuard<'_, Option<ThreadId>> {
        self.holder.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn authorize_command(&self, command: &LedgerCommand) -> Result<(), PortalError> {
        if let (Some(required), Some(caller)) = (command.required_permission(), command.caller()) {
            authorize(caller, &required).map_err(|_| LedgerError::Unauthorized)?;
        }
        Ok(())
    }

    fn submit(&self, command: &LedgerCommand) -> Result<Vec<LedgerEvent>, PortalError> {
        self.submit_with_budget(command, self.max_conflict_retries)
    }

    /// Dispatch, reloading and retrying on append conflicts. A conflicting
    /// attempt commits nothing, so retrying cannot double-apply. A failed
    /// publication still counts as committed.
    fn submit_with_budget(
        &self,
        command: &LedgerCommand,
        max_conflict_retries: u32,
    ) -> Result<Vec<LedgerEvent>, PortalError> {
        let mut conflicts = 0;
        loop {
            match self
                .dispatcher
                .dispatch(self.ledger_id.0, AGGREGATE_TYPE, command, empty_ledger)
            {
                Ok(committed) => return committed.into_iter().map(decode).collect(),
                Err(DispatchError::Publish { reason, committed }) => {
                    warn!(
                        ledger_id = %self.ledger_id,
                        command = command.name(),
                        %reason,
                        "command committed but not published"
                    );
                    return committed.into_iter().map(decode).collect();
                }
                Err(err) if err.is_conflict() && conflicts < max_conflict_retries => {
                    conflicts += 1;
                    warn!(
                        ledger_id = %self.ledger_id,
                        command = command.name(),
                        attempt = conflicts,
                        "append conflict, retrying"
                    );
                }
                Err(DispatchError::Rejected(err)) => {
                    debug!(ledger_id = %self.ledger_id, command = command.name(), error = %err, "command rejected");
                    return Err(PortalError::Ledger(err));
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Call the payout sink. A panicking sink counts as an unavailable one.
    fn transfer(&self, payout: &Payout) -> Result<(), PayoutError> {
        panic::catch_unwind(AssertUnwindSafe(|| self.payouts.transfer(payout))).unwrap_or_else(
            |panic| {
                Err(PayoutError::Unavailable(format!(
                    "payout sink panicked: {}",
                    panic_message(panic.as_ref())
                )))
            },
        )
    }

    /// Mark a paid-out withdrawal final. The money has left either way, so a
    /// failure here is logged rather than returned.
    fn settle_withdrawal(&self, withdrawal_id: Uuid) {
        let command = LedgerCommand::SettleWithdrawal(SettleWithdrawal {
            ledger_id: self.ledger_id,
            withdrawal_id,
            occurred_at: Utc::now(),
        });

        if let Err(err) = self.submit_with_budget(&command, OUTCOME_CONFLICT_RETRIES) {
            error!(
                ledger_id = %self.ledger_id,
                %withdrawal_id,
                error = %err,
                "failed to record withdrawal settlement"
            );
        }
    }

    fn revert_withdrawal(&self, withdrawal_id: Uuid, cause: &PayoutError) -> Result<(), PortalError> {
        let command = LedgerCommand::RevertWithdrawal(RevertWithdrawal {
            ledger_id: self.ledger_id,
            withdrawal_id,
            reason: cause.to_string(),
            occurred_at: Utc::now(),
        });

        match self.submit_with_budget(&command, OUTCOME_CONFLICT_RETRIES) {
            Ok(_) => Ok(()),
            Err(err) => {
                error!(
                    ledger_id = %self.ledger_id,
                    %withdrawal_id,
                    error = %err,
                    "failed to record withdrawal rollback"
                );
                Err(PortalError::Unavailable(format!(
                    "withdrawal {withdrawal_id} was not paid out and its rollback could not be recorded: {err}"
                )))
            }
        }
    }
}

fn empty_ledger(id: AggregateId) -> JobLedger {
    JobLedger::empty(LedgerId(id))
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

fn decode(stored: StoredEvent) -> Result<LedgerEvent, PortalError> {
    serde_json::from_value(stored.payload)
        .map_err(|e| PortalError::Dispatch(DispatchError::Deserialize(e.to_string())))
}

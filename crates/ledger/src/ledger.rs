use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use jobportal_auth::{CommandAuthorization, Permission, Principal};
use jobportal_core::{Aggregate, AggregateId, AggregateRoot, PrincipalId};
use jobportal_events::{Command, Event};

use crate::amount::Amount;
use crate::error::LedgerError;
use crate::fee::FeePolicy;
use crate::registry::{JobFilter, JobId, JobRecord, JobRegistry, JobStatus, TransitionRules};
use crate::revenue::{RevenueLedger, RevenueSnapshot};
use crate::stats::LedgerStats;

/// Aggregate type tag stored alongside every ledger event.
pub const AGGREGATE_TYPE: &str = "jobportal.ledger";

/// Ledger identifier (aggregate id). Plays the role of the contract address.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LedgerId(pub AggregateId);

impl LedgerId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }

    pub fn generate() -> Self {
        Self(AggregateId::new())
    }
}

impl core::fmt::Display for LedgerId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Aggregate root: the job-posting ledger.
///
/// Composes Fee Policy, Job Registry and Revenue Ledger behind one version
/// counter, so every command sees (and every append guards) one consistent
/// state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobLedger {
    id: LedgerId,
    version: u64,
    deployed: bool,
    administrator: Option<PrincipalId>,
    rules: TransitionRules,
    fee: FeePolicy,
    jobs: JobRegistry,
    revenue: RevenueLedger,
}

impl JobLedger {
    /// Empty aggregate for rehydration.
    pub fn empty(id: LedgerId) -> Self {
        Self {
            id,
            version: 0,
            deployed: false,
            administrator: None,
            rules: TransitionRules::default(),
            fee: FeePolicy::default(),
            jobs: JobRegistry::default(),
            revenue: RevenueLedger::default(),
        }
    }

    pub fn id_typed(&self) -> LedgerId {
        self.id
    }

    pub fn is_deployed(&self) -> bool {
        self.deployed
    }

    pub fn administrator(&self) -> Option<PrincipalId> {
        self.administrator
    }

    pub fn rules(&self) -> TransitionRules {
        self.rules
    }

    pub fn current_fee(&self) -> Amount {
        self.fee.current()
    }

    pub fn job(&self, id: JobId) -> Option<&JobRecord> {
        self.jobs.get(id)
    }

    pub fn jobs(&self, filter: &JobFilter) -> Vec<JobRecord> {
        self.jobs.list(filter)
    }

    pub fn revenue(&self) -> RevenueSnapshot {
        self.revenue.snapshot()
    }

    pub fn stats(&self) -> LedgerStats {
        LedgerStats {
            total_jobs: self.jobs.len(),
            total_revenue: self.revenue.total_revenue(),
            current_fee: self.fee.current(),
            contract_balance: self.revenue.balance(),
        }
    }
}

impl AggregateRoot for JobLedger {
    type Id = LedgerId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: DeployLedger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployLedger {
    pub ledger_id: LedgerId,
    pub administrator: PrincipalId,
    pub initial_fee: Amount,
    pub rules: TransitionRules,
    pub occurred_at: DateTime<Utc>,
}

/// Command: PostJob. `payment` is the value attached to the call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostJob {
    pub ledger_id: LedgerId,
    pub caller: Principal,
    pub payment: Amount,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SetFee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetFee {
    pub ledger_id: LedgerId,
    pub caller: Principal,
    pub new_fee: Amount,
    pub occurred_at: DateTime<Utc>,
}

/// Command: Withdraw. Funds go to the calling administrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Withdraw {
    pub ledger_id: LedgerId,
    pub caller: Principal,
    pub withdrawal_id: Uuid,
    pub amount: Amount,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RevertWithdrawal. Compensates a withdrawal whose payout failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevertWithdrawal {
    pub ledger_id: LedgerId,
    pub withdrawal_id: Uuid,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SettleWithdrawal. The payout went through; the debit is final.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettleWithdrawal {
    pub ledger_id: LedgerId,
    pub withdrawal_id: Uuid,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SetJobStatus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetJobStatus {
    pub ledger_id: LedgerId,
    pub caller: Principal,
    pub job_id: JobId,
    pub status: JobStatus,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerCommand {
    DeployLedger(DeployLedger),
    PostJob(PostJob),
    SetFee(SetFee),
    Withdraw(Withdraw),
    RevertWithdrawal(RevertWithdrawal),
    SettleWithdrawal(SettleWithdrawal),
    SetJobStatus(SetJobStatus),
}

impl LedgerCommand {
    pub fn ledger_id(&self) -> LedgerId {
        match self {
            LedgerCommand::DeployLedger(c) => c.ledger_id,
            LedgerCommand::PostJob(c) => c.ledger_id,
            LedgerCommand::SetFee(c) => c.ledger_id,
            LedgerCommand::Withdraw(c) => c.ledger_id,
            LedgerCommand::RevertWithdrawal(c) => c.ledger_id,
            LedgerCommand::SettleWithdrawal(c) => c.ledger_id,
            LedgerCommand::SetJobStatus(c) => c.ledger_id,
        }
    }

    /// The resolved caller, for commands issued on behalf of a principal.
    pub fn caller(&self) -> Option<&Principal> {
        match self {
            LedgerCommand::PostJob(c) => Some(&c.caller),
            LedgerCommand::SetFee(c) => Some(&c.caller),
            LedgerCommand::Withdraw(c) => Some(&c.caller),
            LedgerCommand::SetJobStatus(c) => Some(&c.caller),
            LedgerCommand::DeployLedger(_)
            | LedgerCommand::RevertWithdrawal(_)
            | LedgerCommand::SettleWithdrawal(_) => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            LedgerCommand::DeployLedger(_) => "deploy",
            LedgerCommand::PostJob(_) => "post_job",
            LedgerCommand::SetFee(_) => "set_fee",
            LedgerCommand::Withdraw(_) => "withdraw",
            LedgerCommand::RevertWithdrawal(_) => "revert_withdrawal",
            LedgerCommand::SettleWithdrawal(_) => "settle_withdrawal",
            LedgerCommand::SetJobStatus(_) => "set_job_status",
        }
    }
}

impl Command for LedgerCommand {
    fn target_aggregate_id(&self) -> AggregateId {
        self.ledger_id().0
    }
}

impl CommandAuthorization for LedgerCommand {
    fn required_permission(&self) -> Option<Permission> {
        match self {
            LedgerCommand::SetFee(_) => Some(Permission::SET_FEE),
            LedgerCommand::Withdraw(_) => Some(Permission::WITHDRAW),
            _ => None,
        }
    }
}

/// Event: LedgerDeployed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerDeployed {
    pub ledger_id: LedgerId,
    pub administrator: PrincipalId,
    pub initial_fee: Amount,
    pub rules: TransitionRules,
    pub occurred_at: DateTime<Utc>,
}

/// Event: JobPosted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobPosted {
    pub ledger_id: LedgerId,
    pub job_id: JobId,
    pub poster: PrincipalId,
    pub fee_paid: Amount,
    pub created_at: u64,
    pub occurred_at: DateTime<Utc>,
}

/// Event: FeeChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeChanged {
    pub ledger_id: LedgerId,
    pub previous_fee: Amount,
    pub new_fee: Amount,
    pub changed_by: PrincipalId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: FundsWithdrawn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundsWithdrawn {
    pub ledger_id: LedgerId,
    pub withdrawal_id: Uuid,
    pub amount: Amount,
    pub recipient: PrincipalId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: WithdrawalReverted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalReverted {
    pub ledger_id: LedgerId,
    pub withdrawal_id: Uuid,
    pub amount: Amount,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

/// Event: WithdrawalSettled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalSettled {
    pub ledger_id: LedgerId,
    pub withdrawal_id: Uuid,
    pub amount: Amount,
    pub occurred_at: DateTime<Utc>,
}

/// Event: JobStatusChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatusChanged {
    pub ledger_id: LedgerId,
    pub job_id: JobId,
    pub from: JobStatus,
    pub to: JobStatus,
    pub changed_by: PrincipalId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerEvent {
    LedgerDeployed(LedgerDeployed),
    JobPosted(JobPosted),
    FeeChanged(FeeChanged),
    FundsWithdrawn(FundsWithdrawn),
    WithdrawalReverted(WithdrawalReverted),
    WithdrawalSettled(WithdrawalSettled),
    JobStatusChanged(JobStatusChanged),
}

impl Event for LedgerEvent {
    fn event_type(&self) -> &'static str {
        match self {
            LedgerEvent::LedgerDeployed(_) => "jobportal.ledger.deployed",
            LedgerEvent::JobPosted(_) => "jobportal.ledger.job_posted",
            LedgerEvent::FeeChanged(_) => "jobportal.ledger.fee_changed",
            LedgerEvent::FundsWithdrawn(_) => "jobportal.ledger.funds_withdrawn",
            LedgerEvent::WithdrawalReverted(_) => "jobportal.ledger.withdrawal_reverted",
            LedgerEvent::WithdrawalSettled(_) => "jobportal.ledger.withdrawal_settled",
            LedgerEvent::JobStatusChanged(_) => "jobportal.ledger.job_status_changed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            LedgerEvent::LedgerDeployed(e) => e.occurred_at,
            LedgerEvent::JobPosted(e) => e.occurred_at,
            LedgerEvent::FeeChanged(e) => e.occurred_at,
            LedgerEvent::FundsWithdrawn(e) => e.occurred_at,
            LedgerEvent::WithdrawalReverted(e) => e.occurred_at,
            LedgerEvent::WithdrawalSettled(e) => e.occurred_at,
            LedgerEvent::JobStatusChanged(e) => e.occurred_at,
        }
    }
}

impl Aggregate for JobLedger {
    type Command = LedgerCommand;
    type Event = LedgerEvent;
    type Error = LedgerError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            LedgerEvent::LedgerDeployed(e) => {
                self.id = e.ledger_id;
                self.deployed = true;
                self.administrator = Some(e.administrator);
                self.rules = e.rules;
                self.fee = FeePolicy::new(e.initial_fee);
            }
            LedgerEvent::JobPosted(e) => {
                self.jobs.insert(JobRecord {
                    id: e.job_id,
                    poster: e.poster,
                    fee_paid: e.fee_paid,
                    created_at: e.created_at,
                    status: JobStatus::Open,
                });
                self.revenue.record_credit(e.fee_paid);
            }
            LedgerEvent::FeeChanged(e) => {
                self.fee.set(e.new_fee);
            }
            LedgerEvent::FundsWithdrawn(e) => {
                self.revenue.record_withdrawal(e.withdrawal_id, e.amount);
            }
            LedgerEvent::WithdrawalReverted(e) => {
                self.revenue.record_reversal(e.withdrawal_id);
            }
            LedgerEvent::WithdrawalSettled(e) => {
                self.revenue.record_settlement(e.withdrawal_id);
            }
            LedgerEvent::JobStatusChanged(e) => {
                self.jobs.set_status(e.job_id, e.to);
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        if let LedgerCommand::DeployLedger(cmd) = command {
            return self.handle_deploy(cmd);
        }
        if !self.deployed {
            return Err(LedgerError::NotDeployed);
        }

        match command {
            LedgerCommand::DeployLedger(_) => Err(LedgerError::AlreadyDeployed),
            LedgerCommand::PostJob(cmd) => self.handle_post(cmd),
            LedgerCommand::SetFee(cmd) => self.handle_set_fee(cmd),
            LedgerCommand::Withdraw(cmd) => self.handle_withdraw(cmd),
            LedgerCommand::RevertWithdrawal(cmd) => self.handle_revert(cmd),
            LedgerCommand::SettleWithdrawal(cmd) => self.handle_settle(cmd),
            LedgerCommand::SetJobStatus(cmd) => self.handle_set_status(cmd),
        }
    }
}

impl JobLedger {
    fn ensure_permission(caller: &Principal, required: &Permission) -> Result<(), LedgerError> {
        if caller.has(required) {
            Ok(())
        } else {
            Err(LedgerError::Unauthorized)
        }
    }

    fn handle_deploy(&self, cmd: &DeployLedger) -> Result<Vec<LedgerEvent>, LedgerError> {
        if self.deployed {
            return Err(LedgerError::AlreadyDeployed);
        }
        Ok(vec![LedgerEvent::LedgerDeployed(LedgerDeployed {
            ledger_id: cmd.ledger_id,
            administrator: cmd.administrator,
            initial_fee: cmd.initial_fee,
            rules: cmd.rules,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_post(&self, cmd: &PostJob) -> Result<Vec<LedgerEvent>, LedgerError> {
        let fee_paid = self.fee.check_payment(cmd.payment)?;
        self.revenue.check_credit(fee_paid)?;
        let job_id = self
            .jobs
            .next_id()
            .ok_or_else(|| LedgerError::invariant("job id space exhausted"))?;

        Ok(vec![LedgerEvent::JobPosted(JobPosted {
            ledger_id: self.id,
            job_id,
            poster: cmd.caller.id,
            fee_paid,
            // The posting event lands right after the current stream head.
            created_at: self.version + 1,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_set_fee(&self, cmd: &SetFee) -> Result<Vec<LedgerEvent>, LedgerError> {
        Self::ensure_permission(&cmd.caller, &Permission::SET_FEE)?;

        Ok(vec![LedgerEvent::FeeChanged(FeeChanged {
            ledger_id: self.id,
            previous_fee: self.fee.current(),
            new_fee: cmd.new_fee,
            changed_by: cmd.caller.id,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_withdraw(&self, cmd: &Withdraw) -> Result<Vec<LedgerEvent>, LedgerError> {
        Self::ensure_permission(&cmd.caller, &Permission::WITHDRAW)?;
        self.revenue.check_withdrawal(cmd.withdrawal_id, cmd.amount)?;

        Ok(vec![LedgerEvent::FundsWithdrawn(FundsWithdrawn {
            ledger_id: self.id,
            withdrawal_id: cmd.withdrawal_id,
            amount: cmd.amount,
            recipient: cmd.caller.id,
            occurred_at: cmd.occurred_at,
        })])
    }

    /// Only pending withdrawals can be reverted; settled ones are final.
    fn handle_revert(&self, cmd: &RevertWithdrawal) -> Result<Vec<LedgerEvent>, LedgerError> {
        let amount = self.pending(cmd.withdrawal_id)?;

        Ok(vec![LedgerEvent::WithdrawalReverted(WithdrawalReverted {
            ledger_id: self.id,
            withdrawal_id: cmd.withdrawal_id,
            amount,
            reason: cmd.reason.clone(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_settle(&self, cmd: &SettleWithdrawal) -> Result<Vec<LedgerEvent>, LedgerError> {
        let amount = self.pending(cmd.withdrawal_id)?;

        Ok(vec![LedgerEvent::WithdrawalSettled(WithdrawalSettled {
            ledger_id: self.id,
            withdrawal_id: cmd.withdrawal_id,
            amount,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn pending(&self, withdrawal_id: Uuid) -> Result<Amount, LedgerError> {
        self.revenue
            .pending_withdrawal(&withdrawal_id)
            .ok_or(LedgerError::UnknownWithdrawal(withdrawal_id))
    }

    fn handle_set_status(&self, cmd: &SetJobStatus) -> Result<Vec<LedgerEvent>, LedgerError> {
        let record = self.jobs.require(cmd.job_id)?;
        self.rules.check(record, &cmd.caller, cmd.status)?;

        Ok(vec![LedgerEvent::JobStatusChanged(JobStatusChanged {
            ledger_id: self.id,
            job_id: record.id,
            from: record.status,
            to: cmd.status,
            changed_by: cmd.caller.id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobportal_events::execute;
    use proptest::prelude::*;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    fn deployed(fee: u128) -> (JobLedger, Principal) {
        let ledger_id = LedgerId::generate();
        let admin_id = PrincipalId::random();
        let mut ledger = JobLedger::empty(ledger_id);
        execute(
            &mut ledger,
            &LedgerCommand::DeployLedger(DeployLedger {
                ledger_id,
                administrator: admin_id,
                initial_fee: Amount::new(fee),
                rules: TransitionRules::default(),
                occurred_at: now(),
            }),
        )
        .unwrap();
        let admin = Principal::with_permissions(admin_id, Permission::administrator());
        (ledger, admin)
    }

    fn post(ledger: &mut JobLedger, caller: &Principal, payment: u128) -> Result<JobId, LedgerError> {
        let ledger_id = ledger.id_typed();
        let events = execute(
            ledger,
            &LedgerCommand::PostJob(PostJob {
                ledger_id,
                caller: caller.clone(),
                payment: Amount::new(payment),
                occurred_at: now(),
            }),
        )?;
        match &events[0] {
            LedgerEvent::JobPosted(e) => Ok(e.job_id),
            other => panic!("unexpected event {other:?}"),
        }
    }

    fn set_fee(ledger: &mut JobLedger, caller: &Principal, fee: u128) -> Result<(), LedgerError> {
        let ledger_id = ledger.id_typed();
        execute(
            ledger,
            &LedgerCommand::SetFee(SetFee {
                ledger_id,
                caller: caller.clone(),
                new_fee: Amount::new(fee),
                occurred_at: now(),
            }),
        )
        .map(|_| ())
    }

    fn withdraw(ledger: &mut JobLedger, caller: &Principal, amount: u128) -> Result<Uuid, LedgerError> {
        let ledger_id = ledger.id_typed();
        let withdrawal_id = Uuid::now_v7();
        execute(
            ledger,
            &LedgerCommand::Withdraw(Withdraw {
                ledger_id,
                caller: caller.clone(),
                withdrawal_id,
                amount: Amount::new(amount),
                occurred_at: now(),
            }),
        )?;
        Ok(withdrawal_id)
    }

    fn set_status(
        ledger: &mut JobLedger,
        caller: &Principal,
        job_id: JobId,
        status: JobStatus,
    ) -> Result<(), LedgerError> {
        let ledger_id = ledger.id_typed();
        execute(
            ledger,
            &LedgerCommand::SetJobStatus(SetJobStatus {
                ledger_id,
                caller: caller.clone(),
                job_id,
                status,
                occurred_at: now(),
            }),
        )
        .map(|_| ())
    }

    #[test]
    fn first_posting_gets_id_one_and_is_counted() {
        let (mut ledger, _) = deployed(10);
        let poster = Principal::participant(PrincipalId::random());

        assert_eq!(post(&mut ledger, &poster, 10), Ok(JobId(1)));
        assert_eq!(
            ledger.stats(),
            LedgerStats {
                total_jobs: 1,
                total_revenue: Amount::new(10),
                current_fee: Amount::new(10),
                contract_balance: Amount::new(10),
            }
        );

        let record = ledger.job(JobId(1)).unwrap();
        assert_eq!(record.poster, poster.id);
        assert_eq!(record.status, JobStatus::Open);
        assert_eq!(record.fee_paid, Amount::new(10));
        assert_eq!(record.created_at, 2);
    }

    #[test]
    fn raised_fee_applies_to_later_postings_only() {
        let (mut ledger, admin) = deployed(10);
        let poster = Principal::participant(PrincipalId::random());
        post(&mut ledger, &poster, 10).unwrap();

        set_fee(&mut ledger, &admin, 20).unwrap();

        assert_eq!(
            post(&mut ledger, &poster, 10),
            Err(LedgerError::InsufficientPayment {
                required: Amount::new(20),
                offered: Amount::new(10),
            })
        );
        assert_eq!(post(&mut ledger, &poster, 20), Ok(JobId(2)));
        assert_eq!(ledger.job(JobId(1)).unwrap().fee_paid, Amount::new(10));
        assert_eq!(ledger.job(JobId(2)).unwrap().fee_paid, Amount::new(20));
    }

    #[test]
    fn overpayment_is_rejected_and_not_credited() {
        let (mut ledger, _) = deployed(10);
        let poster = Principal::participant(PrincipalId::random());
        let before = ledger.clone();

        assert_eq!(
            post(&mut ledger, &poster, 11),
            Err(LedgerError::OverPayment {
                required: Amount::new(10),
                offered: Amount::new(11),
            })
        );
        assert_eq!(ledger, before);
    }

    #[test]
    fn withdrawal_reduces_balance_not_revenue() {
        let (mut ledger, admin) = deployed(10);
        let poster = Principal::participant(PrincipalId::random());
        for _ in 0..3 {
            post(&mut ledger, &poster, 10).unwrap();
        }

        withdraw(&mut ledger, &admin, 15).unwrap();

        let stats = ledger.stats();
        assert_eq!(stats.contract_balance, Amount::new(15));
        assert_eq!(stats.total_revenue, Amount::new(30));
        assert_eq!(ledger.revenue().total_withdrawn, Amount::new(15));
    }

    #[test]
    fn non_administrator_cannot_touch_fee_or_funds() {
        let (mut ledger, _) = deployed(10);
        let stranger = Principal::participant(PrincipalId::random());
        post(&mut ledger, &stranger, 10).unwrap();
        let before = ledger.clone();

        assert_eq!(set_fee(&mut ledger, &stranger, 0), Err(LedgerError::Unauthorized));
        assert_eq!(withdraw(&mut ledger, &stranger, 5), Err(LedgerError::Unauthorized));
        assert_eq!(ledger, before);
    }

    #[test]
    fn overdrawing_is_rejected() {
        let (mut ledger, admin) = deployed(10);
        let poster = Principal::participant(PrincipalId::random());
        post(&mut ledger, &poster, 10).unwrap();

        assert_eq!(
            withdraw(&mut ledger, &admin, 11),
            Err(LedgerError::InsufficientBalance {
                requested: Amount::new(11),
                available: Amount::new(10),
            })
        );
    }

    #[test]
    fn reverted_withdrawal_restores_balance() {
        let (mut ledger, admin) = deployed(10);
        post(&mut ledger, &admin, 10).unwrap();
        let stats_before = ledger.stats();
        let withdrawal_id = withdraw(&mut ledger, &admin, 10).unwrap();

        let ledger_id = ledger.id_typed();
        execute(
            &mut ledger,
            &LedgerCommand::RevertWithdrawal(RevertWithdrawal {
                ledger_id,
                withdrawal_id,
                reason: "payout bounced".to_string(),
                occurred_at: now(),
            }),
        )
        .unwrap();

        assert_eq!(ledger.stats(), stats_before);
        assert_eq!(ledger.revenue().total_withdrawn, Amount::ZERO);

        let again = execute(
            &mut ledger,
            &LedgerCommand::RevertWithdrawal(RevertWithdrawal {
                ledger_id,
                withdrawal_id,
                reason: "twice".to_string(),
                occurred_at: now(),
            }),
        );
        assert_eq!(again, Err(LedgerError::UnknownWithdrawal(withdrawal_id)));
    }

    #[test]
    fn settled_withdrawal_cannot_be_reverted() {
        let (mut ledger, admin) = deployed(10);
        post(&mut ledger, &admin, 10).unwrap();
        let withdrawal_id = withdraw(&mut ledger, &admin, 10).unwrap();

        let ledger_id = ledger.id_typed();
        execute(
            &mut ledger,
            &LedgerCommand::SettleWithdrawal(SettleWithdrawal {
                ledger_id,
                withdrawal_id,
                occurred_at: now(),
            }),
        )
        .unwrap();
        let settled = ledger.clone();

        let revert = execute(
            &mut ledger,
            &LedgerCommand::RevertWithdrawal(RevertWithdrawal {
                ledger_id,
                withdrawal_id,
                reason: "late bounce".to_string(),
                occurred_at: now(),
            }),
        );
        assert_eq!(revert, Err(LedgerError::UnknownWithdrawal(withdrawal_id)));
        assert_eq!(ledger, settled);
        assert_eq!(ledger.revenue().total_withdrawn, Amount::new(10));
        assert_eq!(ledger.stats().contract_balance, Amount::ZERO);
    }

    #[test]
    fn refilling_a_filled_job_is_an_invalid_transition() {
        let (mut ledger, _) = deployed(10);
        let poster = Principal::participant(PrincipalId::random());
        let job = post(&mut ledger, &poster, 10).unwrap();

        set_status(&mut ledger, &poster, job, JobStatus::Filled).unwrap();
        assert_eq!(
            set_status(&mut ledger, &poster, job, JobStatus::Filled),
            Err(LedgerError::InvalidTransition {
                job_id: job,
                from: JobStatus::Filled,
                to: JobStatus::Filled,
            })
        );
    }

    #[test]
    fn administrator_moderates_any_job() {
        let (mut ledger, admin) = deployed(10);
        let poster = Principal::participant(PrincipalId::random());
        let job = post(&mut ledger, &poster, 10).unwrap();

        assert_eq!(
            set_status(&mut ledger, &poster, job, JobStatus::Closed),
            Err(LedgerError::Unauthorized)
        );
        set_status(&mut ledger, &admin, job, JobStatus::Closed).unwrap();
        assert_eq!(ledger.job(job).unwrap().status, JobStatus::Closed);
        assert!(ledger.jobs(&JobFilter::with_status(JobStatus::Open)).is_empty());
    }

    #[test]
    fn unknown_job_is_not_found() {
        let (mut ledger, admin) = deployed(10);
        assert_eq!(
            set_status(&mut ledger, &admin, JobId(9), JobStatus::Filled),
            Err(LedgerError::NotFound(JobId(9)))
        );
    }

    #[test]
    fn lifecycle_guards() {
        let ledger_id = LedgerId::generate();
        let mut ledger = JobLedger::empty(ledger_id);
        let anyone = Principal::participant(PrincipalId::random());

        assert_eq!(post(&mut ledger, &anyone, 0), Err(LedgerError::NotDeployed));

        let (mut ledger, _) = deployed(1);
        let redeploy = LedgerCommand::DeployLedger(DeployLedger {
            ledger_id: ledger.id_typed(),
            administrator: anyone.id,
            initial_fee: Amount::ZERO,
            rules: TransitionRules::default(),
            occurred_at: now(),
        });
        assert_eq!(execute(&mut ledger, &redeploy), Err(LedgerError::AlreadyDeployed));
    }

    #[derive(Debug, Clone)]
    enum Op {
        Post(u128),
        SetFee(u128),
        Withdraw(u128),
        Stranger(u128),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            4 => (0u128..40).prop_map(Op::Post),
            1 => (0u128..40).prop_map(Op::SetFee),
            2 => (0u128..120).prop_map(Op::Withdraw),
            1 => (0u128..40).prop_map(Op::Stranger),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: after any sequence of successful postings, the job count
        /// equals the number of calls and revenue equals the sum of fees.
        #[test]
        fn totals_match_successful_postings(fees in prop::collection::vec(0u128..1_000_000, 1..20)) {
            let (mut ledger, admin) = deployed(0);
            let poster = Principal::participant(PrincipalId::random());
            let mut expected_revenue = 0u128;

            for (i, fee) in fees.iter().enumerate() {
                set_fee(&mut ledger, &admin, *fee).unwrap();
                let id = post(&mut ledger, &poster, *fee).unwrap();
                prop_assert_eq!(id, JobId(i as u64 + 1));
                expected_revenue += fee;
            }

            let stats = ledger.stats();
            prop_assert_eq!(stats.total_jobs, fees.len() as u64);
            prop_assert_eq!(stats.total_revenue, Amount::new(expected_revenue));
        }

        /// Property: whatever mix of calls is attempted, the balance is
        /// revenue minus withdrawals and failed calls change nothing.
        #[test]
        fn balance_invariant_holds_for_any_call_sequence(ops in prop::collection::vec(op(), 1..40)) {
            let (mut ledger, admin) = deployed(10);
            let poster = Principal::participant(PrincipalId::random());

            for op in ops {
                let before = ledger.clone();
                let outcome = match op {
                    Op::Post(p) => post(&mut ledger, &poster, p).map(|_| ()),
                    Op::SetFee(f) => set_fee(&mut ledger, &admin, f),
                    Op::Withdraw(a) => withdraw(&mut ledger, &admin, a).map(|_| ()),
                    Op::Stranger(a) => withdraw(&mut ledger, &poster, a).map(|_| ()),
                };
                if outcome.is_err() {
                    prop_assert_eq!(&ledger, &before);
                }

                let revenue = ledger.revenue();
                prop_assert!(revenue.total_withdrawn <= revenue.total_revenue);
                prop_assert_eq!(
                    revenue.balance,
                    revenue.total_revenue.checked_sub(revenue.total_withdrawn).unwrap()
                );
                prop_assert_eq!(ledger.stats().contract_balance, revenue.balance);
                prop_assert!(revenue.total_revenue >= before.revenue().total_revenue);
                prop_assert!(revenue.total_withdrawn >= before.revenue().total_withdrawn);
            }
        }
    }
}

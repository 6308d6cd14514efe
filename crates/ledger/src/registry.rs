//! Job Registry: paid job records and their lifecycle.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use jobportal_auth::{Permission, Principal};
use jobportal_core::{Entity, PrincipalId};

use crate::amount::Amount;
use crate::error::LedgerError;

/// Job identifier: 1 for the first posting, +1 for each one after.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub u64);

impl JobId {
    pub const FIRST: JobId = JobId(1);

    pub fn get(self) -> u64 {
        self.0
    }
}

impl core::fmt::Display for JobId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Open,
    Filled,
    Closed,
}

impl JobStatus {
    /// `Filled` and `Closed` have no way out.
    pub fn is_terminal(self) -> bool {
        !matches!(self, JobStatus::Open)
    }

    /// Only open jobs move, and never back to `Open`.
    pub fn can_transition_to(self, to: JobStatus) -> bool {
        self == JobStatus::Open && to != JobStatus::Open
    }
}

impl core::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            JobStatus::Open => "open",
            JobStatus::Filled => "filled",
            JobStatus::Closed => "closed",
        })
    }
}

/// One paid posting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: JobId,
    pub poster: PrincipalId,
    /// Equals the fee in effect when the posting was applied.
    pub fee_paid: Amount,
    /// Stream position of the posting event (logical clock, not wall time).
    pub created_at: u64,
    pub status: JobStatus,
}

impl Entity for JobRecord {
    type Id = JobId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Who may move a job where.
///
/// Moderators (administrators) may do anything the state machine allows.
/// Posters may mark their own job filled, and close it only when
/// `poster_may_close` is set at deployment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRules {
    pub poster_may_close: bool,
}

impl TransitionRules {
    pub fn permits(&self, record: &JobRecord, caller: &Principal, to: JobStatus) -> bool {
        if caller.has(&Permission::MODERATE_JOBS) {
            return true;
        }
        let is_poster = caller.id == record.poster;
        match to {
            JobStatus::Open | JobStatus::Filled => is_poster,
            JobStatus::Closed => is_poster && self.poster_may_close,
        }
    }

    /// Authorization first, then the state machine.
    pub fn check(
        &self,
        record: &JobRecord,
        caller: &Principal,
        to: JobStatus,
    ) -> Result<(), LedgerError> {
        if !self.permits(record, caller, to) {
            return Err(LedgerError::Unauthorized);
        }
        if !record.status.can_transition_to(to) {
            return Err(LedgerError::InvalidTransition {
                job_id: record.id,
                from: record.status,
                to,
            });
        }
        Ok(())
    }
}

/// Filter for [`JobRegistry::list`]. Empty filter matches everything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub poster: Option<PrincipalId>,
}

impl JobFilter {
    pub fn with_status(status: JobStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn by_poster(poster: PrincipalId) -> Self {
        Self {
            poster: Some(poster),
            ..Self::default()
        }
    }

    pub fn matches(&self, record: &JobRecord) -> bool {
        self.status.is_none_or(|s| s == record.status)
            && self.poster.is_none_or(|p| p == record.poster)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobRegistry {
    records: BTreeMap<JobId, JobRecord>,
    last_id: u64,
}

impl JobRegistry {
    pub fn len(&self) -> u64 {
        self.records.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Id the next posting will receive, or `None` once ids are exhausted.
    pub fn next_id(&self) -> Option<JobId> {
        self.last_id.checked_add(1).map(JobId)
    }

    pub fn get(&self, id: JobId) -> Option<&JobRecord> {
        self.records.get(&id)
    }

    pub fn require(&self, id: JobId) -> Result<&JobRecord, LedgerError> {
        self.get(id).ok_or(LedgerError::NotFound(id))
    }

    /// Records matching `filter`, ordered by id.
    pub fn list(&self, filter: &JobFilter) -> Vec<JobRecord> {
        self.records
            .values()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect()
    }

    pub(crate) fn insert(&mut self, record: JobRecord) {
        self.last_id = self.last_id.max(record.id.0);
        self.records.insert(record.id, record);
    }

    pub(crate) fn set_status(&mut self, id: JobId, status: JobStatus) {
        if let Some(record) = self.records.get_mut(&id) {
            record.status = status;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(poster: PrincipalId, status: JobStatus) -> JobRecord {
        JobRecord {
            id: JobId(3),
            poster,
            fee_paid: Amount::new(10),
            created_at: 4,
            status,
        }
    }

    #[test]
    fn only_open_jobs_transition() {
        assert!(JobStatus::Open.can_transition_to(JobStatus::Filled));
        assert!(JobStatus::Open.can_transition_to(JobStatus::Closed));
        assert!(!JobStatus::Open.can_transition_to(JobStatus::Open));
        assert!(!JobStatus::Filled.can_transition_to(JobStatus::Filled));
        assert!(!JobStatus::Filled.can_transition_to(JobStatus::Closed));
        assert!(!JobStatus::Closed.can_transition_to(JobStatus::Filled));
        assert!(JobStatus::Closed.is_terminal());
    }

    #[test]
    fn poster_fills_but_cannot_close_by_default() {
        let poster = PrincipalId::random();
        let caller = Principal::participant(poster);
        let open = record(poster, JobStatus::Open);
        let rules = TransitionRules::default();

        assert_eq!(rules.check(&open, &caller, JobStatus::Filled), Ok(()));
        assert_eq!(
            rules.check(&open, &caller, JobStatus::Closed),
            Err(LedgerError::Unauthorized)
        );

        let lenient = TransitionRules {
            poster_may_close: true,
        };
        assert_eq!(lenient.check(&open, &caller, JobStatus::Closed), Ok(()));
    }

    #[test]
    fn strangers_are_unauthorized_before_state_is_considered() {
        let open = record(PrincipalId::random(), JobStatus::Filled);
        let stranger = Principal::participant(PrincipalId::random());

        assert_eq!(
            TransitionRules::default().check(&open, &stranger, JobStatus::Filled),
            Err(LedgerError::Unauthorized)
        );
    }

    #[test]
    fn moderator_hits_the_state_machine() {
        let filled = record(PrincipalId::random(), JobStatus::Filled);
        let moderator =
            Principal::with_permissions(PrincipalId::random(), vec![Permission::MODERATE_JOBS]);

        assert_eq!(
            TransitionRules::default().check(&filled, &moderator, JobStatus::Closed),
            Err(LedgerError::InvalidTransition {
                job_id: JobId(3),
                from: JobStatus::Filled,
                to: JobStatus::Closed,
            })
        );
    }

    #[test]
    fn filter_matches_status_and_poster() {
        let poster = PrincipalId::random();
        let r = record(poster, JobStatus::Open);

        assert!(JobFilter::default().matches(&r));
        assert!(JobFilter::with_status(JobStatus::Open).matches(&r));
        assert!(!JobFilter::with_status(JobStatus::Closed).matches(&r));
        assert!(JobFilter::by_poster(poster).matches(&r));
        assert!(!JobFilter::by_poster(PrincipalId::random()).matches(&r));
    }
}

//! Applies a [`RingAssignment`] to the remote fleet and verifies each member
//! converged.
//!
//! Every member is handled independently: mutate, then read back and compare.
//! A failure on one member never stops the others; the caller gets one
//! [`ApplyOutcome`] per attempted member and decides what to do about the
//! failures (this module never retries).

use std::sync::Arc;

use futures_util::future::join_all;
use serde::Serialize;
use tokio::sync::Semaphore;
use tracing::{Instrument as _, debug, info, warn};

use crate::{
    cancel::Cancellation,
    domain::{FailoverState, MemberId},
    fleet::{FleetApi, MutateRequest, RemoteError},
    ring::{Assignment, FailoverAction, RingAssignment},
};

pub const DEFAULT_CONCURRENCY: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApplyOptions {
    /// Maximum number of members with a mutate/fetch round trip in flight.
    pub concurrency: usize,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ApplyFailure {
    /// The mutate call itself failed.
    Mutation { error: RemoteError },
    /// The mutation went through but the read-back failed.
    Fetch { error: RemoteError },
    /// The read-back disagrees with what was requested.
    Mismatch { fields: Vec<&'static str> },
    Cancelled,
    TaskFailed { message: String },
}

impl std::fmt::Display for ApplyFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mutation { error } => write!(f, "mutation failed: {error}"),
            Self::Fetch { error } => write!(f, "verification fetch failed: {error}"),
            Self::Mismatch { fields } => {
                write!(f, "verification mismatch on {}", fields.join(", "))
            }
            Self::Cancelled => write!(f, "cancelled"),
            Self::TaskFailed { message } => write!(f, "task failed: {message}"),
        }
    }
}

impl std::error::Error for ApplyFailure {}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ApplyOutcome {
    pub member_id: MemberId,
    pub requested: FailoverState,
    /// State read back after the mutation, when the read succeeded.
    pub observed: Option<FailoverState>,
    pub success: bool,
    pub failure: Option<ApplyFailure>,
}

impl ApplyOutcome {
    fn converged(assignment: &Assignment, observed: FailoverState) -> Self {
        Self {
            member_id: assignment.member_id,
            requested: assignment.requested_state(),
            observed: Some(observed),
            success: true,
            failure: None,
        }
    }

    fn failed(
        assignment: &Assignment,
        observed: Option<FailoverState>,
        failure: ApplyFailure,
    ) -> Self {
        Self {
            member_id: assignment.member_id,
            requested: assignment.requested_state(),
            observed,
            success: false,
            failure: Some(failure),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every planned member was attempted.
    Completed,
    /// Cancellation stopped the run before every member finished.
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AggregateResult {
    pub action: FailoverAction,
    pub planned: usize,
    /// Number of members that were attempted (length of `outcomes`).
    pub total: usize,
    pub outcomes: Vec<ApplyOutcome>,
    /// Planned members that were never attempted because of cancellation.
    pub not_attempted: Vec<MemberId>,
    pub status: RunStatus,
    pub all_success: bool,
}

impl AggregateResult {
    pub fn converged(&self) -> usize {
        self.outcomes.iter().filter(|o| o.success).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &ApplyOutcome> {
        self.outcomes.iter().filter(|o| !o.success)
    }

    pub fn outcome(&self, member_id: MemberId) -> Option<&ApplyOutcome> {
        self.outcomes.iter().find(|o| o.member_id == member_id)
    }
}

pub async fn apply(
    api: Arc<dyn FleetApi>,
    plan: &RingAssignment,
    options: ApplyOptions,
    cancel: Cancellation,
) -> AggregateResult {
    let sem = Arc::new(Semaphore::new(options.concurrency.max(1)));
    let mut tasks = Vec::new();
    let mut not_attempted = Vec::new();

    let mut entries = plan.iter();
    while let Some(assignment) = entries.next() {
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            permit = sem.clone().acquire_owned() => permit.ok(),
        };
        let Some(permit) = permit else {
            not_attempted.push(assignment.member_id);
            not_attempted.extend(entries.by_ref().map(|a| a.member_id));
            break;
        };

        let assignment = *assignment;
        let api = Arc::clone(&api);
        let cancel = cancel.clone();
        let handle = tokio::spawn(
            async move {
                let _permit = permit;
                apply_one(api.as_ref(), &assignment, &cancel).await
            }
            .instrument(tracing::Span::current()),
        );
        tasks.push((assignment, handle));
    }

    let (assignments, handles): (Vec<_>, Vec<_>) = tasks.into_iter().unzip();
    let results = join_all(handles).await;

    let mut outcomes = Vec::with_capacity(results.len());
    for (assignment, res) in assignments.iter().zip(results) {
        match res {
            Ok(outcome) => outcomes.push(outcome),
            Err(join_err) => {
                warn!(member_id = %assignment.member_id, %join_err, "apply task join error");
                outcomes.push(ApplyOutcome::failed(
                    assignment,
                    None,
                    ApplyFailure::TaskFailed {
                        message: join_err.to_string(),
                    },
                ));
            }
        }
    }

    let interrupted = !not_attempted.is_empty()
        || outcomes
            .iter()
            .any(|o| matches!(o.failure, Some(ApplyFailure::Cancelled)));
    let status = if interrupted {
        RunStatus::Cancelled
    } else {
        RunStatus::Completed
    };
    let all_success = status == RunStatus::Completed && outcomes.iter().all(|o| o.success);

    debug!(
        planned = plan.len(),
        attempted = outcomes.len(),
        ?status,
        all_success,
        "apply finished"
    );

    AggregateResult {
        action: plan.action(),
        planned: plan.len(),
        total: outcomes.len(),
        outcomes,
        not_attempted,
        status,
        all_success,
    }
}

async fn apply_one(
    api: &dyn FleetApi,
    assignment: &Assignment,
    cancel: &Cancellation,
) -> ApplyOutcome {
    let requested = assignment.requested_state();
    let req = MutateRequest {
        member_id: assignment.member_id,
        backup_id: assignment.backup_id,
        fail_back: assignment.fail_back,
        local_failover: assignment.local_failover,
    };

    let mutated = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            return ApplyOutcome::failed(assignment, None, ApplyFailure::Cancelled);
        }
        res = api.mutate(req) => res,
    };
    if let Err(error) = mutated {
        warn!(member_id = %assignment.member_id, %error, "mutate failed");
        return ApplyOutcome::failed(assignment, None, ApplyFailure::Mutation { error });
    }

    let fetched = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            return ApplyOutcome::failed(assignment, None, ApplyFailure::Cancelled);
        }
        res = api.fetch(assignment.member_id) => res,
    };
    let member = match fetched {
        Ok(member) => member,
        Err(error) => {
            warn!(member_id = %assignment.member_id, %error, "verification fetch failed");
            return ApplyOutcome::failed(assignment, None, ApplyFailure::Fetch { error });
        }
    };

    let observed = member.failover_state();
    let mut fields = Vec::new();
    if member.id != assignment.member_id {
        fields.push("member_id");
    }
    fields.extend(requested.mismatched_fields(&observed));

    if fields.is_empty() {
        info!(member_id = %assignment.member_id, %requested, "member converged");
        ApplyOutcome::converged(assignment, observed)
    } else {
        warn!(
            member_id = %assignment.member_id,
            %requested,
            %observed,
            fields = ?fields,
            "verification mismatch"
        );
        ApplyOutcome::failed(assignment, Some(observed), ApplyFailure::Mismatch { fields })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cancel::cancellation,
        domain::Member,
        fleet::BoxFuture,
        ring::{FailoverAction, plan},
    };
    use pretty_assertions::assert_eq;
    use std::{
        collections::{BTreeMap, BTreeSet},
        sync::{
            Mutex,
            atomic::{AtomicUsize, Ordering},
        },
        time::Duration,
    };

    #[derive(Default)]
    struct FakeFleet {
        members: Mutex<BTreeMap<MemberId, Member>>,
        order: Vec<MemberId>,
        mutate_calls: Mutex<Vec<MemberId>>,
        fetch_calls: Mutex<Vec<MemberId>>,
        fail_mutate: BTreeSet<MemberId>,
        fail_fetch: BTreeSet<MemberId>,
        /// Remote silently stores this backup instead of the requested one.
        coerce_backup: BTreeMap<MemberId, Option<MemberId>>,
        hang_mutate: BTreeSet<MemberId>,
        delay: Duration,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl FakeFleet {
        fn with_members(ids: &[u64]) -> Self {
            let members = ids
                .iter()
                .map(|id| (MemberId(*id), Member::new(*id)))
                .collect();
            Self {
                members: Mutex::new(members),
                order: ids.iter().map(|id| MemberId(*id)).collect(),
                ..Default::default()
            }
        }

        fn snapshot(&self) -> Vec<Member> {
            let members = self.members.lock().unwrap();
            self.order.iter().map(|id| members[id].clone()).collect()
        }

        fn state_of(&self, id: u64) -> FailoverState {
            self.members.lock().unwrap()[&MemberId(id)].failover_state()
        }

        fn mutate_calls(&self) -> Vec<MemberId> {
            let mut calls = self.mutate_calls.lock().unwrap().clone();
            calls.sort();
            calls
        }

        fn fetch_calls(&self) -> Vec<MemberId> {
            let mut calls = self.fetch_calls.lock().unwrap().clone();
            calls.sort();
            calls
        }

        async fn do_mutate(&self, req: MutateRequest) -> Result<(), RemoteError> {
            self.mutate_calls.lock().unwrap().push(req.member_id);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            if self.hang_mutate.contains(&req.member_id) {
                std::future::pending::<()>().await;
            }
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }

            let res = if self.fail_mutate.contains(&req.member_id) {
                Err(RemoteError::Http {
                    status: 500,
                    message: "internal error".to_string(),
                })
            } else {
                let mut members = self.members.lock().unwrap();
                match members.get_mut(&req.member_id) {
                    Some(member) => {
                        member.backup_id = self
                            .coerce_backup
                            .get(&req.member_id)
                            .copied()
                            .unwrap_or(req.backup_id);
                        member.fail_back_enabled = req.fail_back;
                        member.fail_over_local_enabled = req.local_failover;
                        Ok(())
                    }
                    None => Err(RemoteError::NotFound {
                        resource: format!("member {}", req.member_id),
                    }),
                }
            };
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            res
        }
    }

    impl FleetApi for FakeFleet {
        fn list_members(&self, _group_id: u64) -> BoxFuture<'_, Result<Vec<Member>, RemoteError>> {
            Box::pin(async move { Ok(self.snapshot()) })
        }

        fn mutate(&self, req: MutateRequest) -> BoxFuture<'_, Result<(), RemoteError>> {
            Box::pin(self.do_mutate(req))
        }

        fn fetch(&self, member_id: MemberId) -> BoxFuture<'_, Result<Member, RemoteError>> {
            Box::pin(async move {
                self.fetch_calls.lock().unwrap().push(member_id);
                if self.fail_fetch.contains(&member_id) {
                    return Err(RemoteError::Timeout);
                }
                self.members
                    .lock()
                    .unwrap()
                    .get(&member_id)
                    .cloned()
                    .ok_or(RemoteError::NotFound {
                        resource: format!("member {member_id}"),
                    })
            })
        }
    }

    async fn run(
        fleet: Arc<FakeFleet>,
        action: FailoverAction,
        options: ApplyOptions,
        cancel: Cancellation,
    ) -> AggregateResult {
        let members = fleet.list_members(1).await.unwrap();
        let plan = plan(&members, action).unwrap();
        apply(fleet, &plan, options, cancel).await
    }

    fn ids(raw: &[u64]) -> Vec<MemberId> {
        raw.iter().map(|id| MemberId(*id)).collect()
    }

    #[tokio::test]
    async fn enable_three_members_converges() {
        let fleet = Arc::new(FakeFleet::with_members(&[1, 2, 3]));
        let result = run(
            fleet.clone(),
            FailoverAction::Enable,
            ApplyOptions::default(),
            Cancellation::never(),
        )
        .await;

        assert_eq!(result.total, 3);
        assert_eq!(result.planned, 3);
        assert!(result.all_success);
        assert_eq!(result.status, RunStatus::Completed);
        assert_eq!(result.converged(), 3);
        assert!(result.not_attempted.is_empty());

        for (member, backup) in [(1, 2), (2, 3), (3, 1)] {
            assert_eq!(
                fleet.state_of(member),
                FailoverState {
                    backup_id: Some(MemberId(backup)),
                    fail_back: true,
                    local_failover: false,
                }
            );
        }
    }

    #[tokio::test]
    async fn disable_clears_every_member() {
        let fleet = FakeFleet::with_members(&[1, 2, 3]);
        for (id, backup) in [(1, 2), (2, 3), (3, 1)] {
            let mut members = fleet.members.lock().unwrap();
            let m = members.get_mut(&MemberId(id)).unwrap();
            m.backup_id = Some(MemberId(backup));
            m.fail_back_enabled = true;
            m.fail_over_local_enabled = true;
        }
        let fleet = Arc::new(fleet);

        let result = run(
            fleet.clone(),
            FailoverAction::Disable,
            ApplyOptions::default(),
            Cancellation::never(),
        )
        .await;

        assert!(result.all_success);
        assert_eq!(result.action, FailoverAction::Disable);
        for id in [1, 2, 3] {
            assert_eq!(
                fleet.state_of(id),
                FailoverState {
                    backup_id: None,
                    fail_back: false,
                    local_failover: false,
                }
            );
        }
    }

    #[tokio::test]
    async fn failed_mutation_does_not_stop_other_members() {
        let mut fleet = FakeFleet::with_members(&[1, 2, 3, 4, 5]);
        fleet.fail_mutate.insert(MemberId(3));
        let fleet = Arc::new(fleet);

        let result = run(
            fleet.clone(),
            FailoverAction::Enable,
            ApplyOptions::default(),
            Cancellation::never(),
        )
        .await;

        assert_eq!(result.total, 5);
        assert_eq!(result.status, RunStatus::Completed);
        assert!(!result.all_success);
        assert_eq!(fleet.mutate_calls(), ids(&[1, 2, 3, 4, 5]));
        assert_eq!(fleet.fetch_calls(), ids(&[1, 2, 4, 5]));

        let failed: Vec<MemberId> = result.failures().map(|o| o.member_id).collect();
        assert_eq!(failed, ids(&[3]));
        let outcome = result.outcome(MemberId(3)).unwrap();
        assert!(matches!(
            outcome.failure,
            Some(ApplyFailure::Mutation {
                error: RemoteError::Http { status: 500, .. }
            })
        ));
        assert_eq!(outcome.observed, None);
        assert_eq!(outcome.requested.backup_id, Some(MemberId(4)));
    }

    #[tokio::test]
    async fn coerced_backup_is_reported_as_mismatch() {
        let mut fleet = FakeFleet::with_members(&[1, 2, 3]);
        fleet.coerce_backup.insert(MemberId(2), None);
        let fleet = Arc::new(fleet);

        let result = run(
            fleet,
            FailoverAction::Enable,
            ApplyOptions::default(),
            Cancellation::never(),
        )
        .await;

        assert!(!result.all_success);
        assert_eq!(result.converged(), 2);
        let outcome = result.outcome(MemberId(2)).unwrap();
        assert!(!outcome.success);
        assert_eq!(
            outcome.failure,
            Some(ApplyFailure::Mismatch {
                fields: vec!["backup_id"]
            })
        );
        assert_eq!(outcome.requested.backup_id, Some(MemberId(3)));
        assert_eq!(outcome.observed.unwrap().backup_id, None);
    }

    #[tokio::test]
    async fn fetch_failure_is_recorded_per_member() {
        let mut fleet = FakeFleet::with_members(&[1, 2, 3]);
        fleet.fail_fetch.insert(MemberId(1));
        let fleet = Arc::new(fleet);

        let result = run(
            fleet.clone(),
            FailoverAction::Enable,
            ApplyOptions::default(),
            Cancellation::never(),
        )
        .await;

        assert_eq!(result.total, 3);
        assert_eq!(
            result.outcome(MemberId(1)).unwrap().failure,
            Some(ApplyFailure::Fetch {
                error: RemoteError::Timeout
            })
        );
        // The mutation itself still landed.
        assert_eq!(fleet.state_of(1).backup_id, Some(MemberId(2)));
    }

    #[tokio::test]
    async fn concurrency_limit_is_respected() {
        for limit in [1, 3] {
            let mut fleet = FakeFleet::with_members(&[1, 2, 3, 4, 5, 6, 7, 8, 9, 10]);
            fleet.delay = Duration::from_millis(20);
            let fleet = Arc::new(fleet);

            let result = run(
                fleet.clone(),
                FailoverAction::Enable,
                ApplyOptions { concurrency: limit },
                Cancellation::never(),
            )
            .await;

            assert!(result.all_success);
            let max = fleet.max_in_flight.load(Ordering::SeqCst);
            assert!(max >= 1 && max <= limit, "limit={limit} max={max}");
        }
    }

    #[tokio::test]
    async fn zero_concurrency_still_makes_progress() {
        let fleet = Arc::new(FakeFleet::with_members(&[1, 2]));
        let result = run(
            fleet,
            FailoverAction::Enable,
            ApplyOptions { concurrency: 0 },
            Cancellation::never(),
        )
        .await;
        assert!(result.all_success);
    }

    #[tokio::test]
    async fn cancelled_before_start_attempts_nothing() {
        let fleet = Arc::new(FakeFleet::with_members(&[1, 2, 3]));
        let (handle, cancel) = cancellation();
        handle.cancel();

        let result = run(
            fleet.clone(),
            FailoverAction::Enable,
            ApplyOptions::default(),
            cancel,
        )
        .await;

        assert_eq!(result.status, RunStatus::Cancelled);
        assert!(!result.all_success);
        assert_eq!(result.total, 0);
        assert_eq!(result.not_attempted, ids(&[1, 2, 3]));
        assert!(fleet.mutate_calls().is_empty());
    }

    #[tokio::test]
    async fn cancel_mid_run_keeps_collected_outcomes() {
        let mut fleet = FakeFleet::with_members(&[1, 2, 3, 4]);
        fleet.hang_mutate.insert(MemberId(2));
        let fleet = Arc::new(fleet);

        let (handle, cancel) = cancellation();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            handle.cancel();
        });

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            run(
                fleet.clone(),
                FailoverAction::Enable,
                ApplyOptions { concurrency: 1 },
                cancel,
            ),
        )
        .await
        .expect("apply should stop after cancellation");

        assert_eq!(result.status, RunStatus::Cancelled);
        assert!(!result.all_success);
        assert_eq!(result.planned, 4);
        assert_eq!(result.total, 2);
        assert!(result.outcome(MemberId(1)).unwrap().success);
        assert_eq!(
            result.outcome(MemberId(2)).unwrap().failure,
            Some(ApplyFailure::Cancelled)
        );
        assert_eq!(result.not_attempted, ids(&[3, 4]));
        assert_eq!(fleet.mutate_calls(), ids(&[1, 2]));
    }

    #[tokio::test]
    async fn empty_disable_plan_is_trivially_complete() {
        let fleet = Arc::new(FakeFleet::with_members(&[]));
        let result = run(
            fleet,
            FailoverAction::Disable,
            ApplyOptions::default(),
            Cancellation::never(),
        )
        .await;
        assert_eq!(result.total, 0);
        assert_eq!(result.status, RunStatus::Completed);
        assert!(result.all_success);
    }

    #[test]
    fn failure_display_names_mismatched_fields() {
        let failure = ApplyFailure::Mismatch {
            fields: vec!["backup_id", "fail_back"],
        };
        assert_eq!(
            failure.to_string(),
            "verification mismatch on backup_id, fail_back"
        );
    }
}

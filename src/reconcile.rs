//! Membership Reconciler
//!
//! Applies one user's batch of segment additions and removals against the
//! entity store, appending a history entry for every change that commits.
//!
//! Error policy:
//! - Unknown user: a single `UserNotFound` outcome, nothing else is touched.
//! - Domain conditions (missing segment, duplicate add, missing member):
//!   recorded as an outcome, processing continues with the next name.
//! - Storage faults: a trailing `Failure` outcome and the batch stops.
//!   Items already committed stay committed.
//! - History write faults: logged and counted, the committed change is
//!   still reported as a success.

use std::ops::ControlFlow;
use std::sync::Arc;

use crate::metrics;
use crate::store::{
    EntityStore, HistoryAction, HistoryEntry, HistoryLog, Segment, StoreError, StoreResult,
    UserId,
};

/// Per-item result of a reconciliation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Added { user_id: UserId, segment: String },
    Removed { user_id: UserId, segment: String },
    AlreadyMember { user_id: UserId, segment: String },
    NotAMember { user_id: UserId, segment: String },
    SegmentNotFound { segment: String },
    UserNotFound { user_id: UserId },
    /// Storage fault; processing stopped at this item.
    Failure { user_id: UserId, segment: String },
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Added { .. } | Self::Removed { .. })
    }

    /// Stable label used for metrics and logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Added { .. } => "added",
            Self::Removed { .. } => "removed",
            Self::AlreadyMember { .. } => "already_member",
            Self::NotAMember { .. } => "not_a_member",
            Self::SegmentNotFound { .. } => "segment_not_found",
            Self::UserNotFound { .. } => "user_not_found",
            Self::Failure { .. } => "failure",
        }
    }

    pub fn segment(&self) -> Option<&str> {
        match self {
            Self::Added { segment, .. }
            | Self::Removed { segment, .. }
            | Self::AlreadyMember { segment, .. }
            | Self::NotAMember { segment, .. }
            | Self::SegmentNotFound { segment }
            | Self::Failure { segment, .. } => Some(segment),
            Self::UserNotFound { .. } => None,
        }
    }
}

/// Batch add/remove engine for one user's segment memberships
pub struct Reconciler {
    store: Arc<dyn EntityStore>,
    history: Arc<dyn HistoryLog>,
}

impl Reconciler {
    pub fn new(store: Arc<dyn EntityStore>, history: Arc<dyn HistoryLog>) -> Self {
        Self { store, history }
    }

    /// Apply `to_add` then `to_remove` for `user_id`, in the order given.
    ///
    /// Only a storage fault while resolving the user itself is returned as
    /// `Err`; every other condition is reported through the outcome list.
    pub fn reconcile(
        &self,
        user_id: UserId,
        to_add: &[String],
        to_remove: &[String],
    ) -> StoreResult<Vec<Outcome>> {
        let _timer = metrics::Timer::new(metrics::RECONCILE_DURATION.clone());

        if self.store.find_user(user_id)?.is_none() {
            tracing::debug!(%user_id, "Reconcile requested for unknown user");
            let outcome = Outcome::UserNotFound { user_id };
            count_outcome(BATCH_LABEL, &outcome);
            return Ok(vec![outcome]);
        }

        let mut outcomes = Vec::with_capacity(to_add.len() + to_remove.len());

        let plan = to_add
            .iter()
            .map(|name| (HistoryAction::Add, name))
            .chain(to_remove.iter().map(|name| (HistoryAction::Remove, name)));

        for (action, name) in plan {
            let step = self.apply(user_id, name, action);
            count_outcome(action.as_str(), &step.outcome);
            tracing::debug!(
                %user_id,
                %action,
                segment = step.outcome.segment().unwrap_or(name.as_str()),
                outcome = step.outcome.kind(),
                "Processed membership item"
            );
            outcomes.push(step.outcome);
            if step.flow.is_break() {
                break;
            }
        }

        let succeeded = outcomes.iter().filter(|o| o.is_success()).count();
        tracing::info!(
            %user_id,
            requested_add = to_add.len(),
            requested_remove = to_remove.len(),
            succeeded,
            rejected = outcomes.len() - succeeded,
            "Reconciled segment memberships"
        );

        Ok(outcomes)
    }

    fn apply(&self, user_id: UserId, name: &str, action: HistoryAction) -> Step {
        let segment = match self.store.find_segment(name) {
            Ok(Some(segment)) => segment,
            Ok(None) => {
                return Step::next(Outcome::SegmentNotFound {
                    segment: name.to_string(),
                })
            }
            Err(e) => return Step::abort(user_id, name, action, e),
        };

        let is_member = match self.store.is_member(user_id, segment.id) {
            Ok(is_member) => is_member,
            Err(e) => return Step::abort(user_id, &segment.name, action, e),
        };

        match (action, is_member) {
            (HistoryAction::Add, true) => {
                return Step::next(Outcome::AlreadyMember {
                    user_id,
                    segment: segment.name,
                })
            }
            (HistoryAction::Remove, false) => {
                return Step::next(Outcome::NotAMember {
                    user_id,
                    segment: segment.name,
                })
            }
            _ => {}
        }

        let mutation = match action {
            HistoryAction::Add => self.store.add_membership(user_id, segment.id),
            HistoryAction::Remove => self.store.remove_membership(user_id, segment.id),
        };

        match mutation {
            Ok(()) => {
                self.record_history(user_id, &segment, action);
                let outcome = match action {
                    HistoryAction::Add => Outcome::Added {
                        user_id,
                        segment: segment.name,
                    },
                    HistoryAction::Remove => Outcome::Removed {
                        user_id,
                        segment: segment.name,
                    },
                };
                Step::next(outcome)
            }
            // Lost a race with a concurrent request for the same pair.
            Err(StoreError::AlreadyMember { .. }) => Step::next(Outcome::AlreadyMember {
                user_id,
                segment: segment.name,
            }),
            Err(StoreError::NotMember { .. }) => Step::next(Outcome::NotAMember {
                user_id,
                segment: segment.name,
            }),
            // Segment deleted between lookup and insert.
            Err(StoreError::SegmentNotFound(_)) => Step::next(Outcome::SegmentNotFound {
                segment: name.to_string(),
            }),
            // User deleted mid-batch: nothing further can succeed.
            Err(StoreError::UserNotFound(_)) => Step {
                outcome: Outcome::UserNotFound { user_id },
                flow: ControlFlow::Break(()),
            },
            Err(e) => Step::abort(user_id, &segment.name, action, e),
        }
    }

    fn record_history(&self, user_id: UserId, segment: &Segment, action: HistoryAction) {
        let entry = HistoryEntry::new(user_id, segment, action);
        if let Err(e) = self.history.record(&entry) {
            metrics::HISTORY_WRITE_FAILURES_TOTAL.inc();
            tracing::warn!(
                %user_id,
                segment = %segment.name,
                %action,
                error = %e,
                "Membership change committed but history write failed"
            );
        }
    }
}

struct Step {
    outcome: Outcome,
    flow: ControlFlow<()>,
}

impl Step {
    fn next(outcome: Outcome) -> Self {
        Self {
            outcome,
            flow: ControlFlow::Continue(()),
        }
    }

    fn abort(user_id: UserId, segment: &str, action: HistoryAction, err: StoreError) -> Self {
        tracing::error!(
            %user_id,
            segment,
            %action,
            error = %err,
            "Storage failure, aborting reconciliation"
        );
        Self {
            outcome: Outcome::Failure {
                user_id,
                segment: segment.to_string(),
            },
            flow: ControlFlow::Break(()),
        }
    }
}

/// Action label for outcomes that belong to the whole request
const BATCH_LABEL: &str = "batch";

fn count_outcome(action: &str, outcome: &Outcome) {
    metrics::MEMBERSHIP_OPS_TOTAL
        .with_label_values(&[action, outcome.kind()])
        .inc();
}

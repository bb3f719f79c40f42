//! Ordering and freshness checks for timestamped events.
//!
//! Both checks are soft signals: they return `false` and leave the policy to
//! the caller. Every violation is audit-logged at HIGH severity either way.

use chrono::{DateTime, Duration, Utc};
use scrapline_types::{
    AuditAction, AuditRecord, AuditSeverity, OperationalLevel, RequestContext, TransactionId,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::audit;
use crate::config::ChronologyConfig;
use crate::error::KernelResult;
use crate::ports::Ports;

/// One entry of a storage-ordered event sequence.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChronologyEvent {
    pub captured_at: DateTime<Utc>,
    pub operational_level: OperationalLevel,
}

/// First ordering problem found in a sequence.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OrderingViolation {
    /// `captured_at` went backwards between `index - 1` and `index`.
    TimestampRegression {
        index: usize,
        previous: DateTime<Utc>,
        current: DateTime<Utc>,
    },
    /// The operational level went backwards between `index - 1` and `index`.
    LevelRegression {
        index: usize,
        previous: OperationalLevel,
        current: OperationalLevel,
    },
}

impl OrderingViolation {
    pub fn index(&self) -> usize {
        match self {
            Self::TimestampRegression { index, .. } | Self::LevelRegression { index, .. } => *index,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Self::TimestampRegression {
                index,
                previous,
                current,
            } => format!(
                "event {index} captured at {} precedes event {} captured at {}",
                current.to_rfc3339(),
                index - 1,
                previous.to_rfc3339()
            ),
            Self::LevelRegression {
                index,
                previous,
                current,
            } => format!(
                "event {index} at {current} follows event {} at {previous}",
                index - 1
            ),
        }
    }
}

/// Scan `events` in the order given.
///
/// Timestamps are checked across the whole sequence first, then levels, so a
/// timestamp regression is reported even when a level regression comes
/// earlier.
pub fn first_violation(events: &[ChronologyEvent]) -> Option<OrderingViolation> {
    let timestamps = events.windows(2).enumerate().find_map(|(i, pair)| {
        (pair[1].captured_at < pair[0].captured_at).then(|| {
            OrderingViolation::TimestampRegression {
                index: i + 1,
                previous: pair[0].captured_at,
                current: pair[1].captured_at,
            }
        })
    });

    timestamps.or_else(|| {
        events.windows(2).enumerate().find_map(|(i, pair)| {
            (pair[1].operational_level < pair[0].operational_level).then(|| {
                OrderingViolation::LevelRegression {
                    index: i + 1,
                    previous: pair[0].operational_level,
                    current: pair[1].operational_level,
                }
            })
        })
    })
}

/// Reason a proposed timestamp was refused.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Freshness {
    Fresh,
    TooOld,
    FutureDated,
}

/// Classify `proposed` against `now` with the given tolerance.
pub fn freshness(proposed: DateTime<Utc>, now: DateTime<Utc>, tolerance: Duration) -> Freshness {
    if proposed > now {
        Freshness::FutureDated
    } else if now - proposed > tolerance {
        Freshness::TooOld
    } else {
        Freshness::Fresh
    }
}

/// Stateless apart from its ports; audit entries are the only side effect.
#[derive(Clone)]
pub struct ChronologyGuard {
    ports: Ports,
    tolerance: Duration,
}

impl ChronologyGuard {
    pub fn new(ports: Ports, config: &ChronologyConfig) -> Self {
        Self {
            ports,
            tolerance: Duration::seconds(config.backdating_tolerance_secs),
        }
    }

    pub fn tolerance(&self) -> Duration {
        self.tolerance
    }

    /// Check a storage-ordered sequence for regressions.
    pub async fn validate_ordering(
        &self,
        ctx: &RequestContext,
        transaction_id: TransactionId,
        events: &[ChronologyEvent],
    ) -> KernelResult<bool> {
        let Some(violation) = first_violation(events) else {
            debug!(%transaction_id, events = events.len(), "Chronology intact");
            return Ok(true);
        };

        let description = violation.describe();
        warn!(%transaction_id, index = violation.index(), %description, "Chronology violation");

        let mut builder = AuditRecord::builder(ctx.tenant_id.clone(), AuditAction::ChronologyViolation)
            .transaction(transaction_id)
            .actor(ctx.user_id.clone())
            .severity(AuditSeverity::High)
            .description(description)
            .detail("index", violation.index());
        builder = match violation {
            OrderingViolation::TimestampRegression {
                previous, current, ..
            } => builder
                .detail("previousTimestamp", previous)
                .detail("currentTimestamp", current),
            OrderingViolation::LevelRegression {
                previous, current, ..
            } => builder
                .detail("previousLevel", previous)
                .detail("currentLevel", current),
        };
        audit::record(self.ports.audit.as_ref(), builder.build(self.ports.clock.now())).await?;

        Ok(false)
    }

    /// Refuse timestamps older than the tolerance or later than now.
    pub async fn prevent_backdating(
        &self,
        ctx: &RequestContext,
        proposed: DateTime<Utc>,
        transaction_id: TransactionId,
        level: OperationalLevel,
    ) -> KernelResult<bool> {
        let now = self.ports.clock.now();
        let reason = match freshness(proposed, now, self.tolerance) {
            Freshness::Fresh => return Ok(true),
            Freshness::TooOld => "timestamp is older than the allowed window",
            Freshness::FutureDated => "timestamp is in the future",
        };

        warn!(
            %transaction_id,
            %level,
            proposed = %proposed.to_rfc3339(),
            now = %now.to_rfc3339(),
            reason,
            "Backdating blocked"
        );

        let record = AuditRecord::builder(ctx.tenant_id.clone(), AuditAction::BackdatingBlocked)
            .transaction(transaction_id)
            .actor(ctx.user_id.clone())
            .severity(AuditSeverity::High)
            .description(reason)
            .detail("level", level)
            .detail("proposedTimestamp", proposed)
            .detail("serverTimestamp", now)
            .build(now);
        audit::record(self.ports.audit.as_ref(), record).await?;

        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryPorts;
    use crate::ports::{Clock, ManualClock};
    use proptest::prelude::*;
    use std::sync::Arc;

    fn event(secs: i64, level: OperationalLevel) -> ChronologyEvent {
        ChronologyEvent {
            captured_at: DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap(),
            operational_level: level,
        }
    }

    fn guard() -> (ChronologyGuard, InMemoryPorts, ManualClock) {
        let mem = InMemoryPorts::new();
        let clock = ManualClock::new(Utc::now());
        let ports = mem.ports_with_clock(Arc::new(clock.clone()));
        (
            ChronologyGuard::new(ports, &ChronologyConfig::default()),
            mem,
            clock,
        )
    }

    #[test]
    fn increasing_sequence_has_no_violation() {
        let events = [
            event(0, OperationalLevel::VendorDispatch),
            event(10, OperationalLevel::GateEntry),
            event(20, OperationalLevel::WeighbridgeGross),
        ];
        assert_eq!(first_violation(&events), None);
        assert_eq!(first_violation(&[]), None);
    }

    #[test]
    fn equal_timestamps_are_allowed() {
        let events = [
            event(5, OperationalLevel::GateEntry),
            event(5, OperationalLevel::GateEntry),
        ];
        assert_eq!(first_violation(&events), None);
    }

    #[test]
    fn storage_order_is_not_resorted() {
        let events = [
            event(0, OperationalLevel::VendorDispatch),
            event(30, OperationalLevel::GateEntry),
            event(20, OperationalLevel::WeighbridgeGross),
        ];
        match first_violation(&events) {
            Some(OrderingViolation::TimestampRegression { index, .. }) => assert_eq!(index, 2),
            other => panic!("expected timestamp regression, got {other:?}"),
        }
    }

    #[test]
    fn level_regression_detected() {
        let events = [
            event(0, OperationalLevel::MaterialInspection),
            event(10, OperationalLevel::GateEntry),
        ];
        assert!(matches!(
            first_violation(&events),
            Some(OrderingViolation::LevelRegression { index: 1, .. })
        ));
    }

    #[tokio::test]
    async fn violation_is_audited_with_both_timestamps() {
        let (guard, mem, _clock) = guard();
        let ctx = RequestContext::operator("acme", "op");
        let tx = TransactionId::new();
        let events = [
            event(10, OperationalLevel::GateEntry),
            event(0, OperationalLevel::GateEntry),
        ];

        assert!(!guard.validate_ordering(&ctx, tx, &events).await.unwrap());

        let entries = mem.audit.entries();
        assert_eq!(entries.len(), 1);
        let record = &entries[0].record;
        assert_eq!(record.action, AuditAction::ChronologyViolation);
        assert_eq!(record.severity, AuditSeverity::High);
        assert_eq!(record.details["index"], serde_json::json!(1));
        assert!(record.details.contains_key("previousTimestamp"));
        assert!(record.details.contains_key("currentTimestamp"));
    }

    #[tokio::test]
    async fn backdating_window() {
        let (guard, mem, clock) = guard();
        let ctx = RequestContext::operator("acme", "op");
        let tx = TransactionId::new();
        let now = clock.now();
        let level = OperationalLevel::WeighbridgeGross;

        assert!(guard.prevent_backdating(&ctx, now, tx, level).await.unwrap());
        assert!(guard
            .prevent_backdating(&ctx, now - Duration::minutes(5), tx, level)
            .await
            .unwrap());
        assert!(!guard
            .prevent_backdating(&ctx, now - Duration::minutes(10), tx, level)
            .await
            .unwrap());
        assert!(!guard
            .prevent_backdating(&ctx, now + Duration::minutes(1), tx, level)
            .await
            .unwrap());

        let blocked: Vec<_> = mem
            .audit
            .entries()
            .into_iter()
            .filter(|e| e.record.action == AuditAction::BackdatingBlocked)
            .collect();
        assert_eq!(blocked.len(), 2);
        assert!(blocked.iter().all(|e| e.record.severity == AuditSeverity::High));
    }

    proptest! {
        #[test]
        fn sorted_timestamps_never_violate(mut offsets in proptest::collection::vec(0i64..100_000, 0..20)) {
            offsets.sort();
            let events: Vec<_> = offsets
                .iter()
                .map(|s| event(*s, OperationalLevel::VendorDispatch))
                .collect();
            prop_assert_eq!(first_violation(&events), None);
        }

        #[test]
        fn any_regression_is_found(
            prefix in proptest::collection::vec(0i64..1_000, 1..10),
            drop in 1i64..1_000,
        ) {
            let mut offsets = prefix;
            offsets.sort();
            let last = *offsets.last().unwrap();
            offsets.push(last - drop);
            let events: Vec<_> = offsets
                .iter()
                .map(|s| event(*s, OperationalLevel::VendorDispatch))
                .collect();
            let is_timestamp_regression = matches!(
                first_violation(&events),
                Some(OrderingViolation::TimestampRegression { .. })
            );
            prop_assert!(is_timestamp_regression);
        }
    }
}

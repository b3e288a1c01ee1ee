//! Scheduler data model (spec §4.7): recurrence descriptors, the
//! schedule record itself, and its append-only firing history.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::id::{ExecutionId, ScheduleId, WorkflowId};
use crate::{CoreError, Result};

/// How a [`Schedule`] recurs (spec §4.7).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Recurrence {
    /// Fires exactly once at `at`. If `at` is already past at schedule
    /// time, the schedule's first `next_run` is `now` — it fires
    /// immediately.
    Once { at: DateTime<Utc> },
    /// Fires every `period` measured from the previous firing.
    Interval {
        #[serde(with = "crate::utils::serde_duration")]
        period: StdDuration,
    },
    /// Fires on cron occurrences, interpreted in `timezone` (an IANA
    /// name; only `"UTC"` is evaluated as its true zone today — see
    /// the design ledger for why).
    Cron { expression: String, timezone: String },
}

impl Recurrence {
    /// Validates eagerly so `Scheduler::schedule` can fail synchronously
    /// on a bad cron expression rather than only at first fire.
    pub fn validate(&self) -> Result<()> {
        if let Recurrence::Cron { expression, .. } = self {
            parse_cron(expression)?;
        }
        Ok(())
    }
}

/// The `cron` crate requires a leading seconds field; accept the more
/// common 5-field "minute hour day month weekday" form too by assuming
/// `:00` seconds.
fn normalize_cron(expression: &str) -> String {
    if expression.split_whitespace().count() == 5 {
        format!("0 {expression}")
    } else {
        expression.to_string()
    }
}

pub(super) fn parse_cron(expression: &str) -> Result<cron::Schedule> {
    let normalized = normalize_cron(expression);
    cron::Schedule::from_str(&normalized).map_err(|e| CoreError::InvalidCron {
        expression: expression.to_string(),
        cause: e.to_string(),
    })
}

/// Pure per-variant next-occurrence function, independently testable
/// without timers. `None` means the recurrence has no further
/// occurrence after `after` (a spent `Once`).
pub fn next_fire_after(recurrence: &Recurrence, after: DateTime<Utc>) -> Result<Option<DateTime<Utc>>> {
    match recurrence {
        Recurrence::Once { at } => Ok(if *at > after { Some(*at) } else { None }),
        Recurrence::Interval { period } => {
            let delta = chrono::Duration::from_std(*period)
                .map_err(|e| CoreError::configuration_error("interval", e.to_string()))?;
            Ok(Some(after + delta))
        }
        Recurrence::Cron { expression, .. } => {
            let schedule = parse_cron(expression)?;
            Ok(schedule.after(&after).next())
        }
    }
}

/// Lifecycle status of a schedule (spec §3 Schedule entity).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScheduleStatus {
    /// Idle, waiting for `next_run`.
    Scheduled,
    /// A firing is currently in flight.
    Running,
    Paused,
    /// A single-shot schedule that has fired successfully.
    Completed,
    /// A single-shot schedule whose only firing failed.
    Failed,
    Cancelled,
}

/// A scheduled workflow trigger (spec §3, §4.7). Invariant: exactly one
/// timer/cron task is active per `Scheduled` status — enforced by the
/// [`super::Scheduler`] driving loop, not representable in this struct
/// alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    pub id: ScheduleId,
    pub workflow: WorkflowId,
    pub recurrence: Recurrence,
    pub status: ScheduleStatus,
    /// Variables passed to the workflow on every firing.
    pub context: HashMap<String, Value>,
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: Option<DateTime<Utc>>,
}

impl Schedule {
    pub fn new(
        id: ScheduleId,
        workflow: WorkflowId,
        recurrence: Recurrence,
        context: HashMap<String, Value>,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        recurrence.validate()?;
        let next_run = next_fire_after_inclusive(&recurrence, now)?;
        Ok(Self {
            id,
            workflow,
            recurrence,
            status: ScheduleStatus::Scheduled,
            context,
            last_run: None,
            next_run,
        })
    }
}

/// Like [`next_fire_after`], but a `Once` whose timestamp is already in
/// the past fires immediately rather than never (spec: "if timestamp is
/// past, fires immediately").
pub(super) fn next_fire_after_inclusive(
    recurrence: &Recurrence,
    now: DateTime<Utc>,
) -> Result<Option<DateTime<Utc>>> {
    if let Recurrence::Once { at } = recurrence {
        if *at <= now {
            return Ok(Some(now));
        }
    }
    next_fire_after(recurrence, now)
}

/// Outcome of one firing (spec §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FiringStatus {
    Success,
    Failed,
    Cancelled,
}

/// An append-only execution history record produced by each firing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FiringRecord {
    pub schedule: ScheduleId,
    pub workflow: WorkflowId,
    pub execution: Option<ExecutionId>,
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
    pub status: FiringStatus,
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn once_in_the_future_fires_at_its_timestamp() {
        let now = Utc::now();
        let at = now + chrono::Duration::minutes(5);
        let next = next_fire_after(&Recurrence::Once { at }, now).unwrap();
        assert_eq!(next, Some(at));
    }

    #[test]
    fn once_already_past_has_no_further_occurrence_but_fires_inclusive() {
        let now = Utc::now();
        let at = now - chrono::Duration::minutes(5);
        assert_eq!(next_fire_after(&Recurrence::Once { at }, now).unwrap(), None);
        assert_eq!(
            next_fire_after_inclusive(&Recurrence::Once { at }, now).unwrap(),
            Some(now)
        );
    }

    #[test]
    fn interval_advances_by_exactly_the_period() {
        let now = Utc::now();
        let recurrence = Recurrence::Interval { period: StdDuration::from_secs(60) };
        let next = next_fire_after(&recurrence, now).unwrap().unwrap();
        assert_eq!(next, now + chrono::Duration::seconds(60));
    }

    #[test]
    fn hourly_cron_from_ten_am_fires_at_eleven() {
        let start = DateTime::parse_from_rfc3339("2026-07-28T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let recurrence = Recurrence::Cron {
            expression: "0 * * * *".to_string(),
            timezone: "UTC".to_string(),
        };
        let first = next_fire_after(&recurrence, start).unwrap().unwrap();
        assert_eq!(first, DateTime::parse_from_rfc3339("2026-07-28T11:00:00Z").unwrap());

        let second = next_fire_after(&recurrence, first).unwrap().unwrap();
        assert_eq!(second, DateTime::parse_from_rfc3339("2026-07-28T12:00:00Z").unwrap());
    }

    #[test]
    fn invalid_cron_expression_fails_synchronously() {
        let recurrence = Recurrence::Cron {
            expression: "not a cron".to_string(),
            timezone: "UTC".to_string(),
        };
        assert!(recurrence.validate().is_err());
    }
}

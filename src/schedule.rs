//! Cron-like schedules with no-catch-up ("SKIP", not "CATCH_UP") semantics
//! (§4.4, §9). Not grounded on the teacher, which has no scheduler; brought
//! in from the pack's own use of the `cron` crate
//! (`other_examples/manifests/caxtonacollins-Stellar-K8s`).

use chrono::{DateTime, Local};
use cron::Schedule;
use derive_more::{Display, Error, From};
use std::str::FromStr;

#[derive(Debug, Display, Error, From)]
#[display(fmt = "invalid cron expression {:?}: {}", expr, source)]
pub struct ScheduleParseError {
    expr: String,
    #[error(source)]
    source: cron::error::Error,
}

/// One of the synchronizer's two schedules (`synchronizeSchedule` or
/// `testSchedule`, §4.4). Wraps a standard 6-field `cron` expression
/// (`sec min hour dom month dow`, with an optional trailing year field),
/// matched against "now" rather than used to compute a next-fire time —
/// that's what makes missed ticks simply drop instead of catch up (§9).
#[derive(Clone)]
pub struct CronSchedule {
    expr: String,
    schedule: Schedule,
}

impl CronSchedule {
    pub fn parse(expr: &str) -> Result<CronSchedule, ScheduleParseError> {
        let schedule = Schedule::from_str(expr).map_err(|source| ScheduleParseError {
            expr: expr.to_string(),
            source,
        })?;
        Ok(CronSchedule {
            expr: expr.to_string(),
            schedule,
        })
    }

    /// Truncate `now` to whole seconds (cron fields are not sub-second) and
    /// check whether the schedule includes that instant. This is a direct
    /// membership test, not "what's the next fire time" — no catch-up is
    /// possible because a tick that wakes late simply finds `now` doesn't
    /// match the minute it was supposed to fire in anymore.
    pub fn matches_now(&self, now: DateTime<Local>) -> bool {
        let truncated = now - chrono::Duration::nanoseconds(now.timestamp_subsec_nanos() as i64);
        self.schedule.includes(truncated)
    }

    pub fn expression(&self) -> &str {
        &self.expr
    }
}

impl std::fmt::Debug for CronSchedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CronSchedule").field("expr", &self.expr).finish()
    }
}

/// The union of `synchronizeSchedule` and `testSchedule` (§4.4 "combinedSchedule").
pub struct CombinedSchedule {
    pub synchronize: CronSchedule,
    pub test: CronSchedule,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn matches_the_exact_minute_only() {
        // fires at 00:00:00 every day
        let sched = CronSchedule::parse("0 0 0 * * *").unwrap();
        let midnight = Local.with_ymd_and_hms(2026, 7, 27, 0, 0, 0).unwrap();
        let one_past = Local.with_ymd_and_hms(2026, 7, 27, 0, 1, 0).unwrap();

        assert!(sched.matches_now(midnight));
        assert!(!sched.matches_now(one_past));
    }

    #[test]
    fn no_catch_up_after_oversleeping() {
        let sched = CronSchedule::parse("0 0 0 * * *").unwrap();
        let midnight = Local.with_ymd_and_hms(2026, 7, 27, 0, 0, 0).unwrap();
        // Simulate the worker waking up an hour late: it no longer matches.
        let woke_late = midnight + chrono::Duration::hours(1);
        assert!(!sched.matches_now(woke_late));
    }
}

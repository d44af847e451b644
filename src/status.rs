//! The monotone status lattice (§3 "Status hierarchy", §4.7, §8 invariant 4).
//!
//! Mirrors the teacher's small closed health enums (`dns/health.rs::HealthState`,
//! `dns/intelligent_failover.rs::HealthStatus`) rolled up by precedence, but
//! encodes the full nine-value order the spec requires and derives `max` as
//! arithmetic `max` over the discriminant, per the §9 design note.

use serde::{Deserialize, Serialize};

/// Healthiest to worst. `#[repr]` order is the lattice order; `max` is
/// simply `std::cmp::max` over the derived `Ord`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Status {
    Unknown,
    Disabled,
    Stopped,
    Healthy,
    Starting,
    Warning,
    Error,
    Inconsistent,
}

impl Status {
    /// HEALTHY is the identity element: `max(HEALTHY, x) == x` whenever `x >= HEALTHY`,
    /// and `max(HEALTHY, x) == HEALTHY` only when `x < HEALTHY` (DISABLED/STOPPED/UNKNOWN).
    pub const IDENTITY: Status = Status::Healthy;

    pub fn max(self, other: Status) -> Status {
        std::cmp::max(self, other)
    }

    pub fn rollup<I: IntoIterator<Item = Status>>(statuses: I) -> Status {
        statuses
            .into_iter()
            .fold(Status::IDENTITY, Status::max)
    }
}

impl Default for Status {
    fn default() -> Self {
        Status::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn any_status() -> impl Strategy<Value = Status> {
        prop_oneof![
            Just(Status::Unknown),
            Just(Status::Disabled),
            Just(Status::Stopped),
            Just(Status::Healthy),
            Just(Status::Starting),
            Just(Status::Warning),
            Just(Status::Error),
            Just(Status::Inconsistent),
        ]
    }

    #[test]
    fn inconsistent_is_worst() {
        for s in [
            Status::Unknown,
            Status::Disabled,
            Status::Stopped,
            Status::Healthy,
            Status::Starting,
            Status::Warning,
            Status::Error,
        ] {
            assert_eq!(Status::Inconsistent.max(s), Status::Inconsistent);
        }
    }

    proptest! {
        #[test]
        fn max_is_commutative(a in any_status(), b in any_status()) {
            prop_assert_eq!(a.max(b), b.max(a));
        }

        #[test]
        fn max_is_associative(a in any_status(), b in any_status(), c in any_status()) {
            prop_assert_eq!(a.max(b).max(c), a.max(b.max(c)));
        }

        #[test]
        fn healthy_is_identity_above_itself(a in any_status()) {
            if a >= Status::Healthy {
                prop_assert_eq!(Status::Healthy.max(a), a);
            }
        }

        #[test]
        fn inconsistent_absorbs(a in any_status()) {
            prop_assert_eq!(Status::Inconsistent.max(a), Status::Inconsistent);
        }

        #[test]
        fn rollup_matches_fold(statuses in prop::collection::vec(any_status(), 0..10)) {
            let expected = statuses.iter().copied().fold(Status::Healthy, Status::max);
            prop_assert_eq!(Status::rollup(statuses), expected);
        }
    }
}

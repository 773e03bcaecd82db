use chrono::{DateTime, TimeDelta, Utc};

use crate::duration::GrantDuration;

/// Result of comparing request age with its resolved duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryVerdict {
    /// Age exceeds the resolved duration.
    Expired {
        /// Request age, whole seconds.
        age: GrantDuration,
    },
    /// Age is within the resolved duration.
    Valid {
        /// Time left, whole seconds.
        remaining: GrantDuration,
    },
}

/// Compares request age with the resolved duration.
///
/// A request is expired only when its age is strictly greater than the
/// duration. Creation times in the future count as age zero.
#[must_use]
pub fn evaluate_expiry(
    created_at: DateTime<Utc>,
    resolved: GrantDuration,
    now: DateTime<Utc>,
) -> ExpiryVerdict {
    let age = (now - created_at).max(TimeDelta::zero());
    let limit = resolved.to_time_delta();

    if age > limit {
        ExpiryVerdict::Expired {
            age: whole_seconds(age),
        }
    } else {
        ExpiryVerdict::Valid {
            remaining: whole_seconds(limit - age),
        }
    }
}

fn whole_seconds(value: TimeDelta) -> GrantDuration {
    GrantDuration::from_secs(u64::try_from(value.num_seconds()).unwrap_or(0))
}

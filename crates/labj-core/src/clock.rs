//! Clock abstraction.
//!
//! Every timestamp in the system originates from a [`Clock`] owned by the
//! engine instance. Production code uses [`SystemClock`]; tests substitute a
//! fixed clock so entry ids and filenames are deterministic.

use chrono::{DateTime, NaiveDate, Utc};

/// Source of UTC instants.
///
/// Wall-clock time is acceptable: ordering within a daily file follows append
/// order, not timestamps, so monotonicity is not required.
pub trait Clock: Send + Sync {
    /// Current UTC instant with microsecond resolution.
    fn now(&self) -> DateTime<Utc>;

    /// UTC calendar date of `now()`.
    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

/// Production clock backed by the system wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock pinned to a fixed instant, for deterministic tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

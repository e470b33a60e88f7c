//! # Libris Testing
//!
//! Testing utilities for reducers and anything that reads the clock.
//!
//! This crate provides:
//! - [`FixedClock`]: a clock pinned to one instant, movable between steps
//! - [`ReducerTest`]: Given-When-Then harness for reducers
//! - [`assertions`]: helpers for checking returned effects
//!
//! ## Example
//!
//! ```ignore
//! use libris_testing::{ReducerTest, clock_on};
//!
//! ReducerTest::new(CirculationReducer)
//!     .with_env(env_with(clock_on(2024, 1, 10)))
//!     .given_state(state)
//!     .when_action(action)
//!     .then_state(|s| assert!(s.last_outcome.is_some()))
//!     .run();
//! ```

use chrono::{DateTime, NaiveDate, Utc};
use libris_core::environment::Clock;

pub mod reducer_test;

/// Mock implementations of Environment traits
pub mod mocks {
    use super::{Clock, DateTime, NaiveDate, Utc};
    use std::sync::Arc;
    use std::sync::RwLock;

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time until moved with [`FixedClock::set`] or
    /// [`FixedClock::advance_days`]. Clones share the same instant, so a test
    /// can keep one copy and hand another to the environment under test.
    ///
    /// # Example
    ///
    /// ```
    /// use libris_testing::mocks::FixedClock;
    /// use libris_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2);
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: Arc<RwLock<DateTime<Utc>>>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Arc::new(RwLock::new(time)),
            }
        }

        /// Create a clock at midnight UTC of `date`.
        #[must_use]
        pub fn on(date: NaiveDate) -> Self {
            Self::new(date.and_time(chrono::NaiveTime::MIN).and_utc())
        }

        /// Move the clock to `time`.
        pub fn set(&self, time: DateTime<Utc>) {
            if let Ok(mut guard) = self.time.write() {
                *guard = time;
            }
        }

        /// Move the clock to midnight UTC of `date`.
        pub fn set_date(&self, date: NaiveDate) {
            self.set(date.and_time(chrono::NaiveTime::MIN).and_utc());
        }

        /// Move the clock forward by whole days.
        pub fn advance_days(&self, days: i64) {
            if let Ok(mut guard) = self.time.write() {
                *guard += chrono::Duration::days(days);
            }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
                .read()
                .map_or_else(|poisoned| *poisoned.into_inner(), |guard| *guard)
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(DateTime::<Utc>::from_timestamp(1_735_689_600, 0).unwrap_or_default())
    }

    /// Create a fixed clock at midnight UTC of the given calendar date.
    ///
    /// # Panics
    ///
    /// Panics if the date is not a valid calendar date.
    #[must_use]
    pub fn clock_on(year: i32, month: u32, day: u32) -> FixedClock {
        FixedClock::on(date(year, month, day))
    }

    /// Shorthand for a calendar date in test fixtures.
    ///
    /// # Panics
    ///
    /// Panics if the date is not a valid calendar date.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).expect("test fixture date should be valid")
    }
}

// Re-export commonly used items
pub use mocks::{FixedClock, clock_on, date, test_clock};
pub use reducer_test::{ReducerTest, assertions};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock() {
        let clock = test_clock();
        let time1 = clock.now();
        let time2 = clock.now();
        assert_eq!(time1, time2);
        assert_eq!(clock.today(), date(2025, 1, 1));
    }

    #[test]
    fn clones_share_the_instant() {
        let clock = clock_on(2024, 1, 10);
        let view = clock.clone();

        clock.advance_days(5);

        assert_eq!(view.today(), date(2024, 1, 15));
    }
}

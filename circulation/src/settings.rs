//! Library policy stored in the settings table.
//!
//! Settings are stored as raw key/value strings. [`LibrarySettings`] is the
//! typed view the ledger reads; unparseable stored values fall back to the
//! defaults with a warning so a bad row never blocks circulation.

use crate::types::Money;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Longest loan period an issue may request or the settings may configure.
pub const MAX_BORROWING_PERIOD_DAYS: u32 = 90;

/// Highest daily fine rate the settings accept (1000.00).
///
/// Keeps every accrued fine well inside the store's signed 64-bit cents column.
pub const MAX_FINE_PER_DAY: Money = Money::from_cents(100_000);

/// Known setting keys.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SettingKey {
    /// Default loan period in days
    BorrowingPeriodDays,
    /// Maximum open loans per member
    MaxBooksPerUser,
    /// Fine per overdue day
    FinePerDay,
    /// Days a pending reservation is held
    ReservationExpiryDays,
}

impl SettingKey {
    /// Every key, in display order.
    pub const ALL: [Self; 4] = [
        Self::BorrowingPeriodDays,
        Self::MaxBooksPerUser,
        Self::FinePerDay,
        Self::ReservationExpiryDays,
    ];

    /// Storage key.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BorrowingPeriodDays => "borrowing_period_days",
            Self::MaxBooksPerUser => "max_books_per_user",
            Self::FinePerDay => "fine_per_day",
            Self::ReservationExpiryDays => "reservation_expiry_days",
        }
    }

    /// Human readable description stored alongside the value.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::BorrowingPeriodDays => "Default borrowing period in days",
            Self::MaxBooksPerUser => "Maximum books a user can borrow",
            Self::FinePerDay => "Fine amount per day for overdue books",
            Self::ReservationExpiryDays => "Days before reservation expires",
        }
    }
}

impl FromStr for SettingKey {
    type Err = SettingsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| SettingsError::UnknownKey(s.to_string()))
    }
}

impl fmt::Display for SettingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised when reading or writing settings.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SettingsError {
    /// Key is not one of [`SettingKey::ALL`]
    #[error("unknown setting {0:?}")]
    UnknownKey(String),

    /// Value does not satisfy the key's rules
    #[error("invalid value {value:?} for {key}: {reason}")]
    InvalidValue {
        /// Setting being written
        key: SettingKey,
        /// Submitted value
        value: String,
        /// What is wrong with it
        reason: &'static str,
    },
}

/// A validated setting value, ready to be stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SettingValue {
    /// Positive day count or limit
    Count(u32),
    /// Monetary amount
    Amount(Money),
}

impl fmt::Display for SettingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Count(n) => write!(f, "{n}"),
            Self::Amount(m) => write!(f, "{m}"),
        }
    }
}

/// Validate a raw value for `key`.
///
/// # Errors
///
/// Returns [`SettingsError::InvalidValue`] when the value is not a positive
/// integer (counts) or a non-negative amount with at most two fraction
/// digits no greater than [`MAX_FINE_PER_DAY`] (`fine_per_day`).
pub fn validate(key: SettingKey, raw: &str) -> Result<SettingValue, SettingsError> {
    let invalid = |reason| SettingsError::InvalidValue {
        key,
        value: raw.to_string(),
        reason,
    };

    match key {
        SettingKey::FinePerDay => {
            let rate = raw
                .parse::<Money>()
                .map_err(|_| invalid("expected a non-negative amount with at most two decimals"))?;
            if rate > MAX_FINE_PER_DAY {
                return Err(invalid("fine per day cannot exceed 1000.00"));
            }
            Ok(SettingValue::Amount(rate))
        },
        SettingKey::BorrowingPeriodDays => {
            let days = parse_positive(raw).ok_or_else(|| invalid("expected a positive integer"))?;
            if days > MAX_BORROWING_PERIOD_DAYS {
                return Err(invalid("borrowing period cannot exceed 90 days"));
            }
            Ok(SettingValue::Count(days))
        },
        SettingKey::MaxBooksPerUser | SettingKey::ReservationExpiryDays => parse_positive(raw)
            .map(SettingValue::Count)
            .ok_or_else(|| invalid("expected a positive integer")),
    }
}

fn parse_positive(raw: &str) -> Option<u32> {
    raw.trim().parse::<u32>().ok().filter(|n| *n > 0)
}

/// Typed view of the settings the ledger depends on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibrarySettings {
    /// Default loan period in days
    pub borrowing_period_days: u32,
    /// Maximum open loans per member
    pub max_books_per_user: u32,
    /// Fine per overdue day
    pub fine_per_day: Money,
    /// Days a pending reservation is held
    pub reservation_expiry_days: u32,
}

impl Default for LibrarySettings {
    fn default() -> Self {
        Self {
            borrowing_period_days: 14,
            max_books_per_user: 5,
            fine_per_day: Money::from_cents(500),
            reservation_expiry_days: 3,
        }
    }
}

impl LibrarySettings {
    /// Build settings from stored key/value pairs.
    ///
    /// Missing keys keep their defaults; unknown keys and invalid values are
    /// skipped with a warning.
    #[must_use]
    pub fn from_pairs<'a, I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut settings = Self::default();
        for (key, value) in pairs {
            let Ok(key) = key.parse::<SettingKey>() else {
                tracing::debug!(key, "Ignoring unknown setting");
                continue;
            };
            match validate(key, value) {
                Ok(parsed) => settings.apply(key, parsed),
                Err(error) => {
                    tracing::warn!(%key, value, %error, "Invalid stored setting, using default");
                },
            }
        }
        settings
    }

    /// Overwrite one field with an already validated value.
    pub fn apply(&mut self, key: SettingKey, value: SettingValue) {
        match (key, value) {
            (SettingKey::BorrowingPeriodDays, SettingValue::Count(n)) => {
                self.borrowing_period_days = n;
            },
            (SettingKey::MaxBooksPerUser, SettingValue::Count(n)) => self.max_books_per_user = n,
            (SettingKey::ReservationExpiryDays, SettingValue::Count(n)) => {
                self.reservation_expiry_days = n;
            },
            (SettingKey::FinePerDay, SettingValue::Amount(m)) => self.fine_per_day = m,
            (key, value) => {
                tracing::warn!(%key, %value, "Setting value has the wrong shape, ignored");
            },
        }
    }

    /// Current value of `key` in storage form.
    #[must_use]
    pub fn get(&self, key: SettingKey) -> String {
        match key {
            SettingKey::BorrowingPeriodDays => self.borrowing_period_days.to_string(),
            SettingKey::MaxBooksPerUser => self.max_books_per_user.to_string(),
            SettingKey::FinePerDay => self.fine_per_day.to_string(),
            SettingKey::ReservationExpiryDays => self.reservation_expiry_days.to_string(),
        }
    }

    /// All settings as `(key, value)` pairs.
    #[must_use]
    pub fn to_pairs(&self) -> Vec<(SettingKey, String)> {
        SettingKey::ALL.into_iter().map(|key| (key, self.get(key))).collect()
    }
}

//! Domain types for the circulation service.
//!
//! Identifiers, money, roles and the catalog/user/ledger entities. Entities
//! here are plain data; the rules that change them live in
//! [`ledger`](crate::ledger) and [`services`](crate::services).

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            #[doc = concat!("Creates a new random `", stringify!($name), "`")]
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            #[doc = concat!("Creates a `", stringify!($name), "` from a UUID")]
            #[must_use]
            pub const fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            /// Returns the inner UUID
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

entity_id!(
    /// Unique identifier for a book title (all copies share one id)
    BookId
);
entity_id!(
    /// Unique identifier for an author
    AuthorId
);
entity_id!(
    /// Unique identifier for a category
    CategoryId
);
entity_id!(
    /// Unique identifier for a user of any role
    UserId
);
entity_id!(
    /// Unique identifier for one loan of one copy
    BorrowingId
);
entity_id!(
    /// Unique identifier for a hold on a book
    ReservationId
);
entity_id!(
    /// Unique identifier for an activity log entry
    ActivityId
);

// ============================================================================
// Money
// ============================================================================

/// Money amount in cents (avoids floating point issues)
///
/// Serialized as a decimal string with two fraction digits (`"25.00"`).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Money(u64);

impl Money {
    /// Zero.
    pub const ZERO: Self = Self(0);

    /// Creates a new `Money` amount from cents
    #[must_use]
    pub const fn from_cents(cents: u64) -> Self {
        Self(cents)
    }

    /// Returns the amount in cents
    #[must_use]
    pub const fn cents(&self) -> u64 {
        self.0
    }

    /// Checks if this amount is zero
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// `self * factor`, saturating at the maximum representable amount.
    #[must_use]
    pub const fn saturating_mul(self, factor: u64) -> Self {
        Self(self.0.saturating_mul(factor))
    }

    /// `self + other`, saturating at the maximum representable amount.
    #[must_use]
    pub const fn saturating_add(self, other: Self) -> Self {
        Self(self.0.saturating_add(other.0))
    }

    /// Integer division rounded half up; `None` when dividing by zero.
    #[must_use]
    pub const fn average_over(self, count: u64) -> Option<Self> {
        if count == 0 {
            return None;
        }
        Some(Self((self.0 + count / 2) / count))
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::ZERO, Self::saturating_add)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:02}", self.0 / 100, self.0 % 100)
    }
}

/// Error returned when a string is not a valid amount.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid amount {0:?}: expected a non-negative decimal with at most two fraction digits")]
pub struct ParseMoneyError(String);

impl FromStr for Money {
    type Err = ParseMoneyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ParseMoneyError(s.to_string());
        let trimmed = s.trim();
        let (whole, fraction) = trimmed.split_once('.').unwrap_or((trimmed, ""));

        if whole.is_empty() || !whole.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        if fraction.len() > 2 || !fraction.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        if trimmed.ends_with('.') {
            return Err(invalid());
        }

        let whole: u64 = whole.parse().map_err(|_| invalid())?;
        let cents: u64 = match fraction.len() {
            0 => 0,
            1 => fraction.parse::<u64>().map_err(|_| invalid())? * 10,
            _ => fraction.parse().map_err(|_| invalid())?,
        };

        whole
            .checked_mul(100)
            .and_then(|c| c.checked_add(cents))
            .map(Self)
            .ok_or_else(invalid)
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Money {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// Roles and statuses
// ============================================================================

/// Error returned when a stored or submitted enum value is unknown.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} {value:?}")]
pub struct UnknownVariant {
    kind: &'static str,
    value: String,
}

impl UnknownVariant {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// Role of a user; ordered from least to most privileged.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Library member; the only role books are issued to
    #[serde(rename = "user")]
    Member,
    /// Circulation desk staff
    #[serde(rename = "staff")]
    Staff,
    /// Administrator
    #[serde(rename = "admin")]
    Admin,
    /// Super administrator
    #[serde(rename = "super_admin")]
    SuperAdmin,
}

impl Role {
    /// Storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Member => "user",
            Self::Staff => "staff",
            Self::Admin => "admin",
            Self::SuperAdmin => "super_admin",
        }
    }

    /// True for staff, admins and super admins.
    #[must_use]
    pub const fn is_staff(self) -> bool {
        matches!(self, Self::Staff | Self::Admin | Self::SuperAdmin)
    }
}

impl FromStr for Role {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::Member),
            "staff" => Ok(Self::Staff),
            "admin" => Ok(Self::Admin),
            "super_admin" => Ok(Self::SuperAdmin),
            other => Err(UnknownVariant::new("role", other)),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Account status of a user.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    /// May borrow and sign in
    Active,
    /// Dormant account
    Inactive,
    /// Blocked by staff
    Suspended,
}

impl UserStatus {
    /// Storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
            Self::Suspended => "suspended",
        }
    }
}

impl FromStr for UserStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            "suspended" => Ok(Self::Suspended),
            other => Err(UnknownVariant::new("user status", other)),
        }
    }
}

impl fmt::Display for UserStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status of a borrowing record.
///
/// Only `Borrowed` and `Returned` are written. `Overdue` is what an open
/// record past its due date displays as; rows stored as `overdue` by older
/// deployments carry a return date and are treated as returned.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BorrowingStatus {
    /// Copy is out
    Borrowed,
    /// Copy came back
    Returned,
    /// Copy is out past its due date (display only)
    Overdue,
}

impl BorrowingStatus {
    /// Storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Borrowed => "borrowed",
            Self::Returned => "returned",
            Self::Overdue => "overdue",
        }
    }
}

impl FromStr for BorrowingStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "borrowed" => Ok(Self::Borrowed),
            "returned" => Ok(Self::Returned),
            "overdue" => Ok(Self::Overdue),
            other => Err(UnknownVariant::new("borrowing status", other)),
        }
    }
}

impl fmt::Display for BorrowingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a reservation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
    /// Waiting for the reader
    Pending,
    /// Reader collected the book
    Fulfilled,
    /// Withdrawn by the reader or staff
    Cancelled,
    /// Expiry date passed while pending
    Expired,
}

impl ReservationStatus {
    /// Storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Fulfilled => "fulfilled",
            Self::Cancelled => "cancelled",
            Self::Expired => "expired",
        }
    }
}

impl FromStr for ReservationStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "fulfilled" => Ok(Self::Fulfilled),
            "cancelled" => Ok(Self::Cancelled),
            "expired" => Ok(Self::Expired),
            other => Err(UnknownVariant::new("reservation status", other)),
        }
    }
}

// ============================================================================
// Entities
// ============================================================================

/// An author in the catalog
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    /// Author identifier
    pub id: AuthorId,
    /// Display name
    pub name: String,
    /// Short biography
    pub biography: Option<String>,
    /// Date of birth
    pub birth_date: Option<NaiveDate>,
    /// Nationality
    pub nationality: Option<String>,
}

/// A shelf category
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    /// Category identifier
    pub id: CategoryId,
    /// Unique name
    pub name: String,
    /// Description
    pub description: Option<String>,
}

/// A book title and its copy counters.
///
/// `available_quantity` is a denormalized counter: it always equals
/// `quantity` minus the number of open borrowing records for the book.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    /// Book identifier
    pub id: BookId,
    /// Title
    pub title: String,
    /// ISBN, unique when present
    pub isbn: Option<String>,
    /// Author reference
    pub author_id: Option<AuthorId>,
    /// Category reference
    pub category_id: Option<CategoryId>,
    /// Publisher
    pub publisher: Option<String>,
    /// Year of publication
    pub publish_year: Option<i32>,
    /// Page count
    pub pages: Option<i32>,
    /// Shelf location
    pub location: Option<String>,
    /// Description
    pub description: Option<String>,
    /// Cover image reference
    pub cover_image: Option<String>,
    /// Copies owned
    pub quantity: u32,
    /// Copies on the shelf
    pub available_quantity: u32,
}

impl Book {
    /// Copies currently out according to the counter.
    #[must_use]
    pub const fn on_loan(&self) -> u32 {
        self.quantity.saturating_sub(self.available_quantity)
    }
}

/// A user of any role
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// User identifier
    pub id: UserId,
    /// Unique login name
    pub username: String,
    /// Unique email address
    pub email: String,
    /// Full name
    pub full_name: String,
    /// Phone number
    pub phone: Option<String>,
    /// Postal address
    pub address: Option<String>,
    /// Role
    pub role: Role,
    /// Account status
    pub status: UserStatus,
    /// When the account was created
    pub created_at: DateTime<Utc>,
}

/// One loan of one copy of a book.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BorrowingRecord {
    /// Record identifier
    pub id: BorrowingId,
    /// Borrowed book
    pub book_id: BookId,
    /// Borrower
    pub user_id: UserId,
    /// Day the copy went out
    pub borrowed_date: NaiveDate,
    /// Day the copy is due back
    pub due_date: NaiveDate,
    /// Day the copy came back
    pub return_date: Option<NaiveDate>,
    /// Stored status
    pub status: BorrowingStatus,
    /// Fine assessed at return
    pub fine_amount: Money,
    /// Staff member who issued the copy
    pub issued_by: Option<UserId>,
    /// Staff member who took the copy back
    pub returned_to: Option<UserId>,
}

impl BorrowingRecord {
    /// True while the copy is out.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.status == BorrowingStatus::Borrowed
    }

    /// True for open records whose due date has passed.
    #[must_use]
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        self.is_open() && self.due_date < today
    }

    /// Status to show a reader: open records past due display as overdue.
    #[must_use]
    pub fn display_status(&self, today: NaiveDate) -> BorrowingStatus {
        match self.status {
            BorrowingStatus::Borrowed if self.due_date < today => BorrowingStatus::Overdue,
            BorrowingStatus::Borrowed => BorrowingStatus::Borrowed,
            BorrowingStatus::Returned | BorrowingStatus::Overdue => BorrowingStatus::Returned,
        }
    }
}

/// A hold placed on a book.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    /// Reservation identifier
    pub id: ReservationId,
    /// Reserved book
    pub book_id: BookId,
    /// Reader
    pub user_id: UserId,
    /// Day the hold was placed
    pub reservation_date: NaiveDate,
    /// Last day the hold is valid
    pub expiry_date: NaiveDate,
    /// Stored status
    pub status: ReservationStatus,
}

impl Reservation {
    /// Stored status, with pending holds past their expiry date reported as expired.
    #[must_use]
    pub fn effective_status(&self, today: NaiveDate) -> ReservationStatus {
        if self.status == ReservationStatus::Pending && self.expiry_date < today {
            ReservationStatus::Expired
        } else {
            self.status
        }
    }
}

/// An entry in the audit trail.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityLogEntry {
    /// Entry identifier
    pub id: ActivityId,
    /// Acting user; `None` for system actions
    pub user_id: Option<UserId>,
    /// Action code, e.g. `ISSUE_BOOK`
    pub action: String,
    /// Kind of entity touched, e.g. `borrowing`
    pub entity_type: Option<String>,
    /// Identifier of the entity touched
    pub entity_id: Option<Uuid>,
    /// Free text
    pub description: String,
    /// Source address of the request
    pub ip_address: Option<String>,
    /// When the action happened
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn money_parses_and_displays_two_decimals() {
        assert_eq!("5".parse::<Money>(), Ok(Money::from_cents(500)));
        assert_eq!("5.5".parse::<Money>(), Ok(Money::from_cents(550)));
        assert_eq!("25.00".parse::<Money>(), Ok(Money::from_cents(2500)));
        assert_eq!(" 0.07 ".parse::<Money>(), Ok(Money::from_cents(7)));
        assert_eq!(Money::from_cents(2500).to_string(), "25.00");
        assert_eq!(Money::from_cents(7).to_string(), "0.07");
    }

    #[test]
    fn money_rejects_malformed_amounts() {
        for raw in ["", "-1", "1.234", "abc", "1.", ".5", "1.x"] {
            assert!(raw.parse::<Money>().is_err(), "{raw:?} should be rejected");
        }
    }

    #[test]
    fn money_serializes_as_decimal_string() {
        let json = serde_json::to_string(&Money::from_cents(1250)).expect("serializes");
        assert_eq!(json, "\"12.50\"");
        let back: Money = serde_json::from_str("\"12.50\"").expect("deserializes");
        assert_eq!(back, Money::from_cents(1250));
    }

    #[test]
    fn money_average_rounds_half_up() {
        assert_eq!(Money::from_cents(1000).average_over(3), Some(Money::from_cents(333)));
        assert_eq!(Money::from_cents(5).average_over(2), Some(Money::from_cents(3)));
        assert_eq!(Money::ZERO.average_over(0), None);
    }

    #[test]
    fn roles_are_ordered_by_privilege() {
        assert!(Role::Member < Role::Staff);
        assert!(Role::Staff < Role::Admin);
        assert!(Role::Admin < Role::SuperAdmin);
        assert!(!Role::Member.is_staff());
        assert!(Role::Staff.is_staff());
        assert_eq!("super_admin".parse::<Role>(), Ok(Role::SuperAdmin));
        assert_eq!(
            serde_json::to_string(&Role::Member).expect("serializes"),
            "\"user\""
        );
    }

    #[test]
    fn open_record_past_due_displays_overdue() {
        let record = BorrowingRecord {
            id: BorrowingId::new(),
            book_id: BookId::new(),
            user_id: UserId::new(),
            borrowed_date: day(2024, 1, 1),
            due_date: day(2024, 1, 10),
            return_date: None,
            status: BorrowingStatus::Borrowed,
            fine_amount: Money::ZERO,
            issued_by: None,
            returned_to: None,
        };

        assert_eq!(record.display_status(day(2024, 1, 10)), BorrowingStatus::Borrowed);
        assert_eq!(record.display_status(day(2024, 1, 11)), BorrowingStatus::Overdue);
        assert!(record.is_overdue(day(2024, 1, 11)));

        let legacy = BorrowingRecord {
            status: BorrowingStatus::Overdue,
            return_date: Some(day(2024, 1, 15)),
            ..record
        };
        assert!(!legacy.is_open());
        assert_eq!(legacy.display_status(day(2024, 2, 1)), BorrowingStatus::Returned);
    }

    #[test]
    fn pending_reservation_expires_after_expiry_date() {
        let reservation = Reservation {
            id: ReservationId::new(),
            book_id: BookId::new(),
            user_id: UserId::new(),
            reservation_date: day(2024, 3, 1),
            expiry_date: day(2024, 3, 4),
            status: ReservationStatus::Pending,
        };
        assert_eq!(reservation.effective_status(day(2024, 3, 4)), ReservationStatus::Pending);
        assert_eq!(reservation.effective_status(day(2024, 3, 5)), ReservationStatus::Expired);
    }
}

//! Queue entry types: tickets, identifiers, route codes and the last-called board.
//!
//! A [`Ticket`] is one driver's turn in the queue. It is created `Waiting` by the
//! ticket issuer, flips once to `Called` during a batch call and is removed from the
//! store on deletion or queue clear.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

/// Opaque store-assigned identifier of a queue entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TicketId(Uuid);

impl TicketId {
    /// Creates a new random `TicketId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `TicketId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TicketId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of the user owning a ticket (the identity provider's uid).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DriverId(String);

impl DriverId {
    /// Create a new `DriverId`
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the driver id as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DriverId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DriverId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for DriverId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Printed ticket number ("senha").
///
/// Stored as a string because that is how the board and the queue order it: the
/// default call ordering compares numbers lexicographically, so `"10"` sorts before
/// `"2"`. See [`CallOrdering`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TicketNumber(String);

impl TicketNumber {
    /// Build a ticket number from an allocated sequence value.
    #[must_use]
    pub fn from_sequence(value: u32) -> Self {
        Self(value.to_string())
    }

    /// Get the ticket number as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Numeric value of the ticket, if it parses as one.
    #[must_use]
    pub fn numeric_value(&self) -> Option<u32> {
        self.0.parse().ok()
    }
}

impl fmt::Display for TicketNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TicketNumber {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TicketNumber {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ============================================================================
// Status and display slot
// ============================================================================

/// Lifecycle status of a queue entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketStatus {
    /// Issued and waiting to be called
    Waiting,
    /// Called by an administrator
    Called,
}

impl TicketStatus {
    /// Statuses that count as "active" for the one-ticket-per-driver rule.
    pub const ACTIVE: [Self; 2] = [Self::Waiting, Self::Called];

    /// Convert status to its stored string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Called => "called",
        }
    }

    /// Parse status from its stored string representation.
    ///
    /// # Errors
    ///
    /// Returns [`ParseTicketStatusError`] if the string doesn't match a known status.
    pub fn parse(s: &str) -> Result<Self, ParseTicketStatusError> {
        match s {
            "waiting" => Ok(Self::Waiting),
            "called" => Ok(Self::Called),
            other => Err(ParseTicketStatusError(other.to_string())),
        }
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a stored status string is unknown.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid ticket status: {0}")]
pub struct ParseTicketStatusError(String);

/// Display slot ("box") a called driver should go to.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoxSlot(String);

impl BoxSlot {
    /// Sentinel shown until an administrator assigns a slot.
    pub const UNASSIGNED: &'static str = "00";

    /// Create a slot from a label
    #[must_use]
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    /// The unassigned sentinel slot
    #[must_use]
    pub fn unassigned() -> Self {
        Self(Self::UNASSIGNED.to_string())
    }

    /// Get the slot label
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether a real slot has been assigned
    #[must_use]
    pub fn is_assigned(&self) -> bool {
        self.0 != Self::UNASSIGNED
    }
}

impl Default for BoxSlot {
    fn default() -> Self {
        Self::unassigned()
    }
}

impl fmt::Display for BoxSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Route code
// ============================================================================

/// Error type for `RouteCode` parsing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid route code '{0}': expected one uppercase letter, a hyphen and 1-3 digits (e.g. A-1, J-100)")]
pub struct ParseRouteCodeError(String);

/// Delivery route code, e.g. `A-1` or `J-100`.
///
/// One uppercase ASCII letter, a hyphen, then one to three ASCII digits.
///
/// # Examples
///
/// ```
/// use driver_queue_core::ticket::RouteCode;
///
/// let route: RouteCode = "J-12".parse().unwrap();
/// assert_eq!(route.as_str(), "J-12");
///
/// assert!("j-12".parse::<RouteCode>().is_err());
/// assert!("J-1000".parse::<RouteCode>().is_err());
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RouteCode(String);

impl RouteCode {
    /// Clean up free-form input the way the driver screen does before validating:
    /// upper-case it and drop anything that is not a letter, digit or hyphen.
    ///
    /// Upper-casing happens first, so a lowercase letter is kept (`c-42` becomes
    /// `C-42`). Filtering before upper-casing would strip it and reject the input
    /// as `-42`, which is how the legacy driver app behaved.
    ///
    /// # Errors
    ///
    /// Returns [`ParseRouteCodeError`] if the cleaned input is still not a route code.
    ///
    /// # Examples
    ///
    /// ```
    /// use driver_queue_core::ticket::RouteCode;
    ///
    /// let route = RouteCode::normalize(" b-7 ").unwrap();
    /// assert_eq!(route.as_str(), "B-7");
    /// ```
    pub fn normalize(input: &str) -> Result<Self, ParseRouteCodeError> {
        let cleaned: String = input
            .to_uppercase()
            .chars()
            .filter(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || *c == '-')
            .collect();
        cleaned.parse()
    }

    /// Get the route code as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn is_valid(s: &str) -> bool {
        let bytes = s.as_bytes();
        if bytes.len() < 3 || bytes.len() > 5 {
            return false;
        }
        bytes[0].is_ascii_uppercase()
            && bytes[1] == b'-'
            && bytes[2..].iter().all(u8::is_ascii_digit)
    }
}

impl FromStr for RouteCode {
    type Err = ParseRouteCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if Self::is_valid(s) {
            Ok(Self(s.to_string()))
        } else {
            Err(ParseRouteCodeError(s.to_string()))
        }
    }
}

impl fmt::Display for RouteCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Tickets
// ============================================================================

/// Everything the issuer knows about a ticket before the store numbers it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketDraft {
    /// Owning driver
    pub driver_id: DriverId,
    /// Name shown on the board
    pub driver_name: String,
    /// Vehicle plate
    pub plate: String,
    /// Route the driver is loading for
    pub route: RouteCode,
    /// Account e-mail, if the identity provider has one
    pub email: Option<String>,
    /// When the driver requested the ticket
    pub issued_at: DateTime<Utc>,
}

/// A queue entry representing one driver's turn.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    /// Store-assigned identifier
    pub id: TicketId,
    /// Owning driver
    pub driver_id: DriverId,
    /// Name shown on the board
    pub driver_name: String,
    /// Vehicle plate
    pub plate: String,
    /// Route code
    pub route: RouteCode,
    /// Account e-mail
    pub email: Option<String>,
    /// Printed ticket number
    pub ticket_number: TicketNumber,
    /// Current status
    pub status: TicketStatus,
    /// Display slot
    pub box_slot: BoxSlot,
    /// Issuance time
    pub issued_at: DateTime<Utc>,
    /// Time of the batch call that called this ticket
    pub called_at: Option<DateTime<Utc>>,
}

impl Ticket {
    /// Materialise a freshly numbered ticket from a draft.
    ///
    /// New tickets always start `Waiting` with the unassigned box slot.
    #[must_use]
    pub fn issue(id: TicketId, draft: TicketDraft, ticket_number: TicketNumber) -> Self {
        Self {
            id,
            driver_id: draft.driver_id,
            driver_name: draft.driver_name,
            plate: draft.plate,
            route: draft.route,
            email: draft.email,
            ticket_number,
            status: TicketStatus::Waiting,
            box_slot: BoxSlot::unassigned(),
            issued_at: draft.issued_at,
            called_at: None,
        }
    }

    /// Whether the ticket counts toward the one-active-ticket-per-driver rule.
    #[must_use]
    pub fn is_active(&self) -> bool {
        TicketStatus::ACTIVE.contains(&self.status)
    }

    /// Whether the ticket is still waiting to be called.
    #[must_use]
    pub fn is_waiting(&self) -> bool {
        self.status == TicketStatus::Waiting
    }

    /// Transition to `Called`.
    pub fn mark_called(&mut self, at: DateTime<Utc>) {
        self.status = TicketStatus::Called;
        self.called_at = Some(at);
    }
}

/// The single published snapshot of the most recently called ticket.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastCalledRecord {
    /// Called ticket number
    pub ticket_number: TicketNumber,
    /// Driver name
    pub driver_name: String,
    /// Route code
    pub route: RouteCode,
    /// Vehicle plate
    pub plate: String,
    /// Display slot at call time
    pub box_slot: BoxSlot,
}

impl From<&Ticket> for LastCalledRecord {
    fn from(ticket: &Ticket) -> Self {
        Self {
            ticket_number: ticket.ticket_number.clone(),
            driver_name: ticket.driver_name.clone(),
            route: ticket.route.clone(),
            plate: ticket.plate.clone(),
            box_slot: ticket.box_slot.clone(),
        }
    }
}

// ============================================================================
// Ordering
// ============================================================================

/// How waiting tickets are ordered when selecting a batch to call.
///
/// `Lexicographic` compares the printed numbers as strings, which is how the queue
/// has always been ordered: `"10" < "2"`. `Numeric` compares their integer values.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallOrdering {
    /// String comparison of ticket numbers
    #[default]
    Lexicographic,
    /// Integer comparison of ticket numbers
    Numeric,
}

impl CallOrdering {
    /// Compare two ticket numbers under this ordering.
    ///
    /// Numeric comparison falls back to string comparison for values that do
    /// not parse, and sorts those after every numeric value.
    #[must_use]
    pub fn compare(self, a: &TicketNumber, b: &TicketNumber) -> Ordering {
        match self {
            Self::Lexicographic => a.as_str().cmp(b.as_str()),
            Self::Numeric => match (a.numeric_value(), b.numeric_value()) {
                (Some(x), Some(y)) => x.cmp(&y),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => a.as_str().cmp(b.as_str()),
            },
        }
    }

    /// Sort tickets in place under this ordering.
    pub fn sort(self, tickets: &mut [Ticket]) {
        tickets.sort_by(|a, b| self.compare(&a.ticket_number, &b.ticket_number));
    }
}

impl FromStr for CallOrdering {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lexicographic" | "string" => Ok(Self::Lexicographic),
            "numeric" => Ok(Self::Numeric),
            other => Err(format!("unknown call ordering '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)] // Tests can unwrap

    use super::*;

    fn draft(driver: &str) -> TicketDraft {
        TicketDraft {
            driver_id: DriverId::from(driver),
            driver_name: "Ana".to_string(),
            plate: "ABC1D23".to_string(),
            route: "A-1".parse().unwrap(),
            email: None,
            issued_at: Utc::now(),
        }
    }

    mod route_code_tests {
        use super::*;

        #[test]
        fn accepts_one_to_three_digits() {
            for input in ["A-1", "J-10", "Z-999"] {
                assert!(input.parse::<RouteCode>().is_ok(), "{input} should parse");
            }
        }

        #[test]
        fn rejects_malformed_codes() {
            for input in ["", "A", "A-", "a-1", "AB-1", "A1", "A-1000", "A-1a", "-12", "Á-1"] {
                assert!(input.parse::<RouteCode>().is_err(), "{input} should be rejected");
            }
        }

        #[test]
        fn normalize_strips_noise_and_uppercases() {
            assert_eq!(RouteCode::normalize("c-42").unwrap().as_str(), "C-42");
            assert_eq!(RouteCode::normalize(" D - 7!").unwrap().as_str(), "D-7");
            assert!(RouteCode::normalize("route 7").is_err());
        }

        #[test]
        fn error_mentions_input() {
            let err = "x".parse::<RouteCode>().unwrap_err();
            assert!(err.to_string().contains("'x'"));
        }
    }

    mod ticket_tests {
        use super::*;

        #[test]
        fn issue_starts_waiting_with_unassigned_box() {
            let ticket = Ticket::issue(TicketId::new(), draft("d1"), TicketNumber::from_sequence(7));
            assert_eq!(ticket.status, TicketStatus::Waiting);
            assert_eq!(ticket.box_slot.as_str(), "00");
            assert!(!ticket.box_slot.is_assigned());
            assert_eq!(ticket.ticket_number.as_str(), "7");
            assert!(ticket.is_active());
            assert!(ticket.called_at.is_none());
        }

        #[test]
        fn mark_called_records_time() {
            let mut ticket =
                Ticket::issue(TicketId::new(), draft("d1"), TicketNumber::from_sequence(1));
            let at = Utc::now();
            ticket.mark_called(at);
            assert_eq!(ticket.status, TicketStatus::Called);
            assert_eq!(ticket.called_at, Some(at));
            assert!(ticket.is_active());
            assert!(!ticket.is_waiting());
        }

        #[test]
        fn last_called_record_projects_display_fields() {
            let ticket = Ticket::issue(TicketId::new(), draft("d1"), TicketNumber::from_sequence(3));
            let record = LastCalledRecord::from(&ticket);
            assert_eq!(record.ticket_number.as_str(), "3");
            assert_eq!(record.driver_name, "Ana");
            assert_eq!(record.route.as_str(), "A-1");
            assert_eq!(record.box_slot, BoxSlot::unassigned());
        }

        #[test]
        fn status_round_trips_through_storage_strings() {
            for status in TicketStatus::ACTIVE {
                assert_eq!(TicketStatus::parse(status.as_str()).unwrap(), status);
            }
            assert!(TicketStatus::parse("aguardando").is_err());
        }

        #[test]
        fn status_serializes_lowercase() {
            let json = serde_json::to_string(&TicketStatus::Called).unwrap();
            assert_eq!(json, "\"called\"");
        }
    }

    mod ordering_tests {
        use super::*;

        #[test]
        fn lexicographic_puts_ten_before_two() {
            let ten = TicketNumber::from("10");
            let two = TicketNumber::from("2");
            assert_eq!(CallOrdering::Lexicographic.compare(&ten, &two), Ordering::Less);
        }

        #[test]
        fn numeric_puts_two_before_ten() {
            let ten = TicketNumber::from("10");
            let two = TicketNumber::from("2");
            assert_eq!(CallOrdering::Numeric.compare(&two, &ten), Ordering::Less);
        }

        #[test]
        fn numeric_sorts_unparseable_last() {
            let odd = TicketNumber::from("x");
            let one = TicketNumber::from("1");
            assert_eq!(CallOrdering::Numeric.compare(&one, &odd), Ordering::Less);
        }

        #[test]
        fn parses_from_config_strings() {
            assert_eq!("numeric".parse::<CallOrdering>().unwrap(), CallOrdering::Numeric);
            assert_eq!(
                "Lexicographic".parse::<CallOrdering>().unwrap(),
                CallOrdering::Lexicographic
            );
            assert!("random".parse::<CallOrdering>().is_err());
        }
    }
}

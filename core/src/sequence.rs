//! Ticket sequence counter.
//!
//! The counter holds the last number handed out. Issuance advances it by one and
//! wraps back to 1 once it would pass the ceiling; a queue clear resets it to 0.
//! Nothing else ever moves it.

use crate::ticket::TicketNumber;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Highest ticket number before the counter wraps back to 1.
pub const DEFAULT_CEILING: u32 = 1000;

/// Last-issued ticket number.
///
/// # Examples
///
/// ```
/// use driver_queue_core::sequence::{SequenceCounter, DEFAULT_CEILING};
///
/// let counter = SequenceCounter::new(999);
/// let counter = counter.advance(DEFAULT_CEILING);
/// assert_eq!(counter.last_number(), 1000);
///
/// let counter = counter.advance(DEFAULT_CEILING);
/// assert_eq!(counter.last_number(), 1);
/// ```
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SequenceCounter {
    last_number: u32,
}

impl SequenceCounter {
    /// Counter state right after a clear: nothing issued yet.
    pub const RESET: Self = Self { last_number: 0 };

    /// Create a counter holding `last_number`.
    #[must_use]
    pub const fn new(last_number: u32) -> Self {
        Self { last_number }
    }

    /// The last number handed out (0 when nothing has been issued since the last clear).
    #[must_use]
    pub const fn last_number(self) -> u32 {
        self.last_number
    }

    /// The number the next issuance will receive.
    ///
    /// A value at or above `ceiling` wraps to 1, so a counter restored from storage
    /// with an out-of-range value still yields a valid number.
    #[must_use]
    pub const fn next_number(self, ceiling: u32) -> u32 {
        if self.last_number >= ceiling {
            1
        } else {
            self.last_number + 1
        }
    }

    /// Counter state after one issuance.
    #[must_use]
    pub const fn advance(self, ceiling: u32) -> Self {
        Self {
            last_number: self.next_number(ceiling),
        }
    }

    /// Ticket number for the current value.
    #[must_use]
    pub fn ticket_number(self) -> TicketNumber {
        TicketNumber::from_sequence(self.last_number)
    }

    /// Whether the counter is in its post-clear state.
    #[must_use]
    pub const fn is_reset(self) -> bool {
        self.last_number == 0
    }
}

impl fmt::Display for SequenceCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.last_number)
    }
}

impl From<u32> for SequenceCounter {
    fn from(value: u32) -> Self {
        Self::new(value)
    }
}

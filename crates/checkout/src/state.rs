//! Checkout state machine.

use serde::{Deserialize, Serialize};

/// The stage a single checkout attempt has reached.
///
/// State transitions:
/// ```text
/// Validating ──► Reserving ──► Persisting ──► Committed
///      │             │              │
///      └─────────────┴──────────────┴──► Aborted
/// ```
///
/// An attempt aborted in `Persisting` has released its reservation and left
/// no order, token or cart change behind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum CheckoutState {
    /// Resolving the lines to purchase against the catalog.
    #[default]
    Validating,

    /// Holding stock for every line.
    Reserving,

    /// Writing the order and committing the stock decrement.
    Persisting,

    /// The order and the stock decrement are durable (terminal state).
    Committed,

    /// The attempt ended without an order (terminal state).
    Aborted,
}

impl CheckoutState {
    /// Returns true if the attempt may move from this state to `next`.
    pub fn can_transition_to(&self, next: CheckoutState) -> bool {
        use CheckoutState::*;
        matches!(
            (self, next),
            (Validating, Reserving)
                | (Reserving, Persisting)
                | (Persisting, Committed)
                | (Validating, Aborted)
                | (Reserving, Aborted)
                | (Persisting, Aborted)
        )
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, CheckoutState::Committed | CheckoutState::Aborted)
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            CheckoutState::Validating => "Validating",
            CheckoutState::Reserving => "Reserving",
            CheckoutState::Persisting => "Persisting",
            CheckoutState::Committed => "Committed",
            CheckoutState::Aborted => "Aborted",
        }
    }
}

impl std::fmt::Display for CheckoutState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

//! Transfer FSM State Definitions
//!
//! State IDs are stable and used as the PostgreSQL SMALLINT representation.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Transfer workflow status
///
/// ```text
/// DRAFT ──▶ PENDING ──▶ APPROVED ──▶ DELIVERED
///              │
///              └──────▶ REJECTED
/// ```
///
/// Terminal: DELIVERED (30), REJECTED (-10).
/// DRAFT only leaves through an edit that submits it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(i16)]
pub enum TransferStatus {
    /// Being prepared by the requesting store, not visible to approvers yet
    Draft = 0,

    /// Submitted and waiting for an approver
    Pending = 10,

    /// Approved: driver assigned, shipped lines recorded, source stock decremented
    Approved = 20,

    /// Terminal: received at the destination, destination stock incremented
    Delivered = 30,

    /// Terminal: declined by the approver, no stock moved
    Rejected = -10,
}

impl TransferStatus {
    /// All statuses, in workflow order
    pub const ALL: [TransferStatus; 5] = [
        TransferStatus::Draft,
        TransferStatus::Pending,
        TransferStatus::Approved,
        TransferStatus::Delivered,
        TransferStatus::Rejected,
    ];

    /// Check if this is a terminal state (no more transitions possible)
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransferStatus::Delivered | TransferStatus::Rejected)
    }

    /// Requested lines may only be replaced while the transfer is still a request
    #[inline]
    pub fn is_editable(&self) -> bool {
        matches!(self, TransferStatus::Draft | TransferStatus::Pending)
    }

    /// Statuses a transfer may be created in
    #[inline]
    pub fn is_initial(&self) -> bool {
        self.is_editable()
    }

    /// Get the numeric state ID for PostgreSQL storage
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    /// Convert from PostgreSQL state ID
    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            0 => Some(TransferStatus::Draft),
            10 => Some(TransferStatus::Pending),
            20 => Some(TransferStatus::Approved),
            30 => Some(TransferStatus::Delivered),
            -10 => Some(TransferStatus::Rejected),
            _ => None,
        }
    }

    /// Get human-readable state name
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Draft => "DRAFT",
            TransferStatus::Pending => "PENDING",
            TransferStatus::Approved => "APPROVED",
            TransferStatus::Delivered => "DELIVERED",
            TransferStatus::Rejected => "REJECTED",
        }
    }
}

impl fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<i16> for TransferStatus {
    type Error = ();

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        TransferStatus::from_id(value).ok_or(())
    }
}

impl FromStr for TransferStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "DRAFT" => Ok(TransferStatus::Draft),
            "PENDING" => Ok(TransferStatus::Pending),
            "APPROVED" => Ok(TransferStatus::Approved),
            "DELIVERED" => Ok(TransferStatus::Delivered),
            "REJECTED" => Ok(TransferStatus::Rejected),
            _ => Err(format!("Unknown transfer status: {}", s)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(TransferStatus::Delivered.is_terminal());
        assert!(TransferStatus::Rejected.is_terminal());

        assert!(!TransferStatus::Draft.is_terminal());
        assert!(!TransferStatus::Pending.is_terminal());
        assert!(!TransferStatus::Approved.is_terminal());
    }

    #[test]
    fn test_editable_states() {
        assert!(TransferStatus::Draft.is_editable());
        assert!(TransferStatus::Pending.is_editable());

        assert!(!TransferStatus::Approved.is_editable());
        assert!(!TransferStatus::Delivered.is_editable());
        assert!(!TransferStatus::Rejected.is_editable());
    }

    #[test]
    fn test_state_id_roundtrip() {
        for state in TransferStatus::ALL {
            assert_eq!(TransferStatus::from_id(state.id()), Some(state));
        }
    }

    #[test]
    fn test_invalid_state_id() {
        assert!(TransferStatus::from_id(999).is_none());
        assert!(TransferStatus::from_id(-999).is_none());
        assert!(TransferStatus::try_from(5).is_err());
    }

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!(
            "pending".parse::<TransferStatus>(),
            Ok(TransferStatus::Pending)
        );
        assert_eq!(
            "Delivered".parse::<TransferStatus>(),
            Ok(TransferStatus::Delivered)
        );
        assert!("shipped".parse::<TransferStatus>().is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(TransferStatus::Draft.to_string(), "DRAFT");
        assert_eq!(TransferStatus::Approved.to_string(), "APPROVED");
        assert_eq!(TransferStatus::Rejected.to_string(), "REJECTED");
    }

    #[test]
    fn test_serde_uses_screaming_case() {
        let json = serde_json::to_string(&TransferStatus::Pending).unwrap();
        assert_eq!(json, "\"PENDING\"");
        let back: TransferStatus = serde_json::from_str("\"APPROVED\"").unwrap();
        assert_eq!(back, TransferStatus::Approved);
    }
}

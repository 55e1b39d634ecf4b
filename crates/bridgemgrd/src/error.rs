//! Error types for membership operations.
//!
//! All errors implement `std::error::Error` via `thiserror`. Every
//! top-level operation surfaces exactly one of these kinds; advisory
//! steps (mode notifications, L2-multicast cleanup) are logged and never
//! produce an error.

use crate::types::VlanId;
use thiserror::Error;

/// Result type alias for membership operations.
pub type MembershipResult<T> = Result<T, MembershipError>;

/// Errors that can occur while synchronizing bridge membership.
#[derive(Debug, Clone, Error)]
pub enum MembershipError {
    /// Unknown interface, LAG, or bridge.
    #[error("'{object}' not found")]
    NotFound {
        /// What was looked up.
        object: String,
    },

    /// Missing required attribute or malformed request.
    #[error("Invalid parameter: {message}")]
    InvalidParameter {
        /// Error message.
        message: String,
    },

    /// A tagged member's VLAN id conflicts with the bridge's VLAN id.
    #[error("VLAN mismatch on bridge '{bridge}': assigned VLAN {bridge_vlan}, member carries VLAN {member_vlan}")]
    VlanMismatch {
        /// The bridge name.
        bridge: String,
        /// The bridge's assigned VLAN id.
        bridge_vlan: VlanId,
        /// The member's conflicting VLAN id.
        member_vlan: VlanId,
    },

    /// The forwarding driver rejected a programming call.
    #[error("Hardware programming failed: {operation}: {message}")]
    HardwareProgrammingFailure {
        /// The driver call that failed.
        operation: String,
        /// Error message.
        message: String,
    },

    /// The OS network mirror rejected a topology change.
    #[error("OS sync failed: {operation}: {message}")]
    OsSyncFailure {
        /// The mirror call that failed.
        operation: String,
        /// Error message.
        message: String,
    },

    /// The interface registry rejected a call.
    #[error("Registry operation failed: {operation}: {message}")]
    RegistryFailure {
        /// The registry call that failed.
        operation: String,
        /// Error message.
        message: String,
    },
}

impl MembershipError {
    /// Creates a not-found error.
    pub fn not_found(object: impl Into<String>) -> Self {
        Self::NotFound {
            object: object.into(),
        }
    }

    /// Creates an invalid-parameter error.
    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            message: message.into(),
        }
    }

    /// Creates a hardware programming error.
    pub fn hardware(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::HardwareProgrammingFailure {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Creates an OS sync error.
    pub fn os_sync(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::OsSyncFailure {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Creates a registry error.
    pub fn registry(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RegistryFailure {
            operation: operation.into(),
            message: message.into(),
        }
    }
}

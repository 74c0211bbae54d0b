//! Error types for the operator layer.
//!
//! Three failure classes cover the whole layer:
//!
//! - [`OpError::InvalidArgument`] — the caller handed an operator something
//!   malformed: wrong gradient-output arity, negative or inconsistent
//!   lengths, an out-of-bounds index, or tensors on a device no kernel
//!   provider was registered for.
//! - [`OpError::DeviceMismatch`] — cooperating tensors reside on different
//!   devices.
//! - [`OpError::Internal`] — a kernel violated its contract (e.g. produced a
//!   gradient whose shape disagrees with the saved input shape). This is a
//!   framework bug, never reachable through valid usage.
//!
//! There are no retries: every failure aborts the current forward or backward
//! call before any kernel executes partial work, so a partially written
//! gradient or output is never observable.

use crate::device::Device;

/// Result type for operator and kernel calls.
pub type Result<T> = std::result::Result<T, OpError>;

/// Errors that can occur in a forward or backward operator call.
#[derive(Debug, thiserror::Error)]
pub enum OpError {
    /// Malformed caller input: bad arity, bad lengths/offsets, index out of
    /// bounds, or an unprovisioned device.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Cooperating tensors reside on different devices.
    #[error("device mismatch: {left:?} vs {right:?}")]
    DeviceMismatch {
        /// Device of the first tensor checked.
        left: Device,
        /// Device of the second tensor checked.
        right: Device,
    },

    /// A kernel broke its contract with the operator layer.
    #[error("internal error: {0}")]
    Internal(String),
}

impl OpError {
    /// Shorthand for an [`OpError::InvalidArgument`] with a formatted message.
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Shorthand for an [`OpError::Internal`] with a formatted message.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

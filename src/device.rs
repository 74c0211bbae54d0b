//! Device residency tags.
//!
//! Every tensor carries a [`Device`] tag naming where its data lives. All
//! tensors participating in one operator call must share a device; a mismatch
//! is a precondition failure checked on entry, before any kernel runs.
//!
//! # Supported Devices
//!
//! - `Cpu` — host memory, served by the built-in `rayon` kernels (default).
//! - `Wgpu` — GPU memory behind a `wgpu` provider (external).
//! - `Cuda` — GPU memory behind a CUDA provider (external).
//!
//! Only the CPU provider ships with this crate; the other tags exist so that
//! external kernel providers can register against them in the dispatch
//! registry.

use crate::error::{OpError, Result};

/// Enumeration of supported device tags.
///
/// Only `Cpu` has a built-in kernel provider. `Wgpu` and `Cuda` are reserved
/// for externally registered providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Device {
    /// Host memory (default).
    #[default]
    Cpu,
    /// GPU memory managed through `wgpu`.
    Wgpu,
    /// GPU memory managed through CUDA.
    Cuda,
}

/// Checks that two cooperating tensors reside on the same device.
///
/// # Errors
/// Returns [`OpError::DeviceMismatch`] naming both devices if they differ.
///
/// # Example
///
/// ```
/// use sparse_autograd::device::{ensure_same_device, Device};
/// assert!(ensure_same_device(Device::Cpu, Device::Cpu).is_ok());
/// assert!(ensure_same_device(Device::Cpu, Device::Cuda).is_err());
/// ```
pub fn ensure_same_device(left: Device, right: Device) -> Result<()> {
    if left == right {
        Ok(())
    } else {
        Err(OpError::DeviceMismatch { left, right })
    }
}

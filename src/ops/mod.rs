//! # Kernel Providers and Dispatch
//!
//! This module defines the numeric kernels backing the operator layer and the
//! registry that selects one per device at call time.
//!
//! ## Submodules
//!
//! - [`cpu`] — Multi-threaded CPU kernels (the only built-in provider)
//! - [`dispatch`] — The [`KernelProvider`](dispatch::KernelProvider) contract
//!   and the immutable `(operation name, device)` registry
//!
//! ## Provider Selection
//!
//! Operators never name a provider directly: they resolve one through
//! [`dispatch::resolve`] using the device tag of their input tensors. The
//! registry is built once at startup and never mutated, so resolution is a
//! plain map lookup.
//!
//! ## Extending with a Device
//!
//! GPU providers are external collaborators. A deployment that ships one
//! registers it for its device tag under each operation name it supports; the
//! only obligation is to satisfy the `KernelProvider` contract exactly,
//! including summation-on-duplicate and padding/truncation semantics.

pub mod cpu;
pub mod dispatch;

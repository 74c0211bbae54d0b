//! Kernel Dispatch Layer
//!
//! This module selects the correct kernel provider for each operation at call
//! time, based on the device of the participating tensors.
//!
//! The registry is a plain immutable mapping from `(operation name, Device)`
//! to a provider, built exactly once at startup. Nothing is registered or
//! replaced after initialization; a lookup miss means the caller handed the
//! operator layer tensors on a device this deployment never provisioned.
//!
//! # Design Highlights
//! - **Pluggable**: providers are selected per device tag, not compiled in
//! - **Immutable**: the map is constructed once and never mutated
//! - **Contract-first**: providers are only obliged to satisfy the
//!   [`KernelProvider`] trait exactly, including summation-on-duplicate and
//!   padding/truncation semantics

use std::collections::HashMap;

use lazy_static::lazy_static;

use crate::device::Device;
use crate::error::{OpError, Result};
use crate::ops::cpu::CpuKernels;
use crate::tensors::{Ten64, TenIdx};

/// Symbolic name of the segment pack/unpack kernels.
pub const PACK_SEGMENTS: &str = "pack_segments";
/// Symbolic name of the row-gather kernel.
pub const INDEX_SELECT: &str = "index_select";
/// Symbolic name of the duplicate-summing scatter-add kernel.
pub const INDEX_ADD_WITH_INDICES: &str = "index_add_with_indices";
/// Symbolic name of the batched unary embedding kernels.
pub const BATCHED_UNARY_EMBEDDINGS: &str = "batched_unary_embeddings";

/// Device-specific numeric kernels backing the operator layer.
///
/// Implementations must uphold, exactly:
/// - **Padding/truncation**: `pack_segments_forward` zero-pads segments
///   shorter than `max_length` and truncates longer ones;
///   `pack_segments_backward` inverts that layout, giving truncated rows a
///   zero gradient and taking nothing from padding rows.
/// - **Sort transparency**: `index_select` output row `i` equals
///   `input[indices[i]]` for the *original* index order, whether or not the
///   caller passed pre-sorted indices with their permutation.
/// - **Summation on duplicates**: `index_add_with_indices` and
///   `batched_unary_embeddings_backward` accumulate repeated destinations by
///   summation, never overwrite, deterministically.
///
/// Each call is a blocking, ordered step from the operator layer's point of
/// view; any internal asynchrony must be joined before returning.
pub trait KernelProvider: Send + Sync {
    /// Packs ragged segments of `input` (sizes given by `lengths`) into a
    /// dense `[num_segments, max_length, …]` tensor.
    fn pack_segments_forward(
        &self,
        input: &Ten64,
        lengths: &TenIdx,
        max_length: usize,
    ) -> Result<Ten64>;

    /// Un-pads a `[num_segments, max_length, …]` gradient back into the
    /// ragged `[total_length, …]` layout.
    fn pack_segments_backward(
        &self,
        grad_output: &Ten64,
        lengths: &TenIdx,
        total_length: usize,
        max_length: usize,
    ) -> Result<Ten64>;

    /// Gathers rows of `input` at `indices`.
    ///
    /// When `indices_sorted` is true, `indices` is ascending and
    /// `orig_indices` maps each sorted position back to its original
    /// position; output row `orig_indices[i]` is `input[indices[i]]`. When
    /// false, `orig_indices` is ignored and output row `i` is
    /// `input[indices[i]]` directly.
    fn index_select(
        &self,
        input: &Ten64,
        indices: &TenIdx,
        orig_indices: Option<&TenIdx>,
        indices_sorted: bool,
    ) -> Result<Ten64>;

    /// Scatter-adds `grad_output` rows into a zero tensor of `input_shape`:
    /// for each occurrence `i` of index `k`,
    /// `grad_input[k] += grad_output[orig_indices[i]]`.
    ///
    /// `range_start`/`range_length` assert (when `range_length > 0`) that all
    /// indices fall in `[range_start, range_start + range_length)`, enabling
    /// a narrower accumulation pass; they never change the numeric result.
    fn index_add_with_indices(
        &self,
        grad_output: &Ten64,
        sorted_indices: &TenIdx,
        orig_indices: &TenIdx,
        input_shape: &[usize],
        range_start: usize,
        range_length: usize,
    ) -> Result<Ten64>;

    /// Per-sample, per-table scalar embedding lookup; see
    /// [`BatchedUnaryEmbeddingOp`](crate::operators::BatchedUnaryEmbeddingOp)
    /// for the layout of `table_offsets`, `offsets`, and `indices`.
    fn batched_unary_embeddings_forward(
        &self,
        weight: &Ten64,
        table_offsets: &TenIdx,
        offsets: &TenIdx,
        indices: &TenIdx,
    ) -> Result<Ten64>;

    /// Scatter-adds `grad_output` contributions back to the weight positions
    /// implied by `table_offsets`, `offsets`, and `indices`.
    fn batched_unary_embeddings_backward(
        &self,
        grad_output: &Ten64,
        weight: &Ten64,
        table_offsets: &TenIdx,
        offsets: &TenIdx,
        indices: &TenIdx,
    ) -> Result<Ten64>;
}

static CPU_KERNELS: CpuKernels = CpuKernels;

lazy_static! {
    static ref KERNEL_REGISTRY: HashMap<(&'static str, Device), &'static dyn KernelProvider> = {
        let mut registry: HashMap<(&'static str, Device), &'static dyn KernelProvider> =
            HashMap::new();
        for name in [
            PACK_SEGMENTS,
            INDEX_SELECT,
            INDEX_ADD_WITH_INDICES,
            BATCHED_UNARY_EMBEDDINGS,
        ] {
            registry.insert((name, Device::Cpu), &CPU_KERNELS);
        }
        registry
    };
}

/// Resolves the kernel provider for `(op, device)`.
///
/// # Errors
/// Returns [`OpError::InvalidArgument`] if no provider is registered for the
/// pair.
pub fn resolve(op: &'static str, device: Device) -> Result<&'static dyn KernelProvider> {
    tracing::trace!(op, ?device, "resolving kernel provider");
    KERNEL_REGISTRY
        .get(&(op, device))
        .copied()
        .ok_or_else(|| OpError::invalid(format!("no kernel registered for {op:?} on {device:?}")))
}

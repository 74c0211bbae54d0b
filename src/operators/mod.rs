//! # Differentiable Operators
//!
//! The core of this crate: forward/backward pairs bridging a reverse-mode
//! autodiff engine with the sparse-data kernels in [`crate::ops`].
//!
//! ## The forward/backward contract
//!
//! Each operator implements [`Operator`] with two capabilities:
//!
//! 1. `forward(inputs)` runs the numeric kernel and returns the output
//!    together with a strongly-typed [`Operator::Saved`] record holding
//!    exactly the state backward needs — no string-keyed context, no
//!    missing-key failure mode.
//! 2. `backward(saved, grad_outputs)` consumes that record **by value** and
//!    returns one gradient slot per forward input. Ownership enforces the
//!    lifecycle: a saved record is produced by one forward call, is immutable
//!    afterwards, and can be consumed by at most one backward call.
//!
//! Non-differentiable inputs (index tensors, lengths, integer and boolean
//! parameters) get an explicit `None` slot rather than a fabricated zero
//! gradient.
//!
//! ## Operators
//!
//! - [`PackSegmentsOp`] — ragged segments ↔ dense padded tensor
//! - [`IndexSelectOp`] — row gather with locality sorting and
//!   duplicate-summing scatter-add backward
//! - [`BatchedUnaryEmbeddingOp`] — per-batch scalar embedding lookup,
//!   differentiable w.r.t. the weights only
//!
//! Operators execute synchronously on the calling thread; any parallelism
//! lives inside the kernel call and joins before it returns.

mod index_select;
mod pack_segments;
mod unary_embedding;

pub use index_select::{IndexSelectInputs, IndexSelectOp, IndexSelectSaved, SavedIndices};
pub use pack_segments::{PackSegmentsInputs, PackSegmentsOp, PackSegmentsSaved};
pub use unary_embedding::{
    BatchedUnaryEmbeddingInputs, BatchedUnaryEmbeddingOp, BatchedUnaryEmbeddingSaved,
};

pub use index_select::index_select_dim0;
pub use pack_segments::pack_segments;
pub use unary_embedding::lookup_batched_unary_embedding;

use crate::error::Result;
use crate::tensors::{Ten64, TenIdx, Tensor};

/// Ordered gradient slots, exactly one per forward input.
///
/// `None` is the explicit no-gradient marker for non-differentiable inputs.
pub type GradientTuple = Vec<Option<Ten64>>;

/// A differentiable operator: a forward computation that records the state
/// its backward needs, and a backward computation that reconstructs
/// per-input gradients from only that state.
pub trait Operator {
    /// Borrowed forward inputs.
    type Inputs<'a>;
    /// State recorded by forward for the matching backward call.
    type Saved;

    /// Runs the forward computation, returning the output tensor and the
    /// saved state for backward.
    fn forward(&self, inputs: Self::Inputs<'_>) -> Result<(Ten64, Self::Saved)>;

    /// Runs the backward computation, consuming the saved state and
    /// returning one gradient slot per forward input.
    fn backward(&self, saved: Self::Saved, grad_outputs: &[Ten64]) -> Result<GradientTuple>;
}

/// Computes the locality-sort permutation of an index tensor.
///
/// Returns `(sorted_indices, orig_indices)` where `sorted_indices` is the
/// ascending sort of `indices` and `orig_indices[i]` is the original position
/// that produced `sorted_indices[i]`; gathering `sorted_indices` through
/// `orig_indices` reconstructs `indices` exactly, duplicates included.
///
/// The sort is stable, so recomputing the permutation from the same input
/// (the deferred-sort backward path) is bit-deterministic.
///
/// # Example
///
/// ```
/// use sparse_autograd::operators::sort_permutation;
/// use sparse_autograd::tensors::Tensor;
///
/// let indices = Tensor::new(vec![3], vec![2i64, 0, 2]);
/// let (sorted, orig) = sort_permutation(&indices);
/// assert_eq!(sorted.data, vec![0, 2, 2]);
/// assert_eq!(orig.data, vec![1, 0, 2]);
/// ```
pub fn sort_permutation(indices: &TenIdx) -> (TenIdx, TenIdx) {
    let n = indices.numel();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by_key(|&i| indices.data[i]);

    let sorted: Vec<i64> = order.iter().map(|&i| indices.data[i]).collect();
    let orig: Vec<i64> = order.iter().map(|&i| i as i64).collect();
    (
        Tensor::new(vec![n], sorted).with_device(indices.device),
        Tensor::new(vec![n], orig).with_device(indices.device),
    )
}

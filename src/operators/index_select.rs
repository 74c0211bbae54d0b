//! Row gather along dim 0 with a duplicate-summing scatter-add backward.
//!
//! The most intricate operator of the layer. Forward optionally sorts the
//! indices to promote memory locality in the gather; the sort is a pure
//! performance optimization and never changes the observable output.
//! Backward scatter-adds gradient rows back into the input shape, summing
//! duplicate destinations, with an optional contiguous-range fast path.

use crate::device::ensure_same_device;
use crate::error::{OpError, Result};
use crate::operators::{sort_permutation, GradientTuple, Operator};
use crate::ops::dispatch::{self, INDEX_ADD_WITH_INDICES, INDEX_SELECT};
use crate::tensors::{Ten64, TenIdx};

/// Gathers rows of `input` at `indices`, with gradients for `input` only.
///
/// Forward inputs, in gradient-slot order: `input`, `indices`,
/// `consecutive_range_start`, `consecutive_range_length`, `skip_sort`.
pub struct IndexSelectOp;

/// Forward inputs for [`IndexSelectOp`].
pub struct IndexSelectInputs<'a> {
    pub input: &'a Ten64,
    /// Row indices into `input`'s leading dimension; duplicates allowed.
    pub indices: &'a TenIdx,
    /// With `consecutive_range_length`, asserts all indices fall in
    /// `[start, start + length)`. A hint only: it selects a faster backward
    /// accumulation path and never changes the numeric result.
    pub consecutive_range_start: usize,
    /// Length of the hinted contiguous range; 0 disables the hint.
    pub consecutive_range_length: usize,
    /// Skip the locality sort in forward and defer it to backward. Intended
    /// for inference-style forwards where backward never runs.
    pub skip_sort: bool,
}

/// Indices as saved by forward: pre-sorted with their permutation, or raw
/// when the sort was deferred. The variant itself records the sort decision.
pub enum SavedIndices {
    /// Forward sorted; backward reuses the permutation.
    Sorted { sorted: TenIdx, orig: TenIdx },
    /// Forward skipped sorting; backward recomputes the permutation
    /// deterministically.
    Raw(TenIdx),
}

/// State recorded by [`IndexSelectOp::forward`].
pub struct IndexSelectSaved {
    indices: SavedIndices,
    input_shape: Vec<usize>,
    range_start: usize,
    range_length: usize,
}

impl Operator for IndexSelectOp {
    type Inputs<'a> = IndexSelectInputs<'a>;
    type Saved = IndexSelectSaved;

    fn forward(&self, inputs: Self::Inputs<'_>) -> Result<(Ten64, Self::Saved)> {
        let IndexSelectInputs {
            input,
            indices,
            consecutive_range_start,
            consecutive_range_length,
            skip_sort,
        } = inputs;
        ensure_same_device(input.device, indices.device)?;
        if input.shape.is_empty() {
            return Err(OpError::invalid("input must have a leading dimension"));
        }

        let kernel = dispatch::resolve(INDEX_SELECT, input.device)?;
        let (output, saved_indices) = if skip_sort {
            let output = kernel.index_select(input, indices, None, false)?;
            (output, SavedIndices::Raw(indices.clone()))
        } else {
            // Sort indices to promote locality in the gather; output row i
            // is still input[indices[i]].
            let (sorted, orig) = sort_permutation(indices);
            let output = kernel.index_select(input, &sorted, Some(&orig), true)?;
            (output, SavedIndices::Sorted { sorted, orig })
        };

        let saved = IndexSelectSaved {
            indices: saved_indices,
            input_shape: input.shape.clone(),
            range_start: consecutive_range_start,
            range_length: consecutive_range_length,
        };
        Ok((output, saved))
    }

    fn backward(&self, saved: Self::Saved, grad_outputs: &[Ten64]) -> Result<GradientTuple> {
        if grad_outputs.len() != 1 {
            return Err(OpError::invalid(format!(
                "index_select backward takes exactly 1 gradient output, got {}",
                grad_outputs.len()
            )));
        }
        let grad = &grad_outputs[0];

        let (sorted, orig) = match saved.indices {
            SavedIndices::Sorted { sorted, orig } => (sorted, orig),
            SavedIndices::Raw(indices) => {
                tracing::debug!(n = indices.numel(), "deferred index sort in backward");
                sort_permutation(&indices)
            }
        };
        ensure_same_device(grad.device, sorted.device)?;

        let kernel = dispatch::resolve(INDEX_ADD_WITH_INDICES, grad.device)?;
        let grad_input = kernel.index_add_with_indices(
            grad,
            &sorted,
            &orig,
            &saved.input_shape,
            saved.range_start,
            saved.range_length,
        )?;
        if grad_input.shape != saved.input_shape {
            return Err(OpError::internal(format!(
                "scattered gradient has shape {:?}, expected {:?}",
                grad_input.shape, saved.input_shape
            )));
        }

        // Slots: [input, indices, range_start, range_length, skip_sort].
        Ok(vec![Some(grad_input), None, None, None, None])
    }
}

/// Gathers rows of `input` at `indices` and discards the saved state.
///
/// `consecutive_range_start`/`consecutive_range_length` default to 0 (no
/// hint) and `skip_sort` to false when `None` is passed, matching the
/// optional-argument surface of the underlying operator.
///
/// # Example
///
/// ```
/// use sparse_autograd::operators::index_select_dim0;
/// use sparse_autograd::tensor;
/// use sparse_autograd::tensors::Tensor;
///
/// let input = tensor!([[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]]);
/// let indices = Tensor::new(vec![2], vec![2i64, 0]);
/// let out = index_select_dim0(&input, &indices, None, None, None).unwrap();
/// assert_eq!(out.data, vec![5.0, 6.0, 1.0, 2.0]);
/// ```
pub fn index_select_dim0(
    input: &Ten64,
    indices: &TenIdx,
    consecutive_range_start: Option<usize>,
    consecutive_range_length: Option<usize>,
    skip_sort: Option<bool>,
) -> Result<Ten64> {
    IndexSelectOp
        .forward(IndexSelectInputs {
            input,
            indices,
            consecutive_range_start: consecutive_range_start.unwrap_or(0),
            consecutive_range_length: consecutive_range_length.unwrap_or(0),
            skip_sort: skip_sort.unwrap_or(false),
        })
        .map(|(output, _)| output)
}

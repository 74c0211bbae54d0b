//! Ragged segment packing with a backward pass.
//!
//! Converts a tensor whose leading dimension is the concatenation of
//! variable-length segments into a dense `[num_segments, max_length, …]`
//! tensor, and un-pads gradients back to the ragged layout.

use crate::device::ensure_same_device;
use crate::error::{OpError, Result};
use crate::operators::{GradientTuple, Operator};
use crate::ops::dispatch::{self, PACK_SEGMENTS};
use crate::tensors::{Ten64, TenIdx};

/// Packs ragged segments into a dense zero-padded tensor.
///
/// Forward inputs, in gradient-slot order: `input`, `lengths`, `max_length`.
/// Only `input` is differentiable; `lengths` and `max_length` are structure
/// parameters.
pub struct PackSegmentsOp;

/// Forward inputs for [`PackSegmentsOp`].
pub struct PackSegmentsInputs<'a> {
    /// `[total_length, …]` tensor; the leading dimension concatenates all
    /// segments.
    pub input: &'a Ten64,
    /// One non-negative length per segment, summing to `total_length`.
    pub lengths: &'a TenIdx,
    /// Dense segment size: shorter segments are zero-padded, longer ones
    /// truncated.
    pub max_length: usize,
}

/// State recorded by [`PackSegmentsOp::forward`].
///
/// Gradients w.r.t. `lengths` and `max_length` are never required, so the
/// input tensor itself does not need to be saved.
pub struct PackSegmentsSaved {
    lengths: TenIdx,
    max_length: usize,
    total_length: usize,
}

impl Operator for PackSegmentsOp {
    type Inputs<'a> = PackSegmentsInputs<'a>;
    type Saved = PackSegmentsSaved;

    fn forward(&self, inputs: Self::Inputs<'_>) -> Result<(Ten64, Self::Saved)> {
        let PackSegmentsInputs {
            input,
            lengths,
            max_length,
        } = inputs;
        ensure_same_device(input.device, lengths.device)?;
        if input.shape.is_empty() {
            return Err(OpError::invalid("input must have a leading dimension"));
        }
        let total_length = input.rows();

        let kernel = dispatch::resolve(PACK_SEGMENTS, input.device)?;
        let output = kernel.pack_segments_forward(input, lengths, max_length)?;

        let saved = PackSegmentsSaved {
            lengths: lengths.clone(),
            max_length,
            total_length,
        };
        Ok((output, saved))
    }

    fn backward(&self, saved: Self::Saved, grad_outputs: &[Ten64]) -> Result<GradientTuple> {
        // The engine hands multi-output operators up to two entries here;
        // only the first is meaningful for this single-output op.
        if grad_outputs.is_empty() || grad_outputs.len() > 2 {
            return Err(OpError::invalid(format!(
                "pack_segments backward takes 1 or 2 gradient outputs, got {}",
                grad_outputs.len()
            )));
        }
        let grad = &grad_outputs[0];
        ensure_same_device(grad.device, saved.lengths.device)?;

        let kernel = dispatch::resolve(PACK_SEGMENTS, grad.device)?;
        let grad_input = kernel.pack_segments_backward(
            grad,
            &saved.lengths,
            saved.total_length,
            saved.max_length,
        )?;
        if grad_input.rows() != saved.total_length {
            return Err(OpError::internal(format!(
                "unpacked gradient has {} rows, expected {}",
                grad_input.rows(),
                saved.total_length
            )));
        }

        // Slots: [input, lengths, max_length].
        Ok(vec![Some(grad_input), None, None])
    }
}

/// Packs ragged segments and discards the saved state.
///
/// Convenience wrapper for callers that only need the forward result.
///
/// # Example
///
/// ```
/// use sparse_autograd::operators::pack_segments;
/// use sparse_autograd::tensors::Tensor;
///
/// let input = Tensor::new(vec![3], vec![1.0, 2.0, 3.0]);
/// let lengths = Tensor::new(vec![2], vec![2i64, 1]);
/// let packed = pack_segments(&input, &lengths, 2).unwrap();
/// assert_eq!(packed.shape, vec![2, 2]);
/// assert_eq!(packed.data, vec![1.0, 2.0, 3.0, 0.0]);
/// ```
pub fn pack_segments(input: &Ten64, lengths: &TenIdx, max_length: usize) -> Result<Ten64> {
    PackSegmentsOp
        .forward(PackSegmentsInputs {
            input,
            lengths,
            max_length,
        })
        .map(|(output, _)| output)
}

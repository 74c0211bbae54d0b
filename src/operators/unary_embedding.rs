//! Batched unary embedding lookup, differentiable w.r.t. the weights.
//!
//! Each sample in a batch selects scalar embedding values per table:
//! `table_offsets` delimits table boundaries within the flat `weight`
//! vector, `offsets` delimits per-sample index ranges within `indices`
//! (table-major: slot `t * batch_size + b`), and the output holds one scalar
//! per table per sample, shape `[batch_size, num_tables]`.

use crate::device::ensure_same_device;
use crate::error::{OpError, Result};
use crate::operators::{GradientTuple, Operator};
use crate::ops::dispatch::{self, BATCHED_UNARY_EMBEDDINGS};
use crate::tensors::{Ten64, TenIdx};

/// Per-batch scalar embedding lookup against bucketized table offsets.
///
/// Forward inputs, in gradient-slot order: `weight`, `table_offsets`,
/// `offsets`, `indices`. Only `weight` is differentiable.
pub struct BatchedUnaryEmbeddingOp;

/// Forward inputs for [`BatchedUnaryEmbeddingOp`].
pub struct BatchedUnaryEmbeddingInputs<'a> {
    /// Flat `[sum of table sizes]` embedding values.
    pub weight: &'a Ten64,
    /// `num_tables + 1` boundaries of each table within `weight`.
    pub table_offsets: &'a TenIdx,
    /// `num_tables * batch_size + 1` boundaries of each sample's index range
    /// within `indices`, table-major.
    pub offsets: &'a TenIdx,
    /// Per-table row indices, local to their table.
    pub indices: &'a TenIdx,
}

/// State recorded by [`BatchedUnaryEmbeddingOp::forward`]: all four inputs
/// verbatim. Backward needs the full index structure to know which weight
/// entries received which gradient.
pub struct BatchedUnaryEmbeddingSaved {
    weight: Ten64,
    table_offsets: TenIdx,
    offsets: TenIdx,
    indices: TenIdx,
}

impl Operator for BatchedUnaryEmbeddingOp {
    type Inputs<'a> = BatchedUnaryEmbeddingInputs<'a>;
    type Saved = BatchedUnaryEmbeddingSaved;

    fn forward(&self, inputs: Self::Inputs<'_>) -> Result<(Ten64, Self::Saved)> {
        let BatchedUnaryEmbeddingInputs {
            weight,
            table_offsets,
            offsets,
            indices,
        } = inputs;
        ensure_same_device(weight.device, table_offsets.device)?;
        ensure_same_device(weight.device, offsets.device)?;
        ensure_same_device(weight.device, indices.device)?;

        let kernel = dispatch::resolve(BATCHED_UNARY_EMBEDDINGS, weight.device)?;
        let output =
            kernel.batched_unary_embeddings_forward(weight, table_offsets, offsets, indices)?;

        let saved = BatchedUnaryEmbeddingSaved {
            weight: weight.clone(),
            table_offsets: table_offsets.clone(),
            offsets: offsets.clone(),
            indices: indices.clone(),
        };
        Ok((output, saved))
    }

    fn backward(&self, saved: Self::Saved, grad_outputs: &[Ten64]) -> Result<GradientTuple> {
        if grad_outputs.len() != 1 {
            return Err(OpError::invalid(format!(
                "batched_unary_embeddings backward takes exactly 1 gradient output, got {}",
                grad_outputs.len()
            )));
        }
        let grad = &grad_outputs[0];
        ensure_same_device(grad.device, saved.weight.device)?;

        let kernel = dispatch::resolve(BATCHED_UNARY_EMBEDDINGS, grad.device)?;
        let grad_weight = kernel.batched_unary_embeddings_backward(
            grad,
            &saved.weight,
            &saved.table_offsets,
            &saved.offsets,
            &saved.indices,
        )?;
        if grad_weight.shape != saved.weight.shape {
            return Err(OpError::internal(format!(
                "weight gradient has shape {:?}, expected {:?}",
                grad_weight.shape, saved.weight.shape
            )));
        }

        // Slots: [weight, table_offsets, offsets, indices].
        Ok(vec![Some(grad_weight), None, None, None])
    }
}

/// Runs the batched unary embedding lookup and discards the saved state.
///
/// # Example
///
/// ```
/// use sparse_autograd::operators::lookup_batched_unary_embedding;
/// use sparse_autograd::tensors::Tensor;
///
/// // One table of 3 entries, two samples picking one index each.
/// let weight = Tensor::new(vec![3], vec![10.0, 20.0, 30.0]);
/// let table_offsets = Tensor::new(vec![2], vec![0i64, 3]);
/// let offsets = Tensor::new(vec![3], vec![0i64, 1, 2]);
/// let indices = Tensor::new(vec![2], vec![2i64, 0]);
/// let out =
///     lookup_batched_unary_embedding(&weight, &table_offsets, &offsets, &indices).unwrap();
/// assert_eq!(out.shape, vec![2, 1]);
/// assert_eq!(out.data, vec![30.0, 10.0]);
/// ```
pub fn lookup_batched_unary_embedding(
    weight: &Ten64,
    table_offsets: &TenIdx,
    offsets: &TenIdx,
    indices: &TenIdx,
) -> Result<Ten64> {
    BatchedUnaryEmbeddingOp
        .forward(BatchedUnaryEmbeddingInputs {
            weight,
            table_offsets,
            offsets,
            indices,
        })
        .map(|(output, _)| output)
}

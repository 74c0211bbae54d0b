//! Parallel CPU kernel provider.
//!
//! # CPU Backend
//!
//! This module provides the built-in [`KernelProvider`] implementation for
//! [`Device::Cpu`](crate::device::Device): segment packing/unpacking, sorted row gather,
//! duplicate-summing scatter-add, and the batched unary embedding lookup.
//!
//! ## Features
//!
//! - Parallel execution using [`rayon`](https://docs.rs/rayon)
//! - Deterministic results: every parallel loop writes disjoint output rows,
//!   and duplicate contributions are summed in ascending sorted-index order
//!
//! ## Implemented Kernels
//!
//! - `pack_segments_forward` / `pack_segments_backward`: ragged ↔ dense
//!   padded layout conversion
//! - `index_select`: row gather, with or without a pre-sorted index
//!   permutation
//! - `index_add_with_indices`: scatter-add of gradient rows, summing
//!   duplicates, with an optional consecutive-range fast path
//! - `batched_unary_embeddings_forward` / `_backward`: per-sample scalar
//!   lookup against bucketized table offsets
//!
//! ## Design Goals
//!
//! - Validate everything before touching output buffers, so no partial work
//!   is ever observable on error
//! - Parallelism over disjoint output regions only; no atomics, no locks

use rayon::prelude::*;

use crate::error::{OpError, Result};
use crate::ops::dispatch::KernelProvider;
use crate::tensors::{Ten64, TenIdx, Tensor};

/// The built-in CPU kernel provider.
///
/// A zero-sized type; one static instance is registered for every operation
/// name in the dispatch registry.
pub struct CpuKernels;

/// Checks `lengths` for negatives and returns per-segment start offsets plus
/// the total row count.
fn segment_starts(lengths: &TenIdx) -> Result<(Vec<usize>, usize)> {
    let mut starts = Vec::with_capacity(lengths.numel());
    let mut running = 0usize;
    for (s, &len) in lengths.data.iter().enumerate() {
        if len < 0 {
            return Err(OpError::invalid(format!(
                "segment {s} has negative length {len}"
            )));
        }
        starts.push(running);
        running += len as usize;
    }
    Ok((starts, running))
}

/// Splits `data` into one mutable slice per segment, sized `len * row` each.
///
/// The slices are disjoint by construction, which is what lets the callers
/// fill them from a rayon parallel iterator.
fn split_segments<'a>(
    mut data: &'a mut [f64],
    lengths: &TenIdx,
    row: usize,
) -> Vec<&'a mut [f64]> {
    let mut segments = Vec::with_capacity(lengths.numel());
    for &len in &lengths.data {
        let (head, tail) = std::mem::take(&mut data).split_at_mut(len as usize * row);
        segments.push(head);
        data = tail;
    }
    segments
}

impl KernelProvider for CpuKernels {
    fn pack_segments_forward(
        &self,
        input: &Ten64,
        lengths: &TenIdx,
        max_length: usize,
    ) -> Result<Ten64> {
        let num_segments = lengths.numel();
        let row = input.row_numel();
        let (starts, total) = segment_starts(lengths)?;
        if total != input.rows() {
            return Err(OpError::invalid(format!(
                "lengths sum to {total} but input has {} rows",
                input.rows()
            )));
        }

        let mut out_shape = vec![num_segments, max_length];
        out_shape.extend_from_slice(&input.shape[1..]);
        let mut out = Tensor::zeros(out_shape, input.device);
        let chunk = max_length * row;
        if chunk == 0 || num_segments == 0 {
            return Ok(out);
        }

        out.data
            .par_chunks_mut(chunk)
            .enumerate()
            .for_each(|(s, seg_out)| {
                // Pad short segments with the zeros already there, truncate
                // long ones at max_length.
                let copy = (lengths.data[s] as usize).min(max_length);
                let src = starts[s] * row;
                seg_out[..copy * row].copy_from_slice(&input.data[src..src + copy * row]);
            });

        Ok(out)
    }

    fn pack_segments_backward(
        &self,
        grad_output: &Ten64,
        lengths: &TenIdx,
        total_length: usize,
        max_length: usize,
    ) -> Result<Ten64> {
        let num_segments = lengths.numel();
        if grad_output.shape.len() < 2
            || grad_output.shape[0] != num_segments
            || grad_output.shape[1] != max_length
        {
            return Err(OpError::internal(format!(
                "packed gradient has shape {:?}, expected [{num_segments}, {max_length}, …]",
                grad_output.shape
            )));
        }
        let row: usize = grad_output.shape.iter().skip(2).product();
        let (_, total) = segment_starts(lengths)?;
        if total != total_length {
            return Err(OpError::invalid(format!(
                "lengths sum to {total} but saved total_length is {total_length}"
            )));
        }

        let mut out_shape = vec![total_length];
        out_shape.extend_from_slice(&grad_output.shape[2..]);
        let mut out = Tensor::zeros(out_shape, grad_output.device);
        if row == 0 || num_segments == 0 {
            return Ok(out);
        }

        // Rows a segment lost to truncation keep their zero gradient, and
        // padding rows of grad_output are never read.
        split_segments(&mut out.data, lengths, row)
            .into_par_iter()
            .enumerate()
            .for_each(|(s, seg_grad)| {
                let copy = (lengths.data[s] as usize).min(max_length);
                let src = s * max_length * row;
                seg_grad[..copy * row]
                    .copy_from_slice(&grad_output.data[src..src + copy * row]);
            });

        Ok(out)
    }

    fn index_select(
        &self,
        input: &Ten64,
        indices: &TenIdx,
        orig_indices: Option<&TenIdx>,
        indices_sorted: bool,
    ) -> Result<Ten64> {
        let n = indices.numel();
        let row = input.row_numel();
        let in_rows = input.rows();
        for &idx in &indices.data {
            if idx < 0 || idx as usize >= in_rows {
                return Err(OpError::invalid(format!(
                    "index {idx} out of bounds for input with {in_rows} rows"
                )));
            }
        }

        let mut out_shape = vec![n];
        out_shape.extend_from_slice(&input.shape[1..]);
        let mut out = Tensor::zeros(out_shape, input.device);
        if n == 0 || row == 0 {
            return Ok(out);
        }

        // Output row j must equal input[original_indices[j]] either way; the
        // sorted path just changes the order input rows are visited in.
        let source_row: Vec<usize> = if indices_sorted {
            let orig = orig_indices.ok_or_else(|| {
                OpError::internal("sorted gather called without its original-position permutation")
            })?;
            if orig.numel() != n {
                return Err(OpError::internal(format!(
                    "permutation has {} entries for {n} indices",
                    orig.numel()
                )));
            }
            let mut by_output = vec![0usize; n];
            for (i, &o) in orig.data.iter().enumerate() {
                let o = o as usize;
                if o >= n {
                    return Err(OpError::internal(format!(
                        "permutation entry {o} out of bounds for {n} indices"
                    )));
                }
                by_output[o] = indices.data[i] as usize;
            }
            by_output
        } else {
            indices.data.iter().map(|&idx| idx as usize).collect()
        };

        out.data
            .par_chunks_mut(row)
            .enumerate()
            .for_each(|(j, dst)| {
                let src = source_row[j] * row;
                dst.copy_from_slice(&input.data[src..src + row]);
            });

        Ok(out)
    }

    fn index_add_with_indices(
        &self,
        grad_output: &Ten64,
        sorted_indices: &TenIdx,
        orig_indices: &TenIdx,
        input_shape: &[usize],
        range_start: usize,
        range_length: usize,
    ) -> Result<Ten64> {
        let n = sorted_indices.numel();
        let rows = *input_shape
            .first()
            .ok_or_else(|| OpError::internal("saved input shape is empty"))?;
        let row: usize = input_shape.iter().skip(1).product();
        if orig_indices.numel() != n {
            return Err(OpError::internal(format!(
                "permutation has {} entries for {n} indices",
                orig_indices.numel()
            )));
        }
        if grad_output.numel() != n * row {
            return Err(OpError::internal(format!(
                "gradient has {} elements, expected {} for {n} selected rows",
                grad_output.numel(),
                n * row
            )));
        }
        if n > 0 {
            let first = sorted_indices.data[0];
            let last = sorted_indices.data[n - 1];
            if first < 0 || last as usize >= rows {
                return Err(OpError::invalid(format!(
                    "indices span [{first}, {last}] out of bounds for {rows} rows"
                )));
            }
            if range_length > 0
                && ((first as usize) < range_start
                    || last as usize >= range_start + range_length)
            {
                return Err(OpError::invalid(format!(
                    "indices span [{first}, {last}] outside hinted range \
                     [{range_start}, {})",
                    range_start + range_length
                )));
            }
        }

        let mut out = Tensor::zeros(input_shape.to_vec(), grad_output.device);
        if n == 0 || row == 0 || rows == 0 {
            return Ok(out);
        }

        // The hint only narrows which destination rows get scanned; rows
        // outside it provably have no contributions after the check above.
        let (scan_start, scan_end) = if range_length > 0 {
            (range_start, (range_start + range_length).min(rows))
        } else {
            (0, rows)
        };

        let sorted = &sorted_indices.data;
        out.data
            .par_chunks_mut(row)
            .enumerate()
            .for_each(|(k, dst)| {
                if k < scan_start || k >= scan_end {
                    return;
                }
                // All occurrences of destination k form one contiguous run of
                // the sorted indices; summing the run in ascending order
                // makes duplicate accumulation deterministic.
                let k = k as i64;
                let lo = sorted.partition_point(|&v| v < k);
                let hi = sorted.partition_point(|&v| v <= k);
                for i in lo..hi {
                    let src = orig_indices.data[i] as usize * row;
                    for (d, &g) in dst.iter_mut().zip(&grad_output.data[src..src + row]) {
                        *d += g;
                    }
                }
            });

        Ok(out)
    }

    fn batched_unary_embeddings_forward(
        &self,
        weight: &Ten64,
        table_offsets: &TenIdx,
        offsets: &TenIdx,
        indices: &TenIdx,
    ) -> Result<Ten64> {
        let layout = UnaryEmbeddingLayout::check(weight, table_offsets, offsets, indices)?;
        let (num_tables, batch_size) = (layout.num_tables, layout.batch_size);

        let mut out = Tensor::zeros(vec![batch_size, num_tables], weight.device);
        if batch_size == 0 {
            return Ok(out);
        }

        out.data
            .par_chunks_mut(num_tables)
            .enumerate()
            .for_each(|(b, sample_out)| {
                for (t, slot) in sample_out.iter_mut().enumerate() {
                    let base = table_offsets.data[t] as usize;
                    let lo = offsets.data[t * batch_size + b] as usize;
                    let hi = offsets.data[t * batch_size + b + 1] as usize;
                    *slot = indices.data[lo..hi]
                        .iter()
                        .map(|&idx| weight.data[base + idx as usize])
                        .sum();
                }
            });

        Ok(out)
    }

    fn batched_unary_embeddings_backward(
        &self,
        grad_output: &Ten64,
        weight: &Ten64,
        table_offsets: &TenIdx,
        offsets: &TenIdx,
        indices: &TenIdx,
    ) -> Result<Ten64> {
        let layout = UnaryEmbeddingLayout::check(weight, table_offsets, offsets, indices)?;
        let (num_tables, batch_size) = (layout.num_tables, layout.batch_size);
        if grad_output.numel() != batch_size * num_tables {
            return Err(OpError::internal(format!(
                "gradient has {} elements, expected {} ({batch_size} samples × \
                 {num_tables} tables)",
                grad_output.numel(),
                batch_size * num_tables
            )));
        }

        let mut out = Tensor::zeros(weight.shape.clone(), weight.device);

        // Tables own disjoint spans of the weight vector, so the scatter-add
        // parallelizes over tables with no shared destinations. Within a
        // table the loop order is fixed, keeping duplicate summation
        // deterministic.
        let first = table_offsets.data[0] as usize;
        let mut table_spans = Vec::with_capacity(num_tables);
        let mut rest = &mut out.data[first..];
        for t in 0..num_tables {
            let size = (table_offsets.data[t + 1] - table_offsets.data[t]) as usize;
            let (head, tail) = std::mem::take(&mut rest).split_at_mut(size);
            table_spans.push(head);
            rest = tail;
        }

        table_spans
            .into_par_iter()
            .enumerate()
            .for_each(|(t, span)| {
                for b in 0..batch_size {
                    let g = grad_output.data[b * num_tables + t];
                    let lo = offsets.data[t * batch_size + b] as usize;
                    let hi = offsets.data[t * batch_size + b + 1] as usize;
                    for &idx in &indices.data[lo..hi] {
                        span[idx as usize] += g;
                    }
                }
            });

        Ok(out)
    }
}

/// Validated layout of one batched unary embedding call.
struct UnaryEmbeddingLayout {
    num_tables: usize,
    batch_size: usize,
}

impl UnaryEmbeddingLayout {
    /// Validates table/offset/index structure up front so the parallel loops
    /// can index without further checks.
    fn check(
        weight: &Ten64,
        table_offsets: &TenIdx,
        offsets: &TenIdx,
        indices: &TenIdx,
    ) -> Result<Self> {
        if weight.shape.len() != 1 {
            return Err(OpError::invalid(format!(
                "weight must be one-dimensional, got shape {:?}",
                weight.shape
            )));
        }
        let num_tables = table_offsets
            .numel()
            .checked_sub(1)
            .filter(|&t| t > 0)
            .ok_or_else(|| {
                OpError::invalid("table_offsets must delimit at least one table")
            })?;
        if table_offsets.data[0] < 0
            || table_offsets.data.windows(2).any(|w| w[1] < w[0])
            || table_offsets.data[num_tables] as usize > weight.numel()
        {
            return Err(OpError::invalid(format!(
                "table_offsets {:?} do not partition a weight of {} entries",
                table_offsets.data,
                weight.numel()
            )));
        }

        let slots = offsets.numel().checked_sub(1).ok_or_else(|| {
            OpError::invalid("offsets must contain at least one boundary")
        })?;
        if slots % num_tables != 0 {
            return Err(OpError::invalid(format!(
                "{slots} offset ranges do not divide across {num_tables} tables"
            )));
        }
        let batch_size = slots / num_tables;
        if offsets.data[0] < 0
            || offsets.data.windows(2).any(|w| w[1] < w[0])
            || offsets.data[slots] as usize > indices.numel()
        {
            return Err(OpError::invalid(format!(
                "offsets do not partition an index list of {} entries",
                indices.numel()
            )));
        }

        for t in 0..num_tables {
            let table_size = (table_offsets.data[t + 1] - table_offsets.data[t]) as usize;
            let lo = offsets.data[t * batch_size] as usize;
            let hi = offsets.data[(t + 1) * batch_size] as usize;
            for &idx in &indices.data[lo..hi] {
                if idx < 0 || idx as usize >= table_size {
                    return Err(OpError::invalid(format!(
                        "index {idx} out of bounds for table {t} of size {table_size}"
                    )));
                }
            }
        }

        Ok(Self {
            num_tables,
            batch_size,
        })
    }
}

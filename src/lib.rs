//! sparse_autograd: differentiable sparse-data operators in Rust.
//!
//! A small layer of custom forward/backward operator pairs bridging a
//! reverse-mode automatic-differentiation engine with specialized
//! sparse-data numeric kernels: ragged segment packing, index-select with a
//! locality-sorting gather and duplicate-summing scatter-add, and batched
//! unary embedding lookup.
//!
//! # Features
//!
//! - Strongly-typed per-operator saved state instead of a string-keyed
//!   autograd context — the missing-key failure mode is gone at compile time.
//! - An immutable `(operation name, device)` kernel registry; the built-in
//!   CPU provider runs on `rayon`, external providers register per device.
//! - Explicit gradient tuples: one slot per forward input, with `None`
//!   marking non-differentiable inputs.
//!
//! # Goals
//!
//! - Get the save/restore contract, index-sorting optimizations, and
//!   duplicate-index accumulation exactly right — that is where wrong
//!   gradients, shape mismatches, and non-determinism hide.
//! - Keep the operator layer synchronous and lock-free; parallelism lives
//!   inside kernel calls and joins before they return.
//!
//! # Modules
//!
//! - [`tensors`] — Core tensor handle: shape, row-major data, device tag.
//! - [`operators`] — The differentiable operator layer.
//! - [`ops`] — Kernel providers and the dispatch registry.
//! - [`device`] — Device tags and residency checks.
//! - [`error`] — The error taxonomy of the layer.
//!
//! # Example
//!
//! ```rust
//! use sparse_autograd::operators::{IndexSelectInputs, IndexSelectOp, Operator};
//! use sparse_autograd::tensor;
//! use sparse_autograd::tensors::Tensor;
//!
//! let input = tensor!([[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]]);
//! let indices = Tensor::new(vec![3], vec![2i64, 0, 2]);
//!
//! let (output, saved) = IndexSelectOp
//!     .forward(IndexSelectInputs {
//!         input: &input,
//!         indices: &indices,
//!         consecutive_range_start: 0,
//!         consecutive_range_length: 0,
//!         skip_sort: false,
//!     })
//!     .unwrap();
//! assert_eq!(output.data, vec![5.0, 6.0, 1.0, 2.0, 5.0, 6.0]);
//!
//! let grad_output = tensor!([[1.0, 1.0], [1.0, 1.0], [1.0, 1.0]]);
//! let grads = IndexSelectOp.backward(saved, &[grad_output]).unwrap();
//! // Duplicate index 2 accumulated by summation.
//! assert_eq!(grads[0].as_ref().unwrap().data[4..6], [2.0, 2.0]);
//! ```

pub mod device;
pub mod error;
pub mod operators;
pub mod ops;
pub mod tensors;

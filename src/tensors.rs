//! Core tensor data structures.
//!
//! This module defines the minimal multi-dimensional array handle the
//! operator layer works against: a shape, flat row-major data, and a device
//! tag. Operators only read and produce these handles; they never mutate a
//! tensor after it has been saved for backward.
//!
//! ## Design Highlights
//! - Tensors are strongly typed: `Tensor<T>` for any element type
//!   (`f64` for values, `i64` for indices, lengths, and offsets)
//! - Shape is stored as a `Vec<usize>` and enforced at construction
//! - Every tensor carries a [`Device`] tag used for dispatch and
//!   device-residency checks
//! - The `tensor!` macro supports ergonomic tensor creation from nested
//!   arrays in tests and examples
//!
//! ## Limitations
//! - Row-major only
//! - No broadcasting, slicing, or shape inference
//!
//! ## Example
//!
//! ```rust
//! use sparse_autograd::tensors::Tensor;
//! let t = Tensor::new(vec![2, 3], vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
//! assert_eq!(t.shape, vec![2, 3]);
//! assert_eq!(t.row_numel(), 3);
//! ```

use crate::device::Device;

/// Value tensor element convention of this crate.
pub type Ten64 = Tensor<f64>;

/// Index/length/offset tensor convention of this crate.
pub type TenIdx = Tensor<i64>;

/// Represents an N-dimensional tensor with a shape, flat row-major data, and
/// a device tag.
///
/// - All elements must be the same type (`T`).
/// - `shape` defines the structure, e.g., `[2, 3]` for a 2×3 matrix.
/// - `data` holds the flattened content in row-major order.
/// - `device` names where the data resides; see [`Device`].
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor<T> {
    pub shape: Vec<usize>,
    pub data: Vec<T>,
    pub device: Device,
}

impl<T> Tensor<T> {
    /// Creates a new CPU tensor with the given shape and flat data.
    ///
    /// # Panics
    /// Panics if the number of elements in `data` does not match the shape
    /// product.
    pub fn new(shape: impl Into<Vec<usize>>, data: Vec<T>) -> Self {
        let shape = shape.into();
        assert_eq!(
            shape.iter().product::<usize>(),
            data.len(),
            "shape {:?} is incompatible with {} data elements",
            shape,
            data.len()
        );
        Self {
            shape,
            data,
            device: Device::Cpu,
        }
    }

    /// Re-tags this tensor as residing on `device`.
    ///
    /// The data itself is not moved; this crate's built-in kernels only serve
    /// [`Device::Cpu`], so other tags are useful for dispatch tests and for
    /// handles produced by external providers.
    #[must_use]
    pub fn with_device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    /// Total number of elements.
    pub fn numel(&self) -> usize {
        self.shape.iter().product()
    }

    /// Size of the leading dimension, or 0 for a zero-dimensional tensor.
    pub fn rows(&self) -> usize {
        self.shape.first().copied().unwrap_or(0)
    }

    /// Number of elements in one leading-dimension row: the product of all
    /// trailing dimensions (1 for a one-dimensional tensor).
    pub fn row_numel(&self) -> usize {
        self.shape.iter().skip(1).product()
    }
}

impl<T: Clone + Default> Tensor<T> {
    /// Creates a zero-filled tensor of the given shape on `device`.
    pub fn zeros(shape: impl Into<Vec<usize>>, device: Device) -> Self {
        let shape = shape.into();
        let numel = shape.iter().product();
        Self {
            shape,
            data: vec![T::default(); numel],
            device,
        }
    }
}

/// Defines a tensor from nested literal arrays.
///
/// Supports arbitrary dimensionality as long as sublists are uniform in
/// shape. The result is a CPU tensor; re-tag with
/// [`Tensor::with_device`](crate::tensors::Tensor::with_device) if needed.
///
/// # Example
/// ```
/// use sparse_autograd::tensor;
/// let t = tensor!([[1.0, 2.0], [3.0, 4.0]]);
/// assert_eq!(t.shape, vec![2, 2]);
/// ```
#[macro_export]
macro_rules! tensor {
    ($lit:literal) => {
        $crate::tensors::Tensor::new(Vec::<usize>::new(), vec![$lit])
    };

    ([ $( $inner:tt ),+ $(,)? ]) => {{
        let children = vec![ $( tensor!($inner) ),+ ];
        let first_shape = &children[0].shape;
        assert!(children.iter().all(|c| c.shape == *first_shape),
            "ragged tensor literal (rows have mismatched shapes)");
        let mut shape = vec![children.len()];
        shape.extend_from_slice(first_shape);
        let mut data = Vec::with_capacity(children.len() * children[0].data.len());
        for c in children { data.extend(c.data); }
        $crate::tensors::Tensor::new(shape, data)
    }};
}

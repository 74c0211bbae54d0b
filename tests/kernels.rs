use rand::prelude::*;
use sparse_autograd::device::Device;
use sparse_autograd::error::OpError;
use sparse_autograd::operators::{
    index_select_dim0, lookup_batched_unary_embedding, pack_segments, sort_permutation,
    IndexSelectInputs, IndexSelectOp, Operator,
};
use sparse_autograd::tensors::Tensor;

#[test]
fn test_sort_permutation_reconstructs_original_indices() {
    let indices = Tensor::new(vec![7], vec![5i64, 2, 5, 0, 2, 2, 9]);
    let (sorted, orig) = sort_permutation(&indices);

    assert_eq!(sorted.data, vec![0, 2, 2, 2, 5, 5, 9]);
    // Gathering sorted through orig must rebuild the original order exactly.
    let mut rebuilt = vec![0i64; indices.numel()];
    for (i, &o) in orig.data.iter().enumerate() {
        rebuilt[o as usize] = sorted.data[i];
    }
    assert_eq!(rebuilt, indices.data);
}

#[test]
fn test_sort_permutation_is_deterministic_for_duplicates() {
    let indices = Tensor::new(vec![5], vec![3i64, 3, 3, 1, 1]);
    let first = sort_permutation(&indices);
    let second = sort_permutation(&indices);
    assert_eq!(first.0.data, second.0.data);
    assert_eq!(first.1.data, second.1.data);
}

/// Naive sequential scatter-add reference for the randomized check.
fn scatter_add_reference(
    indices: &[i64],
    grad_output: &[f64],
    rows: usize,
    row: usize,
) -> Vec<f64> {
    let mut out = vec![0.0; rows * row];
    for (i, &k) in indices.iter().enumerate() {
        let k = k as usize;
        for c in 0..row {
            out[k * row + c] += grad_output[i * row + c];
        }
    }
    out
}

#[test]
fn test_randomized_scatter_add_matches_reference() {
    let mut rng = rand::rng();
    for _ in 0..20 {
        let rows = rng.random_range(1..12);
        let row = rng.random_range(1..4);
        let n = rng.random_range(0..24);

        let idx_data: Vec<i64> = (0..n).map(|_| rng.random_range(0..rows) as i64).collect();
        let grad_data: Vec<f64> = (0..n * row).map(|_| rng.random_range(-4..4) as f64).collect();

        let input = Tensor::new(vec![rows, row], vec![0.0; rows * row]);
        let indices = Tensor::new(vec![n], idx_data.clone());
        let grad_output = Tensor::new(vec![n, row], grad_data.clone());

        for (start, length) in [(0, 0), (0, rows)] {
            let (_, saved) = IndexSelectOp
                .forward(IndexSelectInputs {
                    input: &input,
                    indices: &indices,
                    consecutive_range_start: start,
                    consecutive_range_length: length,
                    skip_sort: false,
                })
                .unwrap();
            let grads = IndexSelectOp.backward(saved, &[grad_output.clone()]).unwrap();
            let expected = scatter_add_reference(&idx_data, &grad_data, rows, row);
            assert_eq!(grads[0].as_ref().unwrap().data, expected);
        }
    }
}

#[test]
fn test_pack_segments_rejects_bad_lengths() {
    let input = Tensor::new(vec![4], vec![1.0; 4]);

    let wrong_sum = Tensor::new(vec![2], vec![1i64, 2]);
    assert!(matches!(
        pack_segments(&input, &wrong_sum, 2),
        Err(OpError::InvalidArgument(_))
    ));

    let negative = Tensor::new(vec![2], vec![-1i64, 5]);
    assert!(matches!(
        pack_segments(&input, &negative, 2),
        Err(OpError::InvalidArgument(_))
    ));
}

#[test]
fn test_index_select_rejects_out_of_bounds_index() {
    let input = Tensor::new(vec![3, 1], vec![1.0, 2.0, 3.0]);
    let indices = Tensor::new(vec![2], vec![0i64, 3]);
    assert!(matches!(
        index_select_dim0(&input, &indices, None, None, None),
        Err(OpError::InvalidArgument(_))
    ));

    let negative = Tensor::new(vec![1], vec![-1i64]);
    assert!(matches!(
        index_select_dim0(&input, &negative, None, None, None),
        Err(OpError::InvalidArgument(_))
    ));
}

#[test]
fn test_index_select_rejects_violated_range_hint() {
    let input = Tensor::new(vec![6, 1], vec![0.0; 6]);
    let indices = Tensor::new(vec![2], vec![0i64, 5]);
    let (_, saved) = IndexSelectOp
        .forward(IndexSelectInputs {
            input: &input,
            indices: &indices,
            consecutive_range_start: 1,
            consecutive_range_length: 2,
            skip_sort: false,
        })
        .unwrap();

    let grad_output = Tensor::new(vec![2, 1], vec![1.0, 1.0]);
    assert!(matches!(
        IndexSelectOp.backward(saved, &[grad_output]),
        Err(OpError::InvalidArgument(_))
    ));
}

#[test]
fn test_unregistered_device_is_rejected() {
    let input = Tensor::new(vec![2, 1], vec![1.0, 2.0]).with_device(Device::Cuda);
    let indices = Tensor::new(vec![1], vec![0i64]).with_device(Device::Cuda);
    assert!(matches!(
        index_select_dim0(&input, &indices, None, None, None),
        Err(OpError::InvalidArgument(_))
    ));
}

#[test]
fn test_unary_embedding_rejects_malformed_offsets() {
    let weight = Tensor::new(vec![4], vec![1.0; 4]);
    let table_offsets = Tensor::new(vec![3], vec![0i64, 2, 4]);
    let indices = Tensor::new(vec![2], vec![0i64, 1]);

    // 3 ranges cannot divide across 2 tables.
    let ragged = Tensor::new(vec![4], vec![0i64, 1, 1, 2]);
    assert!(matches!(
        lookup_batched_unary_embedding(&weight, &table_offsets, &ragged, &indices),
        Err(OpError::InvalidArgument(_))
    ));

    // Non-monotonic offsets.
    let backwards = Tensor::new(vec![3], vec![0i64, 2, 1]);
    assert!(matches!(
        lookup_batched_unary_embedding(&weight, &table_offsets, &backwards, &indices),
        Err(OpError::InvalidArgument(_))
    ));
}

#[test]
fn test_unary_embedding_rejects_index_outside_table() {
    let weight = Tensor::new(vec![4], vec![1.0; 4]);
    let table_offsets = Tensor::new(vec![3], vec![0i64, 2, 4]);
    let offsets = Tensor::new(vec![3], vec![0i64, 1, 2]);
    // Table 0 has size 2; local index 2 overruns it.
    let indices = Tensor::new(vec![2], vec![2i64, 0]);
    assert!(matches!(
        lookup_batched_unary_embedding(&weight, &table_offsets, &offsets, &indices),
        Err(OpError::InvalidArgument(_))
    ));
}

#[test]
fn test_pack_segments_empty_segments_are_all_padding() {
    let input = Tensor::new(vec![2], vec![1.0, 2.0]);
    let lengths = Tensor::new(vec![3], vec![0i64, 2, 0]);
    let packed = pack_segments(&input, &lengths, 2).unwrap();
    assert_eq!(packed.shape, vec![3, 2]);
    assert_eq!(packed.data, vec![0.0, 0.0, 1.0, 2.0, 0.0, 0.0]);
}

#[test]
fn test_index_select_empty_indices() {
    let input = Tensor::new(vec![3, 2], vec![0.0; 6]);
    let indices = Tensor::new(vec![0], Vec::new());
    let (output, saved) = IndexSelectOp
        .forward(IndexSelectInputs {
            input: &input,
            indices: &indices,
            consecutive_range_start: 0,
            consecutive_range_length: 0,
            skip_sort: false,
        })
        .unwrap();
    assert_eq!(output.shape, vec![0, 2]);

    let grad_output = Tensor::new(vec![0, 2], Vec::new());
    let grads = IndexSelectOp.backward(saved, &[grad_output]).unwrap();
    assert_eq!(grads[0].as_ref().unwrap().data, vec![0.0; 6]);
}

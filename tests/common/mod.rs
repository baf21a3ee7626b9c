//! Common test utilities for quantile-hist integration tests.

#![allow(dead_code)]

use quantile_hist::*;
use rand::prelude::*;

/// Initialize logging once for a test binary.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Upper bounds `b + 0.5` for `num_bins` bins, so bin `b` holds the raw value `b`.
pub fn unit_bounds(num_bins: usize) -> Vec<f64> {
    (0..num_bins).map(|b| b as f64 + 0.5).collect()
}

/// The 8-row, 2-feature matrix and gradients of the reference scenario.
pub fn golden_data() -> (QuantizedMatrix, Vec<GradientPair>) {
    let f0 = [0, 0, 1, 1, 2, 2, 3, 3].iter().map(|&b| Some(b)).collect();
    let f1 = [0, 1, 0, 1, 0, 1, 0, 1].iter().map(|&b| Some(b)).collect();
    let matrix =
        QuantizedMatrix::from_column_bins(8, vec![f0, f1], vec![unit_bounds(4), unit_bounds(2)], 0.2)
            .unwrap();
    let gradients = [-3.0, -1.0, -2.0, 0.5, 1.0, 2.0, 2.5, 4.0]
        .iter()
        .map(|&g| GradientPair::new(g, 1.0))
        .collect();
    (matrix, gradients)
}

/// Random binned matrix with a few missing values.
pub fn random_matrix(
    rng: &mut StdRng,
    num_rows: usize,
    num_features: usize,
    num_bins: usize,
    missing_rate: f64,
) -> QuantizedMatrix {
    let columns = (0..num_features)
        .map(|_| {
            (0..num_rows)
                .map(|_| {
                    if rng.gen_bool(missing_rate) {
                        None
                    } else {
                        Some(rng.gen_range(0..num_bins as BinIndex))
                    }
                })
                .collect()
        })
        .collect();
    QuantizedMatrix::from_column_bins(
        num_rows,
        columns,
        vec![unit_bounds(num_bins); num_features],
        0.2,
    )
    .unwrap()
}

/// Gradients that depend on the first two features plus noise.
pub fn signal_gradients(rng: &mut StdRng, matrix: &QuantizedMatrix) -> Vec<GradientPair> {
    (0..matrix.num_rows() as RowIndex)
        .map(|row| {
            let mut g = rng.gen_range(-0.3..0.3);
            if let Some(bin) = matrix.bin(row, 0) {
                g += bin as f32 * 0.5 - 2.0;
            }
            if matrix.num_features() > 1 && matrix.bin(row, 1).map_or(false, |b| b % 2 == 0) {
                g -= 1.5;
            }
            GradientPair::new(g, rng.gen_range(0.5..1.5))
        })
        .collect()
}

/// Nodes visited by `row` from the root to its leaf.
pub fn path_of(tree: &RegTree, matrix: &QuantizedMatrix, row: RowIndex) -> Vec<NodeIndex> {
    let mut path = vec![0];
    let mut index = 0;
    while let Some(node) = tree.node(index) {
        let (split, left, right) = match (node.split(), node.left_child(), node.right_child()) {
            (Some(split), Some(left), Some(right)) => (split, left, right),
            _ => break,
        };
        index = if split.goes_left(matrix.bin(row, split.feature)) {
            left
        } else {
            right
        };
        path.push(index);
    }
    path
}

/// Gradient statistics of every node recomputed from the rows reaching it.
pub fn node_stats_from_rows(
    tree: &RegTree,
    matrix: &QuantizedMatrix,
    gradients: &[GradientPair],
    rows: impl Iterator<Item = RowIndex>,
) -> Vec<GradStats> {
    let mut stats = vec![GradStats::default(); tree.num_nodes()];
    for row in rows {
        for node in path_of(tree, matrix, row) {
            stats[node].add_pair(gradients[row as usize]);
        }
    }
    stats
}

/// Relative closeness for accumulated sums.
pub fn close(a: f64, b: f64, tolerance: f64) -> bool {
    (a - b).abs() <= tolerance * (1.0 + a.abs().max(b.abs()))
}

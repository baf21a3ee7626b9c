//! End-to-end growth tests for the quantile histogram grower.

mod common;

use approx::assert_abs_diff_eq;
use common::*;
use quantile_hist::*;
use rand::prelude::*;
use std::collections::BTreeSet;

fn golden_param(policy: GrowPolicy) -> ConfigBuilder {
    ConfigBuilder::new()
        .grow_policy(policy)
        .learning_rate(1.0)
        .reg_lambda(1.0)
        .min_split_loss(0.0)
        .min_child_weight(1.0)
}

fn assert_golden_tree(tree: &RegTree) {
    assert_eq!(tree.num_nodes(), 5);
    assert_eq!(tree.num_leaves(), 3);

    let root = tree.root();
    let split = root.split().unwrap();
    assert_eq!((split.feature, split.split_bin), (0, 1));
    assert_eq!(split.threshold, 1.5);
    assert_eq!((root.left_child(), root.right_child()), (Some(1), Some(2)));
    assert_abs_diff_eq!(root.gain(), 11.161111111111111, epsilon = 1e-9);

    let node1 = tree.node(1).unwrap();
    let split = node1.split().unwrap();
    assert_eq!((split.feature, split.split_bin), (1, 0));
    assert_eq!((node1.left_child(), node1.right_child()), (Some(3), Some(4)));
    assert_abs_diff_eq!(node1.gain(), 1.1833333333333333, epsilon = 1e-9);

    assert!(tree.is_leaf(2));
    assert_abs_diff_eq!(tree.node(2).unwrap().leaf_value().unwrap(), -1.9, epsilon = 1e-6);
    assert_abs_diff_eq!(tree.node(3).unwrap().leaf_value().unwrap(), 5.0 / 3.0, epsilon = 1e-6);
    assert_abs_diff_eq!(tree.node(4).unwrap().leaf_value().unwrap(), 1.0 / 6.0, epsilon = 1e-6);
}

#[test]
fn test_golden_depthwise() {
    init_logging();
    let (matrix, gradients) = golden_data();
    let param = golden_param(GrowPolicy::DepthWise).max_depth(2).build().unwrap();
    let mut maker = QuantileHistMaker::new(param).unwrap();
    let grown = maker.grow_tree(&gradients, &matrix).unwrap();

    assert_golden_tree(&grown.tree);
    assert_eq!(grown.positions.leaves(), &[3, 4, 3, 4, 2, 2, 2, 2]);
    grown.tree.validate().unwrap();
}

#[test]
fn test_golden_lossguide() {
    let (matrix, gradients) = golden_data();
    let param = golden_param(GrowPolicy::LossGuide)
        .max_depth(6)
        .max_leaves(3)
        .build()
        .unwrap();
    let mut maker = QuantileHistMaker::new(param).unwrap();
    let grown = maker.grow_tree(&gradients, &matrix).unwrap();
    assert_golden_tree(&grown.tree);

    let param = golden_param(GrowPolicy::LossGuide)
        .max_leaves(2)
        .build()
        .unwrap();
    let mut maker = QuantileHistMaker::new(param).unwrap();
    let grown = maker.grow_tree(&gradients, &matrix).unwrap();
    assert_eq!(grown.tree.num_leaves(), 2);
    assert_eq!(grown.positions.leaves(), &[1, 1, 1, 1, 2, 2, 2, 2]);
}

#[test]
fn test_structure_limits() {
    let mut rng = StdRng::seed_from_u64(1);
    let matrix = random_matrix(&mut rng, 3_000, 6, 16, 0.05);
    let gradients = signal_gradients(&mut rng, &matrix);

    let param = ConfigBuilder::new().max_depth(3).min_child_weight(0.0).build().unwrap();
    let grown = QuantileHistMaker::new(param)
        .unwrap()
        .grow_tree(&gradients, &matrix)
        .unwrap();
    assert!(grown.tree.depth() <= 3);
    assert!(grown.tree.num_leaves() > 2);

    let param = ConfigBuilder::new()
        .grow_policy(GrowPolicy::LossGuide)
        .max_depth(10)
        .max_leaves(5)
        .build()
        .unwrap();
    let grown = QuantileHistMaker::new(param)
        .unwrap()
        .grow_tree(&gradients, &matrix)
        .unwrap();
    assert_eq!(grown.tree.num_leaves(), 5);
}

#[test]
fn test_depthwise_resolves_levels_in_order() {
    let mut rng = StdRng::seed_from_u64(2);
    let matrix = random_matrix(&mut rng, 2_000, 5, 12, 0.1);
    let gradients = signal_gradients(&mut rng, &matrix);

    for batch in [1, 3, 256] {
        let param = ConfigBuilder::new()
            .max_depth(5)
            .max_node_batch_size(batch)
            .min_child_weight(0.0)
            .build()
            .unwrap();
        let grown = QuantileHistMaker::new(param)
            .unwrap()
            .grow_tree(&gradients, &matrix)
            .unwrap();

        // Nodes are created in expansion order, so depth never decreases with the id.
        let depths: Vec<u32> = grown.tree.nodes().map(|(_, n)| n.depth()).collect();
        assert!(depths.windows(2).all(|w| w[0] <= w[1]), "batch {}", batch);
    }
}

#[test]
fn test_leaf_stats_match_rows() {
    let mut rng = StdRng::seed_from_u64(3);
    let matrix = random_matrix(&mut rng, 10_000, 4, 32, 0.05);
    let gradients = signal_gradients(&mut rng, &matrix);

    let param = ConfigBuilder::new().max_depth(6).build().unwrap();
    let grown = QuantileHistMaker::new(param)
        .unwrap()
        .grow_tree(&gradients, &matrix)
        .unwrap();

    let recomputed = node_stats_from_rows(&grown.tree, &matrix, &gradients, 0..10_000);
    for (index, node) in grown.tree.nodes() {
        let stats = node.stats();
        assert!(close(stats.sum_grad, recomputed[index].sum_grad, 1e-9), "node {}", index);
        assert!(close(stats.sum_hess, recomputed[index].sum_hess, 1e-9), "node {}", index);
    }

    for row in 0..10_000 {
        assert_eq!(grown.positions.leaf(row), grown.tree.leaf_for_row(&matrix, row));
    }
}

#[test]
fn test_thread_count_does_not_change_the_tree() {
    let mut rng = StdRng::seed_from_u64(4);
    let matrix = random_matrix(&mut rng, 20_000, 8, 64, 0.05);
    let gradients = signal_gradients(&mut rng, &matrix);

    let grow = |nthread: usize| {
        let param = ConfigBuilder::new()
            .max_depth(6)
            .subsample(0.8)
            .colsample_bynode(0.7)
            .seed(9)
            .nthread(nthread)
            .build()
            .unwrap();
        QuantileHistMaker::new(param)
            .unwrap()
            .grow_tree(&gradients, &matrix)
            .unwrap()
    };

    let single = grow(1);
    let multi = grow(4);
    assert_eq!(single.tree, multi.tree);
    assert_eq!(single.positions, multi.positions);
}

#[test]
fn test_monotone_increasing_is_respected() {
    let mut rng = StdRng::seed_from_u64(5);
    let matrix = random_matrix(&mut rng, 4_000, 3, 10, 0.0);
    // The fitted output falls with feature 0, so an increasing constraint has to fight it.
    let gradients: Vec<GradientPair> = (0..4_000)
        .map(|row| {
            let bin = matrix.bin(row, 0).unwrap_or(0) as f32;
            let other = matrix.bin(row, 1).unwrap_or(0) as f32;
            GradientPair::new(bin - 4.5 + (other - 4.5) * 0.3 + rng.gen_range(-2.0..2.0), 1.0)
        })
        .collect();

    let param = ConfigBuilder::new()
        .max_depth(5)
        .monotone_constraints(vec![1, 0, 0])
        .build()
        .unwrap();
    let grown = QuantileHistMaker::new(param)
        .unwrap()
        .grow_tree(&gradients, &matrix)
        .unwrap();
    let tree = &grown.tree;

    for f1 in 0..10 {
        for f2 in 0..10 {
            let mut previous = f32::NEG_INFINITY;
            for f0 in 0..10 {
                let row = ndarray::arr1(&[f0 as f32, f1 as f32, f2 as f32]);
                let value = tree.predict_row(row.view()).unwrap();
                assert!(value >= previous - 1e-6, "decrease at f0={}", f0);
                previous = value;
            }
        }
    }
}

#[test]
fn test_interaction_groups_bound_every_path() {
    let mut rng = StdRng::seed_from_u64(6);
    let matrix = random_matrix(&mut rng, 3_000, 4, 8, 0.05);
    let gradients: Vec<GradientPair> = (0..3_000)
        .map(|row| {
            let a = matrix.bin(row, 0).unwrap_or(0) as f32;
            let b = matrix.bin(row, 2).unwrap_or(0) as f32;
            GradientPair::new(a * b * 0.1 - 1.0 + rng.gen_range(-0.5..0.5), 1.0)
        })
        .collect();

    let param = ConfigBuilder::new()
        .max_depth(6)
        .interaction_constraints(vec![vec![0, 1], vec![2, 3]])
        .build()
        .unwrap();
    let grown = QuantileHistMaker::new(param)
        .unwrap()
        .grow_tree(&gradients, &matrix)
        .unwrap();

    let groups: [BTreeSet<usize>; 2] = [[0, 1].into(), [2, 3].into()];
    for leaf in grown.tree.leaf_indices() {
        let used: BTreeSet<usize> = grown.tree.branch_features(leaf).into_iter().collect();
        assert!(
            groups.iter().any(|g| used.is_subset(g)),
            "leaf {} mixes groups: {:?}",
            leaf,
            used
        );
    }
}

#[test]
fn test_column_sampling_by_tree_limits_features() {
    let mut rng = StdRng::seed_from_u64(7);
    let matrix = random_matrix(&mut rng, 2_000, 8, 16, 0.0);
    let gradients: Vec<GradientPair> = (0..2_000)
        .map(|row| {
            let total: f32 = (0..8).map(|f| matrix.bin(row, f).unwrap_or(0) as f32).sum();
            GradientPair::new(total - 60.0, 1.0)
        })
        .collect();

    let param = ConfigBuilder::new()
        .max_depth(6)
        .colsample_bytree(0.25)
        .seed(3)
        .build()
        .unwrap();
    let grown = QuantileHistMaker::new(param)
        .unwrap()
        .grow_tree(&gradients, &matrix)
        .unwrap();

    let used: BTreeSet<usize> = grown
        .tree
        .nodes()
        .filter_map(|(_, n)| n.split().map(|s| s.feature))
        .collect();
    assert!(!used.is_empty());
    assert!(used.len() <= 2);
}

#[test]
fn test_subsampled_rows_are_flagged() {
    let mut rng = StdRng::seed_from_u64(8);
    let matrix = random_matrix(&mut rng, 5_000, 4, 16, 0.05);
    let gradients = signal_gradients(&mut rng, &matrix);

    let param = ConfigBuilder::new().subsample(0.5).seed(1).build().unwrap();
    let grown = QuantileHistMaker::new(param)
        .unwrap()
        .grow_tree(&gradients, &matrix)
        .unwrap();

    let sampled: Vec<RowIndex> = (0..5_000)
        .filter(|&row| grown.positions.is_sampled(row))
        .collect();
    assert!(sampled.len() > 2_000 && sampled.len() < 3_000);

    let root = grown.tree.root().stats();
    let expected = GradStats::from_rows(&sampled, &gradients);
    assert!(close(root.sum_grad, expected.sum_grad, 1e-9));
    assert!(close(root.sum_hess, expected.sum_hess, 1e-9));

    for row in 0..5_000 {
        assert_eq!(grown.positions.leaf(row), grown.tree.leaf_for_row(&matrix, row));
    }
}

#[test]
fn test_prediction_cache_matches_full_prediction() {
    let mut rng = StdRng::seed_from_u64(10);
    let matrix = random_matrix(&mut rng, 3_000, 5, 20, 0.05);
    let labels: Vec<f32> = (0..3_000)
        .map(|row| {
            matrix.bin(row, 0).map_or(-1.0, |b| b as f32 * 0.4)
                + matrix.bin(row, 3).map_or(0.0, |b| if b > 10 { 2.0 } else { 0.0 })
        })
        .collect();

    let param = ConfigBuilder::new()
        .max_depth(4)
        .learning_rate(0.5)
        .subsample(0.7)
        .build()
        .unwrap();
    let mut maker = QuantileHistMaker::new(param).unwrap();
    let mut cache = vec![0.0f32; 3_000];
    let mut trees = Vec::new();

    for _ in 0..4 {
        let gradients: Vec<GradientPair> = cache
            .iter()
            .zip(&labels)
            .map(|(&p, &y)| GradientPair::new(p - y, 1.0))
            .collect();
        let grown = maker.grow_tree(&gradients, &matrix).unwrap();
        maker.update_prediction_cache(&matrix, &mut cache).unwrap();
        trees.push(grown.tree);
    }

    for row in 0..3_000u32 {
        let full: f32 = trees.iter().map(|t| t.predict_binned(&matrix, row)).sum();
        assert_abs_diff_eq!(cache[row as usize], full, epsilon = 1e-4);
    }
}

#[test]
fn test_prediction_cache_rejects_other_matrices() {
    let (matrix, gradients) = golden_data();
    let param = golden_param(GrowPolicy::DepthWise).build().unwrap();
    let mut maker = QuantileHistMaker::new(param).unwrap();

    let mut cache = vec![0.0; 8];
    assert_eq!(
        maker.update_prediction_cache(&matrix, &mut cache),
        Err(CacheMismatch::NoTree)
    );

    maker.grow_tree(&gradients, &matrix).unwrap();
    let (other, _) = golden_data();
    assert_eq!(
        maker.update_prediction_cache(&other, &mut cache),
        Err(CacheMismatch::DifferentMatrix)
    );
    assert_eq!(cache, vec![0.0; 8]);

    let mut wrong = vec![0.0; 7];
    assert!(matches!(
        maker.update_prediction_cache(&matrix, &mut wrong),
        Err(CacheMismatch::RowCount { expected: 8, actual: 7 })
    ));
}

#[test]
fn test_input_errors() {
    let (matrix, gradients) = golden_data();
    let mut maker = QuantileHistMaker::new(TrainParam::default()).unwrap();

    let err = maker.grow_tree(&gradients[..7], &matrix).unwrap_err();
    assert!(matches!(err, GrowerError::DimensionMismatch { .. }));

    let param = ConfigBuilder::new().max_bin(3).build().unwrap();
    let err = QuantileHistMaker::new(param)
        .unwrap()
        .grow_tree(&gradients, &matrix)
        .unwrap_err();
    assert!(err.is_configuration());

    let mut param = TrainParam::default();
    param.max_depth = 0;
    assert!(QuantileHistMaker::new(param).is_err());
}

#[test]
fn test_raw_prediction_agrees_with_bins() {
    let mut rng = StdRng::seed_from_u64(11);
    let num_rows = 500;
    let values = ndarray::Array2::from_shape_fn((num_rows, 3), |_| {
        if rng.gen_bool(0.05) {
            f32::NAN
        } else {
            rng.gen_range(0.0..10.0)
        }
    });
    let bounds = vec![(1..=10).map(|b| b as f64).collect::<Vec<_>>(); 3];
    let matrix = QuantizedMatrix::from_dense(values.view(), bounds, 0.2).unwrap();
    let gradients = signal_gradients(&mut rng, &matrix);

    let grown = QuantileHistMaker::new(ConfigBuilder::new().max_depth(4).build().unwrap())
        .unwrap()
        .grow_tree(&gradients, &matrix)
        .unwrap();

    let batch = grown.tree.predict_batch(values.view()).unwrap();
    for row in 0..num_rows {
        assert_eq!(batch[row], grown.tree.predict_binned(&matrix, row as RowIndex));
    }
}

#[test]
fn test_missingness_alone_drives_a_split() {
    init_logging();
    let column = [Some(0); 4].into_iter().chain([None; 4]).collect();
    let matrix = QuantizedMatrix::from_column_bins(8, vec![column], vec![vec![0.5]], 0.2).unwrap();
    let gradients: Vec<_> = [-2.0, -2.0, -2.0, -2.0, 2.0, 2.0, 2.0, 2.0]
        .iter()
        .map(|&g| GradientPair::new(g, 1.0))
        .collect();

    let param = golden_param(GrowPolicy::DepthWise).max_depth(2).build().unwrap();
    let grown = QuantileHistMaker::new(param)
        .unwrap()
        .grow_tree(&gradients, &matrix)
        .unwrap();

    assert_eq!(grown.tree.num_nodes(), 3);
    assert_eq!(grown.positions.leaves(), &[1, 1, 1, 1, 2, 2, 2, 2]);
    assert_abs_diff_eq!(grown.tree.root().gain(), 12.8, epsilon = 1e-9);

    let raw = ndarray::array![[0.0f32], [1e6], [f32::NAN]];
    let predictions = grown.tree.predict_batch(raw.view()).unwrap();
    assert_eq!(predictions[0], grown.tree.predict_binned(&matrix, 0));
    assert_eq!(predictions[1], grown.tree.predict_binned(&matrix, 0));
    assert_eq!(predictions[2], grown.tree.predict_binned(&matrix, 4));
}

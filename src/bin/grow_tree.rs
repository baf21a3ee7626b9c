//! Demo driver for the quantile histogram grower.
//!
//! Generates a synthetic regression problem, quantizes it with equal-width
//! cuts and runs a few rounds of squared-error boosting, refreshing the
//! prediction cache after each tree. The last tree is printed as JSON.
//!
//! Run with: `cargo run --bin grow_tree -- [config.toml|config.json] [rounds]`

use anyhow::{Context, Result};
use ndarray::Array2;
use quantile_hist::config::DEFAULT_CONFIG_FILE;
use quantile_hist::*;
use rand::prelude::*;
use std::path::Path;
use std::sync::Arc;

const NUM_ROWS: usize = 2_000;
const NUM_FEATURES: usize = 6;
const NUM_BINS: usize = 32;

fn synthetic_data(seed: u64) -> (Array2<f32>, Vec<f32>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut features = Array2::zeros((NUM_ROWS, NUM_FEATURES));
    let mut labels = Vec::with_capacity(NUM_ROWS);

    for i in 0..NUM_ROWS {
        for j in 0..NUM_FEATURES {
            features[[i, j]] = if rng.gen_bool(0.05) {
                f32::NAN
            } else {
                rng.gen_range(-5.0..5.0)
            };
        }
        let x0 = features[[i, 0]];
        let x1 = features[[i, 1]];
        let mut label = 0.0;
        if !x0.is_nan() {
            label += 2.0 * x0;
        }
        if !x1.is_nan() && x1 > 0.0 {
            label += 3.0;
        }
        labels.push(label + rng.gen_range(-0.5..0.5));
    }
    (features, labels)
}

fn equal_width_cuts(features: &Array2<f32>, num_bins: usize) -> Vec<Vec<f64>> {
    features
        .columns()
        .into_iter()
        .map(|column| {
            let (lo, hi) = column
                .iter()
                .filter(|v| !v.is_nan())
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                    (lo.min(v as f64), hi.max(v as f64))
                });
            if !lo.is_finite() || hi <= lo {
                return vec![0.0];
            }
            let width = (hi - lo) / num_bins as f64;
            (1..=num_bins).map(|b| lo + width * b as f64).collect()
        })
        .collect()
}

fn load_param(path: Option<&str>) -> Result<TrainParam> {
    let mut param = match path {
        Some(path) => TrainParam::load_from_file(path)
            .with_context(|| format!("failed to load parameters from {}", path))?,
        None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
            TrainParam::load_from_file(DEFAULT_CONFIG_FILE)?
        }
        None => ConfigBuilder::new()
            .max_depth(4)
            .learning_rate(0.3)
            .build()?,
    };
    param.apply_environment_overrides()?;
    param.validate()?;
    Ok(param)
}

fn main() -> Result<()> {
    quantile_hist::init();

    let args: Vec<String> = std::env::args().collect();
    let param = load_param(args.get(1).map(String::as_str))?;
    let rounds: usize = match args.get(2) {
        Some(n) => n.parse().context("rounds must be a positive integer")?,
        None => 5,
    };

    println!("quantile-hist {} - grow_tree demo", VERSION);
    println!("==================================");

    let (features, labels) = synthetic_data(param.seed);
    let cuts = equal_width_cuts(&features, NUM_BINS.min(param.max_bin));
    let matrix = QuantizedMatrix::from_dense(features.view(), cuts, param.sparse_threshold)?;

    let monitor = Arc::new(TimerMonitor::new("grow_tree"));
    let mut maker = QuantileHistMaker::with_monitor(param, monitor.clone())?;
    let mut predictions = vec![0.0 as Score; NUM_ROWS];
    let mut last = None;

    for round in 0..rounds {
        let gradients: Vec<GradientPair> = predictions
            .iter()
            .zip(&labels)
            .map(|(&p, &y)| GradientPair::new(p - y, 1.0))
            .collect();

        let grown = maker.grow_tree(&gradients, &matrix)?;
        maker.update_prediction_cache(&matrix, &mut predictions)?;

        let mse = predictions
            .iter()
            .zip(&labels)
            .map(|(&p, &y)| ((p - y) as f64).powi(2))
            .sum::<f64>()
            / NUM_ROWS as f64;
        println!(
            "round {:>3}: {:>3} leaves, depth {}, train mse {:.4}",
            round,
            grown.tree.num_leaves(),
            grown.tree.depth(),
            mse
        );
        last = Some(grown.tree);
    }

    println!("{}", maker.pool_statistics());
    monitor.report();

    if let Some(tree) = last {
        println!("{}", tree.to_json()?);
    }
    Ok(())
}

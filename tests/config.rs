//! Parameter files and environment overrides.

mod common;

use quantile_hist::*;
use std::fs;
use tempfile::TempDir;

#[test]
fn test_toml_file_round_trip() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("params.toml");

    let param = ConfigBuilder::new()
        .max_depth(4)
        .grow_policy(GrowPolicy::LossGuide)
        .max_leaves(16)
        .colsample_bylevel(0.5)
        .monotone_constraints(vec![0, 1])
        .interaction_constraints(vec![vec![0, 1], vec![2]])
        .build()
        .unwrap();
    param.save_to_file(&path).unwrap();

    let loaded = TrainParam::load_from_file(&path).unwrap();
    assert_eq!(loaded, param);
}

#[test]
fn test_json_file_with_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("params.json");
    fs::write(&path, r#"{ "max_depth": 2, "learning_rate": 1.0, "nthread": 1 }"#).unwrap();

    let loaded = TrainParam::load_from_file(&path).unwrap();
    assert_eq!(loaded.max_depth, 2);
    assert_eq!(loaded.learning_rate, 1.0);
    assert_eq!(loaded.reg_lambda, DEFAULT_REG_LAMBDA);

    let (matrix, gradients) = common::golden_data();
    let grown = QuantileHistMaker::new(loaded)
        .unwrap()
        .grow_tree(&gradients, &matrix)
        .unwrap();
    assert_eq!(grown.positions.leaves(), &[3, 4, 3, 4, 2, 2, 2, 2]);
}

#[test]
fn test_bad_files_are_rejected() {
    let dir = TempDir::new().unwrap();

    let path = dir.path().join("params.yaml");
    fs::write(&path, "max_depth: 3").unwrap();
    assert_eq!(
        TrainParam::load_from_file(&path).unwrap_err().category(),
        "config"
    );

    let path = dir.path().join("params.toml");
    fs::write(&path, "max_leaves = 1").unwrap();
    assert!(TrainParam::load_from_file(&path).unwrap_err().is_configuration());

    let missing = dir.path().join("absent.toml");
    assert_eq!(
        TrainParam::load_from_file(&missing).unwrap_err().category(),
        "io"
    );
}

#[test]
fn test_environment_overrides() {
    std::env::set_var("QHIST_MAX_DEPTH", "3");
    std::env::set_var("QHIST_GROW_POLICY", "lossguide");
    let mut param = TrainParam::default();
    let result = param.apply_environment_overrides();
    std::env::remove_var("QHIST_MAX_DEPTH");
    std::env::remove_var("QHIST_GROW_POLICY");

    result.unwrap();
    assert_eq!(param.max_depth, 3);
    assert_eq!(param.grow_policy, GrowPolicy::LossGuide);
}

//! Integration tests for allometric normalization.

use allometric_normalize::prelude::*;
use approx::assert_relative_eq;
use std::io::Write;
use tempfile::NamedTempFile;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Widths and lengths of five specimens; width is exactly 0.2 * length.
fn width_length_table() -> Table {
    Table::new()
        .with_numeric("width", vec![8.0, 10.0, 12.0, 9.0, 11.0])
        .unwrap()
        .with_numeric("length", vec![40.0, 50.0, 60.0, 45.0, 55.0])
        .unwrap()
}

#[test]
fn test_width_by_length_scenario() {
    init_tracing();
    let table = width_length_table();

    let out = normalize_character(&table, "width", "length", None).unwrap();

    let width = table.numeric("width").unwrap();
    let length = table.numeric("length").unwrap();
    let normalized = out.numeric("width_normalized").unwrap();

    // length == mean(length) == 50 at row 1
    assert_eq!(normalized[1], width[1]);

    let fit = AllometricNormalizer::new("width", "length").fit(&table).unwrap();
    for i in 0..table.n_rows() {
        let expected = width[i].unwrap() * (50.0 / length[i].unwrap()).powf(fit.b);
        assert_relative_eq!(normalized[i].unwrap(), expected, epsilon = 1e-9);
    }
}

#[test]
fn test_exact_fit_recovery() {
    init_tracing();
    for &(a0, b0) in &[(0.5, 0.75), (2.0, 1.3), (0.01, 2.5)] {
        let config = SyntheticConfig::default()
            .with_power_law(a0, b0)
            .with_noise(0.0)
            .with_rows(30)
            .with_seed(7);
        let table = generate_power_law(&config).unwrap();

        let fit = AllometricNormalizer::new("character", "size").fit(&table).unwrap();

        assert_relative_eq!(fit.b, b0, epsilon = 1e-6);
        assert_relative_eq!(fit.a, a0, max_relative = 1e-6);
    }
}

#[test]
fn test_noisy_exponent_recovery() {
    init_tracing();
    let config = SyntheticConfig::default()
        .with_power_law(0.5, 0.75)
        .with_noise(0.05)
        .with_rows(200)
        .with_seed(2024);
    let table = generate_power_law(&config).unwrap();

    let fit = AllometricNormalizer::new("character", "size").fit(&table).unwrap();

    assert!((fit.b - 0.75).abs() < 0.05, "b = {}", fit.b);
    assert!((fit.b_start - 0.75).abs() < 0.05, "b_start = {}", fit.b_start);
    assert_eq!(fit.n_obs, 200);
}

#[test]
fn test_scale_invariance_at_mean_with_noise() {
    let table = Table::new()
        .with_numeric("depth", vec![3.1, 5.2, 6.9, 4.4])
        .unwrap()
        .with_numeric("chord", vec![10.0, 20.0, 30.0, 20.0])
        .unwrap();

    let out = normalize_character(&table, "depth", "chord", Some("depth_adj")).unwrap();

    // mean(chord) = 20
    let adjusted = out.numeric("depth_adj").unwrap();
    assert_eq!(adjusted[1], Some(5.2));
    assert_eq!(adjusted[3], Some(4.4));
}

#[test]
fn test_shape_preserved_with_extra_columns() {
    let config = SyntheticConfig::default().with_rows(40).with_missing(0.1);
    let table = generate_power_law(&config)
        .unwrap()
        .with_text("specimen", (0..40).map(|i| format!("MVZ{:04}", i)).collect())
        .unwrap();

    let out = normalize_character(&table, "character", "size", None).unwrap();

    assert_eq!(out.n_rows(), table.n_rows());
    assert_eq!(out.n_columns(), table.n_columns() + 1);
    for name in table.column_names() {
        assert_eq!(out.column(name).unwrap(), table.column(name).unwrap());
    }

    let source = table.numeric("character").unwrap();
    let normalized = out.numeric("character_normalized").unwrap();
    for (s, n) in source.iter().zip(normalized.iter()) {
        assert_eq!(s.is_none(), n.is_none());
    }
}

#[test]
fn test_validation_precedes_fitting() {
    // A constant size column cannot be fitted, but the zero must be reported first.
    let table = Table::new()
        .with_numeric("width", vec![8.0, 0.0, 12.0])
        .unwrap()
        .with_numeric("length", vec![50.0, 50.0, 50.0])
        .unwrap();

    let err = normalize_character(&table, "width", "length", None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidInput);
}

#[test]
fn test_non_convergence_is_reported() {
    let config = SyntheticConfig::default().with_rows(30).with_noise(0.2);
    let table = generate_power_law(&config).unwrap();

    let err = AllometricNormalizer::new("character", "size")
        .solver(NlsConfig::default().with_max_iterations(1).with_tolerance(1e-14))
        .normalize(&table)
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ModelFitting);
}

#[test]
fn test_tsv_and_config_workflow() {
    let mut input = NamedTempFile::new().unwrap();
    writeln!(input, "specimen\tbeak_depth\twing_chord").unwrap();
    writeln!(input, "A\t9.1\t68.0").unwrap();
    writeln!(input, "B\t10.4\t74.5").unwrap();
    writeln!(input, "C\tNA\t71.0").unwrap();
    writeln!(input, "D\t8.7\t65.5").unwrap();
    writeln!(input, "E\t11.0\t78.0").unwrap();
    writeln!(input, "F\t9.8\t72.0").unwrap();
    input.flush().unwrap();

    let config = NormalizeConfig::from_yaml(
        "character: beak_depth\nnormalize_by: wing_chord\nnew_column_name: beak_depth_adj\n",
    )
    .unwrap();

    let table = Table::from_tsv(input.path()).unwrap();
    let (out, fit) = config.normalizer().normalize_with_fit(&table).unwrap();

    assert_eq!(fit.n_obs, 5);
    assert_eq!(fit.n_excluded, 1);
    assert_relative_eq!(fit.reference_size, 429.0 / 6.0, epsilon = 1e-12);

    let output = NamedTempFile::new().unwrap();
    out.to_tsv(output.path()).unwrap();
    let reloaded = Table::from_tsv(output.path()).unwrap();

    assert_eq!(
        reloaded.column_names(),
        &["specimen", "beak_depth", "wing_chord", "beak_depth_adj"]
    );
    assert!(reloaded.get(2, "beak_depth_adj").unwrap().is_missing());
    assert_eq!(reloaded, out);
}

use approx::assert_abs_diff_eq;
use ndarray::Array2;
use oaxaca::{
    ColumnSelector, DataError, Dataset, DecompositionConfig, DecompositionEngine,
    DecompositionError, DecompositionReport, ModelKind,
};
use polars::prelude::*;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand_distr::{Distribution, Normal};
use std::io::Write;
use tempfile::NamedTempFile;

const EXPLAINED: f64 = 2.1142737381746883;
const UNEXPLAINED: f64 = 4.160726261825312;

// group, wage, education, experience
const WAGE_ROWS: [[f64; 4]; 22] = [
    [1.0, 24.0, 16.0, 10.0],
    [1.0, 30.5, 18.0, 12.0],
    [1.0, 18.2, 12.0, 8.0],
    [1.0, 27.9, 16.0, 15.0],
    [1.0, 35.1, 20.0, 20.0],
    [1.0, 21.4, 14.0, 5.0],
    [1.0, 26.3, 15.0, 11.0],
    [1.0, 31.8, 17.0, 18.0],
    [1.0, 19.7, 12.0, 14.0],
    [1.0, 28.6, 16.0, 9.0],
    [0.0, 17.5, 14.0, 6.0],
    [0.0, 22.9, 16.0, 12.0],
    [0.0, 15.1, 12.0, 4.0],
    [0.0, 20.2, 15.0, 10.0],
    [0.0, 26.4, 18.0, 16.0],
    [0.0, 14.8, 11.0, 7.0],
    [0.0, 19.9, 14.0, 13.0],
    [0.0, 23.5, 17.0, 8.0],
    [0.0, 16.6, 12.0, 11.0],
    [0.0, 21.0, 16.0, 5.0],
    [0.0, 18.3, 13.0, 9.0],
    [0.0, 24.7, 18.0, 14.0],
];

fn wage_rows() -> Vec<Vec<f64>> {
    WAGE_ROWS.iter().map(|row| row.to_vec()).collect()
}

fn wage_frame(labels: (&str, &str)) -> DataFrame {
    let sex: Vec<&str> = WAGE_ROWS
        .iter()
        .map(|row| if row[0] == 1.0 { labels.0 } else { labels.1 })
        .collect();
    let wage: Vec<f64> = WAGE_ROWS.iter().map(|row| row[1]).collect();
    let education: Vec<f64> = WAGE_ROWS.iter().map(|row| row[2]).collect();
    let experience: Vec<f64> = WAGE_ROWS.iter().map(|row| row[3]).collect();
    df!(
        "sex" => sex,
        "wage" => wage,
        "education" => education,
        "experience" => experience
    )
    .unwrap()
}

/// Two groups with different predictor levels and different returns.
fn simulated_rows(seed: u64, n_first: usize, n_second: usize) -> Vec<Vec<f64>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let noise = Normal::new(0.0, 1.5).unwrap();
    let mut rows = Vec::with_capacity(n_first + n_second);
    for (group, n, shift, slope) in [(1.0, n_first, 2.0, 1.4), (0.0, n_second, 0.0, 0.9)] {
        let level = Normal::new(10.0 + shift, 2.0).unwrap();
        for _ in 0..n {
            let a = level.sample(&mut rng);
            let b = noise.sample(&mut rng) + 4.0;
            let y = 3.0 + slope * a + 0.5 * b + noise.sample(&mut rng);
            rows.push(vec![group, y, a, b]);
        }
    }
    rows
}

#[test]
fn decompositions_add_up_to_the_gap_on_simulated_data() {
    for seed in [7_u64, 21, 1234] {
        let data = Dataset::from_rows(&simulated_rows(seed, 180, 220)).unwrap();
        let mut engine = DecompositionEngine::new(&data, 0usize, 1usize, false).unwrap();

        let two = engine.two_fold(None).unwrap();
        let three = engine.three_fold(None).unwrap();
        let cotton = engine.cotton_adjusted(None).unwrap();

        assert!(two.gap >= 0.0);
        assert_abs_diff_eq!(two.explained + two.unexplained, two.gap, epsilon = 1e-8);
        assert_abs_diff_eq!(
            three.characteristic + three.coefficient + three.interaction,
            three.gap,
            epsilon = 1e-8
        );
        assert_abs_diff_eq!(cotton.explained + cotton.unexplained, cotton.gap, epsilon = 1e-8);
        assert_eq!(two.gap, three.gap);
    }
}

#[test]
fn swapping_group_labels_does_not_change_results() {
    let rows = wage_rows();
    let swapped: Vec<Vec<f64>> = rows
        .iter()
        .map(|row| {
            let mut row = row.clone();
            row[0] = 1.0 - row[0];
            row
        })
        .collect();

    let mut original =
        DecompositionEngine::new(&Dataset::from_rows(&rows).unwrap(), 0usize, 1usize, false)
            .unwrap();
    let mut relabelled =
        DecompositionEngine::new(&Dataset::from_rows(&swapped).unwrap(), 0usize, 1usize, false)
            .unwrap();

    assert_eq!(original.first_group().label, "1");
    assert_eq!(relabelled.first_group().label, "0");
    assert_eq!(original.first_group().rows, relabelled.first_group().rows);

    let a = original.two_fold(None).unwrap();
    let b = relabelled.two_fold(None).unwrap();
    assert_abs_diff_eq!(a.explained, b.explained, epsilon = 1e-12);
    assert_abs_diff_eq!(a.unexplained, b.unexplained, epsilon = 1e-12);
    assert_abs_diff_eq!(b.explained, EXPLAINED, epsilon = 1e-9);
}

#[test]
fn group_column_with_one_value_is_rejected() {
    let rows: Vec<Vec<f64>> = wage_rows()
        .into_iter()
        .map(|mut row| {
            row[0] = 1.0;
            row
        })
        .collect();
    let data = Dataset::from_rows(&rows).unwrap();
    match DecompositionEngine::new(&data, 0usize, 1usize, false) {
        Err(DecompositionError::UnsupportedGroupCardinality { found }) => {
            assert_eq!(found, vec!["1".to_string()]);
        }
        other => panic!("expected a cardinality error, got {:?}", other.err()),
    }
}

#[test]
fn group_column_with_three_values_is_rejected() {
    let mut rows = wage_rows();
    rows[3][0] = 2.0;
    let data = Dataset::from_rows(&rows).unwrap();
    match DecompositionEngine::new(&data, 0usize, 1usize, false) {
        Err(DecompositionError::UnsupportedGroupCardinality { found }) => {
            assert_eq!(found, vec!["0", "1", "2"]);
        }
        other => panic!("expected a cardinality error, got {:?}", other.err()),
    }
}

#[test]
fn cotton_reference_is_plain_average_for_equal_groups() {
    let data = Dataset::from_rows(&simulated_rows(99, 150, 150)).unwrap();
    let mut engine = DecompositionEngine::new(&data, 0usize, 1usize, false).unwrap();
    let models = engine.fit().unwrap().clone();
    let reference = engine.cotton_reference().unwrap();
    for j in 0..reference.len() {
        let average =
            0.5 * models.reference.coefficients[j] + 0.5 * models.comparison.coefficients[j];
        assert_abs_diff_eq!(reference[j], average, epsilon = 1e-12);
    }
}

#[test]
fn repeated_runs_are_bit_identical() {
    let rows = simulated_rows(5, 90, 70);
    let run = || {
        let data = Dataset::from_rows(&rows).unwrap();
        let mut engine = DecompositionEngine::new(&data, 0usize, 1usize, false).unwrap();
        engine.decompose().unwrap()
    };
    assert_eq!(run(), run());
}

#[test]
fn duplicated_predictor_is_reported_as_singular() {
    let rows: Vec<Vec<f64>> = wage_rows()
        .into_iter()
        .map(|mut row| {
            row.push(row[2]);
            row
        })
        .collect();
    let data = Dataset::from_rows(&rows).unwrap();
    let mut engine = DecompositionEngine::new(&data, 0usize, 1usize, false).unwrap();
    match engine.two_fold(None) {
        Err(DecompositionError::SingularDesignMatrix {
            model,
            rank,
            columns,
        }) => {
            assert_eq!(model, ModelKind::Reference);
            assert_eq!(rank, 3);
            assert_eq!(columns, 4);
        }
        other => panic!("expected a singular design error, got {other:?}"),
    }
}

#[test]
fn existing_intercept_column_gives_same_decomposition() {
    let rows: Vec<Vec<f64>> = wage_rows()
        .into_iter()
        .map(|mut row| {
            row.push(1.0);
            row
        })
        .collect();
    let data = Dataset::from_rows(&rows).unwrap();
    let mut engine = DecompositionEngine::new(&data, 0usize, 1usize, true).unwrap();
    assert_eq!(engine.predictor_names(), ["x2", "x3", "x4"]);
    let result = engine.two_fold(None).unwrap();
    assert_abs_diff_eq!(result.explained, EXPLAINED, epsilon = 1e-9);
    assert_abs_diff_eq!(result.unexplained, UNEXPLAINED, epsilon = 1e-9);
}

#[test]
fn dataframe_with_text_groups_is_addressed_by_name() {
    let data = Dataset::from_dataframe(&wage_frame(("male", "female"))).unwrap();
    let mut engine = DecompositionEngine::new(&data, "sex", "wage", false).unwrap();
    assert_eq!(engine.first_group().label, "male");
    assert_eq!(engine.second_group().label, "female");
    assert_eq!(engine.predictor_names(), ["const", "education", "experience"]);

    let result = engine.two_fold(None).unwrap();
    assert_abs_diff_eq!(result.explained, EXPLAINED, epsilon = 1e-9);
    assert_abs_diff_eq!(result.unexplained, UNEXPLAINED, epsilon = 1e-9);
}

#[test]
fn selector_kind_must_match_dataset_kind() {
    let named = Dataset::from_dataframe(&wage_frame(("m", "f"))).unwrap();
    assert!(matches!(
        DecompositionEngine::new(&named, 0usize, 1usize, false),
        Err(DecompositionError::Data(DataError::InvalidSelectorKind { .. }))
    ));

    let positional = Dataset::from_rows(&wage_rows()).unwrap();
    assert!(matches!(
        DecompositionEngine::new(&positional, "sex", "wage", false),
        Err(DecompositionError::Data(DataError::InvalidSelectorKind { .. }))
    ));

    assert!(matches!(
        DecompositionEngine::new(&named, "gender", "wage", false),
        Err(DecompositionError::Data(DataError::SelectorNotFound(
            ColumnSelector::Name(_)
        )))
    ));
}

#[test]
fn array_input_matches_row_input() {
    let flat: Vec<f64> = WAGE_ROWS.iter().flatten().copied().collect();
    let matrix = Array2::from_shape_vec((WAGE_ROWS.len(), 4), flat).unwrap();
    let data = Dataset::from_array(matrix.view()).unwrap();
    let mut engine = DecompositionEngine::new(&data, 0usize, 1usize, false).unwrap();
    let result = engine.three_fold(None).unwrap();
    assert_abs_diff_eq!(result.characteristic, 1.8524122248927843, epsilon = 1e-9);
    assert_abs_diff_eq!(result.coefficient, 3.9364963503649637, epsilon = 1e-9);
    assert_abs_diff_eq!(result.interaction, 0.4860914247422523, epsilon = 1e-9);
}

#[test]
fn tab_separated_file_is_loaded_with_names() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "group\twage\teducation\texperience").unwrap();
    for row in WAGE_ROWS {
        writeln!(file, "{}\t{}\t{}\t{}", row[0], row[1], row[2], row[3]).unwrap();
    }
    file.flush().unwrap();

    let data = Dataset::from_delimited_file(file.path()).unwrap();
    assert!(data.is_named());
    let mut engine = DecompositionEngine::new(&data, "group", "wage", false).unwrap();
    let result = engine.two_fold(None).unwrap();
    assert_abs_diff_eq!(result.explained, EXPLAINED, epsilon = 1e-9);
}

#[test]
fn config_file_drives_decompose() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "with_cotton = false").unwrap();
    writeln!(file, "round_digits = 3").unwrap();
    file.flush().unwrap();

    let config = DecompositionConfig::load(file.path()).unwrap();
    assert!(!config.with_cotton);
    assert!(config.with_variance);
    assert!(!config.has_constant);

    let data = Dataset::from_rows(&wage_rows()).unwrap();
    let mut engine = DecompositionEngine::with_config(&data, 0usize, 1usize, config).unwrap();
    let report = engine.decompose().unwrap();
    assert!(report.cotton.is_none());
    assert!(report.variance.is_some());
    assert_eq!(report.two_fold.explained, 2.114);
    assert_eq!(report.two_fold.unexplained, 4.161);
}

#[test]
fn invalid_rounding_in_config_file_is_rejected() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "round_digits = 20").unwrap();
    file.flush().unwrap();
    assert!(matches!(
        DecompositionConfig::load(file.path()),
        Err(DecompositionError::InvalidRoundingSpecifier(20))
    ));
}

#[test]
fn report_serializes_to_json() {
    let data = Dataset::from_rows(&wage_rows()).unwrap();
    let mut engine = DecompositionEngine::new(&data, 0usize, 1usize, false).unwrap();
    let report = engine.decompose().unwrap();

    let json = serde_json::to_string(&report).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed["reference_group"], "1");
    assert_eq!(parsed["comparison_obs"], 12);
    assert!(parsed["cotton"].is_object());

    let restored: DecompositionReport = serde_json::from_str(&json).unwrap();
    assert_eq!(restored.comparison_group, report.comparison_group);
    assert_abs_diff_eq!(restored.two_fold.explained, report.two_fold.explained, epsilon = 1e-12);
    assert_abs_diff_eq!(
        restored.three_fold.interaction,
        report.three_fold.interaction,
        epsilon = 1e-12
    );
}

#[test]
fn saved_report_loads_back() {
    let data = Dataset::from_rows(&wage_rows()).unwrap();
    let mut engine = DecompositionEngine::new(&data, 0usize, 1usize, false).unwrap();
    let report = engine.decompose().unwrap();

    let file = NamedTempFile::new().unwrap();
    let path = file.path().to_str().unwrap();
    report.save(path).unwrap();
    let loaded = DecompositionReport::load(path).unwrap();
    assert_eq!(loaded.two_fold, report.two_fold);
    assert_eq!(loaded.cotton, report.cotton);
}

//! Group splitting: resolves the group and response selectors, enforces a
//! two-valued group indicator, builds the per-group and pooled design
//! matrices, and fixes the canonical group order.

use crate::data::{ColumnData, ColumnSelector, DataError, Dataset};
use itertools::Itertools;
use ndarray::{Array1, Array2, Axis, concatenate};

/// Name given to the intercept column when one is added.
pub const CONSTANT_NAME: &str = "const";

/// One group's design matrix and response, before any model is fitted.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupPartition {
    /// Observed value of the group indicator for this group.
    pub label: String,
    /// Predictor matrix, constant column included. Shape: [n_obs, n_predictors].
    pub x: Array2<f64>,
    pub y: Array1<f64>,
    /// Positions of this group's rows in the original dataset.
    pub rows: Vec<usize>,
}

impl GroupPartition {
    pub fn n_obs(&self) -> usize {
        self.y.len()
    }

    pub fn response_mean(&self) -> f64 {
        self.y.mean().unwrap_or(f64::NAN)
    }

    /// Column-wise predictor means, constant included.
    pub fn predictor_means(&self) -> Array1<f64> {
        self.x
            .mean_axis(Axis(0))
            .unwrap_or_else(|| Array1::from_elem(self.x.ncols(), f64::NAN))
    }
}

/// The outcome of splitting a dataset: two canonically ordered groups plus
/// the pooled arrays.
#[derive(Debug, Clone)]
pub struct SplitData {
    pub first: GroupPartition,
    pub second: GroupPartition,
    /// Pooled design: group predictors followed by the group indicator column.
    pub pooled_x: Array2<f64>,
    pub pooled_y: Array1<f64>,
    /// Column of `pooled_x` holding the group indicator.
    pub indicator_column: usize,
    /// Names of the group predictor columns, aligned with `first.x`.
    pub predictor_names: Vec<String>,
}

#[derive(Debug)]
pub(crate) enum SplitError {
    Data(DataError),
    Cardinality(Vec<String>),
}

impl From<DataError> for SplitError {
    fn from(err: DataError) -> Self {
        SplitError::Data(err)
    }
}

/// Splits `data` on the group indicator and prepares every array the
/// decomposition needs.
pub(crate) fn split_dataset(
    data: &Dataset,
    group: &ColumnSelector,
    response: &ColumnSelector,
    has_constant: bool,
) -> Result<SplitData, SplitError> {
    let group_idx = data.resolve(group)?;
    let response_idx = data.resolve(response)?;
    if group_idx == response_idx {
        return Err(DataError::InvalidInputKind(format!(
            "the group indicator and the response both select column '{}'",
            data.column_label(group_idx)
        ))
        .into());
    }

    let row_keys = group_keys(data.column(group_idx));
    let distinct = distinct_group_values(data.column(group_idx));
    log::info!("These are the attempted split values: {:?}", distinct);
    if distinct.len() != 2 {
        return Err(SplitError::Cardinality(distinct));
    }

    let predictor_idx: Vec<usize> = (0..data.n_columns())
        .filter(|&i| i != group_idx && i != response_idx)
        .collect();
    let mut predictor_names: Vec<String> = predictor_idx
        .iter()
        .map(|&i| data.column_label(i))
        .collect();

    let mut x = Array2::<f64>::zeros((data.n_rows(), predictor_idx.len()));
    for (j, &i) in predictor_idx.iter().enumerate() {
        x.column_mut(j).assign(&data.numeric_column(i)?);
    }
    let y = data.numeric_column(response_idx)?.to_owned();

    if has_constant {
        if !x.columns().into_iter().any(|c| is_constant(c.iter())) {
            log::warn!(
                "has_constant is set but no predictor column is constant; the decomposition will be fitted without an intercept"
            );
        }
    } else {
        let with_constant = concatenate![Axis(1), Array2::<f64>::ones((data.n_rows(), 1)), x];
        x = with_constant;
        predictor_names.insert(0, CONSTANT_NAME.to_string());
    }

    let partition = |label: &String| {
        let rows: Vec<usize> = row_keys
            .iter()
            .positions(|key| key == label)
            .collect();
        GroupPartition {
            label: label.clone(),
            x: x.select(Axis(0), &rows),
            y: y.select(Axis(0), &rows),
            rows,
        }
    };
    let (first, second) = canonical_order(partition(&distinct[0]), partition(&distinct[1]));
    log::info!(
        "Reference group '{}' ({} obs, mean {:.5}); comparison group '{}' ({} obs, mean {:.5})",
        first.label,
        first.n_obs(),
        first.response_mean(),
        second.label,
        second.n_obs(),
        second.response_mean()
    );

    let indicator = Array1::from_iter(
        row_keys
            .iter()
            .map(|key| if *key == first.label { 1.0 } else { 0.0 }),
    );
    let indicator_column = x.ncols();
    let pooled_x = concatenate![Axis(1), x, indicator.insert_axis(Axis(1))];

    Ok(SplitData {
        first,
        second,
        pooled_x,
        pooled_y: y,
        indicator_column,
        predictor_names,
    })
}

/// Returns the pair ordered so the first group has the higher (or equal)
/// mean response. Ties keep the input order.
pub fn canonical_order(
    a: GroupPartition,
    b: GroupPartition,
) -> (GroupPartition, GroupPartition) {
    if a.response_mean() - b.response_mean() < 0.0 {
        log::debug!(
            "Swapping groups so that '{}' is the reference group",
            b.label
        );
        (b, a)
    } else {
        (a, b)
    }
}

/// Sorted distinct values of a group indicator column, rendered as labels.
pub fn distinct_group_values(column: &ColumnData) -> Vec<String> {
    match column {
        ColumnData::Numeric(values) => values
            .iter()
            .copied()
            .sorted_by(f64::total_cmp)
            .dedup()
            .map(format_group_value)
            .collect(),
        ColumnData::Text(values) => values.iter().sorted().dedup().cloned().collect(),
    }
}

fn group_keys(column: &ColumnData) -> Vec<String> {
    match column {
        ColumnData::Numeric(values) => values.iter().copied().map(format_group_value).collect(),
        ColumnData::Text(values) => values.clone(),
    }
}

fn format_group_value(value: f64) -> String {
    // -0.0 and 0.0 are the same group
    if value == 0.0 {
        "0".to_string()
    } else {
        value.to_string()
    }
}

fn is_constant<'a>(mut values: impl Iterator<Item = &'a f64>) -> bool {
    match values.next() {
        Some(first) => values.all(|v| v == first),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn partition(label: &str, y: Array1<f64>) -> GroupPartition {
        let n = y.len();
        GroupPartition {
            label: label.to_string(),
            x: Array2::ones((n, 1)),
            y,
            rows: (0..n).collect(),
        }
    }

    #[test]
    fn canonical_order_swaps_when_first_mean_is_lower() {
        let low = partition("low", array![1.0, 2.0]);
        let high = partition("high", array![5.0, 7.0]);
        let (first, second) = canonical_order(low, high);
        assert_eq!(first.label, "high");
        assert_eq!(second.label, "low");
    }

    #[test]
    fn canonical_order_keeps_ties_in_input_order() {
        let a = partition("a", array![3.0, 3.0]);
        let b = partition("b", array![2.0, 4.0]);
        let (first, _) = canonical_order(a, b);
        assert_eq!(first.label, "a");
    }

    #[test]
    fn distinct_values_are_sorted_numerically() {
        let column = ColumnData::Numeric(array![10.0, 2.0, 10.0, -0.0, 0.0]);
        assert_eq!(distinct_group_values(&column), vec!["0", "2", "10"]);
    }

    #[test]
    fn split_adds_constant_and_indicator() {
        // group, y, x
        let data = Dataset::from_rows(&[
            vec![0.0, 1.0, 2.0],
            vec![1.0, 9.0, 4.0],
            vec![0.0, 2.0, 3.0],
            vec![1.0, 8.0, 5.0],
        ])
        .unwrap();
        let split = split_dataset(&data, &ColumnSelector::Index(0), &ColumnSelector::Index(1), false).unwrap();

        assert_eq!(split.predictor_names, vec!["const", "x2"]);
        assert_eq!(split.first.label, "1");
        assert_eq!(split.first.rows, vec![1, 3]);
        assert_eq!(split.first.x, array![[1.0, 4.0], [1.0, 5.0]]);
        assert_abs_diff_eq!(split.first.response_mean(), 8.5);
        assert_abs_diff_eq!(split.second.response_mean(), 1.5);

        assert_eq!(split.indicator_column, 2);
        assert_eq!(
            split.pooled_x.column(2).to_owned(),
            array![0.0, 1.0, 0.0, 1.0]
        );
        assert_eq!(split.pooled_y, array![1.0, 9.0, 2.0, 8.0]);
    }

    #[test]
    fn split_rejects_three_groups() {
        let data = Dataset::from_rows(&[
            vec![0.0, 1.0],
            vec![1.0, 2.0],
            vec![2.0, 3.0],
        ])
        .unwrap();
        match split_dataset(&data, &ColumnSelector::Index(0), &ColumnSelector::Index(1), false) {
            Err(SplitError::Cardinality(found)) => assert_eq!(found, vec!["0", "1", "2"]),
            other => panic!("Expected a cardinality failure, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn split_rejects_same_group_and_response_column() {
        let data = Dataset::from_rows(&[vec![0.0, 1.0], vec![1.0, 2.0]]).unwrap();
        assert!(matches!(
            split_dataset(&data, &ColumnSelector::Index(0), &ColumnSelector::Index(0), false),
            Err(SplitError::Data(DataError::InvalidInputKind(_)))
        ));
    }
}

//! # Oaxaca-Blinder Decomposition Engine
//!
//! The engine partitions the gap between two groups' mean responses into a
//! part explained by differing predictor levels and a part attributed to
//! differing regression coefficients. Construction validates and splits the
//! data once; the three regressions (reference group, comparison group and
//! pooled) are fitted at most once and cached. Every decomposition call
//! returns a fresh value object.
//!
//! Notation, with group 1 the reference (higher mean) group:
//!
//! ```text
//! gap          = ȳ₁ - ȳ₂ = X̄₁β₁ - X̄₂β₂
//! two-fold     : explained   = (X̄₁ - X̄₂)β*
//!                unexplained = X̄₁(β₁ - β*) + X̄₂(β* - β₂)
//! three-fold   : characteristic = (X̄₁ - X̄₂)β₂
//!                coefficient    = X̄₂(β₁ - β₂)
//!                interaction    = (X̄₁ - X̄₂)(β₁ - β₂)
//! ```
//!
//! `β*` is the pooled-regression coefficient vector (the regression on all
//! observations with a group indicator, whose coefficient is then dropped).
//! The Cotton variant replaces it with the sample-size weighted average of
//! `β₁` and `β₂`.

use crate::data::{ColumnSelector, DataError, Dataset};
use crate::ols::{self, FittedModel, OlsError};
use crate::report::DecompositionReport;
use crate::split::{GroupPartition, SplitData, SplitError, split_dataset};
use crate::variance::{GroupMoments, ThreeFoldVariance, predictor_mean_covariance, three_fold_variance};
use ndarray::{Array1, ArrayView1, ArrayView2, Axis, concatenate, s};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Largest accepted number of decimal digits for rounding; beyond this an
/// `f64` carries no further decimal precision.
pub const MAX_ROUND_DIGITS: u32 = 15;

/// Identifies one of the three regressions the engine fits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelKind {
    Reference,
    Comparison,
    Pooled,
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModelKind::Reference => "reference group",
            ModelKind::Comparison => "comparison group",
            ModelKind::Pooled => "pooled",
        };
        f.write_str(name)
    }
}

#[derive(Error, Debug)]
pub enum DecompositionError {
    #[error(transparent)]
    Data(#[from] DataError),

    #[error(
        "The group indicator must have exactly 2 distinct values, but {} were found: {found:?}",
        .found.len()
    )]
    UnsupportedGroupCardinality { found: Vec<String> },

    #[error(
        "The {model} design matrix is singular (rank {rank} of {columns} columns). Remove collinear predictors."
    )]
    SingularDesignMatrix {
        model: ModelKind,
        rank: usize,
        columns: usize,
    },

    #[error("Fitting the {model} regression failed: {source}")]
    FitFailed {
        model: ModelKind,
        #[source]
        source: OlsError,
    },

    #[error(
        "The {model} regression has {rows} observations for {columns} coefficients, so its covariance is undefined and no variance can be estimated."
    )]
    VarianceUnavailable {
        model: ModelKind,
        rows: usize,
        columns: usize,
    },

    #[error("The {0} requires both group models to be fitted. Call fit() first.")]
    ModelsNotFitted(&'static str),

    #[error("Cannot round to {0} decimal digits; at most 15 are supported.")]
    InvalidRoundingSpecifier(u32),

    #[error("Failed to read configuration file: {0}")]
    ConfigIo(#[from] std::io::Error),

    #[error("Failed to parse TOML configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

/// Capabilities and presentation options of one engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecompositionConfig {
    /// Whether the predictors already include an intercept column. When false
    /// a `const` column of ones is prepended.
    pub has_constant: bool,
    /// Include the Cotton-weighted two-fold decomposition in [`DecompositionEngine::decompose`].
    pub with_cotton: bool,
    /// Include the three-fold variance estimate in [`DecompositionEngine::decompose`].
    pub with_variance: bool,
    /// Decimal digits applied to every component returned by `decompose`.
    pub round_digits: Option<u32>,
}

impl Default for DecompositionConfig {
    fn default() -> Self {
        Self {
            has_constant: false,
            with_cotton: true,
            with_variance: true,
            round_digits: None,
        }
    }
}

impl DecompositionConfig {
    pub fn load(path: &Path) -> Result<Self, DecompositionError> {
        let text = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), DecompositionError> {
        if let Some(digits) = self.round_digits {
            check_round_digits(digits)?;
        }
        Ok(())
    }
}

/// Two-fold decomposition: `explained + unexplained = gap`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TwoFold {
    pub explained: f64,
    pub unexplained: f64,
    pub gap: f64,
}

impl TwoFold {
    /// Labelled components in presentation order.
    pub fn components(&self) -> [(&'static str, f64); 3] {
        [
            ("Unexplained Effect", self.unexplained),
            ("Explained Effect", self.explained),
            ("Gap", self.gap),
        ]
    }

    fn rounded(self, digits: Option<u32>) -> Self {
        Self {
            explained: round_to(self.explained, digits),
            unexplained: round_to(self.unexplained, digits),
            gap: round_to(self.gap, digits),
        }
    }
}

/// Three-fold decomposition: `characteristic + coefficient + interaction = gap`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThreeFold {
    pub characteristic: f64,
    pub coefficient: f64,
    pub interaction: f64,
    pub gap: f64,
}

impl ThreeFold {
    pub fn components(&self) -> [(&'static str, f64); 4] {
        [
            ("Characteristic Effect", self.characteristic),
            ("Coefficient Effect", self.coefficient),
            ("Interaction Effect", self.interaction),
            ("Gap", self.gap),
        ]
    }

    fn rounded(self, digits: Option<u32>) -> Self {
        Self {
            characteristic: round_to(self.characteristic, digits),
            coefficient: round_to(self.coefficient, digits),
            interaction: round_to(self.interaction, digits),
            gap: round_to(self.gap, digits),
        }
    }
}

/// One predictor's share of the two-fold components.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictorContribution {
    pub predictor: String,
    pub explained: f64,
    pub unexplained: f64,
}

/// The three cached regressions.
#[derive(Debug, Clone)]
pub struct FittedModels {
    pub reference: FittedModel,
    pub comparison: FittedModel,
    pub pooled: FittedModel,
    /// Pooled coefficients with the group indicator removed, aligned with the
    /// group predictor columns.
    pub pooled_reference: Array1<f64>,
}

pub struct DecompositionEngine {
    config: DecompositionConfig,
    split: SplitData,
    first_means: Array1<f64>,
    second_means: Array1<f64>,
    models: Option<FittedModels>,
}

impl DecompositionEngine {
    /// Validates and splits `dataset` with the default capabilities.
    pub fn new(
        dataset: &Dataset,
        group: impl Into<ColumnSelector>,
        response: impl Into<ColumnSelector>,
        has_constant: bool,
    ) -> Result<Self, DecompositionError> {
        let config = DecompositionConfig {
            has_constant,
            ..DecompositionConfig::default()
        };
        Self::with_config(dataset, group, response, config)
    }

    pub fn with_config(
        dataset: &Dataset,
        group: impl Into<ColumnSelector>,
        response: impl Into<ColumnSelector>,
        config: DecompositionConfig,
    ) -> Result<Self, DecompositionError> {
        config.validate()?;
        let split = split_dataset(dataset, &group.into(), &response.into(), config.has_constant)
            .map_err(|err| match err {
                SplitError::Data(err) => DecompositionError::Data(err),
                SplitError::Cardinality(found) => {
                    DecompositionError::UnsupportedGroupCardinality { found }
                }
            })?;

        let first_means = split.first.predictor_means();
        let second_means = split.second.predictor_means();
        Ok(Self {
            config,
            split,
            first_means,
            second_means,
            models: None,
        })
    }

    /// Builds an engine from a response vector and a predictor matrix whose
    /// column `bifurcate` is the group indicator.
    pub fn from_endog_exog(
        endog: ArrayView1<f64>,
        exog: ArrayView2<f64>,
        bifurcate: usize,
        config: DecompositionConfig,
    ) -> Result<Self, DecompositionError> {
        if endog.len() != exog.nrows() {
            return Err(DataError::InvalidInputKind(format!(
                "endog has {} observations but exog has {} rows",
                endog.len(),
                exog.nrows()
            ))
            .into());
        }
        if bifurcate >= exog.ncols() {
            return Err(DataError::SelectorNotFound(ColumnSelector::Index(bifurcate)).into());
        }
        let combined = concatenate![Axis(1), exog, endog.insert_axis(Axis(1))];
        let dataset = Dataset::from_array(combined.view())?;
        Self::with_config(&dataset, bifurcate, exog.ncols(), config)
    }

    /// Builds an engine from two datasets with identical column layout, one
    /// per group.
    pub fn from_groups(
        first: &Dataset,
        second: &Dataset,
        response: impl Into<ColumnSelector>,
        config: DecompositionConfig,
    ) -> Result<Self, DecompositionError> {
        let (dataset, group) = Dataset::stack_groups(first, second, "first", "second")?;
        Self::with_config(&dataset, group, response, config)
    }

    pub fn config(&self) -> &DecompositionConfig {
        &self.config
    }

    /// The reference group: the one with the higher mean response.
    pub fn first_group(&self) -> &GroupPartition {
        &self.split.first
    }

    pub fn second_group(&self) -> &GroupPartition {
        &self.split.second
    }

    /// Names of the group predictor columns, `const` included when added.
    pub fn predictor_names(&self) -> &[String] {
        &self.split.predictor_names
    }

    pub fn first_means(&self) -> ArrayView1<'_, f64> {
        self.first_means.view()
    }

    pub fn second_means(&self) -> ArrayView1<'_, f64> {
        self.second_means.view()
    }

    /// Difference of mean responses, never negative.
    pub fn gap(&self) -> f64 {
        self.split.first.response_mean() - self.split.second.response_mean()
    }

    /// The fitted models, if [`fit`](Self::fit) has run.
    pub fn models(&self) -> Option<&FittedModels> {
        self.models.as_ref()
    }

    /// Fits the three regressions once; later calls return the cached fits.
    pub fn fit(&mut self) -> Result<&FittedModels, DecompositionError> {
        if self.models.is_none() {
            let split = &self.split;
            let reference = fit_model(ModelKind::Reference, &split.first.y, &split.first.x)?;
            let comparison = fit_model(ModelKind::Comparison, &split.second.y, &split.second.x)?;
            let pooled = fit_model(ModelKind::Pooled, &split.pooled_y, &split.pooled_x)?;

            let indicator = split.indicator_column;
            let pooled_reference = concatenate![
                Axis(0),
                pooled.coefficients.slice(s![..indicator]),
                pooled.coefficients.slice(s![indicator + 1..])
            ];
            log::debug!("Reference coefficients: {}", reference.coefficients);
            log::debug!("Comparison coefficients: {}", comparison.coefficients);
            log::debug!("Pooled coefficients (indicator dropped): {pooled_reference}");

            self.models = Some(FittedModels {
                reference,
                comparison,
                pooled,
                pooled_reference,
            });
        }
        self.fitted("decomposition")
    }

    pub fn two_fold(&mut self, round_digits: Option<u32>) -> Result<TwoFold, DecompositionError> {
        check_optional_digits(round_digits)?;
        self.fit()?;
        let models = self.fitted("two-fold decomposition")?;
        let result = self.two_fold_against(models.pooled_reference.view(), models);
        Ok(result.rounded(round_digits))
    }

    pub fn three_fold(
        &mut self,
        round_digits: Option<u32>,
    ) -> Result<ThreeFold, DecompositionError> {
        check_optional_digits(round_digits)?;
        self.fit()?;
        let models = self.fitted("three-fold decomposition")?;
        let mean_gap = &self.first_means - &self.second_means;
        let coefficient_gap = &models.reference.coefficients - &models.comparison.coefficients;

        let result = ThreeFold {
            characteristic: mean_gap.dot(&models.comparison.coefficients),
            coefficient: self.second_means.dot(&coefficient_gap),
            interaction: mean_gap.dot(&coefficient_gap),
            gap: self.gap(),
        };
        Ok(result.rounded(round_digits))
    }

    /// Sample-size weighted reference coefficients
    /// `n₁/(n₁+n₂)·β₁ + n₂/(n₁+n₂)·β₂`.
    pub fn cotton_reference(&self) -> Result<Array1<f64>, DecompositionError> {
        let models = self.fitted("Cotton-weighted decomposition")?;
        let n_first = self.split.first.n_obs() as f64;
        let n_second = self.split.second.n_obs() as f64;
        let total = n_first + n_second;
        Ok(&models.reference.coefficients * (n_first / total)
            + &models.comparison.coefficients * (n_second / total))
    }

    /// Two-fold decomposition against the Cotton reference coefficients.
    pub fn cotton_adjusted(&self, round_digits: Option<u32>) -> Result<TwoFold, DecompositionError> {
        check_optional_digits(round_digits)?;
        let reference = self.cotton_reference()?;
        let models = self.fitted("Cotton-weighted decomposition")?;
        Ok(self
            .two_fold_against(reference.view(), models)
            .rounded(round_digits))
    }

    /// Variance of the three-fold characteristic and coefficient effects.
    /// Both group regressions need residual degrees of freedom.
    pub fn variance(&self) -> Result<ThreeFoldVariance, DecompositionError> {
        let models = self.fitted("variance estimate")?;
        for (model, fitted) in [
            (ModelKind::Reference, &models.reference),
            (ModelKind::Comparison, &models.comparison),
        ] {
            if !fitted.has_residual_degrees_of_freedom() {
                return Err(DecompositionError::VarianceUnavailable {
                    model,
                    rows: fitted.n_obs,
                    columns: fitted.coefficients.len(),
                });
            }
        }
        let first_mean_cov = predictor_mean_covariance(self.split.first.x.view());
        let second_mean_cov = predictor_mean_covariance(self.split.second.x.view());

        let first = GroupMoments {
            means: self.first_means.view(),
            coefficients: models.reference.coefficients.view(),
            coefficient_covariance: models.reference.covariance.view(),
            mean_covariance: first_mean_cov.view(),
        };
        let second = GroupMoments {
            means: self.second_means.view(),
            coefficients: models.comparison.coefficients.view(),
            coefficient_covariance: models.comparison.covariance.view(),
            mean_covariance: second_mean_cov.view(),
        };
        Ok(three_fold_variance(&first, &second))
    }

    /// Per-predictor contributions to the pooled two-fold components.
    pub fn detailed_two_fold(&mut self) -> Result<Vec<PredictorContribution>, DecompositionError> {
        self.fit()?;
        let models = self.fitted("detailed decomposition")?;
        let pooled = &models.pooled_reference;

        Ok(self
            .split
            .predictor_names
            .iter()
            .enumerate()
            .map(|(j, name)| PredictorContribution {
                predictor: name.clone(),
                explained: (self.first_means[j] - self.second_means[j]) * pooled[j],
                unexplained: self.first_means[j] * (models.reference.coefficients[j] - pooled[j])
                    + self.second_means[j] * (pooled[j] - models.comparison.coefficients[j]),
            })
            .collect())
    }

    /// Runs every decomposition enabled in the configuration, with the
    /// configured rounding.
    pub fn decompose(&mut self) -> Result<DecompositionReport, DecompositionError> {
        let digits = self.config.round_digits;
        let two_fold = self.two_fold(digits)?;
        let three_fold = self.three_fold(digits)?;
        let cotton = if self.config.with_cotton {
            Some(self.cotton_adjusted(digits)?)
        } else {
            None
        };
        let variance = if self.config.with_variance {
            match self.variance() {
                Ok(variance) => Some(variance),
                Err(err @ DecompositionError::VarianceUnavailable { .. }) => {
                    log::warn!("Skipping the variance estimate: {err}");
                    None
                }
                Err(err) => return Err(err),
            }
        } else {
            None
        };

        Ok(DecompositionReport {
            reference_group: self.split.first.label.clone(),
            comparison_group: self.split.second.label.clone(),
            reference_obs: self.split.first.n_obs(),
            comparison_obs: self.split.second.n_obs(),
            two_fold,
            three_fold,
            cotton,
            variance,
        })
    }

    fn fitted(&self, operation: &'static str) -> Result<&FittedModels, DecompositionError> {
        self.models
            .as_ref()
            .ok_or(DecompositionError::ModelsNotFitted(operation))
    }

    fn two_fold_against(&self, reference: ArrayView1<f64>, models: &FittedModels) -> TwoFold {
        let mean_gap = &self.first_means - &self.second_means;
        let explained = mean_gap.dot(&reference);
        let unexplained = self.first_means.dot(&(&models.reference.coefficients - &reference))
            + self.second_means.dot(&(&reference - &models.comparison.coefficients));
        TwoFold {
            explained,
            unexplained,
            gap: self.gap(),
        }
    }
}

fn fit_model(
    model: ModelKind,
    y: &Array1<f64>,
    x: &ndarray::Array2<f64>,
) -> Result<FittedModel, DecompositionError> {
    ols::fit(y.view(), x.view()).map_err(|err| match err {
        OlsError::SingularDesignMatrix { rank, columns } => {
            DecompositionError::SingularDesignMatrix {
                model,
                rank,
                columns,
            }
        }
        source => DecompositionError::FitFailed { model, source },
    })
}

fn check_round_digits(digits: u32) -> Result<(), DecompositionError> {
    if digits > MAX_ROUND_DIGITS {
        return Err(DecompositionError::InvalidRoundingSpecifier(digits));
    }
    Ok(())
}

fn check_optional_digits(digits: Option<u32>) -> Result<(), DecompositionError> {
    match digits {
        Some(digits) => check_round_digits(digits),
        None => Ok(()),
    }
}

/// Rounds half away from zero to `digits` decimals; `None` leaves `value` as is.
/// Values too large to scale are already integral and are returned unchanged.
pub fn round_to(value: f64, digits: Option<u32>) -> f64 {
    match digits {
        Some(digits) => {
            let factor = 10f64.powi(digits as i32);
            let scaled = value * factor;
            if scaled.is_finite() {
                scaled.round() / factor
            } else {
                value
            }
        }
        None => value,
    }
}

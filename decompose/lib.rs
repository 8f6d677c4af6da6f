#![deny(dead_code)]
#![deny(unused_imports)]

//! Oaxaca-Blinder decomposition of the mean response gap between two groups.

pub mod data;
pub mod engine;
pub mod ols;
#[cfg(feature = "plotting")]
pub mod plot;
pub mod report;
pub mod split;
pub mod variance;

pub use data::{ColumnData, ColumnSelector, DataError, Dataset};
pub use engine::{
    DecompositionConfig, DecompositionEngine, DecompositionError, FittedModels, ModelKind,
    PredictorContribution, ThreeFold, TwoFold,
};
pub use ols::{FittedModel, OlsError};
pub use report::{DecompositionReport, PlotKind, ReportError};
pub use variance::ThreeFoldVariance;

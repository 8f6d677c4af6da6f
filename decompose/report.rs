use crate::engine::{PredictorContribution, ThreeFold, TwoFold};
use crate::variance::ThreeFoldVariance;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io::{BufWriter, Write};
use thiserror::Error;

const RULE_WIDTH: usize = 30;

/// Which decomposition of a report to present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlotKind {
    TwoFold,
    ThreeFold,
    Cotton,
}

/// Everything one `decompose` run produced. This is the structure that gets
/// saved to and loaded from a TOML file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecompositionReport {
    pub reference_group: String,
    pub comparison_group: String,
    pub reference_obs: usize,
    pub comparison_obs: usize,
    pub two_fold: TwoFold,
    pub three_fold: ThreeFold,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cotton: Option<TwoFold>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variance: Option<ThreeFoldVariance>,
}

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Failed to read or write report file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML report file: {0}")]
    TomlParseError(#[from] toml::de::Error),
    #[error("Failed to serialize report to TOML format: {0}")]
    TomlSerializeError(#[from] toml::ser::Error),
}

impl DecompositionReport {
    pub fn save(&self, path: &str) -> Result<(), ReportError> {
        let toml_string = toml::to_string_pretty(self)?;
        let mut file = BufWriter::new(fs::File::create(path)?);
        file.write_all(toml_string.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    pub fn load(path: &str) -> Result<Self, ReportError> {
        let toml_string = fs::read_to_string(path)?;
        let report = toml::from_str(&toml_string)?;
        Ok(report)
    }

    /// Labelled components of the selected decomposition, or `None` when the
    /// report does not contain it.
    pub fn components(&self, kind: PlotKind) -> Option<Vec<(&'static str, f64)>> {
        match kind {
            PlotKind::TwoFold => Some(self.two_fold.components().to_vec()),
            PlotKind::ThreeFold => Some(self.three_fold.components().to_vec()),
            PlotKind::Cotton => self.cotton.map(|cotton| cotton.components().to_vec()),
        }
    }
}

fn write_block(f: &mut fmt::Formatter<'_>, lines: &[(&str, f64)]) -> fmt::Result {
    let rule = "*".repeat(RULE_WIDTH);
    writeln!(f, "{rule}")?;
    for (label, value) in lines {
        writeln!(f, "{label}: {value:.5}")?;
    }
    write!(f, "{rule}")
}

impl fmt::Display for TwoFold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_block(f, &self.components())
    }
}

impl fmt::Display for ThreeFold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_block(f, &self.components())
    }
}

impl fmt::Display for ThreeFoldVariance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (se_char, se_coef) = self.standard_errors();
        write_block(
            f,
            &[
                ("Characteristic Variance", self.characteristic_variance),
                ("Characteristic Std. Error", se_char),
                ("Coefficient Variance", self.coefficient_variance),
                ("Coefficient Std. Error", se_coef),
            ],
        )
    }
}

impl fmt::Display for DecompositionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Reference group: {} (n = {})",
            self.reference_group, self.reference_obs
        )?;
        writeln!(
            f,
            "Comparison group: {} (n = {})",
            self.comparison_group, self.comparison_obs
        )?;
        writeln!(f, "\nTwo-fold decomposition (pooled reference)")?;
        writeln!(f, "{}", self.two_fold)?;
        writeln!(f, "\nThree-fold decomposition")?;
        write!(f, "{}", self.three_fold)?;
        if let Some(cotton) = &self.cotton {
            writeln!(f, "\n\nTwo-fold decomposition (Cotton reference)")?;
            write!(f, "{cotton}")?;
        }
        if let Some(variance) = &self.variance {
            writeln!(f, "\n\nThree-fold variance")?;
            write!(f, "{variance}")?;
        }
        Ok(())
    }
}

/// Renders per-predictor contributions as an aligned table.
pub fn format_contributions(contributions: &[PredictorContribution]) -> String {
    let width = contributions
        .iter()
        .map(|c| c.predictor.len())
        .max()
        .unwrap_or(0)
        .max("Predictor".len());
    let mut out = format!(
        "{:<width$}  {:>14}  {:>14}\n",
        "Predictor", "Explained", "Unexplained"
    );
    for c in contributions {
        out.push_str(&format!(
            "{:<width$}  {:>14.5}  {:>14.5}\n",
            c.predictor, c.explained, c.unexplained
        ));
    }
    out
}

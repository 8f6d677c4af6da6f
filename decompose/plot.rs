//! Bar-chart rendering of decomposition components.
//!
//! Requires the `plotting` feature to be enabled.

use crate::report::{DecompositionReport, PlotKind};
use plotters::prelude::*;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PlotError {
    #[error("The report does not contain a {0:?} decomposition.")]
    MissingDecomposition(PlotKind),
    #[error("Plot rendering failed: {0}")]
    Rendering(String),
}

/// Plot configuration options.
#[derive(Debug, Clone)]
pub struct PlotConfig {
    pub width: u32,
    pub height: u32,
    pub title: Option<String>,
    pub font_size: u32,
}

impl Default for PlotConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            title: None,
            font_size: 20,
        }
    }
}

/// Draws one bar per component of the selected decomposition to a PNG file.
pub fn plot_decomposition(
    report: &DecompositionReport,
    kind: PlotKind,
    path: &str,
    config: &PlotConfig,
) -> Result<(), PlotError> {
    let bars = report
        .components(kind)
        .ok_or(PlotError::MissingDecomposition(kind))?;

    let lowest = bars.iter().map(|(_, v)| *v).fold(0.0_f64, f64::min);
    let highest = bars.iter().map(|(_, v)| *v).fold(0.0_f64, f64::max);
    let padding = ((highest - lowest) * 0.1).max(f64::EPSILON);

    let root = BitMapBackend::new(path, (config.width, config.height)).into_drawing_area();
    root.fill(&WHITE)
        .map_err(|e| PlotError::Rendering(e.to_string()))?;

    let title = config.title.clone().unwrap_or_else(|| match kind {
        PlotKind::TwoFold => "Two-Fold Decomposition".to_string(),
        PlotKind::ThreeFold => "Three-Fold Decomposition".to_string(),
        PlotKind::Cotton => "Cotton-Weighted Decomposition".to_string(),
    });

    let mut chart = ChartBuilder::on(&root)
        .caption(&title, ("sans-serif", config.font_size).into_font())
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(
            (0..bars.len()).into_segmented(),
            (lowest - padding)..(highest + padding),
        )
        .map_err(|e| PlotError::Rendering(e.to_string()))?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .y_desc("Effect")
        .x_label_formatter(&|x| {
            if let SegmentValue::CenterOf(idx) = x {
                bars.get(*idx).map(|(name, _)| *name).unwrap_or("").to_string()
            } else {
                String::new()
            }
        })
        .draw()
        .map_err(|e| PlotError::Rendering(e.to_string()))?;

    let gap_color = RGBColor(127, 127, 127);
    let effect_color = RGBColor(31, 119, 180);
    chart
        .draw_series(bars.iter().enumerate().map(|(i, (name, value))| {
            let color = if *name == "Gap" { gap_color } else { effect_color };
            let mut bar = Rectangle::new(
                [
                    (SegmentValue::Exact(i), 0.0),
                    (SegmentValue::Exact(i + 1), *value),
                ],
                color.filled(),
            );
            bar.set_margin(0, 0, 8, 8);
            bar
        }))
        .map_err(|e| PlotError::Rendering(e.to_string()))?;

    root.present()
        .map_err(|e| PlotError::Rendering(e.to_string()))?;

    log::info!("Wrote {:?} chart to '{}'", kind, path);
    Ok(())
}

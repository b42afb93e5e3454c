//! Chart rendering for rollup tables.
//!
//! A [`ChartSpec`] binds table columns to the axes of a bar chart. The
//! [`ChartRenderer`] trait turns a table plus a spec into an image artifact;
//! [`PlottersRenderer`] is the PNG implementation used by the binary.

use std::path::PathBuf;

use plotters::style::RGBColor;
use thiserror::Error;

use crate::rollup::{ComputeError, RollupTable};

pub mod plotters_renderer;

pub use plotters_renderer::PlottersRenderer;

/// Bar colour when no colour map applies
pub const DEFAULT_BAR_COLOR: RGBColor = RGBColor(0x1f, 0x77, 0xb4);

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("chart `{0}` has no rows to draw")]
    EmptyTable(String),

    #[error("chart `{chart}` binds unknown column `{column}`")]
    MissingColumn { chart: String, column: String },

    #[error("chart `{chart}` column `{column}` is not numeric")]
    NonNumeric { chart: String, column: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("drawing failed: {0}")]
    Draw(String),

    #[error("PNG encoding failed: {0}")]
    Encode(#[from] image::ImageError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelFormat {
    /// `$1234`
    Currency,
    /// `12`
    Count,
}

impl LabelFormat {
    pub fn format(self, value: f64) -> String {
        match self {
            LabelFormat::Currency => format!("${:.0}", value),
            LabelFormat::Count => format!("{:.0}", value),
        }
    }
}

/// Where a bar's value label sits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelPosition {
    Center,
    Edge,
}

/// Categorical colours keyed by the values of one column.
#[derive(Debug, Clone, PartialEq)]
pub struct ColorMap {
    pub column: String,
    pub colors: Vec<(String, RGBColor)>,
}

impl ColorMap {
    pub fn new(column: &str, colors: &[(&str, RGBColor)]) -> Self {
        ColorMap {
            column: column.to_string(),
            colors: colors.iter().map(|(k, c)| (k.to_string(), *c)).collect(),
        }
    }

    /// The fixed region palette
    pub fn regions(column: &str) -> Self {
        Self::new(
            column,
            &[
                ("North", RGBColor(0x1f, 0x77, 0xb4)),
                ("South", RGBColor(0xff, 0x7f, 0x0e)),
                ("East", RGBColor(0x2c, 0xa0, 0x2c)),
                ("West", RGBColor(0xd6, 0x27, 0x28)),
                ("Central", RGBColor(0x4a, 0xbd, 0x77)),
                ("South-West", RGBColor(0xf1, 0xcf, 0x11)),
            ],
        )
    }

    pub fn get(&self, key: &str) -> Option<RGBColor> {
        self.colors.iter().find(|(k, _)| k == key).map(|(_, c)| *c)
    }
}

/// Column bindings and presentation of one chart
#[derive(Debug, Clone, PartialEq)]
pub struct ChartSpec {
    pub output_name: String,
    pub x_col: String,
    pub y_col: String,
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    pub color_map: Option<ColorMap>,
    pub label_format: LabelFormat,
    pub label_position: LabelPosition,
}

impl ChartSpec {
    pub fn new(output_name: &str, x_col: &str, y_col: &str) -> Self {
        ChartSpec {
            output_name: output_name.to_string(),
            x_col: x_col.to_string(),
            y_col: y_col.to_string(),
            title: output_name.to_string(),
            x_label: x_col.to_string(),
            y_label: y_col.to_string(),
            color_map: None,
            label_format: LabelFormat::Currency,
            label_position: LabelPosition::Edge,
        }
    }

    pub fn title(mut self, title: &str) -> Self {
        self.title = title.to_string();
        self
    }

    pub fn axis_labels(mut self, x_label: &str, y_label: &str) -> Self {
        self.x_label = x_label.to_string();
        self.y_label = y_label.to_string();
        self
    }

    pub fn color_by(mut self, color_map: ColorMap) -> Self {
        self.color_map = Some(color_map);
        self
    }

    pub fn label_format(mut self, format: LabelFormat) -> Self {
        self.label_format = format;
        self
    }

    pub fn label_position(mut self, position: LabelPosition) -> Self {
        self.label_position = position;
        self
    }
}

/// One bar, fully resolved from a table row
#[derive(Debug, Clone, PartialEq)]
pub struct Bar {
    pub label: String,
    pub value: f64,
    pub text: String,
    pub color: RGBColor,
}

pub trait ChartRenderer {
    /// Renders `table` as described by `spec`, returning the artifact path.
    fn render(&self, table: &RollupTable, spec: &ChartSpec) -> Result<PathBuf, RenderError>;
}

/// Resolves every table row into a [`Bar`], in table order.
pub fn prepare_bars(table: &RollupTable, spec: &ChartSpec) -> Result<Vec<Bar>, RenderError> {
    if table.is_empty() {
        return Err(RenderError::EmptyTable(spec.output_name.clone()));
    }

    let resolve = |column: &str| {
        table.column(column).map_err(|e| match e {
            ComputeError::MissingColumn(column) => RenderError::MissingColumn {
                chart: spec.output_name.clone(),
                column,
            },
            other => RenderError::Draw(other.to_string()),
        })
    };

    let x_ref = resolve(&spec.x_col)?;
    let y_ref = resolve(&spec.y_col)?;
    let color_ref = match &spec.color_map {
        Some(map) => Some((map, resolve(&map.column)?)),
        None => None,
    };

    table
        .rows
        .iter()
        .map(|row| {
            let label = table
                .value(row, x_ref)
                .map(|v| v.to_string())
                .unwrap_or_default();
            let value = table
                .value(row, y_ref)
                .and_then(|v| v.as_f64())
                .ok_or_else(|| RenderError::NonNumeric {
                    chart: spec.output_name.clone(),
                    column: spec.y_col.clone(),
                })?;
            let color = color_ref
                .and_then(|(map, col)| {
                    table
                        .value(row, col)
                        .and_then(|key| map.get(&key.to_string()))
                })
                .unwrap_or(DEFAULT_BAR_COLOR);

            Ok(Bar {
                label,
                value,
                text: spec.label_format.format(value),
                color,
            })
        })
        .collect()
}

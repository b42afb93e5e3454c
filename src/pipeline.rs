//! One batch run: load the cube, compute every rollup, render every chart.

use std::path::PathBuf;

use thiserror::Error;
use tracing::{error, info};

use crate::config::PipelineConfig;
use crate::cube::{CATEGORY, CubeLoader, LoadError, NAME, PAYMENT_TYPE, PRODUCT_NAME, REGION};
use crate::render::{ChartRenderer, ChartSpec, ColorMap, LabelFormat, LabelPosition, RenderError};
use crate::rollup::{PAYMENT_TYPE_COUNT, RollupEngine, RollupError, RollupKind, Rollups, TOTAL_SALES};

/// Rows shown on the overall top-customers chart
pub const TOP_CUSTOMERS_SHOWN: usize = 5;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Compute(#[from] RollupError),

    #[error("rendering {chart} failed: {source}")]
    Render {
        chart: String,
        #[source]
        source: RenderError,
    },
}

/// Chart bindings for one rollup
pub fn chart_spec(kind: RollupKind) -> ChartSpec {
    let sales_axis = "Total Sales (USD)";
    match kind {
        RollupKind::TopCustomers => ChartSpec::new("top_customers", NAME, TOTAL_SALES)
            .title("Top Customers Overall")
            .axis_labels("Customer", sales_axis)
            .label_position(LabelPosition::Center),
        RollupKind::TopCustomersByRegion => {
            ChartSpec::new("top_customers_per_region", NAME, TOTAL_SALES)
                .title("Top Customers per Region")
                .axis_labels("Customer", sales_axis)
                .color_by(ColorMap::regions(REGION))
        }
        RollupKind::RevenueByRegion => ChartSpec::new("revenue_by_region", REGION, TOTAL_SALES)
            .title("Top Customer Revenue by Region")
            .axis_labels("Region", sales_axis),
        RollupKind::TopCategoryByRegion => {
            ChartSpec::new("top_categories_by_region", CATEGORY, TOTAL_SALES)
                .title("Top Category per Region")
                .axis_labels("Category", sales_axis)
                .color_by(ColorMap::regions(REGION))
        }
        RollupKind::TopProductByRegion => {
            ChartSpec::new("top_products_by_region", PRODUCT_NAME, TOTAL_SALES)
                .title("Top Products per Region")
                .axis_labels("Products", sales_axis)
                .color_by(ColorMap::regions(REGION))
        }
        RollupKind::PaymentPreference => {
            ChartSpec::new("preferred_payment", PAYMENT_TYPE, PAYMENT_TYPE_COUNT)
                .title("Preferred Payment Method")
                .axis_labels("Payment Type", "Count")
                .color_by(ColorMap::regions(REGION))
                .label_format(LabelFormat::Count)
        }
    }
}

pub struct Pipeline<R: ChartRenderer> {
    loader: CubeLoader,
    engine: RollupEngine,
    renderer: R,
}

impl<R: ChartRenderer> Pipeline<R> {
    pub fn new(config: &PipelineConfig, renderer: R) -> Self {
        Pipeline {
            loader: CubeLoader::new(config),
            engine: RollupEngine::default(),
            renderer,
        }
    }

    pub fn with_engine(mut self, engine: RollupEngine) -> Self {
        self.engine = engine;
        self
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    /// Runs the whole batch. The first failure stops the run.
    pub fn run(&self) -> Result<Vec<PathBuf>, PipelineError> {
        info!("Starting analysis...");

        let cube = self.loader.load()?;
        let rollups = self.engine.compute(&cube)?;
        let artifacts = self.render_all(&rollups)?;

        info!("Analysis complete: {} charts written.", artifacts.len());
        Ok(artifacts)
    }

    /// Renders the six charts in a fixed order.
    pub fn render_all(&self, rollups: &Rollups) -> Result<Vec<PathBuf>, PipelineError> {
        let mut artifacts = Vec::with_capacity(RollupKind::ALL.len());

        for kind in RollupKind::ALL {
            let spec = chart_spec(kind);
            let table = match kind {
                RollupKind::TopCustomers => rollups.top_customers.head(TOP_CUSTOMERS_SHOWN),
                other => rollups.table(other).clone(),
            };

            let path = self.renderer.render(&table, &spec).map_err(|source| {
                error!("Error rendering {}: {}", spec.output_name, source);
                PipelineError::Render {
                    chart: spec.output_name.clone(),
                    source,
                }
            })?;
            artifacts.push(path);
        }

        Ok(artifacts)
    }
}

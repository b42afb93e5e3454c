//! # cube_rollups
//!
//! Derives secondary sales rollups from a precomputed OLAP cube and renders
//! each one as a bar chart.
//!
//! - Memory-mapped, parallel CSV loading into a columnar store
//! - Multi-key group-by in first-seen order
//! - Dense ranking with top-N filtering inside a partition
//! - One parameterised chart renderer (PNG via `plotters`)
//!
//! # Rollups
//!
//! | Rollup | Key | Measure |
//! |---|---|---|
//! | top customers | customer_id, name, region | sum of `sale_amount_sum` |
//! | top customers per region | same, dense rank ≤ 3 in region | TotalSales |
//! | revenue by region | region, over the ranked table | sum of TotalSales |
//! | top category per region | region, category, rank ≤ 1 | sum |
//! | top product per region | region, product_id, product_name, rank ≤ 1 | sum |
//! | payment preference | region, paymnt_type | row count |
//!
//! # Example
//!
//! ```no_run
//! use cube_rollups::config::PipelineConfig;
//! use cube_rollups::pipeline::Pipeline;
//! use cube_rollups::render::PlottersRenderer;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PipelineConfig::from_project_root("/srv/sales");
//!     let pipeline = Pipeline::new(&config, PlottersRenderer::new(&config));
//!     for chart in pipeline.run()? {
//!         println!("wrote {}", chart.display());
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod cube;
pub mod pipeline;
pub mod processor;
pub mod render;
pub mod rollup;

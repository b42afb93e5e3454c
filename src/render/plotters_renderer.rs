use std::fs;
use std::path::{Path, PathBuf};

use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};
use tracing::{error, info};

use crate::config::PipelineConfig;
use crate::render::{
    Bar, ChartRenderer, ChartSpec, LabelPosition, RenderError, prepare_bars,
};
use crate::rollup::RollupTable;

const WIDTH: u32 = 1200;
const HEIGHT: u32 = 800;
const FONT: &str = "sans-serif";
const X_LABEL_AREA: u32 = 200;
const TICK_LABEL_GAP: i32 = 8;

/// Writes PNG bar charts into the configured results directory.
///
/// Charts are drawn into memory and written through a temporary file that is
/// renamed into place, so a failed render never leaves a partial image.
#[derive(Debug, Clone)]
pub struct PlottersRenderer {
    results_dir: PathBuf,
}

impl PlottersRenderer {
    pub fn new(config: &PipelineConfig) -> Self {
        PlottersRenderer {
            results_dir: config.results_dir.clone(),
        }
    }

    pub fn results_dir(&self) -> &Path {
        &self.results_dir
    }

    /// Creates the results directory if it does not exist yet
    pub fn ensure_results_dir(&self) -> Result<(), RenderError> {
        fs::create_dir_all(&self.results_dir)?;
        Ok(())
    }

    fn draw(&self, bars: &[Bar], spec: &ChartSpec) -> Result<Vec<u8>, RenderError> {
        let mut buf = vec![0u8; (WIDTH * HEIGHT * 3) as usize];
        {
            let root = BitMapBackend::with_buffer(&mut buf, (WIDTH, HEIGHT)).into_drawing_area();
            root.fill(&WHITE).map_err(draw_err)?;

            // one unit per bar, ticks on bar centres
            let slots = bars.len() as f64;
            let centers: Vec<f64> = (0..bars.len()).map(|i| i as f64 + 0.5).collect();
            let (y_min, y_max) = value_range(bars);
            let mut chart = ChartBuilder::on(&root)
                .caption(&spec.title, (FONT, 28))
                .margin(20)
                .x_label_area_size(X_LABEL_AREA)
                .y_label_area_size(100)
                .build_cartesian_2d((0.0..slots).with_key_points(centers), y_min..y_max)
                .map_err(draw_err)?;

            let x_labels = |_: &f64| String::new();
            let y_labels = |v: &f64| spec.label_format.format(*v);

            // Tick labels are drawn below, the mesh centres rotated text on the tick
            chart
                .configure_mesh()
                .disable_x_mesh()
                .x_label_formatter(&x_labels)
                .y_label_formatter(&y_labels)
                .x_desc(spec.x_label.as_str())
                .y_desc(spec.y_label.as_str())
                .axis_desc_style((FONT, 16))
                .draw()
                .map_err(draw_err)?;

            let tick_style = TextStyle::from((FONT, 14).into_font())
                .transform(FontTransform::Rotate90)
                .pos(Pos::new(HPos::Left, VPos::Center));
            for (i, bar) in bars.iter().enumerate() {
                let (x, y) = chart.backend_coord(&(i as f64 + 0.5, y_min));
                root.draw(&Text::new(
                    bar.label.as_str(),
                    (x, y + TICK_LABEL_GAP),
                    tick_style.clone(),
                ))
                .map_err(draw_err)?;
            }

            chart
                .draw_series(bars.iter().enumerate().map(|(i, bar)| {
                    let mut rect = Rectangle::new(
                        [(i as f64, 0.0), (i as f64 + 1.0, bar.value)],
                        bar.color.filled(),
                    );
                    rect.set_margin(0, 0, 6, 6);
                    rect
                }))
                .map_err(draw_err)?;

            let label_style = TextStyle::from((FONT, 14).into_font());
            chart
                .draw_series(bars.iter().enumerate().map(|(i, bar)| {
                    let (y, anchor) = match spec.label_position {
                        LabelPosition::Center => (bar.value / 2.0, VPos::Center),
                        LabelPosition::Edge => (bar.value, VPos::Bottom),
                    };
                    Text::new(
                        bar.text.clone(),
                        (i as f64 + 0.5, y),
                        label_style.pos(Pos::new(HPos::Center, anchor)),
                    )
                }))
                .map_err(draw_err)?;

            if let Some(map) = &spec.color_map {
                for (key, color) in &map.colors {
                    let color = *color;
                    chart
                        .draw_series(std::iter::empty::<Rectangle<(f64, f64)>>())
                        .map_err(draw_err)?
                        .label(key.as_str())
                        .legend(move |(x, y)| {
                            Rectangle::new([(x, y - 6), (x + 12, y + 6)], color.filled())
                        });
                }
                chart
                    .configure_series_labels()
                    .position(SeriesLabelPosition::UpperRight)
                    .background_style(WHITE.mix(0.85))
                    .border_style(BLACK)
                    .label_font((FONT, 14))
                    .draw()
                    .map_err(draw_err)?;
            }

            root.present().map_err(draw_err)?;
        }
        Ok(buf)
    }
}

impl ChartRenderer for PlottersRenderer {
    fn render(&self, table: &RollupTable, spec: &ChartSpec) -> Result<PathBuf, RenderError> {
        let result = prepare_bars(table, spec).and_then(|bars| {
            self.ensure_results_dir()?;
            let pixels = self.draw(&bars, spec)?;

            let output_path = self.results_dir.join(format!("{}.png", spec.output_name));
            let tmp_path = self
                .results_dir
                .join(format!(".{}.png.partial", spec.output_name));
            image::save_buffer_with_format(
                &tmp_path,
                &pixels,
                WIDTH,
                HEIGHT,
                image::ColorType::Rgb8,
                image::ImageFormat::Png,
            )?;
            fs::rename(&tmp_path, &output_path)?;
            Ok(output_path)
        });

        match result {
            Ok(path) => {
                info!("Bar chart saved to {}.", path.display());
                Ok(path)
            }
            Err(e) => {
                error!("Error creating visual `{}`: {}", spec.output_name, e);
                Err(e)
            }
        }
    }
}

fn draw_err<E: std::fmt::Display>(e: E) -> RenderError {
    RenderError::Draw(e.to_string())
}

/// Y range covering every bar plus headroom for edge labels
fn value_range(bars: &[Bar]) -> (f64, f64) {
    let max = bars.iter().map(|b| b.value).fold(0.0, f64::max);
    let min = bars.iter().map(|b| b.value).fold(0.0, f64::min);
    let top = if max > 0.0 { max * 1.15 } else { 1.0 };
    let bottom = if min < 0.0 { min * 1.15 } else { 0.0 };
    (bottom, top)
}

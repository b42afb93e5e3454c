use cube_rollups::config::PipelineConfig;
use cube_rollups::pipeline::Pipeline;
use cube_rollups::render::PlottersRenderer;
use tracing_subscriber::EnvFilter;

#[cfg(not(target_env = "msvc"))]
use jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = PipelineConfig::default();
    config.log_paths();

    let renderer = PlottersRenderer::new(&config);
    renderer.ensure_results_dir()?;

    let pipeline = Pipeline::new(&config, renderer);
    pipeline.run()?;

    Ok(())
}

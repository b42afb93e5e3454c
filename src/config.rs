use std::path::{Path, PathBuf};

use tracing::info;

pub const CUBE_FILE_NAME: &str = "multidimensional_olap_cube.csv";

/// Filesystem layout of one pipeline run, derived from a single project root.
///
/// ```text
/// <root>/data/olap_cubing_outputs/multidimensional_olap_cube.csv   (input)
/// <root>/data/results/*.png                                          (output)
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub project_root: PathBuf,
    pub data_dir: PathBuf,
    pub cube_dir: PathBuf,
    pub cube_file: PathBuf,
    pub results_dir: PathBuf,
}

impl PipelineConfig {
    pub fn from_project_root(root: impl AsRef<Path>) -> Self {
        let project_root = root.as_ref().to_path_buf();
        let data_dir = project_root.join("data");
        let cube_dir = data_dir.join("olap_cubing_outputs");
        let cube_file = cube_dir.join(CUBE_FILE_NAME);
        let results_dir = data_dir.join("results");

        PipelineConfig {
            project_root,
            data_dir,
            cube_dir,
            cube_file,
            results_dir,
        }
    }

    pub fn result_path(&self, output_name: &str) -> PathBuf {
        self.results_dir.join(format!("{}.png", output_name))
    }

    pub fn log_paths(&self) {
        info!("PROJECT_ROOT_DIR:    {}", self.project_root.display());
        info!("DATA_DIR:            {}", self.data_dir.display());
        info!("OLAP_OUTPUT_DIR:     {}", self.cube_dir.display());
        info!("CUBED_FILE:          {}", self.cube_file.display());
        info!("RESULTS_OUTPUT_DIR:  {}", self.results_dir.display());
    }
}

/// The crate root is the fixed project root.
impl Default for PipelineConfig {
    fn default() -> Self {
        Self::from_project_root(env!("CARGO_MANIFEST_DIR"))
    }
}

//! Loading the precomputed OLAP cube into the column store.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, error, info};

use crate::config::PipelineConfig;
use crate::processor::{
    ParseError, ProcessorError, column::ColumnType, columnar_processor::ColumnarProcessor,
};

pub const CUSTOMER_ID: &str = "customer_id";
pub const NAME: &str = "name";
pub const REGION: &str = "region";
pub const CATEGORY: &str = "category";
pub const PRODUCT_ID: &str = "product_id";
pub const PRODUCT_NAME: &str = "product_name";
pub const PAYMENT_TYPE: &str = "paymnt_type";
pub const SALE_AMOUNT_SUM: &str = "sale_amount_sum";

/// Columns every cube must carry, with the type they are read as.
pub const CUBE_SCHEMA: [(&str, ColumnType); 8] = [
    (CUSTOMER_ID, ColumnType::Int64),
    (NAME, ColumnType::Str),
    (REGION, ColumnType::Str),
    (CATEGORY, ColumnType::Str),
    (PRODUCT_ID, ColumnType::Int64),
    (PRODUCT_NAME, ColumnType::Str),
    (PAYMENT_TYPE, ColumnType::Str),
    (SALE_AMOUNT_SUM, ColumnType::Float64),
];

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot read cube {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: ProcessorError,
    },

    #[error("cube {path} is missing required columns: {}", .missing.join(", "))]
    MissingColumns { path: PathBuf, missing: Vec<String> },

    #[error("cube {path} is malformed: {first} ({count} problem(s) in total)")]
    Malformed {
        path: PathBuf,
        first: ParseError,
        count: usize,
    },
}

/// A loaded, schema-checked cube. Immutable once built.
#[derive(Debug)]
pub struct Cube {
    processor: ColumnarProcessor,
}

impl Cube {
    /// Reads a cube CSV, forcing [`CUBE_SCHEMA`] types on the known columns.
    ///
    /// Any rejected line or field fails the whole load.
    pub fn from_csv(path: &Path) -> Result<Self, LoadError> {
        let mut processor = ColumnarProcessor::new();
        let summary = processor
            .load_csv_with_schema(path, &CUBE_SCHEMA)
            .map_err(|source| LoadError::Read {
                path: path.to_path_buf(),
                source,
            })?;

        let missing: Vec<String> = CUBE_SCHEMA
            .iter()
            .filter(|(name, _)| !processor.headers().iter().any(|h| h == name))
            .map(|(name, _)| name.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(LoadError::MissingColumns {
                path: path.to_path_buf(),
                missing,
            });
        }

        if let Some(first) = summary.errors.first() {
            return Err(LoadError::Malformed {
                path: path.to_path_buf(),
                first: first.clone(),
                count: summary.errors.len(),
            });
        }

        debug!(
            rows = summary.rows_processed,
            columns = processor.headers().len(),
            "cube parsed"
        );
        Ok(Cube { processor })
    }

    pub fn processor(&self) -> &ColumnarProcessor {
        &self.processor
    }

    pub fn row_count(&self) -> usize {
        self.processor.row_count()
    }
}

/// Reads the cube file named by a [`PipelineConfig`].
#[derive(Debug, Clone)]
pub struct CubeLoader {
    cube_file: PathBuf,
}

impl CubeLoader {
    pub fn new(config: &PipelineConfig) -> Self {
        CubeLoader {
            cube_file: config.cube_file.clone(),
        }
    }

    pub fn load(&self) -> Result<Cube, LoadError> {
        match Cube::from_csv(&self.cube_file) {
            Ok(cube) => {
                info!(
                    "OLAP cube data successfully loaded from {} ({} rows).",
                    self.cube_file.display(),
                    cube.row_count()
                );
                Ok(cube)
            }
            Err(e) => {
                error!("Error loading OLAP cube data: {}", e);
                Err(e)
            }
        }
    }
}

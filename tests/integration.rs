use std::cell::RefCell;
use std::fs;
use std::io::Write;
use std::path::PathBuf;

use cube_rollups::config::PipelineConfig;
use cube_rollups::cube::{Cube, CubeLoader};
use cube_rollups::pipeline::{Pipeline, PipelineError, chart_spec};
use cube_rollups::processor::{AggregateOp, AggregateResult, Value};
use cube_rollups::render::{ChartRenderer, ChartSpec, LabelFormat, RenderError, prepare_bars};
use cube_rollups::rollup::{RollupEngine, RollupKind, RollupTable};
use tempfile::TempDir;

const HEADER: &str =
    "customer_id,name,region,category,product_id,product_name,paymnt_type,sale_amount_sum";

const CUBE_ROWS: [&str; 12] = [
    "1001,William White,East,Electronics,101,Laptop,Credit,6534.6",
    "1002,Wylie Coyote,East,Clothing,102,Hoodie,Debit,420.12",
    "1003,Dan Brown,West,Electronics,103,Cable,Cash,300",
    "1001,William White,East,Clothing,104,Hat,Credit,45.5",
    "1004,Chewie Chewbacca,North,Sports,105,Football,PayPal,86.4",
    "1005,Dr Who,North,Electronics,101,Laptop,Credit,6534.6",
    "1006,Hermione Granger,South,Electronics,106,Controller,Debit,1002.2",
    "1007,Tiffany James,South,Clothing,107,Jacket,Credit,1002.2",
    "1008,Tom Thumb,South,Sports,108,Protector,Cash,500",
    "1009,Bugs Bunny,South,Sports,105,Football,Cash,250",
    "1003,Dan Brown,West,Sports,108,Protector,Debit,12.75",
    "1004,Chewie Chewbacca,North,Electronics,103,Cable,PayPal,19.9",
];

/// Records every render call instead of drawing.
#[derive(Default)]
struct RecordingRenderer {
    calls: RefCell<Vec<(ChartSpec, RollupTable)>>,
    fail_on: Option<&'static str>,
}

impl ChartRenderer for RecordingRenderer {
    fn render(&self, table: &RollupTable, spec: &ChartSpec) -> Result<PathBuf, RenderError> {
        if self.fail_on == Some(spec.output_name.as_str()) {
            return Err(RenderError::Draw("backend unavailable".into()));
        }
        prepare_bars(table, spec)?;
        self.calls.borrow_mut().push((spec.clone(), table.clone()));
        Ok(PathBuf::from(format!("{}.png", spec.output_name)))
    }
}

fn project_with_cube(rows: &[&str]) -> (TempDir, PipelineConfig) {
    let dir = TempDir::new().unwrap();
    let config = PipelineConfig::from_project_root(dir.path());
    fs::create_dir_all(&config.cube_dir).unwrap();
    let mut file = fs::File::create(&config.cube_file).unwrap();
    writeln!(file, "{}", HEADER).unwrap();
    for row in rows {
        writeln!(file, "{}", row).unwrap();
    }
    (dir, config)
}

fn names(table: &RollupTable) -> Vec<String> {
    let idx = table.dimensions.iter().position(|d| d == "name").unwrap();
    table.rows.iter().map(|r| r.keys[idx].to_string()).collect()
}

#[test]
fn test_pipeline_renders_six_charts_in_order() {
    let (_dir, config) = project_with_cube(&CUBE_ROWS);
    let pipeline = Pipeline::new(&config, RecordingRenderer::default());

    let artifacts = pipeline.run().unwrap();
    let outputs: Vec<String> = artifacts
        .iter()
        .map(|p| p.to_string_lossy().to_string())
        .collect();
    assert_eq!(
        outputs,
        vec![
            "top_customers.png",
            "top_customers_per_region.png",
            "revenue_by_region.png",
            "top_categories_by_region.png",
            "top_products_by_region.png",
            "preferred_payment.png",
        ]
    );

    let calls = pipeline.renderer().calls.borrow();
    // overall chart only shows the first five customers
    assert_eq!(calls[0].1.len(), 5);
    assert_eq!(
        names(&calls[0].1),
        vec!["William White", "Dr Who", "Hermione Granger", "Tiffany James", "Tom Thumb"]
    );
    assert_eq!(calls[5].0.label_format, LabelFormat::Count);
}

#[test]
fn test_top_customers_total_matches_cube_total() {
    let (_dir, config) = project_with_cube(&CUBE_ROWS);
    let cube = CubeLoader::new(&config).load().unwrap();
    let rollups = RollupEngine::new().compute(&cube).unwrap();

    let cube_total = cube
        .processor()
        .aggregate("sale_amount_sum", AggregateOp::Sum)
        .unwrap()
        .as_f64();
    assert!((rollups.top_customers.total() - cube_total).abs() < 1e-6);
}

#[test]
fn test_revenue_by_region_covers_only_ranked_customers() {
    let (_dir, config) = project_with_cube(&CUBE_ROWS);
    let cube = CubeLoader::new(&config).load().unwrap();
    let rollups = RollupEngine::new().compute(&cube).unwrap();

    // South has four customers: 1002.2, 1002.2, 500, 250 -> ranks 1, 1, 2, 3
    let south: Vec<u32> = rollups
        .top_customers_by_region
        .rows
        .iter()
        .filter(|r| r.keys[2] == Value::from("South"))
        .map(|r| r.rank.unwrap())
        .collect();
    assert_eq!(south, vec![1, 1, 2, 3]);

    let south_revenue = rollups
        .revenue_by_region
        .rows
        .iter()
        .find(|r| r.keys[0] == Value::from("South"))
        .unwrap();
    assert!((south_revenue.measure.as_f64() - 2754.4).abs() < 1e-6);
    assert!(
        (rollups.revenue_by_region.total() - rollups.top_customers_by_region.total()).abs() < 1e-6
    );

    let regions: Vec<String> = rollups
        .revenue_by_region
        .rows
        .iter()
        .map(|r| r.keys[0].to_string())
        .collect();
    assert_eq!(regions, vec!["East", "North", "South", "West"]);
}

#[test]
fn test_dense_ranks_are_contiguous_per_region() {
    let (_dir, config) = project_with_cube(&CUBE_ROWS);
    let cube = CubeLoader::new(&config).load().unwrap();
    let rollups = RollupEngine {
        customers_per_region: u32::MAX,
        ..RollupEngine::default()
    }
    .compute(&cube)
    .unwrap();

    for region in ["East", "North", "South", "West"] {
        let mut ranks: Vec<u32> = rollups
            .top_customers_by_region
            .rows
            .iter()
            .filter(|r| r.keys[2] == Value::from(region))
            .map(|r| r.rank.unwrap())
            .collect();
        ranks.sort();
        ranks.dedup();
        let expected: Vec<u32> = (1..=ranks.len() as u32).collect();
        assert_eq!(ranks, expected, "region {region}");
    }
}

#[test]
fn test_single_customer_rows_collapse() {
    let (_dir, config) = project_with_cube(&[
        "1,A,North,Toys,10,Robot,card,100",
        "1,A,North,Toys,10,Robot,card,50",
    ]);
    let cube = CubeLoader::new(&config).load().unwrap();
    let rollups = RollupEngine::new().compute(&cube).unwrap();

    assert_eq!(rollups.top_customers.len(), 1);
    let row = &rollups.top_customers.rows[0];
    assert_eq!(
        row.keys,
        vec![Value::Int(1), Value::from("A"), Value::from("North")]
    );
    assert_eq!(row.measure, AggregateResult::Float(150.0));
    assert_eq!(rollups.payment_preference.rows[0].measure, AggregateResult::Int(2));
}

#[test]
fn test_runs_are_idempotent() {
    let (_dir, config) = project_with_cube(&CUBE_ROWS);
    let engine = RollupEngine::new();
    let first = engine.compute(&Cube::from_csv(&config.cube_file).unwrap()).unwrap();
    let second = engine.compute(&Cube::from_csv(&config.cube_file).unwrap()).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.top_customers.to_string(), second.top_customers.to_string());
}

#[test]
fn test_pipeline_uses_configured_engine() {
    let (_dir, config) = project_with_cube(&CUBE_ROWS);
    let engine = RollupEngine {
        customers_per_region: 1,
        ..RollupEngine::default()
    };
    let pipeline = Pipeline::new(&config, RecordingRenderer::default()).with_engine(engine);
    pipeline.run().unwrap();

    let calls = pipeline.renderer().calls.borrow();
    // South ties at the top, every other region has a single leader
    assert_eq!(
        names(&calls[1].1),
        vec!["William White", "Dr Who", "Hermione Granger", "Tiffany James", "Dan Brown"]
    );
}

#[test]
fn test_missing_cube_fails_before_any_render() {
    let dir = TempDir::new().unwrap();
    let config = PipelineConfig::from_project_root(dir.path());
    let pipeline = Pipeline::new(&config, RecordingRenderer::default());

    let err = pipeline.run().unwrap_err();
    assert!(matches!(err, PipelineError::Load(_)));
    assert!(pipeline.renderer().calls.borrow().is_empty());
}

#[test]
fn test_render_failure_stops_the_run() {
    let (_dir, config) = project_with_cube(&CUBE_ROWS);
    let renderer = RecordingRenderer {
        fail_on: Some("revenue_by_region"),
        ..RecordingRenderer::default()
    };
    let pipeline = Pipeline::new(&config, renderer);

    match pipeline.run().unwrap_err() {
        PipelineError::Render { chart, .. } => assert_eq!(chart, "revenue_by_region"),
        other => panic!("unexpected error: {other}"),
    }
    // the two charts before the failure were rendered, nothing after
    assert_eq!(pipeline.renderer().calls.borrow().len(), 2);
}

#[test]
fn test_header_only_cube_fails_at_first_render() {
    let (_dir, config) = project_with_cube(&[]);
    let pipeline = Pipeline::new(&config, RecordingRenderer::default());

    match pipeline.run().unwrap_err() {
        PipelineError::Render { chart, source } => {
            assert_eq!(chart, "top_customers");
            assert!(matches!(source, RenderError::EmptyTable(_)));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_every_chart_spec_binds_existing_columns() {
    let (_dir, config) = project_with_cube(&CUBE_ROWS);
    let cube = CubeLoader::new(&config).load().unwrap();
    let rollups = RollupEngine::new().compute(&cube).unwrap();

    for kind in RollupKind::ALL {
        let spec = chart_spec(kind);
        let bars = prepare_bars(rollups.table(kind), &spec).unwrap();
        assert_eq!(bars.len(), rollups.table(kind).len(), "{kind}");
    }
}

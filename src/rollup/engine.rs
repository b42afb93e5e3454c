use std::collections::HashMap;

use tracing::{debug, error, info};

use crate::cube::{
    CATEGORY, CUSTOMER_ID, Cube, NAME, PAYMENT_TYPE, PRODUCT_ID, PRODUCT_NAME, REGION,
    SALE_AMOUNT_SUM,
};
use crate::processor::{AggregateOp, AggregateResult, Value};
use crate::rollup::{
    ComputeError, PAYMENT_TYPE_COUNT, RollupError, RollupKind, RollupRow, RollupTable,
    TOTAL_SALES, rank_within_group,
};

/// The six derived tables of one run.
#[derive(Debug, Clone, PartialEq)]
pub struct Rollups {
    /// Every customer, largest TotalSales first
    pub top_customers: RollupTable,
    pub top_customers_by_region: RollupTable,
    pub revenue_by_region: RollupTable,
    pub top_category_by_region: RollupTable,
    pub top_product_by_region: RollupTable,
    pub payment_preference: RollupTable,
}

impl Rollups {
    pub fn table(&self, kind: RollupKind) -> &RollupTable {
        match kind {
            RollupKind::TopCustomers => &self.top_customers,
            RollupKind::TopCustomersByRegion => &self.top_customers_by_region,
            RollupKind::RevenueByRegion => &self.revenue_by_region,
            RollupKind::TopCategoryByRegion => &self.top_category_by_region,
            RollupKind::TopProductByRegion => &self.top_product_by_region,
            RollupKind::PaymentPreference => &self.payment_preference,
        }
    }
}

/// Computes every rollup from one cube snapshot.
///
/// Groups come out in first-seen cube order and every later sort is stable,
/// so rows with equal measures keep the order in which their key first
/// appeared in the cube.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RollupEngine {
    pub customers_per_region: u32,
    pub categories_per_region: u32,
    pub products_per_region: u32,
}

impl Default for RollupEngine {
    fn default() -> Self {
        RollupEngine {
            customers_per_region: 3,
            categories_per_region: 1,
            products_per_region: 1,
        }
    }
}

impl RollupEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn compute(&self, cube: &Cube) -> Result<Rollups, RollupError> {
        let top_customers = logged(RollupKind::TopCustomers, compute_top_customers(cube))?;
        info!("Top customers identified.");

        let top_customers_by_region = logged(
            RollupKind::TopCustomersByRegion,
            compute_top_customers_by_region(&top_customers, self.customers_per_region),
        )?;
        info!("Top customers per region ranked in ascending order complete.");

        let revenue_by_region = logged(
            RollupKind::RevenueByRegion,
            compute_revenue_by_region(&top_customers_by_region),
        )?;
        info!("Revenue of top customers per region computed.");

        let top_category_by_region = logged(
            RollupKind::TopCategoryByRegion,
            compute_top_category_by_region(cube, self.categories_per_region),
        )?;
        info!("Top category per region identified.");

        let top_product_by_region = logged(
            RollupKind::TopProductByRegion,
            compute_top_product_by_region(cube, self.products_per_region),
        )?;
        info!("Top product per region identified.");

        let payment_preference = logged(
            RollupKind::PaymentPreference,
            compute_payment_preference(cube),
        )?;
        info!("Preferred payment method per region counted.");

        Ok(Rollups {
            top_customers,
            top_customers_by_region,
            revenue_by_region,
            top_category_by_region,
            top_product_by_region,
            payment_preference,
        })
    }
}

fn logged(kind: RollupKind, result: Result<RollupTable, ComputeError>) -> Result<RollupTable, RollupError> {
    match result {
        Ok(table) => {
            debug!(rollup = kind.name(), rows = table.len(), "rollup computed\n{}", table);
            Ok(table)
        }
        Err(source) => {
            error!("Error getting {}: {}", kind, source);
            Err(RollupError { rollup: kind, source })
        }
    }
}

/// Sum of `sale_amount_sum` per (customer_id, name, region), largest first.
pub fn compute_top_customers(cube: &Cube) -> Result<RollupTable, ComputeError> {
    let keys = [CUSTOMER_ID, NAME, REGION];
    let grouped = cube
        .processor()
        .group_by(&keys, SALE_AMOUNT_SUM, AggregateOp::Sum)?;

    let mut table = RollupTable::from_grouped(&keys, TOTAL_SALES, grouped);
    table.sort_by_measure_desc();
    Ok(table)
}

/// Customers dense-ranked within their region, ranks `<= keep_rank` kept,
/// ordered by region.
pub fn compute_top_customers_by_region(
    top_customers: &RollupTable,
    keep_rank: u32,
) -> Result<RollupTable, ComputeError> {
    let mut table = rank_within_group(top_customers, REGION, TOTAL_SALES, keep_rank)?;
    table.sort_by_columns(&[REGION])?;
    Ok(table)
}

/// TotalSales summed per region over the already-filtered top customers, so
/// this is the revenue of the top customers only. Ordered by region.
pub fn compute_revenue_by_region(top_by_region: &RollupTable) -> Result<RollupTable, ComputeError> {
    let region = top_by_region.column(REGION)?;
    let measure = top_by_region.column(TOTAL_SALES)?;

    let mut index: HashMap<Value, usize> = HashMap::new();
    let mut rows: Vec<RollupRow> = Vec::new();
    for row in &top_by_region.rows {
        let key = top_by_region
            .value(row, region)
            .ok_or_else(|| ComputeError::MissingColumn(REGION.to_string()))?;
        let sales = top_by_region
            .value(row, measure)
            .and_then(|v| v.as_f64())
            .ok_or_else(|| ComputeError::NonNumericMeasure(TOTAL_SALES.to_string()))?;

        match index.get(&key) {
            Some(&slot) => {
                let total = rows[slot].measure.as_f64() + sales;
                rows[slot].measure = AggregateResult::Float(total);
            }
            None => {
                index.insert(key.clone(), rows.len());
                rows.push(RollupRow {
                    keys: vec![key],
                    measure: AggregateResult::Float(sales),
                    rank: None,
                });
            }
        }
    }

    let mut table = RollupTable {
        dimensions: vec![REGION.to_string()],
        measure: TOTAL_SALES.to_string(),
        rows,
    };
    table.sort_by_columns(&[REGION])?;
    Ok(table)
}

fn top_per_region(
    cube: &Cube,
    keys: &[&str],
    keep_rank: u32,
) -> Result<RollupTable, ComputeError> {
    let grouped = cube
        .processor()
        .group_by(keys, SALE_AMOUNT_SUM, AggregateOp::Sum)?;
    let table = RollupTable::from_grouped(keys, TOTAL_SALES, grouped);

    let mut ranked = rank_within_group(&table, REGION, TOTAL_SALES, keep_rank)?;
    ranked.rows.sort_by_key(|r| r.rank);
    Ok(ranked)
}

/// Best-selling category of each region (ties all kept).
pub fn compute_top_category_by_region(
    cube: &Cube,
    keep_rank: u32,
) -> Result<RollupTable, ComputeError> {
    top_per_region(cube, &[REGION, CATEGORY], keep_rank)
}

/// Best-selling product of each region (ties all kept).
pub fn compute_top_product_by_region(
    cube: &Cube,
    keep_rank: u32,
) -> Result<RollupTable, ComputeError> {
    top_per_region(cube, &[REGION, PRODUCT_ID, PRODUCT_NAME], keep_rank)
}

/// Cube row count per (region, paymnt_type). Only combinations that occur
/// are present.
pub fn compute_payment_preference(cube: &Cube) -> Result<RollupTable, ComputeError> {
    let keys = [REGION, PAYMENT_TYPE];
    let grouped = cube
        .processor()
        .group_by(&keys, PAYMENT_TYPE, AggregateOp::Count)?;

    let mut table = RollupTable::from_grouped(&keys, PAYMENT_TYPE_COUNT, grouped);
    table.sort_by_columns(&keys)?;
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const HEADER: &str =
        "customer_id,name,region,category,product_id,product_name,paymnt_type,sale_amount_sum";

    fn cube_from_rows(rows: &[&str]) -> Cube {
        let mut tmp = NamedTempFile::new().unwrap();
        writeln!(tmp, "{}", HEADER).unwrap();
        for row in rows {
            writeln!(tmp, "{}", row).unwrap();
        }
        Cube::from_csv(tmp.path()).unwrap()
    }

    fn measures(table: &RollupTable) -> Vec<f64> {
        table.rows.iter().map(|r| r.measure.as_f64()).collect()
    }

    #[test]
    fn test_top_customers_sums_duplicate_rows() {
        let cube = cube_from_rows(&[
            "1,A,North,Toys,10,Robot,card,100",
            "1,A,North,Books,11,Atlas,cash,50",
        ]);
        let table = compute_top_customers(&cube).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(
            table.rows[0].keys,
            vec![Value::Int(1), Value::from("A"), Value::from("North")]
        );
        assert_eq!(table.rows[0].measure, AggregateResult::Float(150.0));
    }

    #[test]
    fn test_top_customers_sorted_desc_with_first_seen_ties() {
        let cube = cube_from_rows(&[
            "1,A,North,Toys,10,Robot,card,10",
            "2,B,South,Toys,10,Robot,card,30",
            "3,C,East,Toys,10,Robot,card,20",
            "4,D,West,Toys,10,Robot,card,30",
        ]);
        let table = compute_top_customers(&cube).unwrap();
        let names: Vec<String> = table.rows.iter().map(|r| r.keys[1].to_string()).collect();
        assert_eq!(names, vec!["B", "D", "C", "A"]);
        assert_eq!(table.head(2).len(), 2);
    }

    #[test]
    fn test_top_customers_preserves_cube_total() {
        let cube = cube_from_rows(&[
            "1,A,North,Toys,10,Robot,card,10.25",
            "2,B,South,Toys,10,Robot,card,30",
            "1,A,North,Food,12,Tea,cash,5.5",
            "1,A,South,Food,12,Tea,cash,4",
        ]);
        let table = compute_top_customers(&cube).unwrap();
        let cube_total = cube
            .processor()
            .aggregate(SALE_AMOUNT_SUM, AggregateOp::Sum)
            .unwrap()
            .as_f64();
        assert!((table.total() - cube_total).abs() < 1e-9);
        // same customer in two regions is two groups
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn test_top_customers_by_region_tied_scenario() {
        let cube = cube_from_rows(&[
            "1,A,South,Toys,10,Robot,card,300",
            "2,B,South,Toys,10,Robot,card,300",
            "3,C,South,Toys,10,Robot,cash,200",
        ]);
        let top = compute_top_customers(&cube).unwrap();
        let by_region = compute_top_customers_by_region(&top, 3).unwrap();
        let ranks: Vec<u32> = by_region.rows.iter().map(|r| r.rank.unwrap()).collect();
        assert_eq!(ranks, vec![1, 1, 2]);

        // unaffected by the customer filter
        let pref = compute_payment_preference(&cube).unwrap();
        assert_eq!(measures(&pref), vec![2.0, 1.0]);
    }

    #[test]
    fn test_missing_amounts_do_not_outrank_real_sales() {
        let cube = cube_from_rows(&[
            "1,A,North,Toys,10,Robot,card,NaN",
            "1,A,North,Toys,10,Robot,card,50",
            "2,B,North,Toys,10,Robot,card,40",
            "3,C,North,Toys,10,Robot,cash,",
        ]);
        let top = compute_top_customers(&cube).unwrap();
        assert_eq!(measures(&top), vec![50.0, 40.0, 0.0]);

        let by_region = compute_top_customers_by_region(&top, 3).unwrap();
        let ranked: Vec<(String, u32)> = by_region
            .rows
            .iter()
            .map(|r| (r.keys[1].to_string(), r.rank.unwrap()))
            .collect();
        assert_eq!(
            ranked,
            vec![("A".into(), 1), ("B".into(), 2), ("C".into(), 3)]
        );
    }

    #[test]
    fn test_top_customers_by_region_drops_fourth_rank_and_orders_regions() {
        let cube = cube_from_rows(&[
            "1,A,West,Toys,10,Robot,card,40",
            "2,B,West,Toys,10,Robot,card,30",
            "3,C,West,Toys,10,Robot,card,20",
            "4,D,West,Toys,10,Robot,card,10",
            "5,E,East,Toys,10,Robot,card,5",
        ]);
        let top = compute_top_customers(&cube).unwrap();
        let by_region = compute_top_customers_by_region(&top, 3).unwrap();
        let names: Vec<String> = by_region.rows.iter().map(|r| r.keys[1].to_string()).collect();
        assert_eq!(names, vec!["E", "A", "B", "C"]);
    }

    #[test]
    fn test_revenue_by_region_counts_only_retained_customers() {
        let cube = cube_from_rows(&[
            "1,A,West,Toys,10,Robot,card,40",
            "2,B,West,Toys,10,Robot,card,30",
            "3,C,West,Toys,10,Robot,card,20",
            "4,D,West,Toys,10,Robot,card,10",
            "5,E,Central,Toys,10,Robot,card,5",
        ]);
        let top = compute_top_customers(&cube).unwrap();
        let by_region = compute_top_customers_by_region(&top, 3).unwrap();
        let revenue = compute_revenue_by_region(&by_region).unwrap();

        let regions: Vec<String> = revenue.rows.iter().map(|r| r.keys[0].to_string()).collect();
        assert_eq!(regions, vec!["Central", "West"]);
        assert_eq!(measures(&revenue), vec![5.0, 90.0]);
        assert!((revenue.total() - by_region.total()).abs() < 1e-9);
    }

    #[test]
    fn test_top_category_and_product_keep_rank_one_ties() {
        let cube = cube_from_rows(&[
            "1,A,North,Toys,10,Robot,card,50",
            "2,B,North,Books,11,Atlas,card,50",
            "3,C,North,Food,12,Tea,card,10",
            "4,D,South,Food,12,Tea,cash,7",
            "5,E,South,Toys,10,Robot,cash,3",
        ]);
        let categories = compute_top_category_by_region(&cube, 1).unwrap();
        let picked: Vec<(String, String)> = categories
            .rows
            .iter()
            .map(|r| (r.keys[0].to_string(), r.keys[1].to_string()))
            .collect();
        assert_eq!(
            picked,
            vec![
                ("North".to_string(), "Toys".to_string()),
                ("North".to_string(), "Books".to_string()),
                ("South".to_string(), "Food".to_string()),
            ]
        );

        let products = compute_top_product_by_region(&cube, 1).unwrap();
        assert_eq!(products.dimensions, vec![REGION, PRODUCT_ID, PRODUCT_NAME]);
        assert_eq!(products.len(), 3);
        assert!(products.rows.iter().all(|r| r.rank == Some(1)));
    }

    #[test]
    fn test_payment_preference_is_sparse_and_sorted() {
        let cube = cube_from_rows(&[
            "1,A,South,Toys,10,Robot,card,1",
            "2,B,North,Toys,10,Robot,cash,1",
            "3,C,South,Toys,10,Robot,card,1",
            "4,D,North,Toys,10,Robot,card,1",
        ]);
        let pref = compute_payment_preference(&cube).unwrap();
        let rows: Vec<(String, String, i64)> = pref
            .rows
            .iter()
            .map(|r| {
                let count = match r.measure {
                    AggregateResult::Int(c) => c,
                    AggregateResult::Float(_) => panic!("count must be integral"),
                };
                (r.keys[0].to_string(), r.keys[1].to_string(), count)
            })
            .collect();
        assert_eq!(
            rows,
            vec![
                ("North".to_string(), "card".to_string(), 1),
                ("North".to_string(), "cash".to_string(), 1),
                ("South".to_string(), "card".to_string(), 2),
            ]
        );
    }

    #[test]
    fn test_compute_is_deterministic() {
        let rows = [
            "1,A,North,Toys,10,Robot,card,12.5",
            "2,B,North,Toys,10,Robot,card,12.5",
            "3,C,South,Books,11,Atlas,cash,8",
            "1,A,North,Books,11,Atlas,cash,1",
        ];
        let engine = RollupEngine::new();
        let first = engine.compute(&cube_from_rows(&rows)).unwrap();
        let second = engine.compute(&cube_from_rows(&rows)).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.table(RollupKind::RevenueByRegion).len(), 2);
    }
}

//! Derived tables computed from the cube and the ranking primitive they share.

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;

use crate::processor::{AggregateResult, GroupedRows, ProcessorError, Value};

pub mod engine;

pub use engine::{RollupEngine, Rollups};

pub const TOTAL_SALES: &str = "TotalSales";
pub const PAYMENT_TYPE_COUNT: &str = "paymnt_type_count";
pub const RANK: &str = "rank";

#[derive(Debug, Error)]
pub enum ComputeError {
    #[error(transparent)]
    Processor(#[from] ProcessorError),

    #[error("rollup table has no column `{0}`")]
    MissingColumn(String),

    #[error("column `{0}` is not numeric")]
    NonNumericMeasure(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RollupKind {
    TopCustomers,
    TopCustomersByRegion,
    RevenueByRegion,
    TopCategoryByRegion,
    TopProductByRegion,
    PaymentPreference,
}

impl RollupKind {
    pub const ALL: [RollupKind; 6] = [
        RollupKind::TopCustomers,
        RollupKind::TopCustomersByRegion,
        RollupKind::RevenueByRegion,
        RollupKind::TopCategoryByRegion,
        RollupKind::TopProductByRegion,
        RollupKind::PaymentPreference,
    ];

    pub fn name(self) -> &'static str {
        match self {
            RollupKind::TopCustomers => "top customers",
            RollupKind::TopCustomersByRegion => "top customers per region",
            RollupKind::RevenueByRegion => "revenue by region",
            RollupKind::TopCategoryByRegion => "top category per region",
            RollupKind::TopProductByRegion => "top product per region",
            RollupKind::PaymentPreference => "payment preference",
        }
    }
}

impl fmt::Display for RollupKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Error)]
#[error("{rollup} rollup failed: {source}")]
pub struct RollupError {
    pub rollup: RollupKind,
    #[source]
    pub source: ComputeError,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RollupRow {
    pub keys: Vec<Value>,
    pub measure: AggregateResult,
    pub rank: Option<u32>,
}

/// One derived table: dimension columns, a single measure column and, once
/// ranked, a `rank` column.
#[derive(Debug, Clone, PartialEq)]
pub struct RollupTable {
    pub dimensions: Vec<String>,
    pub measure: String,
    pub rows: Vec<RollupRow>,
}

/// Position of a named column inside a [`RollupTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnRef {
    Dimension(usize),
    Measure,
    Rank,
}

impl RollupTable {
    pub fn from_grouped(dimensions: &[&str], measure: &str, grouped: GroupedRows) -> Self {
        RollupTable {
            dimensions: dimensions.iter().map(|d| d.to_string()).collect(),
            measure: measure.to_string(),
            rows: grouped
                .into_iter()
                .map(|(keys, measure)| RollupRow {
                    keys,
                    measure,
                    rank: None,
                })
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column(&self, name: &str) -> Result<ColumnRef, ComputeError> {
        if let Some(pos) = self.dimensions.iter().position(|d| d == name) {
            Ok(ColumnRef::Dimension(pos))
        } else if self.measure == name {
            Ok(ColumnRef::Measure)
        } else if name == RANK && self.rows.iter().any(|r| r.rank.is_some()) {
            Ok(ColumnRef::Rank)
        } else {
            Err(ComputeError::MissingColumn(name.to_string()))
        }
    }

    /// Cell value at `row` for a resolved column; `None` only for an unranked rank cell.
    pub fn value(&self, row: &RollupRow, column: ColumnRef) -> Option<Value> {
        match column {
            ColumnRef::Dimension(i) => row.keys.get(i).cloned(),
            ColumnRef::Measure => Some(row.measure.clone().into()),
            ColumnRef::Rank => row.rank.map(|r| Value::Int(r as i64)),
        }
    }

    /// Sum of the measure column
    pub fn total(&self) -> f64 {
        self.rows.iter().map(|r| r.measure.as_f64()).sum()
    }

    /// First `n` rows, same columns
    pub fn head(&self, n: usize) -> RollupTable {
        RollupTable {
            dimensions: self.dimensions.clone(),
            measure: self.measure.clone(),
            rows: self.rows.iter().take(n).cloned().collect(),
        }
    }

    /// Stable sort by measure, largest first
    pub fn sort_by_measure_desc(&mut self) {
        self.rows
            .sort_by(|a, b| b.measure.as_f64().total_cmp(&a.measure.as_f64()));
    }

    /// Stable ascending sort on the given columns, compared left to right
    pub fn sort_by_columns(&mut self, columns: &[&str]) -> Result<(), ComputeError> {
        let refs = columns
            .iter()
            .map(|c| self.column(c))
            .collect::<Result<Vec<_>, _>>()?;

        let mut keyed: Vec<(Vec<Option<Value>>, RollupRow)> = std::mem::take(&mut self.rows)
            .into_iter()
            .map(|row| (refs.iter().map(|c| self.value(&row, *c)).collect(), row))
            .collect();
        keyed.sort_by(|a, b| a.0.cmp(&b.0));
        self.rows = keyed.into_iter().map(|(_, row)| row).collect();
        Ok(())
    }
}

impl fmt::Display for RollupTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ranked = self.rows.iter().any(|r| r.rank.is_some());
        write!(f, "{}\t{}", self.dimensions.join("\t"), self.measure)?;
        if ranked {
            write!(f, "\t{}", RANK)?;
        }
        for row in &self.rows {
            writeln!(f)?;
            for key in &row.keys {
                write!(f, "{}\t", key)?;
            }
            write!(f, "{}", Value::from(row.measure.clone()))?;
            if let Some(rank) = row.rank {
                write!(f, "\t{}", rank)?;
            }
        }
        Ok(())
    }
}

/// Dense-ranks `measure_col` (descending) within each `group_key` partition and
/// keeps rows ranked `<= keep_rank`.
///
/// The largest value of a partition is rank 1, equal values share a rank and
/// the next distinct value is exactly one rank lower. Retained rows keep their
/// input order and carry their rank.
pub fn rank_within_group(
    table: &RollupTable,
    group_key: &str,
    measure_col: &str,
    keep_rank: u32,
) -> Result<RollupTable, ComputeError> {
    let key_ref = table.column(group_key)?;
    let measure_ref = table.column(measure_col)?;

    let mut keyed = Vec::with_capacity(table.len());
    for row in &table.rows {
        let key = table
            .value(row, key_ref)
            .ok_or_else(|| ComputeError::MissingColumn(group_key.to_string()))?;
        let value = table
            .value(row, measure_ref)
            .and_then(|v| v.as_f64())
            .ok_or_else(|| ComputeError::NonNumericMeasure(measure_col.to_string()))?;
        // -0.0 and 0.0 tie
        let value = if value == 0.0 { 0.0 } else { value };
        keyed.push((key, value));
    }

    let mut distinct: HashMap<&Value, Vec<f64>> = HashMap::new();
    for (key, value) in &keyed {
        distinct.entry(key).or_default().push(*value);
    }
    for values in distinct.values_mut() {
        values.sort_by(|a, b| b.total_cmp(a));
        values.dedup_by(|a, b| a.total_cmp(b).is_eq());
    }

    let mut rows = Vec::new();
    for (row, (key, value)) in table.rows.iter().zip(&keyed) {
        let values = &distinct[key];
        // values are sorted descending
        let pos = values
            .binary_search_by(|other| value.total_cmp(other))
            .unwrap_or_else(|p| p);
        let rank = pos as u32 + 1;
        if rank <= keep_rank {
            rows.push(RollupRow {
                rank: Some(rank),
                ..row.clone()
            });
        }
    }

    Ok(RollupTable {
        dimensions: table.dimensions.clone(),
        measure: table.measure.clone(),
        rows,
    })
}

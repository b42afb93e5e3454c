use memchr::{memchr, memchr_iter};
use memmap2::Mmap;
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use std::{collections::HashMap, fs::File, path::Path};

use crate::processor::{
    AggregateOp, AggregateResult, GroupedRows, ParseError, ParseSummary, ProcessorError, Value,
    column::{Column, ColumnType},
};

/// Memory-mapped columnar view over a CSV file
///
/// # Examples
///
/// ```no_run
/// # use cube_rollups::processor::{AggregateOp, columnar_processor::ColumnarProcessor};
/// let mut processor = ColumnarProcessor::new();
/// processor.load_csv("data.csv".as_ref()).unwrap();
/// let by_region = processor.group_by(&["region"], "sale_amount_sum", AggregateOp::Sum).unwrap();
/// ```
#[derive(Debug)]
pub struct ColumnarProcessor {
    mmap: Option<Mmap>,   // owns the CSV bytes
    columns: Vec<Column>, // dynamic columns by name
    row_count: usize,
    headers: Vec<String>,
}

struct BatchResult {
    int64_batches: Vec<Vec<i64>>,
    float64_batches: Vec<Vec<f64>>,
    str_batches: Vec<Vec<(usize, usize)>>,
    row_count: usize,
    /// Lines consumed by this chunk, blank ones included
    lines_seen: usize,
    /// Rows are chunk-relative (0-based) until the merge step rebases them
    errors: Vec<ParseError>,
}

enum Measure {
    Int(Vec<i64>),
    Float(Vec<f64>),
    Rows,
}

struct Accumulator {
    sum_int: i128,
    sum_float: f64,
    count: usize,
}

impl Accumulator {
    fn new() -> Self {
        Accumulator {
            sum_int: 0,
            sum_float: 0.0,
            count: 0,
        }
    }

    fn push_int(&mut self, v: i64) {
        self.sum_int += v as i128;
        self.push_float(v as f64);
    }

    /// Missing values (NaN) do not contribute
    fn push_float(&mut self, v: f64) {
        if v.is_nan() {
            return;
        }
        self.sum_float += v;
        self.count += 1;
    }

    fn push_row(&mut self) {
        self.count += 1;
    }

    fn finish(&self, op: AggregateOp, int_valued: bool) -> AggregateResult {
        match (op, int_valued) {
            (AggregateOp::Count, _) => AggregateResult::Int(self.count as i64),
            (AggregateOp::Sum, true) => AggregateResult::Int(self.sum_int as i64),
            (AggregateOp::Sum, false) => AggregateResult::Float(self.sum_float),
        }
    }
}

impl ColumnarProcessor {
    /// Create an empty processor
    pub fn new() -> Self {
        ColumnarProcessor {
            mmap: None,
            columns: Vec::new(),
            row_count: 0,
            headers: Vec::new(),
        }
    }

    /// Loads a CSV file using memory mapping, inferring column types
    /// from the first data row (Int, Float, Str).
    ///
    /// Field-level problems do not abort the load; they are collected into
    /// the returned [`ParseSummary`].
    ///
    /// # Errors
    /// Returns a [`ProcessorError`] if the file cannot be opened or mapped,
    /// or has no header line.
    pub fn load_csv(&mut self, path: &Path) -> Result<ParseSummary, ProcessorError> {
        self.load_csv_with_schema(path, &[])
    }

    /// Same as [`load_csv`](Self::load_csv), but the named columns get the
    /// given type instead of the inferred one. Names not present in the
    /// header are ignored.
    pub fn load_csv_with_schema(
        &mut self,
        path: &Path,
        overrides: &[(&str, ColumnType)],
    ) -> Result<ParseSummary, ProcessorError> {
        let file = File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };
        let buf: &[u8] = &mmap[..];

        // Skip a UTF-8 BOM if the writer emitted one
        let body_start = if buf.starts_with(&[0xEF, 0xBB, 0xBF]) {
            3
        } else {
            0
        };
        let body = &buf[body_start..];
        if body.is_empty() {
            return Err(ProcessorError::Parse("Missing header line".into()));
        }

        // Parse header
        let header_end = memchr(b'\n', body).unwrap_or(body.len());
        let header_line = trim_cr(&body[..header_end]);
        let mut ranges = Vec::new();
        split_fields(header_line, &mut ranges);
        let headers: Vec<String> = ranges
            .iter()
            .map(|&(s, e)| String::from_utf8_lossy(&header_line[s..e]).trim().to_string())
            .collect();

        let data_start = body_start + (header_end + 1).min(body.len());
        let data = &buf[data_start..];

        let schema = Self::resolve_schema(data, &headers, overrides)?;

        // Find chunk boundaries (split by newlines)
        let num_threads = rayon::current_num_threads().max(1);
        let chunks = Self::find_chunk_boundaries(data, num_threads);

        // Estimate rows per chunk for preallocation
        let estimated_rows_per_chunk = {
            let avg_line_len = header_line.len().max(1) + 1;
            (data.len() / num_threads / avg_line_len) + 16
        };

        let batch_results: Vec<BatchResult> = chunks
            .par_iter()
            .map(|(start, end)| {
                Self::parse_chunk(
                    &data[*start..*end],
                    &schema,
                    &headers,
                    estimated_rows_per_chunk,
                    data_start + start, // Absolute offset in file
                )
            })
            .collect();

        // Merge batch results into chunked columns, keeping file order
        let mut columns: Vec<Column> = schema.iter().map(|t| Column::new(*t)).collect();

        let mut total_rows = 0;
        let mut lines_before = 0;
        let mut all_errors = Vec::new();

        for mut batch in batch_results {
            total_rows += batch.row_count;
            for mut err in batch.errors.drain(..) {
                // header is line 1
                err.row += lines_before + 2;
                all_errors.push(err);
            }
            lines_before += batch.lines_seen;

            for (col_idx, column) in columns.iter_mut().enumerate() {
                match column {
                    Column::Int64(chunks) => {
                        chunks.push(std::mem::take(&mut batch.int64_batches[col_idx]));
                    }
                    Column::Float64(chunks) => {
                        chunks.push(std::mem::take(&mut batch.float64_batches[col_idx]));
                    }
                    Column::Str(chunks) => {
                        chunks.push(std::mem::take(&mut batch.str_batches[col_idx]));
                    }
                }
            }
        }

        self.mmap = Some(mmap);
        self.columns = columns;
        self.headers = headers;
        self.row_count = total_rows;

        Ok(ParseSummary {
            rows_processed: total_rows,
            errors: all_errors,
        })
    }

    fn resolve_schema(
        data: &[u8],
        headers: &[String],
        overrides: &[(&str, ColumnType)],
    ) -> Result<Vec<ColumnType>, ProcessorError> {
        let mut schema = match first_data_line(data) {
            Some(line) => Self::infer_schema(line, headers)?,
            None => vec![ColumnType::Str; headers.len()],
        };

        for (name, col_type) in overrides {
            if let Some(pos) = headers.iter().position(|h| h == name) {
                schema[pos] = *col_type;
            }
        }

        Ok(schema)
    }

    fn infer_schema(first_line: &[u8], headers: &[String]) -> Result<Vec<ColumnType>, ProcessorError> {
        let mut ranges = Vec::new();
        split_fields(first_line, &mut ranges);

        if ranges.len() != headers.len() {
            return Err(ProcessorError::Parse(format!(
                "Header/data mismatch: {} vs {}",
                headers.len(),
                ranges.len()
            )));
        }

        let schema: Vec<ColumnType> = ranges
            .iter()
            .map(|&(s, e)| {
                let field = &first_line[s..e];
                if atoi_simd::parse::<i64>(field).is_ok() {
                    ColumnType::Int64
                } else if fast_float::parse::<f64, _>(field).is_ok() {
                    ColumnType::Float64
                } else {
                    ColumnType::Str
                }
            })
            .collect();

        Ok(schema)
    }

    fn find_chunk_boundaries(data: &[u8], num_chunks: usize) -> Vec<(usize, usize)> {
        if data.is_empty() {
            return vec![];
        }

        let chunk_size = data.len() / num_chunks;
        let mut boundaries = Vec::with_capacity(num_chunks);
        let mut start = 0;

        for i in 0..num_chunks - 1 {
            let mut end = ((i + 1) * chunk_size).max(start);

            // Find next newline
            match memchr(b'\n', &data[end..]) {
                Some(pos) => end += pos + 1, // Include the newline
                None => end = data.len(),
            }

            if start < end {
                boundaries.push((start, end));
            }
            start = end;
        }

        // Last chunk gets everything remaining
        if start < data.len() {
            boundaries.push((start, data.len()));
        }

        boundaries
    }

    fn parse_chunk(
        chunk: &[u8],
        schema: &[ColumnType],
        headers: &[String],
        estimated_rows: usize,
        chunk_offset: usize, // Absolute offset of this chunk in the file
    ) -> BatchResult {
        let num_cols = schema.len();

        let with_capacity_for = |wanted: ColumnType, i: usize| {
            if schema[i] == wanted {
                estimated_rows
            } else {
                0
            }
        };
        let mut int64_cols: Vec<Vec<i64>> = (0..num_cols)
            .map(|i| Vec::with_capacity(with_capacity_for(ColumnType::Int64, i)))
            .collect();
        let mut float64_cols: Vec<Vec<f64>> = (0..num_cols)
            .map(|i| Vec::with_capacity(with_capacity_for(ColumnType::Float64, i)))
            .collect();
        let mut str_cols: Vec<Vec<(usize, usize)>> = (0..num_cols)
            .map(|i| Vec::with_capacity(with_capacity_for(ColumnType::Str, i)))
            .collect();

        let mut errors = Vec::new();
        let mut row_count = 0;
        let mut lines_seen = 0;
        let mut fields = Vec::with_capacity(num_cols);

        let mut start = 0;
        while start < chunk.len() {
            let end = memchr(b'\n', &chunk[start..]).map_or(chunk.len(), |p| start + p);
            let line_start = start;
            let line = trim_cr(&chunk[start..end]);
            start = end + 1;

            let line_idx = lines_seen;
            lines_seen += 1;

            if line.is_empty() {
                continue;
            }

            split_fields(line, &mut fields);

            if fields.len() != num_cols {
                errors.push(ParseError {
                    row: line_idx,
                    column: String::new(),
                    value: format!("Expected {} fields, got {}", num_cols, fields.len()),
                    error: None,
                });
                continue;
            }

            // Parse each field according to schema. Failed numeric fields still
            // push a placeholder so every column stays row-aligned.
            for (col_idx, &(fs, fe)) in fields.iter().enumerate() {
                let field = &line[fs..fe];
                let field_error = |e: String| ParseError {
                    row: line_idx,
                    column: headers[col_idx].clone(),
                    value: String::from_utf8_lossy(field).to_string(),
                    error: Some(e),
                };
                match schema[col_idx] {
                    ColumnType::Int64 => match atoi_simd::parse::<i64>(field) {
                        Ok(value) => int64_cols[col_idx].push(value),
                        Err(e) => {
                            errors.push(field_error(e.to_string()));
                            int64_cols[col_idx].push(0);
                        }
                    },
                    ColumnType::Float64 if is_missing(field) => {
                        float64_cols[col_idx].push(f64::NAN);
                    }
                    ColumnType::Float64 => match fast_float::parse::<f64, _>(field) {
                        Ok(value) => float64_cols[col_idx].push(value),
                        Err(e) => {
                            errors.push(field_error(e.to_string()));
                            float64_cols[col_idx].push(0.0);
                        }
                    },
                    ColumnType::Str => {
                        // Store absolute offset into mmap
                        let absolute_start = chunk_offset + line_start + fs;
                        str_cols[col_idx].push((absolute_start, absolute_start + (fe - fs)));
                    }
                }
            }

            row_count += 1;
        }

        BatchResult {
            int64_batches: int64_cols,
            float64_batches: float64_cols,
            str_batches: str_cols,
            row_count,
            lines_seen,
            errors,
        }
    }

    // Helper to get string value from mmap using offsets
    pub fn get_string(&self, start: usize, end: usize) -> Result<&str, ProcessorError> {
        let bytes = self.slice_bytes(start, end)?;
        Ok(std::str::from_utf8(bytes)?)
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn column(&self, idx: usize) -> Option<&Column> {
        self.columns.get(idx)
    }

    /// Helper to slice mmap and return bytes for given offset
    pub fn slice_bytes(&self, start: usize, end: usize) -> Result<&[u8], ProcessorError> {
        let mmap = self.mmap.as_ref().ok_or(ProcessorError::MmapNotLoaded)?;

        if end > mmap.len() || start > end {
            return Err(ProcessorError::Parse("Invalid byte range".into()));
        }

        Ok(&mmap[start..end])
    }

    /// Materialises one column as owned values, in row order
    pub fn column_values(&self, column: &str) -> Result<Vec<Value>, ProcessorError> {
        let col = self.get_col(column)?;

        match col {
            Column::Int64(_) => Ok(col.iter_i64().into_iter().flatten().map(Value::Int).collect()),
            Column::Float64(_) => Ok(col
                .iter_f64()
                .into_iter()
                .flatten()
                .map(Value::Float)
                .collect()),
            Column::Str(_) => col
                .iter_str()
                .into_iter()
                .flatten()
                .map(|(s, e)| self.get_string(s, e).map(Value::from))
                .collect(),
        }
    }

    /// Aggregates a whole numeric column. Missing floats are skipped.
    ///
    /// # Example
    /// ```no_run
    /// # use cube_rollups::processor::{AggregateOp, columnar_processor::ColumnarProcessor};
    /// # let processor = ColumnarProcessor::new();
    /// let result = processor.aggregate("sale_amount_sum", AggregateOp::Sum).unwrap();
    /// ```
    pub fn aggregate(&self, column: &str, op: AggregateOp) -> Result<AggregateResult, ProcessorError> {
        let col = self.get_col(column)?;
        if col.total_len() == 0 {
            return Err(ProcessorError::Parse("empty column".into()));
        }

        let mut acc = Accumulator::new();
        match col {
            Column::Int64(_) => col.iter_i64().into_iter().flatten().for_each(|v| acc.push_int(v)),
            Column::Float64(_) => col
                .iter_f64()
                .into_iter()
                .flatten()
                .for_each(|v| acc.push_float(v)),
            Column::Str(_) if op == AggregateOp::Count => {
                return Ok(AggregateResult::Int(col.total_len() as i64));
            }
            Column::Str(_) => {
                return Err(ProcessorError::Parse(
                    "Cannot aggregate string column directly".into(),
                ));
            }
        }

        Ok(acc.finish(op, matches!(col, Column::Int64(_))))
    }

    /// Multi-key group-by aggregation
    ///
    /// Groups are returned in first-seen order: a key's position is the
    /// position of the first row carrying it. [`AggregateOp::Count`] counts
    /// rows and accepts any `agg_col`; every other op needs a numeric column.
    ///
    /// # Example
    /// ```no_run
    /// # use cube_rollups::processor::{AggregateOp, columnar_processor::ColumnarProcessor};
    /// # let processor = ColumnarProcessor::new();
    /// let grouped = processor
    ///     .group_by(&["region", "category"], "sale_amount_sum", AggregateOp::Sum)
    ///     .unwrap();
    /// ```
    pub fn group_by(
        &self,
        group_cols: &[&str],
        agg_col: &str,
        op: AggregateOp,
    ) -> Result<GroupedRows, ProcessorError> {
        let key_columns = group_cols
            .iter()
            .map(|c| self.column_values(c))
            .collect::<Result<Vec<_>, _>>()?;

        let acol = self.get_col(agg_col)?;
        let measure = match (acol, op) {
            (_, AggregateOp::Count) => Measure::Rows,
            (Column::Int64(_), _) => Measure::Int(acol.iter_i64().into_iter().flatten().collect()),
            (Column::Float64(_), _) => {
                Measure::Float(acol.iter_f64().into_iter().flatten().collect())
            }
            (Column::Str(_), _) => {
                return Err(ProcessorError::Parse(format!(
                    "agg_col `{}` must be numeric",
                    agg_col
                )));
            }
        };

        let mut index: HashMap<Vec<Value>, usize> = HashMap::new();
        let mut groups: Vec<(Vec<Value>, Accumulator)> = Vec::new();

        for row in 0..self.row_count {
            let key: Vec<Value> = key_columns.iter().map(|col| col[row].clone()).collect();
            let slot = match index.get(&key) {
                Some(&slot) => slot,
                None => {
                    index.insert(key.clone(), groups.len());
                    groups.push((key, Accumulator::new()));
                    groups.len() - 1
                }
            };

            let acc = &mut groups[slot].1;
            match &measure {
                Measure::Int(values) => acc.push_int(values[row]),
                Measure::Float(values) => acc.push_float(values[row]),
                Measure::Rows => acc.push_row(),
            }
        }

        let int_valued = matches!(measure, Measure::Int(_));
        Ok(groups
            .into_iter()
            .map(|(key, acc)| (key, acc.finish(op, int_valued)))
            .collect())
    }

    pub fn get_col(&self, col_name: &str) -> Result<&Column, ProcessorError> {
        let col_pos = self
            .headers
            .iter()
            .position(|cn| cn == col_name)
            .ok_or_else(|| ProcessorError::MissingColumn(col_name.to_string()))?;

        let col = self
            .columns
            .get(col_pos)
            .ok_or_else(|| ProcessorError::MissingColumn(col_name.to_string()))?;

        Ok(col)
    }
}

impl Default for ColumnarProcessor {
    fn default() -> Self {
        Self::new()
    }
}

fn trim_cr(line: &[u8]) -> &[u8] {
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Markers read as a missing float, stored as NaN
const MISSING_MARKERS: [&[u8]; 19] = [
    b"", b"#N/A", b"#N/A N/A", b"#NA", b"-1.#IND", b"-1.#QNAN", b"-NaN", b"-nan", b"1.#IND",
    b"1.#QNAN", b"<NA>", b"N/A", b"NA", b"NULL", b"NaN", b"None", b"n/a", b"nan", b"null",
];

fn is_missing(field: &[u8]) -> bool {
    MISSING_MARKERS.contains(&field)
}

fn first_data_line(data: &[u8]) -> Option<&[u8]> {
    data.split(|&b| b == b'\n')
        .map(trim_cr)
        .find(|line| !line.is_empty())
}

/// Splits one CSV line into field byte ranges relative to `line`.
///
/// Double-quoted fields are returned without their surrounding quotes and may
/// contain commas; doubled quotes inside them are left as-is.
fn split_fields(line: &[u8], out: &mut Vec<(usize, usize)>) {
    out.clear();

    if memchr(b'"', line).is_none() {
        let mut field_start = 0;
        for comma_pos in memchr_iter(b',', line) {
            out.push((field_start, comma_pos));
            field_start = comma_pos + 1;
        }
        out.push((field_start, line.len()));
        return;
    }

    let mut i = 0;
    loop {
        if i < line.len() && line[i] == b'"' {
            let start = i + 1;
            let mut j = start;
            while j < line.len() {
                if line[j] == b'"' {
                    if line.get(j + 1) == Some(&b'"') {
                        j += 2;
                        continue;
                    }
                    break;
                }
                j += 1;
            }
            out.push((start, j.min(line.len())));

            let after = (j + 1).min(line.len());
            match memchr(b',', &line[after..]) {
                Some(pos) => i = after + pos + 1,
                None => return,
            }
        } else {
            match memchr(b',', &line[i..]) {
                Some(pos) => {
                    out.push((i, i + pos));
                    i += pos + 1;
                }
                None => {
                    out.push((i, line.len()));
                    return;
                }
            }
        }
    }
}

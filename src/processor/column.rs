#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Int64,
    Float64,
    Str,
}

/// Chunked column storage. Chunks are kept in file order, one per parse batch.
#[derive(Debug, Clone)]
pub enum Column {
    Int64(Vec<Vec<i64>>),
    Float64(Vec<Vec<f64>>),
    Str(Vec<Vec<(usize, usize)>>), // Absolute offsets into mmap
}

impl Column {
    pub fn new(col_type: ColumnType) -> Self {
        match col_type {
            ColumnType::Int64 => Column::Int64(Vec::new()),
            ColumnType::Float64 => Column::Float64(Vec::new()),
            ColumnType::Str => Column::Str(Vec::new()),
        }
    }

    pub fn column_type(&self) -> ColumnType {
        match self {
            Column::Int64(_) => ColumnType::Int64,
            Column::Float64(_) => ColumnType::Float64,
            Column::Str(_) => ColumnType::Str,
        }
    }

    pub fn iter_i64(&self) -> Option<impl Iterator<Item = i64> + '_> {
        match self {
            Column::Int64(chunks) => Some(chunks.iter().flat_map(|chunk| chunk.iter().copied())),
            _ => None,
        }
    }

    pub fn iter_f64(&self) -> Option<impl Iterator<Item = f64> + '_> {
        match self {
            Column::Float64(chunks) => Some(chunks.iter().flat_map(|chunk| chunk.iter().copied())),
            _ => None,
        }
    }

    pub fn iter_str(&self) -> Option<impl Iterator<Item = (usize, usize)> + '_> {
        match self {
            Column::Str(chunks) => Some(chunks.iter().flat_map(|chunk| chunk.iter().copied())),
            _ => None,
        }
    }

    pub fn total_len(&self) -> usize {
        match self {
            Column::Int64(chunks) => chunks.iter().map(|c| c.len()).sum(),
            Column::Float64(chunks) => chunks.iter().map(|c| c.len()).sum(),
            Column::Str(chunks) => chunks.iter().map(|c| c.len()).sum(),
        }
    }
}

//! Quantized feature matrix.
//!
//! Every feature value is replaced by the index of the bin whose upper bound
//! is the first one not below the value. Missing values have no bin. Columns
//! with few present values are stored as sorted `(row, bin)` pairs, the rest
//! as one slot per row.

use crate::core::error::{GrowerError, Result};
use crate::core::types::*;

use ndarray::ArrayView2;
use std::sync::atomic::{AtomicU64, Ordering};

const MISSING_BIN: BinIndex = BinIndex::MAX;

static NEXT_MATRIX_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a matrix, used to tie prediction caches to the data they cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MatrixId(u64);

impl MatrixId {
    fn next() -> Self {
        MatrixId(NEXT_MATRIX_ID.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Clone)]
enum ColumnStorage {
    /// One slot per row, `MISSING_BIN` marks a missing value.
    Dense(Vec<BinIndex>),
    /// Present values only, rows strictly increasing.
    Sparse {
        rows: Vec<RowIndex>,
        bins: Vec<BinIndex>,
    },
}

/// Bins of a single feature over all rows.
#[derive(Debug, Clone)]
pub struct FeatureColumn {
    storage: ColumnStorage,
    upper_bounds: Vec<f64>,
    num_present: usize,
}

impl FeatureColumn {
    fn build(
        bins: Vec<Option<BinIndex>>,
        upper_bounds: Vec<f64>,
        sparse_threshold: f64,
    ) -> Self {
        let num_rows = bins.len();
        let num_present = bins.iter().filter(|b| b.is_some()).count();
        let density = if num_rows == 0 {
            1.0
        } else {
            num_present as f64 / num_rows as f64
        };

        let storage = if density < sparse_threshold {
            let mut rows = Vec::with_capacity(num_present);
            let mut present = Vec::with_capacity(num_present);
            for (row, bin) in bins.into_iter().enumerate() {
                if let Some(bin) = bin {
                    rows.push(row as RowIndex);
                    present.push(bin);
                }
            }
            ColumnStorage::Sparse {
                rows,
                bins: present,
            }
        } else {
            ColumnStorage::Dense(
                bins.into_iter()
                    .map(|b| b.unwrap_or(MISSING_BIN))
                    .collect(),
            )
        };

        FeatureColumn {
            storage,
            upper_bounds,
            num_present,
        }
    }

    /// Bin of `row`, or `None` when the value is missing.
    #[inline]
    pub fn bin(&self, row: RowIndex) -> Option<BinIndex> {
        match &self.storage {
            ColumnStorage::Dense(bins) => match bins[row as usize] {
                MISSING_BIN => None,
                bin => Some(bin),
            },
            ColumnStorage::Sparse { rows, bins } => {
                rows.binary_search(&row).ok().map(|pos| bins[pos])
            }
        }
    }

    /// Number of bins of this feature.
    pub fn num_bins(&self) -> usize {
        self.upper_bounds.len()
    }

    /// Inclusive upper bound of every bin, strictly increasing.
    pub fn upper_bounds(&self) -> &[f64] {
        &self.upper_bounds
    }

    /// Number of rows with a present value.
    pub fn num_present(&self) -> usize {
        self.num_present
    }

    /// Whether the column uses sparse storage.
    pub fn is_sparse(&self) -> bool {
        matches!(self.storage, ColumnStorage::Sparse { .. })
    }

    /// Present `(row, bin)` entries in row order.
    pub fn entries(&self) -> Box<dyn Iterator<Item = (RowIndex, BinIndex)> + '_> {
        match &self.storage {
            ColumnStorage::Dense(bins) => Box::new(
                bins.iter()
                    .enumerate()
                    .filter(|&(_, &bin)| bin != MISSING_BIN)
                    .map(|(row, &bin)| (row as RowIndex, bin)),
            ),
            ColumnStorage::Sparse { rows, bins } => {
                Box::new(rows.iter().copied().zip(bins.iter().copied()))
            }
        }
    }
}

/// Read-only quantized matrix with column-major storage.
#[derive(Debug, Clone)]
pub struct QuantizedMatrix {
    id: MatrixId,
    num_rows: usize,
    columns: Vec<FeatureColumn>,
}

fn check_upper_bounds(feature: FeatureIndex, bounds: &[f64]) -> Result<()> {
    if bounds.is_empty() {
        return Err(GrowerError::data_consistency(format!(
            "feature {} has no bins",
            feature
        )));
    }
    if bounds.iter().any(|b| b.is_nan()) || bounds.windows(2).any(|w| w[0] >= w[1]) {
        return Err(GrowerError::data_consistency(format!(
            "bin upper bounds of feature {} must be strictly increasing",
            feature
        )));
    }
    Ok(())
}

impl QuantizedMatrix {
    /// Build a matrix from per-feature bin columns.
    ///
    /// `columns[f][row]` is the bin of `row` for feature `f`, `None` when
    /// missing. `upper_bounds[f]` holds the inclusive upper bound of each bin.
    pub fn from_column_bins(
        num_rows: usize,
        columns: Vec<Vec<Option<BinIndex>>>,
        upper_bounds: Vec<Vec<f64>>,
        sparse_threshold: f64,
    ) -> Result<Self> {
        if columns.len() != upper_bounds.len() {
            return Err(GrowerError::dimension_mismatch(
                format!("{} bin bound lists", columns.len()),
                format!("{}", upper_bounds.len()),
            ));
        }
        if num_rows > RowIndex::MAX as usize {
            return Err(GrowerError::data_consistency(format!(
                "{} rows exceed the supported row index range",
                num_rows
            )));
        }

        let mut built = Vec::with_capacity(columns.len());
        for (feature, (bins, bounds)) in columns.into_iter().zip(upper_bounds).enumerate() {
            if bins.len() != num_rows {
                return Err(GrowerError::dimension_mismatch(
                    format!("{} rows for feature {}", num_rows, feature),
                    format!("{}", bins.len()),
                ));
            }
            check_upper_bounds(feature, &bounds)?;
            if let Some(bad) = bins.iter().flatten().find(|&&b| b as usize >= bounds.len()) {
                return Err(GrowerError::data_consistency(format!(
                    "bin {} of feature {} exceeds its {} bins",
                    bad,
                    feature,
                    bounds.len()
                )));
            }
            built.push(FeatureColumn::build(bins, bounds, sparse_threshold));
        }

        let sparse = built.iter().filter(|c| c.is_sparse()).count();
        log::debug!(
            "Quantized matrix: {} rows, {} features ({} sparse)",
            num_rows,
            built.len(),
            sparse
        );

        Ok(QuantizedMatrix {
            id: MatrixId::next(),
            num_rows,
            columns: built,
        })
    }

    /// Quantize a dense row-major matrix against per-feature bin upper bounds.
    ///
    /// NaN is treated as missing. Values above the last bound land in the last bin.
    pub fn from_dense(
        values: ArrayView2<'_, f32>,
        upper_bounds: Vec<Vec<f64>>,
        sparse_threshold: f64,
    ) -> Result<Self> {
        let (num_rows, num_features) = values.dim();
        if upper_bounds.len() != num_features {
            return Err(GrowerError::dimension_mismatch(
                format!("{} bin bound lists", num_features),
                format!("{}", upper_bounds.len()),
            ));
        }

        let mut columns = Vec::with_capacity(num_features);
        for (feature, bounds) in upper_bounds.iter().enumerate() {
            check_upper_bounds(feature, bounds)?;
            let column = values
                .column(feature)
                .iter()
                .map(|&v| value_to_bin(v, bounds))
                .collect();
            columns.push(column);
        }

        Self::from_column_bins(num_rows, columns, upper_bounds, sparse_threshold)
    }

    /// Unique identity of this matrix.
    pub fn id(&self) -> MatrixId {
        self.id
    }

    /// Number of rows.
    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    /// Number of features.
    pub fn num_features(&self) -> usize {
        self.columns.len()
    }

    /// Column of feature `feature`. Panics when out of range.
    #[inline]
    pub fn column(&self, feature: FeatureIndex) -> &FeatureColumn {
        &self.columns[feature]
    }

    /// Bin of `row` for `feature`, `None` when missing.
    #[inline]
    pub fn bin(&self, row: RowIndex, feature: FeatureIndex) -> Option<BinIndex> {
        self.columns[feature].bin(row)
    }

    /// Number of bins of `feature`.
    pub fn num_bins(&self, feature: FeatureIndex) -> usize {
        self.columns[feature].num_bins()
    }

    /// Largest bin count over all features.
    pub fn max_num_bins(&self) -> usize {
        self.columns.iter().map(|c| c.num_bins()).max().unwrap_or(0)
    }

    /// Raw-value threshold of `bin` for `feature`.
    pub fn bin_upper_bound(&self, feature: FeatureIndex, bin: BinIndex) -> f64 {
        self.columns[feature].upper_bounds[bin as usize]
    }
}

/// Map a raw value to the first bin whose upper bound is not below it.
pub fn value_to_bin(value: f32, upper_bounds: &[f64]) -> Option<BinIndex> {
    if value.is_nan() {
        return None;
    }
    let value = value as f64;
    let pos = upper_bounds.partition_point(|&bound| bound < value);
    Some(pos.min(upper_bounds.len().saturating_sub(1)) as BinIndex)
}

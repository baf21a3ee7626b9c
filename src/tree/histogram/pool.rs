//! Histogram storage for the nodes of the tree being grown.
//!
//! All node histograms share one flat layout: the bins of every feature laid
//! out back to back, each feature followed by one extra slot that collects
//! rows with a missing value. Buffers released by finished nodes go to a free
//! list and are handed out again to later nodes.

use crate::core::types::{FeatureIndex, GradStats, NodeIndex};
use crate::dataset::QuantizedMatrix;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::ops::Range;

/// Slot offsets of every feature inside a node histogram.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistogramLayout {
    /// `offsets[f]..offsets[f + 1]` are the slots of feature `f`
    offsets: Vec<usize>,
}

impl HistogramLayout {
    /// Layout for every feature of `matrix`.
    pub fn new(matrix: &QuantizedMatrix) -> Self {
        let mut offsets = Vec::with_capacity(matrix.num_features() + 1);
        let mut total = 0;
        offsets.push(0);
        for feature in 0..matrix.num_features() {
            total += matrix.num_bins(feature) + 1;
            offsets.push(total);
        }
        HistogramLayout { offsets }
    }

    /// Total number of slots in one node histogram.
    pub fn total_slots(&self) -> usize {
        self.offsets.last().copied().unwrap_or(0)
    }

    /// Number of features in the layout.
    pub fn num_features(&self) -> usize {
        self.offsets.len().saturating_sub(1)
    }

    /// Slots of the regular bins of `feature`.
    #[inline]
    pub fn bin_range(&self, feature: FeatureIndex) -> Range<usize> {
        self.offsets[feature]..self.offsets[feature + 1] - 1
    }

    /// Slot collecting the missing values of `feature`.
    #[inline]
    pub fn missing_slot(&self, feature: FeatureIndex) -> usize {
        self.offsets[feature + 1] - 1
    }
}

/// View of one feature inside a node histogram.
#[derive(Debug, Clone, Copy)]
pub struct FeatureHistogram<'a> {
    /// Statistics per bin
    pub bins: &'a [GradStats],
    /// Statistics of rows with a missing value
    pub missing: GradStats,
}

impl FeatureHistogram<'_> {
    /// Sum over every bin and the missing slot.
    pub fn total(&self) -> GradStats {
        self.bins
            .iter()
            .fold(self.missing, |acc, &stats| acc + stats)
    }
}

/// Gradient statistics of one node for all features.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeHistogram {
    data: Vec<GradStats>,
}

impl NodeHistogram {
    pub(crate) fn from_buffer(data: Vec<GradStats>) -> Self {
        NodeHistogram { data }
    }

    /// Raw slots in layout order.
    pub fn as_slice(&self) -> &[GradStats] {
        &self.data
    }

    /// View of a single feature.
    pub fn feature<'a>(&'a self, layout: &HistogramLayout, feature: FeatureIndex) -> FeatureHistogram<'a> {
        FeatureHistogram {
            bins: &self.data[layout.bin_range(feature)],
            missing: self.data[layout.missing_slot(feature)],
        }
    }

    pub(crate) fn into_buffer(self) -> Vec<GradStats> {
        self.data
    }
}

/// Owner of all live node histograms and of the recycled buffers.
#[derive(Debug, Default)]
pub struct HistogramPool {
    layout: HistogramLayout,
    live: HashMap<NodeIndex, NodeHistogram>,
    free: VecDeque<Vec<GradStats>>,
    total_allocations: usize,
    pool_hits: usize,
    pool_misses: usize,
}

impl HistogramPool {
    /// Creates an empty pool.
    pub fn new() -> Self {
        Self::default()
    }

    /// Drops every live histogram and adopts a new layout.
    ///
    /// Buffers are kept for reuse when the slot count is unchanged.
    pub fn reset(&mut self, layout: HistogramLayout) {
        let keep = layout.total_slots() == self.layout.total_slots();
        let live: Vec<_> = self.live.drain().map(|(_, h)| h.into_buffer()).collect();
        if keep {
            self.free.extend(live);
        } else {
            self.free.clear();
        }
        self.layout = layout;
    }

    /// Current layout.
    pub fn layout(&self) -> &HistogramLayout {
        &self.layout
    }

    /// Hands out a zeroed buffer sized for the current layout.
    pub fn acquire(&mut self) -> Vec<GradStats> {
        self.total_allocations += 1;
        if let Some(mut buffer) = self.free.pop_front() {
            self.pool_hits += 1;
            buffer.fill(GradStats::default());
            buffer
        } else {
            self.pool_misses += 1;
            vec![GradStats::default(); self.layout.total_slots()]
        }
    }

    /// Returns a scratch buffer to the free list.
    pub fn recycle(&mut self, buffer: Vec<GradStats>) {
        if buffer.len() == self.layout.total_slots() {
            self.free.push_back(buffer);
        }
    }

    /// Stores the histogram of `node`.
    pub fn insert(&mut self, node: NodeIndex, histogram: NodeHistogram) {
        if let Some(previous) = self.live.insert(node, histogram) {
            self.recycle(previous.into_buffer());
        }
    }

    /// Histogram of `node`, if it is live.
    pub fn get(&self, node: NodeIndex) -> Option<&NodeHistogram> {
        self.live.get(&node)
    }

    /// Whether `node` has a live histogram.
    pub fn contains(&self, node: NodeIndex) -> bool {
        self.live.contains_key(&node)
    }

    /// Frees the histogram of `node`.
    pub fn release(&mut self, node: NodeIndex) {
        if let Some(histogram) = self.live.remove(&node) {
            self.recycle(histogram.into_buffer());
        }
    }

    /// Frees every live histogram.
    pub fn release_all(&mut self) {
        let live: Vec<_> = self.live.drain().map(|(_, h)| h.into_buffer()).collect();
        for buffer in live {
            self.recycle(buffer);
        }
    }

    /// Number of live histograms.
    pub fn num_live(&self) -> usize {
        self.live.len()
    }

    /// Returns pool usage statistics.
    pub fn statistics(&self) -> HistogramPoolStatistics {
        HistogramPoolStatistics {
            total_allocations: self.total_allocations,
            pool_hits: self.pool_hits,
            pool_misses: self.pool_misses,
            hit_rate: if self.total_allocations > 0 {
                self.pool_hits as f64 / self.total_allocations as f64
            } else {
                0.0
            },
            live_histograms: self.live.len(),
            free_buffers: self.free.len(),
            slots_per_histogram: self.layout.total_slots(),
        }
    }

    /// Estimates memory usage in bytes.
    pub fn memory_usage(&self) -> usize {
        (self.live.len() + self.free.len())
            * self.layout.total_slots()
            * std::mem::size_of::<GradStats>()
    }
}

/// Statistics about pool usage.
#[derive(Debug, Clone)]
pub struct HistogramPoolStatistics {
    /// Total buffer requests
    pub total_allocations: usize,
    /// Requests served from the free list
    pub pool_hits: usize,
    /// Requests that allocated
    pub pool_misses: usize,
    /// Fraction of requests served from the free list
    pub hit_rate: f64,
    /// Histograms currently owned by nodes
    pub live_histograms: usize,
    /// Buffers waiting for reuse
    pub free_buffers: usize,
    /// Slots in one node histogram
    pub slots_per_histogram: usize,
}

impl fmt::Display for HistogramPoolStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "HistogramPool(allocations={}, hits={}, misses={}, hit_rate={:.2}%, live={}, free={}, slots={})",
            self.total_allocations,
            self.pool_hits,
            self.pool_misses,
            self.hit_rate * 100.0,
            self.live_histograms,
            self.free_buffers,
            self.slots_per_histogram
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix() -> QuantizedMatrix {
        QuantizedMatrix::from_column_bins(
            2,
            vec![vec![Some(0), Some(3)], vec![Some(1), None]],
            vec![vec![1.0, 2.0, 3.0, 4.0], vec![0.0, 1.0]],
            0.0,
        )
        .unwrap()
    }

    #[test]
    fn test_layout() {
        let layout = HistogramLayout::new(&matrix());
        assert_eq!(layout.total_slots(), 5 + 3);
        assert_eq!(layout.num_features(), 2);
        assert_eq!(layout.bin_range(0), 0..4);
        assert_eq!(layout.missing_slot(0), 4);
        assert_eq!(layout.bin_range(1), 5..7);
        assert_eq!(layout.missing_slot(1), 7);
    }

    #[test]
    fn test_acquire_and_recycle() {
        let mut pool = HistogramPool::new();
        pool.reset(HistogramLayout::new(&matrix()));

        let mut buffer = pool.acquire();
        assert_eq!(buffer.len(), 8);
        buffer[3] = GradStats::new(1.0, 1.0);
        pool.insert(0, NodeHistogram::from_buffer(buffer));
        assert!(pool.contains(0));

        pool.release(0);
        assert_eq!(pool.num_live(), 0);

        let reused = pool.acquire();
        assert!(reused.iter().all(|s| s.is_empty()));

        let stats = pool.statistics();
        assert_eq!(stats.total_allocations, 2);
        assert_eq!(stats.pool_hits, 1);
        assert_eq!(stats.pool_misses, 1);
    }

    #[test]
    fn test_feature_view() {
        let layout = HistogramLayout::new(&matrix());
        let mut data = vec![GradStats::default(); layout.total_slots()];
        data[5] = GradStats::new(1.0, 1.0);
        data[7] = GradStats::new(-2.0, 1.0);
        let histogram = NodeHistogram::from_buffer(data);

        let view = histogram.feature(&layout, 1);
        assert_eq!(view.bins.len(), 2);
        assert_eq!(view.missing, GradStats::new(-2.0, 1.0));
        assert_eq!(view.total(), GradStats::new(-1.0, 2.0));
    }

    #[test]
    fn test_reset_drops_mismatched_buffers() {
        let mut pool = HistogramPool::new();
        pool.reset(HistogramLayout::new(&matrix()));
        let buffer = pool.acquire();
        pool.insert(1, NodeHistogram::from_buffer(buffer));

        pool.reset(HistogramLayout::default());
        assert_eq!(pool.statistics().free_buffers, 0);
        assert_eq!(pool.num_live(), 0);
    }
}

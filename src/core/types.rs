//! Core data types shared by the histogram, split and partition machinery.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Sub, SubAssign};
use std::str::FromStr;

/// Row index type. 32-bit indices keep the row buffers compact.
pub type RowIndex = u32;

/// Prediction and leaf value type.
pub type Score = f32;

/// Histogram accumulation type.
/// 64-bit float providing numerical stability for histogram operations.
pub type Hist = f64;

/// Feature index type for identifying features in the matrix.
pub type FeatureIndex = usize;

/// Bin index type for quantized feature values.
pub type BinIndex = u32;

/// Tree node identifier type.
pub type NodeIndex = usize;

/// First and second order gradient of the loss for one row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GradientPair {
    /// First order gradient
    pub grad: f32,
    /// Second order gradient
    pub hess: f32,
}

impl GradientPair {
    /// Create a new gradient pair
    pub fn new(grad: f32, hess: f32) -> Self {
        GradientPair { grad, hess }
    }
}

/// Accumulated gradient statistics for a bin, a node or a split side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GradStats {
    /// Sum of gradients
    pub sum_grad: Hist,
    /// Sum of hessians
    pub sum_hess: Hist,
}

impl GradStats {
    /// Create statistics from explicit sums
    pub fn new(sum_grad: Hist, sum_hess: Hist) -> Self {
        GradStats { sum_grad, sum_hess }
    }

    /// Accumulate a single row's gradient pair
    #[inline]
    pub fn add_pair(&mut self, pair: GradientPair) {
        self.sum_grad += pair.grad as Hist;
        self.sum_hess += pair.hess as Hist;
    }

    /// True when no gradient mass has been accumulated.
    pub fn is_empty(&self) -> bool {
        self.sum_grad == 0.0 && self.sum_hess == 0.0
    }

    /// Sum statistics over a set of rows.
    pub fn from_rows(rows: &[RowIndex], gradients: &[GradientPair]) -> Self {
        let mut stats = GradStats::default();
        for &row in rows {
            stats.add_pair(gradients[row as usize]);
        }
        stats
    }
}

impl Add for GradStats {
    type Output = GradStats;

    fn add(self, rhs: GradStats) -> GradStats {
        GradStats::new(self.sum_grad + rhs.sum_grad, self.sum_hess + rhs.sum_hess)
    }
}

impl AddAssign for GradStats {
    #[inline]
    fn add_assign(&mut self, rhs: GradStats) {
        self.sum_grad += rhs.sum_grad;
        self.sum_hess += rhs.sum_hess;
    }
}

impl Sub for GradStats {
    type Output = GradStats;

    fn sub(self, rhs: GradStats) -> GradStats {
        GradStats::new(self.sum_grad - rhs.sum_grad, self.sum_hess - rhs.sum_hess)
    }
}

impl SubAssign for GradStats {
    #[inline]
    fn sub_assign(&mut self, rhs: GradStats) {
        self.sum_grad -= rhs.sum_grad;
        self.sum_hess -= rhs.sum_hess;
    }
}

/// Order in which candidate nodes are expanded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GrowPolicy {
    /// Expand level by level, shallower nodes first
    DepthWise,
    /// Expand the node with the highest loss reduction first
    LossGuide,
}

impl Default for GrowPolicy {
    fn default() -> Self {
        GrowPolicy::DepthWise
    }
}

impl fmt::Display for GrowPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GrowPolicy::DepthWise => write!(f, "depthwise"),
            GrowPolicy::LossGuide => write!(f, "lossguide"),
        }
    }
}

impl FromStr for GrowPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "depthwise" => Ok(GrowPolicy::DepthWise),
            "lossguide" => Ok(GrowPolicy::LossGuide),
            other => Err(format!("unknown grow policy '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grad_stats_arithmetic() {
        let mut a = GradStats::default();
        a.add_pair(GradientPair::new(-3.0, 1.0));
        a.add_pair(GradientPair::new(0.5, 1.0));
        assert_eq!(a, GradStats::new(-2.5, 2.0));

        let b = GradStats::new(1.0, 0.5);
        assert_eq!(a + b, GradStats::new(-1.5, 2.5));
        assert_eq!(a - b, GradStats::new(-3.5, 1.5));

        let mut c = a;
        c -= a;
        assert!(c.is_empty());
    }

    #[test]
    fn test_from_rows() {
        let gradients = vec![
            GradientPair::new(1.0, 1.0),
            GradientPair::new(2.0, 1.0),
            GradientPair::new(4.0, 2.0),
        ];
        let stats = GradStats::from_rows(&[0, 2], &gradients);
        assert_eq!(stats, GradStats::new(5.0, 3.0));
    }

    #[test]
    fn test_grow_policy_parsing() {
        assert_eq!("depthwise".parse::<GrowPolicy>(), Ok(GrowPolicy::DepthWise));
        assert_eq!("LossGuide".parse::<GrowPolicy>(), Ok(GrowPolicy::LossGuide));
        assert!("breadth".parse::<GrowPolicy>().is_err());
        assert_eq!(GrowPolicy::default().to_string(), "depthwise");
    }
}

//! Split search: gain formulas, constraints and the histogram evaluator.

pub mod constraints;
pub mod evaluator;
pub mod finder;

pub use constraints::{ConstraintSet, InteractionConstraint, MonotonicConstraint, WeightBounds};
pub use evaluator::HistEvaluator;
pub use finder::{SplitEntry, SplitScorer};

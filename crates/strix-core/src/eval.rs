//! Static evaluation seam.

use crate::position::Position;

/// Per-call context the search hands to the evaluator.
///
/// `dynamic_weights` and `strength` replace process-wide switches: the search
/// decides per node whether position-dependent weighting may be used and
/// computes the strength ramp once per iteration.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EvalHints {
    /// Side-to-move optimism derived from the running root score.
    pub optimism: i32,
    /// Whether dynamic weighting is allowed at this node.
    pub dynamic_weights: bool,
    /// Dynamic weighting ramp in `[0.0, 1.0]`.
    pub strength: f32,
}

/// Scores a position from the side to move's point of view.
pub trait Evaluator<P: Position>: Send + Sync {
    /// Must never be called while the side to move is in check.
    fn evaluate(&self, pos: &P, hints: &EvalHints) -> i32;
}

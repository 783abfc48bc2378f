//! Move search: transposition table, history statistics, move ordering,
//! alpha-beta with quiescence, iterative deepening and the thread pool.

pub mod control;
mod driver;
pub mod history;
pub mod limits;
mod negamax;
pub mod ordering;
pub mod pool;
mod qsearch;
pub mod report;
pub mod root;
pub mod skill;
pub mod stack;
pub mod tablebase;
pub mod tt;
pub mod value;
mod worker;

use strix_core::Move;

use value::{Depth, Value};

/// Result of a completed search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResult {
    /// Best move, `None` only when the root has no legal move.
    pub best_move: Option<Move>,
    /// Second move in the PV: the expected reply, for pondering.
    pub ponder_move: Option<Move>,
    /// Principal variation of the chosen worker.
    pub pv: Vec<Move>,
    /// Internal score from the side to move's point of view.
    pub score: Value,
    /// Nodes visited by all workers.
    pub nodes: u64,
    /// Last fully completed depth.
    pub depth: Depth,
}

//! Root move bookkeeping.

use std::cmp::Ordering;

use strix_core::{Move, Position};

use crate::search::tt::TranspositionTable;
use crate::search::value::{VALUE_INFINITE, Value};

/// One legal move at the root with the data the driver and the reports need.
#[derive(Debug, Clone, PartialEq)]
pub struct RootMove {
    /// Principal variation; `pv[0]` is the move itself.
    pub pv: Vec<Move>,
    pub score: Value,
    pub previous_score: Value,
    pub average_score: Value,
    pub mean_squared_score: i64,
    /// Score as reported, clipped to the window on a fail high/low.
    pub uci_score: Value,
    pub score_lowerbound: bool,
    pub score_upperbound: bool,
    pub sel_depth: i32,
    pub tb_rank: i32,
    pub tb_score: Value,
    /// Nodes spent below this move.
    pub effort: u64,
}

impl RootMove {
    pub fn new(mv: Move) -> Self {
        Self {
            pv: vec![mv],
            score: -VALUE_INFINITE,
            previous_score: -VALUE_INFINITE,
            average_score: -VALUE_INFINITE,
            mean_squared_score: -(VALUE_INFINITE as i64) * VALUE_INFINITE as i64,
            uci_score: -VALUE_INFINITE,
            score_lowerbound: false,
            score_upperbound: false,
            sel_depth: 0,
            tb_rank: 0,
            tb_score: 0,
            effort: 0,
        }
    }

    #[inline]
    pub fn mv(&self) -> Move {
        self.pv[0]
    }

    /// Try to find a reply for a one-move PV from the transposition table.
    ///
    /// Returns `true` when the PV now holds a ponder move.
    pub fn extract_ponder_from_tt<P: Position>(&mut self, tt: &TranspositionTable, pos: &mut P) -> bool {
        let mv = self.mv();
        if mv.is_none() || self.pv.len() > 1 {
            return self.pv.len() > 1;
        }
        let gives_check = pos.gives_check(mv);
        pos.do_move(mv, gives_check);
        let (hit, data, _) = tt.probe(pos.key());
        if hit && !data.mv.is_none() && pos.legal_moves().contains(data.mv) {
            self.pv.push(data.mv);
        }
        pos.undo_move(mv);
        self.pv.len() > 1
    }
}

/// Best-first order: by score, ties broken by the previous iteration's score.
pub fn compare(a: &RootMove, b: &RootMove) -> Ordering {
    b.score
        .cmp(&a.score)
        .then_with(|| b.previous_score.cmp(&a.previous_score))
}

/// Stable best-first sort of `moves`.
pub fn sort(moves: &mut [RootMove]) {
    moves.sort_by(compare);
}

/// Stable sort by oracle rank, best first.
pub fn sort_by_tb_rank(moves: &mut [RootMove]) {
    moves.sort_by(|a, b| b.tb_rank.cmp(&a.tb_rank));
}

/// Rotate the move `mv` to the front, keeping the order of the others.
pub fn move_to_front(moves: &mut [RootMove], mv: Move) {
    if let Some(i) = moves.iter().position(|rm| rm.mv() == mv) {
        moves[..=i].rotate_right(1);
    }
}

//! Progress reports sent to the caller while a search runs.

use std::fmt;

use strix_core::Move;

use crate::search::value::{VALUE_MATE, VALUE_TB, VALUE_TB_WIN_IN_MAX_PLY, Value, to_cp};

/// A score in display units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Score {
    /// Centipawns.
    Cp(i32),
    /// Mate in `moves` full moves; negative when the side to move is mated.
    Mate { moves: i32 },
    /// Oracle-proven result, `plies` from a conversion.
    Tablebase { plies: i32, win: bool },
}

impl Score {
    pub fn from_value(v: Value) -> Score {
        if v.abs() < VALUE_TB_WIN_IN_MAX_PLY {
            Score::Cp(to_cp(v))
        } else if v.abs() <= VALUE_TB {
            let distance = VALUE_TB - v.abs();
            if v > 0 {
                Score::Tablebase {
                    plies: distance,
                    win: true,
                }
            } else {
                Score::Tablebase {
                    plies: -distance,
                    win: false,
                }
            }
        } else {
            let distance = VALUE_MATE - v.abs();
            if v > 0 {
                Score::Mate {
                    moves: (distance + 1) / 2,
                }
            } else {
                Score::Mate { moves: -distance / 2 }
            }
        }
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Score::Cp(cp) => write!(f, "cp {cp}"),
            Score::Mate { moves } => write!(f, "mate {moves}"),
            // Shown as a score just below a mate so that GUIs sort it correctly.
            Score::Tablebase { plies, win } => {
                let cp = if win { 20_000 - plies } else { -20_000 - plies };
                write!(f, "cp {cp}")
            }
        }
    }
}

/// Whether the reported score is only a bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreBound {
    Lower,
    Upper,
}

impl fmt::Display for ScoreBound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScoreBound::Lower => f.write_str("lowerbound"),
            ScoreBound::Upper => f.write_str("upperbound"),
        }
    }
}

/// Report for a root without legal moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InfoShort {
    pub depth: i32,
    pub score: Score,
}

/// One principal variation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfoFull {
    pub depth: i32,
    pub sel_depth: i32,
    /// 1-based line number.
    pub multipv: usize,
    pub score: Score,
    pub bound: Option<ScoreBound>,
    pub time_ms: u64,
    pub nodes: u64,
    pub nps: u64,
    pub tb_hits: u64,
    pub pv: Vec<Move>,
    /// TT occupancy in per mille.
    pub hashfull: u32,
}

/// The root move currently being searched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InfoIteration {
    pub depth: i32,
    pub current_move: Move,
    /// 1-based position among the root moves.
    pub current_move_number: usize,
}

/// Receiver of search progress. Called from the main worker's thread only.
pub trait SearchListener: Send {
    fn on_update_no_moves(&mut self, _info: &InfoShort) {}

    fn on_update_full(&mut self, _info: &InfoFull) {}

    fn on_iter(&mut self, _info: &InfoIteration) {}

    /// Sent exactly once per search.
    fn on_bestmove(&mut self, _best: Option<Move>, _ponder: Option<Move>) {}
}

/// Listener that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullListener;

impl SearchListener for NullListener {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::value::{mate_in, mated_in};

    #[test]
    fn centipawns() {
        assert_eq!(Score::from_value(0), Score::Cp(0));
        assert_eq!(Score::from_value(328), Score::Cp(100));
        assert_eq!(Score::from_value(-164), Score::Cp(-50));
    }

    #[test]
    fn mates_count_full_moves() {
        assert_eq!(Score::from_value(mate_in(1)), Score::Mate { moves: 1 });
        assert_eq!(Score::from_value(mate_in(3)), Score::Mate { moves: 2 });
        assert_eq!(Score::from_value(mated_in(2)), Score::Mate { moves: -1 });
        assert_eq!(Score::from_value(mated_in(0)), Score::Mate { moves: 0 });
    }

    #[test]
    fn tablebase_scores() {
        assert_eq!(
            Score::from_value(VALUE_TB - 4),
            Score::Tablebase { plies: 4, win: true }
        );
        assert_eq!(
            Score::from_value(-VALUE_TB + 4),
            Score::Tablebase { plies: -4, win: false }
        );
        assert_eq!(Score::Mate { moves: -3 }.to_string(), "mate -3");
        assert_eq!(ScoreBound::Lower.to_string(), "lowerbound");
    }
}

//! Endgame oracle seam.

use crate::position::Position;

/// Win/draw/loss from the side to move's point of view.
///
/// "Cursed" wins and "blessed" losses are decisive only when the fifty-move
/// rule is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(i8)]
pub enum Wdl {
    Loss = -2,
    BlessedLoss = -1,
    Draw = 0,
    CursedWin = 1,
    Win = 2,
}

impl Wdl {
    /// The same result seen by the opponent.
    pub const fn negate(self) -> Wdl {
        match self {
            Wdl::Loss => Wdl::Win,
            Wdl::BlessedLoss => Wdl::CursedWin,
            Wdl::Draw => Wdl::Draw,
            Wdl::CursedWin => Wdl::BlessedLoss,
            Wdl::Win => Wdl::Loss,
        }
    }

    /// Signed value in `-2..=2`.
    pub const fn signum2(self) -> i32 {
        self as i8 as i32
    }
}

/// Perfect-play oracle for positions with few pieces.
pub trait Tablebase<P: Position>: Send + Sync {
    /// Largest piece count the oracle covers, 0 when unavailable.
    fn max_cardinality(&self) -> u32;

    /// Probe the position. `None` means the probe failed or is inconclusive.
    fn probe_wdl(&self, pos: &P) -> Option<Wdl>;
}

/// An oracle that never answers.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoTablebase;

impl<P: Position> Tablebase<P> for NoTablebase {
    fn max_cardinality(&self) -> u32 {
        0
    }

    fn probe_wdl(&self, _pos: &P) -> Option<Wdl> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::Wdl;

    #[test]
    fn negate_is_involution() {
        for wdl in [Wdl::Loss, Wdl::BlessedLoss, Wdl::Draw, Wdl::CursedWin, Wdl::Win] {
            assert_eq!(wdl.negate().negate(), wdl);
            assert_eq!(wdl.negate().signum2(), -wdl.signum2());
        }
    }
}

//! Move representation, bit-packed into a u16.

use std::fmt;

use crate::piece_kind::PieceKind;
use crate::square::Square;

const SRC_MASK: u16 = 0x003F;
const DST_MASK: u16 = 0x0FC0;
const PROMO_MASK: u16 = 0x3000;
const KIND_MASK: u16 = 0xC000;
const DST_SHIFT: u32 = 6;
const PROMO_SHIFT: u32 = 12;
const KIND_SHIFT: u32 = 14;

/// The category of a move.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MoveKind {
    Normal = 0,
    Promotion = 1,
    EnPassant = 2,
    Castling = 3,
}

/// The piece a pawn promotes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PromotionPiece {
    Knight = 0,
    Bishop = 1,
    Rook = 2,
    Queen = 3,
}

impl PromotionPiece {
    /// Convert to the corresponding [`PieceKind`].
    pub const fn to_piece_kind(self) -> PieceKind {
        match self {
            PromotionPiece::Knight => PieceKind::Knight,
            PromotionPiece::Bishop => PieceKind::Bishop,
            PromotionPiece::Rook => PieceKind::Rook,
            PromotionPiece::Queen => PieceKind::Queen,
        }
    }
}

/// A move encoded in 16 bits.
///
/// ```text
/// bits  0-5:  source square      (0-63)
/// bits  6-11: destination square (0-63)
/// bits 12-13: promotion piece    (Knight=0, Bishop=1, Rook=2, Queen=3)
/// bits 14-15: move kind          (Normal=0, Promotion=1, EnPassant=2, Castling=3)
/// ```
///
/// Two encodings have a fixed meaning: [`Move::NONE`] (a1a1, "no move") and
/// [`Move::NULL`] (b1b1, the pass move used by null-move pruning). Neither
/// passes [`Move::is_ok`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Move(u16);

impl Move {
    /// Absence of a move.
    pub const NONE: Move = Move(0);

    /// The null (pass) move.
    pub const NULL: Move = Move(65);

    /// Create a normal (quiet or capture) move.
    pub const fn new(source: Square, dest: Square) -> Move {
        Move((source.index() as u16) | ((dest.index() as u16) << DST_SHIFT))
    }

    /// Create a promotion move.
    pub const fn new_promotion(source: Square, dest: Square, promo: PromotionPiece) -> Move {
        Move(
            (source.index() as u16)
                | ((dest.index() as u16) << DST_SHIFT)
                | ((promo as u16) << PROMO_SHIFT)
                | ((MoveKind::Promotion as u16) << KIND_SHIFT),
        )
    }

    /// Rebuild a move from its packed form, as stored in the transposition table.
    #[inline]
    pub const fn from_raw(raw: u16) -> Move {
        Move(raw)
    }

    /// The packed 16-bit form.
    #[inline]
    pub const fn raw(self) -> u16 {
        self.0
    }

    /// Extract the source square.
    #[inline]
    pub const fn source(self) -> Square {
        Square::from_index_unchecked((self.0 & SRC_MASK) as u8)
    }

    /// Extract the destination square.
    #[inline]
    pub const fn dest(self) -> Square {
        Square::from_index_unchecked(((self.0 & DST_MASK) >> DST_SHIFT) as u8)
    }

    /// Source and destination packed into 12 bits, the butterfly index.
    #[inline]
    pub const fn from_to(self) -> usize {
        (self.0 & (SRC_MASK | DST_MASK)) as usize
    }

    /// Extract the move kind.
    pub const fn kind(self) -> MoveKind {
        match (self.0 & KIND_MASK) >> KIND_SHIFT {
            0 => MoveKind::Normal,
            1 => MoveKind::Promotion,
            2 => MoveKind::EnPassant,
            _ => MoveKind::Castling,
        }
    }

    /// Extract the promotion piece.
    ///
    /// Only meaningful when `kind() == MoveKind::Promotion`.
    pub const fn promotion_piece(self) -> PromotionPiece {
        match (self.0 & PROMO_MASK) >> PROMO_SHIFT {
            0 => PromotionPiece::Knight,
            1 => PromotionPiece::Bishop,
            2 => PromotionPiece::Rook,
            _ => PromotionPiece::Queen,
        }
    }

    /// `true` for real moves: source and destination differ.
    #[inline]
    pub const fn is_ok(self) -> bool {
        (self.0 & SRC_MASK) != (self.0 & DST_MASK) >> DST_SHIFT
    }

    /// `true` for [`Move::NONE`].
    #[inline]
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }

    /// Return `true` if this is a promotion move.
    #[inline]
    pub const fn is_promotion(self) -> bool {
        (self.0 & KIND_MASK) >> KIND_SHIFT == MoveKind::Promotion as u16
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Move::NONE {
            write!(f, "(none)")
        } else if *self == Move::NULL {
            write!(f, "0000")
        } else if self.is_promotion() {
            let promo = self.promotion_piece().to_piece_kind().symbol();
            write!(f, "{}{}{}", self.source(), self.dest(), promo)
        } else {
            write!(f, "{}{}", self.source(), self.dest())
        }
    }
}

impl fmt::Debug for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Move({} kind={:?})", self, self.kind())
    }
}

#[cfg(test)]
mod tests {
    use super::{Move, MoveKind, PromotionPiece};
    use crate::square::Square;

    fn sq(i: u8) -> Square {
        Square::from_index(i).unwrap()
    }

    #[test]
    fn size_of_move() {
        assert_eq!(std::mem::size_of::<Move>(), 2);
    }

    #[test]
    fn sentinels_are_not_ok() {
        assert!(!Move::NONE.is_ok());
        assert!(!Move::NULL.is_ok());
        assert!(Move::NONE.is_none());
        assert!(!Move::NULL.is_none());
        assert_eq!(Move::NULL.source(), Square::B1);
        assert_eq!(Move::NULL.dest(), Square::B1);
    }

    #[test]
    fn normal_move_fields() {
        let mv = Move::new(sq(12), sq(28));
        assert_eq!(mv.source(), sq(12));
        assert_eq!(mv.dest(), sq(28));
        assert_eq!(mv.kind(), MoveKind::Normal);
        assert!(mv.is_ok());
        assert_eq!(mv.from_to(), 12 | (28 << 6));
        assert_eq!(mv.to_string(), "e2e4");
    }

    #[test]
    fn promotion_keeps_from_to() {
        let mv = Move::new_promotion(sq(52), sq(60), PromotionPiece::Queen);
        assert!(mv.is_promotion());
        assert_eq!(mv.promotion_piece(), PromotionPiece::Queen);
        assert_eq!(mv.from_to(), Move::new(sq(52), sq(60)).from_to());
        assert_eq!(mv.to_string(), "e7e8q");
    }

    #[test]
    fn raw_roundtrip() {
        let mv = Move::new_promotion(sq(9), sq(1), PromotionPiece::Knight);
        assert_eq!(Move::from_raw(mv.raw()), mv);
    }

    #[test]
    fn display_sentinels() {
        assert_eq!(Move::NONE.to_string(), "(none)");
        assert_eq!(Move::NULL.to_string(), "0000");
    }
}

//! Score and depth units, mate encoding and transposition-table score conversion.

use strix_core::PieceKind;

/// Search score in internal units, from the side to move's point of view.
pub type Value = i32;

/// Remaining search depth in plies.
pub type Depth = i32;

/// Deepest ply the search ever reaches.
pub const MAX_PLY: i32 = 246;

pub const VALUE_ZERO: Value = 0;
pub const VALUE_DRAW: Value = 0;
pub const VALUE_NONE: Value = 32002;
pub const VALUE_INFINITE: Value = 32001;

pub const VALUE_MATE: Value = 32000;
pub const VALUE_MATE_IN_MAX_PLY: Value = VALUE_MATE - MAX_PLY;
pub const VALUE_MATED_IN_MAX_PLY: Value = -VALUE_MATE_IN_MAX_PLY;

/// Tablebase wins sit just below the mate band.
pub const VALUE_TB: Value = VALUE_MATE_IN_MAX_PLY - 1;
pub const VALUE_TB_WIN_IN_MAX_PLY: Value = VALUE_TB - MAX_PLY;
pub const VALUE_TB_LOSS_IN_MAX_PLY: Value = -VALUE_TB_WIN_IN_MAX_PLY;

/// Depth recorded for quiescence entries.
pub const DEPTH_QS: Depth = 0;
/// Depth recorded when only a static evaluation was stored.
pub const DEPTH_UNSEARCHED: Depth = -2;
/// Stored depths are offset by this so that an occupied entry never has depth 0.
pub const DEPTH_ENTRY_OFFSET: Depth = -3;

/// Internal units per displayed pawn.
const NORMALIZE_TO_PAWN_VALUE: i32 = 328;

pub const PAWN_VALUE: Value = 208;

const PIECE_VALUE: [Value; PieceKind::COUNT] = [PAWN_VALUE, 781, 825, 1276, 2538, 0];

/// Material value of a piece kind.
#[inline]
pub const fn piece_value(kind: PieceKind) -> Value {
    PIECE_VALUE[kind.index()]
}

#[inline]
pub const fn mate_in(ply: i32) -> Value {
    VALUE_MATE - ply
}

#[inline]
pub const fn mated_in(ply: i32) -> Value {
    -VALUE_MATE + ply
}

#[inline]
pub const fn is_valid(v: Value) -> bool {
    v != VALUE_NONE
}

/// A proven win: mate or tablebase win.
#[inline]
pub const fn is_win(v: Value) -> bool {
    v >= VALUE_TB_WIN_IN_MAX_PLY
}

/// A proven loss: mated or tablebase loss.
#[inline]
pub const fn is_loss(v: Value) -> bool {
    v <= VALUE_TB_LOSS_IN_MAX_PLY
}

#[inline]
pub const fn is_decisive(v: Value) -> bool {
    is_win(v) || is_loss(v)
}

/// Draw score with a one-unit jitter keyed on the node count, which keeps the
/// search from settling into a blind spot on threefold repetitions.
#[inline]
pub const fn value_draw(nodes: u64) -> Value {
    VALUE_DRAW - 1 + (nodes & 0x2) as Value
}

/// Convert an internal score to centipawns.
#[inline]
pub const fn to_cp(v: Value) -> i32 {
    100 * v / NORMALIZE_TO_PAWN_VALUE
}

/// Convert a ply-from-root mate/TB score into a ply-from-node score for storage.
pub const fn value_to_tt(v: Value, ply: i32) -> Value {
    if !is_valid(v) {
        return v;
    }
    if is_win(v) {
        v + ply
    } else if is_loss(v) {
        v - ply
    } else {
        v
    }
}

/// Inverse of [`value_to_tt`].
///
/// Mate and tablebase scores that could not be realised before the fifty-move
/// rule triggers are downgraded to the edge of the tablebase band, since the
/// stored line may not be playable from here.
pub const fn value_from_tt(v: Value, ply: i32, rule50: i32) -> Value {
    if !is_valid(v) {
        return VALUE_NONE;
    }

    if is_win(v) {
        if v >= VALUE_MATE_IN_MAX_PLY && VALUE_MATE - v > 100 - rule50 {
            return VALUE_TB_WIN_IN_MAX_PLY - 1;
        }
        if VALUE_TB - v > 100 - rule50 {
            return VALUE_TB_WIN_IN_MAX_PLY - 1;
        }
        return v - ply;
    }

    if is_loss(v) {
        if v <= VALUE_MATED_IN_MAX_PLY && VALUE_MATE + v > 100 - rule50 {
            return VALUE_TB_LOSS_IN_MAX_PLY + 1;
        }
        if VALUE_TB + v > 100 - rule50 {
            return VALUE_TB_LOSS_IN_MAX_PLY + 1;
        }
        return v + ply;
    }

    v
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bands_are_ordered() {
        assert!(VALUE_INFINITE < VALUE_NONE);
        assert!(VALUE_MATE < VALUE_INFINITE);
        assert!(VALUE_TB_WIN_IN_MAX_PLY < VALUE_TB);
        assert!(VALUE_TB < VALUE_MATE_IN_MAX_PLY);
        assert!(VALUE_NONE <= i16::MAX as i32);
    }

    #[test]
    fn mate_scores_are_decisive() {
        assert!(is_win(mate_in(3)));
        assert!(is_loss(mated_in(3)));
        assert!(is_win(VALUE_TB_WIN_IN_MAX_PLY));
        assert!(!is_decisive(1500));
        assert!(!is_decisive(-1500));
    }

    #[test]
    fn tt_conversion_is_ply_independent() {
        // Mate in 5 plies from the root, seen at ply 3, is mate in 2 from the node.
        let stored = value_to_tt(mate_in(5), 3);
        assert_eq!(stored, mate_in(2));
        // Reached again at ply 7 it is mate in 9 from the root.
        assert_eq!(value_from_tt(stored, 7, 0), mate_in(9));

        let stored = value_to_tt(mated_in(6), 2);
        assert_eq!(value_from_tt(stored, 2, 0), mated_in(6));

        assert_eq!(value_from_tt(value_to_tt(123, 9), 4, 50), 123);
    }

    #[test]
    fn unreachable_mate_is_downgraded() {
        // Mate in 30 plies with only 20 plies left before the fifty-move rule.
        let stored = value_to_tt(mate_in(30), 0);
        assert_eq!(value_from_tt(stored, 0, 80), VALUE_TB_WIN_IN_MAX_PLY - 1);
        let stored = value_to_tt(mated_in(30), 0);
        assert_eq!(value_from_tt(stored, 0, 80), VALUE_TB_LOSS_IN_MAX_PLY + 1);
    }

    #[test]
    fn none_passes_through() {
        assert_eq!(value_to_tt(VALUE_NONE, 5), VALUE_NONE);
        assert_eq!(value_from_tt(VALUE_NONE, 5, 0), VALUE_NONE);
    }

    #[test]
    fn draw_jitter() {
        assert_eq!(value_draw(0), -1);
        assert_eq!(value_draw(2), 1);
        assert_eq!(value_draw(5), -1);
    }
}

//! The position capability set the search consumes.
//!
//! Board representation, move generation and rules live behind this trait.
//! The search only ever borrows a position mutably for the duration of a call
//! and restores it with paired make/unmake before returning.

use crate::chess_move::Move;
use crate::color::Color;
use crate::move_list::MoveList;
use crate::piece::Piece;

/// Which subset of moves [`Position::generate`] should produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenType {
    /// Captures and queen promotions (the "capture stage").
    Captures,
    /// Every other move when not in check.
    Quiets,
    /// All moves out of check. Only valid while in check.
    Evasions,
    /// Captures and quiets together when not in check.
    NonEvasions,
}

/// A game position as seen by the search.
///
/// Generated moves are pseudo-legal; the search filters them through
/// [`Position::legal`] before making them.
pub trait Position: Clone + Send {
    /// 64-bit position signature.
    fn key(&self) -> u64;

    /// Signature of the pawn structure.
    fn pawn_key(&self) -> u64;

    /// Signature of the minor-piece (and king) placement.
    fn minor_piece_key(&self) -> u64;

    /// Signature of one side's non-pawn material placement.
    fn non_pawn_key(&self, color: Color) -> u64;

    fn side_to_move(&self) -> Color;

    /// Plies played since the start of the game.
    fn game_ply(&self) -> u32;

    /// Plies since the last capture or pawn move.
    fn rule50_count(&self) -> u32;

    fn in_check(&self) -> bool;

    /// Total number of pieces on the board, kings included.
    fn piece_count(&self) -> u32;

    /// Material value of one side's non-pawn pieces.
    fn non_pawn_material(&self, color: Color) -> i32;

    fn can_castle(&self) -> bool;

    /// Append the moves of the requested kind to `list`.
    fn generate(&self, gen_type: GenType, list: &mut MoveList);

    /// `true` if `mv` could have been generated in this position.
    fn pseudo_legal(&self, mv: Move) -> bool;

    /// `true` if the pseudo-legal `mv` does not leave the mover in check.
    fn legal(&self, mv: Move) -> bool;

    /// `true` if `mv` captures a piece.
    fn capture(&self, mv: Move) -> bool;

    /// Captures plus queen promotions.
    fn capture_stage(&self, mv: Move) -> bool;

    fn gives_check(&self, mv: Move) -> bool;

    /// Static exchange evaluation of `mv` is at least `threshold`.
    fn see_ge(&self, mv: Move, threshold: i32) -> bool;

    /// The piece `mv` moves.
    fn moved_piece(&self, mv: Move) -> Piece;

    /// The piece `mv` would capture, if any.
    fn captured_by(&self, mv: Move) -> Option<Piece>;

    /// The piece captured by the move that led to this position.
    fn captured_piece(&self) -> Option<Piece>;

    /// Draw by the fifty-move rule or by repetition within `ply` plies of the root.
    fn is_draw(&self, ply: usize) -> bool;

    /// `true` if some move reaches a position already seen, making a draw available.
    fn upcoming_repetition(&self, ply: usize) -> bool;

    fn do_move(&mut self, mv: Move, gives_check: bool);

    fn undo_move(&mut self, mv: Move);

    fn do_null_move(&mut self);

    fn undo_null_move(&mut self);

    /// All legal moves.
    fn legal_moves(&self) -> MoveList {
        let mut pseudo = MoveList::new();
        let gen_type = if self.in_check() {
            GenType::Evasions
        } else {
            GenType::NonEvasions
        };
        self.generate(gen_type, &mut pseudo);
        let mut list = MoveList::new();
        for &mv in &pseudo {
            if self.legal(mv) {
                list.push(mv);
            }
        }
        list
    }
}

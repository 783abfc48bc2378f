//! History statistics for move ordering and static-evaluation correction.
//!
//! Every table stores `i16` entries updated with a saturating "gravity"
//! rule: a bonus `b` (clamped to the table limit `D`) moves an entry `v` by
//! `b - v * |b| / D`, so values converge towards `±D` without overflowing.
//! Tables are flat boxed slices addressed through typed helpers; the larger
//! ones run to several megabytes and must never live on a thread stack.

use strix_core::{Color, Move, Piece, PieceKind, Position, Square};

use crate::search::stack::SearchStack;
use crate::search::value::Depth;

/// Piece slots in piece-indexed tables; the last one is the "no piece" sentinel.
pub(crate) const PIECE_SLOTS: usize = Piece::COUNT + 1;
const NO_PIECE: usize = Piece::COUNT;
/// Captured-kind slots; the last one stands for promotions that capture nothing.
const CAPTURED_SLOTS: usize = PieceKind::COUNT + 1;
const PIECE_TO: usize = PIECE_SLOTS * 64;
const BUTTERFLY: usize = 64 * 64;

pub const LOW_PLY_HISTORY_SIZE: usize = 5;
pub const PAWN_HISTORY_SIZE: usize = 1024;
pub const CORRECTION_HISTORY_SIZE: usize = 32768;
pub const CORRECTION_HISTORY_LIMIT: i32 = 1024;

const MAIN_LIMIT: i32 = 7183;
const CAPTURE_LIMIT: i32 = 10692;
const PAWN_LIMIT: i32 = 8192;
const CONTINUATION_LIMIT: i32 = 30000;
const TT_MOVE_LIMIT: i32 = 8192;

/// `(plies back, weight)` pairs for continuation-history updates.
const CONTINUATION_WEIGHTS: [(i32, i32); 6] = [(1, 1157), (2, 648), (3, 288), (4, 576), (5, 140), (6, 441)];

/// One saturating statistic bounded by `D`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsEntry<const D: i32>(i16);

impl<const D: i32> StatsEntry<D> {
    #[inline]
    pub const fn get(self) -> i32 {
        self.0 as i32
    }

    #[inline]
    pub fn update(&mut self, bonus: i32) {
        let b = bonus.clamp(-D, D);
        let v = self.0 as i32;
        self.0 = (v + b - v * b.abs() / D) as i16;
    }
}

/// A flat table of [`StatsEntry`] values.
#[derive(Clone)]
pub struct StatsTable<const D: i32> {
    entries: Box<[StatsEntry<D>]>,
}

impl<const D: i32> StatsTable<D> {
    fn new(len: usize, fill: i16) -> Self {
        Self {
            entries: vec![StatsEntry(fill); len].into_boxed_slice(),
        }
    }

    pub fn fill(&mut self, value: i16) {
        self.entries.fill(StatsEntry(value));
    }

    #[inline]
    fn get(&self, index: usize) -> i32 {
        self.entries[index].get()
    }

    #[inline]
    fn update(&mut self, index: usize, bonus: i32) {
        self.entries[index].update(bonus);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[inline]
fn captured_slot(kind: Option<PieceKind>) -> usize {
    kind.map_or(PieceKind::COUNT, PieceKind::index)
}

/// Selects the `[piece][to]` continuation table that follows a move, from
/// `[in_check][capture][piece][to]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContKey(usize);

impl ContKey {
    /// Table used for the sentinel frames below the root and after a null move.
    pub const SENTINEL: ContKey = ContKey((NO_PIECE * 64) * PIECE_TO);

    pub fn new(in_check: bool, capture: bool, piece: Piece, to: Square) -> ContKey {
        let outer = ((in_check as usize * 2 + capture as usize) * PIECE_SLOTS + piece.index()) * 64 + to.index();
        ContKey(outer * PIECE_TO)
    }

    #[inline]
    fn index(self, piece: Piece, to: Square) -> usize {
        self.0 + piece.index() * 64 + to.index()
    }
}

/// Selects the `[piece][to]` continuation-correction table that follows a move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CorrKey(usize);

impl CorrKey {
    pub const SENTINEL: CorrKey = CorrKey((NO_PIECE * 64) * PIECE_TO);

    pub fn new(piece: Piece, to: Square) -> CorrKey {
        CorrKey((piece.index() * 64 + to.index()) * PIECE_TO)
    }

    #[inline]
    fn index(self, piece: Piece, to: Square) -> usize {
        self.0 + piece.index() * 64 + to.index()
    }
}

#[inline]
pub fn pawn_history_index<P: Position>(pos: &P) -> usize {
    (pos.pawn_key() as usize) & (PAWN_HISTORY_SIZE - 1)
}

#[inline]
fn correction_index(key: u64) -> usize {
    (key as usize) & (CORRECTION_HISTORY_SIZE - 1)
}

/// All per-worker statistics.
pub struct Histories {
    main: StatsTable<MAIN_LIMIT>,
    low_ply: StatsTable<MAIN_LIMIT>,
    capture: StatsTable<CAPTURE_LIMIT>,
    pawn: StatsTable<PAWN_LIMIT>,
    continuation: StatsTable<CONTINUATION_LIMIT>,
    pawn_correction: StatsTable<CORRECTION_HISTORY_LIMIT>,
    minor_correction: StatsTable<CORRECTION_HISTORY_LIMIT>,
    non_pawn_correction: StatsTable<CORRECTION_HISTORY_LIMIT>,
    continuation_correction: StatsTable<CORRECTION_HISTORY_LIMIT>,
    pub tt_move: StatsEntry<TT_MOVE_LIMIT>,
}

impl Histories {
    pub fn new() -> Self {
        let mut h = Self {
            main: StatsTable::new(Color::COUNT * BUTTERFLY, 0),
            low_ply: StatsTable::new(LOW_PLY_HISTORY_SIZE * BUTTERFLY, 0),
            capture: StatsTable::new(PIECE_SLOTS * 64 * CAPTURED_SLOTS, 0),
            pawn: StatsTable::new(PAWN_HISTORY_SIZE * PIECE_TO, 0),
            continuation: StatsTable::new(2 * 2 * PIECE_TO * PIECE_TO, 0),
            pawn_correction: StatsTable::new(CORRECTION_HISTORY_SIZE * Color::COUNT, 0),
            minor_correction: StatsTable::new(CORRECTION_HISTORY_SIZE * Color::COUNT, 0),
            non_pawn_correction: StatsTable::new(CORRECTION_HISTORY_SIZE * Color::COUNT * Color::COUNT, 0),
            continuation_correction: StatsTable::new(PIECE_TO * PIECE_TO, 0),
            tt_move: StatsEntry::default(),
        };
        h.clear();
        h
    }

    /// Reset every table to its starting value, as before a new game.
    pub fn clear(&mut self) {
        self.main.fill(68);
        self.low_ply.fill(97);
        self.capture.fill(-689);
        self.pawn.fill(-1238);
        self.continuation.fill(-529);
        self.pawn_correction.fill(5);
        self.minor_correction.fill(0);
        self.non_pawn_correction.fill(0);
        self.continuation_correction.fill(8);
        self.tt_move = StatsEntry::default();
    }

    /// Refill the low-ply table; done at the start of every search.
    pub fn reset_low_ply(&mut self) {
        self.low_ply.fill(97);
    }

    #[inline]
    pub fn main(&self, us: Color, mv: Move) -> i32 {
        self.main.get(us.index() * BUTTERFLY + mv.from_to())
    }

    #[inline]
    pub fn update_main(&mut self, us: Color, mv: Move, bonus: i32) {
        self.main.update(us.index() * BUTTERFLY + mv.from_to(), bonus);
    }

    #[inline]
    pub fn low_ply(&self, ply: usize, mv: Move) -> i32 {
        self.low_ply.get(ply * BUTTERFLY + mv.from_to())
    }

    #[inline]
    fn capture_index(piece: Piece, to: Square, captured: Option<PieceKind>) -> usize {
        (piece.index() * 64 + to.index()) * CAPTURED_SLOTS + captured_slot(captured)
    }

    #[inline]
    pub fn capture(&self, piece: Piece, to: Square, captured: Option<PieceKind>) -> i32 {
        self.capture.get(Self::capture_index(piece, to, captured))
    }

    #[inline]
    pub fn update_capture(&mut self, piece: Piece, to: Square, captured: Option<PieceKind>, bonus: i32) {
        self.capture.update(Self::capture_index(piece, to, captured), bonus);
    }

    #[inline]
    pub fn pawn(&self, pawn_index: usize, piece: Piece, to: Square) -> i32 {
        self.pawn.get(pawn_index * PIECE_TO + piece.index() * 64 + to.index())
    }

    #[inline]
    pub fn update_pawn(&mut self, pawn_index: usize, piece: Piece, to: Square, bonus: i32) {
        self.pawn.update(pawn_index * PIECE_TO + piece.index() * 64 + to.index(), bonus);
    }

    #[inline]
    pub fn continuation(&self, key: ContKey, piece: Piece, to: Square) -> i32 {
        self.continuation.get(key.index(piece, to))
    }

    /// Add `bonus` to the continuation tables of the moves 1..=6 plies before
    /// `ply`, weighted by distance. Only the two nearest are touched in check.
    pub fn update_continuation(&mut self, stack: &SearchStack, ply: i32, piece: Piece, to: Square, bonus: i32) {
        let in_check = stack[ply].in_check;
        for (back, weight) in CONTINUATION_WEIGHTS {
            if in_check && back > 2 {
                break;
            }
            let frame = &stack[ply - back];
            if frame.current_move.is_ok() {
                let b = bonus * weight / 1024 + if back < 2 { 88 } else { 0 };
                self.continuation.update(frame.cont.index(piece, to), b);
            }
        }
    }

    /// Reward (or punish, with a negative bonus) a quiet move at `ply`.
    pub fn update_quiet<P: Position>(&mut self, pos: &P, stack: &SearchStack, ply: i32, mv: Move, bonus: i32) {
        let us = pos.side_to_move();
        let piece = pos.moved_piece(mv);
        self.update_main(us, mv, bonus);

        if (ply as usize) < LOW_PLY_HISTORY_SIZE {
            self.low_ply.update(ply as usize * BUTTERFLY + mv.from_to(), bonus * 761 / 1024);
        }

        self.update_continuation(stack, ply, piece, mv.dest(), bonus * 955 / 1024);

        let scale = if bonus > 0 { 800 } else { 500 };
        self.update_pawn(pawn_history_index(pos), piece, mv.dest(), bonus * scale / 1024 + 70);
    }

    /// Statistics update once a node has found a best move: reward it and
    /// punish the quiets and captures that were searched before it.
    #[allow(clippy::too_many_arguments)]
    pub fn update_all_stats<P: Position>(
        &mut self,
        pos: &P,
        stack: &SearchStack,
        ply: i32,
        best: Move,
        quiets: &[Move],
        captures: &[Move],
        depth: Depth,
        tt_move: Move,
    ) {
        let bonus = (151 * depth - 91).min(1730) + if best == tt_move { 302 } else { 0 };
        let malus = (951 * depth - 156).min(2468) - 30 * quiets.len() as i32;

        if !pos.capture_stage(best) {
            self.update_quiet(pos, stack, ply, best, bonus * 957 / 1024);
            for &mv in quiets {
                self.update_quiet(pos, stack, ply, mv, -malus);
            }
        } else {
            let captured = pos.captured_by(best).map(Piece::kind);
            self.update_capture(pos.moved_piece(best), best.dest(), captured, bonus);
        }

        // An early quiet reply that was not the TT move got refuted.
        let prev = &stack[ply - 1];
        if let Some(prev_piece) = prev.moved {
            if prev.current_move.is_ok()
                && prev.move_count == 1 + prev.tt_hit as i32
                && pos.captured_piece().is_none()
            {
                self.update_continuation(stack, ply - 1, prev_piece, prev.current_move.dest(), -malus * 503 / 1024);
            }
        }

        for &mv in captures {
            let captured = pos.captured_by(mv).map(Piece::kind);
            self.update_capture(pos.moved_piece(mv), mv.dest(), captured, -malus * 1157 / 1024);
        }
    }

    /// Weighted sum of the correction tables for the position at `ply`.
    /// Divided by 131072 it is the centipawn-scale eval adjustment.
    pub fn correction_value<P: Position>(&self, pos: &P, stack: &SearchStack, ply: i32) -> i32 {
        let us = pos.side_to_move().index();
        let pcv = self.pawn_correction.get(correction_index(pos.pawn_key()) * 2 + us);
        let micv = self.minor_correction.get(correction_index(pos.minor_piece_key()) * 2 + us);
        let wnpcv = self.non_pawn_correction.get(Self::non_pawn_index(pos, Color::White) + us);
        let bnpcv = self.non_pawn_correction.get(Self::non_pawn_index(pos, Color::Black) + us);

        let prev = &stack[ply - 1];
        let cntcv = match prev.moved {
            Some(piece) if prev.current_move.is_ok() => self
                .continuation_correction
                .get(stack[ply - 2].corr.index(piece, prev.current_move.dest())),
            _ => 8,
        };

        9536 * pcv + 8494 * micv + 10132 * (wnpcv + bnpcv) + 7156 * cntcv
    }

    pub fn update_correction<P: Position>(&mut self, pos: &P, stack: &SearchStack, ply: i32, bonus: i32) {
        const NON_PAWN_WEIGHT: i32 = 165;
        let us = pos.side_to_move().index();

        self.pawn_correction.update(correction_index(pos.pawn_key()) * 2 + us, bonus);
        self.minor_correction
            .update(correction_index(pos.minor_piece_key()) * 2 + us, bonus * 145 / 128);
        self.non_pawn_correction
            .update(Self::non_pawn_index(pos, Color::White) + us, bonus * NON_PAWN_WEIGHT / 128);
        self.non_pawn_correction
            .update(Self::non_pawn_index(pos, Color::Black) + us, bonus * NON_PAWN_WEIGHT / 128);

        let prev = &stack[ply - 1];
        if let Some(piece) = prev.moved {
            if prev.current_move.is_ok() {
                let index = stack[ply - 2].corr.index(piece, prev.current_move.dest());
                self.continuation_correction.update(index, bonus * 137 / 128);
            }
        }
    }

    #[inline]
    fn non_pawn_index<P: Position>(pos: &P, color: Color) -> usize {
        (correction_index(pos.non_pawn_key(color)) * 2 + color.index()) * 2
    }
}

impl Default for Histories {
    fn default() -> Self {
        Self::new()
    }
}

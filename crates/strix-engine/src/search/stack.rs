//! Per-ply search frames and the principal-variation table.

use std::ops::{Index, IndexMut};

use strix_core::{Move, Piece};

use crate::search::history::{ContKey, CorrKey};
use crate::search::value::{MAX_PLY, VALUE_NONE, Value};

/// Sentinel frames below ply 0, so that `ply - 7` is always addressable.
const OFFSET: i32 = 7;
/// Total frames: sentinels, `MAX_PLY` plies and spare frames for `ply + 2`.
const FRAMES: usize = (MAX_PLY + 10) as usize;

/// State the search keeps for one ply.
#[derive(Debug, Clone, Copy)]
pub struct Frame {
    pub ply: i32,
    pub current_move: Move,
    /// Piece that played `current_move`.
    pub moved: Option<Piece>,
    pub excluded_move: Move,
    pub static_eval: Value,
    pub stat_score: i32,
    pub move_count: i32,
    pub in_check: bool,
    pub tt_pv: bool,
    pub tt_hit: bool,
    pub cutoff_cnt: i32,
    pub reduction: i32,
    /// Continuation table selected by `current_move`.
    pub cont: ContKey,
    /// Continuation-correction table selected by `current_move`.
    pub corr: CorrKey,
}

impl Frame {
    const EMPTY: Frame = Frame {
        ply: 0,
        current_move: Move::NONE,
        moved: None,
        excluded_move: Move::NONE,
        static_eval: VALUE_NONE,
        stat_score: 0,
        move_count: 0,
        in_check: false,
        tt_pv: false,
        tt_hit: false,
        cutoff_cnt: 0,
        reduction: 0,
        cont: ContKey::SENTINEL,
        corr: CorrKey::SENTINEL,
    };
}

/// Frames addressed by signed ply: `stack[-7]` up to `stack[MAX_PLY + 2]`.
pub struct SearchStack {
    frames: Vec<Frame>,
}

impl SearchStack {
    pub fn new() -> Self {
        let mut stack = Self {
            frames: vec![Frame::EMPTY; FRAMES],
        };
        stack.reset();
        stack
    }

    /// Restore every frame to its starting state before an iteration.
    pub fn reset(&mut self) {
        for (i, frame) in self.frames.iter_mut().enumerate() {
            *frame = Frame::EMPTY;
            frame.ply = (i as i32 - OFFSET).max(0);
        }
    }
}

impl Default for SearchStack {
    fn default() -> Self {
        Self::new()
    }
}

impl Index<i32> for SearchStack {
    type Output = Frame;

    #[inline]
    fn index(&self, ply: i32) -> &Frame {
        &self.frames[(ply + OFFSET) as usize]
    }
}

impl IndexMut<i32> for SearchStack {
    #[inline]
    fn index_mut(&mut self, ply: i32) -> &mut Frame {
        &mut self.frames[(ply + OFFSET) as usize]
    }
}

const PV_ROWS: usize = MAX_PLY as usize + 1;

/// Triangular PV table: row `ply` holds the best line found from `ply` on.
///
/// Heap-allocated; at `MAX_PLY` rows it is too large for a search thread's
/// frame budget.
pub struct PvTable {
    moves: Vec<[Move; PV_ROWS]>,
    len: Vec<usize>,
}

impl PvTable {
    pub fn new() -> Self {
        Self {
            moves: vec![[Move::NONE; PV_ROWS]; PV_ROWS],
            len: vec![0; PV_ROWS],
        }
    }

    /// Clear the line at `ply`.
    pub fn clear_ply(&mut self, ply: usize) {
        if ply < PV_ROWS {
            self.len[ply] = 0;
        }
    }

    /// Set the line at `ply` to `mv` followed by the line at `ply + 1`.
    pub fn update(&mut self, ply: usize, mv: Move) {
        if ply >= PV_ROWS {
            return;
        }
        self.moves[ply][0] = mv;

        let child = ply + 1;
        if child < PV_ROWS {
            let copy_len = self.len[child].min(PV_ROWS - 1);
            let (top, bottom) = self.moves.split_at_mut(child);
            top[ply][1..1 + copy_len].copy_from_slice(&bottom[0][..copy_len]);
            self.len[ply] = 1 + copy_len;
        } else {
            self.len[ply] = 1;
        }
    }

    /// The line stored at `ply`.
    pub fn line(&self, ply: usize) -> &[Move] {
        match self.len.get(ply) {
            Some(&len) => &self.moves[ply][..len],
            None => &[],
        }
    }
}

impl Default for PvTable {
    fn default() -> Self {
        Self::new()
    }
}

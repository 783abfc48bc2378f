//! Staged move picker.
//!
//! Moves are generated lazily in stages so that a cutoff on the TT move or a
//! good capture never pays for quiet-move generation. Within a stage moves
//! are scored from the history tables and picked best-first.

use strix_core::{GenType, MAX_MOVES, Move, MoveList, Piece, Position};

use crate::search::history::{ContKey, Histories, LOW_PLY_HISTORY_SIZE, pawn_history_index};
use crate::search::value::{Depth, Value, piece_value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Stage {
    MainTt,
    CaptureInit,
    GoodCapture,
    QuietInit,
    GoodQuiet,
    BadCapture,
    BadQuiet,

    EvasionTt,
    EvasionInit,
    Evasion,

    ProbCutTt,
    ProbCutInit,
    ProbCut,

    QSearchTt,
    QCaptureInit,
    QCapture,

    Done,
}

impl Stage {
    /// The stage after a TT stage whose move is unusable.
    fn skip_tt(self) -> Stage {
        match self {
            Stage::MainTt => Stage::CaptureInit,
            Stage::EvasionTt => Stage::EvasionInit,
            Stage::ProbCutTt => Stage::ProbCutInit,
            Stage::QSearchTt => Stage::QCaptureInit,
            other => other,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct ScoredMove {
    mv: Move,
    value: i32,
}

const EMPTY: ScoredMove = ScoredMove {
    mv: Move::NONE,
    value: 0,
};

/// Quiets scoring at or below this are deferred until after bad captures.
const GOOD_QUIET_THRESHOLD: i32 = -14000;

/// Sort moves in `[begin, end)` by descending value, but only those scoring
/// at least `limit`; the rest stay unordered after them.
fn partial_insertion_sort(moves: &mut [ScoredMove], limit: i32) {
    if moves.is_empty() {
        return;
    }
    let mut sorted_end = 0;
    for p in 1..moves.len() {
        if moves[p].value >= limit {
            let tmp = moves[p];
            sorted_end += 1;
            moves[p] = moves[sorted_end];
            let mut q = sorted_end;
            while q > 0 && moves[q - 1].value < tmp.value {
                moves[q] = moves[q - 1];
                q -= 1;
            }
            moves[q] = tmp;
        }
    }
}

/// Yields pseudo-legal moves best-first, each at most once.
///
/// The picker holds only keys into the history tables; the position and
/// the tables are lent to each [`next_move`](MovePicker::next_move) call.
pub struct MovePicker {
    stage: Stage,
    tt_move: Move,
    depth: Depth,
    ply: usize,
    threshold: Value,
    cont: [ContKey; 6],
    skip_quiets: bool,

    moves: [ScoredMove; MAX_MOVES],
    cur: usize,
    end_cur: usize,
    end_bad_captures: usize,
    end_captures: usize,
    end_generated: usize,
    end_bad_quiets: usize,
}

impl MovePicker {
    /// Picker for the main search (`depth > 0`) and quiescence search
    /// (`depth <= 0`). In check only evasions are produced.
    pub fn new<P: Position>(pos: &P, tt_move: Move, depth: Depth, ply: usize, cont: [ContKey; 6]) -> Self {
        let stage = if pos.in_check() {
            Stage::EvasionTt
        } else if depth > 0 {
            Stage::MainTt
        } else {
            Stage::QSearchTt
        };
        let usable = !tt_move.is_none() && pos.pseudo_legal(tt_move);
        Self::with_stage(if usable { stage } else { stage.skip_tt() }, tt_move, depth, ply, 0, cont)
    }

    /// Picker for ProbCut: captures whose static exchange is at least `threshold`.
    pub fn new_probcut<P: Position>(pos: &P, tt_move: Move, threshold: Value) -> Self {
        let usable = !tt_move.is_none() && pos.capture_stage(tt_move) && pos.pseudo_legal(tt_move);
        let stage = if usable {
            Stage::ProbCutTt
        } else {
            Stage::ProbCutInit
        };
        Self::with_stage(stage, tt_move, 0, 0, threshold, [ContKey::SENTINEL; 6])
    }

    fn with_stage(stage: Stage, tt_move: Move, depth: Depth, ply: usize, threshold: Value, cont: [ContKey; 6]) -> Self {
        Self {
            stage,
            tt_move,
            depth,
            ply,
            threshold,
            cont,
            skip_quiets: false,
            moves: [EMPTY; MAX_MOVES],
            cur: 0,
            end_cur: 0,
            end_bad_captures: 0,
            end_captures: 0,
            end_generated: 0,
            end_bad_quiets: 0,
        }
    }

    /// Stop producing quiet moves from now on.
    pub fn skip_quiet_moves(&mut self) {
        self.skip_quiets = true;
    }

    /// Append generated moves at `start` and return the new end.
    fn generate<P: Position>(&mut self, pos: &P, gen_type: GenType, start: usize) -> usize {
        let mut list = MoveList::new();
        pos.generate(gen_type, &mut list);
        let mut end = start;
        for &mv in &list {
            if end >= MAX_MOVES {
                break;
            }
            self.moves[end] = ScoredMove { mv, value: 0 };
            end += 1;
        }
        end
    }

    fn score_captures<P: Position>(&mut self, pos: &P, hist: &Histories) {
        for m in &mut self.moves[self.cur..self.end_cur] {
            let captured = pos.captured_by(m.mv).map(Piece::kind);
            let victim = captured.map_or(0, piece_value);
            m.value = 7 * victim + hist.capture(pos.moved_piece(m.mv), m.mv.dest(), captured);
        }
    }

    fn score_quiets<P: Position>(&mut self, pos: &P, hist: &Histories) {
        let us = pos.side_to_move();
        let pawn_index = pawn_history_index(pos);
        let ply = self.ply;
        let cont = self.cont;
        for m in &mut self.moves[self.cur..self.end_cur] {
            let piece = pos.moved_piece(m.mv);
            let to = m.mv.dest();
            let mut value = 2 * hist.main(us, m.mv);
            value += 2 * hist.pawn(pawn_index, piece, to);
            for i in [0, 1, 2, 3, 5] {
                value += hist.continuation(cont[i], piece, to);
            }
            if pos.gives_check(m.mv) && pos.see_ge(m.mv, -75) {
                value += 16384;
            }
            if ply < LOW_PLY_HISTORY_SIZE {
                value += 8 * hist.low_ply(ply, m.mv) / (1 + ply as i32);
            }
            m.value = value;
        }
    }

    fn score_evasions<P: Position>(&mut self, pos: &P, hist: &Histories) {
        let us = pos.side_to_move();
        let cont = self.cont[0];
        for m in &mut self.moves[self.cur..self.end_cur] {
            m.value = if pos.capture_stage(m.mv) {
                pos.captured_by(m.mv).map_or(0, |p| piece_value(p.kind())) + (1 << 28)
            } else {
                hist.main(us, m.mv) + hist.continuation(cont, pos.moved_piece(m.mv), m.mv.dest())
            };
        }
    }

    /// Next move in `[cur, end_cur)` that is not the TT move and passes `filter`.
    /// Rejected moves are handed to `reject` before being skipped.
    fn select<F, R>(&mut self, mut filter: F, mut reject: R) -> Option<Move>
    where
        F: FnMut(&ScoredMove) -> bool,
        R: FnMut(&mut Self, ScoredMove),
    {
        while self.cur < self.end_cur {
            let m = self.moves[self.cur];
            self.cur += 1;
            if m.mv == self.tt_move {
                continue;
            }
            if filter(&m) {
                return Some(m.mv);
            }
            reject(self, m);
        }
        None
    }

    /// The next move, or `None` when every stage is exhausted.
    pub fn next_move<P: Position>(&mut self, pos: &P, hist: &Histories) -> Option<Move> {
        loop {
            match self.stage {
                Stage::MainTt | Stage::EvasionTt | Stage::ProbCutTt | Stage::QSearchTt => {
                    self.stage = self.stage.skip_tt();
                    return Some(self.tt_move);
                }

                Stage::CaptureInit | Stage::ProbCutInit | Stage::QCaptureInit => {
                    self.cur = 0;
                    self.end_bad_captures = 0;
                    self.end_captures = self.generate(pos, GenType::Captures, 0);
                    self.end_cur = self.end_captures;
                    self.score_captures(pos, hist);
                    partial_insertion_sort(&mut self.moves[..self.end_cur], i32::MIN);
                    self.stage = match self.stage {
                        Stage::CaptureInit => Stage::GoodCapture,
                        Stage::ProbCutInit => Stage::ProbCut,
                        _ => Stage::QCapture,
                    };
                }

                Stage::GoodCapture => {
                    let picked = self.select(
                        |m| pos.see_ge(m.mv, -m.value / 18),
                        |picker, m| {
                            picker.moves[picker.end_bad_captures] = m;
                            picker.end_bad_captures += 1;
                        },
                    );
                    if picked.is_some() {
                        return picked;
                    }
                    self.stage = Stage::QuietInit;
                }

                Stage::QuietInit => {
                    if !self.skip_quiets {
                        self.cur = self.end_captures;
                        self.end_bad_quiets = self.end_captures;
                        self.end_generated = self.generate(pos, GenType::Quiets, self.end_captures);
                        self.end_cur = self.end_generated;
                        self.score_quiets(pos, hist);
                        let limit = -3560 * self.depth;
                        partial_insertion_sort(&mut self.moves[self.cur..self.end_cur], limit);
                    }
                    self.stage = Stage::GoodQuiet;
                }

                Stage::GoodQuiet => {
                    if !self.skip_quiets {
                        let picked = self.select(
                            |m| m.value > GOOD_QUIET_THRESHOLD,
                            |picker, m| {
                                picker.moves[picker.end_bad_quiets] = m;
                                picker.end_bad_quiets += 1;
                            },
                        );
                        if picked.is_some() {
                            return picked;
                        }
                    }
                    self.cur = 0;
                    self.end_cur = self.end_bad_captures;
                    self.stage = Stage::BadCapture;
                }

                Stage::BadCapture => {
                    let picked = self.select(|_| true, |_, _| {});
                    if picked.is_some() {
                        return picked;
                    }
                    self.cur = self.end_captures;
                    self.end_cur = self.end_bad_quiets;
                    self.stage = Stage::BadQuiet;
                }

                Stage::BadQuiet => {
                    if self.skip_quiets {
                        self.stage = Stage::Done;
                        return None;
                    }
                    let picked = self.select(|_| true, |_, _| {});
                    if picked.is_none() {
                        self.stage = Stage::Done;
                    }
                    return picked;
                }

                Stage::EvasionInit => {
                    self.cur = 0;
                    self.end_cur = self.generate(pos, GenType::Evasions, 0);
                    self.score_evasions(pos, hist);
                    partial_insertion_sort(&mut self.moves[..self.end_cur], i32::MIN);
                    self.stage = Stage::Evasion;
                }

                Stage::Evasion | Stage::QCapture => {
                    let picked = self.select(|_| true, |_, _| {});
                    if picked.is_none() {
                        self.stage = Stage::Done;
                    }
                    return picked;
                }

                Stage::ProbCut => {
                    let threshold = self.threshold;
                    let picked = self.select(|m| pos.see_ge(m.mv, threshold), |_, _| {});
                    if picked.is_none() {
                        self.stage = Stage::Done;
                    }
                    return picked;
                }

                Stage::Done => return None,
            }
        }
    }
}

//! Principal variation alpha-beta search.

use std::sync::atomic::Ordering;

use strix_core::{Evaluator, Move, MoveList, Piece, PieceKind, Position, Tablebase};

use crate::search::history::{CORRECTION_HISTORY_LIMIT, ContKey, CorrKey, pawn_history_index};
use crate::search::ordering::MovePicker;
use crate::search::report::InfoIteration;
use crate::search::tt::Bound;
use crate::search::value::{
    Depth, MAX_PLY, VALUE_DRAW, VALUE_INFINITE, VALUE_NONE, VALUE_TB, VALUE_TB_LOSS_IN_MAX_PLY,
    VALUE_TB_WIN_IN_MAX_PLY, VALUE_ZERO, Value, is_decisive, is_loss, is_valid, is_win, mate_in, mated_in,
    piece_value, value_draw, value_from_tt, value_to_tt, DEPTH_UNSEARCHED,
};
use crate::search::worker::{NodeType, Searcher};

/// Searched-but-not-best moves remembered per node for the statistics update.
const SEARCHED_LIST_CAPACITY: i32 = 32;

/// Static eval adjusted by the correction histories, kept out of the decisive bands.
#[inline]
pub(super) fn corrected_eval(v: Value, correction: i32) -> Value {
    (v + correction / 131_072).clamp(VALUE_TB_LOSS_IN_MAX_PLY + 1, VALUE_TB_WIN_IN_MAX_PLY - 1)
}

#[inline]
fn value_of(piece: Option<Piece>) -> Value {
    piece.map_or(0, |p| piece_value(p.kind()))
}

impl<P, E, T> Searcher<'_, P, E, T>
where
    P: Position,
    E: Evaluator<P>,
    T: Tablebase<P>,
{
    /// Alpha-beta search of the position at `ply` to `depth` plies.
    ///
    /// Fail-soft: the result may lie outside `(alpha, beta)`. When the search
    /// is stopped the returned value is meaningless and the caller must
    /// discard it. The position is restored before returning.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn search(
        &mut self,
        ply: i32,
        mut alpha: Value,
        mut beta: Value,
        mut depth: Depth,
        cut_node: bool,
        node: NodeType,
    ) -> Value {
        let pv_node = node.is_pv();
        let root_node = node == NodeType::Root;
        let all_node = !(pv_node || cut_node);

        self.dynamic_weights = !(cut_node || (pv_node && depth < 12));

        // Leaf: resolve captures first
        if depth <= 0 {
            return self.qsearch(ply, alpha, beta, pv_node);
        }

        depth = depth.min(MAX_PLY - 1);

        // A move from here may repeat an earlier position
        if !root_node && alpha < VALUE_DRAW && self.pos.upcoming_repetition(ply as usize) {
            alpha = value_draw(self.nodes());
            if alpha >= beta {
                return alpha;
            }
        }

        debug_assert!(-VALUE_INFINITE <= alpha && alpha < beta && beta <= VALUE_INFINITE);
        debug_assert!(pv_node || alpha == beta - 1);
        debug_assert!(!(pv_node && cut_node));

        let in_check = self.pos.in_check();
        if in_check {
            self.dynamic_weights = false;
        }
        let prior_capture = self.pos.captured_piece().is_some();
        let us = self.pos.side_to_move();
        {
            let frame = &mut self.w.stack[ply];
            frame.in_check = in_check;
            frame.move_count = 0;
        }
        let mut best_value = -VALUE_INFINITE;
        let mut max_value = VALUE_INFINITE;

        self.check_time();

        if pv_node && self.w.sel_depth < ply + 1 {
            self.w.sel_depth = ply + 1;
        }

        if !root_node {
            // Aborted search, draw or ply ceiling
            if self.stopped() || self.pos.is_draw(ply as usize) || ply >= MAX_PLY {
                return if ply >= MAX_PLY && !in_check {
                    self.evaluate()
                } else {
                    value_draw(self.nodes())
                };
            }

            // Mate distance pruning
            alpha = alpha.max(mated_in(ply));
            beta = beta.min(mate_in(ply + 1));
            if alpha >= beta {
                return alpha;
            }
        }

        let prev = self.w.stack[ply - 1];
        let prev_move = prev.current_move;
        let prev_piece = if prev_move.is_ok() { prev.moved } else { None };
        let prev_sq = prev_move.dest();
        let prior_reduction = prev.reduction;
        self.w.stack[ply - 1].reduction = 0;
        self.w.stack[ply].stat_score = 0;
        self.w.stack[ply + 2].cutoff_cnt = 0;

        let mut best_move = Move::NONE;

        // Transposition table lookup
        let excluded = self.w.stack[ply].excluded_move;
        let key = self.pos.key();
        let tt = self.ctx.tt;
        let (tt_hit, mut tt_data, tt_writer) = tt.probe(key);
        self.w.stack[ply].tt_hit = tt_hit;
        tt_data.mv = if root_node {
            self.w.root_moves[self.w.pv_idx].mv()
        } else if tt_hit {
            tt_data.mv
        } else {
            Move::NONE
        };
        tt_data.value = if tt_hit {
            value_from_tt(tt_data.value, ply, self.pos.rule50_count() as i32)
        } else {
            VALUE_NONE
        };
        if excluded.is_none() {
            self.w.stack[ply].tt_pv = pv_node || (tt_hit && tt_data.is_pv);
        }
        let tt_capture = !tt_data.mv.is_none() && self.pos.capture_stage(tt_data.mv);

        // Early TT cutoff at non-PV nodes
        if !pv_node
            && excluded.is_none()
            && tt_data.depth > depth - (tt_data.value <= beta) as i32
            && is_valid(tt_data.value)
            && tt_data.bound.includes(if tt_data.value >= beta { Bound::Lower } else { Bound::Upper })
            && (cut_node == (tt_data.value >= beta) || depth > 5)
            // A zeroing TT move close to the fifty-move limit may not be playable
            && (depth > 8
                || tt_data.mv.is_none()
                || self.pos.rule50_count() < 80
                || (!tt_capture && self.pos.moved_piece(tt_data.mv).kind() != PieceKind::Pawn))
        {
            if !tt_data.mv.is_none() && tt_data.value >= beta {
                if !tt_capture {
                    let bonus = (130 * depth - 71).min(1043);
                    self.w.hist.update_quiet(&self.pos, &self.w.stack, ply, tt_data.mv, bonus);
                }
                // Early quiet replies of the previous ply were refuted
                if let Some(piece) = prev_piece {
                    if prev.move_count < 4 && !prior_capture {
                        self.w.hist.update_continuation(&self.w.stack, ply - 1, piece, prev_sq, -2142);
                    }
                }
            }

            // Graph history interaction: no cutoffs deep into the fifty-move count
            if self.pos.rule50_count() < 96 {
                if depth >= 8
                    && !tt_data.mv.is_none()
                    && self.pos.pseudo_legal(tt_data.mv)
                    && self.pos.legal(tt_data.mv)
                    && !is_decisive(tt_data.value)
                {
                    let gives_check = self.pos.gives_check(tt_data.mv);
                    self.pos.do_move(tt_data.mv, gives_check);
                    let (_, next, _) = tt.probe(self.pos.key());
                    self.pos.undo_move(tt_data.mv);

                    // The cutoff must survive one ply down
                    if !is_valid(next.value) || (tt_data.value >= beta) == (-next.value >= beta) {
                        return tt_data.value;
                    }
                } else {
                    return tt_data.value;
                }
            }
        }

        // Endgame oracle
        if !root_node && excluded.is_none() && self.w.tb.cardinality > 0 {
            let tb = self.w.tb;
            let pieces = self.pos.piece_count();

            if pieces <= tb.cardinality
                && (pieces < tb.cardinality || depth >= tb.probe_depth)
                && self.pos.rule50_count() == 0
                && !self.pos.can_castle()
            {
                let wdl = self.ctx.tb.probe_wdl(&self.pos);
                self.reset_calls();

                if let Some(wdl) = wdl {
                    self.counters().tb_hits.fetch_add(1, Ordering::Relaxed);

                    let w = wdl.signum2();
                    let draw_score = tb.use_rule50 as i32;
                    let tb_value = VALUE_TB - ply;
                    let (value, bound) = if w < -draw_score {
                        (-tb_value, Bound::Upper)
                    } else if w > draw_score {
                        (tb_value, Bound::Lower)
                    } else {
                        (VALUE_DRAW + 2 * w * draw_score, Bound::Exact)
                    };

                    if bound == Bound::Exact
                        || (if bound == Bound::Lower { value >= beta } else { value <= alpha })
                    {
                        tt_writer.write(
                            key,
                            value_to_tt(value, ply),
                            self.w.stack[ply].tt_pv,
                            bound,
                            (depth + 6).min(MAX_PLY - 1),
                            Move::NONE,
                            VALUE_NONE,
                            tt.generation(),
                        );
                        return value;
                    }

                    if pv_node {
                        if bound == Bound::Lower {
                            best_value = value;
                            alpha = alpha.max(best_value);
                        } else {
                            max_value = value;
                        }
                    }
                }
            }
        }

        // Static evaluation
        let mut unadjusted_eval = VALUE_NONE;
        let correction = self.w.hist.correction_value(&self.pos, &self.w.stack, ply);
        let static_eval;
        let mut improving = false;

        if in_check {
            // No early pruning in check
            static_eval = self.w.stack[ply - 2].static_eval;
            self.w.stack[ply].static_eval = static_eval;
        } else {
            let mut eval;
            if !excluded.is_none() {
                static_eval = self.w.stack[ply].static_eval;
                unadjusted_eval = static_eval;
                eval = static_eval;
            } else if tt_hit {
                unadjusted_eval = if is_valid(tt_data.eval) {
                    tt_data.eval
                } else {
                    self.evaluate()
                };
                static_eval = corrected_eval(unadjusted_eval, correction);
                self.w.stack[ply].static_eval = static_eval;
                eval = static_eval;

                // A bounded TT value is a better estimate
                if is_valid(tt_data.value)
                    && tt_data.bound.includes(if tt_data.value > eval { Bound::Lower } else { Bound::Upper })
                {
                    eval = tt_data.value;
                }
            } else {
                unadjusted_eval = self.evaluate();
                static_eval = corrected_eval(unadjusted_eval, correction);
                self.w.stack[ply].static_eval = static_eval;
                eval = static_eval;

                tt_writer.write(
                    key,
                    VALUE_NONE,
                    self.w.stack[ply].tt_pv,
                    Bound::None,
                    DEPTH_UNSEARCHED,
                    Move::NONE,
                    unadjusted_eval,
                    tt.generation(),
                );
            }

            // Eval swing across the previous quiet move feeds its history
            if prev_move.is_ok() && !prev.in_check && !prior_capture {
                let bonus = (-10 * (prev.static_eval + static_eval)).clamp(-2023, 1563) + 583;
                self.w.hist.update_main(!us, prev_move, bonus * 944 / 1024);
                if let Some(piece) = prev_piece {
                    if !tt_hit && piece.kind() != PieceKind::Pawn && !prev_move.is_promotion() {
                        let pidx = pawn_history_index(&self.pos);
                        self.w.hist.update_pawn(pidx, piece, prev_sq, bonus * 1438 / 1024);
                    }
                }
            }

            improving = static_eval > self.w.stack[ply - 2].static_eval;
            let opponent_worsening = static_eval > -prev.static_eval;

            if prior_reduction >= 3 && !opponent_worsening {
                depth += 1;
            }
            if prior_reduction >= 2 && depth >= 2 && static_eval + prev.static_eval > 173 {
                depth -= 1;
            }

            // Razoring
            if !pv_node && eval < alpha - 514 - 294 * depth * depth {
                return self.qsearch(ply, alpha, beta, false);
            }

            // Futility pruning: child node
            let futility_mult = 91 - 21 * !tt_hit as i32;
            let futility_margin = futility_mult * depth
                - 2094 * improving as i32 * futility_mult / 1024
                - 1324 * opponent_worsening as i32 * futility_mult / 4096
                + prev.stat_score / 331
                + correction.abs() / 158_105;

            if !self.w.stack[ply].tt_pv
                && depth < 14
                && eval - futility_margin >= beta
                && eval >= beta
                && (tt_data.mv.is_none() || tt_capture)
                && !is_loss(beta)
                && !is_win(eval)
            {
                return (2 * beta + eval) / 3;
            }

            // Null move search with verification
            if cut_node
                && static_eval >= beta - 18 * depth + 390
                && excluded.is_none()
                && self.pos.non_pawn_material(us) != 0
                && ply >= self.w.nmp_min_ply
                && !is_loss(beta)
            {
                debug_assert!(prev_move != Move::NULL);
                let r = 6 + depth / 3;

                {
                    let frame = &mut self.w.stack[ply];
                    frame.current_move = Move::NULL;
                    frame.moved = None;
                    frame.cont = ContKey::SENTINEL;
                    frame.corr = CorrKey::SENTINEL;
                }
                self.pos.do_null_move();
                let null_value = -self.search(ply + 1, -beta, -beta + 1, depth - r, false, NodeType::NonPv);
                self.pos.undo_null_move();

                // Never return an unproven win
                if null_value >= beta && !is_win(null_value) {
                    if self.w.nmp_min_ply != 0 || depth < 16 {
                        return null_value;
                    }

                    // Verify with null moves disabled for the first plies
                    self.w.nmp_min_ply = ply + 3 * (depth - r) / 4;
                    let v = self.search(ply, beta - 1, beta, depth - r, false, NodeType::NonPv);
                    self.w.nmp_min_ply = 0;

                    if v >= beta {
                        return null_value;
                    }
                }
            }

            improving |= static_eval >= beta;

            // Internal iterative reduction
            if !all_node && depth >= 6 && tt_data.mv.is_none() && prior_reduction <= 3 {
                depth -= 1;
            }

            // ProbCut: a good capture whose reduced search clears beta by a margin
            let prob_cut_beta = beta + 224 - 64 * improving as i32;
            if depth >= 3
                && !is_decisive(beta)
                && !(is_valid(tt_data.value) && tt_data.value < prob_cut_beta)
            {
                let mut mp = MovePicker::new_probcut(&self.pos, tt_data.mv, prob_cut_beta - static_eval);
                let prob_cut_depth = (depth - 5 - (static_eval - beta) / 306).clamp(0, depth);

                while let Some(mv) = mp.next_move(&self.pos, &self.w.hist) {
                    if mv == excluded || !self.pos.legal(mv) {
                        continue;
                    }
                    debug_assert!(self.pos.capture_stage(mv));

                    let gives_check = self.pos.gives_check(mv);
                    self.do_move(ply, mv, gives_check);

                    let mut value = -self.qsearch(ply + 1, -prob_cut_beta, -prob_cut_beta + 1, false);
                    if value >= prob_cut_beta && prob_cut_depth > 0 {
                        value = -self.search(
                            ply + 1,
                            -prob_cut_beta,
                            -prob_cut_beta + 1,
                            prob_cut_depth,
                            !cut_node,
                            NodeType::NonPv,
                        );
                    }

                    self.undo_move(mv);

                    if self.stopped() {
                        return VALUE_ZERO;
                    }

                    if value >= prob_cut_beta {
                        tt_writer.write(
                            key,
                            value_to_tt(value, ply),
                            self.w.stack[ply].tt_pv,
                            Bound::Lower,
                            prob_cut_depth + 1,
                            mv,
                            unadjusted_eval,
                            tt.generation(),
                        );

                        if !is_decisive(value) {
                            return value - (prob_cut_beta - beta);
                        }
                    }
                }
            }
        }

        // Small ProbCut on a deep enough lower-bound TT entry
        let prob_cut_beta = beta + 418;
        if !root_node
            && tt_data.bound.includes(Bound::Lower)
            && tt_data.depth >= depth - 4
            && tt_data.value >= prob_cut_beta
            && !is_decisive(beta)
            && is_valid(tt_data.value)
            && !is_decisive(tt_data.value)
        {
            return prob_cut_beta;
        }

        let cont: [ContKey; 6] = std::array::from_fn(|i| self.w.stack[ply - 1 - i as i32].cont);
        let mut mp = MovePicker::new(&self.pos, tt_data.mv, depth, ply as usize, cont);

        let attack_inclination = self.ctx.options.attack_inclination;
        let sacrifice_tolerance = self.ctx.options.check_sacrifice_tolerance_cp;

        let mut value = best_value;
        let mut move_count = 0;
        let mut quiets_searched = MoveList::new();
        let mut captures_searched = MoveList::new();

        // Move loop
        while let Some(mv) = mp.next_move(&self.pos, &self.w.hist) {
            if mv == excluded || !self.pos.legal(mv) {
                continue;
            }

            // At the root only the lines of the current multi-PV group are searched
            if root_node
                && !self.w.root_moves[self.w.pv_idx..self.w.pv_last]
                    .iter()
                    .any(|rm| rm.mv() == mv)
            {
                continue;
            }

            move_count += 1;
            self.w.stack[ply].move_count = move_count;

            if root_node && self.nodes() > 10_000_000 {
                let number = move_count as usize + self.w.pv_idx;
                if let Some(main) = self.main.as_mut() {
                    main.listener.on_iter(&InfoIteration {
                        depth,
                        current_move: mv,
                        current_move_number: number,
                    });
                }
            }
            if pv_node {
                self.w.pv.clear_ply(ply as usize + 1);
            }

            let mut extension = 0;
            let capture = self.pos.capture_stage(mv);
            let moved_piece = self.pos.moved_piece(mv);
            let gives_check = self.pos.gives_check(mv);
            let to = mv.dest();

            let mut new_depth = depth - 1;
            let mut r = self.w.reduction(improving, depth, move_count, beta - alpha);

            // Forcing moves are reduced less when attacking play is preferred
            if attack_inclination > 0 && (gives_check || capture) {
                if attack_inclination >= 50 {
                    r -= 1024;
                } else if attack_inclination >= 20 {
                    r -= 512;
                }
            }

            if self.w.stack[ply].tt_pv {
                r += 946;
            }

            // Pruning at shallow depth
            if !root_node && self.pos.non_pawn_material(us) != 0 && !is_loss(best_value) {
                if move_count >= (3 + depth * depth) / (2 - improving as i32) {
                    mp.skip_quiet_moves();
                }

                let mut lmr_depth = new_depth - r / 1024;

                if capture || gives_check {
                    let captured = self.pos.captured_by(mv);
                    let capt_hist = self.w.hist.capture(moved_piece, to, captured.map(Piece::kind));

                    // Futility pruning for captures
                    if !gives_check && lmr_depth < 7 {
                        let futility_value =
                            static_eval + 231 + 211 * lmr_depth + value_of(captured) + 130 * capt_hist / 1024;
                        if futility_value <= alpha {
                            continue;
                        }
                    }

                    // SEE pruning for captures and checks
                    let mut margin = (157 * depth + capt_hist / 29).max(0);
                    if gives_check && sacrifice_tolerance > 0 {
                        margin += sacrifice_tolerance;
                    }
                    if (alpha >= VALUE_DRAW || self.pos.non_pawn_material(us) != piece_value(moved_piece.kind()))
                        && !self.pos.see_ge(mv, -margin)
                    {
                        continue;
                    }
                } else {
                    let mut history = self.w.hist.continuation(cont[0], moved_piece, to)
                        + self.w.hist.continuation(cont[1], moved_piece, to)
                        + self.w.hist.pawn(pawn_history_index(&self.pos), moved_piece, to);

                    // Continuation history pruning
                    if history < -4312 * depth {
                        continue;
                    }

                    history += 76 * self.w.hist.main(us, mv) / 32;
                    lmr_depth += history / 3220;

                    let futility_value = static_eval
                        + 47
                        + 171 * best_move.is_none() as i32
                        + 134 * lmr_depth
                        + 90 * (static_eval > alpha) as i32;

                    // Futility pruning: parent node
                    if !in_check && lmr_depth < 11 && futility_value <= alpha {
                        if best_value <= futility_value && !is_decisive(best_value) && !is_win(futility_value) {
                            best_value = futility_value;
                        }
                        continue;
                    }

                    lmr_depth = lmr_depth.max(0);

                    // Negative SEE
                    if !self.pos.see_ge(mv, -27 * lmr_depth * lmr_depth) {
                        continue;
                    }
                }
            }

            // Singular extension: only the TT move holds a reduced search
            // with the TT move excluded below a margin under its value
            if !root_node
                && mv == tt_data.mv
                && excluded.is_none()
                && depth >= 6 + self.w.stack[ply].tt_pv as i32
                && is_valid(tt_data.value)
                && !is_decisive(tt_data.value)
                && tt_data.bound.includes(Bound::Lower)
                && tt_data.depth >= depth - 3
            {
                let tt_pv = self.w.stack[ply].tt_pv;
                let singular_beta = tt_data.value - (56 + 81 * (tt_pv && !pv_node) as i32) * depth / 60;
                let singular_depth = new_depth / 2;

                self.w.stack[ply].excluded_move = mv;
                let v = self.search(ply, singular_beta - 1, singular_beta, singular_depth, cut_node, NodeType::NonPv);
                self.w.stack[ply].excluded_move = Move::NONE;

                if v < singular_beta {
                    let corr_adj = correction.abs() / 229_958;
                    let double_margin = -4 + 198 * pv_node as i32
                        - 212 * !tt_capture as i32
                        - corr_adj
                        - 921 * self.w.hist.tt_move.get() / 127_649
                        - (ply > self.w.root_depth) as i32 * 45;
                    let triple_margin = 76 + 308 * pv_node as i32 - 250 * !tt_capture as i32 + 92 * tt_pv as i32
                        - corr_adj
                        - (ply * 2 > self.w.root_depth * 3) as i32 * 52;

                    extension = 1 + (v < singular_beta - double_margin) as i32 + (v < singular_beta - triple_margin) as i32;
                    depth += 1;
                } else if v >= beta && !is_decisive(v) {
                    // Multi-cut: more than one move clears beta
                    self.w.hist.tt_move.update((-400 - 100 * depth).max(-4000));
                    return v;
                } else if tt_data.value >= beta {
                    extension = -3;
                } else if cut_node {
                    extension = -2;
                }
            }

            self.do_move(ply, mv, gives_check);

            new_depth += extension;
            let node_count = if root_node { self.nodes() } else { 0 };

            if self.w.stack[ply].tt_pv {
                r -= 2618
                    + pv_node as i32 * 991
                    + (tt_data.value > alpha) as i32 * 903
                    + (tt_data.depth >= depth) as i32 * (978 + cut_node as i32 * 1051);
            }

            r += 843;
            r -= move_count * 66;
            r -= correction.abs() / 30_450;

            if cut_node {
                r += 3094 + 1056 * tt_data.mv.is_none() as i32;
            }
            if tt_capture {
                r += 1415;
            }
            if self.w.stack[ply + 1].cutoff_cnt > 2 {
                r += 1051 + all_node as i32 * 814;
            }
            if mv == tt_data.mv {
                r -= 2018;
            }

            let stat_score = if capture {
                let captured = self.pos.captured_piece();
                803 * value_of(captured) / 128 + self.w.hist.capture(moved_piece, to, captured.map(Piece::kind))
            } else {
                2 * self.w.hist.main(us, mv)
                    + self.w.hist.continuation(cont[0], moved_piece, to)
                    + self.w.hist.continuation(cont[1], moved_piece, to)
            };
            self.w.stack[ply].stat_score = stat_score;
            r -= stat_score * 794 / 8192;

            // Late move reduction
            if depth >= 2 && move_count > 1 {
                let d = (new_depth - r / 1024).min(new_depth + 2).max(1) + pv_node as i32;

                self.w.stack[ply].reduction = new_depth - d;
                value = -self.search(ply + 1, -(alpha + 1), -alpha, d, true, NodeType::NonPv);
                self.w.stack[ply].reduction = 0;

                // Re-search at full depth after a reduced fail high
                if value > alpha {
                    let deeper = d < new_depth && value > best_value + 43 + 2 * new_depth;
                    let shallower = value < best_value + 9;
                    new_depth += deeper as i32 - shallower as i32;

                    if new_depth > d {
                        value = -self.search(ply + 1, -(alpha + 1), -alpha, new_depth, !cut_node, NodeType::NonPv);
                    }

                    self.w.hist.update_continuation(&self.w.stack, ply, moved_piece, to, 1365);
                }
            } else if !pv_node || move_count > 1 {
                if tt_data.mv.is_none() {
                    r += 1118;
                }
                let d = new_depth - (r > 3212) as i32 - (r > 4784 && new_depth > 2) as i32;
                value = -self.search(ply + 1, -(alpha + 1), -alpha, d, !cut_node, NodeType::NonPv);
            }

            // Full-window search for the first move and after a fail high
            if pv_node && (move_count == 1 || value > alpha) {
                self.w.pv.clear_ply(ply as usize + 1);

                // Do not let the TT move drop into quiescence
                if mv == tt_data.mv && tt_data.depth > 1 && self.w.root_depth > 8 {
                    new_depth = new_depth.max(1);
                }

                value = -self.search(ply + 1, -beta, -alpha, new_depth, false, NodeType::Pv);
            }

            self.undo_move(mv);

            debug_assert!(value > -VALUE_INFINITE && value < VALUE_INFINITE);

            // A stopped search returns garbage: leave PV, best move and TT alone
            if self.stopped() {
                return VALUE_ZERO;
            }

            if root_node {
                self.record_root_move(mv, value, alpha, beta, move_count, node_count);
            }

            // Ties with the best move near the leaves are occasionally promoted
            let inc = (value == best_value
                && ply + 2 >= self.w.root_depth
                && (self.nodes() & 14) == 0
                && !is_win(value.abs() + 1)) as i32;

            if value + inc > best_value {
                best_value = value;

                if value + inc > alpha {
                    best_move = mv;

                    if pv_node && !root_node {
                        self.w.pv.update(ply as usize, mv);
                    }

                    if value >= beta {
                        self.w.stack[ply].cutoff_cnt += (extension < 2 || pv_node) as i32;
                        break;
                    }

                    // Later moves only need to refute the improved alpha
                    if depth > 2 && depth < 14 && !is_decisive(value) {
                        depth -= 2;
                    }

                    debug_assert!(depth > 0);
                    alpha = value;
                }
            }

            if mv != best_move && move_count <= SEARCHED_LIST_CAPACITY {
                if capture {
                    captures_searched.push(mv);
                } else {
                    quiets_searched.push(mv);
                }
            }
        }

        // Soften fail highs
        if best_value >= beta && !is_decisive(best_value) && !is_decisive(alpha) {
            best_value = (best_value * depth + beta) / (depth + 1);
        }

        if move_count == 0 {
            // Mate, stalemate, or every move excluded
            best_value = if !excluded.is_none() {
                alpha
            } else if in_check {
                mated_in(ply)
            } else {
                VALUE_DRAW
            };
        } else if !best_move.is_none() {
            self.w.hist.update_all_stats(
                &self.pos,
                &self.w.stack,
                ply,
                best_move,
                quiets_searched.as_slice(),
                captures_searched.as_slice(),
                depth,
                tt_data.mv,
            );
            if !pv_node {
                self.w.hist.tt_move.update(if best_move == tt_data.mv { 809 } else { -865 });
            }
        } else if let Some(piece) = prev_piece {
            if !prior_capture {
                // The previous quiet move caused this fail low
                let mut bonus_scale = -228 - prev.stat_score / 104
                    + (63 * depth).min(508)
                    + 184 * (prev.move_count > 8) as i32
                    + 143 * (!in_check && best_value <= static_eval - 92) as i32
                    + 149 * (!prev.in_check && best_value <= -prev.static_eval - 70) as i32;
                bonus_scale = bonus_scale.max(0);

                let scaled_bonus = (144 * depth - 92).min(1365) * bonus_scale;

                self.w.hist.update_continuation(&self.w.stack, ply - 1, piece, prev_sq, scaled_bonus * 400 / 32768);
                self.w.hist.update_main(!us, prev_move, scaled_bonus * 220 / 32768);

                if piece.kind() != PieceKind::Pawn && !prev_move.is_promotion() {
                    let pidx = pawn_history_index(&self.pos);
                    self.w.hist.update_pawn(pidx, piece, prev_sq, scaled_bonus * 1164 / 32768);
                }
            } else if let Some(captured) = self.pos.captured_piece() {
                self.w.hist.update_capture(piece, prev_sq, Some(captured.kind()), 964);
            }
        }

        if pv_node {
            best_value = best_value.min(max_value);
        }

        // A fail low under a PV parent keeps the position on the PV
        if best_value <= alpha {
            let parent_pv = self.w.stack[ply - 1].tt_pv;
            self.w.stack[ply].tt_pv |= parent_pv;
        }

        if excluded.is_none() && !(root_node && self.w.pv_idx > 0) {
            let bound = if best_value >= beta {
                Bound::Lower
            } else if pv_node && !best_move.is_none() {
                Bound::Exact
            } else {
                Bound::Upper
            };
            tt_writer.write(
                key,
                value_to_tt(best_value, ply),
                self.w.stack[ply].tt_pv,
                bound,
                if move_count != 0 { depth } else { (depth + 6).min(MAX_PLY - 1) },
                best_move,
                unadjusted_eval,
                tt.generation(),
            );
        }

        // Learn how far the static eval was off
        if !in_check
            && !(!best_move.is_none() && self.pos.capture(best_move))
            && ((best_value < static_eval && best_value < beta) || (best_value > static_eval && !best_move.is_none()))
        {
            let above = best_value > static_eval;
            let bonus = ((best_value - static_eval) * depth / (8 + above as i32))
                .clamp(-CORRECTION_HISTORY_LIMIT / 4, CORRECTION_HISTORY_LIMIT / 4);
            self.w
                .hist
                .update_correction(&self.pos, &self.w.stack, ply, (1088 - 180 * above as i32) * bonus / 1024);
        }

        debug_assert!(best_value > -VALUE_INFINITE && best_value < VALUE_INFINITE);
        best_value
    }

    /// Fold the result of a root move into its [`RootMove`](crate::search::root::RootMove).
    fn record_root_move(&mut self, mv: Move, value: Value, alpha: Value, beta: Value, move_count: i32, node_count: u64) {
        let nodes = self.nodes();
        let sel_depth = self.w.sel_depth;
        let first_line = self.w.pv_idx == 0;
        let worker = &mut *self.w;
        let Some(rm) = worker.root_moves.iter_mut().find(|rm| rm.mv() == mv) else {
            return;
        };

        rm.effort += nodes - node_count;
        rm.average_score = if rm.average_score != -VALUE_INFINITE {
            (value + rm.average_score) / 2
        } else {
            value
        };
        let squared = value as i64 * value.abs() as i64;
        rm.mean_squared_score = if rm.mean_squared_score != -(VALUE_INFINITE as i64) * VALUE_INFINITE as i64 {
            (squared + rm.mean_squared_score) / 2
        } else {
            squared
        };

        if move_count == 1 || value > alpha {
            rm.score = value;
            rm.uci_score = value;
            rm.sel_depth = sel_depth;
            rm.score_lowerbound = false;
            rm.score_upperbound = false;

            if value >= beta {
                rm.score_lowerbound = true;
                rm.uci_score = beta;
            } else if value <= alpha {
                rm.score_upperbound = true;
                rm.uci_score = alpha;
            }

            rm.pv.truncate(1);
            rm.pv.extend_from_slice(worker.pv.line(1));

            // Best-move instability drives the time budget; only the first line counts
            if move_count > 1 && first_line {
                self.counters().best_move_changes.fetch_add(1, Ordering::Relaxed);
            }
        } else {
            // Stable sort keeps the others in place
            rm.score = -VALUE_INFINITE;
        }
    }
}

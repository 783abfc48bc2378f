//! Quiescence search: captures only (evasions in check) until the position is quiet.

use strix_core::{Evaluator, Move, Piece, Position, Tablebase};

use crate::search::history::{ContKey, pawn_history_index};
use crate::search::negamax::corrected_eval;
use crate::search::ordering::MovePicker;
use crate::search::tt::Bound;
use crate::search::value::{
    DEPTH_QS, DEPTH_UNSEARCHED, MAX_PLY, PAWN_VALUE, VALUE_DRAW, VALUE_INFINITE, VALUE_NONE, Value, is_decisive,
    is_loss, is_valid, mated_in, piece_value, to_cp, value_draw, value_from_tt, value_to_tt,
};
use crate::search::worker::Searcher;

/// Stand-pat margin added to the static eval before counting the victim.
const FUTILITY_MARGIN: Value = 352;
/// Minimum exchange result for a move to be searched.
const SEE_GATE: Value = -78;

impl<P, E, T> Searcher<'_, P, E, T>
where
    P: Position,
    E: Evaluator<P>,
    T: Tablebase<P>,
{
    pub(crate) fn qsearch(&mut self, ply: i32, mut alpha: Value, beta: Value, pv_node: bool) -> Value {
        self.dynamic_weights = false;

        debug_assert!(-VALUE_INFINITE <= alpha && alpha < beta && beta <= VALUE_INFINITE);
        debug_assert!(pv_node || alpha == beta - 1);

        if pv_node {
            self.w.pv.clear_ply(ply as usize);
        }

        // A move from here may repeat an earlier position
        if alpha < VALUE_DRAW && self.pos.upcoming_repetition(ply as usize) {
            alpha = value_draw(self.nodes());
            if alpha >= beta {
                return alpha;
            }
        }

        let in_check = self.pos.in_check();
        self.w.stack[ply].in_check = in_check;
        let mut best_move = Move::NONE;
        let mut move_count = 0;

        if pv_node && self.w.sel_depth < ply + 1 {
            self.w.sel_depth = ply + 1;
        }

        if self.pos.is_draw(ply as usize) || ply >= MAX_PLY {
            return if ply >= MAX_PLY && !in_check {
                self.evaluate()
            } else {
                VALUE_DRAW
            };
        }

        // Transposition table lookup
        let key = self.pos.key();
        let tt = self.ctx.tt;
        let (tt_hit, mut tt_data, tt_writer) = tt.probe(key);
        self.w.stack[ply].tt_hit = tt_hit;
        if !tt_hit {
            tt_data.mv = Move::NONE;
        }
        tt_data.value = if tt_hit {
            value_from_tt(tt_data.value, ply, self.pos.rule50_count() as i32)
        } else {
            VALUE_NONE
        };
        let pv_hit = tt_hit && tt_data.is_pv;

        if !pv_node
            && tt_data.depth >= DEPTH_QS
            && is_valid(tt_data.value)
            && tt_data.bound.includes(if tt_data.value >= beta { Bound::Lower } else { Bound::Upper })
        {
            return tt_data.value;
        }

        // Stand pat
        let mut unadjusted_eval = VALUE_NONE;
        let mut best_value;
        let futility_base;

        if in_check {
            best_value = -VALUE_INFINITE;
            futility_base = -VALUE_INFINITE;
        } else {
            let correction = self.w.hist.correction_value(&self.pos, &self.w.stack, ply);

            if tt_hit {
                unadjusted_eval = if is_valid(tt_data.eval) {
                    tt_data.eval
                } else {
                    self.evaluate()
                };
                best_value = corrected_eval(unadjusted_eval, correction);
                self.w.stack[ply].static_eval = best_value;

                if is_valid(tt_data.value)
                    && !is_decisive(tt_data.value)
                    && tt_data.bound.includes(if tt_data.value > best_value { Bound::Lower } else { Bound::Upper })
                {
                    best_value = tt_data.value;
                }
            } else {
                unadjusted_eval = self.evaluate();
                best_value = corrected_eval(unadjusted_eval, correction);
                self.w.stack[ply].static_eval = best_value;
            }

            if best_value >= beta {
                if !is_decisive(best_value) {
                    best_value = (best_value + beta) / 2;
                }
                if !tt_hit {
                    tt_writer.write(
                        key,
                        value_to_tt(best_value, ply),
                        false,
                        Bound::Lower,
                        DEPTH_UNSEARCHED,
                        Move::NONE,
                        unadjusted_eval,
                        tt.generation(),
                    );
                }
                return best_value;
            }

            alpha = alpha.max(best_value);
            futility_base = self.w.stack[ply].static_eval + FUTILITY_MARGIN;
        }

        let prev_move = self.w.stack[ply - 1].current_move;
        let prev_sq = prev_move.is_ok().then(|| prev_move.dest());

        let cont: [ContKey; 6] = std::array::from_fn(|i| self.w.stack[ply - 1 - i as i32].cont);
        let mut mp = MovePicker::new(&self.pos, tt_data.mv, DEPTH_QS, ply as usize, cont);

        let sacrifice_tolerance = self.ctx.options.check_sacrifice_tolerance_cp;

        while let Some(mv) = mp.next_move(&self.pos, &self.w.hist) {
            if !self.pos.legal(mv) {
                continue;
            }

            let gives_check = self.pos.gives_check(mv);
            let capture = self.pos.capture_stage(mv);

            move_count += 1;

            if !is_loss(best_value) {
                // Futility and move-count pruning
                if !gives_check && Some(mv.dest()) != prev_sq && !is_loss(futility_base) && !mv.is_promotion() {
                    if move_count > 2 {
                        continue;
                    }

                    let futility_value =
                        futility_base + self.pos.captured_by(mv).map_or(0, |p: Piece| piece_value(p.kind()));

                    // Even winning the victim cannot reach alpha
                    if futility_value <= alpha {
                        best_value = best_value.max(futility_value);
                        continue;
                    }

                    if !self.pos.see_ge(mv, alpha - futility_base) {
                        best_value = alpha.min(futility_base);
                        continue;
                    }
                }

                // Quiet evasions need a good pawn-structure history
                if !capture {
                    let pidx = pawn_history_index(&self.pos);
                    if self.w.hist.pawn(pidx, self.pos.moved_piece(mv), mv.dest()) < 7300 {
                        continue;
                    }
                }

                let mut see_gate = SEE_GATE;
                if sacrifice_tolerance > 0 && gives_check {
                    see_gate -= sacrifice_tolerance;
                }
                if !self.pos.see_ge(mv, see_gate) {
                    continue;
                }
            }

            self.do_move(ply, mv, gives_check);
            let value = -self.qsearch(ply + 1, -beta, -alpha, pv_node);
            self.undo_move(mv);

            debug_assert!(value > -VALUE_INFINITE && value < VALUE_INFINITE);

            if value > best_value {
                best_value = value;

                if value > alpha {
                    best_move = mv;

                    if pv_node {
                        self.w.pv.update(ply as usize, mv);
                    }

                    if value < beta {
                        alpha = value;
                    } else {
                        break;
                    }
                }
            }
        }

        best_value += self.variety_bonus(best_value);

        // In check with no legal reply
        if in_check && best_value == -VALUE_INFINITE {
            return mated_in(ply);
        }

        if !is_decisive(best_value) && best_value > beta {
            best_value = (best_value + beta) / 2;
        }

        tt_writer.write(
            key,
            value_to_tt(best_value, ply),
            pv_hit,
            if best_value >= beta { Bound::Lower } else { Bound::Upper },
            DEPTH_QS,
            best_move,
            unadjusted_eval,
            tt.generation(),
        );

        debug_assert!(best_value > -VALUE_INFINITE && best_value < VALUE_INFINITE);
        best_value
    }

    /// Small random bonus for near-balanced values in the early game, so that
    /// repeated games from the same position diverge.
    fn variety_bonus(&mut self, best_value: Value) -> Value {
        let variety = self.ctx.variety;
        if variety.strength <= 0
            || to_cp(best_value).abs() >= variety.max_score
            || best_value + variety.strength * PAWN_VALUE / 100 < 0
            || self.pos.game_ply() / 2 >= variety.max_moves
        {
            return 0;
        }

        let nodes = self.nodes();
        let min = nodes / 2;
        let max = nodes * 2;
        let roll = self.w.rng.next_u64() % (max - min + 1) + min;
        (roll % (variety.strength as u64 + 1)) as Value
    }
}

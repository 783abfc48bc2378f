//! Iterative deepening: one root search per depth inside an aspiration
//! window, multi-PV lines, and the main worker's time decisions.

use strix_core::{Evaluator, Move, Position, Tablebase};
use tracing::{debug, trace};

use crate::config::SearchOptions;
use crate::search::report::{InfoFull, Score, ScoreBound, SearchListener};
use crate::search::root;
use crate::search::skill::Skill;
use crate::search::tt::TranspositionTable;
use crate::search::value::{
    Depth, MAX_PLY, VALUE_INFINITE, VALUE_MATE, VALUE_MATE_IN_MAX_PLY, VALUE_MATED_IN_MAX_PLY, VALUE_TB, VALUE_ZERO,
    Value, is_loss,
};
use crate::search::worker::{NodeType, Searcher, SharedCounters, Worker};

/// Evaluator ramp for dynamic weighting: off up to depth 8, full from 18.
fn strength_ramp(depth: Depth) -> f32 {
    ((depth - 8) as f32 / 10.0).clamp(0.0, 1.0)
}

impl<P, E, T> Searcher<'_, P, E, T>
where
    P: Position,
    E: Evaluator<P>,
    T: Tablebase<P>,
{
    /// Deepen until stopped, the depth limit is reached or the clock says so.
    /// Helpers run the same loop without reporting or timing.
    pub(crate) fn iterative_deepening(&mut self) {
        let ctx = self.ctx;
        let control = ctx.control;
        let limits = ctx.limits;
        let options = ctx.options;
        let us = self.pos.side_to_move();

        let mut last_best_pv = vec![Move::NONE];
        let mut last_best_score = -VALUE_INFINITE;
        let mut last_best_move_depth: Depth = 0;

        let mut best_value = -VALUE_INFINITE;
        let mut time_reduction = 1.0_f64;
        let mut tot_best_move_changes = 0.0_f64;
        let mut iter_idx = 0_usize;
        let mut search_again_counter = 0;
        let mut fail_info_last_ms: i64 = -100_000;

        self.w.stack.reset();
        self.w.pv.clear_ply(0);

        if let Some(main) = self.main.as_mut() {
            let seed = if main.state.best_previous_score == VALUE_INFINITE {
                VALUE_ZERO
            } else {
                main.state.best_previous_score
            };
            main.state.iter_value = [seed; 4];
        }

        let mut skill = Skill::new(options.skill_level, options.limit_strength.then_some(options.elo));
        let mut multi_pv = options.multi_pv.max(1);
        // Weakened play picks among several lines
        if skill.enabled() {
            multi_pv = multi_pv.max(4);
        }
        multi_pv = multi_pv.min(self.w.root_moves.len());

        self.w.hist.reset_low_ply();

        loop {
            self.w.root_depth += 1;
            let root_depth = self.w.root_depth;
            if root_depth >= MAX_PLY || control.is_stopped() {
                break;
            }
            if self.is_main() && limits.depth.is_some_and(|d| root_depth > d) {
                break;
            }

            self.strength = strength_ramp(root_depth);

            if self.is_main() {
                tot_best_move_changes /= 2.0;
            }

            // Ties in the sort below keep last iteration's order
            for rm in &mut self.w.root_moves {
                rm.previous_score = rm.score;
            }

            let mut pv_first = 0;
            self.w.pv_last = 0;

            if !control.increase_depth() {
                search_again_counter += 1;
            }

            self.w.pv_idx = 0;
            while self.w.pv_idx < multi_pv {
                let pv_idx = self.w.pv_idx;

                // Lines never cross a tablebase rank group
                if pv_idx == self.w.pv_last {
                    pv_first = self.w.pv_last;
                    self.w.pv_last += 1;
                    while self.w.pv_last < self.w.root_moves.len()
                        && self.w.root_moves[self.w.pv_last].tb_rank == self.w.root_moves[pv_first].tb_rank
                    {
                        self.w.pv_last += 1;
                    }
                }

                self.w.sel_depth = 0;

                let rm = &self.w.root_moves[pv_idx];
                let avg = rm.average_score;
                let mut delta = 5 + (self.w.id % 8) as Value + (rm.mean_squared_score.abs() / 9000) as Value;
                let mut alpha = (avg - delta).max(-VALUE_INFINITE);
                let mut beta = (avg + delta).min(VALUE_INFINITE);

                let optimism = 137 * avg / (avg.abs() + 91);
                self.w.optimism[us.index()] = optimism;
                self.w.optimism[(!us).index()] = -optimism;

                let mut failed_high_cnt = 0;
                loop {
                    let adjusted_depth = (root_depth - failed_high_cnt - 3 * (search_again_counter + 1) / 4).max(1);
                    self.w.root_delta = beta - alpha;
                    best_value = self.search(0, alpha, beta, adjusted_depth, false, NodeType::Root);

                    let pv_last = self.w.pv_last;
                    root::sort(&mut self.w.root_moves[pv_idx..pv_last]);

                    if control.is_stopped() {
                        break;
                    }

                    // Throttled bound reports while the window keeps failing
                    let now = self.main.as_ref().map(|m| m.tm.elapsed());
                    if let Some(now) = now {
                        let failing = best_value <= alpha || best_value >= beta;
                        let due = now - fail_info_last_ms >= options.fail_info_rate_ms as i64;
                        let warmed_up =
                            now >= options.fail_info_first_ms as i64 || self.nodes() >= options.fail_info_min_nodes;
                        if options.fail_info_enabled && multi_pv == 1 && failing && due && warmed_up {
                            self.report(root_depth);
                            fail_info_last_ms = now;
                        }
                    }

                    if best_value <= alpha {
                        beta = alpha;
                        alpha = (best_value - delta).max(-VALUE_INFINITE);
                        failed_high_cnt = 0;
                        if let Some(main) = self.main.as_mut() {
                            main.stop_on_ponderhit = false;
                        }
                    } else if best_value >= beta {
                        alpha = (beta - delta).max(alpha);
                        beta = (best_value + delta).min(VALUE_INFINITE);
                        failed_high_cnt += 1;
                    } else {
                        break;
                    }

                    trace!(worker = self.w.id, depth = root_depth, alpha, beta, "aspiration re-search");
                    delta += delta / 3;
                }

                root::sort(&mut self.w.root_moves[pv_first..=pv_idx]);

                if self.is_main()
                    && (control.is_stopped() || pv_idx + 1 == multi_pv || self.nodes() > 10_000_000)
                    && !(control.is_aborted() && is_loss(self.w.root_moves[0].uci_score))
                {
                    self.report(root_depth);
                }

                if control.is_stopped() {
                    break;
                }
                self.w.pv_idx += 1;
            }

            if !control.is_stopped() {
                self.w.completed_depth = root_depth;
            }

            // An aborted iteration that now sees a loss may just be incomplete
            let rm0 = &self.w.root_moves[0];
            if control.is_aborted()
                && rm0.score != -VALUE_INFINITE
                && is_loss(rm0.score)
                && !last_best_pv[0].is_none()
            {
                root::move_to_front(&mut self.w.root_moves, last_best_pv[0]);
                let rm0 = &mut self.w.root_moves[0];
                rm0.pv = last_best_pv.clone();
                rm0.score = last_best_score;
                rm0.uci_score = last_best_score;
            } else if rm0.mv() != last_best_pv[0] {
                last_best_pv = rm0.pv.clone();
                last_best_score = rm0.score;
                last_best_move_depth = root_depth;
            }

            if !self.is_main() {
                continue;
            }

            if let Some(mate) = limits.mate {
                let rm0 = &self.w.root_moves[0];
                let plies = 2 * mate as Value;
                let found = rm0.score == rm0.uci_score
                    && ((rm0.score >= VALUE_MATE_IN_MAX_PLY && VALUE_MATE - rm0.score <= plies)
                        || (rm0.score != -VALUE_INFINITE
                            && rm0.score <= VALUE_MATED_IN_MAX_PLY
                            && VALUE_MATE + rm0.score <= plies));
                if found {
                    control.stop();
                }
            }

            if skill.enabled() && skill.time_to_pick(root_depth) {
                skill.pick_best(&self.w.root_moves, multi_pv, &mut self.w.rng);
            }

            tot_best_move_changes += ctx.counters.take_best_move_changes() as f64;

            let nodes = self.nodes();
            let completed_depth = self.w.completed_depth;
            let Some(main) = self.main.as_mut() else {
                continue;
            };

            if limits.use_time_management() && !control.is_stopped() && !main.stop_on_ponderhit {
                let rm0 = &self.w.root_moves[0];
                let nodes_effort = rm0.effort * 100_000 / nodes.max(1);

                let falling_eval = ((11.325
                    + 2.115 * (main.state.best_previous_average_score - best_value) as f64
                    + 0.987 * (main.state.iter_value[iter_idx] - best_value) as f64)
                    / 100.0)
                    .clamp(0.5688, 1.5698);

                // Less time when the best move has been stable for a while
                let k = 0.5189;
                let center = last_best_move_depth as f64 + 11.57;
                time_reduction = 0.723 + 0.79 / (1.104 + (-k * (completed_depth as f64 - center)).exp());
                let reduction = (1.455 + main.state.previous_time_reduction) / (2.2375 * time_reduction);
                let instability = 1.04 + 1.8956 * tot_best_move_changes / ctx.threads as f64;

                let mut total_time = main.tm.optimum() as f64 * falling_eval * reduction * instability;
                if self.w.root_moves.len() == 1 {
                    total_time = total_time.min(502.0);
                }

                let elapsed = main.tm.elapsed() as f64;
                let pondering = control.is_pondering();

                if completed_depth >= 10 && nodes_effort >= 92_425 && elapsed > total_time * 0.666 && !pondering {
                    control.stop();
                }

                if elapsed > total_time.min(main.tm.maximum() as f64) {
                    // Keep pondering; stop right after a ponderhit
                    if pondering {
                        main.stop_on_ponderhit = true;
                    } else {
                        control.stop();
                    }
                } else {
                    control.set_increase_depth(pondering || elapsed <= total_time * 0.503);
                }
            }

            main.state.iter_value[iter_idx] = best_value;
            iter_idx = (iter_idx + 1) & 3;

            debug!(
                depth = root_depth,
                score = best_value,
                nodes,
                best = %self.w.root_moves[0].mv(),
                "iteration complete"
            );
        }

        let Some(main) = self.main.as_mut() else {
            return;
        };
        main.state.previous_time_reduction = time_reduction;

        if skill.enabled() {
            let pick = if skill.best.is_none() {
                skill.pick_best(&self.w.root_moves, multi_pv, &mut self.w.rng)
            } else {
                skill.best
            };
            if let Some(i) = self.w.root_moves.iter().position(|rm| rm.mv() == pick) {
                self.w.root_moves.swap(0, i);
            }
        }
    }

    fn report(&mut self, depth: Depth) {
        let ctx = self.ctx;
        let Some(main) = self.main.as_mut() else {
            return;
        };
        let elapsed = main.tm.elapsed();
        report_pv(&mut *main.listener, self.w, ctx.counters, ctx.tt, ctx.options, elapsed, depth);
    }
}

/// Send one [`InfoFull`] per multi-PV line of `worker`.
///
/// Lines not yet searched at this depth are reported with last iteration's
/// score and depth.
pub(crate) fn report_pv(
    listener: &mut dyn SearchListener,
    worker: &Worker,
    counters: &SharedCounters,
    tt: &TranspositionTable,
    options: &SearchOptions,
    elapsed_ms: i64,
    depth: Depth,
) {
    let root_moves = &worker.root_moves;
    let multi_pv = options.multi_pv.max(1).min(root_moves.len());
    let nodes = counters.nodes_searched();
    let tb_hits = counters.tb_hits() + if worker.tb.root_in_tb { root_moves.len() as u64 } else { 0 };
    let time_ms = elapsed_ms.max(1) as u64;
    let hashfull = tt.hashfull(0);

    for (i, rm) in root_moves.iter().enumerate().take(multi_pv) {
        let updated = rm.score != -VALUE_INFINITE;
        if depth == 1 && !updated && i > 0 {
            continue;
        }

        let line_depth = if updated { depth } else { (depth - 1).max(1) };
        let mut v = if updated { rm.uci_score } else { rm.previous_score };
        if v == -VALUE_INFINITE {
            v = VALUE_ZERO;
        }

        let tb = worker.tb.root_in_tb && v.abs() <= VALUE_TB;
        if tb {
            v = rm.tb_score;
        }

        let exact = i != worker.pv_idx || tb || !updated;
        let bound = if exact {
            None
        } else if rm.score_lowerbound {
            Some(ScoreBound::Lower)
        } else if rm.score_upperbound {
            Some(ScoreBound::Upper)
        } else {
            None
        };

        listener.on_update_full(&InfoFull {
            depth: line_depth,
            sel_depth: rm.sel_depth,
            multipv: i + 1,
            score: Score::from_value(v),
            bound,
            time_ms,
            nodes,
            nps: nodes * 1000 / time_ms,
            tb_hits,
            pv: rm.pv.clone(),
            hashfull,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::root::RootMove;
    use strix_core::Square;

    #[derive(Default)]
    struct Collect(Vec<InfoFull>);

    impl SearchListener for Collect {
        fn on_update_full(&mut self, info: &InfoFull) {
            self.0.push(info.clone());
        }
    }

    fn worker_with(scores: &[(Value, Value)]) -> Worker {
        let mut w = Worker::new(0);
        w.root_moves = scores
            .iter()
            .enumerate()
            .map(|(i, &(score, previous))| {
                let mut rm = RootMove::new(Move::new(Square::from_index(i as u8).unwrap(), Square::H8));
                rm.score = score;
                rm.uci_score = score;
                rm.previous_score = previous;
                rm
            })
            .collect();
        w
    }

    #[test]
    fn ramp_is_clamped() {
        assert_eq!(strength_ramp(1), 0.0);
        assert_eq!(strength_ramp(8), 0.0);
        assert!((strength_ramp(13) - 0.5).abs() < 1e-6);
        assert_eq!(strength_ramp(30), 1.0);
    }

    #[test]
    fn unsearched_lines_use_previous_iteration() {
        let w = worker_with(&[(120, 100), (-VALUE_INFINITE, 40)]);
        let counters = SharedCounters::new(1);
        let tt = TranspositionTable::new(1);
        let options = SearchOptions {
            multi_pv: 2,
            ..SearchOptions::default()
        };
        let mut out = Collect::default();
        report_pv(&mut out, &w, &counters, &tt, &options, 0, 5);

        assert_eq!(out.0.len(), 2);
        assert_eq!(out.0[0].depth, 5);
        assert_eq!(out.0[0].multipv, 1);
        assert_eq!(out.0[1].depth, 4);
        assert_eq!(out.0[1].score, Score::from_value(40));
        assert_eq!(out.0[1].bound, None);
        assert_eq!(out.0[0].time_ms, 1);
    }

    #[test]
    fn first_depth_skips_unsearched_lines() {
        let w = worker_with(&[(30, -VALUE_INFINITE), (-VALUE_INFINITE, -VALUE_INFINITE)]);
        let counters = SharedCounters::new(1);
        let tt = TranspositionTable::new(1);
        let options = SearchOptions {
            multi_pv: 3,
            ..SearchOptions::default()
        };
        let mut out = Collect::default();
        report_pv(&mut out, &w, &counters, &tt, &options, 10, 1);
        assert_eq!(out.0.len(), 1);
    }

    #[test]
    fn bound_flag_on_current_line() {
        let mut w = worker_with(&[(50, 0)]);
        w.root_moves[0].score_lowerbound = true;
        let counters = SharedCounters::new(1);
        let tt = TranspositionTable::new(1);
        let mut out = Collect::default();
        report_pv(&mut out, &w, &counters, &tt, &SearchOptions::default(), 10, 3);
        assert_eq!(out.0[0].bound, Some(ScoreBound::Lower));
    }
}

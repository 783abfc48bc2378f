//! Lazy SMP thread pool: owns the shared transposition table and the
//! per-thread workers, runs one search across all of them and picks the
//! answer.

use std::collections::HashMap;
use std::fmt;
use std::thread;
use std::time::Duration;

use strix_core::{Evaluator, Move, Position, Tablebase};
use tracing::{debug, info, warn};

use crate::config::SearchOptions;
use crate::search::SearchResult;
use crate::search::control::SearchControl;
use crate::search::driver::report_pv;
use crate::search::limits::SearchLimits;
use crate::search::report::{InfoShort, Score, SearchListener};
use crate::search::root::RootMove;
use crate::search::skill::Skill;
use crate::search::tablebase;
use crate::search::tt::TranspositionTable;
use crate::search::value::{VALUE_DRAW, VALUE_INFINITE, VALUE_MATE, is_loss, is_win};
use crate::search::worker::{MainState, MainThread, Searcher, SharedContext, SharedCounters, Variety, Worker};
use crate::time::TimeManager;

/// Stack size of every search thread; the recursion goes up to the ply cap.
const SEARCH_STACK_SIZE: usize = 32 * 1024 * 1024;

/// Lazy SMP thread pool. Workers persist between searches so their
/// histories keep learning over a game.
pub struct ThreadPool {
    tt: TranspositionTable,
    hash_mb: usize,
    workers: Vec<Worker>,
    main_state: MainState,
}

impl ThreadPool {
    /// Create a single-threaded pool with a `hash_mb` MB transposition table.
    pub fn new(hash_mb: usize) -> Self {
        Self {
            tt: TranspositionTable::new(hash_mb),
            hash_mb,
            workers: vec![Worker::new(0)],
            main_state: MainState::default(),
        }
    }

    pub fn threads(&self) -> usize {
        self.workers.len()
    }

    /// Recreate the workers. Learned histories are lost.
    pub fn set_threads(&mut self, n: usize) {
        let n = n.max(1);
        self.workers = (0..n).map(Worker::new).collect();
        info!(threads = n, "search threads set");
    }

    /// Resize the transposition table, dropping its contents.
    pub fn resize_tt(&mut self, mb: usize) {
        self.tt.resize(mb, self.workers.len());
        self.hash_mb = mb;
        info!(hash_mb = mb, "transposition table resized");
    }

    /// Forget everything, as before a new game.
    pub fn clear(&mut self) {
        for w in &mut self.workers {
            w.clear();
        }
        self.tt.clear(self.workers.len());
        self.main_state = MainState::default();
        debug!("search state cleared");
    }

    /// TT occupancy of the current generation, in per mille.
    pub fn hashfull(&self) -> u32 {
        self.tt.hashfull(0)
    }

    pub fn tt(&self) -> &TranspositionTable {
        &self.tt
    }

    /// Search `pos` on every thread until a limit is hit or `control` is
    /// stopped.
    ///
    /// Blocks until done. The listener receives progress from the main
    /// worker and exactly one `on_bestmove` call before this returns. In
    /// ponder or infinite mode the search waits for a stop (or ponderhit)
    /// before answering. A stop already raised on `control` is honoured: the
    /// search answers at once with its first root move.
    #[allow(clippy::too_many_arguments)]
    pub fn search<P, E, T>(
        &mut self,
        pos: &P,
        limits: &SearchLimits,
        options: &SearchOptions,
        eval: &E,
        tb: &T,
        control: &SearchControl,
        listener: &mut dyn SearchListener,
    ) -> SearchResult
    where
        P: Position,
        E: Evaluator<P>,
        T: Tablebase<P>,
    {
        control.start(limits.ponder);
        if options.threads.max(1) != self.workers.len() {
            self.set_threads(options.threads);
        }
        if options.hash_mb != self.hash_mb {
            self.resize_tt(options.hash_mb);
        }

        let mut root_pos = pos.clone();
        let us = root_pos.side_to_move();

        let mut root_moves: Vec<RootMove> = root_pos
            .legal_moves()
            .iter()
            .copied()
            .filter(|mv| limits.search_moves.is_empty() || limits.search_moves.contains(mv))
            .map(RootMove::new)
            .collect();

        let tb_config = tablebase::rank_root_moves(options, tb, &mut root_pos, &mut root_moves);
        self.tt.new_search();
        let tm = TimeManager::init(
            limits,
            us,
            root_pos.game_ply(),
            options,
            &mut self.main_state.original_time_adjust,
        );

        info!(
            threads = self.workers.len(),
            root_moves = root_moves.len(),
            optimum_ms = tm.optimum(),
            maximum_ms = tm.maximum(),
            "search started"
        );

        if root_moves.is_empty() {
            let score = if root_pos.in_check() { -VALUE_MATE } else { VALUE_DRAW };
            listener.on_update_no_moves(&InfoShort {
                depth: 0,
                score: Score::from_value(score),
            });
            wait_for_release(control, limits);
            listener.on_bestmove(None, None);
            return SearchResult {
                best_move: None,
                ponder_move: None,
                pv: Vec::new(),
                score,
                nodes: 0,
                depth: 0,
            };
        }

        let counters = SharedCounters::new(self.workers.len());
        for w in &mut self.workers {
            w.prepare(root_moves.clone(), tb_config);
        }

        let ctx = SharedContext {
            tt: &self.tt,
            counters: &counters,
            control,
            eval,
            tb,
            limits,
            options,
            variety: Variety {
                strength: options.variety,
                max_score: options.variety_max_score,
                max_moves: options.variety_max_moves,
            },
            threads: self.workers.len(),
        };

        thread::scope(|s| {
            let mut workers = self.workers.iter_mut();
            let Some(main_worker) = workers.next() else {
                return;
            };

            let main = MainThread {
                tm,
                calls_cnt: 0,
                stop_on_ponderhit: false,
                state: &mut self.main_state,
                listener: &mut *listener,
            };
            let main_pos = root_pos.clone();
            let ctx = &ctx;
            let spawned = thread::Builder::new()
                .name("strix-main".into())
                .stack_size(SEARCH_STACK_SIZE)
                .spawn_scoped(s, move || {
                    Searcher::new(main_worker, main_pos, ctx, Some(main)).iterative_deepening();
                    // Never answer before the caller releases a ponder or infinite search
                    wait_for_release(control, limits);
                    control.stop();
                });
            if let Err(err) = spawned {
                warn!(%err, "failed to spawn main search thread");
                control.stop();
            }

            for w in workers {
                let id = w.id;
                let helper_pos = root_pos.clone();
                let spawned = thread::Builder::new()
                    .name(format!("strix-helper-{id}"))
                    .stack_size(SEARCH_STACK_SIZE)
                    .spawn_scoped(s, move || {
                        Searcher::new(w, helper_pos, ctx, None).iterative_deepening();
                    });
                if let Err(err) = spawned {
                    warn!(%err, id, "failed to spawn search helper");
                }
            }
        });

        let skill = Skill::new(options.skill_level, options.limit_strength.then_some(options.elo));
        let best = if options.multi_pv == 1
            && limits.depth.is_none()
            && limits.mate.is_none()
            && !skill.enabled()
            && !self.workers[0].root_moves[0].mv().is_none()
        {
            best_worker(&self.workers)
        } else {
            0
        };
        debug!(
            worker = best,
            depth = self.workers[best].completed_depth,
            score = self.workers[best].root_moves[0].score,
            "best thread selected"
        );

        let chosen = &self.workers[best];
        // A search stopped before its first iteration has no score to carry over
        if chosen.completed_depth > 0 {
            self.main_state.best_previous_score = chosen.root_moves[0].score;
            self.main_state.best_previous_average_score = chosen.root_moves[0].average_score;
        }

        // The main worker already reported its own lines
        if best != 0 {
            let elapsed = limits.start.elapsed().as_millis() as i64;
            report_pv(listener, chosen, &counters, &self.tt, options, elapsed, chosen.completed_depth);
        }

        let tt = &self.tt;
        let chosen = &mut self.workers[best];
        let depth = chosen.completed_depth;
        let rm = &mut chosen.root_moves[0];
        let best_move = rm.mv();
        let ponder_move = rm
            .extract_ponder_from_tt(tt, &mut root_pos)
            .then(|| rm.pv[1]);

        listener.on_bestmove(Some(best_move), ponder_move);

        let nodes = counters.nodes_searched();
        info!(
            best = %best_move,
            worker = best,
            depth,
            score = rm.score,
            nodes,
            elapsed_ms = limits.start.elapsed().as_millis() as u64,
            "search finished"
        );

        SearchResult {
            best_move: Some(best_move),
            ponder_move,
            pv: rm.pv.clone(),
            score: rm.score,
            nodes,
            depth,
        }
    }
}

impl Default for ThreadPool {
    fn default() -> Self {
        Self::new(16)
    }
}

impl fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThreadPool")
            .field("threads", &self.workers.len())
            .field("hash_mb", &self.hash_mb)
            .field("hash_clusters", &self.tt.cluster_count())
            .finish()
    }
}

/// Block while the search must not answer yet: pondering, or an infinite
/// search the caller has not stopped.
fn wait_for_release(control: &SearchControl, limits: &SearchLimits) {
    while !control.is_stopped() && (control.is_pondering() || limits.infinite) {
        thread::sleep(Duration::from_millis(1));
    }
}

/// Pick the worker whose answer to trust: votes weighted by score and depth,
/// shortest proven win, longest-resisting proven loss.
fn best_worker(workers: &[Worker]) -> usize {
    // Helpers that never ran have no completed depth and no vote
    let candidates: Vec<usize> = (0..workers.len())
        .filter(|&i| i == 0 || workers[i].completed_depth > 0)
        .collect();

    let score = |i: usize| workers[i].root_moves[0].score;
    let min_score = candidates.iter().map(|&i| score(i)).min().unwrap_or(0);
    let voting_value =
        |i: usize| (score(i) - min_score + 14) as i64 * workers[i].completed_depth as i64;

    let mut votes: HashMap<Move, i64> = HashMap::new();
    for &i in &candidates {
        *votes.entry(workers[i].root_moves[0].mv()).or_default() += voting_value(i);
    }

    let mut best = 0;
    for &i in &candidates {
        let best_score = score(best);
        let new_score = score(i);
        let best_pv = &workers[best].root_moves[0].pv;
        let new_pv = &workers[i].root_moves[0].pv;
        let best_vote = votes.get(&best_pv[0]).copied().unwrap_or(0);
        let new_vote = votes.get(&new_pv[0]).copied().unwrap_or(0);

        let best_in_loss = best_score != -VALUE_INFINITE && is_loss(best_score);
        let new_in_loss = new_score != -VALUE_INFINITE && is_loss(new_score);

        // Truncated PVs never win on voting value
        let better_voting_value = voting_value(i) * (new_pv.len() > 2) as i64
            > voting_value(best) * (best_pv.len() > 2) as i64;

        if is_win(best_score) {
            if new_score > best_score {
                best = i;
            }
        } else if best_in_loss {
            if new_in_loss && new_score < best_score {
                best = i;
            }
        } else if is_win(new_score)
            || new_in_loss
            || (!is_loss(new_score)
                && (new_vote > best_vote || (new_vote == best_vote && better_voting_value)))
        {
            best = i;
        }
    }
    best
}

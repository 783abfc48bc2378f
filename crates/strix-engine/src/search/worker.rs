//! Per-thread search state and the shared context every worker reads.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use strix_core::{Color, EvalHints, Evaluator, MAX_MOVES, Move, Position, Prng, Tablebase, mix64};

use crate::config::SearchOptions;
use crate::search::control::SearchControl;
use crate::search::history::{ContKey, CorrKey, Histories};
use crate::search::limits::SearchLimits;
use crate::search::report::SearchListener;
use crate::search::root::RootMove;
use crate::search::stack::{PvTable, SearchStack};
use crate::search::tablebase::TbConfig;
use crate::search::tt::TranspositionTable;
use crate::search::value::{
    Depth, VALUE_INFINITE, VALUE_TB_LOSS_IN_MAX_PLY, VALUE_TB_WIN_IN_MAX_PLY, Value,
};
use crate::time::TimeManager;

/// Counters one worker publishes to the others.
#[derive(Debug, Default)]
pub(crate) struct WorkerCounters {
    pub(crate) nodes: AtomicU64,
    pub(crate) tb_hits: AtomicU64,
    pub(crate) best_move_changes: AtomicU64,
}

/// Per-worker counters for one search, indexed by worker id.
#[derive(Debug)]
pub(crate) struct SharedCounters {
    pub(crate) workers: Vec<WorkerCounters>,
}

impl SharedCounters {
    pub(crate) fn new(threads: usize) -> Self {
        Self {
            workers: (0..threads).map(|_| WorkerCounters::default()).collect(),
        }
    }

    pub(crate) fn nodes_searched(&self) -> u64 {
        self.workers.iter().map(|c| c.nodes.load(Ordering::Relaxed)).sum()
    }

    pub(crate) fn tb_hits(&self) -> u64 {
        self.workers.iter().map(|c| c.tb_hits.load(Ordering::Relaxed)).sum()
    }

    /// Sum the best-move changes of every worker and reset them.
    pub(crate) fn take_best_move_changes(&self) -> u64 {
        self.workers
            .iter()
            .map(|c| c.best_move_changes.swap(0, Ordering::Relaxed))
            .sum()
    }
}

/// Randomisation of near-balanced quiescence values, read once per search.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Variety {
    pub(crate) strength: i32,
    pub(crate) max_score: i32,
    pub(crate) max_moves: u32,
}

/// Everything the workers of one search share. Only the TT and the counters
/// are written concurrently, both through atomics.
pub(crate) struct SharedContext<'a, E, T> {
    pub(crate) tt: &'a TranspositionTable,
    pub(crate) counters: &'a SharedCounters,
    pub(crate) control: &'a SearchControl,
    pub(crate) eval: &'a E,
    pub(crate) tb: &'a T,
    pub(crate) limits: &'a SearchLimits,
    pub(crate) options: &'a SearchOptions,
    pub(crate) variety: Variety,
    pub(crate) threads: usize,
}

/// State the main worker carries from one search to the next.
#[derive(Debug, Clone)]
pub(crate) struct MainState {
    pub(crate) best_previous_score: Value,
    pub(crate) best_previous_average_score: Value,
    pub(crate) previous_time_reduction: f64,
    pub(crate) original_time_adjust: f64,
    pub(crate) iter_value: [Value; 4],
}

impl Default for MainState {
    fn default() -> Self {
        Self {
            best_previous_score: VALUE_INFINITE,
            best_previous_average_score: VALUE_INFINITE,
            previous_time_reduction: 1.0,
            original_time_adjust: -1.0,
            iter_value: [0; 4],
        }
    }
}

/// The main worker's extra duties: clock checks and reporting.
pub(crate) struct MainThread<'a> {
    pub(crate) tm: TimeManager,
    pub(crate) calls_cnt: i32,
    pub(crate) stop_on_ponderhit: bool,
    pub(crate) state: &'a mut MainState,
    pub(crate) listener: &'a mut dyn SearchListener,
}

/// One search thread's private state. Lives in the pool between searches so
/// that the history tables keep learning across moves of a game.
pub(crate) struct Worker {
    pub(crate) id: usize,
    pub(crate) hist: Histories,
    pub(crate) stack: SearchStack,
    pub(crate) pv: PvTable,
    pub(crate) root_moves: Vec<RootMove>,
    pub(crate) tb: TbConfig,
    pub(crate) rng: Prng,
    reductions: Vec<i32>,

    pub(crate) root_depth: Depth,
    pub(crate) completed_depth: Depth,
    pub(crate) sel_depth: i32,
    pub(crate) pv_idx: usize,
    pub(crate) pv_last: usize,
    pub(crate) root_delta: Value,
    pub(crate) nmp_min_ply: i32,
    pub(crate) optimism: [Value; Color::COUNT],
}

impl Worker {
    pub(crate) fn new(id: usize) -> Self {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_nanos() as u64);
        let reductions = (0..MAX_MOVES)
            .map(|i| if i == 0 { 0 } else { (2809.0 / 128.0 * (i as f64).ln()) as i32 })
            .collect();
        Self {
            id,
            hist: Histories::new(),
            stack: SearchStack::new(),
            pv: PvTable::new(),
            root_moves: Vec::new(),
            tb: TbConfig::default(),
            rng: Prng::new(mix64(seed ^ id as u64)),
            reductions,
            root_depth: 0,
            completed_depth: 0,
            sel_depth: 0,
            pv_idx: 0,
            pv_last: 0,
            root_delta: 1,
            nmp_min_ply: 0,
            optimism: [0; Color::COUNT],
        }
    }

    /// Forget everything learned, as before a new game.
    pub(crate) fn clear(&mut self) {
        self.hist.clear();
    }

    /// Reset the per-search state for a new root.
    pub(crate) fn prepare(&mut self, root_moves: Vec<RootMove>, tb: TbConfig) {
        self.root_moves = root_moves;
        self.tb = tb;
        self.root_depth = 0;
        self.completed_depth = 0;
        self.sel_depth = 0;
        self.pv_idx = 0;
        self.pv_last = 0;
        self.nmp_min_ply = 0;
    }

    /// Base late-move reduction in 1/1024 plies.
    #[inline]
    pub(crate) fn reduction(&self, improving: bool, depth: Depth, move_count: i32, delta: Value) -> i32 {
        let scale = self.reductions[depth as usize] * self.reductions[(move_count as usize).min(MAX_MOVES - 1)];
        scale - delta * 757 / self.root_delta + (!improving as i32) * scale * 218 / 512 + 1200
    }
}

/// Runtime tag for the three kinds of node the search distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NodeType {
    Root,
    Pv,
    NonPv,
}

impl NodeType {
    #[inline]
    pub(crate) fn is_pv(self) -> bool {
        self != NodeType::NonPv
    }
}

/// A worker bound to one search: its private state, its copy of the root
/// position and the shared context.
pub(crate) struct Searcher<'a, P, E, T> {
    pub(crate) w: &'a mut Worker,
    pub(crate) pos: P,
    pub(crate) ctx: &'a SharedContext<'a, E, T>,
    pub(crate) main: Option<MainThread<'a>>,
    /// Whether the evaluator may use position-dependent weighting at this node.
    pub(crate) dynamic_weights: bool,
    /// Dynamic-weighting ramp for the current iteration.
    pub(crate) strength: f32,
}

impl<'a, P, E, T> Searcher<'a, P, E, T>
where
    P: Position,
    E: Evaluator<P>,
    T: Tablebase<P>,
{
    pub(crate) fn new(w: &'a mut Worker, pos: P, ctx: &'a SharedContext<'a, E, T>, main: Option<MainThread<'a>>) -> Self {
        Self {
            w,
            pos,
            ctx,
            main,
            dynamic_weights: false,
            strength: 0.0,
        }
    }

    #[inline]
    pub(crate) fn is_main(&self) -> bool {
        self.main.is_some()
    }

    #[inline]
    pub(crate) fn counters(&self) -> &WorkerCounters {
        &self.ctx.counters.workers[self.w.id]
    }

    /// Nodes this worker has visited.
    #[inline]
    pub(crate) fn nodes(&self) -> u64 {
        self.counters().nodes.load(Ordering::Relaxed)
    }

    #[inline]
    pub(crate) fn stopped(&self) -> bool {
        self.ctx.control.is_stopped()
    }

    /// Static evaluation, kept clear of the tablebase and mate bands.
    pub(crate) fn evaluate(&self) -> Value {
        debug_assert!(!self.pos.in_check());
        let hints = EvalHints {
            optimism: self.w.optimism[self.pos.side_to_move().index()],
            dynamic_weights: self.dynamic_weights,
            strength: self.strength,
        };
        self.ctx
            .eval
            .evaluate(&self.pos, &hints)
            .clamp(VALUE_TB_LOSS_IN_MAX_PLY + 1, VALUE_TB_WIN_IN_MAX_PLY - 1)
    }

    /// Make `mv` at `ply` and record it in the frame.
    pub(crate) fn do_move(&mut self, ply: i32, mv: Move, gives_check: bool) {
        let capture = self.pos.capture_stage(mv);
        let piece = self.pos.moved_piece(mv);
        let in_check = self.w.stack[ply].in_check;
        self.pos.do_move(mv, gives_check);
        self.counters().nodes.fetch_add(1, Ordering::Relaxed);

        let frame = &mut self.w.stack[ply];
        frame.current_move = mv;
        frame.moved = Some(piece);
        frame.cont = ContKey::new(in_check, capture, piece, mv.dest());
        frame.corr = CorrKey::new(piece, mv.dest());
    }

    #[inline]
    pub(crate) fn undo_move(&mut self, mv: Move) {
        self.pos.undo_move(mv);
    }

    /// Main worker only: stop the search once the clock or the node budget
    /// runs out. Polled at every node, acts every few hundred calls.
    pub(crate) fn check_time(&mut self) {
        let completed_depth = self.w.completed_depth;
        let ctx = self.ctx;
        let Some(main) = self.main.as_mut() else {
            return;
        };
        main.calls_cnt -= 1;
        if main.calls_cnt > 0 {
            return;
        }

        let limits = ctx.limits;
        // Under a node limit, check at least every 0.1% of the budget.
        main.calls_cnt = limits.nodes.map_or(512, |n| 512.min((n / 1024) as i32));

        if ctx.control.is_pondering() {
            return;
        }

        let elapsed = main.tm.elapsed();
        let out_of_time = limits.use_time_management() && (elapsed > main.tm.maximum() || main.stop_on_ponderhit);
        let movetime_up = limits.movetime.is_some_and(|mt| elapsed >= mt.as_millis() as i64);
        let nodes_up = limits.nodes.is_some_and(|n| ctx.counters.nodes_searched() >= n);

        if completed_depth >= 1 && (out_of_time || movetime_up || nodes_up) {
            ctx.control.abort();
        }
    }

    /// Force a clock check at the next node.
    pub(crate) fn reset_calls(&mut self) {
        if let Some(main) = self.main.as_mut() {
            main.calls_cnt = 0;
        }
    }
}

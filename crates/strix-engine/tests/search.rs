//! Integration tests for the search over synthetic game graphs.
//!
//! Verifies correctness (mates, minimax choices, multi-PV lines) and
//! robustness (stop and ponder handling, node limits, helper threads).

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use strix_core::{
    Color, EdgeSpec, GameGraph, GraphBuilder, GraphEval, GraphPosition, GraphTablebase, Move, NoTablebase, NodeId,
    NodeSpec, Wdl,
};
use strix_engine::search::value::{VALUE_DRAW, VALUE_TB_WIN_IN_MAX_PLY, mate_in};
use strix_engine::{
    InfoFull, InfoShort, Score, SearchControl, SearchLimits, SearchListener, SearchOptions, SearchResult, ThreadPool,
};

/// Records everything the search reports.
#[derive(Default)]
struct Recorder {
    no_moves: Vec<InfoShort>,
    lines: Vec<InfoFull>,
    bestmoves: Vec<(Option<Move>, Option<Move>)>,
}

impl SearchListener for Recorder {
    fn on_update_no_moves(&mut self, info: &InfoShort) {
        self.no_moves.push(*info);
    }

    fn on_update_full(&mut self, info: &InfoFull) {
        self.lines.push(info.clone());
    }

    fn on_bestmove(&mut self, best: Option<Move>, ponder: Option<Move>) {
        self.bestmoves.push((best, ponder));
    }
}

/// Raises the stop flag as soon as the first PV line arrives.
struct StopOnFirstLine {
    stop: Arc<AtomicBool>,
    rec: Recorder,
}

impl SearchListener for StopOnFirstLine {
    fn on_update_full(&mut self, info: &InfoFull) {
        self.stop.store(true, Ordering::Relaxed);
        self.rec.on_update_full(info);
    }

    fn on_bestmove(&mut self, best: Option<Move>, ponder: Option<Move>) {
        self.rec.on_bestmove(best, ponder);
    }
}

/// A line of `len` quiet moves through nodes that all evaluate to `eval`.
/// Returns the first node.
fn plateau(b: &mut GraphBuilder, eval: i32, len: usize) -> NodeId {
    let head = b.node(eval);
    let mut prev = head;
    for _ in 1..len {
        let next = b.node(eval);
        b.edge(prev, next, EdgeSpec::quiet()).unwrap();
        prev = next;
    }
    head
}

/// Position at node 0 with White to move.
fn root(graph: GameGraph) -> GraphPosition {
    GraphPosition::new(Arc::new(graph), 0, Color::White).unwrap()
}

/// Random graph rooted at the first quiet node with a few moves.
fn random_root(seed: u64, nodes: usize, branching: usize) -> GraphPosition {
    let graph = GameGraph::random(seed, nodes, branching);
    let start = (0..graph.len())
        .find(|&id| graph.node(id).is_some_and(|n| !n.in_check && n.edges.len() >= 2))
        .expect("random graph has a branching node");
    GraphPosition::new(Arc::new(graph), start, Color::White).unwrap()
}

/// Root with a quiet move and a mating move.
fn mate_in_one() -> (GraphPosition, Move) {
    let mut b = GraphBuilder::new();
    let r = b.node(0);
    let quiet = plateau(&mut b, 30, 40);
    let mated = b.add(NodeSpec::new(0).checked());
    b.edge(r, quiet, EdgeSpec::quiet()).unwrap();
    let mate = b.edge(r, mated, EdgeSpec::quiet()).unwrap();
    (root(b.build()), mate)
}

/// Root where one move forces mate in two whatever the defender replies.
fn mate_in_two() -> (GraphPosition, Move) {
    let mut b = GraphBuilder::new();
    let r = b.node(0);
    let quiet = plateau(&mut b, 30, 40);
    let attack = b.node(0);
    b.edge(r, quiet, EdgeSpec::quiet()).unwrap();
    let first = b.edge(r, attack, EdgeSpec::quiet()).unwrap();
    for _ in 0..2 {
        let defence = b.node(0);
        let mated = b.add(NodeSpec::new(0).checked());
        let waiting = plateau(&mut b, 0, 40);
        b.edge(attack, defence, EdgeSpec::quiet()).unwrap();
        b.edge(defence, waiting, EdgeSpec::quiet()).unwrap();
        b.edge(defence, mated, EdgeSpec::quiet()).unwrap();
    }
    (root(b.build()), first)
}

/// Root where the statically attractive move loses material two plies later.
///
/// Returns the position and the moves (trap, safe, worst) in root order.
fn two_ply_tree() -> (GraphPosition, [Move; 3]) {
    let mut b = GraphBuilder::new();
    let r = b.node(0);
    let trap = b.node(150);
    let safe = b.node(-10);
    let worst = b.node(-50);

    let trap_good = plateau(&mut b, 60, 40);
    let trap_bad = plateau(&mut b, -400, 40);
    let safe_a = plateau(&mut b, -20, 40);
    let safe_b = plateau(&mut b, -30, 40);
    let worst_a = plateau(&mut b, -250, 40);

    let m_trap = b.edge(r, trap, EdgeSpec::quiet()).unwrap();
    let m_safe = b.edge(r, safe, EdgeSpec::quiet()).unwrap();
    let m_worst = b.edge(r, worst, EdgeSpec::quiet()).unwrap();
    b.edge(trap, trap_good, EdgeSpec::quiet()).unwrap();
    b.edge(trap, trap_bad, EdgeSpec::quiet()).unwrap();
    b.edge(safe, safe_a, EdgeSpec::quiet()).unwrap();
    b.edge(safe, safe_b, EdgeSpec::quiet()).unwrap();
    b.edge(worst, worst_a, EdgeSpec::quiet()).unwrap();

    (root(b.build()), [m_trap, m_safe, m_worst])
}

fn options(threads: usize) -> SearchOptions {
    SearchOptions {
        threads,
        ..SearchOptions::default()
    }
}

fn control() -> SearchControl {
    SearchControl::new(Arc::new(AtomicBool::new(false)))
}

fn run(pos: &GraphPosition, limits: &SearchLimits, options: &SearchOptions, rec: &mut Recorder) -> SearchResult {
    let mut pool = ThreadPool::new(16);
    pool.search(pos, limits, options, &GraphEval, &NoTablebase, &control(), rec)
}

// ── Basic correctness ─────────────────────────────────────────────────────────

#[test]
fn finds_mate_in_one() {
    let (pos, mate) = mate_in_one();
    let mut rec = Recorder::default();
    let result = run(&pos, &SearchLimits::depth(6), &options(1), &mut rec);

    assert_eq!(result.best_move, Some(mate));
    assert_eq!(result.score, mate_in(1));
    let last = rec.lines.last().expect("at least one PV report");
    assert_eq!(last.score, Score::Mate { moves: 1 });
}

#[test]
fn finds_mate_in_two() {
    let (pos, first) = mate_in_two();
    let mut rec = Recorder::default();
    let result = run(&pos, &SearchLimits::depth(8), &options(1), &mut rec);

    assert_eq!(result.best_move, Some(first));
    assert_eq!(result.score, mate_in(3));
    let last = rec.lines.last().expect("at least one PV report");
    assert_eq!(last.score, Score::Mate { moves: 2 });
}

#[test]
fn looks_past_the_static_bait() {
    let (pos, [_, safe, _]) = two_ply_tree();
    let mut rec = Recorder::default();
    let result = run(&pos, &SearchLimits::depth(6), &options(1), &mut rec);

    assert_eq!(result.best_move, Some(safe));
    assert!(
        (-80..=0).contains(&result.score),
        "score {} should be near the safe line's value",
        result.score
    );
}

#[test]
fn single_legal_move_is_played() {
    let mut b = GraphBuilder::new();
    let r = b.node(0);
    let next = plateau(&mut b, 10, 40);
    let only = b.edge(r, next, EdgeSpec::quiet()).unwrap();
    let pos = root(b.build());

    let mut rec = Recorder::default();
    let result = run(&pos, &SearchLimits::depth(4), &options(1), &mut rec);
    assert_eq!(result.best_move, Some(only));
    assert_eq!(rec.bestmoves, vec![(Some(only), result.ponder_move)]);
}

#[test]
fn single_legal_move_answers_fast_on_a_long_clock() {
    let mut b = GraphBuilder::new();
    let r = b.node(0);
    let next = plateau(&mut b, 10, 40);
    let only = b.edge(r, next, EdgeSpec::quiet()).unwrap();
    let pos = root(b.build());

    let limits = SearchLimits::clock(Color::White, Duration::from_secs(300), Duration::from_secs(5), None);
    let started = Instant::now();
    let mut rec = Recorder::default();
    let result = run(&pos, &limits, &options(1), &mut rec);

    assert_eq!(result.best_move, Some(only));
    assert!(started.elapsed() < Duration::from_secs(3), "took {:?}", started.elapsed());
    assert_eq!(rec.bestmoves.len(), 1);
}

#[test]
fn search_moves_restrict_the_root() {
    let (pos, [trap, _, worst]) = two_ply_tree();
    let limits = SearchLimits {
        search_moves: vec![trap, worst],
        ..SearchLimits::depth(5)
    };
    let mut rec = Recorder::default();
    let result = run(&pos, &limits, &options(1), &mut rec);
    // The bait loses more than the plain bad move
    assert_eq!(result.best_move, Some(worst));
}

// ── Roots without moves ───────────────────────────────────────────────────────

#[test]
fn checkmated_root_reports_no_moves() {
    let mut b = GraphBuilder::new();
    b.add(NodeSpec::new(0).checked());
    let pos = root(b.build());

    let mut rec = Recorder::default();
    let result = run(&pos, &SearchLimits::depth(3), &options(1), &mut rec);

    assert_eq!(result.best_move, None);
    assert_eq!(rec.no_moves.len(), 1);
    assert_eq!(rec.no_moves[0].score, Score::Mate { moves: 0 });
    assert_eq!(rec.bestmoves, vec![(None, None)]);
    assert!(rec.lines.is_empty());
}

#[test]
fn stalemated_root_is_a_draw() {
    let mut b = GraphBuilder::new();
    b.node(300);
    let pos = root(b.build());

    let mut rec = Recorder::default();
    let result = run(&pos, &SearchLimits::depth(3), &options(1), &mut rec);
    assert_eq!(result.score, VALUE_DRAW);
    assert_eq!(rec.no_moves[0].score, Score::Cp(0));
    assert_eq!(rec.bestmoves.len(), 1);
}

// ── Reporting ─────────────────────────────────────────────────────────────────

#[test]
fn multi_pv_reports_distinct_lines() {
    let (pos, moves) = two_ply_tree();
    let opts = SearchOptions {
        multi_pv: 3,
        ..options(1)
    };
    let mut rec = Recorder::default();
    run(&pos, &SearchLimits::depth(5), &opts, &mut rec);

    let final_depth = rec.lines.iter().map(|l| l.depth).max().unwrap_or(0);
    let mut firsts: Vec<Move> = rec
        .lines
        .iter()
        .filter(|l| l.depth == final_depth)
        .rev()
        .take(3)
        .map(|l| l.pv[0])
        .collect();
    firsts.sort_by_key(|m| m.source().index() * 64 + m.dest().index());
    firsts.dedup();
    assert_eq!(firsts.len(), 3);
    for mv in moves {
        assert!(firsts.contains(&mv));
    }
}

#[test]
fn reported_depths_never_decrease() {
    let pos = random_root(7, 400, 6);
    let mut rec = Recorder::default();
    run(&pos, &SearchLimits::depth(8), &options(1), &mut rec);

    let depths: Vec<i32> = rec.lines.iter().filter(|l| l.multipv == 1).map(|l| l.depth).collect();
    assert!(!depths.is_empty());
    assert!(depths.windows(2).all(|w| w[0] <= w[1]), "depths {depths:?}");
    assert!(rec.lines.iter().all(|l| !l.pv.is_empty() && l.time_ms >= 1));
}

// ── Limits and signals ────────────────────────────────────────────────────────

#[test]
fn node_limit_stops_the_search() {
    let pos = random_root(11, 2_000, 12);
    let mut rec = Recorder::default();
    let result = run(&pos, &SearchLimits::nodes(20_000), &options(1), &mut rec);

    assert!(result.best_move.is_some());
    assert!(result.nodes < 200_000, "searched {} nodes", result.nodes);
    assert_eq!(rec.bestmoves.len(), 1);
}

#[test]
fn stop_flag_ends_an_infinite_search() {
    let pos = random_root(3, 3_000, 10);
    let legal = strix_core::Position::legal_moves(&pos);
    let stopped = Arc::new(AtomicBool::new(false));
    let control = SearchControl::new(Arc::clone(&stopped));
    let mut pool = ThreadPool::new(16);
    let mut listener = StopOnFirstLine {
        stop: stopped,
        rec: Recorder::default(),
    };

    let result = pool.search(
        &pos,
        &SearchLimits::infinite(),
        &options(2),
        &GraphEval,
        &NoTablebase,
        &control,
        &mut listener,
    );

    let best = result.best_move.expect("root has legal moves");
    assert!(legal.contains(best));
    assert!(!listener.rec.lines.is_empty());
    assert_eq!(listener.rec.bestmoves.len(), 1);
}

#[test]
fn stop_raised_before_the_search_is_kept() {
    let pos = random_root(3, 3_000, 10);
    let legal = strix_core::Position::legal_moves(&pos);
    let control = SearchControl::new(Arc::new(AtomicBool::new(true)));
    let mut pool = ThreadPool::new(16);
    let mut rec = Recorder::default();

    // Infinite mode would never answer if the early stop were dropped
    let result = pool.search(&pos, &SearchLimits::infinite(), &options(2), &GraphEval, &NoTablebase, &control, &mut rec);

    let best = result.best_move.expect("root has legal moves");
    assert!(legal.contains(best));
    assert_eq!(result.depth, 0);
    assert_eq!(rec.bestmoves.len(), 1);
    assert!(control.is_stopped());

    control.reset();
    let result = pool.search(&pos, &SearchLimits::depth(3), &options(2), &GraphEval, &NoTablebase, &control, &mut rec);
    assert_eq!(result.depth, 3);
}

#[test]
fn ponder_search_waits_for_ponderhit() {
    let (pos, mate) = mate_in_one();
    let control = SearchControl::new(Arc::new(AtomicBool::new(false)));
    let limits = SearchLimits {
        ponder: true,
        ..SearchLimits::depth(4)
    };
    let mut pool = ThreadPool::new(16);
    let mut rec = Recorder::default();

    let result = thread::scope(|s| {
        s.spawn(|| {
            thread::sleep(Duration::from_millis(50));
            control.ponderhit();
        });
        pool.search(&pos, &limits, &options(1), &GraphEval, &NoTablebase, &control, &mut rec)
    });

    assert!(!control.is_pondering());
    assert_eq!(result.best_move, Some(mate));
    assert_eq!(rec.bestmoves.len(), 1);
}

// ── Endgame oracle ────────────────────────────────────────────────────────────

#[test]
fn oracle_win_inside_the_tree_beats_a_better_eval() {
    let mut b = GraphBuilder::new();
    let r = b.node(0);
    // Looks bad statically but the oracle knows it wins for White
    let won = b.add(NodeSpec::new(-200).with_pieces(5).with_wdl(Wdl::Win));
    let won_line = plateau(&mut b, -200, 40);
    b.edge(won, won_line, EdgeSpec::quiet()).unwrap();
    let calm = plateau(&mut b, 100, 40);
    let convert = b.edge(r, won, EdgeSpec::capture(strix_core::PieceKind::Knight)).unwrap();
    b.edge(r, calm, EdgeSpec::quiet()).unwrap();
    let pos = root(b.build());

    let mut pool = ThreadPool::new(16);
    let mut rec = Recorder::default();
    let tb = GraphTablebase { cardinality: 6 };
    let result = pool.search(&pos, &SearchLimits::depth(6), &options(1), &GraphEval, &tb, &control(), &mut rec);

    assert_eq!(result.best_move, Some(convert));
    assert!(result.score >= VALUE_TB_WIN_IN_MAX_PLY, "score {}", result.score);
    assert!(rec.lines.last().is_some_and(|l| l.tb_hits > 0));
}

#[test]
fn oracle_is_ignored_without_tablebases() {
    let mut b = GraphBuilder::new();
    let r = b.node(0);
    let won = b.add(NodeSpec::new(-200).with_pieces(5).with_wdl(Wdl::Win));
    let won_line = plateau(&mut b, -200, 40);
    b.edge(won, won_line, EdgeSpec::quiet()).unwrap();
    let calm = plateau(&mut b, 100, 40);
    b.edge(r, won, EdgeSpec::capture(strix_core::PieceKind::Knight)).unwrap();
    let quiet = b.edge(r, calm, EdgeSpec::quiet()).unwrap();
    let pos = root(b.build());

    let mut rec = Recorder::default();
    let result = run(&pos, &SearchLimits::depth(6), &options(1), &mut rec);
    assert_eq!(result.best_move, Some(quiet));
    assert!(rec.lines.iter().all(|l| l.tb_hits == 0));
}

// ── Helper threads ────────────────────────────────────────────────────────────

#[test]
fn helpers_agree_on_mate() {
    let (pos, mate) = mate_in_one();
    let mut rec = Recorder::default();
    let result = run(&pos, &SearchLimits::depth(8), &options(4), &mut rec);
    assert_eq!(result.best_move, Some(mate));
    assert_eq!(rec.bestmoves.len(), 1);
}

#[test]
fn helpers_share_the_node_count() {
    let pos = random_root(19, 1_500, 8);
    let mut pool = ThreadPool::new(16);
    let mut rec = Recorder::default();
    let result = pool.search(
        &pos,
        &SearchLimits::depth(6),
        &options(3),
        &GraphEval,
        &NoTablebase,
        &control(),
        &mut rec,
    );
    assert_eq!(pool.threads(), 3);
    assert!(result.best_move.is_some());
    assert!(result.nodes > 0);
}

#[test]
fn reused_pool_keeps_working_after_clear() {
    let (pos, mate) = mate_in_one();
    let mut pool = ThreadPool::new(16);
    for _ in 0..2 {
        let mut rec = Recorder::default();
        let result = pool.search(
            &pos,
            &SearchLimits::depth(5),
            &options(1),
            &GraphEval,
            &NoTablebase,
            &control(),
            &mut rec,
        );
        assert_eq!(result.best_move, Some(mate));
        pool.clear();
    }
    assert!(pool.hashfull() <= 1000);
}

#[test]
fn weakened_play_still_picks_a_root_move() {
    let (pos, moves) = two_ply_tree();
    let opts = SearchOptions {
        skill_level: 0,
        ..options(1)
    };
    let mut rec = Recorder::default();
    let result = run(&pos, &SearchLimits::depth(4), &opts, &mut rec);
    let best = result.best_move.expect("root has legal moves");
    assert!(moves.contains(&best));
}

// ── Termination ───────────────────────────────────────────────────────────────

#[test]
fn capture_cycle_terminates() {
    // Two positions that capture back and forth forever
    let mut b = GraphBuilder::new();
    let r = b.node(0);
    let a = b.node(120);
    let c = b.node(-80);
    let quiet = plateau(&mut b, 10, 40);
    b.edge(r, a, EdgeSpec::capture(strix_core::PieceKind::Pawn)).unwrap();
    b.edge(r, quiet, EdgeSpec::quiet()).unwrap();
    b.edge(a, c, EdgeSpec::capture(strix_core::PieceKind::Knight)).unwrap();
    b.edge(c, a, EdgeSpec::capture(strix_core::PieceKind::Knight)).unwrap();
    let pos = root(b.build());

    let mut rec = Recorder::default();
    let result = run(&pos, &SearchLimits::depth(7), &options(1), &mut rec);
    assert!(result.best_move.is_some());
    assert!(result.depth >= 1);
    assert_eq!(rec.bestmoves.len(), 1);
}

#[test]
fn deeper_searches_visit_more_nodes() {
    let pos = random_root(23, 2_000, 8);
    let shallow = run(&pos, &SearchLimits::depth(2), &options(1), &mut Recorder::default());
    let deep = run(&pos, &SearchLimits::depth(7), &options(1), &mut Recorder::default());
    assert!(deep.nodes > shallow.nodes, "{} <= {}", deep.nodes, shallow.nodes);
    assert_eq!(deep.depth, 7);
}

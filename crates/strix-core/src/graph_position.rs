//! [`Position`] implementation over a [`GameGraph`].

use std::fmt;
use std::sync::Arc;

use crate::chess_move::Move;
use crate::color::Color;
use crate::error::GraphError;
use crate::eval::{EvalHints, Evaluator};
use crate::graph::{Edge, GameGraph, Node, NodeId};
use crate::move_list::MoveList;
use crate::piece::Piece;
use crate::piece_kind::PieceKind;
use crate::position::{GenType, Position};
use crate::prng::mix64;
use crate::tablebase::{Tablebase, Wdl};

const SIDE_KEY: u64 = 0x9d39_247e_3377_6d41;
const PAWN_SALT: u64 = 0x2af7_3980_05aa_a5c7;
const MINOR_SALT: u64 = 0x44db_0150_2462_3547;
const NON_PAWN_SALT: [u64; 2] = [0x9c15_f73e_62a7_6ae2, 0x7583_4465_489c_0c89];

/// Irreversible per-ply state, pushed by every make and popped by every unmake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct State {
    node: NodeId,
    key: u64,
    rule50: u32,
    plies_from_null: u32,
    captured: Option<Piece>,
    /// Distance to the previous occurrence of this position, negated if that
    /// occurrence was itself a repetition. Zero when new.
    repetition: i32,
}

/// A walk through a [`GameGraph`] with full move history.
#[derive(Clone)]
pub struct GraphPosition {
    graph: Arc<GameGraph>,
    side: Color,
    start_ply: u32,
    states: Vec<State>,
}

fn node_key(node: NodeId, side: Color) -> u64 {
    let key = mix64(node as u64);
    match side {
        Color::White => key,
        Color::Black => key ^ SIDE_KEY,
    }
}

impl GraphPosition {
    /// Start at `root` with `side` to move.
    pub fn new(graph: Arc<GameGraph>, root: NodeId, side: Color) -> Result<GraphPosition, GraphError> {
        if graph.node(root).is_none() {
            return Err(GraphError::UnknownNode {
                id: root,
                len: graph.len(),
            });
        }
        Ok(GraphPosition {
            graph,
            side,
            start_ply: 0,
            states: vec![State {
                node: root,
                key: node_key(root, side),
                rule50: 0,
                plies_from_null: 0,
                captured: None,
                repetition: 0,
            }],
        })
    }

    /// Current node id.
    pub fn node_id(&self) -> NodeId {
        self.state().node
    }

    /// The graph this position walks.
    pub fn graph(&self) -> &Arc<GameGraph> {
        &self.graph
    }

    /// The edge `mv` would follow, if it is available here.
    pub fn edge(&self, mv: Move) -> Option<&Edge> {
        self.node().edges.iter().find(|e| e.mv == mv)
    }

    fn state(&self) -> &State {
        &self.states[self.states.len() - 1]
    }

    fn node(&self) -> &Node {
        // Node ids are validated on construction and edges only point at existing nodes.
        &self.graph.nodes[self.state().node]
    }

    fn find_repetition(&self, key: u64, end: u32) -> i32 {
        let last = self.states.len() - 1;
        let mut i = 2usize;
        while i <= end as usize && i <= last {
            let prev = &self.states[last - i];
            if prev.key == key {
                return if prev.repetition != 0 { -(i as i32) } else { i as i32 };
            }
            i += 2;
        }
        0
    }
}

impl Position for GraphPosition {
    fn key(&self) -> u64 {
        self.state().key
    }

    fn pawn_key(&self) -> u64 {
        mix64(self.state().node as u64 ^ PAWN_SALT)
    }

    fn minor_piece_key(&self) -> u64 {
        mix64(self.state().node as u64 ^ MINOR_SALT)
    }

    fn non_pawn_key(&self, color: Color) -> u64 {
        mix64(self.state().node as u64 ^ NON_PAWN_SALT[color.index()])
    }

    fn side_to_move(&self) -> Color {
        self.side
    }

    fn game_ply(&self) -> u32 {
        self.start_ply + (self.states.len() as u32 - 1)
    }

    fn rule50_count(&self) -> u32 {
        self.state().rule50
    }

    fn in_check(&self) -> bool {
        self.node().in_check
    }

    fn piece_count(&self) -> u32 {
        self.node().pieces
    }

    fn non_pawn_material(&self, color: Color) -> i32 {
        self.node().non_pawn[color.index()]
    }

    fn can_castle(&self) -> bool {
        false
    }

    fn generate(&self, gen_type: GenType, list: &mut MoveList) {
        for edge in &self.node().edges {
            let tactical = edge.captured.is_some() || edge.promotion;
            let wanted = match gen_type {
                GenType::Captures => tactical,
                GenType::Quiets => !tactical,
                GenType::Evasions | GenType::NonEvasions => true,
            };
            if wanted {
                list.push(edge.mv);
            }
        }
    }

    fn pseudo_legal(&self, mv: Move) -> bool {
        self.edge(mv).is_some()
    }

    fn legal(&self, mv: Move) -> bool {
        self.edge(mv).is_some()
    }

    fn capture(&self, mv: Move) -> bool {
        self.edge(mv).is_some_and(|e| e.captured.is_some())
    }

    fn capture_stage(&self, mv: Move) -> bool {
        self.edge(mv)
            .is_some_and(|e| e.captured.is_some() || e.promotion)
    }

    fn gives_check(&self, mv: Move) -> bool {
        self.edge(mv)
            .and_then(|e| self.graph.node(e.to))
            .is_some_and(|n| n.in_check)
    }

    fn see_ge(&self, mv: Move, threshold: i32) -> bool {
        self.edge(mv).is_some_and(|e| e.see >= threshold)
    }

    fn moved_piece(&self, mv: Move) -> Piece {
        let kind = self.edge(mv).map_or(PieceKind::Pawn, |e| e.piece);
        Piece::new(kind, self.side)
    }

    fn captured_by(&self, mv: Move) -> Option<Piece> {
        self.edge(mv)
            .and_then(|e| e.captured)
            .map(|k| Piece::new(k, !self.side))
    }

    fn captured_piece(&self) -> Option<Piece> {
        self.state().captured
    }

    fn is_draw(&self, ply: usize) -> bool {
        let st = self.state();
        if st.rule50 > 99 && (!self.in_check() || !self.node().edges.is_empty()) {
            return true;
        }
        st.repetition != 0 && st.repetition < ply as i32
    }

    fn upcoming_repetition(&self, ply: usize) -> bool {
        let st = self.state();
        let end = st.rule50.min(st.plies_from_null) as usize;
        if end == 0 {
            return false;
        }
        let last = self.states.len() - 1;
        for edge in &self.node().edges {
            if edge.is_zeroing() {
                continue;
            }
            let child = node_key(edge.to, !self.side);
            let mut i = 1usize;
            while i <= end && i <= last {
                let prev = &self.states[last - i];
                if prev.key == child && (ply > i || prev.repetition != 0) {
                    return true;
                }
                i += 2;
            }
        }
        false
    }

    fn do_move(&mut self, mv: Move, _gives_check: bool) {
        let Some(edge) = self.edge(mv).copied() else {
            panic!("move {mv} is not available in node {}", self.node_id());
        };
        let prev = *self.state();
        self.side = !self.side;
        let key = node_key(edge.to, self.side);
        let rule50 = if edge.is_zeroing() { 0 } else { prev.rule50 + 1 };
        let plies_from_null = prev.plies_from_null + 1;
        self.states.push(State {
            node: edge.to,
            key,
            rule50,
            plies_from_null,
            captured: edge.captured.map(|k| Piece::new(k, self.side)),
            repetition: 0,
        });
        let repetition = self.find_repetition(key, rule50.min(plies_from_null));
        let last = self.states.len() - 1;
        self.states[last].repetition = repetition;
    }

    fn undo_move(&mut self, mv: Move) {
        debug_assert!(self.states.len() > 1, "undo_move without a matching do_move");
        self.states.pop();
        self.side = !self.side;
        debug_assert!(self.edge(mv).is_some(), "undo_move({mv}) does not match the last move");
    }

    fn do_null_move(&mut self) {
        let prev = *self.state();
        self.side = !self.side;
        self.states.push(State {
            node: prev.node,
            key: prev.key ^ SIDE_KEY,
            rule50: prev.rule50 + 1,
            plies_from_null: 0,
            captured: None,
            repetition: 0,
        });
    }

    fn undo_null_move(&mut self) {
        debug_assert!(self.states.len() > 1, "undo_null_move without a matching do_null_move");
        self.states.pop();
        self.side = !self.side;
    }
}

impl PartialEq for GraphPosition {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.graph, &other.graph)
            && self.side == other.side
            && self.start_ply == other.start_ply
            && self.states == other.states
    }
}

impl fmt::Debug for GraphPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GraphPosition")
            .field("node", &self.node_id())
            .field("side", &self.side)
            .field("ply", &self.game_ply())
            .field("rule50", &self.rule50_count())
            .finish()
    }
}

/// Evaluator that reads the node's stored evaluation.
#[derive(Debug, Clone, Copy, Default)]
pub struct GraphEval;

impl Evaluator<GraphPosition> for GraphEval {
    fn evaluate(&self, pos: &GraphPosition, _hints: &EvalHints) -> i32 {
        pos.node().eval * pos.side_to_move().sign()
    }
}

/// Oracle that answers from the nodes' stored results for small piece counts.
#[derive(Debug, Clone, Copy)]
pub struct GraphTablebase {
    pub cardinality: u32,
}

impl Tablebase<GraphPosition> for GraphTablebase {
    fn max_cardinality(&self) -> u32 {
        self.cardinality
    }

    fn probe_wdl(&self, pos: &GraphPosition) -> Option<Wdl> {
        if pos.piece_count() > self.cardinality {
            return None;
        }
        let wdl = pos.node().wdl?;
        Some(match pos.side_to_move() {
            Color::White => wdl,
            Color::Black => wdl.negate(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{GraphEval, GraphPosition, GraphTablebase};
    use crate::chess_move::Move;
    use crate::color::Color;
    use crate::eval::{EvalHints, Evaluator};
    use crate::graph::{EdgeSpec, GameGraph, GraphBuilder, NodeSpec};
    use crate::move_list::MoveList;
    use crate::piece_kind::PieceKind;
    use crate::position::{GenType, Position};
    use crate::tablebase::{Tablebase, Wdl};

    /// root -(quiet)-> a -(quiet)-> root, plus root -(capture)-> b.
    fn cycle() -> (Arc<GameGraph>, [Move; 3]) {
        let mut b = GraphBuilder::new();
        let root = b.node(10);
        let a = b.add(NodeSpec::new(-20).checked());
        let c = b.node(300);
        let to_a = b.edge(root, a, EdgeSpec::quiet()).unwrap();
        let back = b.edge(a, root, EdgeSpec::quiet()).unwrap();
        let take = b.edge(root, c, EdgeSpec::capture(PieceKind::Queen)).unwrap();
        (Arc::new(b.build()), [to_a, back, take])
    }

    #[test]
    fn make_unmake_restores_state() {
        let (graph, [to_a, back, take]) = cycle();
        let mut pos = GraphPosition::new(graph, 0, Color::White).unwrap();
        let before = pos.clone();

        pos.do_move(to_a, true);
        assert_eq!(pos.side_to_move(), Color::Black);
        assert!(pos.in_check());
        pos.do_move(back, false);
        pos.do_null_move();
        pos.undo_null_move();
        pos.do_move(take, false);
        assert_eq!(pos.rule50_count(), 0);
        assert_eq!(pos.captured_piece().map(|p| p.kind()), Some(PieceKind::Queen));
        pos.undo_move(take);
        pos.undo_move(back);
        pos.undo_move(to_a);

        assert_eq!(pos, before);
        assert_eq!(pos.key(), before.key());
    }

    #[test]
    fn generation_splits_captures_and_quiets() {
        let (graph, [to_a, _, take]) = cycle();
        let pos = GraphPosition::new(graph, 0, Color::White).unwrap();
        let mut caps = MoveList::new();
        pos.generate(GenType::Captures, &mut caps);
        let mut quiets = MoveList::new();
        pos.generate(GenType::Quiets, &mut quiets);
        assert_eq!(caps.as_slice(), &[take]);
        assert_eq!(quiets.as_slice(), &[to_a]);
        assert_eq!(pos.legal_moves().len(), 2);
        assert!(pos.gives_check(to_a));
        assert!(!pos.gives_check(take));
        assert!(pos.capture_stage(take));
        assert!(pos.see_ge(take, 2538));
        assert!(!pos.see_ge(take, 2539));
    }

    #[test]
    fn repetition_is_detected() {
        let (graph, [to_a, back, _]) = cycle();
        let mut pos = GraphPosition::new(graph, 0, Color::White).unwrap();
        pos.do_move(to_a, true);
        assert!(!pos.is_draw(10));
        // Going back is a move to a position seen two plies earlier.
        assert!(pos.upcoming_repetition(10));
        pos.do_move(back, false);
        // Second occurrence of the root, two plies apart.
        assert!(pos.is_draw(10));
        assert!(!pos.is_draw(1));
    }

    #[test]
    fn null_move_flips_side_and_key() {
        let (graph, _) = cycle();
        let mut pos = GraphPosition::new(graph, 0, Color::White).unwrap();
        let key = pos.key();
        pos.do_null_move();
        assert_eq!(pos.side_to_move(), Color::Black);
        assert_ne!(pos.key(), key);
        pos.undo_null_move();
        assert_eq!(pos.key(), key);
    }

    #[test]
    fn eval_is_side_relative() {
        let (graph, [to_a, ..]) = cycle();
        let mut pos = GraphPosition::new(graph, 0, Color::White).unwrap();
        let hints = EvalHints::default();
        assert_eq!(GraphEval.evaluate(&pos, &hints), 10);
        pos.do_move(to_a, true);
        assert_eq!(GraphEval.evaluate(&pos, &hints), 20);
    }

    #[test]
    fn tablebase_respects_cardinality_and_side() {
        let mut b = GraphBuilder::new();
        let root = b.add(NodeSpec::new(0).with_pieces(5).with_wdl(Wdl::Win));
        let graph = Arc::new(b.build());
        let white = GraphPosition::new(Arc::clone(&graph), root, Color::White).unwrap();
        let black = GraphPosition::new(graph, root, Color::Black).unwrap();

        let tb = GraphTablebase { cardinality: 5 };
        assert_eq!(tb.probe_wdl(&white), Some(Wdl::Win));
        assert_eq!(tb.probe_wdl(&black), Some(Wdl::Loss));
        let small = GraphTablebase { cardinality: 4 };
        assert_eq!(small.probe_wdl(&white), None);
    }

    #[test]
    fn unknown_root_is_an_error() {
        let graph = Arc::new(GraphBuilder::new().build());
        assert!(GraphPosition::new(graph, 0, Color::White).is_err());
    }
}

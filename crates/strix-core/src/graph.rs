//! Synthetic game graphs.
//!
//! A [`GameGraph`] is an explicit directed graph of abstract positions. Each
//! node carries a White-relative static evaluation, a check flag and optional
//! oracle data; each edge is a move with the tactical attributes the search
//! asks about (moved piece, victim, static exchange value). Cycles are
//! allowed, so repetitions arise naturally.
//!
//! Move encodings are assigned per node: the `k`-th edge of node `n` moves
//! from square `n % 64` to square `(n % 64 + 1 + k) % 64`.

use crate::chess_move::{Move, PromotionPiece};
use crate::error::GraphError;
use crate::piece_kind::PieceKind;
use crate::prng::Prng;
use crate::square::Square;
use crate::tablebase::Wdl;

use tracing::debug;

/// Index of a node in its graph.
pub type NodeId = usize;

/// Maximum number of outgoing edges per node.
pub const MAX_EDGES: usize = 63;

/// Nominal exchange value used for default static exchange results.
const EXCHANGE_VALUE: [i32; PieceKind::COUNT] = [208, 781, 825, 1276, 2538, 0];

/// Attributes of one move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeSpec {
    piece: PieceKind,
    captured: Option<PieceKind>,
    promotion: bool,
    see: Option<i32>,
}

impl EdgeSpec {
    /// A knight move that captures nothing.
    pub const fn quiet() -> EdgeSpec {
        EdgeSpec {
            piece: PieceKind::Knight,
            captured: None,
            promotion: false,
            see: None,
        }
    }

    /// A knight capturing `victim`.
    pub const fn capture(victim: PieceKind) -> EdgeSpec {
        EdgeSpec {
            piece: PieceKind::Knight,
            captured: Some(victim),
            promotion: false,
            see: None,
        }
    }

    /// Use `kind` as the moving piece. Pawn moves reset the fifty-move counter.
    pub const fn by(mut self, kind: PieceKind) -> EdgeSpec {
        self.piece = kind;
        self
    }

    /// Turn the move into a pawn promotion to a queen.
    pub const fn promoting(mut self) -> EdgeSpec {
        self.piece = PieceKind::Pawn;
        self.promotion = true;
        self
    }

    /// Override the static exchange result.
    pub const fn with_see(mut self, see: i32) -> EdgeSpec {
        self.see = Some(see);
        self
    }
}

/// A move in the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub mv: Move,
    pub to: NodeId,
    pub piece: PieceKind,
    pub captured: Option<PieceKind>,
    pub promotion: bool,
    pub see: i32,
}

impl Edge {
    /// Captures and pawn moves reset the fifty-move counter.
    pub const fn is_zeroing(&self) -> bool {
        self.captured.is_some() || matches!(self.piece, PieceKind::Pawn)
    }
}

/// Attributes of one position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSpec {
    eval: i32,
    in_check: bool,
    wdl: Option<Wdl>,
    pieces: u32,
    non_pawn: [i32; 2],
}

impl NodeSpec {
    /// A quiet position with the given White-relative evaluation, 32 pieces
    /// and no non-pawn material (which disables null-move style pruning).
    pub const fn new(eval: i32) -> NodeSpec {
        NodeSpec {
            eval,
            in_check: false,
            wdl: None,
            pieces: 32,
            non_pawn: [0, 0],
        }
    }

    /// The side to move is in check here.
    pub const fn checked(mut self) -> NodeSpec {
        self.in_check = true;
        self
    }

    /// White-relative oracle result.
    pub const fn with_wdl(mut self, wdl: Wdl) -> NodeSpec {
        self.wdl = Some(wdl);
        self
    }

    pub const fn with_pieces(mut self, pieces: u32) -> NodeSpec {
        self.pieces = pieces;
        self
    }

    /// Non-pawn material for White and Black.
    pub const fn with_material(mut self, white: i32, black: i32) -> NodeSpec {
        self.non_pawn = [white, black];
        self
    }
}

/// One position of the graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub eval: i32,
    pub in_check: bool,
    pub wdl: Option<Wdl>,
    pub pieces: u32,
    pub non_pawn: [i32; 2],
    pub edges: Vec<Edge>,
}

/// Immutable game graph shared by every [`GraphPosition`](crate::GraphPosition) built on it.
#[derive(Debug, Clone, Default)]
pub struct GameGraph {
    pub(crate) nodes: Vec<Node>,
}

impl GameGraph {
    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Build a random graph with `node_count` nodes and up to `max_branching`
    /// moves per node. A few nodes are terminal; the result may contain cycles.
    pub fn random(seed: u64, node_count: usize, max_branching: usize) -> GameGraph {
        let node_count = node_count.max(1);
        let max_branching = max_branching.clamp(1, MAX_EDGES) as i32;
        let mut rng = Prng::new(seed);
        let mut builder = GraphBuilder::new();

        for _ in 0..node_count {
            let mut spec = NodeSpec::new(rng.range_i32(-400, 400))
                .with_pieces(rng.range_i32(4, 32) as u32)
                .with_material(rng.range_i32(0, 6000), rng.range_i32(0, 6000));
            if rng.one_in(12) {
                spec = spec.checked();
            }
            builder.add(spec);
        }

        let mut total_edges = 0usize;
        for from in 0..node_count {
            let edges = if rng.one_in(40) {
                0
            } else {
                rng.range_i32(1, max_branching)
            };
            for _ in 0..edges {
                let to = rng.below(node_count as u64) as NodeId;
                let mut spec = if rng.one_in(4) {
                    let victim = PieceKind::from_index(rng.below(5) as usize)
                        .unwrap_or(PieceKind::Pawn);
                    EdgeSpec::capture(victim)
                } else {
                    EdgeSpec::quiet()
                };
                if rng.one_in(4) {
                    spec = spec.by(PieceKind::Pawn);
                } else if rng.one_in(3) {
                    spec = spec.by(PieceKind::Bishop);
                }
                if rng.one_in(5) {
                    spec = spec.with_see(rng.range_i32(-900, 300));
                }
                // Every index is in range, so this cannot fail.
                if builder.edge(from, to, spec).is_err() {
                    break;
                }
                total_edges += 1;
            }
        }
        debug!(seed, nodes = node_count, edges = total_edges, "built random game graph");
        builder.build()
    }
}

/// Incremental constructor for [`GameGraph`].
#[derive(Debug, Default)]
pub struct GraphBuilder {
    nodes: Vec<Node>,
}

impl GraphBuilder {
    pub fn new() -> GraphBuilder {
        GraphBuilder::default()
    }

    /// Add a node and return its id.
    pub fn add(&mut self, spec: NodeSpec) -> NodeId {
        self.nodes.push(Node {
            eval: spec.eval,
            in_check: spec.in_check,
            wdl: spec.wdl,
            pieces: spec.pieces,
            non_pawn: spec.non_pawn,
            edges: Vec::new(),
        });
        self.nodes.len() - 1
    }

    /// Shorthand for `add(NodeSpec::new(eval))`.
    pub fn node(&mut self, eval: i32) -> NodeId {
        self.add(NodeSpec::new(eval))
    }

    /// Add a move from `from` to `to` and return its encoding.
    pub fn edge(&mut self, from: NodeId, to: NodeId, spec: EdgeSpec) -> Result<Move, GraphError> {
        let len = self.nodes.len();
        if to >= len {
            return Err(GraphError::UnknownNode { id: to, len });
        }
        let node = self
            .nodes
            .get_mut(from)
            .ok_or(GraphError::UnknownNode { id: from, len })?;
        let slot = node.edges.len();
        if slot >= MAX_EDGES {
            return Err(GraphError::TooManyEdges {
                node: from,
                max: MAX_EDGES,
            });
        }

        let src = Square::from_index_unchecked((from % 64) as u8);
        let dst = Square::from_index_unchecked(((from % 64 + 1 + slot) % 64) as u8);
        let mv = if spec.promotion {
            Move::new_promotion(src, dst, PromotionPiece::Queen)
        } else {
            Move::new(src, dst)
        };
        let default_see = spec.captured.map_or(0, |k| EXCHANGE_VALUE[k.index()])
            + if spec.promotion { EXCHANGE_VALUE[PieceKind::Queen.index()] } else { 0 };

        node.edges.push(Edge {
            mv,
            to,
            piece: spec.piece,
            captured: spec.captured,
            promotion: spec.promotion,
            see: spec.see.unwrap_or(default_see),
        });
        Ok(mv)
    }

    pub fn build(self) -> GameGraph {
        GameGraph { nodes: self.nodes }
    }
}

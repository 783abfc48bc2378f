//! Game abstraction consumed by the search: move and piece types, the
//! position / evaluator / tablebase capability traits, and a synthetic
//! graph-backed position used for testing and benchmarking.

mod chess_move;
mod color;
mod error;
mod eval;
mod graph;
mod graph_position;
mod move_list;
mod piece;
mod piece_kind;
mod position;
mod prng;
mod square;
mod tablebase;

pub use chess_move::{Move, MoveKind, PromotionPiece};
pub use color::Color;
pub use error::GraphError;
pub use eval::{EvalHints, Evaluator};
pub use graph::{Edge, EdgeSpec, GameGraph, GraphBuilder, MAX_EDGES, Node, NodeId, NodeSpec};
pub use graph_position::{GraphEval, GraphPosition, GraphTablebase};
pub use move_list::{MAX_MOVES, MoveList};
pub use piece::Piece;
pub use piece_kind::PieceKind;
pub use position::{GenType, Position};
pub use prng::{Prng, mix64};
pub use square::Square;
pub use tablebase::{NoTablebase, Tablebase, Wdl};

//! Error types for building synthetic game graphs.

/// Errors from [`GraphBuilder`](crate::GraphBuilder) and [`GraphPosition`](crate::GraphPosition).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    /// An edge or position referred to a node that was never added.
    #[error("node {id} does not exist (graph has {len} nodes)")]
    UnknownNode {
        /// The offending node id.
        id: usize,
        /// Number of nodes in the graph.
        len: usize,
    },
    /// A node ran out of distinct move encodings.
    #[error("node {node} already has the maximum of {max} outgoing edges")]
    TooManyEdges {
        /// The node that overflowed.
        node: usize,
        /// Edge capacity per node.
        max: usize,
    },
}

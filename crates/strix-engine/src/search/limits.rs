//! Resource limits for one search.

use std::time::{Duration, Instant};

use strix_core::{Color, Move};

/// What the caller allows a search to spend.
///
/// Clock fields are indexed by [`Color::index`]. With neither clock time nor
/// increment set, time management is off and only the explicit limits
/// (`depth`, `nodes`, `mate`, `movetime`) or an external stop end the search.
#[derive(Debug, Clone)]
pub struct SearchLimits {
    pub time: [Option<Duration>; Color::COUNT],
    pub inc: [Option<Duration>; Color::COUNT],
    pub moves_to_go: Option<u32>,
    pub movetime: Option<Duration>,
    pub depth: Option<i32>,
    pub nodes: Option<u64>,
    /// Stop once a mate in this many moves is proven.
    pub mate: Option<u32>,
    pub infinite: bool,
    pub ponder: bool,
    /// Restrict the root to these moves when non-empty.
    pub search_moves: Vec<Move>,
    pub start: Instant,
}

impl SearchLimits {
    /// No limits at all: the search runs until stopped.
    pub fn infinite() -> Self {
        Self {
            infinite: true,
            ..Self::default()
        }
    }

    pub fn depth(depth: i32) -> Self {
        Self {
            depth: Some(depth),
            ..Self::default()
        }
    }

    pub fn nodes(nodes: u64) -> Self {
        Self {
            nodes: Some(nodes),
            ..Self::default()
        }
    }

    pub fn movetime(movetime: Duration) -> Self {
        Self {
            movetime: Some(movetime),
            ..Self::default()
        }
    }

    /// Clock-based limits for the side to move.
    pub fn clock(us: Color, time: Duration, inc: Duration, moves_to_go: Option<u32>) -> Self {
        let mut limits = Self::default();
        limits.time[us.index()] = Some(time);
        limits.inc[us.index()] = Some(inc);
        limits.moves_to_go = moves_to_go;
        limits
    }

    /// Whether the clock drives the search length.
    pub fn use_time_management(&self) -> bool {
        self.time.iter().any(Option::is_some)
    }
}

impl Default for SearchLimits {
    fn default() -> Self {
        Self {
            time: [None; Color::COUNT],
            inc: [None; Color::COUNT],
            moves_to_go: None,
            movetime: None,
            depth: None,
            nodes: None,
            mate: None,
            infinite: false,
            ponder: false,
            search_moves: Vec::new(),
            start: Instant::now(),
        }
    }
}

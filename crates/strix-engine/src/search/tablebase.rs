//! Endgame oracle glue: probe settings and root move ranking.

use strix_core::{Position, Tablebase, Wdl};
use tracing::debug;

use crate::config::SearchOptions;
use crate::search::root::{self, RootMove};
use crate::search::value::{MAX_PLY, VALUE_DRAW, VALUE_MATE, Value};

/// Rank scale used to order root moves by their oracle result.
const MAX_DTZ: i32 = 1 << 18;

/// How the search may use the oracle during this search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TbConfig {
    /// Largest piece count probed inside the tree; 0 disables probing.
    pub cardinality: u32,
    /// Minimum remaining depth for probes at exactly `cardinality` pieces.
    pub probe_depth: i32,
    /// Whether cursed wins and blessed losses count as draws.
    pub use_rule50: bool,
    /// Every root move was resolved by the oracle.
    pub root_in_tb: bool,
}

const fn wdl_to_rank(wdl: Wdl) -> i32 {
    match wdl {
        Wdl::Loss => -MAX_DTZ,
        Wdl::BlessedLoss => -MAX_DTZ + 101,
        Wdl::Draw => 0,
        Wdl::CursedWin => MAX_DTZ - 101,
        Wdl::Win => MAX_DTZ,
    }
}

const fn wdl_to_value(wdl: Wdl) -> Value {
    match wdl {
        Wdl::Loss => -VALUE_MATE + MAX_PLY + 1,
        Wdl::BlessedLoss => VALUE_DRAW - 2,
        Wdl::Draw => VALUE_DRAW,
        Wdl::CursedWin => VALUE_DRAW + 2,
        Wdl::Win => VALUE_MATE - MAX_PLY - 1,
    }
}

/// Score every root move with the oracle and sort them by rank.
///
/// When the root is resolved, in-tree probing is switched off unless the
/// best move wins: a won position still benefits from probes that steer the
/// search towards the conversion. An inconclusive probe on any move leaves
/// the ranks at zero.
pub fn rank_root_moves<P, T>(options: &SearchOptions, tb: &T, pos: &mut P, root_moves: &mut [RootMove]) -> TbConfig
where
    P: Position,
    T: Tablebase<P> + ?Sized,
{
    let mut config = TbConfig {
        cardinality: options.syzygy_probe_limit,
        probe_depth: options.syzygy_probe_depth,
        use_rule50: options.syzygy_50_move_rule,
        root_in_tb: false,
    };

    let max = tb.max_cardinality();
    if config.cardinality > max {
        config.cardinality = max;
        config.probe_depth = 0;
    }

    if config.cardinality >= pos.piece_count() && !pos.can_castle() {
        config.root_in_tb = rank_by_wdl(tb, pos, root_moves, config.use_rule50);
    }

    if config.root_in_tb {
        root::sort_by_tb_rank(root_moves);
        if root_moves.first().is_none_or(|rm| rm.tb_score <= VALUE_DRAW) {
            config.cardinality = 0;
        }
        debug!(
            moves = root_moves.len(),
            best_rank = root_moves.first().map_or(0, |rm| rm.tb_rank),
            "root resolved by the endgame oracle"
        );
    } else {
        for rm in root_moves.iter_mut() {
            rm.tb_rank = 0;
        }
    }
    config
}

fn rank_by_wdl<P, T>(tb: &T, pos: &mut P, root_moves: &mut [RootMove], use_rule50: bool) -> bool
where
    P: Position,
    T: Tablebase<P> + ?Sized,
{
    for rm in root_moves.iter_mut() {
        let mv = rm.mv();
        let gives_check = pos.gives_check(mv);
        pos.do_move(mv, gives_check);
        let wdl = tb.probe_wdl(pos).map(Wdl::negate);
        pos.undo_move(mv);

        let Some(mut wdl) = wdl else {
            return false;
        };
        rm.tb_rank = wdl_to_rank(wdl);
        if !use_rule50 {
            wdl = match wdl.signum2() {
                s if s > 0 => Wdl::Win,
                s if s < 0 => Wdl::Loss,
                _ => Wdl::Draw,
            };
        }
        rm.tb_score = wdl_to_value(wdl);
    }
    true
}

//! Strength handicap: play a statistically weaker move.

use strix_core::{Move, Prng};

use crate::config::{HIGHEST_ELO, LOWEST_ELO};
use crate::search::root::RootMove;
use crate::search::value::{PAWN_VALUE, VALUE_INFINITE, Value};

/// Skill level in `0.0..=20.0`; 20 is full strength.
#[derive(Debug, Clone)]
pub struct Skill {
    level: f64,
    /// Move chosen by the last [`pick_best`](Skill::pick_best).
    pub best: Move,
}

impl Skill {
    /// Level from an explicit skill setting, or from an Elo target when
    /// `elo` is given.
    pub fn new(skill_level: i32, elo: Option<i32>) -> Skill {
        let level = match elo {
            Some(elo) => {
                let e = (elo - LOWEST_ELO) as f64 / (HIGHEST_ELO - LOWEST_ELO) as f64;
                (((37.2473 * e - 40.8525) * e + 22.2943) * e - 0.311438).clamp(0.0, 19.0)
            }
            None => skill_level as f64,
        };
        Skill {
            level,
            best: Move::NONE,
        }
    }

    pub fn level(&self) -> f64 {
        self.level
    }

    pub fn enabled(&self) -> bool {
        self.level < 20.0
    }

    /// The iteration at which the handicapped move is chosen.
    pub fn time_to_pick(&self, depth: i32) -> bool {
        depth == 1 + self.level as i32
    }

    /// Choose among the first `multi_pv` root moves (sorted best-first).
    ///
    /// Each candidate's score gets a deterministic push that grows with the
    /// handicap plus a random one; the highest pushed score wins.
    pub fn pick_best(&mut self, root_moves: &[RootMove], multi_pv: usize, rng: &mut Prng) -> Move {
        let multi_pv = multi_pv.clamp(1, root_moves.len().max(1));
        let Some(top) = root_moves.first() else {
            return Move::NONE;
        };
        let top_score = top.score;
        let delta = (top_score - root_moves[multi_pv - 1].score).min(PAWN_VALUE);
        let weakness = (120.0 - 2.0 * self.level) as i32;
        let mut max_score: Value = -VALUE_INFINITE;

        for rm in &root_moves[..multi_pv] {
            let random = rng.below(weakness as u64) as i32;
            let push = (weakness * (top_score - rm.score) + delta * random) / 128;
            if rm.score + push >= max_score {
                max_score = rm.score + push;
                self.best = rm.mv();
            }
        }
        self.best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strix_core::Square;

    #[test]
    fn full_strength_is_disabled() {
        assert!(!Skill::new(20, None).enabled());
        assert!(Skill::new(5, None).enabled());
        assert!(Skill::new(20, Some(LOWEST_ELO)).enabled());
        assert!(Skill::new(20, Some(HIGHEST_ELO)).level() <= 19.0);
    }

    #[test]
    fn elo_maps_monotonically() {
        let low = Skill::new(0, Some(LOWEST_ELO)).level();
        let mid = Skill::new(0, Some(2200)).level();
        let high = Skill::new(0, Some(HIGHEST_ELO)).level();
        assert!(low <= mid && mid <= high);
    }

    #[test]
    fn pick_time_follows_level() {
        let skill = Skill::new(3, None);
        assert!(skill.time_to_pick(4));
        assert!(!skill.time_to_pick(3));
    }

    #[test]
    fn pick_best_returns_a_candidate() {
        let mut moves: Vec<RootMove> = (0..4u8)
            .map(|i| {
                let mut rm = RootMove::new(Move::new(Square::from_index(i).unwrap(), Square::H8));
                rm.score = 100 - 30 * i as Value;
                rm
            })
            .collect();
        moves.push(RootMove::new(Move::new(Square::from_index(9).unwrap(), Square::H8)));

        let mut skill = Skill::new(0, None);
        let mut rng = Prng::new(7);
        for _ in 0..20 {
            let mv = skill.pick_best(&moves, 4, &mut rng);
            assert!(moves[..4].iter().any(|rm| rm.mv() == mv));
        }
        let mv = skill.pick_best(&moves, 1, &mut rng);
        assert_eq!(mv, moves[0].mv());
        assert_eq!(skill.best, mv);
    }
}

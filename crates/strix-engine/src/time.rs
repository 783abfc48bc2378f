//! Time management: turn clock parameters into an optimum and a maximum
//! thinking time for the current move.

use std::time::Instant;

use strix_core::Color;

use crate::config::SearchOptions;
use crate::search::limits::SearchLimits;

/// Per-search time budget.
///
/// `optimum` is the target the iterative-deepening driver scales by its
/// stability heuristics; `maximum` is the hard ceiling checked inside the
/// search.
#[derive(Debug, Clone)]
pub struct TimeManager {
    start: Instant,
    optimum_ms: i64,
    maximum_ms: i64,
}

impl TimeManager {
    /// Compute the budget for the side `us` at game ply `ply`.
    ///
    /// `original_time_adjust` persists across the moves of a game: a negative
    /// value is replaced by a factor derived from the first clock seen.
    pub fn init(
        limits: &SearchLimits,
        us: Color,
        ply: u32,
        options: &SearchOptions,
        original_time_adjust: &mut f64,
    ) -> TimeManager {
        let mut tm = TimeManager {
            start: limits.start,
            optimum_ms: 0,
            maximum_ms: 0,
        };

        if let Some(movetime) = limits.movetime {
            let ms = movetime.as_millis() as i64;
            tm.optimum_ms = ms;
            tm.maximum_ms = ms;
            return tm;
        }

        let Some(time) = limits.time[us.index()] else {
            return tm;
        };
        let time = time.as_millis() as i64;
        let inc = limits.inc[us.index()].map_or(0, |d| d.as_millis() as i64);
        let overhead = options.move_overhead_ms as i64;
        let ply = ply as f64;

        let mut centi_mtg: i64 = match limits.moves_to_go {
            Some(mtg) if mtg > 0 => (mtg as i64 * 100).min(5000),
            _ => 5051,
        };
        // Avoid spending the bulk of a tiny clock when increments are small.
        if time < 1000 && (inc == 0 || centi_mtg as f64 / inc as f64 > 5.051) {
            centi_mtg = (time as f64 * 5.051) as i64;
        }

        let time_left = (time + (inc * (centi_mtg - 100) - overhead * (200 + centi_mtg)) / 100).max(1);

        let (opt_scale, max_scale) = if limits.moves_to_go.is_none_or(|m| m == 0) {
            if *original_time_adjust < 0.0 {
                *original_time_adjust = 0.3128 * (time_left as f64).log10() - 0.4354;
            }
            let log_time_sec = (time as f64 / 1000.0).log10();
            let opt_constant = (0.0032116 + 0.000321123 * log_time_sec).min(0.00508017);
            let max_constant = (3.3977 + 3.03950 * log_time_sec).max(2.94761);
            let opt = (0.0121431 + (ply + 2.94693).powf(0.461073) * opt_constant)
                .min(0.213035 * time as f64 / time_left as f64)
                * *original_time_adjust;
            let max = (max_constant + ply / 11.9847).min(6.67704);
            (opt, max)
        } else {
            let mtg = centi_mtg as f64 / 100.0;
            let opt = ((0.88 + ply / 116.4) / mtg).min(0.88 * time as f64 / time_left as f64);
            let max = 1.3 + 0.11 * mtg;
            (opt, max)
        };

        let optimum = (opt_scale * time_left as f64) as i64;
        let maximum = ((0.825179 * time as f64 - overhead as f64).min(max_scale * optimum as f64)) as i64 - 10;

        let mut optimum = optimum * options.slow_mover as i64 / 100;
        if options.ponder {
            optimum += optimum / 4;
        }
        let maximum = maximum.max(1);
        optimum = optimum.max(options.minimum_thinking_time_ms as i64).min(maximum).max(1);

        tm.optimum_ms = optimum;
        tm.maximum_ms = maximum;
        tm
    }

    /// Target thinking time in milliseconds.
    pub fn optimum(&self) -> i64 {
        self.optimum_ms
    }

    /// Hard ceiling in milliseconds.
    pub fn maximum(&self) -> i64 {
        self.maximum_ms
    }

    /// Milliseconds since the search started.
    pub fn elapsed(&self) -> i64 {
        self.start.elapsed().as_millis() as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn budget(time_ms: u64, inc_ms: u64, mtg: Option<u32>, ply: u32) -> TimeManager {
        let limits = SearchLimits::clock(
            Color::White,
            Duration::from_millis(time_ms),
            Duration::from_millis(inc_ms),
            mtg,
        );
        let mut adjust = -1.0;
        TimeManager::init(&limits, Color::White, ply, &SearchOptions::default(), &mut adjust)
    }

    #[test]
    fn sudden_death_budget_is_a_small_slice() {
        let tm = budget(300_000, 2_000, None, 20);
        assert!(tm.optimum() > 1_000, "optimum={}", tm.optimum());
        assert!(tm.optimum() < 30_000, "optimum={}", tm.optimum());
        assert!(tm.maximum() > tm.optimum());
        assert!(tm.maximum() < 300_000);
    }

    #[test]
    fn moves_to_go_spreads_the_clock() {
        let tm = budget(60_000, 0, Some(10), 40);
        // Roughly a tenth of the clock, give or take the ply factor.
        assert!(tm.optimum() > 3_000, "optimum={}", tm.optimum());
        assert!(tm.optimum() < 9_000, "optimum={}", tm.optimum());
        assert!(tm.maximum() >= tm.optimum());
    }

    #[test]
    fn tiny_clock_never_goes_to_zero() {
        let tm = budget(5, 0, None, 0);
        assert!(tm.optimum() >= 1);
        assert!(tm.maximum() >= 1);
        assert!(tm.optimum() <= tm.maximum());
    }

    #[test]
    fn movetime_sets_both_budgets() {
        let limits = SearchLimits::movetime(Duration::from_millis(250));
        let mut adjust = -1.0;
        let tm = TimeManager::init(&limits, Color::Black, 10, &SearchOptions::default(), &mut adjust);
        assert_eq!(tm.optimum(), 250);
        assert_eq!(tm.maximum(), 250);
        assert_eq!(adjust, -1.0);
    }

    #[test]
    fn time_adjust_is_computed_once() {
        let limits = SearchLimits::clock(Color::White, Duration::from_secs(60), Duration::ZERO, None);
        let mut adjust = -1.0;
        TimeManager::init(&limits, Color::White, 0, &SearchOptions::default(), &mut adjust);
        let first = adjust;
        assert!(first > 0.0);
        let limits = SearchLimits::clock(Color::White, Duration::from_secs(5), Duration::ZERO, None);
        TimeManager::init(&limits, Color::White, 30, &SearchOptions::default(), &mut adjust);
        assert_eq!(adjust, first);
    }
}

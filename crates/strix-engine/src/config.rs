//! Search options.
//!
//! A flat store read by the search at fixed points (search start, iteration
//! start, once per node for the pressing-branch knobs). Values are set by
//! name, with range validation, the way a protocol front-end forwards
//! `setoption` commands.

use crate::error::OptionError;

/// Lowest and highest Elo the strength limiter accepts.
pub const LOWEST_ELO: i32 = 1320;
pub const HIGHEST_ELO: i32 = 3190;

/// All tunable search options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchOptions {
    pub threads: usize,
    pub hash_mb: usize,
    pub multi_pv: usize,
    pub ponder: bool,
    pub skill_level: i32,
    pub limit_strength: bool,
    pub elo: i32,
    pub move_overhead_ms: u64,
    pub minimum_thinking_time_ms: u64,
    /// Percentage applied to the optimum time; 100 leaves it unchanged.
    pub slow_mover: u32,
    pub syzygy_probe_depth: i32,
    pub syzygy_50_move_rule: bool,
    pub syzygy_probe_limit: u32,
    pub fail_info_enabled: bool,
    pub fail_info_first_ms: u64,
    pub fail_info_min_nodes: u64,
    pub fail_info_rate_ms: u64,
    /// Randomisation strength for near-balanced early-game values; 0 disables.
    pub variety: i32,
    pub variety_max_score: i32,
    pub variety_max_moves: u32,
    /// 0 = neutral; from 20 forcing moves get half a reduction step less, from 50 a full step.
    pub attack_inclination: i32,
    /// Extra SEE slack, in centipawns, granted to checking moves.
    pub check_sacrifice_tolerance_cp: i32,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            threads: 1,
            hash_mb: 16,
            multi_pv: 1,
            ponder: false,
            skill_level: 20,
            limit_strength: false,
            elo: LOWEST_ELO,
            move_overhead_ms: 100,
            minimum_thinking_time_ms: 100,
            slow_mover: 100,
            syzygy_probe_depth: 1,
            syzygy_50_move_rule: true,
            syzygy_probe_limit: 7,
            fail_info_enabled: true,
            fail_info_first_ms: 4000,
            fail_info_min_nodes: 10_000_000,
            fail_info_rate_ms: 400,
            variety: 0,
            variety_max_score: 50,
            variety_max_moves: 12,
            attack_inclination: 0,
            check_sacrifice_tolerance_cp: 0,
        }
    }
}

fn parse_int(name: &str, value: &str, min: i64, max: i64) -> Result<i64, OptionError> {
    let v: i64 = value.trim().parse().map_err(|_| OptionError::InvalidValue {
        name: name.to_string(),
        value: value.to_string(),
    })?;
    if v < min || v > max {
        return Err(OptionError::OutOfRange {
            name: name.to_string(),
            value: v,
            min,
            max,
        });
    }
    Ok(v)
}

fn parse_bool(name: &str, value: &str) -> Result<bool, OptionError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "on" | "1" => Ok(true),
        "false" | "off" | "0" => Ok(false),
        _ => Err(OptionError::InvalidValue {
            name: name.to_string(),
            value: value.to_string(),
        }),
    }
}

impl SearchOptions {
    /// Set one option by name.
    ///
    /// Names are case-insensitive; spaces and underscores are
    /// interchangeable, so both `"Move Overhead"` and `"move_overhead_ms"`
    /// are accepted.
    pub fn set(&mut self, name: &str, value: &str) -> Result<(), OptionError> {
        let key = name.trim().to_ascii_lowercase().replace(' ', "_");
        match key.as_str() {
            "threads" => self.threads = parse_int(name, value, 1, 1024)? as usize,
            "hash" | "hash_mb" => self.hash_mb = parse_int(name, value, 1, 1 << 25)? as usize,
            "multipv" | "multi_pv" => self.multi_pv = parse_int(name, value, 1, 256)? as usize,
            "ponder" => self.ponder = parse_bool(name, value)?,
            "skill_level" => self.skill_level = parse_int(name, value, 0, 20)? as i32,
            "uci_limitstrength" | "limit_strength" => self.limit_strength = parse_bool(name, value)?,
            "uci_elo" | "elo" => {
                self.elo = parse_int(name, value, LOWEST_ELO as i64, HIGHEST_ELO as i64)? as i32
            }
            "move_overhead" | "move_overhead_ms" => self.move_overhead_ms = parse_int(name, value, 0, 5000)? as u64,
            "minimum_thinking_time" | "minimum_thinking_time_ms" => {
                self.minimum_thinking_time_ms = parse_int(name, value, 0, 2000)? as u64
            }
            "slow_mover" => self.slow_mover = parse_int(name, value, 10, 500)? as u32,
            "syzygyprobedepth" | "syzygy_probe_depth" => {
                self.syzygy_probe_depth = parse_int(name, value, 1, 100)? as i32
            }
            "syzygy50moverule" | "syzygy_50_move_rule" => self.syzygy_50_move_rule = parse_bool(name, value)?,
            "syzygyprobelimit" | "syzygy_probe_limit" => {
                self.syzygy_probe_limit = parse_int(name, value, 0, 7)? as u32
            }
            "failinfo_enabled" | "fail_info_enabled" => self.fail_info_enabled = parse_bool(name, value)?,
            "failinfo_first_ms" | "fail_info_first_ms" => {
                self.fail_info_first_ms = parse_int(name, value, 0, 60_000)? as u64
            }
            "failinfo_min_nodes" | "fail_info_min_nodes" => {
                self.fail_info_min_nodes = parse_int(name, value, 0, 1_000_000_000)? as u64
            }
            "failinfo_rate_ms" | "fail_info_rate_ms" => {
                self.fail_info_rate_ms = parse_int(name, value, 0, 10_000)? as u64
            }
            "variety" => self.variety = parse_int(name, value, 0, 40)? as i32,
            "variety_max_score" => self.variety_max_score = parse_int(name, value, 0, 300)? as i32,
            "variety_max_moves" => self.variety_max_moves = parse_int(name, value, 0, 60)? as u32,
            "attackinclination" | "attack_inclination" => {
                self.attack_inclination = parse_int(name, value, 0, 100)? as i32
            }
            "checksacrificetolerancecp" | "check_sacrifice_tolerance_cp" => {
                self.check_sacrifice_tolerance_cp = parse_int(name, value, 0, 80)? as i32
            }
            _ => return Err(OptionError::Unknown(name.to_string())),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let o = SearchOptions::default();
        assert_eq!(o.threads, 1);
        assert_eq!(o.multi_pv, 1);
        assert_eq!(o.skill_level, 20);
        assert!(o.fail_info_enabled);
        assert_eq!(o.fail_info_first_ms, 4000);
        assert_eq!(o.fail_info_min_nodes, 10_000_000);
        assert_eq!(o.fail_info_rate_ms, 400);
        assert_eq!(o.variety, 0);
    }

    #[test]
    fn set_accepts_both_spellings() {
        let mut o = SearchOptions::default();
        o.set("Move Overhead", "30").unwrap();
        assert_eq!(o.move_overhead_ms, 30);
        o.set("move_overhead_ms", "40").unwrap();
        assert_eq!(o.move_overhead_ms, 40);
        o.set("MultiPV", "3").unwrap();
        assert_eq!(o.multi_pv, 3);
        o.set("FailInfo Enabled", "false").unwrap();
        assert!(!o.fail_info_enabled);
        o.set("AttackInclination", "55").unwrap();
        assert_eq!(o.attack_inclination, 55);
    }

    #[test]
    fn set_rejects_bad_input() {
        let mut o = SearchOptions::default();
        assert_eq!(o.set("Bogus", "1"), Err(OptionError::Unknown("Bogus".to_string())));
        assert!(matches!(o.set("Threads", "zero"), Err(OptionError::InvalidValue { .. })));
        assert!(matches!(
            o.set("Skill Level", "21"),
            Err(OptionError::OutOfRange { value: 21, min: 0, max: 20, .. })
        ));
        assert!(matches!(o.set("Ponder", "maybe"), Err(OptionError::InvalidValue { .. })));
        // Failed sets leave the store untouched.
        assert_eq!(o, SearchOptions::default());
    }
}

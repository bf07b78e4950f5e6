//! Rule data consumed by the engine at construction time.
//!
//! Everything here is plain data: the piece figures, the rotation-system
//! offset tables, the gravity curve, and the input timing constants. A host
//! can deserialize a retuned `GameConfig` from JSON instead of using the
//! built-in guideline defaults.

use serde::{Deserialize, Serialize};

/// Occupied cell indices (row-major, `row * 5 + col`) within each piece's
/// 5x5 bounding box, one entry of four indices per rotation state.
/// Kind order is I, J, L, O, S, T, Z, matching `PieceKind`.
pub const FIGURES: [[[u8; 4]; 4]; 7] = [
    // I
    [[11, 12, 13, 14], [7, 12, 17, 22], [10, 11, 12, 13], [2, 7, 12, 17]],
    // J
    [[6, 11, 12, 13], [7, 8, 12, 17], [11, 12, 13, 18], [7, 12, 16, 17]],
    // L
    [[8, 11, 12, 13], [7, 12, 17, 18], [11, 12, 13, 16], [6, 7, 12, 17]],
    // O
    [[7, 8, 12, 13], [12, 13, 17, 18], [11, 12, 16, 17], [6, 7, 11, 12]],
    // S
    [[7, 8, 11, 12], [7, 12, 13, 18], [12, 13, 16, 17], [6, 11, 12, 17]],
    // T
    [[7, 11, 12, 13], [7, 12, 13, 17], [11, 12, 13, 17], [7, 11, 12, 17]],
    // Z
    [[6, 7, 12, 13], [8, 12, 13, 17], [11, 12, 17, 18], [7, 11, 12, 16]],
];

// Rotation-system offset data, one row of (x, y) offsets per rotation state
// with y pointing up. A kick candidate for a from->to transition is the
// column-wise difference `offsets[from][k] - offsets[to][k]`, applied to the
// piece as `x += dx, y -= dy`.

pub const JLSTZ_OFFSETS: [[(i8, i8); 5]; 4] = [
    [(0, 0), (0, 0), (0, 0), (0, 0), (0, 0)],
    [(0, 0), (1, 0), (1, -1), (0, 2), (1, 2)],
    [(0, 0), (0, 0), (0, 0), (0, 0), (0, 0)],
    [(0, 0), (-1, 0), (-1, -1), (0, 2), (-1, 2)],
];

pub const I_OFFSETS: [[(i8, i8); 5]; 4] = [
    [(0, 0), (-1, 0), (2, 0), (-1, 0), (2, 0)],
    [(-1, 0), (0, 0), (0, 0), (0, 1), (0, -2)],
    [(-1, 1), (1, 1), (-2, 1), (1, 0), (-2, 0)],
    [(0, 1), (0, 1), (0, 1), (0, -1), (0, 2)],
];

pub const O_OFFSETS: [[(i8, i8); 1]; 4] = [[(0, 0)], [(0, -1)], [(-1, -1)], [(-1, 0)]];

/// Gravity curve at 60 ticks per second: every `every_ticks` ticks the piece
/// falls `rows` rows. Levels past the end of the table reuse the last entry.
pub const GRAVITY: [GravityStep; 15] = [
    GravityStep { every_ticks: 60, rows: 1 },
    GravityStep { every_ticks: 48, rows: 1 },
    GravityStep { every_ticks: 37, rows: 1 },
    GravityStep { every_ticks: 28, rows: 1 },
    GravityStep { every_ticks: 21, rows: 1 },
    GravityStep { every_ticks: 16, rows: 1 },
    GravityStep { every_ticks: 11, rows: 1 },
    GravityStep { every_ticks: 8, rows: 1 },
    GravityStep { every_ticks: 6, rows: 1 },
    GravityStep { every_ticks: 4, rows: 1 },
    GravityStep { every_ticks: 3, rows: 1 },
    GravityStep { every_ticks: 2, rows: 1 },
    GravityStep { every_ticks: 1, rows: 1 },
    GravityStep { every_ticks: 1, rows: 2 },
    GravityStep { every_ticks: 1, rows: 3 },
];

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct GravityStep {
    pub every_ticks: u32,
    pub rows: i16,
}

/// Input and lock timing constants, all in ticks.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Held duration a direction key must exceed before auto-shift starts.
    pub das_delay_ticks: u32,
    /// Auto-shift fires on exact multiples of this interval.
    pub das_repeat_ticks: u32,
    /// Lock-delay window length.
    pub lock_delay_ticks: u32,
    /// Maximum number of lock-delay extensions per piece.
    pub move_reset_limit: u32,
    /// Gravity interval divisor while soft-dropping.
    pub soft_drop_divisor: u32,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            das_delay_ticks: 10,
            das_repeat_ticks: 10,
            lock_delay_ticks: 30,
            move_reset_limit: 15,
            soft_drop_divisor: 10,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct OffsetTables {
    pub jlstz: [[(i8, i8); 5]; 4],
    pub i: [[(i8, i8); 5]; 4],
    pub o: [[(i8, i8); 1]; 4],
}

impl Default for OffsetTables {
    fn default() -> Self {
        Self {
            jlstz: JLSTZ_OFFSETS,
            i: I_OFFSETS,
            o: O_OFFSETS,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GameConfig {
    pub figures: [[[u8; 4]; 4]; 7],
    pub offsets: OffsetTables,
    pub gravity: Vec<GravityStep>,
    pub timing: TimingConfig,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            figures: FIGURES,
            offsets: OffsetTables::default(),
            gravity: GRAVITY.to_vec(),
            timing: TimingConfig::default(),
        }
    }
}

impl GameConfig {
    /// The four occupied cell indices for a kind (0..7) and rotation state.
    pub fn figure(&self, kind: usize, rotation: usize) -> [u8; 4] {
        self.figures[kind][rotation % 4]
    }

    /// Ordered kick candidates for a rotation transition, in board
    /// coordinates: apply as `x += dx, y -= dy`.
    pub fn kick_candidates(&self, kind: usize, from: usize, to: usize) -> Vec<(i16, i16)> {
        fn diffs<const N: usize>(
            table: &[[(i8, i8); N]; 4],
            from: usize,
            to: usize,
        ) -> Vec<(i16, i16)> {
            (0..N)
                .map(|k| {
                    let (fx, fy) = table[from][k];
                    let (tx, ty) = table[to][k];
                    ((fx - tx) as i16, (fy - ty) as i16)
                })
                .collect()
        }

        match kind {
            0 => diffs(&self.offsets.i, from % 4, to % 4),
            3 => diffs(&self.offsets.o, from % 4, to % 4),
            _ => diffs(&self.offsets.jlstz, from % 4, to % 4),
        }
    }

    /// Gravity step for a level, clamped to the last defined entry.
    pub fn gravity_for(&self, level: u32) -> GravityStep {
        let index = (level as usize).min(self.gravity.len() - 1);
        self.gravity[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Rotate a 5x5 cell index a quarter turn clockwise about the box center.
    fn rotate_cell_cw(cell: u8) -> u8 {
        let (row, col) = (cell / 5, cell % 5);
        col * 5 + (4 - row)
    }

    #[test]
    fn every_figure_has_four_distinct_cells() {
        for kind in FIGURES {
            for rotation in kind {
                let mut cells = rotation.to_vec();
                cells.sort_unstable();
                cells.dedup();
                assert_eq!(cells.len(), 4);
                assert!(cells.iter().all(|&c| c < 25));
            }
        }
    }

    #[test]
    fn figures_are_closed_under_rotation() {
        for kind in FIGURES {
            for rotation in 0..4 {
                let mut rotated: Vec<u8> = kind[rotation]
                    .iter()
                    .map(|&c| rotate_cell_cw(c))
                    .collect();
                rotated.sort_unstable();
                let mut next = kind[(rotation + 1) % 4].to_vec();
                next.sort_unstable();
                assert_eq!(rotated, next);
            }
        }
    }

    #[test]
    fn jlstz_quarter_turns_try_unkicked_rotation_first() {
        let config = GameConfig::default();
        for kind in [1usize, 2, 4, 5, 6] {
            for from in 0..4 {
                for to in [(from + 1) % 4, (from + 3) % 4] {
                    let candidates = config.kick_candidates(kind, from, to);
                    assert_eq!(candidates.len(), 5);
                    assert_eq!(candidates[0], (0, 0));
                }
            }
        }
    }

    #[test]
    fn i_and_o_use_their_own_buckets() {
        let config = GameConfig::default();
        assert_eq!(config.kick_candidates(0, 0, 1).len(), 5);
        assert_eq!(config.kick_candidates(3, 0, 1), vec![(0, 1)]);
        // First I candidate compensates for the mask pivot, so the net
        // effect is the unkicked guideline rotation.
        assert_eq!(config.kick_candidates(0, 0, 1)[0], (1, 0));
    }

    #[test]
    fn gravity_clamps_to_last_entry() {
        let config = GameConfig::default();
        let last = *config.gravity.last().unwrap();
        assert_eq!(config.gravity_for(14), last);
        assert_eq!(config.gravity_for(99), last);
        assert_eq!(config.gravity_for(0), config.gravity[0]);
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = GameConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: GameConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.figures, config.figures);
        assert_eq!(parsed.offsets, config.offsets);
        assert_eq!(parsed.gravity, config.gravity);
        assert_eq!(parsed.timing, config.timing);
    }
}

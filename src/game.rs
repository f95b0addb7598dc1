//! Plinko Outcome Engine
//!
//! Produces a ball path and landing multiplier for a given risk level and
//! row count. Multiplier tables exist for 8, 12, and 16 rows; other row
//! counts cannot be simulated server-side and resolve only from a
//! cross-validated client result.

use rand::Rng;

use crate::types::bet::RiskLevel;

/// Row counts with a server-side multiplier table
pub const SUPPORTED_ROWS: [u8; 3] = [8, 12, 16];

/// Row counts accepted for bets at all (client results allowed in between)
pub const MIN_ROWS: u8 = 8;
pub const MAX_ROWS: u8 = 16;

// Landing multipliers in milli-units, indexed by final bin.
const LOW_8: [u32; 9] = [5600, 2100, 1100, 1000, 500, 1000, 1100, 2100, 5600];
const LOW_12: [u32; 13] = [
    10_000, 3000, 1600, 1400, 1100, 1000, 500, 1000, 1100, 1400, 1600, 3000, 10_000,
];
const LOW_16: [u32; 17] = [
    16_000, 9000, 2000, 1400, 1400, 1200, 1100, 1000, 500, 1000, 1100, 1200, 1400, 1400, 2000,
    9000, 16_000,
];
const MEDIUM_8: [u32; 9] = [13_000, 3000, 1300, 700, 400, 700, 1300, 3000, 13_000];
const MEDIUM_12: [u32; 13] = [
    24_000, 5000, 1800, 1300, 900, 700, 400, 700, 900, 1300, 1800, 5000, 24_000,
];
const MEDIUM_16: [u32; 17] = [
    33_000, 11_000, 4000, 2000, 1100, 600, 300, 200, 200, 200, 300, 600, 1100, 2000, 4000, 11_000,
    33_000,
];
const HIGH_8: [u32; 9] = [29_000, 4000, 1500, 300, 200, 300, 1500, 4000, 29_000];
const HIGH_12: [u32; 13] = [
    58_000, 9000, 2000, 1200, 600, 400, 200, 400, 600, 1200, 2000, 9000, 58_000,
];
const HIGH_16: [u32; 17] = [
    110_000, 41_000, 10_000, 5000, 1900, 300, 200, 100, 100, 100, 200, 300, 1900, 5000, 10_000,
    41_000, 110_000,
];

/// Outcome of a simulated drop
#[derive(Debug, Clone)]
pub struct Outcome {
    /// Landing multiplier in milli-units
    pub multiplier_milli: u32,
    /// Bin index per row
    pub ball_path: Vec<u8>,
}

/// Outcome engine errors
#[derive(Debug, thiserror::Error)]
pub enum OutcomeError {
    #[error("no multiplier table for {0} rows")]
    UnsupportedRows(u8),
}

/// Multiplier table for a risk level and row count, when one exists
pub fn multiplier_table(risk_level: RiskLevel, rows_count: u8) -> Option<&'static [u32]> {
    match (risk_level, rows_count) {
        (RiskLevel::Low, 8) => Some(&LOW_8),
        (RiskLevel::Low, 12) => Some(&LOW_12),
        (RiskLevel::Low, 16) => Some(&LOW_16),
        (RiskLevel::Medium, 8) => Some(&MEDIUM_8),
        (RiskLevel::Medium, 12) => Some(&MEDIUM_12),
        (RiskLevel::Medium, 16) => Some(&MEDIUM_16),
        (RiskLevel::High, 8) => Some(&HIGH_8),
        (RiskLevel::High, 12) => Some(&HIGH_12),
        (RiskLevel::High, 16) => Some(&HIGH_16),
        _ => None,
    }
}

/// Whether the server can simulate this row count
pub fn supports_rows(rows_count: u8) -> bool {
    SUPPORTED_ROWS.contains(&rows_count)
}

/// Whether a bet may be created at all for this row count
pub fn valid_rows(rows_count: u8) -> bool {
    (MIN_ROWS..=MAX_ROWS).contains(&rows_count)
}

/// Simulate a drop: the ball moves left or right at each row, the final
/// bin picks the multiplier from the table.
pub fn simulate(risk_level: RiskLevel, rows_count: u8) -> Result<Outcome, OutcomeError> {
    let table =
        multiplier_table(risk_level, rows_count).ok_or(OutcomeError::UnsupportedRows(rows_count))?;

    let mut rng = rand::thread_rng();
    let mut ball_path = Vec::with_capacity(rows_count as usize);
    let mut position: i32 = 0;

    for row in 0..rows_count as i32 {
        let direction = if rng.gen_bool(0.5) { -1 } else { 1 };
        position = (position + direction).clamp(0, row + 1);
        ball_path.push(position as u8);
    }

    let final_bin = (*ball_path.last().unwrap_or(&0) as usize).min(table.len() - 1);

    Ok(Outcome {
        multiplier_milli: table[final_bin],
        ball_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_coverage() {
        for risk in [RiskLevel::Low, RiskLevel::Medium, RiskLevel::High] {
            for rows in SUPPORTED_ROWS {
                let table = multiplier_table(risk, rows).unwrap();
                assert_eq!(table.len(), rows as usize + 1);
            }
            assert!(multiplier_table(risk, 10).is_none());
        }
    }

    #[test]
    fn test_tables_are_symmetric() {
        for risk in [RiskLevel::Low, RiskLevel::Medium, RiskLevel::High] {
            for rows in SUPPORTED_ROWS {
                let table = multiplier_table(risk, rows).unwrap();
                let reversed: Vec<u32> = table.iter().rev().copied().collect();
                assert_eq!(table, &reversed[..]);
            }
        }
    }

    #[test]
    fn test_simulate_path_shape() {
        for _ in 0..100 {
            let outcome = simulate(RiskLevel::Medium, 12).unwrap();
            assert_eq!(outcome.ball_path.len(), 12);
            // every step lands in a bin that exists at that row
            for (row, &bin) in outcome.ball_path.iter().enumerate() {
                assert!(bin as usize <= row + 1);
            }
            assert!(MEDIUM_12.contains(&outcome.multiplier_milli));
        }
    }

    #[test]
    fn test_unsupported_rows() {
        assert!(matches!(
            simulate(RiskLevel::Low, 9),
            Err(OutcomeError::UnsupportedRows(9))
        ));
        assert!(supports_rows(16));
        assert!(!supports_rows(9));
        assert!(valid_rows(9));
        assert!(!valid_rows(7));
        assert!(!valid_rows(17));
    }
}

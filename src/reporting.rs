use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::brain::SteeringPolicy;
use crate::episode::EpisodeResult;

pub const STATS_FILE: &str = "network_stats.json";
pub const WEIGHTS_FILE: &str = "network_weights.bin";

/// Spread of one generation's fitness scores.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FitnessSummary {
    /// Members that were actually evaluated.
    pub count: usize,
    pub best: u32,
    pub worst: u32,
    pub mean: f64,
    /// Lower median.
    pub median: u32,
}

impl FitnessSummary {
    pub fn from_scores(scores: &[u32]) -> Self {
        let mut sorted = scores.to_vec();
        sorted.sort_unstable();
        let (Some(&worst), Some(&best)) = (sorted.first(), sorted.last()) else {
            return Self::default();
        };
        let total: u64 = sorted.iter().map(|&s| u64::from(s)).sum();
        Self {
            count: sorted.len(),
            best,
            worst,
            mean: total as f64 / sorted.len() as f64,
            median: sorted[(sorted.len() - 1) / 2],
        }
    }
}

/// Statistics of a best-of-run policy, consumed by external reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    /// Level after every change, in order.
    pub levels: Vec<u32>,
    pub max_level: u32,
    pub final_level: u32,
}

impl From<&EpisodeResult> for RunRecord {
    fn from(result: &EpisodeResult) -> Self {
        Self {
            levels: result.trace.iter().map(|s| s.level).collect(),
            max_level: result.max_level,
            final_level: result.final_level,
        }
    }
}

/// Write the stats record and the policy weights into `dir`.
///
/// The stats file is required; a failed weight save is logged and skipped.
pub fn write_run(
    dir: &Path,
    record: &RunRecord,
    policy: &impl SteeringPolicy,
) -> std::io::Result<()> {
    std::fs::create_dir_all(dir)?;
    let json = serde_json::to_string_pretty(record)?;
    std::fs::write(dir.join(STATS_FILE), json)?;

    let weights = dir.join(WEIGHTS_FILE);
    if let Err(e) = policy.save(&weights) {
        log::warn!("failed to save network weights to {}: {e}", weights.display());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::LevelSample;
    use crate::episode::Outcome;

    #[test]
    fn summary_describes_the_scores() {
        let s = FitnessSummary::from_scores(&[40, 12, 25, 31]);
        assert_eq!(s.count, 4);
        assert_eq!(s.best, 40);
        assert_eq!(s.worst, 12);
        assert!((s.mean - 27.0).abs() < 1e-9);
        assert_eq!(s.median, 25);
    }

    #[test]
    fn no_scores_summarise_to_zero() {
        assert_eq!(FitnessSummary::from_scores(&[]), FitnessSummary::default());
    }

    #[test]
    fn run_record_follows_the_level_trace() {
        let result = EpisodeResult {
            outcome: Outcome::TimedOut,
            rounds: 10,
            start_level: 20,
            max_level: 22,
            final_level: 19,
            trace: vec![
                LevelSample { level: 21, tick: 1 },
                LevelSample { level: 22, tick: 4 },
                LevelSample { level: 19, tick: 8 },
            ],
        };
        let record = RunRecord::from(&result);
        assert_eq!(record.levels, vec![21, 22, 19]);
        assert_eq!(record.max_level, 22);
        assert_eq!(record.final_level, 19);
    }
}

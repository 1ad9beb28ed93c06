// All tunable simulation constants in one place.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::brain::PolicyKind;

// Arena
pub const ARENA_WIDTH: f32 = 600.0;
pub const ARENA_HEIGHT: f32 = 600.0;
pub const PARTICLE_COUNT: usize = 3;
pub const KILLER_COUNT: usize = 2;

// Collisions
pub const CAPTURE_RADIUS: f32 = 10.0;
pub const HIT_RADIUS: f32 = 9.0;

// Target scores
pub const CAPTURE_SCORE: f32 = 1.0;
pub const PARTICLE_PULL: f32 = 0.2;
pub const HIT_SCORE: f32 = -1.0;
pub const KILLER_PUSH: f32 = -0.2;

/// Floor used wherever a vector or a score sum is divided by its magnitude.
pub const NORM_EPSILON: f32 = 1e-6;

// Player
pub const PLAYER_START_LEVEL: u32 = 20;
pub const PLAYER_SPEED: f32 = 8.0;

// Killer
pub const KILLER_START_LEVEL: u32 = 1;
pub const KILLER_LEVEL_STEP: u32 = 3;

// Policy
pub const HIDDEN_1: usize = 32;
pub const HIDDEN_2: usize = 8;
pub const LEARNING_RATE: f32 = 1e-3;
pub const MAX_GRAD_NORM: f32 = 1.0;
pub const OUTPUT_INIT_RANGE: f32 = 0.01;
/// Hidden widths drawn from when a population is initialised with diversity.
pub const HIDDEN_WIDTH_CHOICES: [usize; 6] = [2, 4, 8, 16, 32, 64];

// Episode
pub const ROUND_LIMIT: u64 = 12_000;
pub const EXPLORATION_RATE: f32 = 0.05;
pub const EXPLORATION_NOISE: f32 = 0.3;

// Evolution
pub const POPULATION_SIZE: usize = 20;
pub const GENERATIONS: usize = 4;
pub const ELITE_FRACTION: f32 = 0.2;
pub const MUTATION_RATE: f32 = 0.05;
pub const EVAL_STEPS: u64 = 500;
pub const SURVIVOR_CUTOFF: u32 = 25;

// Viewer
pub const TICK_INTERVAL: f32 = 0.015;

pub const DEFAULT_SEED: u64 = 42;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("headless episodes need an active policy: nothing else can move the player")]
    HeadlessWithoutPolicy,
    #[error("invalid value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

/// Everything a single episode needs: arena, entities, policy shape and
/// episode control.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    pub width: f32,
    pub height: f32,
    pub particles: usize,
    pub killers: usize,
    pub player_speed: f32,
    pub start_level: u32,
    pub capture_radius: f32,
    pub hit_radius: f32,
    /// Killers climb their own level path every time they hit the player.
    pub killers_grow: bool,
    pub hidden1: usize,
    pub hidden2: usize,
    pub learning_rate: f32,
    pub policy: PolicyKind,
    pub round_limit: u64,
    pub exploration_rate: f32,
    pub exploration_noise: f32,
    pub use_policy: bool,
    /// No renderer and no input device is attached.
    pub headless: bool,
    pub seed: u64,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            width: ARENA_WIDTH,
            height: ARENA_HEIGHT,
            particles: PARTICLE_COUNT,
            killers: KILLER_COUNT,
            player_speed: PLAYER_SPEED,
            start_level: PLAYER_START_LEVEL,
            capture_radius: CAPTURE_RADIUS,
            hit_radius: HIT_RADIUS,
            killers_grow: false,
            hidden1: HIDDEN_1,
            hidden2: HIDDEN_2,
            learning_rate: LEARNING_RATE,
            policy: PolicyKind::default(),
            round_limit: ROUND_LIMIT,
            exploration_rate: EXPLORATION_RATE,
            exploration_noise: EXPLORATION_NOISE,
            use_policy: true,
            headless: true,
            seed: DEFAULT_SEED,
        }
    }
}

impl SimConfig {
    /// Number of cells in the state vector: the player plus every other entity.
    pub fn cell_count(&self) -> usize {
        1 + self.particles + self.killers
    }

    /// Dimensionality of the normalized state vector fed to the policy.
    pub fn input_dim(&self) -> usize {
        2 * self.cell_count()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.headless && !self.use_policy {
            return Err(ConfigError::HeadlessWithoutPolicy);
        }
        if !(self.width.is_finite() && self.width > 0.0) {
            return Err(invalid("width", format!("{} is not a positive size", self.width)));
        }
        if !(self.height.is_finite() && self.height > 0.0) {
            return Err(invalid("height", format!("{} is not a positive size", self.height)));
        }
        if self.hidden1 == 0 || self.hidden2 == 0 {
            return Err(invalid("hidden1/hidden2", "hidden layers need at least one unit"));
        }
        if !(0.0..=1.0).contains(&self.exploration_rate) {
            return Err(invalid("exploration_rate", "must be a probability"));
        }
        if !(self.exploration_noise.is_finite() && self.exploration_noise >= 0.0) {
            return Err(invalid("exploration_noise", "must be a non-negative amplitude"));
        }
        if !(self.player_speed.is_finite() && self.player_speed >= 0.0) {
            return Err(invalid("player_speed", "must be finite and not negative"));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate >= 0.0) {
            return Err(invalid("learning_rate", "must be finite and not negative"));
        }
        Ok(())
    }
}

/// How the engine decides which members seed the next generation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode")]
pub enum Selection {
    /// Keep the top `elite_fraction` of the ranked population.
    Elitist,
    /// Keep every member whose episode reached `cutoff` and ended alive.
    Threshold { cutoff: u32 },
}

impl Default for Selection {
    fn default() -> Self {
        Self::Elitist
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EvolutionConfig {
    pub population_size: usize,
    pub generations: usize,
    pub elite_fraction: f32,
    pub mutation_rate: f32,
    /// Round limit of every evaluation episode.
    pub eval_steps: u64,
    pub selection: Selection,
    /// Draw each member's hidden widths from [`HIDDEN_WIDTH_CHOICES`].
    pub vary_hidden_widths: bool,
    /// Evaluate members on the rayon thread pool.
    pub parallel: bool,
}

impl Default for EvolutionConfig {
    fn default() -> Self {
        Self {
            population_size: POPULATION_SIZE,
            generations: GENERATIONS,
            elite_fraction: ELITE_FRACTION,
            mutation_rate: MUTATION_RATE,
            eval_steps: EVAL_STEPS,
            selection: Selection::Elitist,
            vary_hidden_widths: false,
            parallel: false,
        }
    }
}

impl EvolutionConfig {
    /// Number of elites kept by elitist selection (at least one).
    pub fn elite_count(&self) -> usize {
        ((self.population_size as f32 * self.elite_fraction) as usize)
            .max(1)
            .min(self.population_size)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.population_size == 0 {
            return Err(invalid("population_size", "population cannot be empty"));
        }
        if self.generations == 0 {
            return Err(invalid("generations", "at least one generation is required"));
        }
        if !(self.elite_fraction > 0.0 && self.elite_fraction <= 1.0) {
            return Err(invalid("elite_fraction", "must lie in (0, 1]"));
        }
        if !(self.mutation_rate.is_finite() && self.mutation_rate >= 0.0) {
            return Err(invalid("mutation_rate", "must be a non-negative scale"));
        }
        if self.eval_steps == 0 {
            return Err(invalid("eval_steps", "episodes need at least one round"));
        }
        Ok(())
    }
}

/// Combined configuration file layout.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub sim: SimConfig,
    pub evolution: EvolutionConfig,
}

impl RunConfig {
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn from_json_str(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.sim.validate()?;
        self.evolution.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headless_run_without_policy_is_rejected() {
        let config = SimConfig {
            use_policy: false,
            headless: true,
            ..SimConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::HeadlessWithoutPolicy)
        ));

        let interactive = SimConfig {
            use_policy: false,
            headless: false,
            ..SimConfig::default()
        };
        assert!(interactive.validate().is_ok());
    }

    #[test]
    fn input_dim_counts_player_and_all_entities() {
        let config = SimConfig {
            particles: 3,
            killers: 2,
            ..SimConfig::default()
        };
        assert_eq!(config.input_dim(), 12);
    }

    #[test]
    fn elite_count_never_drops_below_one() {
        let config = EvolutionConfig {
            population_size: 3,
            elite_fraction: 0.1,
            ..EvolutionConfig::default()
        };
        assert_eq!(config.elite_count(), 1);

        let half = EvolutionConfig {
            population_size: 10,
            elite_fraction: 0.5,
            ..EvolutionConfig::default()
        };
        assert_eq!(half.elite_count(), 5);
    }

    #[test]
    fn partial_json_overrides_only_named_fields() {
        let config = RunConfig::from_json_str(
            r#"{ "sim": { "particles": 5 }, "evolution": { "selection": { "mode": "threshold", "cutoff": 30 } } }"#,
        )
        .unwrap();
        assert_eq!(config.sim.particles, 5);
        assert_eq!(config.sim.killers, KILLER_COUNT);
        assert_eq!(config.evolution.selection, Selection::Threshold { cutoff: 30 });
        assert_eq!(config.evolution.population_size, POPULATION_SIZE);
    }

    #[test]
    fn broken_scalars_are_rejected_by_name() {
        let base = SimConfig::default;
        let cases = [
            (
                "exploration_noise",
                SimConfig {
                    exploration_noise: -0.3,
                    exploration_rate: 1.0,
                    ..base()
                },
            ),
            (
                "exploration_noise",
                SimConfig {
                    exploration_noise: f32::NAN,
                    ..base()
                },
            ),
            (
                "player_speed",
                SimConfig {
                    player_speed: f32::NAN,
                    ..base()
                },
            ),
            (
                "learning_rate",
                SimConfig {
                    learning_rate: f32::NAN,
                    ..base()
                },
            ),
            (
                "learning_rate",
                SimConfig {
                    learning_rate: -1e-3,
                    ..base()
                },
            ),
        ];
        for (name, config) in cases {
            match config.validate() {
                Err(ConfigError::Invalid { field, .. }) => assert_eq!(field, name),
                other => panic!("{name}: expected rejection, got {other:?}"),
            }
        }

        let silent = SimConfig {
            exploration_noise: 0.0,
            ..SimConfig::default()
        };
        assert!(silent.validate().is_ok());
    }

    #[test]
    fn zero_population_is_invalid() {
        let config = EvolutionConfig {
            population_size: 0,
            ..EvolutionConfig::default()
        };
        assert!(config.validate().is_err());
    }
}

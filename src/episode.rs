use ::rand::{Rng, SeedableRng};
use macroquad::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::arena::{Arena, TickOutput};
use crate::brain::SteeringPolicy;
use crate::config::{ConfigError, SimConfig};
use crate::entity::LevelSample;
use crate::world;

/// Keeps the exploration stream apart from the arena's entity stream.
const EXPLORATION_SEED_SALT: u64 = 0x9E37_79B9_7F4A_7C15;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Running,
    /// The player's level reached zero.
    Died,
    /// The round limit was reached with the player still alive.
    TimedOut,
}

/// Summary of a finished (or interrupted) episode.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EpisodeResult {
    pub outcome: Outcome,
    pub rounds: u64,
    pub start_level: u32,
    pub max_level: u32,
    pub final_level: u32,
    pub trace: Vec<LevelSample>,
}

impl EpisodeResult {
    /// Fitness used by elitist selection.
    pub fn fitness(&self) -> u32 {
        self.max_level + self.final_level
    }

    /// Survivor rule of threshold selection.
    pub fn is_survivor(&self, cutoff: u32) -> bool {
        is_survivor(self.max_level, self.final_level, cutoff)
    }
}

pub fn is_survivor(max_level: u32, final_level: u32, cutoff: u32) -> bool {
    max_level >= cutoff && final_level >= 1
}

/// Drives an [`Arena`] tick by tick with one borrowed policy.
pub struct Episode<'p, P: SteeringPolicy> {
    pub arena: Arena,
    policy: &'p mut P,
    rng: ChaCha8Rng,
    round: u64,
    round_limit: u64,
    use_policy: bool,
    exploration_rate: f32,
    exploration_noise: f32,
    start_level: u32,
    outcome: Outcome,
    last_tick: Option<TickOutput>,
}

impl<'p, P: SteeringPolicy> Episode<'p, P> {
    /// Validates `config` before any simulation happens.
    pub fn new(config: &SimConfig, policy: &'p mut P, seed: u64) -> Result<Self, ConfigError> {
        config.validate()?;
        let expected = config.input_dim();
        if config.use_policy && policy.shape().input != expected {
            return Err(ConfigError::Invalid {
                field: "particles/killers",
                reason: format!(
                    "policy expects {} inputs but the arena produces {expected}",
                    policy.shape().input
                ),
            });
        }
        Ok(Self {
            arena: Arena::new(config, seed),
            policy,
            rng: ChaCha8Rng::seed_from_u64(seed ^ EXPLORATION_SEED_SALT),
            round: 0,
            round_limit: config.round_limit,
            use_policy: config.use_policy,
            exploration_rate: config.exploration_rate,
            exploration_noise: config.exploration_noise,
            start_level: config.start_level,
            outcome: Outcome::Running,
            last_tick: None,
        })
    }

    pub fn outcome(&self) -> Outcome {
        self.outcome
    }

    pub fn round(&self) -> u64 {
        self.round
    }

    pub fn is_finished(&self) -> bool {
        self.outcome != Outcome::Running
    }

    pub fn last_tick(&self) -> Option<&TickOutput> {
        self.last_tick.as_ref()
    }

    pub fn policy(&self) -> &P {
        &*self.policy
    }

    /// One round. `manual` is an externally supplied direction (keyboard)
    /// applied before the tick; it is moved by the player's speed as-is.
    pub fn step(&mut self, manual: Option<Vec2>) -> Outcome {
        if self.is_finished() {
            return self.outcome;
        }
        if self.round >= self.round_limit {
            self.outcome = Outcome::TimedOut;
            return self.outcome;
        }
        self.round += 1;

        if let Some(direction) = manual {
            self.arena.move_player(direction);
        }

        let tick = self.arena.step();
        if self.use_policy {
            let raw = self.policy.train_step(&tick.state, tick.target);
            let direction = self.explore(raw);
            self.arena.move_player(direction);
        }
        self.last_tick = Some(tick);

        if self.arena.player.is_dead() {
            self.outcome = Outcome::Died;
            log::debug!("player died after {} rounds", self.round);
        } else if self.round >= self.round_limit {
            self.outcome = Outcome::TimedOut;
            log::debug!("episode timed out at level {}", self.arena.player.level);
        }
        self.outcome
    }

    /// Occasionally perturb the raw prediction, then normalize it.
    fn explore(&mut self, raw: Vec2) -> Vec2 {
        let mut direction = raw;
        if self.rng.gen::<f32>() < self.exploration_rate {
            let n = self.exploration_noise;
            direction += vec2(self.rng.gen_range(-n..=n), self.rng.gen_range(-n..=n));
        }
        world::normalize_or_zero(direction)
    }

    /// Run until death or timeout.
    pub fn run(mut self) -> EpisodeResult {
        while self.step(None) == Outcome::Running {}
        self.result()
    }

    pub fn result(&self) -> EpisodeResult {
        let player = &self.arena.player;
        EpisodeResult {
            outcome: self.outcome,
            rounds: self.round,
            start_level: self.start_level,
            max_level: player.max_level(self.start_level),
            final_level: player.level,
            trace: player.trace.clone(),
        }
    }
}

use ::rand::Rng;
use macroquad::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config;
use crate::world::World;

/// Largest outline/fill a palette grows to before switching colour.
const PALETTE_MAX_STEP: u8 = 10;
const PLAYER_MIN_SIZE: u8 = 3;

/// Cosmetic drawing attributes. Nothing in the simulation reads these.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Palette {
    pub size: u8,
    pub fill: u8,
    pub rgb: [u8; 3],
}

impl Palette {
    pub fn color(&self) -> Color {
        Color::from_rgba(self.rgb[0], self.rgb[1], self.rgb[2], 255)
    }
}

/// One entry of the level-vs-time trace.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelSample {
    pub level: u32,
    pub tick: u64,
}

/// Reward source wandering by a small bounded random walk.
#[derive(Clone, Debug)]
pub struct Particle {
    pub pos: Vec2,
    pub palette: Palette,
}

impl Particle {
    pub fn spawn(world: &World, rng: &mut impl Rng) -> Self {
        let margin = 20.0_f32.min(world.width * 0.5);
        let pos = world.wrap(vec2(
            rng.gen_range(margin..=world.width - margin),
            rng.gen_range(0.0..world.height),
        ));
        Self {
            pos,
            palette: Palette {
                size: 4,
                fill: 3,
                rgb: [rng.gen(), rng.gen(), rng.gen()],
            },
        }
    }

    pub fn move_random(&mut self, world: &World, rng: &mut impl Rng) {
        let step = vec2(
            rng.gen_range(-4..=4) as f32,
            rng.gen_range(-4..=4) as f32,
        );
        self.pos = world.offset(self.pos, step);
    }

    pub fn respawn(&mut self, world: &World, rng: &mut impl Rng) {
        self.pos = world.random_position(rng);
    }
}

/// Bias of a killer's random walk.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum KillerDrift {
    Left,
    Right,
    Jitter,
    Down,
    Up,
}

impl KillerDrift {
    /// Round-robin order used when populating an arena.
    pub const CYCLE: [KillerDrift; 5] = [
        KillerDrift::Left,
        KillerDrift::Right,
        KillerDrift::Jitter,
        KillerDrift::Down,
        KillerDrift::Up,
    ];

    pub fn for_index(index: usize) -> Self {
        Self::CYCLE[index % Self::CYCLE.len()]
    }

    fn step(self, rng: &mut impl Rng) -> Vec2 {
        match self {
            KillerDrift::Left => vec2(rng.gen_range(-9..=-5) as f32, jitter(rng)),
            KillerDrift::Right => vec2(rng.gen_range(5..9) as f32, jitter(rng)),
            KillerDrift::Up => vec2(jitter(rng), rng.gen_range(-9..=-5) as f32),
            KillerDrift::Down => vec2(jitter(rng), rng.gen_range(5..=10) as f32),
            KillerDrift::Jitter => vec2(jitter(rng), jitter(rng)),
        }
    }
}

fn jitter(rng: &mut impl Rng) -> f32 {
    rng.gen_range(-4..4) as f32
}

/// Threat source. Touching the player costs it `level` levels.
#[derive(Clone, Debug)]
pub struct Killer {
    pub pos: Vec2,
    pub drift: KillerDrift,
    pub level: u32,
    pub palette: Palette,
}

impl Killer {
    pub fn spawn(world: &World, drift: KillerDrift, rng: &mut impl Rng) -> Self {
        let pos = world.wrap(vec2(
            rng.gen_range(world.width * 0.8..=world.width),
            rng.gen_range(0.0..world.height),
        ));
        Self {
            pos,
            drift,
            level: config::KILLER_START_LEVEL,
            palette: Palette {
                size: 3,
                fill: 1,
                rgb: [255, 0, 0],
            },
        }
    }

    pub fn move_random(&mut self, world: &World, rng: &mut impl Rng) {
        let step = self.drift.step(rng);
        self.pos = world.offset(self.pos, step);
    }

    /// Climb the killer's level path. Once the palette has saturated to green
    /// the killer stops growing.
    pub fn level_up(&mut self) {
        let p = &mut self.palette;
        if p.rgb[1] == 255 {
            return;
        }
        self.level += config::KILLER_LEVEL_STEP;
        if p.size < PALETTE_MAX_STEP {
            p.size += 1;
        } else if p.fill < PALETTE_MAX_STEP {
            p.fill += 1;
        } else {
            p.rgb = [0, 255, 0];
        }
    }
}

/// The learning agent's body. The policy steering it lives with the episode.
#[derive(Clone, Debug)]
pub struct Player {
    pub pos: Vec2,
    pub level: u32,
    pub speed: f32,
    pub palette: Palette,
    pub trace: Vec<LevelSample>,
}

impl Player {
    pub fn new(world: &World, start_level: u32, speed: f32) -> Self {
        Self {
            pos: world.wrap(vec2(10.0, (world.height * 0.5).floor())),
            level: start_level,
            speed,
            palette: Palette {
                size: PLAYER_MIN_SIZE,
                fill: 1,
                rgb: [255, 255, 0],
            },
            trace: Vec::new(),
        }
    }

    pub fn is_dead(&self) -> bool {
        self.level == 0
    }

    pub fn level_up(&mut self, tick: u64) {
        self.level += 1;
        self.trace.push(LevelSample {
            level: self.level,
            tick,
        });
        if self.level % 10 != 0 {
            return;
        }
        let p = &mut self.palette;
        if p.size < PALETTE_MAX_STEP {
            p.size += 1;
        } else if p.fill < PALETTE_MAX_STEP {
            p.fill += 1;
        } else if p.rgb[0] > 10 {
            p.rgb[0] -= 2;
            p.rgb[1] -= 2;
        } else {
            p.rgb = [0, p.rgb[1], 255];
        }
    }

    /// Lose `amount` levels, clamped at zero. A dead player ignores further hits.
    pub fn level_down(&mut self, amount: u32, tick: u64) {
        if self.is_dead() {
            return;
        }
        self.level = self.level.saturating_sub(amount);
        self.trace.push(LevelSample {
            level: self.level,
            tick,
        });
        let p = &mut self.palette;
        if p.rgb[0] < 250 {
            p.rgb[0] += 2;
            p.rgb[1] = p.rgb[1].saturating_add(2);
        } else if p.fill > 1 {
            p.fill -= 1;
        } else if p.size > PLAYER_MIN_SIZE {
            p.size -= 1;
        } else {
            p.rgb[2] = 0;
        }
    }

    /// Highest level this player has held, counting the starting level.
    pub fn max_level(&self, start_level: u32) -> u32 {
        self.trace
            .iter()
            .map(|s| s.level)
            .fold(start_level, u32::max)
    }

    /// Step by `speed * direction`, wrapped into the arena.
    pub fn advance(&mut self, world: &World, direction: Vec2) {
        self.pos = world.offset(self.pos, direction * self.speed);
    }
}

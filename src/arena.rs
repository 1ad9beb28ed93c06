use ::rand::SeedableRng;
use macroquad::prelude::*;
use rand_chacha::ChaCha8Rng;

use crate::config::{self, SimConfig};
use crate::entity::{Killer, KillerDrift, Particle, Player};
use crate::world::{self, World};

/// Everything one tick produces for the policy and for diagnostics.
#[derive(Clone, Debug)]
pub struct TickOutput {
    /// Normalized state: player position, then every entity's displacement.
    pub state: Vec<f32>,
    /// Unit steering target (zero when every pull cancels).
    pub target: Vec2,
    /// Per-entity scores, particles first, then killers.
    pub scores: Vec<f32>,
    pub captures: u32,
    pub hits: u32,
}

/// Owns the player and every particle/killer, plus the random source that
/// moves them.
pub struct Arena {
    pub world: World,
    pub player: Player,
    pub particles: Vec<Particle>,
    pub killers: Vec<Killer>,
    pub rng: ChaCha8Rng,
    pub tick_count: u64,
    capture_radius: f32,
    hit_radius: f32,
    killers_grow: bool,
}

impl Arena {
    pub fn new(config: &SimConfig, seed: u64) -> Self {
        let world = World::new(config.width, config.height);
        let mut rng = ChaCha8Rng::seed_from_u64(seed);

        let particles = (0..config.particles)
            .map(|_| Particle::spawn(&world, &mut rng))
            .collect();
        let killers = (0..config.killers)
            .map(|i| Killer::spawn(&world, KillerDrift::for_index(i), &mut rng))
            .collect();

        Self {
            world,
            player: Player::new(&world, config.start_level, config.player_speed),
            particles,
            killers,
            rng,
            tick_count: 0,
            capture_radius: config.capture_radius,
            hit_radius: config.hit_radius,
            killers_grow: config.killers_grow,
        }
    }

    /// Length of the state vector.
    pub fn state_len(&self) -> usize {
        2 * (1 + self.particles.len() + self.killers.len())
    }

    /// Advance one tick: resolve collisions, build the state vector and the
    /// steering target, then walk every particle and killer one step.
    pub fn step(&mut self) -> TickOutput {
        let tick = self.tick_count;
        let diag = self.world.diagonal();
        let origin = self.player.pos;

        let mut state = Vec::with_capacity(self.state_len());
        state.push(origin.x / self.world.width);
        state.push(origin.y / self.world.height);

        let entity_count = self.particles.len() + self.killers.len();
        let mut scores = Vec::with_capacity(entity_count);
        let mut displacements = Vec::with_capacity(entity_count);
        let mut captures = 0;
        let mut hits = 0;

        for particle in &mut self.particles {
            let score = if self.world.distance(origin, particle.pos) < self.capture_radius {
                particle.respawn(&self.world, &mut self.rng);
                self.player.level_up(tick);
                captures += 1;
                config::CAPTURE_SCORE
            } else {
                config::PARTICLE_PULL
            };
            let rel = self.world.delta(origin, particle.pos) / diag;
            state.extend([rel.x, rel.y]);
            displacements.push(rel);
            scores.push(score);
            particle.move_random(&self.world, &mut self.rng);
        }

        for killer in &mut self.killers {
            let score = if self.world.distance(origin, killer.pos) < self.hit_radius {
                self.player.level_down(killer.level, tick);
                if self.killers_grow {
                    killer.level_up();
                }
                hits += 1;
                config::HIT_SCORE
            } else {
                config::KILLER_PUSH
            };
            let rel = self.world.delta(origin, killer.pos) / diag;
            state.extend([rel.x, rel.y]);
            displacements.push(rel);
            scores.push(score);
            killer.move_random(&self.world, &mut self.rng);
        }

        self.tick_count += 1;

        TickOutput {
            target: steering_target(&displacements, &scores),
            state,
            scores,
            captures,
            hits,
        }
    }

    /// Move the player by `speed * direction`, wrapped into the arena.
    pub fn move_player(&mut self, direction: Vec2) {
        self.player.advance(&self.world, direction);
    }
}

/// Potential-field target: `sum(d_i * s_i) / (sum|s_i| + eps)`, then scaled
/// to unit length with the same epsilon floor.
pub fn steering_target(displacements: &[Vec2], scores: &[f32]) -> Vec2 {
    let total: f32 = scores.iter().map(|s| s.abs()).sum::<f32>() + config::NORM_EPSILON;
    let pull: Vec2 = displacements
        .iter()
        .zip(scores)
        .map(|(d, s)| *d * *s)
        .sum();
    world::normalize_or_zero(pull / total)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> SimConfig {
        SimConfig {
            particles: 3,
            killers: 2,
            ..SimConfig::default()
        }
    }

    #[test]
    fn state_vector_layout_matches_entities() {
        let mut arena = Arena::new(&config(), 1);
        let player = arena.player.pos;
        let first = arena.particles[0].pos;
        let diag = arena.world.diagonal();

        let out = arena.step();
        assert_eq!(out.state.len(), config().input_dim());
        assert!((out.state[0] - player.x / 600.0).abs() < 1e-6);
        assert!((out.state[1] - player.y / 600.0).abs() < 1e-6);
        assert!((out.state[2] - (first.x - player.x) / diag).abs() < 1e-6);
        assert!((out.state[3] - (first.y - player.y) / diag).abs() < 1e-6);
        assert_eq!(out.scores.len(), 5);
    }

    #[test]
    fn particle_on_player_is_captured_once() {
        let mut arena = Arena::new(&config(), 2);
        // Park the others far away so only one collision can happen.
        for p in &mut arena.particles {
            p.pos = vec2(500.0, 500.0);
        }
        for k in &mut arena.killers {
            k.pos = vec2(300.0, 50.0);
        }
        arena.particles[1].pos = arena.player.pos;
        let level = arena.player.level;

        let out = arena.step();
        assert_eq!(out.scores[1], config::CAPTURE_SCORE);
        assert_eq!(out.captures, 1);
        assert_eq!(arena.player.level, level + 1);
        assert_eq!(arena.player.trace.len(), 1);
    }

    #[test]
    fn killer_hit_levels_player_down_by_killer_level() {
        let grow = SimConfig {
            killers_grow: true,
            ..config()
        };
        let mut arena = Arena::new(&grow, 3);
        for p in &mut arena.particles {
            p.pos = vec2(500.0, 500.0);
        }
        arena.killers[1].pos = vec2(300.0, 50.0);
        arena.killers[0].pos = arena.player.pos + vec2(3.0, 0.0);
        arena.killers[0].level = 5;

        let out = arena.step();
        assert_eq!(out.scores[3], config::HIT_SCORE);
        assert_eq!(out.scores[4], config::KILLER_PUSH);
        assert_eq!(out.hits, 1);
        assert_eq!(arena.player.level, config::PLAYER_START_LEVEL - 5);
        assert_eq!(arena.killers[0].level, 8);
    }

    #[test]
    fn target_is_unit_length_when_scores_are_non_zero() {
        let mut arena = Arena::new(&config(), 4);
        let mut checked = 0;
        for _ in 0..200 {
            let out = arena.step();
            assert!(out.scores.iter().any(|s| *s != 0.0));
            let total: f32 = out.scores.iter().map(|s| s.abs()).sum();
            let pull: Vec2 = out.state[2..]
                .chunks_exact(2)
                .zip(&out.scores)
                .map(|(d, s)| vec2(d[0], d[1]) * *s)
                .sum();
            // Skip ticks where the pulls cancel almost exactly.
            if pull.length() / total > 1e-2 {
                assert!((out.target.length() - 1.0).abs() < 1e-3, "{:?}", out.target);
                checked += 1;
            }
            arena.move_player(out.target);
        }
        assert!(checked > 100);
    }

    #[test]
    fn target_points_towards_particles_and_away_from_killers() {
        let toward = steering_target(&[vec2(0.1, 0.0)], &[config::PARTICLE_PULL]);
        assert!(toward.x > 0.99);
        let away = steering_target(&[vec2(0.0, 0.1)], &[config::KILLER_PUSH]);
        assert!(away.y < -0.99);
    }

    #[test]
    fn empty_arena_yields_zero_target() {
        assert_eq!(steering_target(&[], &[]), Vec2::ZERO);
        let empty = SimConfig {
            particles: 0,
            killers: 0,
            ..SimConfig::default()
        };
        let mut arena = Arena::new(&empty, 5);
        let out = arena.step();
        assert_eq!(out.target, Vec2::ZERO);
        assert_eq!(out.state.len(), 2);
    }

    #[test]
    fn every_entity_stays_inside_the_arena() {
        let small = SimConfig {
            width: 60.0,
            height: 40.0,
            particles: 6,
            killers: 5,
            ..SimConfig::default()
        };
        let mut arena = Arena::new(&small, 6);
        for _ in 0..1_000 {
            let out = arena.step();
            arena.move_player(out.target);
            let positions = std::iter::once(arena.player.pos)
                .chain(arena.particles.iter().map(|p| p.pos))
                .chain(arena.killers.iter().map(|k| k.pos));
            for pos in positions {
                assert!((0.0..60.0).contains(&pos.x) && (0.0..40.0).contains(&pos.y));
            }
        }
    }
}

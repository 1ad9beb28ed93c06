use ::rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use crate::brain::{Policy, SteeringPolicy};
use crate::config::{ConfigError, EvolutionConfig, Selection, SimConfig};
use crate::episode::{Episode, EpisodeResult};
use crate::reporting::FitnessSummary;

/// Where the engine is in its generation cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Initialized,
    Evaluating,
    Selecting,
    Reproducing,
    Done,
    /// Threshold selection found no survivors.
    Aborted,
}

/// One population slot: a policy and, once evaluated, its episode.
#[derive(Clone, Debug)]
pub struct Member<P> {
    pub policy: P,
    pub result: Option<EpisodeResult>,
}

impl<P> Member<P> {
    pub fn new(policy: P) -> Self {
        Self {
            policy,
            result: None,
        }
    }

    /// `max_level + final_level` of the last evaluation.
    pub fn fitness(&self) -> Option<u32> {
        self.result.as_ref().map(EpisodeResult::fitness)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct GenerationReport {
    pub generation: usize,
    /// Scores of the evaluated members, before selection.
    pub fitness: FitnessSummary,
    /// Members kept by selection.
    pub selected: usize,
}

pub enum EvolutionOutcome<P> {
    /// Members kept by the last selection, best first.
    Completed {
        ranked: Vec<Member<P>>,
        history: Vec<GenerationReport>,
    },
    NoSurvivors {
        generation: usize,
        history: Vec<GenerationReport>,
    },
}

/// Generational search over steering policies: evaluate, rank, keep elites,
/// refill by mutating clones of random elites.
pub struct Evolution<P: SteeringPolicy> {
    config: EvolutionConfig,
    sim: SimConfig,
    population: Vec<Member<P>>,
    rng: ChaCha8Rng,
    generation: usize,
    phase: Phase,
    history: Vec<GenerationReport>,
}

impl<P: SteeringPolicy> Evolution<P> {
    /// Build an engine around `policies`, which must fill the population.
    /// Evaluation is always headless, so `sim` must keep the policy active.
    pub fn new(
        config: EvolutionConfig,
        sim: &SimConfig,
        policies: Vec<P>,
        seed: u64,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let sim = SimConfig {
            headless: true,
            round_limit: config.eval_steps,
            ..sim.clone()
        };
        sim.validate()?;

        if policies.len() != config.population_size {
            return Err(ConfigError::Invalid {
                field: "population_size",
                reason: format!(
                    "expected {} policies, got {}",
                    config.population_size,
                    policies.len()
                ),
            });
        }
        let expected = sim.input_dim();
        if let Some(bad) = policies.iter().find(|p| p.shape().input != expected) {
            return Err(ConfigError::Invalid {
                field: "particles/killers",
                reason: format!(
                    "policy expects {} inputs but the arena produces {expected}",
                    bad.shape().input
                ),
            });
        }

        Ok(Self {
            config,
            sim,
            population: policies.into_iter().map(Member::new).collect(),
            rng: ChaCha8Rng::seed_from_u64(seed),
            generation: 0,
            phase: Phase::Initialized,
            history: Vec::new(),
        })
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn generation(&self) -> usize {
        self.generation
    }

    pub fn population(&self) -> &[Member<P>] {
        &self.population
    }

    pub fn history(&self) -> &[GenerationReport] {
        &self.history
    }

    /// Run every member through one episode. Seeds are drawn up front so the
    /// parallel and sequential paths see identical randomness.
    pub fn evaluate(&mut self) {
        self.phase = Phase::Evaluating;
        let seeds: Vec<u64> = self.population.iter().map(|_| self.rng.gen()).collect();
        let sim = &self.sim;

        if self.config.parallel {
            self.population
                .par_iter_mut()
                .zip(seeds.par_iter())
                .for_each(|(member, seed)| evaluate_member(sim, member, *seed));
        } else {
            for (member, seed) in self.population.iter_mut().zip(&seeds) {
                evaluate_member(sim, member, *seed);
            }
        }
    }

    /// Rank by fitness (stable, best first) and keep the selected members.
    /// Returns how many were kept.
    pub fn select(&mut self) -> usize {
        self.phase = Phase::Selecting;
        self.population.sort_by(|a, b| b.fitness().cmp(&a.fitness()));

        let scores: Vec<u32> = self.population.iter().filter_map(Member::fitness).collect();

        match self.config.selection {
            Selection::Elitist => self.population.truncate(self.config.elite_count()),
            Selection::Threshold { cutoff } => self
                .population
                .retain(|m| m.result.as_ref().is_some_and(|r| r.is_survivor(cutoff))),
        }

        let report = GenerationReport {
            generation: self.generation,
            fitness: FitnessSummary::from_scores(&scores),
            selected: self.population.len(),
        };
        log::info!(
            "generation {}: best {} mean {:.1} median {}, kept {}",
            report.generation + 1,
            report.fitness.best,
            report.fitness.mean,
            report.fitness.median,
            report.selected
        );
        self.history.push(report);
        self.population.len()
    }

    /// Refill the population with mutated clones of randomly chosen elites.
    /// Elites themselves stay unmutated.
    pub fn reproduce(&mut self) {
        self.phase = Phase::Reproducing;
        let elites = self.population.len();
        if elites == 0 {
            return;
        }
        while self.population.len() < self.config.population_size {
            let parent = self.rng.gen_range(0..elites);
            let mut child = self.population[parent].policy.copy();
            child.mutate(self.config.mutation_rate, &mut self.rng);
            self.population.push(Member::new(child));
        }
    }

    /// Evaluate, select and (unless this is the last generation) reproduce.
    /// Returns `false` when selection left nobody.
    pub fn step_generation(&mut self) -> bool {
        log::info!(
            "generation {}/{}: evaluating {} members",
            self.generation + 1,
            self.config.generations,
            self.population.len()
        );
        self.evaluate();
        if self.select() == 0 {
            self.phase = Phase::Aborted;
            log::warn!(
                "no survivors in generation {}, stopping",
                self.generation + 1
            );
            return false;
        }
        if self.generation + 1 < self.config.generations {
            self.reproduce();
            self.generation += 1;
        } else {
            self.phase = Phase::Done;
        }
        true
    }

    pub fn run(mut self) -> EvolutionOutcome<P> {
        while self.phase != Phase::Done {
            if !self.step_generation() {
                return EvolutionOutcome::NoSurvivors {
                    generation: self.generation,
                    history: self.history,
                };
            }
        }
        EvolutionOutcome::Completed {
            ranked: self.population,
            history: self.history,
        }
    }
}

impl Evolution<Policy> {
    /// Fresh population of independently initialised policies.
    pub fn from_config(
        config: EvolutionConfig,
        sim: &SimConfig,
        seed: u64,
    ) -> Result<Self, ConfigError> {
        let mut init_rng = ChaCha8Rng::seed_from_u64(seed);
        let policies = (0..config.population_size)
            .map(|_| {
                if config.vary_hidden_widths {
                    Policy::with_random_widths(sim, &mut init_rng)
                } else {
                    Policy::from_config(sim, &mut init_rng)
                }
            })
            .collect();
        Self::new(config, sim, policies, init_rng.gen())
    }
}

fn evaluate_member<P: SteeringPolicy>(sim: &SimConfig, member: &mut Member<P>, seed: u64) {
    member.result = match Episode::new(sim, &mut member.policy, seed) {
        Ok(episode) => Some(episode.run()),
        Err(e) => {
            log::error!("skipping member: {e}");
            None
        }
    };
}

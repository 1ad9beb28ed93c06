use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use cellsim::config::{RunConfig, Selection};
use cellsim::reporting::{self, RunRecord};
use cellsim::{Evolution, EvolutionOutcome, PolicyKind, SteeringPolicy};

/// Evolve steering policies headlessly and keep the best one.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON run configuration; missing fields keep their defaults
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory receiving the stats and weights of the best policy
    #[arg(short, long, default_value = "networks")]
    out: PathBuf,

    #[arg(long)]
    population: Option<usize>,

    #[arg(long)]
    generations: Option<usize>,

    /// Rounds per evaluation episode
    #[arg(long)]
    steps: Option<u64>,

    /// Keep only members that reached this level and ended alive
    #[arg(long)]
    cutoff: Option<u32>,

    #[arg(long)]
    policy: Option<PolicyKind>,

    /// Draw each member's hidden widths at random
    #[arg(long)]
    vary_widths: bool,

    /// Evaluate members on all cores
    #[arg(long)]
    parallel: bool,

    #[arg(long)]
    seed: Option<u64>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn run_config(&self) -> anyhow::Result<RunConfig> {
        let mut config = match &self.config {
            Some(path) => RunConfig::from_json_file(path)?,
            None => RunConfig::default(),
        };
        let evo = &mut config.evolution;
        if let Some(n) = self.population {
            evo.population_size = n;
        }
        if let Some(n) = self.generations {
            evo.generations = n;
        }
        if let Some(n) = self.steps {
            evo.eval_steps = n;
        }
        if let Some(cutoff) = self.cutoff {
            evo.selection = Selection::Threshold { cutoff };
        }
        evo.vary_hidden_widths |= self.vary_widths;
        evo.parallel |= self.parallel;

        let sim = &mut config.sim;
        if let Some(kind) = self.policy {
            sim.policy = kind;
        }
        if let Some(seed) = self.seed {
            sim.seed = seed;
        }
        config.validate()?;
        Ok(config)
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    cellsim::init_logging(args.verbose);

    let config = args.run_config()?;
    log::info!(
        "evolving {} {} policies for {} generations ({:?})",
        config.evolution.population_size,
        config.sim.policy,
        config.evolution.generations,
        config.evolution.selection
    );

    let evolution = Evolution::from_config(config.evolution.clone(), &config.sim, config.sim.seed)?;
    match evolution.run() {
        EvolutionOutcome::Completed { ranked, history } => {
            let Some(best) = ranked.first() else {
                anyhow::bail!("selection returned an empty population");
            };
            let Some(result) = &best.result else {
                anyhow::bail!("best member was never evaluated");
            };
            log::info!(
                "best after {} generations: fitness {} (max level {}, final level {}), shape {:?}",
                history.len(),
                result.fitness(),
                result.max_level,
                result.final_level,
                best.policy.shape()
            );
            reporting::write_run(&args.out, &RunRecord::from(result), &best.policy)
                .with_context(|| format!("writing run to {}", args.out.display()))?;
            log::info!("saved best run to {}", args.out.display());
        }
        EvolutionOutcome::NoSurvivors { generation, .. } => {
            log::warn!(
                "evolution stopped in generation {}: no member survived, nothing saved",
                generation + 1
            );
        }
    }
    Ok(())
}

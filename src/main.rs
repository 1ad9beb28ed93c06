use std::path::PathBuf;

use ::rand::SeedableRng;
use anyhow::Context;
use clap::Parser;
use macroquad::prelude::*;
use rand_chacha::ChaCha8Rng;

use cellsim::config::{self, RunConfig};
use cellsim::renderer::{self, HudInfo};
use cellsim::{Episode, Outcome, Policy, PolicyKind, SteeringPolicy};

/// Watch one episode of the cell arena.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON run configuration; missing fields keep their defaults
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Start from saved network weights instead of a fresh policy
    #[arg(short, long)]
    weights: Option<PathBuf>,

    /// Turn the policy off and steer with the arrow keys
    #[arg(short, long)]
    manual: bool,

    /// Update rule of a fresh policy
    #[arg(long)]
    policy: Option<PolicyKind>,

    #[arg(long)]
    seed: Option<u64>,

    /// Round limit of the episode
    #[arg(long)]
    rounds: Option<u64>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn window_conf() -> Conf {
    Conf {
        window_title: "cellsim".to_string(),
        window_width: config::ARENA_WIDTH as i32,
        window_height: config::ARENA_HEIGHT as i32,
        window_resizable: true,
        high_dpi: true,
        ..Default::default()
    }
}

fn arrow_direction() -> Option<Vec2> {
    let mut dir = Vec2::ZERO;
    if is_key_down(KeyCode::Left) {
        dir.x -= 1.0;
    }
    if is_key_down(KeyCode::Right) {
        dir.x += 1.0;
    }
    if is_key_down(KeyCode::Up) {
        dir.y -= 1.0;
    }
    if is_key_down(KeyCode::Down) {
        dir.y += 1.0;
    }
    (dir != Vec2::ZERO).then_some(dir)
}

#[macroquad::main(window_conf)]
async fn main() {
    let args = Args::parse();
    cellsim::init_logging(args.verbose);

    if let Err(e) = run(args).await {
        log::error!("{e:#}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> anyhow::Result<()> {
    let mut run_config = match &args.config {
        Some(path) => RunConfig::from_json_file(path)?,
        None => RunConfig::default(),
    };
    let sim = &mut run_config.sim;
    sim.headless = false;
    sim.use_policy = !args.manual;
    if let Some(kind) = args.policy {
        sim.policy = kind;
    }
    if let Some(seed) = args.seed {
        sim.seed = seed;
    }
    if let Some(rounds) = args.rounds {
        sim.round_limit = rounds;
    }

    // Saved weights bring their own kind and layer widths.
    let mut policy = match &args.weights {
        Some(path) => {
            let policy = Policy::from_snapshot(path, sim.learning_rate)
                .with_context(|| format!("loading weights from {}", path.display()))?;
            let shape = policy.shape();
            sim.policy = policy.kind();
            sim.hidden1 = shape.hidden1;
            sim.hidden2 = shape.hidden2;
            policy
        }
        None => {
            let mut rng = ChaCha8Rng::seed_from_u64(sim.seed);
            Policy::from_config(sim, &mut rng)
        }
    };
    let sim = run_config.sim;

    let mut episode = Episode::new(&sim, &mut policy, sim.seed)?;
    log::info!(
        "episode started: {} particles, {} killers, {} policy{}",
        sim.particles,
        sim.killers,
        sim.policy,
        if args.manual { " (manual)" } else { "" }
    );

    let mut accumulator = 0.0f32;
    let mut paused = false;

    loop {
        if is_key_pressed(KeyCode::Escape) {
            break;
        }
        if is_key_pressed(KeyCode::Space) {
            paused = !paused;
        }

        if paused || episode.is_finished() {
            accumulator = 0.0;
        } else {
            accumulator += get_frame_time().min(0.1);
            while accumulator >= config::TICK_INTERVAL && !episode.is_finished() {
                let manual = if args.manual { arrow_direction() } else { None };
                episode.step(manual);
                accumulator -= config::TICK_INTERVAL;
            }
        }

        let status = match episode.outcome() {
            Outcome::Died => "DIED (Esc to quit)",
            Outcome::TimedOut => "ROUND LIMIT (Esc to quit)",
            Outcome::Running if paused => "PAUSED (Space to resume)",
            Outcome::Running => "",
        };
        let hud = HudInfo {
            round: episode.round(),
            round_limit: sim.round_limit,
            peak_level: episode.arena.player.max_level(sim.start_level),
            status,
            manual: args.manual,
        };
        renderer::draw(&episode.arena, episode.last_tick(), &hud);

        next_frame().await;
    }

    let result = episode.result();
    log::info!(
        "episode ended after {} rounds: {:?}, max level {}, final level {}",
        result.rounds,
        result.outcome,
        result.max_level,
        result.final_level
    );
    Ok(())
}

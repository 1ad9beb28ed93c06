use cellsim::brain::PolicyKind;
use cellsim::{
    EvolutionConfig, Evolution, EvolutionOutcome, Phase, Selection, SimConfig, SteeringPolicy,
};

fn sim() -> SimConfig {
    SimConfig {
        hidden1: 8,
        hidden2: 4,
        policy: PolicyKind::Gradient,
        learning_rate: 0.01,
        ..SimConfig::default()
    }
}

fn config() -> EvolutionConfig {
    EvolutionConfig {
        population_size: 6,
        generations: 3,
        eval_steps: 150,
        elite_fraction: 0.34,
        ..EvolutionConfig::default()
    }
}

#[test]
fn elitist_run_keeps_best_members_ranked() {
    let evolution = Evolution::from_config(config(), &sim(), 21).unwrap();
    let EvolutionOutcome::Completed { ranked, history } = evolution.run() else {
        panic!("elitist selection cannot run out of members");
    };
    assert_eq!(history.len(), 3);
    assert_eq!(ranked.len(), config().elite_count());
    assert!(ranked.windows(2).all(|w| w[0].fitness() >= w[1].fitness()));
    for member in &ranked {
        assert!(member.result.is_some());
        assert_eq!(member.policy.shape().input, sim().input_dim());
    }
    for report in &history {
        assert_eq!(report.fitness.count, 6);
        assert!(report.fitness.best >= report.fitness.median);
        assert!(report.fitness.median >= report.fitness.worst);
    }
}

#[test]
fn reproduction_carries_the_top_elite_unchanged() {
    let mut evolution = Evolution::from_config(config(), &sim(), 22).unwrap();
    evolution.evaluate();
    evolution.select();
    let mut previous_best = evolution.population()[0].fitness();
    for _ in 0..2 {
        evolution.reproduce();
        assert_eq!(evolution.population()[0].fitness(), previous_best);
        assert_eq!(evolution.population().len(), 6);
        evolution.evaluate();
        evolution.select();
        previous_best = evolution.population()[0].fitness();
    }
}

#[test]
fn same_seed_gives_same_run_in_parallel() {
    let outcome = |parallel: bool| {
        let config = EvolutionConfig {
            parallel,
            ..config()
        };
        match Evolution::from_config(config, &sim(), 23).unwrap().run() {
            EvolutionOutcome::Completed { ranked, history } => (
                ranked.into_iter().map(|m| m.result).collect::<Vec<_>>(),
                history,
            ),
            EvolutionOutcome::NoSurvivors { .. } => panic!("unexpected abort"),
        }
    };
    assert_eq!(outcome(false), outcome(true));
}

#[test]
fn threshold_selection_keeps_only_survivors() {
    let sim = SimConfig {
        killers: 0,
        particles: 6,
        ..sim()
    };
    let config = EvolutionConfig {
        selection: Selection::Threshold {
            cutoff: sim.start_level,
        },
        generations: 2,
        ..config()
    };
    // Without killers nobody can lose levels, so everyone survives.
    let mut evolution = Evolution::from_config(config, &sim, 24).unwrap();
    assert!(evolution.step_generation());
    assert_eq!(evolution.history()[0].selected, 6);
    assert!(evolution.step_generation());
    assert_eq!(evolution.phase(), Phase::Done);
}

#[test]
fn threshold_selection_aborts_without_survivors() {
    let config = EvolutionConfig {
        selection: Selection::Threshold { cutoff: 1_000 },
        ..config()
    };
    let evolution = Evolution::from_config(config, &sim(), 25).unwrap();
    assert!(matches!(
        evolution.run(),
        EvolutionOutcome::NoSurvivors { generation: 0, .. }
    ));
}

#[test]
fn width_diversity_mixes_shapes() {
    let config = EvolutionConfig {
        population_size: 12,
        vary_hidden_widths: true,
        ..config()
    };
    let evolution = Evolution::from_config(config, &sim(), 26).unwrap();
    let shapes: Vec<_> = evolution
        .population()
        .iter()
        .map(|m| (m.policy.shape().hidden1, m.policy.shape().hidden2))
        .collect();
    assert!(shapes.iter().any(|s| *s != shapes[0]));
}

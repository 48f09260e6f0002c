//! Runner property tests
//!
//! Every strategy must return a permutation of the destinations, and the
//! annealing and genetic runners must report a non-increasing best cost.

mod fixtures;

use proptest::prelude::*;

use route_optimizer::model::is_valid_permutation;
use route_optimizer::problem::ProblemConfig;
use route_optimizer::runners::{
    AnnealingConfig, AnnealingRunner, AntColonyConfig, AntColonyRunner, GeneticConfig, GeneticRunner,
    NeuralRunner, ParticleSwarmConfig, ParticleSwarmRunner, ReinforcementRunner,
};
use route_optimizer::{
    Cancellation, Constraints, NodeRecord, OptimizationProblem, Preferences, ProblemBuilder, RouteStrategy,
};

use fixtures::{DEPOT, neighbourhood_records, small_route_records};

fn problem_from(points: &[(f64, f64, f64)]) -> OptimizationProblem {
    let destinations: Vec<NodeRecord> = points
        .iter()
        .enumerate()
        .map(|(i, (lat, lng, fill))| NodeRecord::new(format!("p{}", i), *lat, *lng).with_fill_level(*fill))
        .collect();
    ProblemBuilder::new(ProblemConfig::default())
        .build(&DEPOT.record("depot"), &destinations, Constraints::default(), Preferences::default())
        .expect("valid problem")
}

fn small_runners(seed: u64) -> Vec<Box<dyn RouteStrategy>> {
    vec![
        Box::new(GeneticRunner::new(
            GeneticConfig {
                population_size: 20,
                max_generations: 15,
                ..GeneticConfig::default()
            },
            Some(seed),
        )),
        Box::new(AntColonyRunner::new(
            AntColonyConfig {
                ants: 5,
                max_iterations: 10,
                ..AntColonyConfig::default()
            },
            Some(seed),
        )),
        Box::new(ParticleSwarmRunner::new(
            ParticleSwarmConfig {
                particles: 6,
                max_iterations: 15,
                ..ParticleSwarmConfig::default()
            },
            Some(seed),
        )),
        Box::new(AnnealingRunner::new(
            AnnealingConfig {
                max_iterations: 500,
                ..AnnealingConfig::default()
            },
            Some(seed),
        )),
        Box::new(NeuralRunner::untrained()),
        Box::new(ReinforcementRunner::untrained()),
    ]
}

fn doha_points() -> impl Strategy<Value = Vec<(f64, f64, f64)>> {
    prop::collection::vec((25.15f64..25.40, 51.40f64..51.62, 0.0f64..100.0), 0..12)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_every_runner_returns_permutation(points in doha_points(), seed in 0u64..1000) {
        let problem = problem_from(&points);
        for runner in small_runners(seed) {
            let run = runner.run(&problem, &Cancellation::new()).unwrap();
            prop_assert!(
                is_valid_permutation(&run.solution.order, points.len()),
                "{} returned {:?}",
                run.algorithm,
                run.solution.order
            );
            prop_assert!(run.solution.total_distance >= 0.0);
        }
    }

    #[test]
    fn prop_matrix_symmetric_with_zero_diagonal(points in doha_points()) {
        let problem = problem_from(&points);
        let m = &problem.distance_matrix;
        prop_assert_eq!(m.len(), points.len() + 1);
        for i in 0..m.len() {
            prop_assert_eq!(m[i][i], 0.0);
            for j in 0..m.len() {
                prop_assert_eq!(m[i][j], m[j][i]);
            }
        }
    }
}

#[test]
fn test_annealing_and_genetic_histories_never_increase() {
    let problem = ProblemBuilder::new(ProblemConfig::default())
        .build(
            &DEPOT.record("depot"),
            &neighbourhood_records(12),
            Constraints::default(),
            Preferences::default(),
        )
        .unwrap();

    let runners: Vec<Box<dyn RouteStrategy>> = vec![
        Box::new(AnnealingRunner::new(AnnealingConfig::default(), Some(5))),
        Box::new(GeneticRunner::new(GeneticConfig::default(), Some(5))),
    ];
    for runner in runners {
        let run = runner.run(&problem, &Cancellation::new()).unwrap();
        assert!(run.convergence_history.len() > 1, "{}", run.algorithm);
        assert!(
            run.convergence_history.windows(2).all(|w| w[1] <= w[0]),
            "{} history increased",
            run.algorithm
        );
        // both start from the greedy tour, whose relative cost is 1.0
        assert!(run.convergence_history.last().copied().unwrap() <= 1.0 + 1e-9);
    }
}

#[test]
fn test_seeded_runs_are_reproducible() {
    let problem = ProblemBuilder::new(ProblemConfig::default())
        .build(
            &DEPOT.record("depot"),
            &neighbourhood_records(10),
            Constraints::default(),
            Preferences::default(),
        )
        .unwrap();

    for (first, second) in small_runners(99).into_iter().zip(small_runners(99)) {
        let a = first.run(&problem, &Cancellation::new()).unwrap();
        let b = second.run(&problem, &Cancellation::new()).unwrap();
        assert_eq!(a.solution.order, b.solution.order, "{}", a.algorithm);
    }
}

#[test]
fn test_cancelled_runners_stop() {
    let problem = ProblemBuilder::new(ProblemConfig::default())
        .build(
            &DEPOT.record("depot"),
            &neighbourhood_records(8),
            Constraints::default(),
            Preferences::default(),
        )
        .unwrap();
    let cancel = Cancellation::new();
    cancel.cancel();

    for runner in small_runners(1).into_iter().take(4) {
        assert!(runner.run(&problem, &cancel).is_err());
    }
}

/// Three stops whose nearest-neighbour tour is already optimal, so every
/// search converges immediately and only its stopping rule ends the run.
fn converged_problem() -> OptimizationProblem {
    ProblemBuilder::new(ProblemConfig::default())
        .build(
            &DEPOT.record("depot"),
            &small_route_records(),
            Constraints::default(),
            Preferences::default(),
        )
        .unwrap()
}

#[test]
fn test_genetic_stops_on_stagnation() {
    let config = GeneticConfig {
        population_size: 20,
        max_generations: 1000,
        stagnation_generations: 10,
        ..GeneticConfig::default()
    };
    let run = GeneticRunner::new(config, Some(3))
        .run(&converged_problem(), &Cancellation::new())
        .unwrap();

    assert!(run.iterations_used >= 10);
    assert!(run.iterations_used < 1000, "ran {} generations", run.iterations_used);
}

#[test]
fn test_ant_colony_stops_on_stagnation() {
    let config = AntColonyConfig {
        ants: 5,
        max_iterations: 1000,
        stagnation_iterations: 10,
        ..AntColonyConfig::default()
    };
    let run = AntColonyRunner::new(config, Some(3))
        .run(&converged_problem(), &Cancellation::new())
        .unwrap();

    assert!(run.iterations_used >= 10);
    assert!(run.iterations_used < 1000, "ran {} iterations", run.iterations_used);
}

#[test]
fn test_particle_swarm_stops_when_improvement_stalls() {
    let config = ParticleSwarmConfig {
        particles: 6,
        max_iterations: 1000,
        convergence_window: 5,
        convergence_threshold: 1e-6,
        ..ParticleSwarmConfig::default()
    };
    let run = ParticleSwarmRunner::new(config, Some(3))
        .run(&converged_problem(), &Cancellation::new())
        .unwrap();

    assert!(run.iterations_used >= 5);
    assert!(run.iterations_used < 1000, "ran {} iterations", run.iterations_used);
}

//! Invariants checked over seeded random story graphs.
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use storypath_core::{
    Card, Choice, DecisionPolicy, PathSimulator, SimulationConfig, StoryGraph, aggregate_paths,
    analyze_structure, run_simulation,
};

fn random_graph(seed: u64) -> StoryGraph {
    let mut rng = SmallRng::seed_from_u64(seed);
    let card_count = rng.gen_range(1..12);
    let cards: Vec<Card> = (0..card_count)
        .map(|idx| Card::new(format!("card-{idx}"), format!("Card {idx}")))
        .collect();
    let mut choices = Vec::new();
    for idx in 0..card_count {
        for slot in 0..rng.gen_range(0..4) {
            // Occasionally point past the last card to create dangling choices.
            let target = rng.gen_range(0..=card_count);
            choices.push(
                Choice::new(
                    format!("choice-{idx}-{slot}"),
                    format!("card-{idx}"),
                    format!("card-{target}"),
                    "",
                )
                .with_order(rng.gen_range(0..3)),
            );
        }
    }
    StoryGraph::build(&cards, &choices)
}

const POLICIES: [DecisionPolicy; 3] = [
    DecisionPolicy::UniformRandom,
    DecisionPolicy::WeightedByOrder { decay: 0.5 },
    DecisionPolicy::DeterministicFirst,
];

#[test]
fn structure_counts_are_consistent() {
    for seed in 0..64 {
        let graph = random_graph(seed);
        let structure = analyze_structure(&graph, "card-0");
        assert!(structure.reachable_cards.len() <= structure.total_cards);
        assert_eq!(
            structure.orphaned_cards.len(),
            structure.total_cards - structure.reachable_cards.len()
        );
        assert_eq!(structure.reachable_cards.first().map(String::as_str), Some("card-0"));
        for card in graph.cards() {
            if graph.edges(&card.id).is_empty() {
                assert!(structure.dead_end_cards.contains(&card.id));
                assert!(structure.effective_dead_end_cards.contains(&card.id));
            }
        }
    }
}

#[test]
fn paths_respect_step_limit_and_graph_edges() {
    for seed in 0..32 {
        let graph = random_graph(seed);
        for policy in POLICIES {
            let config = SimulationConfig::new("card-0")
                .with_path_count(25)
                .with_max_steps(6)
                .with_policy(policy)
                .with_seed(seed);
            for path in run_simulation(&graph, &config).unwrap() {
                assert!(path.len() <= 7);
                assert_eq!(path.steps[0].card_id, "card-0");
                assert!(path.steps.last().unwrap().choice_id_taken.is_none());
                for pair in path.steps.windows(2) {
                    let taken = pair[0].choice_id_taken.as_deref().unwrap();
                    let edge = graph
                        .valid_edges(&pair[0].card_id)
                        .find(|edge| edge.choice_id == taken)
                        .unwrap();
                    assert_eq!(edge.target_card_id, pair[1].card_id);
                }
            }
        }
    }
}

#[test]
fn same_seed_same_paths() {
    for seed in 0..16 {
        let graph = random_graph(seed);
        let config = SimulationConfig::new("card-0").with_path_count(40).with_seed(99);
        assert_eq!(
            run_simulation(&graph, &config).unwrap(),
            run_simulation(&graph, &config).unwrap()
        );
    }
}

#[test]
fn pause_and_resume_match_uninterrupted_run() {
    for seed in 0..16 {
        let graph = random_graph(seed);
        let config = SimulationConfig::new("card-0")
            .with_path_count(30)
            .with_max_steps(12)
            .with_seed(seed);
        let expected = run_simulation(&graph, &config).unwrap();

        let mut simulator: PathSimulator = PathSimulator::new();
        simulator.start_simulation(&graph, config).unwrap();
        let mut rounds = 0;
        while simulator.progress().status != storypath_core::SimulationStatus::Completed {
            simulator.advance(3);
            simulator.pause_simulation().ok();
            simulator.advance(50);
            simulator.resume_simulation().ok();
            rounds += 1;
        }
        assert!(rounds > 0);
        assert_eq!(simulator.paths(), expected.as_slice());
        assert_eq!(simulator.analytics(), aggregate_paths(&expected));
    }
}

#[test]
fn reset_then_restart_reproduces_analytics() {
    let graph = random_graph(5);
    let config = SimulationConfig::new("card-0").with_path_count(50).with_seed(3);
    let mut simulator: PathSimulator = PathSimulator::new();
    simulator.start_simulation(&graph, config.clone()).unwrap();
    simulator.advance(17);
    simulator.reset_simulation();
    assert!(simulator.paths().is_empty());

    simulator.start_simulation(&graph, config.clone()).unwrap();
    simulator.run_to_completion();
    let first = simulator.analytics();

    simulator.start_simulation(&graph, config).unwrap();
    simulator.run_to_completion();
    assert_eq!(simulator.analytics(), first);
    assert_eq!(first.total_paths, 50);
}

//! Reader decision policies used by the path simulator.
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::graph::ChoiceEdge;

/// Decision returned by a [`ChoicePolicy`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PolicyDecision {
    /// Index into the option slice handed to the policy.
    pub option_index: usize,
    /// Probability the policy assigned to the picked option.
    pub probability: f64,
}

impl PolicyDecision {
    #[must_use]
    pub const fn new(option_index: usize, probability: f64) -> Self {
        Self {
            option_index,
            probability,
        }
    }
}

/// Policy interface for simulated readers.
///
/// `options` only ever holds choices with an existing target, ordered by
/// `order_index`, and is never empty.
pub trait ChoicePolicy {
    /// Name used for logging and reports.
    fn name(&self) -> &'static str;

    /// Pick one of the offered choices.
    fn pick_choice(
        &mut self,
        card_id: &str,
        options: &[&ChoiceEdge],
        rng: &mut dyn RngCore,
    ) -> PolicyDecision;
}

/// Built-in decision policies.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecisionPolicy {
    /// Every valid choice is equally likely.
    #[default]
    UniformRandom,
    /// The n-th choice (by order) has weight `decay^n`, so earlier choices
    /// are favoured. `decay` must lie in `(0, 1]`.
    WeightedByOrder {
        #[serde(default = "DecisionPolicy::default_decay")]
        decay: f64,
    },
    /// Always take the first choice by order. Consumes no randomness.
    DeterministicFirst,
}

impl DecisionPolicy {
    pub const DEFAULT_DECAY: f64 = 0.5;

    const fn default_decay() -> f64 {
        Self::DEFAULT_DECAY
    }

    #[must_use]
    pub const fn weighted() -> Self {
        Self::WeightedByOrder {
            decay: Self::DEFAULT_DECAY,
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::UniformRandom => "Uniform Random",
            Self::WeightedByOrder { .. } => "Weighted By Order",
            Self::DeterministicFirst => "Deterministic First",
        }
    }

    #[must_use]
    pub fn create_policy(self) -> Box<dyn ChoicePolicy + Send> {
        match self {
            Self::UniformRandom => Box::new(UniformRandomPolicy),
            Self::WeightedByOrder { decay } => Box::new(WeightedByOrderPolicy { decay }),
            Self::DeterministicFirst => Box::new(DeterministicFirstPolicy),
        }
    }
}

impl fmt::Display for DecisionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WeightedByOrder { decay } => write!(f, "{} (decay {decay})", self.label()),
            _ => f.write_str(self.label()),
        }
    }
}

struct UniformRandomPolicy;
struct DeterministicFirstPolicy;

struct WeightedByOrderPolicy {
    decay: f64,
}

impl ChoicePolicy for UniformRandomPolicy {
    fn name(&self) -> &'static str {
        "Uniform Random"
    }

    fn pick_choice(
        &mut self,
        _card_id: &str,
        options: &[&ChoiceEdge],
        rng: &mut dyn RngCore,
    ) -> PolicyDecision {
        if options.len() <= 1 {
            return PolicyDecision::new(0, 1.0);
        }
        let idx = rng.gen_range(0..options.len());
        PolicyDecision::new(idx, 1.0 / crate::numbers::len_to_f64(options.len()))
    }
}

impl ChoicePolicy for DeterministicFirstPolicy {
    fn name(&self) -> &'static str {
        "Deterministic First"
    }

    fn pick_choice(
        &mut self,
        _card_id: &str,
        _options: &[&ChoiceEdge],
        _rng: &mut dyn RngCore,
    ) -> PolicyDecision {
        PolicyDecision::new(0, 1.0)
    }
}

impl ChoicePolicy for WeightedByOrderPolicy {
    fn name(&self) -> &'static str {
        "Weighted By Order"
    }

    fn pick_choice(
        &mut self,
        _card_id: &str,
        options: &[&ChoiceEdge],
        rng: &mut dyn RngCore,
    ) -> PolicyDecision {
        if options.len() <= 1 {
            return PolicyDecision::new(0, 1.0);
        }
        let weights = order_weights(self.decay, options.len());
        let total_weight: f64 = weights.iter().sum();
        let roll = rng.r#gen::<f64>() * total_weight;

        let mut cumulative = 0.0;
        for (idx, weight) in weights.iter().enumerate() {
            cumulative += weight;
            if roll < cumulative {
                return PolicyDecision::new(idx, weight / total_weight);
            }
        }
        // Rounding can leave `roll` just above the final cumulative sum.
        let last = options.len() - 1;
        PolicyDecision::new(last, weights[last] / total_weight)
    }
}

/// `decay^n` for each position `n`. The first weight is always 1.
fn order_weights(decay: f64, len: usize) -> Vec<f64> {
    let mut weights = Vec::with_capacity(len);
    let mut weight = 1.0_f64;
    for _ in 0..len {
        weights.push(weight);
        weight *= decay;
    }
    weights
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    fn edges(count: usize) -> Vec<ChoiceEdge> {
        (0..count)
            .map(|idx| ChoiceEdge {
                choice_id: format!("c{idx}"),
                target_card_id: format!("t{idx}"),
                label: String::new(),
                order_index: i64::try_from(idx).unwrap(),
                valid: true,
            })
            .collect()
    }

    fn tally(policy: DecisionPolicy, options: usize, draws: usize) -> Vec<usize> {
        let owned = edges(options);
        let refs: Vec<&ChoiceEdge> = owned.iter().collect();
        let mut rng = ChaCha20Rng::seed_from_u64(42);
        let mut policy = policy.create_policy();
        let mut counts = vec![0usize; options];
        for _ in 0..draws {
            let decision = policy.pick_choice("card", &refs, &mut rng);
            counts[decision.option_index] += 1;
        }
        counts
    }

    #[test]
    fn uniform_policy_spreads_picks() {
        let counts = tally(DecisionPolicy::UniformRandom, 3, 3000);
        assert!(counts.iter().all(|&count| (800..1200).contains(&count)));
    }

    #[test]
    fn weighted_policy_favours_earlier_choices() {
        let counts = tally(DecisionPolicy::weighted(), 3, 7000);
        // Expected shares 4/7, 2/7, 1/7.
        assert!(counts[0] > counts[1]);
        assert!(counts[1] > counts[2]);
        assert!((3600..4400).contains(&counts[0]));
    }

    #[test]
    fn weighted_with_unit_decay_is_uniform() {
        let counts = tally(DecisionPolicy::WeightedByOrder { decay: 1.0 }, 2, 2000);
        assert!(counts.iter().all(|&count| (850..1150).contains(&count)));
    }

    #[test]
    fn deterministic_first_ignores_rng() {
        let counts = tally(DecisionPolicy::DeterministicFirst, 4, 50);
        assert_eq!(counts, vec![50, 0, 0, 0]);
    }

    #[test]
    fn order_weights_start_at_one() {
        let weights = order_weights(0.5, 3);
        assert_eq!(weights, vec![1.0, 0.5, 0.25]);
    }

    #[test]
    fn policy_serializes_with_kind_tag() {
        let json = serde_json::to_string(&DecisionPolicy::weighted()).unwrap();
        assert_eq!(json, r#"{"kind":"weighted_by_order","decay":0.5}"#);
        let parsed: DecisionPolicy =
            serde_json::from_str(r#"{"kind":"weighted_by_order"}"#).unwrap();
        assert_eq!(parsed, DecisionPolicy::weighted());
        let uniform: DecisionPolicy = serde_json::from_str(r#"{"kind":"uniform_random"}"#).unwrap();
        assert_eq!(uniform, DecisionPolicy::UniformRandom);
    }
}

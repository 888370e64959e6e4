//! Simulation configuration and its validation.
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::graph::StoryGraph;
use crate::policy::DecisionPolicy;

/// Errors raised when a simulation configuration cannot be run.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigurationError {
    #[error("no start card was configured")]
    MissingStartCard,
    #[error("start card {card_id} does not exist in the story")]
    UnknownStartCard { card_id: String },
    #[error("path count must be at least 1")]
    ZeroPathCount,
    #[error("max steps must be at least 1")]
    ZeroMaxSteps,
    #[error("weighted policy decay must be within (0, 1] (got {decay})")]
    InvalidWeightDecay { decay: f64 },
}

/// Parameters of one simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    #[serde(default)]
    pub start_card_id: Option<String>,
    #[serde(default = "SimulationConfig::default_path_count")]
    pub path_count: u32,
    #[serde(default = "SimulationConfig::default_max_steps")]
    pub max_steps: u32,
    #[serde(default)]
    pub decision_policy: DecisionPolicy,
    #[serde(default = "SimulationConfig::default_seed")]
    pub seed: u64,
    /// End a path as soon as it re-enters a card it already visited.
    #[serde(default)]
    pub stop_on_cycle: bool,
}

impl SimulationConfig {
    const fn default_path_count() -> u32 {
        100
    }

    const fn default_max_steps() -> u32 {
        50
    }

    const fn default_seed() -> u64 {
        1337
    }

    #[must_use]
    pub fn new(start_card_id: impl Into<String>) -> Self {
        Self {
            start_card_id: Some(start_card_id.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_path_count(mut self, path_count: u32) -> Self {
        self.path_count = path_count;
        self
    }

    #[must_use]
    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps;
        self
    }

    #[must_use]
    pub fn with_policy(mut self, decision_policy: DecisionPolicy) -> Self {
        self.decision_policy = decision_policy;
        self
    }

    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    #[must_use]
    pub fn with_stop_on_cycle(mut self, stop_on_cycle: bool) -> Self {
        self.stop_on_cycle = stop_on_cycle;
        self
    }

    /// Check the configuration against a story graph, returning the start
    /// card id on success. Nothing is clamped or defaulted.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] describing the first violated rule.
    pub fn validate(&self, graph: &StoryGraph) -> Result<&str, ConfigurationError> {
        let start = self
            .start_card_id
            .as_deref()
            .filter(|id| !id.trim().is_empty())
            .ok_or(ConfigurationError::MissingStartCard)?;
        if self.path_count == 0 {
            return Err(ConfigurationError::ZeroPathCount);
        }
        if self.max_steps == 0 {
            return Err(ConfigurationError::ZeroMaxSteps);
        }
        if let DecisionPolicy::WeightedByOrder { decay } = self.decision_policy
            && !(decay.is_finite() && decay > 0.0 && decay <= 1.0)
        {
            return Err(ConfigurationError::InvalidWeightDecay { decay });
        }
        if !graph.contains(start) {
            return Err(ConfigurationError::UnknownStartCard {
                card_id: start.to_string(),
            });
        }
        Ok(start)
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            start_card_id: None,
            path_count: Self::default_path_count(),
            max_steps: Self::default_max_steps(),
            decision_policy: DecisionPolicy::default(),
            seed: Self::default_seed(),
            stop_on_cycle: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Card, Choice};

    fn graph() -> StoryGraph {
        StoryGraph::build(
            &[Card::new("a", "A"), Card::new("b", "B")],
            &[Choice::new("c1", "a", "b", "go")],
        )
    }

    #[test]
    fn valid_config_returns_start_card() {
        let config = SimulationConfig::new("a");
        assert_eq!(config.validate(&graph()), Ok("a"));
    }

    #[test]
    fn missing_or_blank_start_is_rejected() {
        let config = SimulationConfig::default();
        assert_eq!(
            config.validate(&graph()),
            Err(ConfigurationError::MissingStartCard)
        );
        let blank = SimulationConfig::new("   ");
        assert_eq!(
            blank.validate(&graph()),
            Err(ConfigurationError::MissingStartCard)
        );
    }

    #[test]
    fn unknown_start_is_rejected() {
        let config = SimulationConfig::new("zzz");
        assert_eq!(
            config.validate(&graph()),
            Err(ConfigurationError::UnknownStartCard {
                card_id: "zzz".to_string()
            })
        );
    }

    #[test]
    fn zero_counts_are_rejected_not_clamped() {
        let graph = graph();
        assert_eq!(
            SimulationConfig::new("a").with_path_count(0).validate(&graph),
            Err(ConfigurationError::ZeroPathCount)
        );
        assert_eq!(
            SimulationConfig::new("a").with_max_steps(0).validate(&graph),
            Err(ConfigurationError::ZeroMaxSteps)
        );
    }

    #[test]
    fn weighted_decay_must_be_a_probability_shape() {
        let graph = graph();
        for decay in [0.0, -1.0, 1.5, f64::NAN] {
            let config = SimulationConfig::new("a")
                .with_policy(DecisionPolicy::WeightedByOrder { decay });
            assert!(matches!(
                config.validate(&graph),
                Err(ConfigurationError::InvalidWeightDecay { .. })
            ));
        }
        let ok = SimulationConfig::new("a").with_policy(DecisionPolicy::weighted());
        assert!(ok.validate(&graph).is_ok());
    }

    #[test]
    fn deserializes_with_defaults() {
        let config: SimulationConfig =
            serde_json::from_str(r#"{ "start_card_id": "a", "max_steps": 4 }"#).unwrap();
        assert_eq!(config.path_count, 100);
        assert_eq!(config.max_steps, 4);
        assert_eq!(config.seed, 1337);
        assert_eq!(config.decision_policy, DecisionPolicy::UniformRandom);
        assert!(!config.stop_on_cycle);
    }
}

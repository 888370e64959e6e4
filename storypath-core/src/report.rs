//! Serializable analytics report combining structure and simulation results.
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::analytics::{PathSignatureStat, StoryAnalytics};
use crate::config::SimulationConfig;
use crate::graph::StoryGraph;
use crate::structure::{ChoiceRef, StructureAnalysis};

/// Bumped whenever the report layout changes shape.
pub const REPORT_FORMAT_VERSION: u32 = 1;
/// Number of path signatures listed in a report.
pub const TOP_PATH_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructureSummary {
    pub start_card_id: String,
    pub total_cards: usize,
    pub reachable_cards: usize,
    pub orphaned_cards: Vec<String>,
    pub dead_end_cards: Vec<String>,
    pub effective_dead_end_cards: Vec<String>,
    pub single_choice_cards: Vec<String>,
    pub max_depth: u32,
    pub branching_factor: f64,
    pub dangling_choices: Vec<ChoiceRef>,
    pub unknown_source_choices: Vec<ChoiceRef>,
}

impl From<&StructureAnalysis> for StructureSummary {
    fn from(structure: &StructureAnalysis) -> Self {
        Self {
            start_card_id: structure.start_card_id.clone(),
            total_cards: structure.total_cards,
            reachable_cards: structure.reachable_count(),
            orphaned_cards: structure.orphaned_cards.clone(),
            dead_end_cards: structure.dead_end_cards.clone(),
            effective_dead_end_cards: structure.effective_dead_end_cards.clone(),
            single_choice_cards: structure.single_choice_cards.clone(),
            max_depth: structure.max_depth,
            branching_factor: structure.branching_factor,
            dangling_choices: structure.dangling_choices.clone(),
            unknown_source_choices: structure.unknown_source_choices.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationSummary {
    pub total_paths: u64,
    pub completed_paths: u64,
    pub max_step_paths: u64,
    pub cycle_paths: u64,
    pub unique_paths: usize,
    pub completion_rate: f64,
    pub average_path_length: f64,
    pub path_length_std_dev: f64,
    pub min_path_length: u64,
    pub max_path_length: u64,
    pub ending_counts: std::collections::BTreeMap<String, u64>,
}

impl From<&StoryAnalytics> for SimulationSummary {
    fn from(analytics: &StoryAnalytics) -> Self {
        Self {
            total_paths: analytics.total_paths,
            completed_paths: analytics.completed_paths,
            max_step_paths: analytics.max_step_paths,
            cycle_paths: analytics.cycle_paths,
            unique_paths: analytics.unique_paths(),
            completion_rate: analytics.completion_rate,
            average_path_length: analytics.average_path_length,
            path_length_std_dev: analytics.path_length_std_dev,
            min_path_length: analytics.min_path_length,
            max_path_length: analytics.max_path_length,
            ending_counts: analytics.ending_counts.clone(),
        }
    }
}

/// One row per card, in story order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardReportRow {
    pub card_id: String,
    pub title: String,
    /// BFS depth from the start card; `None` when unreachable.
    pub depth: Option<u32>,
    pub choice_count: usize,
    pub visits: u64,
    pub reach_rate: f64,
    pub is_dead_end: bool,
    pub is_orphaned: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportWarning {
    pub code: String,
    pub message: String,
}

impl ReportWarning {
    fn new(code: &str, message: impl Into<String>) -> Self {
        Self {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

/// Flat, JSON-friendly analytics report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsReport {
    pub format_version: u32,
    /// RFC 3339, UTC.
    pub generated_at: String,
    pub config: SimulationConfig,
    pub structure: StructureSummary,
    /// Absent for structure-only reports.
    pub simulation: Option<SimulationSummary>,
    pub cards: Vec<CardReportRow>,
    pub top_paths: Vec<PathSignatureStat>,
    pub warnings: Vec<ReportWarning>,
}

impl AnalyticsReport {
    /// Assemble a report. Pass `analytics: None` for a structure-only report.
    #[must_use]
    pub fn build(
        graph: &StoryGraph,
        structure: &StructureAnalysis,
        analytics: Option<&StoryAnalytics>,
        config: &SimulationConfig,
        generated_at: DateTime<Utc>,
    ) -> Self {
        let cards = graph
            .cards()
            .iter()
            .map(|card| CardReportRow {
                card_id: card.id.clone(),
                title: card.title.clone(),
                depth: structure.card_depths.get(&card.id).copied(),
                choice_count: graph.edges(&card.id).len(),
                visits: analytics.map_or(0, |a| a.visits(&card.id)),
                reach_rate: analytics.map_or(0.0, |a| a.reach_rate(&card.id)),
                is_dead_end: structure.is_dead_end(&card.id),
                is_orphaned: structure.is_orphaned(&card.id),
            })
            .collect();

        let mut warnings: Vec<ReportWarning> = structure
            .warnings
            .iter()
            .map(|warning| ReportWarning::new(warning.code(), warning.to_string()))
            .collect();
        if let Some(analytics) = analytics {
            if analytics.max_step_paths > 0 {
                warnings.push(ReportWarning::new(
                    "paths_hit_step_limit",
                    format!(
                        "{} path(s) stopped at the step limit of {}",
                        analytics.max_step_paths, config.max_steps
                    ),
                ));
            }
            if analytics.cycle_paths > 0 {
                warnings.push(ReportWarning::new(
                    "paths_hit_cycle",
                    format!("{} path(s) revisited a card", analytics.cycle_paths),
                ));
            }
        }

        Self {
            format_version: REPORT_FORMAT_VERSION,
            generated_at: generated_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            config: config.clone(),
            structure: StructureSummary::from(structure),
            simulation: analytics.map(SimulationSummary::from),
            cards,
            top_paths: analytics
                .map(|a| a.most_common_paths(TOP_PATH_LIMIT))
                .unwrap_or_default(),
            warnings,
        }
    }

    #[must_use]
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Card, Choice};
    use crate::simulation::run_simulation;
    use crate::structure::analyze_structure;
    use chrono::TimeZone;

    fn fixed_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn loop_graph() -> StoryGraph {
        StoryGraph::build(
            &[Card::new("a", "Gate"), Card::new("b", "Hall")],
            &[
                Choice::new("ab", "a", "b", "in"),
                Choice::new("ba", "b", "a", "out"),
            ],
        )
    }

    #[test]
    fn structure_only_report_has_no_simulation() {
        let graph = loop_graph();
        let structure = analyze_structure(&graph, "a");
        let config = SimulationConfig::new("a");
        let report = AnalyticsReport::build(&graph, &structure, None, &config, fixed_time());
        assert_eq!(report.generated_at, "2024-03-01T12:00:00Z");
        assert!(report.simulation.is_none());
        assert!(report.top_paths.is_empty());
        assert_eq!(report.cards[0].title, "Gate");
        assert_eq!(report.cards[1].depth, Some(1));
        assert_eq!(report.cards[1].visits, 0);
        let codes: Vec<_> = report.warnings.iter().map(|w| w.code.as_str()).collect();
        assert_eq!(codes, vec!["no_endings", "single_choice_cards"]);
        assert!(report.has_warnings());
    }

    #[test]
    fn clean_story_has_no_warnings() {
        let graph = StoryGraph::build(
            &[Card::new("a", "Gate"), Card::new("b", "Left"), Card::new("c", "Right")],
            &[
                Choice::new("ab", "a", "b", "left"),
                Choice::new("ac", "a", "c", "right"),
            ],
        );
        let structure = analyze_structure(&graph, "a");
        let config = SimulationConfig::new("a").with_path_count(8);
        let paths = run_simulation(&graph, &config).unwrap();
        let analytics = crate::analytics::aggregate_paths(&paths);
        let report =
            AnalyticsReport::build(&graph, &structure, Some(&analytics), &config, fixed_time());
        assert!(!report.has_warnings());
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn simulation_warnings_are_appended() {
        let graph = loop_graph();
        let structure = analyze_structure(&graph, "a");
        let config = SimulationConfig::new("a").with_max_steps(3).with_path_count(4);
        let paths = run_simulation(&graph, &config).unwrap();
        let analytics = crate::analytics::aggregate_paths(&paths);
        let report =
            AnalyticsReport::build(&graph, &structure, Some(&analytics), &config, fixed_time());
        let summary = report.simulation.as_ref().unwrap();
        assert_eq!(summary.max_step_paths, 4);
        assert_eq!(summary.unique_paths, 1);
        assert!(report.warnings.iter().any(|w| w.code == "paths_hit_step_limit"));
        assert!(!report.warnings.iter().any(|w| w.code == "paths_hit_cycle"));
        assert_eq!(report.top_paths[0].signature, "a -> b -> a -> b");
        assert_eq!(report.cards[0].visits, 8);
        assert!((report.cards[0].reach_rate - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn json_uses_flat_field_names() {
        let graph = loop_graph();
        let structure = analyze_structure(&graph, "a");
        let config = SimulationConfig::new("a");
        let report = AnalyticsReport::build(&graph, &structure, None, &config, fixed_time());
        let json = report.to_json_pretty().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["format_version"], 1);
        assert_eq!(value["structure"]["reachable_cards"], 2);
        assert!(value["simulation"].is_null());
        assert_eq!(value["config"]["decision_policy"]["kind"], "uniform_random");
    }
}

//! Static structure analysis: reachability, endings and authoring problems.
//!
//! Nothing here is random and nothing here fails. Problems an author should
//! look at are surfaced as [`StructureWarning`]s.
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;

use crate::graph::StoryGraph;
use crate::numbers::{len_to_u64, ratio};

/// Reference to a choice that could not be followed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceRef {
    pub choice_id: String,
    pub source_card_id: String,
    pub target_card_id: String,
}

/// Authoring problems found in a story. None of these stop an analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum StructureWarning {
    /// No reachable card is an ending, so every reader loops until the step
    /// limit.
    NoEndings,
    OrphanedCards { count: usize },
    SingleChoiceCards { count: usize },
    DanglingChoices { count: usize },
    UnknownSourceChoices { count: usize },
    DuplicateCardIds { ids: Vec<String> },
    UnknownStartCard { card_id: String },
}

impl StructureWarning {
    /// Stable machine-readable code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::NoEndings => "no_endings",
            Self::OrphanedCards { .. } => "orphaned_cards",
            Self::SingleChoiceCards { .. } => "single_choice_cards",
            Self::DanglingChoices { .. } => "dangling_choices",
            Self::UnknownSourceChoices { .. } => "unknown_source_choices",
            Self::DuplicateCardIds { .. } => "duplicate_card_ids",
            Self::UnknownStartCard { .. } => "unknown_start_card",
        }
    }
}

impl fmt::Display for StructureWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoEndings => f.write_str("no reachable card ends the story"),
            Self::OrphanedCards { count } => {
                write!(f, "{count} card(s) cannot be reached from the start card")
            }
            Self::SingleChoiceCards { count } => {
                write!(f, "{count} card(s) offer only one choice")
            }
            Self::DanglingChoices { count } => {
                write!(f, "{count} choice(s) point at missing cards")
            }
            Self::UnknownSourceChoices { count } => {
                write!(f, "{count} choice(s) belong to missing cards")
            }
            Self::DuplicateCardIds { ids } => {
                write!(f, "duplicate card ids: {}", ids.join(", "))
            }
            Self::UnknownStartCard { card_id } => {
                write!(f, "start card {card_id} does not exist")
            }
        }
    }
}

/// Result of [`analyze_structure`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructureAnalysis {
    pub start_card_id: String,
    pub total_cards: usize,
    /// Reachable card ids in BFS discovery order.
    pub reachable_cards: Vec<String>,
    /// Cards without any outgoing choice.
    pub dead_end_cards: Vec<String>,
    /// Cards without any choice leading to an existing card. A superset of
    /// `dead_end_cards`.
    pub effective_dead_end_cards: Vec<String>,
    pub orphaned_cards: Vec<String>,
    pub max_depth: u32,
    /// BFS depth of every reachable card.
    pub card_depths: BTreeMap<String, u32>,
    /// Mean choice count over cards with at least one choice.
    pub branching_factor: f64,
    pub single_choice_cards: Vec<String>,
    pub dangling_choices: Vec<ChoiceRef>,
    pub unknown_source_choices: Vec<ChoiceRef>,
    pub warnings: Vec<StructureWarning>,
}

impl StructureAnalysis {
    #[must_use]
    pub fn reachable_count(&self) -> usize {
        self.reachable_cards.len()
    }

    #[must_use]
    pub fn is_reachable(&self, card_id: &str) -> bool {
        self.card_depths.contains_key(card_id)
    }

    #[must_use]
    pub fn is_dead_end(&self, card_id: &str) -> bool {
        self.effective_dead_end_cards.iter().any(|id| id == card_id)
    }

    #[must_use]
    pub fn is_orphaned(&self, card_id: &str) -> bool {
        self.orphaned_cards.iter().any(|id| id == card_id)
    }

    pub fn warning_codes(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.warnings.iter().map(StructureWarning::code)
    }
}

/// Analyze the static shape of `graph` as seen from `start_card_id`.
#[must_use]
pub fn analyze_structure(graph: &StoryGraph, start_card_id: &str) -> StructureAnalysis {
    let (reachable_cards, card_depths) = breadth_first(graph, start_card_id);
    let max_depth = reachable_cards
        .last()
        .and_then(|id| card_depths.get(id.as_str()))
        .copied()
        .unwrap_or(0);

    let mut dead_end_cards = Vec::new();
    let mut effective_dead_end_cards = Vec::new();
    let mut orphaned_cards = Vec::new();
    let mut single_choice_cards = Vec::new();
    let mut choice_total = 0usize;
    let mut branching_cards = 0usize;

    for card in graph.cards() {
        let edges = graph.edges(&card.id);
        if edges.is_empty() {
            dead_end_cards.push(card.id.clone());
        } else {
            choice_total += edges.len();
            branching_cards += 1;
        }
        if edges.len() == 1 {
            single_choice_cards.push(card.id.clone());
        }
        if !edges.iter().any(|edge| edge.valid) {
            effective_dead_end_cards.push(card.id.clone());
        }
        if !card_depths.contains_key(card.id.as_str()) {
            orphaned_cards.push(card.id.clone());
        }
    }

    let dangling_choices: Vec<ChoiceRef> = graph
        .dangling_edges()
        .map(|(source, edge)| ChoiceRef {
            choice_id: edge.choice_id.clone(),
            source_card_id: source.to_string(),
            target_card_id: edge.target_card_id.clone(),
        })
        .collect();
    let unknown_source_choices: Vec<ChoiceRef> = graph
        .unknown_source_choices()
        .iter()
        .map(|choice| ChoiceRef {
            choice_id: choice.id.clone(),
            source_card_id: choice.source_card_id.clone(),
            target_card_id: choice.target_card_id.clone(),
        })
        .collect();

    let mut warnings = Vec::new();
    let start_known = graph.contains(start_card_id);
    if !start_known {
        warnings.push(StructureWarning::UnknownStartCard {
            card_id: start_card_id.to_string(),
        });
    }
    if start_known && !reachable_cards.iter().any(|id| effective_dead_end_cards.contains(id)) {
        warnings.push(StructureWarning::NoEndings);
    }
    if !orphaned_cards.is_empty() {
        warnings.push(StructureWarning::OrphanedCards {
            count: orphaned_cards.len(),
        });
    }
    if !single_choice_cards.is_empty() {
        warnings.push(StructureWarning::SingleChoiceCards {
            count: single_choice_cards.len(),
        });
    }
    if !dangling_choices.is_empty() {
        warnings.push(StructureWarning::DanglingChoices {
            count: dangling_choices.len(),
        });
    }
    if !unknown_source_choices.is_empty() {
        warnings.push(StructureWarning::UnknownSourceChoices {
            count: unknown_source_choices.len(),
        });
    }
    if !graph.duplicate_card_ids().is_empty() {
        warnings.push(StructureWarning::DuplicateCardIds {
            ids: graph.duplicate_card_ids().to_vec(),
        });
    }

    log::debug!(
        "structure: {}/{} cards reachable from {}, {} warning(s)",
        reachable_cards.len(),
        graph.len(),
        start_card_id,
        warnings.len()
    );

    StructureAnalysis {
        start_card_id: start_card_id.to_string(),
        total_cards: graph.len(),
        reachable_cards,
        dead_end_cards,
        effective_dead_end_cards,
        orphaned_cards,
        max_depth,
        card_depths: card_depths
            .into_iter()
            .map(|(id, depth)| (id.to_string(), depth))
            .collect(),
        branching_factor: ratio(len_to_u64(choice_total), len_to_u64(branching_cards)),
        single_choice_cards,
        dangling_choices,
        unknown_source_choices,
        warnings,
    }
}

/// Breadth-first walk over valid edges: discovery order plus depth per card.
fn breadth_first<'a>(
    graph: &'a StoryGraph,
    start_card_id: &str,
) -> (Vec<String>, HashMap<&'a str, u32>) {
    let mut order = Vec::new();
    let mut depths = HashMap::new();
    let Some(start) = graph.card(start_card_id) else {
        return (order, depths);
    };
    let mut queue = VecDeque::from([(start.id.as_str(), 0u32)]);
    depths.insert(start.id.as_str(), 0);
    while let Some((card_id, depth)) = queue.pop_front() {
        order.push(card_id.to_string());
        for edge in graph.valid_edges(card_id) {
            let target = edge.target_card_id.as_str();
            if !depths.contains_key(target) {
                depths.insert(target, depth + 1);
                queue.push_back((target, depth + 1));
            }
        }
    }
    (order, depths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Card, Choice};

    fn cards(ids: &[&str]) -> Vec<Card> {
        ids.iter().map(|id| Card::new(*id, *id)).collect()
    }

    #[test]
    fn isolated_card_is_orphaned() {
        let graph = StoryGraph::build(
            &cards(&["a", "b", "c"]),
            &[Choice::new("go", "a", "b", "go")],
        );
        let analysis = analyze_structure(&graph, "a");
        assert_eq!(analysis.reachable_cards, vec!["a", "b"]);
        assert_eq!(analysis.orphaned_cards, vec!["c"]);
        assert_eq!(analysis.dead_end_cards, vec!["b", "c"]);
        assert_eq!(analysis.max_depth, 1);
        assert!(analysis.is_reachable("b"));
        assert!(analysis.is_orphaned("c"));
        let codes: Vec<_> = analysis.warning_codes().collect();
        assert_eq!(codes, vec!["orphaned_cards", "single_choice_cards"]);
    }

    #[test]
    fn dangling_choice_is_a_warning_not_an_edge() {
        let graph = StoryGraph::build(&cards(&["a"]), &[Choice::new("lost", "a", "x", "?")]);
        let analysis = analyze_structure(&graph, "a");
        assert!(analysis.dead_end_cards.is_empty());
        assert_eq!(analysis.effective_dead_end_cards, vec!["a"]);
        assert_eq!(analysis.reachable_cards, vec!["a"]);
        assert_eq!(
            analysis.dangling_choices,
            vec![ChoiceRef {
                choice_id: "lost".to_string(),
                source_card_id: "a".to_string(),
                target_card_id: "x".to_string(),
            }]
        );
        assert!(analysis
            .warnings
            .contains(&StructureWarning::DanglingChoices { count: 1 }));
        assert!(!analysis.warnings.contains(&StructureWarning::NoEndings));
    }

    #[test]
    fn unknown_start_orphans_everything() {
        let graph = StoryGraph::build(&cards(&["a", "b"]), &[Choice::new("go", "a", "b", "")]);
        let analysis = analyze_structure(&graph, "zzz");
        assert!(analysis.reachable_cards.is_empty());
        assert_eq!(analysis.orphaned_cards, vec!["a", "b"]);
        assert_eq!(analysis.max_depth, 0);
        assert_eq!(
            analysis.warnings[0],
            StructureWarning::UnknownStartCard {
                card_id: "zzz".to_string()
            }
        );
        assert!(!analysis.warnings.contains(&StructureWarning::NoEndings));
    }

    #[test]
    fn closed_loop_has_no_endings() {
        let graph = StoryGraph::build(
            &cards(&["a", "b"]),
            &[Choice::new("ab", "a", "b", ""), Choice::new("ba", "b", "a", "")],
        );
        let analysis = analyze_structure(&graph, "a");
        assert!(analysis.warnings.contains(&StructureWarning::NoEndings));
        assert!(analysis.dead_end_cards.is_empty());
    }

    #[test]
    fn branching_factor_counts_every_choice() {
        let graph = StoryGraph::build(
            &cards(&["a", "b", "c"]),
            &[
                Choice::new("ab", "a", "b", ""),
                Choice::new("ac", "a", "c", ""),
                Choice::new("ax", "a", "x", ""),
                Choice::new("bc", "b", "c", ""),
            ],
        );
        let analysis = analyze_structure(&graph, "a");
        assert!((analysis.branching_factor - 2.0).abs() < f64::EPSILON);
        assert_eq!(analysis.single_choice_cards, vec!["b"]);
        assert_eq!(analysis.card_depths.get("c"), Some(&1));
        assert_eq!(analysis.reachable_cards, vec!["a", "b", "c"]);
    }

    #[test]
    fn empty_graph_reports_zeroes() {
        let analysis = analyze_structure(&StoryGraph::default(), "a");
        assert_eq!(analysis.total_cards, 0);
        assert!(analysis.branching_factor.abs() < f64::EPSILON);
        assert_eq!(analysis.warning_codes().collect::<Vec<_>>(), vec!["unknown_start_card"]);
    }

    #[test]
    fn warnings_render_for_humans() {
        let warning = StructureWarning::DuplicateCardIds {
            ids: vec!["a".to_string(), "b".to_string()],
        };
        assert_eq!(warning.to_string(), "duplicate card ids: a, b");
        let json = serde_json::to_string(&StructureWarning::OrphanedCards { count: 2 }).unwrap();
        assert_eq!(json, r#"{"code":"orphaned_cards","count":2}"#);
    }
}

//! Adjacency view of a story: card -> ordered outgoing choices.
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::HashMap;

use crate::data::{Card, Choice, StoryData};

/// Most cards offer a handful of choices; keep those inline.
pub type EdgeList = SmallVec<[ChoiceEdge; 4]>;

/// An outgoing choice as seen from its source card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoiceEdge {
    pub choice_id: String,
    pub target_card_id: String,
    pub label: String,
    pub order_index: i64,
    /// `false` when the target card does not exist.
    pub valid: bool,
}

/// Immutable snapshot of the story graph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoryGraph {
    cards: Vec<Card>,
    index: HashMap<String, usize>,
    adjacency: Vec<EdgeList>,
    unknown_source_choices: Vec<Choice>,
    duplicate_card_ids: Vec<String>,
}

impl StoryGraph {
    /// Build the adjacency structure from flat card and choice lists.
    ///
    /// Edges are ordered by `order_index`, ties keeping input order. Choices
    /// pointing at unknown cards are kept but marked invalid; choices whose
    /// source card is unknown cannot be attached and are set aside.
    #[must_use]
    pub fn build(cards: &[Card], choices: &[Choice]) -> Self {
        let mut graph = Self::default();

        for card in cards {
            if graph.index.contains_key(&card.id) {
                log::warn!("duplicate card id {} ignored", card.id);
                graph.duplicate_card_ids.push(card.id.clone());
                continue;
            }
            graph.index.insert(card.id.clone(), graph.cards.len());
            graph.cards.push(card.clone());
            graph.adjacency.push(EdgeList::new());
        }

        for choice in choices {
            let Some(&source) = graph.index.get(&choice.source_card_id) else {
                log::warn!(
                    "choice {} references unknown source card {}",
                    choice.id,
                    choice.source_card_id
                );
                graph.unknown_source_choices.push(choice.clone());
                continue;
            };
            let valid = graph.index.contains_key(&choice.target_card_id);
            graph.adjacency[source].push(ChoiceEdge {
                choice_id: choice.id.clone(),
                target_card_id: choice.target_card_id.clone(),
                label: choice.label.clone(),
                order_index: choice.order_index,
                valid,
            });
        }

        for edges in &mut graph.adjacency {
            edges.sort_by_key(|edge| edge.order_index);
        }

        graph
    }

    #[must_use]
    pub fn from_story(story: &StoryData) -> Self {
        Self::build(&story.cards, &story.choices)
    }

    /// Cards in input order (duplicates removed).
    #[must_use]
    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cards.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    #[must_use]
    pub fn contains(&self, card_id: &str) -> bool {
        self.index.contains_key(card_id)
    }

    #[must_use]
    pub fn card(&self, card_id: &str) -> Option<&Card> {
        self.index.get(card_id).map(|&idx| &self.cards[idx])
    }

    /// All outgoing choices of a card, dangling ones included.
    /// Unknown cards have no edges.
    #[must_use]
    pub fn edges(&self, card_id: &str) -> &[ChoiceEdge] {
        match self.index.get(card_id) {
            Some(&idx) => self.adjacency[idx].as_slice(),
            None => &[],
        }
    }

    /// Outgoing choices whose target exists.
    pub fn valid_edges<'a>(
        &'a self,
        card_id: &str,
    ) -> impl Iterator<Item = &'a ChoiceEdge> + use<'a> {
        self.edges(card_id).iter().filter(|edge| edge.valid)
    }

    /// `(source card id, edge)` for every choice pointing at a missing card.
    pub fn dangling_edges(&self) -> impl Iterator<Item = (&str, &ChoiceEdge)> {
        self.cards
            .iter()
            .zip(&self.adjacency)
            .flat_map(|(card, edges)| {
                edges
                    .iter()
                    .filter(|edge| !edge.valid)
                    .map(move |edge| (card.id.as_str(), edge))
            })
    }

    /// Number of choices attached to known cards.
    #[must_use]
    pub fn choice_count(&self) -> usize {
        self.adjacency.iter().map(SmallVec::len).sum()
    }

    #[must_use]
    pub fn unknown_source_choices(&self) -> &[Choice] {
        &self.unknown_source_choices
    }

    #[must_use]
    pub fn duplicate_card_ids(&self) -> &[String] {
        &self.duplicate_card_ids
    }

    /// The card an editor would open first: lowest `order_index`, ties
    /// resolved by input order. Callers must opt into this explicitly.
    #[must_use]
    pub fn default_start_card(&self) -> Option<&Card> {
        self.cards
            .iter()
            .enumerate()
            .min_by_key(|(position, card)| (card.order_index, *position))
            .map(|(_, card)| card)
    }
}

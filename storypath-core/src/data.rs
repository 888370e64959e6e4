//! Story input rows and their normalization.
//!
//! Rows arrive from the editor's database layer as loosely typed JSON:
//! keys may be snake_case or camelCase, ids may be strings or numbers and
//! optional columns may be `null`. Everything is normalized here, once, into
//! the strict [`Card`] / [`Choice`] model used by the rest of the crate.
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// A node in the story graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub order_index: i64,
}

impl Card {
    #[must_use]
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            content: String::new(),
            order_index: 0,
        }
    }

    #[must_use]
    pub fn with_order(mut self, order_index: i64) -> Self {
        self.order_index = order_index;
        self
    }
}

/// A labelled, directed edge between two cards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    pub id: String,
    pub source_card_id: String,
    /// May reference a card that does not exist (a dangling choice).
    pub target_card_id: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub order_index: i64,
}

impl Choice {
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        source_card_id: impl Into<String>,
        target_card_id: impl Into<String>,
        label: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            source_card_id: source_card_id.into(),
            target_card_id: target_card_id.into(),
            label: label.into(),
            order_index: 0,
        }
    }

    #[must_use]
    pub fn with_order(mut self, order_index: i64) -> Self {
        self.order_index = order_index;
        self
    }
}

/// Errors raised while normalizing story rows.
#[derive(Debug, Error)]
pub enum DataError {
    #[error("story JSON is malformed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{kind} row {index} is missing `{field}`")]
    MissingField {
        kind: &'static str,
        index: usize,
        field: &'static str,
    },
}

// snake_case and camelCase spellings are separate fields so a row carrying
// both does not fail as a duplicate; the snake_case value wins.
#[derive(Debug, Default, Deserialize)]
struct RawCard {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    title: Option<Value>,
    #[serde(default)]
    content: Option<Value>,
    #[serde(default)]
    order_index: Option<Value>,
    #[serde(default, rename = "orderIndex")]
    order_index_camel: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct RawChoice {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    source_card_id: Option<Value>,
    #[serde(default, rename = "sourceCardId")]
    source_card_id_camel: Option<Value>,
    #[serde(default)]
    target_card_id: Option<Value>,
    #[serde(default, rename = "targetCardId")]
    target_card_id_camel: Option<Value>,
    #[serde(default)]
    label: Option<Value>,
    #[serde(default)]
    text: Option<Value>,
    #[serde(default)]
    order_index: Option<Value>,
    #[serde(default, rename = "orderIndex")]
    order_index_camel: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct RawStory {
    #[serde(default)]
    cards: Vec<RawCard>,
    #[serde(default)]
    choices: Vec<RawChoice>,
}

/// Normalized cards and choices of one story.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StoryData {
    pub cards: Vec<Card>,
    pub choices: Vec<Choice>,
}

impl StoryData {
    #[must_use]
    pub fn new(cards: Vec<Card>, choices: Vec<Choice>) -> Self {
        Self { cards, choices }
    }

    /// Parse a story export of the form `{ "cards": [...], "choices": [...] }`.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed, a card has no usable id or
    /// a choice has no source card.
    pub fn from_json(json: &str) -> Result<Self, DataError> {
        let raw: RawStory = serde_json::from_str(json)?;
        let cards = raw
            .cards
            .into_iter()
            .enumerate()
            .map(|(index, row)| normalize_card(index, row))
            .collect::<Result<Vec<_>, _>>()?;
        let choices = raw
            .choices
            .into_iter()
            .enumerate()
            .map(|(index, row)| normalize_choice(index, row))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { cards, choices })
    }
}

fn normalize_card(index: usize, row: RawCard) -> Result<Card, DataError> {
    let id = row
        .id
        .as_ref()
        .and_then(value_to_id)
        .ok_or(DataError::MissingField {
            kind: "card",
            index,
            field: "id",
        })?;
    let order = row.order_index.or(row.order_index_camel);
    Ok(Card {
        title: text_field("card", index, "title", row.title.as_ref()),
        content: text_field("card", index, "content", row.content.as_ref()),
        order_index: order_field("card", index, order.as_ref()),
        id,
    })
}

fn normalize_choice(index: usize, row: RawChoice) -> Result<Choice, DataError> {
    let source_card_id = row
        .source_card_id
        .or(row.source_card_id_camel)
        .as_ref()
        .and_then(value_to_id)
        .ok_or(DataError::MissingField {
            kind: "choice",
            index,
            field: "source_card_id",
        })?;
    let id = row.id.as_ref().and_then(value_to_id).unwrap_or_else(|| {
        log::warn!("choice row {index} has no id; using a positional id");
        format!("choice-{index}")
    });
    // An unlinked choice keeps an empty target and is reported as dangling.
    let target_card_id = row
        .target_card_id
        .or(row.target_card_id_camel)
        .as_ref()
        .and_then(value_to_id)
        .unwrap_or_default();
    let label = row.label.or(row.text);
    let order = row.order_index.or(row.order_index_camel);
    Ok(Choice {
        id,
        source_card_id,
        target_card_id,
        label: text_field("choice", index, "label", label.as_ref()),
        order_index: order_field("choice", index, order.as_ref()),
    })
}

fn value_to_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Scalars become text; anything else is dropped with a warning.
fn text_field(kind: &str, index: usize, field: &str, value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(other) => {
            log::warn!("{kind} row {index} has a non-text `{field}` ({other}); using empty text");
            String::new()
        }
    }
}

/// Integers, integral floats and integer strings are accepted; anything else
/// falls back to the row position.
fn order_field(kind: &str, index: usize, value: Option<&Value>) -> i64 {
    let Some(value) = value.filter(|value| !value.is_null()) else {
        return position_index(index);
    };
    value_to_order(value).unwrap_or_else(|| {
        log::warn!("{kind} row {index} has an unusable order index ({value}); using row position");
        position_index(index)
    })
}

fn value_to_order(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(integral_f64)),
        Value::String(s) => {
            let trimmed = s.trim();
            trimmed
                .parse::<i64>()
                .ok()
                .or_else(|| trimmed.parse::<f64>().ok().and_then(integral_f64))
        }
        _ => None,
    }
}

fn integral_f64(value: f64) -> Option<i64> {
    if value.is_finite() && value.fract() == 0.0 {
        num_traits::cast::cast::<f64, i64>(value)
    } else {
        None
    }
}

fn position_index(index: usize) -> i64 {
    i64::try_from(index).unwrap_or(i64::MAX)
}

//! Aggregation of simulated paths into story-level analytics.
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::hash::Hasher;
use twox_hash::XxHash64;

use crate::numbers::{count_to_f64, finite_or_zero, len_to_u64, ratio};
use crate::simulation::{SimulatedPath, TerminationReason};

/// Separator used when a path signature is rendered as text.
pub const SIGNATURE_SEPARATOR: &str = " -> ";

/// Aggregate view over every simulated path of a run.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StoryAnalytics {
    pub total_paths: u64,
    /// Paths that ended at a dead end (a natural story ending).
    pub completed_paths: u64,
    /// Paths cut off by the step limit.
    pub max_step_paths: u64,
    /// Paths stopped by cycle detection.
    pub cycle_paths: u64,
    /// Every visit counts, including repeat visits within one path.
    pub card_visit_counts: BTreeMap<String, u64>,
    /// Number of paths that visited the card at least once.
    pub card_reach_counts: BTreeMap<String, u64>,
    /// Ordered card ids joined by [`SIGNATURE_SEPARATOR`] -> occurrences.
    pub path_signatures: BTreeMap<String, u64>,
    /// Dead-end card -> completed paths ending there.
    pub ending_counts: BTreeMap<String, u64>,
    pub average_path_length: f64,
    pub path_length_std_dev: f64,
    pub min_path_length: u64,
    pub max_path_length: u64,
    pub completion_rate: f64,
}

/// One distinct reader experience and how often it occurred.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathSignatureStat {
    /// Short stable handle (XxHash64 of the card ids, hex).
    pub signature_id: String,
    pub signature: String,
    pub length: u64,
    pub count: u64,
    /// Share of all paths following this signature.
    pub share: f64,
}

impl StoryAnalytics {
    #[must_use]
    pub fn unique_paths(&self) -> usize {
        self.path_signatures.len()
    }

    #[must_use]
    pub fn visits(&self, card_id: &str) -> u64 {
        self.card_visit_counts.get(card_id).copied().unwrap_or(0)
    }

    /// Fraction of paths that saw the card at least once.
    #[must_use]
    pub fn reach_rate(&self, card_id: &str) -> f64 {
        let reached = self.card_reach_counts.get(card_id).copied().unwrap_or(0);
        ratio(reached, self.total_paths)
    }

    /// The `limit` most common signatures, by count then signature text.
    #[must_use]
    pub fn most_common_paths(&self, limit: usize) -> Vec<PathSignatureStat> {
        let mut ranked: Vec<(&String, u64)> = self
            .path_signatures
            .iter()
            .map(|(signature, &count)| (signature, count))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        ranked
            .into_iter()
            .take(limit)
            .map(|(signature, count)| {
                let cards: Vec<&str> = signature.split(SIGNATURE_SEPARATOR).collect();
                PathSignatureStat {
                    signature_id: signature_id(&cards),
                    signature: signature.clone(),
                    length: len_to_u64(cards.len()),
                    count,
                    share: ratio(count, self.total_paths),
                }
            })
            .collect()
    }
}

/// Render a card sequence as its signature text.
#[must_use]
pub fn path_signature<'a>(card_ids: impl IntoIterator<Item = &'a str>) -> String {
    card_ids
        .into_iter()
        .collect::<Vec<_>>()
        .join(SIGNATURE_SEPARATOR)
}

/// Stable 64-bit handle for a card sequence.
#[must_use]
pub fn signature_id(card_ids: &[&str]) -> String {
    let mut hasher = XxHash64::with_seed(0);
    for id in card_ids {
        hasher.write(id.as_bytes());
        hasher.write_u8(0x1f);
    }
    format!("{:016x}", hasher.finish())
}

/// Aggregate a finished set of paths.
#[must_use]
pub fn aggregate_paths(paths: &[SimulatedPath]) -> StoryAnalytics {
    let mut builder = AnalyticsBuilder::default();
    for path in paths {
        builder.ingest(path);
    }
    builder.finish()
}

/// Incremental aggregator; the simulator feeds it one path at a time so
/// partial analytics are available mid-run.
#[derive(Debug, Clone, Default)]
pub struct AnalyticsBuilder {
    total_paths: u64,
    completed_paths: u64,
    max_step_paths: u64,
    cycle_paths: u64,
    card_visit_counts: BTreeMap<String, u64>,
    card_reach_counts: BTreeMap<String, u64>,
    path_signatures: BTreeMap<String, u64>,
    ending_counts: BTreeMap<String, u64>,
    lengths: RunningStats,
    min_length: Option<u64>,
    max_length: u64,
}

impl AnalyticsBuilder {
    pub fn ingest(&mut self, path: &SimulatedPath) {
        self.total_paths += 1;
        match path.termination {
            TerminationReason::DeadEnd => {
                self.completed_paths += 1;
                if let Some(last) = path.last_card_id() {
                    *self.ending_counts.entry(last.to_string()).or_insert(0) += 1;
                }
            }
            TerminationReason::MaxStepsReached => self.max_step_paths += 1,
            TerminationReason::CycleDetected => self.cycle_paths += 1,
        }

        let mut seen: HashSet<&str> = HashSet::with_capacity(path.len());
        for card_id in path.card_ids() {
            *self.card_visit_counts.entry(card_id.to_string()).or_insert(0) += 1;
            if seen.insert(card_id) {
                *self.card_reach_counts.entry(card_id.to_string()).or_insert(0) += 1;
            }
        }

        *self
            .path_signatures
            .entry(path_signature(path.card_ids()))
            .or_insert(0) += 1;

        let length = len_to_u64(path.len());
        self.lengths.add(count_to_f64(length));
        self.min_length = Some(self.min_length.map_or(length, |min| min.min(length)));
        self.max_length = self.max_length.max(length);
    }

    #[must_use]
    pub const fn total_paths(&self) -> u64 {
        self.total_paths
    }

    #[must_use]
    pub fn finish(self) -> StoryAnalytics {
        StoryAnalytics {
            total_paths: self.total_paths,
            completed_paths: self.completed_paths,
            max_step_paths: self.max_step_paths,
            cycle_paths: self.cycle_paths,
            card_visit_counts: self.card_visit_counts,
            card_reach_counts: self.card_reach_counts,
            path_signatures: self.path_signatures,
            ending_counts: self.ending_counts,
            average_path_length: finite_or_zero(self.lengths.mean()),
            path_length_std_dev: finite_or_zero(self.lengths.std_dev()),
            min_path_length: self.min_length.unwrap_or(0),
            max_path_length: self.max_length,
            completion_rate: ratio(self.completed_paths, self.total_paths),
        }
    }
}

#[derive(Debug, Default, Clone)]
struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
}

impl RunningStats {
    fn add(&mut self, value: f64) {
        self.count += 1;
        let count = count_to_f64(self.count);
        let delta = value - self.mean;
        self.mean += delta / count;
        let delta2 = value - self.mean;
        self.m2 += delta * delta2;
    }

    const fn mean(&self) -> f64 {
        if self.count == 0 { 0.0 } else { self.mean }
    }

    fn variance(&self) -> f64 {
        if self.count > 1 {
            self.m2 / count_to_f64(self.count - 1)
        } else {
            0.0
        }
    }

    fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }
}

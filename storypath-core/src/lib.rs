//! Story Path Analyzer
//!
//! Platform-agnostic analysis of branching stories: builds the choice graph,
//! reports structural problems, and simulates readers walking the story to
//! estimate which cards, endings and routes they actually see.
//! This crate has no UI, filesystem or network dependencies.

pub mod analytics;
pub mod config;
pub mod data;
pub mod graph;
pub mod numbers;
pub mod policy;
pub mod report;
pub mod rng;
pub mod simulation;
pub mod structure;

// Re-export commonly used types
pub use analytics::{
    AnalyticsBuilder, PathSignatureStat, StoryAnalytics, aggregate_paths, path_signature,
};
pub use config::{ConfigurationError, SimulationConfig};
pub use data::{Card, Choice, DataError, StoryData};
pub use graph::{ChoiceEdge, StoryGraph};
pub use policy::{ChoicePolicy, DecisionPolicy, PolicyDecision};
pub use report::{
    AnalyticsReport, CardReportRow, ReportWarning, SimulationSummary, StructureSummary,
};
pub use rng::CountingRng;
pub use simulation::{
    PathSimulator, PathStep, SimulatedPath, SimulationError, SimulationProgress, SimulationStatus,
    TerminationReason, run_simulation, simulate_path,
};
pub use structure::{ChoiceRef, StructureAnalysis, StructureWarning, analyze_structure};

/// Trait for abstracting where story exports come from.
/// Platform-specific implementations should provide this
pub trait StorySource {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Load the cards and choices of one story.
    ///
    /// # Errors
    ///
    /// Returns an error if the story cannot be read or normalized.
    fn load_story(&self) -> Result<StoryData, Self::Error>;
}

impl StorySource for StoryData {
    type Error = std::convert::Infallible;

    fn load_story(&self) -> Result<StoryData, Self::Error> {
        Ok(self.clone())
    }
}

/// Entry point tying a story source to the analysis stages.
pub struct StoryAnalyzer<S>
where
    S: StorySource,
{
    source: S,
}

impl<S> StoryAnalyzer<S>
where
    S: StorySource,
{
    pub const fn new(source: S) -> Self {
        Self { source }
    }

    /// Load the story and build its graph.
    ///
    /// # Errors
    ///
    /// Returns an error if the source cannot produce the story.
    pub fn load_graph(&self) -> Result<StoryGraph, S::Error> {
        let story = self.source.load_story()?;
        log::debug!(
            "loaded story with {} cards and {} choices",
            story.cards.len(),
            story.choices.len()
        );
        Ok(StoryGraph::from_story(&story))
    }

    /// Run structure analysis and, unless `structure_only`, a full
    /// simulation, and assemble the report.
    ///
    /// # Errors
    ///
    /// Returns an error if the story cannot be loaded or the configuration is
    /// invalid for it. Structural problems are reported as warnings instead.
    pub fn analyze(
        &self,
        config: &SimulationConfig,
        structure_only: bool,
    ) -> Result<AnalyticsReport, anyhow::Error>
    where
        S::Error: Into<anyhow::Error>,
    {
        let graph = self.load_graph().map_err(Into::into)?;
        let start = config.validate(&graph)?;
        let structure = analyze_structure(&graph, start);
        let analytics = if structure_only {
            None
        } else {
            Some(aggregate_paths(&run_simulation(&graph, config)?))
        };
        Ok(AnalyticsReport::build(
            &graph,
            &structure,
            analytics.as_ref(),
            config,
            chrono::Utc::now(),
        ))
    }
}

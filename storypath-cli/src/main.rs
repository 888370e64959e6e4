mod reports;
mod story_file;

use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use std::fs::File;
use std::io::{BufWriter, Write, stdout};
use std::path::{Path, PathBuf};
use std::time::Instant;

use storypath_core::{
    AnalyticsReport, DecisionPolicy, PathSimulator, SimulationConfig, StoryAnalytics,
    StoryAnalyzer, StoryGraph, analyze_structure,
};
use story_file::{JsonFileSource, load_config_file};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PolicyArg {
    /// Every valid choice is equally likely
    Uniform,
    /// Earlier choices are favoured (see --weight-decay)
    Weighted,
    /// Always take the first choice
    First,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    Console,
    Json,
    Markdown,
    Csv,
}

#[derive(Debug, Parser)]
#[command(name = "storypath", version)]
#[command(about = "Structure analysis and reader path simulation for branching stories")]
struct Args {
    /// Story export (JSON with `cards` and `choices`)
    #[arg(long)]
    story: PathBuf,

    /// Start card id (defaults to the card with the lowest order index)
    #[arg(long)]
    start: Option<String>,

    /// Number of simulated readers
    #[arg(long)]
    paths: Option<u32>,

    /// Maximum choices taken per path
    #[arg(long)]
    max_steps: Option<u32>,

    /// Reader decision policy
    #[arg(long, value_enum)]
    policy: Option<PolicyArg>,

    /// Decay of the weighted policy, within (0, 1]
    #[arg(long)]
    weight_decay: Option<f64>,

    /// Seed of the simulation
    #[arg(long)]
    seed: Option<u64>,

    /// End a path as soon as it revisits a card
    #[arg(long)]
    stop_on_cycle: bool,

    /// Walk steps performed between progress updates
    #[arg(long, default_value_t = 1024)]
    batch_steps: usize,

    /// Base configuration file; command-line options override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Output report format
    #[arg(long, value_enum, default_value_t = ReportFormat::Console)]
    report: ReportFormat,

    /// Optional path to write the report output instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,

    /// Skip the simulation and only analyze the story structure
    #[arg(long)]
    structure_only: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let start_time = Instant::now();
    let analyzer = StoryAnalyzer::new(JsonFileSource::new(&args.story));
    let graph = analyzer
        .load_graph()
        .with_context(|| format!("failed to load story {}", args.story.display()))?;
    let config = resolve_config(&args, &graph)?;
    let report = build_report(&args, &graph, &config)?;

    let mut sink = ReportSink::open(args.output.as_deref())?;
    write_report(sink.writer(), args.report, &report)?;
    if args.report == ReportFormat::Console {
        writeln!(sink.writer())?;
        writeln!(sink.writer(), "🏁 Total time: {:?}", start_time.elapsed())?;
    }
    sink.finish()
}

fn init_logging(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();
}

/// Merge the optional config file with command-line overrides.
fn resolve_config(args: &Args, graph: &StoryGraph) -> Result<SimulationConfig> {
    let mut config = match &args.config {
        Some(path) => load_config_file(path)?,
        None => SimulationConfig::default(),
    };

    if let Some(start) = &args.start {
        config.start_card_id = Some(start.clone());
    }
    if config.start_card_id.is_none() {
        let Some(card) = graph.default_start_card() else {
            bail!("story {} has no cards", args.story.display());
        };
        log::info!("no start card given, using {}", card.id);
        config.start_card_id = Some(card.id.clone());
    }
    if let Some(paths) = args.paths {
        config.path_count = paths;
    }
    if let Some(max_steps) = args.max_steps {
        config.max_steps = max_steps;
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    if args.stop_on_cycle {
        config.stop_on_cycle = true;
    }
    config.decision_policy = resolve_policy(args.policy, args.weight_decay, config.decision_policy);

    config
        .validate(graph)
        .context("invalid simulation configuration")?;
    Ok(config)
}

fn resolve_policy(
    policy: Option<PolicyArg>,
    weight_decay: Option<f64>,
    current: DecisionPolicy,
) -> DecisionPolicy {
    let current_decay = match current {
        DecisionPolicy::WeightedByOrder { decay } => decay,
        _ => DecisionPolicy::DEFAULT_DECAY,
    };
    let resolved = match policy {
        Some(PolicyArg::Uniform) => DecisionPolicy::UniformRandom,
        Some(PolicyArg::First) => DecisionPolicy::DeterministicFirst,
        Some(PolicyArg::Weighted) => DecisionPolicy::WeightedByOrder {
            decay: current_decay,
        },
        None => current,
    };
    match (resolved, weight_decay) {
        (DecisionPolicy::WeightedByOrder { .. }, Some(decay)) => {
            DecisionPolicy::WeightedByOrder { decay }
        }
        (other, Some(decay)) => {
            log::warn!("--weight-decay {decay} ignored for the {} policy", other.label());
            other
        }
        (other, None) => other,
    }
}

fn build_report(
    args: &Args,
    graph: &StoryGraph,
    config: &SimulationConfig,
) -> Result<AnalyticsReport> {
    let start = config
        .start_card_id
        .as_deref()
        .context("start card missing after validation")?;
    let structure = analyze_structure(graph, start);
    let analytics = if args.structure_only {
        None
    } else {
        Some(simulate(graph, config, args.batch_steps)?)
    };
    Ok(AnalyticsReport::build(
        graph,
        &structure,
        analytics.as_ref(),
        config,
        chrono::Utc::now(),
    ))
}

/// Drive the simulator in batches so progress can be logged between them.
fn simulate(
    graph: &StoryGraph,
    config: &SimulationConfig,
    batch_steps: usize,
) -> Result<StoryAnalytics> {
    if batch_steps == 0 {
        bail!("--batch-steps must be at least 1");
    }
    let mut simulator: PathSimulator = PathSimulator::new().retain_paths(false);
    simulator.start_simulation(graph, config.clone())?;
    loop {
        let progress = simulator.advance(batch_steps);
        log::debug!(
            "{}/{} paths ({:.0}%), {} rng draws",
            progress.completed_paths,
            progress.total_paths,
            progress.fraction() * 100.0,
            progress.rng_draws
        );
        if progress.status != storypath_core::SimulationStatus::Running {
            break;
        }
    }
    let analytics = simulator.analytics();
    log::info!(
        "simulated {} paths, {} unique",
        analytics.total_paths,
        analytics.unique_paths()
    );
    Ok(analytics)
}

fn write_report(
    out: &mut dyn Write,
    format: ReportFormat,
    report: &AnalyticsReport,
) -> Result<()> {
    match format {
        ReportFormat::Console => reports::generate_console_report(out, report),
        ReportFormat::Json => reports::generate_json_report(out, report),
        ReportFormat::Markdown => reports::generate_markdown_report(out, report),
        ReportFormat::Csv => reports::generate_csv_report(out, report),
    }
}

/// Where the rendered report goes: stdout, or a file named by `--output`.
struct ReportSink {
    destination: String,
    writer: BufWriter<Box<dyn Write>>,
}

impl ReportSink {
    fn open(path: Option<&Path>) -> Result<Self> {
        let (destination, inner): (String, Box<dyn Write>) = match path {
            Some(path) => {
                let file = File::create(path)
                    .with_context(|| format!("failed to create report {}", path.display()))?;
                (path.display().to_string(), Box::new(file))
            }
            None => ("stdout".to_string(), Box::new(stdout())),
        };
        Ok(Self {
            destination,
            writer: BufWriter::new(inner),
        })
    }

    fn writer(&mut self) -> &mut dyn Write {
        &mut self.writer
    }

    fn finish(mut self) -> Result<()> {
        self.writer
            .flush()
            .with_context(|| format!("failed to write report to {}", self.destination))
    }
}

use anyhow::Result;
use colored::Colorize;
use std::io::Write;

use storypath_core::AnalyticsReport;

fn percent(value: f64) -> f64 {
    value * 100.0
}

pub fn generate_console_report(out: &mut dyn Write, report: &AnalyticsReport) -> Result<()> {
    writeln!(out)?;
    writeln!(out, "{}", "📊 Story Path Analysis".bright_cyan().bold())?;
    writeln!(out, "{}", "======================".cyan())?;
    writeln!(out, "Generated: {}", report.generated_at)?;
    writeln!(out)?;

    let structure = &report.structure;
    writeln!(out, "{}", "🗺️  Structure".bright_yellow().bold())?;
    writeln!(out, "Start card: {}", structure.start_card_id.bold())?;
    writeln!(
        out,
        "Reachable: {}/{} cards",
        structure.reachable_cards, structure.total_cards
    )?;
    writeln!(out, "Max depth: {}", structure.max_depth)?;
    writeln!(out, "Branching factor: {:.2}", structure.branching_factor)?;
    writeln!(out, "Endings: {}", structure.effective_dead_end_cards.join(", "))?;
    if !structure.orphaned_cards.is_empty() {
        writeln!(
            out,
            "Orphaned: {}",
            structure.orphaned_cards.join(", ").red()
        )?;
    }
    writeln!(out)?;

    if let Some(simulation) = &report.simulation {
        writeln!(out, "{}", "🎲 Simulation".bright_yellow().bold())?;
        writeln!(
            out,
            "Policy: {} (seed {})",
            report.config.decision_policy, report.config.seed
        )?;
        writeln!(out, "Paths: {}", simulation.total_paths)?;
        writeln!(
            out,
            "Completed: {} ({:.1}%)",
            simulation.completed_paths.to_string().green(),
            percent(simulation.completion_rate)
        )?;
        writeln!(
            out,
            "Hit step limit: {}",
            simulation.max_step_paths.to_string().yellow()
        )?;
        if report.config.stop_on_cycle {
            writeln!(out, "Stopped on cycle: {}", simulation.cycle_paths)?;
        }
        writeln!(out, "Unique paths: {}", simulation.unique_paths)?;
        writeln!(
            out,
            "Path length: avg {:.2}, std {:.2}, min {}, max {}",
            simulation.average_path_length,
            simulation.path_length_std_dev,
            simulation.min_path_length,
            simulation.max_path_length
        )?;
        writeln!(out)?;

        writeln!(out, "{}", "🃏 Cards".bright_yellow().bold())?;
        for row in &report.cards {
            let marker = if row.is_orphaned {
                "orphan".red()
            } else if row.is_dead_end {
                "ending".green()
            } else {
                "".normal()
            };
            writeln!(
                out,
                "  {:20} visits {:>6}  reach {:>5.1}%  {marker}",
                row.card_id,
                row.visits,
                percent(row.reach_rate)
            )?;
        }
        writeln!(out)?;

        if !report.top_paths.is_empty() {
            writeln!(out, "{}", "🧭 Most common paths".bright_yellow().bold())?;
            for stat in &report.top_paths {
                writeln!(
                    out,
                    "  {:>5.1}%  x{:<5} {}",
                    percent(stat.share),
                    stat.count,
                    stat.signature
                )?;
            }
            writeln!(out)?;
        }
    }

    if report.has_warnings() {
        writeln!(out, "{}", "⚠️  Warnings".bright_yellow().bold())?;
        for warning in &report.warnings {
            writeln!(out, "  • {}", warning.message.yellow())?;
        }
    } else {
        writeln!(out, "{}", "✅ No warnings".green())?;
    }
    Ok(())
}

pub fn generate_json_report(out: &mut dyn Write, report: &AnalyticsReport) -> Result<()> {
    writeln!(out, "{}", report.to_json_pretty()?)?;
    Ok(())
}

pub fn generate_markdown_report(out: &mut dyn Write, report: &AnalyticsReport) -> Result<()> {
    let structure = &report.structure;
    writeln!(out, "# Story Path Analysis\n")?;
    writeln!(out, "_Generated {}_\n", report.generated_at)?;

    writeln!(out, "## Structure\n")?;
    writeln!(out, "- **Start card**: `{}`", structure.start_card_id)?;
    writeln!(
        out,
        "- **Reachable cards**: {}/{}",
        structure.reachable_cards, structure.total_cards
    )?;
    writeln!(out, "- **Max depth**: {}", structure.max_depth)?;
    writeln!(
        out,
        "- **Branching factor**: {:.2}",
        structure.branching_factor
    )?;
    writeln!(
        out,
        "- **Endings**: {}",
        structure.effective_dead_end_cards.len()
    )?;
    writeln!(
        out,
        "- **Orphaned cards**: {}\n",
        structure.orphaned_cards.len()
    )?;

    if let Some(simulation) = &report.simulation {
        writeln!(out, "## Simulation\n")?;
        writeln!(out, "- **Policy**: {}", report.config.decision_policy)?;
        writeln!(out, "- **Seed**: {}", report.config.seed)?;
        writeln!(out, "- **Paths**: {}", simulation.total_paths)?;
        writeln!(
            out,
            "- **Completion rate**: {:.1}%",
            percent(simulation.completion_rate)
        )?;
        writeln!(out, "- **Unique paths**: {}", simulation.unique_paths)?;
        writeln!(
            out,
            "- **Average length**: {:.2} cards\n",
            simulation.average_path_length
        )?;

        writeln!(out, "### Cards\n")?;
        writeln!(out, "| Card | Title | Visits | Reach | Ending |")?;
        writeln!(out, "| --- | --- | ---: | ---: | :---: |")?;
        for row in &report.cards {
            writeln!(
                out,
                "| `{}` | {} | {} | {:.1}% | {} |",
                row.card_id,
                row.title.replace('|', "\\|"),
                row.visits,
                percent(row.reach_rate),
                if row.is_dead_end { "✅" } else { "" }
            )?;
        }
        writeln!(out)?;

        if !report.top_paths.is_empty() {
            writeln!(out, "### Most common paths\n")?;
            for stat in &report.top_paths {
                writeln!(
                    out,
                    "1. `{}` ({} runs, {:.1}%)",
                    stat.signature,
                    stat.count,
                    percent(stat.share)
                )?;
            }
            writeln!(out)?;
        }
    }

    writeln!(out, "## Warnings\n")?;
    if !report.has_warnings() {
        writeln!(out, "_None._")?;
    }
    for warning in &report.warnings {
        writeln!(out, "- **{}**: {}", warning.code, warning.message)?;
    }
    Ok(())
}

pub fn generate_csv_report(out: &mut dyn Write, report: &AnalyticsReport) -> Result<()> {
    writeln!(
        out,
        "card_id,title,depth,choice_count,visits,reach_rate,is_dead_end,is_orphaned"
    )?;
    for row in &report.cards {
        writeln!(
            out,
            "{},{},{},{},{},{:.4},{},{}",
            csv_field(&row.card_id),
            csv_field(&row.title),
            row.depth.map(|depth| depth.to_string()).unwrap_or_default(),
            row.choice_count,
            row.visits,
            row.reach_rate,
            row.is_dead_end,
            row.is_orphaned
        )?;
    }
    Ok(())
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use storypath_core::{
        Card, Choice, SimulationConfig, StoryGraph, aggregate_paths, analyze_structure,
        run_simulation,
    };

    fn sample_report(with_simulation: bool) -> AnalyticsReport {
        let graph = StoryGraph::build(
            &[
                Card::new("a", "Start, again"),
                Card::new("b", "The \"End\""),
                Card::new("c", "Lost"),
            ],
            &[Choice::new("go", "a", "b", "go")],
        );
        let config = SimulationConfig::new("a").with_path_count(4);
        let structure = analyze_structure(&graph, "a");
        let analytics = with_simulation
            .then(|| aggregate_paths(&run_simulation(&graph, &config).unwrap()));
        AnalyticsReport::build(
            &graph,
            &structure,
            analytics.as_ref(),
            &config,
            chrono::Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap(),
        )
    }

    fn render(
        writer: fn(&mut dyn Write, &AnalyticsReport) -> Result<()>,
        report: &AnalyticsReport,
    ) -> String {
        let mut buffer = Vec::new();
        writer(&mut buffer, report).unwrap();
        String::from_utf8(buffer).unwrap()
    }

    #[test]
    fn csv_quotes_awkward_titles() {
        let csv = render(generate_csv_report, &sample_report(true));
        let lines: Vec<_> = csv.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[1], "a,\"Start, again\",0,1,4,1.0000,false,false");
        assert_eq!(lines[2], "b,\"The \"\"End\"\"\",1,0,4,1.0000,true,false");
        assert_eq!(lines[3], "c,Lost,,0,0,0.0000,true,true");
    }

    #[test]
    fn json_report_round_trips() {
        let report = sample_report(true);
        let json = render(generate_json_report, &report);
        let parsed: AnalyticsReport = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, report);
    }

    #[test]
    fn markdown_lists_sections() {
        let markdown = render(generate_markdown_report, &sample_report(true));
        assert!(markdown.starts_with("# Story Path Analysis"));
        assert!(markdown.contains("## Simulation"));
        assert!(markdown.contains("`a -> b` (4 runs, 100.0%)"));
        assert!(markdown.contains("**orphaned_cards**"));
    }

    #[test]
    fn console_report_handles_structure_only() {
        colored::control::set_override(false);
        let console = render(generate_console_report, &sample_report(false));
        assert!(console.contains("Reachable: 2/3 cards"));
        assert!(!console.contains("Simulation"));
        assert!(console.contains("cannot be reached"));
    }
}

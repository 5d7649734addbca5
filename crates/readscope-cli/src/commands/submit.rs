//! The `readscope submit` command.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};

use readscope_core::engine::{AssessmentEngine, NarrativeSource, SubmissionOutcome};
use readscope_core::model::Submission;
use readscope_core::report::AssessmentReport;
use readscope_core::repository::InMemoryRepository;
use readscope_core::traits::NarrativeGenerator;
use readscope_providers::{create_provider, load_config_from, ReadscopeConfig};
use readscope_report::{write_html_report, JsonlLedger};

pub async fn execute(
    submission_path: PathBuf,
    output: Option<PathBuf>,
    format: String,
    no_narrator: bool,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let formats: Vec<&str> = if format == "all" {
        vec!["json", "html"]
    } else {
        format.split(',').map(str::trim).collect()
    };
    if let Some(bad) = formats.iter().find(|f| !matches!(**f, "json" | "html")) {
        anyhow::bail!("unknown format '{bad}' (expected json, html or all)");
    }

    let config = load_config_from(config_path.as_deref())?;

    let content = std::fs::read_to_string(&submission_path)
        .with_context(|| format!("failed to read submission: {}", submission_path.display()))?;
    let submission: Submission =
        serde_json::from_str(&content).context("failed to parse submission JSON")?;

    let start = Instant::now();

    // Scoring needs no repository; the session carries its questions.
    let mut engine = AssessmentEngine::new(
        Arc::new(InMemoryRepository::new(Vec::new())),
        config.engine_config(),
    );
    if !no_narrator {
        if let Some(narrator) = narrator_from_config(&config) {
            engine = engine.with_narrator(narrator);
        }
    }
    if let Some(ledger_path) = &config.ledger_path {
        engine = engine.with_sink(Arc::new(JsonlLedger::new(ledger_path)));
    }

    let session = &submission.session;
    let outcome = engine
        .submit(&session.questions, &submission.responses, &session.taker)
        .await;

    let report = AssessmentReport::new(session, outcome, start.elapsed().as_millis() as u64);

    print_summary(&report.outcome);
    println!("{}", report.outcome.overall_comment);

    let output = output.unwrap_or_else(|| config.output_dir.clone());
    std::fs::create_dir_all(&output)
        .with_context(|| format!("failed to create {}", output.display()))?;
    let timestamp = report.created_at.format("%Y-%m-%dT%H%M%S");

    for fmt in &formats {
        match *fmt {
            "json" => {
                let path = output.join(format!("report-{timestamp}.json"));
                report.save_json(&path)?;
                eprintln!("Results saved to: {}", path.display());
            }
            "html" => {
                let path = output.join(format!("report-{timestamp}.html"));
                write_html_report(&report, &path)?;
                eprintln!("HTML report: {}", path.display());
            }
            _ => {}
        }
    }

    Ok(())
}

/// The default provider, when one is configured and can be built.
fn narrator_from_config(config: &ReadscopeConfig) -> Option<Arc<dyn NarrativeGenerator>> {
    let provider_config = config.default_provider_config()?;
    match create_provider(provider_config) {
        Ok(narrator) => Some(narrator),
        Err(e) => {
            tracing::warn!(
                "provider '{}' unavailable, using templated narrative: {e:#}",
                config.default_provider
            );
            None
        }
    }
}

fn print_summary(outcome: &SubmissionOutcome) {
    use comfy_table::{Cell, Table};

    let profile = &outcome.analysis;
    let mut table = Table::new();
    table.set_header(vec!["Skill", "Correct", "Score"]);

    for skill in &profile.skills {
        table.add_row(vec![
            Cell::new(&skill.name),
            Cell::new(format!("{}/{}", skill.correct, skill.total)),
            Cell::new(format!("{}%", skill.percent)),
        ]);
    }
    if let Some(speed) = profile.speed {
        table.add_row(vec![
            Cell::new("speed"),
            Cell::new(outcome.timing.archetype.label()),
            Cell::new(format!("{speed}")),
        ]);
    }
    table.add_row(vec![
        Cell::new("overall"),
        Cell::new(format!("{}/{}", profile.total_correct, profile.total_questions)),
        Cell::new(
            profile
                .overall_percent()
                .map(|p| format!("{p}%"))
                .unwrap_or_else(|| "n/a".into()),
        ),
    ]);

    eprintln!("\n{table}");

    let m = &outcome.metacognition;
    eprintln!(
        "Confident & correct: {} | Confident & wrong: {} | Unsure & correct: {} | Unsure & wrong: {}",
        m.confident_correct.count, m.confident_error.count, m.unsure_correct.count, m.unsure_error.count
    );
    match &outcome.narrative_source {
        NarrativeSource::Generated { provider, model } => {
            eprintln!("Narrative: {provider} ({model})\n")
        }
        NarrativeSource::Templated { reason } => eprintln!("Narrative: template ({reason})\n"),
    }
}

//! The `readscope compare` command.

use std::path::PathBuf;

use anyhow::Result;

use readscope_core::report::AssessmentReport;

pub fn execute(
    baseline_path: PathBuf,
    current_path: PathBuf,
    threshold: u32,
    fail_on_decline: bool,
    format: String,
) -> Result<()> {
    let baseline = AssessmentReport::load_json(&baseline_path)?;
    let current = AssessmentReport::load_json(&current_path)?;

    if baseline.taker.name != current.taker.name {
        tracing::warn!(
            "comparing reports for different test-takers: '{}' vs '{}'",
            baseline.taker.name,
            current.taker.name
        );
    }

    let report = current.compare(&baseline, threshold);

    match format.as_str() {
        "markdown" | "md" => {
            println!("{}", report.to_markdown());
        }
        "json" => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        _ => {
            let overall = |p: Option<u32>| p.map(|p| format!("{p}%")).unwrap_or_else(|| "n/a".into());
            println!(
                "Progress: {} gains, {} declines, {} unchanged (overall {} -> {})",
                report.gains.len(),
                report.declines.len(),
                report.unchanged,
                overall(report.baseline_overall),
                overall(report.current_overall),
            );

            if !report.gains.is_empty() {
                println!("\nGains:");
                for g in &report.gains {
                    println!(
                        "  {} {}% -> {}% ({:+})",
                        g.skill, g.baseline, g.current, g.delta
                    );
                }
            }

            if !report.declines.is_empty() {
                println!("\nDeclines:");
                for d in &report.declines {
                    println!(
                        "  {} {}% -> {}% ({:+})",
                        d.skill, d.baseline, d.current, d.delta
                    );
                }
            }

            if !report.new_skills.is_empty() {
                println!("\nNewly assessed: {}", report.new_skills.join(", "));
            }
            if !report.dropped_skills.is_empty() {
                println!("Not assessed this time: {}", report.dropped_skills.join(", "));
            }
        }
    }

    if fail_on_decline && report.has_declines() {
        std::process::exit(1);
    }

    Ok(())
}

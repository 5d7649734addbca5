//! HTML coaching report.
//!
//! Produces a self-contained HTML file with all CSS/JS inlined.

use std::path::Path;

use anyhow::{Context, Result};

use readscope_core::engine::NarrativeSource;
use readscope_core::evaluator::GradeBasis;
use readscope_core::metacognition::{MatrixCell, MetacognitionMatrix};
use readscope_core::report::AssessmentReport;
use readscope_core::scoring::BucketScore;

/// Escape a string for safe HTML insertion.
fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

fn basis_label(basis: GradeBasis) -> &'static str {
    match basis {
        GradeBasis::Exact => "exact match",
        GradeBasis::LengthProxy => "length estimate",
        GradeBasis::Missing => "no answer",
    }
}

/// Render a report as a standalone HTML page.
pub fn render_html(report: &AssessmentReport) -> String {
    let outcome = &report.outcome;
    let profile = &outcome.analysis;
    let mut html = String::new();

    html.push_str("<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n");
    html.push_str("<meta charset=\"utf-8\">\n");
    html.push_str("<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n");
    html.push_str(&format!(
        "<title>Reading report: {}</title>\n",
        html_escape(&report.taker.name)
    ));
    html.push_str("<style>\n");
    html.push_str(CSS);
    html.push_str("</style>\n");
    html.push_str("</head>\n<body>\n");

    html.push_str("<header>\n");
    html.push_str(&format!(
        "<h1>Reading report for {}</h1>\n",
        html_escape(&report.taker.name)
    ));
    html.push_str(&format!(
        "<p class=\"meta\">Age {} ({} band) | {} questions | {}</p>\n",
        report.taker.age,
        report.age_band.range_label(),
        report.question_count,
        report.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    ));
    let overall = profile
        .overall_percent()
        .map(|p| format!("{p}%"))
        .unwrap_or_else(|| "n/a".into());
    html.push_str(&format!(
        "<p class=\"overall\">{} of {} correct <strong>{}</strong></p>\n",
        profile.total_correct, profile.total_questions, overall
    ));
    html.push_str("</header>\n");

    // Narrative
    html.push_str("<section class=\"narrative\">\n<h2>Coach's notes</h2>\n");
    for paragraph in outcome
        .overall_comment
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
    {
        html.push_str(&format!("<p>{}</p>\n", html_escape(paragraph)));
    }
    let source = match &outcome.narrative_source {
        NarrativeSource::Generated { provider, model } => {
            format!("Written by {} ({})", html_escape(provider), html_escape(model))
        }
        NarrativeSource::Templated { reason } => {
            format!("Standard template ({})", html_escape(reason))
        }
    };
    html.push_str(&format!("<p class=\"meta\">{source}</p>\n"));
    html.push_str("</section>\n");

    // Skills
    html.push_str("<section class=\"skills\">\n<h2>Skills</h2>\n");
    if profile.skills.is_empty() {
        html.push_str("<p>No skills were scored.</p>\n");
    } else {
        html.push_str(&generate_bar_chart(&profile.skills));
    }
    if let Some(speed) = profile.speed {
        html.push_str(&format!(
            "<p>Reading speed: <strong>{}</strong> ({}, agility {:+.2})</p>\n",
            speed,
            outcome.timing.archetype.label(),
            outcome.timing.agility_score
        ));
    }
    push_bucket_table(&mut html, "Genres", &profile.genres);
    push_bucket_table(&mut html, "Categories", &profile.categories);
    html.push_str("</section>\n");

    html.push_str(&metacognition_grid(&outcome.metacognition));

    // Recommendations
    if !outcome.recommendations.is_empty() {
        html.push_str("<section class=\"recommendations\">\n<h2>What to practise</h2>\n<ul>\n");
        for rec in &outcome.recommendations {
            html.push_str(&format!(
                "<li><strong>{}</strong>: {}</li>\n",
                html_escape(&rec.skill),
                html_escape(&rec.text)
            ));
        }
        html.push_str("</ul>\n</section>\n");
    }

    // Missed items
    let feedback = &outcome.coaching.item_feedback;
    if !feedback.is_empty() {
        html.push_str("<section class=\"missed\">\n<h2>Questions to review</h2>\n");
        html.push_str("<table class=\"results-table\" id=\"missed\">\n");
        html.push_str("<thead><tr><th onclick=\"sortTable(0)\">#</th><th onclick=\"sortTable(1)\">Question</th><th onclick=\"sortTable(2)\">Skill</th><th>Your answer</th><th>Expected</th><th>Feedback</th><th onclick=\"sortTable(6)\">Graded by</th></tr></thead>\n");
        html.push_str("<tbody>\n");
        for item in feedback {
            html.push_str(&format!(
                "<tr class=\"fail\"><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td class=\"basis\">{}</td></tr>\n",
                item.number,
                html_escape(&item.title),
                html_escape(&item.skill),
                item.submitted.as_deref().map(html_escape).unwrap_or_else(|| "-".into()),
                item.expected.as_deref().map(html_escape).unwrap_or_else(|| "-".into()),
                html_escape(&item.feedback),
                basis_label(item.basis),
            ));
        }
        html.push_str("</tbody></table>\n</section>\n");
    }

    if outcome
        .items
        .iter()
        .any(|i| i.basis == GradeBasis::LengthProxy)
    {
        html.push_str("<p class=\"meta\">Written answers are scored by length only. That score is an estimate of completeness, not a judgment of content.</p>\n");
    }

    // Raw JSON
    html.push_str("<section class=\"raw-data\">\n");
    html.push_str("<details>\n<summary>Raw JSON Data</summary>\n");
    html.push_str("<pre><code>");
    html.push_str(&html_escape(
        &serde_json::to_string_pretty(report).unwrap_or_default(),
    ));
    html.push_str("</code></pre>\n");
    html.push_str("</details>\n</section>\n");

    html.push_str("<script>\n");
    html.push_str(JS);
    html.push_str("</script>\n");

    html.push_str("</body>\n</html>");
    html
}

/// Write an HTML report to a file.
pub fn write_html_report(report: &AssessmentReport, path: &Path) -> Result<()> {
    let html = render_html(report);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, html)
        .with_context(|| format!("failed to write HTML report to {}", path.display()))?;
    Ok(())
}

fn push_bucket_table(html: &mut String, heading: &str, buckets: &[BucketScore]) {
    if buckets.is_empty() {
        return;
    }
    html.push_str(&format!("<h3>{heading}</h3>\n"));
    html.push_str("<table class=\"summary\">\n");
    html.push_str("<thead><tr><th>Name</th><th>Correct</th><th>Score</th></tr></thead>\n<tbody>\n");
    for b in buckets {
        html.push_str(&format!(
            "<tr><td>{}</td><td>{}/{}</td><td>{}%</td></tr>\n",
            html_escape(&b.name),
            b.correct,
            b.total,
            b.percent
        ));
    }
    html.push_str("</tbody></table>\n");
}

fn grid_cell(cell: &MatrixCell, class: &str) -> String {
    let time = cell
        .mean_elapsed_secs()
        .map(|t| format!("<br><small>avg {t:.0}s</small>"))
        .unwrap_or_default();
    format!("<td class=\"{class}\"><strong>{}</strong>{time}</td>", cell.count)
}

fn metacognition_grid(matrix: &MetacognitionMatrix) -> String {
    let mut html = String::from("<section class=\"metacognition\">\n<h2>Confidence vs. correctness</h2>\n");
    html.push_str("<table class=\"grid\">\n");
    html.push_str("<thead><tr><th></th><th>Correct</th><th>Incorrect</th></tr></thead>\n<tbody>\n");
    html.push_str(&format!(
        "<tr><th>Confident</th>{}{}</tr>\n",
        grid_cell(&matrix.confident_correct, "pass"),
        grid_cell(&matrix.confident_error, "alert"),
    ));
    html.push_str(&format!(
        "<tr><th>Unsure</th>{}{}</tr>\n",
        grid_cell(&matrix.unsure_correct, "pass"),
        grid_cell(&matrix.unsure_error, "fail"),
    ));
    html.push_str("</tbody></table>\n");
    if matrix.confident_error.count > 0 {
        html.push_str(&format!(
            "<p class=\"priority\">{} answer(s) were wrong despite high confidence. Review these first.</p>\n",
            matrix.confident_error.count
        ));
    }
    if let Some(calibration) = matrix.calibration() {
        html.push_str(&format!(
            "<p class=\"meta\">Calibration: {:.0}% of answers matched the stated confidence.</p>\n",
            calibration * 100.0
        ));
    }
    html.push_str("</section>\n");
    html
}

fn generate_bar_chart(skills: &[BucketScore]) -> String {
    let bar_height = 30;
    let max_width = 400;
    let padding = 10;
    let label_width = 200;

    let total_height = skills.len() * (bar_height + padding) + padding;

    let mut svg = format!(
        "<svg width=\"{}\" height=\"{}\" xmlns=\"http://www.w3.org/2000/svg\">\n",
        label_width + max_width + 60,
        total_height
    );

    for (i, skill) in skills.iter().enumerate() {
        let y = i * (bar_height + padding) + padding;
        let width = skill.percent.min(100) as usize * max_width / 100;

        let color = if skill.percent >= 80 {
            "#22c55e"
        } else if skill.percent >= 50 {
            "#eab308"
        } else {
            "#ef4444"
        };

        svg.push_str(&format!(
            "  <text x=\"{}\" y=\"{}\" font-size=\"14\" fill=\"currentColor\" text-anchor=\"end\" dominant-baseline=\"middle\">{}</text>\n",
            label_width - 10,
            y + bar_height / 2,
            html_escape(&skill.name)
        ));
        svg.push_str(&format!(
            "  <rect x=\"{}\" y=\"{}\" width=\"{}\" height=\"{}\" fill=\"{}\" rx=\"4\"/>\n",
            label_width, y, width, bar_height, color
        ));
        svg.push_str(&format!(
            "  <text x=\"{}\" y=\"{}\" font-size=\"12\" fill=\"currentColor\" dominant-baseline=\"middle\">{}% ({}/{})</text>\n",
            label_width + width + 8,
            y + bar_height / 2,
            skill.percent,
            skill.correct,
            skill.total
        ));
    }

    svg.push_str("</svg>\n");
    svg
}

const CSS: &str = r#"
:root { --bg: #fff; --fg: #1a1a1a; --border: #e5e7eb; --pass: #dcfce7; --fail: #fde2e2; --alert: #fecaca; }
@media (prefers-color-scheme: dark) {
  :root { --bg: #111827; --fg: #f9fafb; --border: #374151; --pass: #064e3b; --fail: #7f1d1d; --alert: #991b1b; }
}
body { font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', sans-serif; margin: 0; padding: 2rem; background: var(--bg); color: var(--fg); max-width: 60rem; }
h1, h2 { margin-top: 2rem; }
.meta { color: #6b7280; }
.overall { font-size: 1.25rem; }
.priority { font-weight: bold; }
table { border-collapse: collapse; width: 100%; margin: 1rem 0; }
th, td { border: 1px solid var(--border); padding: 0.5rem 1rem; text-align: left; }
th { background: var(--border); cursor: pointer; }
.grid { width: auto; }
.grid td { text-align: center; min-width: 8rem; }
.pass { background: var(--pass); }
.fail { background: var(--fail); }
.alert { background: var(--alert); }
.basis { font-style: italic; }
pre { overflow-x: auto; padding: 1rem; background: var(--border); border-radius: 8px; }
code { font-family: 'JetBrains Mono', 'Fira Code', monospace; font-size: 0.85rem; }
details { margin: 1rem 0; }
summary { cursor: pointer; font-weight: bold; }
svg { margin: 1rem 0; }
"#;

const JS: &str = r#"
function sortTable(col) {
  const table = document.getElementById('missed');
  if (!table) return;
  const tbody = table.querySelector('tbody');
  const rows = Array.from(tbody.querySelectorAll('tr'));
  const asc = table.dataset.sortCol == col && table.dataset.sortDir == 'asc' ? false : true;
  rows.sort((a, b) => {
    const va = a.cells[col].textContent;
    const vb = b.cells[col].textContent;
    return asc ? va.localeCompare(vb, undefined, { numeric: true }) : vb.localeCompare(va, undefined, { numeric: true });
  });
  table.dataset.sortCol = col;
  table.dataset.sortDir = asc ? 'asc' : 'desc';
  rows.forEach(r => tbody.appendChild(r));
}
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use readscope_core::engine::{analyze, EngineConfig};
    use readscope_core::model::{
        AgeBand, ChoiceOption, Confidence, Question, QuestionKind, Response, SessionQuestion,
        TestTakerInfo,
    };

    fn question(id: &str, skill: &str, kind: QuestionKind) -> SessionQuestion {
        SessionQuestion {
            number: 0,
            question: Question {
                id: id.into(),
                age_band: AgeBand::Intermediate,
                category: Some("literature".into()),
                skill: skill.into(),
                genre: Some("fiction".into()),
                difficulty: Default::default(),
                expected_time_secs: 60,
                title: format!("Question {id}"),
                passage: None,
                prompt: "?".into(),
                kind,
            },
        }
    }

    fn make_test_report(name: &str) -> AssessmentReport {
        let mut questions = vec![
            question(
                "q1",
                "inference",
                QuestionKind::SingleChoice {
                    options: vec![
                        ChoiceOption {
                            text: "The storm <ended>".into(),
                            key: Some("A".into()),
                            is_answer: true,
                            feedback: None,
                        },
                        ChoiceOption {
                            text: "The storm grew".into(),
                            key: Some("B".into()),
                            is_answer: false,
                            feedback: Some("Look again at the last line & the sky.".into()),
                        },
                    ],
                },
            ),
            question("q2", "essay", QuestionKind::OpenText { min_chars: 20 }),
            question(
                "q3",
                "sentence_ordering",
                QuestionKind::Ordering {
                    answer: "B-A-C".into(),
                },
            ),
        ];
        for (i, q) in questions.iter_mut().enumerate() {
            q.number = i + 1;
        }
        let responses = vec![
            Response {
                question_id: "q1".into(),
                answer: Some("B".into()),
                confidence: Confidence::Confident,
                elapsed_secs: Some(90.0),
            },
            Response {
                question_id: "q2".into(),
                answer: Some("A long enough written answer.".into()),
                confidence: Confidence::Unsure,
                elapsed_secs: Some(30.0),
            },
        ];

        let analysis = analyze(&questions, &responses, &EngineConfig::default());
        let comment = analysis.coaching.narrative.clone();
        let outcome = analysis.into_outcome(
            comment,
            NarrativeSource::Templated {
                reason: "no narrator configured".into(),
            },
        );

        AssessmentReport {
            id: uuid::Uuid::nil(),
            created_at: chrono::Utc::now(),
            session_id: uuid::Uuid::nil(),
            taker: TestTakerInfo {
                name: name.into(),
                age: 15,
                access_code: None,
            },
            age_band: AgeBand::Intermediate,
            question_count: questions.len(),
            outcome,
            duration_ms: 12,
        }
    }

    #[test]
    fn html_report_contains_required_elements() {
        let html = render_html(&make_test_report("Mina"));

        assert!(html.contains("<html"));
        assert!(html.contains("</html>"));
        assert!(html.contains("Reading report for Mina"));
        assert!(html.contains("1 of 3 correct"));
        assert!(html.contains("Confidence vs. correctness"));
        assert!(html.contains("Review these first"));
        assert!(html.contains("Standard template (no narrator configured)"));
        assert!(html.contains("<svg"));
    }

    #[test]
    fn missed_items_show_feedback_and_basis() {
        let html = render_html(&make_test_report("Mina"));

        assert!(html.contains("Look again at the last line &amp; the sky."));
        assert!(html.contains("B-A-C"));
        assert!(html.contains("no answer"));
        assert!(html.contains("scored by length only"));
    }

    #[test]
    fn user_text_is_escaped() {
        let html = render_html(&make_test_report("<script>alert(1)</script>"));

        assert!(!html.contains("<script>alert(1)</script>"));
        assert!(html.contains("&lt;script&gt;alert(1)&lt;/script&gt;"));
    }

    #[test]
    fn html_report_write_to_file() {
        let report = make_test_report("Mina");
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("report.html");

        write_html_report(&report, &path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("<html"));
    }
}

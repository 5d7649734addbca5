//! Assessment report types with JSON persistence, progress comparison, and
//! the flat export row handed to the result sink.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::SubmissionOutcome;
use crate::model::{AgeBand, TestSession, TestTakerInfo};

/// Flat record of one finished assessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportRow {
    pub timestamp: DateTime<Utc>,
    pub name: String,
    pub age: u32,
    /// Per-skill percentages plus the speed score.
    pub skill_scores: BTreeMap<String, u32>,
    #[serde(default)]
    pub overall_percent: Option<u32>,
    /// The overall comment on a single line.
    pub narrative: String,
}

impl ExportRow {
    pub fn new(taker: &TestTakerInfo, outcome: &SubmissionOutcome, timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            name: taker.name.clone(),
            age: taker.age,
            skill_scores: outcome.analysis.as_map(),
            overall_percent: outcome.analysis.overall_percent(),
            narrative: flatten_narrative(&outcome.overall_comment),
        }
    }
}

/// Join paragraphs and lines with single spaces.
pub fn flatten_narrative(text: &str) -> String {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// A complete, persisted assessment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssessmentReport {
    /// Unique report identifier.
    pub id: Uuid,
    /// When the report was created.
    pub created_at: DateTime<Utc>,
    /// The session this report grades.
    pub session_id: Uuid,
    pub taker: TestTakerInfo,
    pub age_band: AgeBand,
    pub question_count: usize,
    pub outcome: SubmissionOutcome,
    /// Wall-clock time spent producing the report.
    pub duration_ms: u64,
}

impl AssessmentReport {
    pub fn new(session: &TestSession, outcome: SubmissionOutcome, duration_ms: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            session_id: session.id,
            taker: session.taker.clone(),
            age_band: session.age_band,
            question_count: session.questions.len(),
            outcome,
            duration_ms,
        }
    }

    /// Save the report as JSON to a file.
    pub fn save_json(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).context("failed to serialize report")?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, json)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        Ok(())
    }

    /// Load a report from a JSON file.
    pub fn load_json(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read report from {}", path.display()))?;
        let report: AssessmentReport =
            serde_json::from_str(&content).context("failed to parse report JSON")?;
        Ok(report)
    }

    /// Compare per-skill scores against an earlier report.
    ///
    /// Changes of at most `threshold_points` either way count as unchanged.
    pub fn compare(&self, baseline: &AssessmentReport, threshold_points: u32) -> ProgressReport {
        let baseline_scores = baseline.outcome.analysis.as_map();
        let current_scores = self.outcome.analysis.as_map();
        let threshold = i64::from(threshold_points);

        let mut gains = Vec::new();
        let mut declines = Vec::new();
        let mut unchanged = 0usize;
        let mut new_skills = Vec::new();

        for (skill, &current) in &current_scores {
            let Some(&before) = baseline_scores.get(skill) else {
                new_skills.push(skill.clone());
                continue;
            };
            let delta = i64::from(current) - i64::from(before);
            let change = SkillChange {
                skill: skill.clone(),
                baseline: before,
                current,
                delta,
            };
            if delta > threshold {
                gains.push(change);
            } else if delta < -threshold {
                declines.push(change);
            } else {
                unchanged += 1;
            }
        }

        let dropped_skills = baseline_scores
            .keys()
            .filter(|k| !current_scores.contains_key(*k))
            .cloned()
            .collect();

        ProgressReport {
            baseline_overall: baseline.outcome.analysis.overall_percent(),
            current_overall: self.outcome.analysis.overall_percent(),
            gains,
            declines,
            unchanged,
            new_skills,
            dropped_skills,
        }
    }
}

/// Result of comparing two assessments of the same test-taker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressReport {
    pub baseline_overall: Option<u32>,
    pub current_overall: Option<u32>,
    /// Skills whose score rose beyond the threshold.
    pub gains: Vec<SkillChange>,
    /// Skills whose score fell beyond the threshold.
    pub declines: Vec<SkillChange>,
    /// Skills within the threshold.
    pub unchanged: usize,
    /// Skills assessed now but not in the baseline.
    pub new_skills: Vec<String>,
    /// Skills assessed in the baseline but not now.
    pub dropped_skills: Vec<String>,
}

/// Score movement for one skill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillChange {
    pub skill: String,
    pub baseline: u32,
    pub current: u32,
    /// `current - baseline`, in percentage points.
    pub delta: i64,
}

fn overall_label(percent: Option<u32>) -> String {
    percent.map_or_else(|| "n/a".to_string(), |p| format!("{p}%"))
}

impl ProgressReport {
    /// Format the progress report as markdown.
    pub fn to_markdown(&self) -> String {
        let mut md = String::new();

        md.push_str(&format!(
            "**Overall:** {} → {}\n\n",
            overall_label(self.baseline_overall),
            overall_label(self.current_overall)
        ));
        md.push_str(&format!(
            "**Summary:** {} gains, {} declines, {} unchanged\n\n",
            self.gains.len(),
            self.declines.len(),
            self.unchanged
        ));

        for (heading, changes) in [("Gains", &self.gains), ("Declines", &self.declines)] {
            if changes.is_empty() {
                continue;
            }
            md.push_str(&format!("### {heading}\n\n"));
            md.push_str("| Skill | Before | Now | Change |\n");
            md.push_str("|-------|--------|-----|--------|\n");
            for c in changes {
                md.push_str(&format!(
                    "| {} | {}% | {}% | {:+} |\n",
                    c.skill, c.baseline, c.current, c.delta
                ));
            }
            md.push('\n');
        }

        if !self.new_skills.is_empty() {
            md.push_str(&format!("Newly assessed: {}\n", self.new_skills.join(", ")));
        }
        if !self.dropped_skills.is_empty() {
            md.push_str(&format!("Not assessed this time: {}\n", self.dropped_skills.join(", ")));
        }

        md
    }

    /// Returns true if any skill declined beyond the threshold.
    pub fn has_declines(&self) -> bool {
        !self.declines.is_empty()
    }
}

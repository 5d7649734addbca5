//! Core data model types for readscope.
//!
//! These are the fundamental types the whole system uses to represent
//! questions, question banks, test sessions, and submitted responses.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Coarse age bucket used to filter age-appropriate content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgeBand {
    /// Ages 10–13 (and anyone younger).
    Junior,
    /// Ages 14–16.
    Intermediate,
    /// Ages 17–19 (and anyone older).
    Senior,
}

impl AgeBand {
    /// Map an age to its band. Total over all ages.
    pub fn from_age(age: u32) -> Self {
        match age {
            0..=13 => AgeBand::Junior,
            14..=16 => AgeBand::Intermediate,
            _ => AgeBand::Senior,
        }
    }

    /// Human-readable age range.
    pub fn range_label(&self) -> &'static str {
        match self {
            AgeBand::Junior => "10-13",
            AgeBand::Intermediate => "14-16",
            AgeBand::Senior => "17-19",
        }
    }
}

impl fmt::Display for AgeBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgeBand::Junior => write!(f, "junior"),
            AgeBand::Intermediate => write!(f, "intermediate"),
            AgeBand::Senior => write!(f, "senior"),
        }
    }
}

impl FromStr for AgeBand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "junior" | "10-13" => Ok(AgeBand::Junior),
            "intermediate" | "14-16" => Ok(AgeBand::Intermediate),
            "senior" | "17-19" => Ok(AgeBand::Senior),
            other => Err(format!("unknown age band: {other}")),
        }
    }
}

/// Question difficulty.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            other => Err(format!("unknown difficulty: {other}")),
        }
    }
}

/// One option of a single-choice question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChoiceOption {
    /// Display text.
    pub text: String,
    /// Short label submitted instead of the text (e.g. "C").
    #[serde(default)]
    pub key: Option<String>,
    /// Whether this is the correct option.
    #[serde(default)]
    pub is_answer: bool,
    /// Explanation shown when this option is chosen wrongly.
    #[serde(default)]
    pub feedback: Option<String>,
}

impl ChoiceOption {
    /// The string a test-taker submits to pick this option.
    pub fn value(&self) -> &str {
        self.key.as_deref().unwrap_or(&self.text)
    }
}

/// Type-specific part of a question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QuestionKind {
    /// Pick exactly one option.
    SingleChoice { options: Vec<ChoiceOption> },
    /// Reorder sentences or paragraphs, answered as e.g. "C-A-E-B-D".
    Ordering { answer: String },
    /// Free text, graded by a minimum length.
    OpenText { min_chars: usize },
}

impl QuestionKind {
    /// Short name used in logs and reports.
    pub fn label(&self) -> &'static str {
        match self {
            QuestionKind::SingleChoice { .. } => "single_choice",
            QuestionKind::Ordering { .. } => "ordering",
            QuestionKind::OpenText { .. } => "open_text",
        }
    }
}

/// A single question in the repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    /// Unique identifier.
    pub id: String,
    /// Age band this question is written for.
    pub age_band: AgeBand,
    /// Coarse content class, e.g. "literature" or "non-literature".
    #[serde(default)]
    pub category: Option<String>,
    /// Raw skill tag, mapped to a scoring bucket by the taxonomy.
    pub skill: String,
    /// Topical genre tag.
    #[serde(default)]
    pub genre: Option<String>,
    #[serde(default)]
    pub difficulty: Difficulty,
    /// Expected solving time in seconds.
    pub expected_time_secs: u32,
    /// Short title shown above the prompt.
    #[serde(default)]
    pub title: String,
    /// Reading passage, if the question has one.
    #[serde(default)]
    pub passage: Option<String>,
    /// The question itself.
    pub prompt: String,
    /// Type-specific answer data.
    pub kind: QuestionKind,
}

impl Question {
    /// The marked answer for single-choice questions.
    pub fn answer_option(&self) -> Option<&ChoiceOption> {
        match &self.kind {
            QuestionKind::SingleChoice { options } => options.iter().find(|o| o.is_answer),
            _ => None,
        }
    }

    /// The option whose submitted value equals `value`.
    pub fn option_for(&self, value: &str) -> Option<&ChoiceOption> {
        match &self.kind {
            QuestionKind::SingleChoice { options } => options.iter().find(|o| o.value() == value),
            _ => None,
        }
    }
}

/// A collection of questions loaded from one bank file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestionBank {
    /// Unique identifier for this bank.
    pub id: String,
    /// Human-readable name.
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub questions: Vec<Question>,
}

/// Self-reported confidence for one response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    #[serde(alias = "sure", alias = "certain")]
    Confident,
    #[serde(alias = "guess", alias = "not_sure")]
    Unsure,
    /// Anything the client sent that we do not recognize.
    #[default]
    #[serde(other)]
    Unrecognized,
}

/// A test-taker's answer to one question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Id of the question this answers.
    pub question_id: String,
    /// Submitted answer; `None` when left blank.
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default)]
    pub confidence: Confidence,
    /// Solving time in seconds, if the client measured it.
    #[serde(default)]
    pub elapsed_secs: Option<f64>,
}

/// Who is taking the assessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestTakerInfo {
    pub name: String,
    pub age: u32,
    /// One-time access code, when the deployment requires one.
    #[serde(default)]
    pub access_code: Option<String>,
}

/// Skill → number of questions to draw. Ordered for reproducible composition.
pub type TestStructure = BTreeMap<String, usize>;

/// Parse a structure such as `"comprehension=2,inference=2"`.
pub fn parse_structure(s: &str) -> Result<TestStructure, String> {
    let mut structure = TestStructure::new();
    for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (skill, count) = part
            .split_once('=')
            .ok_or_else(|| format!("expected skill=count, got '{part}'"))?;
        let count: usize = count
            .trim()
            .parse()
            .map_err(|_| format!("invalid count for '{}': '{}'", skill.trim(), count.trim()))?;
        structure.insert(skill.trim().to_string(), count);
    }
    Ok(structure)
}

/// A question as presented in a session, with its display number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionQuestion {
    /// 1-based position in the presented test.
    pub number: usize,
    pub question: Question,
}

/// One assessment attempt. The question list is fixed once composed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestSession {
    pub id: Uuid,
    pub created_at: DateTime<Utc>,
    pub taker: TestTakerInfo,
    pub age_band: AgeBand,
    pub questions: Vec<SessionQuestion>,
}

impl TestSession {
    /// `true` when composition found no content for this taker.
    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }
}

/// A completed session as sent back for scoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub session: TestSession,
    #[serde(default)]
    pub responses: Vec<Response>,
}

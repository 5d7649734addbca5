//! TOML question bank parser.
//!
//! Loads question banks from TOML files and directories, and validates them.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::model::{AgeBand, ChoiceOption, Difficulty, Question, QuestionBank, QuestionKind};

/// Intermediate TOML structure for parsing bank files.
#[derive(Debug, Deserialize)]
struct TomlBankFile {
    bank: TomlBankHeader,
    #[serde(default)]
    questions: Vec<TomlQuestion>,
}

#[derive(Debug, Deserialize)]
struct TomlBankHeader {
    id: String,
    name: String,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct TomlQuestion {
    id: String,
    age_band: String,
    #[serde(rename = "type")]
    kind: String,
    skill: String,
    prompt: String,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    genre: Option<String>,
    #[serde(default)]
    difficulty: Option<String>,
    #[serde(default = "default_expected_time")]
    expected_time_secs: u32,
    #[serde(default)]
    title: String,
    #[serde(default)]
    passage: Option<String>,
    #[serde(default)]
    options: Vec<TomlOption>,
    #[serde(default)]
    answer: Option<String>,
    #[serde(default)]
    min_chars: Option<usize>,
}

fn default_expected_time() -> u32 {
    60
}

#[derive(Debug, Deserialize)]
struct TomlOption {
    text: String,
    #[serde(default)]
    key: Option<String>,
    #[serde(default)]
    is_answer: bool,
    #[serde(default)]
    feedback: Option<String>,
}

/// Parse a single TOML file into a `QuestionBank`.
pub fn parse_question_bank(path: &Path) -> Result<QuestionBank> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read question bank: {}", path.display()))?;

    parse_question_bank_str(&content, path)
}

/// Parse a TOML string into a `QuestionBank` (useful for testing).
pub fn parse_question_bank_str(content: &str, source_path: &Path) -> Result<QuestionBank> {
    let parsed: TomlBankFile = toml::from_str(content)
        .with_context(|| format!("failed to parse TOML: {}", source_path.display()))?;

    let questions = parsed
        .questions
        .into_iter()
        .map(convert_question)
        .collect::<Result<Vec<_>>>()?;

    Ok(QuestionBank {
        id: parsed.bank.id,
        name: parsed.bank.name,
        description: parsed.bank.description,
        questions,
    })
}

fn convert_question(q: TomlQuestion) -> Result<Question> {
    let age_band: AgeBand = q
        .age_band
        .parse()
        .map_err(|e: String| anyhow::anyhow!("question {}: {}", q.id, e))?;

    let difficulty = q
        .difficulty
        .map(|d| d.parse::<Difficulty>())
        .transpose()
        .map_err(|e| anyhow::anyhow!("question {}: {}", q.id, e))?
        .unwrap_or_default();

    let kind = match q.kind.as_str() {
        "single_choice" | "multiple_choice" => QuestionKind::SingleChoice {
            options: q
                .options
                .into_iter()
                .map(|o| ChoiceOption {
                    text: o.text,
                    key: o.key,
                    is_answer: o.is_answer,
                    feedback: o.feedback,
                })
                .collect(),
        },
        "ordering" => QuestionKind::Ordering {
            answer: q
                .answer
                .with_context(|| format!("question {}: ordering needs an answer", q.id))?,
        },
        "open_text" | "essay" => QuestionKind::OpenText {
            min_chars: q
                .min_chars
                .with_context(|| format!("question {}: open_text needs min_chars", q.id))?,
        },
        other => anyhow::bail!("question {}: unknown question type '{other}'", q.id),
    };

    Ok(Question {
        id: q.id,
        age_band,
        category: q.category,
        skill: q.skill,
        genre: q.genre,
        difficulty,
        expected_time_secs: q.expected_time_secs,
        title: q.title,
        passage: q.passage,
        prompt: q.prompt,
        kind,
    })
}

/// Recursively load all `.toml` question banks from a directory.
pub fn load_bank_directory(dir: &Path) -> Result<Vec<QuestionBank>> {
    let mut banks = Vec::new();

    if !dir.is_dir() {
        anyhow::bail!("not a directory: {}", dir.display());
    }

    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("failed to read directory: {}", dir.display()))?
    {
        let entry = entry?;
        let path = entry.path();

        if path.is_dir() {
            banks.extend(load_bank_directory(&path)?);
        } else if path.extension().is_some_and(|ext| ext == "toml") {
            match parse_question_bank(&path) {
                Ok(bank) => banks.push(bank),
                Err(e) => {
                    tracing::warn!("skipping {}: {:#}", path.display(), e);
                }
            }
        }
    }

    Ok(banks)
}

/// Load a single bank file or every bank under a directory.
pub fn load_banks(path: &Path) -> Result<Vec<QuestionBank>> {
    if path.is_dir() {
        load_bank_directory(path)
    } else {
        Ok(vec![parse_question_bank(path)?])
    }
}

/// A warning from question bank validation.
#[derive(Debug, Clone)]
pub struct ValidationWarning {
    /// The question ID (if applicable).
    pub question_id: Option<String>,
    /// Warning message.
    pub message: String,
}

/// Validate a question bank for common authoring issues.
pub fn validate_question_bank(bank: &QuestionBank) -> Vec<ValidationWarning> {
    let mut warnings = Vec::new();
    let mut warn = |id: &str, message: String| {
        warnings.push(ValidationWarning {
            question_id: Some(id.to_string()),
            message,
        });
    };

    let mut seen_ids = std::collections::HashSet::new();
    for q in &bank.questions {
        if !seen_ids.insert(&q.id) {
            warn(&q.id, format!("duplicate question ID: {}", q.id));
        }

        if q.prompt.trim().is_empty() {
            warn(&q.id, "prompt is empty".into());
        }

        if q.expected_time_secs == 0 {
            warn(
                &q.id,
                "expected_time_secs is 0; timing analysis will treat every answer as slow".into(),
            );
        }

        match &q.kind {
            QuestionKind::SingleChoice { options } => {
                let marked = options.iter().filter(|o| o.is_answer).count();
                if marked != 1 {
                    warn(
                        &q.id,
                        format!("single_choice must mark exactly one answer, found {marked}"),
                    );
                }
                if options.len() < 2 {
                    warn(&q.id, "single_choice has fewer than two options".into());
                }
            }
            QuestionKind::Ordering { answer } => {
                if answer.trim().is_empty() {
                    warn(&q.id, "ordering answer is empty".into());
                }
            }
            QuestionKind::OpenText { min_chars } => {
                if *min_chars == 0 {
                    warn(&q.id, "open_text min_chars is 0; every answer counts".into());
                }
            }
        }
    }

    warnings
}

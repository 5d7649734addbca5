//! Collaborator traits: question repository, access-code store, narrative
//! generator, and result sink.
//!
//! The assessment engine receives implementations of these by injection.
//! `readscope-core` ships in-memory versions of the first two, the
//! `readscope-providers` crate implements narrative generation, and
//! `readscope-report` implements a file-backed sink.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::model::{AgeBand, Question};
use crate::report::ExportRow;

// ---------------------------------------------------------------------------
// Question repository
// ---------------------------------------------------------------------------

/// Filter for repository lookups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionQuery {
    pub age_band: AgeBand,
    /// Restrict to this raw skill tag.
    #[serde(default)]
    pub skill: Option<String>,
    /// Restrict to this content category.
    #[serde(default)]
    pub category: Option<String>,
    /// Return at most this many questions, chosen at random from the matches.
    #[serde(default)]
    pub limit: Option<usize>,
    /// Seed for the random choice under `limit`; entropy when unset.
    #[serde(default)]
    pub sample_seed: Option<u64>,
}

impl QuestionQuery {
    pub fn for_skill(age_band: AgeBand, skill: &str) -> Self {
        Self {
            age_band,
            skill: Some(skill.to_string()),
            category: None,
            limit: None,
            sample_seed: None,
        }
    }

    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub fn with_sample_seed(mut self, seed: u64) -> Self {
        self.sample_seed = Some(seed);
        self
    }

    /// Whether a question satisfies this filter (ignores `limit`).
    pub fn matches(&self, question: &Question) -> bool {
        question.age_band == self.age_band
            && self.skill.as_ref().map_or(true, |s| *s == question.skill)
            && self
                .category
                .as_ref()
                .map_or(true, |c| question.category.as_ref() == Some(c))
    }
}

/// Source of questions. Must return an empty list, not an error, when
/// nothing matches; errors mean the store itself is unreachable.
///
/// A limited query returns a random subset of the matches, never the first
/// rows in storage order.
#[async_trait]
pub trait QuestionRepository: Send + Sync {
    async fn find(&self, query: &QuestionQuery) -> anyhow::Result<Vec<Question>>;
}

// ---------------------------------------------------------------------------
// Access-code store
// ---------------------------------------------------------------------------

/// State of an access code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeStatus {
    pub exists: bool,
    pub used: bool,
}

/// Outcome of an atomic redeem attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Redemption {
    /// The code went from unused to used in this call.
    Redeemed,
    /// Someone else already used it.
    AlreadyUsed,
    /// No such code.
    Unknown,
}

/// Store of single-use access codes.
///
/// `reserve` and `redeem` must each be a single check-and-set against the
/// store so concurrent callers cannot both succeed.
#[async_trait]
pub trait AccessCodeStore: Send + Sync {
    async fn status(&self, code: &str) -> anyhow::Result<CodeStatus>;

    /// Insert `code` as unused if absent. Returns `false` on collision.
    async fn reserve(&self, code: &str) -> anyhow::Result<bool>;

    /// Mark `code` used by `holder` if it exists and is unused.
    async fn redeem(&self, code: &str, holder: &str) -> anyhow::Result<Redemption>;
}

// ---------------------------------------------------------------------------
// Narrative generator
// ---------------------------------------------------------------------------

/// Trait for text-generation backends that turn a structured summary into
/// coaching prose.
#[async_trait]
pub trait NarrativeGenerator: Send + Sync {
    /// Human-readable provider name (e.g. "anthropic").
    fn name(&self) -> &str;

    /// Generate narrative text from a prompt.
    async fn generate(&self, request: &NarrativeRequest) -> anyhow::Result<NarrativeResponse>;

    /// List available models for this provider.
    fn available_models(&self) -> Vec<ModelInfo>;
}

/// Request for narrative prose.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NarrativeRequest {
    /// Model identifier.
    pub model: String,
    /// The structured summary rendered as a prompt.
    pub prompt: String,
    /// Optional system prompt override.
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f64,
}

/// Generated narrative.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NarrativeResponse {
    /// Raw text returned by the model.
    pub content: String,
    /// Model that actually produced it.
    pub model: String,
    pub token_usage: TokenUsage,
    /// Latency in milliseconds.
    pub latency_ms: u64,
}

/// Token accounting for one generation call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Information about an available model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
    pub provider: String,
    /// Maximum context window size in tokens.
    pub max_context: u32,
}

/// Default system prompt for narrative providers.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a warm, precise reading coach writing feedback for a young reader and their guardian. Use only the facts in the summary. Frame weaknesses as growth opportunities, call out confident-but-wrong answers as the first thing to work on, and finish with one concrete activity. Write plain paragraphs without headings, lists, or markdown.";

/// Clean model output into plain narrative text.
///
/// Drops code-fence lines and leading markdown heading markers, collapses
/// runs of blank lines into a single paragraph break, and trims.
pub fn clean_narrative(raw: &str) -> String {
    let mut paragraphs: Vec<String> = Vec::new();
    let mut current = String::new();

    for line in raw.lines() {
        let trimmed = line.trim();
        if trimmed.starts_with("```") {
            continue;
        }
        let text = trimmed.trim_start_matches('#').trim();
        if text.is_empty() {
            if !current.is_empty() {
                paragraphs.push(std::mem::take(&mut current));
            }
            continue;
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(text);
    }
    if !current.is_empty() {
        paragraphs.push(current);
    }

    paragraphs.join("\n\n")
}

// ---------------------------------------------------------------------------
// Result sink
// ---------------------------------------------------------------------------

/// Durable record-keeping for finished assessments.
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn record(&self, row: &ExportRow) -> anyhow::Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::QuestionKind;

    fn question(skill: &str, category: Option<&str>, band: AgeBand) -> Question {
        Question {
            id: "q".into(),
            age_band: band,
            category: category.map(String::from),
            skill: skill.into(),
            genre: None,
            difficulty: Default::default(),
            expected_time_secs: 60,
            title: String::new(),
            passage: None,
            prompt: "?".into(),
            kind: QuestionKind::OpenText { min_chars: 10 },
        }
    }

    #[test]
    fn query_matches_band_skill_and_category() {
        let q = question("inference", Some("literature"), AgeBand::Junior);
        assert!(QuestionQuery::for_skill(AgeBand::Junior, "inference").matches(&q));
        assert!(!QuestionQuery::for_skill(AgeBand::Senior, "inference").matches(&q));
        assert!(!QuestionQuery::for_skill(AgeBand::Junior, "logic").matches(&q));

        let mut by_category = QuestionQuery::for_skill(AgeBand::Junior, "inference");
        by_category.category = Some("non-literature".into());
        assert!(!by_category.matches(&q));
    }

    #[test]
    fn clean_strips_fences_and_headings() {
        let raw = "```\n# Your reading profile\nYou read carefully.\nKeep going.\n\n\n## Next\nTry summaries.\n```";
        assert_eq!(
            clean_narrative(raw),
            "Your reading profile You read carefully. Keep going.\n\nNext Try summaries."
        );
    }

    #[test]
    fn clean_plain_text_is_trimmed() {
        assert_eq!(clean_narrative("  Well done.  \n"), "Well done.");
        assert_eq!(clean_narrative("\n\n"), "");
    }
}

//! Report synthesis: turns scores, the metacognition matrix, and the timing
//! classification into structured coaching feedback and templated prose.
//!
//! The narrative produced here is the fallback when no generative narrator
//! is configured or it fails. [`NarrativeSummary`] is the structured seed a
//! narrator receives instead.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::evaluator::{GradeBasis, GradedItem};
use crate::metacognition::MetacognitionMatrix;
use crate::model::QuestionKind;
use crate::scoring::{reading_bias, ReadingBias, ScoreProfile, DEFAULT_BIAS_THRESHOLD};
use crate::timing::{AgilityArchetype, TimingAnalysis};

/// Wording and thresholds used by [`synthesize`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportPolicy {
    /// Scoring bucket → suggested practice activity.
    pub activities: BTreeMap<String, String>,
    /// Activity for buckets missing from `activities`.
    pub generic_activity: String,
    /// Shown for a wrong single-choice pick without distractor feedback.
    pub generic_feedback: String,
    /// Category gap (percentage points) that counts as a reading bias.
    pub bias_threshold_points: f64,
    /// Mean open-text length above which expression is "expansive".
    pub expansive_chars: f64,
    /// Mean open-text length above which expression is "concise".
    pub concise_chars: f64,
    /// Skills under this percentage get their own recommendation.
    pub low_score_percent: u32,
}

impl Default for ReportPolicy {
    fn default() -> Self {
        let activities = [
            (
                "comprehension",
                "After each chapter, write a two-sentence summary and a title of your own for it.",
            ),
            (
                "inference",
                "While reading, pause at each character's choice and note what they know that the text never says outright.",
            ),
            (
                "logic",
                "Cut a short article into paragraphs, shuffle them, and rebuild the order using the linking words.",
            ),
            (
                "vocabulary",
                "Keep a word log: for each unfamiliar word, guess the meaning from context before checking it.",
            ),
            (
                "critical_thinking",
                "Pick an opinion column each week and list the claim, the evidence, and one question you would ask the author.",
            ),
            (
                "creativity",
                "Rewrite the ending of a story you finished recently from another character's point of view.",
            ),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self {
            activities,
            generic_activity: "Read a little every day and retell what you read to someone in your own words.".into(),
            generic_feedback: "Review the concept behind this question and reread the passage once more.".into(),
            bias_threshold_points: DEFAULT_BIAS_THRESHOLD,
            expansive_chars: 150.0,
            concise_chars: 80.0,
            low_score_percent: 50,
        }
    }
}

impl ReportPolicy {
    pub fn activity_for(&self, skill: &str) -> &str {
        self.activities
            .get(skill)
            .map(String::as_str)
            .unwrap_or(&self.generic_activity)
    }
}

/// How much a test-taker writes when answering open questions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpressionStyle {
    Expansive,
    Concise,
    Reserved,
}

impl ExpressionStyle {
    pub fn comment(&self) -> &'static str {
        match self {
            ExpressionStyle::Expansive => {
                "In your written answers you develop ideas richly and back them with specific detail."
            }
            ExpressionStyle::Concise => {
                "In your written answers you get to the core of the question and say it briefly."
            }
            ExpressionStyle::Reserved => {
                "Your written answers are short and careful. Try adding one reason or example to each one."
            }
        }
    }
}

/// Mean open-text length and the resulting style.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExpressionFluency {
    pub mean_chars: f64,
    pub answered: u32,
    pub style: ExpressionStyle,
}

/// Expression fluency over answered open-text items, `None` without any.
pub fn expression_fluency(items: &[GradedItem], policy: &ReportPolicy) -> Option<ExpressionFluency> {
    let lengths: Vec<usize> = items
        .iter()
        .filter(|i| matches!(i.question.kind, QuestionKind::OpenText { .. }))
        .filter_map(|i| i.response.as_ref()?.answer.as_deref())
        .map(|a| a.chars().count())
        .collect();
    if lengths.is_empty() {
        return None;
    }

    let mean_chars = lengths.iter().sum::<usize>() as f64 / lengths.len() as f64;
    let style = if mean_chars > policy.expansive_chars {
        ExpressionStyle::Expansive
    } else if mean_chars > policy.concise_chars {
        ExpressionStyle::Concise
    } else {
        ExpressionStyle::Reserved
    };
    Some(ExpressionFluency {
        mean_chars,
        answered: lengths.len() as u32,
        style,
    })
}

/// A named skill with its score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillHighlight {
    pub skill: String,
    pub percent: u32,
}

/// Highest-scoring skill. Ties go to the skill encountered first.
pub fn strongest_skill(profile: &ScoreProfile) -> Option<SkillHighlight> {
    let mut skills = profile.skills.iter();
    let mut best = skills.next()?;
    for s in skills {
        if s.percent > best.percent {
            best = s;
        }
    }
    Some(SkillHighlight {
        skill: best.name.clone(),
        percent: best.percent,
    })
}

/// Lowest-scoring skill. Ties go to the skill encountered first.
pub fn weakest_skill(profile: &ScoreProfile) -> Option<SkillHighlight> {
    let mut skills = profile.skills.iter();
    let mut worst = skills.next()?;
    for s in skills {
        if s.percent < worst.percent {
            worst = s;
        }
    }
    Some(SkillHighlight {
        skill: worst.name.clone(),
        percent: worst.percent,
    })
}

/// Feedback for one missed question.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemFeedback {
    pub number: usize,
    pub question_id: String,
    pub title: String,
    pub skill: String,
    #[serde(default)]
    pub submitted: Option<String>,
    /// The expected answer, when the question has a single one.
    #[serde(default)]
    pub expected: Option<String>,
    pub feedback: String,
    pub basis: GradeBasis,
}

/// A practice suggestion tied to a skill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recommendation {
    pub skill: String,
    pub text: String,
}

/// Structured facts the narrative is built from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrativeSummary {
    pub total_correct: u32,
    pub total_questions: u32,
    #[serde(default)]
    pub strength: Option<SkillHighlight>,
    #[serde(default)]
    pub weakness: Option<SkillHighlight>,
    pub confident_correct: u32,
    pub confident_error: u32,
    pub unsure_correct: u32,
    pub unsure_error: u32,
    pub archetype: AgilityArchetype,
    pub reading_bias: ReadingBias,
    #[serde(default)]
    pub expression: Option<ExpressionStyle>,
    #[serde(default)]
    pub recommended_activity: Option<String>,
}

impl NarrativeSummary {
    /// Render the summary as a prompt for a generative narrator.
    pub fn to_prompt(&self) -> String {
        let mut out = String::from(
            "Write a short coaching report (four to six paragraphs) for a reading assessment with these results.\n\n",
        );
        let _ = writeln!(
            out,
            "- Correct answers: {} of {}",
            self.total_correct, self.total_questions
        );
        if let Some(s) = &self.strength {
            let _ = writeln!(out, "- Strongest skill: {} ({}%)", humanize(&s.skill), s.percent);
        }
        if let Some(w) = &self.weakness {
            let _ = writeln!(out, "- Weakest skill: {} ({}%)", humanize(&w.skill), w.percent);
        }
        let _ = writeln!(
            out,
            "- Confident and correct: {}\n- Confident but wrong: {}\n- Unsure but correct: {}\n- Unsure and wrong: {}",
            self.confident_correct, self.confident_error, self.unsure_correct, self.unsure_error
        );
        let _ = writeln!(out, "- Speed/accuracy pattern: {}", self.archetype.label());
        match &self.reading_bias {
            ReadingBias::Leaning {
                stronger,
                weaker,
                gap_points,
            } => {
                let _ = writeln!(
                    out,
                    "- Reads {stronger} texts better than {weaker} texts ({gap_points}-point gap)"
                );
            }
            ReadingBias::Balanced => {
                let _ = writeln!(out, "- Balanced across text categories");
            }
            ReadingBias::InsufficientData => {}
        }
        if let Some(style) = self.expression {
            let _ = writeln!(out, "- Written answers: {style:?}");
        }
        if let Some(activity) = &self.recommended_activity {
            let _ = writeln!(out, "- Suggested activity: {activity}");
        }
        if self.confident_error > 0 {
            out.push_str(
                "\nTreat the confident-but-wrong answers as the top priority to revisit.\n",
            );
        }
        out
    }
}

/// Structured coaching report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoachingReport {
    #[serde(default)]
    pub strength: Option<SkillHighlight>,
    #[serde(default)]
    pub weakness: Option<SkillHighlight>,
    pub item_feedback: Vec<ItemFeedback>,
    pub recommendations: Vec<Recommendation>,
    pub reading_bias: ReadingBias,
    #[serde(default)]
    pub expression: Option<ExpressionFluency>,
    /// Templated prose, paragraphs separated by blank lines.
    pub narrative: String,
    /// Confident-but-wrong callout that every narrative must carry.
    #[serde(default)]
    pub priority_note: Option<String>,
    pub summary: NarrativeSummary,
}

fn humanize(skill: &str) -> String {
    skill.replace(&['_', '-'][..], " ")
}

fn plural(n: u32, one: &str, many: &str) -> String {
    if n == 1 {
        format!("{n} {one}")
    } else {
        format!("{n} {many}")
    }
}

fn item_feedback(item: &GradedItem, policy: &ReportPolicy) -> ItemFeedback {
    let question = &item.question;
    let submitted = item.response.as_ref().and_then(|r| r.answer.clone());

    let (expected, feedback) = match (&question.kind, submitted.as_deref()) {
        (QuestionKind::Ordering { answer: canonical }, None) => (
            Some(canonical.clone()),
            "No answer was submitted for this question.".to_string(),
        ),
        (_, None) => (
            question.answer_option().map(|o| o.text.clone()),
            "No answer was submitted for this question.".to_string(),
        ),
        (QuestionKind::SingleChoice { .. }, Some(answer)) => (
            question.answer_option().map(|o| o.text.clone()),
            question
                .option_for(answer)
                .and_then(|o| o.feedback.clone())
                .unwrap_or_else(|| policy.generic_feedback.clone()),
        ),
        (QuestionKind::Ordering { answer: canonical }, Some(_)) => (
            Some(canonical.clone()),
            format!("The expected order was {canonical}. Look for the words that link each part to the one before it."),
        ),
        (QuestionKind::OpenText { min_chars }, Some(answer)) => (
            None,
            format!(
                "A complete answer here needs at least {min_chars} characters; yours had {}. Add a reason or an example from the text.",
                answer.chars().count()
            ),
        ),
    };

    ItemFeedback {
        number: item.number,
        question_id: question.id.clone(),
        title: question.title.clone(),
        skill: question.skill.clone(),
        submitted,
        expected,
        feedback,
        basis: item.basis,
    }
}

fn recommendations(
    profile: &ScoreProfile,
    weakness: Option<&SkillHighlight>,
    policy: &ReportPolicy,
) -> Vec<Recommendation> {
    let Some(weakest) = weakness else {
        return Vec::new();
    };
    let mut out = vec![Recommendation {
        skill: weakest.skill.clone(),
        text: policy.activity_for(&weakest.skill).to_string(),
    }];
    for s in &profile.skills {
        if s.name != weakest.skill && s.percent < policy.low_score_percent {
            out.push(Recommendation {
                skill: s.name.clone(),
                text: policy.activity_for(&s.name).to_string(),
            });
        }
    }
    out
}

/// The confident-but-wrong callout, present whenever that cell is non-empty.
pub fn priority_note(matrix: &MetacognitionMatrix) -> Option<String> {
    let confident_error = matrix.confident_error.count;
    (confident_error > 0).then(|| {
        format!(
            "Top priority: {} you felt sure about turned out to be wrong. These show an idea that needs correcting, so go over them first.",
            plural(confident_error, "answer", "answers")
        )
    })
}

/// Whether free-form prose already calls out confident-but-wrong answers
/// as the priority.
pub fn mentions_priority(text: &str) -> bool {
    let lower = text.to_lowercase();
    lower.contains("priority")
        && ["confident", "felt sure", "certain"]
            .iter()
            .any(|w| lower.contains(w))
}

fn metacognition_paragraph(matrix: &MetacognitionMatrix) -> Option<String> {
    if matrix.total() == 0 {
        return None;
    }
    let unsure_correct = matrix.unsure_correct.count;

    let mut text = if let Some(note) = priority_note(matrix) {
        note
    } else {
        "You had no confident-but-wrong answers, so your sense of what you know is reliable.".to_string()
    };
    if unsure_correct > 0 {
        let _ = write!(
            text,
            " You also got {} right while unsure. Trust your reading a little more.",
            plural(unsure_correct, "question", "questions")
        );
    }
    Some(text)
}

fn bias_paragraph(bias: &ReadingBias) -> Option<String> {
    match bias {
        ReadingBias::InsufficientData => None,
        ReadingBias::Balanced => {
            Some("You read different kinds of text with similar accuracy.".to_string())
        }
        ReadingBias::Leaning {
            stronger,
            weaker,
            gap_points,
        } => Some(format!(
            "You are noticeably more accurate with {} texts than with {} texts ({gap_points} points apart).",
            humanize(stronger),
            humanize(weaker)
        )),
    }
}

/// Build the structured report and its templated narrative.
pub fn synthesize(
    profile: &ScoreProfile,
    matrix: &MetacognitionMatrix,
    timing: &TimingAnalysis,
    items: &[GradedItem],
    policy: &ReportPolicy,
) -> CoachingReport {
    let strength = strongest_skill(profile);
    let weakness = weakest_skill(profile);
    let bias = reading_bias(profile, policy.bias_threshold_points);
    let expression = expression_fluency(items, policy);
    let recommendations = recommendations(profile, weakness.as_ref(), policy);

    let item_feedback: Vec<ItemFeedback> = items
        .iter()
        .filter(|i| !i.correct)
        .map(|i| item_feedback(i, policy))
        .collect();

    let mut paragraphs = Vec::new();
    paragraphs.push(match profile.overall_percent() {
        Some(percent) => format!(
            "You answered {} of {} questions correctly ({percent}%).",
            profile.total_correct, profile.total_questions
        ),
        None => "No questions were scored in this session.".to_string(),
    });
    if let Some(s) = &strength {
        paragraphs.push(format!(
            "Your strongest skill is {} at {}%. Keep building on it.",
            humanize(&s.skill),
            s.percent
        ));
    }
    if let (Some(s), Some(w)) = (&strength, &weakness) {
        if s.skill != w.skill {
            paragraphs.push(format!(
                "Your biggest growth opportunity is {} at {}%. A little focused practice here will lift your overall reading the most.",
                humanize(&w.skill),
                w.percent
            ));
        }
    }
    if let Some(p) = metacognition_paragraph(matrix) {
        paragraphs.push(p);
    }
    if !items.is_empty() {
        paragraphs.push(timing.comment.clone());
    }
    if let Some(p) = bias_paragraph(&bias) {
        paragraphs.push(p);
    }
    if let Some(fluency) = &expression {
        paragraphs.push(fluency.style.comment().to_string());
    }
    if let Some(rec) = recommendations.first() {
        paragraphs.push(format!("Next step for {}: {}", humanize(&rec.skill), rec.text));
    }

    let summary = NarrativeSummary {
        total_correct: profile.total_correct,
        total_questions: profile.total_questions,
        strength: strength.clone(),
        weakness: weakness.clone(),
        confident_correct: matrix.confident_correct.count,
        confident_error: matrix.confident_error.count,
        unsure_correct: matrix.unsure_correct.count,
        unsure_error: matrix.unsure_error.count,
        archetype: timing.archetype,
        reading_bias: bias.clone(),
        expression: expression.map(|e| e.style),
        recommended_activity: recommendations.first().map(|r| r.text.clone()),
    };

    CoachingReport {
        strength,
        weakness,
        item_feedback,
        recommendations,
        reading_bias: bias,
        expression,
        narrative: paragraphs.join("\n\n"),
        priority_note: priority_note(matrix),
        summary,
    }
}

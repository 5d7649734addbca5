//! Response-time analysis and agility archetype classification.
//!
//! A heuristic, not a statistical model: the thresholds in
//! [`TimingPolicy`] are policy constants and can be overridden from config.

use serde::{Deserialize, Serialize};

use crate::evaluator::GradedItem;

/// Classification thresholds on the agility score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingPolicy {
    /// Scores strictly above this are fast-and-accurate.
    pub fast_threshold: f64,
    /// Scores strictly below this are careful-but-error-prone.
    pub slow_threshold: f64,
}

impl Default for TimingPolicy {
    fn default() -> Self {
        Self {
            fast_threshold: 0.3,
            slow_threshold: -0.3,
        }
    }
}

/// Coarse speed/accuracy label for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgilityArchetype {
    FastAndAccurate,
    Steady,
    CarefulButErrorProne,
}

impl AgilityArchetype {
    pub fn label(&self) -> &'static str {
        match self {
            AgilityArchetype::FastAndAccurate => "fast-and-accurate",
            AgilityArchetype::Steady => "steady",
            AgilityArchetype::CarefulButErrorProne => "careful-but-error-prone",
        }
    }

    pub fn comment(&self) -> &'static str {
        match self {
            AgilityArchetype::FastAndAccurate => {
                "You read quickly and your speed holds up: most questions you finished early were also correct."
            }
            AgilityArchetype::Steady => {
                "Your pace is even. Speed neither helped nor hurt your accuracy much in this session."
            }
            AgilityArchetype::CarefulButErrorProne => {
                "You often took longer than expected on questions you then missed. Extra time is not yet turning into accuracy, so practise spotting the key sentence first."
            }
        }
    }
}

/// Timing summary for one submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingAnalysis {
    /// Sum of reported solving times.
    pub total_time_secs: f64,
    /// Sum of expected times for the questions that reported a time.
    pub expected_time_secs: f64,
    /// `total_time_secs / expected_time_secs`; `None` when nothing was timed.
    #[serde(default)]
    pub ratio_to_expected: Option<f64>,
    pub fast_correct: u32,
    pub slow_wrong: u32,
    /// `(fast_correct - slow_wrong) / total_questions`, in [-1, 1].
    pub agility_score: f64,
    pub archetype: AgilityArchetype,
    pub comment: String,
}

impl TimingAnalysis {
    /// Agility mapped onto 0–100 for the score profile.
    pub fn speed_score(&self) -> u32 {
        (((self.agility_score + 1.0) / 2.0) * 100.0)
            .round()
            .clamp(0.0, 100.0) as u32
    }
}

/// Classify an agility score. Both boundaries are exclusive.
pub fn classify_score(agility_score: f64, policy: &TimingPolicy) -> AgilityArchetype {
    if agility_score > policy.fast_threshold {
        AgilityArchetype::FastAndAccurate
    } else if agility_score < policy.slow_threshold {
        AgilityArchetype::CarefulButErrorProne
    } else {
        AgilityArchetype::Steady
    }
}

/// Compare observed to expected time per question and classify the session.
///
/// Every administered question counts toward the denominator; questions
/// without a measured time count as neither fast nor slow.
pub fn classify(items: &[GradedItem], policy: &TimingPolicy) -> TimingAnalysis {
    let mut total_time = 0.0;
    let mut expected_time = 0.0;
    let mut fast_correct = 0u32;
    let mut slow_wrong = 0u32;

    for item in items {
        let Some(elapsed) = item.response.as_ref().and_then(|r| r.elapsed_secs) else {
            continue;
        };
        total_time += elapsed;
        expected_time += f64::from(item.question.expected_time_secs);

        let delta = elapsed - f64::from(item.question.expected_time_secs);
        if item.correct && delta < 0.0 {
            fast_correct += 1;
        } else if !item.correct && delta > 0.0 {
            slow_wrong += 1;
        }
    }

    let agility_score = if items.is_empty() {
        0.0
    } else {
        (f64::from(fast_correct) - f64::from(slow_wrong)) / items.len() as f64
    };
    let archetype = classify_score(agility_score, policy);

    TimingAnalysis {
        total_time_secs: total_time,
        expected_time_secs: expected_time,
        ratio_to_expected: (expected_time > 0.0).then(|| total_time / expected_time),
        fast_correct,
        slow_wrong,
        agility_score,
        archetype,
        comment: archetype.comment().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluator::GradeBasis;
    use crate::model::{AgeBand, Confidence, Question, QuestionKind, Response};

    fn item(correct: bool, expected: u32, elapsed: Option<f64>) -> GradedItem {
        GradedItem {
            number: 1,
            question: Question {
                id: "q".into(),
                age_band: AgeBand::Junior,
                category: None,
                skill: "logic".into(),
                genre: None,
                difficulty: Default::default(),
                expected_time_secs: expected,
                title: String::new(),
                passage: None,
                prompt: "?".into(),
                kind: QuestionKind::Ordering {
                    answer: "A-B".into(),
                },
            },
            response: Some(Response {
                question_id: "q".into(),
                answer: Some("x".into()),
                confidence: Confidence::Confident,
                elapsed_secs: elapsed,
            }),
            correct,
            basis: GradeBasis::Exact,
        }
    }

    /// 4 fast-correct, 1 slow-wrong, 5 neutral.
    fn boundary_session() -> Vec<GradedItem> {
        let mut items = Vec::new();
        for _ in 0..4 {
            items.push(item(true, 60, Some(30.0)));
        }
        items.push(item(false, 60, Some(90.0)));
        for _ in 0..5 {
            items.push(item(true, 60, Some(60.0)));
        }
        items
    }

    #[test]
    fn exactly_point_three_is_steady() {
        let analysis = classify(&boundary_session(), &TimingPolicy::default());
        assert_eq!(analysis.fast_correct, 4);
        assert_eq!(analysis.slow_wrong, 1);
        assert_eq!(analysis.agility_score, 0.3);
        assert_eq!(analysis.archetype, AgilityArchetype::Steady);
    }

    #[test]
    fn just_above_threshold_is_fast() {
        let mut items = boundary_session();
        // Turn one neutral item into a fast-correct one: (5 - 1) / 10 = 0.4.
        items[9] = item(true, 60, Some(10.0));
        let analysis = classify(&items, &TimingPolicy::default());
        assert_eq!(analysis.archetype, AgilityArchetype::FastAndAccurate);
    }

    #[test]
    fn negative_boundary_is_exclusive() {
        let policy = TimingPolicy::default();
        assert_eq!(classify_score(-0.3, &policy), AgilityArchetype::Steady);
        assert_eq!(
            classify_score(-0.31, &policy),
            AgilityArchetype::CarefulButErrorProne
        );
    }

    #[test]
    fn thresholds_are_configurable() {
        let strict = TimingPolicy {
            fast_threshold: 0.5,
            slow_threshold: -0.5,
        };
        assert_eq!(classify_score(0.45, &strict), AgilityArchetype::Steady);
        assert_eq!(
            classify_score(0.45, &TimingPolicy::default()),
            AgilityArchetype::FastAndAccurate
        );
    }

    #[test]
    fn untimed_items_still_count_in_denominator() {
        let items = vec![item(true, 60, Some(10.0)), item(true, 60, None)];
        let analysis = classify(&items, &TimingPolicy::default());
        assert_eq!(analysis.agility_score, 0.5);
        assert_eq!(analysis.total_time_secs, 10.0);
        assert_eq!(analysis.ratio_to_expected, Some(10.0 / 60.0));
    }

    #[test]
    fn empty_session_is_steady_without_ratio() {
        let analysis = classify(&[], &TimingPolicy::default());
        assert_eq!(analysis.archetype, AgilityArchetype::Steady);
        assert_eq!(analysis.ratio_to_expected, None);
        assert_eq!(analysis.speed_score(), 50);
    }

    #[test]
    fn speed_score_spans_zero_to_hundred() {
        let mut analysis = classify(&[], &TimingPolicy::default());
        analysis.agility_score = 1.0;
        assert_eq!(analysis.speed_score(), 100);
        analysis.agility_score = -1.0;
        assert_eq!(analysis.speed_score(), 0);
    }
}

//! Response evaluation: decides correctness per question type.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::model::{Question, QuestionKind, Response, SessionQuestion};

/// How a correctness decision was reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GradeBasis {
    /// Exact string match against the canonical answer.
    Exact,
    /// Open-text completeness proxy: length ≥ minimum. An estimate, not a
    /// judgment of content quality.
    LengthProxy,
    /// No answer was submitted.
    Missing,
}

/// Whether `response` answers `question` correctly.
///
/// - single choice: submitted value equals the marked answer's value,
///   case-sensitive, no normalization
/// - ordering: submitted sequence equals the canonical sequence exactly
/// - open text: submitted length in characters is at least `min_chars`
///
/// A missing response or blank answer is incorrect.
pub fn is_correct(question: &Question, response: Option<&Response>) -> bool {
    let Some(answer) = response.and_then(|r| r.answer.as_deref()) else {
        return false;
    };
    match &question.kind {
        QuestionKind::SingleChoice { .. } => question
            .answer_option()
            .is_some_and(|option| option.value() == answer),
        QuestionKind::Ordering { answer: canonical } => answer == canonical.as_str(),
        QuestionKind::OpenText { min_chars } => answer.chars().count() >= *min_chars,
    }
}

/// The grade basis that [`is_correct`] used.
pub fn grade_basis(question: &Question, response: Option<&Response>) -> GradeBasis {
    if response.and_then(|r| r.answer.as_ref()).is_none() {
        return GradeBasis::Missing;
    }
    match question.kind {
        QuestionKind::OpenText { .. } => GradeBasis::LengthProxy,
        _ => GradeBasis::Exact,
    }
}

/// One question paired with its response and verdict.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradedItem {
    pub number: usize,
    pub question: Question,
    #[serde(default)]
    pub response: Option<Response>,
    pub correct: bool,
    pub basis: GradeBasis,
}

impl GradedItem {
    /// Observed minus expected solving time, when the time was measured.
    pub fn time_delta_secs(&self) -> Option<f64> {
        self.response
            .as_ref()
            .and_then(|r| r.elapsed_secs)
            .map(|elapsed| elapsed - f64::from(self.question.expected_time_secs))
    }
}

/// Pair responses with session questions by id and grade each question.
///
/// Output follows the session order. Responses for unknown question ids are
/// logged and dropped; when a question is answered twice the first response
/// wins.
pub fn grade(questions: &[SessionQuestion], responses: &[Response]) -> Vec<GradedItem> {
    let known: HashSet<&str> = questions.iter().map(|sq| sq.question.id.as_str()).collect();

    let mut by_id: HashMap<&str, &Response> = HashMap::new();
    for response in responses {
        let id = response.question_id.as_str();
        if !known.contains(id) {
            tracing::warn!("ignoring response for unknown question id '{id}'");
            continue;
        }
        if by_id.contains_key(id) {
            tracing::warn!("ignoring duplicate response for question '{id}'");
            continue;
        }
        by_id.insert(id, response);
    }

    questions
        .iter()
        .map(|sq| {
            let response = by_id.get(sq.question.id.as_str()).copied();
            GradedItem {
                number: sq.number,
                question: sq.question.clone(),
                response: response.cloned(),
                correct: is_correct(&sq.question, response),
                basis: grade_basis(&sq.question, response),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AgeBand, ChoiceOption, Confidence};

    fn question(id: &str, kind: QuestionKind) -> Question {
        Question {
            id: id.into(),
            age_band: AgeBand::Intermediate,
            category: None,
            skill: "inference".into(),
            genre: None,
            difficulty: Default::default(),
            expected_time_secs: 60,
            title: String::new(),
            passage: None,
            prompt: "?".into(),
            kind,
        }
    }

    fn choice(answer_key: &str) -> QuestionKind {
        QuestionKind::SingleChoice {
            options: ["A", "B", "C", "D"]
                .iter()
                .map(|k| ChoiceOption {
                    text: format!("option {k}"),
                    key: Some(k.to_string()),
                    is_answer: *k == answer_key,
                    feedback: None,
                })
                .collect(),
        }
    }

    fn answer(id: &str, text: &str) -> Response {
        Response {
            question_id: id.into(),
            answer: Some(text.into()),
            confidence: Confidence::Confident,
            elapsed_secs: Some(30.0),
        }
    }

    #[test]
    fn single_choice_is_case_sensitive() {
        let q = question("q1", choice("C"));
        assert!(is_correct(&q, Some(&answer("q1", "C"))));
        assert!(!is_correct(&q, Some(&answer("q1", "c"))));
        assert!(!is_correct(&q, Some(&answer("q1", " C"))));
    }

    #[test]
    fn ordering_requires_exact_sequence() {
        let q = question(
            "q2",
            QuestionKind::Ordering {
                answer: "C-A-E-B-D".into(),
            },
        );
        assert!(is_correct(&q, Some(&answer("q2", "C-A-E-B-D"))));
        assert!(!is_correct(&q, Some(&answer("q2", "C-A-E-D-B"))));
        assert!(!is_correct(&q, Some(&answer("q2", "CAEBD"))));
    }

    #[test]
    fn open_text_uses_length_proxy() {
        let q = question("q3", QuestionKind::OpenText { min_chars: 100 });
        assert!(is_correct(&q, Some(&answer("q3", &"x".repeat(120)))));
        assert!(is_correct(&q, Some(&answer("q3", &"x".repeat(100)))));
        assert!(!is_correct(&q, Some(&answer("q3", &"x".repeat(99)))));
        assert_eq!(
            grade_basis(&q, Some(&answer("q3", "short"))),
            GradeBasis::LengthProxy
        );
    }

    #[test]
    fn open_text_counts_characters_not_bytes() {
        let q = question("q4", QuestionKind::OpenText { min_chars: 10 });
        // Ten Hangul syllables: 30 bytes, 10 characters.
        assert!(is_correct(&q, Some(&answer("q4", "사건을해결하는방법은"))));
        assert!(!is_correct(&q, Some(&answer("q4", "사건을해결하는방법"))));
    }

    #[test]
    fn missing_answer_is_incorrect() {
        let q = question("q1", choice("A"));
        assert!(!is_correct(&q, None));
        let blank = Response {
            answer: None,
            ..answer("q1", "A")
        };
        assert!(!is_correct(&q, Some(&blank)));
        assert_eq!(grade_basis(&q, Some(&blank)), GradeBasis::Missing);
    }

    #[test]
    fn evaluation_is_idempotent() {
        let q = question("q1", choice("B"));
        let r = answer("q1", "B");
        let first = is_correct(&q, Some(&r));
        let second = is_correct(&q, Some(&r));
        assert_eq!(first, second);
    }

    #[test]
    fn grade_pairs_by_id_and_ignores_strays() {
        let session = vec![
            SessionQuestion {
                number: 1,
                question: question("q1", choice("A")),
            },
            SessionQuestion {
                number: 2,
                question: question("q2", choice("B")),
            },
        ];
        let responses = vec![
            answer("q2", "B"),
            answer("ghost", "A"),
            answer("q2", "A"),
        ];

        let graded = grade(&session, &responses);
        assert_eq!(graded.len(), 2);
        assert_eq!(graded[0].number, 1);
        assert!(graded[0].response.is_none());
        assert!(!graded[0].correct);
        assert_eq!(graded[0].basis, GradeBasis::Missing);
        // First response for q2 wins.
        assert!(graded[1].correct);
    }

    #[test]
    fn time_delta_needs_elapsed() {
        let item = GradedItem {
            number: 1,
            question: question("q1", choice("A")),
            response: Some(answer("q1", "A")),
            correct: true,
            basis: GradeBasis::Exact,
        };
        assert_eq!(item.time_delta_secs(), Some(-30.0));

        let untimed = GradedItem {
            response: None,
            ..item
        };
        assert_eq!(untimed.time_delta_secs(), None);
    }
}

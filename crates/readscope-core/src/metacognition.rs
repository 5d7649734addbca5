//! Metacognition matrix: self-reported confidence × actual correctness.

use serde::{Deserialize, Serialize};

use crate::evaluator::GradedItem;
use crate::model::Confidence;

/// One cell of the matrix.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MatrixCell {
    pub count: u32,
    /// Summed elapsed time of the responses that reported one.
    pub total_elapsed_secs: f64,
    /// How many responses contributed to `total_elapsed_secs`.
    pub timed: u32,
}

impl MatrixCell {
    fn record(&mut self, elapsed: Option<f64>) {
        self.count += 1;
        if let Some(secs) = elapsed {
            self.total_elapsed_secs += secs;
            self.timed += 1;
        }
    }

    /// Mean elapsed seconds over timed responses in this cell.
    pub fn mean_elapsed_secs(&self) -> Option<f64> {
        (self.timed > 0).then(|| self.total_elapsed_secs / f64::from(self.timed))
    }
}

/// The 2×2 cross-tabulation.
///
/// `confident_error` (confident but wrong) is the misconception signal;
/// `unsure_correct` is productive struggle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetacognitionMatrix {
    pub confident_correct: MatrixCell,
    pub confident_error: MatrixCell,
    pub unsure_correct: MatrixCell,
    pub unsure_error: MatrixCell,
}

impl MetacognitionMatrix {
    /// Number of classified responses.
    pub fn total(&self) -> u32 {
        self.confident_correct.count
            + self.confident_error.count
            + self.unsure_correct.count
            + self.unsure_error.count
    }

    /// Share of confident answers that were right, `None` without any.
    pub fn calibration(&self) -> Option<f64> {
        let confident = self.confident_correct.count + self.confident_error.count;
        (confident > 0).then(|| f64::from(self.confident_correct.count) / f64::from(confident))
    }

    fn cell_mut(&mut self, confidence: Confidence, correct: bool) -> &mut MatrixCell {
        match (confidence, correct) {
            (Confidence::Confident, true) => &mut self.confident_correct,
            (Confidence::Confident, false) => &mut self.confident_error,
            (_, true) => &mut self.unsure_correct,
            (_, false) => &mut self.unsure_error,
        }
    }
}

/// Classify every answered item into exactly one cell.
///
/// Items without a response are not responses and are not counted, so the
/// cell counts sum to the number of submitted responses. Unrecognized
/// confidence values are treated as unsure.
pub fn analyze(items: &[GradedItem]) -> MetacognitionMatrix {
    let mut matrix = MetacognitionMatrix::default();

    for item in items {
        let Some(response) = &item.response else {
            continue;
        };
        let confidence = match response.confidence {
            Confidence::Unrecognized => {
                tracing::warn!(
                    "question '{}': unrecognized confidence, treating as unsure",
                    item.question.id
                );
                Confidence::Unsure
            }
            other => other,
        };
        matrix
            .cell_mut(confidence, item.correct)
            .record(response.elapsed_secs);
    }

    matrix
}

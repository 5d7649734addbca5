//! In-memory question repository backed by loaded question banks.

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::model::{Question, QuestionBank};
use crate::traits::{QuestionQuery, QuestionRepository};

/// A repository holding every question in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRepository {
    questions: Vec<Question>,
}

impl InMemoryRepository {
    pub fn new(questions: Vec<Question>) -> Self {
        Self { questions }
    }

    /// Merge several banks. Later duplicates of an id are dropped.
    pub fn from_banks(banks: Vec<QuestionBank>) -> Self {
        let mut seen = std::collections::HashSet::new();
        let mut questions = Vec::new();
        for bank in banks {
            for q in bank.questions {
                if seen.insert(q.id.clone()) {
                    questions.push(q);
                } else {
                    tracing::warn!("bank {}: duplicate question id {} ignored", bank.id, q.id);
                }
            }
        }
        Self { questions }
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }
}

#[async_trait]
impl QuestionRepository for InMemoryRepository {
    async fn find(&self, query: &QuestionQuery) -> anyhow::Result<Vec<Question>> {
        let mut matching: Vec<Question> = self
            .questions
            .iter()
            .filter(|q| query.matches(q))
            .cloned()
            .collect();
        if let Some(limit) = query.limit {
            if matching.len() > limit {
                let mut rng = match query.sample_seed {
                    Some(seed) => StdRng::seed_from_u64(seed),
                    None => StdRng::from_entropy(),
                };
                matching.shuffle(&mut rng);
                matching.truncate(limit);
            }
        }
        Ok(matching)
    }
}

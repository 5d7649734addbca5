//! Test composition: draws a balanced, age-appropriate question set.
//!
//! Repository I/O happens in [`TestComposer::compose`]; the selection itself
//! ([`assemble`]) is a pure function of the candidate pools and an RNG so it
//! can be tested deterministically.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use futures::future::join_all;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::AssessmentError;
use crate::model::{AgeBand, Question, SessionQuestion, TestStructure};
use crate::traits::{QuestionQuery, QuestionRepository};

/// Category name used for questions without one.
pub const UNCATEGORIZED: &str = "uncategorized";

/// Composition settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComposerConfig {
    /// Candidates requested per skill, as a multiple of the required count.
    pub oversample_factor: usize,
    /// Split each skill's draw evenly across content categories.
    pub balance_categories: bool,
    /// Fixed RNG seed for reproducible sessions.
    pub seed: Option<u64>,
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self {
            oversample_factor: 3,
            balance_categories: true,
            seed: None,
        }
    }
}

/// Draws question sets from a repository.
pub struct TestComposer {
    repository: Arc<dyn QuestionRepository>,
    config: ComposerConfig,
}

impl TestComposer {
    pub fn new(repository: Arc<dyn QuestionRepository>, config: ComposerConfig) -> Self {
        Self { repository, config }
    }

    pub fn config(&self) -> &ComposerConfig {
        &self.config
    }

    /// Compose a test for `age` following `structure`.
    ///
    /// Under-stocked skills contribute what they have. Queries that fail are
    /// treated as empty pools; only when every query fails is the repository
    /// reported as unavailable.
    pub async fn compose(
        &self,
        age: u32,
        structure: &TestStructure,
    ) -> Result<Vec<SessionQuestion>, AssessmentError> {
        if structure.values().all(|&n| n == 0) {
            return Err(AssessmentError::EmptyStructure);
        }
        let band = AgeBand::from_age(age);
        let factor = self.config.oversample_factor.max(1);

        let wanted: Vec<(&String, usize)> = structure
            .iter()
            .filter(|(_, &n)| n > 0)
            .map(|(skill, &n)| (skill, n))
            .collect();

        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let lookups: Vec<_> = wanted
            .iter()
            .map(|(skill, required)| {
                let query = QuestionQuery::for_skill(band, skill)
                    .with_limit(required * factor)
                    .with_sample_seed(rng.gen());
                let repository = Arc::clone(&self.repository);
                async move { repository.find(&query).await }
            })
            .collect();
        let results = join_all(lookups).await;

        let mut pools = HashMap::new();
        let mut failures = Vec::new();
        for ((skill, _), result) in wanted.iter().zip(results) {
            match result {
                Ok(questions) => {
                    pools.insert((*skill).clone(), questions);
                }
                Err(e) => {
                    tracing::error!("repository lookup for skill '{skill}' failed: {e:#}");
                    failures.push(format!("{skill}: {e:#}"));
                }
            }
        }
        if failures.len() == wanted.len() {
            return Err(AssessmentError::RepositoryUnavailable(failures.join("; ")));
        }

        let session = assemble(structure, pools, self.config.balance_categories, &mut rng);

        if session.is_empty() {
            tracing::warn!("no questions available for age band {band}");
        } else {
            tracing::info!(
                "composed {} questions for age band {band} ({} skills requested)",
                session.len(),
                wanted.len()
            );
        }
        Ok(session)
    }
}

/// Select, shuffle, and number questions from per-skill candidate pools.
///
/// Skills missing from `pools` contribute nothing. A question id is used at
/// most once even if several pools contain it.
pub fn assemble<R: Rng + ?Sized>(
    structure: &TestStructure,
    mut pools: HashMap<String, Vec<Question>>,
    balance_categories: bool,
    rng: &mut R,
) -> Vec<SessionQuestion> {
    let mut used: HashSet<String> = HashSet::new();
    let mut selected = Vec::new();

    for (skill, &required) in structure {
        let pool: Vec<Question> = pools
            .remove(skill)
            .unwrap_or_default()
            .into_iter()
            .filter(|q| !used.contains(&q.id))
            .collect();

        if pool.len() < required {
            tracing::warn!(
                "skill '{skill}' is under-stocked: wanted {required}, found {}",
                pool.len()
            );
        }

        let picked = select_for_skill(pool, required, balance_categories, rng);
        used.extend(picked.iter().map(|q| q.id.clone()));
        selected.extend(picked);
    }

    selected.shuffle(rng);
    selected
        .into_iter()
        .enumerate()
        .map(|(i, question)| SessionQuestion {
            number: i + 1,
            question,
        })
        .collect()
}

/// Pick `required` questions from one skill's pool.
fn select_for_skill<R: Rng + ?Sized>(
    mut pool: Vec<Question>,
    required: usize,
    balance_categories: bool,
    rng: &mut R,
) -> Vec<Question> {
    if pool.len() <= required {
        return pool;
    }

    if balance_categories {
        let mut by_category: BTreeMap<String, Vec<Question>> = BTreeMap::new();
        for q in pool {
            let category = q.category.clone().unwrap_or_else(|| UNCATEGORIZED.into());
            by_category.entry(category).or_default().push(q);
        }

        if by_category.len() >= 2 {
            return balanced_draw(by_category, required, rng);
        }
        pool = by_category.into_values().flatten().collect();
    }

    pool.shuffle(rng);
    pool.truncate(required);
    pool
}

/// Even split across categories, topped up from the leftovers.
fn balanced_draw<R: Rng + ?Sized>(
    by_category: BTreeMap<String, Vec<Question>>,
    required: usize,
    rng: &mut R,
) -> Vec<Question> {
    let mut groups: Vec<Vec<Question>> = by_category.into_values().collect();
    // Which categories receive the remainder is random, not alphabetical.
    groups.shuffle(rng);

    let base = required / groups.len();
    let extra = required % groups.len();

    let mut picked = Vec::with_capacity(required);
    let mut leftovers = Vec::new();
    for (i, mut group) in groups.into_iter().enumerate() {
        group.shuffle(rng);
        let quota = base + usize::from(i < extra);
        let take = quota.min(group.len());
        leftovers.extend(group.split_off(take));
        picked.extend(group);
    }

    leftovers.shuffle(rng);
    let short = required.saturating_sub(picked.len());
    picked.extend(leftovers.into_iter().take(short));
    picked
}

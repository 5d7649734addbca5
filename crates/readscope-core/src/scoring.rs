//! Skill, genre, and category aggregation into a score profile.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::evaluator::GradedItem;
use crate::taxonomy::SkillTaxonomy;

/// Reserved key the speed score is published under in [`ScoreProfile::as_map`].
pub const SPEED_KEY: &str = "speed";

/// Percentage-point gap below which category performance counts as balanced.
pub const DEFAULT_BIAS_THRESHOLD: f64 = 15.0;

/// Correct/total tally for one skill, genre, or category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketScore {
    pub name: String,
    pub correct: u32,
    /// Administered questions. Always ≥ 1.
    pub total: u32,
    /// round(100 × correct / total).
    pub percent: u32,
}

/// Per-submission score profile.
///
/// Bucket lists keep first-encountered order, which is the documented
/// tie-break for strongest/weakest skill selection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreProfile {
    pub skills: Vec<BucketScore>,
    pub genres: Vec<BucketScore>,
    pub categories: Vec<BucketScore>,
    /// Speed score derived from the timing analysis (0–100).
    #[serde(default)]
    pub speed: Option<u32>,
    pub total_correct: u32,
    pub total_questions: u32,
}

impl ScoreProfile {
    /// Score for one skill bucket.
    pub fn skill(&self, name: &str) -> Option<&BucketScore> {
        self.skills.iter().find(|s| s.name == name)
    }

    pub fn genre(&self, name: &str) -> Option<&BucketScore> {
        self.genres.iter().find(|s| s.name == name)
    }

    /// Overall percentage correct, `None` for an empty session.
    pub fn overall_percent(&self) -> Option<u32> {
        (self.total_questions > 0).then(|| percent(self.total_correct, self.total_questions))
    }

    /// Flatten skills plus the reserved speed key into a map.
    pub fn as_map(&self) -> BTreeMap<String, u32> {
        let mut map: BTreeMap<String, u32> = self
            .skills
            .iter()
            .map(|s| (s.name.clone(), s.percent))
            .collect();
        if let Some(speed) = self.speed {
            map.insert(SPEED_KEY.to_string(), speed);
        }
        map
    }
}

fn percent(correct: u32, total: u32) -> u32 {
    (100.0 * f64::from(correct) / f64::from(total)).round() as u32
}

/// Insertion-ordered accumulator.
#[derive(Default)]
struct Tally {
    entries: Vec<(String, u32, u32)>,
}

impl Tally {
    fn add(&mut self, key: &str, correct: bool) {
        let idx = match self.entries.iter().position(|(k, _, _)| k == key) {
            Some(idx) => idx,
            None => {
                self.entries.push((key.to_string(), 0, 0));
                self.entries.len() - 1
            }
        };
        let entry = &mut self.entries[idx];
        entry.1 += u32::from(correct);
        entry.2 += 1;
    }

    fn finish(self) -> Vec<BucketScore> {
        self.entries
            .into_iter()
            .map(|(name, correct, total)| BucketScore {
                percent: percent(correct, total),
                name,
                correct,
                total,
            })
            .collect()
    }
}

/// Roll graded items up into skill, genre, and category scores.
///
/// Skills are keyed by taxonomy bucket. Buckets with no administered
/// questions never appear, so no score has a zero denominator. The speed
/// score is left empty for the caller to merge in.
pub fn aggregate(items: &[GradedItem], taxonomy: &SkillTaxonomy) -> ScoreProfile {
    let mut skills = Tally::default();
    let mut genres = Tally::default();
    let mut categories = Tally::default();

    for item in items {
        skills.add(taxonomy.bucket(&item.question.skill), item.correct);
        if let Some(genre) = &item.question.genre {
            genres.add(genre, item.correct);
        }
        if let Some(category) = &item.question.category {
            categories.add(category, item.correct);
        }
    }

    ScoreProfile {
        skills: skills.finish(),
        genres: genres.finish(),
        categories: categories.finish(),
        speed: None,
        total_correct: items.iter().filter(|i| i.correct).count() as u32,
        total_questions: items.len() as u32,
    }
}

/// Literature vs non-literature reading tendency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReadingBias {
    /// Fewer than two categories were administered.
    InsufficientData,
    /// All categories within the threshold of each other.
    Balanced,
    /// One category clearly ahead of the weakest.
    Leaning {
        stronger: String,
        weaker: String,
        gap_points: u32,
    },
}

/// Compare category percentages; first-encountered wins ties.
pub fn reading_bias(profile: &ScoreProfile, threshold_points: f64) -> ReadingBias {
    if profile.categories.len() < 2 {
        return ReadingBias::InsufficientData;
    }

    let mut best = &profile.categories[0];
    let mut worst = &profile.categories[0];
    for c in &profile.categories[1..] {
        if c.percent > best.percent {
            best = c;
        }
        if c.percent < worst.percent {
            worst = c;
        }
    }

    let gap = best.percent - worst.percent;
    if f64::from(gap) < threshold_points {
        ReadingBias::Balanced
    } else {
        ReadingBias::Leaning {
            stronger: best.name.clone(),
            weaker: worst.name.clone(),
            gap_points: gap,
        }
    }
}

//! Skill taxonomy: maps raw question skill tags to scoring buckets.
//!
//! Question banks written at different times tag skills differently
//! ("title", "theme", "pronoun", ...). Scoring and report synthesis only see
//! bucket names, so swapping the taxonomy never touches them.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Injectable mapping from raw skill tag to scoring bucket.
///
/// Tags without an entry score under their own name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SkillTaxonomy {
    buckets: HashMap<String, String>,
}

impl SkillTaxonomy {
    /// Build a taxonomy from `(raw tag, bucket)` pairs.
    pub fn new<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            buckets: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Folds the fine-grained exam tags into the five cognitive skills.
    pub fn consolidated() -> Self {
        Self::new([
            ("title", "comprehension"),
            ("theme", "comprehension"),
            ("argument", "critical_thinking"),
            ("pronoun", "vocabulary"),
            ("sentence_ordering", "logic"),
            ("paragraph_ordering", "logic"),
            ("essay", "creativity"),
        ])
    }

    /// The scoring bucket for a raw skill tag.
    pub fn bucket<'a>(&'a self, raw: &'a str) -> &'a str {
        self.buckets.get(raw).map(String::as_str).unwrap_or(raw)
    }

    /// Number of explicit mappings.
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

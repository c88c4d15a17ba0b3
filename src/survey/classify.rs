//! Vocabulary-based proficiency classification.
//!
//! A layered heuristic over three tallies. Rules are applied in a fixed
//! order and the first one that decides wins:
//!
//! 1. All tallies zero: undetermined.
//! 2. Clear winner: top count is at least 3 and beats the runner-up by more than 1.
//! 3. A single tier holds the maximum count.
//! 4. Tied tiers are broken by the self-reported English level.
//! 5. A tier holding at least 40% of the words and leading every other tier
//!    by more than 10 points.
//! 6. Among the tied tiers prefer intermediate, else the highest count.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::answers::{Answers, EnglishLevel, LevelBucket};
use super::stage::SurveyStageId;

/// Proficiency tier produced by classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Beginner,
    Intermediate,
    Advanced,
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Beginner => "beginner",
            Self::Intermediate => "intermediate",
            Self::Advanced => "advanced",
        };
        write!(f, "{s}")
    }
}

/// `None` means undetermined.
pub type ClassificationResult = Option<Tier>;

/// Selected-word counts per tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VocabularyTally {
    pub beginner_count: u32,
    pub intermediate_count: u32,
    pub advanced_count: u32,
}

impl VocabularyTally {
    pub fn new(beginner_count: u32, intermediate_count: u32, advanced_count: u32) -> Self {
        Self {
            beginner_count,
            intermediate_count,
            advanced_count,
        }
    }

    /// Tally the three vocabulary stages. Malformed payloads count as zero.
    pub fn from_answers(answers: &Answers) -> Self {
        Self {
            beginner_count: answers.selection_count(SurveyStageId::Vocabulary),
            intermediate_count: answers.selection_count(SurveyStageId::IntermediateVocabulary),
            advanced_count: answers.selection_count(SurveyStageId::AdvancedVocabulary),
        }
    }

    pub fn total(&self) -> u64 {
        u64::from(self.beginner_count)
            + u64::from(self.intermediate_count)
            + u64::from(self.advanced_count)
    }

    fn pairs(&self) -> [(Tier, u32); 3] {
        [
            (Tier::Beginner, self.beginner_count),
            (Tier::Intermediate, self.intermediate_count),
            (Tier::Advanced, self.advanced_count),
        ]
    }
}

/// Classify a tally, using `english_level` to break ties.
pub fn classify(tally: &VocabularyTally, english_level: Option<EnglishLevel>) -> ClassificationResult {
    if tally.total() == 0 {
        return None;
    }

    // Stable sort keeps beginner < intermediate < advanced among equal counts.
    let mut sorted = tally.pairs();
    sorted.sort_by(|a, b| b.1.cmp(&a.1));
    let (top_tier, top) = sorted[0];
    let second = sorted[1].1;

    if top >= 3 && top - second > 1 {
        debug!(tier = %top_tier, top, second, "Clear vocabulary winner");
        return Some(top_tier);
    }

    let tied: Vec<Tier> = sorted
        .iter()
        .filter(|(_, count)| *count == top && *count > 0)
        .map(|(tier, _)| *tier)
        .collect();
    if let [only] = tied.as_slice() {
        return Some(*only);
    }

    if let Some(tier) = english_level.and_then(|level| break_tie(&tied, level.bucket())) {
        debug!(tier = %tier, ?english_level, "Vocabulary tie broken by English level");
        return Some(tier);
    }

    if let Some(tier) = dominant_by_share(tally) {
        return Some(tier);
    }

    if tied.contains(&Tier::Intermediate) {
        return Some(Tier::Intermediate);
    }
    // `tied` is in sorted order, so the first entry wins remaining ties.
    tied.first().copied()
}

fn break_tie(tied: &[Tier], bucket: LevelBucket) -> Option<Tier> {
    if tied.len() != 2 {
        return None;
    }
    let has = |t: Tier| tied.contains(&t);
    if has(Tier::Beginner) && has(Tier::Intermediate) {
        Some(match bucket {
            LevelBucket::Lower => Tier::Beginner,
            LevelBucket::Mid | LevelBucket::Higher => Tier::Intermediate,
        })
    } else if has(Tier::Intermediate) && has(Tier::Advanced) {
        Some(match bucket {
            LevelBucket::Lower | LevelBucket::Mid => Tier::Intermediate,
            LevelBucket::Higher => Tier::Advanced,
        })
    } else if has(Tier::Beginner) && has(Tier::Advanced) {
        // Contradictory selections; fall back to the middle.
        Some(Tier::Intermediate)
    } else {
        None
    }
}

/// A tier with at least 40% of all words that leads every other tier by
/// more than 10 percentage points.
fn dominant_by_share(tally: &VocabularyTally) -> Option<Tier> {
    let total = tally.total();
    if total == 0 {
        return None;
    }
    let shares = tally
        .pairs()
        .map(|(tier, count)| (tier, f64::from(count) * 100.0 / total as f64));
    shares.iter().find_map(|&(tier, share)| {
        let leads_all = shares
            .iter()
            .filter(|(other, _)| *other != tier)
            .all(|&(_, other_share)| share - other_share > 10.0);
        (share >= 40.0 && leads_all).then_some(tier)
    })
}

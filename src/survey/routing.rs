//! Post-onboarding routing decision tree.

use serde::{Deserialize, Serialize};

use super::answers::{Answers, EnglishLevel, LevelBucket};
use super::classify::{ClassificationResult, Tier};

/// Purpose prefix that sends a learner to exam preparation.
pub const EXAM_PREP_MARKER: &str = "exam preparation";

/// Landing experience chosen for the user after onboarding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Destination {
    KidsYoung,
    KidsTeen,
    KidsLanding,
    ExamPrep,
    AdultBeginner,
    AdultIntermediate,
    AdultAdvanced,
    AdultLanding,
}

impl Destination {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::KidsYoung => "kids_young",
            Self::KidsTeen => "kids_teen",
            Self::KidsLanding => "kids_landing",
            Self::ExamPrep => "exam_prep",
            Self::AdultBeginner => "adult_beginner",
            Self::AdultIntermediate => "adult_intermediate",
            Self::AdultAdvanced => "adult_advanced",
            Self::AdultLanding => "adult_landing",
        }
    }

    /// Front-end path for this destination.
    pub fn path(&self) -> &'static str {
        match self {
            Self::KidsYoung => "/kids/young",
            Self::KidsTeen => "/kids/teen",
            Self::KidsLanding => "/kids",
            Self::ExamPrep => "/exam-prep",
            Self::AdultBeginner => "/learn/beginner",
            Self::AdultIntermediate => "/learn/intermediate",
            Self::AdultAdvanced => "/learn/advanced",
            Self::AdultLanding => "/learn",
        }
    }

    fn for_tier(tier: Tier) -> Self {
        match tier {
            Tier::Beginner => Self::AdultBeginner,
            Tier::Intermediate => Self::AdultIntermediate,
            Tier::Advanced => Self::AdultAdvanced,
        }
    }

    fn for_bucket(bucket: LevelBucket) -> Self {
        match bucket {
            LevelBucket::Lower => Self::AdultBeginner,
            LevelBucket::Mid => Self::AdultIntermediate,
            LevelBucket::Higher => Self::AdultAdvanced,
        }
    }
}

impl std::fmt::Display for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Read-only view of the answers that drive routing.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RoutingContext {
    pub age_range: Option<String>,
    pub english_level: Option<EnglishLevel>,
    pub learning_purpose: Vec<String>,
    pub classification: ClassificationResult,
}

impl RoutingContext {
    pub fn from_answers(answers: &Answers, classification: ClassificationResult) -> Self {
        Self {
            age_range: answers.age_range(),
            english_level: answers.english_level(),
            learning_purpose: answers.learning_purposes(),
            classification,
        }
    }

    fn wants_exam_prep(&self) -> bool {
        self.learning_purpose
            .iter()
            .any(|p| p.trim().to_lowercase().starts_with(EXAM_PREP_MARKER))
    }
}

/// Pick a destination. Rules are evaluated top to bottom; first match wins.
pub fn route(ctx: &RoutingContext) -> Destination {
    match ctx.age_range.as_deref().map(str::trim) {
        Some("4-10") => return Destination::KidsYoung,
        Some("11-17") => return Destination::KidsTeen,
        // Legacy combined kids bucket.
        Some("4-17") => {
            return match ctx.english_level.map(|l| l.bucket()) {
                Some(LevelBucket::Lower) => Destination::KidsYoung,
                Some(LevelBucket::Mid | LevelBucket::Higher) => Destination::KidsTeen,
                None => Destination::KidsLanding,
            };
        }
        _ => {}
    }

    // Exam prep outranks vocabulary classification.
    if ctx.wants_exam_prep() {
        return Destination::ExamPrep;
    }

    if let Some(tier) = ctx.classification {
        return Destination::for_tier(tier);
    }

    match ctx.english_level {
        Some(level) => Destination::for_bucket(level.bucket()),
        None => Destination::AdultLanding,
    }
}

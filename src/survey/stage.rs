//! Survey stage identifiers and the transition table.

use serde::{Deserialize, Serialize};

use crate::error::SurveyError;

/// How the presenter hands interaction over from one stage to the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Handoff {
    /// Open the next stage, wait for its "opened" acknowledgment, then close
    /// the previous one.
    Acknowledged,
    /// Open the next stage and close the previous one back-to-back.
    Immediate,
}

/// One row of the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageEdges {
    pub forward: Option<SurveyStageId>,
    pub back: Option<SurveyStageId>,
    /// Whether completing this stage submits it to the remote store.
    pub syncs: bool,
    pub handoff: Handoff,
}

/// The stages of the onboarding survey, in their fixed forward order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SurveyStageId {
    Age,
    NativeLanguage,
    EnglishLevel,
    LearningPurpose,
    SpeakOut,
    ListeningComprehension,
    SentenceFormation,
    CantSpeak,
    DailyGoal,
    StudyTime,
    LearningStyle,
    Motivation,
    Challenges,
    Vocabulary,
    IntermediateVocabulary,
    AdvancedVocabulary,
    Interests,
    Personalization,
}

impl SurveyStageId {
    /// Every stage in forward order.
    pub const ALL: [SurveyStageId; 18] = [
        Self::Age,
        Self::NativeLanguage,
        Self::EnglishLevel,
        Self::LearningPurpose,
        Self::SpeakOut,
        Self::ListeningComprehension,
        Self::SentenceFormation,
        Self::CantSpeak,
        Self::DailyGoal,
        Self::StudyTime,
        Self::LearningStyle,
        Self::Motivation,
        Self::Challenges,
        Self::Vocabulary,
        Self::IntermediateVocabulary,
        Self::AdvancedVocabulary,
        Self::Interests,
        Self::Personalization,
    ];

    pub const FIRST: SurveyStageId = Self::Age;
    pub const LAST: SurveyStageId = Self::Personalization;

    /// Total number of stages shown to the user.
    pub const fn total() -> u32 {
        Self::ALL.len() as u32
    }

    /// The transition table. Back edges mirror forward edges; the two
    /// immediate handoffs are a per-edge policy.
    pub fn edges(&self) -> StageEdges {
        use SurveyStageId::*;
        let (forward, back, handoff) = match self {
            Age => (Some(NativeLanguage), None, Handoff::Acknowledged),
            NativeLanguage => (Some(EnglishLevel), Some(Age), Handoff::Acknowledged),
            EnglishLevel => (Some(LearningPurpose), Some(NativeLanguage), Handoff::Acknowledged),
            LearningPurpose => (Some(SpeakOut), Some(EnglishLevel), Handoff::Immediate),
            SpeakOut => (
                Some(ListeningComprehension),
                Some(LearningPurpose),
                Handoff::Acknowledged,
            ),
            ListeningComprehension => (
                Some(SentenceFormation),
                Some(SpeakOut),
                Handoff::Acknowledged,
            ),
            SentenceFormation => (
                Some(CantSpeak),
                Some(ListeningComprehension),
                Handoff::Immediate,
            ),
            CantSpeak => (Some(DailyGoal), Some(SentenceFormation), Handoff::Acknowledged),
            DailyGoal => (Some(StudyTime), Some(CantSpeak), Handoff::Acknowledged),
            StudyTime => (Some(LearningStyle), Some(DailyGoal), Handoff::Acknowledged),
            LearningStyle => (Some(Motivation), Some(StudyTime), Handoff::Acknowledged),
            Motivation => (Some(Challenges), Some(LearningStyle), Handoff::Acknowledged),
            Challenges => (Some(Vocabulary), Some(Motivation), Handoff::Acknowledged),
            Vocabulary => (
                Some(IntermediateVocabulary),
                Some(Challenges),
                Handoff::Acknowledged,
            ),
            IntermediateVocabulary => (
                Some(AdvancedVocabulary),
                Some(Vocabulary),
                Handoff::Acknowledged,
            ),
            AdvancedVocabulary => (
                Some(Interests),
                Some(IntermediateVocabulary),
                Handoff::Acknowledged,
            ),
            Interests => (
                Some(Personalization),
                Some(AdvancedVocabulary),
                Handoff::Acknowledged,
            ),
            Personalization => (None, Some(Interests), Handoff::Acknowledged),
        };
        StageEdges {
            forward,
            back,
            // The last stage is submitted as part of the final profile instead.
            syncs: forward.is_some(),
            handoff,
        }
    }

    /// Next stage in the forward direction, if any.
    pub fn next(&self) -> Option<SurveyStageId> {
        self.edges().forward
    }

    /// Designated predecessor for back navigation, if any.
    pub fn previous(&self) -> Option<SurveyStageId> {
        self.edges().back
    }

    /// Whether `target` is reachable from `self` by a single forward edge.
    pub fn can_advance_to(&self, target: SurveyStageId) -> bool {
        self.next() == Some(target)
    }

    /// Whether this is the stage that runs the finalization pipeline.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Personalization)
    }

    /// 1-based position shown to the user ("step 3 of 18").
    pub fn number(&self) -> u32 {
        // ALL is in declaration order, so the discriminant is the index.
        *self as u32 + 1
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Age => "age",
            Self::NativeLanguage => "native_language",
            Self::EnglishLevel => "english_level",
            Self::LearningPurpose => "learning_purpose",
            Self::SpeakOut => "speak_out",
            Self::ListeningComprehension => "listening_comprehension",
            Self::SentenceFormation => "sentence_formation",
            Self::CantSpeak => "cant_speak",
            Self::DailyGoal => "daily_goal",
            Self::StudyTime => "study_time",
            Self::LearningStyle => "learning_style",
            Self::Motivation => "motivation",
            Self::Challenges => "challenges",
            Self::Vocabulary => "vocabulary",
            Self::IntermediateVocabulary => "intermediate_vocabulary",
            Self::AdvancedVocabulary => "advanced_vocabulary",
            Self::Interests => "interests",
            Self::Personalization => "personalization",
        }
    }
}

impl std::fmt::Display for SurveyStageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SurveyStageId {
    type Err = SurveyError;

    /// Accepts the snake_case id as well as the camelCase spelling used by
    /// older front ends (`nativeLanguage`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .flat_map(char::to_lowercase)
            .collect();
        Self::ALL
            .into_iter()
            .find(|stage| stage.as_str().replace('_', "") == normalized)
            .ok_or_else(|| SurveyError::UnknownStage(s.to_string()))
    }
}

//! Accumulated survey answers and boundary coercion of their raw payloads.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::stage::SurveyStageId;

/// Raw answers keyed by the stage that captured them.
///
/// Each stage writes only its own key. Back navigation never removes an
/// entry; re-completing a stage replaces its own payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Answers(BTreeMap<SurveyStageId, serde_json::Value>);

impl Answers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, stage: SurveyStageId, payload: serde_json::Value) {
        self.0.insert(stage, payload);
    }

    pub fn get(&self, stage: SurveyStageId) -> Option<&serde_json::Value> {
        self.0.get(&stage)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SurveyStageId, &serde_json::Value)> {
        self.0.iter()
    }

    /// Flatten into a JSON object keyed by stage id.
    pub fn to_json(&self) -> serde_json::Value {
        let map = self
            .0
            .iter()
            .map(|(stage, value)| (stage.to_string(), value.clone()))
            .collect::<serde_json::Map<_, _>>();
        serde_json::Value::Object(map)
    }

    /// The age bucket chosen at the `age` stage, e.g. `"25-34"`.
    pub fn age_range(&self) -> Option<String> {
        let value = self.get(SurveyStageId::Age)?;
        string_or_field(value, &["age_range", "ageRange", "value"])
    }

    /// The self-reported English level, if it parses.
    pub fn english_level(&self) -> Option<EnglishLevel> {
        let value = self.get(SurveyStageId::EnglishLevel)?;
        string_or_field(value, &["level", "english_level", "englishLevel", "value"])
            .and_then(|s| s.parse().ok())
    }

    /// The set of learning purposes; non-string entries are dropped.
    pub fn learning_purposes(&self) -> Vec<String> {
        let Some(value) = self.get(SurveyStageId::LearningPurpose) else {
            return Vec::new();
        };
        let list = match value {
            serde_json::Value::Object(obj) => obj
                .get("purposes")
                .or_else(|| obj.get("learning_purpose"))
                .or_else(|| obj.get("learningPurpose")),
            other => Some(other),
        };
        match list {
            Some(serde_json::Value::Array(items)) => items
                .iter()
                .filter_map(|v| v.as_str())
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            Some(serde_json::Value::String(s)) if !s.trim().is_empty() => {
                vec![s.trim().to_string()]
            }
            _ => Vec::new(),
        }
    }

    /// Number of items selected at a vocabulary stage.
    ///
    /// Anything that is not an array of selections (negative numbers, strings,
    /// objects without a `words`/`selected` array) counts as zero.
    pub fn selection_count(&self, stage: SurveyStageId) -> u32 {
        let Some(value) = self.get(stage) else {
            return 0;
        };
        let items = match value {
            serde_json::Value::Array(items) => Some(items),
            serde_json::Value::Object(obj) => obj
                .get("words")
                .or_else(|| obj.get("selected"))
                .and_then(|v| v.as_array()),
            _ => None,
        };
        items
            .map(|items| u32::try_from(items.len()).unwrap_or(u32::MAX))
            .unwrap_or(0)
    }
}

fn string_or_field(value: &serde_json::Value, keys: &[&str]) -> Option<String> {
    let s = match value {
        serde_json::Value::String(s) => Some(s.as_str()),
        serde_json::Value::Object(obj) => keys.iter().find_map(|k| obj.get(*k)?.as_str()),
        _ => None,
    }?;
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_string())
}

/// Self-reported English level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EnglishLevel {
    Beginner,
    PreIntermediate,
    Intermediate,
    UpperIntermediate,
    Advanced,
    Proficient,
}

/// Coarse grouping of [`EnglishLevel`] used by tie-breaking and routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LevelBucket {
    Lower,
    Mid,
    Higher,
}

impl EnglishLevel {
    pub fn bucket(&self) -> LevelBucket {
        match self {
            Self::Beginner | Self::PreIntermediate => LevelBucket::Lower,
            Self::Intermediate | Self::UpperIntermediate => LevelBucket::Mid,
            Self::Advanced | Self::Proficient => LevelBucket::Higher,
        }
    }
}

impl std::str::FromStr for EnglishLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s
            .trim()
            .to_lowercase()
            .replace(['_', ' '], "-");
        match normalized.as_str() {
            "beginner" => Ok(Self::Beginner),
            "pre-intermediate" | "preintermediate" | "elementary" => Ok(Self::PreIntermediate),
            "intermediate" => Ok(Self::Intermediate),
            "upper-intermediate" | "upperintermediate" => Ok(Self::UpperIntermediate),
            "advanced" => Ok(Self::Advanced),
            "proficient" | "fluent" => Ok(Self::Proficient),
            _ => Err(format!("unrecognized English level: {s}")),
        }
    }
}

//! Example, variant and verdict types.
//!
//! These types are the JSON contract with callers: field names are camelCase
//! and `HallucinationExample` flattens the `BaseExample` it was derived from.

use super::{HalluvalError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Tool definition attached to an example. Passed through, never interpreted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: ToolParameters,
}

/// JSON-schema-like parameter block of a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolParameters {
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<serde_json::Map<String, serde_json::Value>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<Vec<String>>,
}

/// Input question/answer pair supplied by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BaseExample {
    /// Passage the question is asked against
    pub context: String,

    /// The question
    pub question: String,

    /// Ground-truth (expert) answer
    pub correct_answer: String,

    /// Optional tool definitions
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolSpec>>,

    /// Optional free-form metadata
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

impl BaseExample {
    /// Create an example without tools or metadata.
    pub fn new(
        context: impl Into<String>,
        question: impl Into<String>,
        correct_answer: impl Into<String>,
    ) -> Self {
        Self {
            context: context.into(),
            question: question.into(),
            correct_answer: correct_answer.into(),
            tools: None,
            metadata: None,
        }
    }

    /// Check the fields the pipeline cannot work without.
    ///
    /// An empty context is allowed; the question and expert answer are not.
    pub fn validate(&self) -> Result<()> {
        if self.question.trim().is_empty() {
            return Err(HalluvalError::InvalidInput(
                "question must not be empty".to_string(),
            ));
        }
        if self.correct_answer.trim().is_empty() {
            return Err(HalluvalError::InvalidInput(
                "correctAnswer must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Which of the three answers a variant is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariantKind {
    /// The expert answer, copied verbatim
    Original,
    /// A confidently fabricated answer
    Hallucination,
    /// A correct but incomplete answer
    Partial,
}

impl VariantKind {
    /// All kinds, in batch order.
    pub const ALL: [VariantKind; 3] = [
        VariantKind::Original,
        VariantKind::Hallucination,
        VariantKind::Partial,
    ];

    /// Position of this kind inside a batch.
    pub fn index(self) -> usize {
        match self {
            VariantKind::Original => 0,
            VariantKind::Hallucination => 1,
            VariantKind::Partial => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            VariantKind::Original => "original",
            VariantKind::Hallucination => "hallucination",
            VariantKind::Partial => "partial",
        }
    }
}

impl fmt::Display for VariantKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Judge category comparing a submission to the expert answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JudgeChoice {
    /// Subset of the expert answer, fully consistent
    A,
    /// Superset of the expert answer, fully consistent
    B,
    /// Same details as the expert answer
    C,
    /// Disagreement with the expert answer
    D,
    /// Differences that don't matter for factuality
    E,
}

impl JudgeChoice {
    pub const ALL: [JudgeChoice; 5] = [
        JudgeChoice::A,
        JudgeChoice::B,
        JudgeChoice::C,
        JudgeChoice::D,
        JudgeChoice::E,
    ];

    /// Map a letter to a choice. Only uppercase `A`-`E` are accepted.
    pub fn from_letter(letter: char) -> Option<Self> {
        match letter {
            'A' => Some(JudgeChoice::A),
            'B' => Some(JudgeChoice::B),
            'C' => Some(JudgeChoice::C),
            'D' => Some(JudgeChoice::D),
            'E' => Some(JudgeChoice::E),
            _ => None,
        }
    }

    pub fn letter(self) -> char {
        match self {
            JudgeChoice::A => 'A',
            JudgeChoice::B => 'B',
            JudgeChoice::C => 'C',
            JudgeChoice::D => 'D',
            JudgeChoice::E => 'E',
        }
    }
}

impl fmt::Display for JudgeChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

/// Structured judge output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JudgeVerdict {
    pub choice: JudgeChoice,
    pub reasoning: String,
    /// No valid `Choice:` letter was found and `choice` is the fallback
    pub defaulted: bool,
}

/// Factuality score derived from a verdict.
///
/// Only `JudgeScore::from_verdict` builds one; deserialization re-checks that
/// `score` matches the scoring table for `choice`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "JudgeScoreRecord")]
pub struct JudgeScore {
    pub(crate) choice: JudgeChoice,
    pub(crate) score: f64,
    pub(crate) reasoning: String,
    #[serde(skip_serializing_if = "is_false")]
    pub(crate) parse_defaulted: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl JudgeScore {
    pub fn choice(&self) -> JudgeChoice {
        self.choice
    }

    pub fn score(&self) -> f64 {
        self.score
    }

    pub fn reasoning(&self) -> &str {
        &self.reasoning
    }

    /// The judge output had no usable choice and D was assumed.
    pub fn parse_defaulted(&self) -> bool {
        self.parse_defaulted
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct JudgeScoreRecord {
    choice: JudgeChoice,
    score: f64,
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    parse_defaulted: bool,
}

impl TryFrom<JudgeScoreRecord> for JudgeScore {
    type Error = String;

    fn try_from(record: JudgeScoreRecord) -> std::result::Result<Self, Self::Error> {
        let expected = crate::scoring::score_of(record.choice);
        if (record.score - expected).abs() > f64::EPSILON {
            return Err(format!(
                "score {} does not match choice {} (expected {expected})",
                record.score, record.choice
            ));
        }
        Ok(Self {
            choice: record.choice,
            score: expected,
            reasoning: record.reasoning,
            parse_defaulted: record.parse_defaulted,
        })
    }
}

/// One generated answer for a base example.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HallucinationExample {
    #[serde(flatten)]
    pub base: BaseExample,

    /// The answer under evaluation
    pub generated_answer: String,

    #[serde(rename = "type")]
    pub kind: VariantKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    score: Option<JudgeScore>,
}

impl HallucinationExample {
    /// Create an unscored variant.
    pub fn unscored(base: BaseExample, kind: VariantKind, generated_answer: String) -> Self {
        Self {
            base,
            generated_answer,
            kind,
            score: None,
        }
    }

    pub fn score(&self) -> Option<&JudgeScore> {
        self.score.as_ref()
    }

    pub fn is_scored(&self) -> bool {
        self.score.is_some()
    }

    /// Attach the judge score. A variant is scored exactly once.
    pub fn attach_score(&mut self, score: JudgeScore) -> Result<()> {
        if self.score.is_some() {
            return Err(HalluvalError::Internal(format!(
                "{} variant already scored",
                self.kind
            )));
        }
        self.score = Some(score);
        Ok(())
    }
}

/// The three variants of one example, always ordered
/// `[original, hallucination, partial]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    try_from = "Vec<HallucinationExample>",
    into = "Vec<HallucinationExample>"
)]
pub struct VariantBatch {
    variants: [HallucinationExample; 3],
}

impl VariantBatch {
    pub(crate) fn new(
        original: HallucinationExample,
        hallucination: HallucinationExample,
        partial: HallucinationExample,
    ) -> Result<Self> {
        Self::try_from(vec![original, hallucination, partial]).map_err(HalluvalError::Internal)
    }

    /// Variant of the given kind.
    pub fn get(&self, kind: VariantKind) -> &HallucinationExample {
        &self.variants[kind.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = &HallucinationExample> {
        self.variants.iter()
    }

    pub(crate) fn variants_mut(&mut self) -> &mut [HallucinationExample; 3] {
        &mut self.variants
    }

    /// Every variant carries a score.
    pub fn is_fully_scored(&self) -> bool {
        self.variants.iter().all(HallucinationExample::is_scored)
    }
}

impl TryFrom<Vec<HallucinationExample>> for VariantBatch {
    type Error = String;

    fn try_from(variants: Vec<HallucinationExample>) -> std::result::Result<Self, Self::Error> {
        let kinds: Vec<VariantKind> = variants.iter().map(|v| v.kind).collect();
        if kinds != VariantKind::ALL {
            return Err(format!(
                "expected variants [original, hallucination, partial], got {kinds:?}"
            ));
        }
        let variants: [HallucinationExample; 3] = variants
            .try_into()
            .map_err(|_| "expected exactly three variants".to_string())?;
        Ok(Self { variants })
    }
}

impl From<VariantBatch> for Vec<HallucinationExample> {
    fn from(batch: VariantBatch) -> Self {
        batch.variants.into()
    }
}

impl<'a> IntoIterator for &'a VariantBatch {
    type Item = &'a HallucinationExample;
    type IntoIter = std::slice::Iter<'a, HallucinationExample>;

    fn into_iter(self) -> Self::IntoIter {
        self.variants.iter()
    }
}

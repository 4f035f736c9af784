//! The four-dimension qualification scorecard and its structured-output contract.
//!
//! Generated output is validated here, independently of whatever schema
//! enforcement the generation backend performs. A [`QualificationScoreCard`]
//! value is valid by construction: fields are private, the only constructors
//! validate, and deserialization routes through [`QualificationScoreCard::from_value`].

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use super::error::{PipelineError, Result};

/// Lowest permitted dimension score.
pub const SCORE_MIN: i64 = 0;

/// Highest permitted dimension score.
pub const SCORE_MAX: i64 = 10;

/// A scored axis of the evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    TechnicalExpertise,
    SpeakingExperience,
    IndustryImpact,
    OverallRecommendation,
}

impl Dimension {
    pub const ALL: [Dimension; 4] = [
        Dimension::TechnicalExpertise,
        Dimension::SpeakingExperience,
        Dimension::IndustryImpact,
        Dimension::OverallRecommendation,
    ];

    /// JSON key of this dimension.
    pub fn key(&self) -> &'static str {
        match self {
            Dimension::TechnicalExpertise => "technical_expertise",
            Dimension::SpeakingExperience => "speaking_experience",
            Dimension::IndustryImpact => "industry_impact",
            Dimension::OverallRecommendation => "overall_recommendation",
        }
    }

    /// Human-readable heading used in reports.
    pub fn title(&self) -> &'static str {
        match self {
            Dimension::TechnicalExpertise => "Technical Expertise",
            Dimension::SpeakingExperience => "Speaking Experience",
            Dimension::IndustryImpact => "Industry Impact",
            Dimension::OverallRecommendation => "Overall Recommendation",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|d| d.key() == key)
    }
}

impl std::fmt::Display for Dimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

/// Score and justification for one dimension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DimensionScore {
    score: i64,
    reasoning: String,
}

impl DimensionScore {
    /// Build a score, enforcing the range and non-empty reasoning.
    pub fn new(score: i64, reasoning: impl Into<String>) -> Result<Self> {
        Self::checked("score", score, reasoning.into())
    }

    fn checked(field: &str, score: i64, reasoning: String) -> Result<Self> {
        if !(SCORE_MIN..=SCORE_MAX).contains(&score) {
            return Err(PipelineError::schema(
                format!("{field}.score"),
                format!("score {score} outside {SCORE_MIN}..={SCORE_MAX}"),
            ));
        }
        if reasoning.trim().is_empty() {
            return Err(PipelineError::schema(
                format!("{field}.reasoning"),
                "reasoning must not be empty",
            ));
        }
        Ok(Self { score, reasoning })
    }

    pub fn score(&self) -> i64 {
        self.score
    }

    pub fn reasoning(&self) -> &str {
        &self.reasoning
    }
}

/// Structured qualification assessment with exactly four dimensions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Value")]
pub struct QualificationScoreCard {
    technical_expertise: DimensionScore,
    speaking_experience: DimensionScore,
    industry_impact: DimensionScore,
    overall_recommendation: DimensionScore,
}

impl QualificationScoreCard {
    pub fn new(
        technical_expertise: DimensionScore,
        speaking_experience: DimensionScore,
        industry_impact: DimensionScore,
        overall_recommendation: DimensionScore,
    ) -> Self {
        Self {
            technical_expertise,
            speaking_experience,
            industry_impact,
            overall_recommendation,
        }
    }

    /// Validate an arbitrary JSON value against the scorecard contract.
    ///
    /// Rejects: non-objects, unknown or missing dimensions, unexpected fields
    /// inside a dimension, non-integer scores, scores outside
    /// `SCORE_MIN..=SCORE_MAX`, and empty reasoning.
    pub fn from_value(value: &Value) -> Result<Self> {
        let object = value
            .as_object()
            .ok_or_else(|| PipelineError::schema("$", "expected a JSON object"))?;

        if let Some(unknown) = object.keys().find(|k| Dimension::from_key(k).is_none()) {
            return Err(PipelineError::schema(
                unknown.as_str(),
                "unknown dimension",
            ));
        }

        Ok(Self {
            technical_expertise: parse_dimension(object, Dimension::TechnicalExpertise)?,
            speaking_experience: parse_dimension(object, Dimension::SpeakingExperience)?,
            industry_impact: parse_dimension(object, Dimension::IndustryImpact)?,
            overall_recommendation: parse_dimension(object, Dimension::OverallRecommendation)?,
        })
    }

    /// Parse generated text. A single surrounding markdown code fence is tolerated.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let body = strip_code_fence(text);
        let value: Value = serde_json::from_str(body)
            .map_err(|e| PipelineError::schema("$", format!("not valid JSON: {e}")))?;
        Self::from_value(&value)
    }

    pub fn dimension(&self, dimension: Dimension) -> &DimensionScore {
        match dimension {
            Dimension::TechnicalExpertise => &self.technical_expertise,
            Dimension::SpeakingExperience => &self.speaking_experience,
            Dimension::IndustryImpact => &self.industry_impact,
            Dimension::OverallRecommendation => &self.overall_recommendation,
        }
    }

    /// Dimensions in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = (Dimension, &DimensionScore)> {
        Dimension::ALL.into_iter().map(move |d| (d, self.dimension(d)))
    }

    pub fn total(&self) -> i64 {
        self.iter().map(|(_, s)| s.score()).sum()
    }

    /// SHA-256 hex digest of the canonical JSON encoding.
    pub fn content_digest(&self) -> Result<String> {
        use sha2::Digest as _;
        let bytes = serde_json::to_vec(self)?;
        Ok(hex::encode(sha2::Sha256::digest(&bytes)))
    }

    /// JSON Schema handed to the generation capability as the output contract.
    pub fn json_schema() -> Value {
        let dimension_schema = json!({
            "type": "object",
            "additionalProperties": false,
            "required": ["score", "reasoning"],
            "properties": {
                "score": {
                    "type": "integer",
                    "description": format!("Whole number from {SCORE_MIN} to {SCORE_MAX}"),
                    "minimum": SCORE_MIN,
                    "maximum": SCORE_MAX,
                },
                "reasoning": {
                    "type": "string",
                    "description": "Evidence from the research brief behind the score; never empty",
                    "minLength": 1,
                },
            },
        });

        let mut properties = Map::new();
        for dimension in Dimension::ALL {
            properties.insert(dimension.key().to_string(), dimension_schema.clone());
        }

        json!({
            "type": "object",
            "additionalProperties": false,
            "required": Dimension::ALL.iter().map(|d| d.key()).collect::<Vec<_>>(),
            "properties": properties,
        })
    }
}

impl TryFrom<Value> for QualificationScoreCard {
    type Error = PipelineError;

    fn try_from(value: Value) -> Result<Self> {
        Self::from_value(&value)
    }
}

fn parse_dimension(object: &Map<String, Value>, dimension: Dimension) -> Result<DimensionScore> {
    let key = dimension.key();
    let entry = object
        .get(key)
        .ok_or_else(|| PipelineError::schema(key, "missing dimension"))?
        .as_object()
        .ok_or_else(|| PipelineError::schema(key, "expected an object"))?;

    if let Some(extra) = entry
        .keys()
        .find(|k| k.as_str() != "score" && k.as_str() != "reasoning")
    {
        return Err(PipelineError::schema(
            format!("{key}.{extra}"),
            "unexpected field",
        ));
    }

    let score = entry
        .get("score")
        .ok_or_else(|| PipelineError::schema(format!("{key}.score"), "missing field"))?
        .as_i64()
        .ok_or_else(|| PipelineError::schema(format!("{key}.score"), "expected an integer"))?;

    let reasoning = entry
        .get("reasoning")
        .ok_or_else(|| PipelineError::schema(format!("{key}.reasoning"), "missing field"))?
        .as_str()
        .ok_or_else(|| PipelineError::schema(format!("{key}.reasoning"), "expected a string"))?;

    DimensionScore::checked(key, score, reasoning.to_string())
}

fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(body) = rest.strip_suffix("```") else {
        return trimmed;
    };
    // Drop an optional language tag on the opening fence line.
    match body.find('\n') {
        Some(newline) => body[newline + 1..].trim(),
        None => body.trim(),
    }
}

/// A scorecard paired with the digest taken when it was accepted.
///
/// Passed from the evaluator to the messenger; [`SealedScoreCard::verify`]
/// proves it was not altered in between.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SealedScoreCard {
    scorecard: QualificationScoreCard,
    digest: String,
}

impl SealedScoreCard {
    pub fn seal(scorecard: QualificationScoreCard) -> Result<Self> {
        let digest = scorecard.content_digest()?;
        Ok(Self { scorecard, digest })
    }

    pub fn verify(&self) -> Result<()> {
        let actual = self.scorecard.content_digest()?;
        if actual != self.digest {
            return Err(PipelineError::DigestMismatch {
                expected: self.digest.clone(),
                actual,
            });
        }
        Ok(())
    }

    pub fn scorecard(&self) -> &QualificationScoreCard {
        &self.scorecard
    }

    pub fn digest(&self) -> &str {
        &self.digest
    }

    pub fn into_inner(self) -> QualificationScoreCard {
        self.scorecard
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_json(score: i64) -> Value {
        json!({
            "technical_expertise": {"score": score, "reasoning": "Maintains an open-source feature store."},
            "speaking_experience": {"score": score, "reasoning": "Spoke at two regional meetups."},
            "industry_impact": {"score": score, "reasoning": "Platform adopted by three teams."},
            "overall_recommendation": {"score": score, "reasoning": "Solid fit for the ML Ops track."},
        })
    }

    fn field_of(err: PipelineError) -> String {
        match err {
            PipelineError::SchemaViolation { field, .. } => field,
            other => panic!("expected SchemaViolation, got {other:?}"),
        }
    }

    #[test]
    fn test_valid_scorecard_has_four_dimensions() {
        let card = QualificationScoreCard::from_value(&valid_json(7)).unwrap();
        let keys: Vec<_> = card.iter().map(|(d, _)| d.key()).collect();
        assert_eq!(
            keys,
            vec![
                "technical_expertise",
                "speaking_experience",
                "industry_impact",
                "overall_recommendation"
            ]
        );
        assert_eq!(card.total(), 28);
    }

    #[test]
    fn test_missing_dimension_rejected() {
        let mut value = valid_json(7);
        value.as_object_mut().unwrap().remove("industry_impact");
        let err = QualificationScoreCard::from_value(&value).unwrap_err();
        assert_eq!(field_of(err), "industry_impact");
    }

    #[test]
    fn test_unknown_dimension_rejected() {
        let mut value = valid_json(7);
        value["charisma"] = json!({"score": 9, "reasoning": "Great energy"});
        let err = QualificationScoreCard::from_value(&value).unwrap_err();
        assert_eq!(field_of(err), "charisma");
    }

    #[test]
    fn test_float_score_rejected() {
        let mut value = valid_json(7);
        value["speaking_experience"]["score"] = json!(7.5);
        let err = QualificationScoreCard::from_value(&value).unwrap_err();
        assert_eq!(field_of(err), "speaking_experience.score");
    }

    #[test]
    fn test_string_score_rejected() {
        let mut value = valid_json(7);
        value["technical_expertise"]["score"] = json!("7");
        assert!(QualificationScoreCard::from_value(&value).is_err());
    }

    #[test]
    fn test_out_of_range_score_rejected() {
        let err = QualificationScoreCard::from_value(&valid_json(11)).unwrap_err();
        assert_eq!(field_of(err), "technical_expertise.score");

        let err = QualificationScoreCard::from_value(&valid_json(-1)).unwrap_err();
        assert_eq!(field_of(err), "technical_expertise.score");
    }

    #[test]
    fn test_boundary_scores_accepted() {
        assert!(QualificationScoreCard::from_value(&valid_json(SCORE_MIN)).is_ok());
        assert!(QualificationScoreCard::from_value(&valid_json(SCORE_MAX)).is_ok());
    }

    #[test]
    fn test_blank_reasoning_rejected() {
        let mut value = valid_json(7);
        value["overall_recommendation"]["reasoning"] = json!("   ");
        let err = QualificationScoreCard::from_value(&value).unwrap_err();
        assert_eq!(field_of(err), "overall_recommendation.reasoning");
    }

    #[test]
    fn test_extra_dimension_field_rejected() {
        let mut value = valid_json(7);
        value["industry_impact"]["confidence"] = json!(0.9);
        let err = QualificationScoreCard::from_value(&value).unwrap_err();
        assert_eq!(field_of(err), "industry_impact.confidence");
    }

    #[test]
    fn test_non_object_rejected() {
        let err = QualificationScoreCard::from_value(&json!([1, 2, 3])).unwrap_err();
        assert_eq!(field_of(err), "$");
    }

    #[test]
    fn test_from_json_str_accepts_fenced_output() {
        let text = format!("```json\n{}\n```", valid_json(6));
        let card = QualificationScoreCard::from_json_str(&text).unwrap();
        assert_eq!(card.dimension(Dimension::IndustryImpact).score(), 6);
    }

    #[test]
    fn test_from_json_str_rejects_prose() {
        let err = QualificationScoreCard::from_json_str("The speaker looks great!").unwrap_err();
        assert_eq!(field_of(err), "$");
    }

    #[test]
    fn test_serde_deserialize_goes_through_validation() {
        let bad = r#"{"technical_expertise": {"score": 3, "reasoning": "ok"}}"#;
        assert!(serde_json::from_str::<QualificationScoreCard>(bad).is_err());

        let good = valid_json(4).to_string();
        let card: QualificationScoreCard = serde_json::from_str(&good).unwrap();
        assert_eq!(card.dimension(Dimension::TechnicalExpertise).score(), 4);
    }

    #[test]
    fn test_json_schema_requires_all_dimensions() {
        let schema = QualificationScoreCard::json_schema();
        let required = schema["required"].as_array().unwrap();
        assert_eq!(required.len(), 4);
        assert_eq!(schema["additionalProperties"], json!(false));
        assert_eq!(
            schema["properties"]["industry_impact"]["properties"]["score"]["maximum"],
            json!(SCORE_MAX)
        );
    }

    #[test]
    fn test_sealed_scorecard_digest_is_stable() {
        let a = SealedScoreCard::seal(QualificationScoreCard::from_value(&valid_json(7)).unwrap())
            .unwrap();
        let b = SealedScoreCard::seal(QualificationScoreCard::from_value(&valid_json(7)).unwrap())
            .unwrap();
        assert_eq!(a.digest(), b.digest());
        assert!(a.verify().is_ok());
    }

    #[test]
    fn test_sealed_scorecard_detects_tampering() {
        let mut sealed =
            SealedScoreCard::seal(QualificationScoreCard::from_value(&valid_json(7)).unwrap())
                .unwrap();
        sealed.scorecard.industry_impact = DimensionScore::new(2, "changed").unwrap();
        assert!(matches!(
            sealed.verify(),
            Err(PipelineError::DigestMismatch { .. })
        ));
    }
}

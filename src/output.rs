//! The structured profile produced by the pipeline.
//!
//! [`ParsedProfile`] is what the model answer yields after lenient parsing.
//! [`StructuredProfile`] is the enriched, publishable artifact; the only way
//! to build one is [`StructuredProfile::enrich`], so a profile without
//! identity and processing metadata cannot reach the outbound channel.
//!
//! ## Lenient deserialisation
//!
//! Every field of the model-derived types is declared with
//! `#[serde(default, deserialize_with = ...)]` using the helpers in
//! [`lenient`]: a missing field, a `null`, or a value of the wrong JSON type
//! all resolve to the zero value of that field instead of failing the parse.
//! This mirrors the instruction given to the model ("use empty strings, 0 or
//! [] for unknown values").

use crate::document::DocumentReference;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One position held by the candidate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Experience {
    #[serde(default, deserialize_with = "lenient::string")]
    pub company: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub title: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub start_date: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub end_date: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Education {
    #[serde(default, deserialize_with = "lenient::string")]
    pub institution: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub degree: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub field: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub start_date: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub end_date: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LanguageProficiency {
    #[serde(default, deserialize_with = "lenient::string")]
    pub language: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub level: String,
}

/// The four weighted sub-scores behind `overallScore`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreBreakdown {
    /// Layout and parseability by ATS software (weight 20 %).
    #[serde(default, deserialize_with = "lenient::score")]
    pub formatting_score: u32,
    /// Clarity and quantified achievements (weight 30 %).
    #[serde(default, deserialize_with = "lenient::score")]
    pub content_score: u32,
    /// Coverage of role-relevant keywords (weight 25 %).
    #[serde(default, deserialize_with = "lenient::score")]
    pub keyword_score: u32,
    /// Relevance and progression of experience (weight 25 %).
    #[serde(default, deserialize_with = "lenient::score")]
    pub experience_score: u32,
    #[serde(default, deserialize_with = "lenient::string")]
    pub explanation: String,
}

/// Applicant-tracking-system style assessment of the résumé.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AtsAnalysis {
    /// 0–100.
    #[serde(default, deserialize_with = "lenient::score")]
    pub overall_score: u32,
    #[serde(default, deserialize_with = "lenient::string")]
    pub assessment: String,
    #[serde(default, deserialize_with = "lenient::strings")]
    pub strengths: Vec<String>,
    #[serde(default, deserialize_with = "lenient::strings")]
    pub weaknesses: Vec<String>,
    #[serde(default, deserialize_with = "lenient::strings")]
    pub recommendations: Vec<String>,
    /// "HIGH", "MEDIUM" or "LOW".
    #[serde(default, deserialize_with = "lenient::string")]
    pub ats_compatibility: String,
    #[serde(default, deserialize_with = "lenient::strings")]
    pub missing_keywords: Vec<String>,
    /// "HIGH", "MEDIUM" or "LOW".
    #[serde(default, deserialize_with = "lenient::string")]
    pub improvement_priority: String,
    #[serde(default, deserialize_with = "lenient::object")]
    pub score_breakdown: ScoreBreakdown,
}

/// Profile content as read from the model answer.
///
/// Identity fields the model might echo back (`subjectId`, `documentId`) are
/// not part of this type and are ignored while parsing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParsedProfile {
    #[serde(default, deserialize_with = "lenient::string")]
    pub first_name: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub last_name: String,
    #[serde(default, deserialize_with = "lenient::strings")]
    pub skills: Vec<String>,
    #[serde(default, deserialize_with = "lenient::list")]
    pub experiences: Vec<Experience>,
    #[serde(default, deserialize_with = "lenient::list")]
    pub education: Vec<Education>,
    #[serde(default, deserialize_with = "lenient::strings")]
    pub certifications: Vec<String>,
    #[serde(default, deserialize_with = "lenient::list")]
    pub languages: Vec<LanguageProficiency>,
    /// "JUNIOR", "MID", "SENIOR", "LEAD" or "EXECUTIVE".
    #[serde(default, deserialize_with = "lenient::string")]
    pub seniority_level: String,
    #[serde(default, deserialize_with = "lenient::number")]
    pub years_of_experience: f64,
    #[serde(default, deserialize_with = "lenient::string")]
    pub summary: String,
    #[serde(default, deserialize_with = "lenient::string")]
    pub cv_language: String,
    #[serde(default, deserialize_with = "lenient::object")]
    pub ats_analysis: AtsAnalysis,
}

/// How and when a profile was produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingMetadata {
    pub document_id: i64,
    pub model: String,
    pub detected_language: String,
    pub processed_at: DateTime<Utc>,
}

/// The published artifact: trusted identity, model content and run metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuredProfile {
    pub subject_id: String,
    pub document_id: i64,
    #[serde(flatten)]
    pub profile: ParsedProfile,
    pub ai_metadata: ProcessingMetadata,
}

impl StructuredProfile {
    /// Combine a parsed profile with values the pipeline trusts more than the
    /// model: identity from the triggering event and the locally detected
    /// language.
    pub fn enrich(
        mut profile: ParsedProfile,
        event: &DocumentReference,
        detected_language: &str,
        model: &str,
        processed_at: DateTime<Utc>,
    ) -> Self {
        profile.cv_language = detected_language.to_string();
        Self {
            subject_id: event.subject_id.clone(),
            document_id: event.document_id,
            profile,
            ai_metadata: ProcessingMetadata {
                document_id: event.document_id,
                model: model.to_string(),
                detected_language: detected_language.to_string(),
                processed_at,
            },
        }
    }
}

/// `deserialize_with` helpers that never fail on type mismatches.
pub mod lenient {
    use serde::de::DeserializeOwned;
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    pub fn string<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::String(s) => s,
            _ => String::new(),
        })
    }

    pub fn number<'de, D: Deserializer<'de>>(d: D) -> Result<f64, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::Number(n) => n.as_f64().filter(|v| v.is_finite()).unwrap_or(0.0),
            _ => 0.0,
        })
    }

    /// Integer score clamped to 0–100; fractional values are rounded.
    pub fn score<'de, D: Deserializer<'de>>(d: D) -> Result<u32, D::Error> {
        let v = number(d)?;
        Ok(v.round().clamp(0.0, 100.0) as u32)
    }

    /// List of strings; non-string elements are dropped.
    pub fn strings<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
        Ok(match Value::deserialize(d)? {
            Value::Array(items) => items
                .into_iter()
                .filter_map(|v| match v {
                    Value::String(s) => Some(s),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        })
    }

    /// List of objects; elements that are not objects are dropped.
    pub fn list<'de, D, T>(d: D) -> Result<Vec<T>, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned,
    {
        Ok(match Value::deserialize(d)? {
            Value::Array(items) => items
                .into_iter()
                .filter(Value::is_object)
                .filter_map(|v| serde_json::from_value(v).ok())
                .collect(),
            _ => Vec::new(),
        })
    }

    /// Nested object; anything else yields the zero-valued object.
    pub fn object<'de, D, T>(d: D) -> Result<T, D::Error>
    where
        D: Deserializer<'de>,
        T: DeserializeOwned + Default,
    {
        Ok(match Value::deserialize(d)? {
            v @ Value::Object(_) => serde_json::from_value(v).unwrap_or_default(),
            _ => T::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn enrich_overrides_language_and_sets_identity() {
        let parsed = ParsedProfile {
            first_name: "Ada".into(),
            cv_language: "en".into(),
            ..Default::default()
        };
        let event = DocumentReference::new(99, "subject-1");
        let p = StructuredProfile::enrich(parsed, &event, "fr", "gpt-4.1-mini", at());

        assert_eq!(p.subject_id, "subject-1");
        assert_eq!(p.document_id, 99);
        assert_eq!(p.profile.cv_language, "fr");
        assert_eq!(p.ai_metadata.detected_language, "fr");
        assert_eq!(p.ai_metadata.document_id, 99);
        assert_eq!(p.ai_metadata.model, "gpt-4.1-mini");
        assert_eq!(p.ai_metadata.processed_at, at());
    }

    #[test]
    fn serialises_flat_camel_case() {
        let event = DocumentReference::new(5, "s");
        let p = StructuredProfile::enrich(ParsedProfile::default(), &event, "en", "m", at());
        let v = serde_json::to_value(&p).unwrap();

        assert_eq!(v["subjectId"], "s");
        assert_eq!(v["documentId"], 5);
        assert_eq!(v["cvLanguage"], "en");
        assert_eq!(v["atsAnalysis"]["overallScore"], 0);
        assert_eq!(v["aiMetadata"]["detectedLanguage"], "en");
        assert!(v.get("profile").is_none(), "profile must be flattened");
    }

    #[test]
    fn structured_profile_reads_back() {
        let event = DocumentReference::new(5, "s");
        let mut parsed = ParsedProfile::default();
        parsed.skills = vec!["Rust".into()];
        let p = StructuredProfile::enrich(parsed, &event, "en", "m", at());
        let json = serde_json::to_string(&p).unwrap();
        let back: StructuredProfile = serde_json::from_str(&json).unwrap();
        assert_eq!(back, p);
    }

    #[test]
    fn score_is_clamped_and_rounded() {
        let a: AtsAnalysis = serde_json::from_str(r#"{"overallScore": 140}"#).unwrap();
        assert_eq!(a.overall_score, 100);
        let a: AtsAnalysis = serde_json::from_str(r#"{"overallScore": -3}"#).unwrap();
        assert_eq!(a.overall_score, 0);
        let a: AtsAnalysis = serde_json::from_str(r#"{"overallScore": 77.6}"#).unwrap();
        assert_eq!(a.overall_score, 78);
    }

    #[test]
    fn wrong_element_types_are_dropped() {
        let p: ParsedProfile = serde_json::from_str(
            r#"{"skills": ["Go", 3, null, "SQL"], "experiences": ["oops", {"company": "Acme"}]}"#,
        )
        .unwrap();
        assert_eq!(p.skills, vec!["Go", "SQL"]);
        assert_eq!(p.experiences.len(), 1);
        assert_eq!(p.experiences[0].company, "Acme");
    }
}

//! Prompts for structured résumé extraction.
//!
//! Centralising every prompt here serves two purposes:
//!
//! 1. **Single source of truth** — the privacy rules, the JSON shape and the
//!    scoring rubric are edited in exactly one place.
//!
//! 2. **Testability** — unit tests inspect the prompts directly without a
//!    live model, so a rule silently dropped from the prompt is caught.
//!
//! The JSON shape below must stay in sync with [`crate::output::ParsedProfile`].

/// Marker appended to résumé text cut at `max_input_chars`.
pub const TRUNCATION_MARKER: &str = "\n\n[... document truncated ...]";

/// System instruction sent with every extraction request.
pub const SYSTEM_PROMPT: &str = r#"You are an expert recruiter and applicant-tracking-system (ATS) analyst. You read résumés and return a structured candidate profile together with an ATS assessment.

Follow these rules precisely:

1. PRIVACY
   - Extract ONLY the candidate's first name and last name as personal data
   - NEVER output email addresses, phone numbers, postal addresses, dates of birth, photos or social-media links, even if present in the résumé

2. OUTPUT FORMAT
   - Answer with ONE JSON object and nothing else
   - Do NOT wrap the JSON in ``` fences
   - Do NOT add commentary before or after the JSON
   - Use exactly the field names of the requested shape
   - When a value is unknown use "" for strings, 0 for numbers and [] for lists

3. SCORING
   - overallScore is an integer from 0 to 100
   - scoreBreakdown contains four sub-scores, each from 0 to 100:
     formattingScore (weight 20%), contentScore (weight 30%),
     keywordScore (weight 25%), experienceScore (weight 25%)
   - overallScore must equal the weighted sum of the four sub-scores, rounded
   - scoreBreakdown.explanation briefly justifies each sub-score

4. LABELS
   - seniorityLevel is one of: JUNIOR, MID, SENIOR, LEAD, EXECUTIVE
   - atsCompatibility is one of: HIGH, MEDIUM, LOW
   - improvementPriority is one of: HIGH, MEDIUM, LOW
   - Dates use YYYY-MM, or "present" for a current position"#;

/// Exact JSON shape requested from the model.
pub const RESPONSE_SHAPE: &str = r#"{
  "firstName": "",
  "lastName": "",
  "skills": [""],
  "experiences": [
    {"company": "", "title": "", "startDate": "", "endDate": "", "description": ""}
  ],
  "education": [
    {"institution": "", "degree": "", "field": "", "startDate": "", "endDate": ""}
  ],
  "certifications": [""],
  "languages": [{"language": "", "level": ""}],
  "seniorityLevel": "",
  "yearsOfExperience": 0,
  "summary": "",
  "cvLanguage": "",
  "atsAnalysis": {
    "overallScore": 0,
    "assessment": "",
    "strengths": [""],
    "weaknesses": [""],
    "recommendations": [""],
    "atsCompatibility": "",
    "missingKeywords": [""],
    "improvementPriority": "",
    "scoreBreakdown": {
      "formattingScore": 0,
      "contentScore": 0,
      "keywordScore": 0,
      "experienceScore": 0,
      "explanation": ""
    }
  }
}"#;

/// Directive appended to the system prompt for a recognised language.
///
/// Only French and English get one; for any other code the model picks the
/// answer language itself.
pub fn language_directive(language: &str) -> Option<&'static str> {
    match language {
        "fr" => Some(
            "\n\n5. LANGUAGE\n   The résumé is written in French. Write every free-text value (summary, descriptions, assessment, strengths, weaknesses, recommendations, explanation) in French.",
        ),
        "en" => Some(
            "\n\n5. LANGUAGE\n   The résumé is written in English. Write every free-text value (summary, descriptions, assessment, strengths, weaknesses, recommendations, explanation) in English.",
        ),
        _ => None,
    }
}

/// System prompt with the optional language directive.
pub fn system_prompt(language: &str) -> String {
    let mut prompt = String::from(SYSTEM_PROMPT);
    if let Some(directive) = language_directive(language) {
        prompt.push_str(directive);
    }
    prompt
}

/// User message embedding the (possibly truncated) résumé text.
pub fn user_prompt(resume_text: &str) -> String {
    format!(
        "Analyse the following résumé and return the JSON object with exactly this shape:\n\n\
         {RESPONSE_SHAPE}\n\n\
         Résumé:\n\"\"\"\n{resume_text}\n\"\"\""
    )
}

/// Cut `text` to at most `max_chars` characters, appending
/// [`TRUNCATION_MARKER`] when anything was removed.
pub fn truncate_for_model(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => {
            let mut cut = String::with_capacity(byte_idx + TRUNCATION_MARKER.len());
            cut.push_str(&text[..byte_idx]);
            cut.push_str(TRUNCATION_MARKER);
            cut
        }
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_prompt_carries_privacy_and_json_rules() {
        let p = system_prompt("de");
        assert!(p.contains("first name and last name"));
        assert!(p.contains("NEVER output email"));
        assert!(p.contains("ONE JSON object"));
        assert!(p.contains("formattingScore"));
        assert!(p.contains("atsCompatibility"));
    }

    #[test]
    fn language_directive_only_for_fr_and_en() {
        assert!(system_prompt("fr").contains("in French"));
        assert!(system_prompt("en").contains("in English"));
        assert_eq!(system_prompt("de"), SYSTEM_PROMPT);
        assert_eq!(system_prompt(""), SYSTEM_PROMPT);
    }

    #[test]
    fn user_prompt_embeds_text_and_shape() {
        let p = user_prompt("Jane Doe — Rust developer");
        assert!(p.contains("Jane Doe — Rust developer"));
        assert!(p.contains("\"scoreBreakdown\""));
    }

    #[test]
    fn response_shape_is_valid_json() {
        let v: serde_json::Value = serde_json::from_str(RESPONSE_SHAPE).unwrap();
        assert!(v["atsAnalysis"]["scoreBreakdown"].is_object());
    }

    #[test]
    fn short_text_is_not_truncated() {
        assert_eq!(truncate_for_model("abc", 3), "abc");
        assert_eq!(truncate_for_model("", 10), "");
    }

    #[test]
    fn long_text_is_cut_on_char_boundary() {
        let text = "é".repeat(20);
        let cut = truncate_for_model(&text, 5);
        assert!(cut.starts_with(&"é".repeat(5)));
        assert!(cut.ends_with(TRUNCATION_MARKER));
        assert_eq!(cut.chars().count(), 5 + TRUNCATION_MARKER.chars().count());
    }
}

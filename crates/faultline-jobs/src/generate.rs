//! Candidate atom generation via the completion service.

use serde::Deserialize;
use tracing::debug;

use faultline_core::{
    deterministic_atom_id, AtomCategory, Citation, CompletionBackend, Difficulty, Error,
    KnowledgeAtom, Result, SafetyLevel,
};
use faultline_db::Chunk;

/// Structured candidate emitted by the completion model for one chunk.
#[derive(Debug, Clone, Deserialize)]
pub struct CandidateAtom {
    pub title: String,
    pub summary: String,
    pub body: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub difficulty: Option<String>,
    #[serde(default)]
    pub safety: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
}

const SYSTEM_PROMPT: &str = "You distill technical maintenance material into \
self-contained troubleshooting knowledge. Respond with a single JSON object \
and nothing else.";

fn build_prompt(chunk_text: &str, heading: Option<&str>) -> String {
    let categories: Vec<&str> = AtomCategory::all().iter().map(|c| c.as_str()).collect();
    let context = heading
        .map(|h| format!("Section: {}\n\n", h))
        .unwrap_or_default();
    format!(
        "{}Extract one knowledge atom from the passage below.\n\
         Return JSON with keys: title, summary, body, category, difficulty, \
         safety, keywords.\n\
         category must be one of: {}.\n\
         difficulty must be one of: beginner, intermediate, advanced.\n\
         safety must be one of: info, caution, warning, danger.\n\
         keywords is a list of 3-8 lowercase search terms.\n\n\
         Passage:\n{}",
        context,
        categories.join(", "),
        chunk_text
    )
}

/// Strip a markdown code fence if the model wrapped its JSON in one.
fn strip_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.trim_end_matches('`').trim()
}

/// Generate one candidate atom for a chunk.
///
/// The returned atom carries a deterministic id and a citation at the
/// chunk's offset; quality score and embedding are filled by later stages.
pub async fn generate_atom(
    completion: &dyn CompletionBackend,
    source_id: &str,
    chunk_index: usize,
    chunk: &Chunk,
) -> Result<KnowledgeAtom> {
    let prompt = build_prompt(&chunk.text, chunk.metadata.get("heading").map(String::as_str));
    let raw = completion.complete_json(SYSTEM_PROMPT, &prompt).await?;

    let candidate: CandidateAtom = serde_json::from_str(strip_fences(&raw)).map_err(|e| {
        // Malformed model output is worth another sample, not review.
        Error::Completion(format!("candidate atom was not valid JSON: {}", e))
    })?;

    if candidate.title.trim().is_empty() || candidate.body.trim().is_empty() {
        return Err(Error::Completion(
            "candidate atom missing title or body".into(),
        ));
    }

    let atom = KnowledgeAtom {
        id: deterministic_atom_id(source_id, chunk_index),
        title: candidate.title.trim().to_string(),
        summary: candidate.summary.trim().to_string(),
        body: candidate.body.trim().to_string(),
        category: candidate
            .category
            .as_deref()
            .map(AtomCategory::parse_or_general)
            .unwrap_or(AtomCategory::General),
        difficulty: candidate
            .difficulty
            .as_deref()
            .map(Difficulty::parse_or_intermediate)
            .unwrap_or(Difficulty::Intermediate),
        safety: candidate
            .safety
            .as_deref()
            .map(SafetyLevel::parse_or_info)
            .unwrap_or(SafetyLevel::Info),
        keywords: candidate
            .keywords
            .into_iter()
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect(),
        citation: Citation::new(source_id).with_offset(chunk.start_offset as i32),
        quality_score: 0.0,
        embedding: None,
        created_at: chrono::Utc::now(),
        version: 1,
    };

    debug!(
        subsystem = "ingest",
        component = "generate",
        op = "generate_atom",
        source_id = source_id,
        atom_id = %atom.id,
        "Generated candidate atom"
    );
    Ok(atom)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_fences_plain() {
        assert_eq!(strip_fences(r#"{"a": 1}"#), r#"{"a": 1}"#);
    }

    #[test]
    fn test_strip_fences_json_block() {
        let fenced = "```json\n{\"a\": 1}\n```";
        assert_eq!(strip_fences(fenced), "{\"a\": 1}");
    }

    #[test]
    fn test_strip_fences_bare_block() {
        let fenced = "```\n{\"a\": 1}\n```";
        assert_eq!(strip_fences(fenced), "{\"a\": 1}");
    }

    #[test]
    fn test_prompt_names_valid_categories() {
        let prompt = build_prompt("passage", Some("Overload faults"));
        assert!(prompt.contains("Section: Overload faults"));
        assert!(prompt.contains("electrical"));
        assert!(prompt.contains("safety"));
        assert!(prompt.contains("passage"));
    }

    #[test]
    fn test_candidate_deserializes_with_optional_fields() {
        let candidate: CandidateAtom = serde_json::from_str(
            r#"{"title": "t", "summary": "s", "body": "b"}"#,
        )
        .unwrap();
        assert!(candidate.category.is_none());
        assert!(candidate.keywords.is_empty());
    }
}

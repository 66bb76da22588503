//! Extraction of structured findings from vision-model replies
//!
//! The model server does not always return clean JSON. Replies are tried as
//! a structured object, then as JSON text, then JSON inside markdown fences,
//! then the first brace-delimited object found anywhere in free text.

use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;

use super::record::{parse_gene_text, Findings};

/// Envelope fields that may carry the model output, in priority order
const ENVELOPE_FIELDS: [&str; 6] = [
    "content",
    "raw_response",
    "generated_text",
    "text",
    "output",
    "response",
];

const GENE_FIELDS: [&str; 4] = ["genes", "gene_names", "gene", "gene_symbols"];
const DRUG_FIELDS: [&str; 5] = ["drugs", "drug_names", "drug", "medications", "compounds"];
const KEYWORD_FIELDS: [&str; 4] = ["keywords", "terms", "medical_terms", "biomarkers"];
const PROCESS_FIELDS: [&str; 4] = ["process", "biological_process", "pathway", "mechanism"];
const INSIGHT_FIELDS: [&str; 5] = [
    "insights",
    "clinical_insights",
    "findings",
    "significance",
    "clinical_relevance",
];

fn nested_object_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(?s)\{[^{}]*(?:\{[^{}]*\}[^{}]*)*\}").ok())
        .as_ref()
}

/// Pull the first JSON object out of `text`
pub fn extract_json_object(text: &str) -> Option<Value> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(text) {
        return Some(value);
    }

    let unfenced = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .map(str::trim);
    if let Some(inner) = unfenced {
        if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(inner) {
            return Some(value);
        }
    }

    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if start < end {
            if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(&text[start..=end]) {
                return Some(value);
            }
        }
    }

    nested_object_pattern()?
        .find_iter(text)
        .find_map(|m| match serde_json::from_str::<Value>(m.as_str()) {
            Ok(value @ Value::Object(_)) => Some(value),
            _ => None,
        })
}

/// Turn a model reply into [`Findings`].
///
/// Errors carry a short description of what was received, for the record's
/// stage-2 error detail.
pub fn parse_model_reply(reply: &Value) -> Result<Findings, String> {
    match reply {
        Value::Object(map) => {
            if has_any_field(map) {
                return Ok(findings_from_object(map));
            }
            for field in ENVELOPE_FIELDS {
                if let Some(inner) = map.get(field) {
                    if let Ok(findings) = parse_model_reply(inner) {
                        return Ok(findings);
                    }
                }
            }
            let keys: Vec<&str> = map.keys().map(String::as_str).collect();
            Err(format!("no recognizable analysis fields (keys: {keys:?})"))
        }
        Value::String(text) => match extract_json_object(text) {
            Some(Value::Object(map)) if has_any_field(&map) => Ok(findings_from_object(&map)),
            Some(_) => Err("JSON reply carries no recognizable analysis fields".to_string()),
            None => Err(format!(
                "could not parse JSON from reply: {}",
                text.chars().take(120).collect::<String>()
            )),
        },
        Value::Null => Err("empty reply".to_string()),
        other => Err(format!("unexpected reply type: {other}")),
    }
}

fn has_any_field(map: &Map<String, Value>) -> bool {
    [
        &GENE_FIELDS[..],
        &DRUG_FIELDS[..],
        &KEYWORD_FIELDS[..],
        &PROCESS_FIELDS[..],
        &INSIGHT_FIELDS[..],
    ]
    .iter()
    .any(|aliases| aliases.iter().any(|alias| map.contains_key(*alias)))
}

fn first_alias<'a>(map: &'a Map<String, Value>, aliases: &[&str]) -> Option<&'a Value> {
    aliases.iter().find_map(|alias| map.get(*alias))
}

fn term_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => {
            let joined = items
                .iter()
                .filter_map(|item| match item {
                    Value::String(s) => Some(s.clone()),
                    Value::Null => None,
                    other => Some(other.to_string()),
                })
                .collect::<Vec<_>>()
                .join(",");
            parse_gene_text(&joined)
        }
        Some(Value::String(text)) => parse_gene_text(text),
        _ => Vec::new(),
    }
}

fn free_text(value: Option<&Value>) -> Option<String> {
    let text = match value? {
        Value::String(s) => s.trim().to_string(),
        Value::Array(items) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .collect::<Vec<_>>()
            .join(", "),
        Value::Null => return None,
        other => other.to_string(),
    };
    match text.to_lowercase().as_str() {
        "" | "not mentioned" | "none" | "n/a" => None,
        _ => Some(text),
    }
}

fn findings_from_object(map: &Map<String, Value>) -> Findings {
    Findings {
        genes: term_list(first_alias(map, &GENE_FIELDS)),
        drugs: term_list(first_alias(map, &DRUG_FIELDS)),
        keywords: term_list(first_alias(map, &KEYWORD_FIELDS)),
        process: free_text(first_alias(map, &PROCESS_FIELDS)),
        insights: free_text(first_alias(map, &INSIGHT_FIELDS)),
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::{StageLabel, StageStatus};
use std::fmt;

/// Stable identifier of one figure record within a job
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Final disposition of a record. `Pending` until an outcome is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    #[default]
    Pending,
    FilteredOut,
    Processed,
    Error,
}

impl Disposition {
    /// Records a run (re)selects: never attempted, or failed last time
    pub fn needs_processing(self) -> bool {
        matches!(self, Disposition::Pending | Disposition::Error)
    }

    /// Dispositions a later run must never overwrite
    pub fn is_settled(self) -> bool {
        matches!(self, Disposition::Processed | Disposition::FilteredOut)
    }
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Disposition::Pending => "pending",
            Disposition::FilteredOut => "filtered_out",
            Disposition::Processed => "processed",
            Disposition::Error => "error",
        };
        f.write_str(s)
    }
}

/// One figure candidate passing through the pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    /// Image location handed to the classifier and the vision model
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pmcid: Option<String>,
    #[serde(default)]
    pub disposition: Disposition,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<RecordOutcome>,
}

impl Record {
    pub fn new(id: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            id: RecordId::new(id),
            source: source.into(),
            caption: None,
            pmcid: None,
            disposition: Disposition::Pending,
            outcome: None,
        }
    }

    pub fn with_caption(mut self, caption: impl Into<String>) -> Self {
        self.caption = Some(caption.into());
        self
    }

    pub fn with_pmcid(mut self, pmcid: impl Into<String>) -> Self {
        self.pmcid = Some(pmcid.into());
        self
    }
}

/// Structured output of the deep analyzer
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Findings {
    /// Candidate gene symbols, not yet validated
    #[serde(default)]
    pub genes: Vec<String>,
    #[serde(default)]
    pub drugs: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insights: Option<String>,
}

impl Findings {
    pub fn with_genes<I, S>(genes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            genes: genes.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn has_candidate_genes(&self) -> bool {
        !self.genes.is_empty()
    }
}

/// Tagged result of one stage execution for one record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageOutcome {
    pub stage: StageLabel,
    pub status: StageStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl StageOutcome {
    pub fn new(stage: StageLabel, status: StageStatus, detail: Option<String>) -> Self {
        Self {
            stage,
            status,
            detail,
            timestamp: Utc::now(),
        }
    }
}

/// Final outcome written to durable storage once a record leaves the pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordOutcome {
    pub record_id: RecordId,
    pub disposition: Disposition,
    pub stages: Vec<StageOutcome>,
    /// Validated symbols, or the unvalidated candidates when the registry timed out
    pub genes: Vec<String>,
    pub genes_validated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub findings: Option<Findings>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub completed_at: DateTime<Utc>,
}

const NO_GENE_PLACEHOLDERS: [&str; 4] = ["not mentioned", "none", "n/a", ""];
const STOP_WORDS: [&str; 5] = ["and", "or", "the", "a", "an"];

/// Split free-text gene output into candidate symbols.
///
/// Delimiters are `,` `;` `|` newline and tab. Single-character tokens, stop
/// words and "no genes" placeholders are dropped.
pub fn parse_gene_text(text: &str) -> Vec<String> {
    if NO_GENE_PLACEHOLDERS.contains(&text.trim().to_lowercase().as_str()) {
        return Vec::new();
    }

    let mut genes: Vec<String> = Vec::new();
    for token in text.split(|c| matches!(c, ',' | ';' | '|' | '\n' | '\t')) {
        let gene = token.trim().trim_matches(|c| c == '"' || c == '\'').trim();
        let lowered = gene.to_lowercase();
        if gene.chars().count() <= 1
            || STOP_WORDS.contains(&lowered.as_str())
            || NO_GENE_PLACEHOLDERS.contains(&lowered.as_str())
        {
            continue;
        }
        if !genes.iter().any(|known| known == gene) {
            genes.push(gene.to_string());
        }
    }
    genes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_gene_text_mixed_delimiters() {
        let genes = parse_gene_text("BRCA1, TP53; 'EGFR' | \"IL6\"\nTNF\tand");
        assert_eq!(genes, vec!["BRCA1", "TP53", "EGFR", "IL6", "TNF"]);
    }

    #[test]
    fn test_parse_gene_text_placeholders() {
        assert!(parse_gene_text("not mentioned").is_empty());
        assert!(parse_gene_text("  None ").is_empty());
        assert!(parse_gene_text("N/A").is_empty());
        assert!(parse_gene_text("").is_empty());
    }

    #[test]
    fn test_parse_gene_text_drops_short_tokens_and_duplicates() {
        let genes = parse_gene_text("A, PAH, x, PAH, the, TH");
        assert_eq!(genes, vec!["PAH", "TH"]);
    }

    #[test]
    fn test_disposition_selection() {
        assert!(Disposition::Pending.needs_processing());
        assert!(Disposition::Error.needs_processing());
        assert!(!Disposition::Processed.needs_processing());
        assert!(!Disposition::FilteredOut.needs_processing());
        assert!(Disposition::FilteredOut.is_settled());
    }

    #[test]
    fn test_record_deserializes_with_defaults() {
        let record: Record =
            serde_json::from_str(r#"{"id":"fig-1","source":"https://img/1.png"}"#).unwrap();
        assert_eq!(record.id, RecordId::new("fig-1"));
        assert_eq!(record.disposition, Disposition::Pending);
        assert!(record.outcome.is_none());
    }
}

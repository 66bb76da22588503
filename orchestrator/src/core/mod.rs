//! Core domain logic: records, findings, the per-record state machine and run reports

pub mod findings;
pub mod machine;
pub mod record;
pub mod report;

pub use findings::{extract_json_object, parse_model_reply};
pub use machine::{RecordMachine, RecordState};
pub use record::{
    parse_gene_text, Disposition, Findings, Record, RecordId, RecordOutcome, StageOutcome,
};
pub use report::RunReport;

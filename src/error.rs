use thiserror::Error;

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("missing required columns: {} (required: {})", .missing.join(", "), .required.join(", "))]
    Schema {
        missing: Vec<String>,
        required: Vec<String>,
    },
    #[error("line {line}: unparsable date {value:?}")]
    InvalidDate { line: u64, value: String },
    #[error("line {line}: clicks value {value:?} is not a number")]
    InvalidClicks { line: u64, value: String },
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
}

use thiserror::Error;

use crate::model::ImportReport;

#[derive(Debug, Error)]
pub enum ContractError {
    #[error("CSV error: {source}")]
    Csv {
        #[from]
        source: csv::Error,
    },

    #[error("contract JSON error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },

    #[error("failed to read contract file '{path}': {source}")]
    ContractFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("TreeSum file has no header row")]
    EmptyFile,

    #[error("import contract violated: {} violation(s)", .0.errors.len())]
    Violations(Box<ImportReport>),
}

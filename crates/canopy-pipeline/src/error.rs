use thiserror::Error;

use canopy_contract::ImportReport;

/// Pipeline stages, in execution order. Failures carry the stage so the
/// caller can tell "fix your input" apart from "something broke mid-run".
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Validate,
    Aggregate,
    Report,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Validate => "validate",
            Stage::Aggregate => "aggregate",
            Stage::Report => "report",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("import contract violated: {} violation(s)", .0.errors.len())]
    ContractViolation(Box<ImportReport>),

    #[error("{stage} stage failed: {message}")]
    Stage { stage: Stage, message: String },

    #[error("{stage} stage CSV error: {source}")]
    Csv {
        stage: Stage,
        #[source]
        source: csv::Error,
    },

    #[error("{stage} stage JSON error: {source}")]
    Json {
        stage: Stage,
        #[source]
        source: serde_json::Error,
    },
}

impl PipelineError {
    pub fn stage(stage: Stage, message: impl Into<String>) -> Self {
        PipelineError::Stage {
            stage,
            message: message.into(),
        }
    }

    pub fn stage_name(&self) -> &'static str {
        match self {
            PipelineError::ContractViolation(_) => Stage::Validate.as_str(),
            PipelineError::Stage { stage, .. }
            | PipelineError::Csv { stage, .. }
            | PipelineError::Json { stage, .. } => stage.as_str(),
        }
    }
}

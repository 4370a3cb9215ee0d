use chrono::{Datelike, NaiveDate};
use tracing::info;

use canopy_contract::{validate_treesum, ContractError, ImportContract, ImportReport};

use crate::aggregate::{aggregate_stands, write_stand_summary_csv};
use crate::calibration::CalibrationTable;
use crate::error::{PipelineError, Stage};
use crate::events::{build_auto_events, load_events_csv, write_events_csv};
use crate::finance::{compute_cashflows, PriceSheet, RoiSummary};
use crate::report::{render_owner_report, ReportContext};
use crate::types::{CruiseDesign, StandAggregate};

pub const NORMALIZED_ARTIFACT: &str = "out_treesum_normalized.csv";
pub const TREELEVEL_ARTIFACT: &str = "out_canopy_treelevel.csv";
pub const IMPORT_REPORT_ARTIFACT: &str = "out_import_report.json";
pub const STAND_SUMMARY_ARTIFACT: &str = "out_stand_summary.csv";
pub const EVENT_SCHEDULE_ARTIFACT: &str = "out_event_schedule.csv";
pub const OWNER_REPORT_ARTIFACT: &str = "out_owner_report.html";

/// Scalar parameters of one processing request.
#[derive(Debug, Clone)]
pub struct RunParams {
    pub design: CruiseDesign,
    pub owner: String,
    pub tract: String,
    /// Discount rate as a percentage (5 means 5%).
    pub discount_pct: f64,
    pub species_col: String,
    /// Date the run is evaluated against; event years and the report header
    /// derive from it, so a fixed date makes a run reproducible.
    pub reference_date: NaiveDate,
}

/// A full request's inputs: raw uploaded bytes plus parameters.
#[derive(Debug, Clone)]
pub struct PipelineInput {
    pub treesum: Vec<u8>,
    pub prices: Vec<u8>,
    pub events: Option<Vec<u8>>,
    pub calibration: Option<Vec<u8>>,
    pub params: RunParams,
}

/// A generated file, not yet persisted anywhere.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub name: &'static str,
    pub content_type: &'static str,
    pub bytes: Vec<u8>,
}

#[derive(Debug)]
pub struct RunOutput {
    pub artifacts: Vec<Artifact>,
    pub import_report: ImportReport,
    pub stands: Vec<StandAggregate>,
    pub roi: RoiSummary,
}

impl RunOutput {
    pub fn report_name(&self) -> &'static str {
        OWNER_REPORT_ARTIFACT
    }
}

/// The shared runner: one synchronous validate -> aggregate -> report pass
/// per call, no state carried between runs. Identical inputs with the same
/// reference date produce identical artifacts.
pub struct PipelineRunner {
    contract: ImportContract,
}

impl PipelineRunner {
    pub fn new(contract: ImportContract) -> Self {
        Self { contract }
    }

    pub fn contract(&self) -> &ImportContract {
        &self.contract
    }

    pub fn run(&self, input: &PipelineInput) -> Result<RunOutput, PipelineError> {
        let mut artifacts = Vec::with_capacity(6);

        // Stage 1: validate against the import contract.
        let validated = validate_treesum(&input.treesum, &self.contract).map_err(|err| match err
        {
            ContractError::Violations(report) => PipelineError::ContractViolation(report),
            other => PipelineError::stage(Stage::Validate, other.to_string()),
        })?;
        info!(
            rows = validated.report.rows,
            stands = validated.report.stands_detected.len(),
            warnings = validated.report.warnings.len(),
            "treesum validated"
        );

        artifacts.push(Artifact {
            name: NORMALIZED_ARTIFACT,
            content_type: "text/csv",
            bytes: validated
                .normalized
                .to_csv_bytes()
                .map_err(|err| PipelineError::stage(Stage::Validate, err.to_string()))?,
        });
        artifacts.push(Artifact {
            name: TREELEVEL_ARTIFACT,
            content_type: "text/csv",
            bytes: validated
                .canopy
                .to_csv_bytes()
                .map_err(|err| PipelineError::stage(Stage::Validate, err.to_string()))?,
        });
        artifacts.push(Artifact {
            name: IMPORT_REPORT_ARTIFACT,
            content_type: "application/json",
            bytes: serde_json::to_vec_pretty(&validated.report).map_err(|source| {
                PipelineError::Json {
                    stage: Stage::Validate,
                    source,
                }
            })?,
        });

        // Stage 2: aggregate to stand summaries.
        let calibration = match &input.calibration {
            Some(bytes) => CalibrationTable::from_json(bytes).map_err(|err| {
                PipelineError::stage(Stage::Aggregate, format!("invalid calibration JSON: {err}"))
            })?,
            None => CalibrationTable::default(),
        };

        let stands = aggregate_stands(
            &validated.canopy,
            input.params.design,
            &calibration,
            &input.params.species_col,
        )?;
        info!(stands = stands.len(), "stand aggregation complete");

        artifacts.push(Artifact {
            name: STAND_SUMMARY_ARTIFACT,
            content_type: "text/csv",
            bytes: write_stand_summary_csv(&stands)?,
        });

        // Stage 3: price, discount, and render the owner report.
        let sheet = PriceSheet::from_json(&input.prices).map_err(|err| {
            PipelineError::stage(Stage::Report, format!("invalid prices JSON: {err}"))
        })?;

        let reference_year = input.params.reference_date.year();
        let events = match &input.events {
            Some(bytes) => load_events_csv(bytes, &calibration)?,
            None => build_auto_events(&stands, &calibration, reference_year),
        };
        artifacts.push(Artifact {
            name: EVENT_SCHEDULE_ARTIFACT,
            content_type: "text/csv",
            bytes: write_events_csv(&events)?,
        });

        let discount_rate = input.params.discount_pct / 100.0;
        let roi = compute_cashflows(&events, &sheet, discount_rate, reference_year)?;
        info!(
            events = events.len(),
            npv = roi.npv,
            "cashflow computation complete"
        );

        let html = render_owner_report(&ReportContext {
            owner: &input.params.owner,
            tract: &input.params.tract,
            generated_on: input.params.reference_date,
            discount_rate,
            design: input.params.design,
            species_col: &input.params.species_col,
            stands: &stands,
            events: &events,
            sheet: &sheet,
            roi: &roi,
            calibration: &calibration,
            import: Some(&validated.report),
        });
        artifacts.push(Artifact {
            name: OWNER_REPORT_ARTIFACT,
            content_type: "text/html; charset=utf-8",
            bytes: html.into_bytes(),
        });

        Ok(RunOutput {
            artifacts,
            import_report: validated.report,
            stands,
            roi,
        })
    }
}

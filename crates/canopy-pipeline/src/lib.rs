//! Cruise-to-report pipeline: validate -> aggregate -> report, run to
//! completion once per request.

pub mod aggregate;
pub mod calibration;
pub mod error;
pub mod events;
pub mod finance;
pub mod report;
mod runner;
pub mod types;

pub use aggregate::{aggregate_stands, read_stand_summary_csv, write_stand_summary_csv};
pub use calibration::CalibrationTable;
pub use error::{PipelineError, Stage};
pub use events::{build_auto_events, load_events_csv, write_events_csv, EventKind, EventTotals};
pub use finance::{compute_cashflows, Cashflow, PriceSheet, RoiSummary};
pub use report::{render_owner_report, ReportContext};
pub use runner::{Artifact, PipelineInput, PipelineRunner, RunOutput, RunParams};
pub use types::{CruiseDesign, CruiseType, Product, StandAggregate};

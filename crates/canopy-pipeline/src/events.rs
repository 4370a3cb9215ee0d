use std::collections::BTreeMap;
use std::io::Cursor;

use serde::{Deserialize, Serialize};

use crate::calibration::{CalibrationTable, ALL_GROUP};
use crate::error::{PipelineError, Stage};
use crate::types::{Product, StandAggregate};

/// Tons of merchantable yield per sq ft of removed basal area per acre.
const YIELD_TONS_PER_BA: f64 = 0.12;
const FINAL_BA_MULTIPLIER: f64 = 1.2;
const FINAL_TONS_PER_AC_MIN: f64 = 60.0;
const FINAL_TONS_PER_AC_MAX: f64 = 150.0;

/// Target stand ages for the auto-generated schedule.
const FIRST_THIN_AGE: f64 = 15.0;
const SECOND_THIN_AGE: f64 = 21.0;
const FINAL_HARVEST_AGE: f64 = 30.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    FirstThin,
    SecondThin,
    Final,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::FirstThin => "first_thin",
            EventKind::SecondThin => "second_thin",
            EventKind::Final => "final",
        }
    }

    /// Fraction of standing basal area removed; `None` for the final
    /// harvest, which clears the stand.
    fn removal_fraction(&self) -> Option<f64> {
        match self {
            EventKind::FirstThin => Some(0.28),
            EventKind::SecondThin => Some(0.33),
            EventKind::Final => None,
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tract-level product tons for one harvest event year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventTotals {
    pub event: String,
    pub year: i32,
    pub pulp_t: f64,
    pub cns_t: f64,
    pub saw_t: f64,
    pub export_t: f64,
}

impl EventTotals {
    pub fn tons(&self, product: Product) -> f64 {
        match product {
            Product::Pulp => self.pulp_t,
            Product::Cns => self.cns_t,
            Product::Saw => self.saw_t,
            Product::Export => self.export_t,
        }
    }

    fn tons_mut(&mut self, product: Product) -> &mut f64 {
        match product {
            Product::Pulp => &mut self.pulp_t,
            Product::Cns => &mut self.cns_t,
            Product::Saw => &mut self.saw_t,
            Product::Export => &mut self.export_t,
        }
    }
}

/// Product shares summing to 1.0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProductSplit {
    pub pulp: f64,
    pub cns: f64,
    pub saw: f64,
    pub export: f64,
}

impl ProductSplit {
    pub fn share(&self, product: Product) -> f64 {
        match product {
            Product::Pulp => self.pulp,
            Product::Cns => self.cns,
            Product::Saw => self.saw,
            Product::Export => self.export,
        }
    }
}

/// Event years for a stand. Known ages schedule the thins and final harvest
/// at the target ages, clamped so the sequence stays strictly increasing
/// from the reference year; unknown ages fall back to a fixed ladder.
pub fn auto_event_years(age: Option<f64>, reference_year: i32) -> (i32, i32, i32) {
    let Some(age) = age else {
        return (reference_year + 2, reference_year + 8, reference_year + 15);
    };
    let y1 = reference_year.max(reference_year + (FIRST_THIN_AGE - age).round() as i32);
    let y2 = (y1 + 1).max(reference_year + (SECOND_THIN_AGE - age).round() as i32);
    let yf = (y2 + 1).max(reference_year + (FINAL_HARVEST_AGE - age).round() as i32);
    (y1, y2, yf)
}

/// Product split as a function of quadratic mean diameter; unknown QMD is
/// treated as a 7 in stand.
pub fn product_split_from_qmd(qmd: Option<f64>) -> ProductSplit {
    let qmd = qmd.unwrap_or(7.0);
    if qmd < 6.0 {
        ProductSplit { pulp: 0.9, cns: 0.1, saw: 0.0, export: 0.0 }
    } else if qmd < 8.0 {
        ProductSplit { pulp: 0.5, cns: 0.4, saw: 0.1, export: 0.0 }
    } else if qmd < 10.0 {
        ProductSplit { pulp: 0.3, cns: 0.4, saw: 0.3, export: 0.0 }
    } else {
        ProductSplit { pulp: 0.2, cns: 0.3, saw: 0.4, export: 0.1 }
    }
}

/// Total tons removed by an event on one stand.
pub fn estimate_tons(kind: EventKind, ba_sqft_ac: f64, acres: Option<f64>) -> f64 {
    let Some(acres) = acres.filter(|a| *a > 0.0) else {
        return 0.0;
    };
    match kind.removal_fraction() {
        Some(removal) => (ba_sqft_ac * removal * YIELD_TONS_PER_BA * acres).max(0.0),
        None => {
            let tons_per_ac = (ba_sqft_ac * FINAL_BA_MULTIPLIER)
                .clamp(FINAL_TONS_PER_AC_MIN, FINAL_TONS_PER_AC_MAX);
            tons_per_ac * acres
        }
    }
}

/// Builds the tract-level harvest schedule when no events file is supplied:
/// one first thin, second thin, and final harvest per stand, product-split
/// by QMD, scaled by the stand's calibration group factors, then summed
/// across stands by (event, year).
pub fn build_auto_events(
    stands: &[StandAggregate],
    calibration: &CalibrationTable,
    reference_year: i32,
) -> Vec<EventTotals> {
    let mut totals: BTreeMap<(String, i32), EventTotals> = BTreeMap::new();

    for stand in stands {
        let (y1, y2, yf) = auto_event_years(None, reference_year);
        let split = product_split_from_qmd(stand.qmd_in);

        let schedule = [
            (EventKind::FirstThin, y1),
            (EventKind::SecondThin, y2),
            (EventKind::Final, yf),
        ];
        for (kind, year) in schedule {
            let total = estimate_tons(kind, stand.ba_sqft_ac, stand.acres);
            let entry = totals
                .entry((kind.as_str().to_string(), year))
                .or_insert_with(|| EventTotals {
                    event: kind.as_str().to_string(),
                    year,
                    pulp_t: 0.0,
                    cns_t: 0.0,
                    saw_t: 0.0,
                    export_t: 0.0,
                });
            for product in Product::ALL {
                let factor = calibration.factor(&stand.calibration_group, product.factor_name());
                *entry.tons_mut(product) += total * split.share(product) * factor;
            }
        }
    }

    totals.into_values().collect()
}

#[derive(Debug, Deserialize)]
struct EventRow {
    #[serde(default)]
    event: String,
    year: f64,
    #[serde(default)]
    pulp_t: f64,
    #[serde(default)]
    cns_t: f64,
    #[serde(default)]
    saw_t: f64,
    #[serde(default)]
    export_t: f64,
}

/// Loads a caller-supplied event schedule. Only the global `ALL` product
/// factors apply here: the rows are tract totals with no stand or species
/// attached.
pub fn load_events_csv(
    bytes: &[u8],
    calibration: &CalibrationTable,
) -> Result<Vec<EventTotals>, PipelineError> {
    let mut reader = csv::Reader::from_reader(Cursor::new(bytes));
    let mut events = Vec::new();
    for record in reader.deserialize() {
        let row: EventRow = record.map_err(|source| PipelineError::Csv {
            stage: Stage::Report,
            source,
        })?;
        let mut totals = EventTotals {
            event: row.event,
            year: row.year as i32,
            pulp_t: row.pulp_t,
            cns_t: row.cns_t,
            saw_t: row.saw_t,
            export_t: row.export_t,
        };
        for product in Product::ALL {
            *totals.tons_mut(product) *= calibration.factor(ALL_GROUP, product.factor_name());
        }
        events.push(totals);
    }
    if events.is_empty() {
        return Err(PipelineError::stage(
            Stage::Report,
            "events file contains no rows",
        ));
    }
    Ok(events)
}

pub fn write_events_csv(events: &[EventTotals]) -> Result<Vec<u8>, PipelineError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for event in events {
        writer.serialize(event).map_err(|source| PipelineError::Csv {
            stage: Stage::Report,
            source,
        })?;
    }
    writer.into_inner().map_err(|err| PipelineError::Csv {
        stage: Stage::Report,
        source: err.into_error().into(),
    })
}

use std::collections::BTreeMap;
use std::f64::consts::PI;
use std::io::Cursor;

use canopy_contract::table::parse_f64;
use canopy_contract::Table;

use crate::calibration::{CalibrationTable, ALL_GROUP};
use crate::error::{PipelineError, Stage};
use crate::types::{CruiseDesign, StandAggregate};

/// Basal area (sq ft) contributed per square inch of DBH squared.
const BA_PER_SQIN_DBH: f64 = 0.005454;
const SQIN_PER_SQFT: f64 = 144.0;

/// Groups canopy tree-level rows by stand and derives per-stand statistics.
///
/// Expansion depends on the cruise design: plot cruises expand each tree by
/// 1/plot_acres; point cruises expand by BAF over the tree's own basal area.
/// Trees without a parseable DBH still count as observed but contribute
/// nothing to the DBH-derived sums.
pub fn aggregate_stands(
    tree: &Table,
    design: CruiseDesign,
    calibration: &CalibrationTable,
    species_col: &str,
) -> Result<Vec<StandAggregate>, PipelineError> {
    let stand_col = tree.column_index("stand_id").ok_or_else(|| {
        PipelineError::stage(Stage::Aggregate, "tree-level data is missing stand_id")
    })?;
    let dbh_col = tree.column_index("dbh_in");
    let acres_col = tree.column_index("acres");
    let group_col = tree.column_index(species_col);

    let mut groups: BTreeMap<String, Vec<usize>> = BTreeMap::new();
    for row in 0..tree.height() {
        let stand_id = tree.cell(row, stand_col);
        if stand_id.is_empty() {
            return Err(PipelineError::stage(
                Stage::Aggregate,
                format!("row {} has an empty stand_id", row + 1),
            ));
        }
        groups.entry(stand_id.to_string()).or_default().push(row);
    }

    let mut stands = Vec::with_capacity(groups.len());
    for (stand_id, rows) in groups {
        let n_trees = rows.len();

        let acres = acres_col.and_then(|col| {
            rows.iter()
                .find_map(|row| parse_f64(tree.cell(*row, col)).ok().flatten())
        });

        let group_key = group_col
            .and_then(|col| {
                rows.iter().find_map(|row| {
                    let value = tree.cell(*row, col);
                    (!value.is_empty()).then(|| value.to_string())
                })
            })
            .unwrap_or_else(|| ALL_GROUP.to_string());

        let dbh_values: Vec<f64> = match dbh_col {
            Some(col) => rows
                .iter()
                .filter_map(|row| parse_f64(tree.cell(*row, col)).ok().flatten())
                .collect(),
            None => Vec::new(),
        };

        let (tpa, ba) = match design {
            CruiseDesign::Plot { plot_acres } => {
                let exp_factor = 1.0 / plot_acres;
                let tpa = n_trees as f64 * exp_factor;
                let ba: f64 = dbh_values
                    .iter()
                    .map(|dbh| PI * dbh * dbh / SQIN_PER_SQFT)
                    .sum::<f64>()
                    * exp_factor;
                (tpa, ba)
            }
            CruiseDesign::Point { baf } => {
                let tpa: f64 = dbh_values
                    .iter()
                    .filter(|dbh| **dbh > 0.0)
                    .map(|dbh| baf / (BA_PER_SQIN_DBH * dbh * dbh))
                    .sum();
                let ba = baf * n_trees as f64;
                (tpa, ba)
            }
        };

        // QMD from pre-calibration basal area, as the factors then scale it
        // independently.
        let qmd = if n_trees > 0 {
            Some((ba * SQIN_PER_SQFT / (BA_PER_SQIN_DBH * n_trees as f64)).sqrt())
        } else {
            None
        };

        stands.push(StandAggregate {
            stand_id,
            acres,
            trees_observed: n_trees,
            tpa_live: tpa * calibration.factor(&group_key, "tpa_factor"),
            ba_sqft_ac: ba * calibration.factor(&group_key, "ba_factor"),
            qmd_in: qmd.map(|q| q * calibration.factor(&group_key, "qmd_factor")),
            calibration_group: group_key,
        });
    }

    Ok(stands)
}

pub fn write_stand_summary_csv(stands: &[StandAggregate]) -> Result<Vec<u8>, PipelineError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for stand in stands {
        writer.serialize(stand).map_err(|source| PipelineError::Csv {
            stage: Stage::Aggregate,
            source,
        })?;
    }
    writer
        .into_inner()
        .map_err(|err| PipelineError::Csv {
            stage: Stage::Aggregate,
            source: err.into_error().into(),
        })
}

pub fn read_stand_summary_csv(bytes: &[u8]) -> Result<Vec<StandAggregate>, PipelineError> {
    let mut reader = csv::Reader::from_reader(Cursor::new(bytes));
    let mut stands = Vec::new();
    for record in reader.deserialize() {
        let stand: StandAggregate = record.map_err(|source| PipelineError::Csv {
            stage: Stage::Report,
            source,
        })?;
        stands.push(stand);
    }
    Ok(stands)
}

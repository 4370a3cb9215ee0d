use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::ContractError;

/// Cell-level cleanups applied before validation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Normalization {
    #[serde(default)]
    pub strip_whitespace: bool,
    #[serde(default)]
    pub upper_species_codes: bool,
}

/// Declared schema a TreeSum upload must satisfy before aggregation.
///
/// `mapping_to_canopy` maps destination (canopy) column names to source
/// columns in the upload; destinations whose source column is absent come
/// through as empty columns rather than failing, so optional inputs like a
/// calibration-species column stay optional.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportContract {
    pub required_columns: Vec<String>,
    #[serde(default)]
    pub normalization: Normalization,
    #[serde(default)]
    pub species_domain: Option<Vec<String>>,
    pub mapping_to_canopy: BTreeMap<String, String>,
}

impl ImportContract {
    /// The contract bundled with the service, used when no override file is
    /// configured.
    pub fn builtin() -> Self {
        let required = [
            "TractName",
            "StandID",
            "StandAcres",
            "CruiseDate",
            "CruiseType",
            "Size_BAF",
            "PlotNum",
            "PlotID",
            "Species",
            "DBH",
            "MerchHt",
            "TopDIB",
            "TreeClass",
        ];
        let mapping = [
            ("stand_id", "StandID"),
            ("acres", "StandAcres"),
            ("dbh_in", "DBH"),
            ("species_code", "Species"),
            ("plot_id", "PlotID"),
            ("tree_class", "TreeClass"),
            // Passthrough so per-species calibration grouping works when the
            // upload carries it; absent in most cruises.
            ("CalSpecies", "CalSpecies"),
        ];

        Self {
            required_columns: required.iter().map(|c| c.to_string()).collect(),
            normalization: Normalization {
                strip_whitespace: true,
                upper_species_codes: true,
            },
            species_domain: None,
            mapping_to_canopy: mapping
                .iter()
                .map(|(dst, src)| (dst.to_string(), src.to_string()))
                .collect(),
        }
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, ContractError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn load(path: &Path) -> Result<Self, ContractError> {
        let bytes = std::fs::read(path).map_err(|source| ContractError::ContractFile {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&bytes)
    }
}

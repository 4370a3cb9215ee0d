use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CruiseType {
    Plot,
    Point,
}

impl CruiseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CruiseType::Plot => "Plot",
            CruiseType::Point => "Point",
        }
    }
}

impl fmt::Display for CruiseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CruiseType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        if trimmed.eq_ignore_ascii_case("plot") {
            Ok(CruiseType::Plot)
        } else if trimmed.eq_ignore_ascii_case("point") {
            Ok(CruiseType::Point)
        } else {
            Err(format!(
                "cruise_type must be 'Plot' or 'Point', got '{trimmed}'"
            ))
        }
    }
}

/// Cruise methodology with its size value already interpreted: plot acreage
/// for plot cruises, basal-area factor for point cruises. Constructing one
/// validates the pair together, so a design with a meaningless size value
/// cannot exist.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "cruise_type")]
pub enum CruiseDesign {
    Plot { plot_acres: f64 },
    Point { baf: f64 },
}

impl CruiseDesign {
    pub fn new(cruise_type: CruiseType, size_value: f64) -> Result<Self, String> {
        if !size_value.is_finite() || size_value <= 0.0 {
            return Err(match cruise_type {
                CruiseType::Plot => "plot size (acres) must be a positive number".to_string(),
                CruiseType::Point => "BAF must be a positive number".to_string(),
            });
        }
        Ok(match cruise_type {
            CruiseType::Plot => CruiseDesign::Plot {
                plot_acres: size_value,
            },
            CruiseType::Point => CruiseDesign::Point { baf: size_value },
        })
    }

    pub fn cruise_type(&self) -> CruiseType {
        match self {
            CruiseDesign::Plot { .. } => CruiseType::Plot,
            CruiseDesign::Point { .. } => CruiseType::Point,
        }
    }

    pub fn size_value(&self) -> f64 {
        match self {
            CruiseDesign::Plot { plot_acres } => *plot_acres,
            CruiseDesign::Point { baf } => *baf,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            CruiseDesign::Plot { plot_acres } => {
                format!("Plot cruise, {plot_acres} ac plots")
            }
            CruiseDesign::Point { baf } => format!("Point cruise, BAF {baf}"),
        }
    }
}

/// Merchandised product classes carried through events, pricing, and the
/// report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Product {
    Pulp,
    Cns,
    Saw,
    Export,
}

impl Product {
    pub const ALL: [Product; 4] = [Product::Pulp, Product::Cns, Product::Saw, Product::Export];

    pub fn as_str(&self) -> &'static str {
        match self {
            Product::Pulp => "pulp",
            Product::Cns => "cns",
            Product::Saw => "saw",
            Product::Export => "export",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Product::Pulp => "Pulp",
            Product::Cns => "CNS",
            Product::Saw => "Saw",
            Product::Export => "Export",
        }
    }

    /// Calibration factor name for this product ("pulp_factor", ...).
    pub fn factor_name(&self) -> &'static str {
        match self {
            Product::Pulp => "pulp_factor",
            Product::Cns => "cns_factor",
            Product::Saw => "saw_factor",
            Product::Export => "export_factor",
        }
    }
}

impl fmt::Display for Product {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-stand summary statistics, the aggregation stage's output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandAggregate {
    pub stand_id: String,
    pub acres: Option<f64>,
    pub trees_observed: usize,
    pub tpa_live: f64,
    pub ba_sqft_ac: f64,
    pub qmd_in: Option<f64>,
    pub calibration_group: String,
}

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// The group every calibration lookup falls back to.
pub const ALL_GROUP: &str = "ALL";

/// Measurement-bias correction factors, keyed by calibration group (usually
/// a species code, or `ALL`) and factor name, e.g.
/// `{"ALL": {"ba_factor": 1.05}, "LP": {"tpa_factor": 0.97}}`.
///
/// Lookups fall back from the specific group to `ALL`, then to 1.0, so an
/// absent table is a no-op.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CalibrationTable(BTreeMap<String, BTreeMap<String, f64>>);

impl CalibrationTable {
    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }

    pub fn factor(&self, group: &str, name: &str) -> f64 {
        if let Some(value) = self.0.get(group).and_then(|factors| factors.get(name)) {
            return *value;
        }
        if let Some(value) = self.0.get(ALL_GROUP).and_then(|factors| factors.get(name)) {
            return *value;
        }
        1.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Groups and their factors, for the report's QA appendix.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &BTreeMap<String, f64>)> {
        self.0.iter().map(|(group, factors)| (group.as_str(), factors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_lookup_falls_back_to_all_then_unity() {
        let table = CalibrationTable::from_json(
            br#"{"ALL": {"ba_factor": 1.1}, "LP": {"ba_factor": 0.9, "tpa_factor": 1.2}}"#,
        )
        .unwrap();

        assert_eq!(table.factor("LP", "ba_factor"), 0.9);
        assert_eq!(table.factor("SW", "ba_factor"), 1.1);
        assert_eq!(table.factor("LP", "tpa_factor"), 1.2);
        assert_eq!(table.factor("SW", "tpa_factor"), 1.0);
        assert_eq!(table.factor("SW", "qmd_factor"), 1.0);
    }

    #[test]
    fn empty_table_is_identity() {
        let table = CalibrationTable::default();
        assert!(table.is_empty());
        assert_eq!(table.factor("ALL", "ba_factor"), 1.0);
    }
}
